//! Error types shared by the gateway and the state machines.

use std::time::Duration;

/// Normalized failure of a single backend call.
///
/// Transport and decoding errors never cross the gateway boundary in any other
/// form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No response was received (connection refused, DNS, reset).
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// A response was received but it was not a success.
    #[error("Backend error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Backend { status: Option<u16>, message: String },

    /// A success response carried no text in any known reply shape.
    #[error("Backend returned an empty response")]
    EmptyResponse,

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Short text shown in place of an answer when an exchange fails.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Unreachable(_) => {
                "Error: Could not reach the AI backend. Make sure the server and Ollama are running."
                    .to_string()
            }
            GatewayError::Backend { message, .. } if !message.trim().is_empty() => {
                format!("Error: {}", message.trim())
            }
            GatewayError::Backend { .. } => "Error: Failed to get response from AI".to_string(),
            GatewayError::EmptyResponse => "No response from AI".to_string(),
            GatewayError::Timeout(limit) => {
                format!("Error: The AI backend did not respond within {limit:?}")
            }
        }
    }
}

/// Rejection of a chat submission. The transcript is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("A response is still pending")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("No model selected")]
    NoModelSelected,
}

/// Rejection of a cell analysis intent before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Cell has no content")]
    EmptyCell,

    #[error("No model selected")]
    NoModelSelected,
}
