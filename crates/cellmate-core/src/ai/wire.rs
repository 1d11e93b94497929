//! JSON bodies exchanged with the assistant backend.
//!
//! Endpoint paths and field names are a fixed contract with the server
//! extension and must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::models::ModelDescriptor;
use crate::state::ChatMessage;

pub(crate) const MODELS_PATH: &str = "models";
pub(crate) const CHAT_PATH: &str = "chat";
pub(crate) const CELL_CONTEXT_PATH: &str = "cell-context";
pub(crate) const EMBEDDINGS_PATH: &str = "embeddings";

/// Keys owned by [`ChatRequest`] that extra options may not override.
pub(crate) const RESERVED_CHAT_KEYS: [&str; 3] = ["model", "messages", "stream"];

#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize)]
pub(crate) struct CellContextRequest<'a> {
    pub model: &'a str,
    pub cell_content: &'a str,
    pub cell_type: &'a str,
    pub question: &'a str,
}

#[derive(Serialize)]
pub(crate) struct EmbeddingsRequest<'a> {
    pub model: &'a str,
    pub text: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingsResponse {
    #[serde(default)]
    pub embeddings: Vec<f32>,
}

#[derive(Deserialize)]
struct WireModelDetails {
    parameter_size: Option<String>,
}

#[derive(Deserialize)]
struct WireModel {
    name: String,
    size: Option<u64>,
    parameter_size: Option<String>,
    // Ollama's own tag listing nests parameter_size here
    details: Option<WireModelDetails>,
}

#[derive(Deserialize)]
pub(crate) struct ModelsResponse {
    #[serde(default)]
    models: Vec<WireModel>,
}

impl ModelsResponse {
    pub fn into_descriptors(self) -> Vec<ModelDescriptor> {
        self.models
            .into_iter()
            .map(|model| ModelDescriptor {
                parameter_size: model
                    .parameter_size
                    .or_else(|| model.details.and_then(|d| d.parameter_size)),
                name: model.name,
                size_bytes: model.size,
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Builds the error for a non-success status from the raw response body.
pub(crate) fn error_from_body(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "Request failed: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            )
        });
    GatewayError::Backend {
        status: Some(status.as_u16()),
        message,
    }
}

/// The two reply shapes the backend produces for a completed generation.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Reply {
    /// `{ "message": { "content": ... } }` from the chat endpoint
    Message(String),
    /// `{ "response": ... }` from generate-style endpoints
    Response(String),
}

impl Reply {
    /// Classifies a success payload. The nested shape wins when both are present.
    /// Each shape is probed on its own, so a malformed field of one shape does
    /// not hide a usable other one.
    pub fn classify(value: &Value) -> Result<Reply, GatewayError> {
        let nested = value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());
        if let Some(content) = nested {
            return Ok(Reply::Message(content.to_string()));
        }
        match value.get("response").and_then(Value::as_str).filter(|r| !r.is_empty()) {
            Some(response) => Ok(Reply::Response(response.to_string())),
            None => Err(GatewayError::EmptyResponse),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Message(text) | Reply::Response(text) => text,
        }
    }
}
