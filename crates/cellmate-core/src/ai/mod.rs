pub mod ollama;
mod wire;

pub use ollama::{GatewayConfig, OllamaClient};

use async_trait::async_trait;

use crate::analysis::AnalysisRequest;
use crate::error::GatewayError;
use crate::models::ModelDescriptor;
use crate::state::ChatMessage;

/// Logical operations against the language-model backend.
///
/// Every call is one request and one complete response. Implementations hold
/// no conversational state and never retry.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError>;

    /// Sends `history` in order and returns the assistant's reply text.
    async fn chat(&self, model: &str, history: &[ChatMessage]) -> Result<String, GatewayError>;

    /// Asks a question about a single cell.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, GatewayError>;

    async fn embeddings(&self, model: &str, text: &str) -> Result<Vec<f32>, GatewayError>;
}
