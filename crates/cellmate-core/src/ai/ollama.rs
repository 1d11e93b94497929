use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::wire::{
    error_from_body, CellContextRequest, ChatRequest, EmbeddingsRequest, EmbeddingsResponse,
    ModelsResponse, Reply, CELL_CONTEXT_PATH, CHAT_PATH, EMBEDDINGS_PATH, MODELS_PATH,
    RESERVED_CHAT_KEYS,
};
use super::Gateway;
use crate::analysis::AnalysisRequest;
use crate::config::Config;
use crate::error::GatewayError;
use crate::models::ModelDescriptor;
use crate::state::ChatMessage;

/// Construction-time settings of an [`OllamaClient`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model_options: HashMap<String, Map<String, Value>>,
}

impl GatewayConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            temperature: None,
            max_tokens: None,
            model_options: HashMap::new(),
        }
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.base_url().trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            temperature: Some(config.temperature()),
            max_tokens: Some(config.max_tokens()),
            model_options: config.model_options.clone(),
        }
    }
}

/// HTTP gateway to the notebook server's Ollama proxy (`.../api/ollama`).
///
/// Stateless apart from the connection pool; performs no retries.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    config: GatewayConfig,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(GatewayConfig::new(base_url))
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                Client::new()
            });
        Self { client, config }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url, endpoint)
    }

    /// Extra top-level fields of a chat body for `model`.
    fn chat_extra(&self, model: &str) -> Map<String, Value> {
        let mut extra = Map::new();
        if let Some(temperature) = self.config.temperature {
            extra.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            extra.insert("options".into(), json!({ "num_predict": max_tokens }));
        }
        if let Some(overrides) = self.config.model_options.get(model) {
            for (key, value) in overrides {
                extra.insert(key.clone(), value.clone());
            }
        }
        extra.retain(|key, _| !RESERVED_CHAT_KEYS.contains(&key.as_str()));
        extra
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::Unreachable(err.to_string())
        }
    }

    /// Returns the raw body of a success reply; how an unparseable body is
    /// reported depends on the endpoint.
    async fn send(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }
        Ok(body)
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<String, GatewayError> {
        self.send(self.client.post(self.url(endpoint)).json(body)).await
    }

    /// A success reply without usable text, JSON or not, is an empty response.
    fn reply_text(endpoint: &str, body: &str) -> Result<String, GatewayError> {
        let value: Value = serde_json::from_str(body).map_err(|err| {
            tracing::warn!(endpoint, error = %err, "success reply is not JSON");
            GatewayError::EmptyResponse
        })?;
        Reply::classify(&value).map(Reply::into_text)
    }
}

#[async_trait]
impl Gateway for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
        let body = self.send(self.client.get(self.url(MODELS_PATH))).await?;
        let response: ModelsResponse =
            serde_json::from_str(&body).map_err(|err| GatewayError::Backend {
                status: None,
                message: format!("Unexpected model listing: {err}"),
            })?;
        Ok(response.into_descriptors())
    }

    async fn chat(&self, model: &str, history: &[ChatMessage]) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model,
            messages: history,
            stream: false,
            extra: self.chat_extra(model),
        };
        tracing::debug!(model, messages = history.len(), "sending chat request");
        let body = self.post(CHAT_PATH, &request).await?;
        Self::reply_text(CHAT_PATH, &body)
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, GatewayError> {
        let body = CellContextRequest {
            model: &request.model,
            cell_content: &request.content_unit,
            cell_type: request.unit_kind.as_str(),
            question: &request.question,
        };
        tracing::debug!(model = %request.model, cell_type = body.cell_type, "sending cell analysis");
        let reply = self.post(CELL_CONTEXT_PATH, &body).await?;
        Self::reply_text(CELL_CONTEXT_PATH, &reply)
    }

    async fn embeddings(&self, model: &str, text: &str) -> Result<Vec<f32>, GatewayError> {
        let body = self.post(EMBEDDINGS_PATH, &EmbeddingsRequest { model, text }).await?;
        let response: EmbeddingsResponse =
            serde_json::from_str(&body).map_err(|_| GatewayError::EmptyResponse)?;
        if response.embeddings.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(response.embeddings)
    }
}
