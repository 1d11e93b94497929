//! Scripted gateway for exercising the state machines without a server.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::ai::Gateway;
use crate::analysis::AnalysisRequest;
use crate::error::GatewayError;
use crate::models::ModelDescriptor;
use crate::state::{ChatMessage, ChatRole};

/// Replies come from queues; with an empty queue chat echoes the last user
/// message and analysis echoes the question.
///
/// A gated gateway holds every listing, chat and analyze call until [`release`](Self::release)
/// hands out a permit, so tests can observe in-flight state.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    models: Mutex<VecDeque<Result<Vec<ModelDescriptor>, GatewayError>>>,
    replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    chat_calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    analyze_calls: Mutex<Vec<AnalysisRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn push_models(&self, result: Result<Vec<ModelDescriptor>, GatewayError>) {
        self.models.lock().push_back(result);
    }

    pub fn push_reply(&self, result: Result<String, GatewayError>) {
        self.replies.lock().push_back(result);
    }

    /// Lets `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn chat_calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.chat_calls.lock().clone()
    }

    pub fn analyze_calls(&self) -> Vec<AnalysisRequest> {
        self.analyze_calls.lock().clone()
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
        self.wait_for_gate().await;
        self.models.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn chat(&self, model: &str, history: &[ChatMessage]) -> Result<String, GatewayError> {
        self.chat_calls.lock().push((model.to_string(), history.to_vec()));
        self.wait_for_gate().await;
        let scripted = self.replies.lock().pop_front();
        scripted.unwrap_or_else(|| {
            let last = history
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            Ok(format!("echo: {last}"))
        })
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, GatewayError> {
        self.analyze_calls.lock().push(request.clone());
        self.wait_for_gate().await;
        let scripted = self.replies.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("re: {}", request.question)))
    }

    async fn embeddings(&self, _model: &str, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(vec![text.len() as f32])
    }
}
