//! One-shot questions about a single notebook cell.
//!
//! Each analysis is independent: it shares nothing mutable with the chat
//! transcript or with other analyses, starts `Pending` and settles exactly once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::ai::Gateway;
use crate::error::GatewayError;

/// Kind of cell content being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Code,
    Markdown,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Code => "code",
            UnitKind::Markdown => "markdown",
        }
    }

    /// Anything that is not a code cell is analyzed as markdown.
    pub fn from_cell_type(cell_type: &str) -> Self {
        if cell_type.eq_ignore_ascii_case("code") {
            UnitKind::Code
        } else {
            UnitKind::Markdown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub content_unit: String,
    pub unit_kind: UnitKind,
    pub question: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Text(String),
    Error(GatewayError),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub request: AnalysisRequest,
    pub outcome: Outcome,
}

impl AnalysisResult {
    fn pending(request: AnalysisRequest) -> Self {
        Self {
            request,
            outcome: Outcome::Pending,
        }
    }

    /// Text to show for this result: the answer, a loading marker, or a short
    /// error message.
    pub fn display_text(&self) -> String {
        match &self.outcome {
            Outcome::Pending => "Loading...".to_string(),
            Outcome::Text(text) => text.clone(),
            Outcome::Error(err) => err.user_message(),
        }
    }
}

/// Observes one spawned analysis.
///
/// Dropping the handle discards the result; the request itself keeps running.
pub struct AnalysisHandle {
    rx: watch::Receiver<AnalysisResult>,
}

impl AnalysisHandle {
    pub fn current(&self) -> AnalysisResult {
        self.rx.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.rx.borrow().outcome.is_pending()
    }

    /// Waits for the terminal result.
    pub async fn finished(mut self) -> AnalysisResult {
        loop {
            {
                let result = self.rx.borrow_and_update();
                if !result.outcome.is_pending() {
                    return result.clone();
                }
            }
            if self.rx.changed().await.is_err() {
                // task ended without settling (panicked or runtime shut down)
                let mut result = self.rx.borrow().clone();
                if result.outcome.is_pending() {
                    result.outcome = Outcome::Error(GatewayError::Backend {
                        status: None,
                        message: "Analysis ended before a response arrived".to_string(),
                    });
                }
                return result;
            }
        }
    }
}

/// Issues cell analyses through the shared gateway.
#[derive(Clone)]
pub struct CellAnalyzer {
    gateway: Arc<dyn Gateway>,
}

impl CellAnalyzer {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Runs one analysis to completion. Failures become `Outcome::Error`.
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        let outcome = match self.gateway.analyze(&request).await {
            Ok(text) => Outcome::Text(text),
            Err(err) => {
                tracing::warn!(model = %request.model, error = %err, "cell analysis failed");
                Outcome::Error(err)
            }
        };
        AnalysisResult { request, outcome }
    }

    /// Starts an analysis on the runtime and returns a handle that reports
    /// `Pending` until it settles.
    pub fn spawn(&self, request: AnalysisRequest) -> AnalysisHandle {
        let (tx, rx) = watch::channel(AnalysisResult::pending(request.clone()));
        let analyzer = self.clone();
        tokio::spawn(async move {
            let result = analyzer.analyze(request).await;
            // nobody may be watching any more
            let _ = tx.send(result);
        });
        AnalysisHandle { rx }
    }
}
