//! Maps user intents on a cell to analysis requests.

use std::sync::Arc;

use crate::analysis::{AnalysisHandle, AnalysisRequest, CellAnalyzer, UnitKind};
use crate::error::DispatchError;
use crate::models::ModelRegistry;

/// The predefined questions offered in a cell's menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Question {
    Explain,
    Optimize,
    FindBugs,
    Overview,
}

impl Question {
    pub fn as_str(&self) -> &'static str {
        match self {
            Question::Explain => "explain",
            Question::Optimize => "optimize",
            Question::FindBugs => "find-bugs",
            Question::Overview => "overview",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "explain" => Some(Question::Explain),
            "optimize" => Some(Question::Optimize),
            "find-bugs" | "bugs" => Some(Question::FindBugs),
            "overview" => Some(Question::Overview),
            _ => None,
        }
    }

    pub fn all() -> Vec<Question> {
        vec![
            Question::Explain,
            Question::Optimize,
            Question::FindBugs,
            Question::Overview,
        ]
    }

    /// Menu label.
    pub fn display_name(&self) -> &'static str {
        match self {
            Question::Explain => "Explain this code",
            Question::Optimize => "Optimize this code",
            Question::FindBugs => "Find bugs",
            Question::Overview => "What does this do?",
        }
    }

    /// Question text sent to the backend.
    pub fn prompt(&self) -> &'static str {
        match self {
            Question::Explain => "Explain this code",
            Question::Optimize => "Optimize this code",
            Question::FindBugs => "Find bugs in this code",
            Question::Overview => "What does this do?",
        }
    }
}

/// What the user picked for a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Predefined(Question),
    FreeText(String),
}

impl Intent {
    pub fn question_text(&self) -> &str {
        match self {
            Intent::Predefined(question) => question.prompt(),
            Intent::FreeText(text) => text.trim(),
        }
    }
}

/// A notebook cell as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub content: String,
    pub kind: UnitKind,
}

impl Cell {
    pub fn new(content: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }
}

pub struct IntentDispatcher {
    analyzer: CellAnalyzer,
    registry: Arc<ModelRegistry>,
}

impl IntentDispatcher {
    pub fn new(analyzer: CellAnalyzer, registry: Arc<ModelRegistry>) -> Self {
        Self { analyzer, registry }
    }

    /// Builds the request for `intent` using the currently selected model.
    pub fn request_for(&self, cell: &Cell, intent: &Intent) -> Result<AnalysisRequest, DispatchError> {
        if cell.content.trim().is_empty() {
            return Err(DispatchError::EmptyCell);
        }
        let question = intent.question_text();
        if question.is_empty() {
            return Err(DispatchError::EmptyQuestion);
        }
        let model = self.registry.current().ok_or(DispatchError::NoModelSelected)?;

        Ok(AnalysisRequest {
            content_unit: cell.content.clone(),
            unit_kind: cell.kind,
            question: question.to_string(),
            model,
        })
    }

    /// Issues exactly one analysis for `intent`.
    pub fn dispatch(&self, cell: &Cell, intent: &Intent) -> Result<AnalysisHandle, DispatchError> {
        let request = self.request_for(cell, intent)?;
        tracing::debug!(question = %request.question, kind = request.unit_kind.as_str(), "dispatching cell intent");
        Ok(self.analyzer.spawn(request))
    }
}
