pub mod ai;
pub mod analysis;
pub mod config;
pub mod conversation;
pub mod error;
pub mod intent;
pub mod models;
pub mod placement;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use ai::{Gateway, GatewayConfig, OllamaClient};
pub use analysis::{AnalysisHandle, AnalysisRequest, AnalysisResult, CellAnalyzer, Outcome, UnitKind};
pub use config::Config;
pub use conversation::{Conversation, ConversationEvent, ConversationState, PendingExchange, SYSTEM_PREAMBLE};
pub use error::{DispatchError, GatewayError, SubmitError};
pub use intent::{Cell, Intent, IntentDispatcher, Question};
pub use models::{ModelDescriptor, ModelRegistry, RegistrySnapshot};
pub use placement::{place_menu, Point, Rect, Size};
pub use state::{ChatMessage, ChatRole, Turn, TurnId, TurnStatus};
