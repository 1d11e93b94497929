//! Multi-turn chat transcript and its request/response lifecycle.
//!
//! A conversation is either idle or awaiting exactly one response. Submitting
//! appends the user's turn plus a pending assistant placeholder; the gateway's
//! answer (or failure) later settles that same placeholder in place. A
//! completion whose placeholder is no longer the pending turn (because the
//! transcript was cleared meanwhile) is dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::ai::Gateway;
use crate::error::{GatewayError, SubmitError};
use crate::models::ModelRegistry;
use crate::state::{ChatMessage, ChatRole, Turn, TurnId, TurnStatus};

/// Prepended to every chat request; never stored in the transcript.
pub const SYSTEM_PREAMBLE: &str =
    "You are an AI assistant helping with Jupyter notebooks. Be concise and helpful.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingResponse,
}

/// Change notifications for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    TurnAppended(Turn),
    /// A pending turn reached its terminal status.
    TurnUpdated(Turn),
    Cleared,
}

/// An exchange accepted by [`Conversation::begin`] whose response is outstanding.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    turn_id: TurnId,
    model: String,
    history: Vec<ChatMessage>,
}

impl PendingExchange {
    /// Id of the assistant placeholder this exchange will settle.
    pub fn turn_id(&self) -> &TurnId {
        &self.turn_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Messages to send, preamble first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

pub struct Conversation {
    gateway: Arc<dyn Gateway>,
    registry: Arc<ModelRegistry>,
    preamble: String,
    response_timeout: Option<Duration>,
    transcript: Mutex<Vec<Turn>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConversationEvent>>>,
}

impl Conversation {
    pub fn new(gateway: Arc<dyn Gateway>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            gateway,
            registry,
            preamble: SYSTEM_PREAMBLE.to_string(),
            response_timeout: None,
            transcript: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Settles the exchange as [`GatewayError::Timeout`] if the gateway has
    /// not answered within `limit`.
    pub fn with_response_timeout(mut self, limit: Duration) -> Self {
        self.response_timeout = Some(limit);
        self
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn state(&self) -> ConversationState {
        if self.transcript.lock().iter().any(Turn::is_pending) {
            ConversationState::AwaitingResponse
        } else {
            ConversationState::Idle
        }
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.transcript.lock().clone()
    }

    pub fn pending_turn(&self) -> Option<Turn> {
        self.transcript.lock().iter().find(|t| t.is_pending()).cloned()
    }

    /// Sends `text` and waits for the exchange to settle.
    ///
    /// Returns the settled assistant turn, or `None` if the exchange was
    /// abandoned before its response arrived. Gateway failures settle the
    /// turn as errored and are not returned as `Err`.
    pub async fn submit(&self, text: &str) -> Result<Option<Turn>, SubmitError> {
        let exchange = self.begin(text)?;
        let mut guard = AbandonGuard {
            conversation: self,
            exchange: Some(&exchange),
        };

        let call = self.gateway.chat(&exchange.model, &exchange.history);
        let result = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(GatewayError::Timeout(limit))),
            None => call.await,
        };

        guard.exchange = None;
        Ok(self.complete(&exchange, result))
    }

    /// Idle → AwaitingResponse: appends the user turn and the pending
    /// placeholder, and returns what must be sent to the gateway.
    pub fn begin(&self, text: &str) -> Result<PendingExchange, SubmitError> {
        if text.trim().is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        let model = self.registry.current().ok_or(SubmitError::NoModelSelected)?;

        let mut transcript = self.transcript.lock();
        if transcript.iter().any(Turn::is_pending) {
            return Err(SubmitError::Busy);
        }

        let user = Turn::user(text);
        let placeholder = Turn::pending_assistant();

        let mut history = Vec::with_capacity(transcript.len() + 2);
        history.push(ChatMessage::new(ChatRole::System, self.preamble.clone()));
        history.extend(
            transcript
                .iter()
                .chain(std::iter::once(&user))
                .filter(|t| t.role() != ChatRole::System)
                .map(Turn::to_message),
        );

        let exchange = PendingExchange {
            turn_id: placeholder.id().clone(),
            model,
            history,
        };

        tracing::debug!(turn = %exchange.turn_id, model = %exchange.model, "chat exchange started");
        transcript.push(user.clone());
        transcript.push(placeholder.clone());
        self.emit(ConversationEvent::TurnAppended(user));
        self.emit(ConversationEvent::TurnAppended(placeholder));

        Ok(exchange)
    }

    /// AwaitingResponse → Idle: settles the exchange's placeholder in place.
    ///
    /// Returns `None` without touching the transcript when the placeholder is
    /// no longer the pending turn.
    pub fn complete(
        &self,
        exchange: &PendingExchange,
        result: Result<String, GatewayError>,
    ) -> Option<Turn> {
        let mut transcript = self.transcript.lock();

        let Some(turn) = transcript
            .iter_mut()
            .rev()
            .find(|t| t.is_pending() && t.id() == &exchange.turn_id)
        else {
            tracing::warn!(turn = %exchange.turn_id, "dropping response for a superseded exchange");
            return None;
        };

        let (status, content) = match result {
            Ok(text) => (TurnStatus::Resolved, text),
            Err(err) => {
                tracing::warn!(turn = %exchange.turn_id, error = %err, "chat exchange failed");
                (TurnStatus::Errored, err.user_message())
            }
        };
        turn.settle(status, content);
        let settled = turn.clone();

        tracing::debug!(turn = %settled.id(), status = ?settled.status(), "chat exchange settled");
        self.emit(ConversationEvent::TurnUpdated(settled.clone()));
        Some(settled)
    }

    /// Appends an informational system turn. System turns are shown but never
    /// sent to the backend.
    pub fn add_system_note(&self, text: impl Into<String>) -> Turn {
        let note = Turn::system(text);
        self.transcript.lock().push(note.clone());
        self.emit(ConversationEvent::TurnAppended(note.clone()));
        note
    }

    /// Empties the transcript. A pending exchange is abandoned and its
    /// eventual response is dropped.
    pub fn clear(&self) {
        let mut transcript = self.transcript.lock();
        if transcript.iter().any(Turn::is_pending) {
            tracing::debug!("clearing conversation with a pending exchange");
        }
        transcript.clear();
        self.emit(ConversationEvent::Cleared);
    }

    fn emit(&self, event: ConversationEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Settles the placeholder of a `submit` whose future was dropped mid-flight.
struct AbandonGuard<'a> {
    conversation: &'a Conversation,
    exchange: Option<&'a PendingExchange>,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            self.conversation.complete(
                exchange,
                Err(GatewayError::Backend {
                    status: None,
                    message: "Request cancelled".to_string(),
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelDescriptor;
    use crate::state::PENDING_PLACEHOLDER;
    use crate::test_support::ScriptedGateway;

    fn setup(gateway: ScriptedGateway) -> (Arc<ScriptedGateway>, Arc<Conversation>) {
        let gateway = Arc::new(gateway);
        let registry = Arc::new(ModelRegistry::new(gateway.clone()));
        registry.select("llama3.2");
        let conversation = Arc::new(Conversation::new(gateway.clone(), registry));
        (gateway, conversation)
    }

    fn pending_count(conversation: &Conversation) -> usize {
        conversation.transcript().iter().filter(|t| t.is_pending()).count()
    }

    async fn next_appended(rx: &mut mpsc::UnboundedReceiver<ConversationEvent>) -> Turn {
        match rx.recv().await {
            Some(ConversationEvent::TurnAppended(turn)) => turn,
            other => panic!("expected TurnAppended, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_resolves_into_two_turns() {
        let (gateway, conversation) = setup(ScriptedGateway::new());
        gateway.push_reply(Ok("hello".into()));

        let settled = conversation.submit("hi").await.unwrap().unwrap();

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role(), ChatRole::User);
        assert_eq!(transcript[0].content(), "hi");
        assert_eq!(transcript[1].role(), ChatRole::Assistant);
        assert_eq!(transcript[1].content(), "hello");
        assert_eq!(transcript[1].status(), TurnStatus::Resolved);
        assert_eq!(settled, transcript[1]);
        assert_eq!(conversation.state(), ConversationState::Idle);
    }

    #[tokio::test]
    async fn placeholder_is_settled_in_place() {
        let (gateway, conversation) = setup(ScriptedGateway::gated());
        gateway.push_reply(Ok("hello".into()));
        let mut events = conversation.subscribe();

        let task = {
            let conversation = conversation.clone();
            tokio::spawn(async move { conversation.submit("hi").await })
        };

        let user = next_appended(&mut events).await;
        let placeholder = next_appended(&mut events).await;
        assert_eq!(user.content(), "hi");
        assert!(placeholder.is_pending());
        assert_eq!(placeholder.content(), PENDING_PLACEHOLDER);
        assert_eq!(conversation.state(), ConversationState::AwaitingResponse);
        assert_eq!(pending_count(&conversation), 1);

        gateway.release(1);
        task.await.unwrap().unwrap();

        match events.recv().await {
            Some(ConversationEvent::TurnUpdated(turn)) => {
                assert_eq!(turn.id(), placeholder.id());
                assert_eq!(turn.content(), "hello");
            }
            other => panic!("expected TurnUpdated, got {other:?}"),
        }
        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].id(), placeholder.id());
    }

    #[tokio::test]
    async fn submit_while_pending_is_rejected() {
        let (gateway, conversation) = setup(ScriptedGateway::gated());
        let mut events = conversation.subscribe();

        let task = {
            let conversation = conversation.clone();
            tokio::spawn(async move { conversation.submit("first").await })
        };
        next_appended(&mut events).await;
        next_appended(&mut events).await;

        assert_eq!(conversation.submit("second").await, Err(SubmitError::Busy));
        assert_eq!(conversation.transcript().len(), 2);
        assert_eq!(gateway.chat_calls().len(), 1);

        gateway.release(1);
        task.await.unwrap().unwrap();
        assert_eq!(conversation.state(), ConversationState::Idle);
        gateway.release(1);
        assert!(conversation.submit("second").await.is_ok());
        assert_eq!(conversation.transcript().len(), 4);
    }

    #[tokio::test]
    async fn gateway_failure_settles_as_errored() {
        let (gateway, conversation) = setup(ScriptedGateway::new());
        gateway.push_reply(Err(GatewayError::Unreachable("connection refused".into())));

        let settled = conversation.submit("hi").await.unwrap().unwrap();

        assert_eq!(settled.status(), TurnStatus::Errored);
        assert!(!settled.content().is_empty());
        assert_ne!(settled.content(), PENDING_PLACEHOLDER);
        assert_eq!(conversation.state(), ConversationState::Idle);
        assert_eq!(conversation.transcript().len(), 2);
    }

    #[tokio::test]
    async fn sequential_submits_never_hold_two_pending_turns() {
        let (_gateway, conversation) = setup(ScriptedGateway::new());

        for i in 0..5 {
            let exchange = conversation.begin(&format!("question {i}")).unwrap();
            assert_eq!(pending_count(&conversation), 1);
            assert_eq!(conversation.begin("too soon").unwrap_err(), SubmitError::Busy);
            conversation.complete(&exchange, Ok(format!("answer {i}")));
            assert_eq!(pending_count(&conversation), 0);
        }
        assert_eq!(conversation.transcript().len(), 10);
    }

    #[tokio::test]
    async fn history_has_preamble_and_skips_system_turns() {
        let (gateway, conversation) = setup(ScriptedGateway::new());
        gateway.push_reply(Ok("hello".into()));
        gateway.push_reply(Ok("fine".into()));

        conversation.submit("hi").await.unwrap();
        conversation.add_system_note("Model switched to llama3.2");
        conversation.submit("how are you?").await.unwrap();

        let calls = gateway.chat_calls();
        assert_eq!(calls.len(), 2);
        let (model, history) = &calls[1];
        assert_eq!(model, "llama3.2");
        assert_eq!(
            history,
            &vec![
                ChatMessage::new(ChatRole::System, SYSTEM_PREAMBLE),
                ChatMessage::new(ChatRole::User, "hi"),
                ChatMessage::new(ChatRole::Assistant, "hello"),
                ChatMessage::new(ChatRole::User, "how are you?"),
            ]
        );
        // the note stays visible in the transcript
        assert_eq!(conversation.transcript().len(), 5);
    }

    #[tokio::test]
    async fn late_response_after_clear_is_dropped() {
        let (_gateway, conversation) = setup(ScriptedGateway::new());
        let mut events = conversation.subscribe();

        let exchange = conversation.begin("hi").unwrap();
        conversation.clear();
        assert_eq!(conversation.state(), ConversationState::Idle);

        assert_eq!(conversation.complete(&exchange, Ok("late".into())), None);
        assert!(conversation.transcript().is_empty());

        next_appended(&mut events).await;
        next_appended(&mut events).await;
        assert_eq!(events.recv().await, Some(ConversationEvent::Cleared));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_exchange_cannot_settle_a_newer_placeholder() {
        let (_gateway, conversation) = setup(ScriptedGateway::new());

        let old = conversation.begin("first").unwrap();
        conversation.clear();
        let current = conversation.begin("second").unwrap();

        assert_eq!(conversation.complete(&old, Ok("stale".into())), None);
        assert!(conversation.pending_turn().is_some());

        let settled = conversation.complete(&current, Ok("fresh".into())).unwrap();
        assert_eq!(settled.id(), current.turn_id());
        assert_eq!(conversation.transcript()[1].content(), "fresh");
    }

    #[tokio::test]
    async fn completing_twice_does_not_duplicate() {
        let (_gateway, conversation) = setup(ScriptedGateway::new());

        let exchange = conversation.begin("hi").unwrap();
        assert!(conversation.complete(&exchange, Ok("hello".into())).is_some());
        assert_eq!(conversation.complete(&exchange, Err(GatewayError::EmptyResponse)), None);

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content(), "hello");
    }

    #[tokio::test]
    async fn rejects_blank_messages_and_missing_model() {
        let (_gateway, conversation) = setup(ScriptedGateway::new());
        assert_eq!(conversation.submit("   ").await, Err(SubmitError::EmptyMessage));

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_models(Ok(Vec::<ModelDescriptor>::new()));
        let registry = Arc::new(ModelRegistry::new(gateway.clone()));
        registry.refresh().await.unwrap();
        let conversation = Conversation::new(gateway, registry);
        assert_eq!(conversation.submit("hi").await, Err(SubmitError::NoModelSelected));
        assert!(conversation.transcript().is_empty());
    }

    #[tokio::test]
    async fn dropped_submit_settles_its_placeholder() {
        let (gateway, conversation) = setup(ScriptedGateway::gated());

        let abandoned = tokio::time::timeout(Duration::from_millis(20), conversation.submit("hi")).await;
        assert!(abandoned.is_err());

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].status(), TurnStatus::Errored);
        assert_eq!(transcript[1].content(), "Error: Request cancelled");
        assert_eq!(conversation.state(), ConversationState::Idle);

        gateway.release(1);
        let settled = conversation.submit("again").await.unwrap().unwrap();
        assert_eq!(settled.status(), TurnStatus::Resolved);
    }

    #[tokio::test]
    async fn hung_backend_times_out() {
        let gateway = Arc::new(ScriptedGateway::gated());
        let registry = Arc::new(ModelRegistry::new(gateway.clone()));
        registry.select("llama3.2");
        let conversation = Conversation::new(gateway, registry)
            .with_response_timeout(Duration::from_millis(50));

        let settled = conversation.submit("hi").await.unwrap().unwrap();
        assert_eq!(settled.status(), TurnStatus::Errored);
        assert_eq!(settled.content(), GatewayError::Timeout(Duration::from_millis(50)).user_message());
        assert_eq!(conversation.state(), ConversationState::Idle);
    }
}
