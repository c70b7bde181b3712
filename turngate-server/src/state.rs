//! Shared application state for the tool server.

use std::sync::Arc;

use tokio::sync::broadcast;
use turngate::core::types::{DenyReason, Outcome};
use turngate::engine::Engine;

use crate::sessions::SessionRegistry;

/// Events broadcast to SSE clients as sessions progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    SessionStarted {
        session_id: String,
    },
    Invoked {
        session_id: String,
        operation: String,
        allowed: bool,
        reason: Option<DenyReason>,
        terminal: bool,
    },
    SessionEnded {
        session_id: String,
    },
}

impl EngineEvent {
    pub fn invoked(outcome: &Outcome) -> Self {
        Self::Invoked {
            session_id: outcome.session.id.clone(),
            operation: outcome.operation.clone(),
            allowed: outcome.allowed,
            reason: outcome.reason.clone(),
            terminal: outcome.terminal,
        }
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configured engine for the project directory.
    pub engine: Arc<Engine>,
    /// Live conversations by session id.
    pub sessions: SessionRegistry,
    /// Broadcast sender for session events.
    pub event_tx: Arc<broadcast::Sender<EngineEvent>>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            engine: Arc::new(engine),
            sessions: SessionRegistry::default(),
            event_tx: Arc::new(event_tx),
        }
    }

    /// Broadcast `event`; having no subscribers is fine.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }
}
