//! Registry of live sessions and the timed invocation path.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, so invocations on
//! one conversation are serialized while different conversations run
//! concurrently. The controller is synchronous, so every invocation runs on
//! the blocking pool under the configured persistence timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, warn};
use turngate::core::session::Session;
use turngate::core::types::{DenyReason, Invocation, Outcome, SessionSnapshot};
use turngate::engine::Engine;

/// One live conversation.
#[derive(Debug)]
pub struct SessionSlot {
    session: Arc<Mutex<Session>>,
    /// Set when an invocation outlived the timeout; the next holder of the
    /// lock terminates the session.
    timed_out: AtomicBool,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            timed_out: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self, engine: &Engine) -> SessionSnapshot {
        let session = self.session.lock().await;
        session.snapshot(engine.controller().scenario())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(String),
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    slots: Arc<Mutex<HashMap<String, Arc<SessionSlot>>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    /// Start a session under `id`, or a generated id when `None`.
    pub async fn create(
        &self,
        engine: &Engine,
        id: Option<String>,
    ) -> Result<Arc<SessionSlot>, RegistryError> {
        let mut slots = self.slots.lock().await;
        let id = match id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => loop {
                let candidate = format!("s-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                if !slots.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        if slots.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        let slot = Arc::new(SessionSlot::new(
            engine.controller().start_session(id.clone()),
        ));
        slots.insert(id, Arc::clone(&slot));
        Ok(slot)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionSlot>> {
        self.slots.lock().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<SessionSlot>> {
        self.slots.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

/// Run `invocation` against the session in `slot`.
///
/// Returns `None` only if the blocking task panicked. A timeout yields a
/// terminal `StoreUnavailable` outcome and dooms the session. The transcript
/// records whichever outcome the caller receives.
pub async fn invoke(
    engine: Arc<Engine>,
    slot: Arc<SessionSlot>,
    invocation: Invocation,
) -> Option<Outcome> {
    let mut session = Arc::clone(&slot.session).lock_owned().await;
    if slot.timed_out.load(Ordering::SeqCst) {
        engine
            .controller()
            .abandon(&mut session, "earlier invocation timed out");
    }

    let before = session.snapshot(engine.controller().scenario());
    let timeout_ms = engine.config().persist_timeout_ms;
    let operation = invocation.operation.clone();

    let task_engine = Arc::clone(&engine);
    let settled = run_settled(
        Duration::from_millis(timeout_ms),
        move || task_engine.controller().invoke(&mut session, &invocation),
        {
            let engine = Arc::clone(&engine);
            move |outcome: &Outcome| {
                engine.record_transcript(outcome);
            }
        },
    )
    .await;

    match settled {
        Settled::Finished(Ok(outcome)) => {
            debug!(session = %outcome.session.id, operation = %outcome.operation, allowed = outcome.allowed, "invoked");
            Some(outcome)
        }
        Settled::Finished(Err(err)) => {
            warn!(session = %before.id, operation = %operation, error = %err, "invocation task failed");
            None
        }
        Settled::TimedOut => {
            warn!(session = %before.id, operation = %operation, timeout_ms, "invocation timed out");
            slot.timed_out.store(true, Ordering::SeqCst);
            let outcome = timed_out(before, operation, timeout_ms);
            let entry = outcome.clone();
            let _ = tokio::task::spawn_blocking(move || engine.record_transcript(&entry));
            Some(outcome)
        }
    }
}

enum Settled<T> {
    Finished(Result<T, JoinError>),
    TimedOut,
}

/// Run `work` on the blocking pool under `limit`.
///
/// `on_finish` runs on the blocking thread only when `work` completes before
/// the deadline is declared; a result that arrives later is dropped without
/// calling it. Exactly one of the two sides claims the outcome.
async fn run_settled<T, W, F>(limit: Duration, work: W, on_finish: F) -> Settled<T>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
    F: FnOnce(&T) + Send + 'static,
{
    let claimed = Arc::new(AtomicBool::new(false));
    let task_claimed = Arc::clone(&claimed);
    let mut task = tokio::task::spawn_blocking(move || {
        let result = work();
        if !task_claimed.swap(true, Ordering::SeqCst) {
            on_finish(&result);
        }
        result
    });

    match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => Settled::Finished(joined),
        // Finished right at the deadline; its result stands.
        Err(_) if claimed.swap(true, Ordering::SeqCst) => Settled::Finished(task.await),
        Err(_) => Settled::TimedOut,
    }
}

fn timed_out(mut session: SessionSnapshot, operation: String, timeout_ms: u64) -> Outcome {
    session.turn = session.turn.saturating_add(1);
    session.terminated = true;
    Outcome {
        operation,
        allowed: false,
        reason: Some(DenyReason::StoreUnavailable {
            message: format!("persistence did not finish within {timeout_ms} ms"),
        }),
        session,
        patch: None,
        payload: None,
        terminal: true,
    }
}
