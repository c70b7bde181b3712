//! Orchestration for a single tool invocation.
//!
//! The controller is the only stateful piece of the engine: it resolves the
//! operation, asks the gate, runs the transition, writes the patched record
//! through to the store and only then commits the new session state.

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::core::args::arg_text;
use crate::core::gate;
use crate::core::session::Session;
use crate::core::transition::{self, Transition};
use crate::core::types::{DenyReason, Invocation, Outcome, RecordPatch, Verdict};
use crate::core::view::record_view;
use crate::io::record_store::{RecordStore, StoreError};
use crate::scenario::{Action, Operation, Scenario};

/// Drives invocations for every session of one scenario against one store.
///
/// `invoke` is synchronous and never fails: every problem is reported as a
/// denial inside the returned [`Outcome`].
#[derive(Debug)]
pub struct SessionController<S> {
    scenario: Scenario,
    store: S,
}

impl<S: RecordStore> SessionController<S> {
    pub fn new(scenario: Scenario, store: S) -> Self {
        Self { scenario, store }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn start_session(&self, id: impl Into<String>) -> Session {
        let session = Session::new(id);
        info!(session = session.id(), scenario = %self.scenario.name, "session started");
        session
    }

    /// End a conversation early. Later invocations are denied as terminated.
    pub fn abandon(&self, session: &mut Session, why: &str) {
        if !session.is_terminated() {
            warn!(session = session.id(), why, "session abandoned");
            session.terminate();
        }
    }

    /// Run one invocation end-to-end and report what happened.
    pub fn invoke(&self, session: &mut Session, invocation: &Invocation) -> Outcome {
        session.next_turn();
        debug!(
            session = session.id(),
            turn = session.turn(),
            operation = %invocation.operation,
            "invoke"
        );

        let Some(operation) = self.scenario.operation(&invocation.operation) else {
            return self.denied(
                session,
                &invocation.operation,
                DenyReason::UnknownOperation {
                    operation: invocation.operation.clone(),
                },
            );
        };

        let verdict = gate::evaluate(&self.scenario, operation, session, &invocation.args);
        let reason = match &verdict {
            Verdict::Allow => return self.run_allowed(session, operation, &invocation.args),
            Verdict::Deny(reason) | Verdict::Terminate(reason) => reason.clone(),
        };
        self.run_denied(session, operation, &verdict, reason)
    }

    fn run_allowed(
        &self,
        session: &mut Session,
        operation: &Operation,
        args: &Map<String, Value>,
    ) -> Outcome {
        if let Action::Lookup { key_arg } = &operation.action {
            return self.run_lookup(session, operation, key_arg, args);
        }

        let transition = match transition::apply(&self.scenario, operation, session, args) {
            Ok(transition) => transition,
            Err(err) => {
                return self.denied(
                    session,
                    &operation.name,
                    DenyReason::InvalidArguments {
                        message: err.to_string(),
                    },
                );
            }
        };

        match self.commit(session, transition) {
            Ok(patch) => {
                let payload = self.payload(session, operation);
                self.outcome(session, &operation.name, None, patch, payload)
            }
            Err(err) => self.store_failure(session, &operation.name, &err),
        }
    }

    fn run_lookup(
        &self,
        session: &mut Session,
        operation: &Operation,
        key_arg: &str,
        args: &Map<String, Value>,
    ) -> Outcome {
        let Some(key) = arg_text(args, key_arg) else {
            return self.denied(
                session,
                &operation.name,
                DenyReason::InvalidArguments {
                    message: format!("missing required argument '{key_arg}'"),
                },
            );
        };

        match self.store.find_by_key(&key) {
            Ok(Some(record)) => {
                *session = transition::begin_record(&self.scenario, operation, session, record);
                info!(
                    session = session.id(),
                    key = session.record_key().unwrap_or_default(),
                    phase = self.scenario.phase_name(session.phase()),
                    "record loaded"
                );
                let payload = self.payload(session, operation);
                self.outcome(session, &operation.name, None, None, payload)
            }
            Ok(None) => self.denied(session, &operation.name, DenyReason::NotFound { key }),
            Err(err) => self.store_failure(session, &operation.name, &err),
        }
    }

    fn run_denied(
        &self,
        session: &mut Session,
        operation: &Operation,
        verdict: &Verdict,
        reason: DenyReason,
    ) -> Outcome {
        if matches!(verdict, Verdict::Terminate(_)) {
            warn!(session = session.id(), operation = %operation.name, ?reason, "terminating session");
        } else {
            debug!(session = session.id(), operation = %operation.name, ?reason, "denied");
        }

        let transition = transition::apply_denial(&self.scenario, operation, session, verdict);
        match self.commit(session, transition) {
            Ok(patch) => self.outcome(session, &operation.name, Some(reason), patch, None),
            Err(err) => self.store_failure(session, &operation.name, &err),
        }
    }

    /// Persist the transition's patch, then adopt its session.
    ///
    /// On a store error `session` is left exactly as it was.
    fn commit(
        &self,
        session: &mut Session,
        mut transition: Transition,
    ) -> Result<Option<RecordPatch>, StoreError> {
        if transition.patch.is_some()
            && let Some(record) = transition.session.record_mut()
        {
            record.updated_at = Some(Utc::now().to_rfc3339());
            self.store.write_record(record)?;
            debug!(session = session.id(), key = %record.key, "record persisted");
        }
        *session = transition.session;
        Ok(transition.patch)
    }

    fn store_failure(&self, session: &mut Session, operation: &str, err: &StoreError) -> Outcome {
        warn!(session = session.id(), operation, error = %err, "record store unavailable");
        session.terminate();
        self.denied(
            session,
            operation,
            DenyReason::StoreUnavailable {
                message: err.to_string(),
            },
        )
    }

    fn payload(&self, session: &Session, operation: &Operation) -> Option<Value> {
        let record = session.record()?;
        match operation.action {
            Action::Verify { .. } => Some(json!({ "verified": session.is_verified() })),
            _ => Some(json!({
                "record": record_view(&self.scenario, record, session.access()),
            })),
        }
    }

    fn denied(&self, session: &Session, operation: &str, reason: DenyReason) -> Outcome {
        self.outcome(session, operation, Some(reason), None, None)
    }

    fn outcome(
        &self,
        session: &Session,
        operation: &str,
        reason: Option<DenyReason>,
        patch: Option<RecordPatch>,
        payload: Option<Value>,
    ) -> Outcome {
        let closed_record = patch
            .as_ref()
            .and_then(|patch| patch.status.as_deref())
            .is_some_and(|status| self.scenario.is_terminal_status(status));
        let terminal = reason.as_ref().is_some_and(DenyReason::is_terminal)
            || session.is_terminated()
            || closed_record;
        Outcome {
            operation: operation.to_string(),
            allowed: reason.is_none(),
            reason,
            session: session.snapshot(&self.scenario),
            patch,
            payload,
            terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AccessLevel;
    use crate::io::record_store::MemoryStore;
    use crate::test_support::{
        FailingStore, adventure_scenario, case_record, fraud_scenario, game_record,
    };

    fn fraud_controller() -> SessionController<MemoryStore> {
        SessionController::new(
            fraud_scenario(),
            MemoryStore::new(vec![
                case_record("C-100", "blue"),
                case_record("C-101", "lisbon"),
            ]),
        )
    }

    fn lookup(key: &str) -> Invocation {
        Invocation::new("lookup_case").arg("case_id", key)
    }

    fn verify(answer: &str) -> Invocation {
        Invocation::new("verify_identity").arg("answer", answer)
    }

    #[test]
    fn unknown_operation_is_denied_and_counts_a_turn() {
        let controller = fraud_controller();
        let mut session = controller.start_session("s-1");
        let outcome = controller.invoke(&mut session, &Invocation::new("transfer_funds"));
        assert!(!outcome.allowed);
        assert_eq!(
            outcome.reason,
            Some(DenyReason::UnknownOperation {
                operation: "transfer_funds".to_string()
            })
        );
        assert_eq!(outcome.session.turn, 1);
        assert!(!outcome.terminal);
    }

    #[test]
    fn lookup_miss_is_not_found_and_keeps_session_empty() {
        let controller = fraud_controller();
        let mut session = controller.start_session("s-1");
        let outcome = controller.invoke(&mut session, &lookup("C-999"));
        assert_eq!(
            outcome.reason,
            Some(DenyReason::NotFound {
                key: "C-999".to_string()
            })
        );
        assert!(session.record().is_none());

        let read = controller.invoke(&mut session, &Invocation::new("read_transaction"));
        assert_eq!(read.reason, Some(DenyReason::NoActiveRecord));
    }

    #[test]
    fn lookup_payload_hides_secret_and_sensitive_fields() {
        let controller = fraud_controller();
        let mut session = controller.start_session("s-1");
        let outcome = controller.invoke(&mut session, &lookup("c-100"));
        assert!(outcome.allowed);
        assert_eq!(outcome.session.phase, "verification");
        let fields = &outcome.payload.expect("payload")["record"]["fields"];
        assert!(fields.get("security_answer").is_none());
        assert!(fields.get("merchant").is_none());
        assert_eq!(fields["customer_name"], json!("Ava Patel"));
    }

    #[test]
    fn verify_then_mutate_persists_before_success() {
        let controller = fraud_controller();
        let mut session = controller.start_session("s-1");
        controller.invoke(&mut session, &lookup("C-100"));
        let verified = controller.invoke(&mut session, &verify("  Blue. "));
        assert!(verified.allowed);
        assert_eq!(verified.payload, Some(json!({ "verified": true })));
        assert_eq!(verified.session.access, AccessLevel::Verified);

        let marked = controller.invoke(&mut session, &Invocation::new("mark_safe"));
        assert!(marked.allowed);
        assert!(marked.terminal);
        let stored = controller
            .store()
            .find_by_key("C-100")
            .expect("find")
            .expect("record");
        assert_eq!(stored.status, "confirmed_safe");
        assert!(stored.updated_at.is_some());
        assert_eq!(session.record().expect("record"), &stored);
    }

    #[test]
    fn two_wrong_answers_terminate_with_failure_status() {
        let controller = fraud_controller();
        let mut session = controller.start_session("s-1");
        controller.invoke(&mut session, &lookup("C-100"));

        let first = controller.invoke(&mut session, &verify("red"));
        assert_eq!(
            first.reason,
            Some(DenyReason::IncorrectAnswer {
                attempts_remaining: 1
            })
        );
        assert!(first.patch.is_none());

        let second = controller.invoke(&mut session, &verify("green"));
        assert_eq!(
            second.reason,
            Some(DenyReason::CeilingReached { max_attempts: 2 })
        );
        assert!(second.terminal);
        assert_eq!(
            second.patch.and_then(|patch| patch.status).as_deref(),
            Some("verification_failed")
        );
        let stored = controller
            .store()
            .find_by_key("C-100")
            .expect("find")
            .expect("record");
        assert_eq!(stored.status, "verification_failed");

        let after = controller.invoke(&mut session, &verify("blue"));
        assert_eq!(after.reason, Some(DenyReason::SessionTerminated));
        assert!(after.terminal);
    }

    #[test]
    fn store_failure_terminates_and_leaves_record_untouched() {
        let store = FailingStore::new(MemoryStore::new(vec![case_record("C-100", "blue")]));
        let controller = SessionController::new(fraud_scenario(), store);
        let mut session = controller.start_session("s-1");
        controller.invoke(&mut session, &lookup("C-100"));
        controller.invoke(&mut session, &verify("blue"));
        let before = session.record().cloned();

        controller.store().fail_writes(true);
        let outcome = controller.invoke(&mut session, &Invocation::new("mark_safe"));
        assert!(matches!(
            outcome.reason,
            Some(DenyReason::StoreUnavailable { .. })
        ));
        assert!(outcome.terminal);
        assert!(outcome.patch.is_none());
        assert!(session.is_terminated());
        assert_eq!(session.record().cloned(), before);
    }

    #[test]
    fn abandon_terminates_later_invocations() {
        let controller = fraud_controller();
        let mut session = controller.start_session("s-1");
        controller.abandon(&mut session, "caller hung up");
        let outcome = controller.invoke(&mut session, &lookup("C-100"));
        assert_eq!(outcome.reason, Some(DenyReason::SessionTerminated));
        assert!(outcome.terminal);
    }

    #[test]
    fn adventure_mutations_return_updated_view() {
        let controller = SessionController::new(
            adventure_scenario(),
            MemoryStore::new(vec![game_record("Aria")]),
        );
        let mut session = controller.start_session("s-1");
        controller.invoke(
            &mut session,
            &Invocation::new("load_game").arg("player_name", "aria"),
        );
        let moved = controller.invoke(
            &mut session,
            &Invocation::new("move_to").arg("location", "Whispering Woods"),
        );
        assert!(moved.allowed);
        assert_eq!(
            moved.payload.expect("payload")["record"]["fields"]["location"],
            json!("Whispering Woods")
        );
        let stored = controller
            .store()
            .find_by_key("Aria")
            .expect("find")
            .expect("record");
        assert_eq!(stored.fields["location"], json!("Whispering Woods"));
    }
}
