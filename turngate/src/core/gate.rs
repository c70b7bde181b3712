//! Gate evaluation: may this operation run against this session?
//!
//! Pure function of the scenario, the operation's gate rule, the session and
//! the invocation arguments. Lookups that need the store (`NotFound`) are the
//! controller's concern; everything decidable from in-memory state is here.

use serde_json::{Map, Value};

use crate::core::args::{arg_text, check_args};
use crate::core::normalize::{answers_match, normalize_key};
use crate::core::session::Session;
use crate::core::types::{DenyReason, Verdict};
use crate::scenario::{Action, KeySwitchPolicy, Operation, Scenario};

/// Decide ALLOW / DENY / TERMINATE for `operation` given the session state.
///
/// Checks run in a fixed order: session alive, record loaded, arguments,
/// terminal record, access level, phase, then action-specific rules.
pub fn evaluate(
    scenario: &Scenario,
    operation: &Operation,
    session: &Session,
    args: &Map<String, Value>,
) -> Verdict {
    if session.is_terminated() {
        return Verdict::Deny(DenyReason::SessionTerminated);
    }

    let record = session.record();
    if operation.requires_record() && record.is_none() {
        return Verdict::Deny(DenyReason::NoActiveRecord);
    }

    let arg_errors = check_args(operation, args);
    if !arg_errors.is_empty() {
        return invalid(arg_errors.join("; "));
    }

    if operation.guards_terminal_record()
        && let Some(record) = record
        && scenario.is_terminal_status(&record.status)
    {
        return Verdict::Deny(DenyReason::RecordClosed {
            status: record.status.clone(),
        });
    }

    if session.access() < operation.gate.min_access {
        return Verdict::Deny(DenyReason::InsufficientAccess {
            required: operation.gate.min_access,
        });
    }

    if let Some(required) = &operation.gate.min_phase
        && let Some(required_index) = scenario.phase_index(required)
        && session.phase() < required_index
    {
        return Verdict::Deny(DenyReason::PhaseNotReached {
            required: scenario.phase_name(required_index).to_string(),
            current: scenario.phase_name(session.phase()).to_string(),
        });
    }

    match &operation.action {
        Action::Lookup { key_arg } => evaluate_lookup(scenario, session, args, key_arg),
        Action::Verify { answer_arg } => {
            evaluate_verify(scenario, operation, session, args, answer_arg)
        }
        Action::Disclose => Verdict::Allow,
        Action::Mutate(mutate) => match &mutate.status_arg {
            Some(status_arg) => {
                let status = arg_text(args, status_arg).unwrap_or_default();
                if scenario.resolve_status(&status).is_some() {
                    Verdict::Allow
                } else {
                    invalid(format!(
                        "'{}' is not a known status (expected one of: {})",
                        status,
                        scenario.statuses.join(", ")
                    ))
                }
            }
            None => Verdict::Allow,
        },
        Action::Advance { phase_arg } => evaluate_advance(scenario, session, args, phase_arg),
    }
}

fn evaluate_lookup(
    scenario: &Scenario,
    session: &Session,
    args: &Map<String, Value>,
    key_arg: &str,
) -> Verdict {
    let key = arg_text(args, key_arg).unwrap_or_default();
    if !scenario.key_is_well_formed(&key) {
        return invalid(format!("'{}' is not a well-formed key", key));
    }
    if let Some(active) = session.record_key()
        && normalize_key(active) != normalize_key(&key)
        && scenario.on_key_switch == KeySwitchPolicy::Deny
    {
        return Verdict::Deny(DenyReason::KeySwitchDenied {
            active: active.to_string(),
        });
    }
    Verdict::Allow
}

fn evaluate_verify(
    scenario: &Scenario,
    operation: &Operation,
    session: &Session,
    args: &Map<String, Value>,
    answer_arg: &str,
) -> Verdict {
    if session.is_verified() {
        return Verdict::Allow;
    }

    let max_attempts = scenario.ceiling_for(operation);
    if session.attempts() >= max_attempts {
        return Verdict::Terminate(DenyReason::CeilingReached { max_attempts });
    }

    let expected = session
        .record()
        .zip(scenario.secret_field.as_deref())
        .and_then(|(record, field)| record.fields.get(field))
        .and_then(secret_text)
        .unwrap_or_default();
    let given = arg_text(args, answer_arg).unwrap_or_default();
    if answers_match(&expected, &given) {
        return Verdict::Allow;
    }

    let spent = session.attempts() + 1;
    if spent >= max_attempts {
        Verdict::Terminate(DenyReason::CeilingReached { max_attempts })
    } else {
        Verdict::Deny(DenyReason::IncorrectAnswer {
            attempts_remaining: max_attempts - spent,
        })
    }
}

fn evaluate_advance(
    scenario: &Scenario,
    session: &Session,
    args: &Map<String, Value>,
    phase_arg: &str,
) -> Verdict {
    let requested = arg_text(args, phase_arg).unwrap_or_default();
    let Some(target) = scenario.phase_index(&requested) else {
        return invalid(format!(
            "'{}' is not a known phase (expected one of: {})",
            requested,
            scenario.phases.join(", ")
        ));
    };
    if target < session.phase() {
        return Verdict::Deny(DenyReason::PhaseRegression {
            requested: scenario.phase_name(target).to_string(),
            current: scenario.phase_name(session.phase()).to_string(),
        });
    }
    Verdict::Allow
}

fn secret_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn invalid(message: impl Into<String>) -> Verdict {
    Verdict::Deny(DenyReason::InvalidArguments {
        message: message.into(),
    })
}
