//! Engine-owned state transitions for sessions and their loaded record.
//!
//! Every function here is pure: it takes the current session by reference and
//! returns the next session plus at most one patch for the loaded record.
//! Nothing is persisted; the controller decides when the transition commits.

use std::collections::BTreeMap;

use minijinja::Environment;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::args::{arg_integer, arg_text};
use crate::core::normalize::{normalize_answer, normalize_key};
use crate::core::session::Session;
use crate::core::types::{AccessLevel, DenyReason, RecordPatch, Verdict};
use crate::record::Record;
use crate::scenario::{Action, FieldOp, FieldOpKind, MutateAction, Operation, Scenario};

/// Next session state plus the record patch to persist, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: Session,
    pub patch: Option<RecordPatch>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("operation '{0}' does not apply a transition directly")]
    Unsupported(String),
    #[error("no record is loaded")]
    NoRecord,
    #[error("argument '{0}' is missing")]
    MissingArg(String),
    #[error("argument '{name}' must be an integer")]
    NotAnInteger { name: String },
    #[error("field '{0}' is not a list")]
    NotAList(String),
    #[error("field '{0}' is not an integer")]
    NotANumber(String),
    #[error("'{item}' is not in {field}")]
    NotInList { field: String, item: String },
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
    #[error("render note: {0}")]
    Template(String),
}

/// Bootstrap a session onto a freshly looked-up `record`.
///
/// Re-looking up the loaded key only refreshes the record copy. Any other key
/// starts a sub-session (access reset, attempts from the per-key ledger); the
/// phase restarts at the first phase, or at the record's stored phase when the
/// scenario mirrors phases into the record.
pub fn begin_record(
    scenario: &Scenario,
    operation: &Operation,
    session: &Session,
    record: Record,
) -> Session {
    let mut next = session.clone();
    let same_key = session
        .record_key()
        .is_some_and(|active| normalize_key(active) == normalize_key(&record.key));

    if same_key {
        next.refresh_record(record);
        return next;
    }

    let stored_phase = scenario
        .phase_field
        .as_deref()
        .and_then(|field| record.fields.get(field))
        .and_then(Value::as_str)
        .and_then(|name| scenario.phase_index(name))
        .unwrap_or(0);
    next.begin_sub_session(record, stored_phase);
    if let Some(target) = advance_target(scenario, operation) {
        next.advance_phase(target);
    }
    next
}

/// Apply an allowed, non-lookup operation.
pub fn apply(
    scenario: &Scenario,
    operation: &Operation,
    session: &Session,
    args: &Map<String, Value>,
) -> Result<Transition, TransitionError> {
    let mut next = session.clone();
    let record = session.record().ok_or(TransitionError::NoRecord)?;
    let mut patch = RecordPatch::new(record.key.clone());

    match &operation.action {
        Action::Lookup { .. } => {
            return Err(TransitionError::Unsupported(operation.name.clone()));
        }
        Action::Verify { .. } => {
            if !session.is_verified() {
                next.spend_attempt(scenario.ceiling_for(operation));
                next.raise_access(AccessLevel::Verified);
            }
        }
        Action::Disclose => {}
        Action::Mutate(mutate) => {
            build_mutation(scenario, operation, mutate, record, args, &mut patch)?;
        }
        Action::Advance { phase_arg } => {
            let requested = arg_text(args, phase_arg)
                .ok_or_else(|| TransitionError::MissingArg(phase_arg.clone()))?;
            let target = scenario
                .phase_index(&requested)
                .ok_or(TransitionError::UnknownPhase(requested))?;
            next.advance_phase(target);
        }
    }

    if let Some(target) = advance_target(scenario, operation) {
        next.advance_phase(target);
    }
    if let Some(field) = &scenario.phase_field
        && next.phase() != session.phase()
    {
        patch.fields.insert(
            field.clone(),
            Value::String(scenario.phase_name(next.phase()).to_string()),
        );
    }

    Ok(finish(next, patch))
}

/// Bookkeeping for a denied operation.
///
/// A wrong verification answer spends one attempt. Reaching the ceiling also
/// terminates the session and writes the scenario's failure status. Every
/// other denial leaves session and record untouched.
pub fn apply_denial(
    scenario: &Scenario,
    operation: &Operation,
    session: &Session,
    verdict: &Verdict,
) -> Transition {
    let mut next = session.clone();
    match verdict {
        Verdict::Deny(DenyReason::IncorrectAnswer { .. }) => {
            next.spend_attempt(scenario.ceiling_for(operation));
            Transition {
                session: next,
                patch: None,
            }
        }
        Verdict::Terminate(DenyReason::CeilingReached { .. }) => {
            next.spend_attempt(scenario.ceiling_for(operation));
            next.terminate();
            let patch = session.record().map(|record| {
                let mut patch = RecordPatch::new(record.key.clone());
                patch.status = Some(scenario.failure_status.clone());
                if !scenario.failure_note.trim().is_empty() {
                    patch.note = Some(scenario.failure_note.clone());
                }
                patch
            });
            match patch {
                Some(patch) => finish(next, patch),
                None => Transition {
                    session: next,
                    patch: None,
                },
            }
        }
        _ => Transition {
            session: next,
            patch: None,
        },
    }
}

fn advance_target(scenario: &Scenario, operation: &Operation) -> Option<usize> {
    operation
        .advance_to
        .as_deref()
        .and_then(|phase| scenario.phase_index(phase))
}

/// Drop empty patches and mirror non-empty ones onto the session's record copy.
fn finish(mut next: Session, patch: RecordPatch) -> Transition {
    if patch.is_empty() {
        return Transition {
            session: next,
            patch: None,
        };
    }
    if let Some(record) = next.record_mut() {
        patch.apply_to(record);
    }
    Transition {
        session: next,
        patch: Some(patch),
    }
}

fn build_mutation(
    scenario: &Scenario,
    operation: &Operation,
    mutate: &MutateAction,
    record: &Record,
    args: &Map<String, Value>,
    patch: &mut RecordPatch,
) -> Result<(), TransitionError> {
    if let Some(status) = &mutate.set_status {
        patch.status = Some(status.clone());
    }
    if let Some(status_arg) = &mutate.status_arg {
        let requested = arg_text(args, status_arg)
            .ok_or_else(|| TransitionError::MissingArg(status_arg.clone()))?;
        let status = scenario
            .resolve_status(&requested)
            .ok_or(TransitionError::UnknownStatus(requested))?;
        patch.status = Some(status.to_string());
    }

    let mut fields = record.fields.clone();
    for op in &mutate.fields {
        let value = apply_field_op(op, &fields, args)?;
        fields.insert(op.field.clone(), value.clone());
        patch.fields.insert(op.field.clone(), value);
    }

    if let Some(template) = &mutate.note {
        let note = render_note(template, operation, record, &fields, args)?;
        if !note.trim().is_empty() {
            patch.note = Some(note);
        }
    }
    Ok(())
}

fn apply_field_op(
    op: &FieldOp,
    fields: &BTreeMap<String, Value>,
    args: &Map<String, Value>,
) -> Result<Value, TransitionError> {
    let current = fields.get(&op.field);
    match op.op {
        FieldOpKind::Set => operand(op, args),
        FieldOpKind::Append => {
            let mut items = list_of(&op.field, current)?;
            items.push(operand(op, args)?);
            Ok(Value::Array(items))
        }
        FieldOpKind::Remove => {
            let mut items = list_of(&op.field, current)?;
            let item = operand(op, args)?;
            let position = items
                .iter()
                .position(|existing| same_item(existing, &item))
                .ok_or_else(|| TransitionError::NotInList {
                    field: op.field.clone(),
                    item: display_item(&item),
                })?;
            items.remove(position);
            Ok(Value::Array(items))
        }
        FieldOpKind::Add => {
            let base = match current {
                None | Some(Value::Null) => 0,
                Some(value) => value
                    .as_i64()
                    .ok_or_else(|| TransitionError::NotANumber(op.field.clone()))?,
            };
            let delta = match (&op.value, &op.arg) {
                (Some(value), _) => value.as_i64(),
                (None, Some(arg)) => arg_integer(args, arg),
                (None, None) => None,
            }
            .ok_or_else(|| TransitionError::NotAnInteger {
                name: op.arg.clone().unwrap_or_else(|| op.field.clone()),
            })?;
            let mut total = base.saturating_add(delta);
            if let Some(min) = op.min {
                total = total.max(min);
            }
            if let Some(max) = op.max {
                total = total.min(max);
            }
            Ok(Value::from(total))
        }
    }
}

/// The value an op writes: its fixed `value` or the named argument.
fn operand(op: &FieldOp, args: &Map<String, Value>) -> Result<Value, TransitionError> {
    if let Some(value) = &op.value {
        return Ok(value.clone());
    }
    let name = op.arg.as_deref().unwrap_or_default();
    match args.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
        Some(Value::Null) | Some(Value::String(_)) | None => {
            Err(TransitionError::MissingArg(name.to_string()))
        }
        Some(other) => Ok(other.clone()),
    }
}

fn list_of(field: &str, current: Option<&Value>) -> Result<Vec<Value>, TransitionError> {
    match current {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(TransitionError::NotAList(field.to_string())),
    }
}

fn same_item(existing: &Value, wanted: &Value) -> bool {
    match (existing, wanted) {
        (Value::String(a), Value::String(b)) => normalize_answer(a) == normalize_answer(b),
        _ => existing == wanted,
    }
}

fn display_item(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render an outcome note against post-patch fields and the invocation args.
/// Render a note over the operation's declared args and the record.
///
/// Undeclared args never reach the template, and record facts shadow any
/// declared arg of the same name.
fn render_note(
    template: &str,
    operation: &Operation,
    record: &Record,
    fields: &BTreeMap<String, Value>,
    args: &Map<String, Value>,
) -> Result<String, TransitionError> {
    let mut context: BTreeMap<String, Value> = operation
        .args
        .iter()
        .filter_map(|declared| {
            args.get(&declared.name)
                .map(|value| (declared.name.clone(), value.clone()))
        })
        .collect();
    context.extend(fields.iter().map(|(name, value)| (name.clone(), value.clone())));
    context.insert("key".to_string(), Value::String(record.key.clone()));
    context.insert("status".to_string(), Value::String(record.status.clone()));
    let env = Environment::new();
    env.render_str(template, &context)
        .map(|note| note.trim().to_string())
        .map_err(|err| TransitionError::Template(err.to_string()))
}
