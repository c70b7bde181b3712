//! Argument extraction for tool invocations.
//!
//! Language models send scalars loosely (`"-10"` for an integer, `7` for a
//! case number), so extraction accepts either form.

use serde_json::{Map, Value};

use crate::scenario::{ArgKind, Operation};

/// Scalar argument rendered as trimmed text. `None` for missing, null, blank
/// or non-scalar values.
pub fn arg_text(args: &Map<String, Value>, name: &str) -> Option<String> {
    let text = match args.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Integer argument, accepting JSON integers and numeric strings.
pub fn arg_integer(args: &Map<String, Value>, name: &str) -> Option<i64> {
    match args.get(name)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().trim_start_matches('+').parse().ok(),
        _ => None,
    }
}

/// Check arguments against the operation's declared args.
///
/// Returns one message per problem; undeclared extra args are ignored.
pub fn check_args(operation: &Operation, args: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    for declared in &operation.args {
        let present = args.get(&declared.name).is_some_and(|value| !value.is_null());
        if !present {
            if declared.required {
                errors.push(format!("missing required argument '{}'", declared.name));
            }
            continue;
        }
        match declared.kind {
            ArgKind::String => {
                if arg_text(args, &declared.name).is_none() && declared.required {
                    errors.push(format!("argument '{}' must be a non-empty string", declared.name));
                }
            }
            ArgKind::Integer => {
                if arg_integer(args, &declared.name).is_none() {
                    errors.push(format!("argument '{}' must be an integer", declared.name));
                }
            }
        }
    }
    errors
}
