//! Semantic invariants not expressible via JSON Schema or serde.

use std::collections::HashSet;

use regex::Regex;

use crate::core::normalize::normalize_key;
use crate::record::Record;
use crate::scenario::{Action, Scenario};

/// Check record-set invariants:
/// - No empty keys
/// - No duplicate keys after normalization
/// - No empty statuses
pub fn validate_records(records: &[Record]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, record) in records.iter().enumerate() {
        let key = normalize_key(&record.key);
        if key.is_empty() {
            errors.push(format!("record[{}]: key must not be empty", index));
            continue;
        }
        if !seen.insert(key) {
            errors.push(format!("record[{}]: duplicate key '{}'", index, record.key));
        }
        if record.status.trim().is_empty() {
            errors.push(format!("{}: status must not be empty", record.key));
        }
    }
    errors
}

/// Check records against a scenario's declared statuses.
pub fn validate_records_for(scenario: &Scenario, records: &[Record]) -> Vec<String> {
    let mut errors = validate_records(records);
    for record in records {
        if !scenario.has_status(&record.status) {
            errors.push(format!(
                "{}: status '{}' is not declared by scenario '{}'",
                record.key, record.status, scenario.name
            ));
        }
    }
    errors
}

/// Check scenario invariants:
/// - At least one phase; phases, statuses and operation names unique
/// - `max_attempts > 0` (scenario and per-operation)
/// - Initial, terminal and failure statuses declared; failure status terminal
/// - Referenced phases exist; verify needs `secret_field`
/// - Action arguments are declared; `key_pattern` compiles
/// - Seed records satisfy record invariants
pub fn validate_scenario(scenario: &Scenario) -> Vec<String> {
    let mut errors = Vec::new();

    if scenario.name.trim().is_empty() {
        errors.push("name must not be empty".to_string());
    }
    if scenario.phases.is_empty() {
        errors.push("phases must not be empty".to_string());
    }
    push_duplicates(&mut errors, "phase", scenario.phases.iter().map(|p| p.to_lowercase()));
    push_duplicates(&mut errors, "status", scenario.statuses.iter().cloned());
    push_duplicates(
        &mut errors,
        "operation",
        scenario.operations.iter().map(|op| op.name.clone()),
    );

    if scenario.max_attempts == 0 {
        errors.push("max_attempts must be > 0".to_string());
    }
    if !scenario.has_status(&scenario.initial_status) {
        errors.push(format!(
            "initial_status '{}' is not declared",
            scenario.initial_status
        ));
    }
    for status in &scenario.terminal_statuses {
        if !scenario.has_status(status) {
            errors.push(format!("terminal status '{}' is not declared", status));
        }
    }
    if !scenario.has_status(&scenario.failure_status) {
        errors.push(format!(
            "failure_status '{}' is not declared",
            scenario.failure_status
        ));
    } else if !scenario.is_terminal_status(&scenario.failure_status) {
        errors.push(format!(
            "failure_status '{}' must be terminal",
            scenario.failure_status
        ));
    }
    if scenario.is_terminal_status(&scenario.initial_status) {
        errors.push(format!(
            "initial_status '{}' must not be terminal",
            scenario.initial_status
        ));
    }

    if let Some(pattern) = &scenario.key_pattern
        && let Err(err) = Regex::new(pattern)
    {
        errors.push(format!("key_pattern does not compile: {}", err));
    }

    for op in &scenario.operations {
        let path = format!("operations/{}", op.name);
        if op.gate.max_attempts == Some(0) {
            errors.push(format!("{}: gate.max_attempts must be > 0", path));
        }
        for phase in op.gate.min_phase.iter().chain(op.advance_to.iter()) {
            if scenario.phase_index(phase).is_none() {
                errors.push(format!("{}: unknown phase '{}'", path, phase));
            }
        }
        for arg in op.action.referenced_args() {
            if op.arg(arg).is_none() {
                errors.push(format!("{}: action uses undeclared arg '{}'", path, arg));
            }
        }
        match &op.action {
            Action::Verify { .. } if scenario.secret_field.is_none() => {
                errors.push(format!("{}: verify requires secret_field", path));
            }
            Action::Mutate(mutate) => {
                if let Some(status) = &mutate.set_status
                    && !scenario.has_status(status)
                {
                    errors.push(format!("{}: set_status '{}' is not declared", path, status));
                }
                if mutate.set_status.is_some() && mutate.status_arg.is_some() {
                    errors.push(format!(
                        "{}: set_status and status_arg are mutually exclusive",
                        path
                    ));
                }
                for field_op in &mutate.fields {
                    if field_op.value.is_some() == field_op.arg.is_some() {
                        errors.push(format!(
                            "{}: field '{}' needs exactly one of value or arg",
                            path, field_op.field
                        ));
                    }
                    if scenario.is_secret(&field_op.field) {
                        errors.push(format!(
                            "{}: secret field '{}' cannot be mutated",
                            path, field_op.field
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    for error in validate_records_for(scenario, &scenario.seed) {
        errors.push(format!("seed: {}", error));
    }

    errors
}

fn push_duplicates(errors: &mut Vec<String>, what: &str, items: impl Iterator<Item = String>) {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.clone()) {
            errors.push(format!("duplicate {} '{}'", what, item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_records_reports_errors() {
        let records = vec![
            Record::new("C-100", "open"),
            Record::new("c-100 ", "open"),
            Record::new("  ", "open"),
            Record::new("C-200", ""),
        ];
        let errors = validate_records(&records);
        assert!(errors.iter().any(|err| err.contains("duplicate key")));
        assert!(errors.iter().any(|err| err.contains("key must not be empty")));
        assert!(errors.iter().any(|err| err.contains("status must not be empty")));
    }

    #[test]
    fn validate_records_for_rejects_undeclared_status() {
        let scenario = Scenario::builtin("fraud_alert")
            .expect("builtin")
            .expect("valid");
        let errors = validate_records_for(&scenario, &[Record::new("C-1", "archived")]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("archived"));
    }

    #[test]
    fn validate_scenario_flags_unknown_phase_and_undeclared_arg() {
        let mut scenario = Scenario::builtin("adventure")
            .expect("builtin")
            .expect("valid");
        scenario.operations[0].advance_to = Some("nowhere".to_string());
        scenario.operations[0].args.clear();
        let errors = validate_scenario(&scenario);
        assert!(errors.iter().any(|err| err.contains("unknown phase 'nowhere'")));
        assert!(errors.iter().any(|err| err.contains("undeclared arg 'player_name'")));
    }
}
