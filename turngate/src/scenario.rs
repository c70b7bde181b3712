//! Declarative scenario configuration.
//!
//! A scenario names the vocabulary of one concrete conversational flow: its
//! ordered phases, record statuses, which record fields are secret or
//! sensitive, and the catalogue of operations the dialogue loop may invoke.
//! The engine itself never hard-codes any of these.

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::invariants::validate_scenario;
use crate::core::types::AccessLevel;
use crate::record::Record;

const FRAUD_ALERT: &str = include_str!("../scenarios/fraud_alert.toml");
const ADVENTURE: &str = include_str!("../scenarios/adventure.toml");

/// Names of scenarios embedded in the binary.
pub const BUILTIN_SCENARIOS: &[&str] = &["fraud_alert", "adventure"];

fn default_max_attempts() -> u32 {
    2
}

fn default_required() -> bool {
    true
}

/// What happens when a lookup names a different key while a record is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySwitchPolicy {
    /// Start a fresh sub-session on the new record.
    #[default]
    FreshSession,
    /// Refuse the lookup with `KeySwitchDenied`.
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ceiling on verification attempts per record.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Total order of phases; index 0 is the starting phase.
    pub phases: Vec<String>,
    pub statuses: Vec<String>,
    pub initial_status: String,
    #[serde(default)]
    pub terminal_statuses: Vec<String>,
    /// Status written when the attempt ceiling is reached.
    pub failure_status: String,
    #[serde(default)]
    pub failure_note: String,
    /// Field holding the expected verification answer. Never disclosed.
    #[serde(default)]
    pub secret_field: Option<String>,
    /// Fields hidden until the session is verified.
    #[serde(default)]
    pub sensitive_fields: Vec<String>,
    /// Field mirroring the session phase into the record, if any.
    #[serde(default)]
    pub phase_field: Option<String>,
    #[serde(default)]
    pub key_pattern: Option<String>,
    #[serde(default)]
    pub on_key_switch: KeySwitchPolicy,
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Records written by `turngate init`.
    #[serde(default)]
    pub seed: Vec<Record>,
    #[serde(skip)]
    key_regex: Option<Regex>,
}

/// One named tool the dialogue loop can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub gate: GateRule,
    pub action: Action,
    /// Phase the session moves to when the operation succeeds.
    #[serde(default)]
    pub advance_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub kind: ArgKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    #[default]
    String,
    Integer,
}

/// Preconditions for one operation. Immutable at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateRule {
    pub min_access: AccessLevel,
    pub min_phase: Option<String>,
    /// Overrides the scenario ceiling for this operation.
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Lookup { key_arg: String },
    Verify { answer_arg: String },
    Disclose,
    Mutate(MutateAction),
    Advance { phase_arg: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutateAction {
    #[serde(default)]
    pub set_status: Option<String>,
    /// Argument whose value names the new status.
    #[serde(default)]
    pub status_arg: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldOp>,
    /// Outcome note template (minijinja), rendered against record fields and args.
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOp {
    pub op: FieldOpKind,
    pub field: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub arg: Option<String>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOpKind {
    Set,
    Append,
    Remove,
    Add,
}

impl Action {
    /// Argument names the action reads directly.
    pub fn referenced_args(&self) -> Vec<&str> {
        match self {
            Action::Lookup { key_arg } => vec![key_arg.as_str()],
            Action::Verify { answer_arg } => vec![answer_arg.as_str()],
            Action::Disclose => Vec::new(),
            Action::Mutate(mutate) => mutate
                .status_arg
                .iter()
                .map(String::as_str)
                .chain(mutate.fields.iter().filter_map(|op| op.arg.as_deref()))
                .collect(),
            Action::Advance { phase_arg } => vec![phase_arg.as_str()],
        }
    }
}

impl Operation {
    /// Every operation except lookup needs a loaded record.
    pub fn requires_record(&self) -> bool {
        !matches!(self.action, Action::Lookup { .. })
    }

    /// Operations refused once the loaded record reached a terminal status.
    pub fn guards_terminal_record(&self) -> bool {
        matches!(
            self.action,
            Action::Verify { .. } | Action::Mutate(_) | Action::Advance { .. }
        )
    }

    pub fn arg(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|arg| arg.name == name)
    }

    /// Function-calling descriptor: name, description and a JSON Schema for the args.
    pub fn tool_spec(&self) -> ToolSpec {
        let mut properties = serde_json::Map::new();
        for arg in &self.args {
            let kind = match arg.kind {
                ArgKind::String => "string",
                ArgKind::Integer => "integer",
            };
            properties.insert(
                arg.name.clone(),
                json!({ "type": kind, "description": arg.description }),
            );
        }
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|arg| arg.required)
            .map(|arg| arg.name.as_str())
            .collect();
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            }),
        }
    }
}

/// Tool catalogue entry handed to an LLM function-calling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl Scenario {
    /// Parse a scenario from TOML and check its invariants.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut scenario: Scenario = toml::from_str(source).context("parse scenario toml")?;
        let errors = validate_scenario(&scenario);
        if !errors.is_empty() {
            return Err(anyhow!(
                "scenario '{}' invalid:\n- {}",
                scenario.name,
                errors.join("\n- ")
            ));
        }
        scenario.key_regex = scenario
            .key_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("compile key_pattern")?;
        Ok(scenario)
    }

    /// Load one of the embedded scenarios by name.
    pub fn builtin(name: &str) -> Option<Result<Self>> {
        let source = match name {
            "fraud_alert" => FRAUD_ALERT,
            "adventure" => ADVENTURE,
            _ => return None,
        };
        Some(Self::from_toml_str(source).with_context(|| format!("builtin scenario {name}")))
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn phase_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.phases
            .iter()
            .position(|phase| phase.eq_ignore_ascii_case(wanted))
    }

    pub fn phase_name(&self, index: usize) -> &str {
        self.phases
            .get(index)
            .or_else(|| self.phases.last())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_terminal_status(&self, status: &str) -> bool {
        self.terminal_statuses.iter().any(|s| s == status)
    }

    pub fn has_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }

    /// Declared status matching `name` case-insensitively, as spelled in the
    /// scenario. Matches phase lookup in [`Scenario::phase_index`].
    pub fn resolve_status(&self, name: &str) -> Option<&str> {
        let wanted = name.trim();
        self.statuses
            .iter()
            .find(|status| status.eq_ignore_ascii_case(wanted))
            .map(String::as_str)
    }

    /// Attempt ceiling for `operation`.
    pub fn ceiling_for(&self, operation: &Operation) -> u32 {
        operation.gate.max_attempts.unwrap_or(self.max_attempts)
    }

    /// True if `key` is acceptable under `key_pattern` (always true when unset).
    pub fn key_is_well_formed(&self, key: &str) -> bool {
        match &self.key_regex {
            Some(regex) => regex.is_match(key.trim()),
            None => true,
        }
    }

    pub fn is_sensitive(&self, field: &str) -> bool {
        self.sensitive_fields.iter().any(|f| f == field)
    }

    pub fn is_secret(&self, field: &str) -> bool {
        self.secret_field.as_deref() == Some(field)
    }

    /// Tool catalogue in declaration order.
    pub fn tools(&self) -> Vec<ToolSpec> {
        self.operations.iter().map(Operation::tool_spec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_parse_and_validate() {
        for name in BUILTIN_SCENARIOS {
            let scenario = Scenario::builtin(name)
                .expect("known builtin")
                .expect("valid scenario");
            assert_eq!(&scenario.name, name);
            assert!(!scenario.operations.is_empty());
            assert!(!scenario.seed.is_empty());
        }
    }

    #[test]
    fn unknown_builtin_is_none() {
        assert!(Scenario::builtin("missing").is_none());
    }

    #[test]
    fn fraud_alert_gates_disclosure_on_verification() {
        let scenario = Scenario::builtin("fraud_alert")
            .expect("builtin")
            .expect("valid");
        let disclose = scenario
            .operation("read_transaction")
            .expect("read_transaction");
        assert_eq!(disclose.action, Action::Disclose);
        assert_eq!(disclose.gate.min_access, AccessLevel::Verified);
        assert_eq!(scenario.max_attempts, 2);
        assert!(scenario.is_terminal_status(&scenario.failure_status));
    }

    #[test]
    fn phase_index_is_case_insensitive() {
        let scenario = Scenario::builtin("adventure")
            .expect("builtin")
            .expect("valid");
        assert_eq!(scenario.phase_index("Exploration"), Some(1));
        assert_eq!(scenario.phase_index("nowhere"), None);
        assert_eq!(scenario.phase_name(0), "intro");
    }

    #[test]
    fn resolve_status_is_case_insensitive() {
        let scenario = Scenario::builtin("adventure")
            .expect("builtin")
            .expect("valid");
        assert_eq!(scenario.resolve_status(" Victory "), Some("victory"));
        assert_eq!(scenario.resolve_status("stalemate"), None);
    }

    #[test]
    fn key_pattern_rejects_malformed_keys() {
        let scenario = Scenario::builtin("fraud_alert")
            .expect("builtin")
            .expect("valid");
        assert!(scenario.key_is_well_formed("C-100"));
        assert!(scenario.key_is_well_formed(" c-100 "));
        assert!(!scenario.key_is_well_formed("drop table"));
    }

    #[test]
    fn invalid_scenario_reports_every_violation() {
        let source = r#"
name = "broken"
phases = []
statuses = ["open"]
initial_status = "open"
failure_status = "failed"
max_attempts = 0

[[operations]]
name = "check"
[operations.action]
kind = "verify"
answer_arg = "answer"
"#;
        let err = Scenario::from_toml_str(source).expect_err("invalid");
        let message = format!("{err:#}");
        assert!(message.contains("phases"));
        assert!(message.contains("max_attempts"));
        assert!(message.contains("failure_status"));
        assert!(message.contains("secret_field"));
    }

    #[test]
    fn mutate_action_deserializes_field_ops() {
        let scenario = Scenario::builtin("adventure")
            .expect("builtin")
            .expect("valid");
        let take = scenario.operation("take_item").expect("take_item");
        let Action::Mutate(mutate) = &take.action else {
            panic!("take_item should mutate");
        };
        assert_eq!(mutate.fields[0].op, FieldOpKind::Append);
        assert_eq!(mutate.fields[0].arg.as_deref(), Some("item"));
    }

    #[test]
    fn tool_spec_lists_required_args() {
        let scenario = Scenario::builtin("fraud_alert")
            .expect("builtin")
            .expect("valid");
        let tools = scenario.tools();
        assert_eq!(tools.len(), scenario.operations.len());

        let mark_fraud = tools
            .iter()
            .find(|tool| tool.name == "mark_fraud")
            .expect("mark_fraud");
        assert_eq!(mark_fraud.parameters["required"], json!([]));
        assert_eq!(
            mark_fraud.parameters["properties"]["details"]["type"],
            json!("string")
        );

        let lookup = &tools[0];
        assert_eq!(lookup.parameters["required"], json!(["case_id"]));
    }
}
