//! Shared deterministic types for the session engine core.
//!
//! These types define stable contracts between the gate evaluator, the
//! transition applier and the controller. They carry no I/O and serialize to
//! stable JSON for the dialogue loop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::Record;

/// Access level granted to a session. Ordered: `Unverified < Verified`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Unverified,
    Verified,
}

/// Why an invocation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DenyReason {
    UnknownOperation { operation: String },
    InvalidArguments { message: String },
    /// Lookup key matched no record.
    NotFound { key: String },
    /// Operation needs a loaded record and lookup has not succeeded yet.
    NoActiveRecord,
    InsufficientAccess { required: AccessLevel },
    IncorrectAnswer { attempts_remaining: u32 },
    CeilingReached { max_attempts: u32 },
    PhaseNotReached { required: String, current: String },
    PhaseRegression { requested: String, current: String },
    /// Record status is terminal; no further mutation is accepted.
    RecordClosed { status: String },
    KeySwitchDenied { active: String },
    SessionTerminated,
    StoreUnavailable { message: String },
}

impl DenyReason {
    /// True if the conversation cannot continue after this denial.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CeilingReached { .. } | Self::SessionTerminated | Self::StoreUnavailable { .. }
        )
    }
}

/// Gate decision for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
    /// Denied, and the session must end with the scenario's failure status.
    Terminate(DenyReason),
}

/// One tool call from the dialogue loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub operation: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Invocation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Map::new(),
        }
    }

    /// Builder-style argument setter.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }
}

/// Field-level changes computed for the single loaded record.
///
/// `fields` holds final values, not deltas, so applying a patch twice is
/// harmless.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RecordPatch {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.fields.is_empty() && self.note.is_none()
    }

    /// Apply the patch to `record` in place.
    pub fn apply_to(&self, record: &mut Record) {
        if let Some(status) = &self.status {
            record.status = status.clone();
        }
        for (name, value) in &self.fields {
            record.fields.insert(name.clone(), value.clone());
        }
        if let Some(note) = &self.note {
            record.append_note(note);
        }
    }
}

/// Serializable view of a session after an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub record_key: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub access: AccessLevel,
    pub phase: String,
    pub turn: u32,
    pub terminated: bool,
}

/// Structured result of one invocation, consumed by the dialogue loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub operation: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub session: SessionSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<RecordPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub terminal: bool,
}
