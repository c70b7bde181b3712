use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::normalize::normalize_key;

/// Externally meaningful entity a conversation is about (a fraud case, a saved game).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub status: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Record {
    pub fn new(key: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: status.into(),
            outcome: String::new(),
            fields: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// True if `key` addresses this record (case-insensitive, whitespace-normalized).
    pub fn matches_key(&self, key: &str) -> bool {
        normalize_key(&self.key) == normalize_key(key)
    }

    /// Append a free-text note to `outcome`, `"; "` separated.
    pub fn append_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        if !self.outcome.is_empty() {
            self.outcome.push_str("; ");
        }
        self.outcome.push_str(note);
    }
}

/// Replace the record addressed by `record.key` in `records`, appending if absent.
pub fn replace_by_key(records: &mut Vec<Record>, record: Record) {
    match records.iter_mut().find(|existing| existing.matches_key(&record.key)) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_key_ignores_case_and_padding() {
        let record = Record::new("C-100", "pending_review");
        assert!(record.matches_key("c-100"));
        assert!(record.matches_key("  C-100 "));
        assert!(!record.matches_key("C-1000"));
    }

    #[test]
    fn append_note_separates_entries() {
        let mut record = Record::new("C-100", "pending_review");
        record.append_note("first");
        record.append_note("  ");
        record.append_note("second");
        assert_eq!(record.outcome, "first; second");
    }

    #[test]
    fn replace_by_key_keeps_insertion_order() {
        let mut records = vec![
            Record::new("a", "open"),
            Record::new("b", "open"),
            Record::new("c", "open"),
        ];
        replace_by_key(&mut records, Record::new("B", "closed"));
        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "B", "c"]);
        assert_eq!(records[1].status, "closed");

        replace_by_key(&mut records, Record::new("d", "open"));
        assert_eq!(records.len(), 4);
    }
}
