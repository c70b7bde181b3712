//! Test-only helpers for constructing scenarios, records and stores.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tempfile::TempDir;

use crate::io::record_store::{JsonFileStore, RecordStore, StoreError};
use crate::record::Record;
use crate::scenario::Scenario;

pub fn fraud_scenario() -> Scenario {
    Scenario::builtin("fraud_alert")
        .expect("fraud_alert is builtin")
        .expect("fraud_alert parses")
}

pub fn adventure_scenario() -> Scenario {
    Scenario::builtin("adventure")
        .expect("adventure is builtin")
        .expect("adventure parses")
}

/// A pending fraud case shaped like the `C-100` seed, with `answer` as the secret.
pub fn case_record(key: &str, answer: &str) -> Record {
    Record::new(key, "pending_review")
        .with_field("customer_name", json!("Ava Patel"))
        .with_field(
            "security_question",
            json!("What is your favourite colour?"),
        )
        .with_field("security_answer", json!(answer))
        .with_field("card_ending", json!("4821"))
        .with_field("merchant", json!("ABC Electronics"))
        .with_field("amount", json!("1249.99 USD"))
        .with_field("location", json!("Austin, TX"))
        .with_field("transaction_time", json!("2026-10-16T21:14:00Z"))
        .with_field("case", json!("open"))
}

/// An adventure save at the start of the story.
pub fn game_record(key: &str) -> Record {
    Record::new(key, "in_progress")
        .with_field("location", json!("Village of Emberfall"))
        .with_field("inventory", json!(["torch", "bread"]))
        .with_field("health", json!(100))
        .with_field("story_phase", json!("intro"))
}

/// A JSON file store in its own temp directory, seeded with `records`.
pub struct TempStore {
    pub dir: TempDir,
    pub store: JsonFileStore,
}

impl TempStore {
    pub fn seeded(records: &[Record]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("records.json"));
        store.persist(records).expect("seed records");
        Self { dir, store }
    }

    pub fn contents(&self) -> String {
        std::fs::read_to_string(self.store.path()).expect("read records")
    }
}

/// Wraps a store and fails every write once `fail_writes` is set.
pub struct FailingStore<S> {
    pub inner: S,
    fail_writes: AtomicBool,
}

impl<S: RecordStore> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl<S: RecordStore> RecordStore for FailingStore<S> {
    fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        self.inner.load_all()
    }

    fn persist(&self, records: &[Record]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Invalid("injected write failure".to_string()));
        }
        self.inner.persist(records)
    }
}
