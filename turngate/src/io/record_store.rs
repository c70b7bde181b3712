//! Record store: the only component that touches durable record state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use jsonschema::validator_for;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::invariants::validate_records;
use crate::record::{Record, replace_by_key};

const RECORDS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/records/v1.schema.json"
));

/// Store failures. The controller reports every variant as `StoreUnavailable`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("read records {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse records {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("records invalid: {0}")]
    Invalid(String),
    #[error("write records {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record store lock poisoned")]
    Poisoned,
}

/// Durable mapping from lookup key to record, with whole-set replace semantics.
pub trait RecordStore: Send + Sync {
    /// Every record, in insertion order.
    fn load_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Case-insensitive, normalized exact match on `key`.
    fn find_by_key(&self, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|record| record.matches_key(key)))
    }

    /// Replace the entire durable representation with `records`.
    fn persist(&self, records: &[Record]) -> Result<(), StoreError>;

    /// Load all, replace `record` by key, persist all.
    fn write_record(&self, record: &Record) -> Result<(), StoreError> {
        let mut records = self.load_all()?;
        replace_by_key(&mut records, record.clone());
        self.persist(&records)
    }
}

/// Records kept as a pretty-printed JSON array on disk.
///
/// Loads are validated against the records schema and record invariants.
/// Writes go to a sibling temp file renamed over the target, so readers see
/// either the old or the new dataset, never a truncated one.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        debug!(path = %self.path.display(), "loading records");
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&contents).map_err(|err| StoreError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        validate_schema(&value)?;
        let records: Vec<Record> =
            serde_json::from_value(value).map_err(|err| StoreError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        check_invariants(&records)?;
        debug!(count = records.len(), "records loaded");
        Ok(records)
    }

    fn persist(&self, records: &[Record]) -> Result<(), StoreError> {
        check_invariants(records)?;
        debug!(path = %self.path.display(), count = records.len(), "writing records");
        let mut buf = serde_json::to_string_pretty(records).map_err(|err| StoreError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    fn write_record(&self, record: &Record) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut records = self.load_all()?;
        replace_by_key(&mut records, record.clone());
        self.persist(&records)
    }
}

/// In-process store for embedding the engine and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

impl RecordStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.clone())
    }

    fn persist(&self, records: &[Record]) -> Result<(), StoreError> {
        check_invariants(records)?;
        let mut current = self.records.write().map_err(|_| StoreError::Poisoned)?;
        *current = records.to_vec();
        Ok(())
    }

    fn write_record(&self, record: &Record) -> Result<(), StoreError> {
        let mut current = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = current.clone();
        replace_by_key(&mut next, record.clone());
        check_invariants(&next)?;
        *current = next;
        Ok(())
    }
}

fn validate_schema(value: &Value) -> Result<(), StoreError> {
    let schema: Value = serde_json::from_str(RECORDS_SCHEMA)
        .map_err(|err| StoreError::Invalid(format!("records schema: {}", err)))?;
    let compiled = validator_for(&schema)
        .map_err(|err| StoreError::Invalid(format!("records schema: {}", err)))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(StoreError::Invalid(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

fn check_invariants(records: &[Record]) -> Result<(), StoreError> {
    let errors = validate_records(records);
    if errors.is_empty() {
        return Ok(());
    }
    Err(StoreError::Invalid(errors.join("; ")))
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}
