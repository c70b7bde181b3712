//! Per-session transcripts under `.turngate/transcripts/`.
//!
//! One JSON line per invocation. Entries carry the verdict and the record
//! key, never the invocation arguments, so secret answers are not written.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{DenyReason, Outcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub session_id: String,
    pub turn: u32,
    pub at: String,
    pub operation: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_key: Option<String>,
    /// Whether the invocation persisted a record change.
    pub patched: bool,
}

impl TranscriptEntry {
    pub fn from_outcome(outcome: &Outcome, at: impl Into<String>) -> Self {
        Self {
            session_id: outcome.session.id.clone(),
            turn: outcome.session.turn,
            at: at.into(),
            operation: outcome.operation.clone(),
            allowed: outcome.allowed,
            reason: outcome.reason.clone(),
            terminal: outcome.terminal,
            record_key: outcome.session.record_key.clone(),
            patched: outcome.patch.is_some(),
        }
    }
}

pub fn transcript_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", sanitize(session_id)))
}

pub fn append_entry(dir: &Path, entry: &TranscriptEntry) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = transcript_path(dir, &entry.session_id);
    let mut line = serde_json::to_string(entry).context("serialize transcript entry")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(path)
}

pub fn read_transcript(dir: &Path, session_id: &str) -> Result<Vec<TranscriptEntry>> {
    let path = transcript_path(dir, session_id);
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}

// Session ids come from clients; keep them to one path segment.
fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
