//! Engine configuration stored under `.turngate/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the fraud-alert scenario with a local JSON record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Built-in scenario name, or a path (relative to the project root) to a scenario TOML.
    pub scenario: String,

    /// Records file, relative to `.turngate/` unless absolute.
    pub records_path: PathBuf,

    /// Upper bound on one invocation, persistence included, when hosted by the server.
    pub persist_timeout_ms: u64,

    /// Append one JSON line per invocation under `.turngate/transcripts/`.
    pub transcripts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scenario: "fraud_alert".to_string(),
            records_path: PathBuf::from("records.json"),
            persist_timeout_ms: 5_000,
            transcripts: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scenario.trim().is_empty() {
            return Err(anyhow!("scenario must not be empty"));
        }
        if self.records_path.as_os_str().is_empty() {
            return Err(anyhow!("records_path must not be empty"));
        }
        if self.persist_timeout_ms == 0 {
            return Err(anyhow!("persist_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = EngineConfig {
            scenario: "adventure".to_string(),
            persist_timeout_ms: 250,
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "scenario = \"adventure\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.scenario, "adventure");
        assert_eq!(cfg.persist_timeout_ms, 5_000);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "persist_timeout_ms = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("persist_timeout_ms"));
    }
}
