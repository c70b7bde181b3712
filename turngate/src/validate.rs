//! Validation of a `.turngate/` project: layout, config, scenario and records.

use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::invariants::validate_records_for;
use crate::io::config::load_config;
use crate::io::init::EnginePaths;
use crate::io::record_store::{JsonFileStore, RecordStore};
use crate::io::scenario_source::resolve_scenario;

/// High-level validation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub scenario: String,
    pub records: usize,
    /// Records whose status is terminal for the scenario.
    pub closed: usize,
}

/// Validate `.turngate/` layout, config, scenario and records.
pub fn validate_project(root: &Path) -> Result<ValidateOutcome> {
    let paths = EnginePaths::new(root);

    ensure_dir(&paths.state_dir)?;
    ensure_file(&paths.config_path)?;
    ensure_gitignore(&paths.gitignore_path)?;

    let cfg = load_config(&paths.config_path).context("load config.toml")?;
    let scenario = resolve_scenario(root, &cfg.scenario)?;

    let records_path = paths.records_path(&cfg);
    ensure_file(&records_path)?;
    let records = JsonFileStore::new(&records_path)
        .load_all()
        .with_context(|| format!("load {}", records_path.display()))?;
    let errors = validate_records_for(&scenario, &records);
    if !errors.is_empty() {
        return Err(anyhow!(
            "record invariant violations:\n- {}",
            errors.join("\n- ")
        ));
    }

    let closed = records
        .iter()
        .filter(|record| scenario.is_terminal_status(&record.status))
        .count();
    Ok(ValidateOutcome {
        scenario: scenario.name,
        records: records.len(),
        closed,
    })
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing directory {}", path.display()));
    }
    if !path.is_dir() {
        return Err(anyhow!("expected directory {}", path.display()));
    }
    Ok(())
}

fn ensure_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing file {}", path.display()));
    }
    if !path.is_file() {
        return Err(anyhow!("expected file {}", path.display()));
    }
    Ok(())
}

fn ensure_gitignore(path: &Path) -> Result<()> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if !contents.lines().any(|line| line.trim() == "transcripts/") {
        return Err(anyhow!("missing 'transcripts/' in {}", path.display()));
    }
    Ok(())
}
