//! Initialization helpers for `.turngate/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{EngineConfig, load_config, write_config};
use super::record_store::{JsonFileStore, RecordStore};
use super::scenario_source::resolve_scenario;

const GITIGNORE: &str = "transcripts/\n*.tmp\n";

/// All canonical paths within `.turngate/` for a project root.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub transcripts_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl EnginePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".turngate");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            config_path: state_dir.join("config.toml"),
            transcripts_dir: state_dir.join("transcripts"),
            gitignore_path: state_dir.join(".gitignore"),
        }
    }

    /// Records file for `cfg`, resolved against the state directory.
    pub fn records_path(&self, cfg: &EngineConfig) -> PathBuf {
        self.state_dir.join(&cfg.records_path)
    }
}

/// Options for `init_engine`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite existing config and records.
    pub force: bool,
    /// Scenario to configure; keeps the existing (or default) one when `None`.
    pub scenario: Option<String>,
}

/// Summary of what `init_engine` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub scenario: String,
    pub records_path: PathBuf,
    pub seeded: usize,
}

/// Create `.turngate/` with config, seed records and a `.gitignore`.
///
/// Existing files are left alone unless `force` is set, so re-running init
/// never clobbers live records.
pub fn init_engine(root: &Path, options: &InitOptions) -> Result<InitReport> {
    let paths = EnginePaths::new(root);
    fs::create_dir_all(&paths.transcripts_dir)
        .with_context(|| format!("create {}", paths.transcripts_dir.display()))?;

    let mut cfg = if options.force {
        EngineConfig::default()
    } else {
        load_config(&paths.config_path)?
    };
    if let Some(scenario) = &options.scenario {
        cfg.scenario = scenario.clone();
    }
    if options.force || !paths.config_path.exists() || options.scenario.is_some() {
        write_config(&paths.config_path, &cfg)?;
    }

    let scenario = resolve_scenario(root, &cfg.scenario)?;
    let records_path = paths.records_path(&cfg);
    let mut seeded = 0;
    if options.force || !records_path.exists() {
        JsonFileStore::new(&records_path)
            .persist(&scenario.seed)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("seed {}", records_path.display()))?;
        seeded = scenario.seed.len();
        info!(scenario = %scenario.name, count = seeded, "seeded records");
    }

    if options.force || !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, GITIGNORE)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }

    Ok(InitReport {
        scenario: scenario.name,
        records_path,
        seeded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_config_records_and_gitignore() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = init_engine(temp.path(), &InitOptions::default()).expect("init");
        let paths = EnginePaths::new(temp.path());

        assert_eq!(report.scenario, "fraud_alert");
        assert_eq!(report.seeded, 3);
        assert!(paths.config_path.exists());
        assert!(paths.gitignore_path.exists());
        let records = JsonFileStore::new(&report.records_path)
            .load_all()
            .expect("load");
        assert_eq!(records[0].key, "C-100");
    }

    #[test]
    fn init_without_force_keeps_live_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = init_engine(temp.path(), &InitOptions::default()).expect("init");
        let store = JsonFileStore::new(&report.records_path);
        let mut records = store.load_all().expect("load");
        records[0].status = "confirmed_safe".to_string();
        store.persist(&records).expect("persist");

        let again = init_engine(temp.path(), &InitOptions::default()).expect("re-init");
        assert_eq!(again.seeded, 0);
        assert_eq!(store.load_all().expect("load")[0].status, "confirmed_safe");

        let forced = init_engine(
            temp.path(),
            &InitOptions {
                force: true,
                scenario: None,
            },
        )
        .expect("force");
        assert_eq!(forced.seeded, 3);
        assert_eq!(store.load_all().expect("load")[0].status, "pending_review");
    }

    #[test]
    fn init_with_scenario_switches_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = init_engine(
            temp.path(),
            &InitOptions {
                force: false,
                scenario: Some("adventure".to_string()),
            },
        )
        .expect("init");
        assert_eq!(report.scenario, "adventure");
        let cfg = load_config(&EnginePaths::new(temp.path()).config_path).expect("config");
        assert_eq!(cfg.scenario, "adventure");
    }
}
