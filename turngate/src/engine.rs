//! A configured engine for one project root: config, scenario, store and transcripts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, warn};

use crate::controller::SessionController;
use crate::core::types::Outcome;
use crate::io::config::{EngineConfig, load_config};
use crate::io::init::EnginePaths;
use crate::io::record_store::JsonFileStore;
use crate::io::scenario_source::resolve_scenario;
use crate::io::transcript::{TranscriptEntry, append_entry};

/// Everything the CLI and the tool server need to drive sessions.
#[derive(Debug)]
pub struct Engine {
    paths: EnginePaths,
    config: EngineConfig,
    controller: SessionController<JsonFileStore>,
}

impl Engine {
    /// Load `.turngate/config.toml`, resolve the scenario and open the record store.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = EnginePaths::new(root);
        let config = load_config(&paths.config_path).context("load config.toml")?;
        let scenario = resolve_scenario(root, &config.scenario)?;
        let records_path = paths.records_path(&config);
        if !records_path.exists() {
            return Err(anyhow!(
                "missing records {} (run `turngate init`)",
                records_path.display()
            ));
        }
        info!(scenario = %scenario.name, records = %records_path.display(), "engine opened");
        let controller = SessionController::new(scenario, JsonFileStore::new(records_path));
        Ok(Self {
            paths,
            config,
            controller,
        })
    }

    pub fn paths(&self) -> &EnginePaths {
        &self.paths
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &SessionController<JsonFileStore> {
        &self.controller
    }

    pub fn transcripts_dir(&self) -> &Path {
        &self.paths.transcripts_dir
    }

    /// Append `outcome` to its session transcript when transcripts are enabled.
    ///
    /// Transcript failures are logged and swallowed; they never affect the session.
    pub fn record_transcript(&self, outcome: &Outcome) -> Option<PathBuf> {
        if !self.config.transcripts {
            return None;
        }
        let entry = TranscriptEntry::from_outcome(outcome, Utc::now().to_rfc3339());
        match append_entry(&self.paths.transcripts_dir, &entry) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(session = %entry.session_id, error = %format!("{err:#}"), "transcript append failed");
                None
            }
        }
    }

    /// Split into the pieces a long-running host shares across tasks.
    pub fn into_parts(self) -> (EnginePaths, EngineConfig, SessionController<JsonFileStore>) {
        (self.paths, self.config, self.controller)
    }
}
