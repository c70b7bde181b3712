//! Resolve the configured scenario: a built-in name or a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::scenario::Scenario;

/// Resolve `name_or_path` to a validated scenario.
///
/// Built-in names win; anything else is read as a path relative to `root`.
pub fn resolve_scenario(root: &Path, name_or_path: &str) -> Result<Scenario> {
    if let Some(builtin) = Scenario::builtin(name_or_path.trim()) {
        debug!(scenario = name_or_path, "using builtin scenario");
        return builtin;
    }
    let path = root.join(name_or_path);
    debug!(path = %path.display(), "loading scenario file");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read scenario {}", path.display()))?;
    Scenario::from_toml_str(&contents).with_context(|| format!("load scenario {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scenario = resolve_scenario(temp.path(), "adventure").expect("builtin");
        assert_eq!(scenario.name, "adventure");
    }

    #[test]
    fn resolves_file_relative_to_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = r#"
name = "door"
phases = ["closed", "open"]
statuses = ["locked", "unlocked"]
initial_status = "locked"
terminal_statuses = ["unlocked"]
failure_status = "unlocked"
secret_field = "code"

[[operations]]
name = "find_door"
[[operations.args]]
name = "door"
[operations.action]
kind = "lookup"
key_arg = "door"
"#;
        fs::write(temp.path().join("door.toml"), source).expect("write");
        let scenario = resolve_scenario(temp.path(), "door.toml").expect("file");
        assert_eq!(scenario.name, "door");
        assert_eq!(scenario.max_attempts, 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_scenario(temp.path(), "nope.toml").expect_err("missing");
        assert!(format!("{err:#}").contains("nope.toml"));
    }
}
