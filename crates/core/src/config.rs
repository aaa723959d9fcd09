//! Runner configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::persist::{StateStore, MAX_CONTEXT_SIZE};
use crate::report::ReportFormat;
use crate::Result;

/// What to do with the prerequisite of a test re-entered after a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrereqPolicy {
    /// The prerequisite passed before the reset; do not run it again.
    #[default]
    TrustSaved,
    /// Run it again. Prerequisites that observe state the test itself
    /// changed will now fail and skip the resumed test.
    Reevaluate,
}

impl fmt::Display for PrereqPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrereqPolicy::TrustSaved => write!(f, "trust-saved"),
            PrereqPolicy::Reevaluate => write!(f, "reevaluate"),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Prerequisite handling for a resumed test
    pub resume_prerequisites: PrereqPolicy,

    /// Saved-state record location
    pub state: StateConfig,

    /// Report output
    pub report: ReportConfig,
}

/// Saved-state record configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Property namespace the record is stored under
    pub namespace: String,

    /// Largest context a test may save, capped at 32 KiB
    pub max_context_size: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            namespace: "resumetest".to_string(),
            max_context_size: MAX_CONTEXT_SIZE,
        }
    }
}

/// Report configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Console rendering
    pub format: ReportFormat,

    /// Directory for JSON report files
    pub directory: Option<PathBuf>,
}

impl RunnerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Saved-state store for the framework with `short_title`
    pub fn store(&self, short_title: &str) -> StateStore {
        StateStore::new(&self.state.namespace, short_title)
            .with_max_context_size(self.state.max_context_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = RunnerConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.resume_prerequisites, PrereqPolicy::TrustSaved);
        assert_eq!(config.state.namespace, "resumetest");
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf/resumetest.toml");

        let mut config = RunnerConfig::default();
        config.resume_prerequisites = PrereqPolicy::Reevaluate;
        config.state.max_context_size = 1024;
        config.report.format = ReportFormat::Json;
        config.report.directory = Some(tmp.path().join("reports"));
        config.save(&path).unwrap();

        assert_eq!(RunnerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("partial.toml");
        std::fs::write(&path, "resume_prerequisites = \"reevaluate\"\n\n[state]\nnamespace = \"lab\"\n").unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.resume_prerequisites, PrereqPolicy::Reevaluate);
        assert_eq!(config.state.namespace, "lab");
        assert_eq!(config.state.max_context_size, MAX_CONTEXT_SIZE);
        assert_eq!(config.store("App").name(), "App_SavedState");
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "resume_prerequisites = 3\n").unwrap();
        assert!(matches!(
            RunnerConfig::load(&path),
            Err(crate::Error::Config(_))
        ));
    }
}
