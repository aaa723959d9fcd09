//! State Commands
//!
//! Inspect and manipulate the simulated platform between launches.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use resumetest_core::{FilePlatform, Platform, ResetKind, RunnerConfig, SavedState};
use serde::Serialize;
use std::path::Path;

use super::exit;
use crate::apps::AppKind;
use crate::output::{print_info, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum StateCommands {
    /// List every property and decode saved-state records
    Show,

    /// Delete saved-state records so the next launch starts fresh
    Clear {
        /// Only clear this application's record
        #[arg(long, value_enum)]
        app: Option<AppKind>,
    },

    /// Simulate a reset of the platform
    Reset {
        /// Reset kind
        #[arg(long, value_enum, default_value = "cold")]
        kind: ResetArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetArg {
    Cold,
    Warm,
    Shutdown,
}

impl From<ResetArg> for ResetKind {
    fn from(arg: ResetArg) -> Self {
        match arg {
            ResetArg::Cold => ResetKind::Cold,
            ResetArg::Warm => ResetKind::Warm,
            ResetArg::Shutdown => ResetKind::Shutdown,
        }
    }
}

/// Property display wrapper for serialization
#[derive(Serialize)]
pub struct PropertyDisplay {
    pub key: String,
    pub attributes: String,
    pub size: usize,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_state: Option<SavedState>,
}

impl TableDisplay for PropertyDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Property", "Attributes", "Size", "Value", "Resume Point"]
    }

    fn row(&self) -> Vec<String> {
        let value = if self.value.len() > 32 {
            format!("{}...", &self.value[..32])
        } else {
            self.value.clone()
        };
        let resume = self
            .saved_state
            .as_ref()
            .map(|s| {
                format!(
                    "suite {} test {} ({:?}, {} bytes)",
                    s.suite_index,
                    s.test_index,
                    s.mode,
                    s.context.len()
                )
            })
            .unwrap_or_else(|| "-".to_string());

        vec![
            self.key.clone(),
            self.attributes.clone(),
            self.size.to_string(),
            value,
            resume,
        ]
    }
}

pub fn execute(
    cmd: StateCommands,
    state_file: &Path,
    config: &RunnerConfig,
    format: OutputFormat,
) -> Result<i32> {
    let mut platform = FilePlatform::open(state_file)
        .with_context(|| format!("Failed to open state file {:?}", state_file))?;

    match cmd {
        StateCommands::Show => {
            let records_prefix = format!("{}/", config.state.namespace);
            let items: Vec<PropertyDisplay> = platform
                .properties()
                .map(|(key, property)| {
                    let saved_state = if key.starts_with(&records_prefix) && key.ends_with("_SavedState") {
                        SavedState::decode(&property.value).ok()
                    } else {
                        None
                    };
                    PropertyDisplay {
                        key: key.to_string(),
                        attributes: property.attributes.to_string(),
                        size: property.size(),
                        value: hex::encode(&property.value),
                        saved_state,
                    }
                })
                .collect();

            print_list(&items, format);
        }

        StateCommands::Clear { app } => {
            let apps: Vec<AppKind> = match app {
                Some(app) => vec![app],
                None => AppKind::ALL.to_vec(),
            };

            for app in apps {
                let store = config.store(app.short_title());
                if platform.get_property(store.namespace(), store.name()).is_err() {
                    print_info(&format!("No saved state for {}", app.short_title()));
                    continue;
                }
                store
                    .clear(&mut platform)
                    .with_context(|| format!("Failed to clear saved state for {}", app.short_title()))?;
                print_success(&format!("Cleared saved state for {}", app.short_title()));
            }
        }

        StateCommands::Reset { kind } => {
            let kind = ResetKind::from(kind);
            platform.reset(kind)?;
            print_success(&format!("Simulated {} reset", kind));
        }
    }

    Ok(exit::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumetest_core::Attributes;
    use tempfile::TempDir;

    #[test]
    fn test_reset_drops_volatile_properties() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut platform = FilePlatform::open(&path).unwrap();
        platform
            .set_property("ns", "Keep", Attributes::NON_VOLATILE, &[1])
            .unwrap();
        platform
            .set_property("ns", "Drop", Attributes::BOOTSERVICE_ACCESS, &[1])
            .unwrap();

        let code = execute(
            StateCommands::Reset {
                kind: ResetArg::Warm,
            },
            &path,
            &RunnerConfig::default(),
            OutputFormat::Plain,
        )
        .unwrap();
        assert_eq!(code, exit::SUCCESS);

        let platform = FilePlatform::open(&path).unwrap();
        assert!(platform.get_property("ns", "Keep").is_ok());
        assert!(platform.get_property("ns", "Drop").is_err());
        assert_eq!(platform.resets(), &[ResetKind::Warm]);
    }

    #[test]
    fn test_clear_removes_saved_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let config = RunnerConfig::default();

        let store = config.store(AppKind::Sample.short_title());
        let mut platform = FilePlatform::open(&path).unwrap();
        platform
            .set_property(store.namespace(), store.name(), Attributes::NON_VOLATILE, b"junk")
            .unwrap();

        execute(
            StateCommands::Clear {
                app: Some(AppKind::Sample),
            },
            &path,
            &config,
            OutputFormat::Plain,
        )
        .unwrap();

        let platform = FilePlatform::open(&path).unwrap();
        assert!(platform.get_property(store.namespace(), store.name()).is_err());
    }
}
