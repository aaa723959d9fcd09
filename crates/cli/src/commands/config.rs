//! Config Commands

use anyhow::{bail, Result};
use clap::Subcommand;
use resumetest_core::RunnerConfig;
use serde::Serialize;
use std::path::Path;

use super::exit;
use crate::output::{print_item, print_success, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
pub struct ConfigDisplay {
    #[serde(flatten)]
    pub config: RunnerConfig,
}

impl TableDisplay for ConfigDisplay {
    fn headers() -> Vec<&'static str> {
        vec![
            "Resume Prerequisites",
            "State Namespace",
            "Max Context",
            "Report Format",
            "Report Directory",
        ]
    }

    fn row(&self) -> Vec<String> {
        let config = &self.config;
        vec![
            config.resume_prerequisites.to_string(),
            config.state.namespace.clone(),
            config.state.max_context_size.to_string(),
            format!("{:?}", config.report.format).to_lowercase(),
            config
                .report
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]
    }
}

pub fn execute(
    cmd: ConfigCommands,
    path: &Path,
    config: RunnerConfig,
    format: OutputFormat,
) -> Result<i32> {
    match cmd {
        ConfigCommands::Show => {
            print_item(&ConfigDisplay { config }, format);
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{:?} already exists; pass --force to overwrite", path);
            }
            RunnerConfig::default().save(path)?;
            print_success(&format!("Wrote {:?}", path));
        }
    }

    Ok(exit::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resumetest.toml");

        execute(ConfigCommands::Init { force: false }, &path, RunnerConfig::default(), OutputFormat::Plain)
            .unwrap();
        assert_eq!(RunnerConfig::load(&path).unwrap(), RunnerConfig::default());

        assert!(execute(ConfigCommands::Init { force: false }, &path, RunnerConfig::default(), OutputFormat::Plain)
            .is_err());
        assert!(execute(ConfigCommands::Init { force: true }, &path, RunnerConfig::default(), OutputFormat::Plain)
            .is_ok());
    }
}
