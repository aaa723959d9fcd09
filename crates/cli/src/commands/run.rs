//! Run Command

use anyhow::{Context, Result};
use clap::Args;
use resumetest_core::{
    DirectorySink, FilePlatform, PrereqPolicy, RunOutcome, RunSummary, Runner, RunnerConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::exit;
use crate::apps::AppKind;
use crate::output::{print_info, print_success, print_warning, OutputFormat, OutputSink};

#[derive(Args)]
pub struct RunArgs {
    /// Application to run
    #[arg(value_enum)]
    pub app: AppKind,

    /// Write a JSON report per lifetime into this directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Relaunch automatically after a suspension, at most this many times
    #[arg(long, default_value_t = 0)]
    pub relaunch: u32,

    /// Run the prerequisite of a resumed test again
    #[arg(long)]
    pub reevaluate_prerequisites: bool,
}

/// Run one lifetime of `app` against the state file
pub fn launch(
    app: AppKind,
    state_file: &Path,
    config: &RunnerConfig,
    format: OutputFormat,
) -> Result<RunSummary> {
    let base = FilePlatform::open(state_file)
        .with_context(|| format!("Failed to open state file {:?}", state_file))?;
    let mut platform = app.platform(base)?;
    let mut fw = app
        .framework()
        .with_context(|| format!("Failed to register {}", app.short_title()))?;

    let mut runner = Runner::new(platform.as_mut(), config.clone()).with_sink(OutputSink::new(format));
    if let Some(dir) = &config.report.directory {
        runner = runner.with_sink(DirectorySink::new(dir));
    }

    let summary = runner.run_all(&mut fw)?;
    debug!("{} lifetime {}", app.short_title(), summary.outcome);
    Ok(summary)
}

pub fn execute(
    args: RunArgs,
    state_file: &Path,
    mut config: RunnerConfig,
    format: Option<OutputFormat>,
) -> Result<i32> {
    if let Some(dir) = args.report_dir {
        config.report.directory = Some(dir);
    }
    if args.reevaluate_prerequisites {
        config.resume_prerequisites = PrereqPolicy::Reevaluate;
    }
    let format = format.unwrap_or_else(|| config.report.format.into());

    let mut relaunches = 0;
    loop {
        let summary = launch(args.app, state_file, &config, format)?;

        match summary.outcome {
            RunOutcome::Completed => {
                let failed = summary
                    .report
                    .as_ref()
                    .map(|r| r.totals.failed)
                    .unwrap_or(0);
                if failed > 0 {
                    print_warning(&format!("{} test(s) failed", failed));
                    return Ok(exit::FAILURE);
                }
                print_success(&format!("{} completed", args.app.short_title()));
                return Ok(exit::SUCCESS);
            }
            outcome if relaunches < args.relaunch => {
                relaunches += 1;
                info!("Relaunching after {} ({}/{})", outcome, relaunches, args.relaunch);
            }
            outcome => {
                print_info(&format!(
                    "{} {}; run again to resume",
                    args.app.short_title(),
                    outcome
                ));
                return Ok(exit::SUSPENDED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_launch_sample() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");

        let summary = launch(
            AppKind::Sample,
            &state,
            &RunnerConfig::default(),
            OutputFormat::Plain,
        )
        .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(!summary.resumed);
    }

    #[test]
    fn test_relaunch_until_complete() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");
        let reports = dir.path().join("reports");

        let args = RunArgs {
            app: AppKind::RebootDemo,
            report_dir: Some(reports.clone()),
            relaunch: 5,
            reevaluate_prerequisites: false,
        };
        let code = execute(args, &state, RunnerConfig::default(), Some(OutputFormat::Plain)).unwrap();
        assert_eq!(code, exit::SUCCESS);

        let platform = FilePlatform::open(&state).unwrap();
        assert_eq!(platform.resets().len(), 5);
        assert_eq!(std::fs::read_dir(&reports).unwrap().count(), 6);
    }
}
