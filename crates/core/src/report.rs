//! Run reports
//!
//! A [`Report`] is a snapshot of the framework after a lifetime: every test's
//! result and log, per-suite and overall tallies, and where the lifetime
//! resumed or suspended. Sinks deliver it; the runner emits it once per
//! lifetime.

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fingerprint::Fingerprint;
use crate::framework::{Framework, TestId, TestResult};
use crate::Result;

/// Rendering of a [`Report`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
    Plain,
}

/// Result counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Prerequisite not met
    pub skipped: usize,
    pub not_run: usize,
}

impl Tally {
    fn add(&mut self, result: TestResult) {
        self.total += 1;
        match result {
            TestResult::Passed => self.passed += 1,
            TestResult::Failed => self.failed += 1,
            TestResult::PrereqNotMet => self.skipped += 1,
            TestResult::NotRun => self.not_run += 1,
        }
    }

    fn merge(&mut self, other: &Tally) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.not_run += other.not_run;
    }

    /// Number of tests that executed in some form
    pub fn executed(&self) -> usize {
        self.total - self.not_run
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub description: String,
    pub fingerprint: Fingerprint,
    pub result: TestResult,
    pub log: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub title: String,
    pub fingerprint: Fingerprint,
    pub tests: Vec<TestReport>,
    pub tally: Tally,
}

/// A test position named for humans
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestLocation {
    pub suite: String,
    pub test: String,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub short_title: String,
    pub version: String,
    pub fingerprint: Fingerprint,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<TestLocation>,
    pub suspended_at: Option<TestLocation>,
    pub suites: Vec<SuiteReport>,
    pub totals: Tally,
}

impl Report {
    pub fn resumed(&self) -> bool {
        self.resumed_at.is_some()
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ReportFormat::Table => Ok(self.render_table()),
            ReportFormat::Plain => Ok(self.render_plain()),
        }
    }

    fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Suite", "Test", "Result", "Fingerprint"]);

        for suite in &self.suites {
            for test in &suite.tests {
                let color = match test.result {
                    TestResult::Passed => Color::Green,
                    TestResult::Failed => Color::Red,
                    TestResult::PrereqNotMet => Color::Yellow,
                    TestResult::NotRun => Color::DarkGrey,
                };
                table.add_row(vec![
                    Cell::new(&suite.title),
                    Cell::new(&test.description),
                    Cell::new(test.result).fg(color),
                    Cell::new(test.fingerprint.short()),
                ]);
            }
        }

        let mut out = format!("{} {} [{}]\n", self.title, self.version, self.fingerprint.short());
        let _ = writeln!(out, "{table}");
        out.push_str(&self.summary_line());
        out
    }

    fn render_plain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", self.title, self.version);
        let _ = writeln!(out, "Fingerprint: {}", self.fingerprint);
        if let Some(at) = &self.resumed_at {
            let _ = writeln!(out, "Resumed at: {} / {}", at.suite, at.test);
        }

        for suite in &self.suites {
            let _ = writeln!(out);
            let _ = writeln!(out, "Suite: {}", suite.title);
            for test in &suite.tests {
                let _ = writeln!(out, "  [{}] {}", test.result, test.description);
                for line in test.log.lines() {
                    let _ = writeln!(out, "      {line}");
                }
            }
            let t = &suite.tally;
            let _ = writeln!(
                out,
                "  {} passed, {} failed, {} skipped, {} not run",
                t.passed, t.failed, t.skipped, t.not_run
            );
        }

        let _ = writeln!(out);
        out.push_str(&self.summary_line());
        out
    }

    fn summary_line(&self) -> String {
        let t = &self.totals;
        let mut line = format!(
            "Total: {} | Passed: {} | Failed: {} | Skipped: {} | Not run: {}",
            t.total, t.passed, t.failed, t.skipped, t.not_run
        );
        if let Some(at) = &self.suspended_at {
            let _ = write!(line, "\nSuspended at: {} / {}", at.suite, at.test);
        }
        line.push('\n');
        line
    }

    /// `<short_title>-<fp8>-<timestamp>.json`
    pub fn file_name(&self) -> String {
        let stamp = self
            .finished_at
            .or(self.started_at)
            .unwrap_or_else(Utc::now)
            .format("%Y%m%dT%H%M%S%.6fZ");
        format!("{}-{}-{}.json", self.short_title, self.fingerprint.short(), stamp)
    }
}

impl Framework {
    /// Snapshot the current results
    pub fn report(&self) -> Report {
        let mut totals = Tally::default();
        let suites = self
            .suites()
            .iter()
            .map(|suite| {
                let mut tally = Tally::default();
                let tests = suite
                    .tests()
                    .iter()
                    .map(|test| {
                        tally.add(test.result());
                        TestReport {
                            description: test.description().to_string(),
                            fingerprint: test.fingerprint(),
                            result: test.result(),
                            log: test.log().to_string(),
                        }
                    })
                    .collect();
                totals.merge(&tally);
                SuiteReport {
                    title: suite.title().to_string(),
                    fingerprint: suite.fingerprint(),
                    tests,
                    tally,
                }
            })
            .collect();

        Report {
            title: self.title().to_string(),
            short_title: self.short_title().to_string(),
            version: self.version().to_string(),
            fingerprint: self.fingerprint(),
            started_at: self.started_at(),
            finished_at: self.finished_at(),
            resumed_at: self.resumed_from().and_then(|id| self.locate(id)),
            suspended_at: self.suspended_at().and_then(|id| self.locate(id)),
            suites,
            totals,
        }
    }

    fn locate(&self, id: TestId) -> Option<TestLocation> {
        let suite = self.suite(id.suite)?;
        let test = self.test(id)?;
        Some(TestLocation {
            suite: suite.title().to_string(),
            test: test.description().to_string(),
            fingerprint: test.fingerprint(),
        })
    }
}

/// Destination for the end-of-lifetime report
pub trait ReportSink {
    fn emit(&mut self, report: &Report) -> Result<()>;
}

/// Print to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    format: ReportFormat,
}

impl ConsoleSink {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }
}

impl ReportSink for ConsoleSink {
    fn emit(&mut self, report: &Report) -> Result<()> {
        print!("{}", report.render(self.format)?);
        Ok(())
    }
}

/// Write each report as JSON into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            written: Vec::new(),
        }
    }

    /// Files written by this sink, oldest first
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ReportSink for DirectorySink {
    fn emit(&mut self, report: &Report) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(report.file_name());
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, report.render(ReportFormat::Json)?)?;
        std::fs::rename(&tmp_path, &path)?;

        info!("Report written to {:?}", path);
        self.written.push(path);
        Ok(())
    }
}
