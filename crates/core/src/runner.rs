//! Execution engine
//!
//! Drives suites and tests in registration order, gates each test on its
//! prerequisite, always runs cleanup, and carries a run across a reset: a
//! test that suspends unwinds the loop, the lifetime's report is emitted, and
//! only then is the reset requested. On the next launch the saved record is
//! consumed and iteration fast-forwards to the test that suspended.

use chrono::Utc;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::config::{PrereqPolicy, RunnerConfig};
use crate::error::PersistenceError;
use crate::fingerprint::Fingerprint;
use crate::framework::{Framework, SuiteId, Test, TestId, TestResult, TestStatus};
use crate::handle::{LogLevel, Phase, Suspension, UnitTest};
use crate::persist::{ResumeMode, SavedState, StateStore};
use crate::platform::{Platform, ResetKind};
use crate::report::{Report, ReportSink};
use crate::Result;

/// How a call to [`Runner::run_all`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every remaining test ran.
    Completed,
    /// A test saved its state and asked to exit; the host resets externally.
    Exited,
    /// A test saved its state and the platform accepted the reset. Simulated
    /// platforms return here; the host should end the process.
    SuspendedForReset(ResetKind),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Exited => write!(f, "exited for reset"),
            RunOutcome::SuspendedForReset(kind) => write!(f, "suspended for {kind} reset"),
        }
    }
}

/// Result of one lifetime's run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Report emitted this lifetime, absent when no test ran
    pub report: Option<Report>,
    /// Whether this lifetime started from a saved record
    pub resumed: bool,
}

/// Where a saved record says to continue
#[derive(Debug)]
struct ResumePoint {
    id: TestId,
    mode: ResumeMode,
    context: Vec<u8>,
}

impl ResumePoint {
    /// First test of `suite` to run, or `None` if the whole suite is skipped
    fn first_test(&self, suite: SuiteId) -> Option<usize> {
        if suite < self.id.suite {
            None
        } else if suite == self.id.suite {
            match self.mode {
                ResumeMode::Reenter | ResumeMode::ReenterPrerequisite => Some(self.id.index),
                ResumeMode::AfterCleanup => Some(self.id.index + 1),
            }
        } else {
            Some(0)
        }
    }

    /// How `id` is re-entered, if it is the saved test
    fn reentry(&self, id: TestId) -> Option<ResumeMode> {
        match self.mode {
            ResumeMode::AfterCleanup => None,
            mode if self.id == id => Some(mode),
            _ => None,
        }
    }
}

/// Outcome of a single test
enum Step {
    Done,
    Suspended {
        how: Suspension,
        saved: Option<SavedState>,
    },
}

/// Runs a [`Framework`] against a [`Platform`]
pub struct Runner<'p> {
    platform: &'p mut dyn Platform,
    config: RunnerConfig,
    sinks: Vec<Box<dyn ReportSink>>,
}

impl<'p> Runner<'p> {
    pub fn new(platform: &'p mut dyn Platform, config: RunnerConfig) -> Self {
        Self {
            platform,
            config,
            sinks: Vec::new(),
        }
    }

    /// Add a destination for the end-of-lifetime report
    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn platform(&mut self) -> &mut dyn Platform {
        &mut *self.platform
    }

    /// Run every registered test, resuming from a saved record if one exists.
    ///
    /// Closes registration. Test failures are recorded on the tests; an `Err`
    /// here means the saved state could not be consumed or the deferred reset
    /// was refused.
    pub fn run_all(&mut self, fw: &mut Framework) -> Result<RunSummary> {
        fw.sealed = true;

        let store = self.config.store(fw.short_title());
        let policy = self.config.resume_prerequisites;
        let framework_fp = fw.fingerprint();

        info!(
            "Running {} {} [{}], resumed prerequisites: {}",
            fw.title(),
            fw.version(),
            framework_fp.short(),
            policy
        );

        let resume = self.find_resume_point(fw, &store)?;

        for suite in &mut fw.suites {
            for test in &mut suite.tests {
                test.result = TestResult::NotRun;
                test.log.clear();
            }
        }
        fw.started_at = Some(Utc::now());
        fw.finished_at = None;
        fw.saved_state = None;
        fw.suspended_at = None;
        fw.resumed_from = resume.as_ref().map(|point| point.id);

        if let Some(point) = &resume {
            if point.reentry(point.id).is_some() {
                if let Some(test) = fw.test_mut(point.id) {
                    test.context = if point.context.is_empty() {
                        None
                    } else {
                        Some(point.context.clone())
                    };
                }
            }
        }

        let mut ran_any = false;
        let mut suspended: Option<(TestId, Suspension, Option<SavedState>)> = None;

        'suites: for suite in &mut fw.suites {
            let first = match &resume {
                Some(point) => match point.first_test(suite.id) {
                    Some(first) => first,
                    None => {
                        debug!("Skipping suite '{}' before the resume point", suite.title);
                        continue;
                    }
                },
                None => 0,
            };

            debug!("Suite '{}' ({} tests)", suite.title, suite.tests.len());
            if let Some(setup) = suite.setup.as_mut() {
                setup();
            }

            for test in suite.tests.iter_mut().skip(first) {
                let id = test.id;
                let reentry = resume.as_ref().and_then(|point| point.reentry(id));

                fw.current = Some(id);
                ran_any = true;
                let step = self.run_test(&store, framework_fp, policy, test, reentry);
                fw.current = None;

                if let Step::Suspended { how, saved } = step {
                    suspended = Some((id, how, saved));
                    break 'suites;
                }
            }

            if let Some(teardown) = suite.teardown.as_mut() {
                teardown();
            }
        }

        fw.finished_at = Some(Utc::now());

        let how = match suspended {
            Some((id, how, saved)) => {
                fw.suspended_at = Some(id);
                fw.saved_state = saved;
                Some(how)
            }
            None => None,
        };

        let report = if ran_any {
            let report = fw.report();
            self.emit(&report);
            Some(report)
        } else {
            info!("No tests ran in this lifetime");
            None
        };

        if let Some(report) = &report {
            let t = &report.totals;
            info!(
                "{} passed, {} failed, {} skipped, {} not run",
                t.passed, t.failed, t.skipped, t.not_run
            );
        }

        let outcome = match how {
            None => RunOutcome::Completed,
            Some(Suspension::Exit) => {
                info!("State saved; exiting so the platform can be reset externally");
                RunOutcome::Exited
            }
            Some(Suspension::Reset(kind)) => {
                info!("Requesting {} reset", kind);
                if let Err(e) = self.platform.reset(kind) {
                    error!("Platform refused the {} reset: {}", kind, e);
                    store.clear_best_effort(&mut *self.platform);
                    fw.saved_state = None;
                    return Err(e.into());
                }
                RunOutcome::SuspendedForReset(kind)
            }
        };

        Ok(RunSummary {
            outcome,
            report,
            resumed: resume.is_some(),
        })
    }

    /// Look for a saved record and consume it
    fn find_resume_point(
        &mut self,
        fw: &Framework,
        store: &StateStore,
    ) -> Result<Option<ResumePoint>> {
        let state = match store.load(&*self.platform) {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("No saved state for {}, starting fresh", fw.short_title());
                return Ok(None);
            }
            Err(PersistenceError::Corrupt(reason)) => {
                warn!("Discarding corrupt saved state ({}), starting fresh", reason);
                store.clear_best_effort(&mut *self.platform);
                return Ok(None);
            }
            Err(e) => {
                warn!("{}; starting fresh", e);
                return Ok(None);
            }
        };

        let id = TestId {
            suite: SuiteId(state.suite_index as usize),
            index: state.test_index as usize,
        };

        let valid = state.framework == fw.fingerprint()
            && fw.test(id).is_some_and(|test| test.fingerprint() == state.test);
        if !valid {
            warn!(
                "Discarding stale saved state for test {} (suite {}, test {}), starting fresh",
                state.test.short(),
                state.suite_index,
                state.test_index
            );
            store.clear_best_effort(&mut *self.platform);
            return Ok(None);
        }

        store.clear(&mut *self.platform)?;

        if let Some(test) = fw.test(id) {
            info!(
                "Resuming at '{}' ({:?}, {} context bytes)",
                test.description(),
                state.mode,
                state.context.len()
            );
        }

        Ok(Some(ResumePoint {
            id,
            mode: state.mode,
            context: state.context,
        }))
    }

    fn run_test(
        &mut self,
        store: &StateStore,
        framework: Fingerprint,
        policy: PrereqPolicy,
        test: &mut Test,
        reentry: Option<ResumeMode>,
    ) -> Step {
        let Test {
            id,
            description,
            fingerprint,
            run,
            prerequisite,
            cleanup,
            context,
            result,
            log,
        } = test;

        let resumed = reentry.is_some();
        debug!("Test '{}'{}", description, if resumed { " (resumed)" } else { "" });

        let mut ut = UnitTest::new(
            *id,
            description,
            *fingerprint,
            framework,
            resumed,
            context.as_deref(),
            log,
            &mut *self.platform,
            store,
        );

        let mut gate = TestStatus::Passed;
        if let Some(prerequisite) = prerequisite.as_mut() {
            // A save from the prerequisite means it never passed, so it always runs again.
            if reentry == Some(ResumeMode::Reenter) && policy == PrereqPolicy::TrustSaved {
                debug!("Prerequisite of '{}' held before the reset, not re-run", description);
            } else {
                ut.set_phase(Phase::Prerequisite);
                gate = prerequisite(&mut ut);
                if let Some(how) = ut.suspension {
                    return Step::Suspended {
                        how,
                        saved: ut.saved.take(),
                    };
                }
            }
        }

        if gate == TestStatus::Passed {
            ut.set_phase(Phase::Body);
            let status = run(&mut ut);
            if let Some(how) = ut.suspension {
                if status != TestStatus::Suspended {
                    warn!("'{}' returned {:?} after suspending", description, status);
                }
                return Step::Suspended {
                    how,
                    saved: ut.saved.take(),
                };
            }
            *result = recorded(&mut ut, status);
        } else {
            debug!("Prerequisite of '{}' returned {:?}", description, gate);
            *result = recorded(&mut ut, gate);
        }

        if let Some(replacement) = ut.replacement_cleanup.take() {
            debug!("'{}' replaced its cleanup", description);
            *cleanup = Some(replacement);
        }

        if let Some(cleanup) = cleanup.as_mut() {
            ut.set_phase(Phase::Cleanup);
            cleanup(&mut ut);
            if let Some(how) = ut.suspension {
                return Step::Suspended {
                    how,
                    saved: ut.saved.take(),
                };
            }
        }

        let dangling = ut.saved.take();
        drop(ut);

        if dangling.is_some() {
            warn!(
                "'{}' saved state without suspending; clearing the record",
                description
            );
            store.clear_best_effort(&mut *self.platform);
        }

        debug!("'{}' {}", description, result);
        Step::Done
    }

    fn emit(&mut self, report: &Report) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(report) {
                error!("Failed to emit report: {}", e);
            }
        }
    }
}

/// Map a returned status to the recorded result
fn recorded(ut: &mut UnitTest<'_>, status: TestStatus) -> TestResult {
    match status {
        TestStatus::Passed => TestResult::Passed,
        TestStatus::Failed => TestResult::Failed,
        TestStatus::PrereqNotMet => TestResult::PrereqNotMet,
        TestStatus::Suspended => {
            ut.log(
                LogLevel::Error,
                "Returned Suspended without saving state or requesting a reset",
            );
            TestResult::Failed
        }
    }
}
