//! Test-facing handle
//!
//! Every prerequisite, run and cleanup function receives a [`UnitTest`]. It
//! carries the test's context, appends to the test's log, exposes the
//! platform, and offers the save calls that suspend a run across a reset.

use serde::de::DeserializeOwned;
use std::fmt;
use std::panic::Location;
use tracing::{debug, error, info, trace, warn};

use crate::fingerprint::Fingerprint;
use crate::framework::{CleanupFn, TestId, TestStatus};
use crate::persist::{ResumeMode, SavedState, StateStore};
use crate::platform::{Platform, PlatformError, ResetKind};
use crate::{Error, Result};

/// Longest single log message kept in a test's log, in characters
pub const MAX_LOG_MESSAGE: usize = 512;

/// Severity of a test log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Verbose => write!(f, "VERBOSE"),
        }
    }
}

/// Which function of the test the handle was given to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prerequisite,
    Body,
    Cleanup,
}

/// How a suspended run should end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Suspension {
    Exit,
    Reset(ResetKind),
}

/// Handle passed to a running test
pub struct UnitTest<'a> {
    id: TestId,
    description: &'a str,
    fingerprint: Fingerprint,
    framework: Fingerprint,
    phase: Phase,
    resumed: bool,
    context: Option<&'a [u8]>,
    log: &'a mut String,
    platform: &'a mut dyn Platform,
    store: &'a StateStore,
    pub(crate) suspension: Option<Suspension>,
    pub(crate) saved: Option<SavedState>,
    pub(crate) replacement_cleanup: Option<CleanupFn>,
}

impl<'a> UnitTest<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TestId,
        description: &'a str,
        fingerprint: Fingerprint,
        framework: Fingerprint,
        resumed: bool,
        context: Option<&'a [u8]>,
        log: &'a mut String,
        platform: &'a mut dyn Platform,
        store: &'a StateStore,
    ) -> Self {
        Self {
            id,
            description,
            fingerprint,
            framework,
            phase: Phase::Prerequisite,
            resumed,
            context,
            log,
            platform,
            store,
            suspension: None,
            saved: None,
            replacement_cleanup: None,
        }
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn id(&self) -> TestId {
        self.id
    }

    pub fn description(&self) -> &str {
        self.description
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True when this test was re-entered from a saved record
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Context registered with the test, or the one restored after a reset.
    ///
    /// A restored context replaces the registered one. An empty saved context
    /// comes back as `None`, so a resumed test cannot tell it apart from one
    /// registered without a context; check [`UnitTest::is_resumed`].
    pub fn context(&self) -> Option<&[u8]> {
        self.context
    }

    /// Decode the context as a JSON fixture
    pub fn fixture<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.context {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn platform(&mut self) -> &mut dyn Platform {
        &mut *self.platform
    }

    /// Whether this handle has already requested a suspension
    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    /// Append a line to the test log
    pub fn log(&mut self, level: LogLevel, message: &str) {
        let message = match message.char_indices().nth(MAX_LOG_MESSAGE) {
            Some((end, _)) => &message[..end],
            None => message,
        };
        let message = message.trim_end_matches('\n');

        match level {
            LogLevel::Error => error!(test = %self.fingerprint.short(), "{}", message),
            LogLevel::Warning => warn!(test = %self.fingerprint.short(), "{}", message),
            LogLevel::Info => info!(test = %self.fingerprint.short(), "{}", message),
            LogLevel::Verbose => trace!(test = %self.fingerprint.short(), "{}", message),
        }

        self.log.push('[');
        self.log.push_str(&level.to_string());
        self.log.push_str("] ");
        self.log.push_str(message);
        self.log.push('\n');
    }

    /// Persist `context` without suspending.
    ///
    /// Follow with [`UnitTest::reset_system`] to suspend. A record that is
    /// not followed by a suspension is cleared when the test finishes.
    pub fn save_state(&mut self, context: Option<&[u8]>) -> Result<()> {
        let mode = match self.phase {
            Phase::Prerequisite => ResumeMode::ReenterPrerequisite,
            Phase::Body => ResumeMode::Reenter,
            Phase::Cleanup => ResumeMode::AfterCleanup,
        };

        let state = SavedState {
            framework: self.framework,
            suite_index: index_u32(self.id.suite.0)?,
            test_index: index_u32(self.id.index)?,
            test: self.fingerprint,
            mode,
            context: context.map(<[u8]>::to_vec).unwrap_or_default(),
        };

        self.store.save(&mut *self.platform, &state)?;
        debug!(
            "Test '{}' saved {} context bytes ({:?})",
            self.description,
            state.context.len(),
            mode
        );
        self.saved = Some(state);
        Ok(())
    }

    /// Persist `context` and end this lifetime without a reset.
    ///
    /// Return the result straight out of the run function; the engine stops,
    /// reports, and lets the host exit.
    pub fn save_and_exit(&mut self, context: Option<&[u8]>) -> Result<TestStatus> {
        self.save_state(context)?;
        self.suspension = Some(Suspension::Exit);
        Ok(TestStatus::Suspended)
    }

    /// Persist `context` and reset the machine once the engine has reported.
    ///
    /// `kind` must be cold or warm. Nothing is written if the kind is invalid
    /// or the platform cannot perform it.
    pub fn save_and_reset(&mut self, context: Option<&[u8]>, kind: ResetKind) -> Result<TestStatus> {
        if !matches!(kind, ResetKind::Cold | ResetKind::Warm) {
            return Err(Error::InvalidArgument(format!(
                "save_and_reset only accepts cold or warm resets, got {kind}"
            )));
        }
        self.check_reset(kind)?;

        self.save_state(context)?;
        self.suspension = Some(Suspension::Reset(kind));
        Ok(TestStatus::Suspended)
    }

    /// Reset the machine once the engine has reported.
    ///
    /// Any reset kind is accepted. Call [`UnitTest::save_state`] first to
    /// resume at this test afterwards.
    pub fn reset_system(&mut self, kind: ResetKind) -> Result<TestStatus> {
        self.check_reset(kind)?;
        if self.saved.is_none() {
            warn!(
                "Test '{}' requested a {} reset without saving state; the next run starts fresh",
                self.description, kind
            );
        }
        self.suspension = Some(Suspension::Reset(kind));
        Ok(TestStatus::Suspended)
    }

    /// Replace this test's cleanup for the rest of this lifetime
    pub fn replace_cleanup(&mut self, cleanup: impl FnMut(&mut UnitTest<'_>) + 'static) {
        self.replacement_cleanup = Some(Box::new(cleanup));
    }

    fn check_reset(&self, kind: ResetKind) -> Result<()> {
        if !self.platform.supports_reset(kind) {
            return Err(PlatformError::Unsupported(kind.to_string()).into());
        }
        Ok(())
    }

    /// Log an assertion failure at the caller's location
    #[track_caller]
    fn assertion_failed(&mut self, detail: &str) {
        let location = Location::caller();
        let message = format!(
            "{}:{}: Assertion failed: {}",
            location.file(),
            location.line(),
            detail
        );
        self.log(LogLevel::Error, &message);
    }

    #[track_caller]
    pub fn assert_true(&mut self, condition: bool, expression: &str) -> bool {
        if !condition {
            self.assertion_failed(&format!("'{expression}' is false"));
        }
        condition
    }

    #[track_caller]
    pub fn assert_false(&mut self, condition: bool, expression: &str) -> bool {
        if condition {
            self.assertion_failed(&format!("'{expression}' is true"));
        }
        !condition
    }

    #[track_caller]
    pub fn assert_equal<T: PartialEq + fmt::Debug + ?Sized>(
        &mut self,
        left: &T,
        right: &T,
        expression: &str,
    ) -> bool {
        let equal = left == right;
        if !equal {
            self.assertion_failed(&format!("'{expression}': {left:?} != {right:?}"));
        }
        equal
    }

    #[track_caller]
    pub fn assert_not_equal<T: PartialEq + fmt::Debug + ?Sized>(
        &mut self,
        left: &T,
        right: &T,
        expression: &str,
    ) -> bool {
        let differ = left != right;
        if !differ {
            self.assertion_failed(&format!("'{expression}': both are {left:?}"));
        }
        differ
    }

    #[track_caller]
    pub fn assert_ok<T, E: fmt::Display>(
        &mut self,
        result: &std::result::Result<T, E>,
        expression: &str,
    ) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                self.assertion_failed(&format!("'{expression}' failed: {e}"));
                false
            }
        }
    }

    /// Passes when `result` is exactly `Err(expected)`
    #[track_caller]
    pub fn assert_status_equal<T, E: PartialEq + fmt::Debug>(
        &mut self,
        result: &std::result::Result<T, E>,
        expected: &E,
        expression: &str,
    ) -> bool {
        match result {
            Err(e) if e == expected => true,
            Err(e) => {
                self.assertion_failed(&format!("'{expression}': {e:?} != {expected:?}"));
                false
            }
            Ok(_) => {
                self.assertion_failed(&format!("'{expression}' succeeded, expected {expected:?}"));
                false
            }
        }
    }
}

impl fmt::Debug for UnitTest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitTest")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("phase", &self.phase)
            .field("resumed", &self.resumed)
            .field("suspension", &self.suspension)
            .finish()
    }
}

fn index_u32(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| Error::InvalidArgument(format!("index {index} does not fit the record")))
}
