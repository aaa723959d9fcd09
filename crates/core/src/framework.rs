//! Framework / Suite / Test data model
//!
//! A two-level ordered tree. Children refer to their parents by index or
//! fingerprint, never by pointer, so the same positions can be written into
//! the saved-state record and found again after a relaunch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::handle::UnitTest;
use crate::persist::SavedState;
use crate::{Error, Result};

/// Longest accepted title or description, in characters
pub const MAX_TITLE_LENGTH: usize = 120;

/// Status returned by run and prerequisite functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    PrereqNotMet,
    /// Returned by a successful save-and-exit or save-and-reset.
    Suspended,
}

impl From<bool> for TestStatus {
    fn from(passed: bool) -> Self {
        if passed {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        }
    }
}

/// Result recorded on a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    #[default]
    NotRun,
    PrereqNotMet,
    Passed,
    Failed,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResult::NotRun => write!(f, "not run"),
            TestResult::PrereqNotMet => write!(f, "prereq not met"),
            TestResult::Passed => write!(f, "passed"),
            TestResult::Failed => write!(f, "failed"),
        }
    }
}

/// Run function and prerequisite signature
pub type TestFn = Box<dyn FnMut(&mut UnitTest<'_>) -> TestStatus>;

/// Cleanup signature; cleanup can log but has no result
pub type CleanupFn = Box<dyn FnMut(&mut UnitTest<'_>)>;

/// Suite setup / teardown signature
pub type SuiteHook = Box<dyn FnMut()>;

/// Index of a suite within its framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SuiteId(pub usize);

/// Index of a test: its suite plus its position within that suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestId {
    pub suite: SuiteId,
    pub index: usize,
}

/// A test waiting to be added to a suite
pub struct TestCase {
    description: String,
    run: TestFn,
    prerequisite: Option<TestFn>,
    cleanup: Option<CleanupFn>,
    context: Option<Vec<u8>>,
}

impl TestCase {
    pub fn new(
        description: impl Into<String>,
        run: impl FnMut(&mut UnitTest<'_>) -> TestStatus + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            run: Box::new(run),
            prerequisite: None,
            cleanup: None,
            context: None,
        }
    }

    /// Gate the test on `prerequisite` returning [`TestStatus::Passed`]
    pub fn prerequisite(
        mut self,
        prerequisite: impl FnMut(&mut UnitTest<'_>) -> TestStatus + 'static,
    ) -> Self {
        self.prerequisite = Some(Box::new(prerequisite));
        self
    }

    pub fn cleanup(mut self, cleanup: impl FnMut(&mut UnitTest<'_>) + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Opaque context handed to the run function
    pub fn context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Context encoded from a serializable fixture
    pub fn with_fixture<T: Serialize>(self, fixture: &T) -> Result<Self> {
        Ok(self.context(serde_json::to_vec(fixture)?))
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("description", &self.description)
            .field("prerequisite", &self.prerequisite.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// A registered test
pub struct Test {
    pub(crate) id: TestId,
    pub(crate) description: String,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) run: TestFn,
    pub(crate) prerequisite: Option<TestFn>,
    pub(crate) cleanup: Option<CleanupFn>,
    pub(crate) context: Option<Vec<u8>>,
    pub(crate) result: TestResult,
    pub(crate) log: String,
}

impl Test {
    pub fn id(&self) -> TestId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn result(&self) -> TestResult {
        self.result
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn context(&self) -> Option<&[u8]> {
        self.context.as_deref()
    }

    pub fn has_prerequisite(&self) -> bool {
        self.prerequisite.is_some()
    }

    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("fingerprint", &self.fingerprint)
            .field("result", &self.result)
            .finish()
    }
}

/// An ordered group of tests with optional setup and teardown
pub struct Suite {
    pub(crate) id: SuiteId,
    pub(crate) framework: Fingerprint,
    pub(crate) title: String,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) setup: Option<SuiteHook>,
    pub(crate) teardown: Option<SuiteHook>,
    pub(crate) tests: Vec<Test>,
}

impl Suite {
    pub fn id(&self) -> SuiteId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Fingerprint of the owning framework
    pub fn framework(&self) -> Fingerprint {
        self.framework
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("tests", &self.tests)
            .finish()
    }
}

/// Root of the test tree; one per process lifetime
pub struct Framework {
    title: String,
    short_title: String,
    version: String,
    fingerprint: Fingerprint,
    pub(crate) suites: Vec<Suite>,
    pub(crate) current: Option<TestId>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    pub(crate) saved_state: Option<SavedState>,
    pub(crate) resumed_from: Option<TestId>,
    pub(crate) suspended_at: Option<TestId>,
    pub(crate) sealed: bool,
}

impl Framework {
    /// Create a framework.
    ///
    /// `short_title` names the saved-state record and report files, so it is
    /// restricted to ASCII alphanumerics, `_`, `-` and `.`.
    pub fn new(title: &str, short_title: &str, version: &str) -> Result<Self> {
        validate_title("framework title", title)?;
        validate_title("short title", short_title)?;
        if !short_title
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(Error::InvalidTitle(format!(
                "short title {short_title:?} must only contain [A-Za-z0-9_.-]"
            )));
        }
        if version.is_empty() {
            return Err(Error::InvalidTitle("version string is empty".to_string()));
        }

        Ok(Self {
            title: try_copy(title, "framework")?,
            short_title: try_copy(short_title, "framework")?,
            version: try_copy(version, "framework")?,
            fingerprint: Fingerprint::of_framework(short_title, version),
            suites: Vec::new(),
            current: None,
            started_at: None,
            finished_at: None,
            saved_state: None,
            resumed_from: None,
            suspended_at: None,
            sealed: false,
        })
    }

    /// Append a suite
    pub fn create_suite(
        &mut self,
        title: &str,
        setup: Option<SuiteHook>,
        teardown: Option<SuiteHook>,
    ) -> Result<SuiteId> {
        if self.sealed {
            return Err(Error::RegistrationClosed);
        }
        validate_title("suite title", title)?;

        let fingerprint = Fingerprint::of_suite(&self.fingerprint, title);
        if self.suites.iter().any(|s| s.fingerprint == fingerprint) {
            return Err(Error::DuplicateName {
                kind: "suite",
                name: title.to_string(),
            });
        }

        self.suites
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory("suite"))?;

        let id = SuiteId(self.suites.len());
        self.suites.push(Suite {
            id,
            framework: self.fingerprint,
            title: try_copy(title, "suite")?,
            fingerprint,
            setup,
            teardown,
            tests: Vec::new(),
        });

        debug!("Registered suite {:?} '{}'", id, title);
        Ok(id)
    }

    /// Append a test to `suite`
    pub fn add_test(&mut self, suite: SuiteId, case: TestCase) -> Result<TestId> {
        if self.sealed {
            return Err(Error::RegistrationClosed);
        }
        validate_title("test description", &case.description)?;

        let parent = self
            .suites
            .get_mut(suite.0)
            .ok_or(Error::UnknownSuite(suite.0))?;

        let fingerprint = Fingerprint::of_test(&parent.fingerprint, &case.description);
        if parent.tests.iter().any(|t| t.fingerprint == fingerprint) {
            return Err(Error::DuplicateName {
                kind: "test",
                name: case.description,
            });
        }

        parent
            .tests
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory("test"))?;

        let id = TestId {
            suite,
            index: parent.tests.len(),
        };
        parent.tests.push(Test {
            id,
            description: case.description,
            fingerprint,
            run: case.run,
            prerequisite: case.prerequisite,
            cleanup: case.cleanup,
            context: case.context,
            result: TestResult::NotRun,
            log: String::new(),
        });

        Ok(id)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn short_title(&self) -> &str {
        &self.short_title
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    pub fn suite(&self, id: SuiteId) -> Option<&Suite> {
        self.suites.get(id.0)
    }

    pub fn test(&self, id: TestId) -> Option<&Test> {
        self.suites.get(id.suite.0)?.tests.get(id.index)
    }

    /// Iterate every test in execution order
    pub fn tests(&self) -> impl Iterator<Item = &Test> + '_ {
        self.suites.iter().flat_map(|s| s.tests.iter())
    }

    /// Test currently executing, only set during a run
    pub fn current_test(&self) -> Option<TestId> {
        self.current
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Record written by the last suspension in this lifetime
    pub fn saved_state(&self) -> Option<&SavedState> {
        self.saved_state.as_ref()
    }

    /// Test this lifetime resumed at, if it started from a saved record
    pub fn resumed_from(&self) -> Option<TestId> {
        self.resumed_from
    }

    /// Test that suspended this lifetime, if any
    pub fn suspended_at(&self) -> Option<TestId> {
        self.suspended_at
    }

    pub fn is_registration_closed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn test_mut(&mut self, id: TestId) -> Option<&mut Test> {
        self.suites.get_mut(id.suite.0)?.tests.get_mut(id.index)
    }
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("title", &self.title)
            .field("short_title", &self.short_title)
            .field("version", &self.version)
            .field("fingerprint", &self.fingerprint)
            .field("suites", &self.suites)
            .finish()
    }
}

fn validate_title(what: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidTitle(format!("{what} is empty")));
    }
    let len = text.chars().count();
    if len > MAX_TITLE_LENGTH {
        return Err(Error::InvalidTitle(format!(
            "{what} is {len} characters, the limit is {MAX_TITLE_LENGTH}"
        )));
    }
    Ok(())
}

fn try_copy(text: &str, what: &'static str) -> Result<String> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(text.len())
        .map_err(|_| Error::OutOfMemory(what))?;
    owned.push_str(text);
    Ok(owned)
}
