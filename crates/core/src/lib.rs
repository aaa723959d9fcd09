//! resumetest core library
//!
//! A sequential test engine for machines that can be reset out from under
//! it. Tests are registered into suites on a [`Framework`]; a [`Runner`]
//! executes them against a [`Platform`]. A test that needs a reset saves an
//! opaque context, the run suspends, and after the relaunch the same
//! registration resumes at that test with the context restored.

#[macro_use]
mod macros;

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod framework;
pub mod handle;
pub mod persist;
pub mod platform;
pub mod report;
pub mod runner;

// Re-export commonly used types
pub use config::{PrereqPolicy, RunnerConfig};
pub use error::{Error, ErrorCategory, PersistenceError, Result};
pub use fingerprint::Fingerprint;
pub use framework::{
    CleanupFn, Framework, Suite, SuiteHook, SuiteId, Test, TestCase, TestFn, TestId, TestResult,
    TestStatus, MAX_TITLE_LENGTH,
};
pub use handle::{LogLevel, Phase, UnitTest};
pub use persist::{ResumeMode, SavedState, StateStore, MAX_CONTEXT_SIZE};
pub use platform::{
    Attributes, FilePlatform, MemoryPlatform, Platform, PlatformError, Property, PropertyError,
    ResetKind,
};
pub use report::{ConsoleSink, DirectorySink, Report, ReportFormat, ReportSink, Tally};
pub use runner::{RunOutcome, RunSummary, Runner};

/// resumetest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
