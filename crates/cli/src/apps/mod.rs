//! Bundled test applications
//!
//! Each application registers the same suites and tests on every launch, so
//! a launch after a reset lines up with the saved record of the previous one.

pub mod reboot;
pub mod sample;

use clap::ValueEnum;
use resumetest_core::{FilePlatform, Framework, Platform};

/// Application to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppKind {
    /// Arithmetic and shared-fixture tests, no resets
    Sample,
    /// Memory lock tests, plain and keyed, that reset the platform five times
    RebootDemo,
}

impl AppKind {
    pub const ALL: [AppKind; 2] = [AppKind::Sample, AppKind::RebootDemo];

    pub fn short_title(self) -> &'static str {
        match self {
            AppKind::Sample => sample::SHORT_TITLE,
            AppKind::RebootDemo => reboot::SHORT_TITLE,
        }
    }

    /// Register the application's suites and tests
    pub fn framework(self) -> resumetest_core::Result<Framework> {
        match self {
            AppKind::Sample => sample::framework(),
            AppKind::RebootDemo => reboot::framework(),
        }
    }

    /// Platform the application runs against, layered over the state file
    pub fn platform(self, base: FilePlatform) -> anyhow::Result<Box<dyn Platform>> {
        match self {
            AppKind::Sample => Ok(Box::new(base)),
            AppKind::RebootDemo => Ok(Box::new(reboot::LockGuard::provision(base)?)),
        }
    }
}
