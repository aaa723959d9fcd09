//! CLI Commands

pub mod config;
pub mod run;
pub mod state;

/// Process exit codes
pub mod exit {
    /// Every test that ran passed
    pub const SUCCESS: i32 = 0;
    /// At least one test failed or the engine reported an error
    pub const FAILURE: i32 = 1;
    /// The application suspended; launch it again to resume
    pub const SUSPENDED: i32 = 3;
}
