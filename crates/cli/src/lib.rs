//! resumetest CLI
//!
//! Host runner for resumetest applications. The machine under test is
//! simulated by a JSON state file, so each launch of the binary is one
//! lifetime of the application and a reset is the end of the process.

pub mod apps;
pub mod commands;
pub mod output;
