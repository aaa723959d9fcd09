//! End-to-end launches of the resumetest binary
//!
//! Each process is one lifetime of the application; the state file carries
//! the simulated platform across them.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn resumetest(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_resumetest"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("RESUMETEST_STATE")
        .env_remove("RESUMETEST_CONFIG")
        .args(args)
        .output()
        .expect("failed to launch resumetest")
}

#[test]
fn sample_completes_in_one_launch() {
    let dir = TempDir::new().unwrap();
    let output = resumetest(dir.path(), &["--format", "json", "run", "sample"]);
    assert_eq!(output.status.code(), Some(0));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["short_title"], "Sample_Unit_Test_App");
    assert_eq!(report["totals"]["passed"], 3);
    assert_eq!(report["totals"]["failed"], 0);
}

#[test]
fn reboot_demo_resumes_across_processes() {
    let dir = TempDir::new().unwrap();

    for lifetime in 1..=5 {
        let output = resumetest(dir.path(), &["--format", "plain", "run", "reboot-demo"]);
        assert_eq!(output.status.code(), Some(3), "lifetime {lifetime}");
    }

    let last = resumetest(dir.path(), &["--format", "json", "run", "reboot-demo"]);
    assert_eq!(last.status.code(), Some(0));

    let report: serde_json::Value = serde_json::from_slice(&last.stdout).unwrap();
    assert!(report["resumed_at"].is_object());
    assert_eq!(report["totals"]["passed"], 2);
    assert_eq!(report["totals"]["failed"], 0);

    // Nothing left to resume
    let show = resumetest(dir.path(), &["--format", "json", "state", "show"]);
    let properties: serde_json::Value = serde_json::from_slice(&show.stdout).unwrap();
    assert!(properties
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["saved_state"].is_null()));
}

#[test]
fn relaunch_flag_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let output = resumetest(
        dir.path(),
        &["--format", "plain", "run", "reboot-demo", "--relaunch", "5"],
    );
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn state_clear_restarts_from_the_beginning() {
    let dir = TempDir::new().unwrap();

    let first = resumetest(dir.path(), &["--format", "plain", "run", "reboot-demo"]);
    assert_eq!(first.status.code(), Some(3));

    let clear = resumetest(dir.path(), &["state", "clear", "--app", "reboot-demo"]);
    assert_eq!(clear.status.code(), Some(0));

    let rerun = resumetest(dir.path(), &["--format", "json", "run", "reboot-demo"]);
    assert_eq!(rerun.status.code(), Some(3));
    let report: serde_json::Value = serde_json::from_slice(&rerun.stdout).unwrap();
    assert!(report["resumed_at"].is_null());
}
