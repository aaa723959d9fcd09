//! Sample application
//!
//! Two small suites. Shared state lives in an explicit fixture captured by
//! the tests that use it.

use resumetest_core::{ut_assert, ut_assert_eq, ut_log_info, Framework, TestCase, TestStatus, UnitTest};
use std::cell::RefCell;
use std::rc::Rc;

pub const TITLE: &str = "Sample Unit Test Application";
pub const SHORT_TITLE: &str = "Sample_Unit_Test_App";
pub const VERSION: &str = "0.1";

#[derive(Debug, Default)]
struct Shared {
    flag: bool,
    slot: Option<u64>,
}

type Fixture = Rc<RefCell<Shared>>;

fn one_plus_one(ut: &mut UnitTest<'_>) -> TestStatus {
    let (a, b) = (1u64, 1u64);
    ut_assert_eq!(ut, a + b, 2);
    TestStatus::Passed
}

fn flag_is_changeable(fixture: &Fixture, ut: &mut UnitTest<'_>) -> TestStatus {
    fixture.borrow_mut().flag = true;
    ut_assert!(ut, fixture.borrow().flag);

    fixture.borrow_mut().flag = false;
    ut_assert!(ut, !fixture.borrow().flag);
    TestStatus::Passed
}

fn slot_is_empty(fixture: &Fixture, _: &mut UnitTest<'_>) -> TestStatus {
    fixture.borrow().slot.is_none().into()
}

fn slot_is_changeable(fixture: &Fixture, ut: &mut UnitTest<'_>) -> TestStatus {
    fixture.borrow_mut().slot = Some(u64::MAX);
    ut_assert_eq!(ut, fixture.borrow().slot, Some(u64::MAX));
    TestStatus::Passed
}

fn clear_slot(fixture: &Fixture, ut: &mut UnitTest<'_>) {
    fixture.borrow_mut().slot = None;
    ut_log_info!(ut, "Slot cleared");
}

/// Register the sample suites
pub fn framework() -> resumetest_core::Result<Framework> {
    let mut fw = Framework::new(TITLE, SHORT_TITLE, VERSION)?;

    let math = fw.create_suite("Simple Math Tests", None, None)?;
    fw.add_test(math, TestCase::new("Adding 1 to 1 should produce 2", one_plus_one))?;

    let fixture = Fixture::default();
    let shared = fw.create_suite("Shared Fixture Tests", None, None)?;

    let f = fixture.clone();
    fw.add_test(
        shared,
        TestCase::new("You should be able to change a shared boolean", move |ut| {
            flag_is_changeable(&f, ut)
        }),
    )?;

    let (prereq, body, cleanup) = (fixture.clone(), fixture.clone(), fixture);
    fw.add_test(
        shared,
        TestCase::new("You should be able to change a shared slot", move |ut| {
            slot_is_changeable(&body, ut)
        })
        .prerequisite(move |ut| slot_is_empty(&prereq, ut))
        .cleanup(move |ut| clear_slot(&cleanup, ut)),
    )?;

    Ok(fw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumetest_core::{MemoryPlatform, RunOutcome, Runner, RunnerConfig, TestResult};

    #[test]
    fn test_sample_passes() {
        let mut fw = framework().unwrap();
        let mut platform = MemoryPlatform::new();
        let summary = Runner::new(&mut platform, RunnerConfig::default())
            .run_all(&mut fw)
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        let report = summary.report.unwrap();
        assert_eq!(report.suites.len(), 2);
        assert_eq!(report.totals.passed, 3);
        assert!(fw.tests().all(|t| t.result() == TestResult::Passed));

        let slot = fw.tests().last().unwrap();
        assert!(slot.log().contains("[INFO] Slot cleared"));
    }
}
