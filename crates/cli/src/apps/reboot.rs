//! Memory lock demonstration
//!
//! [`LockGuard`] layers a firmware-style protection over a property store: a
//! one-byte control property and a lock that, once set, freezes both until
//! the next reset. The lock comes in two flavours. Writing `1` locks it
//! outright; writing an eight-byte key locks it until the same key is
//! written again. The lock itself is volatile, so a reset always releases it.
//!
//! The tests reset from a cleanup to restore the environment, mid-test to
//! prove each lock flavour clears, and from a replaced cleanup whenever a
//! keyed test leaves the lock engaged.

use resumetest_core::{
    ut_assert, ut_assert_eq, ut_assert_ne, ut_assert_ok, ut_assert_status, ut_log_error, ut_log_info,
    Attributes, Framework, Platform, PlatformError, Property, PropertyError, ResetKind, TestCase,
    TestStatus, UnitTest,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const TITLE: &str = "Memory Lock Reset Test";
pub const SHORT_TITLE: &str = "Memory_Lock_Reset_Test";
pub const VERSION: &str = "0.2";

pub const NAMESPACE: &str = "MemoryOverwriteRequest";
pub const CONTROL: &str = "Control";
pub const LOCK: &str = "ControlLock";

pub const UNLOCKED: u8 = 0x0;
pub const LOCKED: u8 = 0x1;
pub const LOCKED_WITH_KEY: u8 = 0x2;

pub const KEY_SIZE: usize = 8;

/// Attributes both properties must be written with
pub const ATTRIBUTES: Attributes = Attributes::NON_VOLATILE
    .union(Attributes::BOOTSERVICE_ACCESS)
    .union(Attributes::RUNTIME_ACCESS);

const BAD_ATTRIBUTES: Attributes = Attributes::NON_VOLATILE.union(Attributes::BOOTSERVICE_ACCESS);
const LOCK_STORED: Attributes = Attributes::BOOTSERVICE_ACCESS.union(Attributes::RUNTIME_ACCESS);

const KEY_1: [u8; KEY_SIZE] = [0xD5, 0x80, 0xC6, 0x1D, 0x84, 0x44, 0x4E, 0x87];
const KEY_2: [u8; KEY_SIZE] = [0x94, 0x88, 0x8F, 0xFE, 0x1D, 0x6C, 0xE0, 0x68];
const KEY_3: [u8; KEY_SIZE] = [0x81, 0x51, 0x1E, 0x00, 0xCB, 0xFE, 0x48, 0xD9];

/// Lock enforcement over an inner platform
///
/// The inner store holds the lock state byte followed by the key, if any.
/// Reads only ever return the state byte.
#[derive(Debug)]
pub struct LockGuard<P> {
    inner: P,
}

impl<P: Platform> LockGuard<P> {
    /// Wrap `inner`, recreating the control property if it is missing as
    /// firmware does on every boot
    pub fn provision(mut inner: P) -> Result<Self, PropertyError> {
        if let Err(PropertyError::NotFound) = inner.get_property(NAMESPACE, CONTROL) {
            debug!("Provisioning {}/{}", NAMESPACE, CONTROL);
            inner.set_property(NAMESPACE, CONTROL, ATTRIBUTES, &[0])?;
        }
        Ok(Self { inner })
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    /// Raw stored lock, state byte first
    fn stored_lock(&self) -> Result<Vec<u8>, PropertyError> {
        match self.inner.get_property(NAMESPACE, LOCK) {
            Ok(property) => Ok(property.value),
            Err(PropertyError::NotFound) => Ok(vec![UNLOCKED]),
            Err(e) => Err(e),
        }
    }

    pub fn lock_state(&self) -> u8 {
        self.stored_lock()
            .ok()
            .and_then(|value| value.first().copied())
            .unwrap_or(UNLOCKED)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state() != UNLOCKED
    }

    fn set_lock(&mut self, attributes: Attributes, value: &[u8]) -> Result<(), PropertyError> {
        let stored = self.stored_lock()?;
        match stored.first().copied().unwrap_or(UNLOCKED) {
            UNLOCKED => {}
            LOCKED_WITH_KEY => {
                // Only the matching key releases a keyed lock.
                if attributes == ATTRIBUTES && value.len() == KEY_SIZE && stored[1..] == *value {
                    debug!("Keyed lock released");
                    return self.inner.set_property(NAMESPACE, LOCK, LOCK_STORED, &[]);
                }
                return Err(PropertyError::AccessDenied);
            }
            _ => return Err(PropertyError::AccessDenied),
        }

        if attributes != ATTRIBUTES {
            return Err(PropertyError::InvalidParameter);
        }
        match value {
            [UNLOCKED] => Ok(()),
            [LOCKED] => self.inner.set_property(NAMESPACE, LOCK, LOCK_STORED, value),
            key if key.len() == KEY_SIZE => {
                let mut stored = Vec::with_capacity(KEY_SIZE + 1);
                stored.push(LOCKED_WITH_KEY);
                stored.extend_from_slice(key);
                self.inner.set_property(NAMESPACE, LOCK, LOCK_STORED, &stored)
            }
            _ => Err(PropertyError::InvalidParameter),
        }
    }
}

impl<P: Platform> Platform for LockGuard<P> {
    fn get_property(&self, namespace: &str, name: &str) -> Result<Property, PropertyError> {
        if namespace == NAMESPACE && name == LOCK {
            let state = self.stored_lock()?.first().copied().unwrap_or(UNLOCKED);
            return Ok(Property {
                attributes: ATTRIBUTES,
                value: vec![state],
            });
        }
        self.inner.get_property(namespace, name)
    }

    fn set_property(
        &mut self,
        namespace: &str,
        name: &str,
        attributes: Attributes,
        value: &[u8],
    ) -> Result<(), PropertyError> {
        if namespace != NAMESPACE {
            return self.inner.set_property(namespace, name, attributes, value);
        }

        match name {
            LOCK => self.set_lock(attributes, value),
            CONTROL => {
                if self.is_locked() {
                    return Err(PropertyError::AccessDenied);
                }
                if !value.is_empty() && (attributes != ATTRIBUTES || value.len() != 1) {
                    return Err(PropertyError::InvalidParameter);
                }
                self.inner.set_property(namespace, name, attributes, value)
            }
            _ => self.inner.set_property(namespace, name, attributes, value),
        }
    }

    fn supports_reset(&self, kind: ResetKind) -> bool {
        self.inner.supports_reset(kind)
    }

    fn reset(&mut self, kind: ResetKind) -> Result<(), PlatformError> {
        self.inner.reset(kind)
    }
}

fn read(ut: &mut UnitTest<'_>, name: &str) -> Result<Property, PropertyError> {
    ut.platform().get_property(NAMESPACE, name)
}

fn write(ut: &mut UnitTest<'_>, name: &str, attributes: Attributes, value: &[u8]) -> Result<(), PropertyError> {
    ut.platform().set_property(NAMESPACE, name, attributes, value)
}

fn lock_value(ut: &mut UnitTest<'_>) -> Result<Vec<u8>, PropertyError> {
    read(ut, LOCK).map(|p| p.value)
}

// Prerequisites

fn control_is_correct(ut: &mut UnitTest<'_>) -> TestStatus {
    match read(ut, CONTROL) {
        Ok(property) if property.attributes == ATTRIBUTES && property.size() == 1 => TestStatus::Passed,
        _ => TestStatus::PrereqNotMet,
    }
}

fn lock_in_state(ut: &mut UnitTest<'_>, state: u8) -> TestStatus {
    match lock_value(ut) {
        Ok(value) if value == [state] => TestStatus::Passed,
        _ => TestStatus::PrereqNotMet,
    }
}

fn lock_not_set(ut: &mut UnitTest<'_>) -> TestStatus {
    lock_in_state(ut, UNLOCKED)
}

fn lock_is_set(ut: &mut UnitTest<'_>) -> TestStatus {
    lock_in_state(ut, LOCKED)
}

fn keyed_lock_is_set(ut: &mut UnitTest<'_>) -> TestStatus {
    lock_in_state(ut, LOCKED_WITH_KEY)
}

// Cleanups

/// Reset from cleanup so the next boot starts from a clean environment
fn reset_in_cleanup(ut: &mut UnitTest<'_>) {
    ut_log_info!(ut, "Resetting to restore the boot environment");
    let result = ut
        .save_state(None)
        .and_then(|()| ut.reset_system(ResetKind::Cold));
    if let Err(e) = result {
        ut_log_error!(ut, "Cleanup reset failed: {}", e);
    }
}

/// Arrange a cleanup reset if the lock is still engaged
fn reset_if_locked(ut: &mut UnitTest<'_>) {
    match lock_value(ut) {
        Ok(value) if value == [UNLOCKED] => {}
        _ => {
            ut_log_info!(ut, "Lock left engaged; cleanup will reset");
            ut.replace_cleanup(reset_in_cleanup);
        }
    }
}

/// Run a keyed test that must leave the lock released for the next one
fn isolated(run: fn(&mut UnitTest<'_>) -> TestStatus) -> impl FnMut(&mut UnitTest<'_>) -> TestStatus {
    move |ut| {
        let status = run(ut);
        reset_if_locked(ut);
        status
    }
}

// Boot environment

fn control_exists(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_ok!(ut, read(ut, CONTROL));
    TestStatus::Passed
}

fn control_has_correct_size(ut: &mut UnitTest<'_>) -> TestStatus {
    let size = read(ut, CONTROL).map(|p| p.size());
    ut_assert_eq!(ut, size, Ok(1));
    TestStatus::Passed
}

fn control_has_correct_attributes(ut: &mut UnitTest<'_>) -> TestStatus {
    let attributes = read(ut, CONTROL).map(|p| p.attributes);
    ut_assert_eq!(ut, attributes, Ok(ATTRIBUTES));
    TestStatus::Passed
}

fn control_enforces_attributes(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_ok!(ut, write(ut, CONTROL, Attributes::NONE, &[]));
    ut_assert_status!(
        ut,
        write(ut, CONTROL, BAD_ATTRIBUTES, &[0]),
        PropertyError::InvalidParameter
    );
    TestStatus::Passed
}

// Shared lock behaviour

fn control_changes_when_unlocked(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_ok!(ut, write(ut, CONTROL, ATTRIBUTES, &[1]));
    let value = read(ut, CONTROL).map(|p| p.value);
    ut_assert_eq!(ut, value, Ok(vec![1]));
    ut_assert_ok!(ut, write(ut, CONTROL, ATTRIBUTES, &[0]));
    TestStatus::Passed
}

fn lock_rejects_bad_attributes(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(ut, write(ut, LOCK, BAD_ATTRIBUTES, &[LOCKED]), PropertyError::InvalidParameter);
    TestStatus::Passed
}

fn control_frozen_when_locked(ut: &mut UnitTest<'_>) -> TestStatus {
    let current = match read(ut, CONTROL) {
        Ok(property) => property.value.first().copied().unwrap_or(0),
        Err(e) => {
            ut_log_error!(ut, "Could not read the control property: {}", e);
            return TestStatus::Failed;
        }
    };
    let flipped = if current == 0 { 1 } else { 0 };
    ut_assert_status!(ut, write(ut, CONTROL, ATTRIBUTES, &[flipped]), PropertyError::AccessDenied);
    TestStatus::Passed
}

fn lock_not_deletable(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(ut, write(ut, LOCK, Attributes::NONE, &[]), PropertyError::AccessDenied);
    TestStatus::Passed
}

/// Carried across the reset in the test's context
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResetFixture {
    pub post_reset: bool,
}

fn lock_clears_after_reset(ut: &mut UnitTest<'_>) -> TestStatus {
    let fixture: ResetFixture = match ut.fixture() {
        Ok(fixture) => fixture.unwrap_or_default(),
        Err(e) => {
            ut_log_error!(ut, "Unreadable context: {}", e);
            return TestStatus::Failed;
        }
    };

    if !fixture.post_reset {
        ut_log_info!(ut, "Going down for a warm reset");
        let next = match serde_json::to_vec(&ResetFixture { post_reset: true }) {
            Ok(next) => next,
            Err(e) => {
                ut_log_error!(ut, "Could not encode context: {}", e);
                return TestStatus::Failed;
            }
        };
        return match ut.save_and_reset(Some(next.as_slice()), ResetKind::Warm) {
            Ok(status) => status,
            Err(e) => {
                ut_log_error!(ut, "Reset failed: {}", e);
                TestStatus::Failed
            }
        };
    }

    ut_assert!(ut, ut.is_resumed());
    ut_assert_eq!(ut, lock_value(ut), Ok(vec![UNLOCKED]));
    TestStatus::Passed
}

// Unkeyed lock

fn lock_rejects_bad_value(ut: &mut UnitTest<'_>) -> TestStatus {
    let result = write(ut, LOCK, ATTRIBUTES, &[0xAA]);
    if result.is_ok() {
        ut.replace_cleanup(reset_in_cleanup);
    }
    ut_assert_status!(ut, result, PropertyError::InvalidParameter);
    TestStatus::Passed
}

fn lock_rejects_bad_size(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(
        ut,
        write(ut, LOCK, ATTRIBUTES, &[LOCKED, LOCKED]),
        PropertyError::InvalidParameter
    );
    TestStatus::Passed
}

fn lock_is_settable(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_ok!(ut, write(ut, LOCK, ATTRIBUTES, &[LOCKED]));
    TestStatus::Passed
}

fn lock_reports_locked(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_eq!(ut, lock_value(ut), Ok(vec![LOCKED]));
    TestStatus::Passed
}

fn lock_frozen_when_locked(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(ut, write(ut, LOCK, ATTRIBUTES, &[UNLOCKED]), PropertyError::AccessDenied);
    TestStatus::Passed
}

// Keyed lock

fn keyed_lock_rejects_short_key(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(
        ut,
        write(ut, LOCK, ATTRIBUTES, &KEY_1[..KEY_SIZE - 1]),
        PropertyError::InvalidParameter
    );
    TestStatus::Passed
}

fn keyed_lock_rejects_long_key(ut: &mut UnitTest<'_>) -> TestStatus {
    let mut long = KEY_1.to_vec();
    long.push(0);
    ut_assert_status!(ut, write(ut, LOCK, ATTRIBUTES, &long), PropertyError::InvalidParameter);
    TestStatus::Passed
}

fn keyed_lock_rejects_missing_key(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(
        ut,
        write(ut, LOCK, ATTRIBUTES, &[LOCKED_WITH_KEY]),
        PropertyError::InvalidParameter
    );
    TestStatus::Passed
}

fn keyed_lock_is_settable(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_ok!(ut, write(ut, LOCK, ATTRIBUTES, &KEY_1));
    TestStatus::Passed
}

fn keyed_lock_reports_locked(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_eq!(ut, lock_value(ut), Ok(vec![LOCKED_WITH_KEY]));
    TestStatus::Passed
}

fn keyed_lock_reads_one_byte(ut: &mut UnitTest<'_>) -> TestStatus {
    let size = read(ut, LOCK).map(|p| p.size());
    ut_assert_eq!(ut, size, Ok(1));
    TestStatus::Passed
}

fn keyed_lock_hides_key(ut: &mut UnitTest<'_>) -> TestStatus {
    let value = match lock_value(ut) {
        Ok(value) => value,
        Err(e) => {
            ut_log_error!(ut, "Could not read the lock: {}", e);
            return TestStatus::Failed;
        }
    };
    for key in [KEY_1, KEY_2, KEY_3] {
        ut_assert_ne!(ut, value.as_slice(), &key[..]);
    }
    TestStatus::Passed
}

fn keyed_lock_rejects_other_key(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(ut, write(ut, LOCK, ATTRIBUTES, &KEY_2), PropertyError::AccessDenied);
    TestStatus::Passed
}

fn keyed_lock_rejects_unkeyed(ut: &mut UnitTest<'_>) -> TestStatus {
    ut_assert_status!(ut, write(ut, LOCK, ATTRIBUTES, &[LOCKED]), PropertyError::AccessDenied);
    TestStatus::Passed
}

/// Lock with `key` and confirm the lock reports keyed
fn engage(ut: &mut UnitTest<'_>, key: &[u8; KEY_SIZE]) -> bool {
    let result = write(ut, LOCK, ATTRIBUTES, key);
    if !ut.assert_ok(&result, "lock with key") {
        return false;
    }
    let value = lock_value(ut);
    ut.assert_equal(&value, &Ok(vec![LOCKED_WITH_KEY]), "keyed lock engaged")
}

/// Release with `key` and confirm the lock reports unlocked
fn release(ut: &mut UnitTest<'_>, key: &[u8; KEY_SIZE]) -> bool {
    let result = write(ut, LOCK, ATTRIBUTES, key);
    if !ut.assert_ok(&result, "release with key") {
        return false;
    }
    let value = lock_value(ut);
    ut.assert_equal(&value, &Ok(vec![UNLOCKED]), "keyed lock released")
}

fn keyed_lock_clears_with_key(ut: &mut UnitTest<'_>) -> TestStatus {
    (engage(ut, &KEY_1) && release(ut, &KEY_1)).into()
}

fn keyed_lock_holds_against_wrong_key(ut: &mut UnitTest<'_>) -> TestStatus {
    if !engage(ut, &KEY_1) {
        return TestStatus::Failed;
    }
    ut_assert_status!(ut, write(ut, LOCK, ATTRIBUTES, &KEY_2), PropertyError::AccessDenied);
    ut_assert_eq!(ut, lock_value(ut), Ok(vec![LOCKED_WITH_KEY]));
    TestStatus::Passed
}

fn keyed_lock_releases_control(ut: &mut UnitTest<'_>) -> TestStatus {
    if !(engage(ut, &KEY_1) && release(ut, &KEY_1)) {
        return TestStatus::Failed;
    }
    control_changes_when_unlocked(ut)
}

fn keyed_lock_set_clear_set(ut: &mut UnitTest<'_>) -> TestStatus {
    if !(engage(ut, &KEY_1) && release(ut, &KEY_1) && engage(ut, &KEY_2)) {
        return TestStatus::Failed;
    }
    ut_assert_status!(ut, write(ut, LOCK, ATTRIBUTES, &KEY_3), PropertyError::AccessDenied);
    ut_assert_eq!(ut, lock_value(ut), Ok(vec![LOCKED_WITH_KEY]));
    TestStatus::Passed
}

/// Register the lock suites
pub fn framework() -> resumetest_core::Result<Framework> {
    let mut fw = Framework::new(TITLE, SHORT_TITLE, VERSION)?;

    let env = fw.create_suite("Boot Environment Tests", None, None)?;
    fw.add_test(env, TestCase::new("On any boot the control property should exist", control_exists))?;
    fw.add_test(env, TestCase::new("The control property should be one byte", control_has_correct_size))?;
    fw.add_test(
        env,
        TestCase::new("The control property should have the expected attributes", control_has_correct_attributes),
    )?;
    fw.add_test(
        env,
        TestCase::new(
            "The control property should not be creatable with bad attributes",
            control_enforces_attributes,
        )
        .cleanup(reset_in_cleanup),
    )?;

    let lock = fw.create_suite("Lock Tests", None, None)?;
    fw.add_test(
        lock,
        TestCase::new("Should be able to change the control property when unlocked", control_changes_when_unlocked)
            .prerequisite(control_is_correct),
    )?;
    fw.add_test(
        lock,
        TestCase::new("Should not be able to set the lock with a bad value", lock_rejects_bad_value)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        lock,
        TestCase::new("Should not be able to set the lock with a bad buffer size", lock_rejects_bad_size)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        lock,
        TestCase::new("Should not be able to set the lock with bad attributes", lock_rejects_bad_attributes)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        lock,
        TestCase::new("Should be able to set the lock", lock_is_settable).prerequisite(lock_not_set),
    )?;
    fw.add_test(lock, TestCase::new("Should report locked once set", lock_reports_locked))?;
    fw.add_test(
        lock,
        TestCase::new("Should not be able to change the control property when locked", control_frozen_when_locked)
            .prerequisite(lock_is_set),
    )?;
    fw.add_test(
        lock,
        TestCase::new("Should not be able to change the lock when locked", lock_frozen_when_locked)
            .prerequisite(lock_is_set),
    )?;
    fw.add_test(
        lock,
        TestCase::new("Should not be able to delete the lock when locked", lock_not_deletable)
            .prerequisite(lock_is_set),
    )?;
    fw.add_test(
        lock,
        TestCase::new("The lock should clear after a reset", lock_clears_after_reset)
            .prerequisite(lock_is_set)
            .with_fixture(&ResetFixture::default())?,
    )?;

    let keyed = fw.create_suite("Keyed Lock Tests", None, None)?;
    fw.add_test(
        keyed,
        TestCase::new(
            "Should be able to change the control property before keying the lock",
            control_changes_when_unlocked,
        )
        .prerequisite(control_is_correct),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to key the lock with a short key", keyed_lock_rejects_short_key)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to key the lock with a long key", keyed_lock_rejects_long_key)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to key the lock without a key", keyed_lock_rejects_missing_key)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to key the lock with bad attributes", lock_rejects_bad_attributes)
            .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should be able to key the lock", keyed_lock_is_settable).prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should report keyed once keyed", keyed_lock_reports_locked),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should read back one byte when keyed", keyed_lock_reads_one_byte)
            .prerequisite(keyed_lock_is_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not read back the key when keyed", keyed_lock_hides_key)
            .prerequisite(keyed_lock_is_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to change the control property when keyed", control_frozen_when_locked)
            .prerequisite(keyed_lock_is_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to change the key when keyed", keyed_lock_rejects_other_key)
            .prerequisite(keyed_lock_is_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to switch to the unkeyed lock when keyed", keyed_lock_rejects_unkeyed)
            .prerequisite(keyed_lock_is_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("Should not be able to delete the lock when keyed", lock_not_deletable)
            .prerequisite(keyed_lock_is_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("The keyed lock should clear after a reset", lock_clears_after_reset)
            .prerequisite(keyed_lock_is_set)
            .with_fixture(&ResetFixture::default())?,
    )?;

    // From here on each test leaves the lock released or resets from cleanup.
    fw.add_test(
        keyed,
        TestCase::new(
            "The keyed lock should not clear with a different key",
            isolated(keyed_lock_holds_against_wrong_key),
        )
        .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new(
            "Should be able to change keys by keying, clearing and keying again",
            isolated(keyed_lock_set_clear_set),
        )
        .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new(
            "Should be able to change the control property after keying and clearing",
            isolated(keyed_lock_releases_control),
        )
        .prerequisite(lock_not_set),
    )?;
    fw.add_test(
        keyed,
        TestCase::new("The keyed lock should clear with the same key", isolated(keyed_lock_clears_with_key))
            .prerequisite(lock_not_set),
    )?;

    Ok(fw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumetest_core::{MemoryPlatform, PrereqPolicy, RunOutcome, Runner, RunnerConfig, TestResult};

    /// Run one launch against `inner`, handing the platform back
    fn launch(inner: MemoryPlatform, config: &RunnerConfig) -> (Framework, RunOutcome, MemoryPlatform) {
        let mut guard = LockGuard::provision(inner).unwrap();
        let mut fw = framework().unwrap();
        let summary = Runner::new(&mut guard, config.clone())
            .run_all(&mut fw)
            .unwrap();
        (fw, summary.outcome, guard.into_inner())
    }

    /// Launch until completion, collecting every lifetime's framework
    fn launch_until_complete(config: &RunnerConfig) -> (Vec<Framework>, Vec<RunOutcome>, MemoryPlatform) {
        let mut platform = MemoryPlatform::new();
        let (mut lifetimes, mut outcomes) = (Vec::new(), Vec::new());
        loop {
            let (fw, outcome, next) = launch(platform, config);
            platform = next;
            lifetimes.push(fw);
            outcomes.push(outcome);
            if outcome == RunOutcome::Completed || outcomes.len() > 10 {
                return (lifetimes, outcomes, platform);
            }
        }
    }

    fn result_of(lifetimes: &[Framework], description: &str) -> TestResult {
        lifetimes
            .iter()
            .flat_map(|fw| fw.tests())
            .filter(|t| t.description() == description)
            .map(|t| t.result())
            .find(|r| *r != TestResult::NotRun)
            .unwrap_or(TestResult::NotRun)
    }

    #[test]
    fn test_guard_enforces_lock() {
        let mut guard = LockGuard::provision(MemoryPlatform::new()).unwrap();
        assert_eq!(guard.get_property(NAMESPACE, LOCK).unwrap().value, vec![UNLOCKED]);
        assert_eq!(
            guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &[7]),
            Err(PropertyError::InvalidParameter)
        );

        guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &[LOCKED]).unwrap();
        assert!(guard.is_locked());
        assert_eq!(
            guard.set_property(NAMESPACE, CONTROL, ATTRIBUTES, &[1]),
            Err(PropertyError::AccessDenied)
        );
        assert_eq!(
            guard.set_property(NAMESPACE, LOCK, Attributes::NONE, &[]),
            Err(PropertyError::AccessDenied)
        );

        guard.reset(ResetKind::Warm).unwrap();
        assert!(!guard.is_locked());
        assert!(guard.get_property(NAMESPACE, CONTROL).is_ok());
    }

    #[test]
    fn test_guard_enforces_keyed_lock() {
        let mut guard = LockGuard::provision(MemoryPlatform::new()).unwrap();
        assert_eq!(
            guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &KEY_1[..7]),
            Err(PropertyError::InvalidParameter)
        );

        guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &KEY_1).unwrap();
        assert_eq!(guard.lock_state(), LOCKED_WITH_KEY);
        assert_eq!(
            guard.get_property(NAMESPACE, LOCK).unwrap().value,
            vec![LOCKED_WITH_KEY]
        );
        assert_eq!(
            guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &KEY_2),
            Err(PropertyError::AccessDenied)
        );
        assert_eq!(
            guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &[LOCKED]),
            Err(PropertyError::AccessDenied)
        );

        guard.set_property(NAMESPACE, LOCK, ATTRIBUTES, &KEY_1).unwrap();
        assert!(!guard.is_locked());
        guard.set_property(NAMESPACE, CONTROL, ATTRIBUTES, &[1]).unwrap();
    }

    #[test]
    fn test_all_lifetimes_pass() {
        let (lifetimes, outcomes, platform) = launch_until_complete(&RunnerConfig::default());

        assert_eq!(
            outcomes,
            [
                RunOutcome::SuspendedForReset(ResetKind::Cold),
                RunOutcome::SuspendedForReset(ResetKind::Warm),
                RunOutcome::SuspendedForReset(ResetKind::Warm),
                RunOutcome::SuspendedForReset(ResetKind::Cold),
                RunOutcome::SuspendedForReset(ResetKind::Cold),
                RunOutcome::Completed,
            ]
        );
        assert_eq!(platform.resets().len(), 5);

        for fw in &lifetimes {
            for test in fw.tests() {
                assert_ne!(test.result(), TestResult::Failed, "{}: {}", test.description(), test.log());
                assert_ne!(test.result(), TestResult::PrereqNotMet, "{}", test.description());
            }
        }

        let total = lifetimes[0].tests().count();
        let ran = (0..total)
            .filter(|&i| {
                lifetimes
                    .iter()
                    .any(|fw| fw.tests().nth(i).is_some_and(|t| t.result() == TestResult::Passed))
            })
            .count();
        assert_eq!(ran, total);
    }

    #[test]
    fn test_wrong_key_replaces_cleanup_with_reset() {
        let (lifetimes, _, _) = launch_until_complete(&RunnerConfig::default());

        let fourth = &lifetimes[3];
        let suspended = fourth.suspended_at().and_then(|id| fourth.test(id)).unwrap();
        assert_eq!(suspended.description(), "The keyed lock should not clear with a different key");
        assert!(suspended.log().contains("cleanup will reset"));

        // The clean release does not reset.
        let last = lifetimes.last().unwrap();
        let clean = last
            .tests()
            .find(|t| t.description() == "The keyed lock should clear with the same key")
            .unwrap();
        assert_eq!(clean.result(), TestResult::Passed);
        assert!(!clean.log().contains("cleanup will reset"));
    }

    #[test]
    fn test_reevaluated_prerequisite_skips_resumed_tests() {
        let config = RunnerConfig {
            resume_prerequisites: PrereqPolicy::Reevaluate,
            ..RunnerConfig::default()
        };

        let (lifetimes, outcomes, _) = launch_until_complete(&config);
        assert_eq!(outcomes.last(), Some(&RunOutcome::Completed));
        assert_eq!(
            result_of(&lifetimes, "The lock should clear after a reset"),
            TestResult::PrereqNotMet
        );
        assert_eq!(
            result_of(&lifetimes, "The keyed lock should clear after a reset"),
            TestResult::PrereqNotMet
        );
    }
}
