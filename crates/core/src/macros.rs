//! Assertion and logging macros for test bodies
//!
//! The assertion macros return [`TestStatus::Failed`](crate::TestStatus)
//! from the enclosing function when they fail, so they belong in run and
//! prerequisite functions. The logging macros work anywhere a handle is.

/// Fail the test unless `cond` holds
#[macro_export]
macro_rules! ut_assert {
    ($ut:expr, $cond:expr $(,)?) => {{
        let condition: bool = $cond;
        if !$ut.assert_true(condition, stringify!($cond)) {
            return $crate::TestStatus::Failed;
        }
    }};
}

/// Fail the test if `cond` holds
#[macro_export]
macro_rules! ut_assert_false {
    ($ut:expr, $cond:expr $(,)?) => {{
        let condition: bool = $cond;
        if !$ut.assert_false(condition, stringify!($cond)) {
            return $crate::TestStatus::Failed;
        }
    }};
}

#[macro_export]
macro_rules! ut_assert_eq {
    ($ut:expr, $left:expr, $right:expr $(,)?) => {{
        let (left, right) = ($left, $right);
        if !$ut.assert_equal(&left, &right, concat!(stringify!($left), " == ", stringify!($right))) {
            return $crate::TestStatus::Failed;
        }
    }};
}

#[macro_export]
macro_rules! ut_assert_ne {
    ($ut:expr, $left:expr, $right:expr $(,)?) => {{
        let (left, right) = ($left, $right);
        if !$ut.assert_not_equal(&left, &right, concat!(stringify!($left), " != ", stringify!($right))) {
            return $crate::TestStatus::Failed;
        }
    }};
}

/// Fail the test unless `result` is `Ok`
#[macro_export]
macro_rules! ut_assert_ok {
    ($ut:expr, $result:expr $(,)?) => {{
        let result = $result;
        if !$ut.assert_ok(&result, stringify!($result)) {
            return $crate::TestStatus::Failed;
        }
    }};
}

/// Fail the test unless `result` is `Err(expected)`
#[macro_export]
macro_rules! ut_assert_status {
    ($ut:expr, $result:expr, $expected:expr $(,)?) => {{
        let (result, expected) = ($result, $expected);
        if !$ut.assert_status_equal(&result, &expected, stringify!($result)) {
            return $crate::TestStatus::Failed;
        }
    }};
}

#[macro_export]
macro_rules! ut_log_error {
    ($ut:expr, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        $ut.log($crate::LogLevel::Error, &message)
    }};
}

#[macro_export]
macro_rules! ut_log_warning {
    ($ut:expr, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        $ut.log($crate::LogLevel::Warning, &message)
    }};
}

#[macro_export]
macro_rules! ut_log_info {
    ($ut:expr, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        $ut.log($crate::LogLevel::Info, &message)
    }};
}

#[macro_export]
macro_rules! ut_log_verbose {
    ($ut:expr, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        $ut.log($crate::LogLevel::Verbose, &message)
    }};
}
