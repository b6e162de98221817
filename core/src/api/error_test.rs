use alloc::string::ToString;

use pretty_assertions::assert_eq;

use super::*;
use crate::program::{DecodeError, LoadError};
use crate::scope::ScopeError;

#[test]
fn test_errors_convert_and_display() {
    let err: Error = ScopeError::StaleState.into();
    assert_eq!(
        err.to_string(),
        "scope error: state refers to memory that has been reclaimed"
    );
    assert!(err.is_recoverable());

    let err: Error = LoadError::MissingEntryPoint.into();
    assert_eq!(err.to_string(), "load error: entry point `main` not found");
    assert!(!err.is_recoverable());

    let err: Error = DecodeError::UnsupportedVersion {
        found: 9,
        expected: 1,
    }
    .into();
    assert_eq!(
        err.to_string(),
        "load error: unsupported archive version 9, expected 1"
    );
}

#[test]
fn test_run_errors_need_a_clear() {
    let err: Error = ScopeError::Run(RunError::trap("boom")).into();
    assert!(!err.is_recoverable());
    assert_eq!(err.to_string(), "scope error: run failed: trap: boom");
}
