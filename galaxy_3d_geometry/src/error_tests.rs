//! Unit tests for error.rs
//!
//! Tests all Error variants, their Display output and the engine_err!/engine_bail! macros.

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_capacity_violation_display() {
    let err = Error::CapacityViolation("20 elements exceed capacity 16".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Capacity violation"));
    assert!(display.contains("20 elements exceed capacity 16"));
}

#[test]
fn test_invalid_handle_display() {
    let err = Error::InvalidHandle("Slot 7 is not allocated".to_string());
    assert_eq!(format!("{}", err), "Invalid handle: Slot 7 is not allocated");
}

#[test]
fn test_resource_exhaustion_display() {
    let err = Error::ResourceExhaustion("cannot grow".to_string());
    assert!(format!("{}", err).starts_with("Resource exhaustion"));
}

#[test]
fn test_invalid_operation_display() {
    let err = Error::InvalidOperation("index remap slot".to_string());
    assert!(format!("{}", err).contains("Invalid operation"));
}

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("glBufferData failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("glBufferData failed"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::InvalidHandle("x".to_string());
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::CapacityViolation("a".to_string());
    assert_eq!(err.clone(), err);
    assert_ne!(err, Error::CapacityViolation("b".to_string()));
}

// ============================================================================
// MACROS
// ============================================================================

fn bail_if_negative(value: i32) -> Result<i32> {
    if value < 0 {
        crate::engine_bail!("galaxy3d::error_test", InvalidOperation, "negative value {}", value);
    }
    Ok(value)
}

#[test]
fn test_engine_err_builds_variant() {
    let err = crate::engine_err!("galaxy3d::error_test", InvalidHandle, "slot {}", 3);
    assert_eq!(err, Error::InvalidHandle("slot 3".to_string()));
}

#[test]
fn test_engine_bail_returns_error() {
    assert_eq!(bail_if_negative(4), Ok(4));
    assert_eq!(
        bail_if_negative(-1),
        Err(Error::InvalidOperation("negative value -1".to_string()))
    );
}
