//! Integration tests for the logging system
//!
//! Errors raised by the geometry layer are logged through the global logger
//! before being returned.
//!
//! Run with: cargo test --test logging_integration_tests

use std::sync::{Arc, Mutex};

use galaxy_3d_geometry::galaxy3d::gpu::mock::{MockBufferObjectProvider, MockSyncObjectProvider};
use galaxy_3d_geometry::galaxy3d::log::{self, LogEntry, LogSeverity, Logger};
use galaxy_3d_geometry::galaxy3d::storage::{ContinuousBuffer, GeometryStore, RenderVertex};
use galaxy_3d_geometry::galaxy3d::Error;
use serial_test::serial;

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_errors_are_logged_with_location() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    let mut buffer = ContinuousBuffer::<u32>::new(16);
    let result = buffer.set_data(3, &[1, 2, 3]);
    assert!(matches!(result, Err(Error::InvalidHandle(_))));

    {
        let entries = entries.lock().unwrap();
        let error = entries
            .iter()
            .find(|entry| entry.severity == LogSeverity::Error)
            .expect("no error logged");
        assert_eq!(error.source, "galaxy3d::ContinuousBuffer");
        assert!(error.file.is_some());
        assert!(error.line.is_some());
    }

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_store_debug_messages_follow_min_severity() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);
    let previous = log::min_severity();

    log::set_min_severity(LogSeverity::Info);
    GeometryStore::<RenderVertex>::new(
        Arc::new(MockSyncObjectProvider::new()),
        &MockBufferObjectProvider::new(),
    )
    .unwrap();
    assert!(entries.lock().unwrap().iter().all(|entry| entry.source != "galaxy3d::GeometryStore"));

    log::set_min_severity(LogSeverity::Debug);
    GeometryStore::<RenderVertex>::new(
        Arc::new(MockSyncObjectProvider::new()),
        &MockBufferObjectProvider::new(),
    )
    .unwrap();
    assert!(entries
        .lock()
        .unwrap()
        .iter()
        .any(|entry| entry.source == "galaxy3d::GeometryStore" && entry.severity == LogSeverity::Debug));

    log::set_min_severity(previous);
    log::reset_logger();
}
