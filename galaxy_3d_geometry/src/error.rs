//! Error types for the Galaxy3D geometry layer
//!
//! Every error raised by the storage, winding and renderer modules is one of the
//! variants below. All of them describe caller bugs or exhausted resources: none
//! of them is worth retrying, since the data structures are deterministic.

use thiserror::Error as ThisError;

/// Result type for geometry layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Geometry layer errors
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A write or resize exceeded the capacity allocated to a slot
    #[error("Capacity violation: {0}")]
    CapacityViolation(String),

    /// Handle from the wrong pool, already freed, or out of range
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Growing a buffer failed (allocation failure or size overflow)
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Operation not permitted for this kind of slot or data
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Failure reported by a GPU buffer or sync object provider
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Build an [`Error`] and log it at ERROR severity.
///
/// # Example
///
/// ```ignore
/// let err = engine_err!("galaxy3d::ContinuousBuffer", InvalidHandle,
///     "Slot {} is not allocated", handle);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::error::Error::$kind(message)
    }};
}

/// Log an error and return it from the current function.
///
/// # Example
///
/// ```ignore
/// if data.len() > capacity {
///     engine_bail!("galaxy3d::ContinuousBuffer", CapacityViolation,
///         "{} elements exceed capacity {}", data.len(), capacity);
/// }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $kind, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
