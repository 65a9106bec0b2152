//! Error types shared across the gridfire workspace.

use std::fmt;

/// Result type for device execution operations.
pub type Result<T> = std::result::Result<T, GridfireError>;

/// Errors surfaced by buffers, programs, and device contexts.
///
/// Compilation, link, and load failures abort program construction and
/// propagate unchanged; there is no retry anywhere. Launch failures leave
/// the program reusable.
#[derive(Debug, thiserror::Error)]
pub enum GridfireError {
    /// Device memory could not be reserved.
    #[error("device allocation of {requested} bytes failed: {reason}")]
    Allocation {
        /// Requested allocation size in bytes.
        requested: usize,
        /// Driver or allocator diagnostic.
        reason: String,
    },

    /// Host data size does not match the buffer layout.
    #[error("shape mismatch: buffer holds {expected} bytes, host data is {actual} bytes")]
    Shape {
        /// Buffer size in bytes.
        expected: usize,
        /// Host data size in bytes.
        actual: usize,
    },

    /// The backend compiler rejected the kernel source.
    #[error("kernel compilation failed: {0}")]
    Compile(String),

    /// The compiled form did not contain exactly one visible entry symbol.
    #[error("expected exactly one visible entry symbol, found {found}")]
    Link {
        /// Number of visible entry symbols discovered.
        found: usize,
    },

    /// The compiled form could not be loaded into a device module.
    #[error("module load failed: {0}")]
    Load(String),

    /// Launch parameters were invalid or the device faulted during execution.
    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// A driver-level operation failed outside the categories above.
    #[error("driver error: {0}")]
    Driver(String),

    /// The requested backend is not compiled in or not present.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl GridfireError {
    /// Create an allocation error.
    pub fn allocation(requested: usize, reason: impl fmt::Display) -> Self {
        Self::Allocation {
            requested,
            reason: reason.to_string(),
        }
    }

    /// Create a launch error.
    pub fn launch(reason: impl fmt::Display) -> Self {
        Self::Launch(reason.to_string())
    }

    /// Create a driver error.
    pub fn driver(reason: impl fmt::Display) -> Self {
        Self::Driver(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = GridfireError::Shape {
            expected: 4096,
            actual: 4092,
        };
        assert_eq!(
            err.to_string(),
            "shape mismatch: buffer holds 4096 bytes, host data is 4092 bytes"
        );

        let err = GridfireError::Link { found: 2 };
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn helper_constructors() {
        let err = GridfireError::allocation(128, "out of memory");
        assert!(matches!(err, GridfireError::Allocation { requested: 128, .. }));
    }
}
