//! Error types for the frame graph.
//!
//! Only setup-time failures surface as errors: resource or heap creation
//! that fails has no meaningful per-frame recovery. Everything that can go
//! wrong while building or compiling a frame (bad handles, zero-sized
//! requests, dependency cycles, heap overflow) degrades softly instead and
//! is reported through the log and compile diagnostics.

use thiserror::Error;

/// Fatal graphics errors, propagated to the caller.
#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("Failed to initialize: {0}")]
    InitializationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create texture view: {0}")]
    ViewCreationFailed(String),
    #[error("Failed to allocate device memory: {0}")]
    AllocationFailed(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Out of memory")]
    OutOfMemory,
}

pub type GraphicsResult<T> = Result<T, GraphicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "Out of memory");

        let err = GraphicsError::AllocationFailed("heap exhausted".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to allocate device memory: heap exhausted"
        );
    }
}
