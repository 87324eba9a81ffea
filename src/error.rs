//! Error types for the DDP solver.

use thiserror::Error;

/// Errors raised while building or running a [`Ddp`](crate::Ddp) solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DdpError {
    /// A horizon, dimension or solver parameter is zero or out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The initial state or control trajectory has no entries.
    #[error("Empty {0} trajectory")]
    EmptyTrajectory(&'static str),

    /// A trajectory does not match the declared dimensions.
    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A model function was never provided.
    #[error("Model function `{0}` is not set")]
    MissingFunction(&'static str),

    /// `Quu` could not be made positive-definite below the regularization cap.
    #[error("Regularization diverged: level {level} exceeds the cap")]
    RegularizationDiverged { level: u32 },
}

/// Result type for solver operations.
pub type DdpResult<T> = std::result::Result<T, DdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DdpError::EmptyTrajectory("state");
        assert_eq!(format!("{err}"), "Empty state trajectory");

        let err = DdpError::MissingFunction("dynamics");
        assert!(format!("{err}").contains("dynamics"));

        let err = DdpError::DimensionMismatch {
            what: "controls",
            expected: (1, 2),
            actual: (1, 3),
        };
        assert_eq!(format!("{err}"), "controls has shape (1, 3), expected (1, 2)");
    }

    #[test]
    fn test_regularization_error_carries_level() {
        let err = DdpError::RegularizationDiverged { level: 7 };
        assert!(err.to_string().contains('7'));
    }
}
