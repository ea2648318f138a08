use thiserror::Error;

/// Errors produced by the tiled GP engine.
///
/// `Clone` is deliberate: when a tile version fails, every task that
/// depends on it (directly or transitively) reports the same error
/// instead of reading stale data, so the error value travels through
/// the dataflow graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CovarError {
    /// Host or device memory exhaustion.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// Device runtime call failure. Fatal for the enclosing graph.
    #[error("device error: {0}")]
    Device(String),

    /// Bad parameter selector, malformed buffer, or similar caller error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Tile-grid dimensions inconsistent across one algorithm invocation.
    #[error("tile grid mismatch: expected {expected:?} tiles, got {got:?}")]
    GridMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// Cholesky factorization hit a non-positive-definite leading minor.
    /// `minor` is 1-based, matching the LAPACK `info` convention.
    #[error("matrix is not positive definite (leading minor {minor})")]
    NotPositiveDefinite { minor: usize },
}
