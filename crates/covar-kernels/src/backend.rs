use covar_core::{Result, Tile};

/// Which side of the right-hand side the triangular matrix sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Whether an operand is applied transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    NoTrans,
    Trans,
}

/// Tile-level BLAS/LAPACK capability set consumed by the tiled
/// algorithms.
///
/// Every operation takes its inputs by reference and returns a freshly
/// owned output — the caller publishes that output as a new tile
/// version, so backends never mutate shared state. Each call is
/// synchronous on its own inputs; asynchrony lives entirely in the
/// scheduler above.
///
/// Conventions:
/// - factors are lower-triangular; after [`potrf`](Self::potrf) only
///   the lower triangle of the result is meaningful
/// - the level-3 update ops subtract: `C := C − op(A)·op(B)`
/// - dimension mismatches are reported as `InvalidArgument`, never UB
pub trait KernelBackend: Send + Sync + 'static {
    /// Cholesky-factor a square tile in place (new version).
    /// Reports `NotPositiveDefinite { minor }` on a non-PD leading
    /// minor, with `minor` 1-based as in LAPACK `info`.
    fn potrf(&self, a: &Tile) -> Result<Tile>;

    /// Solve `op(L)·X = B` (Left) or `X·op(L) = B` (Right) for X, with
    /// L lower-triangular non-unit. Returns X in B's shape.
    fn trsm(&self, l: &Tile, b: &Tile, side: Side, trans: Trans) -> Result<Tile>;

    /// Symmetric rank-k update: `C − A·Aᵗ`.
    fn syrk(&self, c: &Tile, a: &Tile) -> Result<Tile>;

    /// Schur-complement update: `C − op(A)·op(B)`.
    fn gemm(&self, c: &Tile, a: &Tile, b: &Tile, trans_a: Trans, trans_b: Trans) -> Result<Tile>;

    /// Triangular solve with a vector RHS: `op(L)·x = b`.
    fn trsv(&self, l: &Tile, x: &[f64], trans: Trans) -> Result<Vec<f64>>;

    /// General matrix-vector accumulate: `y + alpha·op(A)·x`.
    fn gemv(&self, y: &[f64], a: &Tile, x: &[f64], alpha: f64, trans: Trans) -> Result<Vec<f64>>;

    /// Rank-1 subtract: `A − x·yᵗ`.
    fn ger(&self, a: &Tile, x: &[f64], y: &[f64]) -> Result<Tile>;

    /// Inner product.
    fn dot(&self, x: &[f64], y: &[f64]) -> Result<f64>;

    /// Diagonal extraction.
    fn diag(&self, a: &Tile) -> Result<Vec<f64>>;

    /// Diagonal of a product, accumulated: `r + diag(A·B)`. Used for
    /// the trace contraction in hyperparameter gradients.
    fn dot_diag_gemm(&self, r: &[f64], a: &Tile, b: &Tile) -> Result<Vec<f64>>;
}
