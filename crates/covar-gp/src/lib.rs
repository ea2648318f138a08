//! # covar-gp
//!
//! Tiled Gaussian-process regression over the dataflow scheduler.
//!
//! The training pipeline on an `n_tiles × n_tiles` covariance grid:
//!
//! 1. [`cholesky::cholesky_tiled`] — `K = L·Lᵗ` in place
//! 2. [`solve::forward_solve_tiled`] + [`solve::backward_solve_tiled`]
//!    — `α = K⁻¹·y`
//! 3. [`predict::prediction_tiled`] — posterior mean from the
//!    cross-covariance tiles
//! 4. [`solve::forward_solve_cross_tiled`] → `V = Kmn·L^-ᵗ`, then
//!    [`uncertainty::posterior_covariance_tiled`] and
//!    [`uncertainty::prediction_uncertainty_tiled`] — predictive variance
//! 5. [`optimize`] — marginal-likelihood gradients and Adam steps on the
//!    kernel hyperparameters; [`predict::compute_loss_tiled`] for the
//!    training loss
//!
//! Every function only issues dependency-gated tasks; nothing blocks
//! until a handle's `get()`. Errors poison downstream tiles instead of
//! aborting the graph.

pub mod cholesky;
pub mod grid;
pub mod optimize;
pub mod predict;
pub mod solve;
pub mod uncertainty;

pub use cholesky::cholesky_tiled;
pub use grid::{BlockHandle, TileHandle, TiledMatrix, TiledVector};
pub use optimize::{
    update_grad_tiles, update_hyperparameter, update_hyperparameter_indexed,
    update_noise_variance,
};
pub use predict::{compute_loss_tiled, prediction_tiled};
pub use solve::{
    backward_solve_cross_tiled, backward_solve_matrix_tiled, backward_solve_tiled,
    forward_solve_cross_tiled, forward_solve_matrix_tiled, forward_solve_tiled,
};
pub use uncertainty::{full_cov_tiled, posterior_covariance_tiled, prediction_uncertainty_tiled};
