//! Posterior covariance and predictive variance.
//!
//! `V = Kmn·L^-ᵗ` (from the cross forward solve) turns the posterior
//! covariance into `Kmm − V·Vᵗ`; the diagonal-only variant touches just
//! the prior's diagonal tiles.

use std::sync::Arc;

use covar_core::{CovarError, Result};
use covar_kernels::{KernelBackend, Trans};
use covar_sched::Scheduler;

use crate::grid::{TiledMatrix, TiledVector};

fn check_prior(v: &TiledMatrix, prior: &TiledMatrix) -> Result<()> {
    if !prior.is_square_grid() {
        return Err(CovarError::GridMismatch {
            expected: (prior.grid_rows(), prior.grid_rows()),
            got: (prior.grid_rows(), prior.grid_cols()),
        });
    }
    if v.grid_rows() != prior.grid_rows() || v.tile_rows() != prior.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (prior.grid_rows(), prior.tile_rows()),
            got: (v.grid_rows(), v.tile_rows()),
        });
    }
    Ok(())
}

/// Subtract `V·Vᵗ` from the prior's diagonal tiles in place.
pub fn posterior_covariance_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    v: &TiledMatrix,
    prior: &mut TiledMatrix,
) -> Result<()> {
    check_prior(v, prior)?;
    for i in 0..prior.grid_rows() {
        for k in 0..v.grid_cols() {
            let bk = Arc::clone(backend);
            prior.set(
                i,
                i,
                sched.dataflow2(&prior.get(i, i), &v.get(i, k), move |c, vik| {
                    bk.syrk(c, vik)
                }),
            );
        }
    }
    Ok(())
}

/// Subtract `V·Vᵗ` from every prior tile in place — the full posterior
/// covariance block.
pub fn full_cov_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    v: &TiledMatrix,
    prior: &mut TiledMatrix,
) -> Result<()> {
    check_prior(v, prior)?;
    for i in 0..prior.grid_rows() {
        for j in 0..prior.grid_cols() {
            for k in 0..v.grid_cols() {
                let bk = Arc::clone(backend);
                prior.set(
                    i,
                    j,
                    sched.dataflow3(
                        &prior.get(i, j),
                        &v.get(i, k),
                        &v.get(j, k),
                        move |c, vik, vjk| bk.gemm(c, vik, vjk, Trans::NoTrans, Trans::Trans),
                    ),
                );
            }
        }
    }
    Ok(())
}

/// Extract the predictive variance — the diagonal of the (already
/// updated) posterior covariance — into a blocked vector.
pub fn prediction_uncertainty_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    posterior: &TiledMatrix,
    out: &mut TiledVector,
) -> Result<()> {
    if !posterior.is_square_grid() {
        return Err(CovarError::GridMismatch {
            expected: (posterior.grid_rows(), posterior.grid_rows()),
            got: (posterior.grid_rows(), posterior.grid_cols()),
        });
    }
    if out.n_tiles() != posterior.grid_rows() || out.block_len() != posterior.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (posterior.grid_rows(), posterior.tile_rows()),
            got: (out.n_tiles(), out.block_len()),
        });
    }
    for i in 0..posterior.grid_rows() {
        let bk = Arc::clone(backend);
        out.set(i, sched.dataflow1(&posterior.get(i, i), move |t| bk.diag(t)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use covar_kernels::CpuBackend;

    #[test]
    fn test_diagonal_subtraction() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        // V = [[1, 0], [1, 1]] -> V·Vᵗ = [[1, 1], [1, 2]]
        let v = TiledMatrix::from_dense(&[1.0, 0.0, 1.0, 1.0], 2, 2, 2, 2).unwrap();
        let mut prior = TiledMatrix::from_dense_square(&[3.0, 1.0, 1.0, 3.0], 2, 2).unwrap();
        posterior_covariance_tiled(&sched, &backend, &v, &mut prior).unwrap();
        let mut var = TiledVector::zeros(2, 1);
        prediction_uncertainty_tiled(&sched, &backend, &prior, &mut var).unwrap();
        assert_eq!(var.to_dense().unwrap(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_full_cov() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let v = TiledMatrix::from_dense(&[1.0, 0.0, 1.0, 1.0], 2, 2, 2, 2).unwrap();
        let mut prior = TiledMatrix::from_dense_square(&[3.0, 1.0, 1.0, 3.0], 2, 2).unwrap();
        full_cov_tiled(&sched, &backend, &v, &mut prior).unwrap();
        assert_eq!(prior.to_dense().unwrap(), vec![2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_grid_mismatch_rejected() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let v = TiledMatrix::zeros(2, 2, 3, 2);
        let mut prior = TiledMatrix::zeros(2, 2, 2, 2);
        assert!(matches!(
            posterior_covariance_tiled(&sched, &backend, &v, &mut prior),
            Err(CovarError::GridMismatch { .. })
        ));
    }
}
