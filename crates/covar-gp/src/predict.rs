//! Posterior mean prediction and the tiled training loss.

use std::sync::Arc;

use covar_core::{CovarError, Result};
use covar_kernels::{KernelBackend, Trans};
use covar_sched::{Handle, Scheduler};

use crate::grid::{TiledMatrix, TiledVector};

/// Posterior mean `out = cross · weights` as a per-row gemv reduction.
///
/// Each output block starts from zero and accumulates its row of tiles
/// in a sequential chain; distinct rows run independently. Existing
/// versions in `out` are discarded.
pub fn prediction_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    cross: &TiledMatrix,
    weights: &TiledVector,
    out: &mut TiledVector,
) -> Result<()> {
    if cross.grid_cols() != weights.n_tiles() || cross.tile_cols() != weights.block_len() {
        return Err(CovarError::GridMismatch {
            expected: (cross.grid_cols(), cross.tile_cols()),
            got: (weights.n_tiles(), weights.block_len()),
        });
    }
    if out.n_tiles() != cross.grid_rows() || out.block_len() != cross.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (cross.grid_rows(), cross.tile_rows()),
            got: (out.n_tiles(), out.block_len()),
        });
    }

    for i in 0..cross.grid_rows() {
        out.set(i, Handle::ready(vec![0.0; cross.tile_rows()]));
        for k in 0..cross.grid_cols() {
            let bk = Arc::clone(backend);
            out.set(
                i,
                sched.dataflow3(
                    &out.get(i),
                    &cross.get(i, k),
                    &weights.get(k),
                    move |acc, tile, w| bk.gemv(acc, tile, w, 1.0, Trans::NoTrans),
                ),
            );
        }
    }
    Ok(())
}

/// Negative log marginal likelihood of the training data:
/// `0.5·yᵗα + Σ ln L_ii + 0.5·N·ln 2π`, with `α = K⁻¹y`.
///
/// Each diagonal tile contributes its slice of the data-fit and
/// log-determinant terms; the constant is added in the final reduce.
/// Returns a scalar handle — `get()` is the terminal sync.
pub fn compute_loss_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    factor: &TiledMatrix,
    alpha: &TiledVector,
    y: &TiledVector,
) -> Result<Handle<f64>> {
    if !factor.is_square_grid() {
        return Err(CovarError::GridMismatch {
            expected: (factor.grid_rows(), factor.grid_rows()),
            got: (factor.grid_rows(), factor.grid_cols()),
        });
    }
    if alpha.n_tiles() != factor.grid_rows()
        || alpha.block_len() != factor.tile_rows()
        || y.n_tiles() != factor.grid_rows()
        || y.block_len() != factor.tile_rows()
    {
        return Err(CovarError::GridMismatch {
            expected: (factor.grid_rows(), factor.tile_rows()),
            got: (alpha.n_tiles(), alpha.block_len()),
        });
    }

    let parts: Vec<Handle<f64>> = (0..factor.grid_rows())
        .map(|k| {
            let bk = Arc::clone(backend);
            sched.dataflow3(
                &factor.get(k, k),
                &alpha.get(k),
                &y.get(k),
                move |lkk, ak, yk| {
                    let fit = bk.dot(yk, ak)?;
                    let mut logdet = 0.0;
                    for i in 0..lkk.rows() {
                        logdet += lkk.at(i, i).ln();
                    }
                    Ok(0.5 * fit + logdet)
                },
            )
        })
        .collect();

    let n = (factor.grid_rows() * factor.tile_rows()) as f64;
    let constant = 0.5 * n * (2.0 * std::f64::consts::PI).ln();
    Ok(sched.reduce(&parts, move |vs| {
        Ok(vs.iter().map(|v| **v).sum::<f64>() + constant)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use covar_kernels::CpuBackend;

    #[test]
    fn test_prediction_single_tile() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let cross = TiledMatrix::from_dense(&[1.0, 2.0, 3.0, 4.0], 2, 2, 1, 1).unwrap();
        let w = TiledVector::from_dense(&[1.0, 1.0], 1).unwrap();
        let mut out = TiledVector::zeros(1, 2);
        prediction_tiled(&sched, &backend, &cross, &w, &mut out).unwrap();
        assert_eq!(out.to_dense().unwrap(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_prediction_overwrites_previous_output() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let cross = TiledMatrix::from_dense(&[2.0], 1, 1, 1, 1).unwrap();
        let w = TiledVector::from_dense(&[3.0], 1).unwrap();
        let mut out = TiledVector::from_dense(&[99.0], 1).unwrap();
        prediction_tiled(&sched, &backend, &cross, &w, &mut out).unwrap();
        assert_eq!(out.to_dense().unwrap(), vec![6.0]);
    }

    #[test]
    fn test_loss_identity_covariance() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        // K = I -> L = I, alpha = y, loss = 0.5 yᵗy + 0.5 n ln 2π.
        let factor = TiledMatrix::from_dense_square(&[1.0, 0.0, 0.0, 1.0], 2, 1).unwrap();
        let y = TiledVector::from_dense(&[1.0, 2.0], 1).unwrap();
        let alpha = TiledVector::from_dense(&[1.0, 2.0], 1).unwrap();
        let loss = compute_loss_tiled(&sched, &backend, &factor, &alpha, &y).unwrap();
        let expected = 0.5 * 5.0 + 0.5 * 2.0 * (2.0 * std::f64::consts::PI).ln();
        assert!((*loss.get().unwrap() - expected).abs() < 1e-12);
    }
}
