//! Hyperparameter gradients and Adam updates over the tiled graph.
//!
//! The marginal-likelihood gradient w.r.t. a kernel hyperparameter θ is
//! `0.5·tr((K⁻¹ − α·αᵗ)·∂K/∂θ)`. The `W = K⁻¹ − α·αᵗ` tiles come from a
//! `ger` sweep over the inverse tiles; the trace is contracted per
//! diagonal block with `dot_diag_gemm` and reduced to one scalar. The
//! noise variance has a shorter path that never forms derivative tiles.

use std::sync::Arc;

use covar_core::{
    softplus_derivative, to_unconstrained, CovarError, HyperParam, HyperparameterState, Result,
};
use covar_kernels::KernelBackend;
use covar_sched::{Handle, Scheduler};

use crate::grid::{TiledMatrix, TiledVector};

fn check_square(m: &TiledMatrix) -> Result<()> {
    if !m.is_square_grid() {
        return Err(CovarError::GridMismatch {
            expected: (m.grid_rows(), m.grid_rows()),
            got: (m.grid_rows(), m.grid_cols()),
        });
    }
    Ok(())
}

/// Turn `K⁻¹` tiles into `W = K⁻¹ − α·αᵗ` in place via a `ger` sweep.
pub fn update_grad_tiles<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    tiles: &mut TiledMatrix,
    alpha: &TiledVector,
) -> Result<()> {
    check_square(tiles)?;
    if alpha.n_tiles() != tiles.grid_rows() || alpha.block_len() != tiles.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (tiles.grid_rows(), tiles.tile_rows()),
            got: (alpha.n_tiles(), alpha.block_len()),
        });
    }
    for i in 0..tiles.grid_rows() {
        for j in 0..tiles.grid_cols() {
            let bk = Arc::clone(backend);
            tiles.set(
                i,
                j,
                sched.dataflow3(
                    &tiles.get(i, j),
                    &alpha.get(i),
                    &alpha.get(j),
                    move |t, ai, aj| bk.ger(t, ai, aj),
                ),
            );
        }
    }
    Ok(())
}

/// One Adam step on a kernel hyperparameter.
///
/// `w` holds the `K⁻¹ − α·αᵗ` tiles, `deriv` the `∂K/∂θ` tiles for the
/// selected parameter. Contracts `0.5·tr(W·∂K/∂θ)`, blocks on the
/// scalar, then applies the descent step. The noise variance is
/// rejected here — it has its own path below.
///
/// Returns the new constrained parameter value.
pub fn update_hyperparameter<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    w: &TiledMatrix,
    deriv: &TiledMatrix,
    state: &mut HyperparameterState,
    param: HyperParam,
) -> Result<f64> {
    if param == HyperParam::NoiseVariance {
        return Err(CovarError::InvalidArgument(
            "noise variance uses update_noise_variance".into(),
        ));
    }
    check_square(w)?;
    if deriv.grid_rows() != w.grid_rows()
        || deriv.grid_cols() != w.grid_cols()
        || deriv.tile_rows() != w.tile_rows()
        || deriv.tile_cols() != w.tile_cols()
    {
        return Err(CovarError::GridMismatch {
            expected: (w.grid_rows(), w.tile_rows()),
            got: (deriv.grid_rows(), deriv.tile_rows()),
        });
    }

    let t = w.grid_rows();
    let mut diag_parts: Vec<Handle<Vec<f64>>> = Vec::with_capacity(t);
    for i in 0..t {
        // diag(W·∂K)[block i] = Σ_k diag-product of W[i,k] and ∂K[k,i].
        let mut acc = Handle::ready(vec![0.0; w.tile_rows()]);
        for k in 0..t {
            let bk = Arc::clone(backend);
            acc = sched.dataflow3(&acc, &w.get(i, k), &deriv.get(k, i), move |r, a, b| {
                bk.dot_diag_gemm(r, a, b)
            });
        }
        diag_parts.push(acc);
    }
    let gradient = sched.reduce(&diag_parts, |blocks| {
        Ok(0.5 * blocks.iter().flat_map(|b| b.iter()).sum::<f64>())
    });

    let g = *gradient.get()?;
    tracing::debug!(param = ?param, gradient = g, "hyperparameter step");
    state.apply_gradient(param, g)
}

/// Integer-selector entry point. Out-of-range selectors and the noise
/// variance report `InvalidArgument` without touching the state.
pub fn update_hyperparameter_indexed<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    w: &TiledMatrix,
    deriv: &TiledMatrix,
    state: &mut HyperparameterState,
    idx: usize,
) -> Result<f64> {
    let param = HyperParam::from_index(idx)?;
    update_hyperparameter(sched, backend, w, deriv, state, param)
}

/// One Adam step on the noise variance.
///
/// `∂K/∂σ² = dσ²/dθ · I`, so the gradient collapses to
/// `0.5·(tr K⁻¹ − αᵗα)·dσ²/dθ` — only the diagonal tiles of `inv_k`
/// (the plain `K⁻¹`, before any `ger` sweep) and α are needed.
pub fn update_noise_variance<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    inv_k: &TiledMatrix,
    alpha: &TiledVector,
    state: &mut HyperparameterState,
) -> Result<f64> {
    check_square(inv_k)?;
    if alpha.n_tiles() != inv_k.grid_rows() || alpha.block_len() != inv_k.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (inv_k.grid_rows(), inv_k.tile_rows()),
            got: (alpha.n_tiles(), alpha.block_len()),
        });
    }

    let parts: Vec<Handle<f64>> = (0..inv_k.grid_rows())
        .map(|k| {
            let bk = Arc::clone(backend);
            sched.dataflow2(&inv_k.get(k, k), &alpha.get(k), move |tile, ak| {
                let trace: f64 = bk.diag(tile)?.iter().sum();
                Ok(trace - bk.dot(ak, ak)?)
            })
        })
        .collect();
    let raw = sched.reduce(&parts, |vs| Ok(vs.iter().map(|v| **v).sum::<f64>()));

    let theta = to_unconstrained(state.noise_variance, true);
    let g = 0.5 * *raw.get()? * softplus_derivative(theta);
    tracing::debug!(gradient = g, "noise variance step");
    state.apply_gradient(HyperParam::NoiseVariance, g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use covar_core::AdamParams;
    use covar_kernels::CpuBackend;

    #[test]
    fn test_ger_sweep_single_tile() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let mut w = TiledMatrix::from_dense_square(&[2.0, 0.0, 0.0, 2.0], 2, 1).unwrap();
        let alpha = TiledVector::from_dense(&[1.0, 1.0], 1).unwrap();
        update_grad_tiles(&sched, &backend, &mut w, &alpha).unwrap();
        assert_eq!(w.to_dense().unwrap(), vec![1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_zero_w_gives_zero_gradient() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let w = TiledMatrix::zeros(2, 2, 2, 2);
        let deriv = TiledMatrix::zeros(2, 2, 2, 2);
        let mut state = HyperparameterState::new(1.5, 1.0, 0.1, AdamParams::default());
        state.begin_step();
        update_hyperparameter(&sched, &backend, &w, &deriv, &mut state, HyperParam::Lengthscale)
            .unwrap();
        assert!((state.lengthscale - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_noise_variance_rejected_on_kernel_path() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let w = TiledMatrix::zeros(1, 1, 2, 2);
        let deriv = TiledMatrix::zeros(1, 1, 2, 2);
        let mut state = HyperparameterState::new(1.0, 1.0, 0.1, AdamParams::default());
        state.begin_step();
        let before = state.clone();
        assert!(matches!(
            update_hyperparameter(&sched, &backend, &w, &deriv, &mut state, HyperParam::NoiseVariance),
            Err(CovarError::InvalidArgument(_))
        ));
        assert!((state.noise_variance - before.noise_variance).abs() < 1e-15);
    }

    #[test]
    fn test_indexed_selector_out_of_range() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let w = TiledMatrix::zeros(1, 1, 2, 2);
        let deriv = TiledMatrix::zeros(1, 1, 2, 2);
        let mut state = HyperparameterState::new(1.0, 1.0, 0.1, AdamParams::default());
        state.begin_step();
        assert!(matches!(
            update_hyperparameter_indexed(&sched, &backend, &w, &deriv, &mut state, 5),
            Err(CovarError::InvalidArgument(_))
        ));
        assert!((state.lengthscale - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_noise_update_direction() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        // tr K⁻¹ = 4, αᵗα = 1 -> positive gradient -> descent shrinks σ².
        let inv_k = TiledMatrix::from_dense_square(&[2.0, 0.0, 0.0, 2.0], 2, 1).unwrap();
        let alpha = TiledVector::from_dense(&[1.0, 0.0], 1).unwrap();
        let mut state = HyperparameterState::new(1.0, 1.0, 0.5, AdamParams::default());
        state.begin_step();
        let updated = update_noise_variance(&sched, &backend, &inv_k, &alpha, &mut state).unwrap();
        assert!(updated < 0.5);
        assert!(updated > 0.0);
    }
}
