//! Tiled right-looking Cholesky factorization.

use std::sync::Arc;

use covar_core::{CovarError, Result};
use covar_kernels::{KernelBackend, Side, Trans};
use covar_sched::Scheduler;

use crate::grid::TiledMatrix;

/// Factor a symmetric positive-definite tiled matrix in place into its
/// lower Cholesky factor `L` (strict upper tile content is left as-is,
/// LAPACK style; tiles strictly above the diagonal are untouched).
///
/// Issues the whole dependency graph without blocking; a non-positive-
/// definite input poisons the affected tiles and every transitive
/// consumer with [`CovarError::NotPositiveDefinite`].
pub fn cholesky_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    a: &mut TiledMatrix,
) -> Result<()> {
    if !a.is_square_grid() {
        return Err(CovarError::GridMismatch {
            expected: (a.grid_rows(), a.grid_rows()),
            got: (a.grid_rows(), a.grid_cols()),
        });
    }
    let t = a.grid_rows();
    tracing::debug!(n_tiles = t, tile_size = a.tile_rows(), "issuing tiled Cholesky");

    for k in 0..t {
        let bk = Arc::clone(backend);
        a.set(
            k,
            k,
            sched.dataflow1(&a.get(k, k), move |akk| bk.potrf(akk)),
        );

        // Panel: A[i,k] := A[i,k] · L[k,k]^-T
        for i in (k + 1)..t {
            let bk = Arc::clone(backend);
            a.set(
                i,
                k,
                sched.dataflow2(&a.get(k, k), &a.get(i, k), move |lkk, aik| {
                    bk.trsm(lkk, aik, Side::Right, Trans::Trans)
                }),
            );
        }

        // Trailing update: diagonal by syrk, below-diagonal by gemm.
        for i in (k + 1)..t {
            let bk = Arc::clone(backend);
            a.set(
                i,
                i,
                sched.dataflow2(&a.get(i, k), &a.get(i, i), move |lik, aii| {
                    bk.syrk(aii, lik)
                }),
            );
            for j in (k + 1)..i {
                let bk = Arc::clone(backend);
                a.set(
                    i,
                    j,
                    sched.dataflow3(
                        &a.get(i, k),
                        &a.get(j, k),
                        &a.get(i, j),
                        move |lik, ljk, aij| bk.gemm(aij, lik, ljk, Trans::NoTrans, Trans::Trans),
                    ),
                );
            }
        }
    }
    Ok(())
}
