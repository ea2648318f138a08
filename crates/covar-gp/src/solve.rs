//! Tiled triangular solves against a lower Cholesky factor.
//!
//! Three RHS shapes: a blocked vector (trsv + gemv chain), a tiled
//! matrix of independent column blocks (Left trsm + gemm), and the
//! rectangular cross-covariance variant where the factor applies from
//! the right (`X·Lᵗ = B`, then `X·L = B`). With one tile each pair
//! degenerates to a single whole-matrix solve.

use std::sync::Arc;

use covar_core::{CovarError, Result};
use covar_kernels::{KernelBackend, Side, Trans};
use covar_sched::Scheduler;

use crate::grid::{TiledMatrix, TiledVector};

fn check_factor(l: &TiledMatrix) -> Result<()> {
    if !l.is_square_grid() {
        return Err(CovarError::GridMismatch {
            expected: (l.grid_rows(), l.grid_rows()),
            got: (l.grid_rows(), l.grid_cols()),
        });
    }
    Ok(())
}

fn check_vector_rhs(l: &TiledMatrix, b: &TiledVector) -> Result<()> {
    check_factor(l)?;
    if b.n_tiles() != l.grid_rows() || b.block_len() != l.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (l.grid_rows(), l.tile_rows()),
            got: (b.n_tiles(), b.block_len()),
        });
    }
    Ok(())
}

fn check_matrix_rhs(l: &TiledMatrix, b: &TiledMatrix) -> Result<()> {
    check_factor(l)?;
    if b.grid_rows() != l.grid_rows() || b.tile_rows() != l.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (l.grid_rows(), l.tile_rows()),
            got: (b.grid_rows(), b.tile_rows()),
        });
    }
    Ok(())
}

fn check_cross_rhs(l: &TiledMatrix, b: &TiledMatrix) -> Result<()> {
    check_factor(l)?;
    if b.grid_cols() != l.grid_rows() || b.tile_cols() != l.tile_rows() {
        return Err(CovarError::GridMismatch {
            expected: (l.grid_rows(), l.tile_rows()),
            got: (b.grid_cols(), b.tile_cols()),
        });
    }
    Ok(())
}

/// Solve `L·x = b` in place on the blocked vector.
pub fn forward_solve_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    l: &TiledMatrix,
    b: &mut TiledVector,
) -> Result<()> {
    check_vector_rhs(l, b)?;
    let t = l.grid_rows();
    for k in 0..t {
        let bk = Arc::clone(backend);
        b.set(
            k,
            sched.dataflow2(&l.get(k, k), &b.get(k), move |lkk, bkv| {
                bk.trsv(lkk, bkv, Trans::NoTrans)
            }),
        );
        for i in (k + 1)..t {
            let bk = Arc::clone(backend);
            b.set(
                i,
                sched.dataflow3(&l.get(i, k), &b.get(k), &b.get(i), move |lik, xk, bi| {
                    bk.gemv(bi, lik, xk, -1.0, Trans::NoTrans)
                }),
            );
        }
    }
    Ok(())
}

/// Solve `Lᵗ·x = b` in place on the blocked vector.
pub fn backward_solve_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    l: &TiledMatrix,
    b: &mut TiledVector,
) -> Result<()> {
    check_vector_rhs(l, b)?;
    let t = l.grid_rows();
    for k in (0..t).rev() {
        let bk = Arc::clone(backend);
        b.set(
            k,
            sched.dataflow2(&l.get(k, k), &b.get(k), move |lkk, bkv| {
                bk.trsv(lkk, bkv, Trans::Trans)
            }),
        );
        for i in 0..k {
            let bk = Arc::clone(backend);
            b.set(
                i,
                sched.dataflow3(&l.get(k, i), &b.get(k), &b.get(i), move |lki, xk, bi| {
                    bk.gemv(bi, lki, xk, -1.0, Trans::Trans)
                }),
            );
        }
    }
    Ok(())
}

/// Solve `L·X = B` in place; the RHS column blocks are independent.
pub fn forward_solve_matrix_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    l: &TiledMatrix,
    rhs: &mut TiledMatrix,
) -> Result<()> {
    check_matrix_rhs(l, rhs)?;
    let t = l.grid_rows();
    for c in 0..rhs.grid_cols() {
        for k in 0..t {
            let bk = Arc::clone(backend);
            rhs.set(
                k,
                c,
                sched.dataflow2(&l.get(k, k), &rhs.get(k, c), move |lkk, bkc| {
                    bk.trsm(lkk, bkc, Side::Left, Trans::NoTrans)
                }),
            );
            for i in (k + 1)..t {
                let bk = Arc::clone(backend);
                rhs.set(
                    i,
                    c,
                    sched.dataflow3(
                        &l.get(i, k),
                        &rhs.get(k, c),
                        &rhs.get(i, c),
                        move |lik, xkc, bic| bk.gemm(bic, lik, xkc, Trans::NoTrans, Trans::NoTrans),
                    ),
                );
            }
        }
    }
    Ok(())
}

/// Solve `Lᵗ·X = B` in place; the RHS column blocks are independent.
pub fn backward_solve_matrix_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    l: &TiledMatrix,
    rhs: &mut TiledMatrix,
) -> Result<()> {
    check_matrix_rhs(l, rhs)?;
    let t = l.grid_rows();
    for c in 0..rhs.grid_cols() {
        for k in (0..t).rev() {
            let bk = Arc::clone(backend);
            rhs.set(
                k,
                c,
                sched.dataflow2(&l.get(k, k), &rhs.get(k, c), move |lkk, bkc| {
                    bk.trsm(lkk, bkc, Side::Left, Trans::Trans)
                }),
            );
            for i in 0..k {
                let bk = Arc::clone(backend);
                rhs.set(
                    i,
                    c,
                    sched.dataflow3(
                        &l.get(k, i),
                        &rhs.get(k, c),
                        &rhs.get(i, c),
                        move |lki, xkc, bic| bk.gemm(bic, lki, xkc, Trans::Trans, Trans::NoTrans),
                    ),
                );
            }
        }
    }
    Ok(())
}

/// Solve `X·Lᵗ = B` in place over an `m_tiles x n_tiles` RHS grid — the
/// cross-covariance forward step `V = Kmn·L^-ᵗ`.
pub fn forward_solve_cross_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    l: &TiledMatrix,
    rhs: &mut TiledMatrix,
) -> Result<()> {
    check_cross_rhs(l, rhs)?;
    let t = l.grid_rows();
    for r in 0..rhs.grid_rows() {
        for k in 0..t {
            let bk = Arc::clone(backend);
            rhs.set(
                r,
                k,
                sched.dataflow2(&l.get(k, k), &rhs.get(r, k), move |lkk, brk| {
                    bk.trsm(lkk, brk, Side::Right, Trans::Trans)
                }),
            );
            for j in (k + 1)..t {
                let bk = Arc::clone(backend);
                rhs.set(
                    r,
                    j,
                    sched.dataflow3(
                        &rhs.get(r, k),
                        &l.get(j, k),
                        &rhs.get(r, j),
                        move |xrk, ljk, brj| bk.gemm(brj, xrk, ljk, Trans::NoTrans, Trans::Trans),
                    ),
                );
            }
        }
    }
    Ok(())
}

/// Solve `X·L = B` in place over an `m_tiles x n_tiles` RHS grid — the
/// cross-covariance backward step.
pub fn backward_solve_cross_tiled<B: KernelBackend>(
    sched: &Scheduler,
    backend: &Arc<B>,
    l: &TiledMatrix,
    rhs: &mut TiledMatrix,
) -> Result<()> {
    check_cross_rhs(l, rhs)?;
    let t = l.grid_rows();
    for r in 0..rhs.grid_rows() {
        for k in (0..t).rev() {
            let bk = Arc::clone(backend);
            rhs.set(
                r,
                k,
                sched.dataflow2(&l.get(k, k), &rhs.get(r, k), move |lkk, brk| {
                    bk.trsm(lkk, brk, Side::Right, Trans::NoTrans)
                }),
            );
            for j in 0..k {
                let bk = Arc::clone(backend);
                rhs.set(
                    r,
                    j,
                    sched.dataflow3(
                        &rhs.get(r, k),
                        &l.get(k, j),
                        &rhs.get(r, j),
                        move |xrk, lkj, brj| bk.gemm(brj, xrk, lkj, Trans::NoTrans, Trans::NoTrans),
                    ),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use covar_kernels::CpuBackend;

    #[test]
    fn test_vector_rhs_shape_mismatch() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        let l = TiledMatrix::zeros(2, 2, 2, 2);
        let mut b = TiledVector::zeros(3, 2);
        assert!(matches!(
            forward_solve_tiled(&sched, &backend, &l, &mut b),
            Err(CovarError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_single_tile_forward_backward() {
        let sched = Scheduler::new();
        let backend = Arc::new(CpuBackend::new());
        // L = [[2, 0], [1, 2]]
        let l = TiledMatrix::from_dense_square(&[2.0, 0.0, 1.0, 2.0], 2, 1).unwrap();
        let mut b = TiledVector::from_dense(&[2.0, 5.0], 1).unwrap();
        forward_solve_tiled(&sched, &backend, &l, &mut b).unwrap();
        assert_eq!(b.to_dense().unwrap(), vec![1.0, 2.0]);
        backward_solve_tiled(&sched, &backend, &l, &mut b).unwrap();
        // Lᵗ x = [1, 2] -> x = [0, 1]
        assert_eq!(b.to_dense().unwrap(), vec![0.0, 1.0]);
    }
}
