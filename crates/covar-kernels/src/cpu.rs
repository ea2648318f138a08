//! Host f64 kernels, written as plain loops.
//!
//! These are the reference implementations of the [`KernelBackend`]
//! contract. Tiles are small enough that cache blocking inside a tile
//! buys little; the tiled algorithms above already provide the
//! coarse-grained blocking.

use covar_core::{CovarError, Result, Tile};

use crate::backend::{KernelBackend, Side, Trans};

/// Plain-loop host backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

fn require(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(CovarError::InvalidArgument(msg()))
    }
}

/// Dimensions of `op(A)`.
fn op_shape(a: &Tile, trans: Trans) -> (usize, usize) {
    match trans {
        Trans::NoTrans => (a.rows(), a.cols()),
        Trans::Trans => (a.cols(), a.rows()),
    }
}

/// `op(A)[i, j]` without materializing the transpose.
#[inline]
fn op_at(a: &Tile, trans: Trans, i: usize, j: usize) -> f64 {
    match trans {
        Trans::NoTrans => a.at(i, j),
        Trans::Trans => a.at(j, i),
    }
}

impl KernelBackend for CpuBackend {
    fn potrf(&self, a: &Tile) -> Result<Tile> {
        require(a.is_square(), || {
            format!("potrf needs a square tile, got {}x{}", a.rows(), a.cols())
        })?;
        let n = a.rows();
        let mut out = a.clone();
        let l = out.as_mut_slice();
        for j in 0..n {
            let mut d = l[j * n + j];
            for k in 0..j {
                d -= l[j * n + k] * l[j * n + k];
            }
            if d <= 0.0 || !d.is_finite() {
                return Err(CovarError::NotPositiveDefinite { minor: j + 1 });
            }
            let djj = d.sqrt();
            l[j * n + j] = djj;
            for i in (j + 1)..n {
                let mut s = l[i * n + j];
                for k in 0..j {
                    s -= l[i * n + k] * l[j * n + k];
                }
                l[i * n + j] = s / djj;
            }
        }
        // The strict upper triangle is left as-is, LAPACK style; only
        // the lower triangle of the result is meaningful.
        Ok(out)
    }

    fn trsm(&self, l: &Tile, b: &Tile, side: Side, trans: Trans) -> Result<Tile> {
        require(l.is_square(), || {
            format!("trsm L must be square, got {}x{}", l.rows(), l.cols())
        })?;
        let n = l.rows();
        let (bm, bn) = (b.rows(), b.cols());
        match side {
            Side::Left => require(bm == n, || {
                format!("trsm left: L is {n}x{n} but B has {bm} rows")
            })?,
            Side::Right => require(bn == n, || {
                format!("trsm right: L is {n}x{n} but B has {bn} cols")
            })?,
        }

        let mut out = b.clone();
        let x = out.as_mut_slice();
        match (side, trans) {
            // L·X = B
            (Side::Left, Trans::NoTrans) => {
                for c in 0..bn {
                    for i in 0..bm {
                        let mut s = x[i * bn + c];
                        for k in 0..i {
                            s -= l.at(i, k) * x[k * bn + c];
                        }
                        x[i * bn + c] = s / l.at(i, i);
                    }
                }
            }
            // Lᵗ·X = B
            (Side::Left, Trans::Trans) => {
                for c in 0..bn {
                    for i in (0..bm).rev() {
                        let mut s = x[i * bn + c];
                        for k in (i + 1)..bm {
                            s -= l.at(k, i) * x[k * bn + c];
                        }
                        x[i * bn + c] = s / l.at(i, i);
                    }
                }
            }
            // X·L = B
            (Side::Right, Trans::NoTrans) => {
                for r in 0..bm {
                    for j in (0..bn).rev() {
                        let mut s = x[r * bn + j];
                        for k in (j + 1)..bn {
                            s -= x[r * bn + k] * l.at(k, j);
                        }
                        x[r * bn + j] = s / l.at(j, j);
                    }
                }
            }
            // X·Lᵗ = B
            (Side::Right, Trans::Trans) => {
                for r in 0..bm {
                    for j in 0..bn {
                        let mut s = x[r * bn + j];
                        for k in 0..j {
                            s -= x[r * bn + k] * l.at(j, k);
                        }
                        x[r * bn + j] = s / l.at(j, j);
                    }
                }
            }
        }
        Ok(out)
    }

    fn syrk(&self, c: &Tile, a: &Tile) -> Result<Tile> {
        require(c.is_square() && c.rows() == a.rows(), || {
            format!(
                "syrk: C is {}x{}, A is {}x{}",
                c.rows(),
                c.cols(),
                a.rows(),
                a.cols()
            )
        })?;
        let n = c.rows();
        let k = a.cols();
        let mut out = c.clone();
        let dst = out.as_mut_slice();
        for i in 0..n {
            for j in 0..n {
                let mut s = 0.0;
                for p in 0..k {
                    s += a.at(i, p) * a.at(j, p);
                }
                dst[i * n + j] -= s;
            }
        }
        Ok(out)
    }

    fn gemm(&self, c: &Tile, a: &Tile, b: &Tile, trans_a: Trans, trans_b: Trans) -> Result<Tile> {
        let (am, ak) = op_shape(a, trans_a);
        let (bk, bn) = op_shape(b, trans_b);
        require(ak == bk && c.rows() == am && c.cols() == bn, || {
            format!(
                "gemm: op(A) is {am}x{ak}, op(B) is {bk}x{bn}, C is {}x{}",
                c.rows(),
                c.cols()
            )
        })?;
        let mut out = c.clone();
        let dst = out.as_mut_slice();
        for i in 0..am {
            for j in 0..bn {
                let mut s = 0.0;
                for p in 0..ak {
                    s += op_at(a, trans_a, i, p) * op_at(b, trans_b, p, j);
                }
                dst[i * bn + j] -= s;
            }
        }
        Ok(out)
    }

    fn trsv(&self, l: &Tile, x: &[f64], trans: Trans) -> Result<Vec<f64>> {
        require(l.is_square() && l.rows() == x.len(), || {
            format!(
                "trsv: L is {}x{}, x has {} entries",
                l.rows(),
                l.cols(),
                x.len()
            )
        })?;
        let n = x.len();
        let mut out = x.to_vec();
        match trans {
            Trans::NoTrans => {
                for i in 0..n {
                    let mut s = out[i];
                    for k in 0..i {
                        s -= l.at(i, k) * out[k];
                    }
                    out[i] = s / l.at(i, i);
                }
            }
            Trans::Trans => {
                for i in (0..n).rev() {
                    let mut s = out[i];
                    for k in (i + 1)..n {
                        s -= l.at(k, i) * out[k];
                    }
                    out[i] = s / l.at(i, i);
                }
            }
        }
        Ok(out)
    }

    fn gemv(&self, y: &[f64], a: &Tile, x: &[f64], alpha: f64, trans: Trans) -> Result<Vec<f64>> {
        let (m, k) = op_shape(a, trans);
        require(x.len() == k && y.len() == m, || {
            format!(
                "gemv: op(A) is {m}x{k}, x has {}, y has {}",
                x.len(),
                y.len()
            )
        })?;
        let mut out = y.to_vec();
        for i in 0..m {
            let mut s = 0.0;
            for p in 0..k {
                s += op_at(a, trans, i, p) * x[p];
            }
            out[i] += alpha * s;
        }
        Ok(out)
    }

    fn ger(&self, a: &Tile, x: &[f64], y: &[f64]) -> Result<Tile> {
        require(a.rows() == x.len() && a.cols() == y.len(), || {
            format!(
                "ger: A is {}x{}, x has {}, y has {}",
                a.rows(),
                a.cols(),
                x.len(),
                y.len()
            )
        })?;
        let cols = a.cols();
        let mut out = a.clone();
        let dst = out.as_mut_slice();
        for (i, &xi) in x.iter().enumerate() {
            for (j, &yj) in y.iter().enumerate() {
                dst[i * cols + j] -= xi * yj;
            }
        }
        Ok(out)
    }

    fn dot(&self, x: &[f64], y: &[f64]) -> Result<f64> {
        require(x.len() == y.len(), || {
            format!("dot: {} vs {} entries", x.len(), y.len())
        })?;
        Ok(x.iter().zip(y).map(|(a, b)| a * b).sum())
    }

    fn diag(&self, a: &Tile) -> Result<Vec<f64>> {
        require(a.is_square(), || {
            format!("diag needs a square tile, got {}x{}", a.rows(), a.cols())
        })?;
        Ok((0..a.rows()).map(|i| a.at(i, i)).collect())
    }

    fn dot_diag_gemm(&self, r: &[f64], a: &Tile, b: &Tile) -> Result<Vec<f64>> {
        require(
            a.cols() == b.rows() && a.rows() == b.cols() && r.len() == a.rows(),
            || {
                format!(
                    "dot_diag_gemm: A is {}x{}, B is {}x{}, r has {}",
                    a.rows(),
                    a.cols(),
                    b.rows(),
                    b.cols(),
                    r.len()
                )
            },
        )?;
        let mut out = r.to_vec();
        for i in 0..a.rows() {
            let mut s = 0.0;
            for j in 0..a.cols() {
                s += a.at(i, j) * b.at(j, i);
            }
            out[i] += s;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len(), "length mismatch");
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!(
                (x - y).abs() < tol,
                "element {} differs: {} vs {} (tol={})",
                i,
                x,
                y,
                tol
            );
        }
    }

    #[test]
    fn test_potrf_2x2() {
        let a = Tile::square(vec![4.0, 2.0, 2.0, 5.0], 2).unwrap();
        let l = CpuBackend.potrf(&a).unwrap().lower_triangle();
        assert_close(l.as_slice(), &[2.0, 0.0, 1.0, 2.0], 1e-12);
    }

    #[test]
    fn test_potrf_non_pd_reports_minor() {
        let a = Tile::square(vec![1.0, 2.0, 2.0, 1.0], 2).unwrap();
        assert_eq!(
            CpuBackend.potrf(&a).unwrap_err(),
            CovarError::NotPositiveDefinite { minor: 2 }
        );
    }

    #[test]
    fn test_trsm_left_notrans() {
        // L = [[2,0],[1,1]], B = L·X with X = [[1,2],[3,4]]
        let l = Tile::square(vec![2.0, 0.0, 1.0, 1.0], 2).unwrap();
        let b = Tile::square(vec![2.0, 4.0, 4.0, 6.0], 2).unwrap();
        let x = CpuBackend.trsm(&l, &b, Side::Left, Trans::NoTrans).unwrap();
        assert_close(x.as_slice(), &[1.0, 2.0, 3.0, 4.0], 1e-12);
    }

    #[test]
    fn test_trsm_right_trans() {
        // X·Lᵗ = B with X = [[1,2],[3,4]], L = [[2,0],[1,1]]
        let l = Tile::square(vec![2.0, 0.0, 1.0, 1.0], 2).unwrap();
        let b = Tile::square(vec![2.0, 3.0, 6.0, 7.0], 2).unwrap();
        let x = CpuBackend.trsm(&l, &b, Side::Right, Trans::Trans).unwrap();
        assert_close(x.as_slice(), &[1.0, 2.0, 3.0, 4.0], 1e-12);
    }

    #[test]
    fn test_trsm_round_trips_all_shapes() {
        let l = Tile::square(vec![2.0, 0.0, 0.0, 1.0, 3.0, 0.0, 0.5, 1.0, 2.0], 3).unwrap();
        let x = Tile::from_vec(vec![1.0, -2.0, 0.5, 3.0, 2.0, -1.0], 2, 3).unwrap();
        let xt = Tile::from_vec(vec![1.0, 3.0, -2.0, 2.0, 0.5, -1.0], 3, 2).unwrap();
        let cpu = CpuBackend;

        // B = X·Lᵗ, recover X
        let zero = Tile::zeros(2, 3);
        let b = cpu.gemm(&zero, &x, &l, Trans::NoTrans, Trans::Trans).unwrap();
        let neg_b = Tile::from_vec(b.as_slice().iter().map(|v| -v).collect(), 2, 3).unwrap();
        let rec = cpu.trsm(&l, &neg_b, Side::Right, Trans::Trans).unwrap();
        assert_close(rec.as_slice(), x.as_slice(), 1e-12);

        // B = X·L, recover X
        let b = cpu.gemm(&zero, &x, &l, Trans::NoTrans, Trans::NoTrans).unwrap();
        let neg_b = Tile::from_vec(b.as_slice().iter().map(|v| -v).collect(), 2, 3).unwrap();
        let rec = cpu.trsm(&l, &neg_b, Side::Right, Trans::NoTrans).unwrap();
        assert_close(rec.as_slice(), x.as_slice(), 1e-12);

        // B = Lᵗ·X, recover X
        let zero_t = Tile::zeros(3, 2);
        let b = cpu.gemm(&zero_t, &l, &xt, Trans::Trans, Trans::NoTrans).unwrap();
        let neg_b = Tile::from_vec(b.as_slice().iter().map(|v| -v).collect(), 3, 2).unwrap();
        let rec = cpu.trsm(&l, &neg_b, Side::Left, Trans::Trans).unwrap();
        assert_close(rec.as_slice(), xt.as_slice(), 1e-12);
    }

    #[test]
    fn test_syrk_subtracts_rank_k() {
        let c = Tile::square(vec![10.0, 4.0, 4.0, 10.0], 2).unwrap();
        let a = Tile::square(vec![1.0, 2.0, 3.0, 0.0], 2).unwrap();
        // A·Aᵗ = [[5,3],[3,9]]
        let out = CpuBackend.syrk(&c, &a).unwrap();
        assert_close(out.as_slice(), &[5.0, 1.0, 1.0, 1.0], 1e-12);
    }

    #[test]
    fn test_gemm_subtracts_product() {
        let c = Tile::square(vec![0.0; 4], 2).unwrap();
        let a = Tile::square(vec![1.0, 2.0, 3.0, 4.0], 2).unwrap();
        let b = Tile::square(vec![1.0, 0.0, 0.0, 1.0], 2).unwrap();
        let out = CpuBackend
            .gemm(&c, &a, &b, Trans::NoTrans, Trans::Trans)
            .unwrap();
        assert_close(out.as_slice(), &[-1.0, -2.0, -3.0, -4.0], 1e-12);
    }

    #[test]
    fn test_trsv_forward_backward() {
        let l = Tile::square(vec![2.0, 0.0, 1.0, 3.0], 2).unwrap();
        // L·x = [2, 7] → x = [1, 2]
        let x = CpuBackend.trsv(&l, &[2.0, 7.0], Trans::NoTrans).unwrap();
        assert_close(&x, &[1.0, 2.0], 1e-12);
        // Lᵗ·x = [4, 6] → x = [1, 2]
        let x = CpuBackend.trsv(&l, &[4.0, 6.0], Trans::Trans).unwrap();
        assert_close(&x, &[1.0, 2.0], 1e-12);
    }

    #[test]
    fn test_gemv_accumulates() {
        let a = Tile::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        let y = CpuBackend
            .gemv(&[1.0, 1.0], &a, &[1.0, 0.0, 1.0], -1.0, Trans::NoTrans)
            .unwrap();
        assert_close(&y, &[-3.0, -9.0], 1e-12);
        let y = CpuBackend
            .gemv(&[0.0, 0.0, 0.0], &a, &[1.0, 1.0], 1.0, Trans::Trans)
            .unwrap();
        assert_close(&y, &[5.0, 7.0, 9.0], 1e-12);
    }

    #[test]
    fn test_ger_dot_diag() {
        let a = Tile::square(vec![1.0, 1.0, 1.0, 1.0], 2).unwrap();
        let out = CpuBackend.ger(&a, &[1.0, 2.0], &[3.0, 4.0]).unwrap();
        assert_close(out.as_slice(), &[-2.0, -3.0, -5.0, -7.0], 1e-12);

        assert_eq!(CpuBackend.dot(&[1.0, 2.0], &[3.0, 4.0]).unwrap(), 11.0);

        let d = CpuBackend.diag(&a).unwrap();
        assert_close(&d, &[1.0, 1.0], 1e-12);
    }

    #[test]
    fn test_dot_diag_gemm() {
        let a = Tile::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let b = Tile::from_vec(vec![1.0, 0.0, 1.0, 1.0], 2, 2).unwrap();
        // diag(A·B) = [3, 4]
        let r = CpuBackend.dot_diag_gemm(&[1.0, 1.0], &a, &b).unwrap();
        assert_close(&r, &[4.0, 5.0], 1e-12);
    }

    #[test]
    fn test_dimension_mismatch_is_invalid_argument() {
        let a = Tile::from_vec(vec![0.0; 6], 2, 3).unwrap();
        assert!(matches!(
            CpuBackend.potrf(&a),
            Err(CovarError::InvalidArgument(_))
        ));
        assert!(matches!(
            CpuBackend.dot(&[1.0], &[1.0, 2.0]),
            Err(CovarError::InvalidArgument(_))
        ));
    }
}
