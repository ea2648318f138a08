//! CUDA implementation of the tile kernel contract.
//!
//! Level-3 operations (potrf/trsm/syrk/gemm) stage their tiles to the
//! device, launch a kernel from the embedded CUDA source and copy the
//! result back within the call. Level-1/2 operations and diagonal
//! extraction stay on the host; their data volumes are too small to
//! amortize a transfer.

use std::sync::Arc;

use covar_core::{CovarError, Result, Tile};
use cudarc::driver::{CudaDevice, LaunchAsync};

use super::context::{get_device, CudaError};
use super::launch::{get_or_load_func, grid_1d, grid_2d};
use super::memory::DeviceBuf;
use crate::backend::{KernelBackend, Side, Trans};
use crate::cpu::CpuBackend;

const TILE_BLAS_CU: &str = include_str!("kernels/tile_blas.cu");
const MODULE: &str = "tile_blas";
const BLOCK_1D: usize = 128;
const BLOCK_2D: usize = 16;

fn trans_flag(t: Trans) -> i32 {
    match t {
        Trans::NoTrans => 0,
        Trans::Trans => 1,
    }
}

/// GPU backend bound to one device index.
///
/// All operations share the device's default stream and serialize FIFO
/// on it; host/device synchronization happens only at the D2H copy at
/// the end of each call.
pub struct CudaBackend {
    device_idx: usize,
    host: CpuBackend,
}

impl CudaBackend {
    pub fn new(device_idx: usize) -> Result<Self> {
        get_device(device_idx).map_err(CovarError::from)?;
        Ok(Self {
            device_idx,
            host: CpuBackend::new(),
        })
    }

    fn device(&self) -> Result<Arc<CudaDevice>> {
        get_device(self.device_idx).map_err(CovarError::from)
    }

    fn func(&self, dev: &Arc<CudaDevice>, name: &str) -> Result<cudarc::driver::CudaFunction> {
        get_or_load_func(dev, self.device_idx, MODULE, name, TILE_BLAS_CU)
            .map_err(CovarError::from)
    }
}

impl KernelBackend for CudaBackend {
    fn potrf(&self, a: &Tile) -> Result<Tile> {
        if !a.is_square() {
            return Err(CovarError::InvalidArgument(format!(
                "potrf needs a square tile, got {}x{}",
                a.rows(),
                a.cols()
            )));
        }
        let n = a.rows();
        let dev = self.device()?;
        let f = self.func(&dev, "potrf_tile")?;

        let d_a = DeviceBuf::from_host(&dev, a.as_slice()).map_err(CovarError::from)?;
        let d_info = DeviceBuf::<i32>::zeros(&dev, 1).map_err(CovarError::from)?;

        let cfg = grid_1d(1, 1);
        unsafe {
            f.launch(cfg, (d_a.as_cuda_slice(), n as i32, d_info.as_cuda_slice()))
                .map_err(|e| CudaError::LaunchError(e.to_string()))
                .map_err(CovarError::from)?;
        }

        let info = d_info.to_host(&dev).map_err(CovarError::from)?[0];
        if info > 0 {
            // Device buffers drop here as on every other path.
            return Err(CovarError::NotPositiveDefinite {
                minor: info as usize,
            });
        }

        let out = d_a.to_host(&dev).map_err(CovarError::from)?;
        Tile::square(out, n)
    }

    fn trsm(&self, l: &Tile, b: &Tile, side: Side, trans: Trans) -> Result<Tile> {
        if !l.is_square() {
            return Err(CovarError::InvalidArgument(format!(
                "trsm L must be square, got {}x{}",
                l.rows(),
                l.cols()
            )));
        }
        let n = l.rows();
        let (bm, bn) = (b.rows(), b.cols());
        let matches = match side {
            Side::Left => bm == n,
            Side::Right => bn == n,
        };
        if !matches {
            return Err(CovarError::InvalidArgument(format!(
                "trsm: L is {n}x{n} but B is {bm}x{bn} on side {side:?}"
            )));
        }

        let dev = self.device()?;
        let f = self.func(&dev, "trsm_tile")?;
        let d_l = DeviceBuf::from_host(&dev, l.as_slice()).map_err(CovarError::from)?;
        let d_x = DeviceBuf::from_host(&dev, b.as_slice()).map_err(CovarError::from)?;

        let lanes = match side {
            Side::Left => bn,
            Side::Right => bm,
        };
        let side_flag: i32 = match side {
            Side::Left => 0,
            Side::Right => 1,
        };
        let cfg = grid_1d(lanes, BLOCK_1D);
        unsafe {
            f.launch(
                cfg,
                (
                    d_l.as_cuda_slice(),
                    d_x.as_cuda_slice(),
                    n as i32,
                    bm as i32,
                    bn as i32,
                    side_flag,
                    trans_flag(trans),
                ),
            )
            .map_err(|e| CudaError::LaunchError(e.to_string()))
            .map_err(CovarError::from)?;
        }

        let out = d_x.to_host(&dev).map_err(CovarError::from)?;
        Tile::from_vec(out, bm, bn)
    }

    fn syrk(&self, c: &Tile, a: &Tile) -> Result<Tile> {
        if !c.is_square() || c.rows() != a.rows() {
            return Err(CovarError::InvalidArgument(format!(
                "syrk: C is {}x{}, A is {}x{}",
                c.rows(),
                c.cols(),
                a.rows(),
                a.cols()
            )));
        }
        let n = c.rows();
        let k = a.cols();
        let dev = self.device()?;
        let f = self.func(&dev, "syrk_tile")?;
        let d_c = DeviceBuf::from_host(&dev, c.as_slice()).map_err(CovarError::from)?;
        let d_a = DeviceBuf::from_host(&dev, a.as_slice()).map_err(CovarError::from)?;

        let cfg = grid_2d(n, n, BLOCK_2D, BLOCK_2D);
        unsafe {
            f.launch(
                cfg,
                (d_c.as_cuda_slice(), d_a.as_cuda_slice(), n as i32, k as i32),
            )
            .map_err(|e| CudaError::LaunchError(e.to_string()))
            .map_err(CovarError::from)?;
        }

        let out = d_c.to_host(&dev).map_err(CovarError::from)?;
        Tile::square(out, n)
    }

    fn gemm(&self, c: &Tile, a: &Tile, b: &Tile, trans_a: Trans, trans_b: Trans) -> Result<Tile> {
        let (am, ak) = match trans_a {
            Trans::NoTrans => (a.rows(), a.cols()),
            Trans::Trans => (a.cols(), a.rows()),
        };
        let (bk, bn) = match trans_b {
            Trans::NoTrans => (b.rows(), b.cols()),
            Trans::Trans => (b.cols(), b.rows()),
        };
        if ak != bk || c.rows() != am || c.cols() != bn {
            return Err(CovarError::InvalidArgument(format!(
                "gemm: op(A) is {am}x{ak}, op(B) is {bk}x{bn}, C is {}x{}",
                c.rows(),
                c.cols()
            )));
        }

        let dev = self.device()?;
        let f = self.func(&dev, "gemm_tile")?;
        let d_c = DeviceBuf::from_host(&dev, c.as_slice()).map_err(CovarError::from)?;
        let d_a = DeviceBuf::from_host(&dev, a.as_slice()).map_err(CovarError::from)?;
        let d_b = DeviceBuf::from_host(&dev, b.as_slice()).map_err(CovarError::from)?;

        let cfg = grid_2d(am, bn, BLOCK_2D, BLOCK_2D);
        unsafe {
            f.launch(
                cfg,
                (
                    d_c.as_cuda_slice(),
                    d_a.as_cuda_slice(),
                    d_b.as_cuda_slice(),
                    am as i32,
                    bn as i32,
                    ak as i32,
                    a.cols() as i32,
                    b.cols() as i32,
                    trans_flag(trans_a),
                    trans_flag(trans_b),
                ),
            )
            .map_err(|e| CudaError::LaunchError(e.to_string()))
            .map_err(CovarError::from)?;
        }

        let out = d_c.to_host(&dev).map_err(CovarError::from)?;
        Tile::from_vec(out, am, bn)
    }

    fn trsv(&self, l: &Tile, x: &[f64], trans: Trans) -> Result<Vec<f64>> {
        self.host.trsv(l, x, trans)
    }

    fn gemv(&self, y: &[f64], a: &Tile, x: &[f64], alpha: f64, trans: Trans) -> Result<Vec<f64>> {
        self.host.gemv(y, a, x, alpha, trans)
    }

    fn ger(&self, a: &Tile, x: &[f64], y: &[f64]) -> Result<Tile> {
        self.host.ger(a, x, y)
    }

    fn dot(&self, x: &[f64], y: &[f64]) -> Result<f64> {
        self.host.dot(x, y)
    }

    fn diag(&self, a: &Tile) -> Result<Vec<f64>> {
        self.host.diag(a)
    }

    fn dot_diag_gemm(&self, r: &[f64], a: &Tile, b: &Tile) -> Result<Vec<f64>> {
        self.host.dot_diag_gemm(r, a, b)
    }
}
