//! CUDA kernel launcher with PTX compilation and caching.
//!
//! Compiles the embedded CUDA source at runtime via NVRTC (once per
//! device), then hands out kernel function handles.

use std::collections::HashSet;
use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaFunction, LaunchConfig};
use parking_lot::Mutex;

use super::context::CudaError;

/// Modules already loaded, keyed by (device index, module name).
static LOADED: std::sync::OnceLock<Mutex<HashSet<(usize, String)>>> = std::sync::OnceLock::new();

fn loaded_set() -> &'static Mutex<HashSet<(usize, String)>> {
    LOADED.get_or_init(|| Mutex::new(HashSet::new()))
}

fn ensure_module(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    module_name: &str,
    source: &str,
) -> Result<(), CudaError> {
    let key = (device_idx, module_name.to_string());
    {
        let set = loaded_set().lock();
        if set.contains(&key) {
            return Ok(());
        }
    }

    let ptx = cudarc::nvrtc::compile_ptx(source).map_err(|e| CudaError::PtxCompile {
        module: module_name.to_string(),
        msg: e.to_string(),
    })?;
    device
        .load_ptx(ptx, module_name, &[])
        .map_err(|e| CudaError::ModuleLoad {
            module: module_name.to_string(),
            msg: e.to_string(),
        })?;

    loaded_set().lock().insert(key);
    Ok(())
}

/// Get a kernel function handle, loading the module if needed.
pub fn get_or_load_func(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    module_name: &str,
    func_name: &str,
    source: &str,
) -> Result<CudaFunction, CudaError> {
    ensure_module(device, device_idx, module_name, source)?;
    device
        .get_func(module_name, func_name)
        .ok_or_else(|| CudaError::FuncNotFound {
            module: module_name.to_string(),
            func: func_name.to_string(),
        })
}

/// 1D launch over `n` elements.
pub fn grid_1d(n: usize, block_size: usize) -> LaunchConfig {
    let grid = (n + block_size - 1) / block_size;
    LaunchConfig {
        grid_dim: (grid as u32, 1, 1),
        block_dim: (block_size as u32, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// 2D launch over a `rows x cols` output tile.
pub fn grid_2d(rows: usize, cols: usize, block_x: usize, block_y: usize) -> LaunchConfig {
    let grid_x = (cols + block_x - 1) / block_x;
    let grid_y = (rows + block_y - 1) / block_y;
    LaunchConfig {
        grid_dim: (grid_x as u32, grid_y as u32, 1),
        block_dim: (block_x as u32, block_y as u32, 1),
        shared_mem_bytes: 0,
    }
}
