//! CUDA device context management.
//!
//! Lazy-initialized singleton `CudaDevice` handles, one per GPU index.
//! All operations routed to the same device share its stream and are
//! serialized FIFO by the driver.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use covar_core::CovarError;
use cudarc::driver::CudaDevice;
use parking_lot::Mutex;

static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create the shared device handle for a GPU index.
pub fn get_device(device_idx: usize) -> Result<Arc<CudaDevice>, CudaError> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&device_idx) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(device_idx)
        .map_err(|e| CudaError::DeviceInit(format!("device {device_idx}: {e}")))?;
    tracing::debug!(device_idx, "CUDA device initialized");
    map.insert(device_idx, Arc::clone(&dev));
    Ok(dev)
}

/// Whether any CUDA device is available.
pub fn is_cuda_available() -> bool {
    CudaDevice::new(0).is_ok()
}

/// CUDA-specific errors, mapped into the engine taxonomy at the
/// backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum CudaError {
    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("CUDA memory operation failed: {0}")]
    MemoryError(String),

    #[error("PTX compilation failed for module '{module}': {msg}")]
    PtxCompile { module: String, msg: String },

    #[error("failed to load module '{module}': {msg}")]
    ModuleLoad { module: String, msg: String },

    #[error("function '{func}' not found in module '{module}'")]
    FuncNotFound { module: String, func: String },

    #[error("CUDA kernel launch failed: {0}")]
    LaunchError(String),
}

impl From<CudaError> for CovarError {
    fn from(e: CudaError) -> Self {
        match e {
            CudaError::MemoryError(msg) => CovarError::Allocation(msg),
            other => CovarError::Device(other.to_string()),
        }
    }
}
