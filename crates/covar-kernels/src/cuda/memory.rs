//! Scoped device buffers for tile staging.
//!
//! Every level-3 operation stages its tiles host→device, runs the
//! kernel, and copies the result back inside the call. `DeviceBuf`
//! owns its allocation; the driver memory is released when the value
//! drops, on success and on every error path alike — there is no bare
//! allocate/free pair anywhere in the backend.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, DeviceRepr, ValidAsZeroBits};

use super::context::CudaError;

/// An owned buffer on one CUDA device.
pub struct DeviceBuf<T> {
    slice: CudaSlice<T>,
}

impl<T: DeviceRepr> DeviceBuf<T> {
    /// Allocate zeroed device memory.
    pub fn zeros(dev: &Arc<CudaDevice>, len: usize) -> Result<Self, CudaError>
    where
        T: ValidAsZeroBits,
    {
        let slice = dev
            .alloc_zeros::<T>(len)
            .map_err(|e| CudaError::MemoryError(format!("alloc_zeros({len}): {e}")))?;
        Ok(Self { slice })
    }

    /// Copy host values into a fresh device buffer (H2D).
    pub fn from_host(dev: &Arc<CudaDevice>, data: &[T]) -> Result<Self, CudaError>
    where
        T: Clone + Unpin,
    {
        let len = data.len();
        let slice = dev
            .htod_copy(data.to_vec())
            .map_err(|e| CudaError::MemoryError(format!("htod_copy({len}): {e}")))?;
        Ok(Self { slice })
    }

    /// Copy the buffer back to the host (D2H, synchronizing).
    pub fn to_host(&self, dev: &Arc<CudaDevice>) -> Result<Vec<T>, CudaError> {
        dev.dtoh_sync_copy(&self.slice)
            .map_err(|e| CudaError::MemoryError(format!("dtoh_sync_copy: {e}")))
    }

    /// Underlying slice for kernel launches.
    pub fn as_cuda_slice(&self) -> &CudaSlice<T> {
        &self.slice
    }
}
