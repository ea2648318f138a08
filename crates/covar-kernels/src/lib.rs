//! # covar-kernels
//!
//! Numeric kernel backends for the Covar tiled GP engine.
//!
//! Provides:
//! - The [`KernelBackend`] contract: the tile-level BLAS/LAPACK
//!   capability set the tiled algorithms are written against
//! - [`CpuBackend`]: plain-loop f64 host kernels
//! - CUDA dispatch behind the `cuda` feature flag (cudarc + NVRTC PTX)

pub mod backend;
pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use backend::{KernelBackend, Side, Trans};
pub use cpu::CpuBackend;

#[cfg(feature = "cuda")]
pub use cuda::ops::CudaBackend;
