//! CUDA backend for the tile kernel contract.
//!
//! Provides:
//! - Device context management (lazy singleton per GPU)
//! - Scoped device buffers with guaranteed release on every exit path
//! - Kernel launcher with NVRTC PTX compilation and caching
//! - Tile-level level-3 kernels (potrf/trsm/syrk/gemm); level-1/2
//!   operations run on the host, as in the reference adapter

pub mod context;
pub mod launch;
pub mod memory;
pub mod ops;
