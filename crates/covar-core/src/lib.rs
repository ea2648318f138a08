//! # covar-core
//!
//! Core data model for the Covar tiled Gaussian-process engine.
//!
//! Provides:
//! - The [`Tile`] buffer type: an owned, row-major block of `f64` values,
//!   the unit of scheduling for every tiled algorithm
//! - The [`CovarError`] taxonomy shared by the scheduler, the kernel
//!   backends and the tiled algorithms
//! - [`HyperparameterState`]: constrained GP hyperparameters with Adam
//!   moment estimates and the softplus constrained/unconstrained maps

pub mod error;
pub mod hyper;
pub mod tile;

pub use error::CovarError;
pub use hyper::{
    softplus_derivative, to_constrained, to_unconstrained, AdamParams, HyperParam,
    HyperparameterState,
};
pub use tile::Tile;

pub type Result<T> = std::result::Result<T, CovarError>;
