//! # covar-sched
//!
//! Dataflow scheduler for tile-level kernel operations.
//!
//! Every kernel call becomes a task node that consumes a set of input
//! tile versions ([`Handle`]s) and produces exactly one new version.
//! A task becomes runnable the moment all of its inputs have resolved,
//! then executes on a rayon worker pool. Correctness follows from the
//! single-assignment discipline — each handle resolves once, each grid
//! slot has at most one writer in flight — not from locking.
//!
//! Failure poisons the graph: a task that reads a failed input fails
//! with the same error, and so do all of its transitive consumers.
//! There is no retry and no cancellation; the only blocking point is
//! [`Handle::get`], the terminal synchronization.

pub mod handle;
pub mod scheduler;

pub use handle::{Dep, Handle};
pub use scheduler::Scheduler;
