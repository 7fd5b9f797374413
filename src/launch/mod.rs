//! Running operations inline or in the background
//!
//! # Components
//!
//! - `launch`: Runs one operation inline or on a spawned task
//! - `Launched`: The result of `launch`, joinable either way
//! - `WorkerPool`: Runs a batch of operations with bounded concurrency

mod launcher;
mod pool;

pub use launcher::{launch, Launched, Mode};
pub use pool::{default_max_workers, WorkerPool};
pub(crate) use pool::load_pages;
