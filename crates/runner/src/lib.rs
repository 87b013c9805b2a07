//! Test runner layer for Piilop
//!
//! This crate turns registered tests into a run:
//! - [`TestEntry`] / [`TestRegistry`]: the catalog, with create/delete test
//!   generation from resource managers
//! - [`TestMain`]: plan, filter and execute, sequentially or on a worker pool
//! - [`ConsoleObserver`]: the default indented trace
//! - [`RunOptions`] / [`RunReport`]: run configuration and outcomes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod console;
pub mod entry;
pub mod main_loop;
pub mod options;
pub mod registry;

pub use console::ConsoleObserver;
pub use entry::{TestEntry, TestFn};
pub use main_loop::TestMain;
pub use options::{RunOptions, RunReport, TestOutcome};
pub use registry::{ResourceSuite, TestRegistry};
