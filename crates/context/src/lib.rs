//! Execution context layer for Piilop
//!
//! This crate implements the scoped naming of in-flight work:
//! - [`Context`]: a handle to one frame of a nested frame stack, with
//!   `begin`/`end`, multi-level `defer` and the `run` helper that classifies
//!   outcomes as passed / failed / skipped
//! - [`TestThread`]: the ordered event log behind breadcrumbs
//! - [`TestObserver`]: the start/finish notification surface
//! - [`ContextFn`]: boxed context-taking functions and the idempotent wrap
//!   protocol

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod observer;
pub mod thread;
pub mod wrap;

pub use context::{Context, FrameId};
pub use observer::{NullObserver, TestObserver};
pub use thread::{render_breadcrumbs, StackInfo, TestThread, ThreadEvent};
pub use wrap::{wrap, ContextFn, ContextFuture, FrameName};
