//! # Piilop
//!
//! Integration-test orchestrator for suites that share long-lived external
//! resources.
//!
//! Tests are registered with a suite, a priority and dependency tokens. The
//! scheduler orders them so that creators run before users and teardown
//! (`Priority::Last`) runs after everything else. Resources such as networks
//! or clusters are cached by a [`ResourceManager`] per kind, handed out under
//! an advisory lock and reused across tests.
//!
//! ## Quick Start
//!
//! ```ignore
//! use piilop::prelude::*;
//!
//! let mut registry = TestRegistry::new();
//! registry.register(TestEntry::new("networks get aws", "networks", |ctx| async move {
//!     // use ctx with resource managers here
//!     Ok(())
//! }))?;
//!
//! let main = TestMain::new(Arc::new(registry), Arc::new(ConsoleObserver::stdout()));
//! let report = main.run_test(RunOptions::new().workers(2)).await?;
//! assert!(report.is_success());
//! ```
//!
//! ## Layers
//!
//! - [`subset`] - the matcher deciding whether a cached resource fits create options
//! - [`context`] - nested execution frames, deferred release and observers
//! - [`resources`] - resource managers and their registry
//! - [`scheduler`] - dependency ordering
//! - [`runner`] - test registry, runner and console observer

#![warn(missing_docs)]

pub mod prelude;

pub use piilop_context as context;
pub use piilop_core::subset;
pub use piilop_resources as resources;
pub use piilop_runner as runner;
pub use piilop_scheduler as scheduler;

// Re-export main entry points
pub use piilop_context::{Context, TestObserver};
pub use piilop_core::{Error, Priority, Result, TestStatus};
pub use piilop_resources::{Resource, ResourceManager, ResourceManagerRegistry, SearchSpec};
pub use piilop_runner::{RunOptions, RunReport, TestEntry, TestMain, TestRegistry};
