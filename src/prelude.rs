//! Convenient imports for Piilop.
//!
//! ```ignore
//! use piilop::prelude::*;
//! ```

pub use std::sync::Arc;

// Error handling
pub use piilop_core::{Error, Result};

// Scheduling and outcomes
pub use piilop_core::{Priority, TestStatus};

// Execution contexts
pub use piilop_context::{wrap, Context, ContextFn, FrameName, NullObserver, StackInfo, TestObserver};

// Resources
pub use piilop_resources::{Resource, ResourceManager, ResourceManagerRegistry, SearchSpec, State, StateCell};

// Running
pub use piilop_runner::{
    ConsoleObserver, ResourceSuite, RunOptions, RunReport, TestEntry, TestMain, TestOutcome,
    TestRegistry,
};
