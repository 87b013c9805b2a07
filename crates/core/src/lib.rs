//! Core types for the Piilop test orchestrator
//!
//! This crate holds everything the other layers agree on:
//! - [`Error`] / [`Result`]: the single error taxonomy
//! - [`Priority`] and [`TestStatus`]: scheduling hint and test outcome
//! - [`subset`]: the "does this cached object satisfy these arguments" matcher
//! - [`BoxFuture`]: the boxed future every context-taking function returns

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod subset;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use subset::{is_subset_of, options_match};
pub use types::{BoxFuture, Priority, TestStatus};
