//! Dependency scheduler for Piilop
//!
//! Turns registered test entries plus their `depends_on` tokens into a
//! dependency graph and orders it with Kahn's algorithm.
//!
//! ## Edge rules
//!
//! A token `d` on entry `a` matches every other entry `b` whose suite equals
//! `d` or whose name starts with `d`. Then:
//!
//! ```text
//! b.priority != Last   ->  a waits for b
//! b.priority == Last   ->  b waits for a      (inverted)
//! a.priority == Last   ->  a waits for every non-Last entry
//! ```
//!
//! Entries ready at the same time keep registration order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;

pub use graph::{sort, sort_indices, Schedulable};
