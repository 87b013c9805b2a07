//! Resource layer for Piilop
//!
//! This crate caches long-lived external objects across tests:
//! - [`State`] / [`StateBag`]: one cached instance with its advisory lock
//!   and dependents, and the active + deleted lists of one kind
//! - [`ResourceManager`]: create-on-demand, locked lookup, deferred release,
//!   deletion and snapshots for one [`Resource`] kind
//! - [`ResourceManagerRegistry`]: every kind by name, for bulk clean, clear,
//!   info and save/load

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod registry;
pub mod state;

pub use manager::{
    CreateFn, DataPredicate, DeleteFn, Resource, ResourceManager, Search, SearchSpec,
    StateModifier, StatePredicate,
};
pub use registry::{ResourceKind, ResourceManagerRegistry};
pub use state::{BagSnapshot, State, StateBag, StateCell};
