//! Resource manager registry
//!
//! Holds every resource kind by name behind the object-safe [`ResourceKind`]
//! trait, for the operations that span kinds: bulk clean and clear, info
//! dumps and snapshot save/load.

use std::sync::Arc;

use parking_lot::RwLock;
use piilop_context::Context;
use piilop_core::{BoxFuture, Error, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::manager::{Resource, ResourceManager};

/// Type-erased view of a [`ResourceManager`]
pub trait ResourceKind: Send + Sync {
    /// Resource kind name
    fn name(&self) -> &str;

    /// Delete every active instance.
    fn clean<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<()>>;

    /// Forget all state without deleting anything.
    fn clear(&self);

    /// Write a human-readable line per instance.
    fn info(&self, sink: &mut dyn FnMut(&str)) -> Result<()>;

    /// Snapshot of all state.
    fn save(&self) -> Result<Value>;

    /// Check that a snapshot would load, without applying it.
    fn validate(&self, snapshot: &Value) -> Result<()>;

    /// Replace all state with a snapshot.
    fn load(&self, snapshot: &Value) -> Result<()>;

    /// Number of active instances
    fn active_count(&self) -> usize;
}

impl<D: Resource> ResourceKind for ResourceManager<D> {
    fn name(&self) -> &str {
        ResourceManager::name(self)
    }

    fn clean<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(ResourceManager::clean(self, ctx))
    }

    fn clear(&self) {
        ResourceManager::clear(self)
    }

    fn info(&self, sink: &mut dyn FnMut(&str)) -> Result<()> {
        ResourceManager::info(self, sink)
    }

    fn save(&self) -> Result<Value> {
        ResourceManager::save(self)
    }

    fn validate(&self, snapshot: &Value) -> Result<()> {
        ResourceManager::validate(self, snapshot).map(|_| ())
    }

    fn load(&self, snapshot: &Value) -> Result<()> {
        ResourceManager::load(self, snapshot)
    }

    fn active_count(&self) -> usize {
        self.active().len()
    }
}

/// Named collection of resource managers, in registration order
#[derive(Default)]
pub struct ResourceManagerRegistry {
    kinds: RwLock<Vec<Arc<dyn ResourceKind>>>,
}

impl std::fmt::Debug for ResourceManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManagerRegistry")
            .field("kinds", &self.names())
            .finish()
    }
}

impl ResourceManagerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a manager for a new resource kind.
    pub fn new_manager<D: Resource>(&self, name: impl Into<String>) -> Result<Arc<ResourceManager<D>>> {
        let manager = Arc::new(ResourceManager::<D>::new(name));
        self.register(manager.clone())?;
        Ok(manager)
    }

    /// Register an existing kind. Names must be unique.
    pub fn register(&self, kind: Arc<dyn ResourceKind>) -> Result<()> {
        let mut kinds = self.kinds.write();
        if kinds.iter().any(|k| k.name() == kind.name()) {
            return Err(Error::DuplicateResourceKind(kind.name().to_string()));
        }
        kinds.push(kind);
        Ok(())
    }

    /// Look up a kind by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResourceKind>> {
        self.kinds.read().iter().find(|k| k.name() == name).cloned()
    }

    /// Registered kind names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.kinds.read().iter().map(|k| k.name().to_string()).collect()
    }

    fn all(&self) -> Vec<Arc<dyn ResourceKind>> {
        self.kinds.read().clone()
    }

    /// Clean every kind.
    ///
    /// A kind whose clean fails keeps the rest of its instances; the other
    /// kinds are still cleaned. The first failure is returned.
    pub async fn clean(&self, ctx: &Context) -> Result<()> {
        let mut first_err = None;
        for kind in self.all() {
            info!(kind = %kind.name(), "cleaning all entries");
            if let Err(err) = kind.clean(ctx).await {
                warn!(kind = %kind.name(), error = %err, "clean failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Forget the state of every kind.
    pub fn clear(&self) {
        for kind in self.all() {
            kind.clear();
        }
    }

    /// Write `Resource info:` then, per kind, its name and instance lines.
    pub fn info(&self, sink: &mut dyn FnMut(&str)) -> Result<()> {
        sink("Resource info:");
        for kind in self.all() {
            sink(&format!("{}:", kind.name()));
            kind.info(sink)?;
        }
        Ok(())
    }

    /// Snapshot of every kind, keyed by kind name.
    pub fn save(&self) -> Result<Value> {
        let mut snapshot = Map::new();
        for kind in self.all() {
            snapshot.insert(kind.name().to_string(), kind.save()?);
        }
        Ok(Value::Object(snapshot))
    }

    /// Restore every kind from a [`save`](Self::save) snapshot.
    ///
    /// Fails without touching any kind if one is missing from `snapshot`
    /// or does not validate.
    pub fn load(&self, snapshot: &Value) -> Result<()> {
        let kinds = self.all();
        let mut parts = Vec::with_capacity(kinds.len());
        for kind in &kinds {
            let part = snapshot
                .get(kind.name())
                .ok_or_else(|| Error::MissingResourceData(kind.name().to_string()))?;
            parts.push(part);
        }
        for (kind, part) in kinds.iter().zip(&parts) {
            kind.validate(part)?;
        }
        for (kind, part) in kinds.iter().zip(parts) {
            kind.load(part)?;
        }
        Ok(())
    }
}
