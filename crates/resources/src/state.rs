//! Resource instance state and the per-kind state bag

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One cached resource plus its lock and dependent bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State<D> {
    /// The resource as returned by its create function
    pub data: D,
    /// Opaque tags of whatever currently relies on this resource
    #[serde(default)]
    pub dependents: Vec<String>,
    /// Advisory lock owner
    #[serde(default)]
    pub locked_by: Option<String>,
}

impl<D> State<D> {
    /// Fresh, unlocked state with no dependents.
    pub fn new(data: D) -> Self {
        State {
            data,
            dependents: Vec::new(),
            locked_by: None,
        }
    }

    /// Check if some owner holds the advisory lock
    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }

    /// Set the advisory lock owner.
    pub fn lock(&mut self, owner: impl Into<String>) {
        self.locked_by = Some(owner.into());
    }

    /// Clear the advisory lock.
    pub fn unlock(&mut self) {
        self.locked_by = None;
    }

    /// Record a dependent tag.
    pub fn add_dependent(&mut self, tag: impl Into<String>) {
        self.dependents.push(tag.into());
    }

    /// Remove the first occurrence of `tag`. Returns whether it was present.
    pub fn remove_dependent(&mut self, tag: &str) -> bool {
        match self.dependents.iter().position(|d| d == tag) {
            Some(index) => {
                self.dependents.remove(index);
                true
            }
            None => false,
        }
    }

    /// Check if anything still depends on this resource
    pub fn has_dependents(&self) -> bool {
        !self.dependents.is_empty()
    }
}

/// Shared handle to a [`State`]
///
/// A body holding a found state mutates the same instance the bag holds.
pub type StateCell<D> = Arc<Mutex<State<D>>>;

/// Serializable copy of a bag: `{"elements": [...], "deleted": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagSnapshot<D> {
    /// Active resources
    pub elements: Vec<State<D>>,
    /// Deleted history
    pub deleted: Vec<State<D>>,
}

/// Active resources and deleted history of one resource kind
#[derive(Debug)]
pub struct StateBag<D> {
    elements: Vec<StateCell<D>>,
    deleted: Vec<StateCell<D>>,
}

impl<D> Default for StateBag<D> {
    fn default() -> Self {
        StateBag {
            elements: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<D> StateBag<D> {
    /// Append a new active element.
    pub fn add(&mut self, state: State<D>) -> StateCell<D> {
        let cell = Arc::new(Mutex::new(state));
        self.elements.push(cell.clone());
        cell
    }

    /// First active element matching `search`, after applying `modifier` to it.
    ///
    /// Search and modification happen under the bag's owner lock, so two
    /// callers never both claim the same element.
    pub fn get<S, M>(&self, search: S, modifier: M) -> Option<StateCell<D>>
    where
        S: Fn(&State<D>) -> bool,
        M: FnOnce(&mut State<D>),
    {
        let cell = self.elements.iter().find(|cell| search(&cell.lock()))?;
        modifier(&mut cell.lock());
        Some(cell.clone())
    }

    /// Move the first active element matching `search` to the history.
    pub fn retire<S>(&mut self, search: S) -> Option<StateCell<D>>
    where
        S: Fn(&State<D>) -> bool,
    {
        let index = self.elements.iter().position(|cell| search(&cell.lock()))?;
        let cell = self.elements.remove(index);
        self.deleted.push(cell.clone());
        Some(cell)
    }

    /// Active elements, in creation order
    pub fn elements(&self) -> &[StateCell<D>] {
        &self.elements
    }

    /// Deleted history, in deletion order
    pub fn deleted(&self) -> &[StateCell<D>] {
        &self.deleted
    }

    /// Number of active elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if there are no active elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<D: Clone> StateBag<D> {
    /// Copy of both lists.
    pub fn snapshot(&self) -> BagSnapshot<D> {
        let copy = |cells: &[StateCell<D>]| -> Vec<State<D>> {
            cells.iter().map(|c| c.lock().clone()).collect()
        };
        BagSnapshot {
            elements: copy(&self.elements),
            deleted: copy(&self.deleted),
        }
    }

    /// Replace both lists with the snapshot's.
    pub fn restore(&mut self, snapshot: BagSnapshot<D>) {
        let wrap = |states: Vec<State<D>>| -> Vec<StateCell<D>> {
            states
                .into_iter()
                .map(|s| Arc::new(Mutex::new(s)))
                .collect()
        };
        self.elements = wrap(snapshot.elements);
        self.deleted = wrap(snapshot.deleted);
    }
}
