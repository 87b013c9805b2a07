//! Resource manager
//!
//! A [`ResourceManager`] caches instances of one resource kind and hands
//! them out under an advisory lock. Lookups resolve a [`SearchSpec`]:
//!
//! ```text
//! Search::Default   -> unlocked AND data satisfies the create options
//! Search::State(p)  -> p(state)
//! Search::Data(p)   -> p(state.data)
//! ```
//!
//! When nothing matches, the registered create function makes a new
//! instance. The pre-modifier (default: lock with the caller's frame name,
//! no lock at the root) is applied to the found or created state before it
//! is returned; the post-modifier (default: unlock) runs when the caller is
//! done with it.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use piilop_context::{Context, ContextFn, FrameName};
use piilop_core::{options_match, Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::state::{BagSnapshot, State, StateBag, StateCell};

/// A kind of cacheable external object
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Arguments of the create function. Every field must also be a field of
    /// the resource itself.
    type CreateOptions: Clone + Send + Sync + Serialize + 'static;

    /// Stable unique id
    fn id(&self) -> &str;

    /// Check if this instance can stand in for a fresh one created with `options`.
    fn satisfies(&self, options: &Self::CreateOptions) -> bool {
        options_match(options, self)
    }
}

/// Predicate over a whole state
pub type StatePredicate<D> = Arc<dyn Fn(&State<D>) -> bool + Send + Sync>;
/// Predicate over a state's data
pub type DataPredicate<D> = Arc<dyn Fn(&D) -> bool + Send + Sync>;
/// Mutation applied to a found state
pub type StateModifier<D> = Arc<dyn Fn(&mut State<D>) + Send + Sync>;

/// Create function of a resource kind
pub type CreateFn<D> = ContextFn<<D as Resource>::CreateOptions, D>;
/// Delete function of a resource kind
pub type DeleteFn<D> = ContextFn<D, ()>;

/// How to pick an existing instance
pub enum Search<D> {
    /// Unlocked and satisfying the create options
    Default,
    /// Match on the full state
    State(StatePredicate<D>),
    /// Match on the data only
    Data(DataPredicate<D>),
}

impl<D> Clone for Search<D> {
    fn clone(&self) -> Self {
        match self {
            Search::Default => Search::Default,
            Search::State(p) => Search::State(p.clone()),
            Search::Data(p) => Search::Data(p.clone()),
        }
    }
}

/// Lookup request for [`ResourceManager`] find operations
pub struct SearchSpec<D: Resource> {
    /// Options used both for the default search and for creation
    pub options: D::CreateOptions,
    /// Which existing instance qualifies
    pub search: Search<D>,
    /// Applied to the chosen state; default locks it
    pub modifier_pre: Option<StateModifier<D>>,
    /// Applied when the caller releases the state; default unlocks it
    pub modifier_post: Option<StateModifier<D>>,
    /// Frame levels above the caller at which `find_state` releases
    pub release_level: usize,
}

impl<D: Resource> Clone for SearchSpec<D> {
    fn clone(&self) -> Self {
        SearchSpec {
            options: self.options.clone(),
            search: self.search.clone(),
            modifier_pre: self.modifier_pre.clone(),
            modifier_post: self.modifier_post.clone(),
            release_level: self.release_level,
        }
    }
}

impl<D: Resource> SearchSpec<D> {
    /// Default search for `options`.
    pub fn new(options: D::CreateOptions) -> Self {
        SearchSpec {
            options,
            search: Search::Default,
            modifier_pre: None,
            modifier_post: None,
            release_level: 0,
        }
    }

    /// Match on the full state instead.
    pub fn search_state<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&State<D>) -> bool + Send + Sync + 'static,
    {
        self.search = Search::State(Arc::new(predicate));
        self
    }

    /// Match on the data instead.
    pub fn search_data<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D) -> bool + Send + Sync + 'static,
    {
        self.search = Search::Data(Arc::new(predicate));
        self
    }

    /// Replace the default lock.
    pub fn modifier_pre<F>(mut self, modifier: F) -> Self
    where
        F: Fn(&mut State<D>) + Send + Sync + 'static,
    {
        self.modifier_pre = Some(Arc::new(modifier));
        self
    }

    /// Replace the default unlock.
    pub fn modifier_post<F>(mut self, modifier: F) -> Self
    where
        F: Fn(&mut State<D>) + Send + Sync + 'static,
    {
        self.modifier_post = Some(Arc::new(modifier));
        self
    }

    /// Release the state when the frame `level` ancestors up closes.
    pub fn release_level(mut self, level: usize) -> Self {
        self.release_level = level;
        self
    }

    fn matches(&self, state: &State<D>) -> bool {
        match &self.search {
            Search::Default => !state.is_locked() && state.data.satisfies(&self.options),
            Search::State(predicate) => predicate(state),
            Search::Data(predicate) => predicate(&state.data),
        }
    }

    fn post(&self) -> StateModifier<D> {
        match &self.modifier_post {
            Some(modifier) => modifier.clone(),
            None => Arc::new(|state: &mut State<D>| state.unlock()),
        }
    }
}

/// Applies a post-modifier when dropped, on every exit path of a body.
struct Release<D> {
    cell: StateCell<D>,
    modifier: StateModifier<D>,
}

impl<D> Drop for Release<D> {
    fn drop(&mut self) {
        (self.modifier)(&mut self.cell.lock());
    }
}

/// Cache of one resource kind
pub struct ResourceManager<D: Resource> {
    name: String,
    bag: Mutex<StateBag<D>>,
    create_fn: Mutex<Option<CreateFn<D>>>,
    delete_fn: Mutex<Option<DeleteFn<D>>>,
}

impl<D: Resource> std::fmt::Debug for ResourceManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("name", &self.name)
            .field("active", &self.bag.lock().len())
            .finish_non_exhaustive()
    }
}

impl<D: Resource> ResourceManager<D> {
    /// Empty manager with no create or delete function.
    pub fn new(name: impl Into<String>) -> Self {
        ResourceManager {
            name: name.into(),
            bag: Mutex::new(StateBag::default()),
            create_fn: Mutex::new(None),
            delete_fn: Mutex::new(None),
        }
    }

    /// Resource kind name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the create function.
    pub fn register_create_fn<F, Fut>(&self, f: F)
    where
        F: Fn(Context, D::CreateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D>> + Send + 'static,
    {
        self.set_create_fn(ContextFn::new(f));
    }

    /// Set the create function, running each call in a frame named by `name_fn`.
    pub fn register_wrapped_create_fn<N, F, Fut>(&self, name_fn: N, f: F) -> Result<()>
    where
        N: Fn(&D::CreateOptions) -> String + Send + Sync + 'static,
        F: Fn(Context, D::CreateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D>> + Send + 'static,
    {
        self.set_create_fn(ContextFn::new(f).wrap(FrameName::derived(name_fn))?);
        Ok(())
    }

    /// Set the delete function.
    pub fn register_delete_fn<F, Fut>(&self, f: F)
    where
        F: Fn(Context, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.set_delete_fn(ContextFn::new(f));
    }

    /// Set the delete function, running each call in a frame named by `name_fn`.
    pub fn register_wrapped_delete_fn<N, F, Fut>(&self, name_fn: N, f: F) -> Result<()>
    where
        N: Fn(&D) -> String + Send + Sync + 'static,
        F: Fn(Context, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.set_delete_fn(ContextFn::new(f).wrap(FrameName::derived(name_fn))?);
        Ok(())
    }

    /// Replace the create function.
    pub fn set_create_fn(&self, f: CreateFn<D>) {
        *self.create_fn.lock() = Some(f);
    }

    /// Replace the delete function.
    pub fn set_delete_fn(&self, f: DeleteFn<D>) {
        *self.delete_fn.lock() = Some(f);
    }

    /// The registered create function
    pub fn create_fn(&self) -> Result<CreateFn<D>> {
        self.create_fn
            .lock()
            .clone()
            .ok_or_else(|| Error::MissingCreateFn(self.name.clone()))
    }

    /// The registered delete function
    pub fn delete_fn(&self) -> Result<DeleteFn<D>> {
        self.delete_fn
            .lock()
            .clone()
            .ok_or_else(|| Error::MissingDeleteFn(self.name.clone()))
    }

    /// Create an instance, apply `modifier` and add it to the active set.
    ///
    /// A failing create function records nothing.
    pub async fn create<M>(
        &self,
        ctx: &Context,
        options: D::CreateOptions,
        modifier: M,
    ) -> Result<StateCell<D>>
    where
        M: FnOnce(&mut State<D>) + Send,
    {
        let create_fn = self.create_fn()?;
        self.create_with(ctx, &create_fn, options, modifier).await
    }

    /// Like [`create`](Self::create) but with an explicit create function.
    pub async fn create_with<M>(
        &self,
        ctx: &Context,
        create_fn: &CreateFn<D>,
        options: D::CreateOptions,
        modifier: M,
    ) -> Result<StateCell<D>>
    where
        M: FnOnce(&mut State<D>) + Send,
    {
        let data = create_fn.call(ctx.clone(), options).await?;
        let mut state = State::new(data);
        modifier(&mut state);
        debug!(kind = %self.name, id = %state.data.id(), "resource created");
        let mut bag = self.bag.lock();
        if bag.elements().iter().any(|cell| cell.lock().data.id() == state.data.id()) {
            return Err(self.duplicate(state.data.id()));
        }
        Ok(bag.add(state))
    }

    fn duplicate(&self, id: &str) -> Error {
        Error::DuplicateResourceId {
            kind: self.name.clone(),
            id: id.to_string(),
        }
    }

    /// Delete an instance and move it to the history.
    ///
    /// A failing delete function leaves the element active.
    pub async fn delete(&self, ctx: &Context, data: D) -> Result<()> {
        let delete_fn = self.delete_fn()?;
        let id = data.id().to_string();
        delete_fn.call(ctx.clone(), data).await?;
        self.bag.lock().retire(|state| state.data.id() == id);
        debug!(kind = %self.name, id = %id, "resource deleted");
        Ok(())
    }

    /// First active element matching `search` (after `modifier`), or a new one.
    pub async fn get_or_create<S, M>(
        &self,
        ctx: &Context,
        search: S,
        options: D::CreateOptions,
        modifier: M,
    ) -> Result<StateCell<D>>
    where
        S: Fn(&State<D>) -> bool + Send,
        M: Fn(&mut State<D>) + Send,
    {
        let found = self.bag.lock().get(&search, &modifier);
        match found {
            Some(cell) => Ok(cell),
            None => self.create(ctx, options, modifier).await,
        }
    }

    /// Find or create an instance, lock it with the tag `delete`, then delete it.
    pub async fn get_or_create_and_delete<S>(
        &self,
        ctx: &Context,
        search: S,
        options: D::CreateOptions,
    ) -> Result<()>
    where
        S: Fn(&State<D>) -> bool + Send,
    {
        self.delete_fn()?;
        let cell = self
            .get_or_create(ctx, search, options, |state: &mut State<D>| {
                state.lock("delete")
            })
            .await?;
        let data = cell.lock().data.clone();
        self.delete(ctx, data).await
    }

    /// Find or create an instance and apply the pre-modifier.
    ///
    /// Releasing it is up to the caller.
    pub async fn find_state_manual(&self, ctx: &Context, spec: SearchSpec<D>) -> Result<StateCell<D>> {
        self.acquire(ctx, &spec).await
    }

    /// Find or create an instance, run `body` with it, then apply the
    /// post-modifier whatever `body` returns.
    pub async fn find_state_and_call<R, F, Fut>(
        &self,
        ctx: &Context,
        spec: SearchSpec<D>,
        body: F,
    ) -> Result<R>
    where
        F: FnOnce(StateCell<D>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let cell = self.acquire(ctx, &spec).await?;
        let _release = Release {
            cell: cell.clone(),
            modifier: spec.post(),
        };
        body(cell).await
    }

    /// Like [`find_state_and_call`](Self::find_state_and_call) with the data only.
    pub async fn find_data_and_call<R, F, Fut>(
        &self,
        ctx: &Context,
        spec: SearchSpec<D>,
        body: F,
    ) -> Result<R>
    where
        F: FnOnce(D) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.find_state_and_call(ctx, spec, |cell| {
            let data = cell.lock().data.clone();
            body(data)
        })
        .await
    }

    /// Find or create an instance and defer the post-modifier to the frame
    /// `spec.release_level` levels above `ctx`.
    pub async fn find_state(&self, ctx: &Context, spec: SearchSpec<D>) -> Result<StateCell<D>> {
        let cell = self.acquire(ctx, &spec).await?;
        let post = spec.post();
        let held = cell.clone();
        let release = post.clone();
        if let Err(err) = ctx.defer(spec.release_level, move || release(&mut held.lock())) {
            post(&mut cell.lock());
            return Err(err);
        }
        Ok(cell)
    }

    /// Like [`find_state`](Self::find_state) returning a copy of the data.
    pub async fn find_data(&self, ctx: &Context, spec: SearchSpec<D>) -> Result<D> {
        let cell = self.find_state(ctx, spec).await?;
        let data = cell.lock().data.clone();
        Ok(data)
    }

    /// Drop `tag` from the first active instance matching `predicate`.
    pub fn remove_dependent<P>(&self, predicate: P, tag: &str)
    where
        P: Fn(&D) -> bool,
    {
        self.bag.lock().get(
            |state| predicate(&state.data),
            |state| {
                state.remove_dependent(tag);
            },
        );
    }

    /// Active instances, in creation order
    pub fn active(&self) -> Vec<StateCell<D>> {
        self.bag.lock().elements().to_vec()
    }

    /// Deleted instances, in deletion order
    pub fn deleted(&self) -> Vec<StateCell<D>> {
        self.bag.lock().deleted().to_vec()
    }

    /// Write one JSON line per active instance, then one per deleted instance.
    pub fn info(&self, sink: &mut dyn FnMut(&str)) -> Result<()> {
        let snapshot = self.bag.lock().snapshot();
        for state in &snapshot.elements {
            sink(&serde_json::to_string(state)?);
        }
        for state in &snapshot.deleted {
            sink(&format!("  deleted: {}", serde_json::to_string(state)?));
        }
        Ok(())
    }

    /// Snapshot of active and deleted instances.
    pub fn save(&self) -> Result<Value> {
        let snapshot = self.bag.lock().snapshot();
        Ok(serde_json::to_value(snapshot)?)
    }

    /// Decode a snapshot produced by [`save`](Self::save) without applying it.
    ///
    /// Fails if it does not decode or repeats an active id.
    pub fn validate(&self, snapshot: &Value) -> Result<BagSnapshot<D>> {
        let snapshot: BagSnapshot<D> = serde_json::from_value(snapshot.clone())?;
        let mut seen = HashSet::new();
        for state in &snapshot.elements {
            if !seen.insert(state.data.id()) {
                return Err(self.duplicate(state.data.id()));
            }
        }
        Ok(snapshot)
    }

    /// Replace all state with a snapshot produced by [`save`](Self::save).
    ///
    /// A snapshot that fails [`validate`](Self::validate) leaves state as it was.
    pub fn load(&self, snapshot: &Value) -> Result<()> {
        let snapshot = self.validate(snapshot)?;
        debug!(
            kind = %self.name,
            active = snapshot.elements.len(),
            deleted = snapshot.deleted.len(),
            "loaded resource state"
        );
        self.bag.lock().restore(snapshot);
        Ok(())
    }

    /// Delete every active instance, in creation order.
    ///
    /// Stops at the first failing delete; that instance and the rest stay
    /// active.
    pub async fn clean(&self, ctx: &Context) -> Result<()> {
        let delete_fn = self.delete_fn()?;
        let pending = self.active();
        info!(kind = %self.name, count = pending.len(), "cleaning resources");
        for cell in pending {
            let data = cell.lock().data.clone();
            let id = data.id().to_string();
            delete_fn.call(ctx.clone(), data).await?;
            self.bag.lock().retire(|state| state.data.id() == id);
        }
        Ok(())
    }

    /// Forget all state without deleting anything.
    pub fn clear(&self) {
        info!(kind = %self.name, "clearing resource state");
        *self.bag.lock() = StateBag::default();
    }

    /// Lock with the caller's frame name; the root frame takes no lock.
    fn owner_modifier(ctx: &Context) -> StateModifier<D> {
        let owner = ctx.current_test_name();
        Arc::new(move |state: &mut State<D>| state.locked_by = owner.clone())
    }

    async fn acquire(&self, ctx: &Context, spec: &SearchSpec<D>) -> Result<StateCell<D>> {
        let pre = match &spec.modifier_pre {
            Some(modifier) => modifier.clone(),
            None => Self::owner_modifier(ctx),
        };
        let cell = self
            .get_or_create(
                ctx,
                |state: &State<D>| spec.matches(state),
                spec.options.clone(),
                move |state: &mut State<D>| pre(state),
            )
            .await?;
        {
            let state = cell.lock();
            debug!(
                kind = %self.name,
                id = %state.data.id(),
                owner = ?state.locked_by,
                caller = %ctx.owner_tag(),
                "resource acquired"
            );
        }
        Ok(cell)
    }
}
