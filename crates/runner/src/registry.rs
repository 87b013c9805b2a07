//! Test registry
//!
//! The catalog of test entries plus the resource managers they use.
//! Registering an entry wraps its body in a frame named after the entry.
//! Create and delete tests can be derived from a resource manager: one entry
//! per set of create options.

use std::future::Future;
use std::sync::Arc;

use piilop_context::{Context, ContextFn, FrameName};
use piilop_core::{Error, Priority, Result};
use piilop_resources::{
    CreateFn, DeleteFn, Resource, ResourceManager, ResourceManagerRegistry, SearchSpec, State,
};
use piilop_scheduler::sort;
use tracing::debug;

use crate::entry::TestEntry;

type OptionsName<D> = Arc<dyn Fn(&<D as Resource>::CreateOptions) -> String + Send + Sync>;

/// Declaration of a resource kind with its create and delete test cases
///
/// Consumed by [`TestRegistry::new_resource_manager`].
pub struct ResourceSuite<D: Resource> {
    name: String,
    depends_on: Vec<String>,
    create: Option<(OptionsName<D>, Vec<D::CreateOptions>, CreateFn<D>)>,
    delete: Option<(OptionsName<D>, Vec<D::CreateOptions>, DeleteFn<D>)>,
}

impl<D: Resource> ResourceSuite<D> {
    /// Declare the kind `name`; also used as the suite of its tests.
    pub fn new(name: impl Into<String>) -> Self {
        ResourceSuite {
            name: name.into(),
            depends_on: Vec::new(),
            create: None,
            delete: None,
        }
    }

    /// Dependency tokens of every generated test.
    pub fn depends_on<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Create function, test naming and one create test per case.
    pub fn create<N, F, Fut>(mut self, test_name: N, cases: Vec<D::CreateOptions>, func: F) -> Self
    where
        N: Fn(&D::CreateOptions) -> String + Send + Sync + 'static,
        F: Fn(Context, D::CreateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D>> + Send + 'static,
    {
        self.create = Some((Arc::new(test_name), cases, ContextFn::new(func)));
        self
    }

    /// Delete function, test naming and one delete test per case.
    pub fn delete<N, F, Fut>(mut self, test_name: N, cases: Vec<D::CreateOptions>, func: F) -> Self
    where
        N: Fn(&D::CreateOptions) -> String + Send + Sync + 'static,
        F: Fn(Context, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.delete = Some((Arc::new(test_name), cases, ContextFn::new(func)));
        self
    }
}

/// Catalog of test entries and resource kinds
#[derive(Default)]
pub struct TestRegistry {
    entries: Vec<TestEntry>,
    resources: Arc<ResourceManagerRegistry>,
}

impl std::fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRegistry")
            .field("entries", &self.entries.len())
            .field("resources", &self.resources)
            .finish()
    }
}

impl TestRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one entry, wrapping its body in a frame named after it.
    ///
    /// Fails without registering anything if the name is taken.
    pub fn register(&mut self, mut entry: TestEntry) -> Result<&TestEntry> {
        if self.find(&entry.name).is_some() {
            return Err(Error::DuplicateTest(entry.name));
        }
        entry.func = entry.func.wrap(entry.name.as_str())?;
        debug!(test = %entry.name, suite = %entry.suite, priority = %entry.priority, "registered test");
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Look up an entry by exact name.
    pub fn find(&self, name: &str) -> Option<&TestEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Entries in registration order
    pub fn entries(&self) -> &[TestEntry] {
        &self.entries
    }

    /// The resource kinds used by these tests
    pub fn resources(&self) -> Arc<ResourceManagerRegistry> {
        self.resources.clone()
    }

    /// Create and register a manager for a new resource kind.
    pub fn new_manager<D: Resource>(&self, name: impl Into<String>) -> Result<Arc<ResourceManager<D>>> {
        self.resources.new_manager(name)
    }

    /// Entries in execution order.
    pub fn plan(&self) -> Result<Vec<TestEntry>> {
        Ok(sort(&self.entries)?.into_iter().cloned().collect())
    }

    /// Write each entry's name and priority, in registration order.
    pub fn show_entries(&self, sink: &mut dyn FnMut(&str)) {
        for entry in &self.entries {
            sink(&format!("{}\n\tpriority: {}", entry.name, entry.priority));
        }
    }

    /// Register one test per option set that creates a fresh instance
    /// through `manager`.
    pub fn register_create_tests<D, N>(
        &mut self,
        manager: &Arc<ResourceManager<D>>,
        test_name: N,
        depends_on: &[&str],
        priority: Priority,
        suite: &str,
        cases: Vec<D::CreateOptions>,
    ) -> Result<()>
    where
        D: Resource,
        N: Fn(&D::CreateOptions) -> String,
    {
        for options in cases {
            let rm = manager.clone();
            let name = test_name(&options);
            let entry = TestEntry::new(name, suite, move |ctx: Context| {
                let rm = rm.clone();
                let options = options.clone();
                async move { rm.create(&ctx, options, |_| {}).await.map(|_| ()) }
            })
            .with_priority(priority)
            .with_depends_on(depends_on.iter().copied());
            self.register(entry)?;
        }
        Ok(())
    }

    /// Register one test per option set that deletes a matching instance
    /// through `manager`.
    ///
    /// Each test picks an instance with no dependents, not locked, whose data
    /// satisfies the options, creating one first if none exists.
    pub fn register_delete_tests<D, N>(
        &mut self,
        manager: &Arc<ResourceManager<D>>,
        test_name: N,
        depends_on: &[&str],
        priority: Priority,
        suite: &str,
        cases: Vec<D::CreateOptions>,
    ) -> Result<()>
    where
        D: Resource,
        N: Fn(&D::CreateOptions) -> String,
    {
        for options in cases {
            let rm = manager.clone();
            let name = test_name(&options);
            let entry = TestEntry::new(name, suite, move |ctx: Context| {
                let rm = rm.clone();
                let options = options.clone();
                async move {
                    let wanted = options.clone();
                    let spec = SearchSpec::<D>::new(options).search_state(move |state: &State<D>| {
                        !state.has_dependents()
                            && !state.is_locked()
                            && state.data.satisfies(&wanted)
                    });
                    let deleter = rm.clone();
                    let inner = ctx.clone();
                    rm.find_data_and_call(&ctx, spec, move |data| async move {
                        deleter.delete(&inner, data).await
                    })
                    .await
                }
            })
            .with_priority(priority)
            .with_depends_on(depends_on.iter().copied());
            self.register(entry)?;
        }
        Ok(())
    }

    /// Declare a resource kind together with its create and delete tests.
    ///
    /// The manager's create function is wrapped in a frame named like the
    /// matching create test, so a create triggered from another test shows
    /// up nested under it. The create tests themselves call the unwrapped
    /// function. Delete tests run with `Last` priority.
    pub fn new_resource_manager<D: Resource>(
        &mut self,
        suite: ResourceSuite<D>,
    ) -> Result<Arc<ResourceManager<D>>> {
        let ResourceSuite {
            name,
            depends_on,
            create,
            delete,
        } = suite;
        let (create_name, create_cases, create_fn) =
            create.ok_or_else(|| Error::MissingCreateFn(name.clone()))?;
        let (delete_name, delete_cases, delete_fn) =
            delete.ok_or_else(|| Error::MissingDeleteFn(name.clone()))?;

        let rm = self.resources.new_manager::<D>(name.as_str())?;
        let frame_name = create_name.clone();
        rm.set_create_fn(
            create_fn
                .clone()
                .wrap(FrameName::derived(move |options: &D::CreateOptions| frame_name(options)))?,
        );
        rm.set_delete_fn(delete_fn);

        let deps: Vec<&str> = depends_on.iter().map(String::as_str).collect();
        for options in create_cases {
            let manager = rm.clone();
            let original = create_fn.clone();
            let entry = TestEntry::new(create_name(&options), name.as_str(), move |ctx: Context| {
                let manager = manager.clone();
                let original = original.clone();
                let options = options.clone();
                async move {
                    manager
                        .create_with(&ctx, &original, options, |_| {})
                        .await
                        .map(|_| ())
                }
            })
            .with_depends_on(deps.iter().copied());
            self.register(entry)?;
        }

        self.register_delete_tests(
            &rm,
            |options: &D::CreateOptions| delete_name(options),
            &deps,
            Priority::Last,
            &name,
            delete_cases,
        )?;

        Ok(rm)
    }
}
