//! Registered test entries

use std::future::Future;

use piilop_context::{Context, ContextFn};
use piilop_core::{Priority, Result};
use piilop_scheduler::Schedulable;

/// Body of a test: a context-taking function with no arguments
pub type TestFn = ContextFn<(), ()>;

/// A named, suite-grouped, prioritized test
#[derive(Debug, Clone)]
pub struct TestEntry {
    /// Globally unique name
    pub name: String,
    /// Suite, also usable as a dependency token
    pub suite: String,
    /// Scheduling hint
    pub priority: Priority,
    /// Suite names or name prefixes this entry runs after
    pub depends_on: Vec<String>,
    /// The body; wrapped in a frame named `name` once registered
    pub func: TestFn,
}

impl TestEntry {
    /// Entry with `Normal` priority and no dependencies.
    pub fn new<F, Fut>(name: impl Into<String>, suite: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        TestEntry {
            name: name.into(),
            suite: suite.into(),
            priority: Priority::Normal,
            depends_on: Vec::new(),
            func: ContextFn::new(move |ctx, ()| func(ctx)),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the dependency tokens.
    pub fn with_depends_on<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Run the body against `ctx`.
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        self.func.call(ctx.clone(), ()).await
    }
}

impl Schedulable for TestEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn suite(&self) -> &str {
        &self.suite
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}
