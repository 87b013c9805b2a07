//! Per-worker event log
//!
//! A [`TestThread`] records, in order, every test start and finish on one
//! chain of frames (plus the workers it spawned). Breadcrumbs are rebuilt by
//! replaying that log; nothing else reads it.

use piilop_core::TestStatus;

/// One entry of the event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    /// A frame opened and announced itself
    Started {
        /// Frame name
        test: String,
    },
    /// A frame closed and announced itself
    Finished {
        /// Frame name
        test: String,
        /// Outcome
        status: TestStatus,
    },
    /// A worker thread was spawned from this one
    Spawned {
        /// Name of the child thread
        child: String,
    },
}

/// Ordered start/finish log for one worker
#[derive(Debug, Clone)]
pub struct TestThread {
    name: String,
    items: Vec<ThreadEvent>,
    depth: usize,
}

impl TestThread {
    /// Create an empty log.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            depth: 0,
        }
    }

    /// Thread name (`t-<n>` for threads created by the runner)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of tests started and not yet finished
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The recorded events, oldest first
    pub fn events(&self) -> &[ThreadEvent] {
        &self.items
    }

    /// Record a test start.
    pub fn start_test(&mut self, test: impl Into<String>) {
        self.items.push(ThreadEvent::Started { test: test.into() });
        self.depth += 1;
    }

    /// Record a test finish.
    pub fn finish_test(&mut self, test: impl Into<String>, status: TestStatus) {
        self.items.push(ThreadEvent::Finished {
            test: test.into(),
            status,
        });
        self.depth = self.depth.saturating_sub(1);
    }

    /// Record that a child thread was spawned from this one.
    pub fn spawn_child(&mut self, child: impl Into<String>) {
        self.items.push(ThreadEvent::Spawned {
            child: child.into(),
        });
    }

    /// Names of the tests still open, outermost first.
    pub fn breadcrumbs(&self) -> Vec<String> {
        let mut crumbs: Vec<String> = Vec::new();
        for item in &self.items {
            match item {
                ThreadEvent::Started { test } => crumbs.push(test.clone()),
                ThreadEvent::Finished { test, .. } => {
                    if crumbs.last() == Some(test) {
                        crumbs.pop();
                    }
                }
                ThreadEvent::Spawned { .. } => {}
            }
        }
        crumbs
    }

    /// Snapshot handed to observers.
    pub fn stack_info(&self) -> StackInfo {
        StackInfo {
            thread: self.name.clone(),
            depth: self.depth,
            breadcrumbs: self.breadcrumbs(),
        }
    }
}

/// Where a test sits when an observer hears about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo {
    /// Thread the event happened on
    pub thread: String,
    /// Open-test depth, counting the reported test
    pub depth: usize,
    /// Open test names, outermost first, ending with the reported test
    pub breadcrumbs: Vec<String>,
}

impl StackInfo {
    /// Breadcrumbs joined with ` -> `.
    pub fn render_breadcrumbs(&self) -> String {
        render_breadcrumbs(&self.breadcrumbs)
    }
}

/// Join breadcrumbs with ` -> `.
pub fn render_breadcrumbs(crumbs: &[String]) -> String {
    if crumbs.is_empty() {
        return "< no breadcrumbs found >".to_string();
    }
    crumbs.join(" -> ")
}
