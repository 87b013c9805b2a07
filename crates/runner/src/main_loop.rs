//! Test runner
//!
//! [`TestMain`] sorts the registry into a plan, keeps the entries selected
//! by the name prefix and executes them. The selected entries are reversed
//! into a stack so successive pops yield plan order.
//!
//! With one worker every entry runs in plan order on the main root context
//! (`t-0`). With more, each worker gets its own root context (`t-1`,
//! `t-2`, ...) and pops from the shared stack until it is empty. Workers only
//! take entries in plan order; an entry may start before an earlier entry
//! running on another worker has finished.
//!
//! A panicking test body is recorded as a failed outcome. Its frames close
//! as `failed` while unwinding and the run goes on.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use parking_lot::Mutex;
use piilop_context::{Context, TestObserver};
use piilop_core::{BoxFuture, Error, Result, TestStatus};
use tracing::{debug, info, warn};

use crate::entry::TestEntry;
use crate::options::{RunOptions, RunReport, TestOutcome};
use crate::registry::TestRegistry;

/// Runs the plan of a [`TestRegistry`]
pub struct TestMain {
    registry: Arc<TestRegistry>,
    observer: Arc<dyn TestObserver>,
    root: Context,
    next_thread: AtomicUsize,
}

impl std::fmt::Debug for TestMain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestMain")
            .field("registry", &self.registry)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl TestMain {
    /// Runner over `registry` reporting to `observer`.
    pub fn new(registry: Arc<TestRegistry>, observer: Arc<dyn TestObserver>) -> Self {
        TestMain {
            registry,
            root: Context::new(observer.clone()),
            observer,
            next_thread: AtomicUsize::new(1),
        }
    }

    /// The main root context (`t-0`)
    pub fn root(&self) -> &Context {
        &self.root
    }

    /// The registry being run
    pub fn registry(&self) -> &Arc<TestRegistry> {
        &self.registry
    }

    /// Write the plan's entry names in execution order without running them.
    pub fn show_test_list(&self, sink: &mut dyn FnMut(&str)) -> Result<()> {
        for entry in self.registry.plan()? {
            sink(&entry.name);
        }
        Ok(())
    }

    /// Run every plan entry selected by `options`.
    ///
    /// Scheduling errors are returned before anything runs. Test failures
    /// are recorded in the report; with `fail_fast` the first one stops
    /// further entries from being taken.
    pub async fn run_test(&self, options: RunOptions) -> Result<RunReport> {
        let prefix = options.selected_prefix();
        let mut work: Vec<TestEntry> = self
            .registry
            .plan()?
            .into_iter()
            .filter(|entry| entry.name.starts_with(prefix))
            .collect();
        work.reverse();

        info!(
            prefix = %prefix,
            selected = work.len(),
            workers = options.workers,
            "starting test run"
        );

        let report = if options.workers <= 1 {
            self.run_sequential(work, options.fail_fast).await
        } else {
            self.run_pool(work, options.workers, options.fail_fast).await
        };
        self.root.release_root();

        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "test run finished"
        );
        Ok(report)
    }

    async fn run_sequential(&self, mut work: Vec<TestEntry>, fail_fast: bool) -> RunReport {
        let mut report = RunReport::default();
        while let Some(entry) = work.pop() {
            let outcome = run_entry(&self.root, &entry).await;
            let passed = outcome.status.is_passed();
            report.push(outcome);
            if !passed && fail_fast {
                warn!(test = %entry.name, remaining = work.len(), "stopping after failure");
                break;
            }
        }
        report
    }

    async fn run_pool(&self, work: Vec<TestEntry>, workers: usize, fail_fast: bool) -> RunReport {
        let queue = Arc::new(Mutex::new(work));
        let report = Arc::new(Mutex::new(RunReport::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let n = self.next_thread.fetch_add(1, Ordering::SeqCst);
            let ctx = self
                .root
                .spawn_thread(format!("t-{}", n), self.observer.clone());
            let queue = queue.clone();
            let report = report.clone();
            let stop = stop.clone();
            handles.push(tokio::spawn(async move {
                let _release = ReleaseRoot(ctx.clone());
                while !stop.load(Ordering::SeqCst) {
                    let next = queue.lock().pop();
                    let Some(entry) = next else { break };
                    debug!(thread = %ctx.thread_name(), test = %entry.name, "worker took entry");
                    let outcome = run_entry(&ctx, &entry).await;
                    if !outcome.status.is_passed() && fail_fast {
                        stop.store(true, Ordering::SeqCst);
                    }
                    report.lock().push(outcome);
                }
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }

        let report = std::mem::take(&mut *report.lock());
        report
    }
}

/// Runs a worker root's deferred callbacks however the worker task ends.
struct ReleaseRoot(Context);

impl Drop for ReleaseRoot {
    fn drop(&mut self) {
        self.0.release_root();
    }
}

/// Resolves to `Err(message)` when polling the inner future panics.
struct CatchPanic<'a, T> {
    inner: BoxFuture<'a, T>,
}

impl<'a, T> Future for CatchPanic<'a, T> {
    type Output = std::result::Result<T, String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        match catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Err(payload) => Poll::Ready(Err(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one entry and classify its outcome relative to `ctx`.
async fn run_entry(ctx: &Context, entry: &TestEntry) -> TestOutcome {
    let base = ctx.depth();
    let body = CatchPanic {
        inner: Box::pin(entry.run(ctx)),
    };
    let result = match body.await {
        Ok(result) => result,
        Err(message) => {
            warn!(test = %entry.name, panic = %message, "test body panicked");
            Err(Error::action(format!("test panicked: {}", message)))
        }
    };
    let (status, error) = match result {
        Ok(()) => (TestStatus::Passed, None),
        Err(err) => {
            let status = match err.reported_depth() {
                Some(depth) if depth > base + 1 => TestStatus::Skipped,
                _ => TestStatus::Failed,
            };
            (status, Some(err.to_string()))
        }
    };
    TestOutcome {
        name: entry.name.clone(),
        thread: ctx.thread_name(),
        status,
        error,
    }
}
