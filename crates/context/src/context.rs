//! The execution context stack
//!
//! A [`Context`] is a cheap, clonable handle to one frame of a per-worker
//! frame stack. Frames live in an arena owned by the stack and point at their
//! parent by index; a child never owns its parent, and a frame is popped as
//! soon as the call that opened it returns.
//!
//! ## Protocol
//!
//! ```text
//! begin(name)  -> child     announce START unless name == parent name (alias)
//! defer(n, f)               queue f on the frame n levels up (0 = this one)
//! end()        -> parent    run queued callbacks in order, announce FINISH
//! run(name, body)           begin + body + classified close, on every path
//! ```
//!
//! ## Skip classification
//!
//! `run` remembers the open-test depth right after opening its frame. An
//! error leaving the body that carries no reported depth (or this frame's
//! depth) originates here: the frame finishes `failed` and stamps the error
//! with its depth. An error stamped by a deeper frame has already been
//! reported: this frame finishes `skipped` and passes the error through.
//!
//! No lock is held while a body runs, while deferred callbacks run, or while
//! the observer is notified.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use piilop_core::{Error, Result, TestStatus};
use tracing::{debug, warn};

use crate::observer::{NullObserver, TestObserver};
use crate::thread::{render_breadcrumbs, StackInfo, TestThread};

type Deferred = Box<dyn FnOnce() + Send + 'static>;

/// Arena slot of a frame plus the serial that proves the slot was not reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    index: usize,
    serial: u64,
}

struct Frame {
    serial: u64,
    parent: Option<usize>,
    /// `None` only for the root frame
    name: Option<String>,
    /// Same name as the parent: opens and closes silently
    alias: bool,
    deferred: Vec<Deferred>,
}

impl Frame {
    fn root() -> Self {
        Frame {
            serial: 0,
            parent: None,
            name: None,
            alias: false,
            deferred: Vec::new(),
        }
    }
}

struct ContextStack {
    /// Index 0 is the root and is never popped
    frames: Vec<Frame>,
    next_serial: u64,
    thread: TestThread,
    observer: Arc<dyn TestObserver>,
}

impl ContextStack {
    fn locate(&self, id: FrameId) -> Result<usize> {
        match self.frames.get(id.index) {
            Some(frame) if frame.serial == id.serial => Ok(id.index),
            _ => Err(Error::FrameClosed),
        }
    }

    fn label(&self, index: usize) -> String {
        self.frames
            .get(index)
            .and_then(|frame| frame.name.clone())
            .unwrap_or_else(|| "<root>".to_string())
    }

    fn ensure_innermost(&self, index: usize) -> Result<()> {
        let top = self.frames.len() - 1;
        if index != top {
            return Err(Error::FrameOrder {
                frame: self.label(index),
                open: self.label(top),
            });
        }
        Ok(())
    }
}

/// Handle to one frame of a worker's frame stack
#[derive(Clone)]
pub struct Context {
    stack: Arc<Mutex<ContextStack>>,
    frame: FrameId,
}

impl Context {
    /// Create a root context on a thread named `t-0`.
    pub fn new(observer: Arc<dyn TestObserver>) -> Self {
        Self::with_thread(TestThread::new("t-0"), observer)
    }

    /// Create a root context with no observer.
    pub fn detached() -> Self {
        Self::new(Arc::new(NullObserver))
    }

    /// Create a root context over an existing event log.
    pub fn with_thread(thread: TestThread, observer: Arc<dyn TestObserver>) -> Self {
        let stack = ContextStack {
            frames: vec![Frame::root()],
            next_serial: 1,
            thread,
            observer,
        };
        Context {
            stack: Arc::new(Mutex::new(stack)),
            frame: FrameId {
                index: 0,
                serial: 0,
            },
        }
    }

    /// Create the root context of a new worker and log the spawn on this thread.
    pub fn spawn_thread(&self, name: impl Into<String>, observer: Arc<dyn TestObserver>) -> Self {
        let name = name.into();
        self.stack.lock().thread.spawn_child(name.as_str());
        debug!(thread = %name, "spawned worker thread");
        Self::with_thread(TestThread::new(name), observer)
    }

    /// Identifier of the frame this handle points at
    pub fn id(&self) -> FrameId {
        self.frame
    }

    /// Check if this handle points at the root frame
    pub fn is_root(&self) -> bool {
        self.frame.index == 0
    }

    /// Name of this frame; `None` at the root or once the frame has closed.
    pub fn current_test_name(&self) -> Option<String> {
        let stack = self.stack.lock();
        let index = stack.locate(self.frame).ok()?;
        stack.frames[index].name.clone()
    }

    /// Identity used as an advisory lock owner: the frame name, or the
    /// thread name at the root.
    pub fn owner_tag(&self) -> String {
        let stack = self.stack.lock();
        stack
            .locate(self.frame)
            .ok()
            .and_then(|index| stack.frames[index].name.clone())
            .unwrap_or_else(|| stack.thread.name().to_string())
    }

    /// Name of the worker thread this frame belongs to
    pub fn thread_name(&self) -> String {
        self.stack.lock().thread.name().to_string()
    }

    /// Number of announced tests currently open on this thread
    pub fn depth(&self) -> usize {
        self.stack.lock().thread.depth()
    }

    /// Open test names, outermost first.
    pub fn breadcrumbs(&self) -> Vec<String> {
        self.stack.lock().thread.breadcrumbs()
    }

    /// Snapshot of the thread's position, as observers receive it.
    pub fn stack_info(&self) -> StackInfo {
        self.stack.lock().thread.stack_info()
    }

    /// The observer notified by this stack
    pub fn observer(&self) -> Arc<dyn TestObserver> {
        self.stack.lock().observer.clone()
    }

    /// Push a child frame named `name`.
    ///
    /// A child named like its parent is an alias: it opens and closes
    /// without announcing itself.
    pub fn begin(&self, name: impl Into<String>) -> Result<Context> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::MissingFrameName);
        }
        let (child, announce) = {
            let mut guard = self.stack.lock();
            let stack = &mut *guard;
            let index = stack.locate(self.frame)?;
            stack.ensure_innermost(index)?;
            let alias = stack.frames[index].name.as_deref() == Some(name.as_str());
            let serial = stack.next_serial;
            stack.next_serial += 1;
            stack.frames.push(Frame {
                serial,
                parent: Some(index),
                name: Some(name.clone()),
                alias,
                deferred: Vec::new(),
            });
            let child = FrameId {
                index: stack.frames.len() - 1,
                serial,
            };
            let announce = if alias {
                None
            } else {
                stack.thread.start_test(name.as_str());
                Some((stack.observer.clone(), stack.thread.stack_info()))
            };
            (child, announce)
        };

        match announce {
            Some((observer, info)) => {
                debug!(test = %name, depth = info.depth, thread = %info.thread, "test started");
                observer.on_test_started(&name, &info);
            }
            None => debug!(test = %name, "aliased frame opened"),
        }

        Ok(Context {
            stack: self.stack.clone(),
            frame: child,
        })
    }

    /// Close this frame as passed and return the parent.
    ///
    /// Fails with [`Error::StackEmpty`] at the root.
    pub fn end(self) -> Result<Context> {
        self.close(TestStatus::Passed, None)
    }

    /// Queue `callback` to run when the frame `level` ancestors up closes.
    pub fn defer<F>(&self, level: usize, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut stack = self.stack.lock();
        let mut index = stack.locate(self.frame)?;
        for _ in 0..level {
            index = stack.frames[index]
                .parent
                .ok_or(Error::DeferPastRoot { level })?;
        }
        stack.frames[index].deferred.push(Box::new(callback));
        Ok(())
    }

    /// Run the callbacks deferred onto the root frame.
    ///
    /// The root never ends, so the owner of a root context calls this once
    /// its work is done.
    pub fn release_root(&self) {
        let deferred = std::mem::take(&mut self.stack.lock().frames[0].deferred);
        if !deferred.is_empty() {
            debug!(count = deferred.len(), "releasing root deferrals");
        }
        for callback in deferred {
            callback();
        }
    }

    /// Run `body` inside a child frame named `name`.
    ///
    /// The frame is closed on every exit path, including cancellation of
    /// the returned future and panics inside `body`. Errors are classified
    /// (see the module docs) and returned to the caller.
    pub async fn run<R, F, Fut>(&self, name: impl Into<String>, body: F) -> Result<R>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let name = name.into();
        let child = self.begin(name.as_str())?;
        let depth = child.depth();
        let mut guard = FrameGuard::new(&child);
        let result = body(child.clone()).await;
        guard.disarm();

        let err = match result {
            Ok(value) => {
                child.close(TestStatus::Passed, None)?;
                return Ok(value);
            }
            Err(err) => err,
        };

        let (status, err) = match err.reported_depth() {
            Some(reported) if reported > depth => (TestStatus::Skipped, err),
            Some(_) => (TestStatus::Failed, err),
            None if child.is_alias() => (TestStatus::Failed, err),
            None => {
                let breadcrumbs = child.breadcrumbs();
                let stamped = Error::Reported {
                    test: name.clone(),
                    depth,
                    breadcrumbs,
                    source: Box::new(err),
                };
                (TestStatus::Failed, stamped)
            }
        };

        if !child.is_alias() {
            match status {
                TestStatus::Failed => warn!(
                    test = %name,
                    breadcrumbs = %render_breadcrumbs(&child.breadcrumbs()),
                    error = %err,
                    "test failed"
                ),
                _ => warn!(
                    test = %name,
                    breadcrumbs = %render_breadcrumbs(&child.breadcrumbs()),
                    "test skipped"
                ),
            }
        }

        if let Err(close_err) = child.close(status, Some(&err)) {
            warn!(test = %name, error = %close_err, "could not close failing frame");
        }
        Err(err)
    }

    fn is_alias(&self) -> bool {
        let stack = self.stack.lock();
        stack
            .locate(self.frame)
            .map(|index| stack.frames[index].alias)
            .unwrap_or(false)
    }

    fn close(&self, status: TestStatus, error: Option<&Error>) -> Result<Context> {
        let (parent, name, deferred, announce) = {
            let mut guard = self.stack.lock();
            let stack = &mut *guard;
            let index = stack.locate(self.frame)?;
            if index == 0 {
                return Err(Error::StackEmpty);
            }
            stack.ensure_innermost(index)?;
            let frame = stack.frames.pop().ok_or(Error::StackEmpty)?;
            let parent_index = frame.parent.unwrap_or(0);
            let parent = FrameId {
                index: parent_index,
                serial: stack.frames[parent_index].serial,
            };
            let name = frame.name.unwrap_or_default();
            let announce = if frame.alias {
                None
            } else {
                let info = stack.thread.stack_info();
                stack.thread.finish_test(name.as_str(), status);
                Some((stack.observer.clone(), info))
            };
            (parent, name, frame.deferred, announce)
        };

        for callback in deferred {
            callback();
        }

        match announce {
            Some((observer, info)) => {
                debug!(test = %name, status = %status, depth = info.depth, "test finished");
                observer.on_test_finished(&name, status, &info, error);
            }
            None => debug!(test = %name, "aliased frame closed"),
        }

        Ok(Context {
            stack: self.stack.clone(),
            frame: parent,
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("frame", &self.frame)
            .field("thread", &self.thread_name())
            .finish()
    }
}

/// Closes an abandoned frame when `run`'s future is dropped mid-body.
struct FrameGuard {
    ctx: Option<Context>,
}

impl FrameGuard {
    fn new(ctx: &Context) -> Self {
        FrameGuard {
            ctx: Some(ctx.clone()),
        }
    }

    fn disarm(&mut self) {
        self.ctx = None;
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            let status = if std::thread::panicking() {
                TestStatus::Failed
            } else {
                TestStatus::Skipped
            };
            if let Err(err) = ctx.close(status, None) {
                warn!(error = %err, "could not close abandoned frame");
            }
        }
    }
}
