//! Context-taking functions and the wrap protocol
//!
//! Every test body, create function and delete function in Piilop has the
//! shape `(Context, A) -> Future<Output = Result<R>>`. [`ContextFn`] boxes
//! that shape behind an `Arc` so it can be cloned into registries and worker
//! tasks. Wrapping a `ContextFn` makes each call open a named frame through
//! [`Context::run`] and close it on every exit path.
//!
//! Wrapping is idempotent: wrapping an already wrapped function returns it
//! unchanged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use piilop_core::{BoxFuture, Error, Result};

use crate::context::Context;

/// The boxed future every [`ContextFn`] returns
pub type ContextFuture<R> = BoxFuture<'static, Result<R>>;

type Callable<A, R> = dyn Fn(Context, A) -> ContextFuture<R> + Send + Sync;

/// How a wrapped function names its frame
pub enum FrameName<A> {
    /// The same name on every call
    Fixed(String),
    /// A name derived from the call's arguments
    Derived(Arc<dyn Fn(&A) -> String + Send + Sync>),
}

impl<A> FrameName<A> {
    /// A fixed frame name.
    pub fn fixed(name: impl Into<String>) -> Self {
        FrameName::Fixed(name.into())
    }

    /// A frame name computed from the arguments of each call.
    pub fn derived<F>(name_fn: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        FrameName::Derived(Arc::new(name_fn))
    }

    /// Resolve the name for one call.
    pub fn resolve(&self, args: &A) -> Result<String> {
        let name = match self {
            FrameName::Fixed(name) => name.clone(),
            FrameName::Derived(name_fn) => name_fn(args),
        };
        if name.is_empty() {
            return Err(Error::MissingFrameName);
        }
        Ok(name)
    }
}

impl<A> Clone for FrameName<A> {
    fn clone(&self) -> Self {
        match self {
            FrameName::Fixed(name) => FrameName::Fixed(name.clone()),
            FrameName::Derived(name_fn) => FrameName::Derived(name_fn.clone()),
        }
    }
}

impl<A> fmt::Debug for FrameName<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameName::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            FrameName::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl<A> From<&str> for FrameName<A> {
    fn from(name: &str) -> Self {
        FrameName::fixed(name)
    }
}

impl<A> From<String> for FrameName<A> {
    fn from(name: String) -> Self {
        FrameName::Fixed(name)
    }
}

/// A cloneable async function of `(Context, A)`
pub struct ContextFn<A, R> {
    inner: Arc<Callable<A, R>>,
    wrapped: bool,
}

impl<A, R> Clone for ContextFn<A, R> {
    fn clone(&self) -> Self {
        ContextFn {
            inner: self.inner.clone(),
            wrapped: self.wrapped,
        }
    }
}

impl<A, R> fmt::Debug for ContextFn<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFn")
            .field("wrapped", &self.wrapped)
            .finish_non_exhaustive()
    }
}

impl<A, R> ContextFn<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Box an async function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        ContextFn {
            inner: Arc::new(move |ctx, args| Box::pin(f(ctx, args))),
            wrapped: false,
        }
    }

    /// Invoke the function.
    pub fn call(&self, ctx: Context, args: A) -> ContextFuture<R> {
        (self.inner)(ctx, args)
    }

    /// Check if calls already open their own frame
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Make every call run inside a frame named by `name`.
    ///
    /// Returns `self` unchanged when already wrapped. A fixed empty name is
    /// rejected here; a derived name that resolves empty fails the call.
    pub fn wrap(self, name: impl Into<FrameName<A>>) -> Result<Self> {
        if self.wrapped {
            return Ok(self);
        }
        let name = name.into();
        if let FrameName::Fixed(fixed) = &name {
            if fixed.is_empty() {
                return Err(Error::MissingFrameName);
            }
        }

        let inner = self.inner;
        let wrapped = move |ctx: Context, args: A| -> ContextFuture<R> {
            let inner = inner.clone();
            let frame = name.resolve(&args);
            Box::pin(async move {
                let frame = frame?;
                ctx.run(frame, move |child| inner(child, args)).await
            })
        };
        Ok(ContextFn {
            inner: Arc::new(wrapped),
            wrapped: true,
        })
    }
}

/// Box `f` and wrap it in one step.
pub fn wrap<A, R, F, Fut>(name: impl Into<FrameName<A>>, f: F) -> Result<ContextFn<A, R>>
where
    A: Send + 'static,
    R: Send + 'static,
    F: Fn(Context, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    ContextFn::new(f).wrap(name)
}
