//! Unified error types for Piilop.
//!
//! Errors fall into three families:
//!
//! | Family | Variants | Retried? |
//! |--------|----------|----------|
//! | Configuration | `DuplicateTest`, `DuplicateResourceKind`, `MissingCreateFn`, `MissingDeleteFn`, `DependencyNotFound`, `DependencyCycle`, `SortLengthMismatch`, `MissingFrameName`, `DeferPastRoot`, `StackEmpty`, `FrameOrder`, `FrameClosed`, `MissingResourceData` | never |
//! | Resource action / test body | `Action`, `Assertion`, `DuplicateResourceId` | never |
//! | Classified | `Reported` | never |
//!
//! A `Reported` error is one a frame has already classified as `failed`.
//! Enclosing frames see the depth it carries and classify themselves as
//! `skipped` instead of reporting the same failure again.

use thiserror::Error;

/// A boxed error from user code (resource create/delete functions, test bodies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All Piilop errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Two tests were registered under the same name
    #[error("duplicate test names not allowed: \"{0}\"")]
    DuplicateTest(String),

    /// Two resource managers were registered under the same kind name
    #[error("resources for {0} are already defined")]
    DuplicateResourceKind(String),

    /// `create` called on a manager without a create function
    #[error("create function not set for \"{0}\" resources")]
    MissingCreateFn(String),

    /// `delete` called on a manager without a delete function
    #[error("delete function not set for \"{0}\" resources")]
    MissingDeleteFn(String),

    /// A `depends_on` token matched no suite and no name prefix
    #[error("test \"{test}\" has a dependency \"{dependency}\" which was not found")]
    DependencyNotFound {
        /// Test declaring the dependency
        test: String,
        /// The unresolved token
        dependency: String,
    },

    /// The dependency graph is not acyclic
    #[error("error sorting tests: a cycle appears to exist between {test} and {waits_on}")]
    DependencyCycle {
        /// A test left with outstanding dependencies
        test: String,
        /// One of the tests it still waits on
        waits_on: String,
    },

    /// Internal consistency check of the sorter
    #[error("error sorting tests: the final sorted length ({sorted}) did not equal the original length ({expected})")]
    SortLengthMismatch {
        /// Entries in the sorted output
        sorted: usize,
        /// Entries in the input
        expected: usize,
    },

    /// A wrapped function resolved to an empty frame name
    #[error("name missing for wrapped function")]
    MissingFrameName,

    /// `defer` walked past the root frame
    #[error("cannot defer {level} level(s) up; no parent is at that level")]
    DeferPastRoot {
        /// Requested ancestor level
        level: usize,
    },

    /// `end` called on the root frame
    #[error("test context stack empty")]
    StackEmpty,

    /// A frame was used while one of its children was still open
    #[error("frame \"{frame}\" used while \"{open}\" is still open")]
    FrameOrder {
        /// Frame asked to begin a child or to end
        frame: String,
        /// Innermost frame still open
        open: String,
    },

    /// A context handle outlived the frame it points at
    #[error("test context frame is no longer open")]
    FrameClosed,

    /// A registry snapshot lacks a registered resource kind
    #[error("error loading resource registry: data is missing for \"{0}\" resources")]
    MissingResourceData(String),

    /// A create function or snapshot produced an id that is already active
    #[error("\"{kind}\" resource \"{id}\" is already active")]
    DuplicateResourceId {
        /// Resource kind name
        kind: String,
        /// The repeated id
        id: String,
    },

    /// Snapshot encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure raised by a resource action or test body
    #[error("{0}")]
    Action(#[source] BoxError),

    /// A check inside a test body did not hold
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// An error already classified `failed` by the frame that raised it
    #[error("{source}")]
    Reported {
        /// Name of the frame that failed
        test: String,
        /// Open-test depth of that frame
        depth: usize,
        /// Open frames at the point of failure, outermost first
        breadcrumbs: Vec<String>,
        /// The original error
        source: Box<Error>,
    },
}

/// Result type for Piilop operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap any error raised by user code.
    pub fn action(err: impl Into<BoxError>) -> Self {
        Error::Action(err.into())
    }

    /// A failed check inside a test body.
    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion(message.into())
    }

    /// Check if this is a fatal configuration error (programming mistake).
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::Reported { source, .. } => source.is_configuration(),
            Error::DuplicateTest(_)
            | Error::DuplicateResourceKind(_)
            | Error::MissingCreateFn(_)
            | Error::MissingDeleteFn(_)
            | Error::DependencyNotFound { .. }
            | Error::DependencyCycle { .. }
            | Error::SortLengthMismatch { .. }
            | Error::MissingFrameName
            | Error::DeferPastRoot { .. }
            | Error::StackEmpty
            | Error::FrameOrder { .. }
            | Error::FrameClosed
            | Error::MissingResourceData(_) => true,
            Error::DuplicateResourceId { .. }
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Action(_)
            | Error::Assertion(_) => false,
        }
    }

    /// Check if a frame has already reported this error as its own failure.
    pub fn is_reported(&self) -> bool {
        matches!(self, Error::Reported { .. })
    }

    /// Depth of the frame that reported this error, if any.
    pub fn reported_depth(&self) -> Option<usize> {
        match self {
            Error::Reported { depth, .. } => Some(*depth),
            _ => None,
        }
    }

    /// The original error beneath any `Reported` layer.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Reported { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
