//! Scheduling and outcome types shared by every layer
//!
//! - [`Priority`]: ordering hint consumed by the scheduler
//! - [`TestStatus`]: terminal outcome of one test execution
//! - [`BoxFuture`]: the future type returned by context-taking functions

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// An owned, sendable, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Scheduling hint for a test entry
///
/// Priority never affects execution speed. It decides edge direction in the
/// dependency graph: anything depending on a `Last` entry is inverted so the
/// `Last` entry waits instead, and every `Last` entry waits on every other
/// entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Runs as early as dependencies allow
    First = 0,
    /// The default
    #[default]
    Normal = 50,
    /// Anchored after every non-`Last` entry (teardown / delete tests)
    Last = 100,
}

impl Priority {
    /// Numeric weight (0, 50, 100)
    pub fn weight(&self) -> u8 {
        *self as u8
    }

    /// Check if this entry is anchored at the end of the plan
    pub fn is_last(&self) -> bool {
        matches!(self, Priority::Last)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.weight())
    }
}

/// Terminal outcome of a test execution
///
/// `pending -> running -> {passed | failed | skipped}`. `Skipped` is only
/// reached when a nested call failed and already reported itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The body returned normally
    Passed,
    /// The body raised an error of its own
    Failed,
    /// A nested call failed and reported first
    Skipped,
}

impl TestStatus {
    /// Lowercase label used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
        }
    }

    /// Check if the test passed
    pub fn is_passed(&self) -> bool {
        matches!(self, TestStatus::Passed)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
