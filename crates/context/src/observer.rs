//! Observer callback interface
//!
//! The only notification surface of a run. A [`Context`](crate::Context)
//! calls its observer on every announced start and finish, after releasing
//! its internal lock, so observers may freely inspect other state.

use piilop_core::{Error, TestStatus};

use crate::thread::StackInfo;

/// Receives start/finish events for every announced frame
pub trait TestObserver: Send + Sync {
    /// A frame opened.
    fn on_test_started(&self, name: &str, stack: &StackInfo);

    /// A frame closed. `error` is set for `failed` and `skipped` outcomes.
    fn on_test_finished(
        &self,
        name: &str,
        status: TestStatus,
        stack: &StackInfo,
        error: Option<&Error>,
    );
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl TestObserver for NullObserver {
    fn on_test_started(&self, _name: &str, _stack: &StackInfo) {}

    fn on_test_finished(
        &self,
        _name: &str,
        _status: TestStatus,
        _stack: &StackInfo,
        _error: Option<&Error>,
    ) {
    }
}
