//! Default console observer
//!
//! Renders an indented trace, one level of `  • ` per open test:
//!
//! ```text
//!   • networks get aws :{
//!   •   • networks create aws :{
//!   •   •  networks create aws :: passed
//!   •  networks get aws :: passed
//! ```
//!
//! Failed and skipped tests are followed by a diagnostic block with the
//! breadcrumb trail and, for failures, the error text.

use std::io::Write;

use parking_lot::Mutex;
use piilop_context::{StackInfo, TestObserver};
use piilop_core::{Error, TestStatus};
use tracing::warn;

/// Observer writing a human-readable trace
pub struct ConsoleObserver {
    out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleObserver").finish_non_exhaustive()
    }
}

impl ConsoleObserver {
    /// Write to standard output.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Write to any sink.
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        ConsoleObserver {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            warn!(error = %err, "could not write test trace");
        }
    }
}

fn indent(depth: usize) -> String {
    "  • ".repeat(depth)
}

impl TestObserver for ConsoleObserver {
    fn on_test_started(&self, name: &str, stack: &StackInfo) {
        self.emit(&format!("{}{} :{{", indent(stack.depth), name));
    }

    fn on_test_finished(
        &self,
        name: &str,
        status: TestStatus,
        stack: &StackInfo,
        error: Option<&Error>,
    ) {
        self.emit(&format!("{} {} :: {}", indent(stack.depth), name, status));
        match status {
            TestStatus::Failed => {
                let error = error.map(ToString::to_string).unwrap_or_default();
                self.emit(&format!(
                    "TEST FAILED!\n\ttest: {}\n\terror: {}",
                    stack.render_breadcrumbs(),
                    error
                ));
            }
            TestStatus::Skipped => {
                self.emit(&format!("TEST SKIPPED:\n\ttest: {}", stack.render_breadcrumbs()));
            }
            TestStatus::Passed => {}
        }
    }
}
