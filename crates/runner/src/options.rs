//! Run configuration and results

use piilop_core::TestStatus;

/// Options for [`TestMain::run_test`](crate::TestMain::run_test)
///
/// # Example
///
/// ```
/// use piilop_runner::RunOptions;
///
/// let options = RunOptions::new().name_prefix("networks").workers(2).fail_fast(true);
/// assert_eq!(options.selected_prefix(), "networks");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub(crate) name_prefix: String,
    pub(crate) workers: usize,
    pub(crate) fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            name_prefix: String::new(),
            workers: 1,
            fail_fast: false,
        }
    }
}

impl RunOptions {
    /// Every entry, one worker, keep going after failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select entries whose name starts with `prefix`. `""` and `"all"` select everything.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Number of concurrent workers. `0` is treated as `1`.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Stop taking entries after the first failed or skipped one.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Effective name prefix
    pub fn selected_prefix(&self) -> &str {
        match self.name_prefix.as_str() {
            "all" => "",
            prefix => prefix,
        }
    }

    /// Configured worker count
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Whether the first failure stops the run
    pub fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }
}

/// Result of one top-level entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    /// Entry name
    pub name: String,
    /// Worker thread that ran it
    pub thread: String,
    /// Final classification
    pub status: TestStatus,
    /// Error text for failed and skipped entries
    pub error: Option<String>,
}

/// Outcomes of a run, in completion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    outcomes: Vec<TestOutcome>,
}

impl RunReport {
    pub(crate) fn push(&mut self, outcome: TestOutcome) {
        self.outcomes.push(outcome);
    }

    /// All outcomes
    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    /// Outcome of one entry
    pub fn outcome(&self, name: &str) -> Option<&TestOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Entries that passed
    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Entries that failed
    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Entries skipped because a nested call failed
    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Check if every entry that ran passed
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_passed())
    }
}
