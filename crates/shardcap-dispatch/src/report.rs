use std::time::Duration;

/// What one dispatcher run accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Items in the shard before the resume filter.
    pub total: usize,
    /// Items skipped because their key was already checkpointed.
    pub skipped: usize,
    /// Items actually submitted this run.
    pub dispatched: usize,
    pub succeeded: usize,
    /// Permanently failed items (recorded in the error log).
    pub failed: usize,
    pub elapsed: Duration,
    /// True when dispatch stopped early on an external termination request;
    /// in-flight items were allowed to finish.
    pub interrupted: bool,
}

impl DispatchReport {
    /// Exit-code contract: success only when nothing failed permanently and
    /// the run was not cut short.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }

    pub fn items_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.succeeded + self.failed) as f64 / secs
        } else {
            0.0
        }
    }
}
