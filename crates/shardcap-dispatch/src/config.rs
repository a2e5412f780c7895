use std::path::PathBuf;
use std::time::Duration;

use error_stack::ResultExt as _;

use crate::error::{DispatchError, Result};

/// Every recognized dispatcher option, validated once at process start.
///
/// `concurrency` (`W`) is the sole mandatory bound on outstanding requests.
/// `queue_ceiling` (`Q`) is optional backpressure against the endpoint's
/// shared internal queue and defaults to disabled; the two are independent
/// and no interaction between them is assumed.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Stable run identifier: checkpoint namespace and resume key.
    pub run_id: String,
    /// Max simultaneous outstanding requests (`W`); hard upper bound.
    pub concurrency: usize,
    /// Per-request deadline; expiry counts as a failed attempt.
    pub request_timeout: Duration,
    /// Total attempts per item (`R`); the `R`-th consecutive failure makes
    /// the item permanently failed.
    pub max_attempts: u32,
    /// Flush the checkpoint set durably every this many completed items
    /// (`C`); a crash loses at most `C - 1` items of checkpoint progress.
    pub checkpoint_interval: u32,
    /// Pause new admissions while the endpoint reports queue depth above
    /// this ceiling (`Q`). `None` disables the admission gate.
    pub queue_ceiling: Option<u64>,
    /// Re-poll cadence while paused on the admission gate, and the probe
    /// cadence for the startup reachability check.
    pub queue_poll_interval: Duration,
    /// How long to wait for the endpoint to become reachable before
    /// aborting the shard.
    pub startup_deadline: Duration,
    /// Load the run's checkpoint set and skip items already present.
    pub resume: bool,
    /// Append-only JSONL output log.
    pub out_jsonl: PathBuf,
    /// Tabular mirror of the output log.
    pub out_tsv: PathBuf,
    /// Dedicated log of permanently failed items. Defaults to a sibling of
    /// `out_jsonl` named `<stem>.errors.jsonl`.
    pub error_log: Option<PathBuf>,
    /// Directory holding per-run checkpoint files.
    pub checkpoint_dir: PathBuf,
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &'static str| {
            Err(error_stack::report!(DispatchError::Configuration)).attach_printable(msg)
        };

        if self.run_id.is_empty() {
            return fail("run_id must not be empty");
        }
        if self.concurrency == 0 {
            return fail("concurrency (W) must be at least 1");
        }
        if self.max_attempts == 0 {
            return fail("max attempts (R) must be at least 1");
        }
        if self.checkpoint_interval == 0 {
            return fail("checkpoint interval (C) must be at least 1");
        }
        if self.request_timeout.is_zero() {
            return fail("request timeout must be positive");
        }
        if self.queue_poll_interval.is_zero() {
            return fail("queue poll interval must be positive");
        }
        if self.queue_ceiling == Some(0) {
            return fail("queue ceiling (Q) must be at least 1 when set");
        }
        Ok(())
    }

    /// Effective error-log path: explicit override, or
    /// `<out_jsonl stem>.errors.jsonl` beside the output log.
    pub fn error_log_path(&self) -> PathBuf {
        if let Some(path) = &self.error_log {
            return path.clone();
        }
        let stem = self
            .out_jsonl
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_owned());
        self.out_jsonl
            .with_file_name(format!("{stem}.errors.jsonl"))
    }
}
