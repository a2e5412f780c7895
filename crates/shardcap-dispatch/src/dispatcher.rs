use std::sync::Arc;
use std::time::Duration;

use error_stack::ResultExt as _;
use shardcap_checkpoint::CheckpointStore;
use shardcap_core::WorkItem;
use tokio::sync::{Semaphore, mpsc, watch};

use crate::config::DispatchConfig;
use crate::endpoint::Endpoint;
use crate::error::{DispatchError, Result};
use crate::report::DispatchReport;
use crate::task::{ItemOutcome, run_item};
use crate::writer::OutputWriter;

/// Drains one shard against one endpoint.
///
/// The dispatcher owns the run's checkpoint store instance and output
/// sinks; the endpoint and the item sequence come from the caller. One
/// dispatcher process per shard — there is no cross-shard state.
pub struct ShardDispatcher {
    config: DispatchConfig,
    endpoint: Arc<dyn Endpoint>,
    checkpoint: Arc<dyn CheckpointStore>,
}

impl ShardDispatcher {
    pub fn new(
        config: DispatchConfig,
        endpoint: Arc<dyn Endpoint>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            endpoint,
            checkpoint,
        })
    }

    /// Run the shard to completion.
    pub async fn run(&self, items: Vec<WorkItem>) -> Result<DispatchReport> {
        let (_tx, rx) = watch::channel(false);
        self.run_with_shutdown(items, rx).await
    }

    /// Run the shard, stopping new admissions once `shutdown` flips true.
    /// In-flight requests are left to finish or time out; completed items
    /// are recorded normally, so a later resume picks up exactly where the
    /// interrupted run stopped.
    pub async fn run_with_shutdown(
        &self,
        items: Vec<WorkItem>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<DispatchReport> {
        let started = tokio::time::Instant::now();
        let total = items.len();
        if total == 0 {
            return Err(error_stack::report!(DispatchError::EmptyShard)
                .attach_printable(format!("run {}", self.config.run_id)));
        }

        // Resume is a set-membership filter, not a positional offset:
        // earlier attempts may have completed out of submission order.
        let items = if self.config.resume {
            let done = self
                .checkpoint
                .load()
                .await
                .change_context(DispatchError::Checkpoint)?;
            items
                .into_iter()
                .filter(|item| !done.contains(&item.key))
                .collect()
        } else {
            items
        };
        let skipped = total - items.len();
        if skipped > 0 {
            tracing::info!(
                run_id = %self.config.run_id,
                skipped,
                remaining = items.len(),
                "resume filter applied"
            );
        }

        if items.is_empty() {
            tracing::info!(run_id = %self.config.run_id, "every item already checkpointed");
            return Ok(DispatchReport {
                total,
                skipped,
                dispatched: 0,
                succeeded: 0,
                failed: 0,
                elapsed: started.elapsed(),
                interrupted: false,
            });
        }

        if !self
            .endpoint
            .wait_ready(self.config.startup_deadline, self.config.queue_poll_interval)
            .await
        {
            return Err(error_stack::report!(DispatchError::EndpointUnreachable)
                .attach_printable(format!(
                    "gave up after {:?}",
                    self.config.startup_deadline
                )));
        }

        let mut writer = OutputWriter::open(
            &self.config.out_jsonl,
            &self.config.out_tsv,
            &self.config.error_log_path(),
        )?;

        let to_dispatch = items.len();
        tracing::info!(
            run_id = %self.config.run_id,
            items = to_dispatch,
            concurrency = self.config.concurrency,
            queue_ceiling = ?self.config.queue_ceiling,
            "dispatching shard"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let submitter = tokio::spawn(submit_all(
            items,
            Arc::clone(&self.endpoint),
            semaphore,
            outcome_tx,
            self.config.max_attempts,
            self.config.queue_ceiling,
            self.config.queue_poll_interval,
            shutdown.clone(),
        ));

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut since_flush = 0u32;

        // Single collector: output and checkpoint writes are serialized
        // here, so each item is recorded all-or-nothing.
        let collected: Result<()> = async {
            while let Some(outcome) = outcome_rx.recv().await {
                match outcome {
                    ItemOutcome::Succeeded(record) => {
                        writer.write_record(&record)?;
                        self.checkpoint
                            .put(&record.key)
                            .await
                            .change_context(DispatchError::Checkpoint)?;
                        succeeded += 1;
                        tracing::debug!(key = %record.key, "item succeeded");
                    }
                    ItemOutcome::FailedPermanent(record) => {
                        writer.write_error(&record)?;
                        failed += 1;
                    }
                }

                since_flush += 1;
                if since_flush >= self.config.checkpoint_interval {
                    self.checkpoint
                        .flush()
                        .await
                        .change_context(DispatchError::Checkpoint)?;
                    since_flush = 0;
                    let done = succeeded + failed;
                    tracing::info!(
                        run_id = %self.config.run_id,
                        completed = done,
                        of = to_dispatch,
                        failed,
                        rate = format!("{:.2}/s", done as f64 / started.elapsed().as_secs_f64().max(1e-9)),
                        "checkpoint flushed"
                    );
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = collected {
            // A checkpoint or output failure is fatal: stop feeding the
            // pool rather than continue uncommitted.
            submitter.abort();
            return Err(e);
        }

        let dispatched = submitter
            .await
            .change_context(DispatchError::WorkerPanic)?;

        self.checkpoint
            .flush()
            .await
            .change_context(DispatchError::Checkpoint)?;
        writer.sync()?;

        let interrupted = *shutdown.borrow() && dispatched < to_dispatch;
        let report = DispatchReport {
            total,
            skipped,
            dispatched,
            succeeded,
            failed,
            elapsed: started.elapsed(),
            interrupted,
        };
        tracing::info!(
            run_id = %self.config.run_id,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_s = report.elapsed.as_secs_f64(),
            interrupted = report.interrupted,
            "shard dispatch finished"
        );
        Ok(report)
    }
}

/// Submission loop: one admission per item, gated first by the optional
/// queue-depth ceiling, then by a semaphore permit that is held for the
/// whole attempt. Returns how many items were actually admitted.
#[allow(clippy::too_many_arguments)]
async fn submit_all(
    items: Vec<WorkItem>,
    endpoint: Arc<dyn Endpoint>,
    semaphore: Arc<Semaphore>,
    outcome_tx: mpsc::UnboundedSender<ItemOutcome>,
    max_attempts: u32,
    queue_ceiling: Option<u64>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> usize {
    let mut dispatched = 0usize;
    for item in items {
        if *shutdown.borrow() {
            tracing::info!("termination requested; no new admissions");
            break;
        }

        if let Some(ceiling) = queue_ceiling {
            pause_while_backlogged(&*endpoint, ceiling, poll_interval, &shutdown).await;
            if *shutdown.borrow() {
                break;
            }
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        dispatched += 1;

        let endpoint = Arc::clone(&endpoint);
        let outcome_tx = outcome_tx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = run_item(&*endpoint, &item, max_attempts).await;
            // The collector hanging up means dispatch is aborting; the
            // outcome is dropped with it.
            let _ = outcome_tx.send(outcome);
        });
    }
    dispatched
}

/// Hold new admissions while the endpoint's self-reported queue depth sits
/// above the ceiling. Backpressure for a shared remote resource: in-flight
/// requests are untouched, and an endpoint that stops reporting depth fails
/// open (the local concurrency bound still applies).
async fn pause_while_backlogged(
    endpoint: &dyn Endpoint,
    ceiling: u64,
    poll_interval: Duration,
    shutdown: &watch::Receiver<bool>,
) {
    loop {
        match endpoint.queue_depth().await {
            None => return,
            Some(depth) if depth <= ceiling => return,
            Some(depth) => {
                tracing::info!(depth, ceiling, "endpoint backlogged; pausing new admissions");
                tokio::time::sleep(poll_interval).await;
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt as _};
    use shardcap_checkpoint::{CheckpointStore, InMemoryCheckpointStore};
    use shardcap_client::Caption;
    use shardcap_core::{ItemKey, ItemPayload};
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable endpoint: per-key failure budgets, canned queue depths,
    /// and enough accounting to assert the concurrency bound.
    #[derive(Default)]
    struct MockEndpoint {
        requests: AtomicUsize,
        outstanding: AtomicUsize,
        max_outstanding: AtomicUsize,
        /// Keys that fail their first N attempts.
        flaky: Mutex<HashMap<ItemKey, u32>>,
        /// Keys that never succeed.
        broken: Mutex<HashSet<ItemKey>>,
        /// Queue depths returned in order; empty script reports depth 0.
        depths: Mutex<VecDeque<u64>>,
        depth_polls: AtomicUsize,
        /// Poll count observed when the first request arrived.
        polls_at_first_request: AtomicUsize,
        process_delay: Duration,
        unreachable: bool,
    }

    impl MockEndpoint {
        fn flaky(self, key: &str, failures: u32) -> Self {
            self.flaky
                .lock()
                .unwrap()
                .insert(ItemKey::new(key), failures);
            self
        }

        fn broken(self, key: &str) -> Self {
            self.broken.lock().unwrap().insert(ItemKey::new(key));
            self
        }

        fn with_depths(self, depths: &[u64]) -> Self {
            *self.depths.lock().unwrap() = depths.iter().copied().collect();
            self
        }
    }

    impl Endpoint for MockEndpoint {
        fn process<'a>(
            &'a self,
            item: &'a WorkItem,
        ) -> BoxFuture<'a, std::result::Result<Caption, crate::AttemptError>> {
            async move {
                if self.requests.fetch_add(1, Ordering::SeqCst) == 0 {
                    self.polls_at_first_request
                        .store(self.depth_polls.load(Ordering::SeqCst), Ordering::SeqCst);
                }
                let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_outstanding.fetch_max(now, Ordering::SeqCst);
                if !self.process_delay.is_zero() {
                    tokio::time::sleep(self.process_delay).await;
                }
                self.outstanding.fetch_sub(1, Ordering::SeqCst);

                if self.broken.lock().unwrap().contains(&item.key) {
                    return Err(crate::AttemptError::new("server exploded"));
                }
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(left) = flaky.get_mut(&item.key) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(crate::AttemptError::new("transient failure"));
                    }
                }
                Ok(Caption {
                    text: format!("caption for {}", item.key),
                    usage: None,
                })
            }
            .boxed()
        }

        fn queue_depth(&self) -> BoxFuture<'_, Option<u64>> {
            async move {
                self.depth_polls.fetch_add(1, Ordering::SeqCst);
                Some(self.depths.lock().unwrap().pop_front().unwrap_or(0))
            }
            .boxed()
        }

        fn wait_ready(&self, _deadline: Duration, _poll: Duration) -> BoxFuture<'_, bool> {
            let ready = !self.unreachable;
            async move { ready }.boxed()
        }
    }

    /// Wraps another store to count flush calls.
    struct CountingStore<S> {
        inner: S,
        flushes: AtomicUsize,
    }

    impl<S: CheckpointStore> CheckpointStore for CountingStore<S> {
        fn put(&self, key: &ItemKey) -> BoxFuture<'_, shardcap_checkpoint::Result<()>> {
            self.inner.put(key)
        }
        fn contains(&self, key: &ItemKey) -> BoxFuture<'_, shardcap_checkpoint::Result<bool>> {
            self.inner.contains(key)
        }
        fn load(&self) -> BoxFuture<'_, shardcap_checkpoint::Result<HashSet<ItemKey>>> {
            self.inner.load()
        }
        fn flush(&self) -> BoxFuture<'_, shardcap_checkpoint::Result<()>> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            self.inner.flush()
        }
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| {
                WorkItem::new(
                    ItemKey::new(format!("utt-{i:04}")),
                    ItemPayload::RowIndex(i as u64),
                )
            })
            .collect()
    }

    fn config(dir: &Path) -> DispatchConfig {
        DispatchConfig {
            run_id: "test-shard".to_owned(),
            concurrency: 4,
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            checkpoint_interval: 100,
            queue_ceiling: None,
            queue_poll_interval: Duration::from_millis(5),
            startup_deadline: Duration::from_millis(50),
            resume: false,
            out_jsonl: dir.join("out.jsonl"),
            out_tsv: dir.join("out.tsv"),
            error_log: None,
            checkpoint_dir: dir.join("ckpt"),
        }
    }

    fn dispatcher(
        config: DispatchConfig,
        endpoint: Arc<MockEndpoint>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> ShardDispatcher {
        ShardDispatcher::new(config, endpoint, checkpoint).unwrap()
    }

    #[tokio::test]
    async fn drains_shard_and_records_everything() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        let d = dispatcher(config(dir.path()), Arc::clone(&endpoint), store.clone());

        let report = d.run(items(20)).await.unwrap();
        assert_eq!(report.succeeded, 20);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.is_success());

        let log = std::fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 20);
        let mirror = std::fs::read_to_string(dir.path().join("out.tsv")).unwrap();
        assert_eq!(mirror.lines().count(), 21); // header + rows

        // Every logged key is checkpointed and vice versa.
        let keys = store.load().await.unwrap();
        assert_eq!(keys.len(), 20);
    }

    #[tokio::test]
    async fn concurrency_bound_is_never_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint {
            process_delay: Duration::from_millis(15),
            ..Default::default()
        });
        let mut cfg = config(dir.path());
        cfg.concurrency = 3;
        let d = dispatcher(cfg, Arc::clone(&endpoint), Arc::new(InMemoryCheckpointStore::new()));

        d.run(items(12)).await.unwrap();
        assert!(
            endpoint.max_outstanding.load(Ordering::SeqCst) <= 3,
            "outstanding requests exceeded W"
        );
    }

    #[tokio::test]
    async fn retry_exhaustion_isolates_the_item() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint::default().broken("utt-0003"));
        let d = dispatcher(
            config(dir.path()),
            Arc::clone(&endpoint),
            Arc::new(InMemoryCheckpointStore::new()),
        );

        let report = d.run(items(8)).await.unwrap();
        assert_eq!(report.succeeded, 7);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());

        // Exactly one permanent-failure record, carrying the attempt count
        // and the last reason.
        let errors = std::fs::read_to_string(dir.path().join("out.errors.jsonl")).unwrap();
        let lines: Vec<_> = errors.lines().collect();
        assert_eq!(lines.len(), 1);
        let record: shardcap_core::ErrorRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.key, ItemKey::new("utt-0003"));
        assert_eq!(record.attempts, 3);
        assert!(record.error.contains("server exploded"));

        // R attempts for the broken item, one each for the rest.
        assert_eq!(endpoint.requests.load(Ordering::SeqCst), 7 + 3);
    }

    #[tokio::test]
    async fn transient_failures_recover_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint::default().flaky("utt-0001", 2));
        let d = dispatcher(
            config(dir.path()),
            Arc::clone(&endpoint),
            Arc::new(InMemoryCheckpointStore::new()),
        );

        let report = d.run(items(3)).await.unwrap();
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);

        let log = std::fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
        let recovered: shardcap_core::OutputRecord = log
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .find(|r: &shardcap_core::OutputRecord| r.key == ItemKey::new("utt-0001"))
            .unwrap();
        assert_eq!(recovered.attempt, Some(3));
    }

    #[tokio::test]
    async fn resume_issues_zero_new_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());

        let first = Arc::new(MockEndpoint::default());
        let d = dispatcher(config(dir.path()), Arc::clone(&first), store.clone());
        let report = d.run(items(10)).await.unwrap();
        assert_eq!(report.succeeded, 10);

        // Identical shard, same run_id, resume on: nothing is re-sent,
        // even against an endpoint that is no longer reachable.
        let second = Arc::new(MockEndpoint {
            unreachable: true,
            ..Default::default()
        });
        let mut cfg = config(dir.path());
        cfg.resume = true;
        let d = dispatcher(cfg, Arc::clone(&second), store);
        let report = d.run(items(10)).await.unwrap();

        assert_eq!(second.requests.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped, 10);
        assert_eq!(report.succeeded, 0);
        assert!(report.is_success());

        // And the output set is unchanged: still exactly ten records.
        let log = std::fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 10);
    }

    #[tokio::test]
    async fn resume_filter_is_set_membership_not_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryCheckpointStore::new());
        // Out-of-order completions from an earlier run: a middle and a
        // trailing key are done, the rest are not.
        store.put(&ItemKey::new("utt-0002")).await.unwrap();
        store.put(&ItemKey::new("utt-0004")).await.unwrap();

        let endpoint = Arc::new(MockEndpoint::default());
        let mut cfg = config(dir.path());
        cfg.resume = true;
        let d = dispatcher(cfg, Arc::clone(&endpoint), store);

        let report = d.run(items(5)).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 3);
        assert_eq!(endpoint.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn admission_gate_holds_until_depth_drops() {
        let dir = tempfile::tempdir().unwrap();
        // Three polls above the ceiling, then clear.
        let endpoint = Arc::new(MockEndpoint::default().with_depths(&[9, 8, 7, 2]));
        let mut cfg = config(dir.path());
        cfg.queue_ceiling = Some(5);
        cfg.queue_poll_interval = Duration::from_millis(2);
        let d = dispatcher(cfg, Arc::clone(&endpoint), Arc::new(InMemoryCheckpointStore::new()));

        let report = d.run(items(3)).await.unwrap();
        assert_eq!(report.succeeded, 3);

        // No request went out while the reported depth sat above Q: the
        // first request only happened after the fourth poll reported 2.
        assert!(endpoint.polls_at_first_request.load(Ordering::SeqCst) >= 4);
        // Every admission consulted the gate.
        assert!(endpoint.depth_polls.load(Ordering::SeqCst) >= 6);
    }

    #[tokio::test]
    async fn checkpoint_flushes_every_interval_and_at_completion() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint::default());
        let store = Arc::new(CountingStore {
            inner: InMemoryCheckpointStore::new(),
            flushes: AtomicUsize::new(0),
        });
        let mut cfg = config(dir.path());
        cfg.checkpoint_interval = 5;
        let d = dispatcher(cfg, Arc::clone(&endpoint), store.clone());

        d.run(items(12)).await.unwrap();
        // Two interval flushes (after 5 and 10) plus the final flush.
        assert_eq!(store.flushes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_shard_is_a_fatal_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            config(dir.path()),
            Arc::new(MockEndpoint::default()),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        let err = d.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err.current_context(), DispatchError::EmptyShard));
    }

    #[tokio::test]
    async fn unreachable_endpoint_aborts_before_any_item() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint {
            unreachable: true,
            ..Default::default()
        });
        let d = dispatcher(
            config(dir.path()),
            Arc::clone(&endpoint),
            Arc::new(InMemoryCheckpointStore::new()),
        );

        let err = d.run(items(4)).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            DispatchError::EndpointUnreachable
        ));
        assert_eq!(endpoint.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_new_admissions_but_finishes_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(MockEndpoint {
            process_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let mut cfg = config(dir.path());
        cfg.concurrency = 2;
        let d = dispatcher(cfg, Arc::clone(&endpoint), Arc::new(InMemoryCheckpointStore::new()));

        let (tx, rx) = watch::channel(false);
        let run = d.run_with_shutdown(items(50), rx);
        tokio::pin!(run);

        // Let a few admissions through, then request termination.
        let report = tokio::select! {
            r = &mut run => r,
            () = tokio::time::sleep(Duration::from_millis(30)) => {
                tx.send(true).unwrap();
                run.await
            }
        }
        .unwrap();

        assert!(report.interrupted);
        assert!(report.dispatched < 50);
        // Everything admitted was fully recorded: no partial items.
        assert_eq!(report.succeeded, report.dispatched);
        let log = std::fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
        assert_eq!(log.lines().count(), report.succeeded);
    }
}
