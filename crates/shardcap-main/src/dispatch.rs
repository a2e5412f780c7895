use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use error_stack::ResultExt as _;
use shardcap_checkpoint::FileCheckpointStore;
use shardcap_client::CaptionClient;
use shardcap_core::{Shard, WorkItem};
use shardcap_dispatch::{CaptionEndpoint, DispatchConfig, FileAudioSource, ShardDispatcher};
use shardcap_partition::{Manifest, partition, range_shard_id};
use tokio::sync::watch;

use crate::error::{MainError, Result};

/// How the dataset to process is described.
///
/// A manifest names every item; an index range narrows it to an explicit
/// sub-slice, which keeps its own `range-<start>-<end>` identity so a
/// re-submitted slice resumes against the same checkpoint.
#[derive(clap::Args, Debug)]
pub struct DatasetArgs {
    /// `wav.scp` manifest: one `<utt_id> <audio_path>` pair per line.
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub manifest: Option<PathBuf>,

    /// Process only items from this index on (inclusive).
    #[arg(long = "start-idx", value_name = "INDEX", requires = "end_idx")]
    pub start_idx: Option<u64>,

    /// Process only items before this index (exclusive).
    #[arg(long = "end-idx", value_name = "INDEX", requires = "start_idx")]
    pub end_idx: Option<u64>,
}

impl DatasetArgs {
    pub fn range(&self) -> Option<(u64, u64)> {
        self.start_idx.zip(self.end_idx)
    }
}

pub struct DispatchOptions {
    pub dataset: DatasetArgs,
    pub shard_index: usize,
    pub num_shards: usize,
    pub base_url: String,
    pub model: String,
    pub out_jsonl: PathBuf,
    pub out_tsv: PathBuf,
    pub error_log: Option<PathBuf>,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub checkpoint_interval: u32,
    pub checkpoint_dir: PathBuf,
    pub queue_ceiling: Option<u64>,
    pub queue_poll_interval: Duration,
    pub startup_deadline: Duration,
    pub resume: bool,
    pub run_id: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Resolve the dataset selection to one shard and its items.
fn select_shard(
    dataset: &DatasetArgs,
    shard_index: usize,
    num_shards: usize,
) -> Result<(Shard, Vec<WorkItem>)> {
    let Some(manifest_path) = dataset.manifest.as_deref() else {
        return Err(error_stack::report!(MainError::InvalidSelection)
            .attach_printable("dispatch requires --manifest; a bare index range only describes an externally managed store"));
    };
    let manifest =
        Manifest::load(manifest_path).change_context(MainError::InvalidSelection)?;

    let shard = match dataset.range() {
        // Explicit sub-range: exactly one shard, named after its bounds.
        Some((start, end)) => {
            let n = manifest.len() as u64;
            if start >= end || end > n {
                return Err(error_stack::report!(MainError::InvalidSelection)
                    .attach_printable(format!(
                        "index range [{start}, {end}) does not fit the {n}-item manifest"
                    )));
            }
            Shard {
                index: 0,
                start,
                end,
                id: range_shard_id(start, end),
            }
        }
        None => {
            let shards = partition(manifest.len() as u64, num_shards, manifest.source());
            let count = shards.len();
            shards
                .into_iter()
                .find(|s| s.index == shard_index)
                .ok_or_else(|| {
                    error_stack::report!(MainError::ShardOutOfRange {
                        index: shard_index,
                        shards: count,
                    })
                })?
        }
    };

    let items = manifest.shard_items(&shard);
    Ok((shard, items))
}

pub async fn dispatch(options: DispatchOptions) -> Result<()> {
    let (shard, items) =
        select_shard(&options.dataset, options.shard_index, options.num_shards)?;
    let run_id = options.run_id.unwrap_or_else(|| shard.id.clone());
    tracing::info!(%shard, %run_id, items = items.len(), "selected shard");

    let client = CaptionClient::try_new(&options.base_url, options.model)
        .change_context(MainError::Dispatch)?;
    let endpoint = CaptionEndpoint::new(
        client,
        Arc::new(FileAudioSource),
        options.max_tokens,
        options.temperature,
        options.request_timeout,
    );
    let checkpoint = FileCheckpointStore::open(&options.checkpoint_dir, &run_id)
        .change_context(MainError::OpenCheckpoint)?;

    let config = DispatchConfig {
        run_id,
        concurrency: options.concurrency,
        request_timeout: options.request_timeout,
        max_attempts: options.max_attempts,
        checkpoint_interval: options.checkpoint_interval,
        queue_ceiling: options.queue_ceiling,
        queue_poll_interval: options.queue_poll_interval,
        startup_deadline: options.startup_deadline,
        resume: options.resume,
        out_jsonl: options.out_jsonl,
        out_tsv: options.out_tsv,
        error_log: options.error_log,
        checkpoint_dir: options.checkpoint_dir,
    };
    let dispatcher = ShardDispatcher::new(config, Arc::new(endpoint), Arc::new(checkpoint))
        .change_context(MainError::Dispatch)?;

    // Ctrl-C stops new admissions; in-flight requests finish and are
    // recorded, so the interrupted run resumes cleanly.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; draining in-flight requests");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = dispatcher
        .run_with_shutdown(items, shutdown_rx)
        .await
        .change_context(MainError::Dispatch)?;

    if report.failed > 0 {
        return Err(error_stack::report!(MainError::ItemsFailed(report.failed)));
    }
    if report.interrupted {
        return Err(error_stack::report!(MainError::Interrupted));
    }
    Ok(())
}
