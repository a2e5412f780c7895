use std::path::PathBuf;
use std::time::Duration;

use crate::args::LogLevel;
use crate::dispatch::{DatasetArgs, dispatch};
use crate::error::Result;
use crate::merge::merge;
use crate::partition::show_partition;

/// Shardcap command line application.
///
/// Splits a captioning dataset into shards, drains a shard against one
/// endpoint, and merges per-shard output logs.
#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set the log level for shardcap.
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "info",
        global = true
    )]
    pub log_level: LogLevel,

    /// Set the log level for other crates.
    #[arg(
        long = "other-log-level",
        value_name = "LEVEL",
        default_value = "warn",
        global = true
    )]
    pub other_log_level: LogLevel,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "FILE", value_hint = clap::ValueHint::FilePath, global = true)]
    pub log_file: Option<PathBuf>,

    /// Omit stack traces (line numbers of errors).
    #[arg(long = "omit-stack-trace", global = true)]
    pub omit_stack_trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Dispatch one shard of the dataset against a captioning endpoint.
    Dispatch {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Which shard of the partition this process drains (0-based).
        #[arg(long, value_name = "INDEX", default_value = "0")]
        shard_index: usize,

        /// How many shards the dataset is partitioned into.
        #[arg(long, value_name = "K", default_value = "1")]
        num_shards: usize,

        /// Base URL of the captioning endpoint.
        #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8901/v1", value_hint = clap::ValueHint::Url)]
        base_url: String,

        /// Model identifier sent with each request.
        #[arg(long, value_name = "NAME")]
        model: String,

        /// Path of the JSONL output log.
        #[arg(long = "out-jsonl", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        out_jsonl: PathBuf,

        /// Path of the tabular (TSV) output mirror.
        #[arg(long = "out-tsv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        out_tsv: PathBuf,

        /// Path of the permanent-failure log.
        ///
        /// Defaults to the JSONL path with an `.errors.jsonl` suffix.
        #[arg(long = "error-log", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        error_log: Option<PathBuf>,

        /// Maximum number of outstanding requests.
        #[arg(long = "max-workers", value_name = "W", default_value = "4")]
        concurrency: usize,

        /// Per-request timeout in seconds.
        #[arg(long, value_name = "SECONDS", default_value = "180")]
        timeout: u64,

        /// Attempts per item before it is permanently failed.
        #[arg(long = "max-retries", value_name = "R", default_value = "3")]
        max_attempts: u32,

        /// Flush the checkpoint every N completed items.
        #[arg(long = "checkpoint-interval", value_name = "N", default_value = "100")]
        checkpoint_interval: u32,

        /// Directory holding per-run checkpoint files.
        #[arg(long = "checkpoint-dir", value_name = "DIR", default_value = "checkpoints", value_hint = clap::ValueHint::DirPath)]
        checkpoint_dir: PathBuf,

        /// Hold new admissions while the endpoint reports more than this
        /// many queued requests. Disabled when unset.
        #[arg(long = "max-queue", value_name = "Q")]
        queue_ceiling: Option<u64>,

        /// Seconds between queue-depth polls while admission is paused.
        #[arg(long = "queue-poll", value_name = "SECONDS", default_value = "5")]
        queue_poll: u64,

        /// Seconds to wait for the endpoint to answer at startup.
        #[arg(long = "startup-deadline", value_name = "SECONDS", default_value = "180")]
        startup_deadline: u64,

        /// Skip items already present in the run's checkpoint.
        #[arg(long)]
        resume: bool,

        /// Override the derived run identifier.
        ///
        /// Defaults to the shard identifier, which is stable across
        /// resubmissions of the same dataset and partition.
        #[arg(long = "run-id", value_name = "ID")]
        run_id: Option<String>,

        /// Max new tokens to generate for each caption.
        #[arg(long = "max-tokens", value_name = "N", default_value = "400")]
        max_tokens: u32,

        /// Sampling temperature.
        #[arg(long, value_name = "T", default_value = "0.2")]
        temperature: f32,
    },
    /// Print the shard boundaries a dataset and shard count produce.
    Partition {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// How many shards to partition into.
        #[arg(long, value_name = "K")]
        num_shards: usize,
    },
    /// Merge per-shard output logs into one deduplicated log.
    Merge {
        /// Input JSONL logs, in precedence order. Directories expand to
        /// their `*.jsonl` files in lexicographic order.
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Path of the merged JSONL log.
        #[arg(long = "out-jsonl", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        out_jsonl: PathBuf,

        /// Path of the merged tabular mirror.
        #[arg(long = "out-tsv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        out_tsv: Option<PathBuf>,

        /// Print merge counters when done.
        #[arg(long)]
        stats: bool,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        tracing::debug!("Executing command: {:?}", self);
        match self.command {
            Command::Dispatch {
                dataset,
                shard_index,
                num_shards,
                base_url,
                model,
                out_jsonl,
                out_tsv,
                error_log,
                concurrency,
                timeout,
                max_attempts,
                checkpoint_interval,
                checkpoint_dir,
                queue_ceiling,
                queue_poll,
                startup_deadline,
                resume,
                run_id,
                max_tokens,
                temperature,
            } => {
                let options = crate::dispatch::DispatchOptions {
                    dataset,
                    shard_index,
                    num_shards,
                    base_url,
                    model,
                    out_jsonl,
                    out_tsv,
                    error_log,
                    concurrency,
                    request_timeout: Duration::from_secs(timeout),
                    max_attempts,
                    checkpoint_interval,
                    checkpoint_dir,
                    queue_ceiling,
                    queue_poll_interval: Duration::from_secs(queue_poll),
                    startup_deadline: Duration::from_secs(startup_deadline),
                    resume,
                    run_id,
                    max_tokens,
                    temperature,
                };
                dispatch(options).await
            }
            Command::Partition {
                dataset,
                num_shards,
            } => show_partition(&dataset, num_shards),
            Command::Merge {
                inputs,
                out_jsonl,
                out_tsv,
                stats,
            } => merge(&inputs, &out_jsonl, out_tsv.as_deref(), stats),
        }
    }
}
