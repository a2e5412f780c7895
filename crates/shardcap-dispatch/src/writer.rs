use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use error_stack::ResultExt as _;
use shardcap_core::{ErrorRecord, OutputRecord};

use crate::error::{DispatchError, Result};

const TSV_HEADER: &str = "key\tresult\ttimestamp\n";

/// Append-only output sinks for one run: the JSONL log, its tabular mirror,
/// and the dedicated error log for permanently failed items.
///
/// Records are appended and flushed as items complete — a crash never costs
/// more than the record being written. All three files open in append mode,
/// so resumed runs extend their predecessors' logs; the merger dedups any
/// keys that were re-attempted because their checkpoint flush was lost.
pub struct OutputWriter {
    jsonl: BufWriter<File>,
    jsonl_path: PathBuf,
    tsv: BufWriter<File>,
    tsv_path: PathBuf,
    errors: BufWriter<File>,
    errors_path: PathBuf,
}

impl OutputWriter {
    pub fn open(out_jsonl: &Path, out_tsv: &Path, error_log: &Path) -> Result<Self> {
        let jsonl = open_append(out_jsonl)?;
        let mut tsv = open_append(out_tsv)?;
        let errors = open_append(error_log)?;

        // Header row only when the mirror is new or empty.
        let tsv_len = tsv
            .get_ref()
            .metadata()
            .change_context(DispatchError::OutputIo)?
            .len();
        if tsv_len == 0 {
            tsv.write_all(TSV_HEADER.as_bytes())
                .change_context(DispatchError::OutputIo)
                .attach_printable_lazy(|| {
                    format!("failed to write header: {}", out_tsv.display())
                })?;
        }

        Ok(Self {
            jsonl,
            jsonl_path: out_jsonl.to_owned(),
            tsv,
            tsv_path: out_tsv.to_owned(),
            errors,
            errors_path: error_log.to_owned(),
        })
    }

    /// Append one succeeded item to the log and the mirror, flushing both.
    pub fn write_record(&mut self, record: &OutputRecord) -> Result<()> {
        let mut line =
            serde_json::to_string(record).change_context(DispatchError::OutputIo)?;
        line.push('\n');
        self.jsonl
            .write_all(line.as_bytes())
            .and_then(|()| self.jsonl.flush())
            .change_context(DispatchError::OutputIo)
            .attach_printable_lazy(|| {
                format!("failed to append output log: {}", self.jsonl_path.display())
            })?;

        let row = format!(
            "{}\t{}\t{}\n",
            record.key,
            record.result_flat(),
            record.timestamp.to_rfc3339(),
        );
        self.tsv
            .write_all(row.as_bytes())
            .and_then(|()| self.tsv.flush())
            .change_context(DispatchError::OutputIo)
            .attach_printable_lazy(|| {
                format!("failed to append tabular mirror: {}", self.tsv_path.display())
            })?;
        Ok(())
    }

    /// Append one permanently failed item to the error log, flushing it.
    pub fn write_error(&mut self, record: &ErrorRecord) -> Result<()> {
        let mut line =
            serde_json::to_string(record).change_context(DispatchError::OutputIo)?;
        line.push('\n');
        self.errors
            .write_all(line.as_bytes())
            .and_then(|()| self.errors.flush())
            .change_context(DispatchError::OutputIo)
            .attach_printable_lazy(|| {
                format!("failed to append error log: {}", self.errors_path.display())
            })?;
        Ok(())
    }

    /// Push everything to durable storage.
    pub fn sync(&mut self) -> Result<()> {
        for (writer, path) in [
            (&mut self.jsonl, &self.jsonl_path),
            (&mut self.tsv, &self.tsv_path),
            (&mut self.errors, &self.errors_path),
        ] {
            writer
                .flush()
                .and_then(|()| writer.get_ref().sync_data())
                .change_context(DispatchError::OutputIo)
                .attach_printable_lazy(|| format!("failed to sync {}", path.display()))?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .change_context(DispatchError::OutputIo)
                .attach_printable_lazy(|| {
                    format!("failed to create output directory: {}", parent.display())
                })?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .change_context(DispatchError::OutputIo)
        .attach_printable_lazy(|| format!("failed to open output file: {}", path.display()))?;
    Ok(BufWriter::new(file))
}
