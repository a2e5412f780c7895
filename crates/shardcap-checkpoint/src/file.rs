use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead as _, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use error_stack::ResultExt as _;
use futures::future::{BoxFuture, FutureExt as _};
use serde::{Deserialize, Serialize};
use shardcap_core::ItemKey;

use crate::{CheckpointError, CheckpointStore, Result};

/// On-disk format: one JSON object per line, append-only.
#[derive(Serialize, Deserialize)]
struct CheckpointLine {
    key: ItemKey,
}

struct Inner {
    keys: HashSet<ItemKey>,
    writer: BufWriter<File>,
}

/// File-backed checkpoint store: one append-only JSONL file per run.
///
/// Writes go through a buffered appender; durability is established by
/// `flush` (buffer flush + fdatasync), which the dispatcher invokes every
/// checkpoint interval and at shard completion. A crash between flushes
/// loses at most the buffered tail; `load` tolerates the resulting
/// incomplete trailing line by discarding it.
pub struct FileCheckpointStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileCheckpointStore {
    /// Open (or create) the checkpoint file for `run_id` under `dir`,
    /// reading any prior entries so membership queries reflect earlier runs.
    pub fn open(dir: &Path, run_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .change_context(CheckpointError::Initialization)
            .attach_printable_lazy(|| {
                format!("failed to create checkpoint directory: {}", dir.display())
            })?;

        let path = dir.join(format!("{run_id}.ckpt.jsonl"));
        let keys = read_keys(&path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .change_context(CheckpointError::Initialization)
            .attach_printable_lazy(|| {
                format!("failed to open checkpoint file: {}", path.display())
            })?;

        // A crash mid-append can leave the file without a trailing newline.
        // Terminate the torn tail so the next entry starts on its own line
        // instead of merging into it.
        if !ends_with_newline(&path)? {
            file.write_all(b"\n")
                .change_context(CheckpointError::Io)
                .attach_printable_lazy(|| {
                    format!("failed to repair checkpoint tail: {}", path.display())
                })?;
        }

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                keys,
                writer: BufWriter::new(file),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn put(&self, key: &ItemKey) -> BoxFuture<'_, Result<()>> {
        let key = key.clone();
        async move {
            let mut inner = self.inner.lock().expect("checkpoint lock poisoned");
            if inner.keys.contains(&key) {
                return Ok(());
            }

            let line = serde_json::to_string(&CheckpointLine { key: key.clone() })
                .change_context(CheckpointError::Serialization)?;
            let mut buf = line.into_bytes();
            buf.push(b'\n');
            inner
                .writer
                .write_all(&buf)
                .change_context(CheckpointError::Io)
                .attach_printable_lazy(|| {
                    format!("failed to append checkpoint entry: {}", self.path.display())
                })?;

            inner.keys.insert(key);
            Ok(())
        }
        .boxed()
    }

    fn contains(&self, key: &ItemKey) -> BoxFuture<'_, Result<bool>> {
        let key = key.clone();
        async move {
            let inner = self.inner.lock().expect("checkpoint lock poisoned");
            Ok(inner.keys.contains(&key))
        }
        .boxed()
    }

    fn load(&self) -> BoxFuture<'_, Result<HashSet<ItemKey>>> {
        async move {
            // Re-read from disk rather than echoing the in-memory set, so
            // the result reflects exactly what survived.
            read_keys(&self.path)
        }
        .boxed()
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut inner = self.inner.lock().expect("checkpoint lock poisoned");
            inner
                .writer
                .flush()
                .change_context(CheckpointError::Io)
                .attach_printable_lazy(|| {
                    format!("failed to flush checkpoint file: {}", self.path.display())
                })?;
            inner
                .writer
                .get_ref()
                .sync_data()
                .change_context(CheckpointError::Io)
                .attach_printable_lazy(|| {
                    format!("failed to sync checkpoint file: {}", self.path.display())
                })?;
            Ok(())
        }
        .boxed()
    }
}

fn ends_with_newline(path: &Path) -> Result<bool> {
    use std::io::{Read as _, Seek as _, SeekFrom};

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => {
            return Err(error_stack::report!(CheckpointError::Io)
                .attach_printable(format!("failed to inspect {}", path.display()))
                .attach_printable(e));
        }
    };
    let len = file
        .metadata()
        .change_context(CheckpointError::Io)?
        .len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).change_context(CheckpointError::Io)?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).change_context(CheckpointError::Io)?;
    Ok(last[0] == b'\n')
}

/// Read every complete entry from a checkpoint file.
///
/// A missing file is an empty set. An unparseable trailing line is the
/// signature of a crash mid-append and is discarded; an unparseable line
/// earlier in the file is unexpected and logged at warn, but never corrupts
/// the entries around it.
fn read_keys(path: &Path) -> Result<HashSet<ItemKey>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => {
            return Err(error_stack::report!(CheckpointError::Io)
                .attach_printable(format!("failed to read checkpoint file: {}", path.display()))
                .attach_printable(e));
        }
    };

    let mut keys = HashSet::new();
    let lines: Vec<std::io::Result<String>> = BufReader::new(file).lines().collect();
    let total = lines.len();
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line
            .change_context(CheckpointError::Io)
            .attach_printable_lazy(|| format!("failed reading {}", path.display()))?;
        match serde_json::from_str::<CheckpointLine>(&line) {
            Ok(entry) => {
                keys.insert(entry.key);
            }
            Err(_) if idx + 1 == total => {
                tracing::debug!(
                    path = %path.display(),
                    "discarding incomplete trailing checkpoint entry"
                );
            }
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    line = idx + 1,
                    "skipping unparseable checkpoint entry"
                );
            }
        }
    }
    Ok(keys)
}
