use std::io::{BufRead as _, BufReader};
use std::path::{Path, PathBuf};

use error_stack::ResultExt as _;
use shardcap_core::{ItemKey, ItemPayload, Shard, WorkItem};

use crate::error::{PartitionError, Result};

/// One parsed manifest line: `<utt_id> <audio_path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub key: ItemKey,
    pub path: PathBuf,
}

/// A loaded `wav.scp`-style manifest.
///
/// One item per line, utterance id and audio source split on the first
/// whitespace. Blank lines and `#` comment lines (including auto-generated
/// header blocks) are ignored. Source order is preserved: item index `i` is
/// the i-th retained line, which is what shard ranges index into.
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    /// File stem used to derive shard identifiers.
    source: String,
}

impl Manifest {
    /// Load and parse a manifest file.
    ///
    /// Malformed lines (no whitespace separator) are skipped with a warning,
    /// matching the upstream client behavior. Pipe-command sources
    /// (trailing `|`) are rejected outright rather than silently mangled.
    /// An empty dataset is an error: the engine never silently proceeds
    /// with zero work.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                error_stack::report!(PartitionError::MissingManifest(path.to_owned()))
            } else {
                error_stack::report!(PartitionError::ReadManifest(path.to_owned()))
                    .attach_printable(e)
            }
        })?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line =
                line.change_context_lazy(|| PartitionError::ReadManifest(path.to_owned()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((utt, src)) = line.split_once(char::is_whitespace) else {
                tracing::warn!(
                    line = line_num + 1,
                    path = %path.display(),
                    "skipping manifest line without a source field"
                );
                continue;
            };
            let src = src.trim();
            if src.ends_with('|') {
                return Err(error_stack::report!(PartitionError::PipeSource(
                    utt.to_owned()
                ))
                .attach_printable(format!("line {} of {}", line_num + 1, path.display())));
            }

            entries.push(ManifestEntry {
                key: ItemKey::new(utt),
                path: PathBuf::from(src),
            });
        }

        if entries.is_empty() {
            return Err(error_stack::report!(PartitionError::EmptyDataset)
                .attach_printable(format!("no usable lines in {}", path.display())));
        }

        let source = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest".to_owned());

        Ok(Self { entries, source })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Work items covered by `shard`, in manifest order.
    ///
    /// The shard must come from a partition of this manifest's item count.
    pub fn shard_items(&self, shard: &Shard) -> Vec<WorkItem> {
        self.entries[shard.start as usize..shard.end as usize]
            .iter()
            .map(|e| WorkItem::new(e.key.clone(), ItemPayload::AudioPath(e.path.clone())))
            .collect()
    }
}
