use serde::{Deserialize, Serialize};

/// One contiguous, non-overlapping half-open slice `[start, end)` of the
/// dataset, assigned to exactly one dispatcher process.
///
/// The identifier is derived from the dataset name and chunk index (or the
/// raw range) and is stable across resubmissions: it names the checkpoint
/// namespace and the output files, so resuming a crashed shard reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Position of this shard in the partition (0-based).
    pub index: usize,
    /// First item index covered, inclusive.
    pub start: u64,
    /// One past the last item index covered.
    pub end: u64,
    /// Stable identifier; checkpoint namespace and output-file stem.
    pub id: String,
}

impl Shard {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Item indices covered by this shard.
    pub fn indices(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

impl std::fmt::Display for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}, {})", self.id, self.start, self.end)
    }
}
