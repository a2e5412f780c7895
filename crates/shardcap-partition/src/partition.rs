use shardcap_core::Shard;

/// Split `n` items into contiguous half-open shards of `chunk = ceil(n/k)`
/// items each, assigned greedily (shard 0 fills first; not round-robin).
///
/// Boundaries are a pure function of `(n, k, source)`, so two independent
/// resubmissions derive identical shard identifiers — the resume contract
/// depends on that. When `k > n` the partition degenerates to one item per
/// shard; that is reported as a warning, not an error. `n == 0` yields an
/// empty partition, which callers treat as a fatal setup condition.
pub fn partition(n: u64, k: usize, source: &str) -> Vec<Shard> {
    if n == 0 || k == 0 {
        return Vec::new();
    }

    let k = k as u64;
    if k > n {
        tracing::warn!(
            requested = k,
            items = n,
            "requested more shards than items; reducing to one item per shard"
        );
    }
    let chunk = n.div_ceil(k);

    let mut shards = Vec::new();
    let mut start = 0u64;
    while start < n {
        let end = (start + chunk).min(n);
        let index = shards.len();
        shards.push(Shard {
            index,
            start,
            end,
            id: shard_id(source, index),
        });
        start = end;
    }
    shards
}

/// Stable shard identifier for a manifest-backed dataset: source stem plus
/// zero-padded chunk index.
pub fn shard_id(source: &str, chunk_index: usize) -> String {
    format!("{source}-{chunk_index:04}")
}

/// Stable shard identifier for an index-range dataset.
pub fn range_shard_id(start: u64, end: u64) -> String {
    format!("range-{start}-{end}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(shards: &[Shard]) -> Vec<u64> {
        shards.iter().map(Shard::len).collect()
    }

    fn assert_exact_cover(shards: &[Shard], n: u64) {
        let mut expected_start = 0;
        for shard in shards {
            assert_eq!(shard.start, expected_start, "gap or overlap at {shard}");
            assert!(shard.start < shard.end, "empty shard {shard}");
            expected_start = shard.end;
        }
        assert_eq!(expected_start, n, "partition does not cover [0, {n})");
    }

    #[test]
    fn more_shards_than_items_degenerates_to_singletons() {
        let shards = partition(7, 10, "dev");
        assert_eq!(shards.len(), 7);
        assert_eq!(sizes(&shards), vec![1; 7]);
        assert_exact_cover(&shards, 7);
    }

    #[test]
    fn ceil_chunking_leaves_short_tail() {
        let shards = partition(23, 5, "train");
        assert_eq!(sizes(&shards), vec![5, 5, 5, 5, 3]);
        assert_exact_cover(&shards, 23);
    }

    #[test]
    fn exact_division() {
        let shards = partition(100, 4, "x");
        assert_eq!(sizes(&shards), vec![25; 4]);
        assert_exact_cover(&shards, 100);
    }

    #[test]
    fn single_shard_takes_everything() {
        let shards = partition(12, 1, "x");
        assert_eq!(sizes(&shards), vec![12]);
        assert_exact_cover(&shards, 12);
    }

    #[test]
    fn empty_dataset_yields_empty_partition() {
        assert!(partition(0, 4, "x").is_empty());
        assert!(partition(5, 0, "x").is_empty());
    }

    #[test]
    fn cover_holds_across_a_grid_of_shapes() {
        for n in 1..=64 {
            for k in 1..=12 {
                let shards = partition(n, k, "grid");
                assert_exact_cover(&shards, n);
                assert!(shards.len() <= k.min(n as usize));
            }
        }
    }

    #[test]
    fn boundaries_are_deterministic() {
        let a = partition(100_000, 37, "corpus");
        let b = partition(100_000, 37, "corpus");
        assert_eq!(a, b);
    }

    #[test]
    fn shard_ids_are_stable_and_ordered() {
        let shards = partition(10, 3, "librispeech");
        let ids: Vec<_> = shards.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["librispeech-0000", "librispeech-0001", "librispeech-0002"]);
        assert_eq!(range_shard_id(1000, 2000), "range-1000-2000");
    }
}
