use error_stack::ResultExt as _;
use shardcap_core::Shard;
use shardcap_partition::{Manifest, partition, range_shard_id};

use crate::dispatch::DatasetArgs;
use crate::error::{MainError, Result};

/// Print the shard table for a dataset and shard count.
///
/// Operators use this to preview boundaries (and the run identifiers they
/// imply) before submitting one dispatch process per shard.
#[allow(clippy::print_stdout)]
pub fn show_partition(dataset: &DatasetArgs, num_shards: usize) -> Result<()> {
    let shards: Vec<Shard> = match (&dataset.manifest, dataset.range()) {
        (Some(path), None) => {
            let manifest = Manifest::load(path).change_context(MainError::InvalidSelection)?;
            partition(manifest.len() as u64, num_shards, manifest.source())
        }
        // A bare range partitions the absolute index span directly.
        (None, Some((start, end))) if start < end => {
            partition(end - start, num_shards, "range")
                .into_iter()
                .map(|s| {
                    let (abs_start, abs_end) = (start + s.start, start + s.end);
                    Shard {
                        index: s.index,
                        start: abs_start,
                        end: abs_end,
                        id: range_shard_id(abs_start, abs_end),
                    }
                })
                .collect()
        }
        _ => {
            return Err(error_stack::report!(MainError::InvalidSelection)
                .attach_printable("give either --manifest or a non-empty --start-idx/--end-idx range"));
        }
    };

    println!("{:<24} {:>10} {:>10} {:>10}", "shard", "start", "end", "items");
    for shard in &shards {
        println!(
            "{:<24} {:>10} {:>10} {:>10}",
            shard.id,
            shard.start,
            shard.end,
            shard.len()
        );
    }
    Ok(())
}
