use std::path::{Path, PathBuf};

use error_stack::ResultExt as _;

use crate::error::{MainError, Result};

/// Expand directory inputs to their `*.jsonl` files, lexicographically.
///
/// Explicit file arguments keep the order the operator gave them; within one
/// directory, lexicographic order makes the merge deterministic across
/// shells and filesystems.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut expanded = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut from_dir: Vec<PathBuf> = std::fs::read_dir(input)
                .change_context_lazy(|| MainError::MissingFile(input.clone()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
                .collect();
            from_dir.sort();
            expanded.extend(from_dir);
        } else {
            expanded.push(input.clone());
        }
    }
    Ok(expanded)
}

#[allow(clippy::print_stdout)]
pub fn merge(
    inputs: &[PathBuf],
    out_jsonl: &Path,
    out_tsv: Option<&Path>,
    stats: bool,
) -> Result<()> {
    let inputs = expand_inputs(inputs)?;
    let result = shardcap_merge::merge(&inputs, out_jsonl, out_tsv)
        .change_context(MainError::Merge)?;

    if stats {
        println!("files:         {}", result.files);
        println!("records in:    {}", result.records_in);
        println!("duplicates:    {}", result.duplicates);
        println!("skipped lines: {}", result.skipped_lines);
        println!("records out:   {}", result.records_out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_expand_sorted_and_files_keep_given_order() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).unwrap();
        std::fs::write(logs.join("b.jsonl"), "").unwrap();
        std::fs::write(logs.join("a.jsonl"), "").unwrap();
        std::fs::write(logs.join("notes.txt"), "").unwrap();
        let explicit = dir.path().join("z.jsonl");
        std::fs::write(&explicit, "").unwrap();

        let expanded = expand_inputs(&[explicit.clone(), logs.clone()]).unwrap();
        assert_eq!(
            expanded,
            [explicit, logs.join("a.jsonl"), logs.join("b.jsonl")]
        );
    }
}
