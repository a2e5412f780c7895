use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead as _, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use error_stack::ResultExt as _;
use shardcap_core::{ItemKey, OutputRecord};

use crate::error::{MergeError, Result};

/// Counters for one merge invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub files: usize,
    pub records_in: usize,
    pub duplicates: usize,
    pub skipped_lines: usize,
    pub records_out: usize,
}

/// Merge per-shard output logs into one deduplicated log.
///
/// Inputs are consumed in the order given; when the same key appears more
/// than once, the first occurrence wins and later ones are dropped. Record
/// order in the merged log follows first occurrence, so merging an already
/// merged log is a no-op. A missing input file is fatal; a line that does
/// not parse as an output record is skipped with a warning, since a crashed
/// shard writer can leave a torn trailing line behind.
pub fn merge(inputs: &[PathBuf], out_jsonl: &Path, out_tsv: Option<&Path>) -> Result<MergeStats> {
    let mut stats = MergeStats {
        files: inputs.len(),
        ..Default::default()
    };
    let mut seen: HashSet<ItemKey> = HashSet::new();
    let mut records: Vec<OutputRecord> = Vec::new();

    for input in inputs {
        if !input.is_file() {
            return Err(error_stack::report!(MergeError::MissingInput(
                input.clone()
            )));
        }
        let file = File::open(input)
            .change_context_lazy(|| MergeError::ReadInput(input.clone()))?;
        let reader = BufReader::new(file);

        let mut from_file = 0usize;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.change_context_lazy(|| MergeError::ReadInput(input.clone()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: OutputRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        input = %input.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping unparseable record"
                    );
                    stats.skipped_lines += 1;
                    continue;
                }
            };
            stats.records_in += 1;
            from_file += 1;
            if seen.insert(record.key.clone()) {
                records.push(record);
            } else {
                stats.duplicates += 1;
            }
        }
        tracing::debug!(input = %input.display(), records = from_file, "input consumed");
    }
    stats.records_out = records.len();

    // Records are buffered before any output is created, so an input may
    // safely be the previous merged log at the same path.
    write_jsonl(&records, out_jsonl)?;
    if let Some(out_tsv) = out_tsv {
        write_tsv(&records, out_tsv)?;
    }

    tracing::info!(
        files = stats.files,
        records_in = stats.records_in,
        duplicates = stats.duplicates,
        skipped = stats.skipped_lines,
        records_out = stats.records_out,
        out = %out_jsonl.display(),
        "merge complete"
    );
    Ok(stats)
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))?;
        }
    }
    let file =
        File::create(path).change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))?;
    Ok(BufWriter::new(file))
}

fn write_jsonl(records: &[OutputRecord], path: &Path) -> Result<()> {
    let mut writer = create_output(path)?;
    for record in records {
        let line = serde_json::to_string(record)
            .change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))?;
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))?;
    }
    writer
        .flush()
        .change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))
}

fn write_tsv(records: &[OutputRecord], path: &Path) -> Result<()> {
    let mut writer = create_output(path)?;
    let mut emit = |row: String| {
        writer
            .write_all(row.as_bytes())
            .change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))
    };
    emit("key\tresult\ttimestamp\n".to_owned())?;
    for record in records {
        emit(format!(
            "{}\t{}\t{}\n",
            record.key,
            record.result_flat(),
            record.timestamp.to_rfc3339()
        ))?;
    }
    writer
        .flush()
        .change_context_lazy(|| MergeError::WriteOutput(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcap_core::ItemKey;
    use std::io::Write as _;

    fn write_log(dir: &Path, name: &str, records: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for (key, result) in records {
            let record = OutputRecord::new(ItemKey::new(*key), *result);
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        }
        path
    }

    fn read_records(path: &Path) -> Vec<OutputRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn first_occurrence_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_log(dir.path(), "a.jsonl", &[("k1", "from a"), ("k2", "also a")]);
        let b = write_log(dir.path(), "b.jsonl", &[("k2", "from b"), ("k3", "only b")]);
        let out = dir.path().join("merged.jsonl");

        let stats = merge(&[a, b], &out, None).unwrap();
        assert_eq!(stats.records_in, 4);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.records_out, 3);

        let merged = read_records(&out);
        let keys: Vec<_> = merged.iter().map(|r| r.key.as_str().to_owned()).collect();
        assert_eq!(keys, ["k1", "k2", "k3"]);
        assert_eq!(merged[1].result, "also a");
    }

    #[test]
    fn merging_a_merged_log_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_log(dir.path(), "a.jsonl", &[("k1", "x"), ("k2", "y")]);
        let b = write_log(dir.path(), "b.jsonl", &[("k2", "z"), ("k3", "w")]);
        let first = dir.path().join("merged.jsonl");
        merge(&[a, b], &first, None).unwrap();

        let again = dir.path().join("merged2.jsonl");
        let stats = merge(std::slice::from_ref(&first), &again, None).unwrap();
        assert_eq!(stats.duplicates, 0);
        assert_eq!(read_records(&first), read_records(&again));
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged.jsonl");
        let err = merge(&[dir.path().join("absent.jsonl")], &out, None).unwrap_err();
        assert!(matches!(err.current_context(), MergeError::MissingInput(_)));
        assert!(!out.exists());
    }

    #[test]
    fn torn_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_log(dir.path(), "a.jsonl", &[("k1", "x")]);
        let mut file = std::fs::OpenOptions::new().append(true).open(&a).unwrap();
        write!(file, "{{\"key\":\"k2\",\"resu").unwrap();

        let out = dir.path().join("merged.jsonl");
        let stats = merge(std::slice::from_ref(&a), &out, None).unwrap();
        assert_eq!(stats.skipped_lines, 1);
        assert_eq!(stats.records_out, 1);
    }

    #[test]
    fn tabular_mirror_flattens_results() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_log(dir.path(), "a.jsonl", &[("k1", "two\nlines")]);
        let out = dir.path().join("merged.jsonl");
        let tsv = dir.path().join("merged.tsv");

        merge(std::slice::from_ref(&a), &out, Some(&tsv)).unwrap();
        let mirror = std::fs::read_to_string(&tsv).unwrap();
        let mut lines = mirror.lines();
        assert_eq!(lines.next(), Some("key\tresult\ttimestamp"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("k1\ttwo lines\t"));
    }

    #[test]
    fn empty_inputs_produce_an_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        File::create(&a).unwrap();
        let out = dir.path().join("merged.jsonl");

        let stats = merge(std::slice::from_ref(&a), &out, None).unwrap();
        assert_eq!(stats.records_out, 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
    }
}
