use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ItemKey;

/// One row of the append-only output log, written when an item succeeds.
///
/// The JSONL log and the tabular mirror carry the same fields; `result` is
/// the caption text returned by the endpoint. Records are appended in
/// completion order, which may diverge from submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub key: ItemKey,
    pub result: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock milliseconds spent on the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_ms: Option<u64>,
    /// 1-based attempt number that succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Token usage as reported by the endpoint, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
}

impl OutputRecord {
    pub fn new(key: ItemKey, result: impl Into<String>) -> Self {
        Self {
            key,
            result: result.into(),
            timestamp: Utc::now(),
            processing_ms: None,
            attempt: None,
            usage: None,
        }
    }

    /// Caption text flattened for the tabular mirror: newlines collapsed to
    /// spaces, surrounding whitespace trimmed.
    pub fn result_flat(&self) -> String {
        self.result.replace(['\n', '\r', '\t'], " ").trim().to_owned()
    }
}

/// One row of the dedicated error log, written when an item exhausts its
/// retries. Operators re-run these keys selectively, so the record carries
/// the last failure reason and the attempt count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub key: ItemKey,
    pub error: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(key: ItemKey, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            key,
            error: error.into(),
            attempts,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_record_json_round_trip() {
        let mut record = OutputRecord::new(ItemKey::new("utt-0001"), "a dog barks twice");
        record.attempt = Some(1);
        record.processing_ms = Some(742);

        let line = serde_json::to_string(&record).unwrap();
        let back: OutputRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
        // Key serializes transparently, not as a nested object.
        assert!(line.contains("\"key\":\"utt-0001\""));
    }

    #[test]
    fn result_flat_collapses_newlines() {
        let record = OutputRecord::new(ItemKey::new("u"), "  line one\nline two\r\n ");
        assert_eq!(record.result_flat(), "line one line two");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let record = OutputRecord::new(ItemKey::new("u"), "text");
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains("usage"));
        assert!(!line.contains("attempt"));
    }
}
