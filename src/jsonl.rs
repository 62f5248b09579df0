// JSONL codec for the persisted collection blob

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{Result, TaskError};
use crate::record::Record;

/// Encode records as one JSON object per line, in collection order
pub fn encode<T: Record>(records: &[T]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode a blob, returning the latest version per ID in first-seen order
///
/// Any malformed line makes the whole blob corrupt. For records with
/// duplicate IDs, the one with the highest updated_at wins but keeps the
/// position of the first occurrence.
pub fn decode_latest<T: Record>(text: &str) -> Result<Vec<T>> {
    let mut records: Vec<T> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(line).map_err(|e| {
            warn!(line = line_num + 1, error = ?e, "Failed to parse JSON line");
            TaskError::Persistence(format!("corrupt record on line {}: {}", line_num + 1, e))
        })?;

        match positions.get(record.id()) {
            Some(&pos) => {
                warn!(id = record.id(), line = line_num + 1, "Duplicate record id in blob");
                if record.updated_at() > records[pos].updated_at() {
                    records[pos] = record;
                }
            }
            None => {
                positions.insert(record.id().to_string(), records.len());
                records.push(record);
            }
        }
    }

    debug!(count = records.len(), "Decoded records from JSONL");
    Ok(records)
}
