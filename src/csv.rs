// Delimited-text export and import of task collections

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::models::{Priority, Status, Task};

pub const DELIMITER: char = ',';
pub const QUOTE: char = '"';
pub const MIME_TYPE: &str = "text/csv";

/// Field schema, in export order
pub const FIELDS: [&str; 9] = [
    "id",
    "title",
    "description",
    "assignee",
    "priority",
    "status",
    "dueDate",
    "createdAt",
    "updatedAt",
];

/// Name of the downloadable export artifact for `date`
pub fn export_filename(date: NaiveDate) -> String {
    format!("tasks-{}.csv", date.format("%Y-%m-%d"))
}

// ============================================================================
// Export
// ============================================================================

/// Header row followed by one row of quoted literals per task
pub fn export(tasks: &[Task]) -> String {
    let separator = DELIMITER.to_string();
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push(FIELDS.join(separator.as_str()));

    for task in tasks {
        let cells: Vec<String> = FIELDS.iter().map(|field| quote(&field_value(task, field))).collect();
        lines.push(cells.join(separator.as_str()));
    }

    debug!(count = tasks.len(), "Exported tasks");
    lines.join("\n")
}

fn field_value(task: &Task, field: &str) -> String {
    match field {
        "id" => task.id.clone(),
        "title" => task.title.clone(),
        "description" => task.description.clone(),
        "assignee" => task.assignee.clone(),
        "priority" => task.priority.label().to_string(),
        "status" => task.status.label().to_string(),
        "dueDate" => task.due_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        "createdAt" => format_timestamp(task.created_at),
        "updatedAt" => format_timestamp(task.updated_at),
        _ => String::new(),
    }
}

/// Wrap a value as a quoted literal (a JSON string literal)
pub fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn format_timestamp(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

fn parse_timestamp(value: &str) -> Option<i64> {
    if value.is_empty() {
        return None;
    }
    if let Ok(ms) = value.parse::<i64>() {
        return Some(ms);
    }
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.timestamp_millis())
}

// ============================================================================
// Import
// ============================================================================

/// One parsed data row, keyed by header name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRecord {
    pub fields: HashMap<String, String>,
}

impl ImportRecord {
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }
}

/// Split one row into raw cells
///
/// A quote toggles quoted mode; a delimiter separates cells only outside
/// quotes. Inside quotes a backslash escapes the next character so an
/// escaped quote never toggles the mode. A row that ends still inside quotes
/// under that rule is hand-written text with literal backslashes, and is
/// rescanned with plain quote toggling. Quotes are kept in the cell text.
pub fn split_row(line: &str) -> Vec<String> {
    match scan_row(line, true) {
        (cells, false) => cells,
        (_, true) => scan_row(line, false).0,
    }
}

// Returns the cells and whether the scan ended inside a quoted field
fn scan_row(line: &str, escapes: bool) -> (Vec<String>, bool) {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            QUOTE => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\\' if in_quotes && escapes => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            DELIMITER if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    (cells, in_quotes)
}

/// Recover a value from its quoted literal form
///
/// Cells that are not valid literals are taken verbatim, minus surrounding
/// whitespace and a bare pair of quotes.
pub fn unquote(cell: &str) -> String {
    let trimmed = cell.trim();
    if trimmed.len() >= 2 && trimmed.starts_with(QUOTE) && trimmed.ends_with(QUOTE) {
        if let Ok(value) = serde_json::from_str::<String>(trimmed) {
            return value;
        }
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}

/// Parse delimited text into records keyed by header name
///
/// Missing trailing cells read as empty, extra cells and unknown headers are
/// ignored, blank lines are skipped. Fails with `EmptyImport` when there is
/// no data row.
pub fn parse(text: &str) -> Result<Vec<ImportRecord>> {
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .filter(|line| !line.trim().is_empty());

    let header: Vec<String> = match lines.next() {
        Some(line) => split_row(line).iter().map(|cell| unquote(cell)).collect(),
        None => return Err(TaskError::EmptyImport),
    };

    let mut records = Vec::new();
    for (row_num, line) in lines.enumerate() {
        let cells = split_row(line);
        if cells.len() != header.len() {
            warn!(
                row = row_num + 1,
                expected = header.len(),
                found = cells.len(),
                "Column count mismatch in import row"
            );
        }

        let fields = header
            .iter()
            .enumerate()
            .filter(|(_, name)| FIELDS.contains(&name.as_str()))
            .map(|(i, name)| (name.clone(), cells.get(i).map(|c| unquote(c)).unwrap_or_default()))
            .collect();
        records.push(ImportRecord { fields });
    }

    if records.is_empty() {
        return Err(TaskError::EmptyImport);
    }

    debug!(count = records.len(), "Parsed import rows");
    Ok(records)
}

/// Turn parsed records into tasks ready to merge
///
/// Rows with an empty title are skipped. An id is trusted when it is
/// non-empty and unused by `existing_ids` and earlier rows; otherwise a fresh
/// one is assigned. Missing timestamps become `now`.
pub fn resolve(records: Vec<ImportRecord>, existing_ids: &HashSet<String>, now: i64) -> Vec<Task> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut tasks = Vec::with_capacity(records.len());

    for (row_num, record) in records.into_iter().enumerate() {
        let title = record.get("title").trim().to_string();
        if title.is_empty() {
            warn!(row = row_num + 1, "Skipping import row with empty title");
            continue;
        }

        let raw_id = record.get("id").trim();
        let id = if raw_id.is_empty() || existing_ids.contains(raw_id) || seen.contains(raw_id) {
            let fresh = Uuid::now_v7().to_string();
            if !raw_id.is_empty() {
                warn!(row = row_num + 1, id = raw_id, fresh = %fresh, "Imported id already in use, reassigning");
            }
            fresh
        } else {
            raw_id.to_string()
        };
        seen.insert(id.clone());

        let priority = parse_or_default::<Priority>(record.get("priority"), "priority", row_num);
        let status = parse_or_default::<Status>(record.get("status"), "status", row_num);

        let raw_due = record.get("dueDate").trim();
        let due_date = if raw_due.is_empty() {
            None
        } else {
            match NaiveDate::parse_from_str(raw_due, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!(row = row_num + 1, value = raw_due, error = %e, "Ignoring unparseable due date");
                    None
                }
            }
        };

        let created_at = parse_timestamp(record.get("createdAt").trim()).unwrap_or(now);
        let updated_at = parse_timestamp(record.get("updatedAt").trim())
            .unwrap_or(now)
            .max(created_at);

        tasks.push(Task {
            id,
            title,
            description: record.get("description").to_string(),
            assignee: record.get("assignee").trim().to_string(),
            priority,
            status,
            due_date,
            created_at,
            updated_at,
        });
    }

    tasks
}

fn parse_or_default<T>(value: &str, field: &str, row_num: usize) -> T
where
    T: std::str::FromStr + Default,
{
    if value.trim().is_empty() {
        return T::default();
    }
    match value.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(row = row_num + 1, field, value, "Unrecognized value, using default");
            T::default()
        }
    }
}
