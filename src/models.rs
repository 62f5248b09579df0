// Data models for the team task tracker

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TaskError};

/// A unit of trackable work
///
/// Serialized with the camelCase field schema shared by the persisted blob and
/// the CSV codec: `id, title, description, assignee, priority, status,
/// dueDate, createdAt, updatedAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Empty means unassigned
    #[serde(default)]
    pub assignee: String,
    pub priority: Priority,
    pub status: Status,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Milliseconds since epoch
    pub created_at: i64,
    /// Milliseconds since epoch, never earlier than `created_at`
    pub updated_at: i64,
}

/// Severity, ordered Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(from = "String")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Sort rank: Low(0) < Medium(1) < High(2) < Critical(3)
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(TaskError::Validation(format!("unknown priority: {}", s))),
        }
    }
}

// Unrecognized values rank as Low
impl From<String> for Priority {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(from = "String")]
pub enum Status {
    #[default]
    Todo,
    #[serde(rename = "In Progress")]
    InProgress,
    Waiting,
    Done,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Todo => "Todo",
            Status::InProgress => "In Progress",
            Status::Waiting => "Waiting",
            Status::Done => "Done",
        }
    }

    /// Done flips back to Todo, anything else becomes Done
    pub fn toggled(self) -> Self {
        match self {
            Status::Done => Status::Todo,
            _ => Status::Done,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "todo" => Ok(Status::Todo),
            "inprogress" => Ok(Status::InProgress),
            "waiting" => Ok(Status::Waiting),
            "done" => Ok(Status::Done),
            _ => Err(TaskError::Validation(format!("unknown status: {}", s))),
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

// "In Progress", "in_progress", "in-progress" all normalize to "inprogress"
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fields supplied by the caller when creating a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub assignee: String,
    pub priority: Priority,
    pub status: Status,
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    /// Draft with the given title, Medium priority and Todo status
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: Priority::Medium,
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Typed partial update: only the mutable fields, unknown fields rejected
///
/// `None` leaves a field untouched. `due_date: Some(None)` clears the date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<String>,
    #[serde(default, deserialize_with = "strict")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "strict")]
    pub status: Option<Status>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    /// Parse a JSON object patch, rejecting `id`, `createdAt` and any other unknown field
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TaskError::InvalidPatch(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Merge the supplied fields into `task`; id and timestamps are left alone
    pub(crate) fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }
}

// Explicit edits must name a known value; no fallback to the default
fn strict<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| s.parse::<T>().map_err(<D::Error as de::Error>::custom))
        .transpose()
}

// Distinguishes an explicit `null` (clear) from an absent field (keep)
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Reject titles that are empty or whitespace-only
pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(TaskError::Validation("title cannot be empty".to_string()));
    }
    Ok(())
}

/// Fallback collection used when nothing is persisted or the blob is unreadable
pub fn seed_tasks(now: i64) -> Vec<Task> {
    vec![
        Task {
            id: "seed-1".to_string(),
            title: "Fix truck 12 brake line".to_string(),
            description: "Rear brake line is leaking, order parts first".to_string(),
            assignee: "Dana".to_string(),
            priority: Priority::High,
            status: Status::InProgress,
            due_date: None,
            created_at: now,
            updated_at: now,
        },
        Task {
            id: "seed-2".to_string(),
            title: "SAP update for Q3 inventory".to_string(),
            description: String::new(),
            assignee: "Luis".to_string(),
            priority: Priority::Medium,
            status: Status::Todo,
            due_date: None,
            created_at: now,
            updated_at: now,
        },
    ]
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time before Unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms() {
        let ts = now_ms();
        assert!(ts > 0);
        // Should be reasonable timestamp (after year 2020)
        assert!(ts > 1_600_000_000_000);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::Low.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Critical.rank());
    }

    #[test]
    fn test_priority_unknown_ranks_as_low() {
        let json = r#""Urgent!!""#;
        let p: Priority = serde_json::from_str(json).unwrap();
        assert_eq!(p, Priority::Low);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");

        let status: Status = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, Status::InProgress);
        let status: Status = serde_json::from_str("\"Waiting\"").unwrap();
        assert_eq!(status, Status::Waiting);
    }

    #[test]
    fn test_status_toggled() {
        assert_eq!(Status::Done.toggled(), Status::Todo);
        assert_eq!(Status::Todo.toggled(), Status::Done);
        assert_eq!(Status::InProgress.toggled(), Status::Done);
        assert_eq!(Status::Waiting.toggled(), Status::Done);
    }

    #[test]
    fn test_task_serialization_uses_schema_names() {
        let task = Task {
            id: "t1".to_string(),
            title: "Test".to_string(),
            description: String::new(),
            assignee: String::new(),
            priority: Priority::Critical,
            status: Status::Todo,
            due_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            created_at: 1000,
            updated_at: 2000,
        };

        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"dueDate\":\"2025-01-01\""));
        assert!(json.contains("\"createdAt\":1000"));
        assert!(json.contains("\"priority\":\"Critical\""));

        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_patch_rejects_immutable_fields() {
        assert!(matches!(
            TaskPatch::from_json(r#"{"id":"other"}"#),
            Err(TaskError::InvalidPatch(_))
        ));
        assert!(matches!(
            TaskPatch::from_json(r#"{"createdAt":5}"#),
            Err(TaskError::InvalidPatch(_))
        ));
        assert!(matches!(
            TaskPatch::from_json(r#"{"colour":"red"}"#),
            Err(TaskError::InvalidPatch(_))
        ));
    }

    #[test]
    fn test_patch_rejects_unknown_enum_values() {
        assert!(matches!(
            TaskPatch::from_json(r#"{"status":"Finished"}"#),
            Err(TaskError::InvalidPatch(_))
        ));
        assert!(matches!(
            TaskPatch::from_json(r#"{"priority":"Urgnt"}"#),
            Err(TaskError::InvalidPatch(_))
        ));

        let patch = TaskPatch::from_json(r#"{"status":"in progress","priority":"Critical"}"#).unwrap();
        assert_eq!(patch.status, Some(Status::InProgress));
        assert_eq!(patch.priority, Some(Priority::Critical));
    }

    #[test]
    fn test_patch_due_date_null_clears() {
        let keep = TaskPatch::from_json(r#"{"title":"x"}"#).unwrap();
        assert_eq!(keep.due_date, None);

        let clear = TaskPatch::from_json(r#"{"dueDate":null}"#).unwrap();
        assert_eq!(clear.due_date, Some(None));

        let set = TaskPatch::from_json(r#"{"dueDate":"2024-06-01"}"#).unwrap();
        assert_eq!(set.due_date, Some(NaiveDate::from_ymd_opt(2024, 6, 1)));
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Fix truck").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   \t").is_err());
    }

    #[test]
    fn test_seed_tasks() {
        let seeds = seed_tasks(1000);
        assert_eq!(seeds.len(), 2);
        assert_ne!(seeds[0].id, seeds[1].id);
        assert!(seeds.iter().all(|t| !t.title.is_empty()));
    }
}
