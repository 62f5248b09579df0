// TeamTasks - task collection engine: store, query pipeline, CSV import/export

pub mod assignees;
pub mod config;
pub mod csv;
pub mod error;
pub mod jsonl;
pub mod models;
pub mod query;
pub mod record;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use assignees::AssigneeIndex;
pub use config::{Backend, Config, SyncConfig, SyncStatus};
pub use error::{Result, TaskError};
pub use models::{Priority, Status, Task, TaskDraft, TaskPatch, now_ms};
pub use query::{Query, Selection, SortKey, ViewCache};
pub use record::Record;
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::{ImportTicket, LoadSource, TaskStore};
