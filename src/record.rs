// Record trait for anything kept in a persisted collection

use serde::{Deserialize, Serialize};

use crate::models::Task;

/// Core trait that any persisted record must implement
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Timestamp when this record was last updated (milliseconds since epoch)
    fn updated_at(&self) -> i64;

    /// Storage key under which the whole collection blob is written
    fn storage_key() -> &'static str
    where
        Self: Sized;
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn storage_key() -> &'static str {
        "team-tasks"
    }
}
