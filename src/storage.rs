// Key-value persistence backends for the collection blob

use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, TaskError};
use crate::models::now_ms;

/// Durable key-value storage holding whole-collection text blobs
pub trait Storage {
    /// Read the blob stored under `key`, or `None` if nothing was ever written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `key`
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Validate a storage key
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TaskError::Persistence("Storage key cannot be empty".to_string()));
    }
    if key.len() > 64 {
        return Err(TaskError::Persistence(format!("Storage key too long: {} (max 64 chars)", key)));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(TaskError::Persistence(format!(
            "Invalid storage key: {} (must be alphanumeric with _/-)",
            key
        )));
    }
    Ok(())
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory storage, used for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key
    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    /// Make every subsequent `get` fail, as if the backing store were unreadable
    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make every subsequent `set` fail, as if the quota were exceeded
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads {
            return Err(TaskError::Persistence("storage unavailable".to_string()));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        if self.fail_writes {
            return Err(TaskError::Persistence("storage quota exceeded".to_string()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// Files
// ============================================================================

/// One `{key}.jsonl` file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `path`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        // Acquire exclusive lock before writing
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.base_path.join(format!("{}.lock", key)))?;
        lock.lock_exclusive()?;

        // Atomic-ish write via temp + rename
        let path = self.path_for(key);
        let tmp = path.with_extension("jsonl.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        debug!(path = ?path, bytes = value.len(), "Wrote collection blob");

        // Lock is automatically released when file is dropped
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed key-value table
pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating kv schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { db })
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let value = self
            .db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.db.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now_ms()],
        )?;
        Ok(())
    }
}
