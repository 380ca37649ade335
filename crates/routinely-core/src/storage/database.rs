//! SQLite-based catalog, history, and session persistence.
//!
//! Catalog entries are stored as JSON documents keyed by id; the active
//! session lives in a key-value table and is rewritten on every
//! state-changing transition, which is what makes crash recovery work:
//! the persisted deadlines are absolute, so a rehydrated session needs no
//! bookkeeping about downtime.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::data_dir;
use crate::error::StorageError;
use crate::model::{Catalog, Routine, Task};
use crate::session::{Session, SessionHistory};

/// History is trimmed to this many entries, newest first.
pub const MAX_HISTORY_ENTRIES: usize = 100;

const ACTIVE_SESSION_KEY: &str = "active_session";

/// SQLite store for tasks, routines, session history, and the persisted
/// active session.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the database at `~/.config/routinely/routinely.db`, creating
    /// the schema if needed.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()?.join("routinely.db");
        let conn = Connection::open(&path).map_err(|source| StorageError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open at an explicit path (tests, alternate profiles).
    pub fn open_at(path: &std::path::Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id   TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS routines (
                id   TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                id           TEXT PRIMARY KEY,
                completed_at TEXT NOT NULL,
                data         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_completed_at ON history(completed_at);",
        )?;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn create_task(&self, task: &Task) -> Result<(), StorageError> {
        let data = serde_json::to_string(task)?;
        self.conn.execute(
            "INSERT INTO tasks (id, data) VALUES (?1, ?2)",
            params![task.id, data],
        )?;
        info!(task_id = %task.id, name = %task.name, "task created");
        Ok(())
    }

    pub fn update_task(&self, task: &Task) -> Result<(), StorageError> {
        let data = serde_json::to_string(task)?;
        let changed = self.conn.execute(
            "UPDATE tasks SET data = ?2 WHERE id = ?1",
            params![task.id, data],
        )?;
        if changed == 0 {
            return Err(StorageError::TaskNotFound(task.id.clone()));
        }
        info!(task_id = %task.id, name = %task.name, "task updated");
        Ok(())
    }

    /// Delete a task and remove it from every routine that references it.
    /// In-flight sessions are unaffected; they run on snapshotted
    /// parameters.
    pub fn delete_task(&self, task_id: &str) -> Result<(), StorageError> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        if changed == 0 {
            warn!(task_id, "attempted to delete non-existent task");
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        let mut affected = 0;
        for mut routine in self.list_routines()? {
            let before = routine.task_ids.len();
            routine.task_ids.retain(|id| id != task_id);
            if routine.task_ids.len() < before {
                self.update_routine(&routine)?;
                affected += 1;
            }
        }
        info!(task_id, affected_routines = affected, "task deleted");
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT data FROM tasks ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tasks = Vec::new();
        for data in rows {
            tasks.push(serde_json::from_str(&data?)?);
        }
        Ok(tasks)
    }

    // ── Routines ─────────────────────────────────────────────────────

    pub fn create_routine(&self, routine: &Routine) -> Result<(), StorageError> {
        let data = serde_json::to_string(routine)?;
        self.conn.execute(
            "INSERT INTO routines (id, data) VALUES (?1, ?2)",
            params![routine.id, data],
        )?;
        info!(
            routine_id = %routine.id,
            name = %routine.name,
            task_count = routine.task_ids.len(),
            "routine created"
        );
        Ok(())
    }

    pub fn update_routine(&self, routine: &Routine) -> Result<(), StorageError> {
        let data = serde_json::to_string(routine)?;
        let changed = self.conn.execute(
            "UPDATE routines SET data = ?2 WHERE id = ?1",
            params![routine.id, data],
        )?;
        if changed == 0 {
            return Err(StorageError::RoutineNotFound(routine.id.clone()));
        }
        debug!(routine_id = %routine.id, "routine updated");
        Ok(())
    }

    pub fn delete_routine(&self, routine_id: &str) -> Result<(), StorageError> {
        let changed = self
            .conn
            .execute("DELETE FROM routines WHERE id = ?1", params![routine_id])?;
        if changed == 0 {
            warn!(routine_id, "attempted to delete non-existent routine");
            return Err(StorageError::RoutineNotFound(routine_id.to_string()));
        }
        info!(routine_id, "routine deleted");
        Ok(())
    }

    pub fn get_routine(&self, routine_id: &str) -> Result<Option<Routine>, StorageError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM routines WHERE id = ?1",
                params![routine_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn list_routines(&self) -> Result<Vec<Routine>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT data FROM routines ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut routines = Vec::new();
        for data in rows {
            routines.push(serde_json::from_str(&data?)?);
        }
        Ok(routines)
    }

    // ── History ──────────────────────────────────────────────────────

    /// Append a finished session to history and trim to the cap.
    pub fn add_history(&self, entry: &SessionHistory) -> Result<(), StorageError> {
        let data = serde_json::to_string(entry)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO history (id, completed_at, data) VALUES (?1, ?2, ?3)",
            params![entry.id, entry.completed_at.to_rfc3339(), data],
        )?;
        self.conn.execute(
            "DELETE FROM history WHERE id NOT IN (
                SELECT id FROM history ORDER BY completed_at DESC LIMIT ?1
            )",
            params![MAX_HISTORY_ENTRIES as i64],
        )?;
        debug!(session_id = %entry.id, routine = %entry.routine_name, "session archived");
        Ok(())
    }

    /// History entries, newest first.
    pub fn list_history(&self, limit: usize) -> Result<Vec<SessionHistory>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM history ORDER BY completed_at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for data in rows {
            entries.push(serde_json::from_str(&data?)?);
        }
        Ok(entries)
    }

    // ── Active session ───────────────────────────────────────────────

    /// Persist the active session. Called after every state-changing
    /// engine operation.
    pub fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let data = serde_json::to_string(session)?;
        self.kv_set(ACTIVE_SESSION_KEY, &data)
    }

    /// Load the persisted session, if any.
    pub fn load_session(&self) -> Result<Option<Session>, StorageError> {
        match self.kv_get(ACTIVE_SESSION_KEY)? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn clear_session(&self) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![ACTIVE_SESSION_KEY])?;
        Ok(())
    }

    // ── Key-value ────────────────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

/// The store doubles as the engine's read-only catalog. Lookup errors are
/// logged and surface as "not found" -- the engine degrades gracefully
/// rather than failing the session.
impl Catalog for Store {
    fn task(&self, id: &str) -> Option<Task> {
        match self.get_task(id) {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %id, error = %e, "catalog task lookup failed");
                None
            }
        }
    }

    fn routine(&self, id: &str) -> Option<Routine> {
        match self.get_routine(id) {
            Ok(routine) => routine,
            Err(e) => {
                warn!(routine_id = %id, error = %e, "catalog routine lookup failed");
                None
            }
        }
    }
}
