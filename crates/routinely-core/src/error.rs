//! Error types for routinely-core.
//!
//! Rejected commands are ordinary `Err` values, never panics: "no session
//! active" and friends are checked preconditions, not faults.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for engine commands.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input: rejected synchronously, session unchanged.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Command conflicts with the current session state.
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Referenced catalog entry is missing.
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Routine resolves to an empty task queue.
    #[error("Routine '{0}' has no runnable tasks")]
    EmptyRoutine(String),

    /// Task duration outside the allowed range.
    #[error("Task duration {secs}s out of range ({min}..={max})")]
    DurationOutOfRange { secs: u32, min: u32, max: u32 },

    /// Confirm window outside the allowed range.
    #[error("Confirm window {secs}s out of range ({min}..={max})")]
    ConfirmWindowOutOfRange { secs: u32, min: u32, max: u32 },

    /// Name exceeds the maximum length.
    #[error("Name too long: {len} chars (max {max})")]
    NameTooLong { len: usize, max: usize },

    /// Description exceeds the maximum length.
    #[error("Description too long: {len} chars (max {max})")]
    DescriptionTooLong { len: usize, max: usize },

    /// Time adjustment would push remaining time at or below zero.
    #[error("Cannot adjust by {delta}s: only {remaining}s remaining")]
    AdjustOutOfRange { delta: i64, remaining: i64 },
}

/// Conflict errors: the command is well-formed but the session is in the
/// wrong state for it.
#[derive(Error, Debug)]
pub enum ConflictError {
    /// `start` while another session is active.
    #[error("A session for routine '{routine_id}' is already active")]
    SessionActive { routine_id: String },

    /// Session-mutating command with no active session.
    #[error("No active session")]
    NoActiveSession,

    /// Command requires a running session but it is paused.
    #[error("Session is not running")]
    NotRunning,

    /// `resume` on a session that is not paused.
    #[error("Session is not paused")]
    NotPaused,

    /// Command addressed to a completed or cancelled session.
    #[error("Session is in a terminal state")]
    SessionTerminal,

    /// `confirm`/`snooze` outside a confirm window.
    #[error("No confirm window is active")]
    NoConfirmWindow,

    /// Manual completion of an auto-advancing task.
    #[error("Task '{task_id}' auto-advances and cannot be completed manually")]
    AutoAdvanceTask { task_id: String },
}

/// Missing catalog entries, detected at start time.
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("Task '{0}' not found")]
    Task(String),

    #[error("Routine '{0}' not found")]
    Routine(String),
}

/// Storage-layer errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Failed to access data directory")]
    DataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Routine '{0}' not found")]
    RoutineNotFound(String),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for engine commands.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
