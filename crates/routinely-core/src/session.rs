//! Session state: the one mutable entity in the system.
//!
//! A [`Session`] is created by `start`, mutated only by engine operations,
//! and kept as a read-only record once terminal. Everything in it is
//! serializable so the whole object can be persisted on every transition
//! and rehydrated after a restart; deadlines are absolute timestamps, so
//! time that passed while the process was down falls out of the arithmetic
//! on the next tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, AdvancementMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Running or paused: the session still accepts commands.
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Lowercase name, matching the serialized form.
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Skipped,
}

/// Per-slot execution record. A task repeated in the routine gets one
/// `TaskState` per occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub actual_duration_secs: Option<u32>,
    #[serde(default)]
    pub was_auto_advanced: bool,
    /// Duration snapshotted from the catalog at activation. Catalog edits
    /// after activation do not reach this slot.
    pub duration_secs: Option<u32>,
    /// Advancement mode snapshotted at activation.
    pub mode: Option<AdvancementMode>,
}

impl TaskState {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            skipped_at: None,
            actual_duration_secs: None,
            was_auto_advanced: false,
            duration_secs: None,
            mode: None,
        }
    }

    /// Pre-skipped during the review step: skipped without ever starting.
    pub fn pre_skipped(&self) -> bool {
        self.status == TaskStatus::Skipped && self.started_at.is_none()
    }
}

/// One in-progress (or terminal) execution of a routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub routine_id: String,
    pub status: SessionStatus,
    pub current_task_index: usize,
    /// Queue order after the one-time review edit (reorder/skip) at start.
    pub task_ids: Vec<String>,
    pub task_states: Vec<TaskState>,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Accumulated running time, flushed on pause and on terminal
    /// transitions. Excludes paused intervals.
    pub elapsed_secs: u64,
    /// When the current running stretch began; `None` unless running.
    pub running_since: Option<DateTime<Utc>>,
    /// Absolute due time of the active task.
    pub deadline: Option<DateTime<Utc>>,
    /// Absolute due time of the confirm window, when the active task is in
    /// the confirm sub-state.
    pub confirm_deadline: Option<DateTime<Utc>>,
    /// Latch: `task_ending_soon` fired for the current activation.
    #[serde(default)]
    pub ending_soon_fired: bool,
    /// Latch: the active task's timer already expired and the advancement
    /// policy has been applied.
    #[serde(default)]
    pub timer_expired: bool,
}

impl Session {
    pub fn new(routine_id: impl Into<String>, task_ids: Vec<String>, now: DateTime<Utc>) -> Self {
        let task_states = task_ids.iter().map(TaskState::pending).collect();
        Self {
            id: generate_id(),
            routine_id: routine_id.into(),
            status: SessionStatus::Pending,
            current_task_index: 0,
            task_ids,
            task_states,
            started_at: now,
            paused_at: None,
            completed_at: None,
            elapsed_secs: 0,
            running_since: None,
            deadline: None,
            confirm_deadline: None,
            ending_soon_fired: false,
            timer_expired: false,
        }
    }

    pub fn current_state(&self) -> Option<&TaskState> {
        self.task_states.get(self.current_task_index)
    }

    pub fn current_state_mut(&mut self) -> Option<&mut TaskState> {
        self.task_states.get_mut(self.current_task_index)
    }

    /// The instant "now" freezes at while paused.
    pub fn effective_now(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match (self.status, self.paused_at) {
            (SessionStatus::Paused, Some(at)) => at,
            _ => now,
        }
    }

    /// Remaining seconds on the active task. Negative while a manual task
    /// runs into overtime.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let deadline = self.deadline?;
        Some((deadline - self.effective_now(now)).num_seconds())
    }

    /// Remaining seconds on the confirm window, if one is open.
    pub fn confirm_remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let deadline = self.confirm_deadline?;
        Some((deadline - self.effective_now(now)).num_seconds())
    }

    /// Total active running time including the current stretch.
    pub fn elapsed_total_secs(&self, now: DateTime<Utc>) -> u64 {
        let current = self
            .running_since
            .map(|since| (now - since).num_seconds().max(0) as u64)
            .unwrap_or(0);
        self.elapsed_secs + current
    }

    /// (completed, skipped, total) slot counts.
    pub fn progress(&self) -> (usize, usize, usize) {
        let completed = self
            .task_states
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let skipped = self
            .task_states
            .iter()
            .filter(|t| t.status == TaskStatus::Skipped)
            .count();
        (completed, skipped, self.task_states.len())
    }

    /// Slots that were not pre-skipped in the review step.
    pub fn runnable_count(&self) -> usize {
        self.task_states.iter().filter(|t| !t.pre_skipped()).count()
    }
}

/// Read-only view of the current execution state, for UIs and the CLI.
/// Pull-style: callers fetch a fresh snapshot whenever they redraw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub active: bool,
    pub status: SessionStatus,
    pub routine_id: Option<String>,
    pub routine_name: Option<String>,
    pub current_task_index: usize,
    pub current_task_id: Option<String>,
    pub current_task_name: Option<String>,
    pub current_task_duration_secs: u32,
    pub advancement_mode: Option<String>,
    /// Negative while a manual task is in overtime. While a confirm window
    /// is open this is the window's remaining time.
    pub time_remaining_secs: i64,
    pub elapsed_secs: u64,
    pub tasks_completed: usize,
    pub tasks_skipped: usize,
    pub total_tasks: usize,
    pub progress_percent: u8,
    pub confirm_window_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl Snapshot {
    /// Snapshot representing "no session".
    pub fn idle(at: DateTime<Utc>) -> Self {
        Self {
            active: false,
            status: SessionStatus::Pending,
            routine_id: None,
            routine_name: None,
            current_task_index: 0,
            current_task_id: None,
            current_task_name: None,
            current_task_duration_secs: 0,
            advancement_mode: None,
            time_remaining_secs: 0,
            elapsed_secs: 0,
            tasks_completed: 0,
            tasks_skipped: 0,
            total_tasks: 0,
            progress_percent: 0,
            confirm_window_active: false,
            started_at: None,
            at,
        }
    }
}

/// Archived record of a finished session, kept in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
    pub id: String,
    pub routine_id: String,
    pub routine_name: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_duration_secs: u64,
    pub tasks_completed: usize,
    pub tasks_skipped: usize,
    pub total_tasks: usize,
}

impl SessionHistory {
    /// Build a history record from a terminal session.
    pub fn from_session(session: &Session, routine_name: impl Into<String>) -> Self {
        let (completed, skipped, total) = session.progress();
        Self {
            id: session.id.clone(),
            routine_id: session.routine_id.clone(),
            routine_name: routine_name.into(),
            status: session.status,
            started_at: session.started_at,
            completed_at: session.completed_at.unwrap_or(session.started_at),
            total_duration_secs: session.elapsed_secs,
            tasks_completed: completed,
            tasks_skipped: skipped,
            total_tasks: total,
        }
    }
}
