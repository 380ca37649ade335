//! Lifecycle events emitted by the engine.
//!
//! Every accepted state transition produces an [`EngineEvent`] pushed into
//! an [`EventSink`]. Emission is fire-and-forget: the sink returns nothing
//! and must not block, so delivery can never delay or veto a transition.
//! Consumers are assumed idempotent; events are ordered by emission time.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    RoutineStarted {
        routine_id: String,
        routine_name: String,
        total_tasks: usize,
        skipped_tasks: usize,
        estimated_duration_secs: u64,
        at: DateTime<Utc>,
    },
    RoutinePaused {
        routine_id: String,
        at: DateTime<Utc>,
    },
    RoutineResumed {
        routine_id: String,
        at: DateTime<Utc>,
    },
    RoutineCompleted {
        routine_id: String,
        tasks_completed: usize,
        tasks_skipped: usize,
        total_duration_secs: u64,
        at: DateTime<Utc>,
    },
    RoutineCancelled {
        routine_id: String,
        at: DateTime<Utc>,
    },
    TaskStarted {
        routine_id: String,
        task_id: String,
        task_index: usize,
        duration_secs: u32,
        advancement_mode: String,
        at: DateTime<Utc>,
    },
    /// Fired once per activation when remaining time first crosses the
    /// configured warning threshold.
    TaskEndingSoon {
        routine_id: String,
        task_id: String,
        task_index: usize,
        remaining_secs: i64,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        routine_id: String,
        task_id: String,
        task_index: usize,
        was_auto_advanced: bool,
        actual_duration_secs: u32,
        at: DateTime<Utc>,
    },
    TaskSkipped {
        routine_id: String,
        task_id: String,
        task_index: usize,
        at: DateTime<Utc>,
    },
    /// A manual task ran out of time, or a confirm window opened.
    TaskAwaitingInput {
        routine_id: String,
        task_id: String,
        task_index: usize,
        advancement_mode: String,
        confirm_window_secs: Option<u32>,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event name as it appears on the wire (`routine_started`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::RoutineStarted { .. } => "routine_started",
            EngineEvent::RoutinePaused { .. } => "routine_paused",
            EngineEvent::RoutineResumed { .. } => "routine_resumed",
            EngineEvent::RoutineCompleted { .. } => "routine_completed",
            EngineEvent::RoutineCancelled { .. } => "routine_cancelled",
            EngineEvent::TaskStarted { .. } => "task_started",
            EngineEvent::TaskEndingSoon { .. } => "task_ending_soon",
            EngineEvent::TaskCompleted { .. } => "task_completed",
            EngineEvent::TaskSkipped { .. } => "task_skipped",
            EngineEvent::TaskAwaitingInput { .. } => "task_awaiting_input",
        }
    }
}

/// Receives engine events. Implementations deliver them however they like
/// (notifications, UI updates, logs); the engine does not know delivery
/// mechanics and never waits on them.
pub trait EventSink {
    fn publish(&self, event: EngineEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: EngineEvent) {}
}

/// Buffers events in memory, in emission order. Handy for tests and for
/// pull-style consumers that drain periodically.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all buffered events.
    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock().expect("sink lock poisoned"))
    }

    /// Copy of the buffered events without draining.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().expect("sink lock poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: EngineEvent) {
        self.events.lock().expect("sink lock poisoned").push(event);
    }
}
