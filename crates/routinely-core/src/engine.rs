//! Routine execution engine.
//!
//! The engine is a wall-clock-based state machine. It does not own a
//! thread -- the caller drives it by invoking `tick()` on a roughly 1 Hz
//! cadence. All durations are computed from absolute timestamps
//! (activation time, deadlines), never from decrementing counters, so the
//! engine tolerates missed ticks, process suspension, and restarts: a
//! rehydrated session settles on its next tick.
//!
//! ## Session transitions
//!
//! ```text
//! (none) -> running <-> paused
//!           running -> completed
//!           running | paused -> cancelled
//! ```
//!
//! Every mutating operation takes `&mut self`, so command serialization is
//! enforced by the borrow checker. Callers sharing an engine across
//! threads wrap it in a `Mutex`; tick and user commands then never
//! interleave mid-transition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ConflictError, EngineError, NotFoundError, ValidationError};
use crate::events::{EngineEvent, EventSink, NullSink};
use crate::model::{AdvancementMode, Catalog};
use crate::session::{Session, SessionStatus, Snapshot, TaskStatus};

/// One-time review edit applied to the task queue at start.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Slots for these task ids are pre-marked skipped before execution.
    pub skip_task_ids: Vec<String>,
    /// Custom queue order; listed ids come first, unlisted routine tasks
    /// follow in their original order.
    pub task_order: Option<Vec<String>>,
}

/// Executes routines: owns the single active [`Session`], applies the
/// advancement-mode policy, and emits lifecycle events.
pub struct ExecutionEngine {
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
    session: Option<Session>,
}

impl ExecutionEngine {
    pub fn new(catalog: Arc<dyn Catalog>, config: EngineConfig) -> Self {
        Self {
            catalog,
            clock: Arc::new(SystemClock),
            sink: Arc::new(NullSink),
            config,
            session: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// True while a session is running or paused.
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.status.is_active())
    }

    /// Remove and return the session once it has reached a terminal state,
    /// so the caller can archive it.
    pub fn take_finished(&mut self) -> Option<Session> {
        if self
            .session
            .as_ref()
            .map_or(false, |s| s.status.is_terminal())
        {
            self.session.take()
        } else {
            None
        }
    }

    /// Pull-style view of the current execution state.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now();
        let Some(session) = &self.session else {
            return Snapshot::idle(now);
        };

        let (completed, skipped, total) = session.progress();
        let mut snapshot = Snapshot {
            active: session.status.is_active(),
            status: session.status,
            routine_id: Some(session.routine_id.clone()),
            routine_name: self
                .catalog
                .routine(&session.routine_id)
                .map(|r| r.name),
            current_task_index: session.current_task_index,
            current_task_id: None,
            current_task_name: None,
            current_task_duration_secs: 0,
            advancement_mode: None,
            time_remaining_secs: 0,
            elapsed_secs: session.elapsed_total_secs(now),
            tasks_completed: completed,
            tasks_skipped: skipped,
            total_tasks: total,
            progress_percent: 0,
            confirm_window_active: session.confirm_deadline.is_some(),
            started_at: Some(session.started_at),
            at: now,
        };

        let mut task_fraction = 0.0;
        if let Some(state) = session.current_state() {
            snapshot.current_task_id = Some(state.task_id.clone());
            snapshot.current_task_name = self.catalog.task(&state.task_id).map(|t| t.name);
            let duration = state.duration_secs.unwrap_or(0);
            snapshot.current_task_duration_secs = duration;
            snapshot.advancement_mode = state.mode.map(|m| m.label().to_string());

            let remaining = session.remaining_secs(now).unwrap_or(0);
            snapshot.time_remaining_secs = match session.confirm_remaining_secs(now) {
                Some(confirm) => confirm,
                // Auto tasks never show overtime; manual/confirm count up.
                None if state.mode.map_or(true, |m| m.is_auto()) => remaining.max(0),
                None => remaining,
            };
            if duration > 0 {
                let elapsed = (i64::from(duration) - remaining).max(0) as f64;
                task_fraction = (elapsed / f64::from(duration)).min(1.0);
            }
        }
        if total > 0 {
            snapshot.progress_percent =
                (((completed as f64 + task_fraction) / total as f64) * 100.0).round() as u8;
        }
        snapshot
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start executing a routine. Fails if a session is already active,
    /// the routine is unknown, or its task queue resolves to nothing
    /// runnable. No session is created on failure.
    pub fn start(&mut self, routine_id: &str, opts: StartOptions) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!(routine_id, "start requested");

        if let Some(active) = self.session.as_ref().filter(|s| s.status.is_active()) {
            warn!(
                requested = routine_id,
                active = %active.routine_id,
                "cannot start: another routine is active"
            );
            return Err(ConflictError::SessionActive {
                routine_id: active.routine_id.clone(),
            }
            .into());
        }

        let routine = self
            .catalog
            .routine(routine_id)
            .ok_or_else(|| NotFoundError::Routine(routine_id.to_string()))?;

        // Apply the one-time reorder, then drop slots whose task has been
        // deleted from the catalog since the routine was defined.
        let mut queue: Vec<String> = match &opts.task_order {
            Some(order) => {
                let mut queue: Vec<String> = order
                    .iter()
                    .filter(|id| routine.task_ids.contains(*id))
                    .cloned()
                    .collect();
                for id in &routine.task_ids {
                    if !order.contains(id) {
                        queue.push(id.clone());
                    }
                }
                queue
            }
            None => routine.task_ids.clone(),
        };
        queue.retain(|id| {
            let known = self.catalog.task(id).is_some();
            if !known {
                warn!(task_id = %id, "task missing from catalog; dropping queue slot");
            }
            known
        });

        if queue.is_empty() {
            return Err(ValidationError::EmptyRoutine(routine_id.to_string()).into());
        }

        let mut session = Session::new(routine_id, queue, now);
        for state in session.task_states.iter_mut() {
            if opts.skip_task_ids.contains(&state.task_id) {
                state.status = TaskStatus::Skipped;
                state.skipped_at = Some(now);
            }
        }
        if session.task_states.iter().all(|s| s.status == TaskStatus::Skipped) {
            return Err(ValidationError::EmptyRoutine(routine_id.to_string()).into());
        }

        let estimated_duration_secs: u64 = session
            .task_states
            .iter()
            .filter(|s| s.status != TaskStatus::Skipped)
            .filter_map(|s| self.catalog.task(&s.task_id))
            .map(|t| u64::from(t.duration_secs))
            .sum();
        let total_tasks = session.runnable_count();
        let skipped_tasks = session.task_states.len() - total_tasks;

        session.status = SessionStatus::Running;
        session.running_since = Some(now);
        self.session = Some(session);

        self.sink.publish(EngineEvent::RoutineStarted {
            routine_id: routine_id.to_string(),
            routine_name: routine.name.clone(),
            total_tasks,
            skipped_tasks,
            estimated_duration_secs,
            at: now,
        });
        self.activate_from_current(now);

        info!(
            routine_id,
            name = %routine.name,
            total_tasks,
            skipped_tasks,
            estimated_duration_secs,
            "routine started"
        );
        Ok(())
    }

    /// Freeze the running session. Remaining time and elapsed time stop
    /// moving until `resume`.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!("pause requested");
        let session = match self.session.as_mut() {
            Some(s) if s.status == SessionStatus::Running => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            Some(_) => return Err(ConflictError::NotRunning.into()),
            None => return Err(ConflictError::NoActiveSession.into()),
        };

        if let Some(since) = session.running_since.take() {
            session.elapsed_secs += (now - since).num_seconds().max(0) as u64;
        }
        session.status = SessionStatus::Paused;
        session.paused_at = Some(now);

        let event = EngineEvent::RoutinePaused {
            routine_id: session.routine_id.clone(),
            at: now,
        };
        let elapsed = session.elapsed_secs;
        self.sink.publish(event);
        info!(elapsed_secs = elapsed, "routine paused");
        Ok(())
    }

    /// Resume a paused session. Deadlines shift forward by the pause gap,
    /// so remaining time is exactly what it was at `pause`.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!("resume requested");
        let session = match self.session.as_mut() {
            Some(s) if s.status == SessionStatus::Paused => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            Some(_) => return Err(ConflictError::NotPaused.into()),
            None => return Err(ConflictError::NoActiveSession.into()),
        };

        let paused_at = session.paused_at.take().unwrap_or(now);
        let gap = now - paused_at;
        if let Some(deadline) = session.deadline {
            session.deadline = Some(deadline + gap);
        }
        if let Some(deadline) = session.confirm_deadline {
            session.confirm_deadline = Some(deadline + gap);
        }
        session.status = SessionStatus::Running;
        session.running_since = Some(now);

        let event = EngineEvent::RoutineResumed {
            routine_id: session.routine_id.clone(),
            at: now,
        };
        self.sink.publish(event);
        info!(paused_secs = gap.num_seconds(), "routine resumed");
        Ok(())
    }

    /// Skip the current task and advance.
    pub fn skip(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!("skip requested");
        let session = match self.session.as_mut() {
            Some(s) if s.status.is_active() => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            _ => return Err(ConflictError::NoActiveSession.into()),
        };

        let remaining = session.remaining_secs(now).unwrap_or(0);
        let idx = session.current_task_index;
        let Some(state) = session.task_states.get_mut(idx) else {
            return Err(ConflictError::NoActiveSession.into());
        };
        let duration = state.duration_secs.unwrap_or(0);
        state.status = TaskStatus::Skipped;
        state.skipped_at = Some(now);
        state.actual_duration_secs = Some((i64::from(duration) - remaining).max(0) as u32);
        let task_id = state.task_id.clone();

        let event = EngineEvent::TaskSkipped {
            routine_id: session.routine_id.clone(),
            task_id: task_id.clone(),
            task_index: idx,
            at: now,
        };
        self.sink.publish(event);
        info!(task_id = %task_id, task_index = idx, "task skipped");

        self.advance(now);
        Ok(())
    }

    /// Manually complete the current task. Auto-advancing tasks are
    /// rejected; their lifecycle belongs to the timer.
    pub fn complete_task(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!("complete task requested");
        let session = match self.session.as_ref() {
            Some(s) if s.status.is_active() => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            _ => return Err(ConflictError::NoActiveSession.into()),
        };

        if let Some(state) = session.current_state() {
            if state.mode.map_or(false, |m| m.is_auto()) {
                return Err(ConflictError::AutoAdvanceTask {
                    task_id: state.task_id.clone(),
                }
                .into());
            }
        }
        self.complete_current(false, now);
        Ok(())
    }

    /// Confirm completion during an open confirm window.
    pub fn confirm(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!("confirm requested");
        match self.session.as_ref() {
            Some(s) if s.status.is_active() && s.confirm_deadline.is_some() => {}
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            Some(_) => return Err(ConflictError::NoConfirmWindow.into()),
            None => return Err(ConflictError::NoActiveSession.into()),
        }
        self.complete_current(false, now);
        Ok(())
    }

    /// Extend an open confirm window. The extension is added to the
    /// pending window deadline, not measured from the call time; the task
    /// timer itself does not restart.
    pub fn snooze(&mut self, secs: Option<u32>) -> Result<(), EngineError> {
        let secs = secs.unwrap_or(self.config.default_snooze_secs);
        debug!(secs, "snooze requested");
        let session = match self.session.as_mut() {
            Some(s) if s.status.is_active() => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            _ => return Err(ConflictError::NoActiveSession.into()),
        };
        let Some(deadline) = session.confirm_deadline else {
            return Err(ConflictError::NoConfirmWindow.into());
        };
        session.confirm_deadline = Some(deadline + Duration::seconds(i64::from(secs)));
        info!(added_secs = secs, "confirm window snoozed");
        Ok(())
    }

    /// Shift the active task's deadline by `delta_secs`. Extending is
    /// unbounded; shortening must leave some time on the clock, otherwise
    /// the command is rejected with no partial effect.
    pub fn adjust_time(&mut self, delta_secs: i64) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!(delta_secs, "adjust time requested");
        let session = match self.session.as_mut() {
            Some(s) if s.status.is_active() => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            _ => return Err(ConflictError::NoActiveSession.into()),
        };
        let Some(deadline) = session.deadline else {
            return Err(ConflictError::NoActiveSession.into());
        };

        let remaining = session.remaining_secs(now).unwrap_or(0);
        if delta_secs < 0 && remaining <= -delta_secs {
            return Err(ValidationError::AdjustOutOfRange {
                delta: delta_secs,
                remaining,
            }
            .into());
        }

        session.deadline = Some(deadline + Duration::seconds(delta_secs));
        // Extending past "now" puts an expired task back on the clock.
        if session.remaining_secs(now).unwrap_or(0) > 0 {
            session.confirm_deadline = None;
            session.timer_expired = false;
        }
        info!(
            delta_secs,
            remaining_secs = session.remaining_secs(now).unwrap_or(0),
            "task time adjusted"
        );
        Ok(())
    }

    /// Cancel the session. Task states are preserved as they stand.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        debug!("cancel requested");
        let session = match self.session.as_mut() {
            Some(s) if s.status.is_active() => s,
            Some(s) if s.status.is_terminal() => return Err(ConflictError::SessionTerminal.into()),
            _ => return Err(ConflictError::NoActiveSession.into()),
        };

        if let Some(since) = session.running_since.take() {
            session.elapsed_secs += (now - since).num_seconds().max(0) as u64;
        }
        session.status = SessionStatus::Cancelled;
        session.completed_at = Some(now);
        session.paused_at = None;
        session.deadline = None;
        session.confirm_deadline = None;

        let event = EngineEvent::RoutineCancelled {
            routine_id: session.routine_id.clone(),
            at: now,
        };
        let elapsed = session.elapsed_secs;
        self.sink.publish(event);
        info!(elapsed_secs = elapsed, "routine cancelled");
        Ok(())
    }

    /// Advance the clock. Call on a ~1 Hz cadence; the engine computes
    /// everything from timestamps, so late or missed calls are harmless.
    /// Never returns an error -- a tick must not be able to kill the
    /// driving loop.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.status {
            SessionStatus::Running => {}
            SessionStatus::Paused | SessionStatus::Pending => return,
            SessionStatus::Completed | SessionStatus::Cancelled => {
                warn!("tick on terminal session; caller should stop its clock");
                return;
            }
        }

        // An open confirm window freezes advancement until it is
        // confirmed, snoozed, or runs out.
        if let Some(deadline) = session.confirm_deadline {
            if now >= deadline {
                self.complete_current(true, now);
            }
            return;
        }

        let Some(remaining) = session.remaining_secs(now) else {
            return;
        };

        let warning = i64::from(self.config.task_ending_warning_secs);
        if !session.ending_soon_fired && remaining > 0 && remaining <= warning {
            session.ending_soon_fired = true;
            let idx = session.current_task_index;
            if let Some(state) = session.current_state() {
                let event = EngineEvent::TaskEndingSoon {
                    routine_id: session.routine_id.clone(),
                    task_id: state.task_id.clone(),
                    task_index: idx,
                    remaining_secs: remaining,
                    at: now,
                };
                self.sink.publish(event);
            }
        }

        if remaining <= 0 && !session.timer_expired {
            session.timer_expired = true;
            let idx = session.current_task_index;
            let mode = session
                .current_state()
                .and_then(|s| s.mode)
                .unwrap_or(AdvancementMode::Auto);
            match mode {
                AdvancementMode::Auto => {
                    self.complete_current(true, now);
                }
                AdvancementMode::Manual => {
                    if let Some(state) = session.current_state() {
                        let event = EngineEvent::TaskAwaitingInput {
                            routine_id: session.routine_id.clone(),
                            task_id: state.task_id.clone(),
                            task_index: idx,
                            advancement_mode: mode.label().to_string(),
                            confirm_window_secs: None,
                            at: now,
                        };
                        self.sink.publish(event);
                    }
                }
                AdvancementMode::Confirm { window_secs } => {
                    session.confirm_deadline =
                        Some(now + Duration::seconds(i64::from(window_secs)));
                    if let Some(state) = session.current_state() {
                        let event = EngineEvent::TaskAwaitingInput {
                            routine_id: session.routine_id.clone(),
                            task_id: state.task_id.clone(),
                            task_index: idx,
                            advancement_mode: mode.label().to_string(),
                            confirm_window_secs: Some(window_secs),
                            at: now,
                        };
                        self.sink.publish(event);
                    }
                }
            }
        }
    }

    /// Install a previously persisted session, e.g. after a restart.
    /// Absolute deadlines mean the next `tick` settles any time that
    /// passed while the process was down.
    pub fn hydrate(&mut self, session: Session) -> Result<(), EngineError> {
        if self.is_active() {
            let routine_id = self
                .session
                .as_ref()
                .map(|s| s.routine_id.clone())
                .unwrap_or_default();
            return Err(ConflictError::SessionActive { routine_id }.into());
        }
        if !session.status.is_active() {
            return Err(ConflictError::SessionTerminal.into());
        }
        debug!(session_id = %session.id, routine_id = %session.routine_id, "session hydrated");
        self.session = Some(session);
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Complete the current task and advance.
    fn complete_current(&mut self, auto_advanced: bool, now: DateTime<Utc>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let remaining = session.remaining_secs(now).unwrap_or(0);
        let idx = session.current_task_index;
        let Some(state) = session.task_states.get_mut(idx) else {
            return;
        };
        let duration = state.duration_secs.unwrap_or(0);
        state.status = TaskStatus::Completed;
        state.completed_at = Some(now);
        state.was_auto_advanced = auto_advanced;
        let actual = (i64::from(duration) - remaining).max(0) as u32;
        state.actual_duration_secs = Some(actual);
        let task_id = state.task_id.clone();
        session.confirm_deadline = None;

        let event = EngineEvent::TaskCompleted {
            routine_id: session.routine_id.clone(),
            task_id: task_id.clone(),
            task_index: idx,
            was_auto_advanced: auto_advanced,
            actual_duration_secs: actual,
            at: now,
        };
        self.sink.publish(event);
        debug!(
            task_id = %task_id,
            auto_advanced,
            actual_duration_secs = actual,
            "task completed"
        );

        self.advance(now);
    }

    fn advance(&mut self, now: DateTime<Utc>) {
        if let Some(session) = self.session.as_mut() {
            session.current_task_index += 1;
        }
        self.activate_from_current(now);
    }

    /// Activate the slot at the current index, stepping over pre-skipped
    /// slots (and slots whose task has vanished from the catalog), or
    /// complete the routine when the queue is exhausted.
    fn activate_from_current(&mut self, now: DateTime<Utc>) {
        loop {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            let idx = session.current_task_index;
            let Some(state) = session.task_states.get(idx) else {
                break;
            };
            if state.status == TaskStatus::Skipped {
                session.current_task_index += 1;
                continue;
            }
            let task_id = state.task_id.clone();
            match self.catalog.task(&task_id) {
                None => {
                    // Deleted mid-session before this slot ever activated;
                    // nothing was snapshotted, so the slot is dropped.
                    warn!(task_id = %task_id, "task missing from catalog at activation; dropping slot");
                    if let Some(state) = session.task_states.get_mut(idx) {
                        state.status = TaskStatus::Skipped;
                        state.skipped_at = Some(now);
                    }
                    session.current_task_index += 1;
                }
                Some(task) => {
                    if let Some(state) = session.task_states.get_mut(idx) {
                        state.status = TaskStatus::Active;
                        state.started_at = Some(now);
                        state.duration_secs = Some(task.duration_secs);
                        state.mode = Some(task.mode);
                    }
                    session.deadline =
                        Some(now + Duration::seconds(i64::from(task.duration_secs)));
                    session.confirm_deadline = None;
                    session.ending_soon_fired = false;
                    session.timer_expired = false;
                    if session.status == SessionStatus::Paused {
                        // The freeze point moves with the fresh activation
                        // so resume shifts the new deadline correctly.
                        session.paused_at = Some(now);
                    }
                    let event = EngineEvent::TaskStarted {
                        routine_id: session.routine_id.clone(),
                        task_id: task.id.clone(),
                        task_index: idx,
                        duration_secs: task.duration_secs,
                        advancement_mode: task.mode.label().to_string(),
                        at: now,
                    };
                    self.sink.publish(event);
                    info!(
                        task_id = %task.id,
                        task_index = idx,
                        duration_secs = task.duration_secs,
                        mode = task.mode.label(),
                        "task started"
                    );
                    return;
                }
            }
        }
        self.complete_routine(now);
    }

    fn complete_routine(&mut self, now: DateTime<Utc>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(since) = session.running_since.take() {
            session.elapsed_secs += (now - since).num_seconds().max(0) as u64;
        }
        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        session.paused_at = None;
        session.deadline = None;
        session.confirm_deadline = None;

        let (completed, skipped, _) = session.progress();
        let event = EngineEvent::RoutineCompleted {
            routine_id: session.routine_id.clone(),
            tasks_completed: completed,
            tasks_skipped: skipped,
            total_duration_secs: session.elapsed_secs,
            at: now,
        };
        let elapsed = session.elapsed_secs;
        self.sink.publish(event);
        info!(
            tasks_completed = completed,
            tasks_skipped = skipped,
            total_duration_secs = elapsed,
            "routine completed"
        );
    }
}
