//! End-to-end session flows driven through simulated time.
//!
//! These exercise the full control surface against a manual clock: every
//! duration here is computed from absolute timestamps, so the tests jump
//! the clock around freely, including past several deadlines at once.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use routinely_core::{
    AdvancementMode, Catalog, ConflictError, EngineConfig, EngineError, ExecutionEngine,
    ManualClock, MemoryCatalog, MemorySink, Routine, SessionStatus, StartOptions, Task,
    TaskStatus, ValidationError,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap()
}

/// Catalog that can be edited while an engine holds it, to model
/// task/routine CRUD happening mid-session.
#[derive(Clone, Default)]
struct SharedCatalog(Arc<Mutex<MemoryCatalog>>);

impl SharedCatalog {
    fn insert_task(&self, task: Task) {
        self.0.lock().unwrap().insert_task(task);
    }

    fn insert_routine(&self, routine: Routine) {
        self.0.lock().unwrap().insert_routine(routine);
    }

    fn remove_task(&self, id: &str) {
        self.0.lock().unwrap().remove_task(id);
    }
}

impl Catalog for SharedCatalog {
    fn task(&self, id: &str) -> Option<Task> {
        self.0.lock().unwrap().task(id)
    }

    fn routine(&self, id: &str) -> Option<Routine> {
        self.0.lock().unwrap().routine(id)
    }
}

struct Fixture {
    engine: ExecutionEngine,
    clock: Arc<ManualClock>,
    sink: Arc<MemorySink>,
    catalog: SharedCatalog,
    routine_id: String,
    task_ids: Vec<String>,
}

fn fixture(tasks: Vec<Task>) -> Fixture {
    let catalog = SharedCatalog::default();
    let mut routine = Routine::new("Morning");
    let mut task_ids = Vec::new();
    for task in tasks {
        routine.task_ids.push(task.id.clone());
        task_ids.push(task.id.clone());
        catalog.insert_task(task);
    }
    let routine_id = routine.id.clone();
    catalog.insert_routine(routine);

    let clock = Arc::new(ManualClock::new(t0()));
    let sink = Arc::new(MemorySink::new());
    let engine = ExecutionEngine::new(Arc::new(catalog.clone()), EngineConfig::default())
        .with_clock(clock.clone())
        .with_sink(sink.clone());
    Fixture {
        engine,
        clock,
        sink,
        catalog,
        routine_id,
        task_ids,
    }
}

fn event_names(sink: &MemorySink) -> Vec<&'static str> {
    sink.take().iter().map(|e| e.name()).collect()
}

#[test]
fn all_auto_routine_runs_to_completion() {
    let mut f = fixture(vec![
        Task::new("A", 10, AdvancementMode::Auto),
        Task::new("B", 20, AdvancementMode::Auto),
        Task::new("C", 30, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    for _ in 0..3 {
        f.clock.advance_secs(31);
        f.engine.tick();
    }

    let names = event_names(&f.sink);
    assert_eq!(names.iter().filter(|n| **n == "task_started").count(), 3);
    assert_eq!(names.iter().filter(|n| **n == "task_completed").count(), 3);
    assert_eq!(*names.last().unwrap(), "routine_completed");

    let session = f.engine.session().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session
        .task_states
        .iter()
        .all(|t| t.status == TaskStatus::Completed && t.was_auto_advanced));
}

#[test]
fn pause_and_resume_preserve_remaining_time() {
    let mut f = fixture(vec![Task::new("A", 600, AdvancementMode::Auto)]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    f.clock.advance_secs(200);
    f.engine.tick();
    f.engine.pause().unwrap();
    let before = f.engine.snapshot().time_remaining_secs;
    assert_eq!(before, 400);

    // A long nap while paused changes nothing.
    f.clock.advance_secs(3_600);
    f.engine.tick();
    assert_eq!(f.engine.snapshot().time_remaining_secs, before);

    f.engine.resume().unwrap();
    assert_eq!(f.engine.snapshot().time_remaining_secs, before);

    // And elapsed time never counted the pause.
    assert_eq!(f.engine.snapshot().elapsed_secs, 200);
}

#[test]
fn adjust_time_is_all_or_nothing() {
    let mut f = fixture(vec![Task::new("A", 100, AdvancementMode::Auto)]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    f.clock.advance_secs(50);
    assert!(matches!(
        f.engine.adjust_time(-60).unwrap_err(),
        EngineError::Validation(ValidationError::AdjustOutOfRange { .. })
    ));
    assert_eq!(f.engine.snapshot().time_remaining_secs, 50);

    f.engine.adjust_time(-40).unwrap();
    assert_eq!(f.engine.snapshot().time_remaining_secs, 10);
}

#[test]
fn cancel_is_rejected_on_terminal_session() {
    let mut f = fixture(vec![Task::new("A", 60, AdvancementMode::Auto)]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();
    f.engine.cancel().unwrap();
    assert!(matches!(
        f.engine.cancel().unwrap_err(),
        EngineError::Conflict(ConflictError::SessionTerminal)
    ));
}

#[test]
fn confirm_window_snooze_extends_pending_deadline() {
    let mut f = fixture(vec![Task::new(
        "A",
        5,
        AdvancementMode::Confirm { window_secs: 10 },
    )]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();
    f.sink.take();

    // t=5: timer expires, confirm window opens.
    f.clock.advance_secs(5);
    f.engine.tick();
    let names = event_names(&f.sink);
    assert_eq!(names, vec!["task_awaiting_input"]);
    assert!(f.engine.snapshot().confirm_window_active);
    let state = f.engine.session().unwrap().current_state().unwrap().clone();
    assert_eq!(state.status, TaskStatus::Active);

    // t=6: snooze(30). Window deadline extends from t=15 to t=45.
    f.clock.advance_secs(1);
    f.engine.snooze(Some(30)).unwrap();

    // t=44: still waiting.
    f.clock.advance_secs(38);
    f.engine.tick();
    assert!(f.engine.snapshot().confirm_window_active);
    assert!(event_names(&f.sink).is_empty());

    // t=45: window elapses; auto-advance fires.
    f.clock.advance_secs(1);
    f.engine.tick();
    let names = event_names(&f.sink);
    assert_eq!(names, vec!["task_completed", "routine_completed"]);
    let session = f.engine.session().unwrap();
    assert!(session.task_states[0].was_auto_advanced);
}

#[test]
fn confirm_before_window_elapses_counts_as_user_action() {
    let mut f = fixture(vec![
        Task::new("A", 5, AdvancementMode::Confirm { window_secs: 10 }),
        Task::new("B", 5, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    assert!(matches!(
        f.engine.confirm().unwrap_err(),
        EngineError::Conflict(ConflictError::NoConfirmWindow)
    ));

    f.clock.advance_secs(6);
    f.engine.tick();
    f.engine.confirm().unwrap();

    let session = f.engine.session().unwrap();
    assert_eq!(session.task_states[0].status, TaskStatus::Completed);
    assert!(!session.task_states[0].was_auto_advanced);
    assert_eq!(session.current_task_index, 1);
}

#[test]
fn manual_task_blocks_until_completed() {
    let mut f = fixture(vec![
        Task::new("A", 10, AdvancementMode::Auto),
        Task::new("B", 5, AdvancementMode::Manual),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    f.clock.advance_secs(11);
    f.engine.tick();
    let session = f.engine.session().unwrap();
    assert_eq!(session.task_states[0].status, TaskStatus::Completed);
    assert!(session.task_states[0].was_auto_advanced);
    assert_eq!(session.current_task_index, 1);

    // B expires but stays active, deep into overtime.
    f.clock.advance_secs(600);
    f.engine.tick();
    let session = f.engine.session().unwrap();
    assert_eq!(session.task_states[1].status, TaskStatus::Active);
    assert!(f.engine.snapshot().time_remaining_secs < 0);

    f.engine.complete_task().unwrap();
    let session = f.engine.session().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(!session.task_states[1].was_auto_advanced);
}

#[test]
fn second_start_loses_deterministically() {
    let mut f = fixture(vec![Task::new("A", 60, AdvancementMode::Auto)]);
    let other = {
        let task = Task::new("X", 30, AdvancementMode::Auto);
        let mut routine = Routine::new("Evening");
        routine.task_ids.push(task.id.clone());
        let id = routine.id.clone();
        f.catalog.insert_task(task);
        f.catalog.insert_routine(routine);
        id
    };

    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();
    let err = f.engine.start(&other, StartOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::SessionActive { .. })
    ));
    // The first request's session survives.
    assert_eq!(f.engine.session().unwrap().routine_id, f.routine_id);
}

#[test]
fn pre_skipped_slots_never_activate() {
    let mut f = fixture(vec![
        Task::new("A", 10, AdvancementMode::Auto),
        Task::new("B", 10, AdvancementMode::Auto),
        Task::new("C", 10, AdvancementMode::Auto),
    ]);
    let skip = vec![f.task_ids[0].clone(), f.task_ids[2].clone()];
    f.engine
        .start(
            &f.routine_id,
            StartOptions {
                skip_task_ids: skip,
                task_order: None,
            },
        )
        .unwrap();

    // First active slot is B, the first non-pre-skipped one.
    let session = f.engine.session().unwrap();
    assert_eq!(session.current_task_index, 1);
    assert_eq!(session.task_states[0].status, TaskStatus::Skipped);
    assert!(session.task_states[0].started_at.is_none());

    f.clock.advance_secs(11);
    f.engine.tick();
    let session = f.engine.session().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.task_states[2].status, TaskStatus::Skipped);
}

#[test]
fn all_slots_pre_skipped_rejects_start() {
    let mut f = fixture(vec![Task::new("A", 10, AdvancementMode::Auto)]);
    let err = f
        .engine
        .start(
            &f.routine_id,
            StartOptions {
                skip_task_ids: f.task_ids.clone(),
                task_order: None,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::EmptyRoutine(_))
    ));
    assert!(f.engine.session().is_none());
}

#[test]
fn task_order_overrides_queue_for_one_run() {
    let mut f = fixture(vec![
        Task::new("A", 10, AdvancementMode::Auto),
        Task::new("B", 10, AdvancementMode::Auto),
    ]);
    f.engine
        .start(
            &f.routine_id,
            StartOptions {
                skip_task_ids: vec![],
                task_order: Some(vec![f.task_ids[1].clone(), f.task_ids[0].clone()]),
            },
        )
        .unwrap();

    let session = f.engine.session().unwrap();
    assert_eq!(session.task_ids, vec![f.task_ids[1].clone(), f.task_ids[0].clone()]);
    // The routine definition itself is untouched.
    let routine = f.catalog.routine(&f.routine_id).unwrap();
    assert_eq!(routine.task_ids, f.task_ids);
}

#[test]
fn task_ending_soon_fires_once_per_activation() {
    let mut f = fixture(vec![Task::new("A", 60, AdvancementMode::Manual)]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();
    f.sink.take();

    f.clock.advance_secs(52);
    f.engine.tick();
    assert_eq!(event_names(&f.sink), vec!["task_ending_soon"]);

    f.clock.advance_secs(3);
    f.engine.tick();
    assert!(event_names(&f.sink).is_empty());
}

#[test]
fn skip_records_actual_duration() {
    let mut f = fixture(vec![
        Task::new("A", 100, AdvancementMode::Auto),
        Task::new("B", 100, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    f.clock.advance_secs(30);
    f.engine.skip().unwrap();

    let session = f.engine.session().unwrap();
    assert_eq!(session.task_states[0].status, TaskStatus::Skipped);
    assert_eq!(session.task_states[0].actual_duration_secs, Some(30));
    assert_eq!(session.current_task_index, 1);
    // The next task starts with its full duration.
    assert_eq!(f.engine.snapshot().time_remaining_secs, 100);
}

#[test]
fn cancel_preserves_task_states() {
    let mut f = fixture(vec![
        Task::new("A", 10, AdvancementMode::Auto),
        Task::new("B", 10, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();
    f.clock.advance_secs(11);
    f.engine.tick();
    f.engine.cancel().unwrap();

    let session = f.engine.session().unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.task_states[0].status, TaskStatus::Completed);
    assert_eq!(session.task_states[1].status, TaskStatus::Active);
    assert!(session.completed_at.is_some());
}

#[test]
fn catalog_edits_do_not_reach_activated_tasks() {
    let mut f = fixture(vec![
        Task::new("A", 100, AdvancementMode::Auto),
        Task::new("B", 100, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    // Shrink A and B in the catalog while A is active.
    for id in &f.task_ids {
        let mut task = f.catalog.task(id).unwrap();
        task.duration_secs = 10;
        f.catalog.insert_task(task);
    }

    // A runs on its activation snapshot.
    f.clock.advance_secs(50);
    f.engine.tick();
    assert_eq!(f.engine.snapshot().time_remaining_secs, 50);

    // B activates later and picks up the new parameters.
    f.clock.advance_secs(51);
    f.engine.tick();
    let session = f.engine.session().unwrap();
    assert_eq!(session.current_task_index, 1);
    assert_eq!(session.task_states[1].duration_secs, Some(10));
}

#[test]
fn task_deleted_mid_session_drops_its_pending_slot() {
    let mut f = fixture(vec![
        Task::new("A", 10, AdvancementMode::Auto),
        Task::new("B", 10, AdvancementMode::Auto),
        Task::new("C", 10, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    f.catalog.remove_task(&f.task_ids[1]);

    f.clock.advance_secs(11);
    f.engine.tick();
    let session = f.engine.session().unwrap();
    // B never activated; C is running.
    assert_eq!(session.task_states[1].status, TaskStatus::Skipped);
    assert_eq!(session.current_task_index, 2);
    assert_eq!(session.task_states[2].status, TaskStatus::Active);
}

#[test]
fn hydrated_session_settles_downtime_on_next_tick() {
    let mut f = fixture(vec![
        Task::new("A", 60, AdvancementMode::Auto),
        Task::new("B", 600, AdvancementMode::Auto),
    ]);
    f.engine.start(&f.routine_id, StartOptions::default()).unwrap();

    f.clock.advance_secs(20);
    f.engine.tick();
    let persisted = serde_json::to_string(f.engine.session().unwrap()).unwrap();

    // "Restart": a fresh engine over the same catalog, long after the
    // first task's deadline passed.
    f.clock.advance_secs(300);
    let sink = Arc::new(MemorySink::new());
    let mut engine = ExecutionEngine::new(Arc::new(f.catalog.clone()), EngineConfig::default())
        .with_clock(f.clock.clone())
        .with_sink(sink.clone());
    engine.hydrate(serde_json::from_str(&persisted).unwrap()).unwrap();
    engine.tick();

    let session = engine.session().unwrap();
    assert_eq!(session.task_states[0].status, TaskStatus::Completed);
    assert!(session.task_states[0].was_auto_advanced);
    assert_eq!(session.current_task_index, 1);
    // B started at observation time with its full duration ahead.
    assert_eq!(engine.snapshot().time_remaining_secs, 600);

    let names: Vec<_> = sink.take().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["task_completed", "task_started"]);
}

#[test]
fn repeated_task_ids_get_distinct_slots() {
    let catalog = SharedCatalog::default();
    let task = Task::new("Reps", 10, AdvancementMode::Auto);
    let mut routine = Routine::new("Workout");
    routine.task_ids = vec![task.id.clone(), task.id.clone(), task.id.clone()];
    let routine_id = routine.id.clone();
    catalog.insert_task(task);
    catalog.insert_routine(routine);

    let clock = Arc::new(ManualClock::new(t0()));
    let mut engine = ExecutionEngine::new(Arc::new(catalog), EngineConfig::default())
        .with_clock(clock.clone());
    engine.start(&routine_id, StartOptions::default()).unwrap();

    for _ in 0..3 {
        clock.advance_secs(11);
        engine.tick();
    }
    let session = engine.session().unwrap();
    assert_eq!(session.task_states.len(), 3);
    assert!(session
        .task_states
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
    assert_eq!(session.status, SessionStatus::Completed);
}
