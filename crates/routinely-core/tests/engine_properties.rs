//! Property tests for the advancement policies.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use routinely_core::{
    AdvancementMode, EngineConfig, ExecutionEngine, ManualClock, MemoryCatalog, MemorySink,
    Routine, SessionStatus, StartOptions, Task, TaskStatus,
};

fn build_engine(
    durations: &[u32],
) -> (ExecutionEngine, Arc<ManualClock>, Arc<MemorySink>, String) {
    let mut catalog = MemoryCatalog::new();
    let mut routine = Routine::new("Generated");
    for &duration in durations {
        let task = Task::new(format!("task-{duration}"), duration, AdvancementMode::Auto);
        routine.task_ids.push(task.id.clone());
        catalog.insert_task(task);
    }
    let routine_id = routine.id.clone();
    catalog.insert_routine(routine);

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap(),
    ));
    let sink = Arc::new(MemorySink::new());
    let engine = ExecutionEngine::new(Arc::new(catalog), EngineConfig::default())
        .with_clock(clock.clone())
        .with_sink(sink.clone());
    (engine, clock, sink, routine_id)
}

proptest! {
    /// N auto tasks, ticked past every deadline in arbitrary strides,
    /// produce exactly N task_started + N task_completed events and one
    /// final routine_completed, with every slot completed.
    #[test]
    fn auto_routine_completes_exactly_once(
        durations in prop::collection::vec(1u32..120, 1..8),
        stride in 1i64..40,
    ) {
        let (mut engine, clock, sink, routine_id) = build_engine(&durations);
        engine.start(&routine_id, StartOptions::default()).unwrap();

        // Worst case: every task takes its full duration plus one stride
        // of observation latency.
        let horizon: i64 = durations.iter().map(|&d| i64::from(d) + stride).sum();
        let mut spent = 0;
        while spent <= horizon {
            clock.advance_secs(stride);
            engine.tick();
            spent += stride;
        }

        let session = engine.session().unwrap();
        prop_assert_eq!(session.status, SessionStatus::Completed);
        prop_assert!(session.task_states.iter().all(|t| t.status == TaskStatus::Completed));
        prop_assert!(session.task_states.iter().all(|t| t.was_auto_advanced));

        let events = sink.take();
        let count = |name: &str| events.iter().filter(|e| e.name() == name).count();
        prop_assert_eq!(count("task_started"), durations.len());
        prop_assert_eq!(count("task_completed"), durations.len());
        prop_assert_eq!(count("routine_completed"), 1);
        prop_assert_eq!(events.last().map(|e| e.name()), Some("routine_completed"));
    }

    /// Pausing for any interval never changes remaining time, to the
    /// second.
    #[test]
    fn pause_gap_never_leaks_into_remaining(
        duration in 60u32..3_600,
        run_for in 1i64..59,
        pause_for in 1i64..100_000,
    ) {
        let (mut engine, clock, _sink, routine_id) = build_engine(&[duration]);
        engine.start(&routine_id, StartOptions::default()).unwrap();

        clock.advance_secs(run_for);
        engine.tick();
        engine.pause().unwrap();
        let frozen = engine.snapshot().time_remaining_secs;
        prop_assert_eq!(frozen, i64::from(duration) - run_for);

        clock.advance_secs(pause_for);
        engine.resume().unwrap();
        prop_assert_eq!(engine.snapshot().time_remaining_secs, frozen);
        prop_assert_eq!(engine.snapshot().elapsed_secs, run_for as u64);
    }

    /// Negative adjustments apply fully or not at all.
    #[test]
    fn adjust_never_partially_applies(
        duration in 100u32..1_000,
        delta in -1_000i64..-1,
    ) {
        let (mut engine, clock, _sink, routine_id) = build_engine(&[duration]);
        engine.start(&routine_id, StartOptions::default()).unwrap();

        let before = engine.snapshot().time_remaining_secs;
        let result = engine.adjust_time(delta);
        let after = engine.snapshot().time_remaining_secs;
        if before > -delta {
            prop_assert!(result.is_ok());
            prop_assert_eq!(after, before + delta);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(after, before);
        }
        let _ = clock;
    }
}
