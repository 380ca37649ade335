//! Session control commands.
//!
//! Each command rehydrates the persisted session, applies exactly one
//! engine operation, persists the result, and prints a snapshot. The
//! engine's absolute-deadline model does the rest: however long ago the
//! previous command ran, the first tick after rehydration settles it.

use std::sync::Arc;

use clap::Subcommand;
use routinely_core::{StartOptions, Store};

use crate::common::{load_engine, persist, print_json};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a routine
    Start {
        /// Routine ID
        routine_id: String,
        /// Task IDs to pre-skip in this run
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,
        /// One-time queue order for this run
        #[arg(long, value_delimiter = ',')]
        order: Option<Vec<String>>,
    },
    /// Print the current session snapshot
    Status,
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// Skip the current task
    Skip,
    /// Complete the current task (manual/confirm modes)
    Complete,
    /// Confirm during an open confirm window
    Confirm,
    /// Extend an open confirm window
    Snooze {
        /// Seconds to add (defaults to the configured snooze)
        #[arg(long)]
        seconds: Option<u32>,
    },
    /// Shift the current task's deadline
    Adjust {
        /// Seconds to add (negative shortens)
        seconds: i64,
    },
    /// Cancel the session
    Cancel,
    /// Tick at 1 Hz in the foreground until the session finishes
    Watch,
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Store::open()?);
    let mut engine = load_engine(store.clone())?;

    let outcome: Result<(), Box<dyn std::error::Error>> = match action {
        SessionAction::Start {
            routine_id,
            skip,
            order,
        } => engine
            .start(
                &routine_id,
                StartOptions {
                    skip_task_ids: skip,
                    task_order: order,
                },
            )
            .map_err(Into::into),
        SessionAction::Status => Ok(()),
        SessionAction::Pause => engine.pause().map_err(Into::into),
        SessionAction::Resume => engine.resume().map_err(Into::into),
        SessionAction::Skip => engine.skip().map_err(Into::into),
        SessionAction::Complete => engine.complete_task().map_err(Into::into),
        SessionAction::Confirm => engine.confirm().map_err(Into::into),
        SessionAction::Snooze { seconds } => engine.snooze(seconds).map_err(Into::into),
        SessionAction::Adjust { seconds } => engine.adjust_time(seconds).map_err(Into::into),
        SessionAction::Cancel => engine.cancel().map_err(Into::into),
        SessionAction::Watch => {
            while engine.is_active() {
                engine.tick();
                persist(&mut engine, &store)?;
                let snapshot = engine.snapshot();
                if !snapshot.active {
                    break;
                }
                eprintln!(
                    "[{}] task {}/{} {:<24} {:>5}s remaining",
                    snapshot.status.label(),
                    snapshot.current_task_index + 1,
                    snapshot.total_tasks,
                    snapshot.current_task_name.as_deref().unwrap_or("-"),
                    snapshot.time_remaining_secs,
                );
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
            Ok(())
        }
    };

    // Persist whatever the settle tick and the command left behind, even
    // when the command itself was rejected.
    let snapshot = engine.snapshot();
    persist(&mut engine, &store)?;
    outcome?;
    print_json(&snapshot)?;
    Ok(())
}
