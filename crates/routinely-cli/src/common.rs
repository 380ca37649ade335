//! Shared plumbing for session commands: engine construction, the
//! persist-after-every-transition rule, and event printing.

use std::sync::Arc;

use routinely_core::{
    Config, EngineEvent, EventSink, ExecutionEngine, Session, SessionHistory, Store,
};

/// Prints each engine event to stderr as a JSON line, keeping stdout free
/// for command output.
pub struct JsonLineSink;

impl EventSink for JsonLineSink {
    fn publish(&self, event: EngineEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
        }
    }
}

/// Build an engine over the store, rehydrate any persisted session, and
/// settle time that passed while no process was running.
pub fn load_engine(store: Arc<Store>) -> Result<ExecutionEngine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut engine = ExecutionEngine::new(store.clone(), config.engine)
        .with_sink(Arc::new(JsonLineSink));
    if let Some(session) = store.load_session()? {
        if session.status.is_active() {
            engine.hydrate(session)?;
            engine.tick();
        } else {
            // Stale terminal snapshot, e.g. a crash between archiving steps.
            store.clear_session()?;
        }
    }
    Ok(engine)
}

/// Persist the engine's session state after a command: active sessions are
/// rewritten, finished ones are archived to history and cleared.
pub fn persist(engine: &mut ExecutionEngine, store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(finished) = engine.take_finished() {
        archive(&finished, store)?;
        return Ok(());
    }
    if let Some(session) = engine.session() {
        store.save_session(session)?;
    }
    Ok(())
}

fn archive(session: &Session, store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    let routine_name = store
        .get_routine(&session.routine_id)?
        .map(|r| r.name)
        .unwrap_or_default();
    store.add_history(&SessionHistory::from_session(session, routine_name))?;
    store.clear_session()?;
    Ok(())
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
