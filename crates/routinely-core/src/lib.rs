//! # Routinely Core Library
//!
//! Core business logic for Routinely, a guided-routine timer: an ordered
//! sequence of timed tasks is executed as a session that advances
//! automatically, manually, or through a confirm-then-auto-advance window.
//!
//! ## Architecture
//!
//! - **Execution engine**: a wall-clock-based state machine that requires
//!   the caller to periodically invoke `tick()`; all durations derive from
//!   absolute timestamps, so missed ticks and process restarts are
//!   tolerated by construction
//! - **Catalog**: read-only task/routine definitions, behind a trait so
//!   storage and tests plug in interchangeably
//! - **Storage**: SQLite catalog persistence, session history, and the
//!   crash-recovery snapshot of the active session
//! - **Events**: lifecycle events pushed fire-and-forget into an
//!   [`EventSink`]
//!
//! ## Key Components
//!
//! - [`ExecutionEngine`]: session state machine and advancement policies
//! - [`Session`] / [`TaskState`]: the one mutable entity and its per-slot
//!   records
//! - [`Store`]: catalog, history, and session persistence
//! - [`Config`]: TOML application configuration

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, EngineConfig};
pub use engine::{ExecutionEngine, StartOptions};
pub use error::{
    ConfigError, ConflictError, EngineError, NotFoundError, StorageError, ValidationError,
};
pub use events::{EngineEvent, EventSink, MemorySink, NullSink};
pub use model::{AdvancementMode, Catalog, MemoryCatalog, Routine, Task};
pub use session::{Session, SessionHistory, SessionStatus, Snapshot, TaskState, TaskStatus};
pub use storage::Store;
