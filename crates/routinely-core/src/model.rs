//! Catalog data model: tasks, routines, advancement modes.
//!
//! Catalog entries are immutable as far as the engine is concerned --
//! editing a task never reaches into a session that already snapshotted it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_TASK_DURATION_SECS: u32 = 1;
pub const MAX_TASK_DURATION_SECS: u32 = 86_400;
pub const MIN_CONFIRM_WINDOW_SECS: u32 = 5;
pub const MAX_CONFIRM_WINDOW_SECS: u32 = 300;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

pub const DEFAULT_CONFIRM_WINDOW_SECS: u32 = 30;

/// Generate a fresh catalog/session id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// What happens when a task's timer reaches zero.
///
/// The confirm window rides inside the variant so a confirm-mode task
/// without a window cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AdvancementMode {
    /// Complete and advance immediately.
    Auto,
    /// Stay active until the user acts; remaining time counts into overtime.
    Manual,
    /// Bounded window in which the user may confirm or snooze before the
    /// task auto-advances anyway.
    Confirm { window_secs: u32 },
}

impl AdvancementMode {
    pub fn is_auto(self) -> bool {
        matches!(self, AdvancementMode::Auto)
    }

    /// Short name for event payloads and display.
    pub fn label(self) -> &'static str {
        match self {
            AdvancementMode::Auto => "auto",
            AdvancementMode::Manual => "manual",
            AdvancementMode::Confirm { .. } => "confirm",
        }
    }
}

/// A single timed task, referenced by routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Duration in seconds.
    pub duration_secs: u32,
    #[serde(default = "default_task_icon")]
    pub icon: String,
    #[serde(flatten)]
    pub mode: AdvancementMode,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_task_icon() -> String {
    "mdi:checkbox-marked-circle-outline".into()
}

impl Task {
    pub fn new(name: impl Into<String>, duration_secs: u32, mode: AdvancementMode) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: name.into(),
            duration_secs,
            icon: default_task_icon(),
            mode,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the task against catalog limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong {
                len: self.name.chars().count(),
                max: MAX_NAME_LEN,
            });
        }
        if let Some(desc) = &self.description {
            if desc.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(ValidationError::DescriptionTooLong {
                    len: desc.chars().count(),
                    max: MAX_DESCRIPTION_LEN,
                });
            }
        }
        if !(MIN_TASK_DURATION_SECS..=MAX_TASK_DURATION_SECS).contains(&self.duration_secs) {
            return Err(ValidationError::DurationOutOfRange {
                secs: self.duration_secs,
                min: MIN_TASK_DURATION_SECS,
                max: MAX_TASK_DURATION_SECS,
            });
        }
        if let AdvancementMode::Confirm { window_secs } = self.mode {
            if !(MIN_CONFIRM_WINDOW_SECS..=MAX_CONFIRM_WINDOW_SECS).contains(&window_secs) {
                return Err(ValidationError::ConfirmWindowOutOfRange {
                    secs: window_secs,
                    min: MIN_CONFIRM_WINDOW_SECS,
                    max: MAX_CONFIRM_WINDOW_SECS,
                });
            }
        }
        Ok(())
    }
}

/// An ordered collection of task references. Repeats are allowed; each
/// occurrence becomes its own queue slot in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub id: String,
    pub name: String,
    #[serde(default = "default_routine_icon")]
    pub icon: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_routine_icon() -> String {
    "mdi:playlist-check".into()
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: name.into(),
            icon: default_routine_icon(),
            task_ids: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong {
                len: self.name.chars().count(),
                max: MAX_NAME_LEN,
            });
        }
        Ok(())
    }
}

/// Read-only lookup of catalog entries, handed to the engine at
/// construction. The storage layer and the in-memory test catalog both
/// implement this.
pub trait Catalog {
    fn task(&self, id: &str) -> Option<Task>;
    fn routine(&self, id: &str) -> Option<Routine>;

    /// Sum of durations of the routine's resolvable tasks, in seconds.
    fn estimated_duration_secs(&self, routine: &Routine) -> u64 {
        routine
            .task_ids
            .iter()
            .filter_map(|id| self.task(id))
            .map(|t| u64::from(t.duration_secs))
            .sum()
    }
}

/// In-memory catalog for tests and embedding without the storage layer.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    tasks: std::collections::HashMap<String, Task>,
    routines: std::collections::HashMap<String, Routine>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&mut self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn insert_routine(&mut self, routine: Routine) {
        self.routines.insert(routine.id.clone(), routine);
    }

    pub fn remove_task(&mut self, id: &str) {
        self.tasks.remove(id);
    }
}

impl Catalog for MemoryCatalog {
    fn task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    fn routine(&self, id: &str) -> Option<Routine> {
        self.routines.get(id).cloned()
    }
}
