//! Routine catalog commands.

use clap::Subcommand;
use routinely_core::{Catalog, Routine, Store};

use crate::common::print_json;

#[derive(Subcommand)]
pub enum RoutineAction {
    /// Create a new routine
    Create {
        /// Routine name
        name: String,
        /// Ordered task IDs (repeats allowed)
        #[arg(long, value_delimiter = ',')]
        tasks: Vec<String>,
        /// Icon identifier
        #[arg(long)]
        icon: Option<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// List all routines
    List,
    /// Show one routine with its estimated duration
    Show {
        /// Routine ID
        id: String,
    },
    /// Append a task to a routine's queue
    AddTask {
        /// Routine ID
        id: String,
        /// Task ID
        task_id: String,
        /// Queue position (defaults to the end)
        #[arg(long)]
        position: Option<usize>,
    },
    /// Remove all occurrences of a task from a routine
    RemoveTask {
        /// Routine ID
        id: String,
        /// Task ID
        task_id: String,
    },
    /// Replace a routine's task order
    Reorder {
        /// Routine ID
        id: String,
        /// New ordered task IDs
        #[arg(value_delimiter = ',')]
        task_ids: Vec<String>,
    },
    /// Delete a routine
    Remove {
        /// Routine ID
        id: String,
    },
}

pub fn run(action: RoutineAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    match action {
        RoutineAction::Create {
            name,
            tasks,
            icon,
            tags,
        } => {
            let mut routine = Routine::new(name);
            routine.task_ids = tasks;
            routine.tags = tags;
            if let Some(icon) = icon {
                routine.icon = icon;
            }
            routine.validate()?;
            for task_id in &routine.task_ids {
                if store.get_task(task_id)?.is_none() {
                    return Err(format!("task '{task_id}' not found").into());
                }
            }
            store.create_routine(&routine)?;
            print_json(&routine)?;
        }
        RoutineAction::List => {
            print_json(&store.list_routines()?)?;
        }
        RoutineAction::Show { id } => match store.get_routine(&id)? {
            Some(routine) => {
                let estimated = store.estimated_duration_secs(&routine);
                let mut value = serde_json::to_value(&routine)?;
                value["estimated_duration_secs"] = estimated.into();
                print_json(&value)?;
            }
            None => return Err(format!("routine '{id}' not found").into()),
        },
        RoutineAction::AddTask {
            id,
            task_id,
            position,
        } => {
            let mut routine = require_routine(&store, &id)?;
            if store.get_task(&task_id)?.is_none() {
                return Err(format!("task '{task_id}' not found").into());
            }
            let at = position.unwrap_or(routine.task_ids.len());
            let at = at.min(routine.task_ids.len());
            routine.task_ids.insert(at, task_id);
            store.update_routine(&routine)?;
            print_json(&routine)?;
        }
        RoutineAction::RemoveTask { id, task_id } => {
            let mut routine = require_routine(&store, &id)?;
            routine.task_ids.retain(|t| t != &task_id);
            store.update_routine(&routine)?;
            print_json(&routine)?;
        }
        RoutineAction::Reorder { id, task_ids } => {
            let mut routine = require_routine(&store, &id)?;
            routine.task_ids = task_ids;
            store.update_routine(&routine)?;
            print_json(&routine)?;
        }
        RoutineAction::Remove { id } => {
            store.delete_routine(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn require_routine(store: &Store, id: &str) -> Result<Routine, Box<dyn std::error::Error>> {
    store
        .get_routine(id)?
        .ok_or_else(|| format!("routine '{id}' not found").into())
}
