//! Task catalog commands.

use clap::Subcommand;
use routinely_core::{AdvancementMode, Config, Store, Task};

use crate::common::print_json;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task name
        name: String,
        /// Duration in seconds (1..=86400)
        #[arg(long)]
        duration: u32,
        /// Advancement mode: auto, manual, or confirm
        #[arg(long, default_value = "auto")]
        mode: String,
        /// Confirm window in seconds (confirm mode only, 5..=300)
        #[arg(long)]
        confirm_window: Option<u32>,
        /// Icon identifier
        #[arg(long)]
        icon: Option<String>,
        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },
    /// List all tasks
    List,
    /// Show one task
    Show {
        /// Task ID
        id: String,
    },
    /// Delete a task (also removes it from routines)
    Remove {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    match action {
        TaskAction::Add {
            name,
            duration,
            mode,
            confirm_window,
            icon,
            description,
        } => {
            let config = Config::load()?;
            let mode = parse_mode(&mode, confirm_window, &config)?;
            let mut task = Task::new(name, duration, mode);
            if let Some(icon) = icon {
                task.icon = icon;
            }
            task.description = description;
            task.validate()?;
            store.create_task(&task)?;
            print_json(&task)?;
        }
        TaskAction::List => {
            print_json(&store.list_tasks()?)?;
        }
        TaskAction::Show { id } => match store.get_task(&id)? {
            Some(task) => print_json(&task)?,
            None => return Err(format!("task '{id}' not found").into()),
        },
        TaskAction::Remove { id } => {
            store.delete_task(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn parse_mode(
    mode: &str,
    confirm_window: Option<u32>,
    config: &Config,
) -> Result<AdvancementMode, Box<dyn std::error::Error>> {
    match mode {
        "auto" => Ok(AdvancementMode::Auto),
        "manual" => Ok(AdvancementMode::Manual),
        "confirm" => Ok(AdvancementMode::Confirm {
            window_secs: confirm_window.unwrap_or(config.engine.default_confirm_window_secs),
        }),
        other => Err(format!("unknown advancement mode '{other}' (auto|manual|confirm)").into()),
    }
}
