//! Configuration commands.

use clap::Subcommand;
use routinely_core::Config;

use crate::common::print_json;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Set a value, e.g. `config set engine.default_snooze_secs 45`
    Set {
        /// Dotted key (engine.task_ending_warning_secs, ...)
        key: String,
        /// New value
        value: String,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            print_json(&Config::load()?)?;
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            print_json(&config)?;
        }
    }
    Ok(())
}
