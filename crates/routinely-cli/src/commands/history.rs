//! Session history commands.

use clap::Subcommand;
use routinely_core::Store;

use crate::common::print_json;

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List archived sessions, newest first
    List {
        /// Maximum entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    match action {
        HistoryAction::List { limit } => {
            print_json(&store.list_history(limit)?)?;
        }
    }
    Ok(())
}
