mod config_cmd;
mod queue_cmd;
mod session;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use queue_cmd::QueueCommand;
pub use session::{ExerciseCommand, MeditationCommand, SleepCommand};
pub use sync_cmd::{try_auto_sync, SyncCommand};

use clap::ValueEnum;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
