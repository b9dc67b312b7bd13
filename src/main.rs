use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    try_auto_sync, ConfigCommand, ExerciseCommand, MeditationCommand, QueueCommand, SleepCommand,
    SyncCommand,
};
use wellnest::{init_db, Config};

#[derive(Parser)]
#[command(name = "wellnest")]
#[command(version)]
#[command(about = "Offline-first wellness journal", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log and review sleep
    Sleep(SleepCommand),

    /// Log and review exercise
    Exercise(ExerciseCommand),

    /// Log and review meditation
    Meditation(MeditationCommand),

    /// Inspect the pending action queue
    Queue(QueueCommand),

    /// Send queued actions to the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

impl Commands {
    fn is_write(&self) -> bool {
        match self {
            Commands::Sleep(cmd) => cmd.is_write(),
            Commands::Exercise(cmd) => cmd.is_write(),
            Commands::Meditation(cmd) => cmd.is_write(),
            Commands::Queue(cmd) => cmd.is_write(),
            Commands::Sync(_) | Commands::Config(_) => false,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wellnest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    if let Commands::Config(cmd) = &command {
        return cmd.run(&config);
    }

    let db = init_db(config.database_path.value.clone()).await?;

    let result = match &command {
        Commands::Sleep(cmd) => cmd.run(&db).await,
        Commands::Exercise(cmd) => cmd.run(&db).await,
        Commands::Meditation(cmd) => cmd.run(&db).await,
        Commands::Queue(cmd) => cmd.run(&db).await,
        Commands::Sync(cmd) => cmd.run(&db, &config).await,
        Commands::Config(_) => Ok(()),
    };

    // Only after a write that succeeded
    if result.is_ok() && command.is_write() {
        try_auto_sync(&db, &config).await;
    }

    db.close().await;
    result
}
