//! Sync CLI commands for sending queued actions to the server.

use clap::{Args, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use wellnest::config::Config;
use wellnest::sync::{build_client, HandlerRegistry, HttpProbe};
use wellnest::{ActionQueue, Database, DrainReport, DrainStatus, SyncEngine};

/// Probe budget for the connectivity preflight.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Sync with remote server
#[derive(Args)]
pub struct SyncCommand {
    /// Base URL to sync against, overriding the configured one
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and queue status
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        db: &Database,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(db, config).await,
            Some(SyncSubcommand::Status) => self.status(db, config).await,
        }
    }

    async fn sync(&self, db: &Database, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let engine = build_engine(db, config)?;
        let target = engine.resolve_target(self.base_url.as_deref())?;

        println!("Syncing with {}...", target);
        println!();

        let report = engine.drain(self.base_url.as_deref()).await?;
        print_report(&report);

        if let Some(failure) = &report.failure {
            return Err(format!(
                "Sync stopped at {} action #{}: {}",
                failure.kind, failure.item_id, failure.reason
            )
            .into());
        }
        Ok(())
    }

    async fn status(
        &self,
        db: &Database,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let queue = ActionQueue::new(db.clone());

        println!("Sync Configuration");
        println!("==================");
        println!();

        match self.base_url.as_deref().or(config.sync.base_url.as_deref()) {
            Some(url) => println!("Server:      {}", url),
            None => {
                println!("Server:      not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    base_url: \"https://api.example.com\"");
                println!("    auto_sync: false");
                println!();
                println!("Or set WELLNEST_SYNC_URL.");
            }
        }
        println!("Environment: {}", config.environment.value);
        println!(
            "Auto-sync:   {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();
        println!("Pending:     {}", queue.len().await?);
        println!("Dead:        {}", queue.dead_letters().await?.len());

        Ok(())
    }
}

fn build_engine(db: &Database, config: &Config) -> Result<SyncEngine, reqwest::Error> {
    let settings = config.sync_settings();
    let client = build_client(settings.item_timeout)?;
    let connectivity = Arc::new(HttpProbe::new(client.clone(), PROBE_TIMEOUT));

    Ok(SyncEngine::new(
        ActionQueue::new(db.clone()),
        HandlerRegistry::http(client),
        connectivity,
        settings,
    ))
}

fn print_report(report: &DrainReport) {
    match report.status {
        DrainStatus::Offline => println!("  Server unreachable; actions stay queued."),
        DrainStatus::AlreadyRunning => println!("  A sync is already running."),
        DrainStatus::Completed | DrainStatus::Halted => {
            println!("  ✓ {} synced", report.synced.len());
            if !report.parked.is_empty() {
                println!(
                    "  ! {} set aside (see `wellnest queue dead`)",
                    report.parked.len()
                );
            }
            if let Some(failure) = &report.failure {
                println!("  ✗ stopped at #{}: {}", failure.item_id, failure.reason);
            }
        }
    }
}

/// Drains the queue after a write if `auto_sync` is enabled.
///
/// Never fails the command: the write is already stored locally and stays
/// queued for the next sync.
pub async fn try_auto_sync(db: &Database, config: &Config) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }

    let engine = match build_engine(db, config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::warn!("Auto-sync: failed to build HTTP client: {}", e);
            return;
        }
    };

    match engine.drain(None).await {
        Ok(report) => match report.status {
            DrainStatus::Offline => eprintln!("Auto-sync: server unreachable, skipping"),
            DrainStatus::Halted => {
                if let Some(failure) = report.failure {
                    eprintln!("Auto-sync: will retry later ({})", failure.reason);
                }
            }
            DrainStatus::Completed | DrainStatus::AlreadyRunning => {}
        },
        Err(e) => eprintln!("Auto-sync: {}", e),
    }
}
