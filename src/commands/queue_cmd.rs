use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use super::OutputFormat;
use wellnest::{ActionQueue, Database};

#[derive(Args)]
pub struct QueueCommand {
    #[command(subcommand)]
    pub command: QueueSubcommand,
}

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// List actions waiting to be synced, oldest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List actions that were set aside because they cannot be synced
    Dead {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Put a set-aside action back at the end of the queue
    Restore {
        /// Dead-letter id (from `queue dead`)
        id: i64,
    },
}

impl QueueCommand {
    pub fn is_write(&self) -> bool {
        matches!(self.command, QueueSubcommand::Restore { .. })
    }

    pub async fn run(&self, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
        let queue = ActionQueue::new(db.clone());
        match &self.command {
            QueueSubcommand::List { format } => {
                let items = queue.list().await?;
                match format {
                    OutputFormat::Json => {
                        let rows: Vec<serde_json::Value> = items
                            .iter()
                            .map(|item| {
                                serde_json::json!({
                                    "id": item.id,
                                    "type": item.kind,
                                    "payload": item.payload,
                                    "createdAt": item.created_at,
                                    "idempotencyKey": item.idempotency_key,
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        if items.is_empty() {
                            println!("Queue is empty. Everything is synced.");
                            return Ok(());
                        }
                        println!("{} pending action(s):", items.len());
                        for item in &items {
                            println!(
                                "  #{:<5} {:<11} queued {}",
                                item.id,
                                item.kind,
                                format_millis(item.created_at)
                            );
                        }
                    }
                }
                Ok(())
            }
            QueueSubcommand::Dead { format } => {
                let letters = queue.dead_letters().await?;
                match format {
                    OutputFormat::Json => {
                        let rows: Vec<serde_json::Value> = letters
                            .iter()
                            .map(|letter| {
                                serde_json::json!({
                                    "id": letter.id,
                                    "originalId": letter.original_id,
                                    "type": letter.item.kind,
                                    "payload": letter.item.payload,
                                    "reason": letter.reason,
                                    "parkedAt": letter.parked_at,
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        if letters.is_empty() {
                            println!("No dead letters.");
                            return Ok(());
                        }
                        for letter in &letters {
                            println!(
                                "  #{:<5} (was #{}) {:<11} {}  [{}]",
                                letter.id,
                                letter.original_id,
                                letter.item.kind,
                                letter.reason,
                                format_millis(letter.parked_at)
                            );
                        }
                    }
                }
                Ok(())
            }
            QueueSubcommand::Restore { id } => match queue.restore(*id).await? {
                Some(queue_id) => {
                    println!("Restored dead letter #{} as queue item #{}", id, queue_id);
                    Ok(())
                }
                None => Err(format!("Dead letter not found: {}", id).into()),
            },
        }
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
