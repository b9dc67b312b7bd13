use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use wellnest::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# wellnest configuration

# Path to SQLite database (default: platform data dir, e.g. ~/.local/share/wellnest/wellnest.db)
# database_path: ~/.local/share/wellnest/wellnest.db

# development | production | test
# Production refuses to sync to localhost or other loopback addresses.
environment: development

sync:
  # Base URL of the REST API
  # base_url: "https://api.example.com"
  # Send queued actions right after each write
  auto_sync: false
  # Per-request timeout in seconds
  timeout_secs: 10
"#;

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        match &config.database_path.value {
                            Some(path) => println!("database_path: {}", path.display()),
                            None => println!("database_path: (no data directory available)"),
                        }
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("environment: {}", config.environment.value);
                        println!("  source: {}", config.environment.source);
                        println!();

                        println!(
                            "sync.base_url: {}",
                            config.sync.base_url.as_deref().unwrap_or("(not set)")
                        );
                        println!("sync.auto_sync: {}", config.sync.auto_sync);
                        println!("sync.timeout_secs: {}", config.sync.timeout_secs);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'wellnest config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
