//! `sleep`, `exercise` and `meditation` commands.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use std::fmt::Display;

use super::OutputFormat;
use wellnest::{Database, ExerciseSession, MeditationSession, Recorder, Session, SleepSession};

#[derive(Args)]
pub struct SleepCommand {
    #[command(subcommand)]
    pub command: SleepSubcommand,
}

#[derive(Subcommand)]
pub enum SleepSubcommand {
    /// Log a night of sleep
    Log {
        /// Hours slept
        hours: f64,

        /// Sleep quality from 1 to 5
        #[arg(long, short, default_value_t = 3)]
        quality: u8,

        /// When the session happened (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Show recent sleep
    History(HistoryArgs),
}

#[derive(Args)]
pub struct ExerciseCommand {
    #[command(subcommand)]
    pub command: ExerciseSubcommand,
}

#[derive(Subcommand)]
pub enum ExerciseSubcommand {
    /// Log a workout
    Log {
        /// Activity name (e.g. running, yoga)
        activity: String,

        /// Duration in minutes
        minutes: u32,

        /// Perceived intensity from 1 to 5
        #[arg(long, short, default_value_t = 3)]
        intensity: u8,

        /// When the session happened (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Show recent exercise
    History(HistoryArgs),
}

#[derive(Args)]
pub struct MeditationCommand {
    #[command(subcommand)]
    pub command: MeditationSubcommand,
}

#[derive(Subcommand)]
pub enum MeditationSubcommand {
    /// Log a meditation session
    Log {
        /// Duration in minutes
        minutes: u32,

        /// Technique used (e.g. breathing, body scan)
        #[arg(long, short)]
        technique: Option<String>,

        /// When the session happened (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Show recent meditation
    History(HistoryArgs),
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Number of days to show, ending today (UTC calendar)
    #[arg(long, default_value_t = 7)]
    days: u32,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl SleepCommand {
    pub fn is_write(&self) -> bool {
        matches!(self.command, SleepSubcommand::Log { .. })
    }

    pub async fn run(&self, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
        let recorder = Recorder::new(db.clone());
        match &self.command {
            SleepSubcommand::Log {
                hours,
                quality,
                date,
            } => {
                let at = parse_session_time(date.as_deref())?;
                log(&recorder, &SleepSession::new(*hours, *quality, at)).await
            }
            SleepSubcommand::History(args) => history::<SleepSession>(&recorder, args).await,
        }
    }
}

impl ExerciseCommand {
    pub fn is_write(&self) -> bool {
        matches!(self.command, ExerciseSubcommand::Log { .. })
    }

    pub async fn run(&self, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
        let recorder = Recorder::new(db.clone());
        match &self.command {
            ExerciseSubcommand::Log {
                activity,
                minutes,
                intensity,
                date,
            } => {
                let at = parse_session_time(date.as_deref())?;
                let session = ExerciseSession::new(activity.as_str(), *minutes, *intensity, at);
                log(&recorder, &session).await
            }
            ExerciseSubcommand::History(args) => {
                history::<ExerciseSession>(&recorder, args).await
            }
        }
    }
}

impl MeditationCommand {
    pub fn is_write(&self) -> bool {
        matches!(self.command, MeditationSubcommand::Log { .. })
    }

    pub async fn run(&self, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
        let recorder = Recorder::new(db.clone());
        match &self.command {
            MeditationSubcommand::Log {
                minutes,
                technique,
                date,
            } => {
                let at = parse_session_time(date.as_deref())?;
                let mut session = MeditationSession::new(*minutes, at);
                if let Some(technique) = technique {
                    session = session.with_technique(technique.as_str());
                }
                log(&recorder, &session).await
            }
            MeditationSubcommand::History(args) => {
                history::<MeditationSession>(&recorder, args).await
            }
        }
    }
}

async fn log<S: Session>(
    recorder: &Recorder,
    session: &S,
) -> Result<(), Box<dyn std::error::Error>> {
    let recorded = recorder.record(session).await?;
    println!("{}", recorded);
    Ok(())
}

async fn history<S>(recorder: &Recorder, args: &HistoryArgs) -> Result<(), Box<dyn std::error::Error>>
where
    S: Session,
    S::Entry: Display,
{
    let entries = recorder.read_model::<S>().query(args.days).await?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!(
                    "No {} entries in the last {} day(s).",
                    S::ACTION,
                    args.days
                );
                return Ok(());
            }
            for entry in &entries {
                println!("{}", entry);
            }
        }
    }
    Ok(())
}

/// Accepts a full RFC 3339 timestamp, or a bare date which is taken as noon
/// UTC so it lands on that calendar day.
fn parse_session_time(value: Option<&str>) -> Result<DateTime<Utc>, String> {
    let value = match value {
        Some(value) => value.trim(),
        None => return Ok(Utc::now()),
    };

    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| {
            format!(
                "Invalid date '{}'. Use YYYY-MM-DD or an RFC 3339 timestamp.",
                value
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_bare_date_is_noon_utc() {
        let at = parse_session_time(Some("2024-01-10")).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_rfc3339_converts_to_utc() {
        let at = parse_session_time(Some("2024-01-10T23:30:00-02:00")).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 11, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_session_time(Some("yesterday")).is_err());
    }

    #[test]
    fn test_parse_defaults_to_now() {
        let before = Utc::now();
        let at = parse_session_time(None).unwrap();
        assert!(at >= before);
    }
}
