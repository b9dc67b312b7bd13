use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ActionType, Session};

/// A night of sleep as submitted to the `sleep` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSession {
    pub hours: f64,
    /// Self-reported quality, 1 (poor) to 5 (great)
    pub quality: u8,
    pub date_session: DateTime<Utc>,
}

impl SleepSession {
    pub fn new(hours: f64, quality: u8, date_session: DateTime<Utc>) -> Self {
        Self {
            hours,
            quality,
            date_session,
        }
    }
}

/// Latest known sleep values for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepEntry {
    pub date: NaiveDate,
    pub hours: f64,
    pub quality: u8,
}

impl Session for SleepSession {
    const ACTION: ActionType = ActionType::Sleep;
    type Entry = SleepEntry;

    fn day(&self) -> NaiveDate {
        self.date_session.date_naive()
    }

    fn to_entry(&self) -> SleepEntry {
        SleepEntry {
            date: self.day(),
            hours: self.hours,
            quality: self.quality,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=24.0).contains(&self.hours) {
            return Err(format!("Sleep hours must be between 0 and 24, got {}", self.hours));
        }
        if !(1..=5).contains(&self.quality) {
            return Err(format!("Sleep quality must be between 1 and 5, got {}", self.quality));
        }
        Ok(())
    }
}

impl fmt::Display for SleepEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {:>4.1}h  quality {}/5",
            self.date, self.hours, self.quality
        )
    }
}
