use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ActionType, Session};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeditationSession {
    pub minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technique: Option<String>,
    pub date_session: DateTime<Utc>,
}

impl MeditationSession {
    pub fn new(minutes: u32, date_session: DateTime<Utc>) -> Self {
        Self {
            minutes,
            technique: None,
            date_session,
        }
    }

    pub fn with_technique(mut self, technique: impl Into<String>) -> Self {
        self.technique = Some(technique.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeditationEntry {
    pub date: NaiveDate,
    pub minutes: u32,
    #[serde(default)]
    pub technique: Option<String>,
}

impl Session for MeditationSession {
    const ACTION: ActionType = ActionType::Meditation;
    type Entry = MeditationEntry;

    fn day(&self) -> NaiveDate {
        self.date_session.date_naive()
    }

    fn to_entry(&self) -> MeditationEntry {
        MeditationEntry {
            date: self.day(),
            minutes: self.minutes,
            technique: self.technique.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.minutes == 0 {
            return Err("Meditation minutes must be at least 1".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for MeditationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {} min", self.date, self.minutes)?;
        if let Some(technique) = &self.technique {
            write!(f, "  ({})", technique)?;
        }
        Ok(())
    }
}
