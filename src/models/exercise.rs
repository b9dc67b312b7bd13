use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ActionType, Session};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSession {
    pub activity: String,
    pub minutes: u32,
    /// Perceived effort, 1 (easy) to 5 (maximal)
    pub intensity: u8,
    pub date_session: DateTime<Utc>,
}

impl ExerciseSession {
    pub fn new(
        activity: impl Into<String>,
        minutes: u32,
        intensity: u8,
        date_session: DateTime<Utc>,
    ) -> Self {
        Self {
            activity: activity.into(),
            minutes,
            intensity,
            date_session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub date: NaiveDate,
    pub activity: String,
    pub minutes: u32,
    pub intensity: u8,
}

impl Session for ExerciseSession {
    const ACTION: ActionType = ActionType::Exercise;
    type Entry = ExerciseEntry;

    fn day(&self) -> NaiveDate {
        self.date_session.date_naive()
    }

    fn to_entry(&self) -> ExerciseEntry {
        ExerciseEntry {
            date: self.day(),
            activity: self.activity.clone(),
            minutes: self.minutes,
            intensity: self.intensity,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.activity.trim().is_empty() {
            return Err("Exercise activity cannot be empty".to_string());
        }
        if self.minutes == 0 || self.minutes > 24 * 60 {
            return Err(format!(
                "Exercise minutes must be between 1 and 1440, got {}",
                self.minutes
            ));
        }
        if !(1..=5).contains(&self.intensity) {
            return Err(format!(
                "Exercise intensity must be between 1 and 5, got {}",
                self.intensity
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ExerciseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {} for {} min  intensity {}/5",
            self.date, self.activity, self.minutes, self.intensity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_exercise_entry_projection() {
        let session = ExerciseSession::new(
            "run",
            30,
            3,
            Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap(),
        );
        let entry = session.to_entry();
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(entry.activity, "run");
        assert_eq!(entry.minutes, 30);
    }

    #[test]
    fn test_exercise_validation() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert!(ExerciseSession::new("swim", 45, 2, at).validate().is_ok());
        assert!(ExerciseSession::new("  ", 45, 2, at).validate().is_err());
        assert!(ExerciseSession::new("swim", 0, 2, at).validate().is_err());
        assert!(ExerciseSession::new("swim", 45, 9, at).validate().is_err());
    }
}
