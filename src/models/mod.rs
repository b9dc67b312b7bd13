mod action_type;
mod exercise;
mod meditation;
mod sleep;

pub use action_type::ActionType;
pub use exercise::{ExerciseEntry, ExerciseSession};
pub use meditation::{MeditationEntry, MeditationSession};
pub use sleep::{SleepEntry, SleepSession};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A recorded wellness session: the payload sent to the server for one
/// domain, plus its projection into that domain's day-keyed read model.
pub trait Session: Serialize {
    /// Queue dispatch key for this domain.
    const ACTION: ActionType;

    /// Read-model row for the session's day.
    type Entry: Serialize + DeserializeOwned + Clone;

    /// Calendar day the session belongs to.
    fn day(&self) -> NaiveDate;

    /// Projects the session into its read-model entry.
    fn to_entry(&self) -> Self::Entry;

    /// Rejects sessions that make no sense before they reach storage.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
