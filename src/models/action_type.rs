use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mutation domain of a queued action. Used as the dispatch key when syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Sleep,
    Exercise,
    Meditation,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [
        ActionType::Sleep,
        ActionType::Exercise,
        ActionType::Meditation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Sleep => "sleep",
            ActionType::Exercise => "exercise",
            ActionType::Meditation => "meditation",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sleep" => Ok(ActionType::Sleep),
            "exercise" => Ok(ActionType::Exercise),
            "meditation" => Ok(ActionType::Meditation),
            _ => Err(format!(
                "Invalid action type '{}'. Valid options: sleep, exercise, meditation",
                s
            )),
        }
    }
}
