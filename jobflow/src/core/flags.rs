//! Action behavior flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ParseError;

/// A behavior flag attached to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionFlag {
    /// The action runs detached; the pipeline does not wait for it.
    RunInBackground,
    /// The action runs even if an earlier action failed.
    AlwaysRun,
    /// The container may use FUSE.
    EnableFuse,
}

impl fmt::Display for ActionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunInBackground => write!(f, "RUN_IN_BACKGROUND"),
            Self::AlwaysRun => write!(f, "ALWAYS_RUN"),
            Self::EnableFuse => write!(f, "ENABLE_FUSE"),
        }
    }
}

impl FromStr for ActionFlag {
    type Err = ParseError;

    /// Parses a flag name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RUN_IN_BACKGROUND" => Ok(Self::RunInBackground),
            "ALWAYS_RUN" => Ok(Self::AlwaysRun),
            "ENABLE_FUSE" => Ok(Self::EnableFuse),
            other => Err(ParseError::new(format!("unknown action flag {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_display() {
        assert_eq!(ActionFlag::RunInBackground.to_string(), "RUN_IN_BACKGROUND");
        assert_eq!(ActionFlag::AlwaysRun.to_string(), "ALWAYS_RUN");
        assert_eq!(ActionFlag::EnableFuse.to_string(), "ENABLE_FUSE");
    }

    #[test]
    fn test_flag_parse_is_case_insensitive() {
        assert_eq!("always_run".parse::<ActionFlag>(), Ok(ActionFlag::AlwaysRun));
        assert_eq!("Enable_Fuse".parse::<ActionFlag>(), Ok(ActionFlag::EnableFuse));
    }

    #[test]
    fn test_flag_parse_unknown() {
        let err = "sometimes".parse::<ActionFlag>().unwrap_err();
        assert!(err.message.contains("SOMETIMES"));
    }

    #[test]
    fn test_flag_serde_names() {
        let json = serde_json::to_string(&ActionFlag::RunInBackground).unwrap();
        assert_eq!(json, "\"RUN_IN_BACKGROUND\"");
        let flag: ActionFlag = serde_json::from_str("\"ALWAYS_RUN\"").unwrap();
        assert_eq!(flag, ActionFlag::AlwaysRun);
    }
}
