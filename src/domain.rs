use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Nil,
    Cached,
    Created,
    Updated,
    Deleted,
    Archived,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::Nil,
        Outcome::Cached,
        Outcome::Created,
        Outcome::Updated,
        Outcome::Deleted,
        Outcome::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Nil => "nil",
            Outcome::Cached => "cached",
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Deleted => "deleted",
            Outcome::Archived => "archived",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Outcome::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == normalized)
            .ok_or_else(|| MirrorError::RecordParse(format!("unknown outcome {value:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    #[default]
    Nil,
    Success,
    Warning,
    Error,
}

impl ResultStatus {
    pub const ALL: [ResultStatus; 4] = [
        ResultStatus::Nil,
        ResultStatus::Success,
        ResultStatus::Warning,
        ResultStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Nil => "nil",
            ResultStatus::Success => "success",
            ResultStatus::Warning => "warning",
            ResultStatus::Error => "error",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ResultStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| MirrorError::RecordParse(format!("unknown result {value:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Whitepapers,
    Answers,
    Builders,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Whitepapers => write!(f, "whitepapers"),
            FeedKind::Answers => write!(f, "answers"),
            FeedKind::Builders => write!(f, "builders"),
        }
    }
}

impl FromStr for FeedKind {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "whitepapers" => Ok(FeedKind::Whitepapers),
            "answers" => Ok(FeedKind::Answers),
            "builders" => Ok(FeedKind::Builders),
            _ => Err(MirrorError::UnknownFeed(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    #[default]
    Day,
    Month,
}

impl DateGranularity {
    pub fn pattern(&self) -> &'static str {
        match self {
            DateGranularity::Day => "%Y-%m-%d",
            DateGranularity::Month => "%Y-%m",
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn outcome_names_round_trip() {
        for outcome in Outcome::ALL {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
        assert_eq!("Cached".parse::<Outcome>().unwrap(), Outcome::Cached);
    }

    #[test]
    fn result_rejects_unknown_name() {
        let err = "maybe".parse::<ResultStatus>().unwrap_err();
        assert_matches!(err, MirrorError::RecordParse(_));
    }

    #[test]
    fn parse_feed_kind() {
        assert_eq!("Answers".parse::<FeedKind>().unwrap(), FeedKind::Answers);
        let err = "videos".parse::<FeedKind>().unwrap_err();
        assert_matches!(err, MirrorError::UnknownFeed(_));
    }
}
