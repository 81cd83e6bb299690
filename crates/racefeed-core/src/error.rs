use serde::Serialize;
use thiserror::Error;

/// Record-level validation failures.
///
/// Entry-scoped variants carry an optional race number; the normalizer fills it
/// in with [`ValidationError::in_race`] once the owning race is known.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("{}horse name is missing{}", race_prefix(.race_number), post_suffix(.post_position))]
    MissingHorseName {
        race_number: Option<u32>,
        post_position: Option<u32>,
    },
    #[error("{}post position is missing for '{horse_name}'", race_prefix(.race_number))]
    MissingPostPosition {
        race_number: Option<u32>,
        horse_name: String,
    },
    #[error("{}post position must be a positive integer: '{value}'", race_prefix(.race_number))]
    InvalidPostPosition {
        race_number: Option<u32>,
        value: String,
    },
    #[error(
        "{}post position {post_position} is already taken; rejected '{horse_name}'",
        race_prefix(.race_number)
    )]
    DuplicatePostPosition {
        race_number: Option<u32>,
        post_position: u32,
        horse_name: String,
    },
    #[error("{}stats for '{horse_name}' have more wins/places/shows than starts", race_prefix(.race_number))]
    InconsistentStats {
        race_number: Option<u32>,
        horse_name: String,
    },
    #[error("{}field '{field}' must be non-negative", race_prefix(.race_number))]
    NegativeValue {
        race_number: Option<u32>,
        field: &'static str,
    },
    #[error("{}field '{field}' must be finite", race_prefix(.race_number))]
    NonFiniteValue {
        race_number: Option<u32>,
        field: &'static str,
    },
    #[error("{}unrecognized odds '{value}'", race_prefix(.race_number))]
    InvalidOdds {
        race_number: Option<u32>,
        value: String,
    },

    #[error("race number must be a positive integer: '{value}'")]
    InvalidRaceNumber { value: String },
    #[error("race id must look like 'track-slug:YYYY-MM-DD:N': '{value}'")]
    InvalidRaceId { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("track name cannot be empty")]
    EmptyTrackName,
    #[error("update for '{found}' cannot be applied to race '{expected}'")]
    NaturalKeyMismatch { expected: String, found: String },

    #[error("invalid source '{value}', expected one of enterprise, odds_api, woodbine, standardbred_canada, synthetic")]
    InvalidSource { value: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("source_chain must contain at least one source")]
    EmptySourceChain,

    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

impl ValidationError {
    /// Attaches the owning race number to an entry-scoped error.
    pub fn in_race(mut self, number: u32) -> Self {
        match &mut self {
            Self::MissingHorseName { race_number, .. }
            | Self::MissingPostPosition { race_number, .. }
            | Self::InvalidPostPosition { race_number, .. }
            | Self::DuplicatePostPosition { race_number, .. }
            | Self::InconsistentStats { race_number, .. }
            | Self::NegativeValue { race_number, .. }
            | Self::NonFiniteValue { race_number, .. }
            | Self::InvalidOdds { race_number, .. } => *race_number = Some(number),
            _ => {}
        }
        self
    }

    /// Race number the error refers to, when known.
    pub fn race_number(&self) -> Option<u32> {
        match self {
            Self::MissingHorseName { race_number, .. }
            | Self::MissingPostPosition { race_number, .. }
            | Self::InvalidPostPosition { race_number, .. }
            | Self::DuplicatePostPosition { race_number, .. }
            | Self::InconsistentStats { race_number, .. }
            | Self::NegativeValue { race_number, .. }
            | Self::NonFiniteValue { race_number, .. }
            | Self::InvalidOdds { race_number, .. } => *race_number,
            _ => None,
        }
    }
}

fn race_prefix(race_number: &Option<u32>) -> String {
    race_number
        .map(|number| format!("race {number}: "))
        .unwrap_or_default()
}

fn post_suffix(post_position: &Option<u32>) -> String {
    post_position
        .map(|post| format!(" (post {post})"))
        .unwrap_or_default()
}
