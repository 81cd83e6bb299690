use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::race::RaceId;
use crate::{UtcDateTime, ValidationError};

/// Odds in decimal form (stake included), always `>= 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Odds(f64);

impl Odds {
    pub fn from_decimal(decimal: f64) -> Result<Self, ValidationError> {
        if !decimal.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                race_number: None,
                field: "odds",
            });
        }
        if decimal < 1.0 {
            return Err(ValidationError::InvalidOdds {
                race_number: None,
                value: decimal.to_string(),
            });
        }
        Ok(Self(decimal))
    }

    pub fn from_fractional(numerator: f64, denominator: f64) -> Result<Self, ValidationError> {
        if denominator <= 0.0 || numerator < 0.0 {
            return Err(ValidationError::InvalidOdds {
                race_number: None,
                value: format!("{numerator}-{denominator}"),
            });
        }
        Self::from_decimal(numerator / denominator + 1.0)
    }

    /// Parses tote and morning-line notations: `5-2`, `5/2`, `EVEN`, `3.50`.
    ///
    /// A bare integer is a tote-board price against one (`8` is `8-1`).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidOdds {
            race_number: None,
            value: raw.to_owned(),
        };

        let text = raw.trim().to_ascii_lowercase();
        if matches!(text.as_str(), "even" | "evens" | "evn" | "ev") {
            return Self::from_decimal(2.0);
        }

        if let Some((numerator, denominator)) = text.split_once(['-', '/']) {
            let numerator = numerator.trim().parse::<f64>().map_err(|_| invalid())?;
            let denominator = denominator.trim().parse::<f64>().map_err(|_| invalid())?;
            return Self::from_fractional(numerator, denominator).map_err(|_| invalid());
        }

        if text.contains('.') {
            let decimal = text.parse::<f64>().map_err(|_| invalid())?;
            return Self::from_decimal(decimal).map_err(|_| invalid());
        }

        let against_one = text.parse::<u32>().map_err(|_| invalid())?;
        Self::from_fractional(f64::from(against_one), 1.0)
    }

    pub const fn decimal(self) -> f64 {
        self.0
    }

    pub fn implied_probability(self) -> f64 {
        1.0 / self.0
    }
}

impl TryFrom<f64> for Odds {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Odds> for f64 {
    fn from(value: Odds) -> Self {
        value.0
    }
}

impl Display for Odds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Price for one runner in an odds snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerOdds {
    pub post_position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horse_name: Option<String>,
    pub odds: Odds,
    pub implied_probability: f64,
}

impl RunnerOdds {
    pub fn new(
        post_position: u32,
        program_number: Option<String>,
        horse_name: Option<String>,
        odds: Odds,
    ) -> Self {
        Self {
            post_position,
            program_number,
            horse_name,
            odds,
            implied_probability: odds.implied_probability(),
        }
    }
}

/// Odds for every runner in one race at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OddsSnapshot {
    pub race_id: RaceId,
    pub runners: Vec<RunnerOdds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<UtcDateTime>,
}

impl OddsSnapshot {
    /// Sum of implied probabilities (the pool's overround).
    pub fn book_percentage(&self) -> f64 {
        self.runners.iter().map(|runner| runner.implied_probability).sum()
    }
}
