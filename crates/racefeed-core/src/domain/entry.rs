use serde::Serialize;

use crate::domain::odds::Odds;
use crate::ValidationError;

/// Cumulative record of a starter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EntryStats {
    pub starts: u32,
    pub wins: u32,
    pub places: u32,
    pub shows: u32,
    pub earnings_cad: f64,
}

/// Finish data, present once a race has been run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinishResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_odds: Option<Odds>,
}

impl FinishResult {
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.time.is_none()
            && self.margin.is_none()
            && self.final_odds.is_none()
    }
}

/// A horse entered in one race.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceEntry {
    pub post_position: u32,
    pub program_number: Option<String>,
    pub horse_name: String,
    pub driver: Option<String>,
    pub trainer: Option<String>,
    pub morning_line: Option<Odds>,
    pub scratched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<FinishResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<EntryStats>,
}

impl RaceEntry {
    pub fn new(horse_name: &str, post_position: u32) -> Result<Self, ValidationError> {
        let horse_name = horse_name.split_whitespace().collect::<Vec<_>>().join(" ");
        if horse_name.is_empty() {
            return Err(ValidationError::MissingHorseName {
                race_number: None,
                post_position: Some(post_position),
            });
        }
        if post_position == 0 {
            return Err(ValidationError::InvalidPostPosition {
                race_number: None,
                value: post_position.to_string(),
            });
        }

        Ok(Self {
            post_position,
            program_number: None,
            horse_name,
            driver: None,
            trainer: None,
            morning_line: None,
            scratched: false,
            finish: None,
            stats: None,
        })
    }

    pub fn with_program_number(mut self, program_number: Option<String>) -> Self {
        self.program_number = program_number;
        self
    }

    pub fn with_connections(mut self, driver: Option<String>, trainer: Option<String>) -> Self {
        self.driver = driver;
        self.trainer = trainer;
        self
    }

    pub fn with_morning_line(mut self, odds: Option<Odds>) -> Self {
        self.morning_line = odds;
        self
    }

    pub fn with_scratched(mut self, scratched: bool) -> Self {
        self.scratched = scratched;
        self
    }

    pub fn with_finish(mut self, finish: Option<FinishResult>) -> Self {
        self.finish = finish.filter(|finish| !finish.is_empty());
        self
    }

    /// Attaches cumulative stats; counts must be consistent and earnings non-negative.
    pub fn with_stats(mut self, stats: Option<EntryStats>) -> Result<Self, ValidationError> {
        if let Some(stats) = stats {
            if !stats.earnings_cad.is_finite() {
                return Err(ValidationError::NonFiniteValue {
                    race_number: None,
                    field: "earnings",
                });
            }
            if stats.earnings_cad < 0.0 {
                return Err(ValidationError::NegativeValue {
                    race_number: None,
                    field: "earnings",
                });
            }
            let placed = u64::from(stats.wins) + u64::from(stats.places) + u64::from(stats.shows);
            if placed > u64::from(stats.starts) {
                return Err(ValidationError::InconsistentStats {
                    race_number: None,
                    horse_name: self.horse_name.clone(),
                });
            }
        }

        self.stats = stats;
        Ok(self)
    }

    /// Horse name folded for identity comparison across sources.
    pub fn identity(&self) -> String {
        self.horse_name.to_ascii_lowercase()
    }
}
