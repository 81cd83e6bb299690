use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use time::{Date, Month, Time};

use crate::domain::entry::RaceEntry;
use crate::domain::track::{slugify, Track};
use crate::ValidationError;

/// Race lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    #[default]
    Scheduled,
    Live,
    Finished,
    Cancelled,
}

impl RaceStatus {
    /// Maps the status vocabulary used by tote boards and feeds.
    pub fn from_text(raw: &str) -> Self {
        let text = raw.trim().to_ascii_lowercase();
        if ["official", "final", "result", "finished", "complete"]
            .iter()
            .any(|word| text.contains(word))
        {
            Self::Finished
        } else if ["cancel", "abandon"].iter().any(|word| text.contains(word)) {
            Self::Cancelled
        } else if text == "off"
            || ["running", "live", "in progress", "in_progress"]
                .iter()
                .any(|word| text.contains(word))
        {
            Self::Live
        } else {
            Self::Scheduled
        }
    }
}

/// Racing surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Dirt,
    StoneDust,
    Synthetic,
    #[default]
    Unknown,
}

impl Surface {
    pub fn from_text(raw: &str) -> Self {
        let text = raw.trim().to_ascii_lowercase();
        if text.contains("stone") || text.contains("limestone") {
            Self::StoneDust
        } else if text.contains("synthetic") || text.contains("all weather") || text.contains("all-weather") {
            Self::Synthetic
        } else if text.contains("dirt") || text.contains("clay") {
            Self::Dirt
        } else {
            Self::Unknown
        }
    }
}

/// Harness gait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gait {
    Pace,
    Trot,
    #[default]
    Unknown,
}

impl Gait {
    /// Derives the gait from conditions or race-type text.
    pub fn from_text(raw: &str) -> Self {
        let text = raw.to_ascii_lowercase();
        if text.contains("trot") {
            Self::Trot
        } else if text.contains("pace") || text.contains("pacing") {
            Self::Pace
        } else {
            Self::Unknown
        }
    }
}

/// Natural key of a race: track, date and race number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RaceId {
    track_slug: String,
    date: Date,
    race_number: u32,
}

impl RaceId {
    pub fn new(track: &Track, date: Date, race_number: u32) -> Result<Self, ValidationError> {
        if race_number == 0 {
            return Err(ValidationError::InvalidRaceNumber {
                value: race_number.to_string(),
            });
        }

        Ok(Self {
            track_slug: track.slug.clone(),
            date,
            race_number,
        })
    }

    /// Parses `track-slug:YYYY-MM-DD:N`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidRaceId {
            value: input.to_owned(),
        };

        let mut parts = input.trim().rsplitn(3, ':');
        let number = parts.next().ok_or_else(invalid)?;
        let date = parts.next().ok_or_else(invalid)?;
        let slug = parts.next().ok_or_else(invalid)?;

        let track_slug = slugify(slug);
        if track_slug.is_empty() {
            return Err(invalid());
        }
        let date = parse_iso_date(date).map_err(|_| invalid())?;
        let race_number = number
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|value| *value > 0)
            .ok_or_else(invalid)?;

        Ok(Self {
            track_slug,
            date,
            race_number,
        })
    }

    pub fn track_slug(&self) -> &str {
        &self.track_slug
    }

    pub const fn date(&self) -> Date {
        self.date
    }

    pub const fn race_number(&self) -> u32 {
        self.race_number
    }
}

impl Display for RaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.track_slug,
            format_iso_date(self.date),
            self.race_number
        )
    }
}

impl FromStr for RaceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RaceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RaceId> for String {
    fn from(value: RaceId) -> Self {
        value.to_string()
    }
}

/// Mutable, descriptive attributes of a race.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RaceDetails {
    /// Scheduled post time on the track's local clock.
    #[serde(serialize_with = "serialize_local_time")]
    pub post_time: Option<Time>,
    pub distance_m: Option<u32>,
    pub surface: Surface,
    pub gait: Gait,
    pub purse_cad: Option<f64>,
    pub conditions: Option<String>,
    pub status: RaceStatus,
}

/// One race on a card, with its field of entries sorted by post position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Race {
    pub id: RaceId,
    pub track: String,
    #[serde(serialize_with = "serialize_iso_date")]
    pub date: Date,
    pub race_number: u32,
    #[serde(flatten)]
    pub details: RaceDetails,
    pub entries: Vec<RaceEntry>,
}

impl Race {
    /// Builds a race, rejecting invalid race numbers, negative purses and
    /// entries that share a post position.
    pub fn new(
        track: &Track,
        date: Date,
        race_number: u32,
        details: RaceDetails,
        mut entries: Vec<RaceEntry>,
    ) -> Result<Self, ValidationError> {
        let id = RaceId::new(track, date, race_number)?;
        validate_purse(details.purse_cad, race_number)?;

        entries.sort_by_key(|entry| entry.post_position);
        for pair in entries.windows(2) {
            if pair[0].post_position == pair[1].post_position {
                return Err(ValidationError::DuplicatePostPosition {
                    race_number: Some(race_number),
                    post_position: pair[1].post_position,
                    horse_name: pair[1].horse_name.clone(),
                });
            }
        }

        Ok(Self {
            id,
            track: track.name.clone(),
            date,
            race_number,
            details,
            entries,
        })
    }

    pub fn entry_at(&self, post_position: u32) -> Option<&RaceEntry> {
        self.entries
            .iter()
            .find(|entry| entry.post_position == post_position)
    }

    /// Applies a newer observation of the same race.
    ///
    /// Status always follows the newer observation; other fields only change
    /// when the newer observation reports them. A horse re-reported at its
    /// post is replaced; a different horse claiming an occupied post is
    /// returned as a [`ValidationError::DuplicatePostPosition`] and the first
    /// claimant stays. The natural key never changes.
    pub fn apply_update(&mut self, newer: Race) -> Result<Vec<ValidationError>, ValidationError> {
        if newer.id != self.id {
            return Err(ValidationError::NaturalKeyMismatch {
                expected: self.id.to_string(),
                found: newer.id.to_string(),
            });
        }
        validate_purse(newer.details.purse_cad, self.race_number)?;

        let details = newer.details;
        self.details.status = details.status;
        if details.post_time.is_some() {
            self.details.post_time = details.post_time;
        }
        if details.purse_cad.is_some() {
            self.details.purse_cad = details.purse_cad;
        }
        if details.distance_m.is_some() {
            self.details.distance_m = details.distance_m;
        }
        if details.conditions.is_some() {
            self.details.conditions = details.conditions;
        }
        if details.surface != Surface::Unknown {
            self.details.surface = details.surface;
        }
        if details.gait != Gait::Unknown {
            self.details.gait = details.gait;
        }

        let mut by_post = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|entry| (entry.post_position, entry))
            .collect::<BTreeMap<_, _>>();
        let mut rejected = Vec::new();
        for entry in newer.entries {
            match by_post.get(&entry.post_position) {
                Some(current) if current.identity() != entry.identity() => {
                    rejected.push(ValidationError::DuplicatePostPosition {
                        race_number: Some(self.race_number),
                        post_position: entry.post_position,
                        horse_name: entry.horse_name,
                    });
                }
                _ => {
                    by_post.insert(entry.post_position, entry);
                }
            }
        }
        self.entries = by_post.into_values().collect();

        Ok(rejected)
    }
}

fn validate_purse(purse: Option<f64>, race_number: u32) -> Result<(), ValidationError> {
    if let Some(purse) = purse {
        if !purse.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                race_number: Some(race_number),
                field: "purse",
            });
        }
        if purse < 0.0 {
            return Err(ValidationError::NegativeValue {
                race_number: Some(race_number),
                field: "purse",
            });
        }
    }
    Ok(())
}

/// Parses `YYYY-MM-DD`.
pub fn parse_iso_date(input: &str) -> Result<Date, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        value: input.to_owned(),
    };

    let mut parts = input.trim().splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return Err(invalid());
    }

    calendar_date(year, month, day).ok_or_else(invalid)
}

/// Parses the compact `YYYYMMDD` form used by feed URLs and payloads.
pub fn parse_compact_date(input: &str) -> Result<Date, ValidationError> {
    let text = input.trim();
    if text.len() != 8 || !text.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::InvalidDate {
            value: input.to_owned(),
        });
    }

    calendar_date(&text[0..4], &text[4..6], &text[6..8]).ok_or_else(|| {
        ValidationError::InvalidDate {
            value: input.to_owned(),
        }
    })
}

fn calendar_date(year: &str, month: &str, day: &str) -> Option<Date> {
    let year = year.parse::<i32>().ok()?;
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    let day = day.parse::<u8>().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

pub fn format_iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn format_compact_date(date: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub(crate) fn serialize_iso_date<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_iso_date(*date))
}

fn serialize_local_time<S>(time: &Option<Time>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match time {
        Some(time) => {
            serializer.serialize_str(&format!("{:02}:{:02}", time.hour(), time.minute()))
        }
        None => serializer.serialize_none(),
    }
}
