use std::collections::HashMap;

use serde::Serialize;
use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

use crate::domain::race::Surface;
use crate::{UtcDateTime, ValidationError};

const EASTERN_STANDARD_HOURS: i8 = -5;
const EASTERN_DAYLIGHT_HOURS: i8 = -4;

/// Racetrack identity. The canonical `name` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub surface: Surface,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circumference_m: Option<u32>,
}

impl Track {
    /// A track outside the catalog, named from a cleaned-up version of the input.
    pub fn unlisted(raw_name: &str) -> Result<Self, ValidationError> {
        let name = title_case(&collapse_whitespace(raw_name));
        if name.is_empty() {
            return Err(ValidationError::EmptyTrackName);
        }

        Ok(Self {
            slug: slugify(&name),
            name,
            code: None,
            location: None,
            surface: Surface::Unknown,
            circumference_m: None,
        })
    }

    /// UTC offset of the track's local clock on `date`.
    ///
    /// All Ontario tracks follow Eastern time: daylight saving from the second
    /// Sunday of March until the first Sunday of November.
    pub fn utc_offset_on(&self, date: Date) -> UtcOffset {
        let hours = if observes_daylight_saving(date) {
            EASTERN_DAYLIGHT_HOURS
        } else {
            EASTERN_STANDARD_HOURS
        };
        UtcOffset::from_hms(hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }

    /// Converts an instant to the track's local date and wall-clock time.
    pub fn local_date_time(&self, instant: UtcDateTime) -> (Date, Time) {
        let utc = instant.into_inner();
        let standard = UtcOffset::from_hms(EASTERN_STANDARD_HOURS, 0, 0).unwrap_or(UtcOffset::UTC);
        let offset = self.utc_offset_on(utc.to_offset(standard).date());
        let local = utc.to_offset(offset);
        (local.date(), local.time())
    }

    /// The current race date at this track.
    pub fn today(&self) -> Date {
        let now = OffsetDateTime::now_utc();
        let standard = UtcOffset::from_hms(EASTERN_STANDARD_HOURS, 0, 0).unwrap_or(UtcOffset::UTC);
        let offset = self.utc_offset_on(now.to_offset(standard).date());
        now.to_offset(offset).date()
    }
}

/// Known tracks with alias lookup.
#[derive(Debug, Clone)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
    aliases: HashMap<String, usize>,
}

impl Default for TrackCatalog {
    fn default() -> Self {
        Self::ontario()
    }
}

impl TrackCatalog {
    pub fn empty() -> Self {
        Self {
            tracks: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    /// The Ontario harness circuit.
    pub fn ontario() -> Self {
        Self::empty()
            .with_track(
                ontario_track("Woodbine Mohawk Park", "WBM", "Campbellville, ON"),
                &["mohawk", "mohawk park", "woodbine mohawk", "woodbine at mohawk", "wbm"],
            )
            .with_track(
                ontario_track("Georgian Downs", "GEO", "Innisfil, ON"),
                &["georgian", "geo"],
            )
            .with_track(
                ontario_track("Grand River Raceway", "GRR", "Elora, ON"),
                &["grand river", "grr"],
            )
            .with_track(
                ontario_track("Hanover Raceway", "HAN", "Hanover, ON"),
                &["hanover", "han"],
            )
            .with_track(
                ontario_track("Kawartha Downs", "KAW", "Fraserville, ON"),
                &["kawartha", "kawartha downs raceway", "kaw"],
            )
    }

    pub fn with_track(mut self, track: Track, aliases: &[&str]) -> Self {
        let index = self.tracks.len();
        self.aliases.insert(lookup_key(&track.name), index);
        self.aliases.insert(lookup_key(&track.slug), index);
        if let Some(code) = &track.code {
            self.aliases.insert(lookup_key(code), index);
        }
        for alias in aliases {
            self.aliases.insert(lookup_key(alias), index);
        }
        self.tracks.push(track);
        self
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Looks up a catalog track by name, alias, code or slug, ignoring case,
    /// punctuation and repeated whitespace.
    pub fn find(&self, raw_name: &str) -> Option<&Track> {
        self.aliases
            .get(&lookup_key(raw_name))
            .and_then(|index| self.tracks.get(*index))
    }

    /// Normalized lookup keys that resolve to `track`, sorted.
    pub fn aliases_of(&self, track: &Track) -> Vec<&str> {
        let mut aliases = self
            .aliases
            .iter()
            .filter(|(_, index)| {
                self.tracks
                    .get(**index)
                    .is_some_and(|candidate| candidate.slug == track.slug)
            })
            .map(|(alias, _)| alias.as_str())
            .collect::<Vec<_>>();
        aliases.sort_unstable();
        aliases
    }

    /// Resolves any reported track name to its canonical identity.
    pub fn resolve(&self, raw_name: &str) -> Result<Track, ValidationError> {
        match self.find(raw_name) {
            Some(track) => Ok(track.clone()),
            None => Track::unlisted(raw_name),
        }
    }

    /// True when both names resolve to the same track.
    pub fn same_track(&self, left: &str, right: &str) -> bool {
        match (self.resolve(left), self.resolve(right)) {
            (Ok(left), Ok(right)) => left.slug == right.slug,
            _ => false,
        }
    }
}

fn ontario_track(name: &str, code: &str, location: &str) -> Track {
    Track {
        name: name.to_owned(),
        slug: slugify(name),
        code: Some(code.to_owned()),
        location: Some(location.to_owned()),
        surface: Surface::Synthetic,
        circumference_m: Some(875),
    }
}

fn observes_daylight_saving(date: Date) -> bool {
    let year = date.year();
    let (Some(start), Some(end)) = (
        nth_sunday(year, Month::March, 2),
        nth_sunday(year, Month::November, 1),
    ) else {
        return false;
    };
    date >= start && date < end
}

fn nth_sunday(year: i32, month: Month, nth: u8) -> Option<Date> {
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    let until_sunday = (7 - first.weekday().number_days_from_sunday()) % 7;
    Date::from_calendar_date(year, month, 1 + until_sunday + 7 * (nth - 1)).ok()
}

fn lookup_key(raw: &str) -> String {
    let cleaned = raw
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>();
    collapse_whitespace(&cleaned)
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(raw: &str) -> String {
    raw.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase, dash-separated identifier used in race ids and URLs.
pub fn slugify(raw: &str) -> String {
    lookup_key(raw).replace(' ', "-")
}
