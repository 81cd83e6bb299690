//! Maps adapter payloads onto the canonical race model.
//!
//! Every payload shape is first lowered into drafts that still hold the raw
//! text of the fields the model validates (race number, post position).
//! Assembly then enforces the record invariants: records that fail are
//! reported as [`ValidationError`]s and dropped, the rest of the batch
//! survives.
//!
//! Units are unified on the way: distances in meters, purses and earnings in
//! CAD dollars, post times on the track's local clock.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use time::{Date, Time};

use crate::adapters::enterprise::{EnterpriseCard, EnterpriseOdds};
use crate::adapters::odds_api::{ApiCard, ApiDistance, ApiOdds, ApiOddsValue};
use crate::adapters::scraped::ScrapedCard;
use crate::data_source::{CardQuery, OddsQuery, PayloadBody, RawPayload, SourceError};
use crate::domain::{parse_compact_date, parse_iso_date, slugify};
use crate::{
    EntryStats, FinishResult, Gait, Odds, OddsSnapshot, Race, RaceDetails, RaceEntry, RaceStatus,
    RunnerOdds, Surface, Track, TrackCatalog, UtcDateTime, ValidationError,
};

const METERS_PER_MILE: f64 = 1_609.344;
const METERS_PER_YARD: f64 = 0.9144;
const METERS_PER_FURLONG: f64 = 201.168;

static MILES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+(?:\.\d+)?)\s*)?(?:(\d+)\s*/\s*(\d+)\s*)?mi(?:le)?s?$")
        .expect("mile pattern is valid")
});
static MEASURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([a-z]*)$").expect("measure pattern is valid")
});
static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):(\d{2})\s*(?:([ap])\.?\s*m\.?)?$").expect("clock pattern is valid")
});
static RACE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:race\s*#?\s*)?(\d+)$").expect("race label pattern is valid")
});

/// Races recovered from one payload plus the records that were rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedCard {
    pub races: Vec<Race>,
    pub errors: Vec<ValidationError>,
}

/// Odds recovered from one payload plus the runners that were rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOdds {
    pub snapshot: OddsSnapshot,
    pub errors: Vec<ValidationError>,
}

/// Normalizes any card-shaped payload for `query`.
///
/// Fails only when the payload as a whole is unusable: it is not a card, or
/// it describes a different track or date.
pub fn normalize_card(
    payload: &RawPayload,
    query: &CardQuery,
) -> Result<NormalizedCard, SourceError> {
    let drafts = card_drafts(payload, &query.track)?;
    check_card_identity(payload, &drafts, query)?;
    Ok(assemble_card(&query.track, query.date, drafts.races, payload.fetched_at))
}

/// Normalizes an odds snapshot for the race in `query`, from either a
/// dedicated odds payload or a card that lists prices.
pub fn normalize_odds(
    payload: &RawPayload,
    query: &OddsQuery,
) -> Result<NormalizedOdds, SourceError> {
    let target = query.race_id.race_number();
    let mut runners = RunnerBook::default();

    let as_of = match &payload.body {
        PayloadBody::OddsApiOdds(odds) => {
            check_event(payload, odds.race_number, target)?;
            api_odds_runners(odds, target, &mut runners);
            odds.as_of
                .as_deref()
                .and_then(UtcDateTime::parse)
                .unwrap_or(payload.fetched_at)
        }
        PayloadBody::EnterpriseOdds(odds) => {
            check_event(payload, odds.event_number, target)?;
            enterprise_odds_runners(odds, target, &mut runners);
            odds.as_of
                .as_deref()
                .and_then(UtcDateTime::parse)
                .unwrap_or(payload.fetched_at)
        }
        _ => {
            let card = query.card();
            let drafts = card_drafts(payload, &card.track)?;
            check_card_identity(payload, &drafts, &card)?;

            let mut found = false;
            for race in drafts
                .races
                .iter()
                .filter(|race| parse_race_number(race.number.as_deref()).ok() == Some(target))
            {
                found = true;
                for entry in &race.entries {
                    if entry.scratched {
                        continue;
                    }
                    let odds = entry.live_odds.as_ref().or(entry.morning_line.as_ref());
                    runners.offer(
                        entry.post_position.as_deref(),
                        entry.program_number.clone(),
                        entry.horse_name.clone(),
                        odds,
                        target,
                    );
                }
            }
            if !found {
                return Err(SourceError::not_found(format!(
                    "race {target} is not on the {} card",
                    payload.source
                )));
            }
            payload.fetched_at
        }
    };

    let RunnerBook { runners, errors } = runners;
    if runners.is_empty() {
        return Err(SourceError::not_found(format!(
            "{} lists no prices for race {target}",
            payload.source
        )));
    }

    Ok(NormalizedOdds {
        snapshot: OddsSnapshot {
            race_id: query.race_id.clone(),
            runners: runners.into_values().collect(),
            as_of: Some(as_of),
        },
        errors,
    })
}

/// Distance text to meters: `1 Mile`, `7/8 mile`, `1 1/16 miles`, `1609m`,
/// `1760 yards`, `8f`. A bare number is taken as meters.
pub fn parse_distance_m(raw: &str) -> Option<u32> {
    let text = raw.trim().to_ascii_lowercase().replace(',', "");
    let text = text.trim_end_matches('.');

    if let Some(captures) = MILES.captures(text) {
        let whole = captures
            .get(1)
            .and_then(|value| value.as_str().parse::<f64>().ok());
        let fraction = match (captures.get(2), captures.get(3)) {
            (Some(numerator), Some(denominator)) => {
                let numerator = numerator.as_str().parse::<f64>().ok()?;
                let denominator = denominator.as_str().parse::<f64>().ok()?;
                (denominator > 0.0).then(|| numerator / denominator)
            }
            _ => None,
        };
        let miles = match (whole, fraction) {
            (None, None) => 1.0,
            (whole, fraction) => whole.unwrap_or(0.0) + fraction.unwrap_or(0.0),
        };
        return to_meters(miles, METERS_PER_MILE);
    }

    let captures = MEASURE.captures(text)?;
    let value = captures.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = captures.get(2).map_or("", |unit| unit.as_str());
    distance_in_meters(value, unit)
}

fn distance_in_meters(value: f64, unit: &str) -> Option<u32> {
    let factor = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "m" | "meter" | "meters" | "metre" | "metres" => 1.0,
        "mi" | "mile" | "miles" => METERS_PER_MILE,
        "y" | "yd" | "yds" | "yard" | "yards" => METERS_PER_YARD,
        "f" | "fur" | "furlong" | "furlongs" => METERS_PER_FURLONG,
        _ => return None,
    };
    to_meters(value, factor)
}

fn to_meters(value: f64, factor: f64) -> Option<u32> {
    let meters = (value * factor).round();
    (meters.is_finite() && meters > 0.0 && meters <= f64::from(u32::MAX)).then_some(meters as u32)
}

/// Purse text to dollars: `$15,000` is `15000.0`. The sign is kept so that
/// negative purses can be rejected downstream.
pub fn parse_purse(raw: &str) -> Option<f64> {
    let digits = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
        .collect::<String>();
    digits.parse::<f64>().ok()
}

/// Post time on the track's local clock, from `7:30 PM`, `19:30` or an
/// RFC 3339 instant.
pub fn parse_post_time(raw: &str, track: &Track) -> Option<Time> {
    let text = raw.trim();
    if let Some(instant) = UtcDateTime::parse(text) {
        return Some(track.local_date_time(instant).1);
    }

    let captures = CLOCK_TIME.captures(text)?;
    let mut hour = captures.get(1)?.as_str().parse::<u8>().ok()?;
    let minute = captures.get(2)?.as_str().parse::<u8>().ok()?;
    if let Some(meridiem) = captures.get(3) {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("p");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (hour, true) => hour + 12,
            (hour, false) => hour,
        };
    }
    Time::from_hms(hour, minute, 0).ok()
}

fn parse_race_number(raw: Option<&str>) -> Result<u32, ValidationError> {
    let text = raw.map(str::trim).unwrap_or_default();
    let invalid = || ValidationError::InvalidRaceNumber {
        value: text.to_owned(),
    };

    let captures = RACE_LABEL.captures(text).ok_or_else(invalid)?;
    captures
        .get(1)
        .and_then(|digits| digits.as_str().parse::<u32>().ok())
        .filter(|number| *number > 0)
        .ok_or_else(invalid)
}

fn parse_post_position(raw: &str, race_number: u32) -> Result<u32, ValidationError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|post| *post > 0)
        .ok_or_else(|| ValidationError::InvalidPostPosition {
            race_number: Some(race_number),
            value: raw.trim().to_owned(),
        })
}

fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|value| value.trim().to_ascii_lowercase())
        .is_some_and(|value| {
            matches!(
                value.as_str(),
                "true" | "yes" | "y" | "1" | "scr" | "scratched"
            )
        })
}

fn parse_position(raw: Option<&str>) -> Option<u32> {
    let digits = raw?
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse::<u32>().ok().filter(|position| *position > 0)
}

fn clean(raw: Option<&str>) -> Option<String> {
    let text = raw?.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Odds as delivered, before parsing.
#[derive(Debug, Clone, PartialEq)]
enum RawOdds {
    Decimal(f64),
    Text(String),
}

impl RawOdds {
    fn from_text(raw: Option<&str>) -> Option<Self> {
        clean(raw).map(Self::Text)
    }

    fn from_api(value: Option<&ApiOddsValue>) -> Option<Self> {
        match value? {
            ApiOddsValue::Decimal(decimal) => Some(Self::Decimal(*decimal)),
            ApiOddsValue::Text(text) => Self::from_text(Some(text)),
        }
    }

    fn parse(&self) -> Result<Odds, ValidationError> {
        match self {
            Self::Decimal(decimal) => Odds::from_decimal(*decimal),
            Self::Text(text) => Odds::parse(text),
        }
    }
}

#[derive(Debug, Default)]
struct CardDrafts {
    reported_track: Option<String>,
    reported_date: Option<String>,
    races: Vec<RaceDraft>,
}

#[derive(Debug, Default)]
struct RaceDraft {
    number: Option<String>,
    details: RaceDetails,
    entries: Vec<EntryDraft>,
}

#[derive(Debug, Default)]
struct EntryDraft {
    post_position: Option<String>,
    program_number: Option<String>,
    horse_name: Option<String>,
    driver: Option<String>,
    trainer: Option<String>,
    morning_line: Option<RawOdds>,
    live_odds: Option<RawOdds>,
    scratched: bool,
    finish: Option<FinishResult>,
    stats: Option<EntryStats>,
    observed_at: Option<UtcDateTime>,
}

fn card_drafts(payload: &RawPayload, track: &Track) -> Result<CardDrafts, SourceError> {
    match &payload.body {
        PayloadBody::Scraped(card) => Ok(scraped_drafts(card, track)),
        PayloadBody::OddsApiCard(card) => Ok(api_drafts(card, track)),
        PayloadBody::EnterpriseCard(card) => Ok(enterprise_drafts(card, track)),
        PayloadBody::OddsApiOdds(_) | PayloadBody::EnterpriseOdds(_) => Err(SourceError::parse(
            format!("{} returned an odds document where a card was expected", payload.source),
        )),
    }
}

fn scraped_drafts(card: &ScrapedCard, track: &Track) -> CardDrafts {
    let races = card
        .races
        .iter()
        .map(|race| {
            let conditions = clean(race.conditions.as_deref());
            let gait = race
                .gait
                .as_deref()
                .map(Gait::from_text)
                .filter(|gait| *gait != Gait::Unknown)
                .or_else(|| conditions.as_deref().map(Gait::from_text))
                .unwrap_or_default();

            RaceDraft {
                number: clean(race.race_number.as_deref()),
                details: RaceDetails {
                    post_time: race
                        .post_time
                        .as_deref()
                        .and_then(|raw| parse_post_time(raw, track)),
                    distance_m: race.distance.as_deref().and_then(parse_distance_m),
                    surface: race
                        .surface
                        .as_deref()
                        .map(Surface::from_text)
                        .unwrap_or_default(),
                    gait,
                    purse_cad: race.purse.as_deref().and_then(parse_purse),
                    conditions,
                    status: race
                        .status
                        .as_deref()
                        .map(RaceStatus::from_text)
                        .unwrap_or_default(),
                },
                entries: race
                    .entries
                    .iter()
                    .map(|entry| EntryDraft {
                        post_position: clean(entry.post_position.as_deref()),
                        program_number: clean(entry.program_number.as_deref()),
                        horse_name: clean(entry.horse_name.as_deref()),
                        driver: clean(entry.driver.as_deref()),
                        trainer: clean(entry.trainer.as_deref()),
                        morning_line: RawOdds::from_text(entry.morning_line.as_deref()),
                        live_odds: RawOdds::from_text(entry.odds.as_deref()),
                        scratched: parse_flag(entry.scratched.as_deref()),
                        finish: Some(FinishResult {
                            position: parse_position(entry.finish_position.as_deref()),
                            time: clean(entry.finish_time.as_deref()),
                            margin: None,
                            final_odds: None,
                        }),
                        stats: None,
                        observed_at: entry
                            .updated_at
                            .as_deref()
                            .and_then(UtcDateTime::parse),
                    })
                    .collect(),
            }
        })
        .collect();

    CardDrafts {
        reported_track: clean(card.track.as_deref()),
        reported_date: clean(card.date.as_deref()),
        races,
    }
}

fn api_drafts(card: &ApiCard, track: &Track) -> CardDrafts {
    let races = card
        .races
        .iter()
        .map(|race| {
            let conditions = clean(race.conditions.as_deref());
            RaceDraft {
                number: race.race_number.map(|number| number.to_string()),
                details: RaceDetails {
                    post_time: race
                        .post_time
                        .as_deref()
                        .and_then(|raw| parse_post_time(raw, track)),
                    distance_m: race.distance.as_ref().and_then(api_distance),
                    surface: race
                        .surface
                        .as_deref()
                        .map(Surface::from_text)
                        .unwrap_or_default(),
                    gait: race
                        .gait
                        .as_deref()
                        .or(conditions.as_deref())
                        .map(Gait::from_text)
                        .unwrap_or_default(),
                    purse_cad: race.purse,
                    conditions,
                    status: race
                        .status
                        .as_deref()
                        .map(RaceStatus::from_text)
                        .unwrap_or_default(),
                },
                entries: race
                    .runners
                    .iter()
                    .map(|runner| {
                        let horse = runner.horse.as_ref();
                        EntryDraft {
                            post_position: runner.post_position.map(|post| post.to_string()),
                            program_number: clean(runner.program_number.as_deref()),
                            horse_name: clean(horse.and_then(|horse| horse.name.as_deref())),
                            driver: clean(runner.driver.as_deref()),
                            trainer: clean(runner.trainer.as_deref()),
                            morning_line: RawOdds::from_api(runner.morning_line.as_ref()),
                            live_odds: RawOdds::from_api(runner.odds.as_ref()),
                            scratched: runner.scratched,
                            finish: runner.result.as_ref().map(|result| FinishResult {
                                position: result.position.filter(|position| *position > 0),
                                time: clean(result.time.as_deref()),
                                margin: clean(result.margin.as_deref()),
                                final_odds: None,
                            }),
                            stats: horse.and_then(|horse| horse.stats.as_ref()).map(|stats| {
                                EntryStats {
                                    starts: stats.starts,
                                    wins: stats.wins,
                                    places: stats.places,
                                    shows: stats.shows,
                                    earnings_cad: stats.earnings,
                                }
                            }),
                            observed_at: runner
                                .updated_at
                                .as_deref()
                                .and_then(UtcDateTime::parse),
                        }
                    })
                    .collect(),
            }
        })
        .collect();

    CardDrafts {
        reported_track: clean(card.track.as_deref()).or_else(|| clean(card.track_code.as_deref())),
        reported_date: clean(card.date.as_deref()),
        races,
    }
}

fn api_distance(distance: &ApiDistance) -> Option<u32> {
    distance_in_meters(distance.value, &distance.unit)
}

fn enterprise_drafts(card: &EnterpriseCard, track: &Track) -> CardDrafts {
    let races = card
        .events
        .iter()
        .map(|event| {
            let conditions = clean(event.condition_text.as_deref());
            let gait = match event.gait_code.as_deref().map(str::trim) {
                Some(code) if code.eq_ignore_ascii_case("p") => Gait::Pace,
                Some(code) if code.eq_ignore_ascii_case("t") => Gait::Trot,
                _ => conditions.as_deref().map(Gait::from_text).unwrap_or_default(),
            };

            RaceDraft {
                number: event.event_number.map(|number| number.to_string()),
                details: RaceDetails {
                    post_time: event
                        .scheduled_start
                        .as_deref()
                        .and_then(|raw| parse_post_time(raw, track)),
                    distance_m: event
                        .distance_yards
                        .and_then(|yards| to_meters(yards, METERS_PER_YARD)),
                    surface: event
                        .surface
                        .as_deref()
                        .map(Surface::from_text)
                        .unwrap_or_default(),
                    gait,
                    purse_cad: event.purse_cents.map(cents_to_dollars),
                    conditions,
                    status: event
                        .event_status
                        .as_deref()
                        .map(RaceStatus::from_text)
                        .unwrap_or_default(),
                },
                entries: event
                    .starters
                    .iter()
                    .map(|starter| EntryDraft {
                        post_position: starter.post_position.map(|post| post.to_string()),
                        program_number: clean(starter.program_number.as_deref()),
                        horse_name: clean(starter.horse_name.as_deref()),
                        driver: clean(starter.driver_name.as_deref()),
                        trainer: clean(starter.trainer_name.as_deref()),
                        morning_line: RawOdds::from_text(starter.morning_line.as_deref()),
                        live_odds: RawOdds::from_text(starter.live_odds.as_deref()),
                        scratched: starter.scratched,
                        finish: Some(FinishResult {
                            position: starter.finish_position.filter(|position| *position > 0),
                            time: clean(starter.finish_time.as_deref()),
                            margin: None,
                            final_odds: None,
                        }),
                        stats: starter.lifetime.as_ref().map(|lifetime| EntryStats {
                            starts: lifetime.starts,
                            wins: lifetime.wins,
                            places: lifetime.places,
                            shows: lifetime.shows,
                            earnings_cad: cents_to_dollars(lifetime.earnings_cents),
                        }),
                        observed_at: starter
                            .updated_at
                            .as_deref()
                            .and_then(UtcDateTime::parse),
                    })
                    .collect(),
            }
        })
        .collect();

    let meeting = card.meeting.as_ref();
    CardDrafts {
        reported_track: meeting.and_then(|meeting| {
            clean(meeting.track_name.as_deref()).or_else(|| clean(meeting.track_code.as_deref()))
        }),
        reported_date: meeting.and_then(|meeting| clean(meeting.race_date.as_deref())),
        races,
    }
}

fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

fn check_card_identity(
    payload: &RawPayload,
    drafts: &CardDrafts,
    query: &CardQuery,
) -> Result<(), SourceError> {
    if let Some(reported) = &drafts.reported_track {
        if !reports_track(&query.track, reported) {
            return Err(SourceError::parse(format!(
                "{} returned a card for '{reported}' instead of {}",
                payload.source, query.track.name
            )));
        }
    }

    if let Some(reported) = &drafts.reported_date {
        let date = parse_reported_date(reported).ok_or_else(|| {
            SourceError::parse(format!(
                "{} reported an unreadable race date '{reported}'",
                payload.source
            ))
        })?;
        if date != query.date {
            return Err(SourceError::parse(format!(
                "{} returned the card for {reported} instead of the requested date",
                payload.source
            )));
        }
    }

    Ok(())
}

fn reports_track(track: &Track, reported: &str) -> bool {
    slugify(reported) == track.slug
        || track
            .code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(reported.trim()))
        || TrackCatalog::ontario()
            .find(reported)
            .is_some_and(|known| known.slug == track.slug)
}

fn parse_reported_date(raw: &str) -> Option<Date> {
    parse_iso_date(raw)
        .or_else(|_| parse_compact_date(raw))
        .ok()
        .or_else(|| UtcDateTime::parse(raw).map(|instant| instant.into_inner().date()))
}

fn check_event(payload: &RawPayload, reported: Option<i64>, target: u32) -> Result<(), SourceError> {
    match reported {
        Some(number) if number != i64::from(target) => Err(SourceError::parse(format!(
            "{} returned odds for race {number} instead of race {target}",
            payload.source
        ))),
        _ => Ok(()),
    }
}

fn assemble_card(
    track: &Track,
    date: Date,
    drafts: Vec<RaceDraft>,
    fetched_at: UtcDateTime,
) -> NormalizedCard {
    let mut errors = Vec::new();
    let mut races: BTreeMap<u32, Race> = BTreeMap::new();

    for draft in drafts {
        let race_number = match parse_race_number(draft.number.as_deref()) {
            Ok(number) => number,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        let entries = assemble_entries(race_number, draft.entries, fetched_at, &mut errors);
        let race = match Race::new(track, date, race_number, draft.details, entries) {
            Ok(race) => race,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        match races.entry(race_number) {
            Entry::Vacant(slot) => {
                slot.insert(race);
            }
            Entry::Occupied(mut slot) => {
                match slot.get_mut().apply_update(race) {
                    Ok(rejected) => errors.extend(rejected),
                    Err(error) => errors.push(error),
                }
            }
        }
    }

    NormalizedCard {
        races: races.into_values().collect(),
        errors,
    }
}

/// Builds the field of one race. A horse reported twice at the same post
/// keeps its latest observation; a different horse claiming an occupied post
/// is rejected and the first claimant stays.
fn assemble_entries(
    race_number: u32,
    drafts: Vec<EntryDraft>,
    fetched_at: UtcDateTime,
    errors: &mut Vec<ValidationError>,
) -> Vec<RaceEntry> {
    let mut by_post: BTreeMap<u32, (RaceEntry, (UtcDateTime, usize))> = BTreeMap::new();

    for (sequence, draft) in drafts.into_iter().enumerate() {
        let observed = (draft.observed_at.unwrap_or(fetched_at), sequence);
        let entry = match build_entry(race_number, draft, errors) {
            Ok(entry) => entry,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        match by_post.entry(entry.post_position) {
            Entry::Vacant(slot) => {
                slot.insert((entry, observed));
            }
            Entry::Occupied(mut slot) => {
                let (current, current_observed) = slot.get();
                if current.identity() != entry.identity() {
                    errors.push(ValidationError::DuplicatePostPosition {
                        race_number: Some(race_number),
                        post_position: entry.post_position,
                        horse_name: entry.horse_name,
                    });
                } else if observed >= *current_observed {
                    slot.insert((entry, observed));
                }
            }
        }
    }

    by_post.into_values().map(|(entry, _)| entry).collect()
}

/// Unparseable morning lines are reported and the entry is kept without one.
fn build_entry(
    race_number: u32,
    draft: EntryDraft,
    errors: &mut Vec<ValidationError>,
) -> Result<RaceEntry, ValidationError> {
    let post_position = match draft.post_position.as_deref() {
        Some(raw) => parse_post_position(raw, race_number)?,
        None => {
            return Err(match draft.horse_name {
                Some(horse_name) => ValidationError::MissingPostPosition {
                    race_number: Some(race_number),
                    horse_name,
                },
                None => ValidationError::MissingHorseName {
                    race_number: Some(race_number),
                    post_position: None,
                },
            });
        }
    };

    let horse_name = draft.horse_name.unwrap_or_default();
    let morning_line = match draft.morning_line.as_ref().map(RawOdds::parse) {
        Some(Ok(odds)) => Some(odds),
        Some(Err(error)) => {
            errors.push(error.in_race(race_number));
            None
        }
        None => None,
    };

    RaceEntry::new(&horse_name, post_position)
        .and_then(|entry| {
            entry
                .with_program_number(draft.program_number)
                .with_connections(draft.driver, draft.trainer)
                .with_morning_line(morning_line)
                .with_scratched(draft.scratched)
                .with_finish(draft.finish)
                .with_stats(draft.stats)
        })
        .map_err(|error| error.in_race(race_number))
}

/// Runner prices keyed by post position; later offers replace earlier ones.
#[derive(Debug, Default)]
struct RunnerBook {
    runners: BTreeMap<u32, RunnerOdds>,
    errors: Vec<ValidationError>,
}

impl RunnerBook {
    fn offer(
        &mut self,
        post_position: Option<&str>,
        program_number: Option<String>,
        horse_name: Option<String>,
        odds: Option<&RawOdds>,
        race_number: u32,
    ) {
        let Some(odds) = odds else {
            return;
        };
        let Some(raw_post) = post_position else {
            self.errors.push(ValidationError::MissingPostPosition {
                race_number: Some(race_number),
                horse_name: horse_name.unwrap_or_default(),
            });
            return;
        };

        let priced = parse_post_position(raw_post, race_number).and_then(|post| {
            odds.parse()
                .map(|odds| (post, odds))
                .map_err(|error| error.in_race(race_number))
        });
        match priced {
            Ok((post, odds)) => {
                self.runners
                    .insert(post, RunnerOdds::new(post, program_number, horse_name, odds));
            }
            Err(error) => self.errors.push(error),
        }
    }
}

fn api_odds_runners(odds: &ApiOdds, race_number: u32, book: &mut RunnerBook) {
    for runner in &odds.runners {
        let post = runner.post_position.map(|post| post.to_string());
        book.offer(
            post.as_deref(),
            clean(runner.program_number.as_deref()),
            clean(runner.horse_name.as_deref()),
            RawOdds::from_api(runner.odds.as_ref()).as_ref(),
            race_number,
        );
    }
}

fn enterprise_odds_runners(odds: &EnterpriseOdds, race_number: u32, book: &mut RunnerBook) {
    for price in &odds.prices {
        let post = price.post_position.map(|post| post.to_string());
        book.offer(
            post.as_deref(),
            clean(price.program_number.as_deref()),
            clean(price.horse_name.as_deref()),
            price.decimal_odds.map(RawOdds::Decimal).as_ref(),
            race_number,
        );
    }
}
