//! Deterministic synthetic race cards, the last-resort fallback.
//!
//! Every value is drawn from a `fastrand` generator seeded by the track slug,
//! the date and the race number, so the same inputs always produce the same
//! card and any single race can be regenerated on its own.

use time::{Date, Time};

use crate::domain::format_iso_date;
use crate::{
    EntryStats, Gait, Odds, OddsSnapshot, Race, RaceDetails, RaceEntry, RaceId, RaceStatus,
    RunnerOdds, Track,
};

const RACES_PER_CARD: u32 = 8;
const FIELD_SIZE: u32 = 8;
const FIRST_POST_MINUTES: u32 = 19 * 60;
const POST_INTERVAL_MINUTES: u32 = 15;
const MILE_M: u32 = 1609;

const HORSES: [&str; 16] = [
    "Lightning Strike",
    "Midnight Express",
    "Golden Arrow",
    "Storm Chaser",
    "Fire Dancer",
    "Ice Breaker",
    "Thunder Bolt",
    "Wind Walker",
    "Silver Bullet",
    "Northern Star",
    "Desert Storm",
    "Ocean Breeze",
    "Mountain King",
    "Shadow Runner",
    "Royal Flash",
    "Copper Canyon",
];

const DRIVERS: [&str; 8] = [
    "John MacDonald",
    "Sarah Johnson",
    "Mike Williams",
    "Lisa Brown",
    "David Wilson",
    "Emma Davis",
    "Chris Miller",
    "Amy Taylor",
];

const TRAINERS: [&str; 8] = [
    "Robert Thompson",
    "Mary Anderson",
    "James White",
    "Patricia Harris",
    "Richard Martin",
    "Linda Garcia",
    "Charles Clark",
    "Barbara Lewis",
];

const MORNING_LINES: [&str; 12] = [
    "2-1", "5-2", "3-1", "7-2", "4-1", "9-2", "5-1", "6-1", "8-1", "10-1", "12-1", "15-1",
];

const PURSES: [f64; 7] = [8_000.0, 10_000.0, 12_500.0, 15_000.0, 18_000.0, 22_000.0, 30_000.0];

const CONDITIONS: [&str; 6] = [
    "NW2 PM Races Last 5",
    "NW$10,000 Last 5",
    "Claiming $15,000",
    "Open",
    "Preferred",
    "Maiden",
];

/// Builds plausible, internally consistent cards without any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleDataGenerator;

impl SampleDataGenerator {
    pub fn new() -> Self {
        Self
    }

    /// The synthetic card for `track` on `date`: eight races of eight
    /// starters.
    pub fn card(&self, track: &Track, date: Date) -> Vec<Race> {
        (1..=RACES_PER_CARD)
            .filter_map(|race_number| self.race(track, date, race_number))
            .collect()
    }

    /// One synthetic race. `None` only for race number 0.
    pub fn race(&self, track: &Track, date: Date, race_number: u32) -> Option<Race> {
        let mut rng = fastrand::Rng::with_seed(seed(&track.slug, date, race_number));

        let trot = rng.u8(..5) == 0;
        let mut conditions = CONDITIONS[rng.usize(..CONDITIONS.len())].to_owned();
        conditions.push_str(if trot { " Trot" } else { " Pace" });
        let details = RaceDetails {
            post_time: post_time(race_number),
            distance_m: Some(MILE_M),
            surface: track.surface,
            gait: if trot { Gait::Trot } else { Gait::Pace },
            purse_cad: Some(PURSES[rng.usize(..PURSES.len())]),
            conditions: Some(conditions),
            status: RaceStatus::Scheduled,
        };

        let mut horses = (0..HORSES.len()).collect::<Vec<_>>();
        rng.shuffle(&mut horses);
        let mut drivers = (0..DRIVERS.len()).collect::<Vec<_>>();
        rng.shuffle(&mut drivers);

        let entries = (1..=FIELD_SIZE)
            .zip(horses.into_iter().zip(drivers.into_iter().cycle()))
            .filter_map(|(post, (horse, driver))| {
                let morning_line = Odds::parse(MORNING_LINES[rng.usize(..MORNING_LINES.len())]).ok();
                let trainer = TRAINERS[rng.usize(..TRAINERS.len())];
                RaceEntry::new(HORSES[horse], post)
                    .and_then(|entry| {
                        entry
                            .with_program_number(Some(post.to_string()))
                            .with_connections(
                                Some(DRIVERS[driver].to_owned()),
                                Some(trainer.to_owned()),
                            )
                            .with_morning_line(morning_line)
                            .with_stats(Some(stats(&mut rng)))
                    })
                    .ok()
            })
            .collect();

        Race::new(track, date, race_number, details, entries).ok()
    }

    /// Odds derived from the synthetic card's morning lines, for any race
    /// number.
    pub fn odds(&self, track: &Track, race_id: &RaceId) -> Option<OddsSnapshot> {
        let race = self.race(track, race_id.date(), race_id.race_number())?;
        let mut rng =
            fastrand::Rng::with_seed(seed(&track.slug, race_id.date(), race_id.race_number()) ^ 0x0dd5);

        let runners = race
            .entries
            .iter()
            .filter_map(|entry| {
                let morning_line = entry.morning_line?;
                let drift = 0.85 + rng.f64() * 0.3;
                let decimal = ((morning_line.decimal() * drift) * 20.0).round() / 20.0;
                let odds = Odds::from_decimal(decimal.max(1.05)).ok()?;
                Some(RunnerOdds::new(
                    entry.post_position,
                    entry.program_number.clone(),
                    Some(entry.horse_name.clone()),
                    odds,
                ))
            })
            .collect();

        Some(OddsSnapshot {
            race_id: race.id,
            runners,
            as_of: None,
        })
    }
}

fn post_time(race_number: u32) -> Option<Time> {
    let minutes = u64::from(FIRST_POST_MINUTES)
        + u64::from(POST_INTERVAL_MINUTES) * u64::from(race_number);
    let hour = u8::try_from((minutes / 60) % 24).ok()?;
    let minute = u8::try_from(minutes % 60).ok()?;
    Time::from_hms(hour, minute, 0).ok()
}

fn stats(rng: &mut fastrand::Rng) -> EntryStats {
    let starts = rng.u32(5..60);
    let wins = rng.u32(0..=starts / 4);
    let places = rng.u32(0..=starts / 4);
    let shows = rng.u32(0..=starts / 4);
    let earnings = f64::from(wins) * f64::from(rng.u32(4_000..9_000))
        + f64::from(places + shows) * f64::from(rng.u32(1_000..3_000));

    EntryStats {
        starts,
        wins,
        places,
        shows,
        earnings_cad: earnings,
    }
}

/// FNV-1a over the slug, the ISO date and the race number.
fn seed(slug: &str, date: Date, race_number: u32) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    slug.bytes()
        .chain(format_iso_date(date).into_bytes())
        .chain(race_number.to_le_bytes())
        .fold(OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(PRIME)
        })
}
