//! # Domain Models
//!
//! Canonical harness-racing types. Constructors enforce the record invariants
//! and report violations as [`ValidationError`](crate::ValidationError).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Track`] | Racetrack identity, resolved through [`TrackCatalog`] |
//! | [`Race`] | One race on a card, keyed by [`RaceId`] |
//! | [`RaceEntry`] | A starter with connections, odds, stats and finish |
//! | [`Odds`] | Decimal odds parsed from tote notations |
//! | [`OddsSnapshot`] | Prices for a race at a point in time |
//! | [`FetchResult`] | Payload plus source and [`Freshness`] |
//! | [`UtcDateTime`] | UTC timestamp |

mod entry;
mod fetch;
mod odds;
mod race;
mod timestamp;
mod track;

pub use entry::{EntryStats, FinishResult, RaceEntry};
pub use fetch::{FetchResult, Freshness};
pub use odds::{Odds, OddsSnapshot, RunnerOdds};
pub use race::{
    format_compact_date, format_iso_date, parse_compact_date, parse_iso_date, Gait, Race,
    RaceDetails, RaceId, RaceStatus, Surface,
};
pub(crate) use race::serialize_iso_date;
pub use timestamp::UtcDateTime;
pub use track::{slugify, Track, TrackCatalog};
