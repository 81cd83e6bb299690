//! # Racefeed Core
//!
//! Multi-source aggregation engine for harness-racing race cards and odds.
//!
//! ## Overview
//!
//! Callers ask for a race card or an odds snapshot; the engine decides which
//! source to query, enforces per-source spacing and caching, normalizes the
//! payload into one schema and falls back to deterministic synthetic data
//! when no live source answers.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Scraped sites, authenticated odds API, enterprise feed |
//! | [`cache`] | TTL cache with single-flight collapsing |
//! | [`config`] | Environment-driven engine configuration |
//! | [`data_source`] | Adapter trait, queries, raw payloads, source errors |
//! | [`domain`] | Tracks, races, entries, odds |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Record validation errors |
//! | [`fetch_log`] | Record of fetch attempts and data freshness |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`normalizer`] | Payload to canonical model mapping |
//! | [`orchestrator`] | Cache, live and synthetic fallback |
//! | [`rate_limiter`] | Per-source spacing and failure backoff |
//! | [`retry`] | Backoff schedules |
//! | [`sample_data`] | Deterministic synthetic cards |
//! | [`source`] | Source identifiers |
//! | [`source_policy`] | Per-source scheduling declarations |
//! | [`throttling`] | Local accounting of upstream quotas |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use racefeed_core::FallbackOrchestrator;
//! use time::macros::date;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = FallbackOrchestrator::from_env()?;
//!
//!     let card = engine
//!         .fetch_race_card("Woodbine Mohawk Park", date!(2024 - 05 - 01))
//!         .await?;
//!     println!("{} races ({})", card.races.len(), card.freshness.as_str());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────┐
//! │ FallbackOrchestrator │────▶│ CacheLayer   │
//! └──────────┬───────────┘     └──────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐     ┌──────────────┐
//! │ RateLimiter          │────▶│ SourceAdapter│──▶ HttpClient
//! └──────────────────────┘     └──────┬───────┘
//!                                     │ RawPayload
//!                                     ▼
//!                              ┌──────────────┐
//!                              │ Normalizer   │──▶ Race / OddsSnapshot
//!                              └──────────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod fetch_log;
pub mod http_client;
pub mod normalizer;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod sample_data;
pub mod source;
pub mod source_policy;
pub mod throttling;

pub use adapters::{
    EnterpriseFeedAdapter, OddsApiAdapter, ScrapeSelectors, ScrapedSiteAdapter, SiteProfile,
};
pub use cache::{CacheKey, CacheLayer, Lookup, LookupOrigin};
pub use config::{ConfigError, EngineConfig};
pub use data_source::{
    CapabilitySet, CardQuery, Endpoint, OddsQuery, PayloadBody, RawPayload, SourceAdapter,
    SourceError, SourceErrorKind, SourceFuture, SourceKind,
};
pub use domain::{
    EntryStats, FetchResult, FinishResult, Freshness, Gait, Odds, OddsSnapshot, Race, RaceDetails,
    RaceEntry, RaceId, RaceStatus, RunnerOdds, Surface, Track, TrackCatalog, UtcDateTime,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, SCHEMA_VERSION};
pub use error::ValidationError;
pub use fetch_log::{DataFreshness, DataStatus, FetchLog, FetchRecord, FetchStatus};
pub use http_client::{
    FixtureHttpClient, HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use normalizer::{normalize_card, normalize_odds, NormalizedCard, NormalizedOdds};
pub use orchestrator::{
    FallbackOrchestrator, OddsResponse, OrchestratorBuilder, RaceCardResponse, SourceSnapshot,
};
pub use rate_limiter::{Permit, RateLimiter};
pub use retry::Backoff;
pub use sample_data::SampleDataGenerator;
pub use source::SourceId;
pub use source_policy::{QuotaPolicy, SourcePolicy};
pub use throttling::QuotaBudget;
