//! Source adapter contract and the query/payload types shared by adapters.
//!
//! | Endpoint | Query | Raw payload | Normalized by |
//! |----------|-------|-------------|---------------|
//! | Race card | [`CardQuery`] | [`RawPayload`] | [`normalize_card`](crate::normalizer::normalize_card) |
//! | Odds | [`OddsQuery`] | [`RawPayload`] | [`normalize_odds`](crate::normalizer::normalize_odds) |
//!
//! Adapters only fetch and parse the upstream shape. Interpreting units,
//! text formats and invariants is the normalizer's job.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::adapters::enterprise::{EnterpriseCard, EnterpriseOdds};
use crate::adapters::odds_api::{ApiCard, ApiOdds};
use crate::adapters::scraped::ScrapedCard;
use crate::domain::format_iso_date;
use crate::source_policy::SourcePolicy;
use crate::{RaceId, SourceId, Track, UtcDateTime};

/// Data endpoint type used for capability checks and fetch logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    RaceCard,
    Odds,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RaceCard => "race_card",
            Self::Odds => "odds",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport family of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Scraped,
    AuthenticatedApi,
    EnterpriseFeed,
}

impl SourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scraped => "scraped",
            Self::AuthenticatedApi => "authenticated_api",
            Self::EnterpriseFeed => "enterprise_feed",
        }
    }
}

/// Supported endpoint matrix for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub race_card: bool,
    pub odds: bool,
}

impl CapabilitySet {
    pub const fn new(race_card: bool, odds: bool) -> Self {
        Self { race_card, odds }
    }

    pub const fn full() -> Self {
        Self::new(true, true)
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::RaceCard => self.race_card,
            Endpoint::Odds => self.odds,
        }
    }

    pub fn supported_endpoints(self) -> Vec<&'static str> {
        let mut values = Vec::with_capacity(2);
        if self.race_card {
            values.push(Endpoint::RaceCard.as_str());
        }
        if self.odds {
            values.push(Endpoint::Odds.as_str());
        }
        values
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Not configured (for example no API key). A skip signal, not a failure.
    Unavailable,
    Fetch,
    Parse,
    NotFound,
    RateLimitExceeded,
    /// Our own request budget for the source is spent; the upstream was not asked.
    Throttled,
    Timeout,
    Unsupported,
}

/// Structured source error that drives fallback progression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            retry_after: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message, false)
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Fetch, message, true)
    }

    /// The upstream refused the request itself (bad credentials); retrying will not help.
    pub fn fetch_rejected(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Fetch, message, false)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Parse, message, true)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message, false)
    }

    pub fn rate_limit_exceeded(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(SourceErrorKind::RateLimitExceeded, message, true)
        }
    }

    /// Local quota refusal. Only `wait` has to pass before the source is usable again.
    pub fn throttled(message: impl Into<String>, wait: Duration) -> Self {
        Self {
            retry_after: Some(wait),
            ..Self::new(SourceErrorKind::Throttled, message, true)
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message, true)
    }

    pub fn unsupported(endpoint: Endpoint) -> Self {
        Self::new(
            SourceErrorKind::Unsupported,
            format!("endpoint '{endpoint}' is not supported by this source"),
            false,
        )
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Wait requested by the upstream, when it sent one.
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Fetch => "source.fetch",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::RateLimitExceeded => "source.rate_limit_exceeded",
            SourceErrorKind::Throttled => "source.throttled",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Unsupported => "source.unsupported",
        }
    }

    /// Whether this failure should push the source into backoff.
    pub const fn counts_as_failure(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Fetch | SourceErrorKind::Parse | SourceErrorKind::Timeout
        )
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Race card request for one track and race date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardQuery {
    pub track: Track,
    pub date: Date,
}

impl CardQuery {
    pub fn new(track: Track, date: Date) -> Self {
        Self { track, date }
    }

    pub fn cache_key(&self) -> String {
        format!("card:{}:{}", self.track.slug, format_iso_date(self.date))
    }
}

/// Odds request for one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OddsQuery {
    pub race_id: RaceId,
    pub track: Track,
}

impl OddsQuery {
    pub fn new(race_id: RaceId, track: Track) -> Self {
        Self { race_id, track }
    }

    /// The card this race belongs to.
    pub fn card(&self) -> CardQuery {
        CardQuery::new(self.track.clone(), self.race_id.date())
    }

    pub fn cache_key(&self) -> String {
        format!("odds:{}", self.race_id)
    }
}

/// Upstream payload as parsed by an adapter, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub source: SourceId,
    pub fetched_at: UtcDateTime,
    pub body: PayloadBody,
}

impl RawPayload {
    pub fn new(source: SourceId, body: PayloadBody) -> Self {
        Self {
            source,
            fetched_at: UtcDateTime::now(),
            body,
        }
    }
}

/// Adapter-specific payload shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    Scraped(ScrapedCard),
    OddsApiCard(ApiCard),
    OddsApiOdds(ApiOdds),
    EnterpriseCard(EnterpriseCard),
    EnterpriseOdds(EnterpriseOdds),
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; the orchestrator shares them across tasks.
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    fn kind(&self) -> SourceKind;

    /// Default scheduling policy for this adapter.
    fn policy(&self) -> SourcePolicy;

    fn capabilities(&self) -> CapabilitySet;

    /// `false` when required credentials are missing.
    fn is_configured(&self) -> bool {
        true
    }

    fn fetch_card<'a>(&'a self, query: &'a CardQuery) -> SourceFuture<'a, RawPayload>;

    fn fetch_odds<'a>(&'a self, query: &'a OddsQuery) -> SourceFuture<'a, RawPayload>;
}
