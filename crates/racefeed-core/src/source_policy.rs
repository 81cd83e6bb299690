use std::time::Duration;

use crate::retry::Backoff;
use crate::SourceId;

/// Static, per-source scheduling declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePolicy {
    pub source_id: SourceId,
    /// Higher is tried first.
    pub priority: u16,
    /// Minimum gap between two requests against this source.
    pub min_spacing: Duration,
    /// Lifetime of a cached race card.
    pub cache_ttl: Duration,
    /// Lifetime of a cached odds snapshot.
    pub odds_ttl: Duration,
    pub request_timeout: Duration,
    pub backoff: Backoff,
    /// How long the source is skipped after it reports quota exhaustion.
    pub quota_cooldown: Duration,
    pub quota: Option<QuotaPolicy>,
}

/// Documented upstream request quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub window: Duration,
    pub limit: u32,
}

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const QUOTA_COOLDOWN: Duration = Duration::from_secs(3_600);

impl SourcePolicy {
    pub fn enterprise_default() -> Self {
        Self {
            source_id: SourceId::Enterprise,
            priority: 400,
            min_spacing: Duration::from_millis(250),
            cache_ttl: DEFAULT_CACHE_TTL,
            odds_ttl: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
            backoff: Backoff::exponential(Duration::from_millis(500), Duration::from_secs(60))
                .with_jitter(),
            quota_cooldown: QUOTA_COOLDOWN,
            quota: None,
        }
    }

    pub fn odds_api_default() -> Self {
        Self {
            source_id: SourceId::OddsApi,
            priority: 300,
            min_spacing: Duration::from_secs(1),
            cache_ttl: DEFAULT_CACHE_TTL,
            odds_ttl: Duration::from_secs(30),
            request_timeout: Duration::from_secs(8),
            backoff: Backoff::exponential(Duration::from_secs(1), Duration::from_secs(120))
                .with_jitter(),
            quota_cooldown: QUOTA_COOLDOWN,
            quota: Some(QuotaPolicy {
                window: Duration::from_secs(60),
                limit: 30,
            }),
        }
    }

    pub fn woodbine_default() -> Self {
        Self {
            source_id: SourceId::Woodbine,
            priority: 200,
            min_spacing: Duration::from_secs(2),
            cache_ttl: DEFAULT_CACHE_TTL,
            odds_ttl: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            backoff: Backoff::default(),
            quota_cooldown: QUOTA_COOLDOWN,
            quota: None,
        }
    }

    pub fn standardbred_canada_default() -> Self {
        Self {
            source_id: SourceId::StandardbredCanada,
            priority: 100,
            ..Self::woodbine_default()
        }
    }

    pub fn default_for(source_id: SourceId) -> Option<Self> {
        match source_id {
            SourceId::Enterprise => Some(Self::enterprise_default()),
            SourceId::OddsApi => Some(Self::odds_api_default()),
            SourceId::Woodbine => Some(Self::woodbine_default()),
            SourceId::StandardbredCanada => Some(Self::standardbred_canada_default()),
            SourceId::Synthetic => None,
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_spacing(mut self, min_spacing: Duration) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    /// Overrides both result lifetimes.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self.odds_ttl = self.odds_ttl.min(ttl);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_quota_cooldown(mut self, cooldown: Duration) -> Self {
        self.quota_cooldown = cooldown;
        self
    }
}
