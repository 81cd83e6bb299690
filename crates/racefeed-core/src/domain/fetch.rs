use serde::{Deserialize, Serialize};

use crate::{SourceId, UtcDateTime};

/// Provenance tag attached to every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Live,
    Cached,
    Synthetic,
}

impl Freshness {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cached => "cached",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Transient wrapper around a payload returned by an adapter or the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    pub payload: T,
    pub source: SourceId,
    pub fetched_at: UtcDateTime,
    pub freshness: Freshness,
}

impl<T> FetchResult<T> {
    pub fn live(payload: T, source: SourceId) -> Self {
        Self {
            payload,
            source,
            fetched_at: UtcDateTime::now(),
            freshness: Freshness::Live,
        }
    }

    pub fn synthetic(payload: T) -> Self {
        Self {
            payload,
            source: SourceId::Synthetic,
            fetched_at: UtcDateTime::now(),
            freshness: Freshness::Synthetic,
        }
    }

    /// The same result re-tagged as served from cache.
    pub fn into_cached(self) -> Self {
        Self {
            freshness: Freshness::Cached,
            ..self
        }
    }
}
