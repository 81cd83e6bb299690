use std::time::Duration;

use thiserror::Error;

use crate::source_policy::SourcePolicy;
use crate::SourceId;

pub const ODDS_API_KEY: [&str; 2] = ["RACEFEED_ODDS_API_KEY", "ODDS_API_KEY"];
pub const ENTERPRISE_TOKEN: [&str; 2] = ["RACEFEED_ENTERPRISE_TOKEN", "ENTERPRISE_FEED_TOKEN"];
pub const ODDS_API_URL: &str = "RACEFEED_ODDS_API_URL";
pub const ENTERPRISE_URL: &str = "RACEFEED_ENTERPRISE_URL";
pub const CACHE_TTL_SECS: &str = "RACEFEED_CACHE_TTL_SECS";
pub const MIN_SPACING_MS: &str = "RACEFEED_MIN_SPACING_MS";
pub const SOURCE_PRIORITY: &str = "RACEFEED_SOURCE_PRIORITY";
pub const REQUEST_TIMEOUT_MS: &str = "RACEFEED_REQUEST_TIMEOUT_MS";

/// Malformed configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{variable} must be a non-negative integer, got '{value}'")]
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
    #[error("{variable} must be an http(s) URL, got '{value}'")]
    InvalidUrl {
        variable: &'static str,
        value: String,
    },
    #[error("{variable} lists '{value}', which is not a live source")]
    InvalidSource {
        variable: &'static str,
        value: String,
    },
    #[error("{variable} lists '{source_id}' more than once")]
    DuplicateSource {
        variable: &'static str,
        source_id: SourceId,
    },
    #[error("{variable} must list at least one source")]
    EmptySourcePriority { variable: &'static str },
}

/// Engine settings taken from the environment.
///
/// Every field is optional; an absent value leaves the source policy
/// defaults in place. Empty variables count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub odds_api_key: Option<String>,
    pub enterprise_token: Option<String>,
    pub odds_api_url: Option<String>,
    pub enterprise_url: Option<String>,
    /// Result lifetime for every source; zero disables caching.
    pub cache_ttl: Option<Duration>,
    pub min_spacing: Option<Duration>,
    /// Only the listed sources are used, highest priority first.
    pub source_priority: Option<Vec<SourceId>>,
    pub request_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let read_first = |names: [&str; 2]| names.into_iter().find_map(read);

        Ok(Self {
            odds_api_key: read_first(ODDS_API_KEY),
            enterprise_token: read_first(ENTERPRISE_TOKEN),
            odds_api_url: read(ODDS_API_URL)
                .map(|value| parse_url(ODDS_API_URL, value))
                .transpose()?,
            enterprise_url: read(ENTERPRISE_URL)
                .map(|value| parse_url(ENTERPRISE_URL, value))
                .transpose()?,
            cache_ttl: read(CACHE_TTL_SECS)
                .map(|value| parse_number(CACHE_TTL_SECS, &value).map(Duration::from_secs))
                .transpose()?,
            min_spacing: read(MIN_SPACING_MS)
                .map(|value| parse_number(MIN_SPACING_MS, &value).map(Duration::from_millis))
                .transpose()?,
            source_priority: read(SOURCE_PRIORITY)
                .map(|value| parse_priority(SOURCE_PRIORITY, &value))
                .transpose()?,
            request_timeout: read(REQUEST_TIMEOUT_MS)
                .map(|value| parse_number(REQUEST_TIMEOUT_MS, &value).map(Duration::from_millis))
                .transpose()?,
        })
    }

    pub fn with_odds_api_key(mut self, key: impl Into<String>) -> Self {
        self.odds_api_key = Some(key.into());
        self
    }

    pub fn with_enterprise_token(mut self, token: impl Into<String>) -> Self {
        self.enterprise_token = Some(token.into());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = Some(spacing);
        self
    }

    pub fn with_source_priority(mut self, sources: Vec<SourceId>) -> Self {
        self.source_priority = Some(sources);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Whether `source` takes part under the priority override.
    pub fn includes(&self, source: SourceId) -> bool {
        self.source_priority
            .as_ref()
            .is_none_or(|sources| sources.contains(&source))
    }

    /// Applies the overrides to a source's default policy.
    pub fn apply(&self, mut policy: SourcePolicy) -> SourcePolicy {
        if let Some(ttl) = self.cache_ttl {
            policy = policy.with_cache_ttl(ttl);
        }
        if let Some(spacing) = self.min_spacing {
            policy = policy.with_min_spacing(spacing);
        }
        if let Some(timeout) = self.request_timeout {
            policy = policy.with_request_timeout(timeout);
        }
        if let Some(sources) = &self.source_priority {
            if let Some(index) = sources.iter().position(|source| *source == policy.source_id) {
                let rank = u16::try_from(sources.len() - index).unwrap_or(u16::MAX);
                policy = policy.with_priority(rank.saturating_mul(100));
            }
        }
        policy
    }
}

fn parse_number(variable: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        variable,
        value: value.to_owned(),
    })
}

fn parse_url(variable: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_owned())
    } else {
        Err(ConfigError::InvalidUrl { variable, value })
    }
}

fn parse_priority(variable: &'static str, value: &str) -> Result<Vec<SourceId>, ConfigError> {
    let mut sources = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
        let source = raw
            .parse::<SourceId>()
            .ok()
            .filter(|source| source.is_live())
            .ok_or_else(|| ConfigError::InvalidSource {
                variable,
                value: raw.to_owned(),
            })?;
        if sources.contains(&source) {
            return Err(ConfigError::DuplicateSource {
                variable,
                source_id: source,
            });
        }
        sources.push(source);
    }

    if sources.is_empty() {
        return Err(ConfigError::EmptySourcePriority { variable });
    }
    Ok(sources)
}
