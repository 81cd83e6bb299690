//! Cache-then-live-then-synthetic resolution of race cards and odds.
//!
//! A request first looks for an unexpired cached result from any source. On a
//! miss, live sources are tried in descending priority; each attempt passes
//! the source's rate-limiter gate and is bounded by the caller's deadline or
//! the source's request timeout, whichever is sooner. Sources that are not
//! configured, cooling down after an upstream quota rejection or backing off after
//! failures are skipped without waiting. When no live source produces data
//! the answer is synthesized, so every call returns something usable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use time::Date;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::{EnterpriseFeedAdapter, OddsApiAdapter, ScrapedSiteAdapter};
use crate::cache::{CacheKey, CacheLayer, LookupOrigin};
use crate::config::{ConfigError, EngineConfig};
use crate::data_source::{
    CardQuery, Endpoint, OddsQuery, RawPayload, SourceAdapter, SourceError, SourceErrorKind,
    SourceFuture, SourceKind,
};
use crate::domain::serialize_iso_date;
use crate::envelope::EnvelopeError;
use crate::fetch_log::{DataStatus, FetchLog, FetchRecord, FetchStatus};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalizer::{normalize_card, normalize_odds, NormalizedCard, NormalizedOdds};
use crate::rate_limiter::RateLimiter;
use crate::sample_data::SampleDataGenerator;
use crate::source_policy::SourcePolicy;
use crate::{
    FetchResult, Freshness, OddsSnapshot, Race, RaceId, SourceId, Track, TrackCatalog,
    UtcDateTime, ValidationError,
};

/// Race card answer with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceCardResponse {
    pub track: Track,
    #[serde(serialize_with = "serialize_iso_date")]
    pub date: Date,
    pub races: Vec<Race>,
    pub freshness: Freshness,
    pub provenance: SourceId,
    /// Records the supplying source reported but that failed validation.
    pub validation_errors: Vec<ValidationError>,
    pub source_chain: Vec<SourceId>,
    /// One entry per failed or skipped source.
    pub diagnostics: Vec<EnvelopeError>,
    pub fetched_at: UtcDateTime,
    pub latency_ms: u64,
}

impl RaceCardResponse {
    pub fn cache_hit(&self) -> bool {
        self.freshness == Freshness::Cached
    }
}

/// Odds answer with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OddsResponse {
    pub race_id: RaceId,
    pub odds: OddsSnapshot,
    pub freshness: Freshness,
    pub provenance: SourceId,
    pub validation_errors: Vec<ValidationError>,
    pub source_chain: Vec<SourceId>,
    pub diagnostics: Vec<EnvelopeError>,
    pub fetched_at: UtcDateTime,
    pub latency_ms: u64,
}

impl OddsResponse {
    pub fn cache_hit(&self) -> bool {
        self.freshness == Freshness::Cached
    }
}

/// Scheduling state of one source, for the `sources` view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub id: SourceId,
    pub kind: SourceKind,
    pub priority: u16,
    pub configured: bool,
    pub capabilities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_remaining_ms: Option<u64>,
    pub failure_streak: u32,
}

impl SourceSnapshot {
    pub fn status_label(&self) -> &'static str {
        if !self.configured {
            "unconfigured"
        } else if self.cooldown_remaining_ms.is_some() {
            "cooling_down"
        } else if self.backoff_remaining_ms.is_some() {
            "backing_off"
        } else {
            "ready"
        }
    }
}

/// The per-endpoint pieces of the resolution flow.
trait SourceQuery: Sync {
    type Output: Clone + Send + Sync;

    const ENDPOINT: Endpoint;

    fn cache_key(&self) -> String;

    fn ttl(policy: &SourcePolicy) -> Duration;

    fn fetch<'a>(&'a self, adapter: &'a dyn SourceAdapter) -> SourceFuture<'a, RawPayload>;

    fn normalize(&self, payload: &RawPayload) -> Result<Self::Output, SourceError>;

    fn record_count(output: &Self::Output) -> usize;
}

impl SourceQuery for CardQuery {
    type Output = NormalizedCard;

    const ENDPOINT: Endpoint = Endpoint::RaceCard;

    fn cache_key(&self) -> String {
        CardQuery::cache_key(self)
    }

    fn ttl(policy: &SourcePolicy) -> Duration {
        policy.cache_ttl
    }

    fn fetch<'a>(&'a self, adapter: &'a dyn SourceAdapter) -> SourceFuture<'a, RawPayload> {
        adapter.fetch_card(self)
    }

    fn normalize(&self, payload: &RawPayload) -> Result<Self::Output, SourceError> {
        normalize_card(payload, self)
    }

    fn record_count(output: &Self::Output) -> usize {
        output.races.len()
    }
}

impl SourceQuery for OddsQuery {
    type Output = NormalizedOdds;

    const ENDPOINT: Endpoint = Endpoint::Odds;

    fn cache_key(&self) -> String {
        OddsQuery::cache_key(self)
    }

    fn ttl(policy: &SourcePolicy) -> Duration {
        policy.odds_ttl
    }

    fn fetch<'a>(&'a self, adapter: &'a dyn SourceAdapter) -> SourceFuture<'a, RawPayload> {
        adapter.fetch_odds(self)
    }

    fn normalize(&self, payload: &RawPayload) -> Result<Self::Output, SourceError> {
        normalize_odds(payload, self)
    }

    fn record_count(output: &Self::Output) -> usize {
        output.snapshot.runners.len()
    }
}

struct SourceSlot {
    adapter: Arc<dyn SourceAdapter>,
    policy: SourcePolicy,
}

impl SourceSlot {
    fn id(&self) -> SourceId {
        self.policy.source_id
    }
}

/// Outcome of the cache and live stages.
struct Resolution<T> {
    found: Option<FetchResult<T>>,
    source_chain: Vec<SourceId>,
    diagnostics: Vec<EnvelopeError>,
}

/// Builder for [`FallbackOrchestrator`].
///
/// Without explicit adapters the standard set is built: enterprise feed,
/// odds API and the two scraped sites, sharing one HTTP client.
pub struct OrchestratorBuilder {
    config: EngineConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    policies: HashMap<SourceId, SourcePolicy>,
    catalog: TrackCatalog,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            http_client: None,
            adapters: Vec::new(),
            policies: HashMap::new(),
            catalog: TrackCatalog::ontario(),
        }
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport for the standard adapter set.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Registers an adapter. Once any adapter is registered the standard set
    /// is not built.
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Replaces the default policy of `policy.source_id`.
    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policies.insert(policy.source_id, policy);
        self
    }

    pub fn with_catalog(mut self, catalog: TrackCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn build(mut self) -> FallbackOrchestrator {
        let slots = if self.adapters.is_empty() {
            self.standard_slots()
        } else {
            std::mem::take(&mut self.adapters)
                .into_iter()
                .map(|adapter| {
                    let base = self
                        .policies
                        .remove(&adapter.id())
                        .unwrap_or_else(|| adapter.policy());
                    SourceSlot {
                        policy: self.config.apply(base),
                        adapter,
                    }
                })
                .collect()
        };

        let mut slots = slots
            .into_iter()
            .filter(|slot| self.config.includes(slot.id()))
            .collect::<Vec<_>>();
        slots.sort_by(|left, right| {
            right
                .policy
                .priority
                .cmp(&left.policy.priority)
                .then_with(|| left.id().cmp(&right.id()))
        });

        let limiter = RateLimiter::from_policies(slots.iter().map(|slot| &slot.policy));
        FallbackOrchestrator {
            slots,
            catalog: self.catalog,
            cards: CacheLayer::new(),
            odds: CacheLayer::new(),
            limiter,
            cooldowns: Mutex::new(HashMap::new()),
            log: FetchLog::new(),
            generator: SampleDataGenerator::new(),
        }
    }

    fn standard_slots(&mut self) -> Vec<SourceSlot> {
        let http_client = self
            .http_client
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let mut policy_for = |source: SourceId, fallback: fn() -> SourcePolicy| {
            let base = self.policies.remove(&source).unwrap_or_else(fallback);
            self.config.apply(base)
        };

        let enterprise_policy = policy_for(SourceId::Enterprise, SourcePolicy::enterprise_default);
        let odds_api_policy = policy_for(SourceId::OddsApi, SourcePolicy::odds_api_default);
        let woodbine_policy = policy_for(SourceId::Woodbine, SourcePolicy::woodbine_default);
        let sc_policy = policy_for(
            SourceId::StandardbredCanada,
            SourcePolicy::standardbred_canada_default,
        );

        let mut enterprise = EnterpriseFeedAdapter::new(
            Arc::clone(&http_client),
            self.config.enterprise_token.clone(),
        )
        .with_policy(enterprise_policy.clone());
        if let Some(url) = &self.config.enterprise_url {
            enterprise = enterprise.with_base_url(url.as_str());
        }

        let mut odds_api =
            OddsApiAdapter::new(Arc::clone(&http_client), self.config.odds_api_key.clone())
                .with_policy(odds_api_policy.clone());
        if let Some(url) = &self.config.odds_api_url {
            odds_api = odds_api.with_base_url(url.as_str());
        }

        let woodbine = ScrapedSiteAdapter::woodbine(Arc::clone(&http_client))
            .with_policy(woodbine_policy.clone());
        let standardbred_canada =
            ScrapedSiteAdapter::standardbred_canada(http_client).with_policy(sc_policy.clone());

        vec![
            SourceSlot {
                adapter: Arc::new(enterprise),
                policy: enterprise_policy,
            },
            SourceSlot {
                adapter: Arc::new(odds_api),
                policy: odds_api_policy,
            },
            SourceSlot {
                adapter: Arc::new(woodbine),
                policy: woodbine_policy,
            },
            SourceSlot {
                adapter: Arc::new(standardbred_canada),
                policy: sc_policy,
            },
        ]
    }
}

/// The aggregation engine: one instance owns the caches, rate-limiter state,
/// cooldowns and fetch log for the lifetime of the process.
pub struct FallbackOrchestrator {
    slots: Vec<SourceSlot>,
    catalog: TrackCatalog,
    cards: CacheLayer<FetchResult<NormalizedCard>>,
    odds: CacheLayer<FetchResult<NormalizedOdds>>,
    limiter: RateLimiter,
    cooldowns: Mutex<HashMap<SourceId, Instant>>,
    log: FetchLog,
    generator: SampleDataGenerator,
}

impl FallbackOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Standard adapters over the network, configured from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::builder()
            .with_config(EngineConfig::from_env()?)
            .build())
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    pub fn fetch_log(&self) -> &FetchLog {
        &self.log
    }

    /// Sources in the order they are tried.
    pub fn source_order(&self) -> Vec<SourceId> {
        self.slots.iter().map(SourceSlot::id).collect()
    }

    pub fn clear_cache(&self) {
        self.cards.clear();
        self.odds.clear();
    }

    /// Race card for `track` on `date`. Never empty; the freshness tag tells
    /// live, cached and synthetic answers apart.
    pub async fn fetch_race_card(
        &self,
        track: &str,
        date: Date,
    ) -> Result<RaceCardResponse, ValidationError> {
        self.race_card(track, date, None).await
    }

    /// As [`Self::fetch_race_card`], abandoning live attempts at `deadline`.
    pub async fn fetch_race_card_with_deadline(
        &self,
        track: &str,
        date: Date,
        deadline: Instant,
    ) -> Result<RaceCardResponse, ValidationError> {
        self.race_card(track, date, Some(deadline)).await
    }

    pub async fn fetch_odds(&self, race_id: &RaceId) -> Result<OddsResponse, ValidationError> {
        self.race_odds(race_id, None).await
    }

    pub async fn fetch_odds_with_deadline(
        &self,
        race_id: &RaceId,
        deadline: Instant,
    ) -> Result<OddsResponse, ValidationError> {
        self.race_odds(race_id, Some(deadline)).await
    }

    pub fn source_snapshots(&self) -> Vec<SourceSnapshot> {
        self.slots
            .iter()
            .map(|slot| {
                let id = slot.id();
                SourceSnapshot {
                    id,
                    kind: slot.adapter.kind(),
                    priority: slot.policy.priority,
                    configured: slot.adapter.is_configured(),
                    capabilities: slot.adapter.capabilities().supported_endpoints(),
                    cooldown_remaining_ms: self.cooldown_remaining(id).map(millis),
                    backoff_remaining_ms: self.limiter.retry_after(id).map(millis),
                    failure_streak: self.limiter.attempt(id),
                }
            })
            .collect()
    }

    /// Last successful fetch and its age label, per source.
    pub fn data_status(&self) -> Vec<DataStatus> {
        self.log.data_status(&self.source_order())
    }

    async fn race_card(
        &self,
        track: &str,
        date: Date,
        deadline: Option<Instant>,
    ) -> Result<RaceCardResponse, ValidationError> {
        let started = Instant::now();
        let track = self.catalog.resolve(track)?;
        let query = CardQuery::new(track, date);

        let Resolution {
            found,
            mut source_chain,
            diagnostics,
        } = self.resolve(&query, &self.cards, deadline).await;

        let response = match found {
            Some(result) => RaceCardResponse {
                track: query.track,
                date,
                races: result.payload.races,
                freshness: result.freshness,
                provenance: result.source,
                validation_errors: result.payload.errors,
                source_chain,
                diagnostics,
                fetched_at: result.fetched_at,
                latency_ms: elapsed_ms(started),
            },
            None => {
                info!(track = %query.track.slug, date = %date, "no live source answered; serving synthetic card");
                source_chain.push(SourceId::Synthetic);
                RaceCardResponse {
                    races: self.generator.card(&query.track, date),
                    track: query.track,
                    date,
                    freshness: Freshness::Synthetic,
                    provenance: SourceId::Synthetic,
                    validation_errors: Vec::new(),
                    source_chain,
                    diagnostics,
                    fetched_at: UtcDateTime::now(),
                    latency_ms: elapsed_ms(started),
                }
            }
        };
        Ok(response)
    }

    async fn race_odds(
        &self,
        race_id: &RaceId,
        deadline: Option<Instant>,
    ) -> Result<OddsResponse, ValidationError> {
        let started = Instant::now();
        let track = self.catalog.resolve(race_id.track_slug())?;
        let query = OddsQuery::new(race_id.clone(), track);

        let Resolution {
            found,
            mut source_chain,
            diagnostics,
        } = self.resolve(&query, &self.odds, deadline).await;

        let response = match found {
            Some(result) => OddsResponse {
                race_id: race_id.clone(),
                odds: result.payload.snapshot,
                freshness: result.freshness,
                provenance: result.source,
                validation_errors: result.payload.errors,
                source_chain,
                diagnostics,
                fetched_at: result.fetched_at,
                latency_ms: elapsed_ms(started),
            },
            None => {
                info!(race_id = %race_id, "no live source answered; serving synthetic odds");
                source_chain.push(SourceId::Synthetic);
                let odds = self
                    .generator
                    .odds(&query.track, race_id)
                    .unwrap_or_else(|| OddsSnapshot {
                        race_id: race_id.clone(),
                        runners: Vec::new(),
                        as_of: None,
                    });
                OddsResponse {
                    race_id: race_id.clone(),
                    odds,
                    freshness: Freshness::Synthetic,
                    provenance: SourceId::Synthetic,
                    validation_errors: Vec::new(),
                    source_chain,
                    diagnostics,
                    fetched_at: UtcDateTime::now(),
                    latency_ms: elapsed_ms(started),
                }
            }
        };
        Ok(response)
    }

    async fn resolve<Q: SourceQuery>(
        &self,
        query: &Q,
        cache: &CacheLayer<FetchResult<Q::Output>>,
        deadline: Option<Instant>,
    ) -> Resolution<Q::Output> {
        let endpoint = Q::ENDPOINT;
        let query_key = query.cache_key();
        let candidates = self
            .slots
            .iter()
            .filter(|slot| slot.adapter.capabilities().supports(endpoint))
            .collect::<Vec<_>>();

        for slot in &candidates {
            if let Some(hit) = cache.get(&CacheKey::new(slot.id(), query_key.as_str())) {
                debug!(source = %slot.id(), endpoint = %endpoint, query = %query_key, "cache hit");
                return Resolution {
                    source_chain: vec![hit.source],
                    found: Some(hit.into_cached()),
                    diagnostics: Vec::new(),
                };
            }
        }

        let mut source_chain = Vec::new();
        let mut diagnostics = Vec::new();

        for slot in candidates {
            let id = slot.id();

            if !slot.adapter.is_configured() {
                debug!(source = %id, endpoint = %endpoint, "source not configured; skipping");
                self.log_skip(id, endpoint, &query_key, "not configured");
                continue;
            }

            if let Some(remaining) = self.cooldown_remaining(id) {
                debug!(source = %id, remaining_ms = millis(remaining), "source cooling down; skipping");
                self.log_skip(id, endpoint, &query_key, "cooling down");
                diagnostics.push(skip_diagnostic(
                    id,
                    "source.cooling_down",
                    format!(
                        "{id} is cooling down after an upstream quota rejection for another {}s",
                        remaining.as_secs()
                    ),
                ));
                continue;
            }

            if let Some(remaining) = self.limiter.retry_after(id) {
                debug!(source = %id, remaining_ms = millis(remaining), "source backing off; skipping");
                self.log_skip(id, endpoint, &query_key, "backing off");
                diagnostics.push(skip_diagnostic(
                    id,
                    "source.backing_off",
                    format!(
                        "{id} is backing off after repeated failures for another {}ms",
                        millis(remaining)
                    ),
                ));
                continue;
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| deadline <= now) {
                debug!(source = %id, "deadline passed; skipping");
                self.log_skip(id, endpoint, &query_key, "deadline passed");
                diagnostics.push(EnvelopeError::from_source_error(
                    id,
                    &SourceError::timeout("request deadline passed before this source was tried"),
                ));
                continue;
            }

            source_chain.push(id);
            let attempt_deadline = deadline
                .map_or(now + slot.policy.request_timeout, |deadline| {
                    deadline.min(now + slot.policy.request_timeout)
                });
            let key = CacheKey::new(id, query_key.as_str());
            let lookup = tokio::time::timeout_at(
                attempt_deadline,
                cache.get_or_fetch(key, Q::ttl(&slot.policy), || self.attempt(slot, query)),
            )
            .await;

            let (result, ran_fetch) = match lookup {
                Ok(lookup) => (lookup.result, lookup.origin == LookupOrigin::Fetched),
                Err(_) => (
                    Err(SourceError::timeout(format!(
                        "{id} did not answer within {}ms",
                        millis(attempt_deadline.saturating_duration_since(now))
                    ))),
                    true,
                ),
            };
            let latency_ms = elapsed_ms(now);

            match result {
                Ok(found) => {
                    if ran_fetch {
                        self.limiter.record_success(id);
                    }
                    self.log.record(FetchRecord {
                        source: id,
                        endpoint,
                        query: query_key.clone(),
                        status: FetchStatus::Success,
                        records_processed: Q::record_count(&found.payload),
                        error: None,
                        at: found.fetched_at,
                        latency_ms,
                    });
                    return Resolution {
                        found: Some(found),
                        source_chain,
                        diagnostics,
                    };
                }
                Err(error) => {
                    if ran_fetch {
                        self.penalize(slot, &error);
                    }
                    if error.kind() == SourceErrorKind::Unavailable {
                        debug!(source = %id, endpoint = %endpoint, error = %error, "source unavailable");
                    } else {
                        warn!(source = %id, endpoint = %endpoint, code = error.code(), "source attempt failed: {}", error.message());
                    }
                    self.log.record(FetchRecord {
                        source: id,
                        endpoint,
                        query: query_key.clone(),
                        status: FetchStatus::Failed,
                        records_processed: 0,
                        error: Some(error.to_string()),
                        at: UtcDateTime::now(),
                        latency_ms,
                    });
                    diagnostics.push(EnvelopeError::from_source_error(id, &error));
                }
            }
        }

        Resolution {
            found: None,
            source_chain,
            diagnostics,
        }
    }

    /// One live attempt: rate-limiter gate, fetch, normalize.
    async fn attempt<Q: SourceQuery>(
        &self,
        slot: &SourceSlot,
        query: &Q,
    ) -> Result<FetchResult<Q::Output>, SourceError> {
        let id = slot.id();
        let endpoint = Q::ENDPOINT;
        let permit = self.limiter.acquire(id).await;
        debug!(source = %id, attempt = permit.attempt, endpoint = %endpoint, "fetching");

        let payload = query.fetch(slot.adapter.as_ref()).await?;
        let output = query.normalize(&payload)?;
        if Q::record_count(&output) == 0 {
            return Err(SourceError::not_found(format!(
                "{id} returned no usable {endpoint} records"
            )));
        }

        Ok(FetchResult {
            payload: output,
            source: id,
            fetched_at: payload.fetched_at,
            freshness: Freshness::Live,
        })
    }

    fn penalize(&self, slot: &SourceSlot, error: &SourceError) {
        let id = slot.id();
        match error.kind() {
            SourceErrorKind::RateLimitExceeded => {
                let cooldown = error
                    .retry_after()
                    .map_or(slot.policy.quota_cooldown, |wait| {
                        wait.max(slot.policy.quota_cooldown)
                    });
                warn!(source = %id, cooldown_secs = cooldown.as_secs(), "upstream quota exhausted; cooling down");
                self.lock_cooldowns().insert(id, Instant::now() + cooldown);
            }
            // The adapter's own budget refuses again until its wait passes.
            SourceErrorKind::Throttled => {
                debug!(
                    source = %id,
                    wait_ms = error.retry_after().map_or(0, millis),
                    "local request budget spent"
                );
            }
            _ if error.counts_as_failure() => {
                self.limiter.record_failure(id);
            }
            _ => {}
        }
    }

    fn cooldown_remaining(&self, source: SourceId) -> Option<Duration> {
        let mut cooldowns = self.lock_cooldowns();
        let until = *cooldowns.get(&source)?;
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            cooldowns.remove(&source);
            return None;
        }
        Some(remaining)
    }

    fn log_skip(&self, source: SourceId, endpoint: Endpoint, query: &str, reason: &str) {
        self.log.record(FetchRecord {
            source,
            endpoint,
            query: query.to_owned(),
            status: FetchStatus::Skipped,
            records_processed: 0,
            error: Some(reason.to_owned()),
            at: UtcDateTime::now(),
            latency_ms: 0,
        });
    }

    fn lock_cooldowns(&self) -> std::sync::MutexGuard<'_, HashMap<SourceId, Instant>> {
        self.cooldowns
            .lock()
            .expect("cooldown lock should not be poisoned")
    }
}

impl Default for FallbackOrchestrator {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn skip_diagnostic(source: SourceId, code: &str, message: String) -> EnvelopeError {
    EnvelopeError {
        code: code.to_owned(),
        message,
        retryable: Some(true),
        source: Some(source),
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn elapsed_ms(started: Instant) -> u64 {
    millis(started.elapsed())
}
