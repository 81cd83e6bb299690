//! Behavior tests for the fallback orchestrator.
//!
//! Adapters are scripted in-process so every test controls exactly which
//! source answers, fails or stalls. Time is paused, so spacing, TTLs and
//! deadlines are exercised without real waiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use racefeed_core::adapters::odds_api::{ApiCard, ApiHorse, ApiRace, ApiRunner};
use racefeed_core::domain::format_iso_date;
use racefeed_core::{
    CapabilitySet, CardQuery, DataFreshness, EngineConfig, FallbackOrchestrator, FetchStatus,
    FixtureHttpClient, Freshness, HttpResponse, OddsApiAdapter, OddsQuery, PayloadBody,
    QuotaPolicy, RaceId, RawPayload, SourceAdapter, SourceError, SourceFuture, SourceId,
    SourceKind, SourcePolicy, TrackCatalog,
};
use racefeed_tests::mohawk;
use time::macros::date;
use tokio::time::Instant;

const TRACK: &str = "Woodbine Mohawk Park";

/// In-process adapter whose next outcome is set by the test.
struct ScriptedAdapter {
    id: SourceId,
    configured: bool,
    latency: Duration,
    failure: Mutex<Option<SourceError>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(id: SourceId, configured: bool, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            configured,
            latency,
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn answering(id: SourceId) -> Arc<Self> {
        Self::new(id, true, Duration::ZERO)
    }

    fn failing(id: SourceId, error: SourceError) -> Arc<Self> {
        let adapter = Self::answering(id);
        adapter.fail_with(Some(error));
        adapter
    }

    fn slow(id: SourceId, latency: Duration) -> Arc<Self> {
        Self::new(id, true, latency)
    }

    fn unconfigured(id: SourceId) -> Arc<Self> {
        Self::new(id, false, Duration::ZERO)
    }

    fn fail_with(&self, error: Option<SourceError>) {
        *self.failure.lock().expect("script lock") = error;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, query: &CardQuery) -> Result<RawPayload, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.failure.lock().expect("script lock").clone() {
            return Err(error);
        }
        Ok(card_payload(self.id, query))
    }
}

impl SourceAdapter for ScriptedAdapter {
    fn id(&self) -> SourceId {
        self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AuthenticatedApi
    }

    fn policy(&self) -> SourcePolicy {
        SourcePolicy::default_for(self.id)
            .expect("live source")
            .with_min_spacing(Duration::ZERO)
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn fetch_card<'a>(&'a self, query: &'a CardQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(self.answer(query))
    }

    fn fetch_odds<'a>(&'a self, query: &'a OddsQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(async move { self.answer(&query.card()).await })
    }
}

fn card_payload(source: SourceId, query: &CardQuery) -> RawPayload {
    let runners = ["Fire Dancer", "Wind Walker", "Storm Chaser"]
        .into_iter()
        .zip(1_i64..)
        .map(|(name, post)| ApiRunner {
            post_position: Some(post),
            horse: Some(ApiHorse {
                name: Some(name.to_owned()),
                stats: None,
            }),
            ..ApiRunner::default()
        })
        .collect();

    RawPayload::new(
        source,
        PayloadBody::OddsApiCard(ApiCard {
            track: Some(query.track.name.clone()),
            track_code: None,
            date: Some(format_iso_date(query.date)),
            races: vec![ApiRace {
                race_number: Some(1),
                purse: Some(12_000.0),
                runners,
                ..ApiRace::default()
            }],
        }),
    )
}

fn engine(adapters: &[&Arc<ScriptedAdapter>]) -> FallbackOrchestrator {
    engine_with(EngineConfig::default(), adapters)
}

fn engine_with(config: EngineConfig, adapters: &[&Arc<ScriptedAdapter>]) -> FallbackOrchestrator {
    adapters
        .iter()
        .fold(
            FallbackOrchestrator::builder().with_config(config),
            |builder, adapter| builder.with_adapter(Arc::clone(adapter) as Arc<dyn SourceAdapter>),
        )
        .build()
}

fn codes(diagnostics: &[racefeed_core::EnvelopeError]) -> Vec<&str> {
    diagnostics.iter().map(|error| error.code.as_str()).collect()
}

// =============================================================================
// Orchestrator: Never Empty
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_every_source_fails_the_card_is_synthetic_and_not_empty() {
    // Given: Both live sources fail at the transport level
    let enterprise =
        ScriptedAdapter::failing(SourceId::Enterprise, SourceError::fetch("connection reset"));
    let odds_api = ScriptedAdapter::failing(SourceId::OddsApi, SourceError::fetch("dns failure"));
    let engine = engine(&[&enterprise, &odds_api]);

    // When: A card is requested
    let card = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 01))
        .await
        .expect("valid request");

    // Then: Synthetic races are served, with the failed attempts recorded
    assert_eq!(card.freshness, Freshness::Synthetic);
    assert_eq!(card.provenance, SourceId::Synthetic);
    assert!(!card.races.is_empty());
    assert_eq!(
        card.source_chain,
        vec![SourceId::Enterprise, SourceId::OddsApi, SourceId::Synthetic]
    );
    assert_eq!(codes(&card.diagnostics), vec!["source.fetch", "source.fetch"]);
}

#[tokio::test(start_paused = true)]
async fn offline_odds_fall_back_to_synthetic_prices() {
    // Given: The standard source set over a transport that knows no URLs
    let engine = FallbackOrchestrator::builder()
        .with_http_client(Arc::new(FixtureHttpClient::new()))
        .build();
    let track = TrackCatalog::ontario().resolve("georgian").expect("catalog track");
    let race_id = RaceId::new(&track, date!(2024 - 05 - 01), 3).expect("valid race id");

    // When: Odds are requested
    let odds = engine.fetch_odds(&race_id).await.expect("valid request");

    // Then: Every runner has a price and the answer is tagged synthetic
    assert_eq!(odds.freshness, Freshness::Synthetic);
    assert_eq!(odds.source_chain.last(), Some(&SourceId::Synthetic));
    assert!(!odds.odds.runners.is_empty());
    assert!(odds
        .odds
        .runners
        .iter()
        .all(|runner| runner.odds.decimal() > 1.0));
}

#[tokio::test(start_paused = true)]
async fn synthetic_odds_cover_the_largest_race_number() {
    // Given: Nothing live answers and the race number is at its ceiling
    let engine = FallbackOrchestrator::builder()
        .with_http_client(Arc::new(FixtureHttpClient::new()))
        .build();
    let track = mohawk();
    let race_id = RaceId::new(&track, date!(2024 - 05 - 01), u32::MAX).expect("valid race id");

    // When: Odds are requested
    let odds = engine.fetch_odds(&race_id).await.expect("valid request");

    // Then: A synthetic field is priced for that race
    assert_eq!(odds.freshness, Freshness::Synthetic);
    assert_eq!(odds.race_id, race_id);
    assert!(!odds.odds.runners.is_empty());
}

// =============================================================================
// Orchestrator: Cache and Single-Flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_two_identical_requests_overlap_only_one_live_fetch_runs() {
    // Given: A source that takes a while to answer
    let woodbine = ScriptedAdapter::slow(SourceId::Woodbine, Duration::from_millis(200));
    let engine = engine(&[&woodbine]);
    let race_date = date!(2024 - 05 - 01);

    // When: Two callers ask for the same card concurrently
    let (first, second) = tokio::join!(
        engine.fetch_race_card(TRACK, race_date),
        engine.fetch_race_card(TRACK, race_date),
    );

    // Then: The upstream was called once and both callers got its answer
    let first = first.expect("valid request");
    let second = second.expect("valid request");
    assert_eq!(woodbine.calls(), 1);
    assert_eq!(first.provenance, SourceId::Woodbine);
    assert_eq!(second.provenance, SourceId::Woodbine);
    assert_eq!(first.races, second.races);
}

#[tokio::test(start_paused = true)]
async fn cached_cards_are_served_until_the_ttl_expires() {
    let woodbine = ScriptedAdapter::answering(SourceId::Woodbine);
    let engine = engine(&[&woodbine]);
    let race_date = date!(2024 - 05 - 01);

    let live = engine.fetch_race_card(TRACK, race_date).await.expect("valid");
    assert_eq!(live.freshness, Freshness::Live);

    let cached = engine.fetch_race_card("mohawk", race_date).await.expect("valid");
    assert_eq!(cached.freshness, Freshness::Cached);
    assert!(cached.cache_hit());
    assert_eq!(cached.source_chain, vec![SourceId::Woodbine]);
    assert_eq!(woodbine.calls(), 1);

    // Default card TTL is five minutes.
    tokio::time::advance(Duration::from_secs(301)).await;

    let refreshed = engine.fetch_race_card(TRACK, race_date).await.expect("valid");
    assert_eq!(refreshed.freshness, Freshness::Live);
    assert_eq!(woodbine.calls(), 2);
}

// =============================================================================
// Orchestrator: Fallback Progression
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_the_first_source_fails_the_next_one_supplies_live_data() {
    // Given: Priority [enterprise, odds api]; enterprise fails
    let enterprise =
        ScriptedAdapter::failing(SourceId::Enterprise, SourceError::fetch("502 bad gateway"));
    let odds_api = ScriptedAdapter::answering(SourceId::OddsApi);
    let engine = engine(&[&enterprise, &odds_api]);

    // When: A card is requested
    let card = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 01))
        .await
        .expect("valid request");

    // Then: The answer is live from the second source
    assert_eq!(card.freshness, Freshness::Live);
    assert_eq!(card.provenance, SourceId::OddsApi);
    assert_eq!(card.source_chain, vec![SourceId::Enterprise, SourceId::OddsApi]);
    assert_eq!(codes(&card.diagnostics), vec!["source.fetch"]);
    assert_eq!(card.races[0].entries.len(), 3);

    // And: The fetch log saw one failure and one success
    let statuses = engine
        .fetch_log()
        .records()
        .iter()
        .map(|record| (record.source, record.status))
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            (SourceId::Enterprise, FetchStatus::Failed),
            (SourceId::OddsApi, FetchStatus::Success),
        ]
    );
    let odds_api_status = engine
        .data_status()
        .into_iter()
        .find(|status| status.source == SourceId::OddsApi)
        .expect("listed");
    assert_eq!(odds_api_status.freshness, DataFreshness::Fresh);
}

#[tokio::test(start_paused = true)]
async fn failed_sources_back_off_instead_of_being_retried_immediately() {
    let enterprise =
        ScriptedAdapter::failing(SourceId::Enterprise, SourceError::fetch("connection reset"));
    let odds_api = ScriptedAdapter::answering(SourceId::OddsApi);
    let engine = engine(&[&enterprise, &odds_api]);
    let race_date = date!(2024 - 05 - 01);

    engine.fetch_race_card(TRACK, race_date).await.expect("valid");
    engine.clear_cache();
    let second = engine.fetch_race_card(TRACK, race_date).await.expect("valid");

    assert_eq!(enterprise.calls(), 1);
    assert_eq!(codes(&second.diagnostics), vec!["source.backing_off"]);
    assert_eq!(second.provenance, SourceId::OddsApi);
}

#[tokio::test(start_paused = true)]
async fn quota_exhaustion_cools_a_source_down_for_an_hour() {
    // Given: Enterprise reports its upstream quota spent
    let enterprise = ScriptedAdapter::failing(
        SourceId::Enterprise,
        SourceError::rate_limit_exceeded("429 too many requests", None),
    );
    let odds_api = ScriptedAdapter::answering(SourceId::OddsApi);
    let engine = engine(&[&enterprise, &odds_api]);
    let race_date = date!(2024 - 05 - 01);

    let first = engine.fetch_race_card(TRACK, race_date).await.expect("valid");
    assert_eq!(first.provenance, SourceId::OddsApi);
    assert_eq!(codes(&first.diagnostics), vec!["source.rate_limit_exceeded"]);

    // When: A different card is requested while the cooldown runs
    enterprise.fail_with(None);
    let during = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 02))
        .await
        .expect("valid");

    // Then: Enterprise is not contacted again
    assert_eq!(enterprise.calls(), 1);
    assert_eq!(codes(&during.diagnostics), vec!["source.cooling_down"]);
    let snapshot = engine
        .source_snapshots()
        .into_iter()
        .find(|snapshot| snapshot.id == SourceId::Enterprise)
        .expect("listed");
    assert_eq!(snapshot.status_label(), "cooling_down");

    // And: After the cooldown it is tried first again
    tokio::time::advance(Duration::from_secs(3_601)).await;
    let after = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 03))
        .await
        .expect("valid");
    assert_eq!(enterprise.calls(), 2);
    assert_eq!(after.provenance, SourceId::Enterprise);
}

fn odds_api_card_body(race_date: &str) -> String {
    format!(
        r#"{{"track": "Woodbine Mohawk Park", "date": "{race_date}",
            "races": [{{"race_number": 1, "purse": 15000,
                        "runners": [{{"post_position": 1, "horse": {{"name": "Fire Dancer"}}}},
                                    {{"post_position": 2, "horse": {{"name": "Wind Walker"}}}}]}}]}}"#
    )
}

#[tokio::test(start_paused = true)]
async fn a_spent_local_quota_only_skips_the_source_until_the_budget_refills() {
    // Given: The odds API allows one request per minute
    let http = ["2024-05-01", "2024-05-02", "2024-05-03"].into_iter().fold(
        FixtureHttpClient::new(),
        |http, race_date| {
            http.with_response(
                format!("https://api.harnessodds.com/v1/races?track=WBM&date={race_date}"),
                HttpResponse::ok(odds_api_card_body(race_date)),
            )
        },
    );
    let http = Arc::new(http);
    let mut policy = SourcePolicy::odds_api_default().with_min_spacing(Duration::ZERO);
    policy.quota = Some(QuotaPolicy {
        window: Duration::from_secs(60),
        limit: 1,
    });
    let odds_api = OddsApiAdapter::new(http.clone(), Some(String::from("api-key")))
        .with_policy(policy.clone());
    let engine = FallbackOrchestrator::builder()
        .with_adapter(Arc::new(odds_api))
        .with_policy(policy)
        .build();

    // When: Two cards are requested inside the same minute
    let first = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 01))
        .await
        .expect("valid request");
    let second = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 02))
        .await
        .expect("valid request");

    // Then: The second is refused locally without reaching the upstream
    assert_eq!(first.freshness, Freshness::Live);
    assert_eq!(second.freshness, Freshness::Synthetic);
    assert_eq!(codes(&second.diagnostics), vec!["source.throttled"]);
    assert_eq!(http.request_count(), 1);

    // And: Once the budget refills the source is live again, with no hour-long cooldown
    tokio::time::advance(Duration::from_secs(120)).await;
    let third = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 03))
        .await
        .expect("valid request");
    assert_eq!(third.freshness, Freshness::Live);
    assert_eq!(third.provenance, SourceId::OddsApi);
    assert!(third.diagnostics.is_empty());
    assert_eq!(http.request_count(), 2);
    let snapshot = engine
        .source_snapshots()
        .into_iter()
        .find(|snapshot| snapshot.id == SourceId::OddsApi)
        .expect("listed");
    assert_ne!(snapshot.status_label(), "cooling_down");
}

#[tokio::test(start_paused = true)]
async fn unconfigured_sources_are_skipped_silently() {
    let enterprise = ScriptedAdapter::unconfigured(SourceId::Enterprise);
    let woodbine = ScriptedAdapter::answering(SourceId::Woodbine);
    let engine = engine(&[&enterprise, &woodbine]);

    let card = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 01))
        .await
        .expect("valid request");

    assert_eq!(enterprise.calls(), 0);
    assert_eq!(card.source_chain, vec![SourceId::Woodbine]);
    assert!(card.diagnostics.is_empty());
}

// =============================================================================
// Orchestrator: Configuration and Deadlines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn priority_override_reorders_and_limits_sources() {
    // Given: Default order would be enterprise, odds api, woodbine
    let enterprise = ScriptedAdapter::answering(SourceId::Enterprise);
    let odds_api = ScriptedAdapter::answering(SourceId::OddsApi);
    let woodbine = ScriptedAdapter::answering(SourceId::Woodbine);
    let config = EngineConfig::default()
        .with_source_priority(vec![SourceId::Woodbine, SourceId::Enterprise]);

    // When: The override lists woodbine first and leaves odds api out
    let engine = engine_with(config, &[&enterprise, &odds_api, &woodbine]);
    let card = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 01))
        .await
        .expect("valid request");

    // Then: Woodbine answers and odds api is never considered
    assert_eq!(
        engine.source_order(),
        vec![SourceId::Woodbine, SourceId::Enterprise]
    );
    assert_eq!(card.provenance, SourceId::Woodbine);
    assert_eq!(enterprise.calls(), 0);
    assert_eq!(odds_api.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_passed_deadline_abandons_live_sources_for_synthetic_data() {
    // Given: The top source stalls for five seconds
    let enterprise = ScriptedAdapter::slow(SourceId::Enterprise, Duration::from_secs(5));
    let odds_api = ScriptedAdapter::answering(SourceId::OddsApi);
    let engine = engine(&[&enterprise, &odds_api]);
    let started = Instant::now();

    // When: The caller allows one second
    let card = engine
        .fetch_race_card_with_deadline(
            TRACK,
            date!(2024 - 05 - 01),
            started + Duration::from_secs(1),
        )
        .await
        .expect("valid request");

    // Then: The answer arrives at the deadline, synthesized
    assert_eq!(card.freshness, Freshness::Synthetic);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(codes(&card.diagnostics), vec!["source.timeout", "source.timeout"]);
    assert_eq!(odds_api.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_source_past_its_request_timeout_gives_way_to_the_next() {
    // Given: Enterprise (5s request timeout) stalls for six seconds
    let enterprise = ScriptedAdapter::slow(SourceId::Enterprise, Duration::from_secs(6));
    let odds_api = ScriptedAdapter::answering(SourceId::OddsApi);
    let engine = engine(&[&enterprise, &odds_api]);
    let started = Instant::now();

    // When: A card is requested with no caller deadline
    let card = engine
        .fetch_race_card(TRACK, date!(2024 - 05 - 01))
        .await
        .expect("valid request");

    // Then: Enterprise is abandoned at its timeout and the odds API answers live
    assert_eq!(card.freshness, Freshness::Live);
    assert_eq!(card.provenance, SourceId::OddsApi);
    assert_eq!(card.source_chain, vec![SourceId::Enterprise, SourceId::OddsApi]);
    assert_eq!(codes(&card.diagnostics), vec!["source.timeout"]);
    assert_eq!(enterprise.calls(), 1);
    assert_eq!(odds_api.calls(), 1);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn blank_track_names_are_rejected() {
    let engine = engine(&[&ScriptedAdapter::answering(SourceId::Woodbine)]);

    let error = engine
        .fetch_race_card("   ", date!(2024 - 05 - 01))
        .await
        .expect_err("blank track");

    assert_eq!(error, racefeed_core::ValidationError::EmptyTrackName);
}
