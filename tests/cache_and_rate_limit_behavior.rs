//! Behavior tests for the cache, per-source spacing, backoff and quota budgets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use racefeed_core::{
    Backoff, CacheKey, CacheLayer, LookupOrigin, QuotaBudget, RateLimiter, SourceId,
    SourcePolicy,
};
use tokio::time::Instant;

fn policy(source: SourceId) -> SourcePolicy {
    SourcePolicy::default_for(source).expect("live source has a policy")
}

// =============================================================================
// Cache: Expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_odds_age_past_their_ttl_the_card_is_still_served() {
    // Given: A card and an odds snapshot stored with the odds API's TTLs
    let odds_api = policy(SourceId::OddsApi);
    let cache = CacheLayer::<String, String>::new();
    let card_key = CacheKey::new(SourceId::OddsApi, "card:wbm:2024-05-01");
    let odds_key = CacheKey::new(SourceId::OddsApi, "odds:woodbine-mohawk-park:2024-05-01:3");
    cache.put(card_key.clone(), String::from("card"), odds_api.cache_ttl);
    cache.put(odds_key.clone(), String::from("odds"), odds_api.odds_ttl);

    // When: More than the odds TTL passes
    tokio::time::advance(odds_api.odds_ttl + Duration::from_secs(1)).await;

    // Then: Only the card survives
    assert_eq!(cache.get(&card_key), Some(String::from("card")));
    assert_eq!(cache.get(&odds_key), None);
}

#[tokio::test(start_paused = true)]
async fn entries_are_keyed_by_source_as_well_as_query() {
    let cache = CacheLayer::<u32, String>::new();
    let ttl = Duration::from_secs(60);

    cache.put(CacheKey::new(SourceId::Woodbine, "card:wbm"), 1, ttl);
    cache.put(CacheKey::new(SourceId::Enterprise, "card:wbm"), 2, ttl);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&CacheKey::new(SourceId::Woodbine, "card:wbm")), Some(1));
    assert_eq!(cache.get(&CacheKey::new(SourceId::Enterprise, "card:wbm")), Some(2));
    assert_eq!(cache.get(&CacheKey::new(SourceId::OddsApi, "card:wbm")), None);
}

#[tokio::test(start_paused = true)]
async fn a_fetched_value_is_served_from_cache_until_it_expires() {
    let cache = CacheLayer::<u32, String>::new();
    let key = CacheKey::new(SourceId::Woodbine, "card:wbm");
    let ttl = Duration::from_secs(300);

    let first = cache.get_or_fetch(key.clone(), ttl, || async { Ok(1) }).await;
    let second = cache.get_or_fetch(key.clone(), ttl, || async { Ok(2) }).await;
    tokio::time::advance(ttl).await;
    let third = cache.get_or_fetch(key, ttl, || async { Ok(3) }).await;

    assert_eq!((first.result, first.origin), (Ok(1), LookupOrigin::Fetched));
    assert_eq!((second.result, second.origin), (Ok(1), LookupOrigin::Cache));
    assert_eq!((third.result, third.origin), (Ok(3), LookupOrigin::Fetched));
}

// =============================================================================
// Cache: Single Flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_five_tasks_ask_at_once_the_upstream_is_called_once() {
    // Given: A slow fetch and five tasks asking for the same key
    let cache = CacheLayer::<u32, String>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let handles = (0..5)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(
                        CacheKey::new(SourceId::Woodbine, "card:wbm"),
                        Duration::from_secs(300),
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            Ok(7)
                        },
                    )
                    .await
            })
        })
        .collect::<Vec<_>>();

    // When: All of them complete
    let mut origins = Vec::new();
    for handle in handles {
        let lookup = handle.await.expect("task completes");
        assert_eq!(lookup.result, Ok(7));
        origins.push(lookup.origin);
    }

    // Then: One task fetched and the rest joined it
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        origins
            .iter()
            .filter(|origin| **origin == LookupOrigin::Fetched)
            .count(),
        1
    );
    assert_eq!(
        origins
            .iter()
            .filter(|origin| **origin == LookupOrigin::Joined)
            .count(),
        4
    );
}

#[tokio::test(start_paused = true)]
async fn a_failed_fetch_is_retried_by_the_next_caller() {
    let cache = CacheLayer::<u32, String>::new();
    let key = CacheKey::new(SourceId::OddsApi, "odds:race");
    let ttl = Duration::from_secs(30);

    let failed = cache
        .get_or_fetch(key.clone(), ttl, || async { Err(String::from("upstream 503")) })
        .await;
    let retried = cache.get_or_fetch(key, ttl, || async { Ok(4) }).await;

    assert_eq!(failed.result, Err(String::from("upstream 503")));
    assert_eq!((retried.result, retried.origin), (Ok(4), LookupOrigin::Fetched));
}

// =============================================================================
// Rate Limiter: Spacing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sources_are_spaced_by_their_own_policies() {
    // Given: A limiter built from the default policies
    let policies = [policy(SourceId::Enterprise), policy(SourceId::Woodbine)];
    let limiter = RateLimiter::from_policies(&policies);

    // When: Each source is called twice in a row
    let started = Instant::now();
    limiter.acquire(SourceId::Enterprise).await;
    limiter.acquire(SourceId::Enterprise).await;
    let enterprise_elapsed = started.elapsed();

    let started = Instant::now();
    limiter.acquire(SourceId::Woodbine).await;
    limiter.acquire(SourceId::Woodbine).await;
    let woodbine_elapsed = started.elapsed();

    // Then: Each waits only its own spacing
    assert_eq!(enterprise_elapsed, Duration::from_millis(250));
    assert_eq!(woodbine_elapsed, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn unregistered_sources_get_a_two_second_spacing() {
    let limiter = RateLimiter::new();

    let started = Instant::now();
    limiter.acquire(SourceId::StandardbredCanada).await;
    limiter.acquire(SourceId::StandardbredCanada).await;

    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

// =============================================================================
// Rate Limiter: Backoff
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_a_source_keeps_failing_its_backoff_doubles_up_to_the_cap() {
    // Given: A source with a 1s base and 8s cap
    let limiter = RateLimiter::new();
    limiter.register(
        SourceId::OddsApi,
        Duration::ZERO,
        Backoff::exponential(Duration::from_secs(1), Duration::from_secs(8)),
    );

    // When: It fails five times
    let delays = (0..5)
        .map(|_| limiter.record_failure(SourceId::OddsApi))
        .collect::<Vec<_>>();

    // Then: Delays double and stop at the cap
    assert_eq!(
        delays,
        [1, 2, 4, 8, 8].map(Duration::from_secs).to_vec()
    );
    assert_eq!(limiter.attempt(SourceId::OddsApi), 5);

    // And: The next request is held for the whole backoff
    let started = Instant::now();
    let permit = limiter.acquire(SourceId::OddsApi).await;
    assert_eq!(started.elapsed(), Duration::from_secs(8));
    assert_eq!(permit.attempt, 5);
    assert_eq!(limiter.retry_after(SourceId::OddsApi), None);
}

#[tokio::test(start_paused = true)]
async fn a_success_clears_the_failure_streak() {
    let limiter = RateLimiter::from_policies(&[policy(SourceId::Enterprise)]);

    limiter.record_failure(SourceId::Enterprise);
    limiter.record_failure(SourceId::Enterprise);
    assert!(limiter.retry_after(SourceId::Enterprise).is_some());

    limiter.record_success(SourceId::Enterprise);

    assert_eq!(limiter.attempt(SourceId::Enterprise), 0);
    assert_eq!(limiter.retry_after(SourceId::Enterprise), None);
    let started = Instant::now();
    limiter.acquire(SourceId::Enterprise).await;
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[test]
fn jitter_only_ever_lengthens_the_delay() {
    let backoff = Backoff::exponential(Duration::from_secs(2), Duration::from_secs(60)).with_jitter();

    for attempt in 0..6 {
        let floor = backoff.floor(attempt);
        for _ in 0..20 {
            let delay = backoff.delay(attempt);
            assert!(delay >= floor, "{delay:?} < {floor:?}");
            assert!(delay <= floor + floor / 2, "{delay:?} exceeds +50%");
        }
    }
    assert_eq!(backoff.floor(0), Duration::from_secs(2));
    assert_eq!(backoff.floor(10), Duration::from_secs(60));
}

// =============================================================================
// Quota Budget
// =============================================================================

#[test]
fn when_the_quota_is_spent_the_budget_reports_the_wait() {
    // Given: Three requests per minute
    let budget = QuotaBudget::new(Duration::from_secs(60), 3);

    // When: A fourth request is attempted straight away
    for _ in 0..3 {
        assert!(budget.try_spend().is_ok());
    }
    let refused = budget.try_spend();

    // Then: It is refused with a wait no longer than one slot
    let wait = refused.expect_err("quota spent");
    assert!(wait > Duration::ZERO);
    assert!(wait <= Duration::from_secs(20));
}

#[test]
fn the_odds_api_budget_follows_its_documented_quota() {
    let odds_api = policy(SourceId::OddsApi);
    let quota = odds_api.quota.expect("odds api has a quota");
    let budget = QuotaBudget::from_policy(&quota);

    let granted = (0..quota.limit + 5)
        .filter(|_| budget.try_spend().is_ok())
        .count();

    assert_eq!(granted, 30);
}
