use std::sync::Arc;
use std::time::Duration;

use racefeed_core::{
    normalize_card, normalize_odds, CardQuery, EnterpriseFeedAdapter, Endpoint, FixtureHttpClient,
    HttpError, HttpResponse, OddsApiAdapter, OddsQuery, RaceId, ScrapedSiteAdapter, SourceAdapter,
    SourceErrorKind, SourceId, SourceKind,
};
use racefeed_tests::mohawk;
use time::macros::date;

const ENTERPRISE_HOST: &str = "https://feeds.harnessdata.ca";
const ODDS_API_HOST: &str = "https://api.harnessodds.com";
const WOODBINE_HOST: &str = "https://woodbine.com";
const STANDARDBRED_CANADA_HOST: &str = "https://standardbredcanada.ca";

const ENTERPRISE_CARD: &str = r#"{
    "meeting": {"trackName": "Woodbine Mohawk Park", "trackCode": "WBM", "raceDate": "20240501"},
    "events": [{"eventNumber": 1, "scheduledStart": "2024-05-01T23:15:00Z",
                "distanceYards": 1760, "purseCents": 1500000, "gaitCode": "P",
                "starters": [{"postPosition": 1, "horseName": "Fire Dancer", "morningLine": "5-2"},
                             {"postPosition": 2, "horseName": "Wind Walker", "morningLine": "3-1"}]}]
}"#;

const ENTERPRISE_ODDS: &str = r#"{
    "eventNumber": 1, "asOf": "2024-05-01T23:00:00Z",
    "prices": [{"postPosition": 1, "horseName": "Fire Dancer", "decimalOdds": 3.5},
               {"postPosition": 2, "horseName": "Wind Walker", "decimalOdds": 4.0}]
}"#;

const ODDS_API_CARD: &str = r#"{
    "track": "Woodbine Mohawk Park", "date": "2024-05-01",
    "races": [{"race_number": 1, "post_time": "2024-05-01T23:15:00Z",
               "distance": {"value": 1, "unit": "mile"}, "purse": 15000,
               "runners": [{"post_position": 1, "horse": {"name": "Fire Dancer"}, "morning_line": "5-2"},
                           {"post_position": 2, "horse": {"name": "Wind Walker"}, "morning_line": 4.0}]}]
}"#;

const ODDS_API_ODDS: &str = r#"{
    "race_number": 1, "as_of": "2024-05-01T23:00:00Z",
    "runners": [{"post_position": 1, "horse_name": "Fire Dancer", "odds": "5-2"},
                {"post_position": 2, "horse_name": "Wind Walker", "odds": 4.0}]
}"#;

const CARD_PAGE: &str = r#"
    <html><body>
      <div class="race-card">
        <span class="race-number">Race 1</span>
        <span class="post-time">7:15 PM</span>
        <span class="distance">1 Mile</span>
        <span class="purse">$15,000</span>
        <table>
          <tr class="entry-row">
            <td class="post-position">1</td><td class="horse-name">Fire Dancer</td>
            <td class="morning-line">5-2</td>
          </tr>
          <tr class="entry-row">
            <td class="post-position">2</td><td class="horse-name">Wind Walker</td>
            <td class="morning-line">3-1</td>
          </tr>
        </table>
      </div>
    </body></html>
"#;

/// One adapter under contract, wired to a fixture transport.
struct SourceCase {
    id: SourceId,
    kind: SourceKind,
    host: &'static str,
    http: Arc<FixtureHttpClient>,
    adapter: Arc<dyn SourceAdapter>,
}

impl SourceCase {
    fn enterprise(http: FixtureHttpClient) -> Self {
        let http = Arc::new(http);
        Self {
            id: SourceId::Enterprise,
            kind: SourceKind::EnterpriseFeed,
            host: ENTERPRISE_HOST,
            adapter: Arc::new(EnterpriseFeedAdapter::new(
                http.clone(),
                Some(String::from("partner-token")),
            )),
            http,
        }
    }

    fn odds_api(http: FixtureHttpClient) -> Self {
        let http = Arc::new(http);
        Self {
            id: SourceId::OddsApi,
            kind: SourceKind::AuthenticatedApi,
            host: ODDS_API_HOST,
            adapter: Arc::new(OddsApiAdapter::new(http.clone(), Some(String::from("api-key")))),
            http,
        }
    }

    fn woodbine(http: FixtureHttpClient) -> Self {
        let http = Arc::new(http);
        Self {
            id: SourceId::Woodbine,
            kind: SourceKind::Scraped,
            host: WOODBINE_HOST,
            adapter: Arc::new(ScrapedSiteAdapter::woodbine(http.clone())),
            http,
        }
    }

    fn standardbred_canada(http: FixtureHttpClient) -> Self {
        let http = Arc::new(http);
        Self {
            id: SourceId::StandardbredCanada,
            kind: SourceKind::Scraped,
            host: STANDARDBRED_CANADA_HOST,
            adapter: Arc::new(ScrapedSiteAdapter::standardbred_canada(http.clone())),
            http,
        }
    }
}

/// Every live source with fixtures serving a one-race Mohawk card and its odds.
fn serving_cases() -> Vec<SourceCase> {
    vec![
        SourceCase::enterprise(
            FixtureHttpClient::new()
                .with_response(
                    "https://feeds.harnessdata.ca/feeds/harness/cards/WBM/20240501",
                    HttpResponse::ok(ENTERPRISE_CARD),
                )
                .with_response(
                    "https://feeds.harnessdata.ca/feeds/harness/odds/WBM/20240501/1",
                    HttpResponse::ok(ENTERPRISE_ODDS),
                ),
        ),
        SourceCase::odds_api(
            FixtureHttpClient::new()
                .with_response(
                    "https://api.harnessodds.com/v1/races?track=WBM&date=2024-05-01",
                    HttpResponse::ok(ODDS_API_CARD),
                )
                .with_response(
                    "https://api.harnessodds.com/v1/races/",
                    HttpResponse::ok(ODDS_API_ODDS),
                ),
        ),
        SourceCase::woodbine(FixtureHttpClient::new().with_response(
            "https://woodbine.com/mohawk/racing/2024-05-01",
            HttpResponse::ok(CARD_PAGE),
        )),
        SourceCase::standardbred_canada(FixtureHttpClient::new().with_response(
            "https://standardbredcanada.ca/racing/entries/wbm/2024-05-01",
            HttpResponse::ok(CARD_PAGE),
        )),
    ]
}

/// Every live source with one canned reply for any URL on its host.
fn failing_cases(reply: impl Fn(&str) -> FixtureHttpClient) -> Vec<SourceCase> {
    vec![
        SourceCase::enterprise(reply(ENTERPRISE_HOST)),
        SourceCase::odds_api(reply(ODDS_API_HOST)),
        SourceCase::woodbine(reply(WOODBINE_HOST)),
        SourceCase::standardbred_canada(reply(STANDARDBRED_CANADA_HOST)),
    ]
}

fn card_query() -> CardQuery {
    CardQuery::new(mohawk(), date!(2024 - 05 - 01))
}

fn odds_query() -> OddsQuery {
    let track = mohawk();
    let race_id = RaceId::new(&track, date!(2024 - 05 - 01), 1).expect("valid race id");
    OddsQuery::new(race_id, track)
}

// =============================================================================
// Contract: Identity and Capabilities
// =============================================================================

#[test]
fn every_adapter_reports_its_identity_and_capabilities() {
    for case in serving_cases() {
        assert_eq!(case.adapter.id(), case.id, "source '{}': id", case.id);
        assert_eq!(case.adapter.kind(), case.kind, "source '{}': kind", case.id);
        assert_eq!(
            case.adapter.policy().source_id,
            case.id,
            "source '{}': policy belongs to the source",
            case.id
        );
        assert!(case.adapter.is_configured(), "source '{}': configured", case.id);

        let capabilities = case.adapter.capabilities();
        assert!(
            capabilities.supports(Endpoint::RaceCard),
            "source '{}': race card",
            case.id
        );
        assert!(
            capabilities.supports(Endpoint::Odds),
            "source '{}': odds",
            case.id
        );
    }
}

// =============================================================================
// Contract: Race Cards
// =============================================================================

#[tokio::test]
async fn every_adapter_returns_a_card_that_normalizes() {
    let query = card_query();

    for case in serving_cases() {
        let payload = case.adapter.fetch_card(&query).await.unwrap_or_else(|error| {
            panic!("source '{}' card fetch failed: {error}", case.id)
        });
        assert_eq!(payload.source, case.id, "source '{}': payload tag", case.id);

        let card = normalize_card(&payload, &query).unwrap_or_else(|error| {
            panic!("source '{}' card did not normalize: {error}", case.id)
        });
        assert_eq!(card.races.len(), 1, "source '{}': race count", case.id);
        assert!(card.errors.is_empty(), "source '{}': {:?}", case.id, card.errors);

        let race = &card.races[0];
        assert_eq!(race.race_number, 1, "source '{}': race number", case.id);
        assert_eq!(race.details.distance_m, Some(1609), "source '{}': distance", case.id);
        assert_eq!(race.entries.len(), 2, "source '{}': entries", case.id);
        assert_eq!(
            race.entries[0].horse_name, "Fire Dancer",
            "source '{}': first horse",
            case.id
        );
        assert!(
            case.http.requests_to(case.host) >= 1,
            "source '{}': request went to its own host",
            case.id
        );
    }
}

#[tokio::test]
async fn every_adapter_returns_odds_for_the_requested_race() {
    let query = odds_query();

    for case in serving_cases() {
        let payload = case.adapter.fetch_odds(&query).await.unwrap_or_else(|error| {
            panic!("source '{}' odds fetch failed: {error}", case.id)
        });

        let odds = normalize_odds(&payload, &query).unwrap_or_else(|error| {
            panic!("source '{}' odds did not normalize: {error}", case.id)
        });
        assert_eq!(odds.snapshot.race_id, query.race_id, "source '{}'", case.id);
        assert_eq!(odds.snapshot.runners.len(), 2, "source '{}': runners", case.id);
        assert!(
            odds.snapshot
                .runners
                .iter()
                .all(|runner| runner.odds.decimal() > 1.0),
            "source '{}': decimal odds above evens floor",
            case.id
        );
    }
}

// =============================================================================
// Contract: Failure Taxonomy
// =============================================================================

#[tokio::test]
async fn missing_pages_are_not_found() {
    let query = card_query();

    for case in failing_cases(|_| FixtureHttpClient::new()) {
        let error = case
            .adapter
            .fetch_card(&query)
            .await
            .expect_err("nothing is served");
        assert_eq!(error.kind(), SourceErrorKind::NotFound, "source '{}'", case.id);
        assert!(!error.counts_as_failure(), "source '{}': no backoff", case.id);
    }
}

#[tokio::test]
async fn upstream_quota_exhaustion_carries_the_retry_hint() {
    let query = card_query();
    let cases = failing_cases(|host| {
        FixtureHttpClient::new().with_response(
            host,
            HttpResponse::new(429, "").with_header("Retry-After", "90"),
        )
    });

    for case in cases {
        let error = case
            .adapter
            .fetch_card(&query)
            .await
            .expect_err("quota exhausted");
        assert_eq!(
            error.kind(),
            SourceErrorKind::RateLimitExceeded,
            "source '{}'",
            case.id
        );
        assert_eq!(
            error.retry_after(),
            Some(Duration::from_secs(90)),
            "source '{}': retry hint",
            case.id
        );
        assert_eq!(case.http.request_count(), 1, "source '{}': stops at once", case.id);
    }
}

#[tokio::test]
async fn server_errors_and_timeouts_count_as_failures() {
    let query = card_query();

    let server_errors =
        failing_cases(|host| FixtureHttpClient::new().with_response(host, HttpResponse::new(503, "")));
    for case in server_errors {
        let error = case.adapter.fetch_card(&query).await.expect_err("503");
        assert_eq!(error.kind(), SourceErrorKind::Fetch, "source '{}'", case.id);
        assert!(error.counts_as_failure(), "source '{}'", case.id);
    }

    let timeouts = failing_cases(|host| {
        FixtureHttpClient::new().with_error(host, HttpError::timeout("deadline elapsed"))
    });
    for case in timeouts {
        let error = case.adapter.fetch_card(&query).await.expect_err("timeout");
        assert_eq!(error.kind(), SourceErrorKind::Timeout, "source '{}'", case.id);
        assert!(error.counts_as_failure(), "source '{}'", case.id);
    }
}

#[tokio::test]
async fn unparseable_bodies_are_parse_errors() {
    let query = card_query();
    let cases = failing_cases(|host| {
        FixtureHttpClient::new().with_response(host, HttpResponse::ok("<html>under maintenance</html>"))
    });

    for case in cases {
        let error = case.adapter.fetch_card(&query).await.expect_err("garbage");
        assert_eq!(error.kind(), SourceErrorKind::Parse, "source '{}'", case.id);
    }
}

// =============================================================================
// Contract: Credentials
// =============================================================================

#[tokio::test]
async fn credentialed_sources_without_credentials_make_no_request() {
    let query = card_query();
    let http = Arc::new(FixtureHttpClient::new());
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(EnterpriseFeedAdapter::new(http.clone(), None)),
        Arc::new(OddsApiAdapter::new(http.clone(), Some(String::from("   ")))),
    ];

    for adapter in adapters {
        assert!(!adapter.is_configured(), "source '{}'", adapter.id());
        let error = adapter.fetch_card(&query).await.expect_err("no credentials");
        assert_eq!(
            error.kind(),
            SourceErrorKind::Unavailable,
            "source '{}'",
            adapter.id()
        );
    }
    assert_eq!(http.request_count(), 0);
}

#[tokio::test]
async fn rejected_credentials_are_not_retried() {
    let query = card_query();
    let cases = failing_cases(|host| {
        FixtureHttpClient::new().with_response(host, HttpResponse::new(401, "unauthorized"))
    });

    for case in cases.into_iter().take(2) {
        let error = case.adapter.fetch_card(&query).await.expect_err("401");
        assert_eq!(error.code(), "source.fetch", "source '{}'", case.id);
        assert!(!error.retryable(), "source '{}'", case.id);
    }
}
