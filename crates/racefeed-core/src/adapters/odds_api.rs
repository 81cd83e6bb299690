use std::sync::Arc;

use serde::Deserialize;

use super::{fetch_body, text_value};
use crate::data_source::{
    CapabilitySet, CardQuery, OddsQuery, PayloadBody, RawPayload, SourceAdapter, SourceError,
    SourceFuture, SourceKind,
};
use crate::domain::format_iso_date;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::source_policy::SourcePolicy;
use crate::throttling::QuotaBudget;
use crate::SourceId;

pub const DEFAULT_BASE_URL: &str = "https://api.harnessodds.com";
const API_KEY_HEADER: &str = "x-api-key";

/// Race card response of `GET /v1/races`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiCard {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub track_code: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub races: Vec<ApiRace>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiRace {
    #[serde(default)]
    pub race_number: Option<i64>,
    /// RFC 3339 instant.
    #[serde(default)]
    pub post_time: Option<String>,
    #[serde(default)]
    pub distance: Option<ApiDistance>,
    #[serde(default)]
    pub purse: Option<f64>,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub gait: Option<String>,
    #[serde(default)]
    pub surface: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub runners: Vec<ApiRunner>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiDistance {
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiRunner {
    #[serde(default)]
    pub post_position: Option<i64>,
    #[serde(default, deserialize_with = "text_value")]
    pub program_number: Option<String>,
    #[serde(default)]
    pub horse: Option<ApiHorse>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub trainer: Option<String>,
    #[serde(default)]
    pub morning_line: Option<ApiOddsValue>,
    #[serde(default)]
    pub odds: Option<ApiOddsValue>,
    #[serde(default)]
    pub scratched: bool,
    #[serde(default)]
    pub result: Option<ApiResult>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiHorse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stats: Option<ApiStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiStats {
    #[serde(default)]
    pub starts: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub places: u32,
    #[serde(default)]
    pub shows: u32,
    #[serde(default)]
    pub earnings: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub margin: Option<String>,
}

/// Odds are quoted either as decimal numbers or in tote notation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiOddsValue {
    Decimal(f64),
    Text(String),
}

/// Odds response of `GET /v1/races/{race_id}/odds`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiOdds {
    #[serde(default)]
    pub race_number: Option<i64>,
    #[serde(default)]
    pub as_of: Option<String>,
    #[serde(default)]
    pub runners: Vec<ApiOddsRunner>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiOddsRunner {
    #[serde(default)]
    pub post_position: Option<i64>,
    #[serde(default, deserialize_with = "text_value")]
    pub program_number: Option<String>,
    #[serde(default)]
    pub horse_name: Option<String>,
    #[serde(default)]
    pub odds: Option<ApiOddsValue>,
}

/// Authenticated REST API serving race cards and odds snapshots.
#[derive(Clone)]
pub struct OddsApiAdapter {
    base_url: String,
    api_key: Option<String>,
    http_client: Arc<dyn HttpClient>,
    budget: QuotaBudget,
    policy: SourcePolicy,
}

impl OddsApiAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        let policy = SourcePolicy::odds_api_default();
        let budget = policy
            .quota
            .as_ref()
            .map(QuotaBudget::from_policy)
            .unwrap_or_else(|| QuotaBudget::new(std::time::Duration::from_secs(60), 30));
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            http_client,
            budget,
            policy,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        if let Some(quota) = &policy.quota {
            self.budget = QuotaBudget::from_policy(quota);
        }
        self.policy = policy;
        self
    }

    pub fn card_url(&self, query: &CardQuery) -> String {
        let track = query.track.code.as_deref().unwrap_or(&query.track.slug);
        format!(
            "{}/v1/races?track={}&date={}",
            self.base_url,
            urlencoding::encode(track),
            format_iso_date(query.date)
        )
    }

    pub fn odds_url(&self, query: &OddsQuery) -> String {
        format!(
            "{}/v1/races/{}/odds",
            self.base_url,
            urlencoding::encode(&query.race_id.to_string())
        )
    }

    async fn get(&self, url: String) -> Result<String, SourceError> {
        let Some(api_key) = &self.api_key else {
            return Err(SourceError::unavailable("odds api key is not configured"));
        };

        if let Err(wait) = self.budget.try_spend() {
            return Err(SourceError::throttled(
                format!(
                    "odds api request quota spent; next request in {:.2}s",
                    wait.as_secs_f64()
                ),
                wait,
            ));
        }

        let auth = HttpAuth::Header {
            name: String::from(API_KEY_HEADER),
            value: api_key.clone(),
        };
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_auth(&auth)
            .with_timeout(self.policy.request_timeout);

        fetch_body(self.http_client.as_ref(), SourceId::OddsApi, request).await
    }
}

impl SourceAdapter for OddsApiAdapter {
    fn id(&self) -> SourceId {
        SourceId::OddsApi
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AuthenticatedApi
    }

    fn policy(&self) -> SourcePolicy {
        self.policy.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn fetch_card<'a>(&'a self, query: &'a CardQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(async move {
            let body = self.get(self.card_url(query)).await?;
            let card = serde_json::from_str::<ApiCard>(&body).map_err(|error| {
                SourceError::parse(format!("failed to parse odds api race card: {error}"))
            })?;
            Ok(RawPayload::new(SourceId::OddsApi, PayloadBody::OddsApiCard(card)))
        })
    }

    fn fetch_odds<'a>(&'a self, query: &'a OddsQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(async move {
            let body = self.get(self.odds_url(query)).await?;
            let odds = serde_json::from_str::<ApiOdds>(&body).map_err(|error| {
                SourceError::parse(format!("failed to parse odds api snapshot: {error}"))
            })?;
            Ok(RawPayload::new(SourceId::OddsApi, PayloadBody::OddsApiOdds(odds)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{FixtureHttpClient, HttpResponse};
    use crate::{RaceId, TrackCatalog};
    use time::macros::date;

    fn query() -> CardQuery {
        let track = TrackCatalog::ontario().resolve("georgian").expect("catalog track");
        CardQuery::new(track, date!(2024 - 05 - 01))
    }

    #[tokio::test]
    async fn missing_key_is_unavailable_without_a_request() {
        let http = Arc::new(FixtureHttpClient::new());
        let adapter = OddsApiAdapter::new(http.clone(), Some(String::from("  ")));

        assert!(!adapter.is_configured());
        let error = adapter.fetch_card(&query()).await.expect_err("no key");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn sends_key_header_and_parses_card() {
        let body = r#"{"track": "Georgian Downs", "date": "2024-05-01", "races": [
            {"race_number": 1, "distance": {"value": 1, "unit": "mile"}, "purse": 9000,
             "runners": [{"post_position": 1, "program_number": 1,
                          "horse": {"name": "Fire Dancer"}, "odds": "7-2"},
                         {"post_position": 2, "horse": {"name": "Wind Walker"}, "odds": 4.5}]}
        ]}"#;
        let http = Arc::new(FixtureHttpClient::new().with_response(
            "https://api.harnessodds.com/v1/races?track=GEO&date=2024-05-01",
            HttpResponse::ok(body),
        ));
        let adapter = OddsApiAdapter::new(http.clone(), Some(String::from("secret")));

        let payload = adapter.fetch_card(&query()).await.expect("card");

        let PayloadBody::OddsApiCard(card) = payload.body else {
            panic!("expected odds api card");
        };
        let runners = &card.races[0].runners;
        assert_eq!(runners[0].program_number.as_deref(), Some("1"));
        assert_eq!(runners[0].odds, Some(ApiOddsValue::Text(String::from("7-2"))));
        assert_eq!(runners[1].odds, Some(ApiOddsValue::Decimal(4.5)));

        let requests = http.requests();
        assert_eq!(
            requests[0].headers.get(API_KEY_HEADER).map(String::as_str),
            Some("secret")
        );
    }

    #[tokio::test]
    async fn spent_quota_is_reported_before_the_upstream_is_hit() {
        let http = Arc::new(FixtureHttpClient::new().with_response(
            "https://api.harnessodds.com/v1/races",
            HttpResponse::ok(r#"{"races": []}"#),
        ));
        let mut policy = SourcePolicy::odds_api_default();
        policy.quota = Some(crate::source_policy::QuotaPolicy {
            window: std::time::Duration::from_secs(60),
            limit: 1,
        });
        let adapter =
            OddsApiAdapter::new(http.clone(), Some(String::from("secret"))).with_policy(policy);

        adapter.fetch_card(&query()).await.expect("first request fits");
        let error = adapter.fetch_card(&query()).await.expect_err("quota spent");

        assert_eq!(error.kind(), SourceErrorKind::Throttled);
        let wait = error.retry_after().expect("budget reports its wait");
        assert!(wait <= std::time::Duration::from_secs(60));
        assert_eq!(http.request_count(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let http = Arc::new(FixtureHttpClient::new().with_response(
            "https://api.harnessodds.com/v1/races",
            HttpResponse::ok("<html>gateway</html>"),
        ));
        let adapter = OddsApiAdapter::new(http, Some(String::from("secret")));

        let error = adapter.fetch_card(&query()).await.expect_err("not json");
        assert_eq!(error.kind(), SourceErrorKind::Parse);
    }

    #[test]
    fn odds_url_encodes_race_id() {
        let card = query();
        let race_id = RaceId::new(&card.track, card.date, 5).expect("valid race id");
        let adapter = OddsApiAdapter::new(Arc::new(FixtureHttpClient::new()), None);

        assert_eq!(
            adapter.odds_url(&OddsQuery::new(race_id, card.track)),
            "https://api.harnessodds.com/v1/races/georgian-downs%3A2024-05-01%3A5/odds"
        );
    }
}
