use std::sync::Arc;

use serde::Deserialize;

use super::{fetch_body, text_value};
use crate::data_source::{
    CapabilitySet, CardQuery, OddsQuery, PayloadBody, RawPayload, SourceAdapter, SourceError,
    SourceFuture, SourceKind,
};
use crate::domain::format_compact_date;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::source_policy::SourcePolicy;
use crate::{SourceId, Track};

pub const DEFAULT_BASE_URL: &str = "https://feeds.harnessdata.ca";

/// Card document of the partner feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseCard {
    #[serde(default)]
    pub meeting: Option<EnterpriseMeeting>,
    #[serde(default)]
    pub events: Vec<EnterpriseEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseMeeting {
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub track_code: Option<String>,
    /// `YYYYMMDD`.
    #[serde(default)]
    pub race_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseEvent {
    #[serde(default)]
    pub event_number: Option<i64>,
    #[serde(default)]
    pub scheduled_start: Option<String>,
    #[serde(default)]
    pub distance_yards: Option<f64>,
    #[serde(default)]
    pub purse_cents: Option<i64>,
    #[serde(default)]
    pub condition_text: Option<String>,
    /// `P` (pace) or `T` (trot).
    #[serde(default)]
    pub gait_code: Option<String>,
    #[serde(default)]
    pub surface: Option<String>,
    #[serde(default)]
    pub event_status: Option<String>,
    #[serde(default)]
    pub starters: Vec<EnterpriseStarter>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseStarter {
    #[serde(default)]
    pub post_position: Option<i64>,
    #[serde(default, deserialize_with = "text_value")]
    pub program_number: Option<String>,
    #[serde(default)]
    pub horse_name: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub trainer_name: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub morning_line: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub live_odds: Option<String>,
    #[serde(default)]
    pub scratched: bool,
    #[serde(default)]
    pub finish_position: Option<u32>,
    #[serde(default)]
    pub finish_time: Option<String>,
    #[serde(default)]
    pub lifetime: Option<EnterpriseLifetime>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseLifetime {
    #[serde(default)]
    pub starts: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub places: u32,
    #[serde(default)]
    pub shows: u32,
    #[serde(default)]
    pub earnings_cents: i64,
}

/// Price document for one event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseOdds {
    #[serde(default)]
    pub event_number: Option<i64>,
    #[serde(default)]
    pub as_of: Option<String>,
    #[serde(default)]
    pub prices: Vec<EnterprisePrice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterprisePrice {
    #[serde(default)]
    pub post_position: Option<i64>,
    #[serde(default, deserialize_with = "text_value")]
    pub program_number: Option<String>,
    #[serde(default)]
    pub horse_name: Option<String>,
    #[serde(default)]
    pub decimal_odds: Option<f64>,
}

/// Paid partner feed with bearer-token auth.
#[derive(Clone)]
pub struct EnterpriseFeedAdapter {
    base_url: String,
    token: Option<String>,
    http_client: Arc<dyn HttpClient>,
    policy: SourcePolicy,
}

impl EnterpriseFeedAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, token: Option<String>) -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            token: token.filter(|token| !token.trim().is_empty()),
            http_client,
            policy: SourcePolicy::enterprise_default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn card_url(&self, query: &CardQuery) -> String {
        format!(
            "{}/feeds/harness/cards/{}/{}",
            self.base_url,
            feed_track_code(&query.track),
            format_compact_date(query.date)
        )
    }

    pub fn odds_url(&self, query: &OddsQuery) -> String {
        format!(
            "{}/feeds/harness/odds/{}/{}/{}",
            self.base_url,
            feed_track_code(&query.track),
            format_compact_date(query.race_id.date()),
            query.race_id.race_number()
        )
    }

    async fn get(&self, url: String) -> Result<String, SourceError> {
        let Some(token) = &self.token else {
            return Err(SourceError::unavailable(
                "enterprise feed token is not configured",
            ));
        };

        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_auth(&HttpAuth::BearerToken(token.clone()))
            .with_timeout(self.policy.request_timeout);

        fetch_body(self.http_client.as_ref(), SourceId::Enterprise, request).await
    }
}

fn feed_track_code(track: &Track) -> String {
    let code = track.code.as_deref().unwrap_or(&track.slug);
    urlencoding::encode(code).into_owned()
}

impl SourceAdapter for EnterpriseFeedAdapter {
    fn id(&self) -> SourceId {
        SourceId::Enterprise
    }

    fn kind(&self) -> SourceKind {
        SourceKind::EnterpriseFeed
    }

    fn policy(&self) -> SourcePolicy {
        self.policy.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn fetch_card<'a>(&'a self, query: &'a CardQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(async move {
            let body = self.get(self.card_url(query)).await?;
            let card = serde_json::from_str::<EnterpriseCard>(&body).map_err(|error| {
                SourceError::parse(format!("failed to parse enterprise card: {error}"))
            })?;
            Ok(RawPayload::new(
                SourceId::Enterprise,
                PayloadBody::EnterpriseCard(card),
            ))
        })
    }

    fn fetch_odds<'a>(&'a self, query: &'a OddsQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(async move {
            let body = self.get(self.odds_url(query)).await?;
            let odds = serde_json::from_str::<EnterpriseOdds>(&body).map_err(|error| {
                SourceError::parse(format!("failed to parse enterprise odds: {error}"))
            })?;
            Ok(RawPayload::new(
                SourceId::Enterprise,
                PayloadBody::EnterpriseOdds(odds),
            ))
        })
    }
}
