//! Source adapters.
//!
//! | Adapter | Source | Transport |
//! |---------|--------|-----------|
//! | [`ScrapedSiteAdapter`] | Woodbine, Standardbred Canada | HTML pages |
//! | [`OddsApiAdapter`] | authenticated odds API | JSON, `x-api-key` |
//! | [`EnterpriseFeedAdapter`] | partner feed | JSON, bearer token |

pub mod enterprise;
pub mod odds_api;
pub mod scraped;

pub use enterprise::EnterpriseFeedAdapter;
pub use odds_api::OddsApiAdapter;
pub use scraped::{ScrapeSelectors, ScrapedSiteAdapter, SiteProfile};

use serde::{Deserialize, Deserializer};

use crate::data_source::SourceError;
use crate::http_client::{HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse};
use crate::SourceId;

/// Executes `request` and maps transport failures and non-2xx statuses onto
/// the source error taxonomy.
pub(crate) async fn fetch_body(
    http_client: &dyn HttpClient,
    source: SourceId,
    request: HttpRequest,
) -> Result<String, SourceError> {
    let url = request.url.clone();
    let response = http_client
        .execute(request)
        .await
        .map_err(|error| transport_error(source, &error))?;
    check_status(source, &url, &response)?;
    Ok(response.body)
}

pub(crate) fn transport_error(source: SourceId, error: &HttpError) -> SourceError {
    match error.kind() {
        HttpErrorKind::Timeout => {
            SourceError::timeout(format!("{source} request timed out: {}", error.message()))
        }
        HttpErrorKind::Connect | HttpErrorKind::Transport => {
            SourceError::fetch(format!("{source} transport error: {}", error.message()))
        }
    }
}

pub(crate) fn check_status(
    source: SourceId,
    url: &str,
    response: &HttpResponse,
) -> Result<(), SourceError> {
    match response.status {
        200..=299 => Ok(()),
        404 | 410 => Err(SourceError::not_found(format!(
            "{source} has no page at {url}"
        ))),
        429 => Err(SourceError::rate_limit_exceeded(
            format!("{source} reported quota exhaustion"),
            response.retry_after(),
        )),
        401 | 403 => Err(SourceError::fetch_rejected(format!(
            "{source} rejected credentials (status {})",
            response.status
        ))),
        status => Err(SourceError::fetch(format!(
            "{source} returned status {status}"
        ))),
    }
}

/// Accepts a JSON string, number or boolean and keeps it as text.
pub(crate) fn text_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(i64),
        Float(f64),
        Flag(bool),
    }

    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.map(|scalar| match scalar {
        Scalar::Text(text) => text,
        Scalar::Integer(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::Flag(value) => value.to_string(),
    }))
}
