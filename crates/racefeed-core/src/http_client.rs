use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Authentication strategy applied to outgoing HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
}

impl HttpAuth {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::BearerToken(token) => {
                headers.insert(String::from("authorization"), format!("Bearer {token}"));
            }
            Self::Header { name, value } => {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }
}

/// GET request envelope used by adapter transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }
}

/// HTTP response envelope returned by an adapter transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn not_found() -> Self {
        Self::new(404, "")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `Retry-After` expressed in seconds, when the upstream sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Transport failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Transport,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Transport, message)
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Adapter transport contract that supports async execution and auth-aware requests.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Canned reply served by [`FixtureHttpClient`].
#[derive(Debug, Clone)]
pub enum FixtureReply {
    Response(HttpResponse),
    Error(HttpError),
}

/// Deterministic in-memory transport for tests and offline runs.
///
/// Replies are matched by exact URL first, then by the longest registered
/// prefix. Queued replies are served in order and the last one repeats.
/// Unknown URLs answer `404`.
#[derive(Debug, Default)]
pub struct FixtureHttpClient {
    routes: Mutex<HashMap<String, VecDeque<FixtureReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Duration,
}

impl FixtureHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every reply, so concurrent callers overlap in flight.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_response(self, url: impl Into<String>, response: HttpResponse) -> Self {
        self.push(url, FixtureReply::Response(response));
        self
    }

    pub fn with_error(self, url: impl Into<String>, error: HttpError) -> Self {
        self.push(url, FixtureReply::Error(error));
        self
    }

    /// Queues another reply for `url`.
    pub fn push(&self, url: impl Into<String>, reply: FixtureReply) {
        self.routes
            .lock()
            .expect("fixture routes lock should not be poisoned")
            .entry(url.into())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("fixture request log lock should not be poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("fixture request log lock should not be poisoned")
            .len()
    }

    /// Number of recorded requests whose URL starts with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .expect("fixture request log lock should not be poisoned")
            .iter()
            .filter(|request| request.url.starts_with(prefix))
            .count()
    }

    fn reply_for(&self, url: &str) -> FixtureReply {
        let mut routes = self
            .routes
            .lock()
            .expect("fixture routes lock should not be poisoned");

        let key = if routes.contains_key(url) {
            Some(url.to_owned())
        } else {
            routes
                .keys()
                .filter(|candidate| url.starts_with(candidate.as_str()))
                .max_by_key(|candidate| candidate.len())
                .cloned()
        };

        let Some(queue) = key.and_then(|key| routes.get_mut(&key)) else {
            return FixtureReply::Response(HttpResponse::not_found());
        };

        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or(FixtureReply::Response(HttpResponse::not_found()))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or(FixtureReply::Response(HttpResponse::not_found()))
        }
    }
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests
                .lock()
                .expect("fixture request log lock should not be poisoned")
                .push(request.clone());

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            match self.reply_for(&request.url) {
                FixtureReply::Response(response) => Ok(response),
                FixtureReply::Error(error) => Err(error),
            }
        })
    }
}

/// Production HTTP client using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("racefeed/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(HttpErrorKind::Connect, format!("connection failed: {e}"))
                } else {
                    HttpError::transport(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_ascii_lowercase(), value.to_owned()))
                })
                .collect();
            let body = response.text().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("response body timeout: {e}"))
                } else {
                    HttpError::transport(format!("failed to read response body: {e}"))
                }
            })?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
