use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use super::{fetch_body, text_value};
use crate::data_source::{
    CapabilitySet, CardQuery, OddsQuery, PayloadBody, RawPayload, SourceAdapter, SourceError,
    SourceErrorKind, SourceFuture, SourceKind,
};
use crate::domain::{format_compact_date, format_iso_date};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::source_policy::SourcePolicy;
use crate::{SourceId, Track};

static EMBEDDED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("embedded object pattern is valid"));

/// Race card as lifted off a page. Every value stays as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScrapedCard {
    #[serde(default, alias = "trackName", alias = "track_name")]
    pub track: Option<String>,
    #[serde(default, alias = "raceDate", alias = "race_date")]
    pub date: Option<String>,
    #[serde(default)]
    pub races: Vec<ScrapedRace>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScrapedRace {
    #[serde(
        default,
        alias = "raceNumber",
        alias = "race",
        alias = "number",
        deserialize_with = "text_value"
    )]
    pub race_number: Option<String>,
    #[serde(default, alias = "postTime", deserialize_with = "text_value")]
    pub post_time: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub distance: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub purse: Option<String>,
    #[serde(
        default,
        alias = "race_type",
        alias = "raceType",
        deserialize_with = "text_value"
    )]
    pub conditions: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub gait: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub surface: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub status: Option<String>,
    #[serde(default, alias = "runners", alias = "horses")]
    pub entries: Vec<ScrapedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScrapedEntry {
    #[serde(
        default,
        alias = "postPosition",
        alias = "post",
        alias = "pp",
        deserialize_with = "text_value"
    )]
    pub post_position: Option<String>,
    #[serde(
        default,
        alias = "programNumber",
        alias = "program",
        deserialize_with = "text_value"
    )]
    pub program_number: Option<String>,
    #[serde(
        default,
        alias = "horseName",
        alias = "horse",
        alias = "name",
        deserialize_with = "text_value"
    )]
    pub horse_name: Option<String>,
    #[serde(default, alias = "driver_name", deserialize_with = "text_value")]
    pub driver: Option<String>,
    #[serde(default, alias = "trainer_name", deserialize_with = "text_value")]
    pub trainer: Option<String>,
    #[serde(
        default,
        alias = "morningLine",
        alias = "morning_line_odds",
        alias = "ml",
        deserialize_with = "text_value"
    )]
    pub morning_line: Option<String>,
    #[serde(
        default,
        alias = "liveOdds",
        alias = "live_odds",
        deserialize_with = "text_value"
    )]
    pub odds: Option<String>,
    #[serde(default, deserialize_with = "text_value")]
    pub scratched: Option<String>,
    #[serde(
        default,
        alias = "finishPosition",
        alias = "finish",
        deserialize_with = "text_value"
    )]
    pub finish_position: Option<String>,
    #[serde(default, alias = "finishTime", deserialize_with = "text_value")]
    pub finish_time: Option<String>,
    #[serde(default, alias = "updatedAt", deserialize_with = "text_value")]
    pub updated_at: Option<String>,
}

/// CSS selectors used when a page carries no embedded card data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSelectors {
    /// Page-level race date, read once per page.
    pub card_date: String,
    pub race_block: String,
    pub race_number: String,
    pub post_time: String,
    pub distance: String,
    pub purse: String,
    pub conditions: String,
    pub gait: String,
    pub status: String,
    pub entry_row: String,
    pub post_position: String,
    pub program_number: String,
    pub horse_name: String,
    pub driver: String,
    pub trainer: String,
    pub morning_line: String,
    pub odds: String,
    pub finish_position: String,
    pub finish_time: String,
}

impl Default for ScrapeSelectors {
    fn default() -> Self {
        Self {
            card_date: String::from(".card-date, .race-date"),
            race_block: String::from(".race-card"),
            race_number: String::from(".race-number"),
            post_time: String::from(".post-time"),
            distance: String::from(".distance"),
            purse: String::from(".purse"),
            conditions: String::from(".race-type, .conditions"),
            gait: String::from(".gait"),
            status: String::from(".race-status"),
            entry_row: String::from("tr.entry-row"),
            post_position: String::from(".post-position"),
            program_number: String::from(".program-number"),
            horse_name: String::from(".horse-name"),
            driver: String::from(".driver-name"),
            trainer: String::from(".trainer-name"),
            morning_line: String::from(".morning-line"),
            odds: String::from(".live-odds, .odds"),
            finish_position: String::from(".finish-position"),
            finish_time: String::from(".finish-time"),
        }
    }
}

/// Which tracks a site publishes cards for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackScope {
    /// Only the listed track slugs.
    Only(Vec<String>),
    /// Any track with a catalog code.
    Coded,
}

/// Where a scraped site keeps its race cards.
///
/// Page templates accept `{date}` (ISO), `{compact_date}`, `{code}` and
/// `{slug}` and are tried in order. A template without a date placeholder
/// is a "current card" page and only stands in for today's card unless the
/// page itself states its date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub source: SourceId,
    pub base_url: String,
    pub card_pages: Vec<String>,
    pub scope: TrackScope,
}

impl SiteProfile {
    pub fn woodbine() -> Self {
        Self {
            source: SourceId::Woodbine,
            base_url: String::from("https://woodbine.com"),
            card_pages: vec![
                String::from("/mohawk/racing/{date}"),
                String::from("/mohawk/entries/"),
                String::from("/mohawk/racing/"),
            ],
            scope: TrackScope::Only(vec![String::from("woodbine-mohawk-park")]),
        }
    }

    pub fn standardbred_canada() -> Self {
        Self {
            source: SourceId::StandardbredCanada,
            base_url: String::from("https://standardbredcanada.ca"),
            card_pages: vec![
                String::from("/racing/entries/{code}/{date}"),
                String::from("/racing/entries"),
            ],
            scope: TrackScope::Coded,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn serves(&self, track: &Track) -> bool {
        match &self.scope {
            TrackScope::Only(slugs) => slugs.iter().any(|slug| *slug == track.slug),
            TrackScope::Coded => track.code.is_some(),
        }
    }

    pub fn card_urls(&self, query: &CardQuery) -> Vec<String> {
        self.card_pages(query)
            .into_iter()
            .map(|page| page.url)
            .collect()
    }

    fn card_pages(&self, query: &CardQuery) -> Vec<CardPage> {
        let code = query
            .track
            .code
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.card_pages
            .iter()
            .map(|page| {
                let path = page
                    .replace("{date}", &format_iso_date(query.date))
                    .replace("{compact_date}", &format_compact_date(query.date))
                    .replace("{code}", &code)
                    .replace("{slug}", &query.track.slug);
                CardPage {
                    url: format!("{}{}", self.base_url, path),
                    dated: page.contains("{date}") || page.contains("{compact_date}"),
                }
            })
            .collect()
    }
}

struct CardPage {
    url: String,
    dated: bool,
}

/// Scraped-site adapter: one implementation, one [`SiteProfile`] per site.
#[derive(Clone)]
pub struct ScrapedSiteAdapter {
    profile: SiteProfile,
    selectors: ScrapeSelectors,
    http_client: Arc<dyn HttpClient>,
    policy: SourcePolicy,
}

impl ScrapedSiteAdapter {
    pub fn new(profile: SiteProfile, http_client: Arc<dyn HttpClient>) -> Self {
        let policy = SourcePolicy::default_for(profile.source)
            .unwrap_or_else(SourcePolicy::woodbine_default);
        Self {
            profile,
            selectors: ScrapeSelectors::default(),
            http_client,
            policy,
        }
    }

    pub fn woodbine(http_client: Arc<dyn HttpClient>) -> Self {
        Self::new(SiteProfile::woodbine(), http_client)
    }

    pub fn standardbred_canada(http_client: Arc<dyn HttpClient>) -> Self {
        Self::new(SiteProfile::standardbred_canada(), http_client)
    }

    pub fn with_selectors(mut self, selectors: ScrapeSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Walks the candidate pages and returns the first that yields race blocks.
    ///
    /// When every page fails, the most telling failure wins: an unrecognised
    /// page shape over a transport failure over a missing page.
    async fn scrape_card(&self, query: &CardQuery) -> Result<RawPayload, SourceError> {
        let source = self.profile.source;
        if !self.profile.serves(&query.track) {
            return Err(SourceError::not_found(format!(
                "{source} does not publish cards for {}",
                query.track.name
            )));
        }

        let mut failure: Option<SourceError> = None;
        for CardPage { url, dated } in self.profile.card_pages(query) {
            let request = HttpRequest::get(url.as_str())
                .with_header("accept", "text/html")
                .with_timeout(self.policy.request_timeout);

            let outcome = match fetch_body(self.http_client.as_ref(), source, request).await {
                Ok(body) => parse_card_page(&body, &self.selectors)
                    .and_then(|card| dated_for(card, dated, query, source, &url)),
                Err(error) => Err(error),
            };

            match outcome {
                Ok(card) => {
                    tracing::debug!(source = %source, url = %url, races = card.races.len(), "scraped race card");
                    return Ok(RawPayload::new(source, PayloadBody::Scraped(card)));
                }
                Err(error) if error.kind() == SourceErrorKind::RateLimitExceeded => {
                    return Err(error);
                }
                Err(error) => {
                    tracing::debug!(source = %source, url = %url, error = %error, "candidate page failed");
                    if failure
                        .as_ref()
                        .map_or(true, |current| severity(&error) > severity(current))
                    {
                        failure = Some(error);
                    }
                }
            }
        }

        Err(failure.unwrap_or_else(|| {
            SourceError::not_found(format!("{source} has no card pages configured"))
        }))
    }
}

/// An undated card from a "current card" page is only trusted for today.
fn dated_for(
    card: ScrapedCard,
    page_dated: bool,
    query: &CardQuery,
    source: SourceId,
    url: &str,
) -> Result<ScrapedCard, SourceError> {
    if page_dated || card.date.is_some() || query.date == query.track.today() {
        return Ok(card);
    }
    Err(SourceError::not_found(format!(
        "{source} page {url} shows an undated current card, not the card for {}",
        format_iso_date(query.date)
    )))
}

fn severity(error: &SourceError) -> u8 {
    match error.kind() {
        SourceErrorKind::Parse => 3,
        SourceErrorKind::Fetch | SourceErrorKind::Timeout => 2,
        SourceErrorKind::NotFound => 1,
        _ => 0,
    }
}

impl SourceAdapter for ScrapedSiteAdapter {
    fn id(&self) -> SourceId {
        self.profile.source
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Scraped
    }

    fn policy(&self) -> SourcePolicy {
        self.policy.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn fetch_card<'a>(&'a self, query: &'a CardQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(self.scrape_card(query))
    }

    fn fetch_odds<'a>(&'a self, query: &'a OddsQuery) -> SourceFuture<'a, RawPayload> {
        Box::pin(async move {
            // Race-card pages carry the odds column.
            let card = query.card();
            self.scrape_card(&card).await
        })
    }
}

impl Default for ScrapedSiteAdapter {
    fn default() -> Self {
        Self::woodbine(Arc::new(ReqwestHttpClient::default()))
    }
}

/// Extracts a race card from a page: embedded JSON first, then CSS selectors.
pub fn parse_card_page(html: &str, selectors: &ScrapeSelectors) -> Result<ScrapedCard, SourceError> {
    let document = Html::parse_document(html);

    if let Some(card) = embedded_card(&document) {
        return Ok(card);
    }

    let compiled = CompiledSelectors::compile(selectors)?;
    let races = document
        .select(&compiled.race_block)
        .map(|block| scrape_race(block, &compiled))
        .collect::<Vec<_>>();

    if races.is_empty() {
        return Err(SourceError::parse(
            "page matches no known race card layout",
        ));
    }

    Ok(ScrapedCard {
        track: None,
        date: document
            .select(&compiled.card_date)
            .next()
            .and_then(normalized_text),
        races,
    })
}

fn embedded_card(document: &Html) -> Option<ScrapedCard> {
    let scripts = Selector::parse("script").ok()?;
    document.select(&scripts).find_map(|script| {
        let text = script.text().collect::<String>();
        if !text.contains("\"races\"") {
            return None;
        }
        let object = EMBEDDED_OBJECT.find(&text)?;
        serde_json::from_str::<ScrapedCard>(object.as_str())
            .ok()
            .filter(|card| !card.races.is_empty())
    })
}

struct CompiledSelectors {
    card_date: Selector,
    race_block: Selector,
    race_number: Selector,
    post_time: Selector,
    distance: Selector,
    purse: Selector,
    conditions: Selector,
    gait: Selector,
    status: Selector,
    entry_row: Selector,
    post_position: Selector,
    program_number: Selector,
    horse_name: Selector,
    driver: Selector,
    trainer: Selector,
    morning_line: Selector,
    odds: Selector,
    finish_position: Selector,
    finish_time: Selector,
}

impl CompiledSelectors {
    fn compile(raw: &ScrapeSelectors) -> Result<Self, SourceError> {
        let parse = |selector: &str| {
            Selector::parse(selector)
                .map_err(|_| SourceError::parse(format!("invalid selector '{selector}'")))
        };

        Ok(Self {
            card_date: parse(&raw.card_date)?,
            race_block: parse(&raw.race_block)?,
            race_number: parse(&raw.race_number)?,
            post_time: parse(&raw.post_time)?,
            distance: parse(&raw.distance)?,
            purse: parse(&raw.purse)?,
            conditions: parse(&raw.conditions)?,
            gait: parse(&raw.gait)?,
            status: parse(&raw.status)?,
            entry_row: parse(&raw.entry_row)?,
            post_position: parse(&raw.post_position)?,
            program_number: parse(&raw.program_number)?,
            horse_name: parse(&raw.horse_name)?,
            driver: parse(&raw.driver)?,
            trainer: parse(&raw.trainer)?,
            morning_line: parse(&raw.morning_line)?,
            odds: parse(&raw.odds)?,
            finish_position: parse(&raw.finish_position)?,
            finish_time: parse(&raw.finish_time)?,
        })
    }
}

fn scrape_race(block: ElementRef<'_>, selectors: &CompiledSelectors) -> ScrapedRace {
    ScrapedRace {
        race_number: first_text(block, &selectors.race_number),
        post_time: first_text(block, &selectors.post_time),
        distance: first_text(block, &selectors.distance),
        purse: first_text(block, &selectors.purse),
        conditions: first_text(block, &selectors.conditions),
        gait: first_text(block, &selectors.gait),
        surface: None,
        status: first_text(block, &selectors.status),
        entries: block
            .select(&selectors.entry_row)
            .map(|row| scrape_entry(row, selectors))
            .collect(),
    }
}

fn scrape_entry(row: ElementRef<'_>, selectors: &CompiledSelectors) -> ScrapedEntry {
    let scratched = row
        .value()
        .classes()
        .any(|class| class.eq_ignore_ascii_case("scratched"));

    ScrapedEntry {
        post_position: first_text(row, &selectors.post_position),
        program_number: first_text(row, &selectors.program_number),
        horse_name: first_text(row, &selectors.horse_name),
        driver: first_text(row, &selectors.driver),
        trainer: first_text(row, &selectors.trainer),
        morning_line: first_text(row, &selectors.morning_line),
        odds: first_text(row, &selectors.odds),
        scratched: scratched.then(|| String::from("true")),
        finish_position: first_text(row, &selectors.finish_position),
        finish_time: first_text(row, &selectors.finish_time),
        updated_at: None,
    }
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    normalized_text(scope.select(selector).next()?)
}

fn normalized_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}
