use racefeed_core::domain::{format_iso_date, parse_iso_date};
use racefeed_core::{
    FallbackOrchestrator, Race, RaceCardResponse, Track, UtcDateTime, ValidationError,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::cli::CardArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct CardResponseData<'a> {
    track: &'a Track,
    date: String,
    races: &'a [Race],
    validation_errors: &'a [ValidationError],
    fetched_at: &'a UtcDateTime,
}

pub async fn run(
    args: &CardArgs,
    engine: &FallbackOrchestrator,
    deadline: Instant,
) -> Result<CommandResult, CliError> {
    let date = match &args.date {
        Some(raw) => parse_iso_date(raw)?,
        None => engine.catalog().resolve(&args.track)?.today(),
    };

    let response = engine
        .fetch_race_card_with_deadline(&args.track, date, deadline)
        .await?;
    into_result(response)
}

fn into_result(response: RaceCardResponse) -> Result<CommandResult, CliError> {
    let data = serde_json::to_value(CardResponseData {
        track: &response.track,
        date: format_iso_date(response.date),
        races: &response.races,
        validation_errors: &response.validation_errors,
        fetched_at: &response.fetched_at,
    })?;
    let cache_hit = response.cache_hit();

    Ok(CommandResult::ok(data, response.source_chain)
        .with_errors(response.diagnostics)
        .with_latency(response.latency_ms)
        .with_cache_hit(cache_hit)
        .with_provenance(response.provenance, response.freshness))
}
