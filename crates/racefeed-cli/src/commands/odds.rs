use racefeed_core::{
    FallbackOrchestrator, OddsResponse, OddsSnapshot, RaceId, UtcDateTime, ValidationError,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::cli::OddsArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct OddsResponseData<'a> {
    race_id: &'a RaceId,
    odds: &'a OddsSnapshot,
    /// Sum of implied probabilities across the field.
    book_percentage: f64,
    validation_errors: &'a [ValidationError],
    fetched_at: &'a UtcDateTime,
}

pub async fn run(
    args: &OddsArgs,
    engine: &FallbackOrchestrator,
    deadline: Instant,
) -> Result<CommandResult, CliError> {
    let race_id = RaceId::parse(&args.race_id)?;
    let response = engine.fetch_odds_with_deadline(&race_id, deadline).await?;
    into_result(response)
}

fn into_result(response: OddsResponse) -> Result<CommandResult, CliError> {
    let data = serde_json::to_value(OddsResponseData {
        race_id: &response.race_id,
        odds: &response.odds,
        book_percentage: response.odds.book_percentage(),
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
