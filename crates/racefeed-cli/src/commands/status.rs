use racefeed_core::{DataStatus, FallbackOrchestrator, FetchRecord};
use serde::Serialize;
use tokio::time::Instant;

use crate::cli::StatusArgs;
use crate::error::CliError;

use super::{configured_chain, CommandResult};

#[derive(Debug, Serialize)]
struct StatusResponseData {
    sources: Vec<DataStatus>,
    recent: Vec<FetchRecord>,
}

pub async fn run(
    args: &StatusArgs,
    engine: &FallbackOrchestrator,
    deadline: Instant,
) -> Result<CommandResult, CliError> {
    let mut result_errors = Vec::new();
    if let Some(track) = &args.warm {
        let date = engine.catalog().resolve(track)?.today();
        let response = engine
            .fetch_race_card_with_deadline(track, date, deadline)
            .await?;
        result_errors = response.diagnostics;
    }

    let data = serde_json::to_value(StatusResponseData {
        sources: engine.data_status(),
        recent: engine.fetch_log().records(),
    })?;

    let mut result = CommandResult::ok(data, configured_chain(engine)).with_errors(result_errors);
    if args.warm.is_none() {
        result = result.with_warning("fetch log is per process; pass --warm to populate it");
    }
    Ok(result)
}
