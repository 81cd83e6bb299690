use racefeed_core::{FallbackOrchestrator, SourceId, SourceSnapshot};
use serde::Serialize;

use crate::cli::SourcesArgs;
use crate::error::CliError;

use super::{configured_chain, CommandResult};

#[derive(Debug, Serialize)]
struct SourceStatus {
    id: SourceId,
    kind: &'static str,
    priority: u16,
    available: bool,
    status: &'static str,
    capabilities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduling: Option<SourceSnapshot>,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<SourceStatus>,
}

pub fn run(args: &SourcesArgs, engine: &FallbackOrchestrator) -> Result<CommandResult, CliError> {
    let sources = engine
        .source_snapshots()
        .into_iter()
        .map(|snapshot| SourceStatus {
            id: snapshot.id,
            kind: snapshot.kind.as_str(),
            priority: snapshot.priority,
            available: snapshot.configured,
            status: snapshot.status_label(),
            capabilities: snapshot.capabilities.clone(),
            scheduling: args.verbose.then_some(snapshot),
        })
        .collect::<Vec<_>>();

    let unconfigured = sources.iter().filter(|source| !source.available).count();
    let data = serde_json::to_value(SourcesResponseData { sources })?;

    let mut result = CommandResult::ok(data, configured_chain(engine));
    if unconfigured > 0 {
        result = result.with_warning(format!(
            "{unconfigured} source(s) lack credentials and will be skipped"
        ));
    }
    Ok(result)
}
