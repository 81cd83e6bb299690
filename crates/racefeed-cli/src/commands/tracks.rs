use racefeed_core::{FallbackOrchestrator, Track};
use serde::Serialize;

use crate::error::CliError;

use super::{configured_chain, CommandResult};

#[derive(Debug, Serialize)]
struct TrackEntry<'a> {
    #[serde(flatten)]
    track: &'a Track,
    aliases: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct TracksResponseData<'a> {
    tracks: Vec<TrackEntry<'a>>,
}

pub fn run(engine: &FallbackOrchestrator) -> Result<CommandResult, CliError> {
    let catalog = engine.catalog();
    let tracks = catalog
        .tracks()
        .iter()
        .map(|track| TrackEntry {
            track,
            aliases: catalog.aliases_of(track),
        })
        .collect::<Vec<_>>();

    let data = serde_json::to_value(TracksResponseData { tracks })?;
    Ok(CommandResult::ok(data, configured_chain(engine)))
}
