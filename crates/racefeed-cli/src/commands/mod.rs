mod card;
mod odds;
mod sources;
mod status;
mod tracks;

use std::sync::Arc;
use std::time::Duration;

use racefeed_core::{
    EngineConfig, Envelope, EnvelopeError, FallbackOrchestrator, FixtureHttpClient, Freshness,
    SourceId,
};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub source_chain: Vec<SourceId>,
    pub provenance: Option<(SourceId, Freshness)>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<SourceId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
            source_chain,
            provenance: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    /// Tags the result with its supplier; synthetic answers carry a warning.
    pub fn with_provenance(mut self, source: SourceId, freshness: Freshness) -> Self {
        if freshness == Freshness::Synthetic {
            self.warnings.push(String::from(
                "no live source answered; data is synthetic",
            ));
        }
        self.provenance = Some((source, freshness));
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let engine = build_engine(cli)?;
    let deadline = Instant::now() + Duration::from_millis(cli.timeout_ms);

    let command_result = match &cli.command {
        Command::Card(args) => card::run(args, &engine, deadline).await?,
        Command::Odds(args) => odds::run(args, &engine, deadline).await?,
        Command::Sources(args) => sources::run(args, &engine)?,
        Command::Tracks => tracks::run(&engine)?,
        Command::Status(args) => status::run(args, &engine, deadline).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        cache_hit,
        source_chain,
        provenance,
    } = command_result;

    let mut metadata =
        Metadata::new(source_chain, latency_ms, cache_hit)?.with_provenance(provenance);
    if cli.offline {
        metadata.push_warning("--offline: live sources were not contacted");
    }
    for warning in warnings {
        metadata.push_warning(warning);
    }

    let meta = metadata.into_envelope_meta()?;
    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}

fn build_engine(cli: &Cli) -> Result<FallbackOrchestrator, CliError> {
    let config = EngineConfig::from_env()?;
    let mut builder = FallbackOrchestrator::builder().with_config(config);
    if cli.offline {
        debug!("offline mode: using an empty fixture transport");
        builder = builder.with_http_client(Arc::new(FixtureHttpClient::new()));
    }
    Ok(builder.build())
}

/// Source chain for commands that do not fetch: the configured order.
fn configured_chain(engine: &FallbackOrchestrator) -> Vec<SourceId> {
    let order = engine.source_order();
    if order.is_empty() {
        vec![SourceId::Synthetic]
    } else {
        order
    }
}
