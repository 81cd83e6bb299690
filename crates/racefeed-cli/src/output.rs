use racefeed_core::Envelope;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => render_table(envelope)?,
    }

    Ok(())
}

fn render_table(envelope: &Envelope<Value>) -> Result<(), CliError> {
    let meta = &envelope.meta;
    println!("request_id  : {}", meta.request_id);
    println!("schema      : {}", meta.schema_version);
    println!("generated_at: {}", meta.generated_at);
    println!(
        "sources     : {}",
        meta.source_chain
            .iter()
            .map(|source| source.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );
    if let (Some(provenance), Some(freshness)) = (meta.provenance, meta.freshness) {
        println!("provenance  : {} ({})", provenance.as_str(), freshness.as_str());
    }
    println!("latency_ms  : {}", meta.latency_ms);
    println!("cache_hit   : {}", meta.cache_hit);

    if !meta.warnings.is_empty() {
        println!("warnings:");
        for warning in &meta.warnings {
            println!("  - {warning}");
        }
    }

    println!("data:");
    let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
    for line in pretty_data.lines() {
        println!("  {line}");
    }

    if !envelope.errors.is_empty() {
        println!("errors:");
        for error in &envelope.errors {
            match error.source {
                Some(source) => println!("  - [{}] {}: {}", source.as_str(), error.code, error.message),
                None => println!("  - {}: {}", error.code, error.message),
            }
        }
    }

    Ok(())
}
