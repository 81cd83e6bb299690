//! CLI argument definitions for racefeed.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `card` | Race card for a track and date |
//! | `odds` | Odds snapshot for one race |
//! | `sources` | Source order, capabilities and scheduling state |
//! | `tracks` | Known tracks and their aliases |
//! | `status` | Last successful fetch per source |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--offline` | `false` | No network; answers come from synthetic data |
//! | `--timeout-ms` | `10000` | Deadline for live attempts in ms |
//!
//! # Examples
//!
//! ```bash
//! racefeed card "Woodbine Mohawk Park" --date 2024-05-01 --pretty
//! racefeed odds woodbine-mohawk-park:2024-05-01:3
//! racefeed card mohawk --offline
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Harness-racing race cards and odds from several sources.
#[derive(Debug, Parser)]
#[command(
    name = "racefeed",
    author,
    version,
    about = "Harness-racing race cards and odds",
    long_about = "racefeed aggregates Ontario harness-racing race cards and odds from \
scraped sites, an authenticated odds API and an enterprise feed. Answers come from \
cache, a live source or deterministic synthetic data, and every response says which.\n\
\n\
Credentials and overrides are read from RACEFEED_* environment variables.\n\
\n\
Use 'racefeed <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Skip the network entirely.
    ///
    /// Every live source fails with not-found, so answers exercise the
    /// synthetic fallback.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Deadline for live source attempts in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON envelope.
    Json,
    /// Human-readable summary.
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the race card for a track.
    ///
    /// Track names are matched case-insensitively against known names and
    /// aliases.
    ///
    ///   racefeed card "Woodbine Mohawk Park"
    ///   racefeed card georgian --date 2024-05-01
    Card(CardArgs),

    /// Fetch the odds snapshot for a race.
    ///
    ///   racefeed odds woodbine-mohawk-park:2024-05-01:3
    Odds(OddsArgs),

    /// List sources in the order they are tried.
    Sources(SourcesArgs),

    /// List known tracks.
    Tracks,

    /// Show the last successful fetch per source.
    ///
    /// The fetch log lives in memory, so run with `--warm` to fetch a card
    /// first.
    ///
    ///   racefeed status --warm mohawk
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct CardArgs {
    /// Track name or alias.
    pub track: String,

    /// Race date (YYYY-MM-DD). Defaults to today at the track.
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Args)]
pub struct OddsArgs {
    /// Race id in the form `track-slug:YYYY-MM-DD:N`.
    pub race_id: String,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Include scheduling state (cooldowns, backoff, failure streaks).
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Fetch today's card for this track before reporting.
    #[arg(long)]
    pub warm: Option<String>,
}
