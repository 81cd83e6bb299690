use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical source identifiers used in provenance, diagnostics and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Enterprise,
    OddsApi,
    Woodbine,
    StandardbredCanada,
    Synthetic,
}

impl SourceId {
    /// Sources backed by a live upstream, in default priority order.
    pub const LIVE: [Self; 4] = [
        Self::Enterprise,
        Self::OddsApi,
        Self::Woodbine,
        Self::StandardbredCanada,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enterprise => "enterprise",
            Self::OddsApi => "odds_api",
            Self::Woodbine => "woodbine",
            Self::StandardbredCanada => "standardbred_canada",
            Self::Synthetic => "synthetic",
        }
    }

    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Synthetic)
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "enterprise" => Ok(Self::Enterprise),
            "odds_api" | "oddsapi" => Ok(Self::OddsApi),
            "woodbine" => Ok(Self::Woodbine),
            "standardbred_canada" | "sc" => Ok(Self::StandardbredCanada),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
