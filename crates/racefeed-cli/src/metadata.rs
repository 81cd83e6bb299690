use std::fmt::{Display, Formatter};

use racefeed_core::{EnvelopeMeta, Freshness, SourceId, ValidationError, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request identifier (UUID v4) stamped on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Command metadata used to construct envelope metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub request_id: RequestId,
    pub source_chain: Vec<SourceId>,
    pub provenance: Option<(SourceId, Freshness)>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(
        source_chain: Vec<SourceId>,
        latency_ms: u64,
        cache_hit: bool,
    ) -> Result<Self, ValidationError> {
        if source_chain.is_empty() {
            return Err(ValidationError::EmptySourceChain);
        }

        Ok(Self {
            request_id: RequestId::new_v4(),
            source_chain,
            provenance: None,
            latency_ms,
            cache_hit,
            warnings: Vec::new(),
        })
    }

    pub fn with_provenance(mut self, provenance: Option<(SourceId, Freshness)>) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn into_envelope_meta(self) -> Result<EnvelopeMeta, ValidationError> {
        let mut envelope_meta = EnvelopeMeta::new(
            self.request_id.to_string(),
            SCHEMA_VERSION,
            self.source_chain,
            self.latency_ms,
            self.cache_hit,
        )?;
        if let Some((source, freshness)) = self.provenance {
            envelope_meta = envelope_meta.with_provenance(source, freshness);
        }

        for warning in self.warnings {
            envelope_meta.push_warning(warning);
        }

        Ok(envelope_meta)
    }
}
