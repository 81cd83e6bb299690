use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

/// An instant held in UTC and rendered as RFC 3339 with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Reads an upstream RFC 3339 instant in any offset.
    pub fn parse(input: &str) -> Option<Self> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .ok()
            .map(|value| Self(value.to_offset(UtcOffset::UTC)))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Time elapsed since this instant; negative when it lies in the future.
    pub fn age(self) -> Duration {
        OffsetDateTime::now_utc() - self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("<unformattable>"))
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}
