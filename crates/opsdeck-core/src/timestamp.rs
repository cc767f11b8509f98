use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// Instant on the wire, always UTC and always written with a `Z` suffix.
///
/// Upstream envelopes (`generatedAt`), request windows and published telemetry all
/// carry this type, so a non-UTC offset anywhere is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            }
        })?;
        if parsed.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            });
        }
        Ok(Self(parsed))
    }

    /// Reads a reporting-window bound: `YYYY-MM-DD` means midnight UTC of that
    /// day, anything else must be a full UTC instant.
    pub fn parse_day_or_instant(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        match Date::parse(input, format_description!("[year]-[month]-[day]")) {
            Ok(day) => Ok(Self(day.midnight().assume_utc())),
            Err(_) => Self::parse(input),
        }
    }

    pub fn to_rfc3339(self) -> String {
        // Every UTC value in the supported year range is representable.
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl TryFrom<String> for UtcDateTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcDateTime> for String {
    fn from(value: UtcDateTime) -> Self {
        value.to_rfc3339()
    }
}
