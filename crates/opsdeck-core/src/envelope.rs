use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{UtcDateTime, ValidationError};

/// `source` tag carried by every locally generated envelope.
pub const FALLBACK_SOURCE: &str = "mock";

/// Response envelope returned on both live and fallback paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T = Value> {
    pub data: T,
    pub generated_at: UtcDateTime,
    pub source: String,
    pub confidence: f64,
}

impl<T> ResponseEnvelope<T> {
    pub fn new(
        data: T,
        generated_at: UtcDateTime,
        source: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, ValidationError> {
        let envelope = Self {
            data,
            generated_at,
            source: source.into(),
            confidence,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.confidence,
            });
        }

        if self.source.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }

        Ok(())
    }

    pub fn is_fallback(&self) -> bool {
        self.source == FALLBACK_SOURCE
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResponseEnvelope<U> {
        ResponseEnvelope {
            data: f(self.data),
            generated_at: self.generated_at,
            source: self.source,
            confidence: self.confidence,
        }
    }
}
