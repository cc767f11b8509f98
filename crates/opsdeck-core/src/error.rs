use thiserror::Error;

/// Validation errors for request contexts and wire values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("tenant id cannot be empty")]
    EmptyTenantId,
    #[error("date range start '{start}' is after end '{end}'")]
    InvertedDateRange { start: String, end: String },
    #[error(
        "invalid resource '{value}', expected one of recommendation, inventory_signal, seo_opportunity"
    )]
    InvalidResource { value: String },
    #[error("timestamp is not RFC3339: '{value}'")]
    InvalidTimestamp { value: String },
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("confidence must be within [0, 1]: {value}")]
    ConfidenceOutOfRange { value: f64 },
    #[error("envelope source cannot be empty")]
    EmptySource,
}

/// Configuration resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer: '{value}'")]
    InvalidInteger { key: &'static str, value: String },
    #[error("{key} must be a boolean (true/false/1/0/yes/no/on/off): '{value}'")]
    InvalidBool { key: &'static str, value: String },
    #[error("endpoint must start with http:// or https://: '{value}'")]
    InvalidEndpoint { value: String },
}

/// Failure signal between the dispatcher, the retry controller and the client facade.
///
/// Never escapes [`UpstreamClient`](crate::UpstreamClient): every variant ends in a
/// fallback envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("malformed upstream response: {message}")]
    Malformed { message: String },

    #[error("upstream endpoint is not configured")]
    NotConfigured,

    #[error("timed out after {waited_ms}ms waiting for a concurrency slot")]
    GateTimeout { waited_ms: u64 },
}

impl UpstreamError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: true,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Transport and status failures are retried; everything else ends the call.
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }

    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport { timeout: true, .. } => "upstream.timeout",
            Self::Transport { .. } => "upstream.transport",
            Self::Status { .. } => "upstream.status",
            Self::Malformed { .. } => "upstream.malformed",
            Self::NotConfigured => "upstream.not_configured",
            Self::GateTimeout { .. } => "upstream.gate_timeout",
        }
    }
}
