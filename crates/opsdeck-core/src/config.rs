//! Client configuration, resolved once at construction.
//!
//! Precedence is explicit override, then environment, then built-in default. The
//! result is one immutable [`ClientConfig`] shared by every component.
//!
//! | Option | Environment variable | Default |
//! |--------|----------------------|---------|
//! | `endpoint` | `OPSDECK_UPSTREAM_ENDPOINT` | unset (fallback only) |
//! | `apiKey` | `OPSDECK_UPSTREAM_API_KEY` | unset |
//! | `maxRetries` | `OPSDECK_UPSTREAM_MAX_RETRIES` | 3 |
//! | `timeoutMs` | `OPSDECK_UPSTREAM_TIMEOUT_MS` | 5000 |
//! | `maxConcurrent` | `OPSDECK_UPSTREAM_MAX_CONCURRENT` | 4 |
//! | `rateLimitRps` | `OPSDECK_UPSTREAM_RATE_LIMIT_RPS` | 0 (disabled) |
//! | `gateTimeoutMs` | `OPSDECK_UPSTREAM_GATE_TIMEOUT_MS` | 30000 |
//! | `breaker.failureThreshold` | `OPSDECK_BREAKER_FAILURE_THRESHOLD` | 5 |
//! | `breaker.cooldownMs` | `OPSDECK_BREAKER_COOLDOWN_MS` | 10000 |
//! | `breaker.halfOpenMax` | `OPSDECK_BREAKER_HALF_OPEN_MAX` | 1 |
//! | `useMocks` | `OPSDECK_USE_MOCKS` | false |
//! | `keepAlive` | `OPSDECK_UPSTREAM_KEEP_ALIVE` | true |

use std::fmt::{Debug, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryPolicy;
use crate::ConfigError;

pub const ENV_ENDPOINT: &str = "OPSDECK_UPSTREAM_ENDPOINT";
pub const ENV_API_KEY: &str = "OPSDECK_UPSTREAM_API_KEY";
pub const ENV_MAX_RETRIES: &str = "OPSDECK_UPSTREAM_MAX_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "OPSDECK_UPSTREAM_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT: &str = "OPSDECK_UPSTREAM_MAX_CONCURRENT";
pub const ENV_RATE_LIMIT_RPS: &str = "OPSDECK_UPSTREAM_RATE_LIMIT_RPS";
pub const ENV_GATE_TIMEOUT_MS: &str = "OPSDECK_UPSTREAM_GATE_TIMEOUT_MS";
pub const ENV_FAILURE_THRESHOLD: &str = "OPSDECK_BREAKER_FAILURE_THRESHOLD";
pub const ENV_COOLDOWN_MS: &str = "OPSDECK_BREAKER_COOLDOWN_MS";
pub const ENV_HALF_OPEN_MAX: &str = "OPSDECK_BREAKER_HALF_OPEN_MAX";
pub const ENV_USE_MOCKS: &str = "OPSDECK_USE_MOCKS";
pub const ENV_KEEP_ALIVE: &str = "OPSDECK_UPSTREAM_KEEP_ALIVE";

const DEFAULT_MAX_RETRIES: u64 = 3;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_CONCURRENT: u64 = 4;
const DEFAULT_GATE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
const DEFAULT_COOLDOWN_MS: u64 = 10_000;
const DEFAULT_HALF_OPEN_MAX: u64 = 1;

/// Caller-supplied overrides. Every field is optional; unset fields fall through to
/// the environment and then to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOverrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub rate_limit_rps: Option<u32>,
    pub gate_timeout_ms: Option<u64>,
    pub breaker: BreakerOverrides,
    pub use_mocks: Option<bool>,
    pub keep_alive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerOverrides {
    pub failure_threshold: Option<u32>,
    pub cooldown_ms: Option<u64>,
    pub half_open_max: Option<u32>,
}

/// Fully resolved, immutable client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub retry: RetryPolicy,
    pub max_concurrent: usize,
    pub rate_limit_rps: u32,
    pub gate_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
    pub use_mocks: bool,
    pub keep_alive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            retry: RetryPolicy::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT as usize,
            rate_limit_rps: 0,
            gate_timeout: Duration::from_millis(DEFAULT_GATE_TIMEOUT_MS),
            breaker: CircuitBreakerConfig::default(),
            use_mocks: false,
            keep_alive: true,
        }
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .field("max_concurrent", &self.max_concurrent)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("gate_timeout", &self.gate_timeout)
            .field("breaker", &self.breaker)
            .field("use_mocks", &self.use_mocks)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl ClientConfig {
    /// Mocks-only configuration: every call returns the fallback payload.
    pub fn mocks_only() -> Self {
        Self {
            use_mocks: true,
            ..Self::default()
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: normalize_endpoint(Some(endpoint.into()))?,
            ..Self::default()
        })
    }

    /// Resolves overrides against the process environment.
    pub fn from_env(overrides: &ClientOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolves overrides against an arbitrary environment lookup.
    pub fn resolve<F>(overrides: &ClientOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let endpoint = normalize_endpoint(overrides.endpoint.clone().or_else(|| lookup(ENV_ENDPOINT)))?;
        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| lookup(ENV_API_KEY))
            .filter(|key| !key.trim().is_empty());

        let max_retries = pick_u64(
            overrides.max_retries.map(u64::from),
            ENV_MAX_RETRIES,
            &lookup,
            DEFAULT_MAX_RETRIES,
        )?;
        let timeout_ms = pick_u64(overrides.timeout_ms, ENV_TIMEOUT_MS, &lookup, DEFAULT_TIMEOUT_MS)?;
        let max_concurrent = pick_u64(
            overrides.max_concurrent.map(|value| value as u64),
            ENV_MAX_CONCURRENT,
            &lookup,
            DEFAULT_MAX_CONCURRENT,
        )?;
        let rate_limit_rps = pick_u64(
            overrides.rate_limit_rps.map(u64::from),
            ENV_RATE_LIMIT_RPS,
            &lookup,
            0,
        )?;
        let gate_timeout_ms = pick_u64(
            overrides.gate_timeout_ms,
            ENV_GATE_TIMEOUT_MS,
            &lookup,
            DEFAULT_GATE_TIMEOUT_MS,
        )?;
        let failure_threshold = pick_u64(
            overrides.breaker.failure_threshold.map(u64::from),
            ENV_FAILURE_THRESHOLD,
            &lookup,
            DEFAULT_FAILURE_THRESHOLD,
        )?;
        let cooldown_ms = pick_u64(
            overrides.breaker.cooldown_ms,
            ENV_COOLDOWN_MS,
            &lookup,
            DEFAULT_COOLDOWN_MS,
        )?;
        let half_open_max = pick_u64(
            overrides.breaker.half_open_max.map(u64::from),
            ENV_HALF_OPEN_MAX,
            &lookup,
            DEFAULT_HALF_OPEN_MAX,
        )?;
        let use_mocks = pick_bool(overrides.use_mocks, ENV_USE_MOCKS, &lookup, false)?;
        let keep_alive = pick_bool(overrides.keep_alive, ENV_KEEP_ALIVE, &lookup, true)?;

        let config = Self {
            endpoint,
            api_key,
            retry: RetryPolicy {
                max_attempts: clamp_u32(max_retries).max(1),
                timeout_per_attempt: Duration::from_millis(timeout_ms),
                ..RetryPolicy::default()
            },
            max_concurrent: usize::try_from(max_concurrent).unwrap_or(usize::MAX).max(1),
            rate_limit_rps: clamp_u32(rate_limit_rps),
            gate_timeout: Duration::from_millis(gate_timeout_ms),
            breaker: CircuitBreakerConfig {
                failure_threshold: clamp_u32(failure_threshold).max(1),
                cooldown: Duration::from_millis(cooldown_ms),
                half_open_max: clamp_u32(half_open_max).max(1),
                ..CircuitBreakerConfig::default()
            },
            use_mocks,
            keep_alive,
        };

        tracing::debug!(
            endpoint = config.masked_endpoint().as_deref().unwrap_or("<unset>"),
            max_attempts = config.retry.max_attempts,
            timeout_ms,
            max_concurrent = config.max_concurrent,
            rate_limit_rps = config.rate_limit_rps,
            use_mocks = config.use_mocks,
            "upstream client configuration resolved"
        );

        Ok(config)
    }

    /// Live calls need an endpoint and mocks disabled.
    pub fn is_live(&self) -> bool {
        !self.use_mocks && self.endpoint.is_some()
    }

    /// Endpoint with the scheme stripped, safe to publish.
    pub fn masked_endpoint(&self) -> Option<String> {
        self.endpoint.as_deref().map(mask_endpoint)
    }

    /// Feature names announced in the `X-Client-Features` header.
    pub fn enabled_features(&self) -> Vec<&'static str> {
        let mut features = vec!["breaker", "fallback"];
        if self.retry.max_attempts > 1 {
            features.push("retry");
        }
        if self.rate_limit_rps > 0 {
            features.push("rate-limit");
        }
        if self.keep_alive {
            features.push("keep-alive");
        }
        features
    }
}

/// Strips `scheme://` from an endpoint URL.
pub fn mask_endpoint(endpoint: &str) -> String {
    match endpoint.split_once("://") {
        Some((_, rest)) => rest.to_owned(),
        None => endpoint.to_owned(),
    }
}

fn normalize_endpoint(endpoint: Option<String>) -> Result<Option<String>, ConfigError> {
    let Some(endpoint) = endpoint else {
        return Ok(None);
    };
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidEndpoint {
            value: endpoint.clone(),
        });
    }
    Ok(Some(trimmed.to_owned()))
}

fn pick_u64<F>(
    value: Option<u64>,
    key: &'static str,
    lookup: &F,
    default: u64,
) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = value {
        return Ok(value);
    }
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidInteger { key, value: raw }),
        None => Ok(default),
    }
}

fn pick_bool<F>(
    value: Option<bool>,
    key: &'static str,
    lookup: &F,
    default: bool,
) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = value {
        return Ok(value);
    }
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool { key, value: raw }),
        },
        None => Ok(default),
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
