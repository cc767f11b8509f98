//! # Opsdeck Core
//!
//! Resilient upstream client for the opsdeck operations dashboard.
//!
//! ## Overview
//!
//! Dashboard pages ask for recommendations, inventory signals and SEO opportunities.
//! This crate fetches them from the analytics upstream and always answers:
//!
//! - **Circuit breaker** stops hammering an upstream that keeps failing
//! - **Sliding-window rate limiter** spaces outbound attempts
//! - **Concurrency gate** caps simultaneous calls per client
//! - **Retry controller** with exponential backoff and jitter
//! - **Telemetry bus** for observers, counters and event sinks
//! - **Fallback provider** with deterministic local payloads
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`circuit_breaker`] | Closed / Open / HalfOpen breaker with RAII probe slots |
//! | [`client`] | `UpstreamClient` facade and builder |
//! | [`clock`] | Injected clock and sleeper, manual clock for tests |
//! | [`concurrency`] | Bounded concurrency gate |
//! | [`config`] | Override / environment / default resolution |
//! | [`context`] | Request context and outbound payload |
//! | [`dispatcher`] | Single-attempt HTTP dispatch |
//! | [`envelope`] | Response envelope |
//! | [`error`] | Error types |
//! | [`fallback`] | Deterministic fallback payloads |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`rate_limiter`] | Sliding one-second window |
//! | [`resource`] | Resource kinds and wire paths |
//! | [`retry`] | Retry policy and controller |
//! | [`telemetry`] | Telemetry events, observers, counters and sinks |
//! | [`timestamp`] | UTC timestamp |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use opsdeck_core::{ClientConfig, ClientOverrides, RequestContext, ResourceKind, UpstreamClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env(&ClientOverrides::default())?;
//!     let client = UpstreamClient::new(config);
//!
//!     let context = RequestContext::new("tenant-42", ResourceKind::InventorySignal)?;
//!     let envelope = client.inventory_signals(&context).await;
//!
//!     if envelope.is_fallback() {
//!         eprintln!("upstream unavailable, showing local estimates");
//!     }
//!     println!("{}", envelope.data);
//!     Ok(())
//! }
//! ```
//!
//! ## Call Flow
//!
//! ```text
//! caller
//!   │
//!   ▼
//! ┌─────────────────┐  mocks / no endpoint  ┌──────────────────┐
//! │  UpstreamClient │──────────────────────▶│ FallbackProvider │
//! └────────┬────────┘                       └──────────────────┘
//!          │ ConcurrencyGate
//!          ▼                   open
//! ┌─────────────────┐──────────────────────▶ fallback
//! │ CircuitBreaker  │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ RetryController │────▶│  RateLimiter     │
//! └────────┬────────┘     └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Dispatcher    │────▶│  HttpTransport   │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Configuration and request construction return `Result`. Once a client exists its
//! operations never fail; upstream problems surface only as fallback envelopes and
//! telemetry:
//!
//! ```rust
//! use opsdeck_core::UpstreamError;
//!
//! fn describe(error: &UpstreamError) -> &'static str {
//!     if error.retryable() {
//!         "retried with backoff"
//!     } else {
//!         "served from fallback immediately"
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - The API key is never logged; `Debug` output redacts it
//! - Published telemetry carries the endpoint with its scheme stripped

pub mod circuit_breaker;
pub mod client;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod fallback;
pub mod http_client;
pub mod rate_limiter;
pub mod resource;
pub mod retry;
pub mod telemetry;
pub mod timestamp;

// Circuit breaker
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitTransition};

// Client facade
pub use client::{HealthProbe, UpstreamClient, UpstreamClientBuilder};

// Time
pub use clock::{Clock, ManualClock, Sleeper, SystemClock, TokioSleeper};

// Concurrency
pub use concurrency::{ConcurrencyGate, GatePermit};

// Configuration
pub use config::{BreakerOverrides, ClientConfig, ClientOverrides};

// Request context
pub use context::{DateRange, OutboundPayload, RequestContext, Scalar};

// Dispatch
pub use dispatcher::{Dispatched, RequestDispatcher};

// Envelope
pub use envelope::{ResponseEnvelope, FALLBACK_SOURCE};

// Error types
pub use error::{ConfigError, UpstreamError, ValidationError};

// Fallback
pub use fallback::{FallbackProvider, FALLBACK_CONFIDENCE};

// HTTP transport
pub use http_client::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

// Rate limiting
pub use rate_limiter::RateLimiter;

// Resources
pub use resource::ResourceKind;

// Retry
pub use retry::{CallFailure, RetryController, RetryPolicy};

// Telemetry
pub use telemetry::{
    ChannelSink, CounterBucket, CounterKey, CountersSnapshot, EventContext, EventKind, EventSink,
    PublishedEvent, TelemetryBus, TelemetryEvent, TelemetryObserver,
};

// Timestamps
pub use timestamp::UtcDateTime;
