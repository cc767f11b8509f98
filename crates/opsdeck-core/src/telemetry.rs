//! Telemetry bus for upstream calls.
//!
//! Every event goes to three places: the per-client counter registry, the `tracing`
//! log, and any registered observers and sinks. Observers and sinks are isolated
//! with `catch_unwind`; nothing they do can change what the caller receives.
//!
//! # Event flow
//!
//! ```text
//! RetryController / UpstreamClient
//!          │ emit(TelemetryEvent)
//!          ▼
//! ┌─────────────────┐──▶ counters (tenant, endpoint)
//! │  TelemetryBus   │──▶ tracing
//! └─────────────────┘──▶ observers (typed hooks)
//!                    └─▶ sinks (PublishedEvent, endpoint masked)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{ResourceKind, UpstreamError, UtcDateTime};

/// Per-event call metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// `None` for health probes.
    pub resource: Option<ResourceKind>,
    pub path: &'static str,
    pub tenant_id: String,
    pub attempt: u32,
    pub request_id: String,
    pub duration_ms: Option<u64>,
}

impl EventContext {
    pub fn new(
        resource: Option<ResourceKind>,
        path: &'static str,
        tenant_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            resource,
            path,
            tenant_id: tenant_id.into(),
            attempt: 0,
            request_id: request_id.into(),
            duration_ms: None,
        }
    }

    pub fn at_attempt(&self, attempt: u32, request_id: impl Into<String>) -> Self {
        Self {
            attempt,
            request_id: request_id.into(),
            duration_ms: None,
            ..self.clone()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration_millis(duration));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Request,
    Response { status: u16 },
    Retry { error: UpstreamError },
    Error { error: UpstreamError },
    RateLimitDelay { delay: Duration },
    /// `short_circuit` is set when a call was refused by an already open breaker.
    BreakerOpen { short_circuit: bool },
    BreakerHalfOpen,
    BreakerClose,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response { .. } => "response",
            Self::Retry { .. } => "retry",
            Self::Error { .. } => "error",
            Self::RateLimitDelay { .. } => "rate_limit_delay",
            Self::BreakerOpen { .. } => "breaker_open",
            Self::BreakerHalfOpen => "breaker_half_open",
            Self::BreakerClose => "breaker_close",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub kind: EventKind,
    pub context: EventContext,
}

impl TelemetryEvent {
    pub const fn new(kind: EventKind, context: EventContext) -> Self {
        Self { kind, context }
    }
}

/// Typed telemetry hooks. Every method defaults to a no-op.
pub trait TelemetryObserver: Send + Sync {
    fn on_request(&self, _context: &EventContext) {}
    fn on_response(&self, _context: &EventContext, _status: u16) {}
    fn on_retry(&self, _context: &EventContext, _error: &UpstreamError) {}
    fn on_error(&self, _context: &EventContext, _error: &UpstreamError) {}
    fn on_rate_limit_delay(&self, _context: &EventContext, _delay: Duration) {}
    fn on_breaker_open(&self, _context: &EventContext) {}
    fn on_breaker_half_open(&self, _context: &EventContext) {}
    fn on_breaker_close(&self, _context: &EventContext) {}
}

/// Wire record handed to external event sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: UtcDateTime,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceKind>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: String,
    pub tenant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// External pub/sub destination for telemetry.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &PublishedEvent);
}

/// Forwards published events over a bounded channel without ever waiting.
/// Events are dropped and counted when the channel is full or closed.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<PublishedEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &PublishedEvent) {
        if self.sender.try_send(event.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Counter registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CounterKey {
    pub tenant: String,
    pub endpoint: String,
}

impl CounterKey {
    pub fn new(tenant: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Monotonic counters for one (tenant, endpoint) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterBucket {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub open_circuits: u64,
}

pub type CountersSnapshot = BTreeMap<CounterKey, CounterBucket>;

/// Observer fan-out, counters, logging and sink publication for one client.
pub struct TelemetryBus {
    masked_endpoint: Option<String>,
    observers: Vec<Arc<dyn TelemetryObserver>>,
    sinks: Vec<Arc<dyn EventSink>>,
    counters: Mutex<HashMap<CounterKey, CounterBucket>>,
    discarded: AtomicU64,
}

impl std::fmt::Debug for TelemetryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBus")
            .field("masked_endpoint", &self.masked_endpoint)
            .field("observers", &self.observers.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TelemetryBus {
    pub fn new(masked_endpoint: Option<String>) -> Self {
        Self {
            masked_endpoint,
            observers: Vec::new(),
            sinks: Vec::new(),
            counters: Mutex::new(HashMap::new()),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TelemetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn emit(&self, event: TelemetryEvent) {
        self.count(&event);
        log_event(&event);

        for observer in &self.observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| notify(observer.as_ref(), &event)));
            if outcome.is_err() {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event = event.kind.as_str(), "telemetry observer panicked; ignored");
            }
        }

        if self.sinks.is_empty() {
            return;
        }
        let published = self.publishable(&event);
        for sink in &self.sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.publish(&published))).is_err() {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event = event.kind.as_str(), "telemetry sink panicked; ignored");
            }
        }
    }

    /// Deep copy of the counter registry.
    pub fn snapshot(&self) -> CountersSnapshot {
        self.lock_counters()
            .iter()
            .map(|(key, bucket)| (key.clone(), *bucket))
            .collect()
    }

    pub fn counters_for(&self, tenant: &str, endpoint: &str) -> CounterBucket {
        self.lock_counters()
            .get(&CounterKey::new(tenant, endpoint))
            .copied()
            .unwrap_or_default()
    }

    /// Observer or sink invocations that panicked.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn publishable(&self, event: &TelemetryEvent) -> PublishedEvent {
        let context = &event.context;
        let (status, error, duration_ms) = match &event.kind {
            EventKind::Response { status } => (Some(*status), None, context.duration_ms),
            EventKind::Retry { error } | EventKind::Error { error } => {
                (error.status(), Some(error.to_string()), context.duration_ms)
            }
            EventKind::RateLimitDelay { delay } => (None, None, Some(duration_millis(*delay))),
            _ => (None, None, context.duration_ms),
        };

        PublishedEvent {
            event_type: event.kind.as_str().to_owned(),
            timestamp: UtcDateTime::now(),
            payload: EventPayload {
                resource: context.resource,
                attempt: context.attempt,
                status,
                error,
                request_id: context.request_id.clone(),
                tenant: context.tenant_id.clone(),
                endpoint: self.masked_endpoint.clone(),
                duration_ms,
            },
        }
    }

    fn count(&self, event: &TelemetryEvent) {
        let key = CounterKey::new(event.context.tenant_id.as_str(), event.context.path);
        let mut counters = self.lock_counters();
        let bucket = counters.entry(key).or_default();
        match event.kind {
            EventKind::Request => bucket.requests += 1,
            EventKind::Response { .. } => bucket.successes += 1,
            EventKind::Retry { .. } => bucket.retries += 1,
            EventKind::Error { .. } => bucket.failures += 1,
            EventKind::BreakerOpen { .. } => bucket.open_circuits += 1,
            EventKind::RateLimitDelay { .. }
            | EventKind::BreakerHalfOpen
            | EventKind::BreakerClose => {}
        }
    }

    fn lock_counters(&self) -> MutexGuard<'_, HashMap<CounterKey, CounterBucket>> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn notify(observer: &dyn TelemetryObserver, event: &TelemetryEvent) {
    let context = &event.context;
    match &event.kind {
        EventKind::Request => observer.on_request(context),
        EventKind::Response { status } => observer.on_response(context, *status),
        EventKind::Retry { error } => observer.on_retry(context, error),
        EventKind::Error { error } => observer.on_error(context, error),
        EventKind::RateLimitDelay { delay } => observer.on_rate_limit_delay(context, *delay),
        EventKind::BreakerOpen { .. } => observer.on_breaker_open(context),
        EventKind::BreakerHalfOpen => observer.on_breaker_half_open(context),
        EventKind::BreakerClose => observer.on_breaker_close(context),
    }
}

fn log_event(event: &TelemetryEvent) {
    let context = &event.context;
    let resource = context.resource.map(ResourceKind::as_str).unwrap_or("health");
    match &event.kind {
        EventKind::Request => tracing::debug!(
            resource,
            tenant = %context.tenant_id,
            attempt = context.attempt,
            request_id = %context.request_id,
            "upstream request"
        ),
        EventKind::Response { status } => tracing::debug!(
            resource,
            tenant = %context.tenant_id,
            attempt = context.attempt,
            status,
            duration_ms = context.duration_ms,
            "upstream response"
        ),
        EventKind::Retry { error } => tracing::warn!(
            resource,
            tenant = %context.tenant_id,
            attempt = context.attempt,
            code = error.code(),
            %error,
            "upstream attempt failed; retrying"
        ),
        EventKind::Error { error } => tracing::warn!(
            resource,
            tenant = %context.tenant_id,
            attempt = context.attempt,
            code = error.code(),
            %error,
            "upstream call failed; serving fallback"
        ),
        EventKind::RateLimitDelay { delay } => tracing::debug!(
            resource,
            tenant = %context.tenant_id,
            delay_ms = duration_millis(*delay),
            "rate limit delay"
        ),
        EventKind::BreakerOpen { short_circuit } => tracing::warn!(
            resource,
            tenant = %context.tenant_id,
            short_circuit,
            "circuit breaker open"
        ),
        EventKind::BreakerHalfOpen => tracing::info!(resource, "circuit breaker half-open; probing"),
        EventKind::BreakerClose => tracing::info!(resource, "circuit breaker closed"),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
