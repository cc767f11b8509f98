//! Client facade for dashboard pages.
//!
//! [`UpstreamClient`] never returns an error. Every operation resolves to a
//! [`ResponseEnvelope`]; callers tell live data from fallback data only through
//! [`ResponseEnvelope::is_fallback`].

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitState, CircuitTransition, ProbeSlot};
use crate::clock::{Clock, ManualClock, Sleeper, SystemClock, TokioSleeper};
use crate::concurrency::ConcurrencyGate;
use crate::dispatcher::{RequestDispatcher, HEALTH_PATH};
use crate::fallback::{FallbackProvider, DEFAULT_SEED};
use crate::http_client::{HttpTransport, ReqwestTransport};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryController;
use crate::telemetry::{
    CountersSnapshot, EventContext, EventKind, EventSink, TelemetryBus, TelemetryEvent,
    TelemetryObserver,
};
use crate::{ClientConfig, RequestContext, ResourceKind, ResponseEnvelope};

/// Tenant recorded for health probes, which carry no request context.
pub const HEALTH_TENANT: &str = "system";

/// Result of [`UpstreamClient::ping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthProbe {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub latency_ms: u64,
    /// No upstream was contacted; calls are served from fallback data.
    pub mocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthProbe {
    fn offline(healthy: bool) -> Self {
        Self {
            healthy,
            status: None,
            latency_ms: 0,
            mocked: true,
            error: None,
        }
    }
}

/// Builder for [`UpstreamClient`].
pub struct UpstreamClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    observers: Vec<Arc<dyn TelemetryObserver>>,
    sinks: Vec<Arc<dyn EventSink>>,
    seed: u64,
}

impl UpstreamClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            observers: Vec::new(),
            sinks: Vec::new(),
            seed: DEFAULT_SEED,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Uses `clock` both as time source and as sleeper.
    pub fn manual_clock(self, clock: ManualClock) -> Self {
        self.clock(Arc::new(clock.clone())).sleeper(Arc::new(clock))
    }

    pub fn observer(mut self, observer: Arc<dyn TelemetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn fallback_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> UpstreamClient {
        let Self {
            config,
            transport,
            clock,
            sleeper,
            observers,
            sinks,
            seed,
        } = self;

        let telemetry = observers.into_iter().fold(
            TelemetryBus::new(config.masked_endpoint()),
            TelemetryBus::with_observer,
        );
        let telemetry = Arc::new(sinks.into_iter().fold(telemetry, TelemetryBus::with_sink));
        let limiter = Arc::new(RateLimiter::with_clock(config.rate_limit_rps, Arc::clone(&clock)));

        let retry = if config.is_live() {
            let transport = transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new(config.keep_alive)));
            RequestDispatcher::new(transport, &config).ok().map(|dispatcher| {
                RetryController::new(
                    config.retry,
                    dispatcher,
                    Arc::clone(&limiter),
                    Arc::clone(&telemetry),
                    Arc::clone(&clock),
                    Arc::clone(&sleeper),
                )
            })
        } else {
            None
        };

        tracing::debug!(
            live = retry.is_some(),
            features = %config.enabled_features().join(","),
            "upstream client built"
        );

        UpstreamClient {
            breaker: CircuitBreaker::with_clock(config.breaker, Arc::clone(&clock)),
            gate: ConcurrencyGate::new(config.max_concurrent),
            fallback: FallbackProvider::new(seed),
            config,
            telemetry,
            limiter,
            retry,
            clock,
            sleeper,
        }
    }
}

/// Resilient client for the analytics upstream.
pub struct UpstreamClient {
    config: ClientConfig,
    breaker: CircuitBreaker,
    gate: ConcurrencyGate,
    limiter: Arc<RateLimiter>,
    telemetry: Arc<TelemetryBus>,
    fallback: FallbackProvider,
    retry: Option<RetryController>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("config", &self.config)
            .field("breaker", &self.breaker.state())
            .field("live", &self.retry.is_some())
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    pub fn builder(config: ClientConfig) -> UpstreamClientBuilder {
        UpstreamClientBuilder::new(config)
    }

    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.telemetry.snapshot()
    }

    pub fn telemetry(&self) -> &TelemetryBus {
        &self.telemetry
    }

    pub async fn recommendations(&self, context: &RequestContext) -> ResponseEnvelope {
        self.fetch(&context.for_resource(ResourceKind::Recommendation))
            .await
    }

    pub async fn inventory_signals(&self, context: &RequestContext) -> ResponseEnvelope {
        self.fetch(&context.for_resource(ResourceKind::InventorySignal))
            .await
    }

    pub async fn seo_opportunities(&self, context: &RequestContext) -> ResponseEnvelope {
        self.fetch(&context.for_resource(ResourceKind::SeoOpportunity))
            .await
    }

    /// Fetches `context.resource()`, falling back to local data on any failure.
    pub async fn fetch(&self, context: &RequestContext) -> ResponseEnvelope {
        let resource = context.resource();
        let Some(retry) = &self.retry else {
            tracing::debug!(resource = resource.as_str(), "no live upstream; serving fallback");
            return self.fallback.get(resource);
        };

        let call = EventContext::new(
            Some(resource),
            resource.path(),
            context.tenant_id(),
            Uuid::new_v4().to_string(),
        );

        let _permit = match self.gate.acquire_within(self.config.gate_timeout).await {
            Ok(permit) => permit,
            Err(error) => {
                self.emit(EventKind::Error { error }, call);
                return self.fallback.get(resource);
            }
        };

        let Some(_probe) = self.admit(&call).await else {
            self.emit(EventKind::BreakerOpen { short_circuit: true }, call);
            return self.fallback.get(resource);
        };

        match retry.execute(context, &call).await {
            Ok(envelope) => {
                if self.breaker.record_success() == Some(CircuitTransition::Closed) {
                    self.emit(EventKind::BreakerClose, call);
                }
                envelope
            }
            Err(failure) => {
                let transition = self.breaker.record_failure();
                self.emit(
                    EventKind::Error {
                        error: failure.error,
                    },
                    failure.last_attempt,
                );
                if transition == Some(CircuitTransition::Opened) {
                    self.emit(EventKind::BreakerOpen { short_circuit: false }, call);
                }
                self.fallback.get(resource)
            }
        }
    }

    /// Probes `GET {endpoint}/health` once. Never consults or updates the breaker.
    pub async fn ping(&self) -> HealthProbe {
        let Some(retry) = &self.retry else {
            return HealthProbe::offline(self.config.use_mocks);
        };

        let call = EventContext::new(None, HEALTH_PATH, HEALTH_TENANT, Uuid::new_v4().to_string());
        let context = call.at_attempt(1, format!("{}:1", call.request_id));

        let _permit = match self.gate.acquire_within(self.config.gate_timeout).await {
            Ok(permit) => permit,
            Err(error) => {
                let probe = HealthProbe {
                    healthy: false,
                    status: None,
                    latency_ms: 0,
                    mocked: false,
                    error: Some(error.to_string()),
                };
                self.emit(EventKind::Error { error }, context);
                return probe;
            }
        };

        let delay = self.limiter.delay_before_next();
        if !delay.is_zero() {
            self.emit(EventKind::RateLimitDelay { delay }, context.clone());
            self.sleeper.sleep(delay).await;
        }

        self.emit(EventKind::Request, context.clone());
        let started = self.clock.now();
        let outcome = retry
            .dispatcher()
            .probe(&context.request_id, retry.policy().timeout_per_attempt)
            .await;
        let elapsed = self.clock.now().saturating_duration_since(started);
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let context = context.with_duration(elapsed);

        match outcome {
            Ok(status) => {
                self.emit(EventKind::Response { status }, context);
                HealthProbe {
                    healthy: true,
                    status: Some(status),
                    latency_ms,
                    mocked: false,
                    error: None,
                }
            }
            Err(error) => {
                let probe = HealthProbe {
                    healthy: false,
                    status: error.status(),
                    latency_ms,
                    mocked: false,
                    error: Some(error.to_string()),
                };
                self.emit(EventKind::Error { error }, context);
                probe
            }
        }
    }

    /// Returns the probe slot to hold for the call, or `None` when the breaker
    /// refuses it.
    async fn admit(&self, call: &EventContext) -> Option<Option<ProbeSlot<'_>>> {
        let admission = match self.breaker.admit() {
            Admission::Saturated => {
                self.sleeper
                    .sleep(self.breaker.config().half_open_yield)
                    .await;
                self.breaker.force_probe()
            }
            admission => admission,
        };

        match admission {
            Admission::Closed => Some(None),
            Admission::Probe {
                slot,
                entered_half_open,
            } => {
                if entered_half_open {
                    self.emit(EventKind::BreakerHalfOpen, call.clone());
                }
                Some(Some(slot))
            }
            Admission::Saturated | Admission::Rejected => None,
        }
    }

    fn emit(&self, kind: EventKind, context: EventContext) {
        self.telemetry.emit(TelemetryEvent::new(kind, context));
    }
}
