//! Retry logic with exponential backoff and jitter.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, Sleeper};
use crate::dispatcher::RequestDispatcher;
use crate::rate_limiter::RateLimiter;
use crate::telemetry::{EventContext, EventKind, TelemetryBus, TelemetryEvent};
use crate::{RequestContext, ResponseEnvelope, UpstreamError};

/// Attempt budget and backoff curve for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub timeout_per_attempt: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Symmetric jitter applied to the capped delay, in percent.
    pub jitter_percent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_per_attempt: Duration::from_millis(5_000),
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(1_000),
            jitter_percent: 20,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_with_sample(attempt, fastrand::f64())
    }

    /// Same as [`backoff`](Self::backoff) with the uniform `[0, 1)` sample supplied.
    pub fn backoff_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let capped = self.capped_backoff(attempt).as_secs_f64();
        let ratio = f64::from(self.jitter_percent) / 100.0;
        let jitter = capped * (sample.clamp(0.0, 1.0) * 2.0 - 1.0) * ratio;
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// `min(base * 2^attempt, cap)` before jitter.
    pub fn capped_backoff(&self, attempt: u32) -> Duration {
        let scale = 2_f64.powi(attempt.min(31) as i32);
        let seconds = self.backoff_base.as_secs_f64() * scale;
        Duration::from_secs_f64(seconds.min(self.backoff_cap.as_secs_f64()))
    }
}

/// Last failure of a call, with the context of the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub error: UpstreamError,
    pub last_attempt: EventContext,
}

/// Drives up to `max_attempts` dispatcher attempts for one call.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    dispatcher: RequestDispatcher,
    limiter: Arc<RateLimiter>,
    telemetry: Arc<TelemetryBus>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryController {
    pub fn new(
        policy: RetryPolicy,
        dispatcher: RequestDispatcher,
        limiter: Arc<RateLimiter>,
        telemetry: Arc<TelemetryBus>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            dispatcher,
            limiter,
            telemetry,
            clock,
            sleeper,
        }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub const fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Returns the first successful envelope, or the last failure once attempts run
    /// out. Non-retryable failures end the loop immediately.
    pub async fn execute(
        &self,
        context: &RequestContext,
        call: &EventContext,
    ) -> Result<ResponseEnvelope, CallFailure> {
        let mut attempt = 1;
        loop {
            let attempt_context = call.at_attempt(attempt, format!("{}:{attempt}", call.request_id));
            self.wait_for_rate_slot(&attempt_context).await;

            self.telemetry
                .emit(TelemetryEvent::new(EventKind::Request, attempt_context.clone()));

            let started = self.clock.now();
            let outcome = self
                .dispatcher
                .attempt(
                    context,
                    &attempt_context.request_id,
                    self.policy.timeout_per_attempt,
                )
                .await;
            let elapsed = self.clock.now().saturating_duration_since(started);
            let attempt_context = attempt_context.with_duration(elapsed);

            let error = match outcome {
                Ok(dispatched) => {
                    self.telemetry.emit(TelemetryEvent::new(
                        EventKind::Response {
                            status: dispatched.status,
                        },
                        attempt_context,
                    ));
                    return Ok(dispatched.envelope);
                }
                Err(error) => error,
            };

            if !error.retryable() || attempt >= self.policy.max_attempts {
                return Err(CallFailure {
                    error,
                    last_attempt: attempt_context,
                });
            }

            self.telemetry.emit(TelemetryEvent::new(
                EventKind::Retry { error },
                attempt_context,
            ));
            self.sleeper.sleep(self.policy.backoff(attempt)).await;
            attempt += 1;
        }
    }

    async fn wait_for_rate_slot(&self, context: &EventContext) {
        let delay = self.limiter.delay_before_next();
        if delay.is_zero() {
            return;
        }
        self.telemetry.emit(TelemetryEvent::new(
            EventKind::RateLimitDelay { delay },
            context.clone(),
        ));
        self.sleeper.sleep(delay).await;
    }
}
