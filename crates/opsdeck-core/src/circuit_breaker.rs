use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::clock::{Clock, SystemClock};

/// Runtime circuit state for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_max: u32,
    /// How long a caller yields when every half-open probe slot is taken.
    pub half_open_yield: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(10),
            half_open_max: 1,
            half_open_yield: Duration::from_millis(10),
        }
    }
}

/// State change caused by a breaker call, reported so the caller can publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    Opened,
    HalfOpened,
    Closed,
}

/// Outcome of [`CircuitBreaker::admit`].
#[derive(Debug)]
pub enum Admission<'a> {
    /// Breaker is closed; call proceeds normally.
    Closed,
    /// Call proceeds as a half-open probe while `slot` is held.
    Probe {
        slot: ProbeSlot<'a>,
        entered_half_open: bool,
    },
    /// Half-open and every probe slot is taken. The caller yields
    /// [`CircuitBreakerConfig::half_open_yield`] and then calls
    /// [`CircuitBreaker::force_probe`].
    Saturated,
    /// Breaker is open; no attempt may be made.
    Rejected,
}

impl Admission<'_> {
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Half-open in-flight probe marker, released on drop.
#[derive(Debug)]
pub struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        let mut inner = self.breaker.lock();
        // Slots from before a re-open belong to a counter that was already reset.
        if inner.epoch == self.epoch {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    epoch: u64,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_in_flight: 0,
            epoch: 0,
        }
    }
}

/// Thread-safe circuit breaker for upstream requests.
///
/// Every read-modify-write happens under one mutex, so concurrent failures can trip
/// the breaker at most once.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let config = CircuitBreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            half_open_max: config.half_open_max.max(1),
            ..config
        };
        Self {
            config,
            clock,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decides whether a call may reach the upstream, moving Open to HalfOpen once the
    /// cooldown has elapsed.
    pub fn admit(&self) -> Admission<'_> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Admission::Closed,
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max {
                    inner.half_open_in_flight += 1;
                    let epoch = inner.epoch;
                    Admission::Probe {
                        slot: ProbeSlot {
                            breaker: self,
                            epoch,
                        },
                        entered_half_open: false,
                    }
                } else {
                    Admission::Saturated
                }
            }
            CircuitState::Open => {
                let now = self.clock.now();
                let can_probe = inner
                    .opened_at
                    .map(|opened_at| now.saturating_duration_since(opened_at) >= self.config.cooldown)
                    .unwrap_or(false);

                if can_probe {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.half_open_in_flight = 1;
                    tracing::info!("circuit half-open; admitting probe");
                    let epoch = inner.epoch;
                    Admission::Probe {
                        slot: ProbeSlot {
                            breaker: self,
                            epoch,
                        },
                        entered_half_open: true,
                    }
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Boolean view of [`admit`](Self::admit). A granted probe slot is released
    /// immediately.
    pub fn allow_request(&self) -> bool {
        !self.admit().is_rejected()
    }

    /// Admits a caller that yielded after [`Admission::Saturated`].
    ///
    /// The state is read again: a probe that failed meanwhile leaves the breaker
    /// Open and the caller is rejected. Still HalfOpen takes a slot regardless of
    /// `half_open_max`.
    pub fn force_probe(&self) -> Admission<'_> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Admission::Closed,
            CircuitState::Open => Admission::Rejected,
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_add(1);
                Admission::Probe {
                    slot: ProbeSlot {
                        breaker: self,
                        epoch: inner.epoch,
                    },
                    entered_half_open: false,
                }
            }
        }
    }

    /// Only a half-open probe closes the breaker. While Open, a late success from
    /// a call admitted earlier resets the failure count and nothing else.
    pub fn record_success(&self) -> Option<CircuitTransition> {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state != CircuitState::HalfOpen {
            return None;
        }

        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.half_open_in_flight = 0;
        inner.epoch = inner.epoch.wrapping_add(1);
        tracing::info!("circuit closed");
        Some(CircuitTransition::Closed)
    }

    pub fn record_failure(&self) -> Option<CircuitTransition> {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trips = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if !trips {
            return None;
        }

        inner.state = CircuitState::Open;
        inner.opened_at = Some(self.clock.now());
        inner.half_open_in_flight = 0;
        inner.epoch = inner.epoch.wrapping_add(1);
        tracing::warn!(
            consecutive_failures = inner.consecutive_failures,
            cooldown_ms = u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX),
            "circuit opened"
        );
        Some(CircuitTransition::Opened)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn half_open_in_flight(&self) -> u32 {
        self.lock().half_open_in_flight
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(threshold: u32, cooldown_ms: u64, half_open_max: u32) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_millis(cooldown_ms),
                half_open_max,
                ..CircuitBreakerConfig::default()
            },
            Arc::new(clock.clone()),
        );
        (breaker, clock)
    }

    #[test]
    fn opens_after_threshold_failures() {
        let (breaker, _clock) = breaker(2, 10, 1);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.record_failure(), None);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.record_failure(), Some(CircuitTransition::Opened));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_before_threshold_resets_failure_counter() {
        let (breaker, _clock) = breaker(3, 10, 1);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.record_success(), None);
        assert_eq!(breaker.consecutive_failures(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn rejects_until_cooldown_then_admits_probe() {
        let (breaker, clock) = breaker(1, 1_000, 1);
        breaker.record_failure();

        clock.advance(Duration::from_millis(999));
        assert!(breaker.admit().is_rejected());
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(1));
        match breaker.admit() {
            Admission::Probe {
                entered_half_open, ..
            } => assert!(entered_half_open),
            other => panic!("expected probe, got {other:?}"),
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_limits_in_flight_probes() {
        let (breaker, clock) = breaker(1, 5, 1);
        breaker.record_failure();
        clock.advance(Duration::from_millis(5));

        let first = breaker.admit();
        assert!(matches!(first, Admission::Probe { .. }));
        assert!(matches!(breaker.admit(), Admission::Saturated));

        let forced = breaker.force_probe();
        assert!(matches!(forced, Admission::Probe { .. }));
        assert_eq!(breaker.half_open_in_flight(), 2);
        drop(forced);
        drop(first);
        assert_eq!(breaker.half_open_in_flight(), 0);
        assert!(matches!(breaker.admit(), Admission::Probe { .. }));
    }

    #[test]
    fn probe_success_closes_and_probe_failure_reopens() {
        let (breaker, clock) = breaker(2, 5, 1);
        breaker.record_failure();
        breaker.record_failure();
        clock.advance(Duration::from_millis(5));

        {
            let _probe = breaker.admit();
            assert_eq!(breaker.record_failure(), Some(CircuitTransition::Opened));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.half_open_in_flight(), 0);

        clock.advance(Duration::from_millis(5));
        let _probe = breaker.admit();
        assert_eq!(breaker.record_success(), Some(CircuitTransition::Closed));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn stale_slot_release_does_not_touch_new_half_open_window() {
        let (breaker, clock) = breaker(1, 5, 1);
        breaker.record_failure();
        clock.advance(Duration::from_millis(5));

        let stale = breaker.admit();
        breaker.record_failure();
        clock.advance(Duration::from_millis(5));
        let fresh = breaker.admit();
        assert!(matches!(fresh, Admission::Probe { .. }));

        drop(stale);
        assert_eq!(breaker.half_open_in_flight(), 1);
        drop(fresh);
    }

    #[test]
    fn yielded_caller_is_rejected_once_the_trial_call_reopened_the_breaker() {
        let (breaker, clock) = breaker(1, 5, 1);
        breaker.record_failure();
        clock.advance(Duration::from_millis(5));

        let trial = breaker.admit();
        assert!(matches!(breaker.admit(), Admission::Saturated));
        assert_eq!(breaker.record_failure(), Some(CircuitTransition::Opened));
        drop(trial);

        assert!(breaker.force_probe().is_rejected());
        assert_eq!(breaker.half_open_in_flight(), 0);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn yielded_caller_proceeds_without_slot_once_the_trial_call_closed_the_breaker() {
        let (breaker, clock) = breaker(1, 5, 1);
        breaker.record_failure();
        clock.advance(Duration::from_millis(5));

        let trial = breaker.admit();
        assert_eq!(breaker.record_success(), Some(CircuitTransition::Closed));
        drop(trial);

        assert!(matches!(breaker.force_probe(), Admission::Closed));
        assert_eq!(breaker.half_open_in_flight(), 0);
    }

    #[test]
    fn late_success_while_open_keeps_the_cooldown() {
        let (breaker, clock) = breaker(2, 1_000, 1);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // A call admitted before the trip finishes successfully afterwards.
        assert_eq!(breaker.record_success(), None);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(breaker.admit().is_rejected());

        clock.advance(Duration::from_millis(1_000));
        assert!(matches!(
            breaker.admit(),
            Admission::Probe {
                entered_half_open: true,
                ..
            }
        ));
    }

    #[test]
    fn concurrent_failures_trip_exactly_once() {
        let (breaker, _clock) = breaker(4, 1_000, 1);
        let breaker = Arc::new(breaker);

        let handles = (0..16)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || breaker.record_failure())
            })
            .collect::<Vec<_>>();

        let opened = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should not panic"))
            .filter(|transition| *transition == Some(CircuitTransition::Opened))
            .count();

        assert_eq!(opened, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
