//! Injected time source and sleep function.
//!
//! Breaker cooldowns, the rate window and retry backoff all read time through
//! [`Clock`] and wait through [`Sleeper`], so tests can swap in [`ManualClock`]
//! and run without wall-clock delays.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Monotonic time source.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Suspends the calling task for a duration.
pub trait Sleeper: Send + Sync + Debug {
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Manually advanced clock. Sleeping on it advances time instantly and records the
/// requested duration.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Debug, Default)]
struct ManualInner {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            inner: Arc::new(Mutex::new(ManualInner::default())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.elapsed = inner.elapsed.saturating_add(duration);
    }

    /// Every duration passed to [`Sleeper::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }
}

impl Sleeper for ManualClock {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        {
            let mut inner = self.lock();
            inner.elapsed = inner.elapsed.saturating_add(duration);
            inner.sleeps.push(duration);
        }
        Box::pin(tokio::task::yield_now())
    }
}
