//! Sliding-window outbound rate limiter.
//!
//! The limiter never rejects. When the trailing one-second window is full it reserves
//! a virtual slot in the future and returns how long the caller must wait for it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    rps: u32,
    clock: Arc<dyn Clock>,
    slots: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `rps == 0` disables the limiter.
    pub fn new(rps: u32) -> Self {
        Self::with_clock(rps, Arc::new(SystemClock))
    }

    pub fn with_clock(rps: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            rps,
            clock,
            slots: Mutex::new(VecDeque::with_capacity(rps as usize)),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.rps > 0
    }

    /// Records an attempt and returns the delay the caller must honor before sending it.
    pub fn delay_before_next(&self) -> Duration {
        if self.rps == 0 {
            return Duration::ZERO;
        }

        let now = self.clock.now();
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while slots
            .front()
            .is_some_and(|slot| now.saturating_duration_since(*slot) >= WINDOW)
        {
            slots.pop_front();
        }

        let limit = self.rps as usize;
        if slots.len() < limit {
            slots.push_back(now);
            return Duration::ZERO;
        }

        // The new slot must sit one window after the rps-th most recent reservation.
        let anchor = slots[slots.len() - limit];
        let delay = (anchor + WINDOW).saturating_duration_since(now);
        slots.push_back(now + delay);
        delay
    }
}
