//! Time source for polling loops and advisory timeouts.
//!
//! Every bounded wait in the executor and in tool discovery reads time and
//! sleeps through a [`Clock`]. Production code uses [`SystemClock`]; tests
//! use [`SimClock`], which only advances when slept on, so a three-second
//! convergence window or a motion that never completes runs instantly and
//! deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Seconds since an arbitrary fixed origin.
    fn now(&self) -> f64;

    /// Block for `secs` seconds.
    fn sleep(&self, secs: f64);
}

/// Monotonic wall-clock time.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&self, secs: f64) {
        if secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(secs));
        }
    }
}

/// Simulated time: `sleep` advances the clock instead of blocking.
#[derive(Debug, Default)]
pub struct SimClock {
    nanos: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, secs: f64) {
        if secs > 0.0 {
            self.nanos
                .fetch_add((secs * 1e9).round() as u64, Ordering::SeqCst);
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> f64 {
        self.nanos.load(Ordering::SeqCst) as f64 * 1e-9
    }

    fn sleep(&self, secs: f64) {
        self.advance(secs);
    }
}
