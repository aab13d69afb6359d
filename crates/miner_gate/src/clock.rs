use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Abstraction over wall-clock time, in seconds since the unix epoch.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Return the current time in fractional seconds.
    fn now_secs(&self) -> f64;
}

/// Clock backed by `SystemTime::now()` for production.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Clock that only advances when instructed, useful for deterministic tests.
#[derive(Clone, Debug)]
pub struct ManualClock {
    inner: Arc<Mutex<f64>>,
}

impl ManualClock {
    /// Create a clock reading `start` seconds since the epoch.
    pub fn new(start: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    /// Manually advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        *self.inner.lock() += delta.as_secs_f64();
    }

    /// Jump the clock to `secs` since the epoch, backwards included.
    pub fn set(&self, secs: f64) {
        *self.inner.lock() = secs;
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.inner.lock()
    }
}
