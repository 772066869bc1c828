//! Time source shared by the engine, the scheduler and stake countdowns.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Wall-clock seconds since the unix epoch, used for account timestamps.
    fn unix_now(&self) -> i64;

    /// Monotonic instant for measuring tick durations.
    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    /// Sleep until an absolute instant, so repeated waits do not drift.
    async fn sleep_until(&self, deadline: Instant);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn unix_now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await
    }
}

/// Pinned wall-clock time; sleeps still go through the tokio timer so paused
/// runtimes advance them virtually.
#[derive(Debug)]
pub struct ManualClock {
    unix: AtomicI64,
}

impl ManualClock {
    pub fn new(unix: i64) -> Self {
        Self {
            unix: AtomicI64::new(unix),
        }
    }

    pub fn set(&self, unix: i64) {
        self.unix.store(unix, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.unix.fetch_add(secs, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn unix_now(&self) -> i64 {
        self.unix.load(Ordering::SeqCst)
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await
    }
}
