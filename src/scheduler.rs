use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::LedgerError;
use crate::ledger::{LedgerEngine, TickReport};

/// Anything the scheduler can drive once per interval.
pub trait TickSource: Send + Sync + 'static {
    fn tick(&self) -> Result<TickReport, LedgerError>;
}

impl TickSource for LedgerEngine {
    fn tick(&self) -> Result<TickReport, LedgerError> {
        LedgerEngine::tick(self)
    }
}

/// Operator-facing notices raised by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerAlert {
    ConsecutiveFailures { count: u32, last_error: String },
    Recovered { after_failures: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub ticks_run: u64,
    pub ticks_failed: u64,
    /// Firings dropped because the previous tick overran the interval.
    pub ticks_skipped: u64,
    pub seconds_collected: u64,
}

/// Fires `tick()` on a fixed cadence. Ticks never overlap: each one is
/// awaited to completion before the next firing or a shutdown is considered.
pub struct TickScheduler {
    source: Arc<dyn TickSource>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    alerts: Option<mpsc::Sender<SchedulerAlert>>,
}

pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<SchedulerSummary>,
}

impl SchedulerHandle {
    /// Signal shutdown now; the returned future resolves once the in-flight
    /// tick, if any, has finished.
    pub fn shutdown(self) -> impl Future<Output = SchedulerSummary> {
        let _ = self.stop_tx.send(true);
        let join = self.join;
        async move {
            match join.await {
                Ok(summary) => summary,
                Err(e) => {
                    error!(error = %e, "Tick scheduler task failed");
                    SchedulerSummary::default()
                }
            }
        }
    }
}

impl TickScheduler {
    pub fn new(source: Arc<dyn TickSource>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            source,
            clock,
            config,
            alerts: None,
        }
    }

    pub fn with_alerts(mut self, alerts: mpsc::Sender<SchedulerAlert>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        SchedulerHandle { stop_tx, join }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SchedulerSummary {
        let interval = self.config.tick_interval();
        let threshold = self.config.failure_escalation_threshold.max(1);
        let log_every = self.config.progress_log_every.max(1);
        let mut summary = SchedulerSummary::default();
        let mut consecutive_failures: u32 = 0;
        let mut escalated = false;

        info!(interval_ms = interval.as_millis() as u64, "Tick scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = self.clock.instant();
            let source = self.source.clone();
            let outcome = tokio::task::spawn_blocking(move || source.tick())
                .await
                .unwrap_or_else(|e| Err(LedgerError::Storage(format!("tick task failed: {}", e))));

            match outcome {
                Ok(report) => {
                    summary.ticks_run += 1;
                    summary.seconds_collected += report.decremented;
                    if escalated {
                        info!(after_failures = consecutive_failures, "Ticks recovered");
                        self.alert(SchedulerAlert::Recovered {
                            after_failures: consecutive_failures,
                        })
                        .await;
                    }
                    consecutive_failures = 0;
                    escalated = false;

                    if summary.ticks_run % log_every == 0 {
                        info!(
                            ticks = summary.ticks_run,
                            decremented = report.decremented,
                            deactivated = report.deactivated,
                            reserve = report.reserve_total,
                            "Tick progress"
                        );
                    }
                }
                Err(e) => {
                    summary.ticks_failed += 1;
                    consecutive_failures += 1;
                    warn!(error = %e, consecutive = consecutive_failures, "Tick failed, retrying next cycle");

                    if consecutive_failures % threshold == 0 {
                        error!(
                            consecutive = consecutive_failures,
                            error = %e,
                            "Ticks failing repeatedly, balances are not decaying"
                        );
                        escalated = true;
                        self.alert(SchedulerAlert::ConsecutiveFailures {
                            count: consecutive_failures,
                            last_error: e.to_string(),
                        })
                        .await;
                    }
                }
            }

            let elapsed = self.clock.instant().saturating_duration_since(started);
            let (missed, wait) = next_wait(elapsed, interval);
            if missed > 0 {
                summary.ticks_skipped += missed;
                debug!(missed, elapsed_ms = elapsed.as_millis() as u64, "Tick overran interval");
            }

            tokio::select! {
                _ = self.clock.sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            ticks = summary.ticks_run,
            failed = summary.ticks_failed,
            skipped = summary.ticks_skipped,
            "Tick scheduler stopped"
        );
        summary
    }

    async fn alert(&self, alert: SchedulerAlert) {
        if let Some(tx) = &self.alerts {
            if tx.send(alert).await.is_err() {
                debug!("Alert channel closed");
            }
        }
    }
}

/// Firings missed while a tick ran for `elapsed`, and the wait until the next
/// slot on the fixed cadence.
fn next_wait(elapsed: Duration, interval: Duration) -> (u64, Duration) {
    let interval_ns = interval.as_nanos().max(1);
    let elapsed_ns = elapsed.as_nanos();
    let missed = (elapsed_ns / interval_ns) as u64;
    let into_slot = (elapsed_ns % interval_ns) as u64;
    let wait = Duration::from_nanos(interval_ns as u64 - into_slot);
    (missed, wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::LedgerConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct FlakySource {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl TickSource for FlakySource {
        fn tick(&self) -> Result<TickReport, LedgerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(LedgerError::Storage("disk unavailable".into()));
            }
            Ok(TickReport {
                decremented: 2,
                deactivated: 0,
                reserve_total: 0,
                at: 0,
            })
        }
    }

    /// Clock whose monotonic reading can be pushed forward from a tick.
    #[derive(Default)]
    struct SkewClock {
        offset_ms: AtomicU64,
    }

    impl SkewClock {
        fn offset(&self) -> Duration {
            Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl Clock for SkewClock {
        fn unix_now(&self) -> i64 {
            0
        }

        fn instant(&self) -> Instant {
            Instant::now() + self.offset()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await
        }

        async fn sleep_until(&self, deadline: Instant) {
            tokio::time::sleep_until(deadline - self.offset()).await
        }
    }

    /// Each tick takes two and a half intervals.
    struct SlowSource {
        clock: Arc<SkewClock>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl TickSource for SlowSource {
        fn tick(&self) -> Result<TickReport, LedgerError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            self.clock.offset_ms.fetch_add(2_500, Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TickReport {
                decremented: 1,
                deactivated: 0,
                reserve_total: 0,
                at: 0,
            })
        }
    }

    /// Blocks inside `tick` until the test releases it.
    struct GatedSource {
        engine: Arc<LedgerEngine>,
        started: mpsc::UnboundedSender<()>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl TickSource for GatedSource {
        fn tick(&self) -> Result<TickReport, LedgerError> {
            let _ = self.started.send(());
            self.release
                .lock()
                .unwrap()
                .recv()
                .map_err(|_| LedgerError::Storage("gate closed".into()))?;
            self.engine.tick()
        }
    }

    fn open_engine(dir: &tempfile::TempDir) -> Arc<LedgerEngine> {
        Arc::new(
            LedgerEngine::open_at(dir.path().join("ledger"), &LedgerConfig::default(), Arc::new(SystemClock))
                .unwrap(),
        )
    }

    fn config(threshold: u32) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_ms: 1000,
            failure_escalation_threshold: threshold,
            progress_log_every: 10,
        }
    }

    #[test]
    fn test_next_wait() {
        let second = Duration::from_secs(1);
        assert_eq!(next_wait(Duration::from_millis(200), second), (0, Duration::from_millis(800)));
        assert_eq!(next_wait(Duration::from_millis(2300), second), (2, Duration::from_millis(700)));
        assert_eq!(next_wait(Duration::ZERO, second), (0, second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_after_consecutive_failures() {
        let source = Arc::new(FlakySource {
            calls: AtomicU32::new(0),
            fail_first: 3,
        });
        let (alert_tx, mut alert_rx) = mpsc::channel(8);
        let handle = TickScheduler::new(source.clone(), Arc::new(SystemClock), config(3))
            .with_alerts(alert_tx)
            .spawn();

        let first = alert_rx.recv().await.unwrap();
        assert_eq!(
            first,
            SchedulerAlert::ConsecutiveFailures {
                count: 3,
                last_error: "Storage error: disk unavailable".into(),
            }
        );
        let second = alert_rx.recv().await.unwrap();
        assert_eq!(second, SchedulerAlert::Recovered { after_failures: 3 });

        let summary = handle.shutdown().await;
        assert_eq!(summary.ticks_failed, 3);
        assert!(summary.ticks_run >= 1);
        assert_eq!(summary.seconds_collected, summary.ticks_run * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drives_engine_and_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        let a = engine.create_account("alice", 86_400, false).unwrap();

        let handle = TickScheduler::new(engine.clone(), engine.clock(), config(5)).spawn();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let summary = handle.shutdown().await;

        // firings at 0s through 10s
        assert_eq!(summary.ticks_run, 11);
        assert_eq!(summary.ticks_failed, 0);
        assert_eq!(summary.ticks_skipped, 0);
        assert_eq!(engine.balance(a.id).unwrap(), 86_400 - 11);
        assert_eq!(engine.reserve_total().unwrap(), 11);
        assert_eq!(summary.seconds_collected, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_ticks_never_overlap_and_are_skipped() {
        let clock = Arc::new(SkewClock::default());
        let source = Arc::new(SlowSource {
            clock: clock.clone(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let handle = TickScheduler::new(source.clone(), clock, config(5)).spawn();
        tokio::time::sleep(Duration::from_millis(4_200)).await;
        let summary = handle.shutdown().await;

        assert!(summary.ticks_run >= 2);
        // every tick overran two whole intervals
        assert_eq!(summary.ticks_skipped, 2 * summary.ticks_run);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_tick() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        let a = engine.create_account("alice", 100, false).unwrap();

        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let source = Arc::new(GatedSource {
            engine: engine.clone(),
            started: started_tx,
            release: Mutex::new(release_rx),
        });
        let handle = TickScheduler::new(source, engine.clock(), config(5)).spawn();

        started_rx.recv().await.unwrap();
        let pending = handle.shutdown();
        release_tx.send(()).unwrap();
        let summary = pending.await;

        assert_eq!(summary.ticks_run, 1);
        assert_eq!(engine.balance(a.id).unwrap(), 99);
        assert_eq!(engine.reserve_total().unwrap(), 1);
    }
}
