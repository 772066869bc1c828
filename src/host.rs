//! One process that drives the ticks and serves client operations over the
//! same engine.
//!
//! The store is opened exclusively, so a process that wants ticks while it
//! transfers or stakes has to run the scheduler itself. Starting a host also
//! forfeits stake sessions left open by a process that died mid-countdown.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::LedgerError;
use crate::ledger::LedgerEngine;
use crate::scheduler::{SchedulerAlert, SchedulerHandle, SchedulerSummary, TickScheduler};
use crate::session::SessionController;

pub struct LedgerHost {
    engine: Arc<LedgerEngine>,
    sessions: SessionController,
    scheduler: SchedulerHandle,
}

impl LedgerHost {
    /// Start ticking `engine`. Call before opening any session on it: every
    /// session still active at this point is treated as orphaned.
    pub async fn start(engine: Arc<LedgerEngine>, config: &SchedulerConfig) -> Result<Self, LedgerError> {
        let recovering = engine.clone();
        let orphans = tokio::task::spawn_blocking(move || recovering.forfeit_orphaned_sessions())
            .await
            .map_err(|e| LedgerError::Storage(format!("recovery task failed: {}", e)))??;
        for receipt in &orphans {
            warn!(
                session = %receipt.session.id,
                principal = receipt.session.principal,
                "Forfeited session left by a previous process"
            );
        }

        let (alert_tx, mut alert_rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                match alert {
                    SchedulerAlert::ConsecutiveFailures { count, last_error } => {
                        error!(count, last_error = %last_error, "Ticks are failing, balances are not decaying")
                    }
                    SchedulerAlert::Recovered { after_failures } => {
                        info!(after_failures, "Ticks recovered")
                    }
                }
            }
        });

        let scheduler = TickScheduler::new(engine.clone(), engine.clock(), config.clone())
            .with_alerts(alert_tx)
            .spawn();
        info!(interval_ms = config.tick_interval_ms, "Ledger host started");

        Ok(Self {
            sessions: SessionController::new(engine.clone()),
            engine,
            scheduler,
        })
    }

    pub fn engine(&self) -> &Arc<LedgerEngine> {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    /// Stop ticking once the in-flight tick, if any, has committed.
    pub async fn shutdown(self) -> SchedulerSummary {
        self.scheduler.shutdown().await
    }
}
