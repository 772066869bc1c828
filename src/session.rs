//! Stake-session lifecycle: stake, count down one second at a time, then
//! settle as completed or forfeited.
//!
//! Each started session gets one countdown task, and that task is the only
//! caller of `settle` for its session. Cancelling, or dropping the handle,
//! closes the cancellation channel; the countdown forfeits on seeing it.
//! When the last second and a cancellation land together the countdown
//! wins.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::AccountId;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::ledger::{LedgerEngine, SettleOutcome, SettleReceipt, StakeSession};

/// Why a countdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    Cancelled,
    AccountDeactivated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub receipt: SettleReceipt,
    pub reason: EndReason,
}

impl SessionOutcome {
    pub fn session(&self) -> &StakeSession {
        &self.receipt.session
    }

    pub fn balance(&self) -> u64 {
        self.receipt.balance
    }
}

pub struct SessionController {
    engine: Arc<LedgerEngine>,
    clock: Arc<dyn Clock>,
}

pub struct SessionHandle {
    session: StakeSession,
    cancel: Option<oneshot::Sender<()>>,
    progress: watch::Receiver<u64>,
    ends_at: Instant,
    join: JoinHandle<Result<SessionOutcome, LedgerError>>,
}

impl SessionController {
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        let clock = engine.clock();
        Self { engine, clock }
    }

    /// Stake `amount` seconds from `principal` and start its countdown.
    pub async fn start(&self, principal: AccountId, amount: u64) -> Result<SessionHandle, LedgerError> {
        let engine = self.engine.clone();
        let session = tokio::task::spawn_blocking(move || engine.stake(principal, amount))
            .await
            .map_err(|e| LedgerError::Storage(format!("stake task failed: {}", e)))??;

        let started = self.clock.instant();
        let ends_at = started + Duration::from_secs(session.remaining_seconds);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = watch::channel(session.remaining_seconds);
        let countdown = Countdown {
            engine: self.engine.clone(),
            clock: self.clock.clone(),
            session: session.clone(),
            started,
            check_every: self.engine.session_config().activity_check_secs,
        };
        let join = tokio::spawn(countdown.run(cancel_rx, progress_tx));

        Ok(SessionHandle {
            session,
            cancel: Some(cancel_tx),
            progress: progress_rx,
            ends_at,
            join,
        })
    }
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn session(&self) -> &StakeSession {
        &self.session
    }

    pub fn remaining(&self) -> u64 {
        *self.progress.borrow()
    }

    /// Instant at which the final second elapses.
    pub fn ends_at(&self) -> Instant {
        self.ends_at
    }

    /// Receiver of the remaining seconds, updated once per elapsed second.
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.clone()
    }

    /// Request early exit and wait for the resulting settlement. If the
    /// countdown already finished, the completed outcome is returned.
    pub async fn cancel(mut self) -> Result<SessionOutcome, LedgerError> {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        self.join().await
    }

    /// Wait for the countdown to end on its own.
    pub async fn wait(mut self) -> Result<SessionOutcome, LedgerError> {
        // keep the sender alive so waiting is not mistaken for a disconnect
        let _cancel = self.cancel.take();
        self.join().await
    }

    async fn join(self) -> Result<SessionOutcome, LedgerError> {
        self.join
            .await
            .map_err(|e| LedgerError::Storage(format!("countdown task failed: {}", e)))?
    }
}

struct Countdown {
    engine: Arc<LedgerEngine>,
    clock: Arc<dyn Clock>,
    session: StakeSession,
    started: Instant,
    check_every: u64,
}

impl Countdown {
    async fn run(
        self,
        mut cancel: oneshot::Receiver<()>,
        progress: watch::Sender<u64>,
    ) -> Result<SessionOutcome, LedgerError> {
        let id = self.session.id;
        let total = self.session.remaining_seconds;
        let mut remaining = total;
        let mut since_check = 0u64;
        info!(session = %id, principal = self.session.principal, remaining, "Countdown started");

        let reason = loop {
            if remaining == 0 {
                break EndReason::Completed;
            }
            // second k fires at started + k
            let deadline = self.started + Duration::from_secs(total - remaining + 1);
            tokio::select! {
                biased;
                _ = self.clock.sleep_until(deadline) => {
                    remaining -= 1;
                    progress.send_replace(remaining);
                    since_check += 1;
                    if remaining > 0 && self.check_every > 0 && since_check >= self.check_every {
                        since_check = 0;
                        if !self.account_active().await {
                            break EndReason::AccountDeactivated;
                        }
                    }
                }
                _ = &mut cancel => break EndReason::Cancelled,
            }
        };

        let outcome = match reason {
            EndReason::Completed => SettleOutcome::Completed,
            EndReason::Cancelled | EndReason::AccountDeactivated => SettleOutcome::Forfeited,
        };
        debug!(session = %id, ?reason, remaining, "Countdown ended");

        let engine = self.engine.clone();
        let receipt = tokio::task::spawn_blocking(move || engine.settle(id, outcome))
            .await
            .map_err(|e| LedgerError::Storage(format!("settle task failed: {}", e)))??;
        Ok(SessionOutcome { receipt, reason })
    }

    async fn account_active(&self) -> bool {
        let engine = self.engine.clone();
        let principal = self.session.principal;
        let read = tokio::task::spawn_blocking(move || engine.account(principal))
            .await
            .map_err(|e| LedgerError::Storage(format!("activity check task failed: {}", e)));
        match read {
            Ok(Ok(account)) => account.active,
            Ok(Err(e)) | Err(e) => {
                // a read failure is not proof of deactivation
                warn!(session = %self.session.id, error = %e, "Activity check failed");
                true
            }
        }
    }
}
