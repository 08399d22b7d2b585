//! Background polling of invoice payment status.
//!
//! Each poll is a tokio task owning a cancellation token. Starting a poll
//! cancels every poll already running, so at most one invoice is followed at
//! a time. A generation number tags every poll; a task whose generation is
//! no longer current cannot touch the status it once owned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ledger::Ledger;
use crate::models::{PendingInvoice, PollStatus};
use crate::wallet::WalletClient;

/// Timing of the status poll.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

struct ActivePoll {
    token: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct PollerState {
    active: HashMap<i64, ActivePoll>,
    statuses: HashMap<i64, PollStatus>,
    generation: u64,
}

/// Follows invoices until they are paid, expire or get cancelled.
#[derive(Clone)]
pub struct InvoicePoller {
    ledger: Arc<Ledger>,
    wallet: WalletClient,
    settings: PollSettings,
    state: Arc<Mutex<PollerState>>,
}

impl InvoicePoller {
    pub fn new(ledger: Arc<Ledger>, wallet: WalletClient, settings: PollSettings) -> Self {
        Self {
            ledger,
            wallet,
            settings,
            state: Arc::new(Mutex::new(PollerState::default())),
        }
    }

    /// Start following `invoice`, cancelling any poll already running.
    /// A paid invoice needs no poll and leaves running polls alone.
    pub fn start(&self, invoice: &PendingInvoice) -> PollStatus {
        if invoice.paid {
            return PollStatus::Paid;
        }

        let mut state = self.lock();
        Self::cancel_all_locked(&mut state);

        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        let status = PollStatus::Waiting {
            attempt: 0,
            max_attempts: self.settings.max_attempts,
        };

        state.active.insert(
            invoice.id,
            ActivePoll {
                token: token.clone(),
                generation,
            },
        );
        state.statuses.insert(invoice.id, status.clone());
        drop(state);

        tracing::info!(invoice_id = invoice.id, generation, "Started invoice poll");

        let poller = self.clone();
        let invoice_id = invoice.id;
        let payment_hash = invoice.payment_hash.clone();
        tokio::spawn(async move {
            let outcome = poller
                .poll_until_settled(invoice_id, &payment_hash, generation, &token)
                .await;
            poller.finish(invoice_id, generation, outcome);
        });

        status
    }

    /// Cancel the poll of one invoice. Returns whether a poll was running.
    pub fn cancel(&self, invoice_id: i64) -> bool {
        let mut state = self.lock();
        Self::cancel_locked(&mut state, invoice_id)
    }

    /// Cancel the poll of a deleted invoice and drop its status.
    pub fn forget(&self, invoice_id: i64) {
        let mut state = self.lock();
        Self::cancel_locked(&mut state, invoice_id);
        state.statuses.remove(&invoice_id);
    }

    /// Cancel every running poll.
    pub fn cancel_all(&self) {
        let mut state = self.lock();
        Self::cancel_all_locked(&mut state);
    }

    /// Latest known status of an invoice's poll.
    pub fn status(&self, invoice_id: i64) -> PollStatus {
        self.lock()
            .statuses
            .get(&invoice_id)
            .cloned()
            .unwrap_or(PollStatus::Idle)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn lock(&self) -> MutexGuard<'_, PollerState> {
        // Bookkeeping stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cancel_locked(state: &mut PollerState, invoice_id: i64) -> bool {
        let Some(poll) = state.active.remove(&invoice_id) else {
            return false;
        };
        poll.token.cancel();
        state.statuses.insert(invoice_id, PollStatus::Cancelled);
        tracing::info!(invoice_id, generation = poll.generation, "Cancelled invoice poll");
        true
    }

    fn cancel_all_locked(state: &mut PollerState) {
        let ids: Vec<i64> = state.active.keys().copied().collect();
        for id in ids {
            Self::cancel_locked(state, id);
        }
    }

    fn owns(state: &PollerState, invoice_id: i64, generation: u64) -> bool {
        state
            .active
            .get(&invoice_id)
            .is_some_and(|poll| poll.generation == generation)
    }

    /// Record `status` only while `generation` is the running poll of the invoice.
    fn set_status(&self, invoice_id: i64, generation: u64, status: PollStatus) {
        let mut state = self.lock();
        if Self::owns(&state, invoice_id, generation) {
            state.statuses.insert(invoice_id, status);
        }
    }

    fn finish(&self, invoice_id: i64, generation: u64, outcome: PollStatus) {
        let mut state = self.lock();
        if !Self::owns(&state, invoice_id, generation) {
            return;
        }

        state.active.remove(&invoice_id);
        state.statuses.insert(invoice_id, outcome.clone());
        tracing::info!(invoice_id, generation, status = ?outcome, "Invoice poll finished");
    }

    async fn poll_until_settled(
        &self,
        invoice_id: i64,
        payment_hash: &str,
        generation: u64,
        token: &CancellationToken,
    ) -> PollStatus {
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            self.set_status(
                invoice_id,
                generation,
                PollStatus::Waiting {
                    attempt,
                    max_attempts,
                },
            );

            let paid = tokio::select! {
                _ = token.cancelled() => return PollStatus::Cancelled,
                paid = self.check_once(payment_hash) => paid,
            };

            if paid {
                // The token may have fired while the check was in flight.
                if token.is_cancelled() {
                    return PollStatus::Cancelled;
                }
                match self.ledger.mark_invoice_paid(invoice_id).await {
                    Ok(_) => return PollStatus::Paid,
                    Err(e) => {
                        tracing::error!(invoice_id, error = %e, "Failed to persist paid invoice");
                    }
                }
            }

            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => return PollStatus::Cancelled,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        PollStatus::Expired
    }

    /// One status check. Any failure counts as "not paid yet".
    async fn check_once(&self, payment_hash: &str) -> bool {
        let creds = match self.ledger.settings().await.credentials() {
            Ok(creds) => creds,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping invoice status check");
                return false;
            }
        };

        match self.wallet.invoice_status(&creds, payment_hash).await {
            Ok(status) => status.paid,
            Err(e) => {
                tracing::warn!(payment_hash, error = %e, "Invoice status check failed");
                false
            }
        }
    }
}
