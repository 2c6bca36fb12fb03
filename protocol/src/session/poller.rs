//! Confirmation polling.
//!
//! The poller answers one question per tick: has a transaction carrying this
//! reference settled? It must never report a settlement that did not happen
//! and never give up on one that might still come, so each lookup outcome
//! maps onto exactly one [`ConfirmationStatus`]:
//!
//! ```text
//!  lookup result            status              watch continues?
//!  ───────────────────────  ──────────────────  ────────────────
//!  evidence                 Confirmed           no  (Confirmed)
//!  NotFound                 Pending             yes
//!  Transient / timeout      TransientNotFound   yes
//!  Unrecoverable            Fatal               no  (Fatal)
//!  cancelled                Fatal(Cancelled)    no  (Fatal)
//! ```
//!
//! ## Staleness
//!
//! A watch is bound to one reference. Before each tick and again after the
//! lookup returns, the poller compares it against the session's current
//! reference; if they differ, the result is thrown away and the watch ends
//! as [`PollOutcome::Superseded`]. A late answer for a retired reference
//! can therefore never confirm the new one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::FatalCause;
use crate::config::{Commitment, LOOKUP_TIMEOUT, POLL_INTERVAL};
use crate::ledger::{LedgerClient, LookupErrorKind, SettlementEvidence};
use crate::reference::Reference;

/// Poller timing and commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between the start of consecutive ticks.
    pub interval: Duration,
    /// Upper bound on a single lookup.
    pub lookup_timeout: Duration,
    /// Commitment a settlement must have reached.
    pub commitment: Commitment,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            lookup_timeout: LOOKUP_TIMEOUT,
            commitment: Commitment::default(),
        }
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// The ledger answered and has nothing for this reference yet.
    Pending,
    /// The ledger could not answer this time.
    TransientNotFound,
    /// A settlement carrying the reference was found.
    Confirmed(SettlementEvidence),
    /// Polling cannot continue.
    Fatal(FatalCause),
}

/// How a watch on one reference ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed(SettlementEvidence),
    /// The session moved on to a different reference.
    Superseded,
    Fatal(FatalCause),
}

/// Polls a ledger for settlements carrying a reference.
#[derive(Clone)]
pub struct ConfirmationPoller {
    ledger: Arc<dyn LedgerClient>,
    config: PollerConfig,
}

impl ConfirmationPoller {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: PollerConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Performs one bounded lookup, racing it against `cancel`.
    pub async fn tick(&self, reference: &Reference, cancel: &CancellationToken) -> ConfirmationStatus {
        let lookup = time::timeout(
            self.config.lookup_timeout,
            self.ledger.find_reference(reference, self.config.commitment),
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConfirmationStatus::Fatal(FatalCause::Cancelled),
            result = lookup => result,
        };

        match result {
            Err(_elapsed) => {
                warn!(%reference, timeout = ?self.config.lookup_timeout, "reference lookup timed out");
                ConfirmationStatus::TransientNotFound
            }
            Ok(Ok(evidence)) => ConfirmationStatus::Confirmed(evidence),
            Ok(Err(err)) => match err.kind {
                LookupErrorKind::NotFound => ConfirmationStatus::Pending,
                LookupErrorKind::Transient => {
                    warn!(%reference, error = %err, "reference lookup failed, will retry");
                    ConfirmationStatus::TransientNotFound
                }
                LookupErrorKind::Unrecoverable => {
                    error!(%reference, error = %err, "reference lookup failed permanently");
                    ConfirmationStatus::Fatal(FatalCause::Lookup(err))
                }
            },
        }
    }

    /// Polls for `reference` until it is confirmed, superseded in
    /// `current`, or the watch fails.
    ///
    /// The first tick fires one interval after the call. Ticks never
    /// overlap; a tick that overruns delays the next one instead of
    /// triggering a burst.
    pub async fn watch(
        &self,
        reference: Reference,
        current: watch::Receiver<Reference>,
        cancel: CancellationToken,
    ) -> PollOutcome {
        let period = self.config.interval;
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Fatal(FatalCause::Cancelled),
                _ = interval.tick() => {}
            }

            if *current.borrow() != reference {
                return PollOutcome::Superseded;
            }

            ticks += 1;
            let status = self.tick(&reference, &cancel).await;

            if *current.borrow() != reference {
                debug!(%reference, ticks, "discarding result for superseded reference");
                return PollOutcome::Superseded;
            }

            match status {
                ConfirmationStatus::Pending => debug!(%reference, ticks, "not settled yet"),
                ConfirmationStatus::TransientNotFound => {}
                ConfirmationStatus::Confirmed(evidence) => {
                    info!(%reference, signature = %evidence.signature, slot = evidence.slot, ticks, "reference confirmed");
                    return PollOutcome::Confirmed(evidence);
                }
                ConfirmationStatus::Fatal(cause) => return PollOutcome::Fatal(cause),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::transaction::checkout_transfer;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::{Keypair, Signer};

    fn reference(b: u8) -> Reference {
        Reference::from_pubkey(Pubkey::new_from_array([b; 32]))
    }

    async fn settle(ledger: &InMemoryLedger, reference: &Reference) {
        let payer = Keypair::new();
        let checkpoint = ledger.latest_checkpoint().await.unwrap();
        let mut tx = checkout_transfer(&payer.pubkey(), &Pubkey::new_unique(), 1, reference, checkpoint);
        tx.try_partial_sign(&[&payer], checkpoint).unwrap();
        ledger.submit(&tx).unwrap();
    }

    fn poller(ledger: Arc<InMemoryLedger>) -> ConfirmationPoller {
        ConfirmationPoller::new(ledger, PollerConfig::default())
    }

    #[tokio::test]
    async fn tick_maps_each_lookup_kind() {
        let ledger = Arc::new(InMemoryLedger::new());
        let p = poller(ledger.clone());
        let r = reference(1);
        let cancel = CancellationToken::new();

        assert_eq!(p.tick(&r, &cancel).await, ConfirmationStatus::Pending);

        ledger.inject_lookup_failure(LookupErrorKind::Transient);
        assert_eq!(p.tick(&r, &cancel).await, ConfirmationStatus::TransientNotFound);

        ledger.inject_lookup_failure(LookupErrorKind::Unrecoverable);
        assert!(matches!(
            p.tick(&r, &cancel).await,
            ConfirmationStatus::Fatal(FatalCause::Lookup(_))
        ));

        settle(&ledger, &r).await;
        assert!(matches!(
            p.tick(&r, &cancel).await,
            ConfirmationStatus::Confirmed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_counts_as_transient() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_lookup_delay(Some(LOOKUP_TIMEOUT * 2));
        let p = poller(ledger);
        let status = p.tick(&reference(1), &CancellationToken::new()).await;
        assert_eq!(status, ConfirmationStatus::TransientNotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_on_the_tick_after_transient_failures() {
        const FAILURES: usize = 4;
        let ledger = Arc::new(InMemoryLedger::new());
        let r = reference(2);
        settle(&ledger, &r).await;
        ledger.inject_lookup_failures(LookupErrorKind::Transient, FAILURES);

        let (_tx, rx) = watch::channel(r);
        let start = Instant::now();
        let outcome = poller(ledger.clone())
            .watch(r, rx, CancellationToken::new())
            .await;

        assert!(matches!(outcome, PollOutcome::Confirmed(_)));
        assert_eq!(ledger.lookup_count(), FAILURES as u64 + 1);
        assert_eq!(start.elapsed(), POLL_INTERVAL * (FAILURES as u32 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_lookup_ends_the_watch() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.inject_lookup_failures(LookupErrorKind::Transient, 2);
        ledger.inject_lookup_failure(LookupErrorKind::Unrecoverable);
        let r = reference(3);
        let (_tx, rx) = watch::channel(r);

        let outcome = poller(ledger.clone()).watch(r, rx, CancellationToken::new()).await;
        assert!(matches!(outcome, PollOutcome::Fatal(FatalCause::Lookup(_))));
        assert_eq!(ledger.lookup_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn late_answer_for_rotated_reference_is_discarded() {
        let ledger = Arc::new(InMemoryLedger::new());
        let r1 = reference(4);
        settle(&ledger, &r1).await;
        // The lookup will find r1, but only after the session has moved on.
        ledger.set_lookup_delay(Some(Duration::from_secs(5)));

        let (tx, rx) = watch::channel(r1);
        let p = poller(ledger.clone());
        let handle = tokio::spawn(async move { p.watch(r1, rx, CancellationToken::new()).await });

        time::sleep(POLL_INTERVAL + Duration::from_secs(1)).await;
        tx.send_replace(reference(5));

        assert_eq!(handle.await.unwrap(), PollOutcome::Superseded);
        assert_eq!(ledger.lookup_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_an_in_flight_lookup() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_lookup_delay(Some(Duration::from_secs(60)));
        let r = reference(6);
        let (_tx, rx) = watch::channel(r);
        let cancel = CancellationToken::new();

        let p = poller(ledger.clone());
        let token = cancel.clone();
        let handle = tokio::spawn(async move { p.watch(r, rx, token).await });

        time::sleep(POLL_INTERVAL + Duration::from_millis(100)).await;
        cancel.cancel();

        assert_eq!(
            handle.await.unwrap(),
            PollOutcome::Fatal(FatalCause::Cancelled)
        );
        // The delayed lookup never got as far as reading the ledger.
        assert_eq!(ledger.lookup_count(), 0);
    }
}
