//! Session control: one current reference, rotated after each settlement.
//!
//! A session loops through the same cycle until it fails or is shut down:
//!
//! ```text
//!   generate reference ─► encode descriptor ─► RequestIssued
//!          ▲                                        │
//!          │                                        ▼
//!      Settled ◄──────── Confirmed ◄─────── watch the ledger
//! ```
//!
//! The current reference lives in a `tokio::sync::watch` cell. Only the
//! controller writes it, always with `send_replace`; everyone else reads
//! snapshots through a [`SessionHandle`]. The poller reads the same cell to
//! detect that its reference has been retired.
//!
//! Events go out on a bounded channel. A slow consumer stalls the cycle, but
//! never shutdown: a pending send gives up once the session is cancelled,
//! and the final `Failed` event is dropped if there is no room for it.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{FatalCause, SessionError};
use super::poller::{ConfirmationPoller, PollOutcome, PollerConfig};
use crate::checkout::descriptor;
use crate::config::SESSION_EVENT_CAPACITY;
use crate::ledger::{LedgerClient, SettlementEvidence};
use crate::reference::{Reference, ReferenceGenerator};

/// What a session reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new reference is live; show `descriptor` to the customer.
    RequestIssued {
        reference: Reference,
        descriptor: String,
    },
    /// A payment carrying `reference` settled.
    Settled {
        reference: Reference,
        evidence: SettlementEvidence,
    },
    /// The session stopped and will not restart on its own.
    Failed { cause: FatalCause },
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Checkout endpoint the descriptor points at.
    pub callback_url: String,
    pub poller: PollerConfig,
}

impl SessionConfig {
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            poller: PollerConfig::default(),
        }
    }
}

/// Read side of a running session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    current: watch::Receiver<Reference>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the current reference.
    pub fn current(&self) -> Reference {
        *self.current.borrow()
    }

    /// A receiver notified whenever the reference rotates.
    pub fn subscribe(&self) -> watch::Receiver<Reference> {
        self.current.clone()
    }

    /// Stops the session. The in-flight lookup, if any, is abandoned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Owns a session's reference and drives the poll/rotate cycle.
pub struct SessionController {
    id: Uuid,
    config: SessionConfig,
    generator: Arc<dyn ReferenceGenerator>,
    poller: ConfirmationPoller,
    current: watch::Sender<Reference>,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionController {
    /// Creates a session with its first reference already generated.
    ///
    /// Returns the controller, a handle onto it, and the event stream.
    pub fn new(
        config: SessionConfig,
        ledger: Arc<dyn LedgerClient>,
        generator: Arc<dyn ReferenceGenerator>,
    ) -> Result<(Self, SessionHandle, mpsc::Receiver<SessionEvent>), SessionError> {
        let first = generator
            .generate()
            .map_err(|e| FatalCause::EntropyUnavailable(e.0))?;
        let (current, current_rx) = watch::channel(first);
        let (events, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        let handle = SessionHandle {
            id,
            current: current_rx,
            cancel: cancel.clone(),
        };
        let controller = Self {
            id,
            poller: ConfirmationPoller::new(ledger, config.poller),
            config,
            generator,
            current,
            events,
            cancel,
        };
        Ok((controller, handle, events_rx))
    }

    /// Runs the session until a fatal error or shutdown.
    ///
    /// Never returns `Ok`: a session only ends by failing, and shutdown is
    /// reported as [`FatalCause::Cancelled`] (see [`SessionError::is_cancelled`]).
    pub async fn run(self) -> Result<(), SessionError> {
        let cause = self.cycle().await;
        if cause == FatalCause::Cancelled {
            info!(session = %self.id, "session shut down");
        } else {
            error!(session = %self.id, %cause, "session failed");
        }
        self.emit_final(SessionEvent::Failed {
            cause: cause.clone(),
        });
        Err(SessionError::Fatal(cause))
    }

    async fn cycle(&self) -> FatalCause {
        loop {
            if self.cancel.is_cancelled() {
                return FatalCause::Cancelled;
            }
            let reference = *self.current.borrow();
            let descriptor = match descriptor::encode(&self.config.callback_url, &reference) {
                Ok(d) => d,
                Err(e) => return FatalCause::Encoding(e),
            };
            info!(session = %self.id, %reference, "payment request issued");
            self.emit(SessionEvent::RequestIssued {
                reference,
                descriptor,
            })
            .await;

            let watch_cancel = self.cancel.child_token();
            let outcome = self
                .poller
                .watch(reference, self.current.subscribe(), watch_cancel.clone())
                .await;
            watch_cancel.cancel();

            match outcome {
                PollOutcome::Confirmed(evidence) => {
                    self.emit(SessionEvent::Settled {
                        reference,
                        evidence,
                    })
                    .await;
                    if let Err(cause) = self.rotate() {
                        return cause;
                    }
                }
                // Only this controller writes the cell, so there is nothing
                // to do but pick up whatever is current now.
                PollOutcome::Superseded => {}
                PollOutcome::Fatal(cause) => return cause,
            }
        }
    }

    fn rotate(&self) -> Result<Reference, FatalCause> {
        let next = self
            .generator
            .generate()
            .map_err(|e| FatalCause::EntropyUnavailable(e.0))?;
        let previous = self.current.send_replace(next);
        info!(session = %self.id, %previous, %next, "reference rotated");
        Ok(next)
    }

    /// Waits for room in the channel, unless the session is cancelled first.
    async fn emit(&self, event: SessionEvent) {
        tokio::select! {
            biased;
            // A dropped receiver just means nobody is listening.
            _ = self.events.send(event) => {}
            _ = self.cancel.cancelled() => {
                debug!(session = %self.id, "event dropped on shutdown");
            }
        }
    }

    /// Never waits. The session is ending, so a full channel loses the event.
    fn emit_final(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                warn!(session = %self.id, ?event, "event channel full; final event dropped");
            }
        }
    }
}
