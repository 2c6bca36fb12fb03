//! # Client-Side Sessions
//!
//! The customer-facing half of the protocol: keep one reference live,
//! publish a descriptor for it, watch the ledger until a payment carrying it
//! settles, then start over with a fresh reference.
//!
//! - [`poller`]: one reference, one lookup per tick, until it resolves.
//! - [`controller`]: owns the current reference and rotates it.
//!
//! Sessions only ever surface two things to their owner: a settlement, or
//! a failure. Transient ledger trouble is absorbed by the poller.

pub mod controller;
pub mod error;
pub mod poller;

pub use controller::{SessionConfig, SessionController, SessionEvent, SessionHandle};
pub use error::{FatalCause, SessionError};
pub use poller::{ConfirmationPoller, ConfirmationStatus, PollOutcome, PollerConfig};
