//! Session failure causes.

use thiserror::Error;

use crate::checkout::DescriptorError;
use crate::ledger::LookupError;

/// Why a watch or a session stopped for good.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalCause {
    /// The session was shut down. Not an error from the user's point of
    /// view, but it does end the session.
    #[error("cancelled")]
    Cancelled,

    /// No fresh reference could be generated.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// The ledger rejected the lookup in a way retrying cannot fix.
    #[error(transparent)]
    Lookup(LookupError),

    /// The descriptor for a new reference could not be encoded.
    #[error(transparent)]
    Encoding(DescriptorError),
}

/// Errors surfaced by [`SessionController::run`](super::SessionController::run).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session failed: {0}")]
    Fatal(FatalCause),
}

impl SessionError {
    /// `true` when the session ended because it was asked to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fatal(FatalCause::Cancelled))
    }

    pub fn cause(&self) -> &FatalCause {
        match self {
            Self::Fatal(cause) => cause,
        }
    }
}

impl From<FatalCause> for SessionError {
    fn from(cause: FatalCause) -> Self {
        Self::Fatal(cause)
    }
}
