//! Error types for checkout requests.

use solana_sdk::pubkey::ParsePubkeyError;
use std::fmt;
use thiserror::Error;

/// Which request field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    /// The payer's address from the POST body.
    Account,
    /// The correlation reference from the query string.
    Reference,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Account => "account",
            Self::Reference => "reference",
        })
    }
}

/// An account the transaction already uses for something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedAccount {
    Payer,
    Recipient,
    SystemProgram,
}

impl fmt::Display for ReservedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Payer => "payer",
            Self::Recipient => "recipient",
            Self::SystemProgram => "system program",
        })
    }
}

/// Why a request field was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Not a base58 address of the right length.
    #[error(transparent)]
    Malformed(#[from] ParsePubkeyError),

    /// A well-formed address that would merge with another account in the
    /// compiled message and lose its read-only, non-signer flags.
    #[error("reference is already the {0} account")]
    ReferenceCollision(ReservedAccount),
}

/// Errors returned by [`CheckoutService::build`](super::CheckoutService::build).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// The caller sent an unusable address. Nothing was fetched from the
    /// ledger.
    #[error("invalid {field}: {source}")]
    InvalidInput {
        field: InputField,
        #[source]
        source: InputError,
    },

    /// Fetching the checkpoint, compiling, or serializing failed. No partial
    /// transaction is ever returned.
    #[error("failed to build transaction: {0}")]
    BuildFailed(String),
}

impl CheckoutError {
    pub(crate) fn invalid(field: InputField, source: impl Into<InputError>) -> Self {
        Self::InvalidInput {
            field,
            source: source.into(),
        }
    }

    /// `true` for caller errors, which map to HTTP 400.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}
