//! # Ledger Collaborator
//!
//! The checkout service and the confirmation poller never talk to a ledger
//! directly; they go through [`LedgerClient`], which exposes exactly the two
//! questions this protocol needs answered:
//!
//! - "what is a recent checkpoint hash?" (to build a transaction), and
//! - "has anything touching this reference settled?" (to confirm one).
//!
//! Two implementations ship with the crate: [`rpc::RpcLedger`] speaks
//! JSON-RPC to a real node, and [`memory::InMemoryLedger`] is a
//! self-contained ledger for tests and demos.
//!
//! ## Lookup errors
//!
//! A reference lookup has three ways of not returning evidence, and the
//! poller treats them very differently. They are a closed enum
//! ([`LookupErrorKind`]) so callers `match` on them instead of sniffing
//! error strings.

pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use std::fmt;
use thiserror::Error;

use crate::config::Commitment;
use crate::reference::Reference;

pub use memory::InMemoryLedger;
pub use rpc::RpcLedger;

/// Proof that a transaction carrying a reference landed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvidence {
    /// Transaction id (first signature) of the settling transaction.
    pub signature: Signature,
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Unix timestamp of the slot, when the ledger knows it.
    pub block_time: Option<i64>,
}

/// Why a reference lookup produced no evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupErrorKind {
    /// The ledger answered: nothing references this key yet.
    NotFound,
    /// The ledger could not answer right now. Worth asking again.
    Transient,
    /// Asking again will never help.
    Unrecoverable,
}

impl fmt::Display for LookupErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::Transient => "transient",
            Self::Unrecoverable => "unrecoverable",
        })
    }
}

/// A failed reference lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reference lookup failed ({kind}): {message}")]
pub struct LookupError {
    pub kind: LookupErrorKind,
    pub message: String,
}

impl LookupError {
    /// The ledger has no settlement for the reference.
    pub fn not_found() -> Self {
        Self {
            kind: LookupErrorKind::NotFound,
            message: "no transaction references this key".into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: LookupErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self {
            kind: LookupErrorKind::Unrecoverable,
            message: message.into(),
        }
    }
}

/// Errors from ledger operations other than reference lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The request never got an answer (connection refused, timeout).
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// The ledger answered with a JSON-RPC error object.
    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The answer did not have the expected shape.
    #[error("malformed ledger response: {0}")]
    Decode(String),

    /// A submitted transaction was refused.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The ledger is deliberately refusing service (tests).
    #[error("ledger unavailable")]
    Unavailable,
}

/// The ledger operations the checkout protocol depends on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// A recent checkpoint hash to anchor a new transaction's lifetime.
    async fn latest_checkpoint(&self) -> Result<Hash, LedgerError>;

    /// The oldest settled transaction that includes `reference` among its
    /// account keys, at `commitment` or stronger.
    async fn find_reference(
        &self,
        reference: &Reference,
        commitment: Commitment,
    ) -> Result<SettlementEvidence, LookupError>;
}
