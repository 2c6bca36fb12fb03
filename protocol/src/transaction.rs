//! # Checkout Transactions
//!
//! Building, encoding, and inspecting the legacy ledger transactions the
//! checkout hands to wallets. Message compilation and signing are
//! `solana-sdk`'s; the wire form is its `bincode` encoding, the same bytes
//! a wallet produces when it serializes with signatures still missing.
//!
//! ```text
//!   [ transfer payer -> recipient ] + reference (readonly, non-signer)
//!        │
//!        ▼  Transaction::new_with_payer, recent_blockhash = checkpoint
//!   unsigned transaction, one zeroed signature slot for the payer
//!        │
//!        ▼  serialize()
//!   <= PACKET_DATA_SIZE bytes, base64'd by the checkout service
//! ```

use bincode::Options;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::AccountMeta;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::sanitize::{Sanitize, SanitizeError};
use solana_sdk::system_instruction::{self, SystemInstruction};
use solana_sdk::system_program;
use thiserror::Error;

use crate::reference::Reference;

pub use solana_sdk::transaction::Transaction;

/// Failures encoding or decoding a transaction.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("transaction codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The encoded transaction would not fit in a single packet.
    #[error("transaction is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },

    /// Decoded, but the header and account lists disagree.
    #[error("malformed transaction: {0}")]
    Malformed(#[from] SanitizeError),
}

/// A system-program transfer found in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDetails {
    pub from: Pubkey,
    pub to: Pubkey,
    pub lamports: u64,
}

/// The unsigned checkout transaction: one transfer of `lamports` from
/// `payer` to `recipient`, tagged with `reference` as a read-only,
/// non-signing account. `payer` pays fees and is the only signer.
///
/// The reference must be distinct from `payer`, `recipient`, and the system
/// program; otherwise message compilation merges it with that account and it
/// inherits its flags.
pub fn checkout_transfer(
    payer: &Pubkey,
    recipient: &Pubkey,
    lamports: u64,
    reference: &Reference,
    recent_blockhash: Hash,
) -> Transaction {
    let mut transfer = system_instruction::transfer(payer, recipient, lamports);
    transfer
        .accounts
        .push(AccountMeta::new_readonly(reference.pubkey(), false));

    let mut tx = Transaction::new_with_payer(&[transfer], Some(payer));
    tx.message.recent_blockhash = recent_blockhash;
    tx
}

/// Encodes `tx` for the wire. Missing signatures stay as zeroed slots.
pub fn serialize(tx: &Transaction) -> Result<Vec<u8>, WireError> {
    let bytes = bincode::serialize(tx)?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(WireError::TooLarge {
            size: bytes.len(),
            max: PACKET_DATA_SIZE,
        });
    }
    Ok(bytes)
}

/// Decodes wire bytes. Oversized input and trailing bytes are rejected, and
/// the result is sanitized before it is returned.
pub fn deserialize(bytes: &[u8]) -> Result<Transaction, WireError> {
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(WireError::TooLarge {
            size: bytes.len(),
            max: PACKET_DATA_SIZE,
        });
    }
    let tx: Transaction = bincode::options()
        .with_limit(PACKET_DATA_SIZE as u64)
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(bytes)?;
    tx.sanitize()?;
    Ok(tx)
}

/// The first system transfer in `tx`, if there is one.
pub fn transfer_details(tx: &Transaction) -> Option<TransferDetails> {
    let keys = &tx.message.account_keys;
    tx.message.instructions.iter().find_map(|ix| {
        if keys.get(usize::from(ix.program_id_index)) != Some(&system_program::id()) {
            return None;
        }
        match bincode::deserialize::<SystemInstruction>(&ix.data).ok()? {
            SystemInstruction::Transfer { lamports } => Some(TransferDetails {
                from: *keys.get(usize::from(*ix.accounts.first()?))?,
                to: *keys.get(usize::from(*ix.accounts.get(1)?))?,
                lamports,
            }),
            _ => None,
        }
    })
}

/// Position of `key` in the message's account list.
pub fn account_index(tx: &Transaction, key: &Pubkey) -> Option<usize> {
    tx.message.account_keys.iter().position(|k| k == key)
}
