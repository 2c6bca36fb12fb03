//! In-process ledger.
//!
//! Good enough to run the whole request/confirm cycle without a network:
//! it hands out rotating checkpoint hashes, accepts signed transactions
//! (checking signatures and checkpoint freshness the way a real ledger
//! would), and answers reference lookups by scanning account keys.
//!
//! Tests can also make it misbehave: queue lookup failures of a given kind,
//! slow lookups down, or refuse checkpoint requests outright.
//!
//! ## Design
//!
//! - One `parking_lot::RwLock` around all state. Lookups take the write
//!   lock only to pop injected failures and bump counters.
//! - No guard is ever held across an `.await`.
//! - Every settlement is immediately final, so the requested commitment
//!   level is accepted but has no effect.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::sanitize::Sanitize;
use solana_sdk::signature::Signature;
use tracing::debug;

use super::{LedgerClient, LedgerError, LookupError, LookupErrorKind, SettlementEvidence};
use crate::config::Commitment;
use crate::reference::Reference;
use crate::transaction::{self, Transaction};

/// How many recent checkpoints a submission may be anchored to.
const CHECKPOINT_WINDOW: usize = 150;

/// A transaction the ledger has accepted.
#[derive(Debug, Clone)]
struct Landed {
    signature: Signature,
    slot: u64,
    block_time: i64,
    account_keys: Vec<Pubkey>,
}

#[derive(Debug)]
struct LedgerState {
    slot: u64,
    checkpoints: VecDeque<Hash>,
    landed: Vec<Landed>,
    injected: VecDeque<LookupErrorKind>,
    lookup_delay: Option<Duration>,
    checkpoint_unavailable: bool,
    lookups: u64,
    checkpoint_fetches: u64,
}

impl LedgerState {
    fn advance(&mut self) -> Hash {
        self.slot += 1;
        let hash = Hash::new_unique();
        self.checkpoints.push_back(hash);
        while self.checkpoints.len() > CHECKPOINT_WINDOW {
            self.checkpoints.pop_front();
        }
        hash
    }
}

/// A single-node ledger living in memory.
#[derive(Debug)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates a ledger at slot 1 with one checkpoint.
    pub fn new() -> Self {
        let mut state = LedgerState {
            slot: 0,
            checkpoints: VecDeque::with_capacity(CHECKPOINT_WINDOW),
            landed: Vec::new(),
            injected: VecDeque::new(),
            lookup_delay: None,
            checkpoint_unavailable: false,
            lookups: 0,
            checkpoint_fetches: 0,
        };
        state.advance();
        Self {
            state: RwLock::new(state),
        }
    }

    /// Produces a new slot and checkpoint. Old checkpoints age out of the
    /// acceptance window.
    pub fn advance(&self) -> Hash {
        self.state.write().advance()
    }

    /// The current slot.
    pub fn slot(&self) -> u64 {
        self.state.read().slot
    }

    /// Validates and applies a signed transaction, returning its id.
    pub fn submit(&self, tx: &Transaction) -> Result<Signature, LedgerError> {
        tx.sanitize()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        tx.verify()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let signature = *tx
            .signatures
            .first()
            .ok_or_else(|| LedgerError::Rejected("transaction carries no signatures".into()))?;

        let mut state = self.state.write();
        if !state.checkpoints.contains(&tx.message.recent_blockhash) {
            return Err(LedgerError::Rejected(format!(
                "checkpoint {} not found",
                tx.message.recent_blockhash
            )));
        }
        if state.landed.iter().any(|l| l.signature == signature) {
            return Err(LedgerError::Rejected("already processed".into()));
        }

        let slot = state.slot;
        state.landed.push(Landed {
            signature,
            slot,
            block_time: chrono::Utc::now().timestamp(),
            account_keys: tx.message.account_keys.clone(),
        });
        state.advance();
        debug!(%signature, slot, "transaction landed");
        Ok(signature)
    }

    /// Deserializes wire bytes and submits them.
    pub fn submit_wire(&self, bytes: &[u8]) -> Result<Signature, LedgerError> {
        let tx = transaction::deserialize(bytes).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        self.submit(&tx)
    }

    /// Number of transactions that have landed.
    pub fn transaction_count(&self) -> usize {
        self.state.read().landed.len()
    }

    /// Makes the next lookup fail with `kind` instead of consulting state.
    pub fn inject_lookup_failure(&self, kind: LookupErrorKind) {
        self.state.write().injected.push_back(kind);
    }

    /// Makes the next `n` lookups fail with `kind`.
    pub fn inject_lookup_failures(&self, kind: LookupErrorKind, n: usize) {
        let mut state = self.state.write();
        state.injected.extend(std::iter::repeat(kind).take(n));
    }

    /// Delays every lookup by `delay` before it reads the ledger.
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        self.state.write().lookup_delay = delay;
    }

    /// While set, [`LedgerClient::latest_checkpoint`] fails.
    pub fn set_checkpoint_unavailable(&self, unavailable: bool) {
        self.state.write().checkpoint_unavailable = unavailable;
    }

    /// Lookups served so far, failures included.
    pub fn lookup_count(&self) -> u64 {
        self.state.read().lookups
    }

    /// Checkpoint requests served so far, failures included.
    pub fn checkpoint_fetch_count(&self) -> u64 {
        self.state.read().checkpoint_fetches
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn latest_checkpoint(&self) -> Result<Hash, LedgerError> {
        let mut state = self.state.write();
        state.checkpoint_fetches += 1;
        if state.checkpoint_unavailable {
            return Err(LedgerError::Unavailable);
        }
        state.checkpoints.back().copied().ok_or(LedgerError::Unavailable)
    }

    async fn find_reference(
        &self,
        reference: &Reference,
        _commitment: Commitment,
    ) -> Result<SettlementEvidence, LookupError> {
        let delay = self.state.read().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write();
        state.lookups += 1;
        if let Some(kind) = state.injected.pop_front() {
            return Err(LookupError {
                kind,
                message: "injected failure".into(),
            });
        }

        let key = reference.pubkey();
        state
            .landed
            .iter()
            .find(|l| l.account_keys.contains(&key))
            .map(|l| SettlementEvidence {
                signature: l.signature,
                slot: l.slot,
                block_time: Some(l.block_time),
            })
            .ok_or_else(LookupError::not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{Keypair, Signer};

    fn signed_transfer(ledger: &InMemoryLedger, payer: &Keypair, reference: &Reference) -> Transaction {
        let checkpoint = ledger.state.read().checkpoints.back().copied().unwrap();
        let mut tx = transaction::checkout_transfer(
            &payer.pubkey(),
            &Pubkey::new_from_array([9; 32]),
            10,
            reference,
            checkpoint,
        );
        tx.try_partial_sign(&[payer], checkpoint).unwrap();
        tx
    }

    #[tokio::test]
    async fn lookup_finds_submitted_reference() {
        let ledger = InMemoryLedger::new();
        let reference = Reference::from_pubkey(Pubkey::new_from_array([4; 32]));
        assert_eq!(
            ledger
                .find_reference(&reference, Commitment::Confirmed)
                .await
                .unwrap_err()
                .kind,
            LookupErrorKind::NotFound
        );

        let tx = signed_transfer(&ledger, &Keypair::new(), &reference);
        let sig = ledger.submit(&tx).unwrap();
        let evidence = ledger
            .find_reference(&reference, Commitment::Confirmed)
            .await
            .unwrap();
        assert_eq!(evidence.signature, sig);
        assert_eq!(evidence.slot, 1);
        assert_eq!(ledger.lookup_count(), 2);
    }

    #[test]
    fn rejects_unsigned_and_duplicate_submissions() {
        let ledger = InMemoryLedger::new();
        let payer = Keypair::new();
        let reference = Reference::from_pubkey(Pubkey::new_from_array([4; 32]));
        let mut tx = signed_transfer(&ledger, &payer, &reference);

        let mut unsigned = tx.clone();
        unsigned.signatures[0] = Signature::default();
        assert!(matches!(ledger.submit(&unsigned), Err(LedgerError::Rejected(_))));
        assert!(matches!(
            ledger.submit_wire(&transaction::serialize(&unsigned).unwrap()),
            Err(LedgerError::Rejected(_))
        ));

        ledger.submit(&tx).unwrap();
        assert!(matches!(ledger.submit(&tx), Err(LedgerError::Rejected(_))));

        // Re-signing the same message yields the same ed25519 signature.
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&payer], blockhash).unwrap();
        assert!(ledger.submit(&tx).is_err());
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[test]
    fn stale_checkpoints_are_rejected() {
        let ledger = InMemoryLedger::new();
        let payer = Keypair::new();
        let reference = Reference::from_pubkey(Pubkey::new_from_array([4; 32]));
        let tx = signed_transfer(&ledger, &payer, &reference);
        for _ in 0..CHECKPOINT_WINDOW {
            ledger.advance();
        }
        assert!(matches!(ledger.submit(&tx), Err(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn injected_failures_are_served_in_order() {
        let ledger = InMemoryLedger::new();
        let reference = Reference::from_pubkey(Pubkey::new_from_array([4; 32]));
        ledger.inject_lookup_failures(LookupErrorKind::Transient, 2);
        ledger.inject_lookup_failure(LookupErrorKind::Unrecoverable);

        let mut kinds = Vec::new();
        for _ in 0..4 {
            kinds.push(
                ledger
                    .find_reference(&reference, Commitment::Confirmed)
                    .await
                    .unwrap_err()
                    .kind,
            );
        }
        assert_eq!(
            kinds,
            vec![
                LookupErrorKind::Transient,
                LookupErrorKind::Transient,
                LookupErrorKind::Unrecoverable,
                LookupErrorKind::NotFound,
            ]
        );
    }

    #[tokio::test]
    async fn checkpoint_can_be_made_unavailable() {
        let ledger = InMemoryLedger::new();
        ledger.set_checkpoint_unavailable(true);
        assert_eq!(ledger.latest_checkpoint().await, Err(LedgerError::Unavailable));
        ledger.set_checkpoint_unavailable(false);
        assert!(ledger.latest_checkpoint().await.is_ok());
        assert_eq!(ledger.checkpoint_fetch_count(), 2);
    }
}
