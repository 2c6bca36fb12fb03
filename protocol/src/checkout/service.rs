//! The checkout service: metadata on GET, an unsigned transaction on POST.
//!
//! Building is stateless. Each call fetches a fresh checkpoint, compiles a
//! transfer from the payer to the merchant, tags it with the reference, and
//! serializes it with empty signature slots. Nothing is cached, so two
//! builds for the same `(payer, reference)` may differ in checkpoint but
//! always carry the same reference.

use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_program;
use tracing::{debug, warn};

use super::error::{CheckoutError, InputError, InputField, ReservedAccount};
use super::{CheckoutConfig, GetResponse, PostResponse};
use crate::ledger::LedgerClient;
use crate::reference::Reference;
use crate::transaction::{self, Transaction};

/// Builds checkout transactions against a ledger.
#[derive(Clone)]
pub struct CheckoutService {
    ledger: Arc<dyn LedgerClient>,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: CheckoutConfig) -> Self {
        if config.recipient.is_none() {
            warn!("no recipient configured; payments will go to throwaway addresses");
        }
        Self { ledger, config }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Label and icon for the wallet. Pure; the same on every call.
    pub fn describe(&self) -> GetResponse {
        GetResponse {
            label: self.config.label.clone(),
            icon: self.config.icon.clone(),
        }
    }

    /// Validates both inputs, then builds and encodes the transaction.
    ///
    /// Validation happens before the ledger is touched, so a malformed
    /// request costs nothing upstream.
    pub async fn build(&self, account: &str, reference: &str) -> Result<PostResponse, CheckoutError> {
        let payer = Pubkey::from_str(account)
            .map_err(|e| CheckoutError::invalid(InputField::Account, e))?;
        let reference = Reference::from_base58(reference)
            .map_err(|e| CheckoutError::invalid(InputField::Reference, e))?;

        let tx = self.build_for(payer, reference).await?;
        let bytes =
            transaction::serialize(&tx).map_err(|e| CheckoutError::BuildFailed(e.to_string()))?;

        Ok(PostResponse {
            transaction: STANDARD.encode(bytes),
            message: self.config.message.clone(),
        })
    }

    /// Builds the unsigned transaction for already-parsed inputs.
    ///
    /// A reference equal to the payer, the recipient, or the system program
    /// is refused before the ledger is asked for a checkpoint.
    pub async fn build_for(
        &self,
        payer: Pubkey,
        reference: Reference,
    ) -> Result<Transaction, CheckoutError> {
        let recipient = match self.config.recipient {
            Some(recipient) => recipient,
            None => {
                let throwaway = Keypair::new().pubkey();
                debug!(%throwaway, "paying throwaway recipient");
                throwaway
            }
        };
        check_distinct(&reference, &payer, &recipient)?;

        let checkpoint = self
            .ledger
            .latest_checkpoint()
            .await
            .map_err(|e| CheckoutError::BuildFailed(e.to_string()))?;

        let tx = transaction::checkout_transfer(
            &payer,
            &recipient,
            self.config.lamports,
            &reference,
            checkpoint,
        );

        debug!(%payer, %reference, checkpoint = %checkpoint, "built checkout transaction");
        Ok(tx)
    }
}

fn check_distinct(
    reference: &Reference,
    payer: &Pubkey,
    recipient: &Pubkey,
) -> Result<(), CheckoutError> {
    let key = reference.pubkey();
    let reserved = if key == *payer {
        ReservedAccount::Payer
    } else if key == *recipient {
        ReservedAccount::Recipient
    } else if key == system_program::id() {
        ReservedAccount::SystemProgram
    } else {
        return Ok(());
    };
    Err(CheckoutError::invalid(
        InputField::Reference,
        InputError::ReferenceCollision(reserved),
    ))
}
