//! End-to-end integration tests for the Tillpoint protocol.
//!
//! These tests run the full request/confirm cycle against the in-memory
//! ledger: a session issues a descriptor, a simulated wallet resolves it and
//! asks the checkout service for a transaction, signs and submits it, and
//! the session notices the settlement and rotates its reference.
//!
//! Each test owns its ledger. No shared state, no ordering dependencies.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use tillpoint_protocol::checkout::{self, CheckoutConfig, CheckoutService, PostResponse};
use tillpoint_protocol::ledger::{InMemoryLedger, LookupErrorKind};
use tillpoint_protocol::reference::{OsReferenceGenerator, Reference, ReferenceGenerator};
use tillpoint_protocol::session::{
    PollerConfig, SessionConfig, SessionController, SessionEvent, SessionHandle,
};
use tillpoint_protocol::transaction::{self, Transaction};
use tillpoint_protocol::{Keypair, Pubkey, Signer};

const CALLBACK: &str = "https://shop.example/api/checkout";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Harness {
    ledger: Arc<InMemoryLedger>,
    checkout: CheckoutService,
    merchant: Pubkey,
}

fn harness() -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let merchant = Keypair::new().pubkey();
    let checkout = CheckoutService::new(
        ledger.clone(),
        CheckoutConfig {
            recipient: Some(merchant),
            ..CheckoutConfig::default()
        },
    );
    Harness {
        ledger,
        checkout,
        merchant,
    }
}

fn start_session(
    ledger: Arc<InMemoryLedger>,
) -> (
    tokio::task::JoinHandle<Result<(), tillpoint_protocol::session::SessionError>>,
    SessionHandle,
    tokio::sync::mpsc::Receiver<SessionEvent>,
) {
    let config = SessionConfig {
        callback_url: CALLBACK.to_string(),
        poller: PollerConfig {
            interval: Duration::from_millis(500),
            ..PollerConfig::default()
        },
    };
    let (controller, handle, events) =
        SessionController::new(config, ledger, Arc::new(OsReferenceGenerator)).unwrap();
    (tokio::spawn(controller.run()), handle, events)
}

fn fresh_reference() -> String {
    OsReferenceGenerator.generate().unwrap().to_base58()
}

async fn next_issued(events: &mut tokio::sync::mpsc::Receiver<SessionEvent>) -> (Reference, String) {
    match events.recv().await {
        Some(SessionEvent::RequestIssued {
            reference,
            descriptor,
        }) => (reference, descriptor),
        other => panic!("expected RequestIssued, got {:?}", other),
    }
}

/// What a wallet does with a scanned descriptor: resolve the link, fetch the
/// transaction for its own account, sign it, and submit it.
async fn wallet_pays(h: &Harness, descriptor: &str, wallet: &Keypair) -> (Transaction, PostResponse) {
    let link = checkout::parse_descriptor(descriptor).unwrap();
    assert_eq!(link.path(), "/api/checkout");
    let reference = checkout::reference_from_link(&link).unwrap();

    let meta = h.checkout.describe();
    assert_eq!(meta.label, "Store Name");

    let resp = h
        .checkout
        .build(&wallet.pubkey().to_string(), &reference.to_base58())
        .await
        .unwrap();
    let mut tx = transaction::deserialize(&STANDARD.decode(&resp.transaction).unwrap()).unwrap();
    let blockhash = tx.message.recent_blockhash;
    tx.try_partial_sign(&[wallet], blockhash).unwrap();
    h.ledger
        .submit_wire(&transaction::serialize(&tx).unwrap())
        .unwrap();
    (tx, resp)
}

// ---------------------------------------------------------------------------
// Full cycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn checkout_settles_and_rotates_reference() {
    let h = harness();
    let (task, handle, mut events) = start_session(h.ledger.clone());

    let (r1, descriptor) = next_issued(&mut events).await;
    assert_eq!(handle.current(), r1);

    let wallet = Keypair::new();
    let (tx, resp) = wallet_pays(&h, &descriptor, &wallet).await;

    // The wallet received what the merchant promised.
    assert_eq!(resp.message, tillpoint_protocol::config::DEFAULT_MESSAGE);
    assert_eq!(tx.message.account_keys[0], wallet.pubkey());
    let idx = transaction::account_index(&tx, &r1.pubkey()).unwrap();
    assert!(!tx.message.is_signer(idx) && !tx.message.is_writable(idx));
    let transfer = transaction::transfer_details(&tx).unwrap();
    assert_eq!(transfer.to, h.merchant);
    assert_eq!(transfer.lamports, 1_000_000);

    match events.recv().await {
        Some(SessionEvent::Settled {
            reference,
            evidence,
        }) => {
            assert_eq!(reference, r1);
            assert_eq!(evidence.signature, tx.signatures[0]);
        }
        other => panic!("expected Settled, got {:?}", other),
    }

    let (r2, descriptor2) = next_issued(&mut events).await;
    assert_ne!(r2, r1);
    assert_ne!(descriptor2, descriptor);
    assert_eq!(handle.current(), r2);

    handle.shutdown();
    assert!(task.await.unwrap().unwrap_err().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn flaky_ledger_delays_but_does_not_lose_confirmation() {
    let h = harness();
    h.ledger.inject_lookup_failures(LookupErrorKind::Transient, 3);
    let (task, handle, mut events) = start_session(h.ledger.clone());

    let (r1, descriptor) = next_issued(&mut events).await;
    wallet_pays(&h, &descriptor, &Keypair::new()).await;

    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::Settled { reference, .. }) if reference == r1
    ));
    assert_eq!(h.ledger.lookup_count(), 4);

    handle.shutdown();
    assert!(task.await.unwrap().unwrap_err().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn several_payments_each_get_a_fresh_reference() {
    let h = harness();
    let (task, handle, mut events) = start_session(h.ledger.clone());

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (reference, descriptor) = next_issued(&mut events).await;
        assert!(!seen.contains(&reference));
        seen.push(reference);
        wallet_pays(&h, &descriptor, &Keypair::new()).await;
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Settled { .. })
        ));
    }
    assert_eq!(h.ledger.transaction_count(), 3);

    handle.shutdown();
    assert!(task.await.unwrap().is_err());
}

// ---------------------------------------------------------------------------
// Checkout contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_builds_for_one_reference_all_carry_it() {
    let h = harness();
    let reference = fresh_reference();
    let payer = Keypair::new().pubkey().to_string();

    let builds = (0..8).map(|_| h.checkout.build(&payer, &reference));
    let results = futures::future::join_all(builds).await;

    let expected = Reference::from_base58(&reference).unwrap();
    for resp in results {
        let tx = transaction::deserialize(&STANDARD.decode(resp.unwrap().transaction).unwrap()).unwrap();
        assert!(transaction::account_index(&tx, &expected.pubkey()).is_some());
        assert!(tx.verify().is_err());
    }
}

#[tokio::test]
async fn unsigned_checkout_transaction_is_refused_by_the_ledger() {
    let h = harness();
    let reference = fresh_reference();
    let resp = h
        .checkout
        .build(&Keypair::new().pubkey().to_string(), &reference)
        .await
        .unwrap();
    let bytes = STANDARD.decode(resp.transaction).unwrap();
    assert!(h.ledger.submit_wire(&bytes).is_err());
    assert_eq!(h.ledger.transaction_count(), 0);
}

#[tokio::test]
async fn merchant_address_cannot_double_as_reference() {
    let h = harness();
    let payer = Keypair::new().pubkey().to_string();
    let err = h
        .checkout
        .build(&payer, &h.merchant.to_string())
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(h.ledger.checkpoint_fetch_count(), 0);
}
