//! JSON-RPC ledger adapter.
//!
//! A thin `reqwest` client for the two calls the protocol needs:
//! `getLatestBlockhash` and `getSignaturesForAddress`. No retries live
//! here; the poller already asks again on the next tick.
//!
//! The node returns signatures newest first, at most
//! [`SIGNATURE_PAGE_LIMIT`] at a time. A lookup keeps paging backwards with
//! `before` until a short page, so the oldest settlement is found even under
//! a pile of newer traffic.
//!
//! ## Error mapping
//!
//! | Condition                               | Lookup kind     |
//! |-----------------------------------------|-----------------|
//! | empty signature list                    | `NotFound`      |
//! | only failed transactions, on every page | `NotFound`      |
//! | connection error, timeout, HTTP 5xx/429 | `Transient`     |
//! | undecodable body                        | `Transient`     |
//! | RPC error `-32602` (invalid params)     | `Unrecoverable` |
//! | any other RPC error                     | `Transient`     |

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use tracing::{debug, trace};

use super::{LedgerClient, LedgerError, LookupError, SettlementEvidence};
use crate::config::{Commitment, RPC_REQUEST_TIMEOUT, SIGNATURE_PAGE_LIMIT};
use crate::reference::Reference;

/// JSON-RPC "invalid params": the node rejected the address itself.
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct BlockhashValue {
    blockhash: String,
}

/// One entry of a `getSignaturesForAddress` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    block_time: Option<i64>,
}

/// A ledger reached over HTTP JSON-RPC.
#[derive(Debug)]
pub struct RpcLedger {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcLedger {
    /// Creates a client for `endpoint`. Each request is bounded by
    /// [`RPC_REQUEST_TIMEOUT`].
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(RPC_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// The JSON-RPC endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("http status {}", status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| LedgerError::Decode(format!("{} returned no result", method)))
    }
}

/// Maps a transport-level failure onto the lookup taxonomy.
fn classify(err: LedgerError) -> LookupError {
    match err {
        LedgerError::Rpc { code, message } if code == INVALID_PARAMS => {
            LookupError::unrecoverable(message)
        }
        other => LookupError::transient(other.to_string()),
    }
}

/// Picks the oldest successful transaction from a newest-first page.
fn oldest_settled(page: &[SignatureInfo]) -> Result<Option<SettlementEvidence>, LookupError> {
    let Some(info) = page
        .iter()
        .rev()
        .find(|s| s.err.as_ref().map_or(true, Value::is_null))
    else {
        return Ok(None);
    };
    let signature = Signature::from_str(&info.signature)
        .map_err(|e| LookupError::transient(format!("bad signature in response: {}", e)))?;
    Ok(Some(SettlementEvidence {
        signature,
        slot: info.slot,
        block_time: info.block_time,
    }))
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn latest_checkpoint(&self) -> Result<Hash, LedgerError> {
        let ctx: WithContext<BlockhashValue> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": Commitment::Finalized.as_str() }]),
            )
            .await?;
        Hash::from_str(&ctx.value.blockhash).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn find_reference(
        &self,
        reference: &Reference,
        commitment: Commitment,
    ) -> Result<SettlementEvidence, LookupError> {
        let mut oldest = None;
        let mut before: Option<String> = None;
        loop {
            let mut options = json!({
                "commitment": commitment.as_str(),
                "limit": SIGNATURE_PAGE_LIMIT,
            });
            if let Some(cursor) = &before {
                options["before"] = json!(cursor);
            }
            let page: Vec<SignatureInfo> = self
                .call("getSignaturesForAddress", json!([reference.to_base58(), options]))
                .await
                .map_err(classify)?;
            debug!(%reference, entries = page.len(), paged = before.is_some(), "signature page");

            // Later pages are older, so a hit there replaces one from an earlier page.
            if let Some(evidence) = oldest_settled(&page)? {
                oldest = Some(evidence);
            }
            match page.last() {
                Some(last) if page.len() >= SIGNATURE_PAGE_LIMIT => {
                    before = Some(last.signature.clone());
                }
                _ => break,
            }
        }
        oldest.ok_or_else(LookupError::not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LookupErrorKind;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use solana_sdk::pubkey::Pubkey;
    use std::sync::Arc;

    fn signature(b: u8) -> Signature {
        Signature::from([b; 64])
    }

    fn info(sig: u8, slot: u64, failed: bool) -> SignatureInfo {
        SignatureInfo {
            signature: signature(sig).to_string(),
            slot,
            err: failed.then(|| json!({ "InstructionError": [0, "Custom"] })),
            block_time: Some(1_700_000_000),
        }
    }

    fn info_json(info: &SignatureInfo) -> Value {
        json!({
            "signature": info.signature,
            "slot": info.slot,
            "err": info.err,
            "blockTime": info.block_time,
        })
    }

    #[test]
    fn empty_page_has_no_settlement() {
        assert_eq!(oldest_settled(&[]).unwrap(), None);
    }

    #[test]
    fn oldest_successful_entry_wins() {
        // Newest first, as the node returns them.
        let page = vec![info(3, 30, false), info(2, 20, false), info(1, 10, true)];
        let evidence = oldest_settled(&page).unwrap().unwrap();
        assert_eq!(evidence.slot, 20);
        assert_eq!(evidence.signature, signature(2));
    }

    #[test]
    fn only_failed_transactions_has_no_settlement() {
        assert_eq!(oldest_settled(&[info(1, 10, true)]).unwrap(), None);
    }

    #[test]
    fn garbage_signature_is_transient() {
        let mut bad = info(1, 10, false);
        bad.signature = "not-a-signature".into();
        assert_eq!(
            oldest_settled(&[bad]).unwrap_err().kind,
            LookupErrorKind::Transient
        );
    }

    #[test]
    fn invalid_params_is_unrecoverable_everything_else_transient() {
        let bad_params = LedgerError::Rpc {
            code: INVALID_PARAMS,
            message: "Invalid param: WrongSize".into(),
        };
        assert_eq!(classify(bad_params).kind, LookupErrorKind::Unrecoverable);

        let busy = LedgerError::Rpc {
            code: -32005,
            message: "node is behind".into(),
        };
        assert_eq!(classify(busy).kind, LookupErrorKind::Transient);
        assert_eq!(
            classify(LedgerError::Transport("reset".into())).kind,
            LookupErrorKind::Transient
        );
        assert_eq!(
            classify(LedgerError::Decode("eof".into())).kind,
            LookupErrorKind::Transient
        );
    }

    #[test]
    fn parses_signature_page_json() {
        let raw = json!([{
            "signature": signature(7).to_string(),
            "slot": 114,
            "err": null,
            "memo": null,
            "blockTime": 1_700_000_123,
            "confirmationStatus": "confirmed"
        }]);
        let page: Vec<SignatureInfo> = serde_json::from_value(raw).unwrap();
        let evidence = oldest_settled(&page).unwrap().unwrap();
        assert_eq!(evidence.slot, 114);
        assert_eq!(evidence.block_time, Some(1_700_000_123));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let ledger = RpcLedger::new("http://127.0.0.1:1").unwrap();
        let reference = Reference::from_pubkey(Pubkey::new_from_array([1; 32]));
        let err = ledger
            .find_reference(&reference, Commitment::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err.kind, LookupErrorKind::Transient);
    }

    type Seen = Arc<Mutex<Vec<Value>>>;

    /// A node whose first signature page is a full page of failures and
    /// whose second page holds the one successful settlement.
    async fn fake_node(State(seen): State<Seen>, Json(request): Json<Value>) -> Json<Value> {
        let call = {
            let mut seen = seen.lock();
            seen.push(request.clone());
            seen.len()
        };
        let page: Vec<Value> = if call == 1 {
            (0..SIGNATURE_PAGE_LIMIT)
                .map(|i| info_json(&info((i % 200) as u8 + 10, 1_000 - i as u64, true)))
                .collect()
        } else {
            vec![info_json(&info(5, 5, false)), info_json(&info(4, 4, true))]
        };
        Json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": page }))
    }

    #[tokio::test]
    async fn settlement_behind_a_full_page_is_found() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/", post(fake_node))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let ledger = RpcLedger::new(format!("http://{}/", addr)).unwrap();
        let reference = Reference::from_pubkey(Pubkey::new_unique());
        let evidence = ledger
            .find_reference(&reference, Commitment::Confirmed)
            .await
            .unwrap();
        assert_eq!(evidence.slot, 5);
        assert_eq!(evidence.signature, signature(5));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0]["params"][1].get("before").is_none());
        let last_of_first_page = info(
            ((SIGNATURE_PAGE_LIMIT - 1) % 200) as u8 + 10,
            0,
            true,
        )
        .signature;
        assert_eq!(seen[1]["params"][1]["before"], json!(last_of_first_page));
        assert_eq!(seen[1]["params"][0], json!(reference.to_base58()));
    }
}
