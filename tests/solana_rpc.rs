//! SolanaRpcClient against a scripted JSON-RPC node

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use presale_sentinel::config::{ChainConfig, PresaleSettings};
use presale_sentinel::presale::chain::ChainClient;
use presale_sentinel::presale::solana::keys::{Signer, keypair_from_secret};
use presale_sentinel::presale::{
    BurnMode, ChainError, DistributionPolicy, GuardConfig, LedgerStore, MemoryLedger, Poller,
    PriceTier, PricingResolver, Pubkey, SolanaRpcClient,
};

const LAST_VALID_BLOCK_HEIGHT: u64 = 150;

#[derive(Clone, Copy)]
enum Status {
    /// The status call itself fails
    NodeBehind,
    Missing,
    Processed,
    Confirmed,
    Failed,
}

impl Status {
    fn to_json(self) -> Result<Value, Value> {
        let failure = json!({ "InstructionError": [1, { "Custom": 1 }] });
        match self {
            Status::NodeBehind => Err(json!({ "code": -32005, "message": "Node is behind by 42 slots" })),
            Status::Missing => Ok(Value::Null),
            Status::Processed => Ok(json!({
                "slot": 90, "confirmations": 0, "err": null,
                "status": { "Ok": null }, "confirmationStatus": "processed"
            })),
            Status::Confirmed => Ok(json!({
                "slot": 90, "confirmations": 1, "err": null,
                "status": { "Ok": null }, "confirmationStatus": "confirmed"
            })),
            Status::Failed => Ok(json!({
                "slot": 90, "confirmations": 1, "err": failure,
                "status": { "Err": failure }, "confirmationStatus": "confirmed"
            })),
        }
    }
}

struct Script {
    send_error: Option<(i64, String)>,
    /// Answers to signature status calls in order, then `then` forever
    statuses: VecDeque<Status>,
    then: Status,
    block_height: u64,
    deposit: Option<(String, Pubkey, Pubkey, u64)>,
}

impl Script {
    fn new(statuses: &[Status], then: Status) -> Self {
        Self {
            send_error: None,
            statuses: statuses.iter().copied().collect(),
            then,
            block_height: 100,
            deposit: None,
        }
    }
}

struct Node {
    script: Mutex<Script>,
    sent: Mutex<Vec<String>>,
    status_calls: AtomicUsize,
}

impl Node {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn answer(&self, method: &str, params: &Value) -> Result<Value, Value> {
        let mut script = self.script.lock().unwrap();
        match method {
            "getVersion" => Ok(json!({ "solana-core": "1.18.26", "feature-set": 3_469_865_029u32 })),
            "getLatestBlockhash" => Ok(json!({
                "context": { "slot": 90 },
                "value": {
                    "blockhash": bs58::encode([5u8; 32]).into_string(),
                    "lastValidBlockHeight": LAST_VALID_BLOCK_HEIGHT
                }
            })),
            "getBlockHeight" => Ok(json!(script.block_height)),
            "sendTransaction" => {
                if let Some((code, message)) = &script.send_error {
                    return Err(json!({ "code": code, "message": message }));
                }
                let encoded = params[0].as_str().unwrap_or_default();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .unwrap();
                // compact length prefix, then the fee payer signature
                let signature = bs58::encode(&bytes[1..65]).into_string();
                self.sent.lock().unwrap().push(signature.clone());
                Ok(json!(signature))
            }
            "getSignatureStatuses" => {
                self.status_calls.fetch_add(1, Ordering::SeqCst);
                let next = script.statuses.pop_front().unwrap_or(script.then);
                let status = next.to_json()?;
                Ok(json!({ "context": { "slot": 90 }, "value": [status] }))
            }
            "getSignaturesForAddress" => Ok(match &script.deposit {
                Some((signature, ..)) => json!([{
                    "signature": signature, "slot": 80, "err": null, "memo": null,
                    "blockTime": null, "confirmationStatus": "finalized"
                }]),
                None => json!([]),
            }),
            "getTransaction" => Ok(match &script.deposit {
                Some((signature, source, destination, lamports))
                    if params[0].as_str() == Some(signature.as_str()) =>
                {
                    json!({
                        "slot": 80,
                        "blockTime": 1_717_000_000,
                        "meta": { "err": null, "fee": 5000 },
                        "transaction": {
                            "signatures": [signature],
                            "message": {
                                "accountKeys": [],
                                "instructions": [{
                                    "program": "system",
                                    "programId": "11111111111111111111111111111111",
                                    "parsed": {
                                        "type": "transfer",
                                        "info": {
                                            "source": source.to_string(),
                                            "destination": destination.to_string(),
                                            "lamports": lamports
                                        }
                                    }
                                }]
                            }
                        }
                    })
                }
                _ => Value::Null,
            }),
            "getBalance" => Ok(json!({ "context": { "slot": 90 }, "value": 1_500_000_000u64 })),
            "getTokenAccountsByOwner" => Ok(json!({
                "context": { "slot": 90 },
                "value": [
                    { "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "2000000" } } } } } },
                    { "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "500000" } } } } } }
                ]
            })),
            other => Err(json!({ "code": -32601, "message": format!("Method not found: {}", other) })),
        }
    }
}

async fn rpc(State(node): State<Arc<Node>>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let id = request["id"].clone();
    Json(match node.answer(&method, &request["params"]) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}

async fn spawn_node(script: Script) -> (Arc<Node>, String) {
    let node = Arc::new(Node {
        script: Mutex::new(script),
        sent: Mutex::new(Vec::new()),
        status_calls: AtomicUsize::new(0),
    });
    let app = Router::new().route("/", post(rpc)).with_state(node.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (node, url)
}

fn key(byte: u8) -> Pubkey {
    Pubkey::new_from_array([byte; 32])
}

fn mint() -> Pubkey {
    key(9)
}

fn client(url: String, confirm_timeout_ms: u64) -> SolanaRpcClient {
    let config = ChainConfig {
        rpc_url: url,
        commitment: "confirmed".to_string(),
        request_timeout_ms: 5_000,
        confirm_timeout_ms,
        status_poll_ms: 10,
    };
    let distributor = keypair_from_secret(&[7u8; 32]).unwrap();
    SolanaRpcClient::new(&config, distributor, mint(), 6).unwrap()
}

#[tokio::test]
async fn transfer_confirms_with_one_send() {
    let (node, url) = spawn_node(Script::new(&[Status::Processed, Status::Confirmed], Status::Confirmed)).await;
    let chain = client(url, 5_000);

    let signature = chain.transfer_tokens(&key(4), 10).await.unwrap();
    assert_eq!(node.sent(), vec![signature]);
    assert_eq!(node.status_calls(), 2);
}

#[tokio::test]
async fn status_errors_are_retried_not_resent() {
    let (node, url) = spawn_node(Script::new(
        &[Status::NodeBehind, Status::NodeBehind, Status::Confirmed],
        Status::Confirmed,
    ))
    .await;
    let chain = client(url, 5_000);

    let signature = chain.transfer_tokens(&key(4), 10).await.unwrap();
    assert_eq!(node.sent(), vec![signature]);
    assert_eq!(node.status_calls(), 3);
}

#[tokio::test]
async fn refused_send_is_rejected_without_polling() {
    let mut script = Script::new(&[], Status::Confirmed);
    script.send_error = Some((
        -32002,
        "Transaction simulation failed: insufficient funds".to_string(),
    ));
    let (node, url) = spawn_node(script).await;
    let chain = client(url, 5_000);

    let err = chain.transfer_tokens(&key(4), 10).await.unwrap_err();
    assert!(
        matches!(err, ChainError::Rejected { ref reason, .. } if reason.contains("insufficient funds"))
    );
    assert!(node.sent().is_empty());
    assert_eq!(node.status_calls(), 0);
}

#[tokio::test]
async fn landed_failure_is_rejected() {
    let (node, url) = spawn_node(Script::new(&[Status::Failed], Status::Failed)).await;
    let chain = client(url, 5_000);

    let err = chain.transfer_tokens(&key(4), 10).await.unwrap_err();
    match err {
        ChainError::Rejected { signature, .. } => assert_eq!(node.sent(), vec![signature]),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn unseen_transaction_is_rebroadcast_with_same_signature() {
    let (node, url) = spawn_node(Script::new(
        &[Status::Missing, Status::Missing, Status::Confirmed],
        Status::Confirmed,
    ))
    .await;
    let chain = client(url, 5_000);

    let signature = chain.transfer_tokens(&key(4), 10).await.unwrap();
    let sent = node.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|s| *s == signature));
}

#[tokio::test]
async fn expired_blockhash_without_landing_is_expired() {
    let mut script = Script::new(&[], Status::Missing);
    script.block_height = LAST_VALID_BLOCK_HEIGHT + 1;
    let (node, url) = spawn_node(script).await;
    let chain = client(url, 5_000);

    let err = chain.transfer_tokens(&key(4), 10).await.unwrap_err();
    assert!(matches!(err, ChainError::Expired(_)));
    assert_eq!(node.sent().len(), 1);
    // live lookup, then the history lookup after expiry
    assert_eq!(node.status_calls(), 2);
}

#[tokio::test]
async fn open_outcome_at_timeout_is_unresolved() {
    let (node, url) = spawn_node(Script::new(&[], Status::NodeBehind)).await;
    let chain = client(url, 200);

    let err = chain.burn_tokens(5).await.unwrap_err();
    match err {
        ChainError::Unresolved { signature } => assert_eq!(node.sent(), vec![signature]),
        other => panic!("expected unresolved, got {other:?}"),
    }
    assert!(node.status_calls() > 1);
}

#[tokio::test]
async fn reads_balances_and_deposits() {
    let treasury = key(3);
    let mut script = Script::new(&[], Status::Confirmed);
    script.deposit = Some(("dep1".to_string(), key(4), treasury, 100_000_000));
    let (_node, url) = spawn_node(script).await;
    let chain = client(url, 5_000);

    assert_eq!(chain.native_balance(&treasury).await.unwrap(), 1_500_000_000);
    assert_eq!(chain.token_balance(&treasury).await.unwrap(), 2_500_000);

    let listed = chain.recent_signatures(&treasury, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].signature, "dep1");
    assert!(!listed[0].failed);

    let tx = chain.transaction("dep1").await.unwrap().unwrap();
    assert!(!tx.failed);
    assert!(chain.transaction("other").await.unwrap().is_none());
}

fn poller(url: String, confirm_timeout_ms: u64) -> (Arc<MemoryLedger>, Poller) {
    let chain = Arc::new(client(url, confirm_timeout_ms));
    let ledger = Arc::new(MemoryLedger::default());
    let pricing = PricingResolver::new(
        vec![PriceTier {
            price: Decimal::from_str("0.10").unwrap(),
            tokens: 5_000_000,
        }],
        Decimal::from(40_000_000),
    );
    let policy = DistributionPolicy::new(GuardConfig::default(), 0, BurnMode::Off, 0);
    let distributor = keypair_from_secret(&[7u8; 32]).unwrap().pubkey();
    let settings = Arc::new(PresaleSettings::new(
        key(3),
        mint(),
        6,
        distributor,
        pricing,
        policy,
    ));
    (ledger.clone(), Poller::new(chain, ledger, settings))
}

#[tokio::test]
async fn flaky_status_does_not_pay_a_deposit_twice() {
    let mut script = Script::new(&[Status::NodeBehind], Status::Confirmed);
    script.deposit = Some(("dep1".to_string(), key(4), key(3), 100_000_000));
    let (node, url) = spawn_node(script).await;
    let (ledger, poller) = poller(url, 5_000);

    let first = poller.poll_once().await.unwrap();
    assert_eq!(first.distributed, 1);
    assert_eq!(first.tokens_paid, 5_000_000);

    let second = poller.poll_once().await.unwrap();
    assert_eq!(second.skipped_seen, 1);
    assert_eq!(node.sent().len(), 1);
    assert!(ledger.seen("dep1").await.unwrap());
}

#[tokio::test]
async fn unresolved_payout_is_recorded_and_not_resent() {
    let mut script = Script::new(&[], Status::NodeBehind);
    script.deposit = Some(("dep1".to_string(), key(4), key(3), 100_000_000));
    let (node, url) = spawn_node(script).await;
    let (ledger, poller) = poller(url, 150);

    let first = poller.poll_once().await.unwrap();
    assert_eq!(first.distributed, 1);
    assert!(ledger.seen("dep1").await.unwrap());

    poller.poll_once().await.unwrap();
    assert_eq!(node.sent().len(), 1);
}
