//! Cross-module scenarios: connect fallback policy, create-then-unlock
//! across sessions, and a full send against a stubbed RPC node.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::assert_ok;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use radhasphere_wallet::{
    Config, Error, FileStore, JsonRpcProvider, LedgerRpc, WalletSession,
};

const PASSWORD: &str = "Secret123!";
const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
const STUB_TX_HASH: &str =
    "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";

/// Minimal single-purpose JSON-RPC stub: accepts HTTP POSTs, answers the
/// handful of methods the wallet uses, counts handled requests.
async fn spawn_rpc_stub(chain_id: u64) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                if let Some(body) = read_request_body(&mut socket).await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let reply = respond(chain_id, &body).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        reply.len(),
                        reply
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), requests)
}

async fn read_request_body(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())?;

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string())
}

fn respond(chain_id: u64, body: &str) -> Value {
    let request: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let result = match request["method"].as_str().unwrap_or("") {
        "eth_chainId" => json!(format!("0x{chain_id:x}")),
        "eth_getBalance" => json!("0x8ac7230489e80000"), // 10 ether
        "eth_getTransactionCount" => json!("0x0"),
        "eth_gasPrice" => json!("0x3b9aca00"), // 1 gwei
        "eth_sendRawTransaction" => json!(STUB_TX_HASH),
        "eth_getTransactionReceipt" => json!({
            "transactionHash": STUB_TX_HASH,
            "blockNumber": "0x1",
            "status": "0x1",
        }),
        other => {
            return json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32601, "message": format!("unknown method {other}") },
            })
        }
    };
    json!({ "jsonrpc": "2.0", "id": request["id"], "result": result })
}

/// A 127.0.0.1 URL that refuses connections immediately
async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn connect(primary: &str, fallback: Option<&str>) -> radhasphere_wallet::Result<JsonRpcProvider> {
    JsonRpcProvider::connect(
        primary,
        fallback,
        Duration::from_secs(2),
        Duration::from_millis(50),
    )
    .await
}

#[tokio::test]
async fn connect_prefers_reachable_primary() {
    let (primary, primary_hits) = spawn_rpc_stub(1).await;
    let (fallback, fallback_hits) = spawn_rpc_stub(1).await;

    let provider = tokio_test::assert_ok!(connect(&primary, Some(&fallback)).await);
    assert_eq!(provider.chain_id(), 1);
    assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connect_activates_fallback_once() {
    let primary = dead_endpoint().await;
    let (fallback, fallback_hits) = spawn_rpc_stub(1).await;

    let provider = tokio_test::assert_ok!(connect(&primary, Some(&fallback)).await);
    assert_eq!(provider.chain_id(), 1);
    // Exactly one probe reached the fallback; the dead primary got the other
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_fails_when_both_endpoints_down() {
    let primary = dead_endpoint().await;
    let fallback = dead_endpoint().await;
    assert!(matches!(
        connect(&primary, Some(&fallback)).await,
        Err(Error::NoProviderAvailable(_))
    ));
}

#[tokio::test]
async fn connect_without_fallback_fails_fast() {
    let primary = dead_endpoint().await;
    assert!(matches!(
        connect(&primary, None).await,
        Err(Error::NoProviderAvailable(_))
    ));
}

fn stub_config(store_path: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.rpc.confirmation_timeout_secs = 5;
    config.rpc.confirmation_poll_ms = 50;
    config.store.path = store_path.to_string_lossy().into_owned();
    config
}

#[tokio::test]
async fn create_then_unlock_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    let (endpoint, _) = spawn_rpc_stub(1).await;
    let config = stub_config(&path);

    let created_address = {
        let provider = connect(&endpoint, None).await.unwrap();
        let session = WalletSession::new(provider, FileStore::new(&path), &config).unwrap();
        let wallet = session.create_wallet(PASSWORD).await.unwrap();
        assert!(session.is_unlocked().await);
        wallet.record.address
    };

    // A fresh session over the same persisted record
    let provider = connect(&endpoint, None).await.unwrap();
    let session = WalletSession::new(provider, FileStore::new(&path), &config).unwrap();
    assert!(!session.is_unlocked().await);

    assert!(matches!(
        session.unlock_wallet("not-the-password").await,
        Err(Error::UnlockFailed)
    ));
    let unlocked_address = session.unlock_wallet(PASSWORD).await.unwrap();
    assert_eq!(unlocked_address, created_address);
}

#[tokio::test]
async fn send_transaction_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    let (endpoint, hits) = spawn_rpc_stub(1).await;
    let config = stub_config(&path);

    let provider = connect(&endpoint, None).await.unwrap();
    let session = WalletSession::new(provider, FileStore::new(&path), &config).unwrap();
    session.create_wallet(PASSWORD).await.unwrap();

    let sent = session.send_transaction(RECIPIENT, "1.5").await.unwrap();
    assert_eq!(sent.hash, STUB_TX_HASH);
    assert_eq!(sent.block_number, Some(1));
    // connect probe + balance + nonce + gas price + broadcast + receipt
    assert_eq!(hits.load(Ordering::SeqCst), 6);

    let balance = session.balance().await.unwrap();
    assert_eq!(balance, "10");
}

#[tokio::test]
async fn disconnect_then_unlock_reports_no_wallet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    let (endpoint, _) = spawn_rpc_stub(1).await;
    let config = stub_config(&path);

    let provider = connect(&endpoint, None).await.unwrap();
    let session = WalletSession::new(provider, FileStore::new(&path), &config).unwrap();
    session.create_wallet(PASSWORD).await.unwrap();
    session.disconnect_wallet().await.unwrap();

    assert!(!path.exists());
    assert!(matches!(
        session.unlock_wallet(PASSWORD).await,
        Err(Error::NoWallet)
    ));
    assert!(matches!(
        session.send_transaction(RECIPIENT, "1").await,
        Err(Error::WalletLocked)
    ));
}
