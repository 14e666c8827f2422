//! WebSocket log subscription feeding the event bus.
//!
//! Subscribes to the registry contract's logs with `eth_subscribe` and
//! publishes each decoded event. Reconnects with exponential backoff; the
//! bus drops logs replayed after a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_bus::{EventPublisher, InMemoryEventBus, RegistryEvent};
use shared_types::Address;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::abi;
use super::json_rpc::RpcLog;
use crate::domain::RegistryError;

/// Maximum WebSocket reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Base delay between reconnection attempts (exponential backoff).
const RECONNECT_BASE_DELAY_SECS: u64 = 2;

/// Maximum delay between reconnection attempts.
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// JSON-RPC request for WebSocket.
#[derive(Debug, Serialize)]
struct WsRequest<T: Serialize> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// JSON-RPC subscription response.
#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: Option<u64>,
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
    method: Option<String>,
    params: Option<SubscriptionParams>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    subscription: String,
    result: serde_json::Value,
}

/// How a connection ended.
enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

/// Subscribes to registry logs and publishes them to the bus.
pub struct LogSubscriber {
    ws_url: String,
    contract: Address,
    bus: Arc<InMemoryEventBus>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LogSubscriber {
    /// Create a subscriber for `contract` logs on `ws_url`.
    pub fn new(ws_url: impl Into<String>, contract: Address, bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            ws_url: ws_url.into(),
            contract,
            bus,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task. Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(connection_loop(
            self.ws_url.clone(),
            self.contract,
            self.bus.clone(),
            shutdown_rx,
        )));
    }

    /// True while the connection task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the connection task and wait for it.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LogSubscriber {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Connection loop with reconnection logic.
async fn connection_loop(
    ws_url: String,
    contract: Address,
    bus: Arc<InMemoryEventBus>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let request_id = AtomicU64::new(1);
    let mut reconnect_attempts = 0u32;

    loop {
        let mut subscribed = false;
        let end = run_connection(
            &ws_url,
            &contract,
            &bus,
            &request_id,
            &mut shutdown_rx,
            &mut subscribed,
        )
        .await;

        let reason = match end {
            Ok(ConnectionEnd::Shutdown) => break,
            Ok(ConnectionEnd::Lost(reason)) => reason,
            Err(err) => err.to_string(),
        };
        if subscribed {
            reconnect_attempts = 0;
        }
        reconnect_attempts += 1;
        warn!(attempt = reconnect_attempts, reason = %reason, "Log subscription lost");

        if reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
            error!(
                attempts = MAX_RECONNECT_ATTEMPTS,
                "Log subscription failed, relying on polling"
            );
            break;
        }

        let delay = calculate_backoff_delay(reconnect_attempts);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Calculate exponential backoff delay.
pub fn calculate_backoff_delay(attempts: u32) -> Duration {
    Duration::from_secs(std::cmp::min(
        RECONNECT_BASE_DELAY_SECS.saturating_mul(1 << attempts.min(6)),
        MAX_RECONNECT_DELAY_SECS,
    ))
}

/// Run a single WebSocket connection.
async fn run_connection(
    ws_url: &str,
    contract: &Address,
    bus: &InMemoryEventBus,
    request_id: &AtomicU64,
    shutdown_rx: &mut mpsc::Receiver<()>,
    subscribed: &mut bool,
) -> Result<ConnectionEnd, RegistryError> {
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|err| RegistryError::Transport(format!("WebSocket connect failed: {err}")))?;
    let (mut write, mut read) = ws_stream.split();

    let subscribe_id = request_id.fetch_add(1, Ordering::SeqCst);
    let topics: Vec<String> = abi::registry_topics()
        .iter()
        .map(|topic| format!("0x{}", hex::encode(topic)))
        .collect();
    let request = WsRequest {
        jsonrpc: "2.0",
        method: "eth_subscribe",
        params: ("logs", json!({ "address": contract.to_hex(), "topics": [topics] })),
        id: subscribe_id,
    };
    let text = serde_json::to_string(&request)
        .map_err(|err| RegistryError::Decode(err.to_string()))?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|err| RegistryError::Transport(format!("Failed to send subscription: {err}")))?;

    let mut subscription: Option<String> = None;

    loop {
        let msg = tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(ConnectionEnd::Shutdown);
            }
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let Ok(response) = serde_json::from_str::<SubscriptionResponse>(&text) else {
                    continue;
                };
                if let Some(error) = response.error {
                    return Err(RegistryError::Rpc {
                        code: error.code,
                        message: error.message,
                    });
                }
                if response.id == Some(subscribe_id) {
                    if let Some(id) = response.result.as_ref().and_then(|r| r.as_str()) {
                        info!(subscription = id, "Subscribed to registry logs");
                        subscription = Some(id.to_string());
                        *subscribed = true;
                    }
                    continue;
                }
                if response.method.as_deref() == Some("eth_subscription") {
                    if let Some(params) = response.params {
                        if subscription.as_deref() == Some(params.subscription.as_str()) {
                            publish_log(bus, params.result).await;
                        }
                    }
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                return Ok(ConnectionEnd::Lost("connection closed".into()));
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Ok(ConnectionEnd::Lost(err.to_string())),
        }
    }
}

/// Decode a log notification and publish it. Returns subscribers reached.
async fn publish_log(bus: &InMemoryEventBus, raw: serde_json::Value) -> usize {
    let log: RpcLog = match serde_json::from_value(raw) {
        Ok(log) => log,
        Err(err) => {
            warn!(error = %err, "Malformed log notification");
            return 0;
        }
    };
    if log.removed {
        debug!("Ignoring removed log");
        return 0;
    }
    let event = match log.decode() {
        Ok(Some(event)) => event,
        Ok(None) => return 0,
        Err(err) => {
            warn!(error = %err, "Undecodable registry log");
            return 0;
        }
    };
    debug!(event = event.name(), token_id = event.token_id().0, "Registry log received");
    let event = match log.meta() {
        Some(meta) => RegistryEvent::from_log(event, meta),
        None => RegistryEvent::local(event),
    };
    bus.publish(event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{ContractEvent, EventFilter};
    use shared_types::TokenId;

    fn notification() -> serde_json::Value {
        json!({
            "address": Address([0xcc; 20]).to_hex(),
            "topics": [
                format!("0x{}", hex::encode(abi::event_topic(abi::GOVT_APPROVED))),
                format!("0x{:0>64}", "7"),
            ],
            "data": format!("0x{:0>64}", hex::encode([9u8; 20])),
            "blockNumber": "0x64",
            "transactionHash": format!("0x{}", "0f".repeat(32)),
            "logIndex": "0x1",
        })
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(calculate_backoff_delay(1), Duration::from_secs(4));
        assert_eq!(calculate_backoff_delay(4), Duration::from_secs(32));
        assert_eq!(calculate_backoff_delay(5), Duration::from_secs(60));
        assert_eq!(calculate_backoff_delay(9), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_publish_log_reaches_subscriber() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        assert_eq!(publish_log(&bus, notification()).await, 1);
        let received = sub.recv().await.unwrap();
        assert_eq!(
            received.event,
            ContractEvent::GovtApproved {
                token_id: TokenId(7),
                govt: Address([9; 20]),
            }
        );
        assert_eq!(received.meta.unwrap().block_number, 100);
    }

    #[tokio::test]
    async fn test_replayed_log_suppressed() {
        let bus = InMemoryEventBus::new();
        let _sub = bus.subscribe(EventFilter::all());

        assert_eq!(publish_log(&bus, notification()).await, 1);
        assert_eq!(publish_log(&bus, notification()).await, 0);
    }

    #[tokio::test]
    async fn test_removed_and_malformed_logs_skipped() {
        let bus = InMemoryEventBus::new();
        let _sub = bus.subscribe(EventFilter::all());

        let mut removed = notification();
        removed["removed"] = json!(true);
        assert_eq!(publish_log(&bus, removed).await, 0);
        assert_eq!(publish_log(&bus, json!({"foo": 1})).await, 0);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut subscriber =
            LogSubscriber::new("ws://127.0.0.1:1", Address::ZERO, Arc::new(InMemoryEventBus::new()));
        assert!(!subscriber.is_running());
        subscriber.stop().await;
    }
}
