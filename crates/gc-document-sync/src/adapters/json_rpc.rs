//! JSON-RPC adapter for the registry contract and the wallet.
//!
//! Talks to a node or wallet bridge over HTTP. Transactions are sent with
//! `eth_sendTransaction`, so signing stays with the endpoint.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use shared_bus::{ContractEvent, LogMeta};
use shared_types::{Address, DocumentRecord, TokenId, TxHash};
use tracing::{debug, warn};

use super::abi;
use crate::config::{ChainParams, RegistryConfig, SyncConfig};
use crate::domain::{
    classify_rpc_error, is_nonexistent_token, CompletedTransfer, ContractCall, RegistryError,
    TxReceipt,
};
use crate::ports::{RegistryReader, RegistryWriter, WalletProvider};

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Revert payload, when the node includes one.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Message with the decoded revert reason appended when available.
    fn full_message(&self) -> String {
        let reason = self
            .data
            .as_ref()
            .and_then(|data| data.as_str())
            .and_then(|data| decode_hex(data).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes));
        match reason {
            Some(reason) if !self.message.contains(&reason) => {
                format!("{}: {reason}", self.message)
            }
            _ => self.message.clone(),
        }
    }

    fn into_registry_error(self) -> RegistryError {
        classify_rpc_error(self.code, &self.full_message())
    }
}

/// A log as returned by `eth_getLogs` and in receipts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    /// Emitting contract.
    pub address: String,
    /// Indexed topics.
    pub topics: Vec<String>,
    /// Non-indexed data.
    pub data: String,
    /// Block number (hex).
    pub block_number: Option<String>,
    /// Transaction hash.
    pub transaction_hash: Option<String>,
    /// Log index (hex).
    pub log_index: Option<String>,
    /// Set when the log was dropped by a reorg.
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    /// Log position, if the log is mined.
    pub fn meta(&self) -> Option<LogMeta> {
        Some(LogMeta {
            block_number: parse_hex_u64(self.block_number.as_deref()?).ok()?,
            tx_hash: TxHash::from_str(self.transaction_hash.as_deref()?).ok()?,
            log_index: parse_hex_u64(self.log_index.as_deref()?).ok()?,
        })
    }

    /// Decode into a registry event. `None` for unrelated logs.
    pub fn decode(&self) -> Result<Option<ContractEvent>, RegistryError> {
        let topics = self
            .topics
            .iter()
            .map(|topic| {
                let bytes = decode_hex(topic)?;
                <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| RegistryError::Decode(format!("bad topic {topic}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        abi::decode_log(&topics, &decode_hex(&self.data)?)
    }

    fn is_from(&self, contract: &Address) -> bool {
        Address::from_str(&self.address).is_ok_and(|address| address == *contract)
    }
}

/// A receipt from `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: String,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// JSON-RPC client for the registry contract.
pub struct JsonRpcClient {
    http_client: reqwest::Client,
    rpc_url: String,
    contract: Address,
    request_id: AtomicU64,
    receipt_poll_interval: Duration,
}

impl JsonRpcClient {
    /// Create a client for `rpc_url` bound to `contract`.
    pub fn new(rpc_url: impl Into<String>, contract: Address) -> Self {
        // reqwest::Client::new() is infallible
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            rpc_url: rpc_url.into(),
            contract,
            request_id: AtomicU64::new(1),
            receipt_poll_interval: Duration::from_secs(2),
        }
    }

    /// Create a client from the deployment and sync configuration.
    pub fn from_config(config: &RegistryConfig, sync: &SyncConfig) -> Self {
        Self::new(config.rpc_url.clone(), config.contract_address)
            .with_receipt_poll_interval(sync.receipt_poll_interval)
    }

    /// How often to poll for a receipt.
    #[must_use]
    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Make a JSON-RPC call.
    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, RegistryError> {
        self.call_optional(method, params).await?.ok_or_else(|| {
            RegistryError::Decode(format!("{method}: response missing result"))
        })
    }

    /// Make a JSON-RPC call whose result may be `null`.
    async fn call_optional<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<R>, RegistryError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|err| RegistryError::Transport(err.to_string()))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|err| RegistryError::Decode(format!("{method}: {err}")))?;

        if let Some(error) = rpc_response.error {
            debug!(method, code = error.code, message = %error.message, "RPC error");
            return Err(error.into_registry_error());
        }

        Ok(rpc_response.result)
    }

    fn transaction(&self, from: Address, call: &ContractCall) -> serde_json::Value {
        json!({
            "from": from.to_hex(),
            "to": self.contract.to_hex(),
            "data": encode_hex(&abi::encode_call(call)),
        })
    }

    fn receipt_from_rpc(&self, receipt: RpcReceipt) -> Result<TxReceipt, RegistryError> {
        let mut events = Vec::new();
        for log in receipt.logs.iter().filter(|log| log.is_from(&self.contract)) {
            match log.decode() {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Skipping undecodable receipt log"),
            }
        }

        Ok(TxReceipt {
            tx_hash: TxHash::from_str(&receipt.transaction_hash)
                .map_err(|err| RegistryError::Decode(err.to_string()))?,
            block_number: parse_hex_u64(&receipt.block_number)?,
            success: receipt.status.as_deref().map_or(true, |status| status == "0x1"),
            events,
        })
    }
}

/// Map a failed `getDocument` call to `TokenNotFound` when the contract says so.
fn document_error(token_id: TokenId, err: RegistryError) -> RegistryError {
    match &err {
        RegistryError::Rpc { message, .. } if is_nonexistent_token(message) => {
            RegistryError::TokenNotFound(token_id)
        }
        _ => err,
    }
}

#[async_trait]
impl RegistryReader for JsonRpcClient {
    async fn get_document(&self, token_id: TokenId) -> Result<DocumentRecord, RegistryError> {
        let params = (
            json!({
                "to": self.contract.to_hex(),
                "data": encode_hex(&abi::encode_get_document(token_id)),
            }),
            "latest",
        );
        let result: String = self
            .call("eth_call", params)
            .await
            .map_err(|err| document_error(token_id, err))?;
        abi::decode_document(token_id, &decode_hex(&result)?)
    }

    async fn completed_transfers(&self) -> Result<Vec<CompletedTransfer>, RegistryError> {
        let filter = json!({
            "address": self.contract.to_hex(),
            "fromBlock": "earliest",
            "toBlock": "latest",
            "topics": [encode_hex(&abi::event_topic(abi::TRANSFER_COMPLETED))],
        });
        let logs: Vec<RpcLog> = self.call("eth_getLogs", (filter,)).await?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in logs.iter().filter(|log| !log.removed) {
            let Some(meta) = log.meta() else {
                continue;
            };
            if let Some(ContractEvent::TransferCompleted { token_id, from, to }) = log.decode()? {
                transfers.push(CompletedTransfer {
                    token_id,
                    from,
                    to,
                    meta,
                });
            }
        }
        Ok(transfers)
    }
}

#[async_trait]
impl RegistryWriter for JsonRpcClient {
    async fn estimate_gas(&self, from: Address, call: &ContractCall) -> Result<u64, RegistryError> {
        let result: String = self
            .call("eth_estimateGas", (self.transaction(from, call),))
            .await?;
        parse_hex_u64(&result)
    }

    async fn send_transaction(
        &self,
        from: Address,
        call: &ContractCall,
        gas_limit: u64,
    ) -> Result<TxHash, RegistryError> {
        let mut tx = self.transaction(from, call);
        tx["gas"] = json!(format!("{gas_limit:#x}"));
        let result: String = self.call("eth_sendTransaction", (tx,)).await?;
        TxHash::from_str(&result).map_err(|err| RegistryError::Decode(err.to_string()))
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, RegistryError> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .call_optional("eth_getTransactionReceipt", (tx_hash.to_hex(),))
                .await?;
            if let Some(receipt) = receipt {
                return self.receipt_from_rpc(receipt);
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcClient {
    async fn request_accounts(&self) -> Result<Vec<Address>, RegistryError> {
        let accounts: Vec<String> = self
            .call("eth_requestAccounts", Vec::<()>::new())
            .await?;
        accounts
            .iter()
            .map(|account| Address::from_str(account).map_err(RegistryError::from))
            .collect()
    }

    async fn chain_id(&self) -> Result<u64, RegistryError> {
        let result: String = self.call("eth_chainId", Vec::<()>::new()).await?;
        parse_hex_u64(&result)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), RegistryError> {
        let params = (json!({ "chainId": format!("{chain_id:#x}") }),);
        self.call_optional::<_, serde_json::Value>("wallet_switchEthereumChain", params)
            .await
            .map(|_| ())
    }

    async fn add_chain(&self, chain: &ChainParams) -> Result<(), RegistryError> {
        self.call_optional::<_, serde_json::Value>(
            "wallet_addEthereumChain",
            (chain.to_rpc_param(),),
        )
        .await
        .map(|_| ())
    }
}

/// Parse hex string to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, RegistryError> {
    let digits = s.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|err| RegistryError::Decode(format!("bad hex number {s}: {err}")))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, RegistryError> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|err| RegistryError::Decode(format!("bad hex data: {err}")))
}

fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
