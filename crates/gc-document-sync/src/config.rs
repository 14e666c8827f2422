//! # Registry Client Configuration
//!
//! Deployment settings (contract, chain, endpoints, storage) and sync loop
//! tuning.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::Address;

use crate::domain::{RegistryError, ScanBounds};

/// Registry contract on Sepolia.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x89295696588DcbB3C40cf8f10af2398Fdf7585FA";

/// Sepolia chain id.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Native currency description passed to `wallet_addEthereumChain`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Display name.
    pub name: String,
    /// Ticker.
    pub symbol: String,
    /// Decimals.
    pub decimals: u8,
}

/// Chain description passed to `wallet_addEthereumChain`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Numeric chain id.
    pub chain_id: u64,
    /// Display name.
    pub chain_name: String,
    /// Native currency.
    pub native_currency: NativeCurrency,
    /// RPC endpoints.
    pub rpc_urls: Vec<String>,
    /// Block explorers.
    pub block_explorer_urls: Vec<String>,
}

impl ChainParams {
    /// Chain id in the `0x`-prefixed form wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// The `wallet_addEthereumChain` parameter object.
    pub fn to_rpc_param(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }
}

/// Deployment configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry contract address.
    pub contract_address: Address,

    /// Authority role address. Unset means nobody holds the role.
    pub authority_address: Option<Address>,

    /// Government approver address. Unset means nobody holds the role.
    pub government_address: Option<Address>,

    /// Target chain id.
    pub chain_id: u64,

    /// Target chain display name.
    pub chain_name: String,

    /// Native currency of the target chain.
    pub native_currency: NativeCurrency,

    /// JSON-RPC endpoint (wallet or node).
    pub rpc_url: String,

    /// WebSocket endpoint for log subscriptions.
    pub ws_url: Option<String>,

    /// Block explorer base URL.
    pub explorer_url: String,

    /// Pinata bearer token.
    #[serde(skip_serializing)]
    pub pinata_jwt: Option<String>,

    /// Pinata upload endpoint.
    pub pinata_endpoint: String,

    /// IPFS gateway base URL.
    pub ipfs_gateway: String,

    /// File holding the last connected account.
    pub session_file: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS
                .parse()
                .unwrap_or(Address::ZERO),
            authority_address: None,
            government_address: None,
            chain_id: SEPOLIA_CHAIN_ID,
            chain_name: "Sepolia".to_string(),
            native_currency: NativeCurrency {
                name: "SepoliaETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_url: "http://127.0.0.1:8545".to_string(),
            ws_url: None,
            explorer_url: "https://sepolia.etherscan.io".to_string(),
            pinata_jwt: None,
            pinata_endpoint: "https://api.pinata.cloud/pinning/pinFileToIPFS".to_string(),
            ipfs_gateway: "https://gateway.pinata.cloud".to_string(),
            session_file: default_session_file(),
        }
    }
}

impl RegistryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GOVCHAIN_CONTRACT_ADDRESS`: Registry contract (default: Sepolia deployment)
    /// - `GOVCHAIN_AUTHORITY_ADDRESS`: Authority role address (default: unset)
    /// - `GOVCHAIN_GOVT_ADDRESS`: Government approver address (default: unset)
    /// - `GOVCHAIN_CHAIN_ID`: Target chain id (default: 11155111)
    /// - `GOVCHAIN_CHAIN_NAME`: Target chain name (default: Sepolia)
    /// - `GOVCHAIN_RPC_URL`: JSON-RPC endpoint (default: http://127.0.0.1:8545)
    /// - `GOVCHAIN_WS_URL`: WebSocket endpoint (default: unset, events disabled)
    /// - `GOVCHAIN_EXPLORER_URL`: Block explorer (default: Sepolia Etherscan)
    /// - `GOVCHAIN_PINATA_JWT`: Pinata bearer token (default: unset)
    /// - `GOVCHAIN_PINATA_ENDPOINT`, `GOVCHAIN_IPFS_GATEWAY`: storage endpoints
    /// - `GOVCHAIN_SESSION_FILE`: Saved account file
    pub fn from_env() -> Result<Self, RegistryError> {
        let defaults = Self::default();
        Ok(Self {
            contract_address: env_address("GOVCHAIN_CONTRACT_ADDRESS")?
                .unwrap_or(defaults.contract_address),
            authority_address: env_address("GOVCHAIN_AUTHORITY_ADDRESS")?,
            government_address: env_address("GOVCHAIN_GOVT_ADDRESS")?,
            chain_id: env::var("GOVCHAIN_CHAIN_ID")
                .ok()
                .and_then(|v| parse_chain_id(&v))
                .unwrap_or(defaults.chain_id),
            chain_name: env::var("GOVCHAIN_CHAIN_NAME").unwrap_or(defaults.chain_name),
            native_currency: defaults.native_currency,
            rpc_url: env::var("GOVCHAIN_RPC_URL").unwrap_or(defaults.rpc_url),
            ws_url: env::var("GOVCHAIN_WS_URL").ok().filter(|v| !v.is_empty()),
            explorer_url: env::var("GOVCHAIN_EXPLORER_URL").unwrap_or(defaults.explorer_url),
            pinata_jwt: env::var("GOVCHAIN_PINATA_JWT").ok().filter(|v| !v.is_empty()),
            pinata_endpoint: env::var("GOVCHAIN_PINATA_ENDPOINT")
                .unwrap_or(defaults.pinata_endpoint),
            ipfs_gateway: env::var("GOVCHAIN_IPFS_GATEWAY").unwrap_or(defaults.ipfs_gateway),
            session_file: env::var("GOVCHAIN_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_file),
        })
    }

    /// Parameters for the network-switch flow.
    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            chain_id: self.chain_id,
            chain_name: self.chain_name.clone(),
            native_currency: self.native_currency.clone(),
            rpc_urls: vec![self.rpc_url.clone()],
            block_explorer_urls: vec![self.explorer_url.clone()],
        }
    }

    /// Explorer link for a transaction.
    pub fn tx_url(&self, tx_hash: &shared_types::TxHash) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Sync loop and gateway tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Probe window and miss tolerance.
    pub bounds: ScanBounds,

    /// Rescan interval while transfers or actions are pending.
    pub poll_interval: Duration,

    /// Give up waiting for a receipt after this long.
    pub confirmation_timeout: Duration,

    /// Receipt polling interval.
    pub receipt_poll_interval: Duration,

    /// Cached `ipfs_hash` entries for history enrichment.
    pub history_cache_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bounds: ScanBounds::default(),
            poll_interval: Duration::from_secs(3),
            confirmation_timeout: Duration::from_secs(180),
            receipt_poll_interval: Duration::from_secs(2),
            history_cache_size: 256,
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (short timers).
    pub fn for_testing() -> Self {
        Self {
            bounds: ScanBounds::default(),
            poll_interval: Duration::from_millis(50),
            confirmation_timeout: Duration::from_secs(2),
            receipt_poll_interval: Duration::from_millis(10),
            history_cache_size: 16,
        }
    }
}

fn env_address(key: &str) -> Result<Option<Address>, RegistryError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.parse()?)),
        _ => Ok(None),
    }
}

fn parse_chain_id(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn default_session_file() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join(".govchain")
        .join("session.json")
}
