//! # GovChain Document Sync
//!
//! Client-side view of the GovChain document registry contract.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Keep an account's view of registered documents in step with the chain
//! and drive the two-party transfer workflow:
//! - Probe the contract for documents the account may see
//! - Rescan on contract events, polling only while transfers are pending
//! - Submit transfer requests and approvals with buffered gas
//!
//! ## Visibility Rules
//!
//! | Viewer | Sees |
//! |--------|------|
//! | Owner | Documents it holds |
//! | Recipient | Documents with a transfer pending to it |
//! | Government / Authority | Every existing document |
//! | Anyone | Documents awaiting government approval |
//!
//! ## Module Structure
//!
//! ```text
//! gc-document-sync/
//! ├── domain/          # Core types: DocumentView, DocumentSnapshot, errors
//! ├── algorithms/      # Scanner, role classifier, history selection
//! ├── ports/           # API trait (inbound) + dependency traits (outbound)
//! ├── application/     # Session, sync loop, gateway, RegistryClient
//! ├── adapters/        # JSON-RPC, WebSocket logs, Pinata, session file
//! ├── metrics.rs       # Prometheus instrumentation
//! └── config.rs        # RegistryConfig, SyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;

// Re-exports
pub use adapters::{gateway_url, FileSessionStore, JsonRpcClient, LogSubscriber, PinataStore};
pub use algorithms::{classify, classify_str, is_incoming, is_visible, scan_documents, select_history};
pub use application::{
    ActiveSession, HistoryService, InFlightActions, Notifier, RegistryClient, RegistryPorts,
    Session, SessionState, SyncHandle, TransferGateway,
};
pub use config::{ChainParams, RegistryConfig, SyncConfig, DEFAULT_CONTRACT_ADDRESS, SEPOLIA_CHAIN_ID};
pub use domain::{
    ActionKind, CompletedTransfer, ContractCall, DocumentActions, DocumentSnapshot, DocumentView,
    ErrorKind, HaltReason, HistoryRelation, IncomingState, Notice, NoticeKind, PropertyDetails,
    RefreshReason, RegistryError, Role, RoleSet, ScanBounds, ScanOutcome, ScanReport, ScanView,
    TransferHistoryEntry, TxReceipt, with_gas_buffer,
};
pub use ports::{
    ContentStore, DocumentRegistryApi, RegistryReader, RegistryWriter, SessionStore,
    WalletProvider, MemorySessionStore, MockContentStore, MockRegistry, MockWallet,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
