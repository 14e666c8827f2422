//! # Inbound Ports
//!
//! API trait defining what the registry client can do.

use async_trait::async_trait;
use shared_types::{Address, DocumentRecord, TokenId};

use crate::domain::{
    DocumentSnapshot, IncomingState, PropertyDetails, RegistryError, TransferHistoryEntry,
    TxReceipt,
};

/// Document registry API - inbound port.
#[async_trait]
pub trait DocumentRegistryApi: Send + Sync {
    /// Connect the wallet, switching networks if needed.
    async fn connect(&self) -> Result<Address, RegistryError>;

    /// Reconnect the saved account, if there is one.
    async fn restore(&self) -> Result<Option<Address>, RegistryError>;

    /// Drop the session and forget the saved account.
    fn disconnect(&self) -> Result<(), RegistryError>;

    /// Document list as of the last scan.
    fn snapshot(&self) -> DocumentSnapshot;

    /// Ask the sync loop for a rescan.
    fn refresh(&self);

    /// Transfers addressed to the viewer, with their status.
    async fn incoming_transfers(&self)
        -> Result<Vec<(DocumentRecord, IncomingState)>, RegistryError>;

    /// Completed transfers the viewer may see, newest first.
    async fn transfer_history(&self) -> Result<Vec<TransferHistoryEntry>, RegistryError>;

    /// Propose `recipient` as the next owner of `token_id`.
    async fn request_transfer(
        &self,
        token_id: TokenId,
        recipient: &str,
    ) -> Result<TxReceipt, RegistryError>;

    /// Owner approval of the pending transfer.
    async fn approve_as_owner(&self, token_id: TokenId) -> Result<TxReceipt, RegistryError>;

    /// Government approval of the pending transfer.
    async fn approve_as_government(&self, token_id: TokenId) -> Result<TxReceipt, RegistryError>;

    /// Pin `bytes` and register them as a new document.
    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<TokenId, RegistryError>;

    /// Register property details.
    async fn register_property(&self, details: PropertyDetails)
        -> Result<TxReceipt, RegistryError>;
}
