//! # Registry Client
//!
//! Composition root: wires the session, sync loop, gateway and history
//! service over one set of outbound ports.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::InMemoryEventBus;
use shared_types::{Address, DocumentRecord, TokenId};
use tracing::warn;

use super::gateway::{InFlightActions, TransferGateway};
use super::history::HistoryService;
use super::notifications::Notifier;
use super::session::Session;
use super::sync_loop::{spawn_sync_loop, Refresher, SyncHandle, SyncInputs};
use crate::algorithms::scan_documents;
use crate::config::{RegistryConfig, SyncConfig};
use crate::domain::{
    DocumentSnapshot, IncomingState, PropertyDetails, RegistryError, ScanView,
    TransferHistoryEntry, TxReceipt,
};
use crate::ports::{
    ContentStore, DocumentRegistryApi, RegistryReader, RegistryWriter, SessionStore,
    WalletProvider,
};

/// Outbound ports the client runs against.
pub struct RegistryPorts {
    /// Contract reads.
    pub reader: Arc<dyn RegistryReader>,
    /// Contract writes.
    pub writer: Arc<dyn RegistryWriter>,
    /// Wallet.
    pub wallet: Arc<dyn WalletProvider>,
    /// Saved account.
    pub session_store: Arc<dyn SessionStore>,
    /// Pinning service; uploads fail without one.
    pub content_store: Option<Arc<dyn ContentStore>>,
}

/// The registry client.
pub struct RegistryClient {
    config: RegistryConfig,
    sync_config: SyncConfig,
    reader: Arc<dyn RegistryReader>,
    content_store: Option<Arc<dyn ContentStore>>,
    bus: Arc<InMemoryEventBus>,
    session: Arc<Session>,
    gateway: TransferGateway,
    history: HistoryService,
    sync: SyncHandle,
}

impl RegistryClient {
    /// Build the client and start its sync loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: RegistryConfig,
        sync_config: SyncConfig,
        ports: RegistryPorts,
        bus: Arc<InMemoryEventBus>,
    ) -> Self {
        let session = Arc::new(Session::new(ports.wallet, ports.session_store, &config));
        let notifier = Notifier::default();
        let in_flight = InFlightActions::new();
        let (refresher, refresh_rx) = Refresher::channel();

        let sync = spawn_sync_loop(
            SyncInputs {
                reader: ports.reader.clone(),
                session: session.subscribe(),
                bus: Some(bus.clone()),
                in_flight: in_flight.clone(),
                notifier: notifier.clone(),
                refresher: refresher.clone(),
                refresh_rx,
            },
            sync_config.clone(),
        );
        let gateway = TransferGateway::new(
            ports.writer,
            session.clone(),
            in_flight,
            notifier,
            refresher,
            sync_config.confirmation_timeout,
        );
        let history = HistoryService::new(ports.reader.clone(), sync_config.history_cache_size);

        Self {
            config,
            sync_config,
            reader: ports.reader,
            content_store: ports.content_store,
            bus,
            session,
            gateway,
            history,
            sync,
        }
    }

    /// Deployment configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Wallet session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Action gateway.
    pub fn gateway(&self) -> &TransferGateway {
        &self.gateway
    }

    /// Sync loop handle.
    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Contract event bus.
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Stop the sync loop.
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
    }

    async fn recently_completed(&self, viewer: &Address) -> BTreeSet<TokenId> {
        match self.reader.completed_transfers().await {
            Ok(transfers) => transfers
                .into_iter()
                .filter(|transfer| transfer.to == *viewer)
                .map(|transfer| transfer.token_id)
                .collect(),
            Err(err) => {
                warn!(error = %err, "Could not read completed transfers");
                BTreeSet::new()
            }
        }
    }
}

#[async_trait]
impl DocumentRegistryApi for RegistryClient {
    async fn connect(&self) -> Result<Address, RegistryError> {
        self.session.connect().await.map(|active| active.account)
    }

    async fn restore(&self) -> Result<Option<Address>, RegistryError> {
        let restored = self.session.restore().await?;
        Ok(restored.map(|active| active.account))
    }

    fn disconnect(&self) -> Result<(), RegistryError> {
        self.session.disconnect()
    }

    fn snapshot(&self) -> DocumentSnapshot {
        self.sync.snapshot()
    }

    fn refresh(&self) {
        self.sync.refresh();
    }

    async fn incoming_transfers(
        &self,
    ) -> Result<Vec<(DocumentRecord, IncomingState)>, RegistryError> {
        let active = self.session.require_active()?;
        let view = ScanView::Incoming {
            recently_completed: self.recently_completed(&active.account).await,
        };
        let outcome = scan_documents(
            self.reader.as_ref(),
            &active.account,
            active.roles,
            &view,
            &self.sync_config.bounds,
        )
        .await;
        Ok(outcome
            .records
            .into_iter()
            .map(|record| {
                let state = IncomingState::of(&record);
                (record, state)
            })
            .collect())
    }

    async fn transfer_history(&self) -> Result<Vec<TransferHistoryEntry>, RegistryError> {
        let active = self.session.require_active()?;
        self.history.history_for(&active.account, active.roles).await
    }

    async fn request_transfer(
        &self,
        token_id: TokenId,
        recipient: &str,
    ) -> Result<TxReceipt, RegistryError> {
        self.gateway.request_transfer(token_id, recipient).await
    }

    async fn approve_as_owner(&self, token_id: TokenId) -> Result<TxReceipt, RegistryError> {
        self.gateway.approve_as_owner(token_id).await
    }

    async fn approve_as_government(&self, token_id: TokenId) -> Result<TxReceipt, RegistryError> {
        self.gateway.approve_as_government(token_id).await
    }

    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<TokenId, RegistryError> {
        let store = self.content_store.as_ref().ok_or_else(|| {
            RegistryError::Storage("no content store configured (set GOVCHAIN_PINATA_JWT)".into())
        })?;
        self.gateway
            .upload_file(store.as_ref(), file_name, bytes)
            .await
    }

    async fn register_property(
        &self,
        details: PropertyDetails,
    ) -> Result<TxReceipt, RegistryError> {
        self.gateway.register_property(details).await
    }
}
