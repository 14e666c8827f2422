//! Shared test fixtures.
//!
//! A [`Deployment`] is one registry contract plus one event bus. Each
//! [`Party`] is a client for one account, wired to the deployment's mocks.

use std::sync::Arc;
use std::time::Duration;

use gc_document_sync::{
    DocumentSnapshot, MemorySessionStore, MockContentStore, MockRegistry, MockWallet, Notice,
    RegistryClient, RegistryConfig, RegistryPorts, SyncConfig, SEPOLIA_CHAIN_ID,
};
use shared_bus::InMemoryEventBus;
use shared_types::Address;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Government approver of every test deployment.
pub const GOVT: Address = Address([0x90; 20]);

/// Authority account of every test deployment.
pub const AUTHORITY: Address = Address([0xa0; 20]);

/// How long a flow may take before the test fails.
pub const FLOW_TIMEOUT: Duration = Duration::from_secs(5);

/// A plain account distinguished by `n`.
pub fn account(n: u8) -> Address {
    Address([n; 20])
}

/// One deployed registry shared by every party.
pub struct Deployment {
    pub bus: Arc<InMemoryEventBus>,
    pub registry: Arc<MockRegistry>,
    pub config: RegistryConfig,
}

impl Deployment {
    pub fn new() -> Self {
        Self::build(Duration::ZERO)
    }

    /// Every transaction takes `delay` to confirm.
    pub fn with_confirmation_delay(delay: Duration) -> Self {
        Self::build(delay)
    }

    fn build(delay: Duration) -> Self {
        let bus = Arc::new(InMemoryEventBus::new());
        let registry = Arc::new(
            MockRegistry::new(GOVT)
                .with_bus(bus.clone())
                .with_confirmation_delay(delay),
        );
        let config = RegistryConfig {
            government_address: Some(GOVT),
            authority_address: Some(AUTHORITY),
            ..RegistryConfig::default()
        };
        Self {
            bus,
            registry,
            config,
        }
    }

    /// A client for `account` whose wallet is already on the right chain.
    pub fn party(&self, account: Address) -> Party {
        let wallet = Arc::new(MockWallet::new(vec![account], SEPOLIA_CHAIN_ID));
        self.party_with(account, wallet, Arc::new(MemorySessionStore::default()))
    }

    /// A client for `account` with caller-provided wallet and session store.
    pub fn party_with(
        &self,
        account: Address,
        wallet: Arc<MockWallet>,
        store: Arc<MemorySessionStore>,
    ) -> Party {
        let content = Arc::new(MockContentStore::default());
        let ports = RegistryPorts {
            reader: self.registry.clone(),
            writer: self.registry.clone(),
            wallet: wallet.clone(),
            session_store: store.clone(),
            content_store: Some(content.clone()),
        };
        let client = RegistryClient::new(
            self.config.clone(),
            SyncConfig::for_testing(),
            ports,
            self.bus.clone(),
        );
        Party {
            account,
            wallet,
            store,
            content,
            client,
        }
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new()
    }
}

/// A client plus the mocks behind it.
pub struct Party {
    pub account: Address,
    pub wallet: Arc<MockWallet>,
    pub store: Arc<MemorySessionStore>,
    pub content: Arc<MockContentStore>,
    pub client: RegistryClient,
}

/// Wait for a snapshot matching `predicate`.
pub async fn wait_for_snapshot<F>(client: &RegistryClient, predicate: F) -> DocumentSnapshot
where
    F: FnMut(&DocumentSnapshot) -> bool,
{
    let mut rx = client.sync().subscribe_snapshots();
    let snapshot = timeout(FLOW_TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("sync loop stopped")
        .clone();
    snapshot
}

/// Wait for a completed scan for `viewer`.
pub async fn settled(client: &RegistryClient, viewer: Address) -> DocumentSnapshot {
    wait_for_snapshot(client, |s| {
        s.viewer == Some(viewer) && s.scanned_at.is_some() && !s.refreshing
    })
    .await
}

/// Receive notices until one matches `predicate`.
pub async fn next_notice<F>(rx: &mut broadcast::Receiver<Notice>, mut predicate: F) -> Notice
where
    F: FnMut(&Notice) -> bool,
{
    timeout(FLOW_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(notice) if predicate(&notice) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("notice channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for notice")
}
