//! # Transfer Action Gateway
//!
//! Mutating contract calls: estimate gas, submit, wait for the receipt, then
//! ask the sync loop to rescan.
//!
//! At most one action per token is in flight. Actions on distinct tokens run
//! concurrently; a second submission for a busy token fails immediately with
//! `ActionInFlight`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use shared_types::{Address, TokenId};
use tokio::sync::watch;
use tracing::{error, info};

use super::notifications::Notifier;
use super::session::Session;
use super::sync_loop::Refresher;
use crate::domain::{
    with_gas_buffer, ActionKind, ContractCall, ErrorKind, Notice, PropertyDetails,
    RefreshReason, RegistryError, TxReceipt,
};
use crate::metrics;
use crate::ports::{ContentStore, RegistryWriter};

/// Actions currently being submitted or confirmed.
#[derive(Clone)]
pub struct InFlightActions {
    tokens: Arc<DashSet<TokenId>>,
    untracked: Arc<AtomicUsize>,
    count: Arc<watch::Sender<usize>>,
}

impl InFlightActions {
    /// No actions in flight.
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            tokens: Arc::new(DashSet::new()),
            untracked: Arc::new(AtomicUsize::new(0)),
            count: Arc::new(count),
        }
    }

    /// Mark `token_id` busy, or fail if it already is.
    pub fn try_begin(&self, token_id: TokenId) -> Result<InFlightGuard, RegistryError> {
        if !self.tokens.insert(token_id) {
            return Err(RegistryError::ActionInFlight(token_id));
        }
        self.publish_count();
        Ok(InFlightGuard {
            actions: self.clone(),
            token_id: Some(token_id),
        })
    }

    /// Track an action that is not tied to a token (uploads, registrations).
    pub fn begin_untracked(&self) -> InFlightGuard {
        self.untracked.fetch_add(1, Ordering::SeqCst);
        self.publish_count();
        InFlightGuard {
            actions: self.clone(),
            token_id: None,
        }
    }

    /// True if an action for `token_id` is in flight.
    pub fn contains(&self, token_id: TokenId) -> bool {
        self.tokens.contains(&token_id)
    }

    /// Busy tokens, ascending.
    pub fn tokens(&self) -> Vec<TokenId> {
        let mut tokens: Vec<_> = self.tokens.iter().map(|entry| *entry).collect();
        tokens.sort();
        tokens
    }

    /// Number of actions in flight.
    pub fn len(&self) -> usize {
        self.tokens.len() + self.untracked.load(Ordering::SeqCst)
    }

    /// True if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the in-flight count.
    pub fn watch(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    fn publish_count(&self) {
        self.count.send_replace(self.len());
    }
}

impl Default for InFlightActions {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears its in-flight marker when dropped.
pub struct InFlightGuard {
    actions: InFlightActions,
    token_id: Option<TokenId>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        match self.token_id {
            Some(token_id) => {
                self.actions.tokens.remove(&token_id);
            }
            None => {
                self.actions.untracked.fetch_sub(1, Ordering::SeqCst);
            }
        }
        self.actions.publish_count();
    }
}

/// Submits registry actions for the connected account.
pub struct TransferGateway {
    writer: Arc<dyn RegistryWriter>,
    session: Arc<Session>,
    in_flight: InFlightActions,
    notifier: Notifier,
    refresher: Refresher,
    confirmation_timeout: Duration,
}

impl TransferGateway {
    /// Create a gateway.
    pub fn new(
        writer: Arc<dyn RegistryWriter>,
        session: Arc<Session>,
        in_flight: InFlightActions,
        notifier: Notifier,
        refresher: Refresher,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            writer,
            session,
            in_flight,
            notifier,
            refresher,
            confirmation_timeout,
        }
    }

    /// In-flight markers shared with the sync loop.
    pub fn in_flight(&self) -> &InFlightActions {
        &self.in_flight
    }

    /// `requestTransfer(tokenId, recipient)`.
    pub async fn request_transfer(
        &self,
        token_id: TokenId,
        recipient: &str,
    ) -> Result<TxReceipt, RegistryError> {
        let recipient = match parse_recipient(recipient) {
            Ok(recipient) => recipient,
            Err(err) => return Err(self.fail(ActionKind::RequestTransfer, Some(token_id), err)),
        };
        self.execute(ContractCall::RequestTransfer {
            token_id,
            recipient,
        })
        .await
    }

    /// `approveTransferAsOwner(tokenId)`.
    pub async fn approve_as_owner(&self, token_id: TokenId) -> Result<TxReceipt, RegistryError> {
        self.execute(ContractCall::ApproveAsOwner(token_id)).await
    }

    /// `approveTransferAsGovt(tokenId)`.
    pub async fn approve_as_government(
        &self,
        token_id: TokenId,
    ) -> Result<TxReceipt, RegistryError> {
        self.execute(ContractCall::ApproveAsGovernment(token_id))
            .await
    }

    /// `uploadDocument(ipfsHash)`. Returns the id the contract assigned.
    pub async fn upload_document(&self, ipfs_hash: &str) -> Result<TokenId, RegistryError> {
        let receipt = self
            .execute(ContractCall::UploadDocument {
                ipfs_hash: ipfs_hash.to_string(),
            })
            .await?;
        created_token(&receipt)
    }

    /// Pin `bytes` through `store`, then register the returned locator.
    pub async fn upload_file(
        &self,
        store: &dyn ContentStore,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<TokenId, RegistryError> {
        if let Err(err) = self.session.require_active() {
            return Err(self.fail(ActionKind::UploadDocument, None, err));
        }
        let locator = {
            let _pinning = self.in_flight.begin_untracked();
            match store.upload(file_name, bytes).await {
                Ok(locator) => locator,
                Err(err) => return Err(self.fail(ActionKind::UploadDocument, None, err)),
            }
        };
        info!(file = file_name, locator = %locator, "File pinned");
        self.upload_document(&locator).await
    }

    /// `registerProperty(type, location, area, value, description)`.
    pub async fn register_property(
        &self,
        details: PropertyDetails,
    ) -> Result<TxReceipt, RegistryError> {
        self.execute(ContractCall::RegisterProperty(details)).await
    }

    async fn execute(&self, call: ContractCall) -> Result<TxReceipt, RegistryError> {
        let action = call.kind();
        let token_id = call.token_id();

        let account = match self.session.require_active() {
            Ok(active) => active.account,
            Err(err) => return Err(self.fail(action, token_id, err)),
        };
        let _guard = match token_id {
            Some(token_id) => match self.in_flight.try_begin(token_id) {
                Ok(guard) => guard,
                Err(err) => return Err(self.fail(action, Some(token_id), err)),
            },
            None => self.in_flight.begin_untracked(),
        };

        let outcome = self.submit(account, &call).await.and_then(|receipt| {
            // An upload is only useful if we learn the id it was given.
            if matches!(call, ContractCall::UploadDocument { .. }) {
                created_token(&receipt)?;
            }
            Ok(receipt)
        });
        match outcome {
            Ok(receipt) => {
                info!(
                    action = action.label(),
                    token_id = ?token_id,
                    account = %account,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "Action confirmed"
                );
                metrics::record_action(action.label(), "confirmed");
                self.notifier
                    .notify(Notice::success(token_id, success_message(&call)));
                self.refresher.request(RefreshReason::ActionConfirmed);
                Ok(receipt)
            }
            Err(err) => Err(self.fail(action, token_id, err)),
        }
    }

    async fn submit(&self, from: Address, call: &ContractCall) -> Result<TxReceipt, RegistryError> {
        let estimate = self.writer.estimate_gas(from, call).await?;
        let gas_limit = with_gas_buffer(estimate);
        let tx_hash = self.writer.send_transaction(from, call, gas_limit).await?;
        info!(
            action = call.kind().label(),
            tx_hash = %tx_hash,
            gas_limit,
            "Transaction submitted, waiting for confirmation"
        );

        let receipt = tokio::time::timeout(
            self.confirmation_timeout,
            self.writer.wait_for_confirmation(tx_hash),
        )
        .await
        .map_err(|_| RegistryError::ConfirmationTimeout(tx_hash))??;

        if !receipt.success {
            return Err(RegistryError::Reverted {
                tx_hash,
                reason: String::new(),
            });
        }
        Ok(receipt)
    }

    fn fail(
        &self,
        action: ActionKind,
        token_id: Option<TokenId>,
        err: RegistryError,
    ) -> RegistryError {
        let outcome = match err.kind() {
            ErrorKind::Provider | ErrorKind::Precondition => "rejected",
            _ => "failed",
        };
        error!(
            action = action.label(),
            token_id = ?token_id,
            error = %err,
            outcome,
            "Action failed"
        );
        metrics::record_action(action.label(), outcome);
        self.notifier
            .notify(Notice::error(token_id, err.user_message()));
        err
    }
}

fn created_token(receipt: &TxReceipt) -> Result<TokenId, RegistryError> {
    receipt.created_token().ok_or_else(|| {
        RegistryError::Decode(format!(
            "no DocumentCreated log in receipt {}",
            receipt.tx_hash
        ))
    })
}

fn parse_recipient(input: &str) -> Result<Address, RegistryError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(RegistryError::MissingRecipient);
    }
    let recipient: Address = input
        .parse()
        .map_err(|_| RegistryError::InvalidAddress(input.to_string()))?;
    if recipient.is_zero() {
        return Err(RegistryError::InvalidAddress(input.to_string()));
    }
    Ok(recipient)
}

fn success_message(call: &ContractCall) -> String {
    match call {
        ContractCall::RequestTransfer {
            token_id,
            recipient,
        } => format!(
            "Transfer of document {token_id} to {} requested",
            recipient.short()
        ),
        ContractCall::ApproveAsOwner(token_id) => {
            format!("Owner approval for document {token_id} confirmed")
        }
        ContractCall::ApproveAsGovernment(token_id) => {
            format!("Government approval for document {token_id} confirmed")
        }
        ContractCall::UploadDocument { .. } => "Document uploaded".to_string(),
        ContractCall::RegisterProperty(details) => {
            format!("Property at {} registered", details.location)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::domain::NoticeKind;
    use crate::ports::{MemorySessionStore, MockContentStore, MockRegistry, MockWallet};
    use async_trait::async_trait;
    use primitive_types::U256;
    use shared_types::TxHash;
    use tokio::sync::mpsc;

    const GOVT: Address = Address([9; 20]);

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    struct Fixture {
        registry: Arc<MockRegistry>,
        session: Arc<Session>,
        gateway: TransferGateway,
        notices: tokio::sync::broadcast::Receiver<Notice>,
        refreshes: mpsc::UnboundedReceiver<RefreshReason>,
    }

    async fn fixture(account: Address, registry: MockRegistry) -> Fixture {
        let registry = Arc::new(registry);
        let wallet = Arc::new(MockWallet::new(vec![account], 11_155_111));
        let config = RegistryConfig {
            government_address: Some(GOVT),
            ..RegistryConfig::default()
        };
        let session = Arc::new(Session::new(
            wallet,
            Arc::new(MemorySessionStore::default()),
            &config,
        ));
        session.connect().await.unwrap();

        let notifier = Notifier::default();
        let notices = notifier.subscribe();
        let (refresher, refreshes) = Refresher::channel();
        let gateway = TransferGateway::new(
            registry.clone(),
            session.clone(),
            InFlightActions::new(),
            notifier,
            refresher,
            Duration::from_secs(1),
        );
        Fixture {
            registry,
            session,
            gateway,
            notices,
            refreshes,
        }
    }

    #[tokio::test]
    async fn test_request_transfer_confirms_and_refreshes() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        let mut fx = fixture(addr(1), registry).await;

        let receipt = fx
            .gateway
            .request_transfer(token, &addr(2).to_hex())
            .await
            .unwrap();
        assert!(receipt.success);
        assert!(fx.registry.record(token).unwrap().is_pending_for(&addr(2)));
        assert_eq!(fx.refreshes.try_recv().unwrap(), RefreshReason::ActionConfirmed);
        assert_eq!(fx.notices.try_recv().unwrap().kind, NoticeKind::Success);
        assert!(fx.gateway.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_gas_limit_has_buffer() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        let fx = fixture(addr(1), registry).await;
        fx.gateway
            .request_transfer(token, &addr(2).to_hex())
            .await
            .unwrap();
        // Mock estimate is 50_000.
        assert_eq!(fx.registry.gas_limits(), vec![60_000]);
    }

    #[tokio::test]
    async fn test_estimate_failure_aborts_submission() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        let fx = fixture(addr(1), registry).await;
        // Nothing pending to approve.
        assert!(fx.gateway.approve_as_owner(token).await.is_err());
        assert!(fx.registry.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_recipient() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        let mut fx = fixture(addr(1), registry).await;

        let err = fx.gateway.request_transfer(token, "  ").await.unwrap_err();
        assert_eq!(err, RegistryError::MissingRecipient);
        assert_eq!(fx.notices.try_recv().unwrap().kind, NoticeKind::Error);

        let err = fx.gateway.request_transfer(token, "0x1234").await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAddress(_)));

        let err = fx
            .gateway
            .request_transfer(token, &Address::ZERO.to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAddress(_)));
        assert!(fx.registry.submitted().is_empty());
        assert!(fx.refreshes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_requires_connected_account() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        let fx = fixture(addr(1), registry).await;
        fx.session.disconnect().unwrap();

        let err = fx.gateway.approve_as_owner(token).await.unwrap_err();
        assert_eq!(err, RegistryError::NotConnected);
    }

    #[tokio::test]
    async fn test_user_rejection_clears_marker_only() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        registry.reject_next(RegistryError::UserRejected);
        let mut fx = fixture(addr(1), registry).await;

        let err = fx
            .gateway
            .request_transfer(token, &addr(2).to_hex())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::UserRejected);
        assert!(!fx.gateway.in_flight().contains(token));
        assert!(!fx.registry.record(token).unwrap().has_pending_transfer());
        assert!(fx.refreshes.try_recv().is_err());
        let notice = fx.notices.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.message.contains("rejected"));
    }

    #[tokio::test]
    async fn test_reverted_transaction_fails() {
        let registry = MockRegistry::new(GOVT);
        let token = registry.mint(addr(1), "ipfs://a");
        // Not the government account.
        let fx = fixture(addr(1), registry).await;
        let err = fx.gateway.approve_as_government(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_rejected() {
        let registry = MockRegistry::new(GOVT).with_confirmation_delay(Duration::from_millis(500));
        let first = registry.mint(addr(1), "ipfs://a");
        let second = registry.mint(addr(1), "ipfs://b");
        let fx = fixture(addr(1), registry).await;
        let recipient = addr(2).to_hex();

        let (a, b, c) = tokio::join!(
            fx.gateway.request_transfer(first, &recipient),
            fx.gateway.request_transfer(first, &recipient),
            fx.gateway.request_transfer(second, &recipient),
        );
        assert!(a.is_ok());
        assert_eq!(b.unwrap_err(), RegistryError::ActionInFlight(first));
        assert!(c.is_ok());
        assert_eq!(fx.registry.submitted().len(), 2);
        assert!(fx.gateway.in_flight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout() {
        let registry = MockRegistry::new(GOVT).with_confirmation_delay(Duration::from_secs(30));
        let token = registry.mint(addr(1), "ipfs://a");
        let fx = fixture(addr(1), registry).await;

        let err = fx
            .gateway
            .request_transfer(token, &addr(2).to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ConfirmationTimeout(_)));
        assert!(!fx.gateway.in_flight().contains(token));
    }

    #[tokio::test]
    async fn test_upload_file_returns_new_token() {
        let registry = MockRegistry::new(GOVT);
        registry.mint(addr(3), "ipfs://existing");
        let fx = fixture(addr(1), registry).await;
        let store = MockContentStore::default();

        let token = fx
            .gateway
            .upload_file(&store, "deed.pdf", b"deed".to_vec())
            .await
            .unwrap();
        assert_eq!(token, TokenId(2));
        let record = fx.registry.record(token).unwrap();
        assert_eq!(record.owner, addr(1));
        assert_eq!(store.get(&record.ipfs_hash), Some(b"deed".to_vec()));
    }

    /// Confirms transactions but loses their logs.
    struct LoglessWriter(Arc<MockRegistry>);

    #[async_trait]
    impl RegistryWriter for LoglessWriter {
        async fn estimate_gas(
            &self,
            from: Address,
            call: &ContractCall,
        ) -> Result<u64, RegistryError> {
            self.0.estimate_gas(from, call).await
        }

        async fn send_transaction(
            &self,
            from: Address,
            call: &ContractCall,
            gas_limit: u64,
        ) -> Result<TxHash, RegistryError> {
            self.0.send_transaction(from, call, gas_limit).await
        }

        async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, RegistryError> {
            let mut receipt = self.0.wait_for_confirmation(tx_hash).await?;
            receipt.events.clear();
            Ok(receipt)
        }
    }

    #[tokio::test]
    async fn test_upload_without_created_log_fails_once() {
        let mut fx = fixture(addr(1), MockRegistry::new(GOVT)).await;
        let (refresher, _refreshes) = Refresher::channel();
        let notifier = Notifier::default();
        let mut notices = notifier.subscribe();
        let gateway = TransferGateway::new(
            Arc::new(LoglessWriter(fx.registry.clone())),
            fx.session.clone(),
            InFlightActions::new(),
            notifier,
            refresher,
            Duration::from_secs(1),
        );

        let err = gateway.upload_document("ipfs://QmLost").await.unwrap_err();
        assert!(matches!(err, RegistryError::Decode(_)));
        assert_eq!(notices.try_recv().unwrap().kind, NoticeKind::Error);
        assert!(notices.try_recv().is_err());
        assert!(gateway.in_flight().is_empty());
        assert!(fx.notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_upload_storage_failure() {
        let fx = fixture(addr(1), MockRegistry::new(GOVT)).await;
        let store = MockContentStore::failing();
        let err = fx
            .gateway
            .upload_file(&store, "deed.pdf", vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert!(fx.registry.submitted().is_empty());
        assert!(fx.gateway.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_register_property() {
        let fx = fixture(addr(1), MockRegistry::new(GOVT)).await;
        let receipt = fx
            .gateway
            .register_property(PropertyDetails {
                property_type: "residential".into(),
                location: "12 Main St".into(),
                area: U256::from(1200),
                value: U256::from(250_000),
                description: "Two storey house".into(),
            })
            .await
            .unwrap();
        assert!(receipt.success);
        assert!(matches!(
            fx.registry.submitted()[0],
            ContractCall::RegisterProperty(_)
        ));
    }

    #[test]
    fn test_in_flight_guard_releases() {
        let actions = InFlightActions::new();
        let watch = actions.watch();
        {
            let _guard = actions.try_begin(TokenId(1)).unwrap();
            assert!(actions.try_begin(TokenId(1)).is_err());
            let _other = actions.try_begin(TokenId(2)).unwrap();
            let _upload = actions.begin_untracked();
            assert_eq!(actions.len(), 3);
            assert_eq!(*watch.borrow(), 3);
            assert_eq!(actions.tokens(), vec![TokenId(1), TokenId(2)]);
        }
        assert!(actions.is_empty());
        assert_eq!(*watch.borrow(), 0);
    }
}
