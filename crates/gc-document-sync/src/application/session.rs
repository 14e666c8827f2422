//! # Session
//!
//! Explicit connection context: `connect -> active -> disconnect`.
//!
//! The current state lives in a `watch` channel so the sync loop (and any UI)
//! observes viewer changes without polling.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared_types::Address;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::algorithms::classify;
use crate::config::{ChainParams, RegistryConfig};
use crate::domain::{ErrorKind, RegistryError, RoleSet, CODE_UNRECOGNIZED_CHAIN};
use crate::ports::{SessionStore, WalletProvider};

/// A connected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Active account (first one the wallet reports).
    pub account: Address,
    /// Chain the wallet is on.
    pub chain_id: u64,
    /// Capabilities of the account.
    pub roles: RoleSet,
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No account connected.
    #[default]
    Disconnected,
    /// An account is connected on the configured chain.
    Active(ActiveSession),
}

impl SessionState {
    /// The active session, if any.
    pub fn active(&self) -> Option<&ActiveSession> {
        match self {
            Self::Active(active) => Some(active),
            Self::Disconnected => None,
        }
    }
}

/// Wallet session.
pub struct Session {
    wallet: Arc<dyn WalletProvider>,
    store: Arc<dyn SessionStore>,
    chain: ChainParams,
    authority: Option<Address>,
    government: Option<Address>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    /// Create a disconnected session.
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        store: Arc<dyn SessionStore>,
        config: &RegistryConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            wallet,
            store,
            chain: config.chain_params(),
            authority: config.authority_address,
            government: config.government_address,
            state_tx,
        }
    }

    /// Request accounts, make sure the wallet is on the configured chain,
    /// classify roles and persist the account.
    pub async fn connect(&self) -> Result<ActiveSession, RegistryError> {
        let accounts = self.wallet.request_accounts().await?;
        let account = *accounts.first().ok_or(RegistryError::NoAccounts)?;
        let chain_id = self.ensure_network().await?;
        Ok(self.activate(account, chain_id))
    }

    /// Reconnect if an account was saved by an earlier session.
    ///
    /// The wallet signs with its own selected account, so that account
    /// becomes the viewer (classified afresh) even when it differs from the
    /// saved one. The saved account is then replaced.
    pub async fn restore(&self) -> Result<Option<ActiveSession>, RegistryError> {
        let Some(saved) = self.store.load()? else {
            return Ok(None);
        };
        info!(account = %saved, "Restoring saved session");
        let active = self.connect().await?;
        if active.account != saved {
            warn!(
                saved = %saved,
                account = %active.account,
                roles = %active.roles,
                "Wallet account differs from the saved session, using the wallet's"
            );
        }
        Ok(Some(active))
    }

    /// Handle the wallet's `accountsChanged` notification.
    ///
    /// An empty list disconnects; otherwise the first account becomes the
    /// viewer and its roles are reclassified.
    pub async fn accounts_changed(&self, accounts: &[Address]) -> Result<(), RegistryError> {
        let Some(account) = accounts.first().copied() else {
            info!("Wallet reported no accounts, disconnecting");
            return self.disconnect();
        };
        let chain_id = match self.state().active() {
            Some(active) => active.chain_id,
            None => self.wallet.chain_id().await?,
        };
        if chain_id != self.chain.chain_id {
            return Err(RegistryError::WrongNetwork {
                expected: self.chain.chain_id,
                actual: chain_id,
            });
        }
        self.activate(account, chain_id);
        Ok(())
    }

    /// Handle the wallet's `chainChanged` notification.
    ///
    /// Leaving the configured chain ends the session.
    pub fn chain_changed(&self, chain_id: u64) -> Result<(), RegistryError> {
        let Some(active) = self.state().active().copied() else {
            return Ok(());
        };
        if chain_id == self.chain.chain_id {
            return Ok(());
        }
        warn!(
            account = %active.account,
            expected = self.chain.chain_id,
            actual = chain_id,
            "Wallet left the configured chain"
        );
        self.state_tx.send_replace(SessionState::Disconnected);
        Err(RegistryError::WrongNetwork {
            expected: self.chain.chain_id,
            actual: chain_id,
        })
    }

    /// End the session and forget the saved account.
    pub fn disconnect(&self) -> Result<(), RegistryError> {
        let previous = self.state_tx.send_replace(SessionState::Disconnected);
        if let Some(active) = previous.active() {
            info!(account = %active.account, "Session disconnected");
        }
        self.store.clear()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The connected account, if any.
    pub fn active_account(&self) -> Option<Address> {
        self.state().active().map(|active| active.account)
    }

    /// The active session, or `NotConnected`.
    pub fn require_active(&self) -> Result<ActiveSession, RegistryError> {
        self.state()
            .active()
            .copied()
            .ok_or(RegistryError::NotConnected)
    }

    async fn ensure_network(&self) -> Result<u64, RegistryError> {
        let expected = self.chain.chain_id;
        let current = self.wallet.chain_id().await?;
        if current == expected {
            return Ok(current);
        }

        info!(current, expected, "Switching wallet network");
        match self.wallet.switch_chain(expected).await {
            Ok(()) => {}
            Err(err) if err.rpc_code() == Some(CODE_UNRECOGNIZED_CHAIN) => {
                info!(chain = %self.chain.chain_name, "Chain unknown to wallet, adding it");
                self.wallet
                    .add_chain(&self.chain)
                    .await
                    .map_err(|err| match err.kind() {
                        ErrorKind::Provider => err,
                        _ => RegistryError::NetworkSwitchFailed(err.to_string()),
                    })?;
            }
            Err(err) if err.kind() == ErrorKind::Provider => return Err(err),
            Err(err) => return Err(RegistryError::NetworkSwitchFailed(err.to_string())),
        }

        let actual = self.wallet.chain_id().await?;
        if actual != expected {
            return Err(RegistryError::WrongNetwork { expected, actual });
        }
        Ok(actual)
    }

    fn activate(&self, account: Address, chain_id: u64) -> ActiveSession {
        let roles = classify(&account, self.authority.as_ref(), self.government.as_ref());
        let active = ActiveSession {
            account,
            chain_id,
            roles,
        };
        let next = SessionState::Active(active);
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if let Err(err) = self.store.save(&account) {
            warn!(account = %account, error = %err, "Could not persist session");
        }
        info!(account = %account, roles = %roles, "Session active");
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MemorySessionStore, MockWallet};

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            government_address: Some(addr(9)),
            ..RegistryConfig::default()
        }
    }

    fn session(wallet: Arc<MockWallet>, store: Arc<MemorySessionStore>) -> Session {
        Session::new(wallet, store, &config())
    }

    #[tokio::test]
    async fn test_connect_on_configured_chain() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1), addr(2)], 11_155_111));
        let store = Arc::new(MemorySessionStore::default());
        let session = session(wallet.clone(), store.clone());

        let active = session.connect().await.unwrap();
        assert_eq!(active.account, addr(1));
        assert_eq!(active.roles, RoleSet::PLAIN);
        assert_eq!(store.load().unwrap(), Some(addr(1)));
        assert!(!wallet.calls().contains(&"wallet_switchEthereumChain"));
    }

    #[tokio::test]
    async fn test_connect_switches_known_chain() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 1));
        wallet.know_chain(11_155_111);
        let session = session(wallet.clone(), Arc::new(MemorySessionStore::default()));

        session.connect().await.unwrap();
        assert_eq!(wallet.current_chain(), 11_155_111);
        assert!(!wallet.calls().contains(&"wallet_addEthereumChain"));
    }

    #[tokio::test]
    async fn test_connect_adds_unknown_chain() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 1));
        let session = session(wallet.clone(), Arc::new(MemorySessionStore::default()));

        let active = session.connect().await.unwrap();
        assert_eq!(active.chain_id, 11_155_111);
        let calls = wallet.calls();
        let switch = calls
            .iter()
            .position(|c| *c == "wallet_switchEthereumChain")
            .unwrap();
        let add = calls
            .iter()
            .position(|c| *c == "wallet_addEthereumChain")
            .unwrap();
        assert!(switch < add);
    }

    #[tokio::test]
    async fn test_connect_without_accounts() {
        let wallet = Arc::new(MockWallet::new(vec![], 11_155_111));
        let session = session(wallet, Arc::new(MemorySessionStore::default()));
        assert_eq!(session.connect().await, Err(RegistryError::NoAccounts));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_rejected_connect_stays_disconnected() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 11_155_111));
        wallet.fail_next(RegistryError::UserRejected);
        let session = session(wallet, Arc::new(MemorySessionStore::default()));
        assert_eq!(session.connect().await, Err(RegistryError::UserRejected));
        assert!(session.require_active().is_err());
    }

    #[tokio::test]
    async fn test_government_role_classified() {
        let wallet = Arc::new(MockWallet::new(vec![addr(9)], 11_155_111));
        let session = session(wallet, Arc::new(MemorySessionStore::default()));
        let active = session.connect().await.unwrap();
        assert!(active.roles.government);
    }

    #[tokio::test]
    async fn test_restore_only_with_saved_account() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 11_155_111));
        let session = session(wallet.clone(), Arc::new(MemorySessionStore::default()));
        assert_eq!(session.restore().await.unwrap(), None);
        assert!(wallet.calls().is_empty());

        let session = self::session(wallet, Arc::new(MemorySessionStore::with_account(addr(1))));
        let restored = session.restore().await.unwrap().unwrap();
        assert_eq!(restored.account, addr(1));
    }

    #[tokio::test]
    async fn test_restore_follows_wallet_account() {
        let wallet = Arc::new(MockWallet::new(vec![addr(9)], 11_155_111));
        let store = Arc::new(MemorySessionStore::with_account(addr(1)));
        let session = session(wallet, store.clone());

        let restored = session.restore().await.unwrap().unwrap();
        assert_eq!(restored.account, addr(9));
        assert!(restored.roles.government);
        assert_eq!(session.require_active().unwrap().account, addr(9));
        assert_eq!(store.load().unwrap(), Some(addr(9)));
    }

    #[tokio::test]
    async fn test_accounts_changed() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 11_155_111));
        let store = Arc::new(MemorySessionStore::default());
        let session = session(wallet, store.clone());
        session.connect().await.unwrap();
        let mut rx = session.subscribe();
        rx.borrow_and_update();

        session.accounts_changed(&[addr(9)]).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let active = session.require_active().unwrap();
        assert_eq!(active.account, addr(9));
        assert!(active.roles.government);

        session.accounts_changed(&[]).await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_same_account_does_not_notify() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 11_155_111));
        let session = session(wallet, Arc::new(MemorySessionStore::default()));
        session.connect().await.unwrap();
        let mut rx = session.subscribe();
        rx.borrow_and_update();

        session.accounts_changed(&[addr(1)]).await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_chain_changed_ends_session() {
        let wallet = Arc::new(MockWallet::new(vec![addr(1)], 11_155_111));
        let session = session(wallet, Arc::new(MemorySessionStore::default()));
        session.connect().await.unwrap();

        assert!(session.chain_changed(11_155_111).is_ok());
        assert!(session.active_account().is_some());

        let err = session.chain_changed(1).unwrap_err();
        assert!(matches!(err, RegistryError::WrongNetwork { .. }));
        assert_eq!(session.active_account(), None);
    }
}
