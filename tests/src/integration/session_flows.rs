//! # Session Flows
//!
//! Wallet connection, network switching, saved sessions and wallet
//! notifications, observed through the sync loop's snapshots.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gc_document_sync::{
        DocumentRegistryApi, MemorySessionStore, MockWallet, RegistryError, Role, SessionStore,
        SEPOLIA_CHAIN_ID,
    };

    use crate::fixtures::{account, settled, wait_for_snapshot, Deployment, AUTHORITY, GOVT};

    const MAINNET: u64 = 1;

    #[tokio::test]
    async fn test_connect_adds_unknown_chain() {
        let deployment = Deployment::new();
        let wallet = Arc::new(MockWallet::new(vec![account(0x0a)], MAINNET));
        let party = deployment.party_with(
            account(0x0a),
            wallet.clone(),
            Arc::new(MemorySessionStore::default()),
        );

        assert_eq!(party.client.connect().await.unwrap(), account(0x0a));
        assert_eq!(wallet.current_chain(), SEPOLIA_CHAIN_ID);
        assert_eq!(
            wallet.calls(),
            vec![
                "eth_requestAccounts",
                "eth_chainId",
                "wallet_switchEthereumChain",
                "wallet_addEthereumChain",
                "eth_chainId",
            ]
        );
        settled(&party.client, account(0x0a)).await;
        assert_eq!(party.store.load().unwrap(), Some(account(0x0a)));

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_switches_known_chain() {
        let deployment = Deployment::new();
        let wallet = Arc::new(MockWallet::new(vec![account(0x0a)], MAINNET));
        wallet.know_chain(SEPOLIA_CHAIN_ID);
        let party = deployment.party_with(
            account(0x0a),
            wallet.clone(),
            Arc::new(MemorySessionStore::default()),
        );

        party.client.connect().await.unwrap();
        assert!(!wallet.calls().contains(&"wallet_addEthereumChain"));
        assert_eq!(wallet.current_chain(), SEPOLIA_CHAIN_ID);

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_connect_stays_disconnected() {
        let deployment = Deployment::new();
        let party = deployment.party(account(0x0a));
        party.wallet.fail_next(RegistryError::UserRejected);

        let err = party.client.connect().await.unwrap_err();
        assert_eq!(err, RegistryError::UserRejected);
        assert!(party.client.snapshot().viewer.is_none());
        assert_eq!(party.store.load().unwrap(), None);
        assert_eq!(
            party.client.incoming_transfers().await.unwrap_err(),
            RegistryError::NotConnected
        );

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_saved_session_restored() {
        let deployment = Deployment::new();
        let store = Arc::new(MemorySessionStore::default());
        let token = deployment.registry.mint(account(0x0a), "ipfs://QmDeed");

        let first = deployment.party_with(
            account(0x0a),
            Arc::new(MockWallet::new(vec![account(0x0a)], SEPOLIA_CHAIN_ID)),
            store.clone(),
        );
        first.client.connect().await.unwrap();
        first.client.shutdown().await;

        let second = deployment.party_with(
            account(0x0a),
            Arc::new(MockWallet::new(vec![account(0x0a)], SEPOLIA_CHAIN_ID)),
            store,
        );
        assert_eq!(second.client.restore().await.unwrap(), Some(account(0x0a)));
        let snapshot = settled(&second.client, account(0x0a)).await;
        assert!(snapshot.document(token).is_some());

        second.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_nothing_to_restore() {
        let deployment = Deployment::new();
        let party = deployment.party(account(0x0a));

        assert_eq!(party.client.restore().await.unwrap(), None);
        assert!(party.wallet.calls().is_empty());

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_releases_only_own_listener() {
        let deployment = Deployment::new();
        let a = deployment.party(account(0x0a));
        let b = deployment.party(account(0x0b));
        deployment.registry.mint(account(0x0a), "ipfs://QmA");

        a.client.connect().await.unwrap();
        b.client.connect().await.unwrap();
        settled(&a.client, a.account).await;
        settled(&b.client, b.account).await;
        assert_eq!(deployment.bus.active_subscriptions(), 2);

        a.client.disconnect().unwrap();
        let snapshot = wait_for_snapshot(&a.client, |s| s.viewer.is_none()).await;
        assert!(snapshot.documents.is_empty());
        assert_eq!(a.store.load().unwrap(), None);
        assert_eq!(deployment.bus.active_subscriptions(), 1);

        // B keeps following the registry.
        let token = b.client.upload_file("b.pdf", b"b".to_vec()).await.unwrap();
        wait_for_snapshot(&b.client, |s| s.document(token).is_some()).await;
        assert!(a.client.snapshot().documents.is_empty());

        a.client.shutdown().await;
        b.client.shutdown().await;
        assert_eq!(deployment.bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_account_switch_reclassifies() {
        let deployment = Deployment::new();
        let party = deployment.party(account(0x0a));
        let token = deployment.registry.mint(account(0x0c), "ipfs://QmC");

        party.client.connect().await.unwrap();
        let snapshot = settled(&party.client, account(0x0a)).await;
        assert!(snapshot.document(token).is_none());
        assert_eq!(snapshot.roles.roles(), vec![Role::Plain]);

        party
            .client
            .session()
            .accounts_changed(&[AUTHORITY])
            .await
            .unwrap();
        let snapshot = settled(&party.client, AUTHORITY).await;
        assert!(snapshot.roles.contains(Role::Authority));
        assert!(snapshot.document(token).is_some());
        assert_eq!(party.store.load().unwrap(), Some(AUTHORITY));

        party.client.session().accounts_changed(&[GOVT]).await.unwrap();
        let snapshot = settled(&party.client, GOVT).await;
        assert!(snapshot.roles.contains(Role::Government));

        party.client.session().accounts_changed(&[]).await.unwrap();
        wait_for_snapshot(&party.client, |s| s.viewer.is_none()).await;

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_leaving_chain_ends_session() {
        let deployment = Deployment::new();
        let party = deployment.party(account(0x0a));
        party.client.connect().await.unwrap();
        settled(&party.client, account(0x0a)).await;

        // Staying on the configured chain is a no-op.
        party.client.session().chain_changed(SEPOLIA_CHAIN_ID).unwrap();
        assert_eq!(party.client.session().active_account(), Some(account(0x0a)));

        let err = party.client.session().chain_changed(MAINNET).unwrap_err();
        assert!(matches!(err, RegistryError::WrongNetwork { actual: MAINNET, .. }));
        wait_for_snapshot(&party.client, |s| s.viewer.is_none()).await;

        party.client.shutdown().await;
    }
}
