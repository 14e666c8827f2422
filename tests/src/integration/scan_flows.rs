//! # Scan Flows
//!
//! The sequential scanner as the sync loop drives it: the probe window ends
//! at #20, three consecutive misses end a scan early, a failing read counts
//! as a miss.

#[cfg(test)]
mod tests {
    use gc_document_sync::{DocumentRegistryApi, MockRegistry};
    use shared_types::{DocumentRecord, TokenId};

    use crate::fixtures::{account, settled, wait_for_snapshot, Deployment};

    fn ids(range: std::ops::RangeInclusive<u64>) -> Vec<TokenId> {
        range.map(TokenId).collect()
    }

    fn mint_many(registry: &MockRegistry, count: usize) {
        for n in 0..count {
            registry.mint(account(0x0a), &format!("ipfs://Qm{n}"));
        }
    }

    #[tokio::test]
    async fn test_document_past_window_never_probed() {
        let deployment = Deployment::new();
        mint_many(&deployment.registry, 21);
        let party = deployment.party(account(0x0a));

        party.client.connect().await.unwrap();
        let snapshot = settled(&party.client, party.account).await;

        assert_eq!(snapshot.documents.len(), 20);
        assert!(snapshot.document(TokenId(21)).is_none());
        assert_eq!(deployment.registry.probes(), ids(1..=20));

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_gap_of_three_ends_scan() {
        let deployment = Deployment::new();
        mint_many(&deployment.registry, 2);
        deployment
            .registry
            .insert(DocumentRecord::new(TokenId(6), "ipfs://QmLate", account(0x0a)));
        let party = deployment.party(account(0x0a));

        party.client.connect().await.unwrap();
        let snapshot = settled(&party.client, party.account).await;

        let visible: Vec<_> = snapshot.documents.iter().map(|d| d.token_id()).collect();
        assert_eq!(visible, ids(1..=2));
        assert_eq!(deployment.registry.probes(), ids(1..=5));

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_read_counts_as_miss() {
        let deployment = Deployment::new();
        mint_many(&deployment.registry, 4);
        deployment.registry.fail_token(TokenId(2));
        let party = deployment.party(account(0x0a));

        party.client.connect().await.unwrap();
        let snapshot = settled(&party.client, party.account).await;

        let visible: Vec<_> = snapshot.documents.iter().map(|d| d.token_id()).collect();
        assert_eq!(visible, vec![TokenId(1), TokenId(3), TokenId(4)]);

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_owner_treated_as_absent() {
        let deployment = Deployment::new();
        mint_many(&deployment.registry, 1);
        deployment.registry.insert(DocumentRecord::new(
            TokenId(2),
            "",
            shared_types::Address::ZERO,
        ));
        mint_many(&deployment.registry, 1);
        let party = deployment.party(account(0x0a));

        party.client.connect().await.unwrap();
        let snapshot = settled(&party.client, party.account).await;

        let visible: Vec<_> = snapshot.documents.iter().map(|d| d.token_id()).collect();
        assert_eq!(visible, vec![TokenId(1), TokenId(3)]);

        party.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_other_owners_hidden_from_plain_viewer() {
        let deployment = Deployment::new();
        let mine = deployment.registry.mint(account(0x0a), "ipfs://QmMine");
        let theirs = deployment.registry.mint(account(0x0b), "ipfs://QmTheirs");
        let party = deployment.party(account(0x0a));

        party.client.connect().await.unwrap();
        let snapshot = settled(&party.client, party.account).await;
        assert!(snapshot.document(mine).is_some());
        assert!(snapshot.document(theirs).is_none());

        // Someone else's document shows up while it awaits government approval.
        let other = deployment.party(account(0x0b));
        other.client.connect().await.unwrap();
        other
            .client
            .request_transfer(theirs, &account(0x0c).to_hex())
            .await
            .unwrap();
        wait_for_snapshot(&party.client, |s| s.document(theirs).is_some()).await;

        party.client.shutdown().await;
        other.client.shutdown().await;
    }
}
