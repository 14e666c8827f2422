//! # Transfer Flow
//!
//! Owner A hands document #1 to B:
//!
//! 1. A uploads a file, the registry assigns #1
//! 2. A requests a transfer to B; B and the government now see #1
//! 3. A approves as owner, the government approves and the transfer completes
//! 4. B owns #1, A no longer sees it, B is notified once, history has one entry

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gc_document_sync::{
        DocumentRegistryApi, HistoryRelation, IncomingState, NoticeKind, RegistryError,
    };
    use shared_bus::{ContractEvent, EventPublisher, LogMeta, RegistryEvent};
    use shared_types::{Address, TokenId, TxHash};

    use crate::fixtures::{
        account, next_notice, settled, wait_for_snapshot, Deployment, GOVT,
    };

    #[tokio::test]
    async fn test_document_one_changes_hands() {
        let deployment = Deployment::new();
        let a = deployment.party(account(0x0a));
        let b = deployment.party(account(0x0b));
        let govt = deployment.party(GOVT);

        for party in [&a, &b, &govt] {
            party.client.connect().await.unwrap();
            settled(&party.client, party.account).await;
        }
        let mut b_notices = b.client.sync().subscribe_notices();

        // Step 1: upload
        let token = a.client.upload_file("deed.pdf", b"deed".to_vec()).await.unwrap();
        assert_eq!(token, TokenId(1));
        let ipfs_hash = deployment.registry.record(token).unwrap().ipfs_hash;
        assert_eq!(a.content.get(&ipfs_hash).unwrap(), b"deed".to_vec());

        let a_view = wait_for_snapshot(&a.client, |s| s.document(token).is_some()).await;
        assert!(a_view.document(token).unwrap().actions.can_request_transfer);

        // Step 2: request
        a.client
            .request_transfer(token, &b.account.to_hex())
            .await
            .unwrap();

        let b_view = wait_for_snapshot(&b.client, |s| {
            s.document(token)
                .is_some_and(|d| d.record.is_pending_for(&b.account))
        })
        .await;
        assert!(b_view.document(token).unwrap().actions.is_empty());

        let govt_view = wait_for_snapshot(&govt.client, |s| {
            s.document(token)
                .is_some_and(|d| d.actions.can_approve_as_government)
        })
        .await;
        assert!(!govt_view.document(token).unwrap().actions.can_approve_as_owner);

        let incoming = b.client.incoming_transfers().await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert!(matches!(incoming[0].1, IncomingState::Pending(_)));

        // Step 3: approvals
        a.client.approve_as_owner(token).await.unwrap();
        let receipt = govt.client.approve_as_government(token).await.unwrap();
        assert!(receipt.events.iter().any(|event| matches!(
            event,
            ContractEvent::TransferCompleted { to, .. } if *to == b.account
        )));

        // Step 4: outcome
        let record = deployment.registry.record(token).unwrap();
        assert_eq!(record.owner, b.account);
        assert!(!record.has_pending_transfer());
        assert!(!record.owner_approved && !record.govt_approved);

        let b_view = wait_for_snapshot(&b.client, |s| {
            !s.refreshing
                && s.document(token)
                    .is_some_and(|d| d.record.is_owned_by(&b.account))
        })
        .await;
        assert!(b_view.document(token).unwrap().actions.can_request_transfer);

        wait_for_snapshot(&a.client, |s| {
            !s.refreshing && s.scanned_at.is_some() && s.document(token).is_none()
        })
        .await;

        let notice = next_notice(&mut b_notices, |n| n.kind == NoticeKind::Success).await;
        assert_eq!(notice.token_id, Some(token));

        let incoming = b.client.incoming_transfers().await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].1, IncomingState::Completed);

        let history = b.client.transfer_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].relation, HistoryRelation::Received);
        assert_eq!(history[0].from, a.account);
        assert_eq!(history[0].ipfs_hash.as_deref(), Some(ipfs_hash.as_str()));

        assert_eq!(
            a.client.transfer_history().await.unwrap()[0].relation,
            HistoryRelation::Sent
        );
        assert_eq!(
            govt.client.transfer_history().await.unwrap()[0].relation,
            HistoryRelation::Oversight
        );

        for party in [a, b, govt] {
            party.client.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_completion_notified_once() {
        let deployment = Deployment::new();
        let b = deployment.party(account(0x0b));
        let token = deployment.registry.mint(b.account, "ipfs://QmDeed");
        b.client.connect().await.unwrap();
        settled(&b.client, b.account).await;
        let mut notices = b.client.sync().subscribe_notices();

        let completed = ContractEvent::TransferCompleted {
            token_id: token,
            from: account(0x0a),
            to: b.account,
        };
        let meta = |log_index| LogMeta {
            block_number: 200,
            tx_hash: TxHash([0x33; 32]),
            log_index,
        };
        // Same log twice is dropped by the bus; a second log for the same
        // completion is dropped by the notifier.
        deployment
            .bus
            .publish(RegistryEvent::from_log(completed.clone(), meta(0)))
            .await;
        deployment
            .bus
            .publish(RegistryEvent::from_log(completed.clone(), meta(0)))
            .await;
        deployment
            .bus
            .publish(RegistryEvent::from_log(completed, meta(1)))
            .await;
        deployment
            .bus
            .publish(RegistryEvent::local(ContractEvent::DocumentCreated {
                token_id: TokenId(99),
                ipfs_hash: "ipfs://QmSentinel".into(),
                owner: account(0x0c),
            }))
            .await;

        let mut successes = 0;
        loop {
            let notice = next_notice(&mut notices, |_| true).await;
            match notice.kind {
                NoticeKind::Success => successes += 1,
                _ if notice.token_id == Some(TokenId(99)) => break,
                _ => {}
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(deployment.bus.events_suppressed(), 1);

        b.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_double_submission_rejected() {
        let deployment = Deployment::with_confirmation_delay(Duration::from_millis(200));
        let a = deployment.party(account(0x0a));
        let token = deployment.registry.mint(a.account, "ipfs://QmDeed");
        a.client.connect().await.unwrap();
        settled(&a.client, a.account).await;
        let recipient = account(0x0b).to_hex();

        let (first, second) = tokio::join!(
            a.client.request_transfer(token, &recipient),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                a.client.request_transfer(token, &recipient).await
            }
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), RegistryError::ActionInFlight(token));
        assert_eq!(deployment.registry.submitted().len(), 1);

        // The slot frees up once the first action confirms.
        a.client.approve_as_owner(token).await.unwrap();

        a.client.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_owner_request_reverts() {
        let deployment = Deployment::new();
        let b = deployment.party(account(0x0b));
        let token = deployment.registry.mint(account(0x0a), "ipfs://QmDeed");
        b.client.connect().await.unwrap();
        settled(&b.client, b.account).await;
        let mut notices = b.client.sync().subscribe_notices();

        let err = b
            .client
            .request_transfer(token, &account(0x0c).to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Reverted { .. } | RegistryError::Rpc { .. }));
        let notice = next_notice(&mut notices, |n| n.kind == NoticeKind::Error).await;
        assert_eq!(notice.token_id, Some(token));
        assert_eq!(deployment.registry.record(token).unwrap().pending_owner, Address::ZERO);

        b.client.shutdown().await;
    }
}
