//! # Domain Entities
//!
//! Per-viewer projections of registry state: the document snapshot the sync
//! loop publishes, scan reports, receipts and history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_bus::{ContractEvent, LogMeta};
use shared_types::{Address, DocumentRecord, TokenId, TransferStatus, TxHash};

use super::value_objects::{DocumentActions, HaltReason, HistoryRelation, RoleSet};

/// A record as one viewer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentView {
    /// The on-chain record.
    pub record: DocumentRecord,
    /// Derived transfer status.
    pub status: TransferStatus,
    /// What the viewer can do with it.
    pub actions: DocumentActions,
}

impl DocumentView {
    /// Project `record` for `viewer`.
    #[must_use]
    pub fn new(record: DocumentRecord, viewer: &Address, roles: RoleSet) -> Self {
        let status = record.transfer_status();
        let actions = DocumentActions::for_viewer(&record, viewer, roles);
        Self {
            record,
            status,
            actions,
        }
    }

    /// Shorthand for the record's id.
    #[must_use]
    pub fn token_id(&self) -> TokenId {
        self.record.token_id
    }
}

/// The document list last published by the sync loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Connected viewer, `None` while disconnected.
    pub viewer: Option<Address>,
    /// The viewer's roles.
    pub roles: RoleSet,
    /// Visible documents in ascending id order.
    pub documents: Vec<DocumentView>,
    /// Incremented on every published scan.
    pub generation: u64,
    /// Completion time of the scan that produced this snapshot.
    pub scanned_at: Option<DateTime<Utc>>,
    /// A scan is running.
    pub refreshing: bool,
}

impl DocumentSnapshot {
    /// True if any visible document has a transfer in flight.
    #[must_use]
    pub fn has_pending_transfers(&self) -> bool {
        self.documents
            .iter()
            .any(|doc| doc.record.has_pending_transfer())
    }

    /// Look up a document by id.
    #[must_use]
    pub fn document(&self, token_id: TokenId) -> Option<&DocumentView> {
        self.documents.iter().find(|doc| doc.token_id() == token_id)
    }

    /// The visible records, without per-viewer projection.
    #[must_use]
    pub fn records(&self) -> Vec<DocumentRecord> {
        self.documents.iter().map(|doc| doc.record.clone()).collect()
    }
}

/// What a scan did, for logs, metrics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Identifiers probed, in order.
    pub probed: Vec<TokenId>,
    /// Absent identifiers (including failures counted as misses).
    pub misses: u32,
    /// Probes that failed for a reason other than absence.
    pub errors: u32,
    /// Records that exist, visible or not.
    pub existing: u32,
    /// Why the scan ended.
    pub halted_by: HaltReason,
}

impl ScanReport {
    /// Number of probes.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probed.len()
    }

    /// True if no probe failed for a reason other than absence.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Selected records in ascending id order.
    pub records: Vec<DocumentRecord>,
    /// Probe accounting.
    pub report: ScanReport,
}

/// Where an incoming transfer stands for its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncomingState {
    /// Still waiting on approvals (or on finalization).
    Pending(TransferStatus),
    /// Finalized; the viewer now owns it.
    Completed,
}

impl IncomingState {
    /// Classify a record selected by the incoming view.
    #[must_use]
    pub fn of(record: &DocumentRecord) -> Self {
        if record.has_pending_transfer() {
            Self::Pending(record.transfer_status())
        } else {
            Self::Completed
        }
    }
}

/// A decoded `TransferCompleted` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTransfer {
    /// Document that changed hands.
    pub token_id: TokenId,
    /// Previous owner.
    pub from: Address,
    /// New owner.
    pub to: Address,
    /// Where the log sits on chain.
    pub meta: LogMeta,
}

/// A completed transfer as shown in the viewer's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHistoryEntry {
    /// Document that changed hands.
    pub token_id: TokenId,
    /// Previous owner.
    pub from: Address,
    /// New owner.
    pub to: Address,
    /// Content locator, if it could be read.
    pub ipfs_hash: Option<String>,
    /// Finalizing transaction.
    pub tx_hash: TxHash,
    /// Block of the finalizing transaction.
    pub block_number: u64,
    /// How the viewer relates to it.
    pub relation: HistoryRelation,
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Block it was mined in.
    pub block_number: u64,
    /// `status == 1`.
    pub success: bool,
    /// Registry events decoded from the receipt's logs.
    pub events: Vec<ContractEvent>,
}

impl TxReceipt {
    /// The id assigned by a `DocumentCreated` log in this receipt.
    #[must_use]
    pub fn created_token(&self) -> Option<TokenId> {
        self.events.iter().find_map(|event| match event {
            ContractEvent::DocumentCreated { token_id, .. } => Some(*token_id),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn test_snapshot_pending_detection() {
        let mut record = DocumentRecord::new(TokenId(1), "ipfs://a", addr(1));
        let mut snapshot = DocumentSnapshot {
            viewer: Some(addr(1)),
            documents: vec![DocumentView::new(record.clone(), &addr(1), RoleSet::PLAIN)],
            ..Default::default()
        };
        assert!(!snapshot.has_pending_transfers());

        record.pending_owner = addr(2);
        snapshot.documents = vec![DocumentView::new(record, &addr(1), RoleSet::PLAIN)];
        assert!(snapshot.has_pending_transfers());
        assert!(snapshot.document(TokenId(1)).is_some());
        assert!(snapshot.document(TokenId(2)).is_none());
    }

    #[test]
    fn test_incoming_state() {
        let mut record = DocumentRecord::new(TokenId(1), "ipfs://a", addr(1));
        record.pending_owner = addr(2);
        assert!(matches!(
            IncomingState::of(&record),
            IncomingState::Pending(TransferStatus::AwaitingApprovals { .. })
        ));

        record.owner = addr(2);
        record.pending_owner = Address::ZERO;
        assert_eq!(IncomingState::of(&record), IncomingState::Completed);
    }

    #[test]
    fn test_receipt_created_token() {
        let receipt = TxReceipt {
            tx_hash: TxHash([1; 32]),
            block_number: 7,
            success: true,
            events: vec![ContractEvent::DocumentCreated {
                token_id: TokenId(5),
                ipfs_hash: "ipfs://a".into(),
                owner: addr(1),
            }],
        };
        assert_eq!(receipt.created_token(), Some(TokenId(5)));
    }
}
