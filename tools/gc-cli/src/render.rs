//! Plain-text rendering of snapshots, notices and history.

use std::fmt::Write;

use chrono::Local;
use gc_document_sync::{
    gateway_url, DocumentSnapshot, DocumentView, IncomingState, Notice, NoticeKind,
    RegistryConfig, TransferHistoryEntry, TxReceipt,
};
use shared_bus::{ContractEvent, RegistryEvent};
use shared_types::{DocumentRecord, TransferStatus};

fn approvals(status: &TransferStatus) -> String {
    match status {
        TransferStatus::Idle => String::new(),
        TransferStatus::AwaitingApprovals {
            owner_approved,
            govt_approved,
        } => format!(
            "owner {} / govt {}",
            if *owner_approved { "ok" } else { "pending" },
            if *govt_approved { "ok" } else { "pending" },
        ),
        TransferStatus::ReadyToFinalize => "owner ok / govt ok".to_string(),
    }
}

fn actions(view: &DocumentView) -> String {
    let mut out = Vec::new();
    if view.actions.can_request_transfer {
        out.push("request-transfer");
    }
    if view.actions.can_approve_as_owner {
        out.push("approve-owner");
    }
    if view.actions.can_approve_as_government {
        out.push("approve-govt");
    }
    out.join(", ")
}

/// The document list of one snapshot.
pub fn documents(snapshot: &DocumentSnapshot, config: &RegistryConfig) -> String {
    let mut out = String::new();
    let Some(viewer) = snapshot.viewer else {
        return "Not connected.\n".to_string();
    };

    let _ = write!(out, "Account {viewer} ({})", snapshot.roles);
    match snapshot.scanned_at {
        Some(at) => {
            let _ = writeln!(out, ", scanned {}", at.with_timezone(&Local).format("%H:%M:%S"));
        }
        None => {
            let _ = writeln!(out, ", scanning...");
        }
    }
    if snapshot.documents.is_empty() {
        let _ = writeln!(out, "No documents.");
        return out;
    }

    for view in &snapshot.documents {
        let record = &view.record;
        let _ = writeln!(out, "{}  {}", record.token_id, view.status.label());
        let _ = writeln!(out, "    owner    {}", record.owner);
        if record.has_pending_transfer() {
            let _ = writeln!(out, "    to       {}", record.pending_owner);
            let _ = writeln!(out, "    approval {}", approvals(&view.status));
        }
        let _ = writeln!(out, "    file     {}", gateway_url(&config.ipfs_gateway, &record.ipfs_hash));
        let available = actions(view);
        if !available.is_empty() {
            let _ = writeln!(out, "    actions  {available}");
        }
    }
    out
}

/// Transfers addressed to the viewer.
pub fn incoming(entries: &[(DocumentRecord, IncomingState)]) -> String {
    if entries.is_empty() {
        return "No incoming transfers.\n".to_string();
    }
    let mut out = String::new();
    for (record, state) in entries {
        let state = match state {
            IncomingState::Pending(status) => format!("{} ({})", status.label(), approvals(status)),
            IncomingState::Completed => "completed".to_string(),
        };
        let _ = writeln!(out, "{}  from {}  {state}", record.token_id, record.owner);
    }
    out
}

/// The viewer's completed transfers.
pub fn history(entries: &[TransferHistoryEntry], config: &RegistryConfig) -> String {
    if entries.is_empty() {
        return "No completed transfers.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "block {}  {}  {}  {} -> {}",
            entry.block_number, entry.token_id, entry.relation, entry.from.short(), entry.to.short()
        );
        if let Some(ipfs_hash) = &entry.ipfs_hash {
            let _ = writeln!(out, "    file {}", gateway_url(&config.ipfs_gateway, ipfs_hash));
        }
        let _ = writeln!(out, "    tx   {}", config.tx_url(&entry.tx_hash));
    }
    out
}

/// One notice line.
pub fn notice(notice: &Notice) -> String {
    let tag = match notice.kind {
        NoticeKind::Success => "ok",
        NoticeKind::Info => "info",
        NoticeKind::Error => "error",
    };
    format!("[{tag}] {}", notice.message)
}

/// One contract event line.
pub fn event(event: &RegistryEvent) -> String {
    let detail = match &event.event {
        ContractEvent::DocumentCreated { owner, ipfs_hash, .. } => {
            format!("owner {} file {ipfs_hash}", owner.short())
        }
        ContractEvent::TransferRequested { from, to, .. }
        | ContractEvent::TransferCompleted { from, to, .. } => {
            format!("{} -> {}", from.short(), to.short())
        }
        ContractEvent::OwnerApproved { owner, .. } => format!("by {}", owner.short()),
        ContractEvent::GovtApproved { govt, .. } => format!("by {}", govt.short()),
    };
    let block = event
        .meta
        .map(|meta| format!("block {}  ", meta.block_number))
        .unwrap_or_default();
    format!(
        "{block}{}  {}  {detail}",
        event.event.name(),
        event.event.token_id()
    )
}

/// A confirmed transaction.
pub fn receipt(receipt: &TxReceipt, config: &RegistryConfig) -> String {
    format!(
        "Confirmed in block {}: {}",
        receipt.block_number,
        config.tx_url(&receipt.tx_hash)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_document_sync::RoleSet;
    use shared_types::{Address, TokenId};

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn test_disconnected_snapshot() {
        let out = documents(&DocumentSnapshot::default(), &RegistryConfig::default());
        assert_eq!(out, "Not connected.\n");
    }

    #[test]
    fn test_pending_document_rendering() {
        let mut record = DocumentRecord::new(TokenId(1), "ipfs://QmA", addr(1));
        record.pending_owner = addr(2);
        record.owner_approved = true;
        let snapshot = DocumentSnapshot {
            viewer: Some(addr(1)),
            roles: RoleSet::PLAIN,
            documents: vec![DocumentView::new(record, &addr(1), RoleSet::PLAIN)],
            ..Default::default()
        };

        let out = documents(&snapshot, &RegistryConfig::default());
        assert!(out.lines().next().unwrap().ends_with("(plain), scanning..."));
        assert!(out.contains("#1  pending transfer"));
        assert!(out.contains("owner ok / govt pending"));
        assert!(out.contains("https://gateway.pinata.cloud/ipfs/QmA"));
        assert!(!out.contains("actions"));
    }

    #[test]
    fn test_scanned_snapshot_header() {
        let snapshot = DocumentSnapshot {
            viewer: Some(addr(1)),
            scanned_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        let out = documents(&snapshot, &RegistryConfig::default());
        assert!(out.lines().next().unwrap().contains(", scanned "));
        assert!(out.ends_with("No documents.\n"));
    }

    #[test]
    fn test_incoming_rendering() {
        let record = DocumentRecord::new(TokenId(4), "ipfs://x", addr(3));
        let out = incoming(&[(record, IncomingState::Completed)]);
        assert!(out.starts_with("#4  from"));
        assert!(out.contains("completed"));
        assert_eq!(incoming(&[]), "No incoming transfers.\n");
    }

    #[test]
    fn test_event_rendering() {
        let completed = ContractEvent::TransferCompleted {
            token_id: TokenId(3),
            from: addr(1),
            to: addr(2),
        };
        let meta = shared_bus::LogMeta {
            block_number: 812,
            tx_hash: shared_types::TxHash([5; 32]),
            log_index: 0,
        };
        let line = event(&RegistryEvent::from_log(completed.clone(), meta));
        assert!(line.starts_with("block 812  TransferCompleted  #3  "));
        assert!(line.contains(" -> "));

        let local = event(&RegistryEvent::local(completed));
        assert!(local.starts_with("TransferCompleted  #3"));
    }

    #[test]
    fn test_notice_rendering() {
        let line = notice(&Notice::error(None, "Request was rejected in your wallet."));
        assert_eq!(line, "[error] Request was rejected in your wallet.");
    }
}
