//! # Document Scanner
//!
//! Sequential existence probe over token identifiers.
//!
//! The contract has no "documents of owner X" query, so the scanner walks
//! identifiers upward from the start of the window and stops after a run of
//! consecutive misses or at the upper bound.
//!
//! ## Halting
//!
//! 1. `miss_tolerance` consecutive absent identifiers
//! 2. The next identifier would exceed `upper_bound`
//!
//! A probe that fails for any reason other than absence is logged and counted
//! as a miss; the scan never aborts on a single bad identifier.

use shared_types::{Address, DocumentRecord};
use tracing::{debug, warn};

use crate::domain::{HaltReason, RoleSet, ScanBounds, ScanOutcome, ScanReport, ScanView};
use crate::ports::RegistryReader;

/// True if `viewer` may see `record` in the document list.
///
/// Privileged viewers see everything. Otherwise the viewer must be the owner
/// or the named recipient, or the record must still await government approval.
pub fn is_visible(record: &DocumentRecord, viewer: &Address, roles: RoleSet) -> bool {
    roles.is_privileged()
        || record.is_owned_by(viewer)
        || record.is_pending_for(viewer)
        || record.is_awaiting_government()
}

/// True if `record` belongs in the viewer's incoming transfers.
pub fn is_incoming(record: &DocumentRecord, viewer: &Address, view: &ScanView) -> bool {
    match view {
        ScanView::Visible => false,
        ScanView::Incoming { recently_completed } => {
            record.is_pending_for(viewer)
                || (record.is_owned_by(viewer)
                    && !record.has_pending_transfer()
                    && recently_completed.contains(&record.token_id))
        }
    }
}

fn selects(record: &DocumentRecord, viewer: &Address, roles: RoleSet, view: &ScanView) -> bool {
    match view {
        ScanView::Visible => is_visible(record, viewer, roles),
        ScanView::Incoming { .. } => is_incoming(record, viewer, view),
    }
}

/// Probe the registry and select the records `view` asks for.
///
/// Records come back in ascending identifier order. With unchanged contract
/// state the output is identical across calls.
pub async fn scan_documents<R>(
    reader: &R,
    viewer: &Address,
    roles: RoleSet,
    view: &ScanView,
    bounds: &ScanBounds,
) -> ScanOutcome
where
    R: RegistryReader + ?Sized,
{
    let mut records = Vec::new();
    let mut probed = Vec::new();
    let mut misses = 0u32;
    let mut consecutive = 0u32;
    let mut errors = 0u32;
    let mut existing = 0u32;
    let mut token_id = bounds.start;

    let halted_by = loop {
        if consecutive >= bounds.miss_tolerance {
            break HaltReason::MissTolerance;
        }
        if token_id > bounds.upper_bound {
            break HaltReason::UpperBound;
        }

        probed.push(token_id);
        match reader.get_document(token_id).await {
            Ok(record) if record.exists() => {
                consecutive = 0;
                existing += 1;
                if selects(&record, viewer, roles, view) {
                    records.push(record);
                }
            }
            Ok(_) => {
                debug!(token_id = token_id.0, "Zero owner, treating as absent");
                consecutive += 1;
                misses += 1;
            }
            Err(err) if err.is_absence() => {
                debug!(token_id = token_id.0, "Token does not exist");
                consecutive += 1;
                misses += 1;
            }
            Err(err) => {
                warn!(token_id = token_id.0, error = %err, "Probe failed, counting as miss");
                errors += 1;
                consecutive += 1;
                misses += 1;
            }
        }
        token_id = token_id.next();
    };

    ScanOutcome {
        records,
        report: ScanReport {
            probed,
            misses,
            errors,
            existing,
            halted_by,
        },
    }
}
