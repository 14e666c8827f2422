//! # Transfer History Selection
//!
//! Picks the completed transfers a viewer is involved in and orders them
//! newest first.

use shared_types::Address;

use crate::domain::{CompletedTransfer, HistoryRelation, RoleSet};

/// How `viewer` relates to `transfer`, or `None` if it should not appear.
///
/// A party to the transfer sees it as sent or received. Government viewers
/// see every transfer.
pub fn relation_of(
    transfer: &CompletedTransfer,
    viewer: &Address,
    roles: RoleSet,
) -> Option<HistoryRelation> {
    if transfer.from == *viewer {
        Some(HistoryRelation::Sent)
    } else if transfer.to == *viewer {
        Some(HistoryRelation::Received)
    } else if roles.government {
        Some(HistoryRelation::Oversight)
    } else {
        None
    }
}

/// Keep the transfers `viewer` may see, newest first.
pub fn select_history(
    transfers: Vec<CompletedTransfer>,
    viewer: &Address,
    roles: RoleSet,
) -> Vec<(CompletedTransfer, HistoryRelation)> {
    let mut selected: Vec<_> = transfers
        .into_iter()
        .filter_map(|transfer| {
            relation_of(&transfer, viewer, roles).map(|relation| (transfer, relation))
        })
        .collect();
    selected.sort_by(|(a, _), (b, _)| {
        (b.meta.block_number, b.meta.log_index).cmp(&(a.meta.block_number, a.meta.log_index))
    });
    selected
}
