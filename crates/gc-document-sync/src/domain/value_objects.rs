//! # Value Objects
//!
//! Immutable types describing viewers, scans, actions and notices.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::{Address, DocumentRecord, TokenId};
use uuid::Uuid;

use super::invariants::{DEFAULT_MISS_TOLERANCE, DEFAULT_SCAN_START, DEFAULT_UPPER_BOUND};

// =============================================================================
// ROLES
// =============================================================================

/// A single capability a viewer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// No privileges.
    Plain,
    /// The configured authority account.
    Authority,
    /// The configured government approver.
    Government,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Authority => "authority",
            Self::Government => "government",
        })
    }
}

/// The capability set of a viewer.
///
/// A viewer may be both authority and government when the two configured
/// addresses coincide. `Plain` is held exactly when neither is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleSet {
    /// Viewer is the authority account.
    pub authority: bool,
    /// Viewer is the government approver.
    pub government: bool,
}

impl RoleSet {
    /// No privileges.
    pub const PLAIN: Self = Self {
        authority: false,
        government: false,
    };

    /// Authority or government.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.authority || self.government
    }

    /// Whether the set holds `role`.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        match role {
            Role::Plain => !self.is_privileged(),
            Role::Authority => self.authority,
            Role::Government => self.government,
        }
    }

    /// The roles held, in a stable order.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        [Role::Plain, Role::Authority, Role::Government]
            .into_iter()
            .filter(|role| self.contains(*role))
            .collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.roles().iter().map(ToString::to_string).collect();
        f.write_str(&labels.join("+"))
    }
}

// =============================================================================
// SCANNING
// =============================================================================

/// Probe window for the sequential scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBounds {
    /// First identifier probed.
    pub start: TokenId,
    /// Last identifier that may be probed (inclusive).
    pub upper_bound: TokenId,
    /// Consecutive absent results that end the scan.
    pub miss_tolerance: u32,
}

impl Default for ScanBounds {
    fn default() -> Self {
        Self {
            start: TokenId(DEFAULT_SCAN_START),
            upper_bound: TokenId(DEFAULT_UPPER_BOUND),
            miss_tolerance: DEFAULT_MISS_TOLERANCE,
        }
    }
}

impl ScanBounds {
    /// Maximum number of probes this window allows.
    #[must_use]
    pub fn max_probes(&self) -> u64 {
        (self.upper_bound.0 + 1).saturating_sub(self.start.0)
    }
}

/// Which records a scan selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanView {
    /// Records the viewer may see in the document list.
    Visible,
    /// Transfers addressed to the viewer, plus records the viewer received
    /// through a completion the caller has observed.
    Incoming {
        /// Tokens whose `TransferCompleted` the caller has seen.
        recently_completed: BTreeSet<TokenId>,
    },
}

/// Why a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Too many consecutive misses.
    MissTolerance,
    /// The upper bound was passed.
    UpperBound,
}

// =============================================================================
// AFFORDANCES
// =============================================================================

/// What the viewer can do with a document right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentActions {
    /// Owner, no transfer pending.
    pub can_request_transfer: bool,
    /// Owner, transfer pending, owner approval outstanding.
    pub can_approve_as_owner: bool,
    /// Government, transfer pending, government approval outstanding.
    pub can_approve_as_government: bool,
}

impl DocumentActions {
    /// Derive the affordances of `viewer` on `record`.
    #[must_use]
    pub fn for_viewer(record: &DocumentRecord, viewer: &Address, roles: RoleSet) -> Self {
        let owns = record.is_owned_by(viewer);
        let pending = record.has_pending_transfer();
        Self {
            can_request_transfer: owns && !pending,
            can_approve_as_owner: owns && pending && !record.owner_approved,
            can_approve_as_government: roles.government && pending && !record.govt_approved,
        }
    }

    /// True if no action is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.can_request_transfer || self.can_approve_as_owner || self.can_approve_as_government)
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// The kinds of mutating call the gateway makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// `requestTransfer`
    RequestTransfer,
    /// `approveTransferAsOwner`
    ApproveAsOwner,
    /// `approveTransferAsGovt`
    ApproveAsGovernment,
    /// `uploadDocument`
    UploadDocument,
    /// `registerProperty`
    RegisterProperty,
}

impl ActionKind {
    /// Metric / log label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestTransfer => "request_transfer",
            Self::ApproveAsOwner => "approve_owner",
            Self::ApproveAsGovernment => "approve_govt",
            Self::UploadDocument => "upload_document",
            Self::RegisterProperty => "register_property",
        }
    }
}

/// Details of a property registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDetails {
    /// E.g. "residential".
    pub property_type: String,
    /// Free-form location.
    pub location: String,
    /// Area in square feet.
    pub area: U256,
    /// Declared value.
    pub value: U256,
    /// Free-form description.
    pub description: String,
}

/// A mutating contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `requestTransfer(uint256,address)`
    RequestTransfer {
        /// Document to transfer
        token_id: TokenId,
        /// Proposed recipient
        recipient: Address,
    },
    /// `approveTransferAsOwner(uint256)`
    ApproveAsOwner(TokenId),
    /// `approveTransferAsGovt(uint256)`
    ApproveAsGovernment(TokenId),
    /// `uploadDocument(string)`
    UploadDocument {
        /// Content locator of the uploaded bytes
        ipfs_hash: String,
    },
    /// `registerProperty(string,string,uint256,uint256,string)`
    RegisterProperty(PropertyDetails),
}

impl ContractCall {
    /// The kind of action this call performs.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::RequestTransfer { .. } => ActionKind::RequestTransfer,
            Self::ApproveAsOwner(_) => ActionKind::ApproveAsOwner,
            Self::ApproveAsGovernment(_) => ActionKind::ApproveAsGovernment,
            Self::UploadDocument { .. } => ActionKind::UploadDocument,
            Self::RegisterProperty(_) => ActionKind::RegisterProperty,
        }
    }

    /// The token this call acts on, if any.
    #[must_use]
    pub fn token_id(&self) -> Option<TokenId> {
        match self {
            Self::RequestTransfer { token_id, .. }
            | Self::ApproveAsOwner(token_id)
            | Self::ApproveAsGovernment(token_id) => Some(*token_id),
            Self::UploadDocument { .. } | Self::RegisterProperty(_) => None,
        }
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// How a completed transfer relates to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryRelation {
    /// Viewer was the sender.
    Sent,
    /// Viewer was the recipient.
    Received,
    /// Government viewer, not a party to the transfer.
    Oversight,
}

impl fmt::Display for HistoryRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sent => "Sent",
            Self::Received => "Received",
            Self::Oversight => "Government View",
        })
    }
}

// =============================================================================
// NOTICES
// =============================================================================

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    /// Something the user did (or waited for) succeeded.
    Success,
    /// Something happened on chain.
    Info,
    /// Something the user did failed.
    Error,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Unique id.
    pub id: Uuid,
    /// Severity.
    pub kind: NoticeKind,
    /// Token the notice is about, if any.
    pub token_id: Option<TokenId>,
    /// Text shown to the user.
    pub message: String,
    /// When the notice was raised.
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    /// Create a notice.
    #[must_use]
    pub fn new(kind: NoticeKind, token_id: Option<TokenId>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            token_id,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }

    /// Success notice.
    #[must_use]
    pub fn success(token_id: Option<TokenId>, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Success, token_id, message)
    }

    /// Informational notice.
    #[must_use]
    pub fn info(token_id: Option<TokenId>, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Info, token_id, message)
    }

    /// Error notice.
    #[must_use]
    pub fn error(token_id: Option<TokenId>, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Error, token_id, message)
    }
}

// =============================================================================
// SYNC TRIGGERS
// =============================================================================

/// Why a rescan was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// Viewer connected or changed.
    ViewerChanged,
    /// A contract event arrived.
    ContractEvent,
    /// The poll timer fired while transfers were pending.
    PendingPoll,
    /// A gateway action confirmed.
    ActionConfirmed,
    /// The event subscription lagged and dropped events.
    EventsMissed,
    /// Someone asked for it.
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn test_role_set_plain() {
        assert_eq!(RoleSet::PLAIN.roles(), vec![Role::Plain]);
        assert!(!RoleSet::PLAIN.is_privileged());
        assert_eq!(RoleSet::PLAIN.to_string(), "plain");
    }

    #[test]
    fn test_role_set_both() {
        let roles = RoleSet {
            authority: true,
            government: true,
        };
        assert_eq!(roles.roles(), vec![Role::Authority, Role::Government]);
        assert!(!roles.contains(Role::Plain));
        assert_eq!(roles.to_string(), "authority+government");
    }

    #[test]
    fn test_default_bounds() {
        let bounds = ScanBounds::default();
        assert_eq!(bounds.start, TokenId(1));
        assert_eq!(bounds.upper_bound, TokenId(20));
        assert_eq!(bounds.miss_tolerance, 3);
        assert_eq!(bounds.max_probes(), 20);
    }

    #[test]
    fn test_owner_affordances() {
        let mut record = DocumentRecord::new(TokenId(1), "ipfs://a", addr(1));
        let actions = DocumentActions::for_viewer(&record, &addr(1), RoleSet::PLAIN);
        assert!(actions.can_request_transfer);
        assert!(!actions.can_approve_as_owner);

        record.pending_owner = addr(2);
        let actions = DocumentActions::for_viewer(&record, &addr(1), RoleSet::PLAIN);
        assert!(!actions.can_request_transfer);
        assert!(actions.can_approve_as_owner);

        record.owner_approved = true;
        let actions = DocumentActions::for_viewer(&record, &addr(1), RoleSet::PLAIN);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_government_affordances() {
        let govt = RoleSet {
            authority: false,
            government: true,
        };
        let mut record = DocumentRecord::new(TokenId(1), "ipfs://a", addr(1));
        assert!(DocumentActions::for_viewer(&record, &addr(9), govt).is_empty());

        record.pending_owner = addr(2);
        assert!(DocumentActions::for_viewer(&record, &addr(9), govt).can_approve_as_government);

        record.govt_approved = true;
        assert!(DocumentActions::for_viewer(&record, &addr(9), govt).is_empty());
    }

    #[test]
    fn test_recipient_has_no_affordances() {
        let mut record = DocumentRecord::new(TokenId(1), "ipfs://a", addr(1));
        record.pending_owner = addr(2);
        assert!(DocumentActions::for_viewer(&record, &addr(2), RoleSet::PLAIN).is_empty());
    }

    #[test]
    fn test_contract_call_token() {
        assert_eq!(
            ContractCall::ApproveAsOwner(TokenId(3)).token_id(),
            Some(TokenId(3))
        );
        assert_eq!(
            ContractCall::UploadDocument {
                ipfs_hash: "ipfs://x".into()
            }
            .token_id(),
            None
        );
        assert_eq!(
            ContractCall::ApproveAsGovernment(TokenId(1)).kind().label(),
            "approve_govt"
        );
    }

    #[test]
    fn test_history_relation_labels() {
        assert_eq!(HistoryRelation::Oversight.to_string(), "Government View");
        assert_eq!(HistoryRelation::Sent.to_string(), "Sent");
    }
}
