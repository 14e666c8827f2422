//! # Core Domain Entities
//!
//! Defines the registry entities as the client observes them.
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `TokenId`, `TxHash`
//! - **Registry**: `DocumentRecord`, `TransferStatus`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{AddressParseError, HashParseError};

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 20-byte Ethereum-style account address.
///
/// Parsing accepts any hex casing, so two spellings of the same account
/// compare equal once parsed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address (0x0000...0000).
    pub const ZERO: Self = Self([0u8; 20]);

    /// Creates an address from a 20-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an address from a slice. Returns None if wrong length.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 20] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase `0x`-prefixed hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Truncated display form, e.g. `0x1234...abcd`.
    #[must_use]
    pub fn short(&self) -> String {
        let full = self.to_hex();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 40 {
            return Err(AddressParseError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Registry token identifier. Assigned sequentially by the contract from 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl TokenId {
    /// The first identifier the contract assigns.
    pub const FIRST: Self = Self(1);

    /// The identifier after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Lowercase `0x`-prefixed hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x");
        if digits.len() != 64 {
            return Err(HashParseError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| HashParseError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// CLUSTER B: REGISTRY
// =============================================================================

/// A registered document as stored by the registry contract.
///
/// Read-only to the client. A record whose `owner` is the zero address does
/// not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Sequential identifier.
    pub token_id: TokenId,
    /// Content locator of the document bytes (immutable once set).
    pub ipfs_hash: String,
    /// Current holder.
    pub owner: Address,
    /// Proposed recipient, or zero when no transfer is pending.
    pub pending_owner: Address,
    /// Owner confirmed the pending transfer.
    pub owner_approved: bool,
    /// Government confirmed the pending transfer.
    pub govt_approved: bool,
}

impl DocumentRecord {
    /// A freshly registered record with no pending transfer.
    #[must_use]
    pub fn new(token_id: TokenId, ipfs_hash: impl Into<String>, owner: Address) -> Self {
        Self {
            token_id,
            ipfs_hash: ipfs_hash.into(),
            owner,
            pending_owner: Address::ZERO,
            owner_approved: false,
            govt_approved: false,
        }
    }

    /// False for the contract's empty record.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.owner.is_zero()
    }

    /// True while a transfer is proposed and not yet finalized.
    #[must_use]
    pub fn has_pending_transfer(&self) -> bool {
        !self.pending_owner.is_zero()
    }

    /// True when a transfer is pending and the government has not approved it.
    #[must_use]
    pub fn is_awaiting_government(&self) -> bool {
        self.has_pending_transfer() && !self.govt_approved
    }

    /// Whether `account` currently holds this document.
    #[must_use]
    pub fn is_owned_by(&self, account: &Address) -> bool {
        self.owner == *account
    }

    /// Whether `account` is the proposed recipient of a pending transfer.
    #[must_use]
    pub fn is_pending_for(&self, account: &Address) -> bool {
        self.has_pending_transfer() && self.pending_owner == *account
    }

    /// Transfer status derived from the pending owner and approval flags.
    #[must_use]
    pub fn transfer_status(&self) -> TransferStatus {
        if !self.has_pending_transfer() {
            TransferStatus::Idle
        } else if self.owner_approved && self.govt_approved {
            TransferStatus::ReadyToFinalize
        } else {
            TransferStatus::AwaitingApprovals {
                owner_approved: self.owner_approved,
                govt_approved: self.govt_approved,
            }
        }
    }
}

/// Where a document is in the dual-approval transfer workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// No transfer pending.
    Idle,
    /// A transfer is pending and at least one approval is missing.
    AwaitingApprovals {
        /// Owner approval received.
        owner_approved: bool,
        /// Government approval received.
        govt_approved: bool,
    },
    /// Both approvals are in; the contract has not cleared the pending owner yet.
    ReadyToFinalize,
}

impl TransferStatus {
    /// Short label for listings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingApprovals { .. } => "pending transfer",
            Self::ReadyToFinalize => "approved, finalizing",
        }
    }
}
