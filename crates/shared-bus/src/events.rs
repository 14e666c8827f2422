//! # Registry Events
//!
//! Defines the decoded contract events that flow through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::entities::{Address, TokenId, TxHash};

/// A decoded registry contract event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    /// `DocumentCreated(tokenId, ipfsHash, owner)`
    DocumentCreated {
        /// The newly assigned identifier.
        token_id: TokenId,
        /// Content locator registered for the document.
        ipfs_hash: String,
        /// Account that uploaded it.
        owner: Address,
    },

    /// `TransferRequested(tokenId, from, to)`
    TransferRequested {
        /// Document being transferred.
        token_id: TokenId,
        /// Current owner.
        from: Address,
        /// Proposed recipient.
        to: Address,
    },

    /// `OwnerApproved(tokenId, owner)`
    OwnerApproved {
        /// Document whose transfer was approved.
        token_id: TokenId,
        /// Approving owner.
        owner: Address,
    },

    /// `GovtApproved(tokenId, govt)`
    GovtApproved {
        /// Document whose transfer was approved.
        token_id: TokenId,
        /// Approving government account.
        govt: Address,
    },

    /// `TransferCompleted(tokenId, from, to)`
    TransferCompleted {
        /// Document that changed hands.
        token_id: TokenId,
        /// Previous owner.
        from: Address,
        /// New owner.
        to: Address,
    },
}

impl ContractEvent {
    /// Solidity event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentCreated { .. } => "DocumentCreated",
            Self::TransferRequested { .. } => "TransferRequested",
            Self::OwnerApproved { .. } => "OwnerApproved",
            Self::GovtApproved { .. } => "GovtApproved",
            Self::TransferCompleted { .. } => "TransferCompleted",
        }
    }

    /// The token this event concerns.
    #[must_use]
    pub fn token_id(&self) -> TokenId {
        match self {
            Self::DocumentCreated { token_id, .. }
            | Self::TransferRequested { token_id, .. }
            | Self::OwnerApproved { token_id, .. }
            | Self::GovtApproved { token_id, .. }
            | Self::TransferCompleted { token_id, .. } => *token_id,
        }
    }

    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::DocumentCreated { .. } => EventTopic::Creation,
            Self::TransferRequested { .. } => EventTopic::Request,
            Self::OwnerApproved { .. } | Self::GovtApproved { .. } => EventTopic::Approval,
            Self::TransferCompleted { .. } => EventTopic::Completion,
        }
    }
}

/// Where a log was found on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogMeta {
    /// Block containing the log.
    pub block_number: u64,
    /// Transaction that emitted it.
    pub tx_hash: TxHash,
    /// Position of the log within the block.
    pub log_index: u64,
}

/// An event as published on the bus: the decoded payload plus its log
/// position when it came from chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// Decoded payload.
    pub event: ContractEvent,
    /// Log position, absent for locally synthesized events.
    pub meta: Option<LogMeta>,
}

impl RegistryEvent {
    /// Wraps an event decoded from an on-chain log.
    #[must_use]
    pub fn from_log(event: ContractEvent, meta: LogMeta) -> Self {
        Self {
            event,
            meta: Some(meta),
        }
    }

    /// Wraps an event with no log position.
    #[must_use]
    pub fn local(event: ContractEvent) -> Self {
        Self { event, meta: None }
    }

    /// Shorthand for `self.event.topic()`.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        self.event.topic()
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// `DocumentCreated`.
    Creation,
    /// `TransferRequested`.
    Request,
    /// `OwnerApproved` and `GovtApproved`.
    Approval,
    /// `TransferCompleted`.
    Completion,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Tokens to include. Empty means all tokens.
    pub token_ids: Vec<TokenId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            token_ids: Vec::new(),
        }
    }

    /// Narrow the filter to events about specific tokens.
    #[must_use]
    pub fn with_tokens(mut self, token_ids: Vec<TokenId>) -> Self {
        self.token_ids = token_ids;
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &RegistryEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let token_match =
            self.token_ids.is_empty() || self.token_ids.contains(&event.event.token_id());

        topic_match && token_match
    }
}
