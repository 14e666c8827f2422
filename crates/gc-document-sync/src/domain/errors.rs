//! # Domain Errors
//!
//! Error types for the registry client, grouped by how the caller should
//! react to them (see [`ErrorKind`]).

use shared_types::{AddressParseError, TokenId, TxHash};
use thiserror::Error;

/// EIP-1193: user rejected the request.
pub const CODE_USER_REJECTED: i64 = 4001;

/// EIP-3085: the wallet does not know the requested chain.
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

/// A request of the same type is already awaiting the user.
pub const CODE_REQUEST_PENDING: i64 = -32002;

/// Internal error; wallets report underfunded or misrouted transactions this way.
pub const CODE_INTERNAL: i64 = -32603;

/// How an error should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The token does not exist. A scan miss, never surfaced.
    Absence,
    /// The wallet refused or is busy. Surface, do not retry.
    Provider,
    /// Wrong chain or the chain is unusable. Recoverable via the switch flow.
    Network,
    /// The caller asked for something that cannot start.
    Precondition,
    /// Anything else. Log and surface generically.
    Unexpected,
}

/// Registry client error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `getDocument` reverted with "nonexistent token", or returned a zero owner.
    #[error("Token {0} does not exist")]
    TokenNotFound(TokenId),

    /// The user declined the request in their wallet.
    #[error("Request rejected by user")]
    UserRejected,

    /// The wallet already has a request of this type open.
    #[error("A wallet request is already pending")]
    PendingRequest,

    /// The wallet returned an empty account list.
    #[error("Wallet returned no accounts")]
    NoAccounts,

    /// Connected to a chain other than the configured one.
    #[error("Connected to chain {actual}, expected {expected}")]
    WrongNetwork {
        /// Configured chain id
        expected: u64,
        /// Chain id reported by the wallet
        actual: u64,
    },

    /// Switching (or adding) the configured chain failed.
    #[error("Network switch failed: {0}")]
    NetworkSwitchFailed(String),

    /// The wallet could not fund or route the transaction.
    #[error("Transaction could not be sent: {0}")]
    FundsOrNetwork(String),

    /// No account is connected.
    #[error("No wallet connected")]
    NotConnected,

    /// A transfer request needs a recipient.
    #[error("Recipient address is required")]
    MissingRecipient,

    /// An address did not parse.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An action for this token is already being submitted or confirmed.
    #[error("An action for token {0} is already in flight")]
    ActionInFlight(TokenId),

    /// JSON-RPC error not covered by a more specific variant.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// The endpoint could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The transaction was mined but reverted.
    #[error("Transaction {tx_hash} reverted: {reason}")]
    Reverted {
        /// Reverted transaction
        tx_hash: TxHash,
        /// Decoded revert reason, if any
        reason: String,
    },

    /// No receipt arrived within the confirmation timeout.
    #[error("Timed out waiting for confirmation of {0}")]
    ConfirmationTimeout(TxHash),

    /// The content store rejected or failed the upload.
    #[error("Content store error: {0}")]
    Storage(String),

    /// The persisted session could not be read or written.
    #[error("Session store error: {0}")]
    SessionStore(String),
}

impl RegistryError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TokenNotFound(_) => ErrorKind::Absence,
            Self::UserRejected | Self::PendingRequest | Self::NoAccounts => ErrorKind::Provider,
            Self::WrongNetwork { .. } | Self::NetworkSwitchFailed(_) | Self::FundsOrNetwork(_) => {
                ErrorKind::Network
            }
            Self::NotConnected
            | Self::MissingRecipient
            | Self::InvalidAddress(_)
            | Self::ActionInFlight(_) => ErrorKind::Precondition,
            Self::Rpc { .. }
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::Reverted { .. }
            | Self::ConfirmationTimeout(_)
            | Self::Storage(_)
            | Self::SessionStore(_) => ErrorKind::Unexpected,
        }
    }

    /// True for "token does not exist".
    #[must_use]
    pub fn is_absence(&self) -> bool {
        self.kind() == ErrorKind::Absence
    }

    /// The raw JSON-RPC code, when this came from an RPC error.
    #[must_use]
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::UserRejected => Some(CODE_USER_REJECTED),
            Self::PendingRequest => Some(CODE_REQUEST_PENDING),
            Self::FundsOrNetwork(_) => Some(CODE_INTERNAL),
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::UserRejected => "Request was rejected in your wallet.".to_string(),
            Self::PendingRequest => {
                "Please check your wallet for a pending connection request.".to_string()
            }
            Self::NoAccounts => "No accounts found. Please unlock your wallet.".to_string(),
            Self::WrongNetwork { .. } | Self::NetworkSwitchFailed(_) => {
                "Please switch your wallet to the configured network.".to_string()
            }
            Self::FundsOrNetwork(_) => {
                "Please verify you have enough ETH and are connected to the correct network."
                    .to_string()
            }
            Self::NotConnected => "Please connect your wallet first.".to_string(),
            Self::MissingRecipient => "Please enter a recipient address.".to_string(),
            Self::InvalidAddress(input) => format!("'{input}' is not a valid address."),
            Self::ActionInFlight(token_id) => {
                format!("An action for document {token_id} is already in progress.")
            }
            Self::TokenNotFound(token_id) => format!("Document {token_id} does not exist."),
            Self::Reverted { reason, .. } if !reason.is_empty() => {
                format!("Transaction failed: {reason}")
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<AddressParseError> for RegistryError {
    fn from(err: AddressParseError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

/// True if a revert message is the contract's "nonexistent token".
#[must_use]
pub fn is_nonexistent_token(message: &str) -> bool {
    message.to_ascii_lowercase().contains("nonexistent token")
}

/// Map a JSON-RPC / EIP-1193 error to a registry error.
#[must_use]
pub fn classify_rpc_error(code: i64, message: &str) -> RegistryError {
    match code {
        CODE_USER_REJECTED => RegistryError::UserRejected,
        CODE_REQUEST_PENDING => RegistryError::PendingRequest,
        CODE_INTERNAL => RegistryError::FundsOrNetwork(message.to_string()),
        _ => RegistryError::Rpc {
            code,
            message: message.to_string(),
        },
    }
}
