//! # Outbound Ports
//!
//! Traits for external dependencies: the registry contract (reads and
//! writes), the wallet, the content store and the session store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha3::{Digest, Keccak256};
use shared_bus::{ContractEvent, EventPublisher, InMemoryEventBus, LogMeta, RegistryEvent};
use shared_types::{Address, DocumentRecord, TokenId, TxHash};

use crate::config::ChainParams;
use crate::domain::{
    CompletedTransfer, ContractCall, RegistryError, TxReceipt, CODE_UNRECOGNIZED_CHAIN,
};

/// Read side of the registry contract - outbound port.
#[async_trait]
pub trait RegistryReader: Send + Sync {
    /// `getDocument(tokenId)`.
    ///
    /// Returns `TokenNotFound` for unassigned identifiers. Implementations may
    /// also return a record with the zero owner; callers treat both as absent.
    async fn get_document(&self, token_id: TokenId) -> Result<DocumentRecord, RegistryError>;

    /// All `TransferCompleted` logs emitted by the contract.
    async fn completed_transfers(&self) -> Result<Vec<CompletedTransfer>, RegistryError>;
}

/// Write side of the registry contract - outbound port.
///
/// Signing happens behind this port (wallet or node); the client only names
/// the sending account.
#[async_trait]
pub trait RegistryWriter: Send + Sync {
    /// Estimate gas for `call` sent from `from`.
    async fn estimate_gas(&self, from: Address, call: &ContractCall) -> Result<u64, RegistryError>;

    /// Submit `call`. Returns once the transaction is accepted, not mined.
    async fn send_transaction(
        &self,
        from: Address,
        call: &ContractCall,
        gas_limit: u64,
    ) -> Result<TxHash, RegistryError>;

    /// Wait until `tx_hash` is mined.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, RegistryError>;
}

/// Wallet connection - outbound port.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// `eth_requestAccounts`. The first account is the active one.
    async fn request_accounts(&self) -> Result<Vec<Address>, RegistryError>;

    /// `eth_chainId`.
    async fn chain_id(&self) -> Result<u64, RegistryError>;

    /// `wallet_switchEthereumChain`. Unknown chains fail with code 4902.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), RegistryError>;

    /// `wallet_addEthereumChain`.
    async fn add_chain(&self, chain: &ChainParams) -> Result<(), RegistryError>;
}

/// Document byte storage - outbound port.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` and return their content locator (`ipfs://...`).
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, RegistryError>;
}

/// Persistence of the last connected account - outbound port.
pub trait SessionStore: Send + Sync {
    /// The saved account, if any.
    fn load(&self) -> Result<Option<Address>, RegistryError>;

    /// Remember `account`.
    fn save(&self, account: &Address) -> Result<(), RegistryError>;

    /// Forget the saved account.
    fn clear(&self) -> Result<(), RegistryError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock wallet.
pub struct MockWallet {
    accounts: Mutex<Vec<Address>>,
    chain_id: Mutex<u64>,
    known_chains: Mutex<HashSet<u64>>,
    fail_with: Mutex<Option<RegistryError>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockWallet {
    /// A wallet exposing `accounts` on `chain_id`.
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            chain_id: Mutex::new(chain_id),
            known_chains: Mutex::new(HashSet::from([chain_id])),
            fail_with: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make the wallet aware of `chain_id` (so switching succeeds).
    pub fn know_chain(&self, chain_id: u64) {
        self.known_chains.lock().insert(chain_id);
    }

    /// Replace the exposed accounts.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.lock() = accounts;
    }

    /// Fail the next `request_accounts` with `err`.
    pub fn fail_next(&self, err: RegistryError) {
        *self.fail_with.lock() = Some(err);
    }

    /// Methods called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Current chain.
    pub fn current_chain(&self) -> u64 {
        *self.chain_id.lock()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, RegistryError> {
        self.calls.lock().push("eth_requestAccounts");
        if let Some(err) = self.fail_with.lock().take() {
            return Err(err);
        }
        Ok(self.accounts.lock().clone())
    }

    async fn chain_id(&self) -> Result<u64, RegistryError> {
        self.calls.lock().push("eth_chainId");
        Ok(*self.chain_id.lock())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), RegistryError> {
        self.calls.lock().push("wallet_switchEthereumChain");
        if !self.known_chains.lock().contains(&chain_id) {
            return Err(RegistryError::Rpc {
                code: CODE_UNRECOGNIZED_CHAIN,
                message: format!("Unrecognized chain ID {chain_id:#x}"),
            });
        }
        *self.chain_id.lock() = chain_id;
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainParams) -> Result<(), RegistryError> {
        self.calls.lock().push("wallet_addEthereumChain");
        self.known_chains.lock().insert(chain.chain_id);
        *self.chain_id.lock() = chain.chain_id;
        Ok(())
    }
}

/// Mock content store keeping uploads in memory.
#[derive(Default)]
pub struct MockContentStore {
    files: Mutex<HashMap<String, (String, Vec<u8>)>>,
    /// Should return errors?
    pub should_fail: bool,
}

impl MockContentStore {
    /// A store whose uploads always fail.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Bytes stored under `locator`.
    pub fn get(&self, locator: &str) -> Option<Vec<u8>> {
        self.files.lock().get(locator).map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, RegistryError> {
        if self.should_fail {
            return Err(RegistryError::Storage("Mock failure".to_string()));
        }
        let digest = Keccak256::digest(&bytes);
        let locator = format!("ipfs://Qm{}", hex::encode(&digest[..16]));
        self.files
            .lock()
            .insert(locator.clone(), (file_name.to_string(), bytes));
        Ok(locator)
    }
}

/// Session store that lives in memory.
#[derive(Default)]
pub struct MemorySessionStore {
    account: Mutex<Option<Address>>,
}

impl MemorySessionStore {
    /// A store that already remembers `account`.
    pub fn with_account(account: Address) -> Self {
        Self {
            account: Mutex::new(Some(account)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Address>, RegistryError> {
        Ok(*self.account.lock())
    }

    fn save(&self, account: &Address) -> Result<(), RegistryError> {
        *self.account.lock() = Some(*account);
        Ok(())
    }

    fn clear(&self) -> Result<(), RegistryError> {
        *self.account.lock() = None;
        Ok(())
    }
}

/// In-memory registry contract.
///
/// Applies the contract's transfer rules (owner request, dual approval,
/// finalization when both flags are set), records every `getDocument` probe
/// and publishes the emitted events to an optional bus when a transaction is
/// submitted.
pub struct MockRegistry {
    state: Mutex<MockChain>,
    government: Address,
    bus: Option<Arc<InMemoryEventBus>>,
    confirmation_delay: Duration,
    gas_estimate: u64,
}

#[derive(Default)]
struct MockChain {
    records: BTreeMap<TokenId, DocumentRecord>,
    next_id: u64,
    block_number: u64,
    nonce: u64,
    receipts: HashMap<TxHash, TxReceipt>,
    completed: Vec<CompletedTransfer>,
    probes: Vec<TokenId>,
    failing: HashSet<TokenId>,
    reject_next: Option<RegistryError>,
    submitted: Vec<ContractCall>,
    gas_limits: Vec<u64>,
}

impl MockRegistry {
    /// An empty registry whose government approver is `government`.
    pub fn new(government: Address) -> Self {
        Self {
            state: Mutex::new(MockChain {
                next_id: 1,
                block_number: 100,
                ..Default::default()
            }),
            government,
            bus: None,
            confirmation_delay: Duration::ZERO,
            gas_estimate: 50_000,
        }
    }

    /// Publish emitted events to `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<InMemoryEventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Delay every confirmation by `delay`.
    #[must_use]
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Mint a document for `owner` without emitting events.
    pub fn mint(&self, owner: Address, ipfs_hash: &str) -> TokenId {
        let mut state = self.state.lock();
        let token_id = TokenId(state.next_id);
        state.next_id += 1;
        state
            .records
            .insert(token_id, DocumentRecord::new(token_id, ipfs_hash, owner));
        token_id
    }

    /// Store `record` as is, e.g. one with a zero owner or a gap before it.
    pub fn insert(&self, record: DocumentRecord) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(record.token_id.0 + 1);
        state.records.insert(record.token_id, record);
    }

    /// Current record for `token_id`.
    pub fn record(&self, token_id: TokenId) -> Option<DocumentRecord> {
        self.state.lock().records.get(&token_id).cloned()
    }

    /// Make reads of `token_id` fail with a transport error.
    pub fn fail_token(&self, token_id: TokenId) {
        self.state.lock().failing.insert(token_id);
    }

    /// Fail the next submission with `err`.
    pub fn reject_next(&self, err: RegistryError) {
        self.state.lock().reject_next = Some(err);
    }

    /// Identifiers probed so far, in order.
    pub fn probes(&self) -> Vec<TokenId> {
        self.state.lock().probes.clone()
    }

    /// Forget recorded probes.
    pub fn clear_probes(&self) {
        self.state.lock().probes.clear();
    }

    /// Calls submitted so far.
    pub fn submitted(&self) -> Vec<ContractCall> {
        self.state.lock().submitted.clone()
    }

    /// Gas limits of the submitted calls.
    pub fn gas_limits(&self) -> Vec<u64> {
        self.state.lock().gas_limits.clone()
    }

    fn check(&self, state: &MockChain, from: Address, call: &ContractCall) -> Result<(), String> {
        let existing = |token_id: &TokenId| {
            state
                .records
                .get(token_id)
                .filter(|record| record.exists())
                .ok_or_else(|| "nonexistent token".to_string())
        };
        match call {
            ContractCall::RequestTransfer {
                token_id,
                recipient,
            } => {
                let record = existing(token_id)?;
                if !record.is_owned_by(&from) {
                    return Err("not owner".into());
                }
                if recipient.is_zero() {
                    return Err("invalid recipient".into());
                }
                Ok(())
            }
            ContractCall::ApproveAsOwner(token_id) => {
                let record = existing(token_id)?;
                if !record.is_owned_by(&from) {
                    return Err("not owner".into());
                }
                if !record.has_pending_transfer() {
                    return Err("no pending transfer".into());
                }
                Ok(())
            }
            ContractCall::ApproveAsGovernment(token_id) => {
                let record = existing(token_id)?;
                if from != self.government {
                    return Err("not government".into());
                }
                if !record.has_pending_transfer() {
                    return Err("no pending transfer".into());
                }
                Ok(())
            }
            ContractCall::UploadDocument { ipfs_hash } if ipfs_hash.is_empty() => {
                Err("empty ipfs hash".into())
            }
            ContractCall::UploadDocument { .. } | ContractCall::RegisterProperty(_) => Ok(()),
        }
    }

    fn apply(state: &mut MockChain, from: Address, call: &ContractCall) -> Vec<ContractEvent> {
        let mut events = Vec::new();
        match call {
            ContractCall::RequestTransfer {
                token_id,
                recipient,
            } => {
                if let Some(record) = state.records.get_mut(token_id) {
                    record.pending_owner = *recipient;
                    record.owner_approved = false;
                    record.govt_approved = false;
                    events.push(ContractEvent::TransferRequested {
                        token_id: *token_id,
                        from,
                        to: *recipient,
                    });
                }
            }
            ContractCall::ApproveAsOwner(token_id) => {
                if let Some(record) = state.records.get_mut(token_id) {
                    record.owner_approved = true;
                    events.push(ContractEvent::OwnerApproved {
                        token_id: *token_id,
                        owner: from,
                    });
                }
            }
            ContractCall::ApproveAsGovernment(token_id) => {
                if let Some(record) = state.records.get_mut(token_id) {
                    record.govt_approved = true;
                    events.push(ContractEvent::GovtApproved {
                        token_id: *token_id,
                        govt: from,
                    });
                }
            }
            ContractCall::UploadDocument { ipfs_hash } => {
                let token_id = TokenId(state.next_id);
                state.next_id += 1;
                state
                    .records
                    .insert(token_id, DocumentRecord::new(token_id, ipfs_hash.clone(), from));
                events.push(ContractEvent::DocumentCreated {
                    token_id,
                    ipfs_hash: ipfs_hash.clone(),
                    owner: from,
                });
            }
            ContractCall::RegisterProperty(_) => {}
        }

        // Finalize once both approvals are in.
        if let Some(token_id) = call.token_id() {
            if let Some(record) = state.records.get_mut(&token_id) {
                if record.has_pending_transfer() && record.owner_approved && record.govt_approved {
                    let previous = record.owner;
                    record.owner = record.pending_owner;
                    record.pending_owner = Address::ZERO;
                    record.owner_approved = false;
                    record.govt_approved = false;
                    events.push(ContractEvent::TransferCompleted {
                        token_id,
                        from: previous,
                        to: record.owner,
                    });
                }
            }
        }
        events
    }
}

#[async_trait]
impl RegistryReader for MockRegistry {
    async fn get_document(&self, token_id: TokenId) -> Result<DocumentRecord, RegistryError> {
        let mut state = self.state.lock();
        state.probes.push(token_id);
        if state.failing.contains(&token_id) {
            return Err(RegistryError::Transport("Mock failure".to_string()));
        }
        state
            .records
            .get(&token_id)
            .cloned()
            .ok_or(RegistryError::TokenNotFound(token_id))
    }

    async fn completed_transfers(&self) -> Result<Vec<CompletedTransfer>, RegistryError> {
        Ok(self.state.lock().completed.clone())
    }
}

#[async_trait]
impl RegistryWriter for MockRegistry {
    async fn estimate_gas(&self, from: Address, call: &ContractCall) -> Result<u64, RegistryError> {
        let state = self.state.lock();
        self.check(&state, from, call)
            .map_err(|reason| RegistryError::Rpc {
                code: 3,
                message: format!("execution reverted: {reason}"),
            })?;
        Ok(self.gas_estimate)
    }

    async fn send_transaction(
        &self,
        from: Address,
        call: &ContractCall,
        gas_limit: u64,
    ) -> Result<TxHash, RegistryError> {
        let (tx_hash, logs) = {
            let mut state = self.state.lock();
            if let Some(err) = state.reject_next.take() {
                return Err(err);
            }
            state.submitted.push(call.clone());
            state.gas_limits.push(gas_limit);
            state.nonce += 1;
            state.block_number += 1;
            let tx_hash = TxHash(Keccak256::digest(state.nonce.to_be_bytes()).into());
            let block_number = state.block_number;

            let (success, events) = if gas_limit < self.gas_estimate {
                (false, Vec::new())
            } else {
                match self.check(&state, from, call) {
                    Ok(()) => (true, Self::apply(&mut state, from, call)),
                    Err(_) => (false, Vec::new()),
                }
            };

            let logs: Vec<(ContractEvent, LogMeta)> = events
                .iter()
                .enumerate()
                .map(|(index, event)| {
                    let meta = LogMeta {
                        block_number,
                        tx_hash,
                        log_index: index as u64,
                    };
                    (event.clone(), meta)
                })
                .collect();
            for (event, meta) in &logs {
                if let ContractEvent::TransferCompleted { token_id, from, to } = event {
                    state.completed.push(CompletedTransfer {
                        token_id: *token_id,
                        from: *from,
                        to: *to,
                        meta: *meta,
                    });
                }
            }
            state.receipts.insert(
                tx_hash,
                TxReceipt {
                    tx_hash,
                    block_number,
                    success,
                    events,
                },
            );
            (tx_hash, logs)
        };

        if let Some(bus) = &self.bus {
            for (event, meta) in logs {
                bus.publish(RegistryEvent::from_log(event, meta)).await;
            }
        }
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, RegistryError> {
        if !self.confirmation_delay.is_zero() {
            tokio::time::sleep(self.confirmation_delay).await;
        }
        self.state
            .lock()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| RegistryError::Rpc {
                code: -32000,
                message: format!("unknown transaction {tx_hash}"),
            })
    }
}
