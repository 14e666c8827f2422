//! # Transfer History Service
//!
//! Completed transfers for the viewer, enriched with each document's content
//! locator. Locators never change, so they are cached.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{Address, TokenId};
use tracing::{debug, warn};

use crate::algorithms::select_history;
use crate::domain::{RegistryError, RoleSet, TransferHistoryEntry};
use crate::ports::RegistryReader;

/// Builds the viewer's transfer history.
pub struct HistoryService {
    reader: Arc<dyn RegistryReader>,
    ipfs_cache: Mutex<LruCache<TokenId, String>>,
}

impl HistoryService {
    /// Create a service caching up to `cache_size` locators.
    pub fn new(reader: Arc<dyn RegistryReader>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            reader,
            ipfs_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Transfers `viewer` took part in (all of them for government), newest first.
    pub async fn history_for(
        &self,
        viewer: &Address,
        roles: RoleSet,
    ) -> Result<Vec<TransferHistoryEntry>, RegistryError> {
        let transfers = self.reader.completed_transfers().await?;
        let selected = select_history(transfers, viewer, roles);
        debug!(viewer = %viewer, entries = selected.len(), "History selected");

        let mut entries = Vec::with_capacity(selected.len());
        for (transfer, relation) in selected {
            entries.push(TransferHistoryEntry {
                token_id: transfer.token_id,
                from: transfer.from,
                to: transfer.to,
                ipfs_hash: self.ipfs_hash(transfer.token_id).await,
                tx_hash: transfer.meta.tx_hash,
                block_number: transfer.meta.block_number,
                relation,
            });
        }
        Ok(entries)
    }

    /// Number of cached locators.
    pub fn cached(&self) -> usize {
        self.ipfs_cache.lock().len()
    }

    async fn ipfs_hash(&self, token_id: TokenId) -> Option<String> {
        let cached = self.ipfs_cache.lock().get(&token_id).cloned();
        if cached.is_some() {
            return cached;
        }
        match self.reader.get_document(token_id).await {
            Ok(record) if record.exists() => {
                self.ipfs_cache
                    .lock()
                    .put(token_id, record.ipfs_hash.clone());
                Some(record.ipfs_hash)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(token_id = token_id.0, error = %err, "Could not read document for history");
                None
            }
        }
    }
}
