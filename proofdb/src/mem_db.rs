// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

// Imports
// ----------------------------------------------------------------
use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::debug;
use zkvot_lib::primitives::IncludedVotesHash;

use crate::{ProofCache, ProofCacheResult};

#[derive(Debug, Clone, Default)]
pub struct InMemoryProofCache {
    db: Arc<Mutex<InMemoryProofDb>>,
}

#[derive(Debug, Default)]
pub struct InMemoryProofDb {
    proofs: HashMap<IncludedVotesHash, Vec<u8>>,
}

impl InMemoryProofDb {
    fn put(&mut self, key: IncludedVotesHash, proof: &[u8]) -> bool {
        if self.proofs.contains_key(&key) {
            debug!("Proof already cached: {key}");
            return false;
        }
        self.proofs.insert(key, proof.to_vec());
        true
    }

    fn size(&self) -> (usize, Vec<(String, usize)>) {
        let bytes = self.proofs.values().map(Vec::len).sum();
        (bytes, vec![("aggregate_proofs".to_owned(), bytes)])
    }
}

impl InMemoryProofCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProofCache for InMemoryProofCache {
    async fn get(&self, key: &IncludedVotesHash) -> ProofCacheResult<Option<Vec<u8>>> {
        let db = self.db.lock().await;
        Ok(db.proofs.get(key).cloned())
    }

    async fn put(&self, key: IncludedVotesHash, proof: &[u8]) -> ProofCacheResult<bool> {
        let mut db = self.db.lock().await;
        Ok(db.put(key, proof))
    }

    async fn contains(&self, key: &IncludedVotesHash) -> ProofCacheResult<bool> {
        let db = self.db.lock().await;
        Ok(db.proofs.contains_key(key))
    }

    async fn list_keys(&self) -> ProofCacheResult<Vec<IncludedVotesHash>> {
        let db = self.db.lock().await;
        let mut keys: Vec<_> = db.proofs.keys().copied().collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn get_db_size(&self) -> ProofCacheResult<(usize, Vec<(String, usize)>)> {
        let db = self.db.lock().await;
        Ok(db.size())
    }

    async fn prune_db(&self) -> ProofCacheResult<()> {
        let mut db = self.db.lock().await;
        db.proofs.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use zkvot_lib::primitives::B256;

    use super::*;

    #[test]
    fn test_db_first_write_wins() {
        let mut db = InMemoryProofDb::default();
        let key = B256::with_last_byte(7);
        assert!(db.put(key, b"first"));
        assert!(!db.put(key, b"second"));
        assert_eq!(db.proofs.get(&key).map(Vec::as_slice), Some(&b"first"[..]));
        assert_eq!(db.size().0, 5);
    }
}
