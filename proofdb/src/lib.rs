// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::{
    io::{Error as IOError, ErrorKind as IOErrorKind},
    path::PathBuf,
};

use rusqlite::Error as SqlError;
use tracing::trace;
use zkvot_lib::{primitives::IncludedVotesHash, prover::AggregateProof};

pub use crate::{adv_sqlite::SqliteProofCache, mem_db::InMemoryProofCache};

mod adv_sqlite;
mod mem_db;

// Types
// ----------------------------------------------------------------
#[derive(PartialEq, Debug, thiserror::Error)]
pub enum ProofCacheError {
    #[error("IO Error {0}")]
    IOError(IOErrorKind),
    #[error("SQL Error {0}")]
    SqlError(String),
    #[error("Codec Error {0}")]
    CodecError(String),
}

pub type ProofCacheResult<T> = Result<T, ProofCacheError>;

impl From<IOError> for ProofCacheError {
    fn from(error: IOError) -> ProofCacheError {
        ProofCacheError::IOError(error.kind())
    }
}

impl From<SqlError> for ProofCacheError {
    fn from(error: SqlError) -> ProofCacheError {
        ProofCacheError::SqlError(error.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProofCacheOpts {
    /// Persist proofs in this SQLite file. Proofs live in memory when unset.
    pub sqlite_file: Option<PathBuf>,
}

/// Content-addressed store of aggregate proofs, keyed by the hash of the
/// sorted nullifiers a proof covers.
///
/// Entries are immutable: the first `put` for a key wins and later ones are
/// ignored. Implementations are shared between tasks, so every method takes
/// `&self`.
#[async_trait::async_trait]
pub trait ProofCache: Send + Sync {
    /// Fetch the encoded proof stored under `key`.
    async fn get(&self, key: &IncludedVotesHash) -> ProofCacheResult<Option<Vec<u8>>>;

    /// Store an encoded proof. Returns whether this call inserted it.
    async fn put(&self, key: IncludedVotesHash, proof: &[u8]) -> ProofCacheResult<bool>;

    async fn contains(&self, key: &IncludedVotesHash) -> ProofCacheResult<bool>;

    /// All stored keys, sorted.
    async fn list_keys(&self) -> ProofCacheResult<Vec<IncludedVotesHash>>;

    /// Returns the total and detailed database size.
    async fn get_db_size(&self) -> ProofCacheResult<(usize, Vec<(String, usize)>)>;

    /// Drop every stored proof.
    async fn prune_db(&self) -> ProofCacheResult<()>;
}

#[derive(Debug, Clone)]
enum ProofCacheInstance {
    InMemory(InMemoryProofCache),
    Sqlite(SqliteProofCache),
}

#[derive(Debug, Clone)]
pub struct ProofCacheWrapper {
    cache: ProofCacheInstance,
}

impl ProofCacheWrapper {
    /// Decode the aggregate proof stored under `key`.
    pub async fn get_proof(
        &self,
        key: &IncludedVotesHash,
    ) -> ProofCacheResult<Option<AggregateProof>> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(None);
        };
        AggregateProof::decode(&bytes)
            .map(Some)
            .map_err(|e| ProofCacheError::CodecError(e.to_string()))
    }

    pub async fn put_proof(
        &self,
        key: IncludedVotesHash,
        proof: &AggregateProof,
    ) -> ProofCacheResult<bool> {
        let bytes = proof
            .encode()
            .map_err(|e| ProofCacheError::CodecError(e.to_string()))?;
        let inserted = self.put(key, &bytes).await?;
        trace!("cache put {key}: inserted={inserted}");
        Ok(inserted)
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.cache, ProofCacheInstance::Sqlite(_))
    }
}

#[async_trait::async_trait]
impl ProofCache for ProofCacheWrapper {
    async fn get(&self, key: &IncludedVotesHash) -> ProofCacheResult<Option<Vec<u8>>> {
        match &self.cache {
            ProofCacheInstance::InMemory(cache) => cache.get(key).await,
            ProofCacheInstance::Sqlite(cache) => cache.get(key).await,
        }
    }

    async fn put(&self, key: IncludedVotesHash, proof: &[u8]) -> ProofCacheResult<bool> {
        match &self.cache {
            ProofCacheInstance::InMemory(cache) => cache.put(key, proof).await,
            ProofCacheInstance::Sqlite(cache) => cache.put(key, proof).await,
        }
    }

    async fn contains(&self, key: &IncludedVotesHash) -> ProofCacheResult<bool> {
        match &self.cache {
            ProofCacheInstance::InMemory(cache) => cache.contains(key).await,
            ProofCacheInstance::Sqlite(cache) => cache.contains(key).await,
        }
    }

    async fn list_keys(&self) -> ProofCacheResult<Vec<IncludedVotesHash>> {
        match &self.cache {
            ProofCacheInstance::InMemory(cache) => cache.list_keys().await,
            ProofCacheInstance::Sqlite(cache) => cache.list_keys().await,
        }
    }

    async fn get_db_size(&self) -> ProofCacheResult<(usize, Vec<(String, usize)>)> {
        match &self.cache {
            ProofCacheInstance::InMemory(cache) => cache.get_db_size().await,
            ProofCacheInstance::Sqlite(cache) => cache.get_db_size().await,
        }
    }

    async fn prune_db(&self) -> ProofCacheResult<()> {
        match &self.cache {
            ProofCacheInstance::InMemory(cache) => cache.prune_db().await,
            ProofCacheInstance::Sqlite(cache) => cache.prune_db().await,
        }
    }
}

pub fn get_proof_cache(opts: &ProofCacheOpts) -> ProofCacheResult<ProofCacheWrapper> {
    let cache = match &opts.sqlite_file {
        Some(path) => ProofCacheInstance::Sqlite(SqliteProofCache::open_or_create(path)?),
        None => ProofCacheInstance::InMemory(InMemoryProofCache::new()),
    };
    Ok(ProofCacheWrapper { cache })
}

#[cfg(test)]
mod test {
    use super::*;
    use zkvot_lib::primitives::B256;

    #[tokio::test]
    async fn test_default_opts_use_memory() {
        let cache = get_proof_cache(&ProofCacheOpts::default()).unwrap();
        assert!(!cache.is_persistent());
        assert!(cache.put(B256::with_last_byte(1), b"proof").await.unwrap());
        assert_eq!(
            cache.get(&B256::with_last_byte(1)).await.unwrap(),
            Some(b"proof".to_vec())
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_codec_error() {
        let cache = get_proof_cache(&ProofCacheOpts::default()).unwrap();
        let key = B256::with_last_byte(2);
        cache.put(key, &[0xff]).await.unwrap();
        assert!(matches!(
            cache.get_proof(&key).await,
            Err(ProofCacheError::CodecError(_))
        ));
    }
}
