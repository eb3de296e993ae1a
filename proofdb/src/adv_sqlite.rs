// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! # Persistent proof cache
//!
//! Proving one inner node of an aggregation tree is the expensive step of a
//! tally, and different aggregators (or the same aggregator after a restart)
//! keep meeting the same vote subsets. Proofs are therefore stored by the
//! hash of the nullifier set they cover, so any tree shape that contains that
//! subset can reuse them.
//!
//! ## Implementation
//!
//! A single SQLite file in WAL mode holding one table of
//! `included_votes_hash -> encoded proof`. Rows are never updated: the first
//! writer for a key wins (`INSERT OR IGNORE`). The connection is opened in
//! exclusive locking mode and shared behind a mutex, so one process owns the
//! file at a time.

// Imports
// ----------------------------------------------------------------
use std::{fs::File, path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::{
    named_params, {Connection, OpenFlags},
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use zkvot_lib::primitives::{IncludedVotesHash, B256};

use crate::{ProofCache, ProofCacheError, ProofCacheResult};

// Types
// ----------------------------------------------------------------

#[derive(Debug)]
pub struct ProofDb {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct SqliteProofCache {
    arc_proof_db: Arc<Mutex<ProofDb>>,
}

// Implementation
// ----------------------------------------------------------------

impl ProofDb {
    fn open(path: &Path) -> ProofCacheResult<Connection> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(conn)
    }

    fn create(path: &Path) -> ProofCacheResult<Connection> {
        let _file = File::options()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path)?;

        let conn = Self::open(path)?;
        Self::create_tables(&conn)?;

        Ok(conn)
    }

    /// Open an existing ProofDb database at "path"
    /// If a database does not exist at the path, one is created.
    pub fn open_or_create(path: &Path) -> ProofCacheResult<Self> {
        let conn = if path.exists() {
            Self::open(path)
        } else {
            info!("Creating proof cache at {}", path.display());
            Self::create(path)
        }?;
        Ok(Self { conn })
    }

    // SQL
    // ----------------------------------------------------------------

    fn create_tables(conn: &Connection) -> ProofCacheResult<()> {
        // Bump proof_db_version if the encoding of stored proofs changes.
        conn.execute_batch(
            r#"
            -- Metadata
            -----------------------------------------------
            CREATE TABLE metadata(
              key BLOB UNIQUE NOT NULL PRIMARY KEY,
              value BLOB
            );

            INSERT INTO
              metadata(key, value)
            VALUES
              ('proof_db_version', 0);

            -- Data
            -----------------------------------------------
            -- The primary key is the keccak-256 of the sorted nullifiers
            -- the proof covers; it has an implied index.
            CREATE TABLE aggregate_proofs(
              included_votes_hash BLOB UNIQUE NOT NULL PRIMARY KEY,
              proof BLOB NOT NULL,
              created_at TIMESTAMP NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Set a tracer to debug SQL execution
    /// for example:
    ///   db.set_tracer(Some(|stmt| println!("sqlite:\n-------\n{}\n=======", stmt)));
    #[cfg(test)]
    #[allow(dead_code)]
    pub fn set_tracer(&mut self, trace_fn: Option<fn(_: &str)>) {
        self.conn.trace(trace_fn);
    }

    pub fn get(&self, key: &IncludedVotesHash) -> ProofCacheResult<Option<Vec<u8>>> {
        let mut statement = self.conn.prepare_cached(
            r#"
            SELECT
              proof
            FROM
              aggregate_proofs
            WHERE
              included_votes_hash = :included_votes_hash
            LIMIT
              1;
            "#,
        )?;
        let mut rows = statement.query(named_params! {
            ":included_votes_hash": key.as_slice(),
        })?;

        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: IncludedVotesHash, proof: &[u8]) -> ProofCacheResult<bool> {
        let mut statement = self.conn.prepare_cached(
            r#"
            INSERT OR IGNORE INTO
              aggregate_proofs(included_votes_hash, proof, created_at)
            VALUES
              (:included_votes_hash, :proof, :created_at);
            "#,
        )?;
        let changed = statement.execute(named_params! {
            ":included_votes_hash": key.as_slice(),
            ":proof": proof,
            ":created_at": Utc::now(),
        })?;

        if changed == 0 {
            debug!("Proof already cached: {key}");
        }
        Ok(changed == 1)
    }

    pub fn contains(&self, key: &IncludedVotesHash) -> ProofCacheResult<bool> {
        let mut statement = self.conn.prepare_cached(
            r#"
            SELECT
              EXISTS(
                SELECT 1 FROM aggregate_proofs
                WHERE included_votes_hash = :included_votes_hash
              );
            "#,
        )?;
        let exists = statement.query_row(
            named_params! {
                ":included_votes_hash": key.as_slice(),
            },
            |row| row.get::<_, bool>(0),
        )?;

        Ok(exists)
    }

    pub fn list_keys(&self) -> ProofCacheResult<Vec<IncludedVotesHash>> {
        let mut statement = self.conn.prepare_cached(
            r#"
            SELECT
              included_votes_hash
            FROM
              aggregate_proofs
            ORDER BY
              included_votes_hash;
            "#,
        )?;
        let query = statement.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        let raw = query.collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|bytes| {
                B256::try_from(bytes.as_slice())
                    .map_err(|e| ProofCacheError::CodecError(e.to_string()))
            })
            .collect()
    }

    pub fn get_db_size(&self) -> ProofCacheResult<(usize, Vec<(String, usize)>)> {
        let mut statement = self.conn.prepare_cached(
            r#"
            SELECT
              COALESCE(SUM(LENGTH(included_votes_hash) + LENGTH(proof)), 0)
            FROM
              aggregate_proofs;
            "#,
        )?;
        let bytes: i64 = statement.query_row([], |row| row.get(0))?;
        let bytes = usize::try_from(bytes).unwrap_or_default();

        Ok((bytes, vec![("aggregate_proofs".to_owned(), bytes)]))
    }

    pub fn prune_db(&self) -> ProofCacheResult<()> {
        let mut statement = self.conn.prepare_cached(
            r#"
            DELETE FROM
              aggregate_proofs;
            "#,
        )?;
        statement.execute([])?;

        Ok(())
    }
}

impl SqliteProofCache {
    pub fn open_or_create(path: &Path) -> ProofCacheResult<Self> {
        let db = ProofDb::open_or_create(path)?;
        Ok(Self {
            arc_proof_db: Arc::new(Mutex::new(db)),
        })
    }
}

#[async_trait::async_trait]
impl ProofCache for SqliteProofCache {
    async fn get(&self, key: &IncludedVotesHash) -> ProofCacheResult<Option<Vec<u8>>> {
        let proof_db = self.arc_proof_db.lock().await;
        proof_db.get(key)
    }

    async fn put(&self, key: IncludedVotesHash, proof: &[u8]) -> ProofCacheResult<bool> {
        let proof_db = self.arc_proof_db.lock().await;
        proof_db.put(key, proof)
    }

    async fn contains(&self, key: &IncludedVotesHash) -> ProofCacheResult<bool> {
        let proof_db = self.arc_proof_db.lock().await;
        proof_db.contains(key)
    }

    async fn list_keys(&self) -> ProofCacheResult<Vec<IncludedVotesHash>> {
        let proof_db = self.arc_proof_db.lock().await;
        proof_db.list_keys()
    }

    /// Returns the total and detailed database size
    async fn get_db_size(&self) -> ProofCacheResult<(usize, Vec<(String, usize)>)> {
        let proof_db = self.arc_proof_db.lock().await;
        proof_db.get_db_size()
    }

    async fn prune_db(&self) -> ProofCacheResult<()> {
        let proof_db = self.arc_proof_db.lock().await;
        proof_db.prune_db()
    }
}
