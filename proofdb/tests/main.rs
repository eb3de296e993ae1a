// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, U256};
    use tempfile::tempdir;

    use zkvot_lib::{
        primitives::{included_votes_hash, B256},
        tally::VoteOptions,
        AggregateProof, AggregationPublicInputs, AggregationPublicOutputs,
    };
    use zkvot_proofdb::{get_proof_cache, ProofCache, ProofCacheOpts, ProofCacheWrapper};

    fn sample_proof(lower: u64, upper: u64) -> (B256, AggregateProof) {
        let key = included_votes_hash(&[U256::from(lower), U256::from(upper)]);
        let mut vote_options = VoteOptions::from_vote(1).unwrap();
        vote_options.add_vote(4).unwrap();
        let proof = AggregateProof {
            public_input: AggregationPublicInputs {
                election_id: B256::with_last_byte(0xe1),
                voters_root: B256::with_last_byte(0x70),
            },
            public_output: AggregationPublicOutputs {
                total_count: 2,
                range_lower: U256::from(lower),
                range_upper: U256::from(upper),
                vote_options,
            },
            proof: Bytes::from(key.to_vec()),
        };
        (key, proof)
    }

    fn sqlite_cache(dir: &tempfile::TempDir, name: &str) -> ProofCacheWrapper {
        get_proof_cache(&ProofCacheOpts {
            sqlite_file: Some(dir.path().join(name)),
        })
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_sqlite_proofs_survive_reopen() {
        let dir = tempdir().unwrap();
        let (key, proof) = sample_proof(3, 9);

        {
            let cache = sqlite_cache(&dir, "reopen.sqlite");
            assert!(cache.is_persistent());
            assert!(cache.put_proof(key, &proof).await.unwrap());
        }

        let cache = sqlite_cache(&dir, "reopen.sqlite");
        assert_eq!(cache.get_proof(&key).await.unwrap(), Some(proof));
        assert_eq!(cache.list_keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempdir().unwrap();
        for cache in [
            get_proof_cache(&ProofCacheOpts::default()).unwrap(),
            sqlite_cache(&dir, "missing.sqlite"),
        ] {
            assert_eq!(cache.get(&B256::ZERO).await.unwrap(), None);
            assert_eq!(cache.get_proof(&B256::ZERO).await.unwrap(), None);
            assert!(!cache.contains(&B256::ZERO).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_list_and_prune() {
        let dir = tempdir().unwrap();
        for cache in [
            get_proof_cache(&ProofCacheOpts::default()).unwrap(),
            sqlite_cache(&dir, "prune.sqlite"),
        ] {
            let mut keys = vec![];
            for (lower, upper) in [(1, 2), (5, 8), (13, 21)] {
                let (key, proof) = sample_proof(lower, upper);
                cache.put_proof(key, &proof).await.unwrap();
                keys.push(key);
            }
            keys.sort_unstable();
            assert_eq!(cache.list_keys().await.unwrap(), keys);

            let (size, details) = cache.get_db_size().await.unwrap();
            assert!(size > 0);
            assert_eq!(details.len(), 1);

            cache.prune_db().await.unwrap();
            assert!(cache.list_keys().await.unwrap().is_empty());
            assert_eq!(cache.get_db_size().await.unwrap().0, 0);
        }
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_concurrent_puts_keep_first_write() {
        let dir = tempdir().unwrap();
        for cache in [
            get_proof_cache(&ProofCacheOpts::default()).unwrap(),
            sqlite_cache(&dir, "concurrent.sqlite"),
        ] {
            let key = B256::with_last_byte(0x42);
            let mut handles = vec![];
            for writer in 0u8..16 {
                let cache = cache.clone();
                handles.push(tokio::spawn(async move {
                    let inserted = cache.put(key, &[writer; 8]).await.unwrap();
                    (writer, inserted)
                }));
            }

            let mut winners = vec![];
            for handle in handles {
                let (writer, inserted) = handle.await.unwrap();
                if inserted {
                    winners.push(writer);
                }
            }
            assert_eq!(winners.len(), 1);
            assert_eq!(cache.get(&key).await.unwrap(), Some(vec![winners[0]; 8]));
        }
    }
}
