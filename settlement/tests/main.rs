// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Address, B256, U256};
    use k256::ecdsa::SigningKey;
    use pretty_assertions::assert_eq;
    use zkvot_core::{NativeAggregateVerifier, NativeProver};
    use zkvot_lib::{
        aggregation::CompositionStep,
        election::{ElectionParams, SettlementWindow, StorageLayerInfo},
        prover::{AggregateProof, Prover},
        vote::{NativeVoteVerifier, VoteProof, VotePublicInputs},
    };
    use zkvot_settlement::{sign_redeem_claim, ErrorKind, Ledger, Phase, SettlementError};

    fn params() -> ElectionParams {
        ElectionParams {
            election_id: B256::with_last_byte(0x5e),
            voters_root: B256::with_last_byte(0x7a),
            settlement_window: SettlementWindow {
                start_slot: 100,
                end_slot: 200,
            },
            storage_layer: StorageLayerInfo {
                first: B256::with_last_byte(1),
                last: B256::with_last_byte(2),
                commitment: B256::with_last_byte(3),
            },
        }
    }

    fn vote(nullifier: u64, option: u32) -> VoteProof {
        VoteProof::native(
            VotePublicInputs {
                election_id: params().election_id,
                voters_root: params().voters_root,
            },
            option,
            U256::from(nullifier),
        )
    }

    /// Chain appends over `nullifiers` (ascending) into one aggregate proof.
    fn tally(nullifiers: &[u64]) -> AggregateProof {
        let prover = NativeProver::new(Arc::new(NativeVoteVerifier));
        let public_input = params().public_input();
        let mut votes = nullifiers.iter().map(|n| vote(*n, (*n % 5) as u32));
        let Some(first) = votes.next() else {
            return prover
                .prove(
                    &public_input,
                    CompositionStep::BaseEmpty {
                        lower: U256::ZERO,
                        upper: U256::MAX,
                    },
                )
                .unwrap();
        };
        let mut proof = prover
            .prove(&public_input, CompositionStep::BaseOne(first))
            .unwrap();
        for vote in votes {
            proof = prover
                .prove(&public_input, CompositionStep::AppendRight { prior: proof, vote })
                .unwrap();
        }
        proof
    }

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_slice(&[byte; 32]).unwrap()
    }

    async fn ledger() -> Ledger {
        let ledger = Ledger::new(Arc::new(NativeAggregateVerifier));
        ledger.initialize(params()).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_clock_drives_phase() {
        let ledger = ledger().await;
        assert_eq!(ledger.phase().await, Ok(Phase::Pending));
        let err = ledger
            .settle_votes(&tally(&[1]), key(1).verifying_key())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryLater);

        assert_eq!(ledger.advance_to(100), 100);
        assert_eq!(ledger.phase().await, Ok(Phase::Settling));
        // The clock does not run backwards.
        assert_eq!(ledger.advance_to(50), 100);
        assert_eq!(ledger.advance_by(100), 200);
        assert_eq!(ledger.phase().await, Ok(Phase::Finalized));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_racing_aggregators_keep_monotonic_tally() {
        let ledger = ledger().await;
        ledger.advance_to(150);

        let mut handles = vec![];
        for size in 1..=8u64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let nullifiers: Vec<u64> = (1..=size).collect();
                let proof = tally(&nullifiers);
                ledger
                    .settle_votes(&proof, key(size as u8).verifying_key())
                    .await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => {
                    assert!(matches!(e, SettlementError::StaleCount { .. }));
                    assert_eq!(e.kind(), ErrorKind::RetryLater);
                }
            }
        }

        let events = ledger.events().await;
        assert_eq!(events.len(), accepted);
        assert!(events.windows(2).all(|pair| pair[0].vote_count < pair[1].vote_count));
        assert_eq!(ledger.record().await.maximum_counted_votes, 8);
    }

    #[tokio::test]
    async fn test_full_settlement_lifecycle() {
        let ledger = ledger().await;
        let winner = key(9);
        let redeemer = Address::with_last_byte(0x42);
        ledger.fund_reward(500).await.unwrap();

        ledger.advance_to(120);
        ledger
            .settle_votes(&tally(&[2, 4]), key(8).verifying_key())
            .await
            .unwrap();
        ledger
            .settle_votes(&tally(&[2, 4, 6, 8, 10]), winner.verifying_key())
            .await
            .unwrap();

        let signature = sign_redeem_claim(&winner, &redeemer).unwrap();
        assert!(matches!(
            ledger
                .redeem_settlement_reward(winner.verifying_key(), &signature, redeemer, 500)
                .await,
            Err(SettlementError::NotFinalized { .. })
        ));

        ledger.advance_to(200);
        let results = ledger.get_finalized_results().await.unwrap();
        assert_eq!(results.total_count, 5);
        assert_eq!(results.vote_options.total(), 5);

        let redemption = ledger
            .redeem_settlement_reward(winner.verifying_key(), &signature, redeemer, 500)
            .await
            .unwrap();
        assert_eq!(redemption.redeemer, redeemer);
        assert_eq!(ledger.reward_balance().await, 0);

        // Late settlements are refused once final.
        let err = ledger
            .settle_votes(&tally(&[1, 2, 3, 4, 5, 6]), key(7).verifying_key())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::WindowClosed { .. }));
    }
}
