// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use k256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zkvot_lib::{
    election::ElectionParams,
    prover::{AggregateProof, AggregateVerifier},
    tally::VoteOptions,
};

use crate::{
    reward::{aggregator_identity, aggregator_identity_hash, verify_redeem_claim, Redemption},
    SettlementError, SettlementResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Before the settlement window.
    Pending,
    /// Inside `[start_slot, end_slot)`.
    Settling,
    Finalized,
}

/// Current high-water mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub maximum_counted_votes: u64,
    pub vote_options: VoteOptions,
    pub last_aggregator_identity_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub aggregator: Bytes,
    pub vote_count: u64,
    pub slot: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedResults {
    pub total_count: u64,
    pub vote_options: VoteOptions,
    pub aggregator_identity_hash: Option<B256>,
}

fn ensure(expression: bool, error: SettlementError) -> SettlementResult<()> {
    if expression {
        Ok(())
    } else {
        Err(error)
    }
}

/// Settlement state of one election.
///
/// Every method either applies completely or returns an error and leaves the
/// state untouched.
pub struct ElectionContract {
    verifier: Arc<dyn AggregateVerifier>,
    params: Option<ElectionParams>,
    record: SettlementRecord,
    events: Vec<SettlementEvent>,
    reward_balance: u128,
    redemption: Option<Redemption>,
}

impl ElectionContract {
    pub fn new(verifier: Arc<dyn AggregateVerifier>) -> Self {
        Self {
            verifier,
            params: None,
            record: SettlementRecord::default(),
            events: Vec::new(),
            reward_balance: 0,
            redemption: None,
        }
    }

    pub fn initialize(&mut self, params: ElectionParams) -> SettlementResult<()> {
        ensure(self.params.is_none(), SettlementError::AlreadyInitialized)?;
        let window = params.settlement_window;
        ensure(
            window.is_valid(),
            SettlementError::InvalidWindow {
                start_slot: window.start_slot,
                end_slot: window.end_slot,
            },
        )?;

        info!(
            "Initialized election {} with settlement window [{}, {})",
            params.election_id, window.start_slot, window.end_slot
        );
        self.params = Some(params);
        self.record = SettlementRecord::default();
        Ok(())
    }

    fn params(&self) -> SettlementResult<&ElectionParams> {
        self.params.as_ref().ok_or(SettlementError::NotInitialized)
    }

    pub fn election_params(&self) -> Option<&ElectionParams> {
        self.params.as_ref()
    }

    pub fn phase(&self, now: u64) -> SettlementResult<Phase> {
        let window = self.params()?.settlement_window;
        Ok(if now < window.start_slot {
            Phase::Pending
        } else if now < window.end_slot {
            Phase::Settling
        } else {
            Phase::Finalized
        })
    }

    /// Adopt `proof` as the new tally if it beats the current one.
    pub fn settle_votes(
        &mut self,
        proof: &AggregateProof,
        aggregator_key: &VerifyingKey,
        now: u64,
    ) -> SettlementResult<SettlementEvent> {
        let params = self.params()?;
        let window = params.settlement_window;
        ensure(
            now >= window.start_slot,
            SettlementError::WindowNotOpen {
                now,
                start_slot: window.start_slot,
            },
        )?;
        ensure(
            now < window.end_slot,
            SettlementError::WindowClosed {
                now,
                end_slot: window.end_slot,
            },
        )?;
        ensure(self.verifier.verify(proof), SettlementError::InvalidProof)?;
        ensure(
            proof.public_input.election_id == params.election_id,
            SettlementError::ElectionMismatch,
        )?;
        ensure(
            proof.public_input.voters_root == params.voters_root,
            SettlementError::VotersRootMismatch,
        )?;
        let submitted = proof.public_output.total_count;
        let current = self.record.maximum_counted_votes;
        if submitted <= current {
            debug!("Rejecting settlement of {submitted} votes, {current} already settled");
            return Err(SettlementError::StaleCount { submitted, current });
        }

        self.record = SettlementRecord {
            maximum_counted_votes: submitted,
            vote_options: proof.public_output.vote_options,
            last_aggregator_identity_hash: Some(aggregator_identity_hash(aggregator_key)),
        };
        let event = SettlementEvent {
            aggregator: aggregator_identity(aggregator_key),
            vote_count: submitted,
            slot: now,
        };
        info!(
            "Settled {submitted} votes at slot {now} (aggregator {})",
            event.aggregator
        );
        self.events.push(event.clone());
        Ok(event)
    }

    pub fn get_finalized_results(&self, now: u64) -> SettlementResult<FinalizedResults> {
        let end_slot = self.params()?.settlement_window.end_slot;
        ensure(now >= end_slot, SettlementError::NotFinalized { now, end_slot })?;
        Ok(FinalizedResults {
            total_count: self.record.maximum_counted_votes,
            vote_options: self.record.vote_options,
            aggregator_identity_hash: self.record.last_aggregator_identity_hash,
        })
    }

    /// Deposit into the reward pool. Returns the new balance.
    pub fn fund_reward(&mut self, amount: u128) -> SettlementResult<u128> {
        self.params()?;
        self.reward_balance = self
            .reward_balance
            .checked_add(amount)
            .ok_or(SettlementError::RewardOverflow)?;
        Ok(self.reward_balance)
    }

    /// Pay `amount` to `redeemer` on behalf of the last settling aggregator.
    ///
    /// `signature` must be that aggregator's signature over
    /// [`crate::redeem_message`] for `redeemer`. The claim is single-use: the
    /// first successful redemption closes the reward, whatever balance remains.
    pub fn redeem_settlement_reward(
        &mut self,
        aggregator_key: &VerifyingKey,
        signature: &Signature,
        redeemer: Address,
        amount: u128,
        now: u64,
    ) -> SettlementResult<Redemption> {
        let end_slot = self.params()?.settlement_window.end_slot;
        ensure(now >= end_slot, SettlementError::NotFinalized { now, end_slot })?;
        ensure(self.redemption.is_none(), SettlementError::AlreadyRedeemed)?;
        let stored = self
            .record
            .last_aggregator_identity_hash
            .ok_or(SettlementError::NoSettlement)?;
        ensure(
            stored == aggregator_identity_hash(aggregator_key),
            SettlementError::AggregatorMismatch,
        )?;
        ensure(
            verify_redeem_claim(aggregator_key, &redeemer, signature),
            SettlementError::InvalidSignature,
        )?;
        ensure(
            amount <= self.reward_balance,
            SettlementError::InsufficientReward {
                available: self.reward_balance,
                requested: amount,
            },
        )?;

        self.reward_balance -= amount;
        let redemption = Redemption {
            redeemer,
            amount,
            slot: now,
        };
        info!("Redeemed settlement reward of {amount} to {redeemer}");
        self.redemption = Some(redemption);
        Ok(redemption)
    }

    pub fn record(&self) -> &SettlementRecord {
        &self.record
    }

    pub fn events(&self) -> &[SettlementEvent] {
        &self.events
    }

    pub fn reward_balance(&self) -> u128 {
        self.reward_balance
    }

    pub fn redemption(&self) -> Option<&Redemption> {
        self.redemption.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use k256::ecdsa::SigningKey;
    use zkvot_lib::{
        aggregation::{AggregationPublicInputs, AggregationPublicOutputs},
        election::{SettlementWindow, StorageLayerInfo},
    };

    use super::*;
    use crate::{reward::sign_redeem_claim, ErrorKind};

    /// Accepts proofs whose seal is non-empty.
    struct SealPresent;

    impl AggregateVerifier for SealPresent {
        fn verify(&self, proof: &AggregateProof) -> bool {
            !proof.proof.is_empty()
        }
    }

    fn params() -> ElectionParams {
        ElectionParams {
            election_id: B256::with_last_byte(1),
            voters_root: B256::with_last_byte(2),
            settlement_window: SettlementWindow {
                start_slot: 10,
                end_slot: 20,
            },
            storage_layer: StorageLayerInfo::default(),
        }
    }

    fn proof(total_count: u64) -> AggregateProof {
        let mut vote_options = VoteOptions::empty();
        for _ in 0..total_count {
            vote_options.add_vote(0).unwrap();
        }
        AggregateProof {
            public_input: AggregationPublicInputs {
                election_id: params().election_id,
                voters_root: params().voters_root,
            },
            public_output: AggregationPublicOutputs {
                total_count,
                range_lower: U256::ZERO,
                range_upper: U256::from(total_count),
                vote_options,
            },
            proof: Bytes::from_static(b"sealed"),
        }
    }

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_slice(&[byte; 32]).unwrap()
    }

    fn contract() -> ElectionContract {
        let mut contract = ElectionContract::new(Arc::new(SealPresent));
        contract.initialize(params()).unwrap();
        contract
    }

    #[test]
    fn test_initialize_once() {
        let mut contract = contract();
        assert_eq!(
            contract.initialize(params()),
            Err(SettlementError::AlreadyInitialized)
        );

        let mut fresh = ElectionContract::new(Arc::new(SealPresent));
        let mut bad = params();
        bad.settlement_window.end_slot = bad.settlement_window.start_slot;
        assert!(matches!(
            fresh.initialize(bad),
            Err(SettlementError::InvalidWindow { .. })
        ));
        assert_eq!(fresh.phase(0), Err(SettlementError::NotInitialized));
    }

    #[test]
    fn test_phase_follows_window() {
        let contract = contract();
        assert_eq!(contract.phase(9), Ok(Phase::Pending));
        assert_eq!(contract.phase(10), Ok(Phase::Settling));
        assert_eq!(contract.phase(19), Ok(Phase::Settling));
        assert_eq!(contract.phase(20), Ok(Phase::Finalized));
    }

    #[test]
    fn test_settle_outside_window() {
        let mut contract = contract();
        let err = contract
            .settle_votes(&proof(1), key(1).verifying_key(), 9)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryLater);
        let err = contract
            .settle_votes(&proof(1), key(1).verifying_key(), 20)
            .unwrap_err();
        assert_eq!(err, SettlementError::WindowClosed { now: 20, end_slot: 20 });
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(contract.record(), &SettlementRecord::default());
    }

    #[test]
    fn test_settle_rejects_foreign_and_invalid_proofs() {
        let mut contract = contract();
        let mut unsealed = proof(3);
        unsealed.proof = Bytes::new();
        assert_eq!(
            contract.settle_votes(&unsealed, key(1).verifying_key(), 12),
            Err(SettlementError::InvalidProof)
        );

        let mut foreign = proof(3);
        foreign.public_input.election_id = B256::ZERO;
        assert_eq!(
            contract.settle_votes(&foreign, key(1).verifying_key(), 12),
            Err(SettlementError::ElectionMismatch)
        );

        let mut other_root = proof(3);
        other_root.public_input.voters_root = B256::ZERO;
        assert_eq!(
            contract.settle_votes(&other_root, key(1).verifying_key(), 12),
            Err(SettlementError::VotersRootMismatch)
        );
        assert!(contract.events().is_empty());
    }

    #[test]
    fn test_high_water_mark_only_grows() {
        let mut contract = contract();
        let mut best = 0;
        for (slot, count) in [(10, 3), (11, 2), (12, 3), (13, 5), (14, 4), (15, 6)] {
            let result = contract.settle_votes(&proof(count), key(1).verifying_key(), slot);
            if count > best {
                assert_eq!(result.map(|event| event.vote_count), Ok(count));
                best = count;
            } else {
                assert_eq!(
                    result,
                    Err(SettlementError::StaleCount {
                        submitted: count,
                        current: best
                    })
                );
            }
            assert_eq!(contract.record().maximum_counted_votes, best);
        }
        assert_eq!(contract.events().len(), 3);
    }

    #[test]
    fn test_results_and_reward_after_window() {
        let mut contract = contract();
        let winner = key(4);
        let redeemer = Address::with_last_byte(0x99);
        contract.fund_reward(1_000).unwrap();
        contract.settle_votes(&proof(2), key(3).verifying_key(), 10).unwrap();
        contract.settle_votes(&proof(7), winner.verifying_key(), 11).unwrap();

        assert!(matches!(
            contract.get_finalized_results(19),
            Err(SettlementError::NotFinalized { .. })
        ));
        let results = contract.get_finalized_results(20).unwrap();
        assert_eq!(results.total_count, 7);
        assert_eq!(results.vote_options.count(0), 7);

        let signature = sign_redeem_claim(&winner, &redeemer).unwrap();
        // Outbid aggregator cannot claim.
        let loser_signature = sign_redeem_claim(&key(3), &redeemer).unwrap();
        assert_eq!(
            contract.redeem_settlement_reward(
                key(3).verifying_key(),
                &loser_signature,
                redeemer,
                10,
                20
            ),
            Err(SettlementError::AggregatorMismatch)
        );
        // Signature must name the redeemer.
        assert_eq!(
            contract.redeem_settlement_reward(
                winner.verifying_key(),
                &signature,
                Address::with_last_byte(0x01),
                10,
                20
            ),
            Err(SettlementError::InvalidSignature)
        );
        assert!(matches!(
            contract.redeem_settlement_reward(winner.verifying_key(), &signature, redeemer, 5_000, 20),
            Err(SettlementError::InsufficientReward { .. })
        ));

        let redemption = contract
            .redeem_settlement_reward(winner.verifying_key(), &signature, redeemer, 600, 21)
            .unwrap();
        assert_eq!(redemption.amount, 600);
        assert_eq!(contract.reward_balance(), 400);
        assert_eq!(
            contract.redeem_settlement_reward(winner.verifying_key(), &signature, redeemer, 1, 22),
            Err(SettlementError::AlreadyRedeemed)
        );
    }

    #[test]
    fn test_redeem_requires_a_settlement() {
        let mut contract = contract();
        let signer = key(4);
        let redeemer = Address::with_last_byte(0x99);
        let signature = sign_redeem_claim(&signer, &redeemer).unwrap();
        assert_eq!(
            contract.redeem_settlement_reward(signer.verifying_key(), &signature, redeemer, 0, 25),
            Err(SettlementError::NoSettlement)
        );
    }
}
