// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use alloy_primitives::Address;
use k256::ecdsa::{Signature, VerifyingKey};
use tokio::sync::Mutex;
use tracing::warn;
use zkvot_lib::{
    election::ElectionParams,
    prover::{AggregateProof, AggregateVerifier},
};

use crate::{
    contract::{ElectionContract, FinalizedResults, Phase, SettlementEvent, SettlementRecord},
    reward::Redemption,
    SettlementResult,
};

/// Shared handle to one election's settlement state and the ledger clock.
///
/// Calls are serialized by the lock, so of two racing submissions exactly one
/// observes the other's high-water mark.
#[derive(Clone)]
pub struct Ledger {
    contract: Arc<Mutex<ElectionContract>>,
    slot: Arc<AtomicU64>,
}

impl Ledger {
    pub fn new(verifier: Arc<dyn AggregateVerifier>) -> Self {
        Self {
            contract: Arc::new(Mutex::new(ElectionContract::new(verifier))),
            slot: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn current_slot(&self) -> u64 {
        self.slot.load(Ordering::SeqCst)
    }

    /// Move the clock forward. The clock never runs backwards.
    pub fn advance_to(&self, slot: u64) -> u64 {
        self.slot.fetch_max(slot, Ordering::SeqCst).max(slot)
    }

    pub fn advance_by(&self, slots: u64) -> u64 {
        self.slot.fetch_add(slots, Ordering::SeqCst) + slots
    }

    pub async fn initialize(&self, params: ElectionParams) -> SettlementResult<()> {
        self.contract.lock().await.initialize(params)
    }

    pub async fn phase(&self) -> SettlementResult<Phase> {
        let contract = self.contract.lock().await;
        contract.phase(self.current_slot())
    }

    pub async fn settle_votes(
        &self,
        proof: &AggregateProof,
        aggregator_key: &VerifyingKey,
    ) -> SettlementResult<SettlementEvent> {
        let mut contract = self.contract.lock().await;
        contract
            .settle_votes(proof, aggregator_key, self.current_slot())
            .map_err(|e| {
                warn!("Settlement rejected ({:?}): {e}", e.kind());
                e
            })
    }

    pub async fn get_finalized_results(&self) -> SettlementResult<FinalizedResults> {
        let contract = self.contract.lock().await;
        contract.get_finalized_results(self.current_slot())
    }

    pub async fn fund_reward(&self, amount: u128) -> SettlementResult<u128> {
        self.contract.lock().await.fund_reward(amount)
    }

    pub async fn redeem_settlement_reward(
        &self,
        aggregator_key: &VerifyingKey,
        signature: &Signature,
        redeemer: Address,
        amount: u128,
    ) -> SettlementResult<Redemption> {
        let mut contract = self.contract.lock().await;
        contract.redeem_settlement_reward(
            aggregator_key,
            signature,
            redeemer,
            amount,
            self.current_slot(),
        )
    }

    pub async fn record(&self) -> SettlementRecord {
        *self.contract.lock().await.record()
    }

    pub async fn events(&self) -> Vec<SettlementEvent> {
        self.contract.lock().await.events().to_vec()
    }

    pub async fn reward_balance(&self) -> u128 {
        self.contract.lock().await.reward_balance()
    }
}
