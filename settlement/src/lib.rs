// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! On-ledger settlement of an election tally.
//!
//! Aggregators race to submit aggregate proofs during the settlement window.
//! A submission is adopted only if it verifies, belongs to this election, and
//! counts strictly more votes than the one before it. Once the window closes
//! the last adopted tally is final, and the aggregator that produced it may
//! claim the settlement reward.

use thiserror::Error as ThisError;

pub use crate::{
    contract::{ElectionContract, FinalizedResults, Phase, SettlementEvent, SettlementRecord},
    ledger::Ledger,
    reward::{
        aggregator_identity, aggregator_identity_hash, redeem_message, sign_redeem_claim,
        verify_redeem_claim, Redemption,
    },
};

mod contract;
mod ledger;
mod reward;

/// How a caller should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The call may succeed later (window not open yet, outbid by a concurrent settlement).
    RetryLater,
    /// The call can never succeed as submitted.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SettlementError {
    #[error("election is already initialized")]
    AlreadyInitialized,
    #[error("election is not initialized")]
    NotInitialized,
    #[error("settlement window [{start_slot}, {end_slot}) is empty")]
    InvalidWindow { start_slot: u64, end_slot: u64 },
    #[error("settlement opens at slot {start_slot}, current slot is {now}")]
    WindowNotOpen { now: u64, start_slot: u64 },
    #[error("settlement closed at slot {end_slot}, current slot is {now}")]
    WindowClosed { now: u64, end_slot: u64 },
    #[error("results are final from slot {end_slot}, current slot is {now}")]
    NotFinalized { now: u64, end_slot: u64 },
    #[error("aggregate proof does not verify")]
    InvalidProof,
    #[error("aggregate proof belongs to another election")]
    ElectionMismatch,
    #[error("aggregate proof was built against another voters root")]
    VotersRootMismatch,
    #[error("proof counts {submitted} votes, {current} already settled")]
    StaleCount { submitted: u64, current: u64 },
    #[error("no settlement has been recorded")]
    NoSettlement,
    #[error("key does not belong to the last settling aggregator")]
    AggregatorMismatch,
    #[error("invalid redeem signature")]
    InvalidSignature,
    #[error("settlement reward has already been redeemed")]
    AlreadyRedeemed,
    #[error("reward balance {available} is below requested {requested}")]
    InsufficientReward { available: u128, requested: u128 },
    #[error("reward balance overflow")]
    RewardOverflow,
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::WindowNotOpen { .. }
            | SettlementError::NotFinalized { .. }
            | SettlementError::StaleCount { .. } => ErrorKind::RetryLater,
            _ => ErrorKind::Rejected,
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
