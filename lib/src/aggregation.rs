// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The aggregation program.
//!
//! Six composition steps build an aggregate proof out of vote proofs and
//! earlier aggregate proofs. Every step that adds votes to an existing range
//! demands that the new votes lie strictly outside it, so no nullifier can ever
//! be counted twice. The program is a pure function over its inputs; a
//! [`crate::prover::Prover`] runs it and attests to the result.

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::trace;

use alloy_primitives::B256;

use crate::{
    primitives::Nullifier,
    prover::{AggregateProof, AggregateVerifier},
    tally::{TallyError, VoteOptions},
    vote::{VoteProof, VotePublicInputs, VoteVerifier},
};

/// Election binding shared by every vote and aggregate in one tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationPublicInputs {
    pub election_id: B256,
    pub voters_root: B256,
}

impl From<VotePublicInputs> for AggregationPublicInputs {
    fn from(input: VotePublicInputs) -> Self {
        AggregationPublicInputs {
            election_id: input.election_id,
            voters_root: input.voters_root,
        }
    }
}

impl AggregationPublicInputs {
    pub fn binds(&self, vote: &VotePublicInputs) -> bool {
        self.election_id == vote.election_id && self.voters_root == vote.voters_root
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationPublicOutputs {
    pub total_count: u64,
    pub range_lower: Nullifier,
    pub range_upper: Nullifier,
    pub vote_options: VoteOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionStep {
    BaseEmpty {
        lower: Nullifier,
        upper: Nullifier,
    },
    BaseOne(VoteProof),
    BaseTwo {
        lower: VoteProof,
        upper: VoteProof,
    },
    AppendLeft {
        prior: AggregateProof,
        vote: VoteProof,
    },
    AppendRight {
        prior: AggregateProof,
        vote: VoteProof,
    },
    Merge {
        left: AggregateProof,
        right: AggregateProof,
    },
}

impl CompositionStep {
    pub fn name(&self) -> &'static str {
        match self {
            CompositionStep::BaseEmpty { .. } => "base_empty",
            CompositionStep::BaseOne(_) => "base_one",
            CompositionStep::BaseTwo { .. } => "base_two",
            CompositionStep::AppendLeft { .. } => "append_left",
            CompositionStep::AppendRight { .. } => "append_right",
            CompositionStep::Merge { .. } => "merge",
        }
    }
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("vote proof for nullifier {0} does not verify")]
    InvalidVoteProof(Nullifier),
    #[error("prior aggregate proof over [{0}, {1}] does not verify")]
    InvalidPriorProof(Nullifier, Nullifier),
    #[error("public input does not match the aggregation's election binding")]
    PublicInputMismatch,
    #[error("empty range: lower {lower} is above upper {upper}")]
    EmptyRange { lower: Nullifier, upper: Nullifier },
    #[error("votes out of order: {lower} must be strictly below {upper}")]
    NotAscending { lower: Nullifier, upper: Nullifier },
    #[error("vote {vote} is not strictly below range lower bound {range_lower}")]
    VoteNotBelowRange {
        vote: Nullifier,
        range_lower: Nullifier,
    },
    #[error("vote {vote} is not strictly above range upper bound {range_upper}")]
    VoteNotAboveRange {
        vote: Nullifier,
        range_upper: Nullifier,
    },
    #[error("ranges touch or overlap: left upper {left_upper} >= right lower {right_lower}")]
    RangesOverlap {
        left_upper: Nullifier,
        right_lower: Nullifier,
    },
    #[error("vote count overflow")]
    CountOverflow,
    #[error(transparent)]
    Tally(#[from] TallyError),
}

pub type AggregationResult<T, E = AggregationError> = core::result::Result<T, E>;

fn ensure(expression: bool, error: AggregationError) -> AggregationResult<()> {
    if expression {
        Ok(())
    } else {
        Err(error)
    }
}

fn check_vote(
    public_input: &AggregationPublicInputs,
    vote: &VoteProof,
    verifier: &dyn VoteVerifier,
) -> AggregationResult<()> {
    ensure(
        verifier.verify(vote),
        AggregationError::InvalidVoteProof(vote.nullifier()),
    )?;
    ensure(
        public_input.binds(&vote.public_input),
        AggregationError::PublicInputMismatch,
    )
}

fn check_prior(
    public_input: &AggregationPublicInputs,
    prior: &AggregateProof,
    verifier: &dyn AggregateVerifier,
) -> AggregationResult<()> {
    ensure(
        verifier.verify(prior),
        AggregationError::InvalidPriorProof(
            prior.public_output.range_lower,
            prior.public_output.range_upper,
        ),
    )?;
    ensure(
        prior.public_input == *public_input,
        AggregationError::PublicInputMismatch,
    )
}

fn extend(prior: &AggregationPublicOutputs, vote: &VoteProof) -> AggregationResult<(u64, VoteOptions)> {
    let total_count = prior
        .total_count
        .checked_add(1)
        .ok_or(AggregationError::CountOverflow)?;
    let mut vote_options = prior.vote_options;
    vote_options.add_vote(vote.vote())?;
    Ok((total_count, vote_options))
}

/// Run one composition step.
///
/// Returns the public outputs the resulting aggregate proof commits to, or the
/// first precondition the inputs violate. Nothing is produced on failure.
pub fn run_composition(
    public_input: &AggregationPublicInputs,
    step: &CompositionStep,
    vote_verifier: &dyn VoteVerifier,
    aggregate_verifier: &dyn AggregateVerifier,
) -> AggregationResult<AggregationPublicOutputs> {
    trace!("running {} step", step.name());
    match step {
        CompositionStep::BaseEmpty { lower, upper } => {
            ensure(
                lower <= upper,
                AggregationError::EmptyRange {
                    lower: *lower,
                    upper: *upper,
                },
            )?;
            Ok(AggregationPublicOutputs {
                total_count: 0,
                range_lower: *lower,
                range_upper: *upper,
                vote_options: VoteOptions::empty(),
            })
        }
        CompositionStep::BaseOne(vote) => {
            check_vote(public_input, vote, vote_verifier)?;
            Ok(AggregationPublicOutputs {
                total_count: 1,
                range_lower: vote.nullifier(),
                range_upper: vote.nullifier(),
                vote_options: VoteOptions::from_vote(vote.vote())?,
            })
        }
        CompositionStep::BaseTwo { lower, upper } => {
            check_vote(public_input, lower, vote_verifier)?;
            check_vote(public_input, upper, vote_verifier)?;
            ensure(
                lower.nullifier() < upper.nullifier(),
                AggregationError::NotAscending {
                    lower: lower.nullifier(),
                    upper: upper.nullifier(),
                },
            )?;
            let mut vote_options = VoteOptions::from_vote(lower.vote())?;
            vote_options.add_vote(upper.vote())?;
            Ok(AggregationPublicOutputs {
                total_count: 2,
                range_lower: lower.nullifier(),
                range_upper: upper.nullifier(),
                vote_options,
            })
        }
        CompositionStep::AppendLeft { prior, vote } => {
            check_prior(public_input, prior, aggregate_verifier)?;
            check_vote(public_input, vote, vote_verifier)?;
            let prior = &prior.public_output;
            ensure(
                vote.nullifier() < prior.range_lower,
                AggregationError::VoteNotBelowRange {
                    vote: vote.nullifier(),
                    range_lower: prior.range_lower,
                },
            )?;
            let (total_count, vote_options) = extend(prior, vote)?;
            Ok(AggregationPublicOutputs {
                total_count,
                range_lower: vote.nullifier(),
                range_upper: prior.range_upper,
                vote_options,
            })
        }
        CompositionStep::AppendRight { prior, vote } => {
            check_prior(public_input, prior, aggregate_verifier)?;
            check_vote(public_input, vote, vote_verifier)?;
            let prior = &prior.public_output;
            ensure(
                prior.range_upper < vote.nullifier(),
                AggregationError::VoteNotAboveRange {
                    vote: vote.nullifier(),
                    range_upper: prior.range_upper,
                },
            )?;
            let (total_count, vote_options) = extend(prior, vote)?;
            Ok(AggregationPublicOutputs {
                total_count,
                range_lower: prior.range_lower,
                range_upper: vote.nullifier(),
                vote_options,
            })
        }
        CompositionStep::Merge { left, right } => {
            check_prior(public_input, left, aggregate_verifier)?;
            check_prior(public_input, right, aggregate_verifier)?;
            let (left, right) = (&left.public_output, &right.public_output);
            ensure(
                left.range_upper < right.range_lower,
                AggregationError::RangesOverlap {
                    left_upper: left.range_upper,
                    right_lower: right.range_lower,
                },
            )?;
            let total_count = left
                .total_count
                .checked_add(right.total_count)
                .ok_or(AggregationError::CountOverflow)?;
            Ok(AggregationPublicOutputs {
                total_count,
                range_lower: left.range_lower,
                range_upper: right.range_upper,
                vote_options: left.vote_options.checked_add(&right.vote_options)?,
            })
        }
    }
}
