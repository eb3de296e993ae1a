// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

pub mod aggregation;
pub mod election;
pub mod primitives;
pub mod prover;
pub mod tally;
pub mod tree;
pub mod vote;

pub use aggregation::{
    run_composition, AggregationError, AggregationPublicInputs, AggregationPublicOutputs,
    CompositionStep,
};
pub use prover::{AggregateProof, AggregateVerifier, Prover, ProverError, ProverResult};
pub use tree::{AggregationTree, InnerNode, Node, TreeError, VoteLeaf};
pub use vote::{NativeVoteVerifier, VoteProof, VotePublicInputs, VoteVerifier};
