// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::aggregation::{
    AggregationError, AggregationPublicInputs, AggregationPublicOutputs, CompositionStep,
};

#[derive(ThisError, Debug)]
pub enum ProverError {
    #[error("composition rejected: {0}")]
    Composition(#[from] AggregationError),
    #[error("prover backend failure: {0}")]
    Backend(String),
}

impl From<String> for ProverError {
    fn from(e: String) -> Self {
        ProverError::Backend(e)
    }
}

pub type ProverResult<T, E = ProverError> = core::result::Result<T, E>;

/// A succinct proof that some set of votes, all inside
/// `[range_lower, range_upper]`, were each counted exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateProof {
    pub public_input: AggregationPublicInputs,
    pub public_output: AggregationPublicOutputs,
    pub proof: Bytes,
}

impl AggregateProof {
    pub fn total_count(&self) -> u64 {
        self.public_output.total_count
    }

    pub fn encode(&self) -> ProverResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProverError::Backend(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> ProverResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ProverError::Backend(e.to_string()))
    }
}

pub trait AggregateVerifier: Send + Sync {
    fn verify(&self, proof: &AggregateProof) -> bool;
}

/// A backend able to run one composition step and attest to its result.
pub trait Prover: AggregateVerifier {
    fn prove(
        &self,
        public_input: &AggregationPublicInputs,
        step: CompositionStep,
    ) -> ProverResult<AggregateProof>;
}
