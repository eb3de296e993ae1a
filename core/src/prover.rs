// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use alloy_primitives::{keccak256, Bytes, B256};
use tracing::trace;
use zkvot_lib::{
    aggregation::{
        run_composition, AggregationPublicInputs, AggregationPublicOutputs, CompositionStep,
    },
    prover::{AggregateProof, AggregateVerifier, Prover, ProverError, ProverResult},
    vote::VoteVerifier,
};

const NATIVE_AGGREGATE_DOMAIN: &[u8] = b"zkvot/native-aggregate/v1";

/// Checks the keccak seal produced by [`NativeProver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAggregateVerifier;

impl NativeAggregateVerifier {
    fn seal(
        public_input: &AggregationPublicInputs,
        public_output: &AggregationPublicOutputs,
    ) -> ProverResult<B256> {
        let input = bincode::serialize(public_input).map_err(|e| ProverError::Backend(e.to_string()))?;
        let output =
            bincode::serialize(public_output).map_err(|e| ProverError::Backend(e.to_string()))?;

        let mut buf = Vec::with_capacity(NATIVE_AGGREGATE_DOMAIN.len() + input.len() + output.len());
        buf.extend_from_slice(NATIVE_AGGREGATE_DOMAIN);
        buf.extend_from_slice(&input);
        buf.extend_from_slice(&output);
        Ok(keccak256(buf))
    }
}

impl AggregateVerifier for NativeAggregateVerifier {
    fn verify(&self, proof: &AggregateProof) -> bool {
        match Self::seal(&proof.public_input, &proof.public_output) {
            Ok(seal) => proof.proof.as_ref() == seal.as_slice(),
            Err(_) => false,
        }
    }
}

/// Runs the aggregation program in-process and seals its public values.
///
/// The seal commits to the outputs only; it is not a succinct argument. It
/// stands where a zkVM backend would plug in, behind the same [`Prover`] trait.
#[derive(Clone)]
pub struct NativeProver {
    vote_verifier: Arc<dyn VoteVerifier>,
}

impl NativeProver {
    pub fn new(vote_verifier: Arc<dyn VoteVerifier>) -> Self {
        Self { vote_verifier }
    }
}

impl AggregateVerifier for NativeProver {
    fn verify(&self, proof: &AggregateProof) -> bool {
        NativeAggregateVerifier.verify(proof)
    }
}

impl Prover for NativeProver {
    fn prove(
        &self,
        public_input: &AggregationPublicInputs,
        step: CompositionStep,
    ) -> ProverResult<AggregateProof> {
        trace!("Running the native prover for a {} step", step.name());

        let public_output =
            run_composition(public_input, &step, self.vote_verifier.as_ref(), self)?;
        let seal = NativeAggregateVerifier::seal(public_input, &public_output)?;

        Ok(AggregateProof {
            public_input: *public_input,
            public_output,
            proof: Bytes::copy_from_slice(seal.as_slice()),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use zkvot_lib::{
        aggregation::AggregationError,
        vote::{NativeVoteVerifier, VoteProof, VotePublicInputs},
    };

    use super::*;

    fn binding() -> AggregationPublicInputs {
        AggregationPublicInputs {
            election_id: B256::with_last_byte(9),
            voters_root: B256::with_last_byte(10),
        }
    }

    fn vote(nullifier: u64, option: u32) -> VoteProof {
        let binding = binding();
        VoteProof::native(
            VotePublicInputs {
                election_id: binding.election_id,
                voters_root: binding.voters_root,
            },
            option,
            U256::from(nullifier),
        )
    }

    fn prover() -> NativeProver {
        NativeProver::new(Arc::new(NativeVoteVerifier))
    }

    #[test]
    fn test_native_proof_verifies_and_is_deterministic() {
        let step = CompositionStep::BaseTwo {
            lower: vote(3, 1),
            upper: vote(9, 2),
        };
        let a = prover().prove(&binding(), step.clone()).unwrap();
        let b = prover().prove(&binding(), step).unwrap();
        assert_eq!(a, b);
        assert!(NativeAggregateVerifier.verify(&a));
    }

    #[test]
    fn test_tampered_output_fails_verification() {
        let mut proof = prover()
            .prove(&binding(), CompositionStep::BaseOne(vote(7, 2)))
            .unwrap();
        proof.public_output.total_count = 5;
        assert!(!NativeAggregateVerifier.verify(&proof));
    }

    #[test]
    fn test_prior_must_carry_valid_seal() {
        let mut prior = prover()
            .prove(&binding(), CompositionStep::BaseOne(vote(7, 2)))
            .unwrap();
        prior.public_output.range_lower = U256::from(8);
        let err = prover()
            .prove(
                &binding(),
                CompositionStep::AppendLeft {
                    prior,
                    vote: vote(1, 0),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProverError::Composition(AggregationError::InvalidPriorProof(..))
        ));
    }
}
