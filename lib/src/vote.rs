// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The individual vote proof, as seen from the aggregation side.
//!
//! The membership/nullifier circuit that produces these proofs lives elsewhere;
//! aggregation only needs to verify a proof and read its public outputs.

use alloy_primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::primitives::Nullifier;

const NATIVE_VOTE_DOMAIN: &[u8] = b"zkvot/native-vote/v1";

/// Binds a vote to one election and one eligibility set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VotePublicInputs {
    pub election_id: B256,
    pub voters_root: B256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VotePublicOutputs {
    /// Option id chosen by the voter.
    pub vote: u32,
    pub nullifier: Nullifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteProof {
    pub public_input: VotePublicInputs,
    pub public_output: VotePublicOutputs,
    pub proof: Bytes,
}

impl VoteProof {
    pub fn nullifier(&self) -> Nullifier {
        self.public_output.nullifier
    }

    pub fn vote(&self) -> u32 {
        self.public_output.vote
    }

    /// Build a vote proof accepted by [`NativeVoteVerifier`].
    pub fn native(public_input: VotePublicInputs, vote: u32, nullifier: Nullifier) -> Self {
        let public_output = VotePublicOutputs { vote, nullifier };
        let proof = native_vote_seal(&public_input, &public_output);
        VoteProof {
            public_input,
            public_output,
            proof: Bytes::copy_from_slice(proof.as_slice()),
        }
    }
}

/// Verifier of individual vote proofs.
pub trait VoteVerifier: Send + Sync {
    fn verify(&self, proof: &VoteProof) -> bool;
}

/// Accepts vote proofs whose proof bytes are the keccak seal of their public
/// values. Used when no external vote circuit is wired in (local runs, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeVoteVerifier;

impl VoteVerifier for NativeVoteVerifier {
    fn verify(&self, proof: &VoteProof) -> bool {
        let expected = native_vote_seal(&proof.public_input, &proof.public_output);
        proof.proof.as_ref() == expected.as_slice()
    }
}

fn native_vote_seal(public_input: &VotePublicInputs, public_output: &VotePublicOutputs) -> B256 {
    let mut buf = Vec::with_capacity(NATIVE_VOTE_DOMAIN.len() + 32 + 32 + 4 + 32);
    buf.extend_from_slice(NATIVE_VOTE_DOMAIN);
    buf.extend_from_slice(public_input.election_id.as_slice());
    buf.extend_from_slice(public_input.voters_root.as_slice());
    buf.extend_from_slice(&public_output.vote.to_be_bytes());
    buf.extend_from_slice(&public_output.nullifier.to_be_bytes::<32>());
    keccak256(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn public_input() -> VotePublicInputs {
        VotePublicInputs {
            election_id: B256::with_last_byte(1),
            voters_root: B256::with_last_byte(2),
        }
    }

    #[test]
    fn test_native_vote_verifies() {
        let vote = VoteProof::native(public_input(), 3, U256::from(42));
        assert!(NativeVoteVerifier.verify(&vote));
        assert_eq!(vote.nullifier(), U256::from(42));
        assert_eq!(vote.vote(), 3);
    }

    #[test]
    fn test_tampered_vote_fails() {
        let mut vote = VoteProof::native(public_input(), 3, U256::from(42));
        vote.public_output.vote = 4;
        assert!(!NativeVoteVerifier.verify(&vote));

        let mut vote = VoteProof::native(public_input(), 3, U256::from(42));
        vote.public_input.voters_root = B256::ZERO;
        assert!(!NativeVoteVerifier.verify(&vote));
    }

    #[test]
    fn test_vote_proof_json_roundtrip() {
        let vote = VoteProof::native(public_input(), 1, U256::from(7));
        let json = serde_json::to_string(&vote).unwrap();
        let decoded: VoteProof = serde_json::from_str(&json).unwrap();
        assert_eq!(vote, decoded);
        assert!(NativeVoteVerifier.verify(&decoded));
    }
}
