// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

pub use alloy_primitives::{keccak256, Address, B256, U256};

/// A voter's per-election unique token. Only its total order is ever relied on.
pub type Nullifier = U256;

/// Content address of a set of included votes.
pub type IncludedVotesHash = B256;

/// Hash a set of nullifiers into the cache key / audit value of the set.
///
/// The input is sorted first, so any two trees covering the same vote set
/// produce the same hash regardless of the order they were collected in.
pub fn included_votes_hash(nullifiers: &[Nullifier]) -> IncludedVotesHash {
    let mut sorted = nullifiers.to_vec();
    sorted.sort_unstable();
    hash_sorted_nullifiers(&sorted)
}

/// Same as [`included_votes_hash`] for a slice the caller guarantees is sorted.
pub(crate) fn hash_sorted_nullifiers(sorted: &[Nullifier]) -> IncludedVotesHash {
    let mut buf = Vec::with_capacity(sorted.len() * 32);
    for nullifier in sorted {
        buf.extend_from_slice(&nullifier.to_be_bytes::<32>());
    }
    keccak256(buf)
}

/// Hash of a serialized identity (an aggregator public key, a redeemer address).
pub fn identity_hash(identity: &[u8]) -> B256 {
    keccak256(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_included_votes_hash_is_order_independent() {
        let a = [U256::from(9), U256::from(3), U256::from(7)];
        let b = [U256::from(3), U256::from(7), U256::from(9)];
        assert_eq!(included_votes_hash(&a), included_votes_hash(&b));
    }

    #[test]
    fn test_included_votes_hash_distinguishes_sets() {
        let a = [U256::from(1), U256::from(2)];
        let b = [U256::from(1), U256::from(3)];
        assert_ne!(included_votes_hash(&a), included_votes_hash(&b));
        assert_ne!(included_votes_hash(&a), included_votes_hash(&a[..1]));
    }
}
