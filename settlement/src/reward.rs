// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use k256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use serde::{Deserialize, Serialize};
use zkvot_lib::primitives::identity_hash;

use crate::{SettlementError, SettlementResult};

/// A paid-out settlement reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub redeemer: Address,
    pub amount: u128,
    pub slot: u64,
}

/// Compressed SEC1 encoding of an aggregator's public key.
pub fn aggregator_identity(key: &VerifyingKey) -> Bytes {
    let encoded_point = PublicKey::from(key).to_encoded_point(true);
    Bytes::copy_from_slice(encoded_point.as_bytes())
}

pub fn aggregator_identity_hash(key: &VerifyingKey) -> B256 {
    identity_hash(&aggregator_identity(key))
}

/// Digest an aggregator signs to send its reward to `redeemer`.
pub fn redeem_message(identity_hash: &B256, redeemer: &Address) -> B256 {
    let mut buf = [0u8; 52];
    buf[..32].copy_from_slice(identity_hash.as_slice());
    buf[32..].copy_from_slice(redeemer.as_slice());
    keccak256(buf)
}

pub fn sign_redeem_claim(key: &SigningKey, redeemer: &Address) -> SettlementResult<Signature> {
    let message = redeem_message(&aggregator_identity_hash(key.verifying_key()), redeemer);
    key.try_sign(message.as_slice())
        .map_err(|_| SettlementError::InvalidSignature)
}

pub fn verify_redeem_claim(key: &VerifyingKey, redeemer: &Address, signature: &Signature) -> bool {
    let message = redeem_message(&aggregator_identity_hash(key), redeemer);
    key.verify(message.as_slice(), signature).is_ok()
}
