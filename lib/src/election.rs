// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::aggregation::AggregationPublicInputs;

/// Slots during which settlements are accepted: `[start_slot, end_slot)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementWindow {
    pub start_slot: u64,
    pub end_slot: u64,
}

impl SettlementWindow {
    pub fn is_valid(&self) -> bool {
        self.start_slot < self.end_slot
    }

    pub fn contains(&self, slot: u64) -> bool {
        self.start_slot <= slot && slot < self.end_slot
    }
}

/// Where the election's votes are published. Recorded as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayerInfo {
    pub first: B256,
    pub last: B256,
    pub commitment: B256,
}

/// Immutable parameters of one election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionParams {
    pub election_id: B256,
    pub voters_root: B256,
    pub settlement_window: SettlementWindow,
    #[serde(default)]
    pub storage_layer: StorageLayerInfo,
}

impl ElectionParams {
    pub fn public_input(&self) -> AggregationPublicInputs {
        AggregationPublicInputs {
            election_id: self.election_id,
            voters_root: self.voters_root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_half_open() {
        let window = SettlementWindow {
            start_slot: 10,
            end_slot: 20,
        };
        assert!(window.is_valid());
        assert!(!window.contains(9));
        assert!(window.contains(10));
        assert!(window.contains(19));
        assert!(!window.contains(20));
        assert!(!SettlementWindow {
            start_slot: 5,
            end_slot: 5
        }
        .is_valid());
    }
}
