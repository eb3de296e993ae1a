// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Per-option vote counters.
//!
//! Counters are plain `u32`s. For a circuit the natural encoding is three
//! field-sized words holding seven 32-bit lanes each, most significant lane
//! first; [`VoteOptions::pack`] and [`VoteOptions::unpack`] convert between the two.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Number of options an election can offer. Option ids are `0..MAX_VOTE_OPTIONS`.
pub const MAX_VOTE_OPTIONS: usize = 21;
/// 32-bit lanes per packed word.
pub const OPTIONS_PER_WORD: usize = 7;
/// Packed words needed to carry every counter.
pub const PACKED_WORDS: usize = MAX_VOTE_OPTIONS / OPTIONS_PER_WORD;

const LANE_BITS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TallyError {
    #[error("vote option {0} is out of range (max {MAX_VOTE_OPTIONS})")]
    OptionOutOfRange(u32),
    #[error("counter overflow for option {0}")]
    Overflow(usize),
}

pub type TallyResult<T> = Result<T, TallyError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteOptions {
    counts: [u32; MAX_VOTE_OPTIONS],
}

impl VoteOptions {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A tally holding a single vote for `option`.
    pub fn from_vote(option: u32) -> TallyResult<Self> {
        let mut tally = Self::empty();
        tally.add_vote(option)?;
        Ok(tally)
    }

    pub fn add_vote(&mut self, option: u32) -> TallyResult<()> {
        let index = usize::try_from(option)
            .ok()
            .filter(|index| *index < MAX_VOTE_OPTIONS)
            .ok_or(TallyError::OptionOutOfRange(option))?;
        self.counts[index] = self.counts[index]
            .checked_add(1)
            .ok_or(TallyError::Overflow(index))?;
        Ok(())
    }

    /// Sum two tallies lane by lane.
    pub fn checked_add(&self, other: &VoteOptions) -> TallyResult<VoteOptions> {
        let mut counts = [0u32; MAX_VOTE_OPTIONS];
        for (index, count) in counts.iter_mut().enumerate() {
            *count = self.counts[index]
                .checked_add(other.counts[index])
                .ok_or(TallyError::Overflow(index))?;
        }
        Ok(VoteOptions { counts })
    }

    pub fn count(&self, option: u32) -> u32 {
        usize::try_from(option)
            .ok()
            .and_then(|index| self.counts.get(index).copied())
            .unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|count| u64::from(*count)).sum()
    }

    pub fn results(&self) -> &[u32] {
        &self.counts
    }

    pub fn pack(&self) -> [U256; PACKED_WORDS] {
        let mut words = [U256::ZERO; PACKED_WORDS];
        for (word_index, word) in words.iter_mut().enumerate() {
            for lane in 0..OPTIONS_PER_WORD {
                let count = U256::from(self.counts[word_index * OPTIONS_PER_WORD + lane]);
                let shift = LANE_BITS * (OPTIONS_PER_WORD - 1 - lane);
                *word |= count << shift;
            }
        }
        words
    }

    pub fn unpack(words: &[U256; PACKED_WORDS]) -> Self {
        let mask = U256::from(u32::MAX);
        let mut counts = [0u32; MAX_VOTE_OPTIONS];
        for (word_index, word) in words.iter().enumerate() {
            for lane in 0..OPTIONS_PER_WORD {
                let shift = LANE_BITS * (OPTIONS_PER_WORD - 1 - lane);
                let lane_value = (*word >> shift) & mask;
                counts[word_index * OPTIONS_PER_WORD + lane] = lane_value.to::<u32>();
            }
        }
        VoteOptions { counts }
    }
}
