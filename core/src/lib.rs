// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

pub mod aggregator;
pub mod interfaces;
pub mod prover;

pub use aggregator::{prepare_leaves, AggregationOutcome, AggregationReport, Aggregator};
pub use interfaces::{AggregatorError, AggregatorResult, DriveMode};
pub use prover::{NativeAggregateVerifier, NativeProver};
