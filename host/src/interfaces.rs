// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use zkvot_core::AggregatorError;
use zkvot_lib::tree::TreeError;
use zkvot_proofdb::ProofCacheError;

/// The standardized error returned by the zkvot host.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    /// For missing or malformed configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// For I/O errors.
    #[error("There was a I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// For Serde errors.
    #[error("There was a deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// For errors opening the proof cache.
    #[error("There was an error with the proof cache: {0}")]
    ProofCache(#[from] ProofCacheError),

    /// For errors building the aggregation tree.
    #[error("There was an error building the tree: {0}")]
    Tree(#[from] TreeError),

    /// For errors from the aggregation driver.
    #[error("There was an error with the aggregator: {0}")]
    Aggregator(#[from] AggregatorError),

    /// A catch-all error for any other error type.
    #[error("There was an unexpected error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<String> for HostError {
    fn from(msg: String) -> Self {
        HostError::Anyhow(anyhow::anyhow!(msg))
    }
}

/// A type alias for the standardized result type returned by the zkvot host.
pub type HostResult<T> = Result<T, HostError>;
