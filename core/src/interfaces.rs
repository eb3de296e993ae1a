// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use zkvot_lib::{primitives::IncludedVotesHash, prover::ProverError};

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// The prover rejected a step or failed outright. Fatal for the run.
    #[error("There was an error with the prover: {0}")]
    Prover(#[from] ProverError),

    /// A child subtree's proof was neither produced in this run nor cached.
    #[error("No proof available for child subtree {0}")]
    MissingChildProof(IncludedVotesHash),

    #[error("Aggregation was cancelled")]
    Cancelled,

    /// A proving task panicked or was aborted.
    #[error("Proving task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// How inner nodes are scheduled.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// One node at a time, in tree traversal order.
    Sequential,
    /// Level by level, nodes of one height proven concurrently.
    #[default]
    Parallel,
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriveMode::Sequential => "sequential",
            DriveMode::Parallel => "parallel",
        })
    }
}

impl FromStr for DriveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(DriveMode::Sequential),
            "parallel" => Ok(DriveMode::Parallel),
            _ => Err(format!("Unknown drive mode: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_mode_parse() {
        assert_eq!("Sequential".parse::<DriveMode>(), Ok(DriveMode::Sequential));
        assert_eq!(" parallel ".parse::<DriveMode>(), Ok(DriveMode::Parallel));
        assert!("random".parse::<DriveMode>().is_err());
        assert_eq!(DriveMode::Parallel.to_string(), "parallel");
    }
}
