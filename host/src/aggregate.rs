// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! One batch aggregation run: load votes, rebuild the tree, prove the root.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::Arc,
};

use alloy_primitives::B256;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zkvot_core::{prepare_leaves, AggregationOutcome, AggregationReport, Aggregator, NativeProver};
use zkvot_lib::{
    prover::AggregateProof,
    tree::AggregationTree,
    vote::{NativeVoteVerifier, VoteProof, VoteVerifier},
};
use zkvot_proofdb::get_proof_cache;

use crate::{
    interfaces::{HostError, HostResult},
    Opts,
};

/// What a run writes to `--output-path`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationOutput {
    pub election_id: B256,
    pub total_count: u64,
    /// Votes per option, indexed by option.
    pub results: Vec<u32>,
    pub included_votes_hash: Option<B256>,
    pub report: AggregationReport,
    pub root_proof: AggregateProof,
}

impl From<AggregationOutcome> for AggregationOutput {
    fn from(outcome: AggregationOutcome) -> Self {
        let output = &outcome.root_proof.public_output;
        AggregationOutput {
            election_id: outcome.root_proof.public_input.election_id,
            total_count: output.total_count,
            results: output.vote_options.results().to_vec(),
            included_votes_hash: outcome.included_votes_hash,
            report: outcome.report,
            root_proof: outcome.root_proof,
        }
    }
}

pub fn load_votes(path: &Path) -> HostResult<Vec<VoteProof>> {
    let reader = BufReader::new(File::open(path)?);
    let votes: Vec<VoteProof> = serde_json::from_reader(reader)?;
    debug!("Loaded {} vote proofs from {}", votes.len(), path.display());
    Ok(votes)
}

pub fn write_output(path: &Path, output: &AggregationOutput) -> HostResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, output)?;
    info!("Wrote aggregate proof to {}", path.display());
    Ok(())
}

/// Aggregate `votes` for the configured election.
///
/// The tree is rebuilt from the full vote set every run; subtrees proven by an
/// earlier run are served from the proof cache.
pub async fn aggregate_votes(
    opts: &Opts,
    votes: Vec<VoteProof>,
    cancel: CancellationToken,
) -> HostResult<AggregationOutcome> {
    let election = opts.election_params()?;
    let public_input = election.public_input();
    let vote_verifier: Arc<dyn VoteVerifier> = Arc::new(NativeVoteVerifier);

    let submitted = votes.len();
    let leaves = prepare_leaves(&public_input, votes, vote_verifier.as_ref());
    info!(
        "Election {}: {} of {submitted} votes accepted",
        election.election_id,
        leaves.len()
    );
    let tree = AggregationTree::build(leaves)?;

    let cache = get_proof_cache(&opts.proof_cache_opts())?;
    let prover = Arc::new(NativeProver::new(vote_verifier));
    let aggregator = Aggregator::new(public_input, prover, cache)
        .with_concurrency_limit(opts.concurrency_limit())
        .with_cancellation(cancel);
    Ok(aggregator.run(&tree, opts.mode()).await?)
}

/// Full run from the configured votes file to the configured output file.
pub async fn run(opts: &Opts, cancel: CancellationToken) -> HostResult<AggregationOutput> {
    let votes_path = opts
        .votes_path
        .as_deref()
        .ok_or_else(|| HostError::InvalidConfig("no votes_path configured".to_owned()))?;
    let votes = load_votes(votes_path)?;
    let outcome = aggregate_votes(opts, votes, cancel).await?;
    let report = outcome.report;
    info!(
        "Aggregated {} votes: {} nodes, {} cached, {} skipped, {} proven in {:?}",
        outcome.root_proof.total_count(),
        report.nodes_total,
        report.cache_hits,
        report.nodes_skipped,
        report.proofs_generated,
        report.elapsed
    );

    let output = AggregationOutput::from(outcome);
    if let Some(path) = &opts.output_path {
        write_output(path, &output)?;
    }
    Ok(output)
}
