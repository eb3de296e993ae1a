// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Drives the aggregation program over an [`AggregationTree`].
//!
//! The tree is first walked top-down against the proof cache. A node whose
//! included-votes hash is cached, with a proof that covers exactly that node,
//! is not descended into: its whole subtree is skipped. The remaining nodes
//! are then proven bottom-up. Each fresh proof is written back to the cache,
//! and also kept for the rest of the run so a cache that fails to store it
//! cannot lose it.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use alloy_primitives::U256;
use dashmap::DashMap;
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zkvot_lib::{
    aggregation::{AggregationPublicInputs, CompositionStep},
    primitives::{included_votes_hash, IncludedVotesHash, Nullifier},
    prover::{AggregateProof, Prover},
    tree::{AggregationTree, InnerNode, Node, VoteLeaf},
    vote::{VoteProof, VoteVerifier},
};
use zkvot_proofdb::ProofCacheWrapper;

use crate::interfaces::{AggregatorError, AggregatorResult, DriveMode};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

/// Drop votes that would poison a tally before they reach the tree.
///
/// Rejects votes whose proof does not verify, votes bound to another election
/// or eligibility set, and repeated nullifiers (the first occurrence is kept).
pub fn prepare_leaves(
    public_input: &AggregationPublicInputs,
    votes: Vec<VoteProof>,
    verifier: &dyn VoteVerifier,
) -> Vec<VoteLeaf> {
    let mut seen = HashSet::new();
    let mut leaves = Vec::with_capacity(votes.len());
    for vote in votes {
        let nullifier = vote.nullifier();
        if !verifier.verify(&vote) {
            warn!("Dropping vote {nullifier}: proof does not verify");
        } else if !public_input.binds(&vote.public_input) {
            warn!("Dropping vote {nullifier}: bound to another election");
        } else if !seen.insert(nullifier) {
            warn!("Dropping vote {nullifier}: duplicate nullifier");
        } else {
            leaves.push(VoteLeaf::from(vote));
        }
    }
    leaves
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    /// Inner nodes in the tree.
    pub nodes_total: usize,
    pub cache_hits: usize,
    pub proofs_generated: usize,
    /// Nodes below a cache hit, never looked at.
    pub nodes_skipped: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationOutcome {
    pub root_proof: AggregateProof,
    /// Hash of every counted nullifier; `None` for an empty tally.
    pub included_votes_hash: Option<IncludedVotesHash>,
    pub report: AggregationReport,
}

/// What a proof stored under a subtree's hash has to claim to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Coverage {
    hash: IncludedVotesHash,
    range: (Nullifier, Nullifier),
    votes: u64,
}

impl From<&InnerNode> for Coverage {
    fn from(node: &InnerNode) -> Self {
        Coverage {
            hash: node.included_votes_hash(),
            range: node.range(),
            votes: node.included_votes().len() as u64,
        }
    }
}

impl Coverage {
    fn covered_by(&self, proof: &AggregateProof) -> bool {
        let output = &proof.public_output;
        (output.range_lower, output.range_upper) == self.range && output.total_count == self.votes
    }
}

#[derive(Debug, Clone)]
enum Child {
    Vote(VoteProof),
    Aggregate(Coverage),
}

impl From<&Node> for Child {
    fn from(node: &Node) -> Self {
        match node {
            Node::Leaf(leaf) => Child::Vote(leaf.vote_proof.clone()),
            Node::Inner(inner) => Child::Aggregate(inner.into()),
        }
    }
}

/// An inner node detached from the tree so it can move into a task.
#[derive(Debug, Clone)]
struct NodeJob {
    coverage: Coverage,
    height: usize,
    left: Child,
    right: Child,
}

impl From<&InnerNode> for NodeJob {
    fn from(node: &InnerNode) -> Self {
        NodeJob {
            coverage: node.into(),
            height: node.height(),
            left: node.left().into(),
            right: node.right().into(),
        }
    }
}

#[derive(Debug, Default)]
struct RunState {
    produced: DashMap<IncludedVotesHash, AggregateProof>,
    cache_hits: AtomicUsize,
    proofs_generated: AtomicUsize,
}

#[derive(Clone)]
pub struct Aggregator {
    public_input: AggregationPublicInputs,
    prover: Arc<dyn Prover>,
    cache: ProofCacheWrapper,
    concurrency_limit: usize,
    cancel: CancellationToken,
}

impl Aggregator {
    pub fn new(
        public_input: AggregationPublicInputs,
        prover: Arc<dyn Prover>,
        cache: ProofCacheWrapper,
    ) -> Self {
        Self {
            public_input,
            prover,
            cache,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn public_input(&self) -> &AggregationPublicInputs {
        &self.public_input
    }

    /// Prove `tree` and return its root aggregate proof.
    pub async fn run(
        &self,
        tree: &AggregationTree,
        mode: DriveMode,
    ) -> AggregatorResult<AggregationOutcome> {
        let started = Instant::now();
        let nodes_total = tree.traverse().len();
        info!(
            "Aggregating {} votes over {nodes_total} inner nodes ({mode})",
            tree.len()
        );
        debug!("Aggregation tree:\n{tree}");

        let state = Arc::new(RunState::default());
        let jobs = self.plan(tree, &state).await;
        let cache_hits = state.cache_hits.load(Ordering::Relaxed);
        let nodes_skipped = nodes_total - cache_hits - jobs.len();
        debug!(
            "{} nodes to prove, {cache_hits} cached, {nodes_skipped} skipped",
            jobs.len()
        );
        match mode {
            DriveMode::Sequential => self.run_sequential(jobs, &state).await?,
            DriveMode::Parallel => self.run_parallel(jobs, &state).await?,
        }

        let (root_proof, included_votes_hash) = match tree.root() {
            None => {
                let step = CompositionStep::BaseEmpty {
                    lower: U256::ZERO,
                    upper: U256::MAX,
                };
                (self.prove_step(step).await?, None)
            }
            Some(Node::Leaf(leaf)) => {
                let step = CompositionStep::BaseOne(leaf.vote_proof.clone());
                let hash = included_votes_hash(&[leaf.nullifier]);
                (self.prove_step(step).await?, Some(hash))
            }
            Some(Node::Inner(root)) => {
                let coverage = Coverage::from(root);
                (self.resolve(coverage, &state).await?, Some(coverage.hash))
            }
        };

        let report = AggregationReport {
            nodes_total,
            cache_hits: state.cache_hits.load(Ordering::Relaxed),
            proofs_generated: state.proofs_generated.load(Ordering::Relaxed),
            nodes_skipped,
            elapsed: started.elapsed(),
        };
        info!(
            "Aggregated {} votes in {:?}: {} proofs generated, {} cache hits",
            root_proof.total_count(),
            report.elapsed,
            report.proofs_generated,
            report.cache_hits
        );

        Ok(AggregationOutcome {
            root_proof,
            included_votes_hash,
            report,
        })
    }

    /// Nodes left to prove, children before parents. A node served from the
    /// cache is not descended into.
    async fn plan(&self, tree: &AggregationTree, state: &RunState) -> Vec<NodeJob> {
        let mut jobs = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(Node::Inner(root)) = tree.root() {
            queue.push_back(root);
        }
        while let Some(node) = queue.pop_front() {
            let job = NodeJob::from(node);
            if let Some(proof) = self.cached(&job.coverage).await {
                debug!(
                    "Cache hit for node {} ({} votes)",
                    job.coverage.hash, job.coverage.votes
                );
                state.produced.insert(job.coverage.hash, proof);
                state.cache_hits.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            for child in [node.left(), node.right()] {
                if let Node::Inner(inner) = child {
                    queue.push_back(inner);
                }
            }
            jobs.push(job);
        }
        // Level order reversed puts every node after its children.
        jobs.reverse();
        jobs
    }

    async fn run_sequential(&self, jobs: Vec<NodeJob>, state: &RunState) -> AggregatorResult<()> {
        for job in jobs {
            self.prove_node(job, state).await?;
        }
        Ok(())
    }

    /// Children always sit at a lower height than their parent, so every node
    /// of one height can be proven at once once the level below is done.
    async fn run_parallel(&self, jobs: Vec<NodeJob>, state: &Arc<RunState>) -> AggregatorResult<()> {
        let mut levels: BTreeMap<usize, Vec<NodeJob>> = BTreeMap::new();
        for job in jobs {
            levels.entry(job.height).or_default().push(job);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        for (height, level) in levels {
            debug!("Proving {} nodes at height {height}", level.len());
            let mut set = JoinSet::new();
            for job in level {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| AggregatorError::Cancelled)?;
                let this = self.clone();
                let state = state.clone();
                set.spawn(async move {
                    let _permit = permit;
                    this.prove_node(job, &state).await
                });
            }

            while let Some(result) = set.join_next().await {
                if let Err(e) = result? {
                    set.abort_all();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn prove_node(&self, job: NodeJob, state: &RunState) -> AggregatorResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AggregatorError::Cancelled);
        }

        let step = match (job.left, job.right) {
            (Child::Vote(lower), Child::Vote(upper)) => CompositionStep::BaseTwo { lower, upper },
            (Child::Vote(vote), Child::Aggregate(right)) => CompositionStep::AppendLeft {
                prior: self.resolve(right, state).await?,
                vote,
            },
            (Child::Aggregate(left), Child::Vote(vote)) => CompositionStep::AppendRight {
                prior: self.resolve(left, state).await?,
                vote,
            },
            (Child::Aggregate(left), Child::Aggregate(right)) => CompositionStep::Merge {
                left: self.resolve(left, state).await?,
                right: self.resolve(right, state).await?,
            },
        };

        let step_name = step.name();
        let started = Instant::now();
        let proof = self.prove_step(step).await?;
        info!(
            "Proved node {} ({} votes, {step_name}) in {:?}",
            job.coverage.hash,
            job.coverage.votes,
            started.elapsed()
        );

        let hash = job.coverage.hash;
        if let Err(e) = self.cache.put_proof(hash, &proof).await {
            warn!("Failed to cache proof for node {hash}: {e}");
        }
        state.produced.insert(hash, proof);
        state.proofs_generated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn prove_step(&self, step: CompositionStep) -> AggregatorResult<AggregateProof> {
        if self.cancel.is_cancelled() {
            return Err(AggregatorError::Cancelled);
        }
        let prover = self.prover.clone();
        let public_input = self.public_input;
        let proof = tokio::task::spawn_blocking(move || prover.prove(&public_input, step)).await??;
        Ok(proof)
    }

    /// A cached proof is only usable if it belongs to this election, verifies,
    /// and claims exactly the node's range and vote count.
    async fn cached(&self, coverage: &Coverage) -> Option<AggregateProof> {
        let hash = &coverage.hash;
        match self.cache.get_proof(hash).await {
            Ok(Some(proof))
                if proof.public_input != self.public_input || !self.prover.verify(&proof) =>
            {
                warn!("Ignoring cached proof for {hash}: foreign or invalid");
                None
            }
            Ok(Some(proof)) if !coverage.covered_by(&proof) => {
                let output = &proof.public_output;
                warn!(
                    "Ignoring cached proof for {hash}: covers {} votes over [{}, {}], node has {} over [{}, {}]",
                    output.total_count,
                    output.range_lower,
                    output.range_upper,
                    coverage.votes,
                    coverage.range.0,
                    coverage.range.1
                );
                None
            }
            Ok(Some(proof)) => Some(proof),
            Ok(None) => None,
            Err(e) => {
                warn!("Proof cache read failed for {hash}: {e}");
                None
            }
        }
    }

    async fn resolve(
        &self,
        coverage: Coverage,
        state: &RunState,
    ) -> AggregatorResult<AggregateProof> {
        let produced = state
            .produced
            .get(&coverage.hash)
            .map(|entry| entry.value().clone());
        if let Some(proof) = produced {
            return Ok(proof);
        }
        self.cached(&coverage)
            .await
            .ok_or(AggregatorError::MissingChildProof(coverage.hash))
    }
}
