// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Aggregation tree over vote leaves ordered by nullifier.
//!
//! Every inner node covers a contiguous run of the sorted nullifiers, and its
//! left subtree lies strictly below its right subtree. That ordering is what
//! lets each inner node be proven with a single composition step.

use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::{
    primitives::{hash_sorted_nullifiers, IncludedVotesHash, Nullifier},
    vote::VoteProof,
};

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("nullifier {0} is already in the tree")]
    DuplicateNullifier(Nullifier),
}

pub type TreeResult<T, E = TreeError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteLeaf {
    pub nullifier: Nullifier,
    pub vote_proof: VoteProof,
}

impl From<VoteProof> for VoteLeaf {
    fn from(vote_proof: VoteProof) -> Self {
        VoteLeaf {
            nullifier: vote_proof.nullifier(),
            vote_proof,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerNode {
    included_votes: Vec<Nullifier>,
    range: (Nullifier, Nullifier),
    left: Box<Node>,
    right: Box<Node>,
}

impl InnerNode {
    /// `left` must lie strictly below `right`.
    fn join(left: Node, right: Node) -> Self {
        debug_assert!(left.range().1 < right.range().0);
        let mut included_votes = left.nullifiers();
        included_votes.extend(right.nullifiers());
        InnerNode {
            included_votes,
            range: (left.range().0, right.range().1),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Sorted nullifiers of every leaf under this node.
    pub fn included_votes(&self) -> &[Nullifier] {
        &self.included_votes
    }

    pub fn range(&self) -> (Nullifier, Nullifier) {
        self.range
    }

    pub fn left(&self) -> &Node {
        &self.left
    }

    pub fn right(&self) -> &Node {
        &self.right
    }

    /// Cache key of the aggregate proof for this node.
    pub fn included_votes_hash(&self) -> IncludedVotesHash {
        hash_sorted_nullifiers(&self.included_votes)
    }

    pub fn height(&self) -> usize {
        1 + self.left.height().max(self.right.height())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(VoteLeaf),
    Inner(InnerNode),
}

impl Node {
    pub fn range(&self) -> (Nullifier, Nullifier) {
        match self {
            Node::Leaf(leaf) => (leaf.nullifier, leaf.nullifier),
            Node::Inner(inner) => inner.range,
        }
    }

    /// Leaves have height 0.
    pub fn height(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(inner) => inner.height(),
        }
    }

    pub fn nullifiers(&self) -> Vec<Nullifier> {
        match self {
            Node::Leaf(leaf) => vec![leaf.nullifier],
            Node::Inner(inner) => inner.included_votes.clone(),
        }
    }

    pub fn included_votes_hash(&self) -> IncludedVotesHash {
        match self {
            Node::Leaf(leaf) => hash_sorted_nullifiers(&[leaf.nullifier]),
            Node::Inner(inner) => inner.included_votes_hash(),
        }
    }

    fn contains(&self, nullifier: Nullifier) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.nullifier == nullifier,
            Node::Inner(inner) => inner.included_votes.binary_search(&nullifier).is_ok(),
        }
    }

    fn insert(self, leaf: VoteLeaf) -> Node {
        match self {
            Node::Leaf(existing) => {
                let (lower, upper) = if leaf.nullifier < existing.nullifier {
                    (leaf, existing)
                } else {
                    (existing, leaf)
                };
                Node::Inner(InnerNode::join(Node::Leaf(lower), Node::Leaf(upper)))
            }
            Node::Inner(mut inner) => {
                let nullifier = leaf.nullifier;
                inner.range = (inner.range.0.min(nullifier), inner.range.1.max(nullifier));
                let position = inner
                    .included_votes
                    .binary_search(&nullifier)
                    .unwrap_or_else(|position| position);
                inner.included_votes.insert(position, nullifier);

                if nullifier < inner.left.range().1 {
                    let left = *inner.left;
                    inner.left = Box::new(left.insert(leaf));
                } else {
                    let right = *inner.right;
                    inner.right = Box::new(right.insert(leaf));
                }
                Node::Inner(inner)
            }
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a VoteLeaf>) {
        match self {
            Node::Leaf(leaf) => out.push(leaf),
            Node::Inner(inner) => {
                inner.left.collect_leaves(out);
                inner.right.collect_leaves(out);
            }
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Node::Leaf(leaf) => writeln!(
                f,
                "{indent}leaf {} (option {})",
                leaf.nullifier,
                leaf.vote_proof.vote()
            ),
            Node::Inner(inner) => {
                writeln!(
                    f,
                    "{indent}[{}, {}] votes={} hash={}",
                    inner.range.0,
                    inner.range.1,
                    inner.included_votes.len(),
                    inner.included_votes_hash()
                )?;
                inner.left.write_indented(f, depth + 1)?;
                inner.right.write_indented(f, depth + 1)
            }
        }
    }
}

fn build_node(mut leaves: Vec<VoteLeaf>) -> Option<Node> {
    match leaves.len() {
        0 => None,
        1 => leaves.pop().map(Node::Leaf),
        len => {
            // Split [start, end] at (start + end) / 2; the left half keeps the midpoint.
            let mid = (len - 1) / 2;
            let right = leaves.split_off(mid + 1);
            let left = build_node(leaves)?;
            let right = build_node(right)?;
            Some(Node::Inner(InnerNode::join(left, right)))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationTree {
    root: Option<Node>,
}

impl AggregationTree {
    /// Build a balanced tree over `leaves`. Nullifiers must be pairwise distinct.
    pub fn build(mut leaves: Vec<VoteLeaf>) -> TreeResult<Self> {
        leaves.sort_unstable_by(|a, b| a.nullifier.cmp(&b.nullifier));
        if let Some(pair) = leaves
            .windows(2)
            .find(|pair| pair[0].nullifier == pair[1].nullifier)
        {
            return Err(TreeError::DuplicateNullifier(pair[0].nullifier));
        }
        let count = leaves.len();
        let tree = AggregationTree {
            root: build_node(leaves),
        };
        debug!("built aggregation tree over {count} votes, height {}", tree.height());
        Ok(tree)
    }

    /// Insert one leaf without rebalancing.
    pub fn insert(&mut self, leaf: VoteLeaf) -> TreeResult<()> {
        let Some(root) = self.root.take() else {
            self.root = Some(Node::Leaf(leaf));
            return Ok(());
        };
        if root.contains(leaf.nullifier) {
            let nullifier = leaf.nullifier;
            self.root = Some(root);
            return Err(TreeError::DuplicateNullifier(nullifier));
        }
        self.root = Some(root.insert(leaf));
        Ok(())
    }

    /// Inner nodes in an order where every node comes after both of its children.
    ///
    /// This is level order from the root, reversed, so the root is last.
    pub fn traverse(&self) -> Vec<&InnerNode> {
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(Node::Inner(root)) = &self.root {
            queue.push_back(root);
        }
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for child in [node.left(), node.right()] {
                if let Node::Inner(inner) = child {
                    queue.push_back(inner);
                }
            }
        }
        order.reverse();
        order
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        match &self.root {
            None => 0,
            Some(Node::Leaf(_)) => 1,
            Some(Node::Inner(inner)) => inner.included_votes.len(),
        }
    }

    pub fn height(&self) -> usize {
        self.root.as_ref().map(Node::height).unwrap_or_default()
    }

    /// Leaves in ascending nullifier order.
    pub fn leaves(&self) -> Vec<&VoteLeaf> {
        let mut out = Vec::with_capacity(self.len());
        if let Some(root) = &self.root {
            root.collect_leaves(&mut out);
        }
        out
    }
}

impl fmt::Display for AggregationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            None => writeln!(f, "<empty>"),
            Some(root) => root.write_indented(f, 0),
        }
    }
}
