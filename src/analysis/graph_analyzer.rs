//! Reverse post-order numbering and dominator tree.
//!
//! Both analyses read the graph through a shared reference and keep their
//! results in side tables; the graph itself is never touched. Run
//! [`GraphAnalyzer::compute_rpo`] or [`GraphAnalyzer::build_dominator_tree`]
//! before querying; on an empty graph both produce empty results and all
//! queries answer `None`/`false`.
//!
//! # Dominators
//!
//! The dominator tree uses the Cooper/Harvey/Kennedy iterative scheme:
//! process blocks in reverse post-order, intersecting the already-computed
//! immediate dominators of each block's predecessors with a two-finger
//! walk, until a fixed point. Simple, and fast in practice on the shallow
//! CFGs a function produces.

use crate::ir::arena::{BitSet, SecondaryMap};
use crate::ir::block::{BasicBlock, BlockId};
use crate::ir::graph::Graph;

// =============================================================================
// Graph Analyzer
// =============================================================================

/// RPO and dominator-tree analysis over a [`Graph`].
pub struct GraphAnalyzer<'g> {
    graph: &'g Graph,

    /// Blocks reachable from entry, in reverse post-order.
    rpo: Vec<BlockId>,

    /// Position of each reachable block in `rpo`.
    rpo_numbers: SecondaryMap<BasicBlock, Option<u32>>,

    /// Immediate dominators; the entry maps to itself internally.
    idom: SecondaryMap<BasicBlock, BlockId>,
}

impl<'g> GraphAnalyzer<'g> {
    /// Create an analyzer over `graph` with no results computed yet.
    pub fn new(graph: &'g Graph) -> Self {
        GraphAnalyzer {
            graph,
            rpo: Vec::new(),
            rpo_numbers: SecondaryMap::new(),
            idom: SecondaryMap::new(),
        }
    }

    // =========================================================================
    // Reverse Post-Order
    // =========================================================================

    /// Number the blocks reachable from entry in reverse post-order.
    ///
    /// Successors are visited in stored order (a branch's true target
    /// first), which makes the resulting indices part of the contract.
    pub fn compute_rpo(&mut self) {
        self.rpo.clear();
        self.rpo_numbers.clear();

        let entry = match self.graph.entry_block() {
            Some(entry) => entry,
            None => return,
        };

        let mut visited = BitSet::with_capacity(self.graph.num_blocks());
        let mut postorder = Vec::with_capacity(self.graph.num_blocks());
        dfs_postorder(self.graph, entry, &mut visited, &mut postorder);

        postorder.reverse();
        for (i, &block) in postorder.iter().enumerate() {
            self.rpo_numbers.set(block, Some(i as u32));
        }
        self.rpo = postorder;
    }

    /// Reachable blocks in reverse post-order (entry first, when present).
    #[inline]
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    /// The RPO index of `block`, `None` if unreachable or not yet computed.
    pub fn rpo_number(&self, block: BlockId) -> Option<usize> {
        self.rpo_numbers
            .get(block)
            .copied()
            .flatten()
            .map(|n| n as usize)
    }

    // =========================================================================
    // Dominator Tree
    // =========================================================================

    /// Compute immediate dominators for every reachable block.
    ///
    /// Recomputes the RPO first, then iterates the CHK intersection to a
    /// fixed point.
    pub fn build_dominator_tree(&mut self) {
        self.compute_rpo();
        self.idom.clear();

        if self.rpo.is_empty() {
            return;
        }

        let graph = self.graph;
        let entry = self.rpo[0];
        for &block in &self.rpo {
            self.idom.set(block, BlockId::INVALID);
        }
        self.idom.set(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;

            for i in 1..self.rpo.len() {
                let block = self.rpo[i];
                let preds = graph.block(block).predecessors();

                // First predecessor whose dominator is already known.
                let mut new_idom = BlockId::INVALID;
                for &pred in preds {
                    if self.idom_raw(pred).is_valid() {
                        new_idom = pred;
                        break;
                    }
                }
                if !new_idom.is_valid() {
                    continue;
                }

                for &pred in preds {
                    if pred != new_idom && self.idom_raw(pred).is_valid() {
                        new_idom = self.intersect(new_idom, pred);
                    }
                }

                if self.idom_raw(block) != new_idom {
                    self.idom.set(block, new_idom);
                    changed = true;
                }
            }
        }
    }

    /// Two-finger walk towards the common dominator of `a` and `b`.
    fn intersect(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            while self.rpo_index(a) < self.rpo_index(b) {
                b = self.idom_raw(b);
            }
            while self.rpo_index(b) < self.rpo_index(a) {
                a = self.idom_raw(a);
            }
        }
        a
    }

    #[inline]
    fn rpo_index(&self, block: BlockId) -> u32 {
        self.rpo_numbers.get(block).copied().flatten().unwrap_or(0)
    }

    #[inline]
    fn idom_raw(&self, block: BlockId) -> BlockId {
        self.idom.get(block).copied().unwrap_or(BlockId::INVALID)
    }

    /// The immediate dominator of `block`.
    ///
    /// `None` for the entry block and for blocks unreachable from entry.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let idom = self.idom_raw(block);
        if idom.is_valid() && idom != block {
            Some(idom)
        } else {
            None
        }
    }

    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(idom) = self.idom(cur) {
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }
}

/// Post-order DFS following successor lists in stored order.
fn dfs_postorder(graph: &Graph, block: BlockId, visited: &mut BitSet, out: &mut Vec<BlockId>) {
    if visited.contains(block.as_usize()) {
        return;
    }
    visited.insert(block.as_usize());

    for &succ in graph.block(block).successors() {
        dfs_postorder(graph, succ, visited, out);
    }
    out.push(block);
}

// =============================================================================
// Tests
// =============================================================================
