//! Natural-loop discovery and the loop nest tree.
//!
//! Analysis runs in four phases:
//! 1. **Back edges**: a DFS from entry records every edge whose target is
//!    still on the DFS stack
//! 2. **Population**: back edges are grouped by header; a reducible loop's
//!    body is found by walking predecessors backward from each latch
//!    through blocks the header dominates
//! 3. **Loop tree**: every loop is linked under its innermost enclosing
//!    loop, or under the synthetic root; every block is mapped to its
//!    innermost loop
//! 4. **Classification**: a loop is countable iff it is reducible and has
//!    exactly one back edge
//!
//! A loop whose header fails to dominate one of its latches is
//! irreducible; such a loop records only its header and latches, and no
//! body discovery is attempted.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write;

use super::graph_analyzer::GraphAnalyzer;
use crate::ir::arena::BitSet;
use crate::ir::block::BlockId;
use crate::ir::graph::Graph;

// =============================================================================
// Loop
// =============================================================================

/// A natural loop, or the synthetic root of the loop tree.
#[derive(Debug, Clone)]
pub struct Loop {
    /// The loop header; `INVALID` for the root loop.
    pub header: BlockId,

    /// Blocks belonging to the loop, header first. For the root: every
    /// block outside any loop.
    pub blocks: Vec<BlockId>,

    /// Back-edge sources targeting the header.
    pub latches: Vec<BlockId>,

    /// Indices of directly nested loops.
    pub inner: Vec<usize>,

    /// Index of the enclosing loop, `None` when directly under the root.
    pub outer: Option<usize>,

    /// Whether the header dominates every latch.
    pub reducible: bool,

    /// Whether the loop is reducible with exactly one back edge.
    pub countable: bool,
}

impl Loop {
    fn new(header: BlockId) -> Self {
        Loop {
            header,
            blocks: if header.is_valid() {
                vec![header]
            } else {
                Vec::new()
            },
            latches: Vec::new(),
            inner: Vec::new(),
            outer: None,
            reducible: true,
            countable: false,
        }
    }

    /// The header block, `None` for the root loop.
    pub fn header(&self) -> Option<BlockId> {
        if self.header.is_valid() {
            Some(self.header)
        } else {
            None
        }
    }

    /// Whether this is the synthetic root.
    pub fn is_root(&self) -> bool {
        !self.header.is_valid()
    }

    /// Whether `block` belongs to this loop.
    pub fn contains_block(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    fn add_block(&mut self, block: BlockId) {
        if !self.blocks.contains(&block) {
            self.blocks.push(block);
        }
    }

    fn add_latch(&mut self, latch: BlockId) {
        if !self.latches.contains(&latch) {
            self.latches.push(latch);
        }
    }
}

// =============================================================================
// Loop Analyzer
// =============================================================================

/// Discovers natural loops and builds the loop nest tree.
pub struct LoopAnalyzer<'g> {
    graph: &'g Graph,
    analyzer: GraphAnalyzer<'g>,

    /// All discovered loops, in header-first-seen order.
    loops: Vec<Loop>,

    /// The synthetic root: top-level loops plus blocks outside any loop.
    root: Loop,

    /// Back edges `(latch, header)` in DFS discovery order.
    back_edges: Vec<(BlockId, BlockId)>,

    header_to_loop: FxHashMap<BlockId, usize>,
    innermost: FxHashMap<BlockId, usize>,
}

impl<'g> LoopAnalyzer<'g> {
    /// Create an analyzer over `graph` with no results computed yet.
    pub fn new(graph: &'g Graph) -> Self {
        LoopAnalyzer {
            graph,
            analyzer: GraphAnalyzer::new(graph),
            loops: Vec::new(),
            root: Loop::new(BlockId::INVALID),
            back_edges: Vec::new(),
            header_to_loop: FxHashMap::default(),
            innermost: FxHashMap::default(),
        }
    }

    /// Run all four phases.
    pub fn analyze(&mut self) {
        self.loops.clear();
        self.root = Loop::new(BlockId::INVALID);
        self.back_edges.clear();
        self.header_to_loop.clear();
        self.innermost.clear();

        self.analyzer.build_dominator_tree();
        self.collect_back_edges();
        self.populate_loops();
        self.build_loop_tree();
        self.classify_loops();
    }

    // =========================================================================
    // Phase 1: Back Edges
    // =========================================================================

    fn collect_back_edges(&mut self) {
        let entry = match self.graph.entry_block() {
            Some(entry) => entry,
            None => return,
        };
        let mut visited = BitSet::with_capacity(self.graph.num_blocks());
        let mut on_stack = BitSet::with_capacity(self.graph.num_blocks());
        mark_dfs(
            self.graph,
            entry,
            &mut visited,
            &mut on_stack,
            &mut self.back_edges,
        );
    }

    // =========================================================================
    // Phase 2: Population
    // =========================================================================

    fn populate_loops(&mut self) {
        // Group latches per header, preserving discovery order.
        for i in 0..self.back_edges.len() {
            let (latch, header) = self.back_edges[i];
            let idx = match self.header_to_loop.get(&header) {
                Some(&idx) => idx,
                None => {
                    let idx = self.loops.len();
                    self.loops.push(Loop::new(header));
                    self.header_to_loop.insert(header, idx);
                    idx
                }
            };
            self.loops[idx].add_latch(latch);
        }

        // A single non-dominated latch makes the whole loop irreducible.
        for idx in 0..self.loops.len() {
            let header = self.loops[idx].header;
            let reducible = self.loops[idx]
                .latches
                .iter()
                .all(|&latch| self.analyzer.dominates(header, latch));
            self.loops[idx].reducible = reducible;

            if reducible {
                for li in 0..self.loops[idx].latches.len() {
                    let latch = self.loops[idx].latches[li];
                    self.find_loop_blocks(idx, latch);
                }
            } else {
                for li in 0..self.loops[idx].latches.len() {
                    let latch = self.loops[idx].latches[li];
                    self.loops[idx].add_block(latch);
                }
            }
        }
    }

    /// Walk predecessors backward from `latch`, collecting every block the
    /// header dominates, stopping at the header.
    fn find_loop_blocks(&mut self, loop_idx: usize, latch: BlockId) {
        let graph = self.graph;
        let header = self.loops[loop_idx].header;

        let mut stack = vec![latch];
        let mut visited = FxHashSet::default();
        visited.insert(latch);

        while let Some(cur) = stack.pop() {
            if cur == header {
                continue;
            }
            self.loops[loop_idx].add_block(cur);

            for &pred in graph.block(cur).predecessors() {
                if !visited.contains(&pred) && self.analyzer.dominates(header, pred) {
                    visited.insert(pred);
                    stack.push(pred);
                }
            }
        }
    }

    // =========================================================================
    // Phase 3: Loop Tree
    // =========================================================================

    fn build_loop_tree(&mut self) {
        // Pick each loop's enclosing loop: among loops containing this
        // header, the one whose own header the others contain.
        for i in 0..self.loops.len() {
            let header = self.loops[i].header;
            let mut outer: Option<usize> = None;
            for j in 0..self.loops.len() {
                if j == i || !self.loops[j].contains_block(header) {
                    continue;
                }
                outer = match outer {
                    None => Some(j),
                    Some(cur) if self.loops[cur].contains_block(self.loops[j].header) => Some(j),
                    Some(cur) => Some(cur),
                };
            }
            self.loops[i].outer = outer;
            match outer {
                Some(j) => self.loops[j].inner.push(i),
                None => self.root.inner.push(i),
            }
        }

        // Every ancestor owns its descendants' blocks.
        for i in 0..self.loops.len() {
            let blocks = self.loops[i].blocks.clone();
            let mut ancestor = self.loops[i].outer;
            while let Some(a) = ancestor {
                for &block in &blocks {
                    self.loops[a].add_block(block);
                }
                ancestor = self.loops[a].outer;
            }
        }

        // Map each block to its innermost loop; leftovers go to the root.
        for block in self.graph.block_ids() {
            let mut best: Option<usize> = None;
            for i in 0..self.loops.len() {
                if !self.loops[i].contains_block(block) {
                    continue;
                }
                best = match best {
                    None => Some(i),
                    Some(cur) if self.is_strictly_inner(i, cur) => Some(i),
                    Some(cur) => Some(cur),
                };
            }
            match best {
                Some(idx) => {
                    self.innermost.insert(block, idx);
                }
                None => self.root.add_block(block),
            }
        }
    }

    /// Whether loop `a` sits strictly below loop `of` in the tree.
    fn is_strictly_inner(&self, a: usize, of: usize) -> bool {
        let mut cur = self.loops[a].outer;
        while let Some(idx) = cur {
            if idx == of {
                return true;
            }
            cur = self.loops[idx].outer;
        }
        false
    }

    // =========================================================================
    // Phase 4: Classification
    // =========================================================================

    fn classify_loops(&mut self) {
        for loop_info in &mut self.loops {
            loop_info.countable = loop_info.reducible && loop_info.latches.len() == 1;
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All discovered loops, in header-first-seen order.
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The synthetic root loop.
    pub fn root_loop(&self) -> &Loop {
        &self.root
    }

    /// Back edges `(latch, header)` in discovery order.
    pub fn back_edges(&self) -> &[(BlockId, BlockId)] {
        &self.back_edges
    }

    /// Whether `block` heads a loop.
    pub fn is_loop_header(&self, block: BlockId) -> bool {
        self.header_to_loop.contains_key(&block)
    }

    /// The innermost loop containing `block`, `None` if it is in no loop.
    pub fn loop_for_block(&self, block: BlockId) -> Option<&Loop> {
        self.innermost.get(&block).map(|&idx| &self.loops[idx])
    }

    /// Every loop containing `block`, sorted outer to inner.
    pub fn loops_for_block(&self, block: BlockId) -> Vec<&Loop> {
        let mut chain = Vec::new();
        let mut cur = self.innermost.get(&block).copied();
        while let Some(idx) = cur {
            chain.push(&self.loops[idx]);
            cur = self.loops[idx].outer;
        }
        chain.reverse();
        chain
    }

    /// The dominator analysis computed as part of [`Self::analyze`].
    pub fn graph_analyzer(&self) -> &GraphAnalyzer<'g> {
        &self.analyzer
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Render the back edges and the loop nest for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        out.push_str("Back edges:\n");
        if self.back_edges.is_empty() {
            out.push_str("  (none)\n");
        }
        for &(latch, header) in &self.back_edges {
            let _ = writeln!(out, "  BB{} -> BB{}", latch.index(), header.index());
        }

        out.push_str("Loops:\n");
        if self.loops.is_empty() {
            out.push_str("  (none)\n");
        }
        for &idx in &self.root.inner {
            self.dump_loop(&mut out, idx, 2);
        }

        out.push_str("Blocks outside any loop:");
        if self.root.blocks.is_empty() {
            out.push_str(" -");
        } else {
            for (i, block) in self.root.blocks.iter().enumerate() {
                let _ = write!(out, "{}BB{}", if i == 0 { " " } else { ", " }, block.index());
            }
        }
        out.push('\n');
        out
    }

    fn dump_loop(&self, out: &mut String, idx: usize, indent: usize) {
        let loop_info = &self.loops[idx];
        let pad = " ".repeat(indent);
        let _ = writeln!(
            out,
            "{}Loop (header: BB{}, reducible: {}, countable: {})",
            pad,
            loop_info.header.index(),
            loop_info.reducible,
            loop_info.countable
        );

        let _ = write!(out, "{}  Blocks:", pad);
        for (i, block) in loop_info.blocks.iter().enumerate() {
            let _ = write!(out, "{}BB{}", if i == 0 { " " } else { ", " }, block.index());
        }
        out.push('\n');

        let _ = write!(out, "{}  Latches:", pad);
        for (i, latch) in loop_info.latches.iter().enumerate() {
            let _ = write!(out, "{}BB{}", if i == 0 { " " } else { ", " }, latch.index());
        }
        out.push('\n');

        for &inner in &loop_info.inner {
            self.dump_loop(out, inner, indent + 2);
        }
    }
}

/// DFS recording edges whose target is still on the stack.
fn mark_dfs(
    graph: &Graph,
    block: BlockId,
    visited: &mut BitSet,
    on_stack: &mut BitSet,
    back_edges: &mut Vec<(BlockId, BlockId)>,
) {
    visited.insert(block.as_usize());
    on_stack.insert(block.as_usize());

    for &succ in graph.block(block).successors() {
        if on_stack.contains(succ.as_usize()) {
            back_edges.push((block, succ));
        } else if !visited.contains(succ.as_usize()) {
            mark_dfs(graph, succ, visited, on_stack, back_edges);
        }
    }

    on_stack.remove(block.as_usize());
}

// =============================================================================
// Tests
// =============================================================================
