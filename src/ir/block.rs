//! Basic blocks.

use smallvec::SmallVec;

use super::arena::Id;
use super::inst::InstId;

/// Stable id of a basic block.
pub type BlockId = Id<BasicBlock>;

// =============================================================================
// Basic Block
// =============================================================================

/// A maximal straight-line instruction sequence ending in a terminator.
///
/// The block holds CFG adjacency (predecessors in edge-creation order,
/// successors in terminator order: a branch contributes `[on_true,
/// on_false]`) and the endpoints of its intrusive instruction list. The
/// list itself is threaded through each instruction's `prev`/`next` links
/// and mutated via the graph, which owns both arenas.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: SmallVec<[BlockId; 2]>,
    pub(crate) first_inst: InstId,
    pub(crate) last_inst: InstId,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            preds: Vec::new(),
            succs: SmallVec::new(),
            first_inst: InstId::INVALID,
            last_inst: InstId::INVALID,
        }
    }

    /// Unique 32-bit id within the graph.
    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Predecessor blocks, in the order their edges were created.
    ///
    /// Phi input slot i corresponds to `predecessors()[i]`.
    #[inline]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    /// Successor blocks, in terminator order.
    #[inline]
    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    /// First instruction of the block, `None` when empty.
    #[inline]
    pub fn first_inst(&self) -> Option<InstId> {
        if self.first_inst.is_valid() {
            Some(self.first_inst)
        } else {
            None
        }
    }

    /// Last instruction of the block, `None` when empty.
    #[inline]
    pub fn last_inst(&self) -> Option<InstId> {
        if self.last_inst.is_valid() {
            Some(self.last_inst)
        } else {
            None
        }
    }

    /// The predecessor-list slot of `pred`, used to address phi inputs.
    pub fn predecessor_index(&self, pred: BlockId) -> Option<usize> {
        self.preds.iter().position(|&p| p == pred)
    }

    pub(crate) fn add_predecessor(&mut self, pred: BlockId) {
        self.preds.push(pred);
    }

    pub(crate) fn add_successor(&mut self, succ: BlockId) {
        self.succs.push(succ);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_block() {
        let bb = BasicBlock::new(BlockId::new(0));
        assert_eq!(bb.id().index(), 0);
        assert!(bb.predecessors().is_empty());
        assert!(bb.successors().is_empty());
        assert!(bb.first_inst().is_none());
        assert!(bb.last_inst().is_none());
    }

    #[test]
    fn test_predecessor_index() {
        let mut bb = BasicBlock::new(BlockId::new(2));
        bb.add_predecessor(BlockId::new(0));
        bb.add_predecessor(BlockId::new(1));

        assert_eq!(bb.predecessor_index(BlockId::new(0)), Some(0));
        assert_eq!(bb.predecessor_index(BlockId::new(1)), Some(1));
        assert_eq!(bb.predecessor_index(BlockId::new(9)), None);
    }
}
