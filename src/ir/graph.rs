//! The IR graph: owner of all blocks, instructions, and use records.
//!
//! The graph provides:
//! - **Arena-based storage**: stable ids, deterministic bulk teardown
//! - **Use-def chains**: per-definition user lists for rewriting passes
//! - **Control flow structure**: entry block and pred/succ adjacency
//!
//! # Design Principles
//!
//! - **Single owner**: blocks, instructions, and users never outlive the
//!   graph; every cross-reference is a non-owning arena id
//! - **Raw construction**: the graph stores what it is given; shape and
//!   type rules are enforced by the [`IrBuilder`](super::builder::IrBuilder)
//! - **No analysis state**: analyses keep their results in side tables
//!
//! Callers must not mutate a graph while an analysis is reading it; the
//! core is single-threaded and this is a documented contract, not an
//! enforced one.

use super::arena::Arena;
use super::block::{BasicBlock, BlockId};
use super::inst::{InstData, InstId, Instruction, User, UserId};
use super::types::{Opcode, Type};

// =============================================================================
// Graph
// =============================================================================

/// An SSA function graph.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Basic blocks, in creation order.
    blocks: Arena<BasicBlock>,

    /// All instructions, including free-standing arguments.
    insts: Arena<Instruction>,

    /// Use records, threaded into per-definition chains.
    users: Arena<User>,

    /// Formal arguments, in declaration order.
    args: Vec<InstId>,

    /// The first block created.
    entry: BlockId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Graph {
            blocks: Arena::new(),
            insts: Arena::new(),
            users: Arena::new(),
            args: Vec::new(),
            entry: BlockId::INVALID,
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Create an empty basic block. The first block becomes the entry.
    pub fn create_block(&mut self) -> BlockId {
        let id = self.blocks.next_id();
        self.blocks.alloc(BasicBlock::new(id));
        if !self.entry.is_valid() {
            self.entry = id;
        }
        id
    }

    /// The entry block, `None` for an empty graph.
    pub fn entry_block(&self) -> Option<BlockId> {
        if self.entry.is_valid() {
            Some(self.entry)
        } else {
            None
        }
    }

    /// Look up a block.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Number of blocks.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter()
    }

    /// Iterate block ids in creation order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        self.blocks.ids()
    }

    /// Iterate a block's instructions front to back.
    pub fn block_insts(&self, block: BlockId) -> BlockInsts<'_> {
        BlockInsts {
            graph: self,
            cur: self.blocks[block].first_inst,
        }
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    /// Look up an instruction.
    #[inline]
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id]
    }

    #[inline]
    pub(crate) fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.insts[id]
    }

    /// Number of instructions, arguments included.
    #[inline]
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Iterate every instruction in creation order.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Instruction)> {
        self.insts.iter()
    }

    /// Formal arguments, in declaration order.
    #[inline]
    pub fn arguments(&self) -> &[InstId] {
        &self.args
    }

    /// Allocate a detached instruction with the next id.
    pub(crate) fn alloc_inst(&mut self, opcode: Opcode, ty: Type, data: InstData) -> InstId {
        let id = self.insts.next_id();
        self.insts.alloc(Instruction::new(id, opcode, ty, data))
    }

    pub(crate) fn push_argument(&mut self, arg: InstId) {
        self.args.push(arg);
    }

    /// Append a detached instruction at the tail of `block`.
    pub(crate) fn attach_append(&mut self, block: BlockId, inst: InstId) {
        let last = self.blocks[block].last_inst;
        if last.is_valid() {
            self.insts[last].next = inst;
            self.insts[inst].prev = last;
        } else {
            self.blocks[block].first_inst = inst;
        }
        self.blocks[block].last_inst = inst;
        self.insts[inst].block = block;
    }

    /// Prepend a detached instruction at the head of `block` (phis).
    pub(crate) fn attach_prepend(&mut self, block: BlockId, inst: InstId) {
        let first = self.blocks[block].first_inst;
        if first.is_valid() {
            self.insts[first].prev = inst;
            self.insts[inst].next = first;
        } else {
            self.blocks[block].last_inst = inst;
        }
        self.blocks[block].first_inst = inst;
        self.insts[inst].block = block;
    }

    /// Link a detached instruction immediately before `anchor` in `block`.
    ///
    /// Keeps the terminator in tail position when a pass materializes
    /// replacement values next to the instruction they replace.
    pub(crate) fn attach_before(&mut self, block: BlockId, anchor: InstId, inst: InstId) {
        debug_assert_eq!(self.insts[anchor].block, block);
        let prev = self.insts[anchor].prev;
        self.insts[inst].next = anchor;
        self.insts[inst].prev = prev;
        self.insts[anchor].prev = inst;
        if prev.is_valid() {
            self.insts[prev].next = inst;
        } else {
            self.blocks[block].first_inst = inst;
        }
        self.insts[inst].block = block;
    }

    // =========================================================================
    // Use-Def Chains
    // =========================================================================

    /// Record that input slot `input_idx` of `user_inst` reads `def`.
    ///
    /// The new record is pushed at the head of `def`'s chain.
    pub fn register_use(&mut self, def: InstId, user_inst: InstId, input_idx: u32) -> UserId {
        let head = self.insts[def].first_user;
        let id = self.users.alloc(User {
            inst: user_inst,
            input_index: input_idx,
            next: head,
        });
        self.insts[def].first_user = id;
        id
    }

    /// Look up a use record.
    #[inline]
    pub fn user(&self, id: UserId) -> &User {
        &self.users[id]
    }

    /// Iterate the use chain of `def`, most recent use first.
    pub fn users(&self, def: InstId) -> Users<'_> {
        Users {
            graph: self,
            cur: self.insts[def].first_user,
        }
    }

    /// Number of use records in `def`'s chain.
    pub fn use_count(&self, def: InstId) -> usize {
        self.users(def).count()
    }

    /// Redirect every use of `old` to `new`.
    ///
    /// Each record in `old`'s chain has its user's input slot rewritten to
    /// `new`; the records themselves are spliced onto `new`'s chain. `old`
    /// is left in place with an empty chain; removing it is a later
    /// dead-code pass's job.
    pub fn replace_all_uses(&mut self, old: InstId, new: InstId) {
        if old == new {
            return;
        }
        let head = self.insts[old].first_user;
        if !head.is_valid() {
            return;
        }

        // Rewrite inputs and find the chain tail.
        let mut cur = head;
        let tail = loop {
            let (user_inst, slot, next) = {
                let user = &self.users[cur];
                (user.inst, user.input_index as usize, user.next)
            };
            self.insts[user_inst].inputs[slot] = new;
            if !next.is_valid() {
                break cur;
            }
            cur = next;
        };

        // Splice the whole chain onto new's chain.
        self.users[tail].next = self.insts[new].first_user;
        self.insts[new].first_user = head;
        self.insts[old].first_user = UserId::INVALID;
    }

    // =========================================================================
    // Consistency Checking
    // =========================================================================

    /// Check structural invariants, returning the first violation found.
    ///
    /// Checks use-chain/input agreement, block backlinks and sibling
    /// linkage, CFG edge symmetry, phi placement, and terminator position.
    pub fn verify(&self) -> Result<(), String> {
        // Every non-null input has exactly one matching use record.
        for (id, inst) in self.insts.iter() {
            for (slot, &input) in inst.inputs.iter().enumerate() {
                if !input.is_valid() {
                    continue;
                }
                let matching = self
                    .users(input)
                    .filter(|u| u.inst == id && u.input_index as usize == slot)
                    .count();
                if matching != 1 {
                    return Err(format!(
                        "i{} input {} has {} use records on i{}, expected 1",
                        id.index(),
                        slot,
                        matching,
                        input.index()
                    ));
                }
            }
        }

        // Block lists: backlinks, sibling order, phi prefix, terminator tail.
        for (bid, bb) in self.blocks.iter() {
            let mut prev = InstId::INVALID;
            let mut seen_non_phi = false;
            let mut cur = bb.first_inst;
            while cur.is_valid() {
                let inst = &self.insts[cur];
                if inst.block != bid {
                    return Err(format!(
                        "i{} is in BB{}'s list but points at a different block",
                        cur.index(),
                        bid.index()
                    ));
                }
                if inst.prev != prev {
                    return Err(format!("i{} has a stale prev link", cur.index()));
                }
                if inst.is_phi() {
                    if seen_non_phi {
                        return Err(format!(
                            "phi i{} appears after a non-phi in BB{}",
                            cur.index(),
                            bid.index()
                        ));
                    }
                } else {
                    seen_non_phi = true;
                }
                if inst.is_terminator() && inst.next.is_valid() {
                    return Err(format!(
                        "terminator i{} is not last in BB{}",
                        cur.index(),
                        bid.index()
                    ));
                }
                prev = cur;
                cur = inst.next;
            }
            if bb.last_inst != prev {
                return Err(format!("BB{} has a stale last-instruction link", bid.index()));
            }
        }

        // CFG edges are symmetric.
        for (bid, bb) in self.blocks.iter() {
            for &succ in bb.successors() {
                if !self.blocks[succ].preds.contains(&bid) {
                    return Err(format!(
                        "BB{} -> BB{} has no matching predecessor entry",
                        bid.index(),
                        succ.index()
                    ));
                }
            }
            for &pred in bb.predecessors() {
                if !self.blocks[pred].succs.contains(&bid) {
                    return Err(format!(
                        "BB{} <- BB{} has no matching successor entry",
                        bid.index(),
                        pred.index()
                    ));
                }
            }
        }

        // Arguments are free-standing and correctly indexed.
        for (index, &arg) in self.args.iter().enumerate() {
            let inst = &self.insts[arg];
            if inst.opcode != Opcode::Argument {
                return Err(format!("argument slot {} holds i{}", index, arg.index()));
            }
            if inst.block.is_valid() {
                return Err(format!("argument i{} is attached to a block", arg.index()));
            }
            if inst.argument_index() != Some(index as u32) {
                return Err(format!("argument i{} has a stale index", arg.index()));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over a block's instructions, front to back.
pub struct BlockInsts<'g> {
    graph: &'g Graph,
    cur: InstId,
}

impl Iterator for BlockInsts<'_> {
    type Item = InstId;

    fn next(&mut self) -> Option<InstId> {
        if !self.cur.is_valid() {
            return None;
        }
        let id = self.cur;
        self.cur = self.graph.insts[id].next;
        Some(id)
    }
}

/// Iterator over a definition's use chain.
pub struct Users<'g> {
    graph: &'g Graph,
    cur: UserId,
}

impl<'g> Iterator for Users<'g> {
    type Item = &'g User;

    fn next(&mut self) -> Option<&'g User> {
        if !self.cur.is_valid() {
            return None;
        }
        let user = &self.graph.users[self.cur];
        self.cur = user.next;
        Some(user)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_block_is_entry() {
        let mut graph = Graph::new();
        assert!(graph.entry_block().is_none());

        let a = graph.create_block();
        let b = graph.create_block();

        assert_eq!(graph.entry_block(), Some(a));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(graph.num_blocks(), 2);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_instruction_list_linkage() {
        let mut graph = Graph::new();
        let bb = graph.create_block();

        let c1 = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 1 });
        let c2 = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 2 });
        graph.attach_append(bb, c1);
        graph.attach_append(bb, c2);

        assert_eq!(graph.block(bb).first_inst(), Some(c1));
        assert_eq!(graph.block(bb).last_inst(), Some(c2));
        assert_eq!(graph.inst(c1).next(), Some(c2));
        assert_eq!(graph.inst(c2).prev(), Some(c1));
        assert_eq!(graph.inst(c1).block(), Some(bb));

        let order: Vec<InstId> = graph.block_insts(bb).collect();
        assert_eq!(order, vec![c1, c2]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_prepend_and_insert_before() {
        let mut graph = Graph::new();
        let bb = graph.create_block();

        let c = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 0 });
        graph.attach_append(bb, c);

        let phi = graph.alloc_inst(Opcode::Phi, Type::U32, InstData::Phi);
        graph.attach_prepend(bb, phi);

        let mid = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 9 });
        graph.attach_before(bb, c, mid);

        let order: Vec<InstId> = graph.block_insts(bb).collect();
        assert_eq!(order, vec![phi, mid, c]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_use_chain_registration() {
        let mut graph = Graph::new();
        let bb = graph.create_block();

        let def = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 3 });
        graph.attach_append(bb, def);

        let user = graph.alloc_inst(Opcode::Add, Type::U32, InstData::Binary);
        graph.inst_mut(user).inputs.push(def);
        graph.inst_mut(user).inputs.push(def);
        graph.attach_append(bb, user);
        graph.register_use(def, user, 0);
        graph.register_use(def, user, 1);

        assert_eq!(graph.use_count(def), 2);
        // Head insertion: last registered use comes first.
        let recorded: Vec<(InstId, u32)> =
            graph.users(def).map(|u| (u.inst(), u.input_index())).collect();
        assert_eq!(recorded, vec![(user, 1), (user, 0)]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_replace_all_uses_moves_chain() {
        let mut graph = Graph::new();
        let bb = graph.create_block();

        let old = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 1 });
        let new = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 2 });
        graph.attach_append(bb, old);
        graph.attach_append(bb, new);

        let u1 = graph.alloc_inst(Opcode::Add, Type::U32, InstData::Binary);
        graph.inst_mut(u1).inputs.push(old);
        graph.inst_mut(u1).inputs.push(old);
        graph.attach_append(bb, u1);
        graph.register_use(old, u1, 0);
        graph.register_use(old, u1, 1);

        graph.replace_all_uses(old, new);

        assert_eq!(graph.inst(u1).input(0), Some(new));
        assert_eq!(graph.inst(u1).input(1), Some(new));
        assert_eq!(graph.use_count(old), 0);
        assert!(graph.inst(old).is_unused());
        assert_eq!(graph.use_count(new), 2);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_replace_all_uses_preserves_existing_users_of_new() {
        let mut graph = Graph::new();
        let bb = graph.create_block();

        let old = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 1 });
        let new = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 2 });
        graph.attach_append(bb, old);
        graph.attach_append(bb, new);

        let a = graph.alloc_inst(Opcode::Cast, Type::U64, InstData::Cast);
        graph.inst_mut(a).inputs.push(old);
        graph.attach_append(bb, a);
        graph.register_use(old, a, 0);

        let b = graph.alloc_inst(Opcode::Cast, Type::U64, InstData::Cast);
        graph.inst_mut(b).inputs.push(new);
        graph.attach_append(bb, b);
        graph.register_use(new, b, 0);

        graph.replace_all_uses(old, new);

        assert_eq!(graph.use_count(new), 2);
        let users: Vec<InstId> = graph.users(new).map(|u| u.inst()).collect();
        assert!(users.contains(&a));
        assert!(users.contains(&b));
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_replace_with_no_users_is_noop() {
        let mut graph = Graph::new();
        let bb = graph.create_block();
        let old = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 1 });
        let new = graph.alloc_inst(Opcode::Constant, Type::U32, InstData::Constant { bits: 2 });
        graph.attach_append(bb, old);
        graph.attach_append(bb, new);

        graph.replace_all_uses(old, new);
        graph.replace_all_uses(old, old);

        assert_eq!(graph.use_count(new), 0);
        assert!(graph.verify().is_ok());
    }
}
