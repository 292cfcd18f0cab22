//! Peephole optimization over the arithmetic opcodes.
//!
//! Rewrites instructions by constant folding and algebraic identities,
//! iterating block by block until a whole sweep changes nothing:
//!
//! | Pattern                          | Replacement     |
//! |----------------------------------|-----------------|
//! | `Add(c1, c2)`                    | `Constant(c1+c2)` |
//! | `Add(x, 0)` / `Add(0, x)`        | `x`             |
//! | `Add(x, x)`                      | `Shl(x, 1)`     |
//! | `Add(x, Mul(x, -1))` / symmetric | `Constant(0)`   |
//! | `And(c1, c2)`                    | `Constant(c1&c2)` |
//! | `And(x, 0)` / `And(0, x)`        | `0`             |
//! | `And(x, x)`                      | `x`             |
//! | `And(x, -1)`                     | `x`             |
//! | `Shl(c1, c2)`                    | `Constant(c1<<c2)` |
//! | `Shl(x, 0)`                      | `x`             |
//! | `Shl(0, x)`                      | `0`             |
//!
//! Folding happens at 64-bit precision on the raw value; narrower result
//! types take the low bits. Shift counts follow the Rust convention and
//! are masked to the low six bits.
//!
//! A rewrite redirects the definition's whole use chain to the
//! replacement and leaves the definition in place with no users; cleaning
//! it up is a dead-code pass's job. Replacement values are inserted
//! immediately before the instruction they replace, so the terminator
//! stays last.

use super::OptimizationPass;
use crate::ir::block::BlockId;
use crate::ir::graph::Graph;
use crate::ir::inst::{InstData, InstId};
use crate::ir::types::Opcode;

// =============================================================================
// Statistics
// =============================================================================

/// Counters from the last [`PeepholeOptimizer::run`].
#[derive(Debug, Clone, Default)]
pub struct PeepholeStats {
    /// Instructions replaced by a fresh constant.
    pub constants_folded: usize,
    /// Instructions replaced by one of their operands.
    pub identities_applied: usize,
    /// `Add(x, x)` rewrites into a shift.
    pub strength_reductions: usize,
    /// Sweeps over the graph, the final no-change sweep included.
    pub sweeps: usize,
}

// =============================================================================
// Rewrites
// =============================================================================

/// What to replace a matched instruction with.
enum Rewrite {
    /// An instruction that already exists.
    Existing(InstId),
    /// A fresh constant at the matched instruction's type.
    Constant(u64),
    /// A fresh `Shl(x, 1)` at the matched instruction's type.
    ShlByOne(InstId),
}

// =============================================================================
// Peephole Optimizer
// =============================================================================

/// Fixed-point peephole pass over `Add`, `And`, and `Shl`.
#[derive(Debug, Default)]
pub struct PeepholeOptimizer {
    stats: PeepholeStats,
}

impl PeepholeOptimizer {
    /// Create the pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters from the last run.
    pub fn stats(&self) -> &PeepholeStats {
        &self.stats
    }

    /// Rewrite to a fixed point; returns whether anything changed.
    pub fn run(&mut self, graph: &mut Graph) -> bool {
        self.stats = PeepholeStats::default();
        let blocks: Vec<BlockId> = graph.block_ids().collect();
        let mut changed_any = false;

        loop {
            self.stats.sweeps += 1;
            let mut changed = false;

            for &block in &blocks {
                let mut cur = graph.block(block).first_inst();
                while let Some(inst) = cur {
                    cur = graph.inst(inst).next();

                    // Dead value definition; nothing to rewrite for.
                    if graph.inst(inst).is_unused() && !graph.inst(inst).ty().is_void() {
                        continue;
                    }

                    if let Some(rewrite) = match_rewrite(graph, inst) {
                        let replacement = self.materialize(graph, block, inst, rewrite);
                        graph.replace_all_uses(inst, replacement);
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }
            changed_any = true;
        }

        changed_any
    }

    /// Turn a matched rewrite into a live instruction id.
    fn materialize(
        &mut self,
        graph: &mut Graph,
        block: BlockId,
        anchor: InstId,
        rewrite: Rewrite,
    ) -> InstId {
        let ty = graph.inst(anchor).ty();
        match rewrite {
            Rewrite::Existing(id) => {
                self.stats.identities_applied += 1;
                id
            }
            Rewrite::Constant(bits) => {
                self.stats.constants_folded += 1;
                let constant = graph.alloc_inst(Opcode::Constant, ty, InstData::Constant { bits });
                graph.attach_before(block, anchor, constant);
                constant
            }
            Rewrite::ShlByOne(x) => {
                self.stats.strength_reductions += 1;
                let one = graph.alloc_inst(Opcode::Constant, ty, InstData::Constant { bits: 1 });
                graph.attach_before(block, anchor, one);
                let shl = graph.alloc_inst(Opcode::Shl, ty, InstData::Binary);
                graph.inst_mut(shl).inputs.extend_from_slice(&[x, one]);
                graph.attach_before(block, anchor, shl);
                graph.register_use(x, shl, 0);
                graph.register_use(one, shl, 1);
                shl
            }
        }
    }
}

impl OptimizationPass for PeepholeOptimizer {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn run(&mut self, graph: &mut Graph) -> bool {
        PeepholeOptimizer::run(self, graph)
    }
}

// =============================================================================
// Pattern Matching
// =============================================================================

/// Match `inst` against the rewrite table without touching the graph.
fn match_rewrite(graph: &Graph, inst: InstId) -> Option<Rewrite> {
    let i = graph.inst(inst);
    if !i.opcode().is_binary_arith() {
        return None;
    }
    let lhs = i.input(0)?;
    let rhs = i.input(1)?;
    let lc = graph.inst(lhs).constant_bits();
    let rc = graph.inst(rhs).constant_bits();

    match i.opcode() {
        Opcode::Add => {
            if let (Some(a), Some(b)) = (lc, rc) {
                return Some(Rewrite::Constant(a.wrapping_add(b)));
            }
            if rc == Some(0) {
                return Some(Rewrite::Existing(lhs));
            }
            if lc == Some(0) {
                return Some(Rewrite::Existing(rhs));
            }
            if lhs == rhs {
                return Some(Rewrite::ShlByOne(lhs));
            }
            if is_negation_of(graph, rhs, lhs) || is_negation_of(graph, lhs, rhs) {
                return Some(Rewrite::Constant(0));
            }
            None
        }
        Opcode::And => {
            if let (Some(a), Some(b)) = (lc, rc) {
                return Some(Rewrite::Constant(a & b));
            }
            if rc == Some(0) {
                return Some(Rewrite::Existing(rhs));
            }
            if lc == Some(0) {
                return Some(Rewrite::Existing(lhs));
            }
            if lhs == rhs {
                return Some(Rewrite::Existing(lhs));
            }
            if rc == Some(u64::MAX) {
                return Some(Rewrite::Existing(lhs));
            }
            None
        }
        Opcode::Shl => {
            if let (Some(a), Some(b)) = (lc, rc) {
                return Some(Rewrite::Constant(a.wrapping_shl(b as u32)));
            }
            if rc == Some(0) {
                return Some(Rewrite::Existing(lhs));
            }
            if lc == Some(0) {
                return Some(Rewrite::Existing(lhs));
            }
            None
        }
        _ => None,
    }
}

/// Whether `candidate` computes `Mul(x, -1)` (either operand order).
fn is_negation_of(graph: &Graph, candidate: InstId, x: InstId) -> bool {
    let inst = graph.inst(candidate);
    if inst.opcode() != Opcode::Mul {
        return false;
    }
    let (Some(a), Some(b)) = (inst.input(0), inst.input(1)) else {
        return false;
    };
    (a == x && graph.inst(b).constant_bits() == Some(u64::MAX))
        || (b == x && graph.inst(a).constant_bits() == Some(u64::MAX))
}

// =============================================================================
// Tests
// =============================================================================
