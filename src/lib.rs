//! SSA-form graph IR with control-flow analyses.
//!
//! The crate provides:
//! - A block-structured SSA IR with explicit use-def chains
//! - Reverse post-order numbering and an iterative dominator tree
//! - Natural-loop discovery with reducibility classification and a loop
//!   nest tree
//! - A peephole/constant-folding pass over the arithmetic opcodes
//!
//! Everything lives in memory, owned by a single [`Graph`]; analyses read
//! the graph and keep their results in side tables.

pub mod analysis;
pub mod ir;
pub mod opt;

pub use analysis::{GraphAnalyzer, Loop, LoopAnalyzer};
pub use ir::{
    BasicBlock, BlockId, ConditionCode, Graph, InstData, InstId, Instruction, IrBuilder, IrError,
    IrResult, Opcode, Printer, Type, User, UserId,
};
pub use opt::{OptimizationPass, PeepholeOptimizer, PeepholeStats};
