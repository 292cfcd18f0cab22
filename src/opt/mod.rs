//! Optimization passes.

use crate::ir::graph::Graph;

pub mod peephole;

pub use peephole::{PeepholeOptimizer, PeepholeStats};

// =============================================================================
// Pass Interface
// =============================================================================

/// A transformation over a [`Graph`].
pub trait OptimizationPass {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass; returns whether the graph changed.
    fn run(&mut self, graph: &mut Graph) -> bool;
}
