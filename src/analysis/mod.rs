//! Control-flow analyses.
//!
//! - **GraphAnalyzer** (`graph_analyzer.rs`): reverse post-order and the
//!   dominator tree
//! - **LoopAnalyzer** (`loop_analyzer.rs`): back edges, natural loops, and
//!   the loop nest tree
//!
//! Analyses hold a shared reference to the graph and write nothing back;
//! results live in the analyzer until it is dropped.

pub mod graph_analyzer;
pub mod loop_analyzer;

pub use graph_analyzer::GraphAnalyzer;
pub use loop_analyzer::{Loop, LoopAnalyzer};
