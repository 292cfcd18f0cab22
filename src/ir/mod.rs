//! SSA-form graph intermediate representation.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): stable-id storage for all IR entities
//! - **Types** (`types.rs`): value types, opcodes, condition codes
//! - **Instruction** (`inst.rs`): tagged instruction variants + use records
//! - **BasicBlock** (`block.rs`): instruction lists and CFG adjacency
//! - **Graph** (`graph.rs`): owner of blocks, instructions, and users
//! - **Builder** (`builder.rs`): the only sanctioned way to create
//!   instructions
//! - **Printer** (`printer.rs`): read-only diagnostic dump
//!
//! # Design Principles
//!
//! - **Arena allocation**: O(1) creation, ids stable for the graph's life
//! - **Explicit use-def chains**: one `User` record per use edge
//! - **Raw construction**: no folding on construct; passes see what was
//!   built

pub mod arena;
pub mod block;
pub mod builder;
pub mod graph;
pub mod inst;
pub mod printer;
pub mod types;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use block::{BasicBlock, BlockId};
pub use builder::{IrBuilder, IrError, IrResult};
pub use graph::Graph;
pub use inst::{InstData, InstId, Instruction, User, UserId};
pub use printer::Printer;
pub use types::{ConditionCode, Opcode, Type};
