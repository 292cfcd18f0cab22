//! Diagnostic dump of a graph.
//!
//! The printer is a read-only visitor: it never touches the graph beyond
//! traversal, and its exact byte layout is a debugging aid, not an API.
//! Every instruction renders on a single line; phis carry a `p` suffix on
//! their id so merge points stand out in block listings.

use std::fmt::{self, Write};

use super::block::BlockId;
use super::graph::Graph;
use super::inst::{InstData, InstId};

// =============================================================================
// Printer
// =============================================================================

/// Read-only textual dump of a [`Graph`].
///
/// ```text
/// Function Arguments:
///   i0.u32 Argument -> (i3)
///
/// BB0:
///   Preds: -
///   i1.u64 Constant 1 -> (i2)
///   i2.u64 Shl (i1, i1) -> ()
///   jump BB1
///   Succs: BB1
/// ```
pub struct Printer<'g> {
    graph: &'g Graph,
}

impl<'g> Printer<'g> {
    /// Create a printer over `graph`.
    pub fn new(graph: &'g Graph) -> Self {
        Printer { graph }
    }

    /// Render the whole graph.
    pub fn print(&self) -> String {
        self.to_string()
    }

    /// Render a single instruction on one line.
    pub fn print_inst(&self, inst: InstId) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = write_inst(&mut out, self.graph, inst);
        out
    }
}

impl fmt::Display for Printer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph;

        f.write_str("Function Arguments:\n")?;
        if graph.arguments().is_empty() {
            f.write_str("  (none)\n")?;
        } else {
            for &arg in graph.arguments() {
                f.write_str("  ")?;
                write_inst(f, graph, arg)?;
                f.write_str("\n")?;
            }
        }
        f.write_str("\n")?;

        for (id, bb) in graph.blocks() {
            writeln!(f, "BB{}:", id.index())?;
            write_block_list(f, "  Preds", bb.predecessors())?;
            for inst in graph.block_insts(id) {
                f.write_str("  ")?;
                write_inst(f, graph, inst)?;
                f.write_str("\n")?;
            }
            write_block_list(f, "  Succs", bb.successors())?;
            f.write_str("\n")?;
        }
        Ok(())
    }
}

// =============================================================================
// Line Formats
// =============================================================================

fn write_block_list(f: &mut impl Write, label: &str, list: &[BlockId]) -> fmt::Result {
    write!(f, "{}:", label)?;
    if list.is_empty() {
        f.write_str(" -")?;
    } else {
        for (i, block) in list.iter().enumerate() {
            write!(f, "{}BB{}", if i == 0 { " " } else { ", " }, block.index())?;
        }
    }
    f.write_str("\n")
}

fn write_inputs(f: &mut impl Write, inputs: &[InstId]) -> fmt::Result {
    f.write_str("(")?;
    for (i, input) in inputs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if input.is_valid() {
            write!(f, "i{}", input.index())?;
        } else {
            f.write_str("-")?;
        }
    }
    f.write_str(")")
}

fn write_users(f: &mut impl Write, graph: &Graph, inst: InstId) -> fmt::Result {
    f.write_str(" -> (")?;
    for (i, user) in graph.users(inst).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "i{}", user.inst().index())?;
    }
    f.write_str(")")
}

fn write_inst(f: &mut impl Write, graph: &Graph, id: InstId) -> fmt::Result {
    let inst = graph.inst(id);
    match *inst.data() {
        InstData::Jump { target } => {
            return write!(f, "jump BB{}", target.index());
        }
        InstData::Branch { on_true, on_false } => {
            let cond = inst.inputs()[0];
            return write!(
                f,
                "branch i{} to BB{}, BB{}",
                cond.index(),
                on_true.index(),
                on_false.index()
            );
        }
        InstData::Return => {
            return match inst.input(0) {
                Some(value) => write!(f, "ret i{}", value.index()),
                None => f.write_str("ret"),
            };
        }
        _ => {}
    }

    let phi_mark = if inst.is_phi() { "p" } else { "" };
    write!(f, "i{}{}.{} ", id.index(), phi_mark, inst.ty())?;
    match *inst.data() {
        InstData::Constant { bits } => write!(f, "Constant {}", bits)?,
        InstData::Argument { .. } => f.write_str("Argument")?,
        InstData::Compare { cc } => {
            write!(f, "Cmp({}) ", cc)?;
            write_inputs(f, inst.inputs())?;
        }
        _ => {
            write!(f, "{} ", inst.opcode())?;
            write_inputs(f, inst.inputs())?;
        }
    }
    write_users(f, graph, id)
}

// =============================================================================
// Tests
// =============================================================================
