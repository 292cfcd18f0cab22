//! Instruction builder.
//!
//! The builder is the only sanctioned way to create instructions. It holds
//! an insertion cursor (the block new instructions are appended to) and
//! takes care of the bookkeeping every creation implies: block linkage,
//! input wiring, and use-edge registration.
//!
//! The builder performs **no simplification**. `add(c1, c2)` always emits
//! an `Add`, never a folded constant, so analyses observe the raw graph;
//! folding belongs to the peephole pass.
//!
//! # Errors
//!
//! All misuse is reported as a typed [`IrError`] before any state is
//! touched: a block-scoped operation without a cursor, a phi incoming from
//! a non-predecessor, or mis-typed operands.

use super::block::BlockId;
use super::graph::Graph;
use super::inst::{InstData, InstId, UserId};
use super::types::{ConditionCode, Opcode, Type};

// =============================================================================
// Errors
// =============================================================================

/// Failure kinds reported at the builder boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    /// A block-scoped operation was invoked with no insertion cursor set.
    NoInsertionPoint,
    /// `add_phi_incoming` named a block that is not a predecessor of the
    /// phi's owning block, or the phi has no owning block.
    InvalidPhiOperand,
    /// Contract misuse detectable by the library (mis-typed operands,
    /// wrong instruction kind).
    InvariantViolation(String),
}

impl std::fmt::Display for IrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrError::NoInsertionPoint => write!(f, "no insertion point set"),
            IrError::InvalidPhiOperand => {
                write!(f, "phi incoming block is not a predecessor")
            }
            IrError::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for IrError {}

/// Result type for builder operations.
pub type IrResult<T> = Result<T, IrError>;

// =============================================================================
// Builder
// =============================================================================

/// Creates instructions at an insertion cursor.
pub struct IrBuilder<'g> {
    graph: &'g mut Graph,
    insert_point: BlockId,
}

impl<'g> IrBuilder<'g> {
    /// Create a builder over `graph` with no cursor set.
    pub fn new(graph: &'g mut Graph) -> Self {
        IrBuilder {
            graph,
            insert_point: BlockId::INVALID,
        }
    }

    /// The graph under construction.
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Create a block in the underlying graph.
    pub fn create_block(&mut self) -> BlockId {
        self.graph.create_block()
    }

    /// Point the cursor at `block`; new instructions land there.
    pub fn set_insert_point(&mut self, block: BlockId) {
        self.insert_point = block;
    }

    /// The current cursor.
    pub fn insert_point(&self) -> Option<BlockId> {
        if self.insert_point.is_valid() {
            Some(self.insert_point)
        } else {
            None
        }
    }

    fn cursor(&self) -> IrResult<BlockId> {
        if self.insert_point.is_valid() {
            Ok(self.insert_point)
        } else {
            Err(IrError::NoInsertionPoint)
        }
    }

    /// Allocate, append at the cursor, and register use-edges.
    fn emit(
        &mut self,
        opcode: Opcode,
        ty: Type,
        data: InstData,
        inputs: &[InstId],
    ) -> IrResult<InstId> {
        let block = self.cursor()?;
        let inst = self.graph.alloc_inst(opcode, ty, data);
        self.graph.inst_mut(inst).inputs.extend_from_slice(inputs);
        self.graph.attach_append(block, inst);
        for (slot, &input) in inputs.iter().enumerate() {
            if input.is_valid() {
                self.graph.register_use(input, inst, slot as u32);
            }
        }
        Ok(inst)
    }

    fn require_same_type(&self, op: Opcode, lhs: InstId, rhs: InstId) -> IrResult<Type> {
        let lhs_ty = self.graph.inst(lhs).ty();
        let rhs_ty = self.graph.inst(rhs).ty();
        if lhs_ty != rhs_ty {
            return Err(IrError::InvariantViolation(format!(
                "{} operands have mismatched types {} and {}",
                op, lhs_ty, rhs_ty
            )));
        }
        Ok(lhs_ty)
    }

    fn require_value_type(&self, what: &str, ty: Type) -> IrResult<()> {
        if ty.is_void() {
            return Err(IrError::InvariantViolation(format!(
                "{} cannot have void type",
                what
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Create a constant with the raw 64-bit value `bits`.
    pub fn constant(&mut self, ty: Type, bits: u64) -> IrResult<InstId> {
        self.require_value_type("constant", ty)?;
        self.emit(Opcode::Constant, ty, InstData::Constant { bits }, &[])
    }

    /// Declare the next formal argument. Arguments join no block.
    pub fn argument(&mut self, ty: Type) -> IrResult<InstId> {
        self.require_value_type("argument", ty)?;
        let index = self.graph.arguments().len() as u32;
        let inst = self
            .graph
            .alloc_inst(Opcode::Argument, ty, InstData::Argument { index });
        self.graph.push_argument(inst);
        Ok(inst)
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    fn binary(&mut self, op: Opcode, lhs: InstId, rhs: InstId) -> IrResult<InstId> {
        let ty = self.require_same_type(op, lhs, rhs)?;
        self.emit(op, ty, InstData::Binary, &[lhs, rhs])
    }

    /// `lhs + rhs`.
    pub fn add(&mut self, lhs: InstId, rhs: InstId) -> IrResult<InstId> {
        self.binary(Opcode::Add, lhs, rhs)
    }

    /// `lhs * rhs`.
    pub fn mul(&mut self, lhs: InstId, rhs: InstId) -> IrResult<InstId> {
        self.binary(Opcode::Mul, lhs, rhs)
    }

    /// `lhs & rhs`.
    pub fn and(&mut self, lhs: InstId, rhs: InstId) -> IrResult<InstId> {
        self.binary(Opcode::And, lhs, rhs)
    }

    /// `lhs << rhs`.
    pub fn shl(&mut self, lhs: InstId, rhs: InstId) -> IrResult<InstId> {
        self.binary(Opcode::Shl, lhs, rhs)
    }

    /// Compare `lhs` and `rhs` under `cc`; result type is `Bool`.
    pub fn cmp(&mut self, cc: ConditionCode, lhs: InstId, rhs: InstId) -> IrResult<InstId> {
        self.require_same_type(Opcode::Cmp, lhs, rhs)?;
        self.emit(Opcode::Cmp, Type::Bool, InstData::Compare { cc }, &[lhs, rhs])
    }

    /// Convert `from` to `to_ty`.
    pub fn cast(&mut self, to_ty: Type, from: InstId) -> IrResult<InstId> {
        self.require_value_type("cast", to_ty)?;
        self.emit(Opcode::Cast, to_ty, InstData::Cast, &[from])
    }

    // =========================================================================
    // Phis
    // =========================================================================

    /// Create an empty phi, prepended so all phis precede non-phis.
    pub fn phi(&mut self, ty: Type) -> IrResult<InstId> {
        self.require_value_type("phi", ty)?;
        let block = self.cursor()?;
        let inst = self.graph.alloc_inst(Opcode::Phi, ty, InstData::Phi);
        self.graph.attach_prepend(block, inst);
        Ok(inst)
    }

    /// Set the phi input for the edge arriving from `pred`.
    ///
    /// The input slot is `pred`'s index in the owning block's predecessor
    /// list; intermediate slots are left as holes until populated.
    pub fn add_phi_incoming(
        &mut self,
        phi: InstId,
        value: InstId,
        pred: BlockId,
    ) -> IrResult<UserId> {
        if !self.graph.inst(phi).is_phi() {
            return Err(IrError::InvariantViolation(format!(
                "i{} is not a phi",
                phi.index()
            )));
        }
        let block = match self.graph.inst(phi).block() {
            Some(block) => block,
            None => return Err(IrError::InvalidPhiOperand),
        };
        let slot = match self.graph.block(block).predecessor_index(pred) {
            Some(slot) => slot,
            None => return Err(IrError::InvalidPhiOperand),
        };

        let inputs = &mut self.graph.inst_mut(phi).inputs;
        if inputs.len() <= slot {
            inputs.resize(slot + 1, InstId::INVALID);
        }
        inputs[slot] = value;
        Ok(self.graph.register_use(value, phi, slot as u32))
    }

    // =========================================================================
    // Terminators
    // =========================================================================

    /// End the current block with an unconditional jump.
    pub fn jump(&mut self, target: BlockId) -> IrResult<InstId> {
        let block = self.cursor()?;
        let inst = self.emit(Opcode::Jump, Type::Void, InstData::Jump { target }, &[])?;
        self.graph.block_mut(block).add_successor(target);
        self.graph.block_mut(target).add_predecessor(block);
        Ok(inst)
    }

    /// End the current block with a two-way branch on `cond`.
    ///
    /// Successor order is fixed: `on_true` first, then `on_false`.
    pub fn branch(
        &mut self,
        cond: InstId,
        on_true: BlockId,
        on_false: BlockId,
    ) -> IrResult<InstId> {
        let block = self.cursor()?;
        if self.graph.inst(cond).ty() != Type::Bool {
            return Err(IrError::InvariantViolation(format!(
                "branch condition i{} is not bool",
                cond.index()
            )));
        }
        let inst = self.emit(
            Opcode::Branch,
            Type::Void,
            InstData::Branch { on_true, on_false },
            &[cond],
        )?;
        self.graph.block_mut(block).add_successor(on_true);
        self.graph.block_mut(block).add_successor(on_false);
        self.graph.block_mut(on_true).add_predecessor(block);
        self.graph.block_mut(on_false).add_predecessor(block);
        Ok(inst)
    }

    /// End the current block returning `value`.
    pub fn ret(&mut self, value: InstId) -> IrResult<InstId> {
        self.emit(Opcode::Ret, Type::Void, InstData::Return, &[value])
    }

    /// End the current block returning nothing.
    pub fn ret_void(&mut self) -> IrResult<InstId> {
        self.emit(Opcode::Ret, Type::Void, InstData::Return, &[])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_instructions_append_in_order() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        let arg = b.argument(Type::S32).unwrap();
        let two = b.constant(Type::S32, 2).unwrap();
        let sum = b.add(arg, two).unwrap();

        // The argument is free-standing; the block holds constant then add.
        assert!(graph.inst(arg).block().is_none());
        let order: Vec<InstId> = graph.block_insts(bb).collect();
        assert_eq!(order, vec![two, sum]);

        assert_eq!(graph.inst(sum).opcode(), Opcode::Add);
        assert_eq!(graph.inst(sum).ty(), Type::S32);
        assert_eq!(graph.inst(sum).inputs(), &[arg, two]);
        assert_eq!(graph.block(bb).last_inst(), Some(sum));
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_no_folding_in_builder() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        let c1 = b.constant(Type::U32, 10).unwrap();
        let c2 = b.constant(Type::U32, 32).unwrap();
        let sum = b.add(c1, c2).unwrap();

        // The builder must emit the raw Add; folding is the peephole's job.
        assert_eq!(graph.inst(sum).opcode(), Opcode::Add);
        assert_eq!(graph.inst(sum).constant_bits(), None);
        assert_eq!(graph.use_count(c1), 1);
        assert_eq!(graph.use_count(c2), 1);
    }

    #[test]
    fn test_arguments_are_ordered_and_used() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);

        let a = b.argument(Type::U64).unwrap();
        let c = b.argument(Type::U64).unwrap();

        let bb = b.create_block();
        b.set_insert_point(bb);
        let sum = b.add(a, c).unwrap();
        b.ret(sum).unwrap();

        assert_eq!(graph.arguments(), &[a, c]);
        assert_eq!(graph.inst(a).argument_index(), Some(0));
        assert_eq!(graph.inst(c).argument_index(), Some(1));

        let users_of_a: Vec<InstId> = graph.users(a).map(|u| u.inst()).collect();
        assert_eq!(users_of_a, vec![sum]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_branch_updates_cfg() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let entry = b.create_block();
        let on_true = b.create_block();
        let on_false = b.create_block();

        b.set_insert_point(entry);
        let cond = b.constant(Type::Bool, 1).unwrap();
        b.branch(cond, on_true, on_false).unwrap();

        assert_eq!(graph.block(entry).successors(), &[on_true, on_false]);
        assert_eq!(graph.block(on_true).predecessors(), &[entry]);
        assert_eq!(graph.block(on_false).predecessors(), &[entry]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_branch_requires_bool_condition() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let entry = b.create_block();
        let other = b.create_block();

        b.set_insert_point(entry);
        let not_bool = b.constant(Type::U32, 1).unwrap();
        let err = b.branch(not_bool, other, other).unwrap_err();
        assert!(matches!(err, IrError::InvariantViolation(_)));

        // The failed branch must not have touched the CFG.
        assert!(graph.block(entry).successors().is_empty());
        assert!(graph.block(other).predecessors().is_empty());
    }

    #[test]
    fn test_jump_updates_cfg() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let entry = b.create_block();
        let next = b.create_block();

        b.set_insert_point(entry);
        let jump = b.jump(next).unwrap();

        assert_eq!(graph.inst(jump).jump_target(), Some(next));
        assert_eq!(graph.block(entry).successors(), &[next]);
        assert_eq!(graph.block(next).predecessors(), &[entry]);
    }

    #[test]
    fn test_cast_properties() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        let arg = b.argument(Type::U32).unwrap();
        let wide = b.cast(Type::U64, arg).unwrap();

        assert_eq!(graph.inst(wide).ty(), Type::U64);
        assert_eq!(graph.inst(wide).inputs(), &[arg]);
        assert_eq!(graph.use_count(arg), 1);
    }

    #[test]
    fn test_ret_arity() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        let v = b.constant(Type::U32, 0).unwrap();
        let ret = b.ret(v).unwrap();

        let bb2 = b.create_block();
        b.set_insert_point(bb2);
        let ret2 = b.ret_void().unwrap();

        assert_eq!(graph.inst(ret).inputs(), &[v]);
        assert_eq!(graph.inst(ret).ty(), Type::Void);
        assert!(graph.inst(ret2).inputs().is_empty());
    }

    #[test]
    fn test_missing_cursor_is_reported() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let _bb = b.create_block();

        assert_eq!(
            b.constant(Type::U32, 1).unwrap_err(),
            IrError::NoInsertionPoint
        );
        assert!(b.insert_point().is_none());
        // Arguments do not need a cursor.
        assert!(b.argument(Type::U32).is_ok());
    }

    #[test]
    fn test_mismatched_operand_types_are_rejected() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        let narrow = b.constant(Type::U32, 1).unwrap();
        let wide = b.constant(Type::U64, 1).unwrap();

        assert!(matches!(
            b.add(narrow, wide).unwrap_err(),
            IrError::InvariantViolation(_)
        ));
        assert!(matches!(
            b.cmp(ConditionCode::Lt, narrow, wide).unwrap_err(),
            IrError::InvariantViolation(_)
        ));

        // Nothing was emitted by the failed operations.
        assert_eq!(graph.block_insts(bb).count(), 2);
    }

    #[test]
    fn test_void_values_are_rejected() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        assert!(b.constant(Type::Void, 0).is_err());
        assert!(b.argument(Type::Void).is_err());
        assert!(b.phi(Type::Void).is_err());
    }

    #[test]
    fn test_phis_precede_non_phis() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let bb = b.create_block();
        b.set_insert_point(bb);

        let c = b.constant(Type::U32, 7).unwrap();
        let phi1 = b.phi(Type::U32).unwrap();
        let phi2 = b.phi(Type::U32).unwrap();

        let order: Vec<InstId> = graph.block_insts(bb).collect();
        assert_eq!(order, vec![phi2, phi1, c]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_phi_incoming_registers_use() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let entry = b.create_block();
        let merge = b.create_block();

        b.set_insert_point(entry);
        b.jump(merge).unwrap();

        b.set_insert_point(merge);
        let phi = b.phi(Type::U32).unwrap();
        let zero = b.constant(Type::U32, 0).unwrap();
        b.add_phi_incoming(phi, zero, entry).unwrap();

        assert_eq!(graph.inst(phi).input(0), Some(zero));
        let users: Vec<InstId> = graph.users(zero).map(|u| u.inst()).collect();
        assert_eq!(users, vec![phi]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_phi_incoming_from_non_predecessor_fails() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let entry = b.create_block();
        let other = b.create_block();

        b.set_insert_point(other);
        let phi = b.phi(Type::U32).unwrap();
        let val = b.constant(Type::U32, 0).unwrap();

        // `entry` never jumps to `other`, so it is not a predecessor.
        assert_eq!(
            b.add_phi_incoming(phi, val, entry).unwrap_err(),
            IrError::InvalidPhiOperand
        );
        assert!(graph.inst(phi).inputs().is_empty());
        assert_eq!(graph.use_count(val), 0);
    }

    #[test]
    fn test_phi_incoming_fills_later_slot_with_hole() {
        let mut graph = Graph::new();
        let mut b = IrBuilder::new(&mut graph);
        let p0 = b.create_block();
        let p1 = b.create_block();
        let merge = b.create_block();

        b.set_insert_point(p0);
        b.jump(merge).unwrap();
        b.set_insert_point(p1);
        b.jump(merge).unwrap();

        b.set_insert_point(merge);
        let phi = b.phi(Type::U32).unwrap();
        let v1 = b.constant(Type::U32, 1).unwrap();
        b.add_phi_incoming(phi, v1, p1).unwrap();

        // Slot 0 stays a hole until p0's value arrives.
        assert_eq!(graph.inst(phi).input(0), None);
        assert_eq!(graph.inst(phi).input(1), Some(v1));
        assert!(graph.verify().is_ok());
    }
}
