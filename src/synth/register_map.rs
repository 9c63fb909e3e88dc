//! Register slot assignment for one synthesis request.
//!
//! Slots are dense integers handed out in first-visit order over the
//! candidate expression. Loads and variables share one numbering space.
//! Because the IR arena hash-conses nodes, two occurrences of the same load
//! (same array, same location, same lane width) are one handle and therefore
//! one slot. Address computations inside a load's location are never
//! visited: they are not operands of the vector computation.
//!
//! The table is the ordering contract between the symbolic specification,
//! the generated call's argument list and the shim's parameter list; all
//! three read [`RegisterSlotTable::slots`] in index order.

use crate::core::CompilationSession;
use crate::ir::{walk_expr, Datatype, ExprId, ExprKind, IrArena, IrVisitor};
use hashbrown::HashMap;

/// What a slot stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Memory operand read `lanes` elements at a time.
    Load { lanes: u32 },
    /// Scalar operand, broadcast across lanes.
    Var,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSlot {
    pub index: usize,
    pub expr: ExprId,
    pub ty: Datatype,
    pub kind: SlotKind,
}

impl RegisterSlot {
    /// Name of the symbolic buffer standing for this slot.
    pub fn name(&self) -> String {
        format!("reg_{}", self.index)
    }

    /// Number of elements the slot carries.
    pub fn lanes(&self) -> u32 {
        match self.kind {
            SlotKind::Load { lanes } => lanes,
            SlotKind::Var => 1,
        }
    }

    /// Width of the symbolic buffer in bits.
    pub fn bit_width(&self) -> u32 {
        self.ty.bits() * self.lanes()
    }

    pub fn is_load(&self) -> bool {
        matches!(self.kind, SlotKind::Load { .. })
    }
}

#[derive(Debug, Default)]
pub struct RegisterSlotTable {
    slots: Vec<RegisterSlot>,
    by_expr: HashMap<ExprId, usize>,
}

impl RegisterSlotTable {
    /// Assign slots to every distinct load and variable under `root`.
    pub fn build(ir: &IrArena, root: ExprId) -> Self {
        let mut table = Self::default();
        table.visit_expr(ir, root);
        log::trace!("assigned {} register slots", table.slots.len());
        table
    }

    pub fn slot_of(&self, expr: ExprId) -> Option<usize> {
        self.by_expr.get(&expr).copied()
    }

    pub fn slots(&self) -> &[RegisterSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Call arguments in slot order.
    pub fn arguments(&self) -> Vec<ExprId> {
        self.slots.iter().map(|slot| slot.expr).collect()
    }

    /// Copy the finished table into the session arena.
    pub fn finish<'arena>(&self, session: &CompilationSession<'arena>) -> &'arena [RegisterSlot] {
        session.alloc_slice(&self.slots)
    }

    fn assign(&mut self, expr: ExprId, ty: Datatype, kind: SlotKind) {
        if self.by_expr.contains_key(&expr) {
            return;
        }
        let index = self.slots.len();
        self.slots.push(RegisterSlot { index, expr, ty, kind });
        self.by_expr.insert(expr, index);
    }
}

impl IrVisitor for RegisterSlotTable {
    fn visit_expr(&mut self, ir: &IrArena, id: ExprId) {
        let node = ir.expr(id);
        match &node.kind {
            ExprKind::Load { lanes, .. } => self.assign(id, node.ty, SlotKind::Load { lanes: *lanes }),
            ExprKind::Var { .. } => self.assign(id, node.ty, SlotKind::Var),
            _ => walk_expr(self, ir, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;

    #[test]
    fn test_first_visit_order_across_kinds() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let b = ir.ptr_var("b", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let k = ir.param("k", Datatype::Int32);
        let la = ir.load_lanes(a, i, 4);
        let lb = ir.load_lanes(b, i, 4);
        // (a[i] * k) + b[i]
        let scaled = ir.mul(la, k);
        let sum = ir.add(scaled, lb);

        let table = RegisterSlotTable::build(&ir, sum);
        assert_eq!(table.arguments(), vec![la, k, lb]);
        assert_eq!(table.slot_of(k), Some(1));
        assert_eq!(table.slots()[0].bit_width(), 128);
        assert_eq!(table.slots()[1].bit_width(), 32);
        assert_eq!(table.slots()[2].name(), "reg_2");
    }

    #[test]
    fn test_repeated_load_shares_a_slot() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let first = ir.load_lanes(a, i, 4);
        let second = ir.load_lanes(a, i, 4);
        let sum = ir.add(first, second);

        let table = RegisterSlotTable::build(&ir, sum);
        assert_eq!(table.len(), 1);
        assert!(table.slots()[0].is_load());
    }

    #[test]
    fn test_location_operands_are_not_slots() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int16);
        let i = ir.var("i", Datatype::Int32);
        let j = ir.var("j", Datatype::Int32);
        let loc = ir.add(i, j);
        let load = ir.load_lanes(a, loc, 8);
        let two = ir.literal_int(2, Datatype::Int16);
        let value = ir.mul(load, two);

        let table = RegisterSlotTable::build(&ir, value);
        assert_eq!(table.arguments(), vec![load]);
    }

    #[test]
    fn test_finish_copies_into_arena() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut ir = IrArena::new();
        let x = ir.var("x", Datatype::UInt8);
        let y = ir.var("y", Datatype::UInt8);
        let sum = ir.add(x, y);

        let table = RegisterSlotTable::build(&ir, sum);
        let slots = table.finish(&session);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].expr, y);
        assert!(ctx.memory_used() > 0);
    }
}
