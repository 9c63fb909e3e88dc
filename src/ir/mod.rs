// This module implements the IR node model consumed by every backend pass. Nodes live in an
// IrArena and are addressed by ExprId/StmtId handles. Construction goes through the arena,
// which hash-conses nodes: building a structurally identical node twice returns the same
// handle. Two consequences follow and the passes rely on both. First, identity-keyed side
// tables become handle-keyed maps, so two occurrences of `a[i]` resolve to one register
// slot. Second, a rewrite that changes nothing returns the handle it was given, so
// "the pass was a no-op" is checked by comparing handles. Nodes are never mutated; a
// rewrite interns replacement nodes and leaves untouched subtrees shared. Constructors
// resolve each expression's element type at build time (comparisons and logical ops
// produce Bool, arithmetic promotes its operands, loads take the element type of the
// array variable).

//! Arena-backed IR with hash-consed handles.

pub mod node;
pub mod printer;
pub mod types;
pub mod visitor;

pub use node::{
    BinaryOp, ExprId, ExprKind, ExprNode, LiteralValue, LoopKind, StmtId, StmtKind,
    TensorProperty, UnaryOp,
};
pub use printer::IrPrinter;
pub use types::Datatype;
pub use visitor::{
    contains_loop, rebuild_expr, rebuild_stmt, walk_expr, walk_stmt, IrRewriter, IrVisitor,
};

use hashbrown::HashMap;

/// Owner of every node of one compilation request.
#[derive(Debug, Default, Clone)]
pub struct IrArena {
    exprs: Vec<ExprNode>,
    expr_index: HashMap<ExprNode, ExprId>,
    stmts: Vec<StmtKind>,
    stmt_index: HashMap<StmtKind, StmtId>,
}

impl IrArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an expression node, returning the existing handle when an
    /// identical node was built before.
    pub fn intern_expr(&mut self, kind: ExprKind, ty: Datatype) -> ExprId {
        let node = ExprNode { kind, ty };
        if let Some(&id) = self.expr_index.get(&node) {
            return id;
        }
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(node.clone());
        self.expr_index.insert(node, id);
        id
    }

    /// Intern a statement node.
    pub fn intern_stmt(&mut self, kind: StmtKind) -> StmtId {
        if let Some(&id) = self.stmt_index.get(&kind) {
            return id;
        }
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(kind.clone());
        self.stmt_index.insert(kind, id);
        id
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.index()]
    }

    pub fn ty(&self, id: ExprId) -> Datatype {
        self.exprs[id.index()].ty
    }

    pub fn stmt(&self, id: StmtId) -> &StmtKind {
        &self.stmts[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    /// Name of a variable node.
    pub fn var_name(&self, id: ExprId) -> Option<&str> {
        match &self.expr(id).kind {
            ExprKind::Var { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether `id` is a variable backed by memory (pointer or tensor).
    pub fn is_pointer_var(&self, id: ExprId) -> bool {
        matches!(
            &self.expr(id).kind,
            ExprKind::Var { is_ptr: true, .. } | ExprKind::Var { is_tensor: true, .. }
        )
    }

    /// Whether `id` calls a symbol resolved at link time.
    pub fn is_extern_call(&self, id: ExprId) -> bool {
        matches!(&self.expr(id).kind, ExprKind::Call { extern_llvm: true, .. })
    }

    // ---- expression constructors ----

    pub fn literal_int(&mut self, value: i64, ty: Datatype) -> ExprId {
        let value = if ty.is_uint() {
            LiteralValue::UInt(value as u64)
        } else if ty.is_bool() {
            LiteralValue::Bool(value != 0)
        } else if ty.is_float() {
            LiteralValue::float(value as f64)
        } else {
            LiteralValue::Int(value)
        };
        self.intern_expr(ExprKind::Literal(value), ty)
    }

    pub fn literal_float(&mut self, value: f64, ty: Datatype) -> ExprId {
        self.intern_expr(ExprKind::Literal(LiteralValue::float(value)), ty)
    }

    pub fn literal_bool(&mut self, value: bool) -> ExprId {
        self.intern_expr(ExprKind::Literal(LiteralValue::Bool(value)), Datatype::Bool)
    }

    /// Scalar local variable.
    pub fn var(&mut self, name: &str, ty: Datatype) -> ExprId {
        self.var_with(name, ty, false, false, false)
    }

    /// Pointer variable whose elements have type `ty`.
    pub fn ptr_var(&mut self, name: &str, ty: Datatype) -> ExprId {
        self.var_with(name, ty, true, false, false)
    }

    /// Scalar function parameter.
    pub fn param(&mut self, name: &str, ty: Datatype) -> ExprId {
        self.var_with(name, ty, false, false, true)
    }

    pub fn var_with(
        &mut self,
        name: &str,
        ty: Datatype,
        is_ptr: bool,
        is_tensor: bool,
        is_parameter: bool,
    ) -> ExprId {
        self.intern_expr(
            ExprKind::Var {
                name: name.to_string(),
                is_ptr,
                is_tensor,
                is_parameter,
            },
            ty,
        )
    }

    pub fn unary(&mut self, op: UnaryOp, a: ExprId) -> ExprId {
        let ty = match op {
            UnaryOp::Not => Datatype::Bool,
            UnaryOp::Neg | UnaryOp::Sqrt => self.ty(a),
        };
        self.intern_expr(ExprKind::Unary { op, a }, ty)
    }

    pub fn neg(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Neg, a)
    }

    pub fn not(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Not, a)
    }

    pub fn sqrt(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Sqrt, a)
    }

    pub fn binary(&mut self, op: BinaryOp, a: ExprId, b: ExprId) -> ExprId {
        let ty = if op.is_comparison() || op.is_logical() {
            Datatype::Bool
        } else {
            Datatype::max_type(self.ty(a), self.ty(b))
        };
        self.intern_expr(ExprKind::Binary { op, a, b }, ty)
    }

    pub fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn lt(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Lt, a, b)
    }

    pub fn min(&mut self, operands: Vec<ExprId>) -> ExprId {
        let ty = self.common_type(&operands);
        self.intern_expr(ExprKind::Min(operands), ty)
    }

    pub fn max(&mut self, operands: Vec<ExprId>) -> ExprId {
        let ty = self.common_type(&operands);
        self.intern_expr(ExprKind::Max(operands), ty)
    }

    fn common_type(&self, operands: &[ExprId]) -> Datatype {
        operands
            .iter()
            .map(|&op| self.ty(op))
            .reduce(Datatype::max_type)
            .unwrap_or(Datatype::Undefined)
    }

    /// Generic binary operator printed as `start a mid b end`.
    pub fn bin_op(
        &mut self,
        a: ExprId,
        b: ExprId,
        start: &str,
        mid: &str,
        end: &str,
        ty: Datatype,
    ) -> ExprId {
        self.intern_expr(
            ExprKind::BinOp {
                a,
                b,
                start: start.to_string(),
                mid: mid.to_string(),
                end: end.to_string(),
            },
            ty,
        )
    }

    pub fn cast(&mut self, a: ExprId, ty: Datatype) -> ExprId {
        self.intern_expr(ExprKind::Cast { a }, ty)
    }

    pub fn call(&mut self, func: &str, args: Vec<ExprId>, ty: Datatype) -> ExprId {
        self.intern_expr(
            ExprKind::Call {
                func: func.to_string(),
                args,
                extern_llvm: false,
            },
            ty,
        )
    }

    /// Call to a symbol supplied by oracle-produced code at link time.
    pub fn extern_call(&mut self, func: &str, args: Vec<ExprId>, ty: Datatype) -> ExprId {
        self.intern_expr(
            ExprKind::Call {
                func: func.to_string(),
                args,
                extern_llvm: true,
            },
            ty,
        )
    }

    /// Scalar load `arr[loc]`; the element type comes from `arr`.
    pub fn load(&mut self, arr: ExprId, loc: ExprId) -> ExprId {
        self.load_lanes(arr, loc, 1)
    }

    pub fn load_lanes(&mut self, arr: ExprId, loc: ExprId, lanes: u32) -> ExprId {
        let ty = self.ty(arr);
        self.intern_expr(ExprKind::Load { arr, loc, lanes: lanes.max(1) }, ty)
    }

    pub fn get_property(
        &mut self,
        tensor: ExprId,
        property: TensorProperty,
        mode: u32,
        index: u32,
        name: &str,
        ty: Datatype,
    ) -> ExprId {
        self.intern_expr(
            ExprKind::GetProperty {
                tensor,
                property,
                mode,
                index,
                name: name.to_string(),
            },
            ty,
        )
    }

    pub fn sizeof(&mut self, of: Datatype) -> ExprId {
        self.intern_expr(ExprKind::Sizeof(of), Datatype::UInt64)
    }

    // ---- statement constructors ----

    pub fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.intern_stmt(StmtKind::Block(stmts))
    }

    pub fn scope(&mut self, body: StmtId) -> StmtId {
        self.intern_stmt(StmtKind::Scope(body))
    }

    pub fn store(&mut self, arr: ExprId, loc: ExprId, data: ExprId) -> StmtId {
        self.store_lanes(arr, loc, data, 1)
    }

    pub fn store_lanes(&mut self, arr: ExprId, loc: ExprId, data: ExprId, lanes: u32) -> StmtId {
        self.intern_stmt(StmtKind::Store {
            arr,
            loc,
            data,
            lanes: lanes.max(1),
            use_atomics: false,
        })
    }

    /// Counted loop `for (var = start; var < end; var += increment)`.
    #[allow(clippy::too_many_arguments)]
    pub fn for_loop(
        &mut self,
        var: ExprId,
        start: ExprId,
        end: ExprId,
        increment: ExprId,
        body: StmtId,
        kind: LoopKind,
        vec_width: u32,
    ) -> StmtId {
        self.intern_stmt(StmtKind::For {
            var,
            start,
            end,
            increment,
            body,
            kind,
            vec_width,
            unroll: 0,
        })
    }

    pub fn while_loop(&mut self, cond: ExprId, body: StmtId) -> StmtId {
        self.intern_stmt(StmtKind::While {
            cond,
            body,
            kind: LoopKind::Serial,
            vec_width: 0,
        })
    }

    pub fn if_then_else(&mut self, cond: ExprId, then: StmtId, otherwise: Option<StmtId>) -> StmtId {
        self.intern_stmt(StmtKind::IfThenElse { cond, then, otherwise })
    }

    pub fn var_decl(&mut self, var: ExprId, rhs: ExprId) -> StmtId {
        self.intern_stmt(StmtKind::VarDecl { var, rhs })
    }

    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> StmtId {
        self.intern_stmt(StmtKind::Assign {
            lhs,
            rhs,
            use_atomics: false,
        })
    }

    pub fn allocate(&mut self, var: ExprId, num_elements: ExprId, clear: bool) -> StmtId {
        self.intern_stmt(StmtKind::Allocate {
            var,
            num_elements,
            is_realloc: false,
            clear,
        })
    }

    pub fn free(&mut self, var: ExprId) -> StmtId {
        self.intern_stmt(StmtKind::Free { var })
    }

    pub fn comment(&mut self, text: &str) -> StmtId {
        self.intern_stmt(StmtKind::Comment(text.to_string()))
    }

    pub fn blank_line(&mut self) -> StmtId {
        self.intern_stmt(StmtKind::BlankLine)
    }

    pub fn print(&mut self, fmt: &str, params: Vec<ExprId>) -> StmtId {
        self.intern_stmt(StmtKind::Print {
            fmt: fmt.to_string(),
            params,
        })
    }

    pub fn function(
        &mut self,
        name: &str,
        body: StmtId,
        inputs: Vec<ExprId>,
        outputs: Vec<ExprId>,
    ) -> StmtId {
        self.intern_stmt(StmtKind::Function {
            name: name.to_string(),
            body,
            inputs,
            outputs,
            has_return_slot: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_sharing() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let first = ir.load(a, i);
        let second = ir.load(a, i);
        assert_eq!(first, second);

        let other = ir.ptr_var("b", Datatype::Int32);
        assert_ne!(first, ir.load(other, i));
    }

    #[test]
    fn test_type_resolution() {
        let mut ir = IrArena::new();
        let x = ir.var("x", Datatype::Int16);
        let y = ir.var("y", Datatype::Int32);
        let f = ir.var("f", Datatype::Float32);

        let sum = ir.add(x, y);
        assert_eq!(ir.ty(sum), Datatype::Int32);
        let cmp = ir.lt(x, y);
        assert_eq!(ir.ty(cmp), Datatype::Bool);
        let mixed = ir.mul(y, f);
        assert_eq!(ir.ty(mixed), Datatype::Float32);

        let arr = ir.ptr_var("arr", Datatype::UInt8);
        let load = ir.load(arr, x);
        assert_eq!(ir.ty(load), Datatype::UInt8);
    }

    #[test]
    fn test_lanes_are_clamped() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let load = ir.load_lanes(a, i, 0);
        match &ir.expr(load).kind {
            ExprKind::Load { lanes, .. } => assert_eq!(*lanes, 1),
            other => panic!("expected load, got {:?}", other),
        }
    }

    #[test]
    fn test_float_literals_hash_by_bits() {
        let mut ir = IrArena::new();
        let a = ir.literal_float(1.5, Datatype::Float64);
        let b = ir.literal_float(1.5, Datatype::Float64);
        let c = ir.literal_float(2.5, Datatype::Float64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
