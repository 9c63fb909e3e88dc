//! Traversal infrastructure.
//!
//! [`IrVisitor`] walks a tree read-only; [`IrRewriter`] rebuilds it bottom-up.
//! Both default to a structural walk, so an implementation overrides only the
//! node kinds it cares about and calls [`walk_expr`]/[`rebuild_expr`] (or the
//! statement counterparts) to continue into children. The walks match every
//! node kind exhaustively.

use super::node::{ExprId, ExprKind, StmtId, StmtKind};
use super::IrArena;
use crate::core::CompileResult;

/// Read-only traversal.
pub trait IrVisitor {
    fn visit_expr(&mut self, ir: &IrArena, id: ExprId) {
        walk_expr(self, ir, id);
    }

    fn visit_stmt(&mut self, ir: &IrArena, id: StmtId) {
        walk_stmt(self, ir, id);
    }
}

/// Visit every child expression of `id` in evaluation order.
pub fn walk_expr<V: IrVisitor + ?Sized>(visitor: &mut V, ir: &IrArena, id: ExprId) {
    match &ir.expr(id).kind {
        ExprKind::Literal(_) | ExprKind::Var { .. } | ExprKind::Sizeof(_) => {}
        ExprKind::Unary { a, .. } | ExprKind::Cast { a } => visitor.visit_expr(ir, *a),
        ExprKind::Binary { a, b, .. } | ExprKind::BinOp { a, b, .. } => {
            visitor.visit_expr(ir, *a);
            visitor.visit_expr(ir, *b);
        }
        ExprKind::Min(operands) | ExprKind::Max(operands) => {
            for &op in operands {
                visitor.visit_expr(ir, op);
            }
        }
        ExprKind::Call { args, .. } => {
            for &arg in args {
                visitor.visit_expr(ir, arg);
            }
        }
        ExprKind::Load { arr, loc, .. } => {
            visitor.visit_expr(ir, *arr);
            visitor.visit_expr(ir, *loc);
        }
        ExprKind::GetProperty { tensor, .. } => visitor.visit_expr(ir, *tensor),
    }
}

/// Visit every child of statement `id`, expressions before nested statements.
pub fn walk_stmt<V: IrVisitor + ?Sized>(visitor: &mut V, ir: &IrArena, id: StmtId) {
    match ir.stmt(id) {
        StmtKind::Block(stmts) => {
            for &stmt in stmts {
                visitor.visit_stmt(ir, stmt);
            }
        }
        StmtKind::Scope(body) => visitor.visit_stmt(ir, *body),
        StmtKind::Store { arr, loc, data, .. } => {
            visitor.visit_expr(ir, *arr);
            visitor.visit_expr(ir, *loc);
            visitor.visit_expr(ir, *data);
        }
        StmtKind::For {
            var,
            start,
            end,
            increment,
            body,
            ..
        } => {
            visitor.visit_expr(ir, *var);
            visitor.visit_expr(ir, *start);
            visitor.visit_expr(ir, *end);
            visitor.visit_expr(ir, *increment);
            visitor.visit_stmt(ir, *body);
        }
        StmtKind::While { cond, body, .. } => {
            visitor.visit_expr(ir, *cond);
            visitor.visit_stmt(ir, *body);
        }
        StmtKind::IfThenElse { cond, then, otherwise } => {
            visitor.visit_expr(ir, *cond);
            visitor.visit_stmt(ir, *then);
            if let Some(otherwise) = otherwise {
                visitor.visit_stmt(ir, *otherwise);
            }
        }
        StmtKind::VarDecl { var, rhs } => {
            visitor.visit_expr(ir, *var);
            visitor.visit_expr(ir, *rhs);
        }
        StmtKind::Assign { lhs, rhs, .. } => {
            visitor.visit_expr(ir, *lhs);
            visitor.visit_expr(ir, *rhs);
        }
        StmtKind::Allocate { var, num_elements, .. } => {
            visitor.visit_expr(ir, *var);
            visitor.visit_expr(ir, *num_elements);
        }
        StmtKind::Free { var } => visitor.visit_expr(ir, *var),
        StmtKind::Comment(_) | StmtKind::BlankLine | StmtKind::Continue | StmtKind::Break => {}
        StmtKind::Print { params, .. } => {
            for &param in params {
                visitor.visit_expr(ir, param);
            }
        }
        StmtKind::Function {
            body,
            inputs,
            outputs,
            ..
        } => {
            for &output in outputs {
                visitor.visit_expr(ir, output);
            }
            for &input in inputs {
                visitor.visit_expr(ir, input);
            }
            visitor.visit_stmt(ir, *body);
        }
    }
}

/// Bottom-up tree rewriting.
///
/// A rewrite returns the handle it was given when nothing below it changed;
/// otherwise it interns a replacement node and leaves untouched siblings
/// shared with the input tree.
pub trait IrRewriter {
    fn rewrite_expr(&mut self, ir: &mut IrArena, id: ExprId) -> CompileResult<ExprId> {
        rebuild_expr(self, ir, id)
    }

    fn rewrite_stmt(&mut self, ir: &mut IrArena, id: StmtId) -> CompileResult<StmtId> {
        rebuild_stmt(self, ir, id)
    }
}

fn rewrite_all<R: IrRewriter + ?Sized>(
    rewriter: &mut R,
    ir: &mut IrArena,
    ids: &[ExprId],
) -> CompileResult<Vec<ExprId>> {
    ids.iter().map(|&id| rewriter.rewrite_expr(ir, id)).collect()
}

/// Rewrite the children of expression `id` and rebuild it if any changed.
pub fn rebuild_expr<R: IrRewriter + ?Sized>(
    rewriter: &mut R,
    ir: &mut IrArena,
    id: ExprId,
) -> CompileResult<ExprId> {
    let node = ir.expr(id).clone();
    let kind = match node.kind {
        ExprKind::Literal(_) | ExprKind::Var { .. } | ExprKind::Sizeof(_) => return Ok(id),
        ExprKind::Unary { op, a } => ExprKind::Unary {
            op,
            a: rewriter.rewrite_expr(ir, a)?,
        },
        ExprKind::Cast { a } => ExprKind::Cast {
            a: rewriter.rewrite_expr(ir, a)?,
        },
        ExprKind::Binary { op, a, b } => {
            let a = rewriter.rewrite_expr(ir, a)?;
            let b = rewriter.rewrite_expr(ir, b)?;
            ExprKind::Binary { op, a, b }
        }
        ExprKind::BinOp {
            a,
            b,
            start,
            mid,
            end,
        } => {
            let a = rewriter.rewrite_expr(ir, a)?;
            let b = rewriter.rewrite_expr(ir, b)?;
            ExprKind::BinOp {
                a,
                b,
                start,
                mid,
                end,
            }
        }
        ExprKind::Min(operands) => ExprKind::Min(rewrite_all(rewriter, ir, &operands)?),
        ExprKind::Max(operands) => ExprKind::Max(rewrite_all(rewriter, ir, &operands)?),
        ExprKind::Call {
            func,
            args,
            extern_llvm,
        } => ExprKind::Call {
            func,
            args: rewrite_all(rewriter, ir, &args)?,
            extern_llvm,
        },
        ExprKind::Load { arr, loc, lanes } => {
            let arr = rewriter.rewrite_expr(ir, arr)?;
            let loc = rewriter.rewrite_expr(ir, loc)?;
            ExprKind::Load { arr, loc, lanes }
        }
        ExprKind::GetProperty {
            tensor,
            property,
            mode,
            index,
            name,
        } => ExprKind::GetProperty {
            tensor: rewriter.rewrite_expr(ir, tensor)?,
            property,
            mode,
            index,
            name,
        },
    };
    Ok(ir.intern_expr(kind, node.ty))
}

/// Rewrite the children of statement `id` and rebuild it if any changed.
pub fn rebuild_stmt<R: IrRewriter + ?Sized>(
    rewriter: &mut R,
    ir: &mut IrArena,
    id: StmtId,
) -> CompileResult<StmtId> {
    let kind = match ir.stmt(id).clone() {
        StmtKind::Comment(_) | StmtKind::BlankLine | StmtKind::Continue | StmtKind::Break => {
            return Ok(id)
        }
        StmtKind::Block(stmts) => {
            let mut rewritten = Vec::with_capacity(stmts.len());
            for stmt in stmts {
                rewritten.push(rewriter.rewrite_stmt(ir, stmt)?);
            }
            StmtKind::Block(rewritten)
        }
        StmtKind::Scope(body) => StmtKind::Scope(rewriter.rewrite_stmt(ir, body)?),
        StmtKind::Store {
            arr,
            loc,
            data,
            lanes,
            use_atomics,
        } => StmtKind::Store {
            arr: rewriter.rewrite_expr(ir, arr)?,
            loc: rewriter.rewrite_expr(ir, loc)?,
            data: rewriter.rewrite_expr(ir, data)?,
            lanes,
            use_atomics,
        },
        StmtKind::For {
            var,
            start,
            end,
            increment,
            body,
            kind,
            vec_width,
            unroll,
        } => StmtKind::For {
            var: rewriter.rewrite_expr(ir, var)?,
            start: rewriter.rewrite_expr(ir, start)?,
            end: rewriter.rewrite_expr(ir, end)?,
            increment: rewriter.rewrite_expr(ir, increment)?,
            body: rewriter.rewrite_stmt(ir, body)?,
            kind,
            vec_width,
            unroll,
        },
        StmtKind::While {
            cond,
            body,
            kind,
            vec_width,
        } => StmtKind::While {
            cond: rewriter.rewrite_expr(ir, cond)?,
            body: rewriter.rewrite_stmt(ir, body)?,
            kind,
            vec_width,
        },
        StmtKind::IfThenElse { cond, then, otherwise } => StmtKind::IfThenElse {
            cond: rewriter.rewrite_expr(ir, cond)?,
            then: rewriter.rewrite_stmt(ir, then)?,
            otherwise: match otherwise {
                Some(stmt) => Some(rewriter.rewrite_stmt(ir, stmt)?),
                None => None,
            },
        },
        StmtKind::VarDecl { var, rhs } => StmtKind::VarDecl {
            var: rewriter.rewrite_expr(ir, var)?,
            rhs: rewriter.rewrite_expr(ir, rhs)?,
        },
        StmtKind::Assign {
            lhs,
            rhs,
            use_atomics,
        } => StmtKind::Assign {
            lhs: rewriter.rewrite_expr(ir, lhs)?,
            rhs: rewriter.rewrite_expr(ir, rhs)?,
            use_atomics,
        },
        StmtKind::Allocate {
            var,
            num_elements,
            is_realloc,
            clear,
        } => StmtKind::Allocate {
            var: rewriter.rewrite_expr(ir, var)?,
            num_elements: rewriter.rewrite_expr(ir, num_elements)?,
            is_realloc,
            clear,
        },
        StmtKind::Free { var } => StmtKind::Free {
            var: rewriter.rewrite_expr(ir, var)?,
        },
        StmtKind::Print { fmt, params } => StmtKind::Print {
            fmt,
            params: rewrite_all(rewriter, ir, &params)?,
        },
        StmtKind::Function {
            name,
            body,
            inputs,
            outputs,
            has_return_slot,
        } => StmtKind::Function {
            name,
            body: rewriter.rewrite_stmt(ir, body)?,
            inputs,
            outputs,
            has_return_slot,
        },
    };
    Ok(ir.intern_stmt(kind))
}

/// Whether the statement tree rooted at `id` contains a loop.
pub fn contains_loop(ir: &IrArena, id: StmtId) -> bool {
    struct LoopFinder {
        found: bool,
    }

    impl IrVisitor for LoopFinder {
        fn visit_expr(&mut self, _ir: &IrArena, _id: ExprId) {}

        fn visit_stmt(&mut self, ir: &IrArena, id: StmtId) {
            if self.found {
                return;
            }
            if ir.stmt(id).is_loop() {
                self.found = true;
                return;
            }
            walk_stmt(self, ir, id);
        }
    }

    let mut finder = LoopFinder { found: false };
    finder.visit_stmt(ir, id);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Datatype, LoopKind};

    struct LoadCounter(usize);

    impl IrVisitor for LoadCounter {
        fn visit_expr(&mut self, ir: &IrArena, id: ExprId) {
            if matches!(ir.expr(id).kind, ExprKind::Load { .. }) {
                self.0 += 1;
            }
            walk_expr(self, ir, id);
        }
    }

    struct Identity;
    impl IrRewriter for Identity {}

    /// Replaces every Int32 literal 1 with 2.
    struct BumpOnes;

    impl IrRewriter for BumpOnes {
        fn rewrite_expr(&mut self, ir: &mut IrArena, id: ExprId) -> CompileResult<ExprId> {
            let one = ir.literal_int(1, Datatype::Int32);
            if id == one {
                return Ok(ir.literal_int(2, Datatype::Int32));
            }
            rebuild_expr(self, ir, id)
        }
    }

    fn sample(ir: &mut IrArena) -> StmtId {
        let a = ir.ptr_var("a", Datatype::Int32);
        let out = ir.ptr_var("out", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let n = ir.param("n", Datatype::Int32);
        let zero = ir.literal_int(0, Datatype::Int32);
        let one = ir.literal_int(1, Datatype::Int32);
        let load = ir.load(a, i);
        let value = ir.add(load, one);
        let store = ir.store(out, i, value);
        let body = ir.block(vec![store]);
        ir.for_loop(i, zero, n, one, body, LoopKind::Serial, 0)
    }

    #[test]
    fn test_visitor_reaches_loads() {
        let mut ir = IrArena::new();
        let root = sample(&mut ir);
        let mut counter = LoadCounter(0);
        counter.visit_stmt(&ir, root);
        assert_eq!(counter.0, 1);
    }

    #[test]
    fn test_identity_rewrite_preserves_handles() {
        let mut ir = IrArena::new();
        let root = sample(&mut ir);
        let before = ir.stmt_count();
        let rewritten = Identity.rewrite_stmt(&mut ir, root).unwrap();
        assert_eq!(rewritten, root);
        assert_eq!(ir.stmt_count(), before);
    }

    #[test]
    fn test_rewrite_rebuilds_changed_path() {
        let mut ir = IrArena::new();
        let root = sample(&mut ir);
        let rewritten = BumpOnes.rewrite_stmt(&mut ir, root).unwrap();
        assert_ne!(rewritten, root);
        let two = ir.literal_int(2, Datatype::Int32);
        match ir.stmt(rewritten) {
            StmtKind::For { increment, .. } => assert_eq!(*increment, two),
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn test_contains_loop() {
        let mut ir = IrArena::new();
        let root = sample(&mut ir);
        assert!(contains_loop(&ir, root));
        let comment = ir.comment("nothing here");
        let block = ir.block(vec![comment]);
        assert!(!contains_loop(&ir, block));
    }
}
