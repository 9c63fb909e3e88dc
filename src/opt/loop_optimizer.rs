// This module implements the vectorizable-region selector. It walks a function body
// depth-first and looks for innermost loops (loops whose body contains no further
// For/While, checked with a separate visitor before descending) tagged Vectorized. Outer
// loops and non-vectorized innermost loops are rebuilt structurally, which returns the
// same handle when nothing beneath changed. On entering a vectorized innermost loop the
// selector annotates the body's loads and stores with the loop's lane width, scales the
// loop step by the lane width, and then rewrites the body with the lane width held in
// its traversal state; every store met while that state is set has its value expression
// passed to the expression synthesizer. The state is restored when the loop is left, so
// the traversal is reentrant and carries no process-wide context. A vectorized loop whose
// body already holds lane-annotated accesses was lowered by an earlier run and is kept.

//! Vectorizable-region selector.

use super::expr_optimizer::ExprOptimizer;
use super::lanes::{scale_increment, LaneAnnotator};
use crate::core::CompileResult;
use crate::ir::{
    contains_loop, rebuild_stmt, walk_expr, walk_stmt, ExprId, ExprKind, IrArena, IrRewriter,
    IrVisitor, LoopKind, StmtId, StmtKind,
};

/// Ambient state while inside a vectorized innermost loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorContext {
    pub lanes: u32,
}

pub struct LoopOptimizer<'a, 'arena> {
    exprs: ExprOptimizer<'a, 'arena>,
    context: Option<VectorContext>,
    vector_loops: usize,
}

impl<'a, 'arena> LoopOptimizer<'a, 'arena> {
    pub fn new(exprs: ExprOptimizer<'a, 'arena>) -> Self {
        Self {
            exprs,
            context: None,
            vector_loops: 0,
        }
    }

    /// Rewrite one function (or any statement tree).
    pub fn optimize(&mut self, ir: &mut IrArena, stmt: StmtId) -> CompileResult<StmtId> {
        self.rewrite_stmt(ir, stmt)
    }

    /// Vectorized innermost loops seen so far.
    pub fn vector_loops(&self) -> usize {
        self.vector_loops
    }

    pub fn mutated(&self) -> bool {
        self.exprs.mutated()
    }

    pub fn into_inner(self) -> ExprOptimizer<'a, 'arena> {
        self.exprs
    }

    #[allow(clippy::too_many_arguments)]
    fn vectorize_loop(
        &mut self,
        ir: &mut IrArena,
        var: ExprId,
        start: ExprId,
        end: ExprId,
        increment: ExprId,
        body: StmtId,
        vec_width: u32,
        unroll: u32,
    ) -> CompileResult<StmtId> {
        let lanes = vec_width.max(1);
        self.vector_loops += 1;
        log::debug!("vectorizing innermost loop with {} lanes", lanes);

        let annotated = LaneAnnotator::new(lanes).annotate(ir, body)?;
        let increment = scale_increment(ir, increment, lanes);

        let saved = self.context.replace(VectorContext { lanes });
        let body = self.rewrite_stmt(ir, annotated);
        self.context = saved;
        let body = body?;

        Ok(ir.intern_stmt(StmtKind::For {
            var,
            start,
            end,
            increment,
            body,
            kind: LoopKind::Vectorized,
            vec_width,
            unroll,
        }))
    }
}

impl<'a, 'arena> IrRewriter for LoopOptimizer<'a, 'arena> {
    fn rewrite_expr(&mut self, _ir: &mut IrArena, id: ExprId) -> CompileResult<ExprId> {
        Ok(id)
    }

    fn rewrite_stmt(&mut self, ir: &mut IrArena, id: StmtId) -> CompileResult<StmtId> {
        match *ir.stmt(id) {
            StmtKind::For {
                var,
                start,
                end,
                increment,
                body,
                kind: LoopKind::Vectorized,
                vec_width,
                unroll,
            } if !contains_loop(ir, body) => {
                if vec_width > 1 && has_lane_annotations(ir, body) {
                    log::trace!("loop {:?} was vectorized by an earlier pass", id);
                    return Ok(id);
                }
                self.vectorize_loop(ir, var, start, end, increment, body, vec_width, unroll)
            }
            StmtKind::Store {
                arr,
                loc,
                data,
                lanes,
                use_atomics,
            } => {
                let Some(context) = self.context else {
                    return Ok(id);
                };
                let value = self.exprs.optimize(ir, data, context.lanes)?;
                if value == data {
                    return Ok(id);
                }
                Ok(ir.intern_stmt(StmtKind::Store {
                    arr,
                    loc,
                    data: value,
                    lanes,
                    use_atomics,
                }))
            }
            _ => rebuild_stmt(self, ir, id),
        }
    }
}

/// Whether any load or store under `body` already carries a lane width.
fn has_lane_annotations(ir: &IrArena, body: StmtId) -> bool {
    struct Finder(bool);
    impl IrVisitor for Finder {
        fn visit_expr(&mut self, ir: &IrArena, id: ExprId) {
            if let ExprKind::Load { lanes, .. } = ir.expr(id).kind {
                self.0 |= lanes > 1;
            }
            walk_expr(self, ir, id);
        }

        fn visit_stmt(&mut self, ir: &IrArena, id: StmtId) {
            if let StmtKind::Store { lanes, .. } = *ir.stmt(id) {
                self.0 |= lanes > 1;
            }
            walk_stmt(self, ir, id);
        }
    }
    let mut finder = Finder(false);
    finder.visit_stmt(ir, body);
    finder.0
}
