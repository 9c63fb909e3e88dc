// This module implements the expression synthesizer. It is handed the value expression of
// each store found inside a vectorized innermost loop, together with that loop's lane
// width, and decides whether to offer it to the synthesis oracle. Only the outermost
// expression is considered; when it is accepted the operands are subsumed by the
// synthesized function and are not visited on their own. An expression is eligible when
// it is an arithmetic, comparison, logical or generic binary operation, its result type
// is a fixed-width integer (floating-point and boolean results are skipped), and every
// node beneath it has a vector counterpart in the specification language. For an
// eligible expression the synthesizer assigns register slots, renders the specification,
// runs the oracle, and returns an external call to the oracle's function with the slot
// operands as arguments in slot order and the original result type. Calls to external
// symbols are never eligible, so running the pass twice rewrites nothing the second time.
// Oracle failures propagate unchanged and abort the compilation.

//! Expression synthesizer.

use crate::core::{CompilationSession, CompileResult, SynthesisConfig};
use crate::ir::{ExprId, ExprKind, IrArena, IrPrinter, UnaryOp};
use crate::synth::{emit_spec, is_renderable, RegisterSlotTable, SpecParams, SynthesisOracle, SynthesisRequest};
use std::path::{Path, PathBuf};

/// Why an expression was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Load, variable, literal, cast, call or property read.
    NotAnOperation,
    FloatResult,
    BoolResult,
    /// Some node below has no vector counterpart.
    Unrenderable,
    /// No load or variable operand; nothing to vectorize.
    Constant,
}

pub struct ExprOptimizer<'a, 'arena> {
    session: &'a CompilationSession<'arena>,
    oracle: &'a mut dyn SynthesisOracle,
    library: &'arena str,
    out_dir: PathBuf,
    config: SynthesisConfig,
    mutated: bool,
    requests: Vec<SynthesisRequest<'arena>>,
}

impl<'a, 'arena> ExprOptimizer<'a, 'arena> {
    pub fn new(
        session: &'a CompilationSession<'arena>,
        oracle: &'a mut dyn SynthesisOracle,
        library: &'arena str,
        out_dir: &Path,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            session,
            oracle,
            library,
            out_dir: out_dir.to_path_buf(),
            config,
            mutated: false,
            requests: Vec::new(),
        }
    }

    /// Whether at least one expression was replaced.
    pub fn mutated(&self) -> bool {
        self.mutated
    }

    /// Requests sent to the oracle, in traversal order.
    pub fn requests(&self) -> &[SynthesisRequest<'arena>] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<SynthesisRequest<'arena>> {
        self.requests
    }

    /// Check whether `expr` would be offered to the oracle.
    pub fn eligibility(ir: &IrArena, expr: ExprId) -> Result<(), SkipReason> {
        let node = ir.expr(expr);
        let is_operation = match &node.kind {
            ExprKind::Unary { op, .. } => *op != UnaryOp::Sqrt,
            ExprKind::Binary { .. }
            | ExprKind::BinOp { .. }
            | ExprKind::Min(_)
            | ExprKind::Max(_) => true,
            ExprKind::Literal(_)
            | ExprKind::Var { .. }
            | ExprKind::Cast { .. }
            | ExprKind::Call { .. }
            | ExprKind::Load { .. }
            | ExprKind::GetProperty { .. }
            | ExprKind::Sizeof(_) => false,
        };
        if !is_operation {
            return Err(SkipReason::NotAnOperation);
        }
        if node.ty.is_float() {
            return Err(SkipReason::FloatResult);
        }
        if node.ty.is_bool() {
            return Err(SkipReason::BoolResult);
        }
        if !is_renderable(ir, expr) {
            return Err(SkipReason::Unrenderable);
        }
        Ok(())
    }

    /// Return `expr` or an equivalent external call for a `lanes`-wide store.
    pub fn optimize(&mut self, ir: &mut IrArena, expr: ExprId, lanes: u32) -> CompileResult<ExprId> {
        if let Err(reason) = Self::eligibility(ir, expr) {
            if reason == SkipReason::Unrenderable {
                // Casts, calls, sqrt and property reads have no vector op in
                // the oracle grammar, so the whole store stays scalar.
                log::debug!(
                    "{} holds a node the oracle cannot express; left to the host compiler",
                    IrPrinter::print_expr(ir, expr)
                );
            }
            log::debug!("skipping {} ({:?})", IrPrinter::print_expr(ir, expr), reason);
            self.session.record_skipped_store();
            return Ok(expr);
        }

        let table = RegisterSlotTable::build(ir, expr);
        if table.is_empty() {
            log::debug!("skipping {} ({:?})", IrPrinter::print_expr(ir, expr), SkipReason::Constant);
            self.session.record_skipped_store();
            return Ok(expr);
        }

        let expr_id = self.session.next_expr_id();
        let params = SpecParams {
            library: self.library,
            expr_id,
            lanes,
            out_dir: &self.out_dir,
            config: &self.config,
        };
        let spec = emit_spec(ir, &table, expr, &params)?;
        let request = SynthesisRequest {
            library: self.library,
            expr_id,
            lanes,
            out_dir: self.out_dir.clone(),
            spec,
            slots: table.finish(self.session),
        };
        log::info!(
            "synthesizing expression {} of {} ({} slots, {} lanes): {}",
            expr_id,
            self.library,
            table.len(),
            lanes,
            IrPrinter::print_expr(ir, expr)
        );
        self.session.record_synthesis_request();

        let outcome = self.oracle.synthesize(self.session, &request)?;

        let ty = ir.ty(expr);
        let call = ir.extern_call(&outcome.call_name, table.arguments(), ty);
        self.session.record_rewrite(&outcome.call_name);
        self.mutated = true;
        self.requests.push(request);
        log::debug!("rewrote expression {} into {}", expr_id, outcome.call_name);
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;
    use crate::ir::Datatype;
    use crate::synth::DryRunOracle;

    #[test]
    fn test_eligibility_rules() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let f = ir.ptr_var("f", Datatype::Float32);
        let i = ir.var("i", Datatype::Int32);
        let la = ir.load_lanes(a, i, 4);
        let lf = ir.load_lanes(f, i, 4);

        let int_sum = ir.add(la, la);
        let float_sum = ir.add(lf, lf);
        let cmp = ir.lt(la, la);
        let wide = ir.cast(la, Datatype::Int64);
        let neg = ir.neg(la);

        assert_eq!(ExprOptimizer::eligibility(&ir, int_sum), Ok(()));
        assert_eq!(ExprOptimizer::eligibility(&ir, neg), Ok(()));
        assert_eq!(ExprOptimizer::eligibility(&ir, la), Err(SkipReason::NotAnOperation));
        assert_eq!(ExprOptimizer::eligibility(&ir, float_sum), Err(SkipReason::FloatResult));
        assert_eq!(ExprOptimizer::eligibility(&ir, cmp), Err(SkipReason::BoolResult));
        assert_eq!(ExprOptimizer::eligibility(&ir, wide), Err(SkipReason::NotAnOperation));

        // Integer arithmetic over a widening cast stays scalar.
        let widened_sum = ir.add(wide, wide);
        assert_eq!(ExprOptimizer::eligibility(&ir, widened_sum), Err(SkipReason::Unrenderable));
    }

    #[test]
    fn test_rewrite_into_extern_call() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut oracle = DryRunOracle::default();
        let dir = std::env::temp_dir();

        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int16);
        let k = ir.param("k", Datatype::Int16);
        let i = ir.var("i", Datatype::Int32);
        let la = ir.load_lanes(a, i, 8);
        let scaled = ir.mul(la, k);

        let mut optimizer = ExprOptimizer::new(&session, &mut oracle, "lib0", &dir, SynthesisConfig::default());
        let call = optimizer.optimize(&mut ir, scaled, 8).unwrap();
        assert!(optimizer.mutated());
        assert_eq!(optimizer.requests().len(), 1);
        assert_eq!(optimizer.requests()[0].slots.len(), 2);

        match &ir.expr(call).kind {
            ExprKind::Call { func, args, extern_llvm } => {
                assert_eq!(func, "hydride_node_lib0_0");
                assert_eq!(args, &vec![la, k]);
                assert!(*extern_llvm);
            }
            other => panic!("expected call, got {:?}", other),
        }
        assert_eq!(ir.ty(call), Datatype::Int16);

        // A second pass over the call finds nothing to do.
        let again = optimizer.optimize(&mut ir, call, 8).unwrap();
        assert_eq!(again, call);
        assert_eq!(session.stats().synthesis_requests, 1);
    }

    #[test]
    fn test_constant_expression_is_skipped() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut oracle = DryRunOracle::default();
        let dir = std::env::temp_dir();

        let mut ir = IrArena::new();
        let two = ir.literal_int(2, Datatype::Int32);
        let three = ir.literal_int(3, Datatype::Int32);
        let sum = ir.add(two, three);

        let mut optimizer = ExprOptimizer::new(&session, &mut oracle, "lib0", &dir, SynthesisConfig::default());
        assert_eq!(optimizer.optimize(&mut ir, sum, 4).unwrap(), sum);
        assert!(!optimizer.mutated());
        assert_eq!(session.stats().skipped_stores, 1);
    }
}
