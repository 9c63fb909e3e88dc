//! Lane-width annotation for the body of a vectorized loop.

use crate::core::CompileResult;
use crate::ir::{rebuild_expr, rebuild_stmt, ExprId, ExprKind, IrArena, IrRewriter, LiteralValue, StmtId, StmtKind};

/// Sets the lane width of every load and store it reaches.
///
/// Location expressions are left scalar: a vector access still has one base
/// address.
pub struct LaneAnnotator {
    lanes: u32,
}

impl LaneAnnotator {
    pub fn new(lanes: u32) -> Self {
        Self { lanes: lanes.max(1) }
    }

    pub fn annotate(&mut self, ir: &mut IrArena, body: StmtId) -> CompileResult<StmtId> {
        self.rewrite_stmt(ir, body)
    }
}

impl IrRewriter for LaneAnnotator {
    fn rewrite_expr(&mut self, ir: &mut IrArena, id: ExprId) -> CompileResult<ExprId> {
        match ir.expr(id).kind {
            ExprKind::Load { arr, loc, lanes } if lanes != self.lanes => {
                Ok(ir.load_lanes(arr, loc, self.lanes))
            }
            ExprKind::Load { .. } => Ok(id),
            _ => rebuild_expr(self, ir, id),
        }
    }

    fn rewrite_stmt(&mut self, ir: &mut IrArena, id: StmtId) -> CompileResult<StmtId> {
        let StmtKind::Store {
            arr,
            loc,
            data,
            use_atomics,
            ..
        } = *ir.stmt(id)
        else {
            return rebuild_stmt(self, ir, id);
        };
        let data = self.rewrite_expr(ir, data)?;
        Ok(ir.intern_stmt(StmtKind::Store {
            arr,
            loc,
            data,
            lanes: self.lanes,
            use_atomics,
        }))
    }
}

/// Loop step after vectorizing by `lanes`: each iteration now covers
/// `lanes` scalar elements.
pub fn scale_increment(ir: &mut IrArena, increment: ExprId, lanes: u32) -> ExprId {
    if lanes <= 1 {
        return increment;
    }
    let node = ir.expr(increment);
    let ty = node.ty;
    let folded = match node.kind {
        ExprKind::Literal(LiteralValue::Int(step)) => step.checked_mul(i64::from(lanes)),
        // literal_int reinterprets the bits for unsigned types.
        ExprKind::Literal(LiteralValue::UInt(step)) => {
            step.checked_mul(u64::from(lanes)).map(|scaled| scaled as i64)
        }
        _ => None,
    };
    match folded {
        Some(step) => ir.literal_int(step, ty),
        // Non-literal or overflowing steps are scaled at run time.
        None => {
            let factor = ir.literal_int(i64::from(lanes), ty);
            ir.mul(increment, factor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Datatype;

    #[test]
    fn test_loads_and_stores_take_lane_width() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let out = ir.ptr_var("out", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let load = ir.load(a, i);
        let store = ir.store(out, i, load);

        let annotated = LaneAnnotator::new(8).annotate(&mut ir, store).unwrap();
        let vector_load = ir.load_lanes(a, i, 8);
        assert_eq!(
            ir.stmt(annotated),
            &StmtKind::Store {
                arr: out,
                loc: i,
                data: vector_load,
                lanes: 8,
                use_atomics: false,
            }
        );
    }

    #[test]
    fn test_indirect_locations_stay_scalar() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let idx = ir.ptr_var("idx", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let pos = ir.load(idx, i);
        let load = ir.load(a, pos);

        let mut annotator = LaneAnnotator::new(4);
        let annotated = annotator.rewrite_expr(&mut ir, load).unwrap();
        assert_eq!(annotated, ir.load_lanes(a, pos, 4));
    }

    #[test]
    fn test_increment_scaling() {
        let mut ir = IrArena::new();
        let one = ir.literal_int(1, Datatype::Int32);
        let four = ir.literal_int(4, Datatype::Int32);
        assert_eq!(scale_increment(&mut ir, one, 4), four);
        assert_eq!(scale_increment(&mut ir, one, 1), one);

        let step = ir.var("step", Datatype::Int32);
        let scaled = scale_increment(&mut ir, step, 4);
        assert_eq!(scaled, ir.mul(step, four));
    }

    #[test]
    fn test_overflowing_step_is_scaled_at_run_time() {
        let mut ir = IrArena::new();
        let huge = ir.literal_int(i64::MAX / 2, Datatype::Int64);
        let four = ir.literal_int(4, Datatype::Int64);
        let scaled = scale_increment(&mut ir, huge, 4);
        assert_eq!(scaled, ir.mul(huge, four));

        let big = ir.literal_int((u64::MAX / 2) as i64, Datatype::UInt64);
        let eight = ir.literal_int(8, Datatype::UInt64);
        let scaled = scale_increment(&mut ir, big, 8);
        assert_eq!(scaled, ir.mul(big, eight));

        let two = ir.literal_int(2, Datatype::UInt64);
        let sixteen = ir.literal_int(16, Datatype::UInt64);
        assert_eq!(scale_increment(&mut ir, two, 8), sixteen);
    }
}
