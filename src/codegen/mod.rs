//! Source and bridge-code emission.
//!
//! [`c`] renders functions as C99 host source plus a header, with a packed
//! entry point per function. [`shim`] renders the LLVM wrappers that connect
//! the host's pointer calls to oracle-produced vector functions. Both walk
//! the same synthesized call sites, so the argument order they agree on is
//! the call's argument order.

pub mod c;
pub mod shim;

use crate::ir::{walk_stmt, ExprId, ExprKind, IrArena, IrVisitor, StmtId, StmtKind};
use hashbrown::HashSet;

pub use c::{emit_c, CSource};
pub use shim::{emit_shims, extern_symbol, llvm_type, ShimModule, ShimParam, ShimWrapper};

/// Name of the wrapper the host calls in place of `call_name`.
pub fn shim_name(call_name: &str) -> String {
    format!("shim_{}", call_name)
}

/// Exported packed-argument entry point of function `name`.
pub fn packed_entry_name(name: &str) -> String {
    format!("_shim_{}", name)
}

/// Packed slots reserved ahead of the outputs when a function has a return slot.
pub const RETURN_SLOT_WORDS: usize = 4;

/// A store whose value is a call to an oracle-produced function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub call_name: String,
    pub arr: ExprId,
    pub loc: ExprId,
    pub data: ExprId,
    pub lanes: u32,
}

/// Synthesized call sites of `functions`, first occurrence per callee, in
/// traversal order.
pub fn synthesized_sites(ir: &IrArena, functions: &[StmtId]) -> Vec<CallSite> {
    let mut collector = SiteCollector::default();
    for &function in functions {
        collector.visit_stmt(ir, function);
    }
    collector.sites
}

#[derive(Default)]
struct SiteCollector {
    sites: Vec<CallSite>,
    seen: HashSet<String>,
}

impl IrVisitor for SiteCollector {
    fn visit_expr(&mut self, _ir: &IrArena, _id: ExprId) {}

    fn visit_stmt(&mut self, ir: &IrArena, id: StmtId) {
        if let StmtKind::Store { arr, loc, data, lanes, .. } = *ir.stmt(id) {
            if let ExprKind::Call { func, extern_llvm: true, .. } = &ir.expr(data).kind {
                if self.seen.insert(func.clone()) {
                    self.sites.push(CallSite {
                        call_name: func.clone(),
                        arr,
                        loc,
                        data,
                        lanes,
                    });
                }
            }
            return;
        }
        walk_stmt(self, ir, id);
    }
}
