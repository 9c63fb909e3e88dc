//! Lowered benchmark kernels.
//!
//! Each kernel is built directly as backend IR, the shape the index-notation
//! frontend hands over after scheduling: a Function whose innermost loop is
//! tagged Vectorized with the requested lane width. Pointer arguments come
//! first in the packed layout as outputs, then inputs; sizes are scalar
//! inputs.

use crate::ir::{Datatype, ExprId, IrArena, LoopKind, StmtId};
use std::fmt;

/// Constant added by [`Kernel::VecAddConst`].
pub const ADDEND: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// `out[i] = a[i] + b[i]`
    VecAdd,
    /// `out[i] = a[i] + 3`
    VecAddConst,
    /// `out[i] = a[i] + k` with scalar `k`
    ScaAdd,
    /// `out[i*n + j] = a[i*n + j] + b[i*n + j]`, vectorized over `j`
    VecAdd2d,
    /// `out[0] = sum(a[i])` over floats
    Reduction,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::VecAdd,
        Kernel::VecAddConst,
        Kernel::ScaAdd,
        Kernel::VecAdd2d,
        Kernel::Reduction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kernel::VecAdd => "vec_add",
            Kernel::VecAddConst => "vec_add_const",
            Kernel::ScaAdd => "sca_add",
            Kernel::VecAdd2d => "vec_add_2d",
            Kernel::Reduction => "reduction",
        }
    }

    /// Build the kernel's Function statement in `ir`.
    pub fn build(self, ir: &mut IrArena, lanes: u32) -> StmtId {
        match self {
            Kernel::VecAdd => vec_add(ir, lanes),
            Kernel::VecAddConst => vec_add_const(ir, lanes),
            Kernel::ScaAdd => sca_add(ir, lanes),
            Kernel::VecAdd2d => vec_add_2d(ir, lanes),
            Kernel::Reduction => reduction(ir, lanes),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `for i in 0..n` tagged Vectorized around `body`.
fn vector_loop(ir: &mut IrArena, i: ExprId, n: ExprId, body: StmtId, lanes: u32) -> StmtId {
    let zero = ir.literal_int(0, Datatype::Int32);
    let one = ir.literal_int(1, Datatype::Int32);
    ir.for_loop(i, zero, n, one, body, LoopKind::Vectorized, lanes)
}

fn vec_add(ir: &mut IrArena, lanes: u32) -> StmtId {
    let a = ir.ptr_var("a", Datatype::Int32);
    let b = ir.ptr_var("b", Datatype::Int32);
    let out = ir.ptr_var("out", Datatype::Int32);
    let i = ir.var("i", Datatype::Int32);
    let n = ir.param("n", Datatype::Int32);
    let la = ir.load(a, i);
    let lb = ir.load(b, i);
    let sum = ir.add(la, lb);
    let store = ir.store(out, i, sum);
    let body = vector_loop(ir, i, n, store, lanes);
    ir.function("vec_add", body, vec![a, b, n], vec![out])
}

fn vec_add_const(ir: &mut IrArena, lanes: u32) -> StmtId {
    let a = ir.ptr_var("a", Datatype::Int32);
    let out = ir.ptr_var("out", Datatype::Int32);
    let i = ir.var("i", Datatype::Int32);
    let n = ir.param("n", Datatype::Int32);
    let la = ir.load(a, i);
    let addend = ir.literal_int(ADDEND, Datatype::Int32);
    let sum = ir.add(la, addend);
    let store = ir.store(out, i, sum);
    let body = vector_loop(ir, i, n, store, lanes);
    ir.function("vec_add_const", body, vec![a, n], vec![out])
}

fn sca_add(ir: &mut IrArena, lanes: u32) -> StmtId {
    let a = ir.ptr_var("a", Datatype::Int32);
    let out = ir.ptr_var("out", Datatype::Int32);
    let k = ir.param("k", Datatype::Int32);
    let i = ir.var("i", Datatype::Int32);
    let n = ir.param("n", Datatype::Int32);
    let la = ir.load(a, i);
    let sum = ir.add(la, k);
    let store = ir.store(out, i, sum);
    let body = vector_loop(ir, i, n, store, lanes);
    ir.function("sca_add", body, vec![a, k, n], vec![out])
}

fn vec_add_2d(ir: &mut IrArena, lanes: u32) -> StmtId {
    let a = ir.ptr_var("a", Datatype::Int32);
    let b = ir.ptr_var("b", Datatype::Int32);
    let out = ir.ptr_var("out", Datatype::Int32);
    let i = ir.var("i", Datatype::Int32);
    let j = ir.var("j", Datatype::Int32);
    let m = ir.param("m", Datatype::Int32);
    let n = ir.param("n", Datatype::Int32);

    let row = ir.mul(i, n);
    let pos = ir.add(row, j);
    let la = ir.load(a, pos);
    let lb = ir.load(b, pos);
    let sum = ir.add(la, lb);
    let store = ir.store(out, pos, sum);
    let inner = vector_loop(ir, j, n, store, lanes);

    let zero = ir.literal_int(0, Datatype::Int32);
    let one = ir.literal_int(1, Datatype::Int32);
    let outer = ir.for_loop(i, zero, m, one, inner, LoopKind::Serial, 0);
    ir.function("vec_add_2d", outer, vec![a, b, m, n], vec![out])
}

fn reduction(ir: &mut IrArena, lanes: u32) -> StmtId {
    let a = ir.ptr_var("a", Datatype::Float32);
    let out = ir.ptr_var("out", Datatype::Float32);
    let sum = ir.var("sum", Datatype::Float32);
    let i = ir.var("i", Datatype::Int32);
    let n = ir.param("n", Datatype::Int32);

    let init = ir.literal_float(0.0, Datatype::Float32);
    let decl = ir.var_decl(sum, init);
    let la = ir.load(a, i);
    let acc = ir.add(sum, la);
    let update = ir.assign(sum, acc);
    let body = vector_loop(ir, i, n, update, lanes);
    let zero = ir.literal_int(0, Datatype::Int32);
    let result = ir.store(out, zero, sum);
    let block = ir.block(vec![decl, body, result]);
    ir.function("reduction", block, vec![a, n], vec![out])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StmtKind;

    #[test]
    fn test_every_kernel_is_a_function() {
        let mut ir = IrArena::new();
        for kernel in Kernel::ALL {
            let function = kernel.build(&mut ir, 4);
            match ir.stmt(function) {
                StmtKind::Function { name, outputs, .. } => {
                    assert_eq!(name, kernel.name());
                    assert_eq!(outputs.len(), 1);
                }
                other => panic!("{} built {:?}", kernel, other),
            }
        }
    }
}
