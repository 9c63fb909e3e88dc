// This module emits the ABI shim: a textual LLVM IR module with one wrapper per distinct
// synthesized call site. Host C code passes plain pointers (and scalars by value); the
// oracle-produced function takes and returns vectors. For each store whose value is an
// external call the shim declares the oracle function under its dotted name, then defines
// `shim_<call>` taking the destination pointer followed by one parameter per call
// argument in argument order, which is register-slot order. Load operands arrive as
// pointers and are read with one unaligned vector load each; variable operands arrive
// by value and go straight into the call. The result is written back with a volatile
// unaligned vector store. Wrappers are marked alwaysinline so the cross-module pass
// pipeline erases them. Only integer widths 8 to 64, float and double are expressible;
// any other element type is an error.

//! ABI shim generator (textual LLVM IR).

use super::{shim_name, synthesized_sites};
use crate::core::{CompileError, CompileResult};
use crate::ir::{Datatype, ExprId, ExprKind, IrArena, StmtId};
use std::fmt::Write;

const DATALAYOUT: &str = "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128";
const TRIPLE: &str = "x86_64-unknown-linux-gnu";

/// LLVM spelling of an element type.
pub fn llvm_type(ty: Datatype) -> CompileResult<String> {
    if ty.is_integer() && ty.bits() <= 64 {
        return Ok(format!("i{}", ty.bits()));
    }
    match ty {
        Datatype::Float32 => Ok("float".to_string()),
        Datatype::Float64 => Ok("double".to_string()),
        _ => Err(CompileError::UnsupportedType {
            ty: ty.to_string(),
            context: "LLVM shim",
        }),
    }
}

/// Symbol the oracle's LLVM output defines for `call_name`.
pub fn extern_symbol(call_name: &str) -> String {
    call_name.replace('_', ".")
}

/// One wrapper parameter after the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimParam {
    /// Argument the host passes, an operand of the synthesized call.
    pub operand: ExprId,
    pub elem_type: String,
    /// Vector lanes loaded through the pointer; 1 for by-value scalars.
    pub lanes: u32,
    pub by_pointer: bool,
}

impl ShimParam {
    fn vector_type(&self) -> String {
        format!("<{} x {}>", self.lanes, self.elem_type)
    }

    /// Type the oracle function expects for this operand.
    fn callee_type(&self) -> String {
        if self.by_pointer {
            self.vector_type()
        } else {
            self.elem_type.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimWrapper {
    pub call_name: String,
    pub dest_type: String,
    pub lanes: u32,
    pub params: Vec<ShimParam>,
}

impl ShimWrapper {
    pub fn name(&self) -> String {
        shim_name(&self.call_name)
    }

    /// Parameter count of the wrapper, destination included.
    pub fn arity(&self) -> usize {
        self.params.len() + 1
    }
}

/// A complete shim module.
#[derive(Debug, Clone, Default)]
pub struct ShimModule {
    pub text: String,
    pub wrappers: Vec<ShimWrapper>,
}

/// Describe the wrapper for a store of `data` (an external call) into `arr`.
pub fn describe_wrapper(ir: &IrArena, arr: ExprId, data: ExprId, lanes: u32) -> CompileResult<ShimWrapper> {
    let ExprKind::Call { func, args, .. } = &ir.expr(data).kind else {
        return Err(CompileError::UnsupportedExpr {
            kind: ir.expr(data).kind.name(),
            context: "LLVM shim call site",
        });
    };
    let mut params = Vec::with_capacity(args.len());
    for &arg in args {
        let node = ir.expr(arg);
        let param = match &node.kind {
            ExprKind::Load { lanes, .. } => ShimParam {
                operand: arg,
                elem_type: llvm_type(node.ty)?,
                lanes: *lanes,
                by_pointer: true,
            },
            ExprKind::Var { .. } => ShimParam {
                operand: arg,
                elem_type: llvm_type(node.ty)?,
                lanes: 1,
                by_pointer: false,
            },
            other => {
                return Err(CompileError::UnsupportedExpr {
                    kind: other.name(),
                    context: "LLVM shim operand",
                })
            }
        };
        params.push(param);
    }
    Ok(ShimWrapper {
        call_name: func.clone(),
        dest_type: llvm_type(ir.ty(arr))?,
        lanes: lanes.max(1),
        params,
    })
}

/// Emit the shim for every synthesized store in `functions`.
pub fn emit_shims(ir: &IrArena, functions: &[StmtId], file_name: &str) -> CompileResult<ShimModule> {
    let mut module = ShimModule::default();
    let _ = writeln!(module.text, "; ModuleID = '{}'", file_name);
    let _ = writeln!(module.text, "source_filename = \"{}\"", file_name);
    let _ = writeln!(module.text, "target datalayout = \"{}\"", DATALAYOUT);
    let _ = writeln!(module.text, "target triple = \"{}\"", TRIPLE);
    module.text.push_str("attributes #0 = { alwaysinline }\n\n");

    for site in synthesized_sites(ir, functions) {
        let wrapper = describe_wrapper(ir, site.arr, site.data, site.lanes)?;
        write_wrapper(&mut module.text, &wrapper);
        log::debug!("emitted {} with {} parameters", wrapper.name(), wrapper.arity());
        module.wrappers.push(wrapper);
    }
    Ok(module)
}

fn write_wrapper(out: &mut String, wrapper: &ShimWrapper) {
    let symbol = extern_symbol(&wrapper.call_name);
    let ret = format!("<{} x {}>", wrapper.lanes, wrapper.dest_type);

    let callee_params: Vec<String> = wrapper.params.iter().map(ShimParam::callee_type).collect();
    let _ = writeln!(out, "; declare the generated hydride function");
    let _ = writeln!(out, "declare {} @{}({})\n", ret, symbol, callee_params.join(", "));

    let mut signature = vec!["ptr %dst".to_string()];
    for (i, param) in wrapper.params.iter().enumerate() {
        let ty = if param.by_pointer { "ptr" } else { param.elem_type.as_str() };
        signature.push(format!("{} %reg_{}", ty, i));
    }
    let _ = writeln!(out, "define void @{}({}) #0 {{", wrapper.name(), signature.join(", "));

    let _ = writeln!(out, "\t; load dst");
    let _ = writeln!(
        out,
        "\t%gep_dst = getelementptr {}, ptr %dst, i64 0\n",
        wrapper.dest_type
    );

    let mut call_args = Vec::with_capacity(wrapper.params.len());
    for (i, param) in wrapper.params.iter().enumerate() {
        if param.by_pointer {
            let vector = param.vector_type();
            let _ = writeln!(out, "\t; load reg_{}", i);
            let _ = writeln!(
                out,
                "\t%gep_reg_{i} = getelementptr {elem}, ptr %reg_{i}, i64 0",
                i = i,
                elem = param.elem_type
            );
            let _ = writeln!(
                out,
                "\t%vect_reg_{i} = load {vector}, ptr %gep_reg_{i}, align 1\n",
                i = i,
                vector = vector
            );
            call_args.push(format!("{} %vect_reg_{}", vector, i));
        } else {
            call_args.push(format!("{} %reg_{}", param.elem_type, i));
        }
    }

    let _ = writeln!(out, "\t; extern call to hydride generated function");
    let _ = writeln!(out, "\t%ret_val = call {} @{}({})\n", ret, symbol, call_args.join(", "));
    let _ = writeln!(out, "\tstore volatile {} %ret_val, ptr %gep_dst, align 1\n", ret);
    out.push_str("\tret void\n}\n\n");
}
