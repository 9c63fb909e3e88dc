// This module renders Function statements as C99 host source. Each function becomes
// `int name(outputs..., inputs...)` returning 0, with pointer and tensor variables typed
// `T* restrict` and scalars passed by value. Loops keep their scheduling as pragmas:
// vectorized loops carry a clang vectorization hint and parallel loops carry an OpenMP
// worksharing pragma when OpenMP is enabled. A store that the synthesizer rewrote is
// emitted as a call to its shim wrapper, with the destination address first and then one
// argument per call operand (addresses for loads, values for variables); the matching
// `extern` prototypes are emitted ahead of the functions. Stores and assignments that
// carry lane-annotated loads but were not synthesized are expanded into an explicit
// per-lane loop, so the vectorized step of the enclosing loop stays correct. Every
// function also gets a packed entry point `_shim_<name>(void** args)` that unpacks
// outputs then inputs (after four reserved slots when the function has a return slot)
// and forwards them. Frontend-only nodes such as tensor property reads have no C
// rendering and are rejected.

//! C99 host source emitter.

use super::{packed_entry_name, shim_name, synthesized_sites, RETURN_SLOT_WORDS};
use crate::core::{CompileError, CompileResult};
use crate::ir::{
    walk_expr, Datatype, ExprId, ExprKind, IrArena, IrVisitor, LiteralValue, LoopKind, StmtId,
    StmtKind, UnaryOp,
};
use std::fmt::Write;

const LANE_VAR: &str = "__lane";

/// Emitted host source and header.
#[derive(Debug, Clone, Default)]
pub struct CSource {
    pub source: String,
    pub header: String,
    /// Packed entry points, one per function, in emission order.
    pub entry_points: Vec<String>,
}

/// Render `functions` as one translation unit for library `library`.
pub fn emit_c(
    ir: &IrArena,
    functions: &[StmtId],
    library: &str,
    openmp: bool,
) -> CompileResult<CSource> {
    let mut emitter = CEmitter {
        ir,
        out: String::new(),
        indent: 0,
        openmp,
        lane_expansion: false,
    };
    let mut result = CSource::default();

    emitter.preamble(library);
    emitter.shim_prototypes(functions)?;

    let mut prototypes = Vec::with_capacity(functions.len() * 2);
    for &function in functions {
        let StmtKind::Function {
            name,
            body,
            inputs,
            outputs,
            has_return_slot,
        } = ir.stmt(function)
        else {
            return Err(CompileError::InvalidState {
                reason: "module entries must be Function statements".to_string(),
            });
        };
        let signature = emitter.signature(name, outputs, inputs)?;
        emitter.function(&signature, *body)?;
        let entry = emitter.packed_entry(name, outputs, inputs, *has_return_slot)?;
        prototypes.push(format!("{};", signature));
        prototypes.push(format!("int {}(void** args);", entry));
        result.entry_points.push(entry);
    }

    result.source = emitter.out;
    result.header = header(library, &prototypes);
    log::debug!(
        "emitted {} functions for {} ({} bytes of C)",
        functions.len(),
        library,
        result.source.len()
    );
    Ok(result)
}

fn header(library: &str, prototypes: &[String]) -> String {
    let guard = format!("VSYNTH_{}_H", library.to_ascii_uppercase());
    let mut out = String::new();
    let _ = writeln!(out, "#ifndef {}", guard);
    let _ = writeln!(out, "#define {}", guard);
    out.push_str("#include <stdint.h>\n#include <stdbool.h>\n\n");
    for prototype in prototypes {
        out.push_str(prototype);
        out.push('\n');
    }
    let _ = writeln!(out, "\n#endif // {}", guard);
    out
}

fn c_type(ty: Datatype) -> CompileResult<&'static str> {
    ty.c_name().ok_or_else(|| CompileError::UnsupportedType {
        ty: ty.to_string(),
        context: "C source",
    })
}

fn c_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct CEmitter<'a> {
    ir: &'a IrArena,
    out: String,
    indent: usize,
    openmp: bool,
    /// Inside a per-lane loop: lane-annotated loads index with the lane.
    lane_expansion: bool,
}

impl<'a> CEmitter<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn preamble(&mut self, library: &str) {
        let _ = writeln!(self.out, "// Generated host code for library {}", library);
        for include in [
            "stdint.h", "stdbool.h", "stdlib.h", "stdio.h", "string.h", "math.h", "complex.h",
        ] {
            let _ = writeln!(self.out, "#include <{}>", include);
        }
        if self.openmp {
            self.out.push_str("#include <omp.h>\n");
        }
        self.out.push_str("#define TACO_MIN(_a,_b) ((_a) < (_b) ? (_a) : (_b))\n");
        self.out.push_str("#define TACO_MAX(_a,_b) ((_a) > (_b) ? (_a) : (_b))\n\n");
    }

    fn shim_prototypes(&mut self, functions: &[StmtId]) -> CompileResult<()> {
        let ir = self.ir;
        let sites = synthesized_sites(ir, functions);
        for site in &sites {
            let ExprKind::Call { args, .. } = &ir.expr(site.data).kind else {
                continue;
            };
            let mut params = vec![format!("{}* dst", c_type(ir.ty(site.arr))?)];
            for (i, &arg) in args.iter().enumerate() {
                let ty = c_type(ir.ty(arg))?;
                match &ir.expr(arg).kind {
                    ExprKind::Load { .. } => params.push(format!("{}* reg_{}", ty, i)),
                    ExprKind::Var { .. } => params.push(format!("{} reg_{}", ty, i)),
                    other => {
                        return Err(CompileError::UnsupportedExpr {
                            kind: other.name(),
                            context: "synthesized call operand",
                        })
                    }
                }
            }
            let _ = writeln!(
                self.out,
                "extern void {}({});",
                shim_name(&site.call_name),
                params.join(", ")
            );
        }
        if !sites.is_empty() {
            self.out.push('\n');
        }
        Ok(())
    }

    fn param_decl(&self, var: ExprId) -> CompileResult<String> {
        let name = self.ir.var_name(var).ok_or(CompileError::UnsupportedExpr {
            kind: self.ir.expr(var).kind.name(),
            context: "function parameter",
        })?;
        let ty = c_type(self.ir.ty(var))?;
        if self.ir.is_pointer_var(var) {
            Ok(format!("{}* restrict {}", ty, name))
        } else {
            Ok(format!("{} {}", ty, name))
        }
    }

    fn signature(&self, name: &str, outputs: &[ExprId], inputs: &[ExprId]) -> CompileResult<String> {
        let params = outputs
            .iter()
            .chain(inputs)
            .map(|&var| self.param_decl(var))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(format!("int {}({})", name, params.join(", ")))
    }

    fn function(&mut self, signature: &str, body: StmtId) -> CompileResult<()> {
        self.line(&format!("{} {{", signature));
        self.indent += 1;
        self.stmt(body)?;
        self.line("return 0;");
        self.indent -= 1;
        self.line("}\n");
        Ok(())
    }

    fn packed_entry(
        &mut self,
        name: &str,
        outputs: &[ExprId],
        inputs: &[ExprId],
        has_return_slot: bool,
    ) -> CompileResult<String> {
        let entry = packed_entry_name(name);
        let offset = if has_return_slot { RETURN_SLOT_WORDS } else { 0 };
        let mut args = Vec::with_capacity(outputs.len() + inputs.len());
        for (k, &var) in outputs.iter().chain(inputs).enumerate() {
            let ty = c_type(self.ir.ty(var))?;
            let slot = offset + k;
            if self.ir.is_pointer_var(var) {
                args.push(format!("({}*)(args[{}])", ty, slot));
            } else {
                args.push(format!("*({}*)(args[{}])", ty, slot));
            }
        }
        self.line(&format!("int {}(void** args) {{", entry));
        self.indent += 1;
        self.line(&format!("return {}({});", name, args.join(", ")));
        self.indent -= 1;
        self.line("}\n");
        Ok(entry)
    }

    fn block(&mut self, body: StmtId) -> CompileResult<()> {
        self.indent += 1;
        self.stmt(body)?;
        self.indent -= 1;
        Ok(())
    }

    fn stmt(&mut self, id: StmtId) -> CompileResult<()> {
        let ir = self.ir;
        match ir.stmt(id) {
            StmtKind::Block(stmts) => {
                for &stmt in stmts {
                    self.stmt(stmt)?;
                }
            }
            StmtKind::Scope(body) => {
                self.line("{");
                self.block(*body)?;
                self.line("}");
            }
            StmtKind::Store {
                arr,
                loc,
                data,
                lanes,
                use_atomics,
            } => {
                if ir.is_extern_call(*data) {
                    self.synthesized_store(*arr, *loc, *data)?;
                } else if *lanes > 1 {
                    let target = format!("{}[({}) + {}]", self.expr(*arr)?, self.expr(*loc)?, LANE_VAR);
                    self.lane_loop(*lanes, &target, *data)?;
                } else {
                    if *use_atomics && self.openmp {
                        self.line("#pragma omp atomic");
                    }
                    let text = format!("{}[{}] = {};", self.expr(*arr)?, self.expr(*loc)?, self.expr(*data)?);
                    self.line(&text);
                }
            }
            StmtKind::For {
                var,
                start,
                end,
                increment,
                body,
                kind,
                vec_width,
                ..
            } => {
                self.loop_pragma(*kind, *vec_width);
                let name = self.expr(*var)?;
                let text = format!(
                    "for ({} {} = {}; {} < {}; {} += {}) {{",
                    c_type(ir.ty(*var))?,
                    name,
                    self.expr(*start)?,
                    name,
                    self.expr(*end)?,
                    name,
                    self.expr(*increment)?
                );
                self.line(&text);
                self.block(*body)?;
                self.line("}");
            }
            StmtKind::While { cond, body, .. } => {
                let text = format!("while ({}) {{", self.expr(*cond)?);
                self.line(&text);
                self.block(*body)?;
                self.line("}");
            }
            StmtKind::IfThenElse { cond, then, otherwise } => {
                let text = format!("if ({}) {{", self.expr(*cond)?);
                self.line(&text);
                self.block(*then)?;
                if let Some(otherwise) = otherwise {
                    self.line("} else {");
                    self.block(*otherwise)?;
                }
                self.line("}");
            }
            StmtKind::VarDecl { var, rhs } => {
                if vector_lanes(ir, *rhs) > 1 {
                    return Err(CompileError::UnsupportedExpr {
                        kind: "Load",
                        context: "lane-annotated declaration",
                    });
                }
                let ty = c_type(ir.ty(*var))?;
                let star = if ir.is_pointer_var(*var) { "*" } else { "" };
                let text = format!("{}{} {} = {};", ty, star, self.expr(*var)?, self.expr(*rhs)?);
                self.line(&text);
            }
            StmtKind::Assign { lhs, rhs, use_atomics } => {
                let lanes = vector_lanes(ir, *rhs);
                if lanes > 1 {
                    let target = self.expr(*lhs)?;
                    self.lane_loop(lanes, &target, *rhs)?;
                } else {
                    if *use_atomics && self.openmp {
                        self.line("#pragma omp atomic");
                    }
                    let text = format!("{} = {};", self.expr(*lhs)?, self.expr(*rhs)?);
                    self.line(&text);
                }
            }
            StmtKind::Allocate {
                var,
                num_elements,
                is_realloc,
                clear,
            } => {
                let ty = c_type(ir.ty(*var))?;
                let name = self.expr(*var)?;
                let count = self.expr(*num_elements)?;
                let text = if *is_realloc {
                    format!("{n} = ({t}*)realloc({n}, sizeof({t}) * ({c}));", n = name, t = ty, c = count)
                } else if *clear {
                    format!("{} = ({}*)calloc({}, sizeof({}));", name, ty, count, ty)
                } else {
                    format!("{n} = ({t}*)malloc(sizeof({t}) * ({c}));", n = name, t = ty, c = count)
                };
                self.line(&text);
            }
            StmtKind::Free { var } => {
                let text = format!("free({});", self.expr(*var)?);
                self.line(&text);
            }
            StmtKind::Comment(text) => {
                for part in text.lines() {
                    self.line(&format!("// {}", part));
                }
            }
            StmtKind::BlankLine => self.out.push('\n'),
            StmtKind::Continue => self.line("continue;"),
            StmtKind::Break => self.line("break;"),
            StmtKind::Print { fmt, params } => {
                let mut text = format!("printf({}", c_string_literal(fmt));
                for &param in params {
                    text.push_str(", ");
                    text.push_str(&self.expr(param)?);
                }
                text.push_str(");");
                self.line(&text);
            }
            StmtKind::Function { .. } => {
                return Err(CompileError::UnsupportedExpr {
                    kind: "Function",
                    context: "nested function",
                });
            }
        }
        Ok(())
    }

    fn loop_pragma(&mut self, kind: LoopKind, vec_width: u32) {
        match kind {
            LoopKind::Vectorized if vec_width > 1 => {
                self.line(&format!(
                    "#pragma clang loop interleave(enable) vectorize_width({})",
                    vec_width
                ));
            }
            LoopKind::Vectorized | LoopKind::Serial => {}
            _ if !self.openmp => {}
            LoopKind::Static => self.line("#pragma omp parallel for schedule(static)"),
            LoopKind::Dynamic => self.line("#pragma omp parallel for schedule(dynamic, 1)"),
            LoopKind::Runtime => self.line("#pragma omp parallel for schedule(runtime)"),
            LoopKind::StaticChunked => self.line("#pragma omp parallel for schedule(static, 1)"),
        }
    }

    /// `target = data` once per lane.
    fn lane_loop(&mut self, lanes: u32, target: &str, data: ExprId) -> CompileResult<()> {
        self.line(&format!(
            "for (int32_t {l} = 0; {l} < {n}; {l}++) {{",
            l = LANE_VAR,
            n = lanes
        ));
        self.lane_expansion = true;
        let value = self.expr(data);
        self.lane_expansion = false;
        self.indent += 1;
        self.line(&format!("{} = {};", target, value?));
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn synthesized_store(&mut self, arr: ExprId, loc: ExprId, data: ExprId) -> CompileResult<()> {
        let ir = self.ir;
        let ExprKind::Call { func, args, .. } = &ir.expr(data).kind else {
            return Ok(());
        };
        let mut operands = vec![format!("&{}[{}]", self.expr(arr)?, self.expr(loc)?)];
        for &arg in args {
            match &ir.expr(arg).kind {
                ExprKind::Load { arr, loc, .. } => {
                    operands.push(format!("&{}[{}]", self.expr(*arr)?, self.expr(*loc)?));
                }
                _ => operands.push(self.expr(arg)?),
            }
        }
        self.line(&format!("{}({});", shim_name(func), operands.join(", ")));
        Ok(())
    }

    fn literal(&self, value: LiteralValue, ty: Datatype) -> String {
        match value {
            LiteralValue::Bool(b) => b.to_string(),
            LiteralValue::Int(v) if ty.bits() > 32 => format!("{}LL", v),
            LiteralValue::Int(v) => v.to_string(),
            LiteralValue::UInt(v) if ty.bits() > 32 => format!("{}ULL", v),
            LiteralValue::UInt(v) => format!("{}u", v),
            LiteralValue::Float(_) => {
                let f = value.as_f64();
                if f.is_nan() {
                    return "NAN".to_string();
                }
                if f.is_infinite() {
                    return if f > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string();
                }
                let text = format!("{:?}", f);
                if ty == Datatype::Float32 {
                    format!("{}f", text)
                } else {
                    text
                }
            }
        }
    }

    fn fold(&self, macro_name: &str, operands: &[ExprId], kind: &'static str) -> CompileResult<String> {
        let Some((&last, rest)) = operands.split_last() else {
            return Err(CompileError::UnsupportedExpr {
                kind,
                context: "empty operand list",
            });
        };
        let mut text = self.expr(last)?;
        for &op in rest.iter().rev() {
            text = format!("{}({}, {})", macro_name, self.expr(op)?, text);
        }
        Ok(text)
    }

    fn expr(&self, id: ExprId) -> CompileResult<String> {
        let ir = self.ir;
        let node = ir.expr(id);
        Ok(match &node.kind {
            ExprKind::Literal(value) => self.literal(*value, node.ty),
            ExprKind::Var { name, .. } => name.clone(),
            ExprKind::Unary { op, a } => match op {
                UnaryOp::Neg => format!("(-{})", self.expr(*a)?),
                UnaryOp::Not => format!("(!{})", self.expr(*a)?),
                UnaryOp::Sqrt if node.ty == Datatype::Float32 => format!("sqrtf({})", self.expr(*a)?),
                UnaryOp::Sqrt => format!("sqrt({})", self.expr(*a)?),
            },
            ExprKind::Binary { op, a, b } => {
                format!("({} {} {})", self.expr(*a)?, op.symbol(), self.expr(*b)?)
            }
            ExprKind::Min(operands) => self.fold("TACO_MIN", operands, "Min")?,
            ExprKind::Max(operands) => self.fold("TACO_MAX", operands, "Max")?,
            ExprKind::BinOp {
                a,
                b,
                start,
                mid,
                end,
            } => format!("{}{} {} {}{}", start, self.expr(*a)?, mid, self.expr(*b)?, end),
            ExprKind::Cast { a } => format!("(({}){})", c_type(node.ty)?, self.expr(*a)?),
            ExprKind::Call {
                extern_llvm: true, ..
            } => {
                return Err(CompileError::UnsupportedExpr {
                    kind: "Call",
                    context: "synthesized call outside a store",
                })
            }
            ExprKind::Call { func, args, .. } => {
                let args = args
                    .iter()
                    .map(|&arg| self.expr(arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                format!("{}({})", func, args.join(", "))
            }
            ExprKind::Load { arr, loc, lanes } if self.lane_expansion && *lanes > 1 => {
                format!("{}[({}) + {}]", self.expr(*arr)?, self.expr(*loc)?, LANE_VAR)
            }
            ExprKind::Load { arr, loc, .. } => format!("{}[{}]", self.expr(*arr)?, self.expr(*loc)?),
            ExprKind::GetProperty { .. } => {
                return Err(CompileError::UnsupportedExpr {
                    kind: node.kind.name(),
                    context: "host C source",
                })
            }
            ExprKind::Sizeof(of) => format!("sizeof({})", c_type(*of)?),
        })
    }
}

/// Widest lane annotation among the loads of `expr`.
fn vector_lanes(ir: &IrArena, expr: ExprId) -> u32 {
    struct Widest(u32);
    impl IrVisitor for Widest {
        fn visit_expr(&mut self, ir: &IrArena, id: ExprId) {
            if let ExprKind::Load { lanes, .. } = ir.expr(id).kind {
                self.0 = self.0.max(lanes);
            }
            walk_expr(self, ir, id);
        }
    }
    let mut widest = Widest(1);
    widest.visit_expr(ir, expr);
    widest.0
}
