// This module renders one candidate expression as a Rosette program for the synthesis
// oracle. The program has a fixed shape: solver-language imports, a debug toggle, an
// optional solver bit width, a memory limit, one symbolic buffer per register slot plus
// an id map from buffer to slot index, the expression itself, and the synthesis
// directive followed by the requests to dump the result, lower it to LLVM IR under the
// request's external symbol and save the solved map. In the expression body every load
// and variable is replaced by its slot buffer; variables and literals are broadcast to
// the lane width with `(x<lanes> ...)` since the oracle reasons about whole vectors.
// Node kinds without a vector counterpart (casts, calls, sqrt, tensor properties) make
// an expression unrenderable, which callers check up front with is_renderable. Types
// the oracle cannot model (128-bit integers, complex numbers, undefined) are errors.

//! Rosette specification emitter.

use super::register_map::{RegisterSlot, RegisterSlotTable, SlotKind};
use super::{bitcode_stem, call_name, hash_name, hash_path, log_name};
use crate::core::{CompileError, CompileResult, SynthesisConfig};
use crate::ir::{BinaryOp, Datatype, ExprId, ExprKind, IrArena, LiteralValue, UnaryOp};
use std::fmt::Write;
use std::path::Path;

/// Naming and shape of one request, as seen by the emitter.
#[derive(Debug, Clone, Copy)]
pub struct SpecParams<'a> {
    pub library: &'a str,
    pub expr_id: usize,
    pub lanes: u32,
    pub out_dir: &'a Path,
    pub config: &'a SynthesisConfig,
}

/// Vector op name for a generic binary operator spelled `mid`.
fn bin_op_name(mid: &str) -> Option<&'static str> {
    Some(match mid.trim() {
        "+" => "add",
        "-" => "sub",
        "*" => "mul",
        "/" => "div",
        "%" => "mod",
        "&" => "bwand",
        "|" => "bwor",
        "^" => "bwxor",
        "<<" => "shl",
        ">>" => "shr",
        _ => return None,
    })
}

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Rem => "mod",
        BinaryOp::BitAnd => "bwand",
        BinaryOp::BitOr => "bwor",
        BinaryOp::Eq => "eq",
        BinaryOp::Neq => "ne",
        BinaryOp::Gt => "gt",
        BinaryOp::Lt => "lt",
        BinaryOp::Gte => "ge",
        BinaryOp::Lte => "le",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

/// Whether every node under `root` has a vector counterpart.
pub fn is_renderable(ir: &IrArena, root: ExprId) -> bool {
    match &ir.expr(root).kind {
        ExprKind::Literal(_) | ExprKind::Var { .. } | ExprKind::Load { .. } => true,
        ExprKind::Unary { op: UnaryOp::Sqrt, .. } => false,
        ExprKind::Unary { a, .. } => is_renderable(ir, *a),
        ExprKind::Binary { a, b, .. } => is_renderable(ir, *a) && is_renderable(ir, *b),
        ExprKind::BinOp { a, b, mid, .. } => {
            bin_op_name(mid).is_some() && is_renderable(ir, *a) && is_renderable(ir, *b)
        }
        ExprKind::Min(operands) | ExprKind::Max(operands) => {
            !operands.is_empty() && operands.iter().all(|&op| is_renderable(ir, op))
        }
        ExprKind::Cast { .. }
        | ExprKind::Call { .. }
        | ExprKind::GetProperty { .. }
        | ExprKind::Sizeof(_) => false,
    }
}

/// Element type name used when declaring a symbolic buffer.
fn buffer_type_name(ty: Datatype) -> CompileResult<&'static str> {
    use Datatype::*;
    Ok(match ty {
        Bool => "bool",
        UInt8 => "uint8",
        UInt16 => "uint16",
        UInt32 => "uint32",
        UInt64 => "uint64",
        Int8 => "int8",
        Int16 => "int16",
        Int32 => "int32",
        Int64 => "int64",
        Float32 => "float32",
        Float64 => "float64",
        UInt128 | Int128 | Complex64 | Complex128 | Undefined => {
            return Err(CompileError::UnsupportedType {
                ty: ty.to_string(),
                context: "synthesis specification",
            })
        }
    })
}

/// Render the complete specification for `root`.
pub fn emit_spec(
    ir: &IrArena,
    table: &RegisterSlotTable,
    root: ExprId,
    params: &SpecParams<'_>,
) -> CompileResult<String> {
    let mut emitter = RosetteEmitter {
        ir,
        table,
        lanes: params.lanes.max(1),
        out: String::new(),
    };
    emitter.preamble(params.config);
    emitter.symbolic_buffers()?;
    emitter.out.push_str("(define halide-expr\n  ");
    emitter.expr(root)?;
    emitter.out.push_str("\n)\n\n(clear-vc!)\n\n");
    emitter.directives(params);
    Ok(emitter.out)
}

struct RosetteEmitter<'a> {
    ir: &'a IrArena,
    table: &'a RegisterSlotTable,
    lanes: u32,
    out: String,
}

impl<'a> RosetteEmitter<'a> {
    fn preamble(&mut self, config: &SynthesisConfig) {
        self.out.push_str(
            "#lang rosette\n\
             (require rosette/lib/synthax)\n\
             (require rosette/lib/angelic)\n\
             (require racket/pretty)\n\
             (require data/bit-vector)\n\
             (require rosette/lib/destruct)\n\
             (require rosette/solver/smt/boolector)\n\
             (require hydride)\n\n",
        );
        self.out.push_str(";; Uncomment the line below to enable verbose logging\n(enable-debug)\n\n");
        if let Some(bitwidth) = config.bitwidth {
            let _ = writeln!(self.out, "(current-bitwidth {})\n", bitwidth);
        }
        let _ = writeln!(
            self.out,
            "(custodian-limit-memory (current-custodian) (* {} 1024 1024))\n",
            config.memory_limit_mb
        );
    }

    fn symbolic_buffers(&mut self) -> CompileResult<()> {
        let table = self.table;
        let slots: &[RegisterSlot] = table.slots();
        for slot in slots {
            let name = slot.name();
            let type_name = buffer_type_name(slot.ty)?;
            let _ = writeln!(
                self.out,
                "(define-symbolic {}_bitvector (bitvector {}))",
                name,
                slot.bit_width()
            );
            let _ = writeln!(
                self.out,
                "(define {} (halide:create-buffer {}_bitvector '{}))",
                name, name, type_name
            );
        }
        self.out.push_str("\n(define id-map (make-hash))\n");
        for slot in slots {
            let _ = writeln!(self.out, "(hash-set! id-map {} {})", slot.name(), slot.index);
        }
        self.out.push('\n');
        Ok(())
    }

    fn broadcast(&mut self, inner: &str) {
        let _ = write!(self.out, "(x{} {})", self.lanes, inner);
    }

    fn expr(&mut self, id: ExprId) -> CompileResult<()> {
        let ir = self.ir;
        let node = ir.expr(id);
        match &node.kind {
            ExprKind::Load { .. } | ExprKind::Var { .. } => {
                let slot = self.table.slot_of(id).ok_or_else(|| CompileError::InvalidState {
                    reason: format!("operand {:?} has no register slot", id),
                })?;
                let name = format!("reg_{}", slot);
                match self.table.slots()[slot].kind {
                    SlotKind::Load { .. } => self.out.push_str(&name),
                    SlotKind::Var => self.broadcast(&name),
                }
            }
            ExprKind::Literal(value) => {
                let imm = literal_imm(*value, node.ty)?;
                self.broadcast(&imm);
            }
            ExprKind::Unary { op, a } => {
                let name = match op {
                    UnaryOp::Neg => "vec-neg",
                    UnaryOp::Not => "vec-not",
                    UnaryOp::Sqrt => {
                        return Err(CompileError::UnsupportedExpr {
                            kind: "Sqrt",
                            context: "synthesis specification",
                        })
                    }
                };
                let _ = write!(self.out, "({} ", name);
                self.expr(*a)?;
                self.out.push(')');
            }
            ExprKind::Binary { op, a, b } => self.binary(binary_op_name(*op), *a, *b)?,
            ExprKind::BinOp { a, b, mid, .. } => {
                let name = bin_op_name(mid).ok_or(CompileError::UnsupportedExpr {
                    kind: "BinOp",
                    context: "synthesis specification",
                })?;
                self.binary(name, *a, *b)?;
            }
            ExprKind::Min(operands) => self.fold("vec-min", operands)?,
            ExprKind::Max(operands) => self.fold("vec-max", operands)?,
            ExprKind::Cast { .. }
            | ExprKind::Call { .. }
            | ExprKind::GetProperty { .. }
            | ExprKind::Sizeof(_) => {
                return Err(CompileError::UnsupportedExpr {
                    kind: node.kind.name(),
                    context: "synthesis specification",
                })
            }
        }
        Ok(())
    }

    fn binary(&mut self, name: &str, a: ExprId, b: ExprId) -> CompileResult<()> {
        let _ = write!(self.out, "(vec-{} ", name);
        self.expr(a)?;
        self.out.push(' ');
        self.expr(b)?;
        self.out.push(')');
        Ok(())
    }

    /// `(op x0 (op x1 ... xn))`
    fn fold(&mut self, name: &str, operands: &[ExprId]) -> CompileResult<()> {
        let Some((last, rest)) = operands.split_last() else {
            return Err(CompileError::UnsupportedExpr {
                kind: "Min/Max",
                context: "synthesis specification",
            });
        };
        for &op in rest {
            let _ = write!(self.out, "({} ", name);
            self.expr(op)?;
            self.out.push(' ');
        }
        self.expr(*last)?;
        for _ in rest {
            self.out.push(')');
        }
        Ok(())
    }

    fn directives(&mut self, params: &SpecParams<'_>) {
        let config = params.config;
        let _ = writeln!(
            self.out,
            "(define synth-res (synthesize-halide-expr halide-expr id-map {} {} '{} #t #f \"{}\" \"{}\" \"{}\"))",
            config.depth,
            self.lanes,
            config.solver,
            params.out_dir.display(),
            log_name(params.library, params.expr_id),
            config.target_isa
        );
        self.out.push_str("(dump-synth-res-with-typeinfo synth-res id-map)\n\n");
        let _ = writeln!(
            self.out,
            ";; Translate synthesized hydride-expression into LLVM-IR\n(compile-to-llvm synth-res id-map \"{}\" \"{}\")\n",
            call_name(params.library, params.expr_id),
            bitcode_stem(params.out_dir, params.library).display()
        );
        let _ = writeln!(
            self.out,
            "(save-synth-map \"{}\" \"{}\" synth-log)",
            hash_path(params.out_dir, params.library, params.expr_id).display(),
            hash_name(params.library, params.expr_id)
        );
    }
}

/// `(int-imm (bv <value> <bits>) <signed?>)` for an integer literal.
fn literal_imm(value: LiteralValue, ty: Datatype) -> CompileResult<String> {
    let unsupported = || CompileError::UnsupportedType {
        ty: ty.to_string(),
        context: "synthesis literal",
    };
    if ty.is_bool() {
        let bit = value.as_i128().ok_or_else(unsupported)? != 0;
        return Ok(format!("(int-imm (bv {} 1) #f)", bit as u8));
    }
    if !ty.is_integer() || ty.bits() > 64 {
        return Err(unsupported());
    }
    let v = value.as_i128().ok_or_else(unsupported)?;
    let signed = if ty.is_int() { "#t" } else { "#f" };
    Ok(format!("(int-imm (bv {} {}) {})", v, ty.bits(), signed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params<'a>(config: &'a SynthesisConfig, dir: &'a Path) -> SpecParams<'a> {
        SpecParams {
            library: "lib0",
            expr_id: 0,
            lanes: 4,
            out_dir: dir,
            config,
        }
    }

    #[test]
    fn test_vector_add_spec() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let b = ir.ptr_var("b", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let la = ir.load_lanes(a, i, 4);
        let lb = ir.load_lanes(b, i, 4);
        let sum = ir.add(la, lb);
        let table = RegisterSlotTable::build(&ir, sum);

        let config = SynthesisConfig::default();
        let dir = PathBuf::from("/tmp/out");
        let spec = emit_spec(&ir, &table, sum, &params(&config, &dir)).unwrap();

        assert!(spec.starts_with("#lang rosette\n"));
        assert!(spec.contains("(require hydride)"));
        assert!(!spec.contains("current-bitwidth"));
        assert!(spec.contains("(* 20000 1024 1024)"));
        assert!(spec.contains("(define-symbolic reg_0_bitvector (bitvector 128))"));
        assert!(spec.contains("(define reg_1 (halide:create-buffer reg_1_bitvector 'int32))"));
        assert!(spec.contains("(hash-set! id-map reg_1 1)"));
        assert!(spec.contains("(vec-add reg_0 reg_1)"));
        assert!(spec.contains("(synthesize-halide-expr halide-expr id-map 2 4 'z3 #t #f"));
        assert!(spec.contains("\"hydride_node_lib0_0\""));
        assert!(spec.contains("(save-synth-map \"/tmp/out/hydride_hash_lib0_0.rkt\" \"synth_hash_lib0_0\" synth-log)"));
    }

    #[test]
    fn test_scalars_and_literals_are_broadcast() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::UInt8);
        let i = ir.var("i", Datatype::Int32);
        let k = ir.param("k", Datatype::UInt8);
        let three = ir.literal_int(3, Datatype::UInt8);
        let la = ir.load_lanes(a, i, 16);
        let scaled = ir.mul(la, k);
        let sum = ir.add(scaled, three);
        let table = RegisterSlotTable::build(&ir, sum);

        let config = SynthesisConfig { bitwidth: Some(16), ..SynthesisConfig::default() };
        let dir = PathBuf::from("/tmp");
        let mut p = params(&config, &dir);
        p.lanes = 16;
        let spec = emit_spec(&ir, &table, sum, &p).unwrap();

        assert!(spec.contains("(current-bitwidth 16)"));
        assert!(spec.contains("(define-symbolic reg_1_bitvector (bitvector 8))"));
        assert!(spec.contains("(vec-add (vec-mul reg_0 (x16 reg_1)) (x16 (int-imm (bv 3 8) #f)))"));
    }

    #[test]
    fn test_min_folds_into_nested_calls() {
        let mut ir = IrArena::new();
        let x = ir.var("x", Datatype::Int16);
        let y = ir.var("y", Datatype::Int16);
        let z = ir.var("z", Datatype::Int16);
        let min = ir.min(vec![x, y, z]);
        let table = RegisterSlotTable::build(&ir, min);

        let config = SynthesisConfig::default();
        let dir = PathBuf::from("/tmp");
        let spec = emit_spec(&ir, &table, min, &params(&config, &dir)).unwrap();
        assert!(spec.contains("(vec-min (x4 reg_0) (vec-min (x4 reg_1) (x4 reg_2)))"));
    }

    #[test]
    fn test_generic_bin_op_mapping() {
        let mut ir = IrArena::new();
        let x = ir.var("x", Datatype::Int32);
        let y = ir.var("y", Datatype::Int32);
        let xor = ir.bin_op(x, y, "", "^", "", Datatype::Int32);
        let pow = ir.bin_op(x, y, "pow(", ",", ")", Datatype::Int32);
        assert!(is_renderable(&ir, xor));
        assert!(!is_renderable(&ir, pow));

        let table = RegisterSlotTable::build(&ir, xor);
        let config = SynthesisConfig::default();
        let dir = PathBuf::from("/tmp");
        let spec = emit_spec(&ir, &table, xor, &params(&config, &dir)).unwrap();
        assert!(spec.contains("(vec-bwxor (x4 reg_0) (x4 reg_1))"));
    }

    #[test]
    fn test_wide_integers_are_rejected() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int128);
        let i = ir.var("i", Datatype::Int32);
        let la = ir.load_lanes(a, i, 2);
        let sum = ir.add(la, la);
        let table = RegisterSlotTable::build(&ir, sum);

        let config = SynthesisConfig::default();
        let dir = PathBuf::from("/tmp");
        match emit_spec(&ir, &table, sum, &params(&config, &dir)) {
            Err(CompileError::UnsupportedType { ty, .. }) => assert_eq!(ty, "int128"),
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_casts_are_not_renderable() {
        let mut ir = IrArena::new();
        let x = ir.var("x", Datatype::Int8);
        let wide = ir.cast(x, Datatype::Int32);
        let y = ir.var("y", Datatype::Int32);
        let sum = ir.add(wide, y);
        assert!(!is_renderable(&ir, sum));
    }
}
