//! Human-readable IR dump, used by debug logging and `vsynth --emit ir`.

use super::node::{ExprId, ExprKind, LiteralValue, StmtId, StmtKind, TensorProperty, UnaryOp};
use super::IrArena;
use std::fmt::Write;

pub struct IrPrinter<'a> {
    ir: &'a IrArena,
    out: String,
    indent: usize,
}

impl<'a> IrPrinter<'a> {
    pub fn new(ir: &'a IrArena) -> Self {
        Self {
            ir,
            out: String::new(),
            indent: 0,
        }
    }

    /// Render a statement tree.
    pub fn print_stmt(ir: &IrArena, id: StmtId) -> String {
        let mut printer = IrPrinter::new(ir);
        printer.stmt(id);
        printer.out
    }

    /// Render a single expression.
    pub fn print_expr(ir: &IrArena, id: ExprId) -> String {
        let mut printer = IrPrinter::new(ir);
        printer.expr(id);
        printer.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn render(&self, id: ExprId) -> String {
        IrPrinter::print_expr(self.ir, id)
    }

    fn expr(&mut self, id: ExprId) {
        let ir = self.ir;
        let node = ir.expr(id);
        match &node.kind {
            ExprKind::Literal(value) => {
                let _ = match value {
                    LiteralValue::Bool(b) => write!(self.out, "{}", b),
                    LiteralValue::UInt(v) => write!(self.out, "{}u", v),
                    LiteralValue::Int(v) => write!(self.out, "{}", v),
                    LiteralValue::Float(_) => write!(self.out, "{:?}", value.as_f64()),
                };
            }
            ExprKind::Var { name, .. } => self.out.push_str(name),
            ExprKind::Unary { op, a } => {
                let prefix = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::Sqrt => "sqrt",
                };
                self.out.push_str(prefix);
                self.out.push('(');
                self.expr(*a);
                self.out.push(')');
            }
            ExprKind::Binary { op, a, b } => {
                self.out.push('(');
                self.expr(*a);
                let _ = write!(self.out, " {} ", op.symbol());
                self.expr(*b);
                self.out.push(')');
            }
            ExprKind::Min(operands) | ExprKind::Max(operands) => {
                let name = if matches!(node.kind, ExprKind::Min(_)) { "min" } else { "max" };
                self.out.push_str(name);
                self.list(operands);
            }
            ExprKind::BinOp {
                a,
                b,
                start,
                mid,
                end,
            } => {
                self.out.push_str(start);
                self.expr(*a);
                let _ = write!(self.out, " {} ", mid);
                self.expr(*b);
                self.out.push_str(end);
            }
            ExprKind::Cast { a } => {
                let _ = write!(self.out, "({})", node.ty);
                self.expr(*a);
            }
            ExprKind::Call {
                func, args, extern_llvm,
            } => {
                if *extern_llvm {
                    self.out.push_str("extern ");
                }
                self.out.push_str(func);
                self.list(args);
            }
            ExprKind::Load { arr, loc, lanes } => {
                self.expr(*arr);
                self.out.push('[');
                self.expr(*loc);
                self.out.push(']');
                if *lanes > 1 {
                    let _ = write!(self.out, "<{}>", lanes);
                }
            }
            ExprKind::GetProperty {
                tensor,
                property,
                mode,
                ..
            } => {
                let property = match property {
                    TensorProperty::Order => "order",
                    TensorProperty::Dimension => "dim",
                    TensorProperty::ComponentSize => "csize",
                    TensorProperty::ModeOrdering => "mode_ordering",
                    TensorProperty::ModeTypes => "mode_types",
                    TensorProperty::Indices => "indices",
                    TensorProperty::Values => "vals",
                    TensorProperty::FillValue => "fill_value",
                    TensorProperty::ValuesSize => "vals_size",
                };
                self.expr(*tensor);
                let _ = write!(self.out, ".{}[{}]", property, mode);
            }
            ExprKind::Sizeof(of) => {
                let _ = write!(self.out, "sizeof({})", of);
            }
        }
    }

    fn list(&mut self, ids: &[ExprId]) {
        self.out.push('(');
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(id);
        }
        self.out.push(')');
    }

    fn stmt(&mut self, id: StmtId) {
        let ir = self.ir;
        match ir.stmt(id) {
            StmtKind::Block(stmts) => {
                for &stmt in stmts {
                    self.stmt(stmt);
                }
            }
            StmtKind::Scope(body) => {
                self.line("{");
                self.nested(*body);
                self.line("}");
            }
            StmtKind::Store {
                arr, loc, data, lanes, ..
            } => {
                let width = if *lanes > 1 { format!("<{}>", lanes) } else { String::new() };
                let text = format!(
                    "{}[{}]{} = {};",
                    self.render(*arr),
                    self.render(*loc),
                    width,
                    self.render(*data)
                );
                self.line(&text);
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
                let var = self.render(*var);
                let text = format!(
                    "for {} in {}..{} step {} [{:?}{}] {{",
                    var,
                    self.render(*start),
                    self.render(*end),
                    self.render(*increment),
                    kind,
                    if *vec_width > 1 { format!(" x{}", vec_width) } else { String::new() }
                );
                self.line(&text);
                self.nested(*body);
                self.line("}");
            }
            StmtKind::While { cond, body, .. } => {
                let text = format!("while {} {{", self.render(*cond));
                self.line(&text);
                self.nested(*body);
                self.line("}");
            }
            StmtKind::IfThenElse { cond, then, otherwise } => {
                let text = format!("if {} {{", self.render(*cond));
                self.line(&text);
                self.nested(*then);
                if let Some(otherwise) = otherwise {
                    self.line("} else {");
                    self.nested(*otherwise);
                }
                self.line("}");
            }
            StmtKind::VarDecl { var, rhs } => {
                let text = format!(
                    "{} {} = {};",
                    self.ir.ty(*var),
                    self.render(*var),
                    self.render(*rhs)
                );
                self.line(&text);
            }
            StmtKind::Assign { lhs, rhs, .. } => {
                let text = format!("{} = {};", self.render(*lhs), self.render(*rhs));
                self.line(&text);
            }
            StmtKind::Allocate { var, num_elements, .. } => {
                let text = format!("{} = alloc({});", self.render(*var), self.render(*num_elements));
                self.line(&text);
            }
            StmtKind::Free { var } => {
                let text = format!("free({});", self.render(*var));
                self.line(&text);
            }
            StmtKind::Comment(text) => {
                let text = format!("// {}", text);
                self.line(&text);
            }
            StmtKind::BlankLine => self.line(""),
            StmtKind::Continue => self.line("continue;"),
            StmtKind::Break => self.line("break;"),
            StmtKind::Print { fmt, params } => {
                let params: Vec<String> = params.iter().map(|&p| self.render(p)).collect();
                let text = format!("print({:?}, {});", fmt, params.join(", "));
                self.line(&text);
            }
            StmtKind::Function {
                name,
                body,
                inputs,
                outputs,
                ..
            } => {
                let outputs: Vec<String> = outputs.iter().map(|&p| self.render(p)).collect();
                let inputs: Vec<String> = inputs.iter().map(|&p| self.render(p)).collect();
                let text = format!(
                    "function {}(out: {}; in: {}) {{",
                    name,
                    outputs.join(", "),
                    inputs.join(", ")
                );
                self.line(&text);
                self.nested(*body);
                self.line("}");
            }
        }
    }

    fn nested(&mut self, id: StmtId) {
        self.indent += 1;
        self.stmt(id);
        self.indent -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Datatype, LoopKind};

    #[test]
    fn test_print_vector_loop() {
        let mut ir = IrArena::new();
        let a = ir.ptr_var("a", Datatype::Int32);
        let out = ir.ptr_var("out", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let n = ir.param("n", Datatype::Int32);
        let zero = ir.literal_int(0, Datatype::Int32);
        let four = ir.literal_int(4, Datatype::Int32);
        let load = ir.load_lanes(a, i, 4);
        let store = ir.store_lanes(out, i, load, 4);
        let body = ir.for_loop(i, zero, n, four, store, LoopKind::Vectorized, 4);

        let text = IrPrinter::print_stmt(&ir, body);
        assert!(text.contains("for i in 0..n step 4 [Vectorized x4] {"));
        assert!(text.contains("  out[i]<4> = a[i]<4>;"));
    }
}
