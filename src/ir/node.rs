// This module defines the node kinds of the loop IR handed to the backend by the
// index-notation frontend. The IR is a closed sum type: ExprKind covers value-producing
// nodes (literals, variables, unary/binary arithmetic, comparisons, logical operators,
// n-ary min/max, the generic ufunc-style binary op, casts, calls, loads, tensor property
// reads, sizeof) and StmtKind covers control nodes (blocks, scopes, stores, counted and
// conditional loops, conditionals, declarations, assignments, allocation, comments and
// the top-level function). Children are referenced by ExprId/StmtId handles into an
// IrArena rather than by pointer, so passes match exhaustively over kinds and key their
// side tables by plain integers. Every node is immutable once interned.

//! IR node kinds.

use super::types::Datatype;

/// Handle of an expression node in an [`IrArena`](super::IrArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

/// Handle of a statement node in an [`IrArena`](super::IrArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub(crate) u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Literal payload. Floats are stored by bit pattern so nodes stay hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(u64),
}

impl LiteralValue {
    pub fn float(value: f64) -> Self {
        LiteralValue::Float(value.to_bits())
    }

    pub fn as_f64(self) -> f64 {
        match self {
            LiteralValue::Bool(b) => b as u8 as f64,
            LiteralValue::UInt(v) => v as f64,
            LiteralValue::Int(v) => v as f64,
            LiteralValue::Float(bits) => f64::from_bits(bits),
        }
    }

    /// Integer view of the literal, if it is integral.
    pub fn as_i128(self) -> Option<i128> {
        match self {
            LiteralValue::Bool(b) => Some(b as i128),
            LiteralValue::UInt(v) => Some(v as i128),
            LiteralValue::Int(v) => Some(v as i128),
            LiteralValue::Float(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    And,
    Or,
}

impl BinaryOp {
    /// C operator spelling.
    pub const fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            BitAnd => "&",
            BitOr => "|",
            Eq => "==",
            Neq => "!=",
            Gt => ">",
            Lt => "<",
            Gte => ">=",
            Lte => "<=",
            And => "&&",
            Or => "||",
        }
    }

    pub const fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Neq | Gt | Lt | Gte | Lte)
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorProperty {
    Order,
    Dimension,
    ComponentSize,
    ModeOrdering,
    ModeTypes,
    Indices,
    Values,
    FillValue,
    ValuesSize,
}

/// Expression node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal(LiteralValue),
    Var {
        name: String,
        is_ptr: bool,
        is_tensor: bool,
        is_parameter: bool,
    },
    Unary {
        op: UnaryOp,
        a: ExprId,
    },
    Binary {
        op: BinaryOp,
        a: ExprId,
        b: ExprId,
    },
    Min(Vec<ExprId>),
    Max(Vec<ExprId>),
    /// Generic binary operator spelled as `start a mid b end` in C.
    BinOp {
        a: ExprId,
        b: ExprId,
        start: String,
        mid: String,
        end: String,
    },
    Cast {
        a: ExprId,
    },
    Call {
        func: String,
        args: Vec<ExprId>,
        /// Resolved against oracle-produced code at link time.
        extern_llvm: bool,
    },
    /// `arr[loc]`, reading `lanes` contiguous elements.
    Load {
        arr: ExprId,
        loc: ExprId,
        lanes: u32,
    },
    GetProperty {
        tensor: ExprId,
        property: TensorProperty,
        mode: u32,
        index: u32,
        name: String,
    },
    Sizeof(Datatype),
}

impl ExprKind {
    /// Short name of the node kind, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "Literal",
            ExprKind::Var { .. } => "Var",
            ExprKind::Unary { op: UnaryOp::Neg, .. } => "Neg",
            ExprKind::Unary { op: UnaryOp::Not, .. } => "Not",
            ExprKind::Unary { op: UnaryOp::Sqrt, .. } => "Sqrt",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Min(_) => "Min",
            ExprKind::Max(_) => "Max",
            ExprKind::BinOp { .. } => "BinOp",
            ExprKind::Cast { .. } => "Cast",
            ExprKind::Call { .. } => "Call",
            ExprKind::Load { .. } => "Load",
            ExprKind::GetProperty { .. } => "GetProperty",
            ExprKind::Sizeof(_) => "Sizeof",
        }
    }
}

/// Expression node: kind plus resolved element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: Datatype,
}

/// Scheduling of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Serial,
    Static,
    Dynamic,
    Runtime,
    Vectorized,
    StaticChunked,
}

impl LoopKind {
    /// Thread-parallel kinds.
    pub const fn is_parallel(self) -> bool {
        matches!(
            self,
            LoopKind::Static | LoopKind::Dynamic | LoopKind::Runtime | LoopKind::StaticChunked
        )
    }
}

/// Statement node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StmtKind {
    Block(Vec<StmtId>),
    Scope(StmtId),
    /// `arr[loc] = data`, writing `lanes` contiguous elements.
    Store {
        arr: ExprId,
        loc: ExprId,
        data: ExprId,
        lanes: u32,
        use_atomics: bool,
    },
    For {
        var: ExprId,
        start: ExprId,
        end: ExprId,
        increment: ExprId,
        body: StmtId,
        kind: LoopKind,
        vec_width: u32,
        unroll: u32,
    },
    While {
        cond: ExprId,
        body: StmtId,
        kind: LoopKind,
        vec_width: u32,
    },
    IfThenElse {
        cond: ExprId,
        then: StmtId,
        otherwise: Option<StmtId>,
    },
    VarDecl {
        var: ExprId,
        rhs: ExprId,
    },
    Assign {
        lhs: ExprId,
        rhs: ExprId,
        use_atomics: bool,
    },
    Allocate {
        var: ExprId,
        num_elements: ExprId,
        is_realloc: bool,
        clear: bool,
    },
    Free {
        var: ExprId,
    },
    Comment(String),
    BlankLine,
    Continue,
    Break,
    Print {
        fmt: String,
        params: Vec<ExprId>,
    },
    Function {
        name: String,
        body: StmtId,
        inputs: Vec<ExprId>,
        outputs: Vec<ExprId>,
        /// Reserves the four bookkeeping slots of the packed convention.
        has_return_slot: bool,
    },
}

impl StmtKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, StmtKind::For { .. } | StmtKind::While { .. })
    }
}
