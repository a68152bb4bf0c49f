//! Clight: C with pure expressions.
//!
//! Every expression node carries its C type and is free of side effects;
//! every observable effect (assignment, call, temporary update) is a
//! statement. Both `while` and `for` have already been desugared into the
//! canonical `Loop { body, continue_body }` shape: `continue` transfers to
//! `continue_body`, `break` leaves the loop.

pub mod print;

use indexmap::IndexMap;

use crate::ctypes::{CompositeEnv, CType};

/// A compiler-introduced temporary. Numbered per function, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub u32);

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Pure unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unop {
    Neg,
    /// Logical negation, producing 0 or 1.
    LogNot,
    BitNot,
}

/// Pure binary operators. Signedness is resolved later, from the operand
/// types, when lowering to Csharpminor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A typed, side-effect-free expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: CType,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: CType) -> Self {
        Expr { kind, ty }
    }

    pub fn const_int(v: i64, ty: CType) -> Self {
        Expr::new(ExprKind::ConstInt(v), ty)
    }

    pub fn temp(id: TempId, ty: CType) -> Self {
        Expr::new(ExprKind::Temp(id), ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    ConstInt(i64),
    ConstFloat(f64),
    ConstString(String),
    Var(String),
    Temp(TempId),
    Deref(Box<Expr>),
    Addrof(Box<Expr>),
    Unop(Unop, Box<Expr>),
    Binop(Binop, Box<Expr>, Box<Expr>),
    /// Conversion to the node's type; always explicit.
    Cast(Box<Expr>),
    Field(Box<Expr>, String),
    Sizeof(CType),
}

/// One arm of a `switch`. `value` is `None` for `default`; arm bodies fall
/// through to the next arm.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchArm {
    pub value: Option<i64>,
    pub body: Stmt,
}

/// Statements: all side effects live here.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Skip,
    /// Store through an lvalue.
    Assign(Expr, Expr),
    /// Update a temporary.
    Set(TempId, Expr),
    Call(Option<TempId>, Expr, Vec<Expr>),
    Seq(Box<Stmt>, Box<Stmt>),
    If(Expr, Box<Stmt>, Box<Stmt>),
    /// `Loop { body, continue_body }`; `continue` transfers to the second
    /// component, falling off the body repeats after running it.
    Loop(Box<Stmt>, Box<Stmt>),
    Break,
    Continue,
    Return(Option<Expr>),
    Switch(Expr, Vec<SwitchArm>),
    Label(String, Box<Stmt>),
    Goto(String),
}

/// Fold a statement list into nested sequences.
pub fn seq(stmts: Vec<Stmt>) -> Stmt {
    let mut result = Stmt::Skip;
    let mut have = false;
    for s in stmts.into_iter().rev() {
        if matches!(s, Stmt::Skip) {
            continue;
        }
        if have {
            result = Stmt::Seq(Box::new(s), Box::new(result));
        } else {
            result = s;
            have = true;
        }
    }
    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: CType,
    pub params: Vec<(String, CType)>,
    pub variadic: bool,
    /// Memory-resident locals (shrinks under SimplLocals).
    pub locals: Vec<(String, CType)>,
    /// Declared temporaries (grows under SimplExpr and SimplLocals).
    pub temps: Vec<(TempId, CType)>,
    /// Params promoted to temporaries by SimplLocals, by name.
    pub param_temps: IndexMap<String, TempId>,
    pub body: Stmt,
}

impl Function {
    /// First unused temporary number.
    pub fn next_temp(&self) -> u32 {
        self.temps.iter().map(|(t, _)| t.0 + 1).max().unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobVar {
    pub name: String,
    pub ty: CType,
    pub init: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub composites: CompositeEnv,
    pub globals: Vec<GlobVar>,
    pub functions: Vec<Function>,
    /// Declared-but-undefined functions, referenced as external symbols.
    pub externals: Vec<(String, CType)>,
}
