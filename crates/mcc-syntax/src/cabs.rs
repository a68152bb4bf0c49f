//! Cabs: the surface-level C abstract syntax tree.
//!
//! Cabs preserves the program as the user wrote it, modulo the parser's
//! canonicalization of type-specifier multisets into a single `type_spec`
//! string (`"unsigned long long"`, `"struct point*"`, `"int (*)(int, int)"`).
//! All structural lowering happens in later passes; this tree is what the
//! `-dparse` printer renders.

/// A parsed translation unit: an ordered sequence of top-level definitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub defs: Vec<Definition>,
}

/// Storage-class specifier on a top-level definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Static,
    Extern,
}

/// A top-level definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    FunDef {
        return_spec: String,
        name: String,
        params: Vec<Param>,
        variadic: bool,
        /// `None` for a prototype declaration.
        body: Option<Vec<Stmt>>,
    },
    VarDef {
        storage: Option<StorageClass>,
        type_spec: String,
        name: String,
        array_dims: Vec<Option<Expr>>,
        init: Option<Expr>,
    },
    StructDef(CompositeDef),
    UnionDef(CompositeDef),
    EnumDef {
        name: String,
        items: Vec<EnumItem>,
    },
    TypedefDef {
        type_spec: String,
        name: String,
        /// Present for `typedef struct { ... } name;` forms, where the
        /// aggregate is defined inline with the typedef.
        inline_composite: Option<InlineComposite>,
    },
}

/// A named function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub type_spec: String,
    pub name: String,
}

/// A struct or union body: named fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDef {
    pub name: String,
    pub fields: Vec<Field>,
}

/// One field of a struct or union.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub type_spec: String,
    pub name: String,
    pub array_dims: Vec<Option<Expr>>,
}

/// An enumerator, with its explicit value expression if one was written.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumItem {
    pub name: String,
    pub value: Option<Expr>,
}

/// An aggregate defined inline within a typedef.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineComposite {
    pub is_union: bool,
    pub def: CompositeDef,
}

/// A local declaration (inside a block or a `for` initializer).
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub type_spec: String,
    pub name: String,
    pub array_dims: Vec<Option<Expr>>,
    pub init: Option<Expr>,
}

/// The `for` statement initializer clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    None,
    Expr(Expr),
    Decls(Vec<Decl>),
}

/// One `case`/`default` arm of a `switch`. `value` is `None` for `default`.
/// Bodies fall through to the next arm unless they end in `break`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Decl(Vec<Decl>),
    /// An expression evaluated for its side effects.
    Computation(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: ForInit,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        expr: Expr,
        cases: Vec<SwitchCase>,
    },
    Break,
    Continue,
    Goto(String),
    Label(String, Box<Stmt>),
}

/// Unary operators, prefix and postfix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    LogNot,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Addr,
    Deref,
}

/// Binary operators, including assignment and comma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
    Comma,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
}

impl BinaryOp {
    /// For a compound assignment, the underlying arithmetic operator.
    pub fn compound_base(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubAssign => Some(BinaryOp::Sub),
            BinaryOp::MulAssign => Some(BinaryOp::Mul),
            BinaryOp::DivAssign => Some(BinaryOp::Div),
            BinaryOp::RemAssign => Some(BinaryOp::Rem),
            BinaryOp::ShlAssign => Some(BinaryOp::Shl),
            BinaryOp::ShrAssign => Some(BinaryOp::Shr),
            BinaryOp::AndAssign => Some(BinaryOp::BitAnd),
            BinaryOp::XorAssign => Some(BinaryOp::BitXor),
            BinaryOp::OrAssign => Some(BinaryOp::BitOr),
            _ => None,
        }
    }

    pub fn is_assignment(self) -> bool {
        self == BinaryOp::Assign || self.compound_base().is_some()
    }
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(i64),
    StringLiteral(String),
    CharLiteral(String),
    Variable(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Explicit parentheses, preserved so printing round-trips.
    Paren(Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Cast {
        type_spec: String,
        expr: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: String,
        arrow: bool,
    },
    SizeofType(String),
    SizeofExpr(Box<Expr>),
}
