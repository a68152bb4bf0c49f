//! Csharpminor: Clight without structured types.
//!
//! Memory access is explicit: `Load(chunk, addr)` expressions and
//! `Store(chunk, addr, value)` statements. Field accesses have been replaced
//! by `base + constant offset`, array indexing by `base + index * sizeof`,
//! `sizeof` by constants. Loops keep the structured
//! `Loop { body, continue_body }` shape from Clight; the block/exit encoding
//! arrives with Cminor.

pub mod lower;
pub mod print;

use indexmap::IndexMap;

use crate::clight::TempId;
use crate::ctypes::Chunk;
use crate::ops::{Binop, Signature, Unop, Width};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntConst(i64),
    LongConst(i64),
    FloatConst(f64),
    Temp(TempId),
    /// Address of a stack-resident local.
    AddrLocal(String),
    /// Address of a global symbol.
    AddrGlobal(String),
    /// Address of an interned string literal.
    AddrString(usize),
    Load(Chunk, Box<Expr>),
    Unop(Unop, Box<Expr>),
    Binop(Binop, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Skip,
    Set(TempId, Expr),
    Store(Chunk, Expr, Expr),
    Call(Option<TempId>, Signature, Expr, Vec<Expr>),
    Seq(Box<Stmt>, Box<Stmt>),
    If(Expr, Box<Stmt>, Box<Stmt>),
    Loop(Box<Stmt>, Box<Stmt>),
    Break,
    Continue,
    Return(Option<Expr>),
    /// Arms fall through; `None` is `default`.
    Switch(Expr, Vec<(Option<i64>, Stmt)>),
    Label(String, Box<Stmt>),
    Goto(String),
}

/// Fold a statement list into nested sequences, dropping skips.
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

/// A stack-resident local with its storage requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlot {
    pub name: String,
    pub size: u64,
    pub align: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    /// Incoming parameter temporaries, in order.
    pub params: Vec<TempId>,
    pub locals: Vec<LocalSlot>,
    /// Register width of each temporary, kept because types are gone.
    pub temp_widths: IndexMap<TempId, Width>,
    pub next_temp: u32,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobVar {
    pub name: String,
    pub size: u64,
    pub align: u64,
    /// Scalar initializer, if the definition had one.
    pub init: Option<(Chunk, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: Vec<GlobVar>,
    /// Interned string literals, indexed by [`Expr::AddrString`].
    pub strings: Vec<String>,
}
