//! Cminor: one stack block per function, block/exit control flow.
//!
//! All memory-resident locals now live in a single stack frame addressed by
//! [`Expr::AddrStack`] offsets. Structured `break`/`continue` are gone:
//! `Exit(n)` leaves the `n+1` innermost enclosing [`Stmt::Block`]s, and
//! `Loop` repeats its body forever until an exit leaves it. `Switch` is
//! preserved (arms still fall through).

pub mod lower;
pub mod print;

use indexmap::IndexMap;

use crate::clight::TempId;
use crate::ctypes::Chunk;
use crate::ops::{Binop, Signature, Unop, Width};

pub use super::csharpminor::GlobVar;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntConst(i64),
    LongConst(i64),
    FloatConst(f64),
    AddrSymbol(String),
    AddrStack(i64),
    AddrString(usize),
    Temp(TempId),
    Unop(Unop, Box<Expr>),
    Binop(Binop, Box<Expr>, Box<Expr>),
    Load(Chunk, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Skip,
    Set(TempId, Expr),
    Store(Chunk, Expr, Expr),
    Call(Option<TempId>, Signature, Expr, Vec<Expr>),
    Seq(Box<Stmt>, Box<Stmt>),
    If(Expr, Box<Stmt>, Box<Stmt>),
    /// Infinite loop; left by `Exit` through an enclosing block.
    Loop(Box<Stmt>),
    Block(Box<Stmt>),
    /// Leave the `n+1` innermost enclosing blocks.
    Exit(u32),
    Switch(Expr, Vec<(Option<i64>, Stmt)>),
    Return(Option<Expr>),
    Label(String, Box<Stmt>),
    Goto(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub params: Vec<TempId>,
    pub stack_size: u64,
    pub temp_widths: IndexMap<TempId, Width>,
    pub next_temp: u32,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: Vec<GlobVar>,
    pub strings: Vec<String>,
}
