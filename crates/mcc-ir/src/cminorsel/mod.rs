//! CminorSel: Cminor with target-flavored expressions.
//!
//! Statements are the same shapes as Cminor; expressions have been rewritten
//! into ARM64 operator and addressing-mode forms by instruction selection
//! ([`select`]). Conditions in `if` are a dedicated [`CondExpr`] so that RTL
//! generation can emit a bare conditional branch.

pub mod select;

use indexmap::IndexMap;

use crate::clight::TempId;
use crate::ctypes::Chunk;
use crate::ops::{Addressing, Condition, Op, Signature, Width};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Temp(TempId),
    Op(Op, Vec<Expr>),
    Load(Chunk, Addressing, Vec<Expr>),
}

/// A selected branch condition with its operand expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct CondExpr {
    pub cond: Condition,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Skip,
    Set(TempId, Expr),
    Store(Chunk, Addressing, Vec<Expr>, Expr),
    Call(Option<TempId>, Signature, Expr, Vec<Expr>),
    Seq(Box<Stmt>, Box<Stmt>),
    If(CondExpr, Box<Stmt>, Box<Stmt>),
    Loop(Box<Stmt>),
    Block(Box<Stmt>),
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
    pub globals: Vec<crate::csharpminor::GlobVar>,
    pub strings: Vec<String>,
}
