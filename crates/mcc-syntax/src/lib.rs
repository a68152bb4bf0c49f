//! C surface syntax: lexer, parser, surface AST and its printer.
//!
//! This crate owns everything up to (and including) the surface AST, called
//! Cabs. The lexer consumes preprocessed C (`.i` files, or `.c` files that
//! already contain `#line` directives) and the parser produces a [`cabs::Program`]
//! together with recorded diagnostics. Later compilation stages live in
//! `mcc-ir` and `mcc-backend`.

pub mod cabs;
pub mod diag;
pub mod lexer;
pub mod parser;
pub mod pos;
pub mod printer;
pub mod token;

pub use diag::{DiagKind, Diagnostic, Diagnostics, SyntaxError};
pub use lexer::Lexer;
pub use parser::{parse_translation_unit, Parser};
pub use pos::Pos;
pub use token::{lookup_ident, Token, TokenKind};
