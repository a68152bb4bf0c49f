//! Error types for the elaboration and lowering passes.
//!
//! Elaboration errors (unknown names, bad casts, non-constant expressions)
//! abort the pass that found them; IR invariant violations are bugs and
//! panic instead.

use thiserror::Error;

/// Errors raised while elaborating Cabs into Clight.
#[derive(Debug, Clone, Error)]
pub enum ElabError {
    #[error("unknown type name '{name}'")]
    UnknownType { name: String },

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("unknown struct or union '{name}'")]
    UnknownComposite { name: String },

    #[error("'{composite}' has no field named '{field}'")]
    UnknownField { composite: String, field: String },

    #[error("expression is not a compile-time constant")]
    NotConstant,

    #[error("expression is not assignable")]
    NotAnLvalue,

    #[error("called object '{name}' is not a function")]
    NotAFunction { name: String },

    #[error("cannot dereference a value of type '{ty}'")]
    NotAPointer { ty: String },

    #[error("type '{ty}' has no known size")]
    UnknownSize { ty: String },

    #[error("invalid operands to '{op}'")]
    InvalidOperands { op: String },
}

/// Errors raised by the IR-to-IR lowerings below Clight.
#[derive(Debug, Clone, Error)]
pub enum LowerError {
    #[error("goto to undefined label '{label}' in function '{function}'")]
    UndefinedLabel { function: String, label: String },

    #[error("'{construct}' is not supported by code generation")]
    Unsupported { construct: String },

    #[error("floating-point {context} is not supported by code generation")]
    UnsupportedFloat { context: String },
}
