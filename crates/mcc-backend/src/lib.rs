//! ARM64 assembly emission from RTL.
//!
//! Two stages: a linear-scan register allocator ([`regalloc`]) mapping
//! virtual registers onto physical ones (spilling to frame slots on
//! overflow), and the text emitter ([`emit`]) that lays down prologue, body
//! and epilogue per function. Output flavor (Linux vs Darwin symbol and
//! relocation syntax) is an emission-time parameter.

pub mod emit;
pub mod regalloc;

use thiserror::Error;

pub use emit::{emit_program, Flavor};

/// Failures while turning RTL into assembly text.
#[derive(Debug, Clone, Error)]
pub enum EmitError {
    #[error("floating-point {context} is not supported by the ARM64 emitter")]
    UnsupportedFloat { context: String },

    #[error("call in '{function}' passes {count} arguments; at most 8 register arguments are supported")]
    TooManyArgs { function: String, count: usize },
}
