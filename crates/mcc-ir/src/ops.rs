//! Operator vocabulary for the machine-level IRs.
//!
//! Csharpminor and Cminor use the generic [`Unop`]/[`Binop`] forms, with the
//! operand width made explicit because types no longer exist below Clight.
//! CminorSel and RTL use the target-flavored [`Op`]/[`Addressing`] forms
//! produced by instruction selection.

use std::fmt;

/// Operand width of an integer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W32,
    W64,
}

impl Width {
    /// Suffix used by the printers: 64-bit operations carry an `l`.
    pub fn suffix(self) -> &'static str {
        match self {
            Width::W32 => "",
            Width::W64 => "l",
        }
    }
}

/// Comparison relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    pub fn symbol(self) -> &'static str {
        match self {
            Cond::Eq => "==",
            Cond::Ne => "!=",
            Cond::Lt => "<",
            Cond::Le => "<=",
            Cond::Gt => ">",
            Cond::Ge => ">=",
        }
    }

    pub fn negate(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
        }
    }

    /// The relation with operands swapped (`a < b` becomes `b > a`).
    pub fn swap(self) -> Cond {
        match self {
            Cond::Eq => Cond::Eq,
            Cond::Ne => Cond::Ne,
            Cond::Lt => Cond::Gt,
            Cond::Le => Cond::Ge,
            Cond::Gt => Cond::Lt,
            Cond::Ge => Cond::Le,
        }
    }
}

/// Generic unary operations (Csharpminor / Cminor level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unop {
    Neg(Width),
    /// Logical negation: 1 if the operand is zero, else 0.
    BoolNot(Width),
    BitNot(Width),
    /// Truncate to 8 bits then sign-extend.
    Cast8s,
    /// Truncate to 8 bits then zero-extend.
    Cast8u,
    Cast16s,
    Cast16u,
    /// Sign-extend the low 32 bits to 64.
    Cast32s,
    /// Zero-extend the low 32 bits to 64.
    Cast32u,
}

impl fmt::Display for Unop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unop::Neg(w) => write!(f, "neg{}", w.suffix()),
            Unop::BoolNot(w) => write!(f, "notbool{}", w.suffix()),
            Unop::BitNot(w) => write!(f, "not{}", w.suffix()),
            Unop::Cast8s => f.write_str("cast8s"),
            Unop::Cast8u => f.write_str("cast8u"),
            Unop::Cast16s => f.write_str("cast16s"),
            Unop::Cast16u => f.write_str("cast16u"),
            Unop::Cast32s => f.write_str("cast32s"),
            Unop::Cast32u => f.write_str("cast32u"),
        }
    }
}

/// Generic binary operations. Signedness is explicit where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binop {
    Add(Width),
    Sub(Width),
    Mul(Width),
    Div(Width),
    Divu(Width),
    Rem(Width),
    Remu(Width),
    And(Width),
    Or(Width),
    Xor(Width),
    Shl(Width),
    /// Arithmetic right shift.
    Shr(Width),
    /// Logical right shift.
    Shru(Width),
    /// Signed comparison producing 0 or 1.
    Cmp(Cond, Width),
    /// Unsigned (or pointer) comparison producing 0 or 1.
    Cmpu(Cond, Width),
}

impl fmt::Display for Binop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binop::Add(w) => write!(f, "add{}", w.suffix()),
            Binop::Sub(w) => write!(f, "sub{}", w.suffix()),
            Binop::Mul(w) => write!(f, "mul{}", w.suffix()),
            Binop::Div(w) => write!(f, "div{}", w.suffix()),
            Binop::Divu(w) => write!(f, "divu{}", w.suffix()),
            Binop::Rem(w) => write!(f, "rem{}", w.suffix()),
            Binop::Remu(w) => write!(f, "remu{}", w.suffix()),
            Binop::And(w) => write!(f, "and{}", w.suffix()),
            Binop::Or(w) => write!(f, "or{}", w.suffix()),
            Binop::Xor(w) => write!(f, "xor{}", w.suffix()),
            Binop::Shl(w) => write!(f, "shl{}", w.suffix()),
            Binop::Shr(w) => write!(f, "shr{}", w.suffix()),
            Binop::Shru(w) => write!(f, "shru{}", w.suffix()),
            Binop::Cmp(c, w) => write!(f, "cmp{}({})", w.suffix(), c.symbol()),
            Binop::Cmpu(c, w) => write!(f, "cmpu{}({})", w.suffix(), c.symbol()),
        }
    }
}

/// A branch condition after selection: relation, width, signedness, and an
/// optional folded immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Comp(Cond, Width),
    CompImm(Cond, Width, i64),
    CompU(Cond, Width),
    CompUImm(Cond, Width, i64),
}

impl Condition {
    pub fn is_unsigned(self) -> bool {
        matches!(self, Condition::CompU(..) | Condition::CompUImm(..))
    }

    pub fn cond(self) -> Cond {
        match self {
            Condition::Comp(c, _)
            | Condition::CompImm(c, _, _)
            | Condition::CompU(c, _)
            | Condition::CompUImm(c, _, _) => c,
        }
    }

    pub fn width(self) -> Width {
        match self {
            Condition::Comp(_, w)
            | Condition::CompImm(_, w, _)
            | Condition::CompU(_, w)
            | Condition::CompUImm(_, w, _) => w,
        }
    }

    pub fn negate(self) -> Condition {
        match self {
            Condition::Comp(c, w) => Condition::Comp(c.negate(), w),
            Condition::CompImm(c, w, n) => Condition::CompImm(c.negate(), w, n),
            Condition::CompU(c, w) => Condition::CompU(c.negate(), w),
            Condition::CompUImm(c, w, n) => Condition::CompUImm(c.negate(), w, n),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Comp(c, w) => write!(f, "{}s{}", c.symbol(), w.suffix()),
            Condition::CompImm(c, w, n) => write!(f, "{}s{} {}", c.symbol(), w.suffix(), n),
            Condition::CompU(c, w) => write!(f, "{}u{}", c.symbol(), w.suffix()),
            Condition::CompUImm(c, w, n) => write!(f, "{}u{} {}", c.symbol(), w.suffix(), n),
        }
    }
}

/// Target-flavored operations produced by instruction selection.
///
/// Immediate forms are only generated when the constant fits the ARM64
/// operand encoding (12-bit unsigned for add/sub, the shift amount for
/// shifted-register forms).
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    IntConst(i64),
    LongConst(i64),
    FloatConst(f64),
    /// Address of a global symbol.
    AddrSymbol(String),
    /// Address within the current stack frame.
    AddrStack(i64),
    /// Address of an interned string literal.
    AddrString(usize),
    Move,
    Add(Width),
    AddImm(Width, i64),
    /// Fused `a + (b << k)`.
    AddLsl(Width, u8),
    Sub(Width),
    Mul(Width),
    Div(Width),
    Divu(Width),
    Rem(Width),
    Remu(Width),
    And(Width),
    Or(Width),
    Xor(Width),
    Shl(Width),
    ShlImm(Width, u8),
    Shr(Width),
    ShrImm(Width, u8),
    Shru(Width),
    ShruImm(Width, u8),
    Neg(Width),
    Not(Width),
    Cast8s,
    Cast8u,
    Cast16s,
    Cast16u,
    Cast32s,
    Cast32u,
    /// Materialize a comparison result as 0 or 1.
    Cmp(Condition),
}

/// Addressing modes for loads and stores after selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Addressing {
    /// `[base, #imm]`
    Indexed(i64),
    /// `[base, index]`
    Indexed2,
    /// `[base, index, lsl #k]`
    Indexed2Shift(u8),
    /// A global symbol.
    Global(String),
    /// A stack-frame slot.
    Stack(i64),
    /// An interned string literal.
    StringLit(usize),
}

/// Machine-level value classes used in call signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mtype {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for Mtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mtype::I32 => "int",
            Mtype::I64 => "long",
            Mtype::F32 => "float",
            Mtype::F64 => "double",
        };
        f.write_str(s)
    }
}

/// A calling-convention-level function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Mtype>,
    pub ret: Option<Mtype>,
    pub variadic: bool,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let mut first = true;
        for p in &self.params {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}", p)?;
        }
        if self.variadic {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        f.write_str(") -> ")?;
        match &self.ret {
            Some(t) => write!(f, "{}", t),
            None => f.write_str("void"),
        }
    }
}
