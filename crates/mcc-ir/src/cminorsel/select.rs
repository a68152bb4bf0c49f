//! Instruction selection for ARM64.
//!
//! Rewrites generic Cminor operators into the forms ARM64 can encode
//! directly: immediates folded into add/sub/compare operand positions
//! (12-bit unsigned range), shift-by-constant, the fused
//! `add x, y, (z lsl k)` form, multiplication by a power of two as a shift,
//! and load/store addressing modes `[base, #imm]`, `[base, index]` and
//! `[base, index, lsl #k]` (the shift must match the access size).

use indexmap::IndexMap;
use tracing::debug;

use crate::clight::TempId;
use crate::cminor;
use crate::ctypes::Chunk;
use crate::ops::{Addressing, Binop, Cond, Condition, Op, Unop, Width};

use super::{CondExpr, Expr, Function, Program, Stmt};

type TempWidths = IndexMap<TempId, Width>;

/// Largest immediate ARM64 add/sub/cmp operand encoding accepts.
const IMM_MAX: i64 = 4095;

pub fn select_program(p: &cminor::Program) -> Program {
    let functions = p.functions.iter().map(select_function).collect();
    Program {
        functions,
        globals: p.globals.clone(),
        strings: p.strings.clone(),
    }
}

pub fn select_function(f: &cminor::Function) -> Function {
    let body = sel_stmt(&f.body, &f.temp_widths);
    debug!(function = %f.name, "selected operators");
    Function {
        name: f.name.clone(),
        sig: f.sig.clone(),
        params: f.params.clone(),
        stack_size: f.stack_size,
        temp_widths: f.temp_widths.clone(),
        next_temp: f.next_temp,
        body,
    }
}

fn sel_stmt(s: &cminor::Stmt, widths: &TempWidths) -> Stmt {
    use cminor::Stmt as S;
    match s {
        S::Skip => Stmt::Skip,
        S::Set(id, e) => Stmt::Set(*id, sel_expr(e)),
        S::Store(chunk, addr, value) => {
            let (mode, args) = addressing(*chunk, addr);
            Stmt::Store(*chunk, mode, args, sel_expr(value))
        }
        S::Call(dest, sig, callee, args) => Stmt::Call(
            *dest,
            sig.clone(),
            sel_expr(callee),
            args.iter().map(sel_expr).collect(),
        ),
        S::Seq(a, b) => Stmt::Seq(
            Box::new(sel_stmt(a, widths)),
            Box::new(sel_stmt(b, widths)),
        ),
        S::If(c, a, b) => Stmt::If(
            sel_condition(c, widths),
            Box::new(sel_stmt(a, widths)),
            Box::new(sel_stmt(b, widths)),
        ),
        S::Loop(body) => Stmt::Loop(Box::new(sel_stmt(body, widths))),
        S::Block(body) => Stmt::Block(Box::new(sel_stmt(body, widths))),
        S::Exit(n) => Stmt::Exit(*n),
        S::Switch(e, arms) => Stmt::Switch(
            sel_expr(e),
            arms.iter()
                .map(|(v, s)| (*v, sel_stmt(s, widths)))
                .collect(),
        ),
        S::Return(e) => Stmt::Return(e.as_ref().map(sel_expr)),
        S::Label(name, inner) => {
            Stmt::Label(name.clone(), Box::new(sel_stmt(inner, widths)))
        }
        S::Goto(name) => Stmt::Goto(name.clone()),
    }
}

/// Select a branch condition. Comparison operators become bare conditions;
/// any other expression is compared against zero at its own width.
fn sel_condition(e: &cminor::Expr, widths: &TempWidths) -> CondExpr {
    use cminor::Expr as E;
    if let E::Binop(op, lhs, rhs) = e {
        let selected = match op {
            Binop::Cmp(c, w) => Some((*c, *w, false)),
            Binop::Cmpu(c, w) => Some((*c, *w, true)),
            _ => None,
        };
        if let Some((c, w, unsigned)) = selected {
            return sel_comparison(c, w, unsigned, lhs, rhs);
        }
    }
    let w = expr_width(e, widths);
    CondExpr {
        cond: Condition::CompImm(Cond::Ne, w, 0),
        args: vec![sel_expr(e)],
    }
}

fn sel_comparison(
    c: Cond,
    w: Width,
    unsigned: bool,
    lhs: &cminor::Expr,
    rhs: &cminor::Expr,
) -> CondExpr {
    if let Some(n) = const_value(rhs) {
        if (0..=IMM_MAX).contains(&n) {
            let cond = if unsigned {
                Condition::CompUImm(c, w, n)
            } else {
                Condition::CompImm(c, w, n)
            };
            return CondExpr {
                cond,
                args: vec![sel_expr(lhs)],
            };
        }
    }
    if let Some(n) = const_value(lhs) {
        if (0..=IMM_MAX).contains(&n) {
            let cond = if unsigned {
                Condition::CompUImm(c.swap(), w, n)
            } else {
                Condition::CompImm(c.swap(), w, n)
            };
            return CondExpr {
                cond,
                args: vec![sel_expr(rhs)],
            };
        }
    }
    let cond = if unsigned {
        Condition::CompU(c, w)
    } else {
        Condition::Comp(c, w)
    };
    CondExpr {
        cond,
        args: vec![sel_expr(lhs), sel_expr(rhs)],
    }
}

/// Width of a Cminor expression, judged syntactically. Only the bits at this
/// width are meaningful in our value representation, so a truth test must
/// not read wider.
fn expr_width(e: &cminor::Expr, widths: &TempWidths) -> Width {
    use cminor::Expr as E;
    match e {
        E::IntConst(_) => Width::W32,
        E::LongConst(_) | E::FloatConst(_) => Width::W64,
        E::AddrSymbol(_) | E::AddrStack(_) | E::AddrString(_) => Width::W64,
        E::Temp(id) => widths.get(id).copied().unwrap_or(Width::W64),
        E::Load(chunk, _) => match chunk {
            Chunk::Int64 | Chunk::F64 => Width::W64,
            _ => Width::W32,
        },
        E::Unop(op, _) => match op {
            Unop::Neg(w) | Unop::BitNot(w) => *w,
            Unop::BoolNot(_) => Width::W32,
            Unop::Cast8s | Unop::Cast8u | Unop::Cast16s | Unop::Cast16u => Width::W32,
            Unop::Cast32s | Unop::Cast32u => Width::W64,
        },
        E::Binop(op, _, _) => match op {
            Binop::Add(w)
            | Binop::Sub(w)
            | Binop::Mul(w)
            | Binop::Div(w)
            | Binop::Divu(w)
            | Binop::Rem(w)
            | Binop::Remu(w)
            | Binop::And(w)
            | Binop::Or(w)
            | Binop::Xor(w)
            | Binop::Shl(w)
            | Binop::Shr(w)
            | Binop::Shru(w) => *w,
            Binop::Cmp(..) | Binop::Cmpu(..) => Width::W32,
        },
    }
}

fn const_value(e: &cminor::Expr) -> Option<i64> {
    match e {
        cminor::Expr::IntConst(v) | cminor::Expr::LongConst(v) => Some(*v),
        _ => None,
    }
}

fn sel_expr(e: &cminor::Expr) -> Expr {
    use cminor::Expr as E;
    match e {
        E::Temp(id) => Expr::Temp(*id),
        E::IntConst(v) => Expr::Op(Op::IntConst(*v), vec![]),
        E::LongConst(v) => Expr::Op(Op::LongConst(*v), vec![]),
        E::FloatConst(v) => Expr::Op(Op::FloatConst(*v), vec![]),
        E::AddrSymbol(s) => Expr::Op(Op::AddrSymbol(s.clone()), vec![]),
        E::AddrStack(off) => Expr::Op(Op::AddrStack(*off), vec![]),
        E::AddrString(i) => Expr::Op(Op::AddrString(*i), vec![]),
        E::Load(chunk, addr) => {
            let (mode, args) = addressing(*chunk, addr);
            Expr::Load(*chunk, mode, args)
        }
        E::Unop(op, a) => sel_unop(*op, a),
        E::Binop(op, a, b) => sel_binop(*op, a, b),
    }
}

fn sel_unop(op: Unop, a: &cminor::Expr) -> Expr {
    let arg = sel_expr(a);
    let selected = match op {
        Unop::Neg(w) => Op::Neg(w),
        Unop::BitNot(w) => Op::Not(w),
        Unop::BoolNot(w) => Op::Cmp(Condition::CompImm(Cond::Eq, w, 0)),
        Unop::Cast8s => Op::Cast8s,
        Unop::Cast8u => Op::Cast8u,
        Unop::Cast16s => Op::Cast16s,
        Unop::Cast16u => Op::Cast16u,
        Unop::Cast32s => Op::Cast32s,
        Unop::Cast32u => Op::Cast32u,
    };
    Expr::Op(selected, vec![arg])
}

fn sel_binop(op: Binop, a: &cminor::Expr, b: &cminor::Expr) -> Expr {
    match op {
        Binop::Add(w) => {
            if let Some(n) = const_value(b) {
                if (-IMM_MAX..=IMM_MAX).contains(&n) {
                    return Expr::Op(Op::AddImm(w, n), vec![sel_expr(a)]);
                }
            }
            if let Some(n) = const_value(a) {
                if (-IMM_MAX..=IMM_MAX).contains(&n) {
                    return Expr::Op(Op::AddImm(w, n), vec![sel_expr(b)]);
                }
            }
            // Fused shifted-register add: a + (b << k), including the
            // multiply-by-power-of-two spelling of the shift.
            if let Some((base, index, k)) = shifted_operand(a, b) {
                return Expr::Op(Op::AddLsl(w, k), vec![sel_expr(base), sel_expr(index)]);
            }
            Expr::Op(Op::Add(w), vec![sel_expr(a), sel_expr(b)])
        }
        Binop::Sub(w) => {
            if let Some(n) = const_value(b) {
                if (-IMM_MAX..=IMM_MAX).contains(&n) {
                    return Expr::Op(Op::AddImm(w, -n), vec![sel_expr(a)]);
                }
            }
            Expr::Op(Op::Sub(w), vec![sel_expr(a), sel_expr(b)])
        }
        Binop::Mul(w) => {
            if let Some(k) = const_value(b).and_then(power_of_two) {
                return Expr::Op(Op::ShlImm(w, k), vec![sel_expr(a)]);
            }
            if let Some(k) = const_value(a).and_then(power_of_two) {
                return Expr::Op(Op::ShlImm(w, k), vec![sel_expr(b)]);
            }
            Expr::Op(Op::Mul(w), vec![sel_expr(a), sel_expr(b)])
        }
        Binop::Div(w) => Expr::Op(Op::Div(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::Divu(w) => Expr::Op(Op::Divu(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::Rem(w) => Expr::Op(Op::Rem(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::Remu(w) => Expr::Op(Op::Remu(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::And(w) => Expr::Op(Op::And(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::Or(w) => Expr::Op(Op::Or(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::Xor(w) => Expr::Op(Op::Xor(w), vec![sel_expr(a), sel_expr(b)]),
        Binop::Shl(w) => shift(Op::Shl(w), |k| Op::ShlImm(w, k), a, b),
        Binop::Shr(w) => shift(Op::Shr(w), |k| Op::ShrImm(w, k), a, b),
        Binop::Shru(w) => shift(Op::Shru(w), |k| Op::ShruImm(w, k), a, b),
        Binop::Cmp(c, w) => {
            // Materialized truth value.
            let ce = sel_comparison(c, w, false, a, b);
            Expr::Op(Op::Cmp(ce.cond), ce.args)
        }
        Binop::Cmpu(c, w) => {
            let ce = sel_comparison(c, w, true, a, b);
            Expr::Op(Op::Cmp(ce.cond), ce.args)
        }
    }
}

fn shift(
    reg_op: Op,
    imm_op: impl Fn(u8) -> Op,
    a: &cminor::Expr,
    b: &cminor::Expr,
) -> Expr {
    if let Some(n) = const_value(b) {
        if (0..64).contains(&n) {
            return Expr::Op(imm_op(n as u8), vec![sel_expr(a)]);
        }
    }
    Expr::Op(reg_op, vec![sel_expr(a), sel_expr(b)])
}

/// Match `a + (b << k)` in either operand order, accepting both the shift
/// and multiply-by-power-of-two spellings.
fn shifted_operand<'a>(
    a: &'a cminor::Expr,
    b: &'a cminor::Expr,
) -> Option<(&'a cminor::Expr, &'a cminor::Expr, u8)> {
    if let Some((index, k)) = as_shift(b) {
        return Some((a, index, k));
    }
    if let Some((index, k)) = as_shift(a) {
        return Some((b, index, k));
    }
    None
}

fn as_shift(e: &cminor::Expr) -> Option<(&cminor::Expr, u8)> {
    use cminor::Expr as E;
    match e {
        E::Binop(Binop::Shl(_), inner, amount) => {
            let k = const_value(amount)?;
            if (1..64).contains(&k) {
                Some((inner.as_ref(), k as u8))
            } else {
                None
            }
        }
        E::Binop(Binop::Mul(_), inner, factor) => {
            let k = const_value(factor).and_then(power_of_two)?;
            if k > 0 {
                Some((inner.as_ref(), k))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn power_of_two(n: i64) -> Option<u8> {
    if n > 0 && (n & (n - 1)) == 0 {
        Some(n.trailing_zeros() as u8)
    } else {
        None
    }
}

/// Select an addressing mode for a memory access of the given chunk.
fn addressing(chunk: Chunk, addr: &cminor::Expr) -> (Addressing, Vec<Expr>) {
    use cminor::Expr as E;
    let size = chunk.size() as i64;
    match addr {
        E::AddrStack(off) => (Addressing::Stack(*off), vec![]),
        E::AddrSymbol(s) => (Addressing::Global(s.clone()), vec![]),
        E::AddrString(i) => (Addressing::StringLit(*i), vec![]),
        E::Binop(Binop::Add(Width::W64), base, rhs) => {
            if let Some(n) = const_value(rhs) {
                if n >= 0 && n % size == 0 && n <= IMM_MAX * size {
                    return (Addressing::Indexed(n), vec![sel_expr(base)]);
                }
            }
            if let Some((index, k)) = as_shift(rhs) {
                if i64::from(1u8) << k == size {
                    return (
                        Addressing::Indexed2Shift(k),
                        vec![sel_expr(base), sel_expr(index)],
                    );
                }
            }
            (Addressing::Indexed2, vec![sel_expr(base), sel_expr(rhs)])
        }
        other => (Addressing::Indexed(0), vec![sel_expr(other)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clight::TempId;

    fn temp(n: u32) -> cminor::Expr {
        cminor::Expr::Temp(TempId(n))
    }

    #[test]
    fn add_immediate_folds() {
        let e = cminor::Expr::Binop(
            Binop::Add(Width::W32),
            Box::new(temp(1)),
            Box::new(cminor::Expr::IntConst(5)),
        );
        assert_eq!(
            sel_expr(&e),
            Expr::Op(Op::AddImm(Width::W32, 5), vec![Expr::Temp(TempId(1))])
        );
    }

    #[test]
    fn large_immediate_stays_in_register() {
        let e = cminor::Expr::Binop(
            Binop::Add(Width::W32),
            Box::new(temp(1)),
            Box::new(cminor::Expr::IntConst(100000)),
        );
        match sel_expr(&e) {
            Expr::Op(Op::Add(_), args) => assert_eq!(args.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn add_of_shift_fuses() {
        // t1 + (t2 << 3) -> addlsl
        let e = cminor::Expr::Binop(
            Binop::Add(Width::W64),
            Box::new(temp(1)),
            Box::new(cminor::Expr::Binop(
                Binop::Shl(Width::W64),
                Box::new(temp(2)),
                Box::new(cminor::Expr::IntConst(3)),
            )),
        );
        match sel_expr(&e) {
            Expr::Op(Op::AddLsl(Width::W64, 3), args) => assert_eq!(args.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn multiply_by_power_of_two_becomes_shift() {
        let e = cminor::Expr::Binop(
            Binop::Mul(Width::W64),
            Box::new(temp(1)),
            Box::new(cminor::Expr::LongConst(8)),
        );
        assert_eq!(
            sel_expr(&e),
            Expr::Op(Op::ShlImm(Width::W64, 3), vec![Expr::Temp(TempId(1))])
        );
    }

    #[test]
    fn scaled_index_addressing() {
        // load(int32, t1 + t2 * 4) -> [t1, t2, lsl #2]
        let addr = cminor::Expr::Binop(
            Binop::Add(Width::W64),
            Box::new(temp(1)),
            Box::new(cminor::Expr::Binop(
                Binop::Mul(Width::W64),
                Box::new(temp(2)),
                Box::new(cminor::Expr::LongConst(4)),
            )),
        );
        let (mode, args) = addressing(Chunk::Int32, &addr);
        assert_eq!(mode, Addressing::Indexed2Shift(2));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn mismatched_scale_falls_back_to_register_index() {
        // 8-byte scaling on a 4-byte load cannot use the lsl form.
        let addr = cminor::Expr::Binop(
            Binop::Add(Width::W64),
            Box::new(temp(1)),
            Box::new(cminor::Expr::Binop(
                Binop::Mul(Width::W64),
                Box::new(temp(2)),
                Box::new(cminor::Expr::LongConst(8)),
            )),
        );
        let (mode, _) = addressing(Chunk::Int32, &addr);
        assert_eq!(mode, Addressing::Indexed2);
    }

    #[test]
    fn field_offset_addressing() {
        let addr = cminor::Expr::Binop(
            Binop::Add(Width::W64),
            Box::new(temp(1)),
            Box::new(cminor::Expr::LongConst(4)),
        );
        let (mode, args) = addressing(Chunk::Int32, &addr);
        assert_eq!(mode, Addressing::Indexed(4));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn comparison_with_immediate() {
        let e = cminor::Expr::Binop(
            Binop::Cmp(Cond::Lt, Width::W32),
            Box::new(temp(1)),
            Box::new(cminor::Expr::IntConst(10)),
        );
        match sel_expr(&e) {
            Expr::Op(Op::Cmp(Condition::CompImm(Cond::Lt, Width::W32, 10)), args) => {
                assert_eq!(args.len(), 1)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn condition_against_constant_left_swaps() {
        // 10 < t1 becomes t1 > 10.
        let e = cminor::Expr::Binop(
            Binop::Cmp(Cond::Lt, Width::W32),
            Box::new(cminor::Expr::IntConst(10)),
            Box::new(temp(1)),
        );
        let ce = sel_condition(&e, &TempWidths::new());
        assert_eq!(ce.cond, Condition::CompImm(Cond::Gt, Width::W32, 10));
    }

    #[test]
    fn boolnot_selects_compare_with_zero() {
        let e = cminor::Expr::Unop(Unop::BoolNot(Width::W32), Box::new(temp(1)));
        match sel_expr(&e) {
            Expr::Op(Op::Cmp(Condition::CompImm(Cond::Eq, Width::W32, 0)), _) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
