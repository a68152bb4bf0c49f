//! RTL printer: the `-drtl` dump (`<stem>.rtl.0`).
//!
//! Nodes print in descending id order, which matches generation order
//! (entries get the highest ids). A fall-through successor whose id is one
//! less than the current node is implicit; any other successor prints as an
//! explicit `goto`.

use std::fmt::Write;

use crate::ops::{Addressing, Condition, Op, Width};

use super::{CallTarget, Function, Instr, NodeId, Program};

pub fn print_program(p: &Program) -> String {
    let mut out = String::new();
    for (i, s) in p.strings.iter().enumerate() {
        let _ = writeln!(out, "string Lstr{} = \"{}\";", i, s);
    }
    if !p.strings.is_empty() {
        out.push('\n');
    }
    for g in &p.globals {
        match g.init {
            Some((chunk, v)) => {
                let _ = writeln!(out, "global {} : {} = {}({});", g.name, g.size, chunk, v);
            }
            None => {
                let _ = writeln!(out, "global {} : {};", g.name, g.size);
            }
        }
    }
    if !p.globals.is_empty() {
        out.push('\n');
    }
    for f in &p.functions {
        print_function(&mut out, f);
        out.push('\n');
    }
    out
}

pub fn print_function(out: &mut String, f: &Function) {
    let params: Vec<String> = f.params.iter().map(|r| r.to_string()).collect();
    let _ = writeln!(out, "{}({}) : {} {{", f.name, params.join(", "), f.sig);
    if f.stack_size > 0 {
        let _ = writeln!(out, "  stack {};", f.stack_size);
    }

    let mut ids: Vec<NodeId> = f.nodes.keys().copied().collect();
    ids.sort_by(|a, b| b.cmp(a));
    let width = ids.first().map(|n| n.to_string().len()).unwrap_or(1);
    for id in ids {
        let instr = &f.nodes[&id];
        let _ = write!(out, "  {:>width$}: ", id.0, width = width);
        let _ = write!(out, "{}", instr_str(instr));
        if let Some(succ) = fallthrough(instr) {
            if succ.0 != id.0.wrapping_sub(1) {
                let _ = write!(out, " goto {}", succ);
            }
        }
        out.push('\n');
    }
    out.push_str("}\n");
}

fn fallthrough(i: &Instr) -> Option<NodeId> {
    match i {
        Instr::Nop(s) => Some(*s),
        Instr::Op { succ, .. }
        | Instr::Load { succ, .. }
        | Instr::Store { succ, .. }
        | Instr::Call { succ, .. } => Some(*succ),
        _ => None,
    }
}

fn instr_str(i: &Instr) -> String {
    match i {
        Instr::Nop(_) => "nop".to_string(),
        Instr::Op { op, args, dest, .. } => {
            format!("{} = {}", dest, op_str(op, args))
        }
        Instr::Load {
            chunk, addr, args, dest, ..
        } => {
            format!("{} = {}[{}]", dest, chunk, addr_str(addr, args))
        }
        Instr::Store {
            chunk, addr, args, src, ..
        } => {
            format!("{}[{}] = {}", chunk, addr_str(addr, args), src)
        }
        Instr::Call {
            sig, target, args, dest, ..
        } => {
            let args_text: Vec<String> = args.iter().map(|r| r.to_string()).collect();
            let callee = match target {
                CallTarget::Symbol(s) => format!("\"{}\"", s),
                CallTarget::Reg(r) => r.to_string(),
            };
            match dest {
                Some(d) => format!("{} = {}({}) : {}", d, callee, args_text.join(", "), sig),
                None => format!("{}({}) : {}", callee, args_text.join(", "), sig),
            }
        }
        Instr::Tailcall { sig, target, args } => {
            let args_text: Vec<String> = args.iter().map(|r| r.to_string()).collect();
            let callee = match target {
                CallTarget::Symbol(s) => format!("\"{}\"", s),
                CallTarget::Reg(r) => r.to_string(),
            };
            format!("tailcall {}({}) : {}", callee, args_text.join(", "), sig)
        }
        Instr::Cond {
            cond, args, iftrue, iffalse,
        } => {
            format!(
                "if ({}) goto {} else goto {}",
                cond_str(cond, args),
                iftrue,
                iffalse
            )
        }
        Instr::Jumptable { arg, targets } => {
            let t: Vec<String> = targets.iter().map(|n| n.to_string()).collect();
            format!("jumptable ({}) [{}]", arg, t.join(" "))
        }
        Instr::Return(None) => "return".to_string(),
        Instr::Return(Some(r)) => format!("return {}", r),
    }
}

fn op_str(op: &Op, args: &[super::Reg]) -> String {
    let a = |i: usize| args[i].to_string();
    match op {
        Op::IntConst(v) => v.to_string(),
        Op::LongConst(v) => format!("{}L", v),
        Op::FloatConst(v) => format!("{:?}", v),
        Op::AddrSymbol(s) => format!("\"{}\"", s),
        Op::AddrStack(off) => format!("stack({})", off),
        Op::AddrString(i) => format!("\"Lstr{}\"", i),
        Op::Move => a(0),
        Op::Add(w) => format!("{} +{} {}", a(0), w.suffix(), a(1)),
        Op::AddImm(w, n) => format!("{} +{} {}", a(0), w.suffix(), n),
        Op::AddLsl(w, k) => format!("{} +{} ({} << {})", a(0), w.suffix(), a(1), k),
        Op::Sub(w) => format!("{} -{} {}", a(0), w.suffix(), a(1)),
        Op::Mul(w) => format!("{} *{} {}", a(0), w.suffix(), a(1)),
        Op::Div(w) => format!("{} /{}s {}", a(0), w.suffix(), a(1)),
        Op::Divu(w) => format!("{} /{}u {}", a(0), w.suffix(), a(1)),
        Op::Rem(w) => format!("{} %{}s {}", a(0), w.suffix(), a(1)),
        Op::Remu(w) => format!("{} %{}u {}", a(0), w.suffix(), a(1)),
        Op::And(w) => format!("{} &{} {}", a(0), w.suffix(), a(1)),
        Op::Or(w) => format!("{} |{} {}", a(0), w.suffix(), a(1)),
        Op::Xor(w) => format!("{} ^{} {}", a(0), w.suffix(), a(1)),
        Op::Shl(w) => format!("{} <<{} {}", a(0), w.suffix(), a(1)),
        Op::ShlImm(w, k) => format!("{} <<{} {}", a(0), w.suffix(), k),
        Op::Shr(w) => format!("{} >>{}s {}", a(0), w.suffix(), a(1)),
        Op::ShrImm(w, k) => format!("{} >>{}s {}", a(0), w.suffix(), k),
        Op::Shru(w) => format!("{} >>{}u {}", a(0), w.suffix(), a(1)),
        Op::ShruImm(w, k) => format!("{} >>{}u {}", a(0), w.suffix(), k),
        Op::Neg(w) => format!("-{} {}", w.suffix(), a(0)),
        Op::Not(w) => format!("~{} {}", w.suffix(), a(0)),
        Op::Cast8s => format!("cast8s({})", a(0)),
        Op::Cast8u => format!("cast8u({})", a(0)),
        Op::Cast16s => format!("cast16s({})", a(0)),
        Op::Cast16u => format!("cast16u({})", a(0)),
        Op::Cast32s => format!("cast32s({})", a(0)),
        Op::Cast32u => format!("cast32u({})", a(0)),
        Op::Cmp(cond) => cond_str(cond, args),
    }
}

fn addr_str(addr: &Addressing, args: &[super::Reg]) -> String {
    match addr {
        Addressing::Indexed(0) => args[0].to_string(),
        Addressing::Indexed(n) => format!("{} + {}", args[0], n),
        Addressing::Indexed2 => format!("{} + {}", args[0], args[1]),
        Addressing::Indexed2Shift(k) => format!("{} + ({} << {})", args[0], args[1], k),
        Addressing::Global(s) => format!("\"{}\"", s),
        Addressing::Stack(off) => format!("stack({})", off),
        Addressing::StringLit(i) => format!("\"Lstr{}\"", i),
    }
}

fn cond_str(cond: &Condition, args: &[super::Reg]) -> String {
    let sign = if cond.is_unsigned() { "u" } else { "s" };
    let wsuf = match cond.width() {
        Width::W32 => "",
        Width::W64 => "l",
    };
    match cond {
        Condition::Comp(c, _) | Condition::CompU(c, _) => {
            format!("{} {}{}{} {}", args[0], c.symbol(), sign, wsuf, args[1])
        }
        Condition::CompImm(c, _, n) | Condition::CompUImm(c, _, n) => {
            format!("{} {}{}{} {}", args[0], c.symbol(), sign, wsuf, n)
        }
    }
}
