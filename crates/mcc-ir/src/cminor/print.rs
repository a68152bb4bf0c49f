//! Cminor printer: the `-dcminor` dump.

use std::fmt::Write;

use crate::ops::{Binop, Cond, Width};

use super::{Expr, Function, Program, Stmt};

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
    let params: Vec<String> = f.params.iter().map(|t| t.to_string()).collect();
    let _ = writeln!(out, "{}({}) : {} {{", f.name, params.join(", "), f.sig);
    let _ = writeln!(out, "  stack {};", f.stack_size);
    print_stmt(out, &f.body, 1);
    out.push_str("}\n");
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn print_stmt(out: &mut String, s: &Stmt, level: usize) {
    match s {
        Stmt::Skip => {
            indent(out, level);
            out.push_str("skip;\n");
        }
        Stmt::Set(id, e) => {
            indent(out, level);
            let _ = writeln!(out, "{} = {};", id, expr_str(e));
        }
        Stmt::Store(chunk, addr, value) => {
            indent(out, level);
            let _ = writeln!(
                out,
                "store({}, {}, {});",
                chunk,
                expr_str(addr),
                expr_str(value)
            );
        }
        Stmt::Call(dest, sig, callee, args) => {
            indent(out, level);
            let args_text: Vec<String> = args.iter().map(expr_str).collect();
            match dest {
                Some(id) => {
                    let _ = writeln!(
                        out,
                        "{} = call {}({}) : {};",
                        id,
                        expr_str(callee),
                        args_text.join(", "),
                        sig
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "call {}({}) : {};",
                        expr_str(callee),
                        args_text.join(", "),
                        sig
                    );
                }
            }
        }
        Stmt::Seq(a, b) => {
            print_stmt(out, a, level);
            print_stmt(out, b, level);
        }
        Stmt::If(c, a, b) => {
            indent(out, level);
            let _ = writeln!(out, "if ({}) {{", expr_str(c));
            print_stmt(out, a, level + 1);
            indent(out, level);
            if matches!(**b, Stmt::Skip) {
                out.push_str("}\n");
            } else {
                out.push_str("} else {\n");
                print_stmt(out, b, level + 1);
                indent(out, level);
                out.push_str("}\n");
            }
        }
        Stmt::Loop(body) => {
            indent(out, level);
            out.push_str("loop {\n");
            print_stmt(out, body, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Stmt::Block(body) => {
            indent(out, level);
            out.push_str("block {\n");
            print_stmt(out, body, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Stmt::Exit(n) => {
            indent(out, level);
            let _ = writeln!(out, "exit {};", n);
        }
        Stmt::Switch(e, arms) => {
            indent(out, level);
            let _ = writeln!(out, "switch ({}) {{", expr_str(e));
            for (value, body) in arms {
                indent(out, level);
                match value {
                    Some(v) => {
                        let _ = writeln!(out, "case {}:", v);
                    }
                    None => out.push_str("default:\n"),
                }
                print_stmt(out, body, level + 1);
            }
            indent(out, level);
            out.push_str("}\n");
        }
        Stmt::Return(None) => {
            indent(out, level);
            out.push_str("return;\n");
        }
        Stmt::Return(Some(e)) => {
            indent(out, level);
            let _ = writeln!(out, "return {};", expr_str(e));
        }
        Stmt::Label(name, inner) => {
            indent(out, level);
            let _ = writeln!(out, "{}:", name);
            print_stmt(out, inner, level);
        }
        Stmt::Goto(name) => {
            indent(out, level);
            let _ = writeln!(out, "goto {};", name);
        }
    }
}

pub fn expr_str(e: &Expr) -> String {
    match e {
        Expr::IntConst(v) => v.to_string(),
        Expr::LongConst(v) => format!("{}L", v),
        Expr::FloatConst(v) => format!("{:?}", v),
        Expr::AddrSymbol(name) => format!("\"{}\"", name),
        Expr::AddrStack(off) => format!("stack({})", off),
        Expr::AddrString(i) => format!("\"Lstr{}\"", i),
        Expr::Temp(id) => id.to_string(),
        Expr::Unop(op, a) => format!("{}({})", op, expr_str(a)),
        Expr::Binop(op, a, b) => format!("{}({}, {})", binop_name(*op), expr_str(a), expr_str(b)),
        Expr::Load(chunk, addr) => format!("load({}, {})", chunk, expr_str(addr)),
    }
}

fn cond_name(c: Cond) -> &'static str {
    match c {
        Cond::Eq => "eq",
        Cond::Ne => "ne",
        Cond::Lt => "lt",
        Cond::Le => "le",
        Cond::Gt => "gt",
        Cond::Ge => "ge",
    }
}

fn binop_name(op: Binop) -> String {
    fn w(width: Width) -> &'static str {
        width.suffix()
    }
    match op {
        Binop::Add(x) => format!("add{}", w(x)),
        Binop::Sub(x) => format!("sub{}", w(x)),
        Binop::Mul(x) => format!("mul{}", w(x)),
        Binop::Div(x) => format!("div{}", w(x)),
        Binop::Divu(x) => format!("divu{}", w(x)),
        Binop::Rem(x) => format!("rem{}", w(x)),
        Binop::Remu(x) => format!("remu{}", w(x)),
        Binop::And(x) => format!("and{}", w(x)),
        Binop::Or(x) => format!("or{}", w(x)),
        Binop::Xor(x) => format!("xor{}", w(x)),
        Binop::Shl(x) => format!("shl{}", w(x)),
        Binop::Shr(x) => format!("shr{}", w(x)),
        Binop::Shru(x) => format!("shru{}", w(x)),
        Binop::Cmp(c, x) => format!("cmp{}{}", cond_name(c), w(x)),
        Binop::Cmpu(c, x) => format!("cmpu{}{}", cond_name(c), w(x)),
    }
}
