//! Csharpminor printer: the `-dcsharpminor` dump.

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
    for local in &f.locals {
        let _ = writeln!(out, "  var {} : {};", local.name, local.size);
    }
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
        Stmt::Loop(body, cont) => {
            indent(out, level);
            out.push_str("loop {\n");
            print_stmt(out, body, level + 1);
            indent(out, level);
            if matches!(**cont, Stmt::Skip) {
                out.push_str("}\n");
            } else {
                out.push_str("} continue {\n");
                print_stmt(out, cont, level + 1);
                indent(out, level);
                out.push_str("}\n");
            }
        }
        Stmt::Break => {
            indent(out, level);
            out.push_str("break;\n");
        }
        Stmt::Continue => {
            indent(out, level);
            out.push_str("continue;\n");
        }
        Stmt::Return(None) => {
            indent(out, level);
            out.push_str("return;\n");
        }
        Stmt::Return(Some(e)) => {
            indent(out, level);
            let _ = writeln!(out, "return {};", expr_str(e));
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
        Expr::Temp(id) => id.to_string(),
        Expr::AddrLocal(name) => format!("&{}", name),
        Expr::AddrGlobal(name) => format!("\"{}\"", name),
        Expr::AddrString(i) => format!("\"Lstr{}\"", i),
        Expr::Load(chunk, addr) => format!("load({}, {})", chunk, expr_str(addr)),
        Expr::Unop(op, a) => format!("{}({})", op, expr_str(a)),
        Expr::Binop(op, a, b) => {
            format!("{}({}, {})", binop_name(*op), expr_str(a), expr_str(b))
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clight::TempId;
    use crate::ctypes::Chunk;
    use crate::ops::Width;

    #[test]
    fn load_rendering() {
        let e = Expr::Load(
            Chunk::Int32,
            Box::new(Expr::Binop(
                Binop::Add(Width::W64),
                Box::new(Expr::Temp(TempId(1))),
                Box::new(Expr::LongConst(4)),
            )),
        );
        assert_eq!(expr_str(&e), "load(int32, addl($1, 4L))");
    }

    #[test]
    fn comparison_rendering() {
        let e = Expr::Binop(
            Binop::Cmpu(Cond::Lt, Width::W64),
            Box::new(Expr::Temp(TempId(1))),
            Box::new(Expr::Temp(TempId(2))),
        );
        assert_eq!(expr_str(&e), "cmpultl($1, $2)");
    }
}
