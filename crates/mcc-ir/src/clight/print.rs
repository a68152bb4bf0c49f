//! Clight printer: the `-dclight` dump (`<stem>.light.c`).
//!
//! The shape is C-like. Temporaries print as `register <ty> $n;` in the
//! declaration block and `$n` in expressions. Loops print their canonical
//! form: `loop { ... }` with an optional `continue { ... }` block.

use std::fmt::Write;

use crate::ctypes::CompositeKind;

use super::{Binop, Expr, ExprKind, Function, Program, Stmt, Unop};

pub fn print_program(p: &Program) -> String {
    let mut out = String::new();
    for (name, composite) in p.composites.iter() {
        let kw = match composite.kind {
            CompositeKind::Struct => "struct",
            CompositeKind::Union => "union",
        };
        let _ = writeln!(out, "{} {} {{", kw, name);
        for (fname, fty) in &composite.fields {
            let _ = writeln!(out, "  {} {};", fty, fname);
        }
        let _ = writeln!(out, "}};");
        out.push('\n');
    }
    for (name, ty) in &p.externals {
        let _ = writeln!(out, "extern {} {};", ty, name);
    }
    if !p.externals.is_empty() {
        out.push('\n');
    }
    for g in &p.globals {
        match g.init {
            Some(v) => {
                let _ = writeln!(out, "{} {} = {};", g.ty, g.name, v);
            }
            None => {
                let _ = writeln!(out, "{} {};", g.ty, g.name);
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
    let _ = write!(out, "{} {}(", f.ret, f.name);
    let mut first = true;
    for (name, ty) in &f.params {
        if !first {
            out.push_str(", ");
        }
        first = false;
        let _ = write!(out, "{} {}", ty, name);
    }
    if f.variadic {
        if !first {
            out.push_str(", ");
        }
        out.push_str("...");
    }
    out.push_str(")\n{\n");
    for (name, ty) in &f.locals {
        let _ = writeln!(out, "  {} {};", ty, name);
    }
    for (id, ty) in &f.temps {
        let _ = writeln!(out, "  register {} {};", ty, id);
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
        Stmt::Assign(lhs, rhs) => {
            indent(out, level);
            let _ = writeln!(out, "{} = {};", expr_str(lhs), expr_str(rhs));
        }
        Stmt::Set(id, e) => {
            indent(out, level);
            let _ = writeln!(out, "{} = {};", id, expr_str(e));
        }
        Stmt::Call(dest, func, args) => {
            indent(out, level);
            let args_text: Vec<String> = args.iter().map(expr_str).collect();
            match dest {
                Some(id) => {
                    let _ = writeln!(out, "{} = {}({});", id, expr_str(func), args_text.join(", "));
                }
                None => {
                    let _ = writeln!(out, "{}({});", expr_str(func), args_text.join(", "));
                }
            }
        }
        Stmt::Seq(a, b) => {
            print_stmt(out, a, level);
            print_stmt(out, b, level);
        }
        Stmt::If(cond, then, els) => {
            indent(out, level);
            let _ = writeln!(out, "if ({}) {{", expr_str(cond));
            print_stmt(out, then, level + 1);
            indent(out, level);
            if matches!(**els, Stmt::Skip) {
                out.push_str("}\n");
            } else {
                out.push_str("} else {\n");
                print_stmt(out, els, level + 1);
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
            for arm in arms {
                indent(out, level);
                match arm.value {
                    Some(v) => {
                        let _ = writeln!(out, "case {}:", v);
                    }
                    None => out.push_str("default:\n"),
                }
                print_stmt(out, &arm.body, level + 1);
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
    let mut s = String::new();
    write_expr(&mut s, e, 0);
    s
}

fn binop_prec(op: Binop) -> u8 {
    match op {
        Binop::Or => 6,
        Binop::Xor => 7,
        Binop::And => 8,
        Binop::Eq | Binop::Ne => 9,
        Binop::Lt | Binop::Le | Binop::Gt | Binop::Ge => 10,
        Binop::Shl | Binop::Shr => 11,
        Binop::Add | Binop::Sub => 12,
        Binop::Mul | Binop::Div | Binop::Mod => 13,
    }
}

fn binop_symbol(op: Binop) -> &'static str {
    match op {
        Binop::Add => "+",
        Binop::Sub => "-",
        Binop::Mul => "*",
        Binop::Div => "/",
        Binop::Mod => "%",
        Binop::And => "&",
        Binop::Or => "|",
        Binop::Xor => "^",
        Binop::Shl => "<<",
        Binop::Shr => ">>",
        Binop::Eq => "==",
        Binop::Ne => "!=",
        Binop::Lt => "<",
        Binop::Le => "<=",
        Binop::Gt => ">",
        Binop::Ge => ">=",
    }
}

/// Precedence-aware rendering: parentheses appear only where re-reading the
/// output would change the tree.
fn write_expr(out: &mut String, e: &Expr, min_prec: u8) {
    match &e.kind {
        ExprKind::ConstInt(v) => {
            let _ = write!(out, "{}", v);
        }
        ExprKind::ConstFloat(v) => {
            let _ = write!(out, "{}", v);
        }
        ExprKind::ConstString(s) => {
            let _ = write!(out, "\"{}\"", s);
        }
        ExprKind::Var(name) => out.push_str(name),
        ExprKind::Temp(id) => {
            let _ = write!(out, "{}", id);
        }
        ExprKind::Deref(inner) => {
            out.push('*');
            write_expr(out, inner, 14);
        }
        ExprKind::Addrof(inner) => {
            out.push('&');
            write_expr(out, inner, 14);
        }
        ExprKind::Unop(op, inner) => {
            out.push_str(match op {
                Unop::Neg => "-",
                Unop::LogNot => "!",
                Unop::BitNot => "~",
            });
            write_expr(out, inner, 14);
        }
        ExprKind::Binop(op, lhs, rhs) => {
            let prec = binop_prec(*op);
            let need_parens = prec < min_prec;
            if need_parens {
                out.push('(');
            }
            write_expr(out, lhs, prec);
            let _ = write!(out, " {} ", binop_symbol(*op));
            write_expr(out, rhs, prec + 1);
            if need_parens {
                out.push(')');
            }
        }
        ExprKind::Cast(inner) => {
            let _ = write!(out, "({})", e.ty);
            write_expr(out, inner, 14);
        }
        ExprKind::Field(base, name) => {
            write_expr(out, base, 15);
            let _ = write!(out, ".{}", name);
        }
        ExprKind::Sizeof(ty) => {
            let _ = write!(out, "sizeof({})", ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clight::TempId;
    use crate::ctypes::CType;

    fn int_expr(kind: ExprKind) -> Expr {
        Expr::new(kind, CType::int())
    }

    #[test]
    fn precedence_printing() {
        // 1 + 2 * 3 keeps no parens; (1 + 2) * 3 gets them.
        let mul = int_expr(ExprKind::Binop(
            Binop::Mul,
            Box::new(int_expr(ExprKind::ConstInt(2))),
            Box::new(int_expr(ExprKind::ConstInt(3))),
        ));
        let sum = int_expr(ExprKind::Binop(
            Binop::Add,
            Box::new(int_expr(ExprKind::ConstInt(1))),
            Box::new(mul.clone()),
        ));
        assert_eq!(expr_str(&sum), "1 + 2 * 3");

        let sum2 = int_expr(ExprKind::Binop(
            Binop::Add,
            Box::new(int_expr(ExprKind::ConstInt(1))),
            Box::new(int_expr(ExprKind::ConstInt(2))),
        ));
        let prod = int_expr(ExprKind::Binop(
            Binop::Mul,
            Box::new(sum2),
            Box::new(int_expr(ExprKind::ConstInt(3))),
        ));
        assert_eq!(expr_str(&prod), "(1 + 2) * 3");
    }

    #[test]
    fn temp_rendering() {
        let e = Expr::temp(TempId(3), CType::int());
        assert_eq!(expr_str(&e), "$3");
    }

    #[test]
    fn left_associative_subtraction_parenthesizes_right_nest() {
        // a - (b - c) must keep the parens.
        let var = |n: &str| int_expr(ExprKind::Var(n.to_string()));
        let inner = int_expr(ExprKind::Binop(
            Binop::Sub,
            Box::new(var("b")),
            Box::new(var("c")),
        ));
        let outer = int_expr(ExprKind::Binop(
            Binop::Sub,
            Box::new(var("a")),
            Box::new(inner),
        ));
        assert_eq!(expr_str(&outer), "a - (b - c)");
    }
}
