//! SimplLocals: promote address-free locals to temporaries.
//!
//! A whole-function analysis (collect every variable whose address is taken,
//! or whose type forces memory residence) followed by a rewrite: promoted
//! locals and parameters leave the `locals` list, join the `temps` list, and
//! every `Var` occurrence becomes a `Temp`; assignments to them become `Set`.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::clight::{Expr, ExprKind, Function, Program, Stmt, SwitchArm, TempId};

/// Run the pass over a whole program.
pub fn simpl_locals(p: &Program) -> Program {
    Program {
        composites: p.composites.clone(),
        globals: p.globals.clone(),
        functions: p.functions.iter().map(simpl_locals_function).collect(),
        externals: p.externals.clone(),
    }
}

/// Promote what can be promoted in one function.
pub fn simpl_locals_function(f: &Function) -> Function {
    let addressed = collect_addressed(&f.body);

    // Everything declared in this function, params first.
    let mut next_temp = f.next_temp();
    let mut mapping: IndexMap<String, TempId> = IndexMap::new();
    let mut param_temps = IndexMap::new();
    let mut temps = f.temps.clone();
    let mut locals = Vec::new();

    for (name, ty) in &f.params {
        if !addressed.contains(name.as_str()) && ty.is_scalar() {
            let id = TempId(next_temp);
            next_temp += 1;
            mapping.insert(name.clone(), id);
            param_temps.insert(name.clone(), id);
            temps.push((id, ty.clone()));
        }
    }
    for (name, ty) in &f.locals {
        if !addressed.contains(name.as_str()) && ty.is_scalar() {
            let id = TempId(next_temp);
            next_temp += 1;
            mapping.insert(name.clone(), id);
            temps.push((id, ty.clone()));
        } else {
            locals.push((name.clone(), ty.clone()));
        }
    }

    let body = rewrite_stmt(&f.body, &mapping);
    debug!(
        function = %f.name,
        promoted = mapping.len(),
        remaining = locals.len(),
        "promoted locals to temporaries"
    );

    Function {
        name: f.name.clone(),
        ret: f.ret.clone(),
        params: f.params.clone(),
        variadic: f.variadic,
        locals,
        temps,
        param_temps,
        body,
    }
}

/// Names whose storage is observable: operands of `&`, and any variable of
/// aggregate type (accessed by reference).
fn collect_addressed(s: &Stmt) -> IndexSet<String> {
    let mut out = IndexSet::new();
    walk_stmt(s, &mut out);
    out
}

fn walk_stmt(s: &Stmt, out: &mut IndexSet<String>) {
    match s {
        Stmt::Skip | Stmt::Break | Stmt::Continue | Stmt::Goto(_) | Stmt::Return(None) => {}
        Stmt::Assign(lhs, rhs) => {
            walk_expr(lhs, out);
            walk_expr(rhs, out);
        }
        Stmt::Set(_, e) | Stmt::Return(Some(e)) => walk_expr(e, out),
        Stmt::Call(_, f, args) => {
            walk_expr(f, out);
            for a in args {
                walk_expr(a, out);
            }
        }
        Stmt::Seq(a, b) | Stmt::Loop(a, b) => {
            walk_stmt(a, out);
            walk_stmt(b, out);
        }
        Stmt::If(c, a, b) => {
            walk_expr(c, out);
            walk_stmt(a, out);
            walk_stmt(b, out);
        }
        Stmt::Switch(e, arms) => {
            walk_expr(e, out);
            for arm in arms {
                walk_stmt(&arm.body, out);
            }
        }
        Stmt::Label(_, inner) => walk_stmt(inner, out),
    }
}

fn walk_expr(e: &Expr, out: &mut IndexSet<String>) {
    match &e.kind {
        ExprKind::Addrof(inner) => {
            if let Some(name) = base_variable(inner) {
                out.insert(name.to_string());
            }
            walk_expr(inner, out);
        }
        ExprKind::Var(name) => {
            if e.ty.is_aggregate() {
                out.insert(name.clone());
            }
        }
        ExprKind::Deref(inner) | ExprKind::Unop(_, inner) | ExprKind::Cast(inner) => {
            walk_expr(inner, out)
        }
        ExprKind::Field(base, _) => walk_expr(base, out),
        ExprKind::Binop(_, a, b) => {
            walk_expr(a, out);
            walk_expr(b, out);
        }
        ExprKind::ConstInt(_)
        | ExprKind::ConstFloat(_)
        | ExprKind::ConstString(_)
        | ExprKind::Temp(_)
        | ExprKind::Sizeof(_) => {}
    }
}

/// The variable whose storage an lvalue designates, if any. Dereferences
/// designate the pointee's storage, not the pointer variable's.
fn base_variable(e: &Expr) -> Option<&str> {
    match &e.kind {
        ExprKind::Var(name) => Some(name),
        ExprKind::Field(base, _) => base_variable(base),
        _ => None,
    }
}

fn rewrite_stmt(s: &Stmt, mapping: &IndexMap<String, TempId>) -> Stmt {
    match s {
        Stmt::Skip => Stmt::Skip,
        Stmt::Assign(lhs, rhs) => {
            // A store to a promoted variable becomes a temp update.
            if let ExprKind::Var(name) = &lhs.kind {
                if let Some(id) = mapping.get(name) {
                    return Stmt::Set(*id, rewrite_expr(rhs, mapping));
                }
            }
            Stmt::Assign(rewrite_expr(lhs, mapping), rewrite_expr(rhs, mapping))
        }
        Stmt::Set(id, e) => Stmt::Set(*id, rewrite_expr(e, mapping)),
        Stmt::Call(dest, f, args) => Stmt::Call(
            *dest,
            rewrite_expr(f, mapping),
            args.iter().map(|a| rewrite_expr(a, mapping)).collect(),
        ),
        Stmt::Seq(a, b) => Stmt::Seq(
            Box::new(rewrite_stmt(a, mapping)),
            Box::new(rewrite_stmt(b, mapping)),
        ),
        Stmt::If(c, a, b) => Stmt::If(
            rewrite_expr(c, mapping),
            Box::new(rewrite_stmt(a, mapping)),
            Box::new(rewrite_stmt(b, mapping)),
        ),
        Stmt::Loop(a, b) => Stmt::Loop(
            Box::new(rewrite_stmt(a, mapping)),
            Box::new(rewrite_stmt(b, mapping)),
        ),
        Stmt::Break => Stmt::Break,
        Stmt::Continue => Stmt::Continue,
        Stmt::Return(e) => Stmt::Return(e.as_ref().map(|e| rewrite_expr(e, mapping))),
        Stmt::Switch(e, arms) => Stmt::Switch(
            rewrite_expr(e, mapping),
            arms.iter()
                .map(|arm| SwitchArm {
                    value: arm.value,
                    body: rewrite_stmt(&arm.body, mapping),
                })
                .collect(),
        ),
        Stmt::Label(name, inner) => {
            Stmt::Label(name.clone(), Box::new(rewrite_stmt(inner, mapping)))
        }
        Stmt::Goto(name) => Stmt::Goto(name.clone()),
    }
}

fn rewrite_expr(e: &Expr, mapping: &IndexMap<String, TempId>) -> Expr {
    let kind = match &e.kind {
        ExprKind::Var(name) => match mapping.get(name) {
            Some(id) => ExprKind::Temp(*id),
            None => ExprKind::Var(name.clone()),
        },
        ExprKind::Deref(inner) => ExprKind::Deref(Box::new(rewrite_expr(inner, mapping))),
        ExprKind::Addrof(inner) => ExprKind::Addrof(Box::new(rewrite_expr(inner, mapping))),
        ExprKind::Unop(op, inner) => ExprKind::Unop(*op, Box::new(rewrite_expr(inner, mapping))),
        ExprKind::Binop(op, a, b) => ExprKind::Binop(
            *op,
            Box::new(rewrite_expr(a, mapping)),
            Box::new(rewrite_expr(b, mapping)),
        ),
        ExprKind::Cast(inner) => ExprKind::Cast(Box::new(rewrite_expr(inner, mapping))),
        ExprKind::Field(base, name) => {
            ExprKind::Field(Box::new(rewrite_expr(base, mapping)), name.clone())
        }
        other => other.clone(),
    };
    Expr::new(kind, e.ty.clone())
}
