//! Csharpminor to Cminor: frame layout and block/exit control flow.
//!
//! Locals are packed into one stack frame in declaration order, each aligned
//! naturally. A structured loop becomes
//!
//! ```text
//! Block(               exit 1 = break
//!   Loop(
//!     Seq(Block(body), continue_body)))   exit 0 = continue
//! ```
//!
//! so `break` exits both blocks and `continue` exits the inner one, falling
//! into the continue body before the back edge. A `switch` wraps its arms in
//! one more block, which is what its `break` exits.

use indexmap::IndexMap;
use tracing::debug;

use crate::csharpminor as cshm;
use crate::ctypes::round_up;
use crate::error::LowerError;

use super::{Expr, Function, Program, Stmt};

pub fn lower_program(p: &cshm::Program) -> Result<Program, LowerError> {
    let mut functions = Vec::with_capacity(p.functions.len());
    for f in &p.functions {
        functions.push(lower_function(f)?);
    }
    Ok(Program {
        functions,
        globals: p.globals.clone(),
        strings: p.strings.clone(),
    })
}

fn lower_function(f: &cshm::Function) -> Result<Function, LowerError> {
    // Frame layout: declaration order, naturally aligned.
    let mut offsets: IndexMap<String, i64> = IndexMap::new();
    let mut cursor = 0u64;
    for local in &f.locals {
        cursor = round_up(cursor, local.align.max(1));
        offsets.insert(local.name.clone(), cursor as i64);
        cursor += local.size;
    }
    let stack_size = round_up(cursor, 8);

    let lowerer = FnLowerer {
        function: &f.name,
        offsets,
    };
    let body = lowerer.stmt(&f.body, Ctx { brk: None, cont: None })?;
    debug!(function = %f.name, stack_size, "assigned frame offsets");

    Ok(Function {
        name: f.name.clone(),
        sig: f.sig.clone(),
        params: f.params.clone(),
        stack_size,
        temp_widths: f.temp_widths.clone(),
        next_temp: f.next_temp,
        body,
    })
}

/// Exit depths for the innermost `break` and `continue` targets at the
/// current position.
#[derive(Clone, Copy)]
struct Ctx {
    brk: Option<u32>,
    cont: Option<u32>,
}

struct FnLowerer<'a> {
    function: &'a str,
    offsets: IndexMap<String, i64>,
}

impl<'a> FnLowerer<'a> {
    fn stmt(&self, s: &cshm::Stmt, ctx: Ctx) -> Result<Stmt, LowerError> {
        use cshm::Stmt as S;
        Ok(match s {
            S::Skip => Stmt::Skip,
            S::Set(id, e) => Stmt::Set(*id, self.expr(e)),
            S::Store(chunk, addr, value) => {
                Stmt::Store(*chunk, self.expr(addr), self.expr(value))
            }
            S::Call(dest, sig, callee, args) => Stmt::Call(
                *dest,
                sig.clone(),
                self.expr(callee),
                args.iter().map(|a| self.expr(a)).collect(),
            ),
            S::Seq(a, b) => Stmt::Seq(
                Box::new(self.stmt(a, ctx)?),
                Box::new(self.stmt(b, ctx)?),
            ),
            S::If(c, a, b) => Stmt::If(
                self.expr(c),
                Box::new(self.stmt(a, ctx)?),
                Box::new(self.stmt(b, ctx)?),
            ),
            S::Loop(body, cont) => {
                let body_ctx = Ctx {
                    brk: Some(1),
                    cont: Some(0),
                };
                let body = self.stmt(body, body_ctx)?;
                // The continue body runs outside the inner block; break and
                // continue cannot occur there.
                let cont = self.stmt(cont, Ctx { brk: None, cont: None })?;
                Stmt::Block(Box::new(Stmt::Loop(Box::new(Stmt::Seq(
                    Box::new(Stmt::Block(Box::new(body))),
                    Box::new(cont),
                )))))
            }
            S::Break => {
                let depth = ctx.brk.ok_or_else(|| LowerError::Unsupported {
                    construct: format!("'break' outside loop or switch in '{}'", self.function),
                })?;
                Stmt::Exit(depth)
            }
            S::Continue => {
                let depth = ctx.cont.ok_or_else(|| LowerError::Unsupported {
                    construct: format!("'continue' outside loop in '{}'", self.function),
                })?;
                Stmt::Exit(depth)
            }
            S::Return(e) => Stmt::Return(e.as_ref().map(|e| self.expr(e))),
            S::Switch(e, arms) => {
                let arm_ctx = Ctx {
                    brk: Some(0),
                    cont: ctx.cont.map(|d| d + 1),
                };
                let mut lowered = Vec::with_capacity(arms.len());
                for (value, body) in arms {
                    lowered.push((*value, self.stmt(body, arm_ctx)?));
                }
                Stmt::Block(Box::new(Stmt::Switch(self.expr(e), lowered)))
            }
            S::Label(name, inner) => {
                Stmt::Label(name.clone(), Box::new(self.stmt(inner, ctx)?))
            }
            S::Goto(name) => Stmt::Goto(name.clone()),
        })
    }

    fn expr(&self, e: &cshm::Expr) -> Expr {
        use cshm::Expr as E;
        match e {
            E::IntConst(v) => Expr::IntConst(*v),
            E::LongConst(v) => Expr::LongConst(*v),
            E::FloatConst(v) => Expr::FloatConst(*v),
            E::Temp(id) => Expr::Temp(*id),
            E::AddrLocal(name) => {
                let offset = *self
                    .offsets
                    .get(name)
                    .unwrap_or_else(|| panic!("local '{}' has no frame slot", name));
                Expr::AddrStack(offset)
            }
            E::AddrGlobal(name) => Expr::AddrSymbol(name.clone()),
            E::AddrString(i) => Expr::AddrString(*i),
            E::Load(chunk, addr) => Expr::Load(*chunk, Box::new(self.expr(addr))),
            E::Unop(op, a) => Expr::Unop(*op, Box::new(self.expr(a))),
            E::Binop(op, a, b) => {
                Expr::Binop(*op, Box::new(self.expr(a)), Box::new(self.expr(b)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplexpr::simpl_expr;
    use crate::simpllocals::simpl_locals;
    use mcc_syntax::parser::parse_translation_unit;

    fn lower(src: &str) -> Program {
        let cabs = parse_translation_unit(src, "t.c").expect("parse");
        let clight = simpl_expr(&cabs).expect("simpl_expr");
        let clight = simpl_locals(&clight);
        let cshm = cshm::lower::lower_program(&clight).expect("cshm");
        lower_program(&cshm).expect("cminor")
    }

    use crate::csharpminor as cshm;

    #[test]
    fn frame_offsets_respect_alignment() {
        // char c; long l; -> c at 0, l at 8, frame 16.
        let p = lower("int f() { char c; long l; char *p; p = &c; long *q; q = &l; return 0; }");
        let f = &p.functions[0];
        assert_eq!(f.stack_size, 16);
    }

    #[test]
    fn break_becomes_exit_one() {
        let p = lower("int f() { while (1) { break; } return 0; }");
        let f = &p.functions[0];
        // Shape: Block(Loop(Seq(Block(if 1 then exit 1 else exit 1?), skip)))
        fn find_exits(s: &Stmt, out: &mut Vec<u32>) {
            match s {
                Stmt::Exit(n) => out.push(*n),
                Stmt::Seq(a, b) => {
                    find_exits(a, out);
                    find_exits(b, out);
                }
                Stmt::If(_, a, b) => {
                    find_exits(a, out);
                    find_exits(b, out);
                }
                Stmt::Block(a) | Stmt::Loop(a) | Stmt::Label(_, a) => find_exits(a, out),
                Stmt::Switch(_, arms) => {
                    for (_, s) in arms {
                        find_exits(s, out);
                    }
                }
                _ => {}
            }
        }
        let mut exits = Vec::new();
        find_exits(&f.body, &mut exits);
        assert!(exits.contains(&1), "break should exit the outer block");
        assert!(matches!(f.body, Stmt::Seq(..) | Stmt::Block(_)));
    }

    #[test]
    fn continue_becomes_exit_zero() {
        let p = lower("int f() { int i; for (i = 0; i < 3; i++) { continue; } return i; }");
        let f = &p.functions[0];
        fn find_exits(s: &Stmt, out: &mut Vec<u32>) {
            match s {
                Stmt::Exit(n) => out.push(*n),
                Stmt::Seq(a, b) | Stmt::If(_, a, b) => {
                    find_exits(a, out);
                    find_exits(b, out);
                }
                Stmt::Block(a) | Stmt::Loop(a) | Stmt::Label(_, a) => find_exits(a, out),
                Stmt::Switch(_, arms) => {
                    for (_, s) in arms {
                        find_exits(s, out);
                    }
                }
                _ => {}
            }
        }
        let mut exits = Vec::new();
        find_exits(&f.body, &mut exits);
        assert!(exits.contains(&0), "continue should exit the body block");
        assert!(exits.contains(&1), "loop exit (from the condition) is a break");
    }

    #[test]
    fn switch_break_exits_switch_block() {
        let p = lower(
            "int f(int x) { while (1) { switch (x) { case 1: break; default: continue; } } return 0; }",
        );
        let f = &p.functions[0];
        fn find_exits(s: &Stmt, out: &mut Vec<u32>) {
            match s {
                Stmt::Exit(n) => out.push(*n),
                Stmt::Seq(a, b) | Stmt::If(_, a, b) => {
                    find_exits(a, out);
                    find_exits(b, out);
                }
                Stmt::Block(a) | Stmt::Loop(a) | Stmt::Label(_, a) => find_exits(a, out),
                Stmt::Switch(_, arms) => {
                    for (_, s) in arms {
                        find_exits(s, out);
                    }
                }
                _ => {}
            }
        }
        let mut exits = Vec::new();
        find_exits(&f.body, &mut exits);
        // case 1's break exits the switch block (0); default's continue must
        // skip the switch block and the body block (1).
        assert!(exits.contains(&0));
        assert!(exits.contains(&1));
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let cabs = parse_translation_unit("int f() { break; return 0; }", "t.c").unwrap();
        let clight = simpl_expr(&cabs).unwrap();
        let clight = simpl_locals(&clight);
        let cshm_p = cshm::lower::lower_program(&clight).unwrap();
        assert!(lower_program(&cshm_p).is_err());
    }
}
