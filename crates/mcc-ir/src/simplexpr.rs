//! SimplExpr: Cabs to Clight.
//!
//! C expressions have side effects (assignment, increment, calls, comma,
//! short-circuit `&&`/`||`); Clight expressions must be pure. Every
//! expression is translated into a pair `(effects, pure)`: a statement list
//! that establishes the side effects, and a pure expression over variables
//! and freshly minted temporaries.
//!
//! The pass also performs type elaboration (the only bridge from the
//! parser's canonical type-spec strings to structured [`CType`]s) and loop
//! desugaring into the canonical `Loop { body, continue_body }` shape.

use indexmap::IndexMap;
use mcc_syntax::cabs;
use tracing::debug;

use crate::clight::{seq, Binop, Expr, ExprKind, Function, GlobVar, Program, Stmt, SwitchArm, TempId, Unop};
use crate::ctypes::{Composite, CompositeEnv, CompositeKind, CType, IntSize, Signedness};
use crate::error::ElabError;

/// Translation-unit-level elaboration environment.
struct ElabEnv {
    composites: CompositeEnv,
    typedefs: IndexMap<String, CType>,
    enum_consts: IndexMap<String, i64>,
    globals: IndexMap<String, CType>,
}

impl ElabEnv {
    fn resolve(&self, spec: &str) -> Result<CType, ElabError> {
        CType::parse(spec, &self.typedefs)
    }

    fn resolve_with_dims(
        &self,
        spec: &str,
        dims: &[Option<cabs::Expr>],
    ) -> Result<CType, ElabError> {
        let mut ty = self.resolve(spec)?;
        for dim in dims.iter().rev() {
            let len = match dim {
                Some(e) => Some(const_eval_in(e, &self.enum_consts, self)? as u64),
                None => None,
            };
            ty = CType::Array {
                elem: Box::new(ty),
                len,
            };
        }
        Ok(ty)
    }
}

/// Lower a parsed translation unit to Clight.
pub fn simpl_expr(program: &cabs::Program) -> Result<Program, ElabError> {
    let mut env = ElabEnv {
        composites: CompositeEnv::new(),
        typedefs: IndexMap::new(),
        enum_consts: IndexMap::new(),
        globals: IndexMap::new(),
    };
    let mut defined = Vec::new();

    // First pass: types, enum constants, globals, signatures.
    for def in &program.defs {
        match def {
            cabs::Definition::StructDef(c) => {
                let composite = elaborate_composite(&env, CompositeKind::Struct, c)?;
                env.composites.define(&c.name, composite);
            }
            cabs::Definition::UnionDef(c) => {
                let composite = elaborate_composite(&env, CompositeKind::Union, c)?;
                env.composites.define(&c.name, composite);
            }
            cabs::Definition::EnumDef { items, .. } => {
                let mut next = 0i64;
                for item in items {
                    let value = match &item.value {
                        Some(e) => const_eval_in(e, &env.enum_consts, &env)?,
                        None => next,
                    };
                    env.enum_consts.insert(item.name.clone(), value);
                    next = value + 1;
                }
            }
            cabs::Definition::TypedefDef {
                type_spec,
                name,
                inline_composite,
            } => {
                if let Some(inline) = inline_composite {
                    let kind = if inline.is_union {
                        CompositeKind::Union
                    } else {
                        CompositeKind::Struct
                    };
                    let composite = elaborate_composite(&env, kind, &inline.def)?;
                    env.composites.define(&inline.def.name, composite);
                }
                let ty = env.resolve(type_spec)?;
                env.typedefs.insert(name.clone(), ty);
            }
            cabs::Definition::VarDef {
                type_spec,
                name,
                array_dims,
                ..
            } => {
                let ty = env.resolve_with_dims(type_spec, array_dims)?;
                env.globals.insert(name.clone(), ty);
            }
            cabs::Definition::FunDef {
                return_spec,
                name,
                params,
                variadic,
                body,
            } => {
                let ret = env.resolve(return_spec)?;
                let mut ptypes = Vec::with_capacity(params.len());
                for p in params {
                    ptypes.push(env.resolve(&p.type_spec)?);
                }
                env.globals.insert(
                    name.clone(),
                    CType::Function {
                        ret: Box::new(ret),
                        params: ptypes,
                        variadic: *variadic,
                    },
                );
                if body.is_some() {
                    defined.push(name.clone());
                }
            }
        }
    }

    // Second pass: global initializers and function bodies.
    let mut globals = Vec::new();
    let mut functions = Vec::new();
    for def in &program.defs {
        match def {
            cabs::Definition::VarDef {
                type_spec,
                name,
                array_dims,
                init,
                ..
            } => {
                let ty = env.resolve_with_dims(type_spec, array_dims)?;
                let init = match init {
                    Some(e) => Some(const_eval_in(e, &env.enum_consts, &env)?),
                    None => None,
                };
                globals.push(GlobVar {
                    name: name.clone(),
                    ty,
                    init,
                });
            }
            cabs::Definition::FunDef {
                return_spec,
                name,
                params,
                variadic,
                body: Some(body),
            } => {
                let f = FnLowerer::lower(&env, name, return_spec, params, *variadic, body)?;
                functions.push(f);
            }
            _ => {}
        }
    }

    let externals: Vec<(String, CType)> = env
        .globals
        .iter()
        .filter(|(name, ty)| {
            matches!(ty, CType::Function { .. }) && !defined.iter().any(|d| &d == name)
        })
        .map(|(name, ty)| (name.clone(), ty.clone()))
        .collect();

    debug!(
        functions = functions.len(),
        globals = globals.len(),
        "lowered translation unit to Clight"
    );
    Ok(Program {
        composites: env.composites,
        globals,
        functions,
        externals,
    })
}

fn elaborate_composite(
    env: &ElabEnv,
    kind: CompositeKind,
    def: &cabs::CompositeDef,
) -> Result<Composite, ElabError> {
    let mut fields = Vec::with_capacity(def.fields.len());
    for f in &def.fields {
        let ty = env.resolve_with_dims(&f.type_spec, &f.array_dims)?;
        fields.push((f.name.clone(), ty));
    }
    Ok(Composite { kind, fields })
}

// ---------------------------------------------------------------------------
// Constant evaluation
// ---------------------------------------------------------------------------

/// Evaluate an integer constant expression (case labels, enum values, array
/// dimensions, global initializers).
fn const_eval_in(
    e: &cabs::Expr,
    enum_consts: &IndexMap<String, i64>,
    env: &ElabEnv,
) -> Result<i64, ElabError> {
    use cabs::Expr as E;
    match e {
        E::Constant(v) => Ok(*v),
        E::CharLiteral(text) => Ok(decode_char(text)),
        E::Paren(inner) => const_eval_in(inner, enum_consts, env),
        E::Variable(name) => enum_consts
            .get(name)
            .copied()
            .ok_or(ElabError::NotConstant),
        E::Unary { op, expr } => {
            let v = const_eval_in(expr, enum_consts, env)?;
            match op {
                cabs::UnaryOp::Neg => Ok(v.wrapping_neg()),
                cabs::UnaryOp::BitNot => Ok(!v),
                cabs::UnaryOp::LogNot => Ok((v == 0) as i64),
                _ => Err(ElabError::NotConstant),
            }
        }
        E::Binary { op, lhs, rhs } => {
            let a = const_eval_in(lhs, enum_consts, env)?;
            let b = const_eval_in(rhs, enum_consts, env)?;
            use cabs::BinaryOp as B;
            match op {
                B::Add => Ok(a.wrapping_add(b)),
                B::Sub => Ok(a.wrapping_sub(b)),
                B::Mul => Ok(a.wrapping_mul(b)),
                B::Div if b != 0 => Ok(a.wrapping_div(b)),
                B::Rem if b != 0 => Ok(a.wrapping_rem(b)),
                B::Shl => Ok(a.wrapping_shl(b as u32)),
                B::Shr => Ok(a.wrapping_shr(b as u32)),
                B::BitAnd => Ok(a & b),
                B::BitOr => Ok(a | b),
                B::BitXor => Ok(a ^ b),
                B::Eq => Ok((a == b) as i64),
                B::Ne => Ok((a != b) as i64),
                B::Lt => Ok((a < b) as i64),
                B::Le => Ok((a <= b) as i64),
                B::Gt => Ok((a > b) as i64),
                B::Ge => Ok((a >= b) as i64),
                _ => Err(ElabError::NotConstant),
            }
        }
        E::SizeofType(spec) => {
            let ty = env.resolve(spec)?;
            Ok(ty.sizeof(&env.composites)? as i64)
        }
        E::Cast { expr, .. } => const_eval_in(expr, enum_consts, env),
        _ => Err(ElabError::NotConstant),
    }
}

/// Decode a character literal as stored by the lexer. Escapes keep only the
/// common forms; `\x` for any other `x` is "the next character as itself".
fn decode_char(text: &str) -> i64 {
    let mut chars = text.chars();
    match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => 10,
            Some('t') => 9,
            Some('r') => 13,
            Some('0') => 0,
            Some(c) => c as i64,
            None => '\\' as i64,
        },
        Some(c) => c as i64,
        None => 0,
    }
}

// ---------------------------------------------------------------------------
// Per-function lowering
// ---------------------------------------------------------------------------

struct FnLowerer<'a> {
    env: &'a ElabEnv,
    ret: CType,
    /// Flat view of params and block locals; block scoping is flattened.
    vars: IndexMap<String, CType>,
    locals: Vec<(String, CType)>,
    temps: Vec<(TempId, CType)>,
    next_temp: u32,
}

impl<'a> FnLowerer<'a> {
    fn lower(
        env: &'a ElabEnv,
        name: &str,
        return_spec: &str,
        params: &[cabs::Param],
        variadic: bool,
        body: &[cabs::Stmt],
    ) -> Result<Function, ElabError> {
        let ret = env.resolve(return_spec)?;
        let mut lowerer = FnLowerer {
            env,
            ret: ret.clone(),
            vars: IndexMap::new(),
            locals: Vec::new(),
            temps: Vec::new(),
            next_temp: 1,
        };
        let mut param_list = Vec::with_capacity(params.len());
        for p in params {
            let ty = env.resolve(&p.type_spec)?;
            lowerer.vars.insert(p.name.clone(), ty.clone());
            param_list.push((p.name.clone(), ty));
        }
        let mut stmts = Vec::with_capacity(body.len());
        for s in body {
            stmts.push(lowerer.stmt(s)?);
        }
        Ok(Function {
            name: name.to_string(),
            ret,
            params: param_list,
            variadic,
            locals: lowerer.locals,
            temps: lowerer.temps,
            param_temps: IndexMap::new(),
            body: seq(stmts),
        })
    }

    fn fresh(&mut self, ty: CType) -> TempId {
        let id = TempId(self.next_temp);
        self.next_temp += 1;
        self.temps.push((id, ty));
        id
    }

    fn const_eval(&self, e: &cabs::Expr) -> Result<i64, ElabError> {
        const_eval_in(e, &self.env.enum_consts, self.env)
    }

    // -- statements ---------------------------------------------------------

    fn stmt(&mut self, s: &cabs::Stmt) -> Result<Stmt, ElabError> {
        use cabs::Stmt as S;
        match s {
            S::Block(stmts) => {
                let mut out = Vec::with_capacity(stmts.len());
                for s in stmts {
                    out.push(self.stmt(s)?);
                }
                Ok(seq(out))
            }
            S::Decl(decls) => self.decl_stmts(decls),
            S::Computation(e) => {
                let (effects, _) = self.expr(e)?;
                Ok(seq(effects))
            }
            S::Return(None) => Ok(Stmt::Return(None)),
            S::Return(Some(e)) => {
                let (mut effects, p) = self.expr(e)?;
                let p = coerce(p, &self.ret.clone());
                effects.push(Stmt::Return(Some(p)));
                Ok(seq(effects))
            }
            S::If { cond, then, els } => {
                let (mut effects, pc) = self.expr(cond)?;
                let then = self.stmt(then)?;
                let els = match els {
                    Some(e) => self.stmt(e)?,
                    None => Stmt::Skip,
                };
                effects.push(Stmt::If(pc, Box::new(then), Box::new(els)));
                Ok(seq(effects))
            }
            S::While { cond, body } => {
                let (cond_effects, pc) = self.expr(cond)?;
                let body = self.stmt(body)?;
                let mut loop_body = cond_effects;
                loop_body.push(Stmt::If(pc, Box::new(body), Box::new(Stmt::Break)));
                Ok(Stmt::Loop(Box::new(seq(loop_body)), Box::new(Stmt::Skip)))
            }
            S::DoWhile { body, cond } => {
                let body = self.stmt(body)?;
                let (cond_effects, pc) = self.expr(cond)?;
                let mut loop_body = vec![body];
                loop_body.extend(cond_effects);
                loop_body.push(Stmt::If(pc, Box::new(Stmt::Skip), Box::new(Stmt::Break)));
                Ok(Stmt::Loop(Box::new(seq(loop_body)), Box::new(Stmt::Skip)))
            }
            S::For {
                init,
                cond,
                step,
                body,
            } => {
                let init_stmt = match init {
                    cabs::ForInit::None => Stmt::Skip,
                    cabs::ForInit::Expr(e) => {
                        let (effects, _) = self.expr(e)?;
                        seq(effects)
                    }
                    cabs::ForInit::Decls(decls) => self.decl_stmts(decls)?,
                };
                let body = self.stmt(body)?;
                let loop_body = match cond {
                    Some(c) => {
                        let (mut effects, pc) = self.expr(c)?;
                        effects.push(Stmt::If(pc, Box::new(body), Box::new(Stmt::Break)));
                        seq(effects)
                    }
                    None => body,
                };
                let continue_body = match step {
                    Some(e) => {
                        let (effects, _) = self.expr(e)?;
                        seq(effects)
                    }
                    None => Stmt::Skip,
                };
                Ok(seq(vec![
                    init_stmt,
                    Stmt::Loop(Box::new(loop_body), Box::new(continue_body)),
                ]))
            }
            S::Switch { expr, cases } => {
                let (mut effects, pe) = self.expr(expr)?;
                let mut arms = Vec::with_capacity(cases.len());
                for case in cases {
                    let value = match &case.value {
                        Some(e) => Some(self.const_eval(e)?),
                        None => None,
                    };
                    let mut body = Vec::with_capacity(case.body.len());
                    for s in &case.body {
                        body.push(self.stmt(s)?);
                    }
                    arms.push(SwitchArm {
                        value,
                        body: seq(body),
                    });
                }
                effects.push(Stmt::Switch(pe, arms));
                Ok(seq(effects))
            }
            S::Break => Ok(Stmt::Break),
            S::Continue => Ok(Stmt::Continue),
            S::Goto(label) => Ok(Stmt::Goto(label.clone())),
            S::Label(name, inner) => {
                let inner = self.stmt(inner)?;
                Ok(Stmt::Label(name.clone(), Box::new(inner)))
            }
        }
    }

    fn decl_stmts(&mut self, decls: &[cabs::Decl]) -> Result<Stmt, ElabError> {
        let mut out = Vec::new();
        for d in decls {
            let ty = self.env.resolve_with_dims(&d.type_spec, &d.array_dims)?;
            self.vars.insert(d.name.clone(), ty.clone());
            self.locals.push((d.name.clone(), ty.clone()));
            if let Some(init) = &d.init {
                let (effects, p) = self.expr(init)?;
                out.extend(effects);
                let p = coerce(p, &ty);
                out.push(Stmt::Assign(
                    Expr::new(ExprKind::Var(d.name.clone()), ty),
                    p,
                ));
            }
        }
        Ok(seq(out))
    }

    // -- expressions --------------------------------------------------------

    /// Translate an expression into `(effects, pure)`.
    fn expr(&mut self, e: &cabs::Expr) -> Result<(Vec<Stmt>, Expr), ElabError> {
        use cabs::Expr as E;
        match e {
            E::Constant(v) => Ok((Vec::new(), int_const(*v))),
            E::CharLiteral(text) => Ok((Vec::new(), int_const(decode_char(text)))),
            E::StringLiteral(s) => Ok((
                Vec::new(),
                Expr::new(
                    ExprKind::ConstString(s.clone()),
                    CType::pointer(CType::char()),
                ),
            )),
            E::Paren(inner) => self.expr(inner),
            E::Variable(name) => {
                if let Some(v) = self.env.enum_consts.get(name) {
                    return Ok((Vec::new(), int_const(*v)));
                }
                let ty = self.var_type(name)?;
                Ok((Vec::new(), Expr::new(ExprKind::Var(name.clone()), ty)))
            }
            E::Unary { op, expr } => self.unary(*op, expr),
            E::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            E::Conditional { cond, then, els } => {
                let (mut effects, pc) = self.expr(cond)?;
                let (then_effects, pt) = self.expr(then)?;
                let (els_effects, pe) = self.expr(els)?;
                let ty = pt.ty.clone();
                let pe = coerce(pe, &ty);
                let t = self.fresh(ty.clone());
                let mut then_branch = then_effects;
                then_branch.push(Stmt::Set(t, pt));
                let mut els_branch = els_effects;
                els_branch.push(Stmt::Set(t, pe));
                effects.push(Stmt::If(
                    pc,
                    Box::new(seq(then_branch)),
                    Box::new(seq(els_branch)),
                ));
                Ok((effects, Expr::temp(t, ty)))
            }
            E::Cast { type_spec, expr } => {
                let ty = self.env.resolve(type_spec)?;
                let (effects, p) = self.expr(expr)?;
                let p = if p.ty == ty {
                    p
                } else {
                    Expr::new(ExprKind::Cast(Box::new(p)), ty)
                };
                Ok((effects, p))
            }
            E::Call { func, args } => self.call(func, args),
            E::Index { .. } | E::Member { .. } => self.lvalue(e),
            E::SizeofType(spec) => {
                let ty = self.env.resolve(spec)?;
                Ok((
                    Vec::new(),
                    Expr::new(ExprKind::Sizeof(ty), CType::unsigned_long()),
                ))
            }
            E::SizeofExpr(inner) => {
                // The operand of sizeof is not evaluated: effects are dropped.
                let (_, p) = self.expr(inner)?;
                Ok((
                    Vec::new(),
                    Expr::new(ExprKind::Sizeof(p.ty), CType::unsigned_long()),
                ))
            }
        }
    }

    fn var_type(&self, name: &str) -> Result<CType, ElabError> {
        if let Some(ty) = self.vars.get(name) {
            return Ok(ty.clone());
        }
        if let Some(ty) = self.env.globals.get(name) {
            return Ok(ty.clone());
        }
        Err(ElabError::UnknownVariable {
            name: name.to_string(),
        })
    }

    fn unary(
        &mut self,
        op: cabs::UnaryOp,
        operand: &cabs::Expr,
    ) -> Result<(Vec<Stmt>, Expr), ElabError> {
        use cabs::UnaryOp as U;
        match op {
            U::Neg | U::BitNot => {
                let (effects, p) = self.expr(operand)?;
                if !p.ty.is_integer() && !p.ty.is_float() {
                    return Err(ElabError::InvalidOperands {
                        op: if op == U::Neg { "-" } else { "~" }.to_string(),
                    });
                }
                let ty = promote(&p.ty);
                let unop = if op == U::Neg { Unop::Neg } else { Unop::BitNot };
                Ok((effects, Expr::new(ExprKind::Unop(unop, Box::new(p)), ty)))
            }
            U::LogNot => {
                let (effects, p) = self.expr(operand)?;
                Ok((
                    effects,
                    Expr::new(ExprKind::Unop(Unop::LogNot, Box::new(p)), CType::int()),
                ))
            }
            U::Addr => {
                let (effects, lv) = self.lvalue(operand)?;
                let ty = CType::pointer(lv.ty.clone());
                Ok((effects, Expr::new(ExprKind::Addrof(Box::new(lv)), ty)))
            }
            U::Deref => {
                let (effects, p) = self.expr(operand)?;
                let elem = p.ty.pointee().cloned().ok_or_else(|| ElabError::NotAPointer {
                    ty: p.ty.to_string(),
                })?;
                Ok((effects, Expr::new(ExprKind::Deref(Box::new(p)), elem)))
            }
            U::PreInc => self.incdec(operand, Binop::Add, true),
            U::PreDec => self.incdec(operand, Binop::Sub, true),
            U::PostInc => self.incdec(operand, Binop::Add, false),
            U::PostDec => self.incdec(operand, Binop::Sub, false),
        }
    }

    /// `++e` / `e++` and friends. Pre forms yield the updated value (a
    /// re-read of the lvalue); post forms snapshot the old value first.
    fn incdec(
        &mut self,
        operand: &cabs::Expr,
        op: Binop,
        pre: bool,
    ) -> Result<(Vec<Stmt>, Expr), ElabError> {
        let (mut effects, lv) = self.lvalue(operand)?;
        let one = int_const(1);
        if pre {
            let val = self.arith(op, lv.clone(), one)?;
            let val = coerce(val, &lv.ty);
            effects.push(Stmt::Assign(lv.clone(), val));
            Ok((effects, lv))
        } else {
            let t = self.fresh(lv.ty.clone());
            effects.push(Stmt::Set(t, lv.clone()));
            let snapshot = Expr::temp(t, lv.ty.clone());
            let val = self.arith(op, snapshot.clone(), one)?;
            let val = coerce(val, &lv.ty);
            effects.push(Stmt::Assign(lv, val));
            Ok((effects, snapshot))
        }
    }

    fn binary(
        &mut self,
        op: cabs::BinaryOp,
        lhs: &cabs::Expr,
        rhs: &cabs::Expr,
    ) -> Result<(Vec<Stmt>, Expr), ElabError> {
        use cabs::BinaryOp as B;
        match op {
            B::Comma => {
                let (mut effects, _) = self.expr(lhs)?;
                let (rhs_effects, p) = self.expr(rhs)?;
                effects.extend(rhs_effects);
                Ok((effects, p))
            }
            B::LogAnd => {
                let (mut effects, p1) = self.expr(lhs)?;
                let (rhs_effects, p2) = self.expr(rhs)?;
                let t = self.fresh(CType::int());
                let mut then_branch = rhs_effects;
                then_branch.push(Stmt::Set(t, bool_of(p2)));
                let els_branch = Stmt::Set(t, int_const(0));
                effects.push(Stmt::If(
                    p1,
                    Box::new(seq(then_branch)),
                    Box::new(els_branch),
                ));
                Ok((effects, Expr::temp(t, CType::int())))
            }
            B::LogOr => {
                let (mut effects, p1) = self.expr(lhs)?;
                let (rhs_effects, p2) = self.expr(rhs)?;
                let t = self.fresh(CType::int());
                let then_branch = Stmt::Set(t, int_const(1));
                let mut els_branch = rhs_effects;
                els_branch.push(Stmt::Set(t, bool_of(p2)));
                effects.push(Stmt::If(
                    p1,
                    Box::new(then_branch),
                    Box::new(seq(els_branch)),
                ));
                Ok((effects, Expr::temp(t, CType::int())))
            }
            B::Assign => {
                // Right-hand side first, then the left-hand address.
                let (mut effects, pr) = self.expr(rhs)?;
                let (lhs_effects, pl) = self.lvalue(lhs)?;
                effects.extend(lhs_effects);
                let pr = coerce(pr, &pl.ty);
                effects.push(Stmt::Assign(pl, pr.clone()));
                Ok((effects, pr))
            }
            _ if op.compound_base().is_some() => {
                let base = clight_binop(op.compound_base().unwrap());
                let (mut effects, pl) = self.lvalue(lhs)?;
                let (rhs_effects, pr) = self.expr(rhs)?;
                effects.extend(rhs_effects);
                let val = self.arith(base, pl.clone(), pr)?;
                let val = coerce(val, &pl.ty);
                effects.push(Stmt::Assign(pl, val.clone()));
                Ok((effects, val))
            }
            _ => {
                let (mut effects, p1) = self.expr(lhs)?;
                let (rhs_effects, p2) = self.expr(rhs)?;
                effects.extend(rhs_effects);
                let result = self.arith(clight_binop(op), p1, p2)?;
                Ok((effects, result))
            }
        }
    }

    /// Type a pure binary operation, inserting widening casts where the
    /// operand classes differ and scaling-free pointer arithmetic (the
    /// scaling itself happens in the Csharpminor lowering, where layout is
    /// known).
    fn arith(&mut self, op: Binop, p1: Expr, p2: Expr) -> Result<Expr, ElabError> {
        // Pointer arithmetic.
        if matches!(op, Binop::Add | Binop::Sub) {
            let ptr_left = p1.ty.is_pointerish();
            let ptr_right = p2.ty.is_pointerish();
            if ptr_left && ptr_right {
                if op == Binop::Sub {
                    let ty = CType::Long {
                        sign: Signedness::Signed,
                    };
                    return Ok(Expr::new(
                        ExprKind::Binop(op, Box::new(p1), Box::new(p2)),
                        ty,
                    ));
                }
                return Err(ElabError::InvalidOperands {
                    op: "+".to_string(),
                });
            }
            if ptr_left || ptr_right {
                // Normalize the pointer to the left.
                let (base, offset) = if ptr_left { (p1, p2) } else { (p2, p1) };
                let elem = base.ty.pointee().cloned().unwrap_or(CType::Void);
                let ty = CType::pointer(elem);
                return Ok(Expr::new(
                    ExprKind::Binop(op, Box::new(base), Box::new(offset)),
                    ty,
                ));
            }
        }

        // Comparisons produce int; operands are widened to a common class.
        if let Some(cond_ty) = comparison_result(op) {
            let (p1, p2) = widen_pair(p1, p2);
            return Ok(Expr::new(
                ExprKind::Binop(op, Box::new(p1), Box::new(p2)),
                cond_ty,
            ));
        }

        // Shifts take the promoted left type.
        if matches!(op, Binop::Shl | Binop::Shr) {
            let ty = promote(&p1.ty);
            let p1 = coerce(p1, &ty);
            return Ok(Expr::new(
                ExprKind::Binop(op, Box::new(p1), Box::new(p2)),
                ty,
            ));
        }

        let ty = arith_result(&p1.ty, &p2.ty);
        let p1 = widen(p1, &ty);
        let p2 = widen(p2, &ty);
        Ok(Expr::new(
            ExprKind::Binop(op, Box::new(p1), Box::new(p2)),
            ty,
        ))
    }

    fn call(
        &mut self,
        func: &cabs::Expr,
        args: &[cabs::Expr],
    ) -> Result<(Vec<Stmt>, Expr), ElabError> {
        let (mut effects, pf) = self.expr(func)?;
        let fnty = match &pf.ty {
            CType::Function { .. } => pf.ty.clone(),
            CType::Pointer(inner) if matches!(**inner, CType::Function { .. }) => {
                (**inner).clone()
            }
            _ => {
                return Err(ElabError::NotAFunction {
                    name: crate::clight::print::expr_str(&pf),
                })
            }
        };
        let (ret, param_types) = match &fnty {
            CType::Function { ret, params, .. } => ((**ret).clone(), params.clone()),
            _ => unreachable!(),
        };

        let mut lowered_args = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let (arg_effects, pa) = self.expr(arg)?;
            effects.extend(arg_effects);
            let pa = match param_types.get(i) {
                Some(target) if target.is_scalar() => coerce(pa, target),
                _ => pa,
            };
            lowered_args.push(pa);
        }

        if ret.is_void() {
            effects.push(Stmt::Call(None, pf, lowered_args));
            Ok((effects, Expr::new(ExprKind::ConstInt(0), CType::Void)))
        } else {
            let t = self.fresh(ret.clone());
            effects.push(Stmt::Call(Some(t), pf, lowered_args));
            Ok((effects, Expr::temp(t, ret)))
        }
    }

    /// Translate an expression in lvalue position, yielding the lvalue
    /// expression itself (reads happen by context in Clight).
    fn lvalue(&mut self, e: &cabs::Expr) -> Result<(Vec<Stmt>, Expr), ElabError> {
        use cabs::Expr as E;
        match e {
            E::Paren(inner) => self.lvalue(inner),
            E::Variable(name) => {
                let ty = self.var_type(name)?;
                Ok((Vec::new(), Expr::new(ExprKind::Var(name.clone()), ty)))
            }
            E::Unary {
                op: cabs::UnaryOp::Deref,
                expr,
            } => {
                let (effects, p) = self.expr(expr)?;
                let elem = p.ty.pointee().cloned().ok_or_else(|| ElabError::NotAPointer {
                    ty: p.ty.to_string(),
                })?;
                Ok((effects, Expr::new(ExprKind::Deref(Box::new(p)), elem)))
            }
            E::Index { base, index } => {
                let (mut effects, pb) = self.expr(base)?;
                let (idx_effects, pi) = self.expr(index)?;
                effects.extend(idx_effects);
                let elem = pb.ty.pointee().cloned().ok_or_else(|| ElabError::NotAPointer {
                    ty: pb.ty.to_string(),
                })?;
                let addr_ty = CType::pointer(elem.clone());
                let addr = Expr::new(
                    ExprKind::Binop(Binop::Add, Box::new(pb), Box::new(pi)),
                    addr_ty,
                );
                Ok((effects, Expr::new(ExprKind::Deref(Box::new(addr)), elem)))
            }
            E::Member {
                base,
                member,
                arrow,
            } => {
                if *arrow {
                    let (effects, pb) = self.expr(base)?;
                    let inner_ty = pb.ty.pointee().cloned().ok_or_else(|| {
                        ElabError::NotAPointer {
                            ty: pb.ty.to_string(),
                        }
                    })?;
                    let fty = self.field_type(&inner_ty, member)?;
                    let obj = Expr::new(ExprKind::Deref(Box::new(pb)), inner_ty);
                    Ok((
                        effects,
                        Expr::new(ExprKind::Field(Box::new(obj), member.clone()), fty),
                    ))
                } else {
                    let (effects, pl) = self.lvalue(base)?;
                    let fty = self.field_type(&pl.ty.clone(), member)?;
                    Ok((
                        effects,
                        Expr::new(ExprKind::Field(Box::new(pl), member.clone()), fty),
                    ))
                }
            }
            _ => Err(ElabError::NotAnLvalue),
        }
    }

    fn field_type(&self, ty: &CType, field: &str) -> Result<CType, ElabError> {
        match ty {
            CType::Struct(name) | CType::Union(name) => {
                Ok(self.env.composites.field(name, field)?.1)
            }
            other => Err(ElabError::UnknownField {
                composite: other.to_string(),
                field: field.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Typing helpers
// ---------------------------------------------------------------------------

fn int_const(v: i64) -> Expr {
    let ty = if i64::from(v as i32) == v {
        CType::int()
    } else {
        CType::Long {
            sign: Signedness::Signed,
        }
    };
    Expr::const_int(v, ty)
}

/// `e != 0` as an int, for short-circuit results.
fn bool_of(e: Expr) -> Expr {
    Expr::new(
        ExprKind::Binop(Binop::Ne, Box::new(e), Box::new(int_const(0))),
        CType::int(),
    )
}

fn clight_binop(op: cabs::BinaryOp) -> Binop {
    use cabs::BinaryOp as B;
    match op {
        B::Add => Binop::Add,
        B::Sub => Binop::Sub,
        B::Mul => Binop::Mul,
        B::Div => Binop::Div,
        B::Rem => Binop::Mod,
        B::BitAnd => Binop::And,
        B::BitOr => Binop::Or,
        B::BitXor => Binop::Xor,
        B::Shl => Binop::Shl,
        B::Shr => Binop::Shr,
        B::Eq => Binop::Eq,
        B::Ne => Binop::Ne,
        B::Lt => Binop::Lt,
        B::Le => Binop::Le,
        B::Gt => Binop::Gt,
        B::Ge => Binop::Ge,
        other => unreachable!("not an arithmetic operator: {:?}", other),
    }
}

fn comparison_result(op: Binop) -> Option<CType> {
    match op {
        Binop::Eq | Binop::Ne | Binop::Lt | Binop::Le | Binop::Gt | Binop::Ge => {
            Some(CType::int())
        }
        _ => None,
    }
}

/// Integer promotion: sub-int types go to int, everything else stays.
fn promote(ty: &CType) -> CType {
    match ty {
        CType::Int { size, .. } if !matches!(size, IntSize::I32) => CType::int(),
        other => other.clone(),
    }
}

/// The usual-arithmetic-conversions result class.
fn arith_result(t1: &CType, t2: &CType) -> CType {
    if t1.is_float() || t2.is_float() {
        return CType::Float64;
    }
    let unsigned = matches!(
        t1,
        CType::Int {
            size: IntSize::I32,
            sign: Signedness::Unsigned
        } | CType::Long {
            sign: Signedness::Unsigned
        }
    ) || matches!(
        t2,
        CType::Int {
            size: IntSize::I32,
            sign: Signedness::Unsigned
        } | CType::Long {
            sign: Signedness::Unsigned
        }
    );
    let sign = if unsigned {
        Signedness::Unsigned
    } else {
        Signedness::Signed
    };
    if matches!(t1, CType::Long { .. }) || matches!(t2, CType::Long { .. }) {
        CType::Long { sign }
    } else {
        CType::Int {
            size: IntSize::I32,
            sign,
        }
    }
}

/// Insert an explicit cast when the target type differs.
fn coerce(e: Expr, to: &CType) -> Expr {
    if &e.ty == to || to.is_void() || !to.is_scalar() {
        e
    } else {
        Expr::new(ExprKind::Cast(Box::new(e)), to.clone())
    }
}

/// Widen an operand to the result class when the 64-bit-ness differs; narrow
/// int-class differences are resolved by the loads themselves.
fn widen(e: Expr, to: &CType) -> Expr {
    let from_wide = matches!(e.ty, CType::Long { .. });
    let to_wide = matches!(to, CType::Long { .. });
    if from_wide != to_wide && e.ty.is_integer() {
        Expr::new(ExprKind::Cast(Box::new(e)), to.clone())
    } else {
        e
    }
}

fn widen_pair(p1: Expr, p2: Expr) -> (Expr, Expr) {
    if p1.ty.is_integer() && p2.ty.is_integer() {
        let common = arith_result(&p1.ty, &p2.ty);
        (widen(p1, &common), widen(p2, &common))
    } else {
        (p1, p2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clight::{ExprKind as K, Stmt as S};
    use mcc_syntax::parser::parse_translation_unit;

    fn lower(src: &str) -> Program {
        let cabs = parse_translation_unit(src, "t.c").expect("parse");
        simpl_expr(&cabs).expect("simpl_expr")
    }

    fn only_fn(p: &Program) -> &Function {
        assert_eq!(p.functions.len(), 1);
        &p.functions[0]
    }

    /// Walk all expressions in a statement tree.
    fn exprs_of<'a>(s: &'a Stmt, out: &mut Vec<&'a Expr>) {
        match s {
            S::Skip | S::Break | S::Continue | S::Goto(_) | S::Return(None) => {}
            S::Assign(a, b) => {
                out.push(a);
                out.push(b);
            }
            S::Set(_, e) | S::Return(Some(e)) => out.push(e),
            S::Call(_, f, args) => {
                out.push(f);
                out.extend(args.iter());
            }
            S::Seq(a, b) => {
                exprs_of(a, out);
                exprs_of(b, out);
            }
            S::If(c, a, b) => {
                out.push(c);
                exprs_of(a, out);
                exprs_of(b, out);
            }
            S::Loop(a, b) => {
                exprs_of(a, out);
                exprs_of(b, out);
            }
            S::Switch(e, arms) => {
                out.push(e);
                for arm in arms {
                    exprs_of(&arm.body, out);
                }
            }
            S::Label(_, inner) => exprs_of(inner, out),
        }
    }

    #[test]
    fn short_circuit_and_is_desugared() {
        let p = lower("int f(int x) { return x && x; }");
        let f = only_fn(&p);
        // No && remains: the body is an if with temp assignments.
        let mut found_if = false;
        fn find_if(s: &Stmt, found: &mut bool) {
            match s {
                S::If(_, t, e) => {
                    *found = true;
                    find_if(t, found);
                    find_if(e, found);
                }
                S::Seq(a, b) => {
                    find_if(a, found);
                    find_if(b, found);
                }
                _ => {}
            }
        }
        find_if(&f.body, &mut found_if);
        assert!(found_if, "expected an if from && desugaring");
        assert_eq!(f.temps.len(), 1);
    }

    #[test]
    fn post_increment_snapshots_old_value() {
        let p = lower("int f() { int x; x = 1; return x++; }");
        let f = only_fn(&p);
        // One temp for the snapshot.
        assert_eq!(f.temps.len(), 1);
        // The return value is the temp, not the variable.
        fn find_return(s: &Stmt) -> Option<&Expr> {
            match s {
                S::Return(Some(e)) => Some(e),
                S::Seq(a, b) => find_return(a).or_else(|| find_return(b)),
                _ => None,
            }
        }
        let ret = find_return(&f.body).expect("return");
        assert!(matches!(ret.kind, K::Temp(_)));
    }

    #[test]
    fn call_result_lands_in_temp() {
        let p = lower("int g(int x); int f() { return g(1) + 2; }");
        let f = only_fn(&p);
        assert_eq!(f.temps.len(), 1);
        let mut exprs = Vec::new();
        exprs_of(&f.body, &mut exprs);
        assert_eq!(p.externals.len(), 1);
        assert_eq!(p.externals[0].0, "g");
    }

    #[test]
    fn while_desugars_to_canonical_loop() {
        let p = lower("int f() { int i; i = 0; while (i < 10) { i = i + 1; } return i; }");
        let f = only_fn(&p);
        fn find_loop(s: &Stmt) -> Option<(&Stmt, &Stmt)> {
            match s {
                S::Loop(b, c) => Some((b, c)),
                S::Seq(a, b) => find_loop(a).or_else(|| find_loop(b)),
                _ => None,
            }
        }
        let (body, cont) = find_loop(&f.body).expect("loop");
        assert!(matches!(cont, S::Skip));
        // Body is if (i < 10) { ... } else break.
        match body {
            S::If(_, _, els) => assert!(matches!(**els, S::Break)),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn for_step_goes_to_continue_body() {
        let p = lower("int f() { for (int i = 0; i < 10; i++) { } return 0; }");
        let f = only_fn(&p);
        fn find_loop(s: &Stmt) -> Option<(&Stmt, &Stmt)> {
            match s {
                S::Loop(b, c) => Some((b, c)),
                S::Seq(a, b) => find_loop(a).or_else(|| find_loop(b)),
                _ => None,
            }
        }
        let (body, cont) = find_loop(&f.body).expect("loop");
        assert!(!matches!(cont, S::Skip), "step must be in continue_body");
        match body {
            S::If(_, _, els) => assert!(matches!(**els, S::Break)),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn no_side_effects_remain_in_expressions() {
        let p = lower(
            "int g(int x); int f(int a, int b) { int r; r = (a = 2) + g(b) + (a ? b : 3); return r; }",
        );
        let f = only_fn(&p);
        let mut exprs = Vec::new();
        exprs_of(&f.body, &mut exprs);
        // Pure expressions only: no assignment or call can be represented in
        // ExprKind at all, so it suffices that lowering succeeded and each
        // conditional/call value flows through a temp.
        assert!(f.temps.len() >= 2);
    }

    #[test]
    fn string_literal_types_as_char_pointer() {
        let p = lower("int puts(char *s); int f() { puts(\"hi\"); return 0; }");
        let f = only_fn(&p);
        let mut exprs = Vec::new();
        exprs_of(&f.body, &mut exprs);
        let s = exprs
            .iter()
            .flat_map(|e| collect_kinds(e))
            .find(|e| matches!(e.kind, K::ConstString(_)))
            .expect("string literal");
        assert_eq!(s.ty, CType::pointer(CType::char()));
    }

    fn collect_kinds(e: &Expr) -> Vec<&Expr> {
        let mut out = vec![e];
        match &e.kind {
            K::Deref(a) | K::Addrof(a) | K::Unop(_, a) | K::Cast(a) | K::Field(a, _) => {
                out.extend(collect_kinds(a))
            }
            K::Binop(_, a, b) => {
                out.extend(collect_kinds(a));
                out.extend(collect_kinds(b));
            }
            _ => {}
        }
        out
    }

    #[test]
    fn enum_constants_fold() {
        let p = lower("enum E { A, B = 5, C }; int f() { return C; }");
        let f = only_fn(&p);
        fn find_return(s: &Stmt) -> Option<&Expr> {
            match s {
                S::Return(Some(e)) => Some(e),
                S::Seq(a, b) => find_return(a).or_else(|| find_return(b)),
                _ => None,
            }
        }
        let ret = find_return(&f.body).expect("return");
        assert!(matches!(ret.kind, K::ConstInt(6)));
    }

    #[test]
    fn member_access_through_pointer() {
        let p = lower("struct P { int x; int y; }; int f(struct P *p) { return p->y; }");
        let f = only_fn(&p);
        fn find_return(s: &Stmt) -> Option<&Expr> {
            match s {
                S::Return(Some(e)) => Some(e),
                S::Seq(a, b) => find_return(a).or_else(|| find_return(b)),
                _ => None,
            }
        }
        let ret = find_return(&f.body).expect("return");
        match &ret.kind {
            K::Field(base, name) => {
                assert_eq!(name, "y");
                assert!(matches!(base.kind, K::Deref(_)));
            }
            other => panic!("expected field access, got {:?}", other),
        }
    }

    #[test]
    fn int_long_mixing_gets_explicit_cast() {
        let p = lower("long f(int x, long y) { return x + y; }");
        let f = only_fn(&p);
        fn find_return(s: &Stmt) -> Option<&Expr> {
            match s {
                S::Return(Some(e)) => Some(e),
                S::Seq(a, b) => find_return(a).or_else(|| find_return(b)),
                _ => None,
            }
        }
        let ret = find_return(&f.body).expect("return");
        match &ret.kind {
            K::Binop(Binop::Add, lhs, _) => {
                assert!(matches!(lhs.kind, K::Cast(_)), "int side must be cast");
            }
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn sizeof_operand_is_not_evaluated() {
        let p = lower("int f() { int x; x = 0; return sizeof(x++); }");
        let f = only_fn(&p);
        // The x++ inside sizeof produced no temp and no assignment.
        assert_eq!(f.temps.len(), 1, "only the discarded snapshot temp");
        // No assign of x besides the explicit x = 0.
        fn count_assigns(s: &Stmt) -> usize {
            match s {
                S::Assign(..) => 1,
                S::Seq(a, b) => count_assigns(a) + count_assigns(b),
                S::If(_, a, b) => count_assigns(a) + count_assigns(b),
                S::Loop(a, b) => count_assigns(a) + count_assigns(b),
                _ => 0,
            }
        }
        assert_eq!(count_assigns(&f.body), 1);
    }
}
