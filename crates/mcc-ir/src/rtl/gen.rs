//! RTL generation from CminorSel.
//!
//! Statements are translated backwards: `stmt(s, succ)` returns the entry
//! node of code that performs `s` and falls through to `succ`, so node ids
//! count up from the function exit toward the entry. Loops reserve their
//! back-edge node before translating the body; labels are reserved on first
//! mention (from either `goto` or the label itself) and filled when the
//! labeled statement is reached — an unfilled reservation at the end is an
//! undefined label. Unreachable nodes (dead code after `return`, unused
//! implicit exits) are pruned before the function is returned.

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::clight::TempId;
use crate::cminorsel as sel;
use crate::error::LowerError;
use crate::ops::{Cond, Condition, Op, Width};

use super::{CallTarget, Function, Instr, NodeId, Program, Reg};

pub fn generate_program(p: &sel::Program) -> Result<Program, LowerError> {
    let mut functions = Vec::with_capacity(p.functions.len());
    for f in &p.functions {
        functions.push(generate_function(f)?);
    }
    Ok(Program {
        functions,
        globals: p.globals.clone(),
        strings: p.strings.clone(),
    })
}

pub fn generate_function(f: &sel::Function) -> Result<Function, LowerError> {
    let mut gen = Gen {
        fname: &f.name,
        nodes: IndexMap::new(),
        next_node: 1,
        next_reg: 1,
        temp_regs: IndexMap::new(),
        exits: Vec::new(),
        labels: IndexMap::new(),
        filled_labels: IndexSet::new(),
    };

    // Parameters claim the first registers, in order.
    let params: Vec<Reg> = f.params.iter().map(|t| gen.reg_of(*t)).collect();

    // Implicit return for control that falls off the end; pruned when
    // everything returns explicitly.
    let fallthrough = gen.new_node(Instr::Return(None));
    let entry = gen.stmt(&f.body, fallthrough)?;

    for (label, node) in &gen.labels {
        if !gen.filled_labels.contains(label.as_str()) {
            let _ = node;
            return Err(LowerError::UndefinedLabel {
                function: f.name.clone(),
                label: label.clone(),
            });
        }
    }

    let nodes = gen.finish(entry);
    debug!(function = %f.name, nodes = nodes.len(), "generated RTL");
    Ok(Function {
        name: f.name.clone(),
        sig: f.sig.clone(),
        params,
        entry,
        nodes,
        stack_size: f.stack_size,
    })
}

struct Gen<'a> {
    fname: &'a str,
    /// `None` marks a reserved-but-unfilled node.
    nodes: IndexMap<NodeId, Option<Instr>>,
    next_node: u32,
    next_reg: u32,
    temp_regs: IndexMap<TempId, Reg>,
    /// Exit targets for `Exit(n)`, innermost last.
    exits: Vec<NodeId>,
    labels: IndexMap<String, NodeId>,
    filled_labels: IndexSet<String>,
}

impl<'a> Gen<'a> {
    fn new_node(&mut self, instr: Instr) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Some(instr));
        id
    }

    fn reserve(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, None);
        id
    }

    fn fill(&mut self, id: NodeId, instr: Instr) {
        let slot = self.nodes.get_mut(&id).expect("filling unknown node");
        assert!(slot.is_none(), "node {} filled twice", id);
        *slot = Some(instr);
    }

    fn fresh_reg(&mut self) -> Reg {
        let r = Reg(self.next_reg);
        self.next_reg += 1;
        r
    }

    fn reg_of(&mut self, t: TempId) -> Reg {
        if let Some(r) = self.temp_regs.get(&t) {
            return *r;
        }
        let r = self.fresh_reg();
        self.temp_regs.insert(t, r);
        r
    }

    fn label_node(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.labels.get(name) {
            return *id;
        }
        let id = self.reserve();
        self.labels.insert(name.to_string(), id);
        id
    }

    /// Unwrap filled nodes and drop everything unreachable from the entry.
    fn finish(self, entry: NodeId) -> IndexMap<NodeId, Instr> {
        let filled: IndexMap<NodeId, Instr> = self
            .nodes
            .into_iter()
            .map(|(id, instr)| (id, instr.expect("reserved node never filled")))
            .collect();
        let mut reachable = IndexSet::new();
        let mut work = vec![entry];
        while let Some(id) = work.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(instr) = filled.get(&id) {
                work.extend(instr.successors());
            }
        }
        filled
            .into_iter()
            .filter(|(id, _)| reachable.contains(id))
            .collect()
    }

    // -- statements ---------------------------------------------------------

    fn stmt(&mut self, s: &sel::Stmt, succ: NodeId) -> Result<NodeId, LowerError> {
        use sel::Stmt as S;
        match s {
            S::Skip => Ok(succ),
            S::Seq(a, b) => {
                let nb = self.stmt(b, succ)?;
                self.stmt(a, nb)
            }
            S::Set(t, e) => {
                let dst = self.reg_of(*t);
                self.expr(e, dst, succ)
            }
            S::Store(chunk, mode, addr_args, value) => {
                let addr_regs = self.pick_regs(addr_args);
                let src = self.pick_reg(value);
                let store = self.new_node(Instr::Store {
                    chunk: *chunk,
                    addr: mode.clone(),
                    args: addr_regs.clone(),
                    src,
                    succ,
                });
                // Address operands first, then the stored value.
                let after_addr = self.eval_into(value, src, store)?;
                self.chain(addr_args, &addr_regs, after_addr)
            }
            S::Call(dest, sig, callee, args) => {
                let arg_regs = self.pick_regs(args);
                let (target, callee_eval) = match callee {
                    sel::Expr::Op(Op::AddrSymbol(name), a) if a.is_empty() => {
                        (CallTarget::Symbol(name.clone()), None)
                    }
                    other => {
                        let r = self.pick_reg(other);
                        (CallTarget::Reg(r), Some((other, r)))
                    }
                };
                let dest_reg = dest.map(|t| self.reg_of(t));
                let call = self.new_node(Instr::Call {
                    sig: sig.clone(),
                    target,
                    args: arg_regs.to_vec(),
                    dest: dest_reg,
                    succ,
                });
                let after_callee = self.chain(args, &arg_regs, call)?;
                match callee_eval {
                    Some((e, r)) => self.eval_into(e, r, after_callee),
                    None => Ok(after_callee),
                }
            }
            S::If(cond, then, els) => {
                let nt = self.stmt(then, succ)?;
                let nf = self.stmt(els, succ)?;
                self.cond(cond, nt, nf)
            }
            S::Loop(body) => {
                let back = self.reserve();
                let body_entry = self.stmt(body, back)?;
                self.fill(back, Instr::Nop(body_entry));
                Ok(back)
            }
            S::Block(body) => {
                self.exits.push(succ);
                let entry = self.stmt(body, succ)?;
                self.exits.pop();
                Ok(entry)
            }
            S::Exit(n) => {
                let idx = self
                    .exits
                    .len()
                    .checked_sub(1 + *n as usize)
                    .unwrap_or_else(|| {
                        panic!("exit {} with only {} blocks in {}", n, self.exits.len(), self.fname)
                    });
                Ok(self.exits[idx])
            }
            S::Switch(e, arms) => self.switch(e, arms, succ),
            S::Return(None) => Ok(self.new_node(Instr::Return(None))),
            S::Return(Some(e)) => {
                let r = self.pick_reg(e);
                let ret = self.new_node(Instr::Return(Some(r)));
                self.eval_into(e, r, ret)
            }
            S::Label(name, inner) => {
                let entry = self.stmt(inner, succ)?;
                let label = self.label_node(name);
                self.fill(label, Instr::Nop(entry));
                self.filled_labels.insert(name.clone());
                Ok(label)
            }
            S::Goto(name) => Ok(self.label_node(name)),
        }
    }

    fn switch(
        &mut self,
        selector: &sel::Expr,
        arms: &[(Option<i64>, sel::Stmt)],
        succ: NodeId,
    ) -> Result<NodeId, LowerError> {
        let sel_reg = self.pick_reg(selector);

        // Arm bodies fall through to the next arm; translate back-to-front.
        let mut next = succ;
        let mut entries: Vec<(Option<i64>, NodeId)> = Vec::with_capacity(arms.len());
        for (value, body) in arms.iter().rev() {
            let entry = self.stmt(body, next)?;
            entries.push((*value, entry));
            next = entry;
        }
        entries.reverse();

        let default_entry = entries
            .iter()
            .find(|(v, _)| v.is_none())
            .map(|(_, n)| *n)
            .unwrap_or(succ);
        let cases: Vec<(i64, NodeId)> = entries
            .iter()
            .filter_map(|(v, n)| v.map(|v| (v, *n)))
            .collect();

        let dispatch = if let Some(targets) = dense_from_zero(&cases) {
            let table = self.new_node(Instr::Jumptable {
                arg: sel_reg,
                targets,
            });
            self.new_node(Instr::Cond {
                cond: Condition::CompUImm(Cond::Lt, Width::W32, cases.len() as i64),
                args: SmallVec::from_slice(&[sel_reg]),
                iftrue: table,
                iffalse: default_entry,
            })
        } else {
            let mut acc = default_entry;
            for (value, entry) in cases.iter().rev() {
                acc = self.new_node(Instr::Cond {
                    cond: Condition::CompImm(Cond::Eq, Width::W32, *value),
                    args: SmallVec::from_slice(&[sel_reg]),
                    iftrue: *entry,
                    iffalse: acc,
                });
            }
            acc
        };
        self.eval_into(selector, sel_reg, dispatch)
    }

    fn cond(
        &mut self,
        ce: &sel::CondExpr,
        iftrue: NodeId,
        iffalse: NodeId,
    ) -> Result<NodeId, LowerError> {
        let regs = self.pick_regs(&ce.args);
        let node = self.new_node(Instr::Cond {
            cond: ce.cond,
            args: regs.clone(),
            iftrue,
            iffalse,
        });
        self.chain(&ce.args, &regs, node)
    }

    // -- expressions --------------------------------------------------------

    /// Evaluate `e` into `dst`, entering at the returned node and flowing to
    /// `succ`. Evaluating a temporary into its own register is a no-op.
    fn expr(&mut self, e: &sel::Expr, dst: Reg, succ: NodeId) -> Result<NodeId, LowerError> {
        match e {
            sel::Expr::Temp(t) => {
                let src = self.reg_of(*t);
                if src == dst {
                    Ok(succ)
                } else {
                    Ok(self.new_node(Instr::Op {
                        op: Op::Move,
                        args: SmallVec::from_slice(&[src]),
                        dest: dst,
                        succ,
                    }))
                }
            }
            sel::Expr::Op(op, args) => {
                let regs = self.pick_regs(args);
                let node = self.new_node(Instr::Op {
                    op: op.clone(),
                    args: regs.clone(),
                    dest: dst,
                    succ,
                });
                self.chain(args, &regs, node)
            }
            sel::Expr::Load(chunk, mode, args) => {
                let regs = self.pick_regs(args);
                let node = self.new_node(Instr::Load {
                    chunk: *chunk,
                    addr: mode.clone(),
                    args: regs.clone(),
                    dest: dst,
                    succ,
                });
                self.chain(args, &regs, node)
            }
        }
    }

    /// Evaluate `e` into `r` unless it is already the temporary bound to `r`.
    fn eval_into(&mut self, e: &sel::Expr, r: Reg, succ: NodeId) -> Result<NodeId, LowerError> {
        match e {
            sel::Expr::Temp(t) if self.reg_of(*t) == r => Ok(succ),
            _ => self.expr(e, r, succ),
        }
    }

    /// The register each argument will occupy: temporaries keep their own
    /// register, other expressions get a fresh one.
    fn pick_regs(&mut self, args: &[sel::Expr]) -> SmallVec<[Reg; 2]> {
        args.iter().map(|a| self.pick_reg(a)).collect()
    }

    fn pick_reg(&mut self, e: &sel::Expr) -> Reg {
        match e {
            sel::Expr::Temp(t) => self.reg_of(*t),
            _ => self.fresh_reg(),
        }
    }

    /// Chain the evaluation of non-temporary arguments, leftmost first, in
    /// front of `succ`.
    fn chain(
        &mut self,
        args: &[sel::Expr],
        regs: &[Reg],
        succ: NodeId,
    ) -> Result<NodeId, LowerError> {
        let mut entry = succ;
        for (a, r) in args.iter().zip(regs.iter()).rev() {
            if !matches!(a, sel::Expr::Temp(_)) {
                entry = self.expr(a, *r, entry)?;
            }
        }
        Ok(entry)
    }
}

/// If the case values are exactly `0..n`, the jump-table targets in value
/// order; otherwise `None`.
fn dense_from_zero(cases: &[(i64, NodeId)]) -> Option<Vec<NodeId>> {
    if cases.len() < 3 {
        return None;
    }
    let mut targets = vec![None; cases.len()];
    for (value, node) in cases {
        let idx = usize::try_from(*value).ok()?;
        if idx >= targets.len() || targets[idx].is_some() {
            return None;
        }
        targets[idx] = Some(*node);
    }
    targets.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cminor;
    use crate::cminorsel::select::select_program;
    use crate::csharpminor;
    use crate::rtl::validate;
    use crate::simplexpr::simpl_expr;
    use crate::simpllocals::simpl_locals;
    use mcc_syntax::parser::parse_translation_unit;

    fn rtl_of(src: &str) -> Program {
        let cabs = parse_translation_unit(src, "t.c").expect("parse");
        let clight = simpl_expr(&cabs).expect("simpl_expr");
        let clight = simpl_locals(&clight);
        let cshm = csharpminor::lower::lower_program(&clight).expect("cshm");
        let cm = cminor::lower::lower_program(&cshm).expect("cminor");
        let selp = select_program(&cm);
        generate_program(&selp).expect("rtl")
    }

    #[test]
    fn simple_add_is_one_op_and_return() {
        let p = rtl_of("int add(int a, int b) { return a + b; }");
        let f = &p.functions[0];
        assert_eq!(f.params.len(), 2);
        assert!(validate(f).is_empty());

        let ops: Vec<&Instr> = f.nodes.values().collect();
        assert_eq!(ops.len(), 2, "one add and one return: {:?}", ops);
        let add = f
            .nodes
            .values()
            .find_map(|i| match i {
                Instr::Op { op: Op::Add(_), args, dest, .. } => Some((args.clone(), *dest)),
                _ => None,
            })
            .expect("an add instruction");
        assert_eq!(add.0.as_slice(), f.params.as_slice());
        let ret = f.nodes.values().find_map(|i| match i {
            Instr::Return(Some(r)) => Some(*r),
            _ => None,
        });
        assert_eq!(ret, Some(add.1));
    }

    #[test]
    fn return_zero_generates_constant() {
        let p = rtl_of("int main() { return 0; }");
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
        assert!(f
            .nodes
            .values()
            .any(|i| matches!(i, Instr::Op { op: Op::IntConst(0), .. })));
        // The implicit fallthrough return was pruned.
        assert_eq!(
            f.nodes
                .values()
                .filter(|i| matches!(i, Instr::Return(_)))
                .count(),
            1
        );
    }

    #[test]
    fn branches_share_the_join_point() {
        let p = rtl_of("int f(int x) { if (x) { return 1; } return 0; }");
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
        assert!(f
            .nodes
            .values()
            .any(|i| matches!(i, Instr::Cond { .. })));
    }

    #[test]
    fn loops_produce_a_back_edge() {
        let p = rtl_of("int f() { int i; for (i = 0; i < 3; i++) { } return i; }");
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
        // Some node's successor has a higher id than itself (the back edge).
        let back_edge = f.nodes.iter().any(|(id, instr)| {
            instr.successors().iter().any(|s| s.0 > id.0)
        });
        assert!(back_edge, "expected a back edge in {:?}", f.nodes);
    }

    #[test]
    fn goto_resolves_to_label() {
        let p = rtl_of("int f() { int x; x = 0; again: x++; if (x < 3) goto again; return x; }");
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
    }

    #[test]
    fn undefined_label_is_an_error() {
        let cabs = parse_translation_unit("int f() { goto nowhere; return 0; }", "t.c").unwrap();
        let clight = simpl_expr(&cabs).unwrap();
        let clight = simpl_locals(&clight);
        let cshm = csharpminor::lower::lower_program(&clight).unwrap();
        let cm = cminor::lower::lower_program(&cshm).unwrap();
        let selp = select_program(&cm);
        assert!(matches!(
            generate_program(&selp),
            Err(LowerError::UndefinedLabel { .. })
        ));
    }

    #[test]
    fn dense_switch_uses_a_jump_table() {
        let p = rtl_of(
            "int f(int x) { switch (x) { case 0: return 10; case 1: return 11; case 2: return 12; default: return 0; } }",
        );
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
        assert!(f
            .nodes
            .values()
            .any(|i| matches!(i, Instr::Jumptable { .. })));
    }

    #[test]
    fn sparse_switch_uses_a_compare_chain() {
        let p = rtl_of(
            "int f(int x) { switch (x) { case 10: return 1; case 100: return 2; default: return 0; } }",
        );
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
        assert!(!f
            .nodes
            .values()
            .any(|i| matches!(i, Instr::Jumptable { .. })));
        assert!(f
            .nodes
            .values()
            .any(|i| matches!(
                i,
                Instr::Cond { cond: Condition::CompImm(Cond::Eq, _, 10), .. }
            )));
    }

    #[test]
    fn call_arguments_and_result() {
        let p = rtl_of("int g(int x); int f() { return g(41) + 1; }");
        let f = &p.functions[0];
        assert!(validate(f).is_empty());
        let call = f.nodes.values().find_map(|i| match i {
            Instr::Call { target, args, dest, .. } => Some((target.clone(), args.len(), *dest)),
            _ => None,
        });
        let (target, argc, dest) = call.expect("a call");
        assert_eq!(target, CallTarget::Symbol("g".to_string()));
        assert_eq!(argc, 1);
        assert!(dest.is_some());
    }

    #[test]
    fn whole_corpus_validates() {
        for src in [
            "int f() { int a[4]; int i; for (i = 0; i < 4; i++) { a[i] = i * 2; } return a[3]; }",
            "struct P { int x; int y; }; int f(struct P *p) { return p->x + p->y; }",
            "int f(int n) { int r; r = 1; while (n > 1) { r = r * n; n = n - 1; } return r; }",
            "int f(int x) { return x && x || !x; }",
            "int f() { int x; int *p; x = 3; p = &x; *p = 4; return x; }",
        ] {
            let p = rtl_of(src);
            for f in &p.functions {
                assert!(validate(f).is_empty(), "validation failed for {}", src);
            }
        }
    }
}
