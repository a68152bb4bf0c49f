//! Linear-scan register allocation over RTL virtual registers.
//!
//! Instructions are linearized in descending node-id order (generation order
//! approximates execution order). Each virtual register gets one interval
//! from its first to its last occurrence; intervals are walked in start
//! order and greedily assigned from the free pool, spilling to numbered
//! frame slots when the pool runs dry.
//!
//! Register conventions:
//! - leaf functions allocate from the caller-saved set: the argument
//!   registers x0..x7 not pinned by parameters, then x9..x14;
//! - non-leaf functions allocate from the callee-saved set x19..x27, so
//!   values are safe across calls; parameters are moved out of x0..x7 in
//!   the prologue;
//! - x15, x16 and x17 are never allocated; the emitter uses them as
//!   scratch for spills and expansions.
//!
//! Intervals are imprecise (single span, no holes) which costs registers,
//! never correctness: a wider interval only over-reserves.

use indexmap::IndexMap;
use tracing::debug;

use mcc_ir::rtl::{Function, Instr, NodeId, Reg};

/// Where a virtual register lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    /// Physical register number (`x<n>`/`w<n>`).
    Phys(u8),
    /// Spill slot index; the emitter turns this into a frame offset.
    Spill(u32),
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub locs: IndexMap<Reg, Loc>,
    pub spill_slots: u32,
    /// Callee-saved registers the prologue must save, ascending.
    pub used_callee_saved: Vec<u8>,
    pub is_leaf: bool,
    /// Linearized emission order, descending node id.
    pub order: Vec<NodeId>,
}

impl Allocation {
    pub fn loc(&self, r: Reg) -> Loc {
        *self
            .locs
            .get(&r)
            .unwrap_or_else(|| panic!("virtual register {} was never allocated", r))
    }
}

pub fn allocate(f: &Function) -> Allocation {
    let mut order: Vec<NodeId> = f.nodes.keys().copied().collect();
    order.sort_by(|a, b| b.cmp(a));

    let is_leaf = !f
        .nodes
        .values()
        .any(|i| matches!(i, Instr::Call { .. } | Instr::Tailcall { .. }));

    // Occurrence intervals. Parameters are live from function entry.
    let mut intervals: IndexMap<Reg, (usize, usize)> = IndexMap::new();
    for p in &f.params {
        intervals.insert(*p, (0, 0));
    }
    for (pos, id) in order.iter().enumerate() {
        for r in regs_of(&f.nodes[id]) {
            let entry = intervals.entry(r).or_insert((pos, pos));
            entry.0 = entry.0.min(pos);
            entry.1 = entry.1.max(pos);
        }
    }

    let mut locs: IndexMap<Reg, Loc> = IndexMap::new();
    let mut pool: Vec<u8> = Vec::new();
    if is_leaf {
        // Parameters stay pinned in their argument registers.
        for (i, p) in f.params.iter().enumerate() {
            locs.insert(*p, Loc::Phys(i as u8));
        }
        pool.extend((f.params.len() as u8)..8);
        pool.extend(9..15);
    } else {
        pool.extend(19..28);
    }

    // Linear scan over the remaining intervals in start order.
    let mut todo: Vec<(Reg, usize, usize)> = intervals
        .iter()
        .filter(|(r, _)| !locs.contains_key(*r))
        .map(|(r, (s, e))| (*r, *s, *e))
        .collect();
    todo.sort_by_key(|(r, s, _)| (*s, r.0));

    let mut active: Vec<(usize, u8)> = Vec::new(); // (end, phys)
    let mut spill_slots = 0u32;
    let mut used: Vec<u8> = Vec::new();
    for (r, start, end) in todo {
        active.retain(|(e, _)| *e >= start);
        let in_use: Vec<u8> = active.iter().map(|(_, p)| *p).collect();
        match pool.iter().copied().find(|p| !in_use.contains(p)) {
            Some(phys) => {
                locs.insert(r, Loc::Phys(phys));
                active.push((end, phys));
                if !is_leaf && !used.contains(&phys) {
                    used.push(phys);
                }
            }
            None => {
                locs.insert(r, Loc::Spill(spill_slots));
                spill_slots += 1;
            }
        }
    }
    used.sort_unstable();

    debug!(
        function = %f.name,
        vregs = locs.len(),
        spills = spill_slots,
        leaf = is_leaf,
        "allocated registers"
    );
    Allocation {
        locs,
        spill_slots,
        used_callee_saved: used,
        is_leaf,
        order,
    }
}

/// All virtual registers an instruction mentions.
fn regs_of(i: &Instr) -> Vec<Reg> {
    use mcc_ir::rtl::CallTarget;
    match i {
        Instr::Nop(_) => vec![],
        Instr::Op { args, dest, .. } | Instr::Load { args, dest, .. } => {
            let mut v: Vec<Reg> = args.to_vec();
            v.push(*dest);
            v
        }
        Instr::Store { args, src, .. } => {
            let mut v: Vec<Reg> = args.to_vec();
            v.push(*src);
            v
        }
        Instr::Call {
            target, args, dest, ..
        } => {
            let mut v = args.clone();
            if let CallTarget::Reg(r) = target {
                v.push(*r);
            }
            if let Some(d) = dest {
                v.push(*d);
            }
            v
        }
        Instr::Tailcall { target, args, .. } => {
            let mut v = args.clone();
            if let CallTarget::Reg(r) = target {
                v.push(*r);
            }
            v
        }
        Instr::Cond { args, .. } => args.to_vec(),
        Instr::Jumptable { arg, .. } => vec![*arg],
        Instr::Return(r) => r.iter().copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use mcc_ir::ops::{Mtype, Op, Signature, Width};
    use smallvec::smallvec;

    fn sig(n: usize) -> Signature {
        Signature {
            params: vec![Mtype::I32; n],
            ret: Some(Mtype::I32),
            variadic: false,
        }
    }

    #[test]
    fn leaf_params_stay_in_argument_registers() {
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId(1), Instr::Return(Some(Reg(3))));
        nodes.insert(
            NodeId(2),
            Instr::Op {
                op: Op::Add(Width::W32),
                args: smallvec![Reg(1), Reg(2)],
                dest: Reg(3),
                succ: NodeId(1),
            },
        );
        let f = Function {
            name: "add".into(),
            sig: sig(2),
            params: vec![Reg(1), Reg(2)],
            entry: NodeId(2),
            nodes,
            stack_size: 0,
        };
        let alloc = allocate(&f);
        assert!(alloc.is_leaf);
        assert_eq!(alloc.loc(Reg(1)), Loc::Phys(0));
        assert_eq!(alloc.loc(Reg(2)), Loc::Phys(1));
        assert_eq!(alloc.spill_slots, 0);
    }

    #[test]
    fn no_param_leaf_uses_x0_first() {
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId(1), Instr::Return(Some(Reg(1))));
        nodes.insert(
            NodeId(2),
            Instr::Op {
                op: Op::IntConst(0),
                args: smallvec![],
                dest: Reg(1),
                succ: NodeId(1),
            },
        );
        let f = Function {
            name: "main".into(),
            sig: sig(0),
            params: vec![],
            entry: NodeId(2),
            nodes,
            stack_size: 0,
        };
        let alloc = allocate(&f);
        assert_eq!(alloc.loc(Reg(1)), Loc::Phys(0));
    }

    #[test]
    fn many_live_values_spill() {
        // Twenty constants defined up front and only consumed afterwards are
        // all live at once, overflowing the 14-register leaf pool.
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId(1), Instr::Return(None));
        // Consumers at ids 2..=11: add j reads r(2j+1), r(2j+2).
        for j in 0..10u32 {
            nodes.insert(
                NodeId(11 - j),
                Instr::Op {
                    op: Op::Add(Width::W32),
                    args: smallvec![Reg(2 * j + 1), Reg(2 * j + 2)],
                    dest: Reg(21 + j),
                    succ: NodeId(11 - j - 1),
                },
            );
        }
        // Definitions at ids 12..=31: def of r(k) at id 31-(k-1).
        for k in 1..=20u32 {
            nodes.insert(
                NodeId(31 - (k - 1)),
                Instr::Op {
                    op: Op::IntConst(k as i64),
                    args: smallvec![],
                    dest: Reg(k),
                    succ: NodeId(31 - k),
                },
            );
        }
        let f = Function {
            name: "f".into(),
            sig: sig(0),
            params: vec![],
            entry: NodeId(31),
            nodes,
            stack_size: 0,
        };
        let alloc = allocate(&f);
        assert!(alloc.spill_slots > 0, "expected spills, got {:?}", alloc);
    }

    #[test]
    fn non_leaf_uses_callee_saved() {
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId(1), Instr::Return(Some(Reg(1))));
        nodes.insert(
            NodeId(2),
            Instr::Call {
                sig: sig(0),
                target: mcc_ir::rtl::CallTarget::Symbol("g".into()),
                args: vec![],
                dest: Some(Reg(1)),
                succ: NodeId(1),
            },
        );
        let f = Function {
            name: "f".into(),
            sig: sig(0),
            params: vec![],
            entry: NodeId(2),
            nodes,
            stack_size: 0,
        };
        let alloc = allocate(&f);
        assert!(!alloc.is_leaf);
        match alloc.loc(Reg(1)) {
            Loc::Phys(p) => assert!((19..28).contains(&p)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(alloc.used_callee_saved, vec![19]);
    }
}
