//! ARM64 text emission.
//!
//! Each function runs through the states prologue, body emission, epilogue;
//! the epilogue is re-entered once per return instruction. 32-bit operations
//! use `w` register names, 64-bit operations and addresses use `x`.
//!
//! Frame layout, growing down from the saved fp/lr pair:
//!
//! ```text
//! [x29]                    saved fp, lr
//! [sp + csave_base ..]     saved callee-saved registers (non-leaf)
//! [sp + locals_base ..]    the Cminor stack block (locals)
//! [sp + 0 ..]              spill slots
//! ```
//!
//! Platform differences are confined to this module: Darwin output prefixes
//! global symbols with `_` and uses `@PAGE`/`@PAGEOFF` relocations where
//! Linux uses `:lo12:`.

use std::fmt::Write;

use indexmap::IndexSet;
use tracing::debug;

use mcc_ir::ctypes::Chunk;
use mcc_ir::ops::{Addressing, Cond, Condition, Op, Width};
use mcc_ir::rtl::{CallTarget, Function, Instr, NodeId, Program, Reg};

use crate::regalloc::{allocate, Allocation, Loc};
use crate::EmitError;

/// Output flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Linux,
    Darwin,
}

impl Flavor {
    /// The flavor of the machine we are running on.
    pub fn host() -> Flavor {
        if cfg!(target_os = "macos") {
            Flavor::Darwin
        } else {
            Flavor::Linux
        }
    }

    /// Assembly-level name of a global symbol.
    fn sym(self, name: &str) -> String {
        match self {
            Flavor::Linux => name.to_string(),
            Flavor::Darwin => format!("_{}", name),
        }
    }

    fn rodata(self) -> &'static str {
        match self {
            Flavor::Linux => ".section .rodata",
            Flavor::Darwin => ".section __TEXT,__const",
        }
    }

    fn cstring_section(self) -> &'static str {
        match self {
            Flavor::Linux => ".section .rodata",
            Flavor::Darwin => ".section __TEXT,__cstring,cstring_literals",
        }
    }
}

/// Scratch registers never touched by the allocator.
const SCRATCH0: u8 = 16;
const SCRATCH1: u8 = 17;
const SCRATCH2: u8 = 15;

pub fn emit_program(p: &Program, flavor: Flavor) -> Result<String, EmitError> {
    let mut out = String::new();
    push(&mut out, ".text");
    for f in &p.functions {
        emit_function(&mut out, f, flavor)?;
    }

    let init: Vec<_> = p.globals.iter().filter(|g| g.init.is_some()).collect();
    if !init.is_empty() {
        push(&mut out, ".data");
        for g in init {
            let (chunk, value) = g.init.unwrap();
            if chunk.is_float() {
                return Err(EmitError::UnsupportedFloat {
                    context: format!("initializer of '{}'", g.name),
                });
            }
            let sym = flavor.sym(&g.name);
            push(&mut out, &format!(".balign {}", g.align.max(1)));
            push(&mut out, &format!(".global {}", sym));
            let _ = writeln!(out, "{}:", sym);
            let directive = match chunk.size() {
                1 => ".byte",
                2 => ".hword",
                4 => ".word",
                _ => ".quad",
            };
            push(&mut out, &format!("{} {}", directive, value));
        }
    }
    for g in p.globals.iter().filter(|g| g.init.is_none()) {
        let sym = flavor.sym(&g.name);
        match flavor {
            Flavor::Linux => push(
                &mut out,
                &format!(".comm {},{},{}", sym, g.size, g.align.max(1)),
            ),
            Flavor::Darwin => push(
                &mut out,
                &format!(".comm {},{},{}", sym, g.size, log2(g.align.max(1))),
            ),
        }
    }

    if !p.strings.is_empty() {
        push(&mut out, flavor.cstring_section());
        for (i, s) in p.strings.iter().enumerate() {
            let _ = writeln!(out, ".Lstr{}:", i);
            push(&mut out, &format!(".asciz \"{}\"", s));
        }
    }
    Ok(out)
}

fn log2(mut n: u64) -> u32 {
    let mut k = 0;
    while n > 1 {
        n >>= 1;
        k += 1;
    }
    k
}

fn push(out: &mut String, line: &str) {
    let _ = writeln!(out, "\t{}", line);
}

fn emit_function(out: &mut String, f: &Function, flavor: Flavor) -> Result<(), EmitError> {
    let alloc = allocate(f);
    let spill_bytes = u64::from(alloc.spill_slots) * 8;
    let locals_base = spill_bytes;
    let csave_base = spill_bytes + f.stack_size;
    let raw_frame = csave_base + alloc.used_callee_saved.len() as u64 * 8;
    let frame = raw_frame.div_ceil(16) * 16;

    let mut e = FnEmitter {
        f,
        alloc,
        flavor,
        out,
        frame,
        locals_base,
        csave_base,
        tables: Vec::new(),
    };
    e.run()?;
    debug!(function = %f.name, frame, "emitted function");
    Ok(())
}

struct FnEmitter<'a> {
    f: &'a Function,
    alloc: Allocation,
    flavor: Flavor,
    out: &'a mut String,
    frame: u64,
    locals_base: u64,
    csave_base: u64,
    /// Jump tables to flush after the body: (label, targets).
    tables: Vec<(String, Vec<NodeId>)>,
}

impl<'a> FnEmitter<'a> {
    fn ins(&mut self, text: &str) {
        let _ = writeln!(self.out, "\t{}", text);
    }

    fn label_of(&self, node: NodeId) -> String {
        format!(".L{}_{}", self.f.name, node)
    }

    fn run(&mut self) -> Result<(), EmitError> {
        let order = self.alloc.order.clone();
        let labeled = self.collect_labels(&order);

        // Prologue.
        let sym = self.flavor.sym(&self.f.name);
        self.ins(".balign 4");
        self.ins(&format!(".global {}", sym));
        let _ = writeln!(self.out, "{}:", sym);
        self.ins("stp x29, x30, [sp, #-16]!");
        self.ins("mov x29, sp");
        if self.frame > 0 {
            if self.frame <= 4095 {
                self.ins(&format!("sub sp, sp, #{}", self.frame));
            } else {
                self.ins(&format!("mov x{}, #{}", SCRATCH0, self.frame));
                self.ins(&format!("sub sp, sp, x{}", SCRATCH0));
            }
        }
        for (i, reg) in self.alloc.used_callee_saved.clone().iter().enumerate() {
            let off = self.csave_base + i as u64 * 8;
            self.ins(&format!("str x{}, [sp, #{}]", reg, off));
        }
        if !self.alloc.is_leaf {
            for (i, p) in self.f.params.iter().enumerate() {
                match self.alloc.loc(*p) {
                    Loc::Phys(d) => self.ins(&format!("mov x{}, x{}", d, i)),
                    Loc::Spill(slot) => {
                        self.ins(&format!("str x{}, [sp, #{}]", i, slot as u64 * 8))
                    }
                }
            }
        }
        if order.first() != Some(&self.f.entry) {
            let l = self.label_of(self.f.entry);
            self.ins(&format!("b {}", l));
        }

        // Body.
        for (i, id) in order.iter().enumerate() {
            let next = order.get(i + 1).copied();
            if labeled.contains(id) {
                let l = self.label_of(*id);
                let _ = writeln!(self.out, "{}:", l);
            }
            let instr = self.f.nodes[id].clone();
            self.instr(&instr, next)?;
            if let Some(succ) = fallthrough(&instr) {
                if Some(succ) != next {
                    let l = self.label_of(succ);
                    self.ins(&format!("b {}", l));
                }
            }
        }

        // Jump tables, if any.
        if !self.tables.is_empty() {
            self.ins(self.flavor.rodata());
            self.ins(".balign 8");
            for (label, targets) in self.tables.clone() {
                let _ = writeln!(self.out, "{}:", label);
                for t in targets {
                    let l = self.label_of(t);
                    self.ins(&format!(".quad {}", l));
                }
            }
            self.ins(".text");
        }
        Ok(())
    }

    /// Nodes that need a label: anything entered by an explicit branch.
    fn collect_labels(&self, order: &[NodeId]) -> IndexSet<NodeId> {
        let mut labeled = IndexSet::new();
        for (i, id) in order.iter().enumerate() {
            let next = order.get(i + 1).copied();
            for succ in self.f.nodes[id].successors() {
                if Some(succ) != next {
                    labeled.insert(succ);
                }
            }
        }
        if order.first() != Some(&self.f.entry) {
            labeled.insert(self.f.entry);
        }
        labeled
    }

    // -- operand plumbing ---------------------------------------------------

    /// Physical register holding `r`, loading spilled values into `scratch`.
    fn use_phys(&mut self, r: Reg, scratch: u8) -> u8 {
        match self.alloc.loc(r) {
            Loc::Phys(p) => p,
            Loc::Spill(slot) => {
                self.ins(&format!("ldr x{}, [sp, #{}]", scratch, slot as u64 * 8));
                scratch
            }
        }
    }

    /// Physical register to compute a result into, plus the spill slot it
    /// must be stored to afterwards.
    fn def_phys(&self, r: Reg) -> (u8, Option<u32>) {
        match self.alloc.loc(r) {
            Loc::Phys(p) => (p, None),
            Loc::Spill(slot) => (SCRATCH0, Some(slot)),
        }
    }

    fn flush_def(&mut self, spill: Option<u32>) {
        if let Some(slot) = spill {
            self.ins(&format!("str x{}, [sp, #{}]", SCRATCH0, slot as u64 * 8));
        }
    }

    // -- instructions -------------------------------------------------------

    fn instr(&mut self, instr: &Instr, next: Option<NodeId>) -> Result<(), EmitError> {
        match instr {
            Instr::Nop(_) => Ok(()),
            Instr::Op { op, args, dest, .. } => {
                let a: Vec<u8> = args
                    .iter()
                    .enumerate()
                    .map(|(i, r)| self.use_phys(*r, if i == 0 { SCRATCH0 } else { SCRATCH1 }))
                    .collect();
                let (d, spill) = self.def_phys(*dest);
                self.op(op, &a, d)?;
                self.flush_def(spill);
                Ok(())
            }
            Instr::Load {
                chunk, addr, args, dest, ..
            } => {
                let a: Vec<u8> = args
                    .iter()
                    .enumerate()
                    .map(|(i, r)| self.use_phys(*r, if i == 0 { SCRATCH0 } else { SCRATCH1 }))
                    .collect();
                let (mnemonic, w) = load_insn(*chunk)?;
                let operand = self.addr_operand(addr, &a);
                let (d, spill) = self.def_phys(*dest);
                self.ins(&format!("{} {}, {}", mnemonic, rn(d, w), operand));
                self.flush_def(spill);
                Ok(())
            }
            Instr::Store {
                chunk, addr, args, src, ..
            } => {
                let a: Vec<u8> = args
                    .iter()
                    .enumerate()
                    .map(|(i, r)| self.use_phys(*r, if i == 0 { SCRATCH0 } else { SCRATCH1 }))
                    .collect();
                let s = self.use_phys(*src, SCRATCH2);
                let (mnemonic, w) = store_insn(*chunk)?;
                let operand = self.addr_operand(addr, &a);
                self.ins(&format!("{} {}, {}", mnemonic, rn(s, w), operand));
                Ok(())
            }
            Instr::Call {
                target, args, dest, ..
            } => {
                if args.len() > 8 {
                    return Err(EmitError::TooManyArgs {
                        function: self.f.name.clone(),
                        count: args.len(),
                    });
                }
                for (i, r) in args.iter().enumerate() {
                    let p = self.use_phys(*r, SCRATCH0);
                    if p != i as u8 {
                        self.ins(&format!("mov x{}, x{}", i, p));
                    }
                }
                match target {
                    CallTarget::Symbol(name) => {
                        let s = self.flavor.sym(name);
                        self.ins(&format!("bl {}", s));
                    }
                    CallTarget::Reg(r) => {
                        let p = self.use_phys(*r, SCRATCH0);
                        self.ins(&format!("blr x{}", p));
                    }
                }
                if let Some(d) = dest {
                    match self.alloc.loc(*d) {
                        Loc::Phys(p) => {
                            if p != 0 {
                                self.ins(&format!("mov x{}, x0", p));
                            }
                        }
                        Loc::Spill(slot) => {
                            self.ins(&format!("str x0, [sp, #{}]", slot as u64 * 8))
                        }
                    }
                }
                Ok(())
            }
            Instr::Tailcall { target, args, .. } => {
                if args.len() > 8 {
                    return Err(EmitError::TooManyArgs {
                        function: self.f.name.clone(),
                        count: args.len(),
                    });
                }
                for (i, r) in args.iter().enumerate() {
                    let p = self.use_phys(*r, SCRATCH0);
                    if p != i as u8 {
                        self.ins(&format!("mov x{}, x{}", i, p));
                    }
                }
                self.epilogue_restore();
                match target {
                    CallTarget::Symbol(name) => {
                        let s = self.flavor.sym(name);
                        self.ins(&format!("b {}", s));
                    }
                    CallTarget::Reg(r) => {
                        let p = self.use_phys(*r, SCRATCH0);
                        self.ins(&format!("br x{}", p));
                    }
                }
                Ok(())
            }
            Instr::Cond {
                cond, args, iftrue, iffalse,
            } => {
                let a: Vec<u8> = args
                    .iter()
                    .enumerate()
                    .map(|(i, r)| self.use_phys(*r, if i == 0 { SCRATCH0 } else { SCRATCH1 }))
                    .collect();
                self.compare(cond, &a);
                if next == Some(*iffalse) {
                    let l = self.label_of(*iftrue);
                    self.ins(&format!("b.{} {}", cc(cond), l));
                } else if next == Some(*iftrue) {
                    let l = self.label_of(*iffalse);
                    self.ins(&format!("b.{} {}", cc(&cond.negate()), l));
                } else {
                    let lt = self.label_of(*iftrue);
                    let lf = self.label_of(*iffalse);
                    self.ins(&format!("b.{} {}", cc(cond), lt));
                    self.ins(&format!("b {}", lf));
                }
                Ok(())
            }
            Instr::Jumptable { arg, targets } => {
                let p = self.use_phys(*arg, SCRATCH2);
                let label = format!(".Ljt_{}_{}", self.f.name, self.tables.len());
                self.page_address(SCRATCH0, &label);
                self.ins(&format!(
                    "ldr x{}, [x{}, w{}, uxtw #3]",
                    SCRATCH1, SCRATCH0, p
                ));
                self.ins(&format!("br x{}", SCRATCH1));
                self.tables.push((label, targets.clone()));
                Ok(())
            }
            Instr::Return(value) => {
                if let Some(r) = value {
                    let p = self.use_phys(*r, SCRATCH0);
                    if p != 0 {
                        self.ins(&format!("mov x0, x{}", p));
                    }
                }
                self.epilogue_restore();
                self.ins("ret");
                Ok(())
            }
        }
    }

    fn epilogue_restore(&mut self) {
        for (i, reg) in self.alloc.used_callee_saved.clone().iter().enumerate() {
            let off = self.csave_base + i as u64 * 8;
            self.ins(&format!("ldr x{}, [sp, #{}]", reg, off));
        }
        if self.frame > 0 {
            self.ins("mov sp, x29");
        }
        self.ins("ldp x29, x30, [sp], #16");
    }

    // -- operations ---------------------------------------------------------

    fn op(&mut self, op: &Op, a: &[u8], d: u8) -> Result<(), EmitError> {
        match op {
            Op::IntConst(v) => {
                self.mov_const(d, *v, Width::W32);
                Ok(())
            }
            Op::LongConst(v) => {
                self.mov_const(d, *v, Width::W64);
                Ok(())
            }
            Op::FloatConst(_) => Err(EmitError::UnsupportedFloat {
                context: format!("constant in '{}'", self.f.name),
            }),
            Op::AddrSymbol(name) => {
                let s = self.flavor.sym(name);
                self.page_address(d, &s);
                Ok(())
            }
            Op::AddrString(i) => {
                let label = format!(".Lstr{}", i);
                self.page_address(d, &label);
                Ok(())
            }
            Op::AddrStack(off) => {
                let total = self.locals_base as i64 + off;
                if (0..=4095).contains(&total) {
                    self.ins(&format!("add x{}, sp, #{}", d, total));
                } else {
                    self.mov_const(SCRATCH1, total, Width::W64);
                    self.ins(&format!("add x{}, sp, x{}", d, SCRATCH1));
                }
                Ok(())
            }
            Op::Move => {
                if d != a[0] {
                    self.ins(&format!("mov x{}, x{}", d, a[0]));
                }
                Ok(())
            }
            Op::Add(w) => {
                self.three("add", *w, d, a);
                Ok(())
            }
            Op::AddImm(w, n) => {
                if *n >= 0 {
                    self.ins(&format!("add {}, {}, #{}", rn(d, *w), rn(a[0], *w), n));
                } else {
                    self.ins(&format!("sub {}, {}, #{}", rn(d, *w), rn(a[0], *w), -n));
                }
                Ok(())
            }
            Op::AddLsl(w, k) => {
                self.ins(&format!(
                    "add {}, {}, {}, lsl #{}",
                    rn(d, *w),
                    rn(a[0], *w),
                    rn(a[1], *w),
                    k
                ));
                Ok(())
            }
            Op::Sub(w) => {
                self.three("sub", *w, d, a);
                Ok(())
            }
            Op::Mul(w) => {
                self.three("mul", *w, d, a);
                Ok(())
            }
            Op::Div(w) => {
                self.three("sdiv", *w, d, a);
                Ok(())
            }
            Op::Divu(w) => {
                self.three("udiv", *w, d, a);
                Ok(())
            }
            Op::Rem(w) => {
                self.rem("sdiv", *w, d, a);
                Ok(())
            }
            Op::Remu(w) => {
                self.rem("udiv", *w, d, a);
                Ok(())
            }
            Op::And(w) => {
                self.three("and", *w, d, a);
                Ok(())
            }
            Op::Or(w) => {
                self.three("orr", *w, d, a);
                Ok(())
            }
            Op::Xor(w) => {
                self.three("eor", *w, d, a);
                Ok(())
            }
            Op::Shl(w) => {
                self.three("lsl", *w, d, a);
                Ok(())
            }
            Op::ShlImm(w, k) => {
                self.ins(&format!("lsl {}, {}, #{}", rn(d, *w), rn(a[0], *w), k));
                Ok(())
            }
            Op::Shr(w) => {
                self.three("asr", *w, d, a);
                Ok(())
            }
            Op::ShrImm(w, k) => {
                self.ins(&format!("asr {}, {}, #{}", rn(d, *w), rn(a[0], *w), k));
                Ok(())
            }
            Op::Shru(w) => {
                self.three("lsr", *w, d, a);
                Ok(())
            }
            Op::ShruImm(w, k) => {
                self.ins(&format!("lsr {}, {}, #{}", rn(d, *w), rn(a[0], *w), k));
                Ok(())
            }
            Op::Neg(w) => {
                self.ins(&format!("neg {}, {}", rn(d, *w), rn(a[0], *w)));
                Ok(())
            }
            Op::Not(w) => {
                self.ins(&format!("mvn {}, {}", rn(d, *w), rn(a[0], *w)));
                Ok(())
            }
            Op::Cast8s => {
                self.ins(&format!("sxtb w{}, w{}", d, a[0]));
                Ok(())
            }
            Op::Cast8u => {
                self.ins(&format!("uxtb w{}, w{}", d, a[0]));
                Ok(())
            }
            Op::Cast16s => {
                self.ins(&format!("sxth w{}, w{}", d, a[0]));
                Ok(())
            }
            Op::Cast16u => {
                self.ins(&format!("uxth w{}, w{}", d, a[0]));
                Ok(())
            }
            Op::Cast32s => {
                self.ins(&format!("sxtw x{}, w{}", d, a[0]));
                Ok(())
            }
            Op::Cast32u => {
                self.ins(&format!("mov w{}, w{}", d, a[0]));
                Ok(())
            }
            Op::Cmp(cond) => {
                self.compare(cond, a);
                self.ins(&format!("cset w{}, {}", d, cc(cond)));
                Ok(())
            }
        }
    }

    fn three(&mut self, mnemonic: &str, w: Width, d: u8, a: &[u8]) {
        self.ins(&format!(
            "{} {}, {}, {}",
            mnemonic,
            rn(d, w),
            rn(a[0], w),
            rn(a[1], w)
        ));
    }

    /// `a % b` via divide and multiply-subtract, through a scratch register.
    fn rem(&mut self, div: &str, w: Width, d: u8, a: &[u8]) {
        self.ins(&format!(
            "{} {}, {}, {}",
            div,
            rn(SCRATCH2, w),
            rn(a[0], w),
            rn(a[1], w)
        ));
        self.ins(&format!(
            "msub {}, {}, {}, {}",
            rn(d, w),
            rn(SCRATCH2, w),
            rn(a[1], w),
            rn(a[0], w)
        ));
    }

    fn compare(&mut self, cond: &Condition, a: &[u8]) {
        let w = cond.width();
        match cond {
            Condition::Comp(_, _) | Condition::CompU(_, _) => {
                self.ins(&format!("cmp {}, {}", rn(a[0], w), rn(a[1], w)));
            }
            Condition::CompImm(_, _, n) | Condition::CompUImm(_, _, n) => {
                if (0..=4095).contains(n) {
                    self.ins(&format!("cmp {}, #{}", rn(a[0], w), n));
                } else {
                    self.mov_const(SCRATCH2, *n, w);
                    self.ins(&format!("cmp {}, {}", rn(a[0], w), rn(SCRATCH2, w)));
                }
            }
        }
    }

    /// Materialize an integer constant.
    fn mov_const(&mut self, d: u8, v: i64, w: Width) {
        if (-65536..=65535).contains(&v) {
            self.ins(&format!("mov {}, #{}", rn(d, w), v));
            return;
        }
        let bits = match w {
            Width::W32 => v as u32 as u64,
            Width::W64 => v as u64,
        };
        let chunks = match w {
            Width::W32 => 2,
            Width::W64 => 4,
        };
        let mut first = true;
        for i in 0..chunks {
            let part = (bits >> (16 * i)) & 0xffff;
            if part == 0 && !first {
                continue;
            }
            let mnemonic = if first { "movz" } else { "movk" };
            if i == 0 {
                self.ins(&format!("{} {}, #{}", mnemonic, rn(d, w), part));
            } else {
                self.ins(&format!(
                    "{} {}, #{}, lsl #{}",
                    mnemonic,
                    rn(d, w),
                    part,
                    16 * i
                ));
            }
            first = false;
        }
        if first {
            self.ins(&format!("mov {}, #0", rn(d, w)));
        }
    }

    /// `adrp`/`add` pair computing the address of a symbol or local label.
    fn page_address(&mut self, d: u8, sym: &str) {
        match self.flavor {
            Flavor::Linux => {
                self.ins(&format!("adrp x{}, {}", d, sym));
                self.ins(&format!("add x{}, x{}, :lo12:{}", d, d, sym));
            }
            Flavor::Darwin => {
                self.ins(&format!("adrp x{}, {}@PAGE", d, sym));
                self.ins(&format!("add x{}, x{}, {}@PAGEOFF", d, d, sym));
            }
        }
    }

    /// Render a load/store address operand. Global and string forms burn
    /// `SCRATCH0` for the page address (those modes carry no register args).
    fn addr_operand(&mut self, addr: &Addressing, a: &[u8]) -> String {
        match addr {
            Addressing::Indexed(0) => format!("[x{}]", a[0]),
            Addressing::Indexed(n) => format!("[x{}, #{}]", a[0], n),
            Addressing::Indexed2 => format!("[x{}, x{}]", a[0], a[1]),
            Addressing::Indexed2Shift(k) => format!("[x{}, x{}, lsl #{}]", a[0], a[1], k),
            Addressing::Stack(off) => format!("[sp, #{}]", self.locals_base as i64 + off),
            Addressing::Global(name) => {
                let sym = self.flavor.sym(name);
                match self.flavor {
                    Flavor::Linux => {
                        self.ins(&format!("adrp x{}, {}", SCRATCH0, sym));
                        format!("[x{}, :lo12:{}]", SCRATCH0, sym)
                    }
                    Flavor::Darwin => {
                        self.ins(&format!("adrp x{}, {}@PAGE", SCRATCH0, sym));
                        format!("[x{}, {}@PAGEOFF]", SCRATCH0, sym)
                    }
                }
            }
            Addressing::StringLit(i) => {
                let label = format!(".Lstr{}", i);
                match self.flavor {
                    Flavor::Linux => {
                        self.ins(&format!("adrp x{}, {}", SCRATCH0, label));
                        format!("[x{}, :lo12:{}]", SCRATCH0, label)
                    }
                    Flavor::Darwin => {
                        self.ins(&format!("adrp x{}, {}@PAGE", SCRATCH0, label));
                        format!("[x{}, {}@PAGEOFF]", SCRATCH0, label)
                    }
                }
            }
        }
    }
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

fn rn(p: u8, w: Width) -> String {
    match w {
        Width::W32 => format!("w{}", p),
        Width::W64 => format!("x{}", p),
    }
}

/// Branch condition suffix.
fn cc(cond: &Condition) -> &'static str {
    let c = cond.cond();
    if cond.is_unsigned() {
        match c {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lo",
            Cond::Le => "ls",
            Cond::Gt => "hi",
            Cond::Ge => "hs",
        }
    } else {
        match c {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Le => "le",
            Cond::Gt => "gt",
            Cond::Ge => "ge",
        }
    }
}

fn load_insn(chunk: Chunk) -> Result<(&'static str, Width), EmitError> {
    match chunk {
        Chunk::Int8s => Ok(("ldrsb", Width::W32)),
        Chunk::Int8u => Ok(("ldrb", Width::W32)),
        Chunk::Int16s => Ok(("ldrsh", Width::W32)),
        Chunk::Int16u => Ok(("ldrh", Width::W32)),
        Chunk::Int32 => Ok(("ldr", Width::W32)),
        Chunk::Int64 => Ok(("ldr", Width::W64)),
        Chunk::F32 | Chunk::F64 => Err(EmitError::UnsupportedFloat {
            context: "load".to_string(),
        }),
    }
}

fn store_insn(chunk: Chunk) -> Result<(&'static str, Width), EmitError> {
    match chunk {
        Chunk::Int8s | Chunk::Int8u => Ok(("strb", Width::W32)),
        Chunk::Int16s | Chunk::Int16u => Ok(("strh", Width::W32)),
        Chunk::Int32 => Ok(("str", Width::W32)),
        Chunk::Int64 => Ok(("str", Width::W64)),
        Chunk::F32 | Chunk::F64 => Err(EmitError::UnsupportedFloat {
            context: "store".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_ir::cminor;
    use mcc_ir::cminorsel::select::select_program;
    use mcc_ir::csharpminor;
    use mcc_ir::rtl::gen::generate_program;
    use mcc_ir::simplexpr::simpl_expr;
    use mcc_ir::simpllocals::simpl_locals;
    use mcc_syntax::parser::parse_translation_unit;

    fn asm(src: &str, flavor: Flavor) -> String {
        let cabs = parse_translation_unit(src, "t.c").expect("parse");
        let clight = simpl_expr(&cabs).expect("simpl_expr");
        let clight = simpl_locals(&clight);
        let cshm = csharpminor::lower::lower_program(&clight).expect("cshm");
        let cm = cminor::lower::lower_program(&cshm).expect("cminor");
        let selp = select_program(&cm);
        let rtl = generate_program(&selp).expect("rtl");
        emit_program(&rtl, flavor).expect("emit")
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(|l| l.trim().to_string()).collect()
    }

    #[test]
    fn return_zero_linux() {
        let out = asm("int main() { return 0; }", Flavor::Linux);
        let ls = lines(&out);
        assert!(ls.contains(&".global main".to_string()), "got:\n{}", out);
        assert!(ls.contains(&"main:".to_string()));
        assert!(ls.contains(&"mov w0, #0".to_string()), "got:\n{}", out);
        assert!(ls.contains(&"ret".to_string()));
    }

    #[test]
    fn return_zero_darwin_underscores() {
        let out = asm("int main() { return 0; }", Flavor::Darwin);
        let ls = lines(&out);
        assert!(ls.contains(&".global _main".to_string()), "got:\n{}", out);
        assert!(ls.contains(&"_main:".to_string()));
        assert!(!ls.contains(&"main:".to_string()));
    }

    #[test]
    fn call_uses_bl_with_flavored_symbol() {
        let src = "int g(int x); int f() { return g(1); }";
        let linux = asm(src, Flavor::Linux);
        assert!(lines(&linux).contains(&"bl g".to_string()), "got:\n{}", linux);
        let darwin = asm(src, Flavor::Darwin);
        assert!(
            lines(&darwin).contains(&"bl _g".to_string()),
            "got:\n{}",
            darwin
        );
    }

    #[test]
    fn string_literal_lands_in_cstring_section() {
        let src = "int puts(char *s); int f() { puts(\"hi\"); return 0; }";
        let linux = asm(src, Flavor::Linux);
        assert!(linux.contains(".Lstr0:"), "got:\n{}", linux);
        assert!(linux.contains(".asciz \"hi\""), "got:\n{}", linux);
        assert!(linux.contains("adrp"), "got:\n{}", linux);
        assert!(linux.contains(":lo12:.Lstr0"), "got:\n{}", linux);
        let darwin = asm(src, Flavor::Darwin);
        assert!(darwin.contains(".Lstr0@PAGE"), "got:\n{}", darwin);
        assert!(darwin.contains(".Lstr0@PAGEOFF"), "got:\n{}", darwin);
    }

    #[test]
    fn memory_local_gets_frame_slot() {
        let src = "int f() { int x; int *p; p = &x; *p = 7; return x; }";
        let out = asm(src, Flavor::Linux);
        let ls = lines(&out);
        // Frame setup and a store through the frame.
        assert!(ls.iter().any(|l| l.starts_with("sub sp, sp, #")), "got:\n{}", out);
        assert!(ls.iter().any(|l| l.starts_with("str w")), "got:\n{}", out);
        assert!(ls.iter().any(|l| l.starts_with("add x") && l.contains("sp")), "got:\n{}", out);
    }

    #[test]
    fn comparison_emits_cmp_and_branch() {
        let src = "int f(int x) { if (x < 10) { return 1; } return 0; }";
        let out = asm(src, Flavor::Linux);
        let ls = lines(&out);
        assert!(ls.contains(&"cmp w0, #10".to_string()), "got:\n{}", out);
        assert!(
            ls.iter().any(|l| l.starts_with("b.lt") || l.starts_with("b.ge")),
            "got:\n{}",
            out
        );
    }

    #[test]
    fn global_with_initializer() {
        let src = "int g = 5; int f() { return g; }";
        let out = asm(src, Flavor::Linux);
        let ls = lines(&out);
        assert!(ls.contains(&".data".to_string()), "got:\n{}", out);
        assert!(ls.contains(&"g:".to_string()));
        assert!(ls.contains(&".word 5".to_string()));
        assert!(out.contains(":lo12:g"), "got:\n{}", out);
    }

    #[test]
    fn uninitialized_global_uses_comm() {
        let src = "int g; int f() { return g; }";
        let linux = asm(src, Flavor::Linux);
        assert!(lines(&linux).contains(&".comm g,4,4".to_string()), "got:\n{}", linux);
        let darwin = asm(src, Flavor::Darwin);
        assert!(
            lines(&darwin).contains(&".comm _g,4,2".to_string()),
            "got:\n{}",
            darwin
        );
    }

    #[test]
    fn dense_switch_emits_a_table() {
        let src = "int f(int x) { switch (x) { case 0: return 10; case 1: return 11; case 2: return 12; default: return 0; } }";
        let out = asm(src, Flavor::Linux);
        assert!(out.contains(".Ljt_f_0:"), "got:\n{}", out);
        assert!(out.contains("br x17"), "got:\n{}", out);
        assert!(out.contains(".quad .Lf_"), "got:\n{}", out);
    }

    #[test]
    fn non_leaf_saves_callee_saved_registers() {
        let src = "int g(int x); int f(int a) { return g(a) + a; }";
        let out = asm(src, Flavor::Linux);
        let ls = lines(&out);
        assert!(
            ls.iter().any(|l| l.starts_with("str x19")),
            "callee-saved spill expected, got:\n{}",
            out
        );
        assert!(
            ls.iter().any(|l| l.starts_with("ldr x19")),
            "callee-saved restore expected, got:\n{}",
            out
        );
    }
}
