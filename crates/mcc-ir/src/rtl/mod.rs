//! RTL: a control-flow graph of three-address instructions over virtual
//! registers.
//!
//! A function is a map from node ids to instructions, rooted at
//! `entry`. Virtual registers are unbounded; node ids are allocated counting
//! up during generation, so printing in descending id order approximates
//! execution order. The node map is insertion-ordered, which keeps dumps
//! deterministic.

pub mod gen;
pub mod print;

use indexmap::IndexMap;
use petgraph::graph::DiGraph;
use petgraph::visit::Dfs;
use smallvec::SmallVec;

use crate::ctypes::Chunk;
use crate::ops::{Addressing, Condition, Op, Signature};

/// A CFG node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A virtual register id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u32);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Direct or indirect call target.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Symbol(String),
    Reg(Reg),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Nop(NodeId),
    Op {
        op: Op,
        args: SmallVec<[Reg; 2]>,
        dest: Reg,
        succ: NodeId,
    },
    Load {
        chunk: Chunk,
        addr: Addressing,
        args: SmallVec<[Reg; 2]>,
        dest: Reg,
        succ: NodeId,
    },
    Store {
        chunk: Chunk,
        addr: Addressing,
        args: SmallVec<[Reg; 2]>,
        src: Reg,
        succ: NodeId,
    },
    Call {
        sig: Signature,
        target: CallTarget,
        args: Vec<Reg>,
        dest: Option<Reg>,
        succ: NodeId,
    },
    Tailcall {
        sig: Signature,
        target: CallTarget,
        args: Vec<Reg>,
    },
    Cond {
        cond: Condition,
        args: SmallVec<[Reg; 2]>,
        iftrue: NodeId,
        iffalse: NodeId,
    },
    Jumptable {
        arg: Reg,
        targets: Vec<NodeId>,
    },
    Return(Option<Reg>),
}

impl Instr {
    /// Every successor node id of this instruction.
    pub fn successors(&self) -> Vec<NodeId> {
        match self {
            Instr::Nop(s) => vec![*s],
            Instr::Op { succ, .. }
            | Instr::Load { succ, .. }
            | Instr::Store { succ, .. }
            | Instr::Call { succ, .. } => vec![*succ],
            Instr::Cond {
                iftrue, iffalse, ..
            } => vec![*iftrue, *iffalse],
            Instr::Jumptable { targets, .. } => targets.clone(),
            Instr::Tailcall { .. } | Instr::Return(_) => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub params: Vec<Reg>,
    pub entry: NodeId,
    pub nodes: IndexMap<NodeId, Instr>,
    pub stack_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: Vec<crate::csharpminor::GlobVar>,
    pub strings: Vec<String>,
}

/// Structural problems found by [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingSuccessor { node: NodeId, succ: NodeId },
    MissingEntry { entry: NodeId },
    Unreachable { node: NodeId },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingSuccessor { node, succ } => {
                write!(f, "node {} names missing successor {}", node, succ)
            }
            ValidationError::MissingEntry { entry } => {
                write!(f, "entry node {} is not in the node map", entry)
            }
            ValidationError::Unreachable { node } => {
                write!(f, "node {} is unreachable from the entry", node)
            }
        }
    }
}

/// Check the CFG invariants: every successor id exists, and every node is
/// reachable from the entry.
pub fn validate(f: &Function) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !f.nodes.contains_key(&f.entry) {
        errors.push(ValidationError::MissingEntry { entry: f.entry });
        return errors;
    }
    for (id, instr) in &f.nodes {
        for succ in instr.successors() {
            if !f.nodes.contains_key(&succ) {
                errors.push(ValidationError::MissingSuccessor {
                    node: *id,
                    succ,
                });
            }
        }
    }
    if !errors.is_empty() {
        return errors;
    }

    // Reachability from the entry.
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut indices = IndexMap::new();
    for id in f.nodes.keys() {
        indices.insert(*id, graph.add_node(*id));
    }
    for (id, instr) in &f.nodes {
        for succ in instr.successors() {
            graph.add_edge(indices[id], indices[&succ], ());
        }
    }
    let mut seen = indexmap::IndexSet::new();
    let mut dfs = Dfs::new(&graph, indices[&f.entry]);
    while let Some(nx) = dfs.next(&graph) {
        seen.insert(graph[nx]);
    }
    for id in f.nodes.keys() {
        if !seen.contains(id) {
            errors.push(ValidationError::Unreachable { node: *id });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Mtype;
    use smallvec::smallvec;

    fn sig() -> Signature {
        Signature {
            params: vec![],
            ret: Some(Mtype::I32),
            variadic: false,
        }
    }

    #[test]
    fn valid_function_passes() {
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
            name: "f".into(),
            sig: sig(),
            params: vec![],
            entry: NodeId(2),
            nodes,
            stack_size: 0,
        };
        assert!(validate(&f).is_empty());
    }

    #[test]
    fn missing_successor_is_reported() {
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId(1), Instr::Nop(NodeId(99)));
        let f = Function {
            name: "f".into(),
            sig: sig(),
            params: vec![],
            entry: NodeId(1),
            nodes,
            stack_size: 0,
        };
        let errors = validate(&f);
        assert_eq!(
            errors,
            vec![ValidationError::MissingSuccessor {
                node: NodeId(1),
                succ: NodeId(99)
            }]
        );
    }

    #[test]
    fn unreachable_node_is_reported() {
        let mut nodes = IndexMap::new();
        nodes.insert(NodeId(1), Instr::Return(None));
        nodes.insert(NodeId(2), Instr::Return(None));
        let f = Function {
            name: "f".into(),
            sig: sig(),
            params: vec![],
            entry: NodeId(1),
            nodes,
            stack_size: 0,
        };
        let errors = validate(&f);
        assert_eq!(errors, vec![ValidationError::Unreachable { node: NodeId(2) }]);
    }
}
