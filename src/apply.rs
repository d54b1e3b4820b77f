//! Binary combination of two decision DAGs.
//!
//! `apply` combines two diagrams living in the same arena under a Boolean
//! operator, recursing on the lower of the two operands' ordering positions.
//! The result is a *raw* diagram: it may contain redundant and duplicate
//! vertices and must be run through [`reduce`][crate::reduce::reduce] before
//! it is treated as canonical.
//!
//! Each top-level call owns a fresh memo table keyed on the ordered pair of
//! the operands' pre-Apply identities; memoized results never leak across
//! independent invocations.

use std::cmp::min;

use fxhash::FxHashMap;
use log::debug;

use crate::dag::Dag;
use crate::vertex::VertexId;

/// The binary Boolean operator applied to the two operands.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    And,
    Or,
    Xor,
    Xnor,
}

impl Op {
    /// Truth-table entry for the operator.
    pub fn eval(self, a: bool, b: bool) -> bool {
        match self {
            Op::And => a && b,
            Op::Or => a || b,
            Op::Xor => a != b,
            Op::Xnor => a == b,
        }
    }
}

/// Input-phase variant: which operands are complemented on the way in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    None,
    NegFirst,
    NegSecond,
    NegBoth,
}

impl Phase {
    pub fn neg_first(self) -> bool {
        matches!(self, Phase::NegFirst | Phase::NegBoth)
    }

    pub fn neg_second(self) -> bool {
        matches!(self, Phase::NegSecond | Phase::NegBoth)
    }
}

/// Per-invocation state of one top-level `apply` call.
///
/// Owns the memo table; dropped when the call returns.
struct ApplyContext {
    op: Op,
    phase: Phase,
    memo: FxHashMap<(VertexId, VertexId), VertexId>,
}

impl ApplyContext {
    fn new(op: Op, phase: Phase) -> Self {
        Self { op, phase, memo: FxHashMap::default() }
    }

    fn run(&mut self, dag: &mut Dag, f: VertexId, g: VertexId) -> VertexId {
        if dag.is_terminal(f) && dag.is_terminal(g) {
            let a = dag.vertex(f).value.as_bool() ^ self.phase.neg_first();
            let b = dag.vertex(g).value.as_bool() ^ self.phase.neg_second();
            return dag.terminal(self.op.eval(a, b));
        }
        if let Some(&cached) = self.memo.get(&(f, g)) {
            return cached;
        }

        let fi = dag.index(f);
        let gi = dag.index(g);
        let m = min(fi, gi);
        // Only the operand whose index matches the split level is cofactored;
        // the other one is used unchanged on both branches.
        let (f_low, f_high) = if fi == m {
            (dag.low(f), dag.high(f))
        } else {
            (f, f)
        };
        let (g_low, g_high) = if gi == m {
            (dag.low(g), dag.high(g))
        } else {
            (g, g)
        };

        let low = self.run(dag, f_low, g_low);
        let high = self.run(dag, f_high, g_high);
        let name = if fi == m {
            dag.vertex(f).name
        } else {
            dag.vertex(g).name
        };
        let result = dag.decision(m, name, low, high);
        self.memo.insert((f, g), result);
        result
    }
}

/// Combine `f` and `g` under `op` with the given input phases.
///
/// The returned diagram is raw; run [`reduce`][crate::reduce::reduce] on it
/// before mapping or storing it. Operator identity laws (`x AND 1 = x`,
/// `x OR 1 = 1`, ...) hold on the reduced result.
pub fn apply(dag: &mut Dag, op: Op, phase: Phase, f: VertexId, g: VertexId) -> VertexId {
    debug!("apply(op = {:?}, phase = {:?}, f = {}, g = {})", op, phase, f, g);
    ApplyContext::new(op, phase).run(dag, f, g)
}
