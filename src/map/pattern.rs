//! The basic-block pattern library.
//!
//! One basic block is a two-level multiplexer macro-cell with an OR gate on
//! the final select:
//!
//! ```text
//!     OUT = (S0 | S1) ? (SB ? B1 : B0) : (SA ? A1 : A0)
//! ```
//!
//! The mapper covers a decision DAG with regions each realizable by one
//! block. Every region shape is a [`Pattern`]: its structural precondition,
//! its *leaves* (the sub-diagrams feeding the block's data pins), its select
//! vertices, and the full pin binding used by netlist emission. Patterns are
//! enumerated in a fixed left-to-right order and ties are broken by the
//! first minimal candidate.
//!
//! The shapes split into three groups:
//!
//! - `Literal`: a bare input (children exactly terminal-0/terminal-1); costs
//!   no block at all.
//! - Four basic shapes (`Single`, `LowMux`, `HighMux`, `BothMux`) using only
//!   the multiplexer tree.
//! - Seven OR shapes, available only when OR-gate exploitation is enabled.
//!   All of them require the shared-high precondition `low.high == high`,
//!   which realizes `x | y` on the two select pins.

use crate::dag::Dag;
use crate::network::NodeId;
use crate::vertex::VertexId;

/// One basic-block region shape.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Pattern {
    /// A bare input literal; no block needed.
    Literal,
    /// One multiplexer: `x ? high : low`.
    Single,
    /// Low child expanded into the A-side mux.
    LowMux,
    /// High child expanded into the B-side mux.
    HighMux,
    /// Both children expanded; the full three-mux tree.
    BothMux,
    /// `(x | y) ? 1 : E` with a terminal-1 shared branch.
    OrTerminal,
    /// `(x | y) ? 1 : E` with `E` expanded into the A-side mux.
    OrTerminalLowMux,
    /// `(x | y) ? T : (z ? T : E)`: the shared branch reused as A-side data.
    OrChainHigh,
    /// `(x | y) ? T : E`, both sides direct signals.
    OrSimple,
    /// `(x | y) ? T : E` with `E` expanded into the A-side mux.
    OrLowMux,
    /// `(x | y) ? T : E` with `T` expanded into the B-side mux.
    OrHighMux,
    /// `(x | y) ? T : E` with both sides expanded.
    OrBothMux,
}

/// The fixed enumeration order of the cost recursion. `Literal` is checked
/// separately before any block pattern is considered; more specific OR
/// shapes come before their generalizations so they win cost ties.
pub const ENUMERATION: [Pattern; 11] = [
    Pattern::Single,
    Pattern::LowMux,
    Pattern::HighMux,
    Pattern::BothMux,
    Pattern::OrTerminal,
    Pattern::OrTerminalLowMux,
    Pattern::OrChainHigh,
    Pattern::OrSimple,
    Pattern::OrLowMux,
    Pattern::OrHighMux,
    Pattern::OrBothMux,
];

/// A successful structural match of one pattern at a vertex.
#[derive(Debug, Clone)]
pub struct Match {
    pub pattern: Pattern,
    /// The pattern's true sub-children: sub-diagrams feeding data pins.
    /// Deduplicated; terminals included (they cost nothing).
    pub leaves: Vec<VertexId>,
    /// Vertices whose decision variables drive select pins.
    pub selects: Vec<VertexId>,
}

/// What one block pin is wired to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PinSource {
    Gnd,
    Vcc,
    /// The output signal of the sub-diagram rooted at this vertex.
    Vertex(VertexId),
    /// The signal of a decision variable.
    Var(NodeId),
}

/// The 8 named pins of one block instance.
#[derive(Debug, Copy, Clone)]
pub struct Pins {
    pub a0: PinSource,
    pub a1: PinSource,
    pub sa: PinSource,
    pub b0: PinSource,
    pub b1: PinSource,
    pub sb: PinSource,
    pub s0: PinSource,
    pub s1: PinSource,
}

impl Pins {
    fn new() -> Self {
        Self {
            a0: PinSource::Gnd,
            a1: PinSource::Gnd,
            sa: PinSource::Gnd,
            b0: PinSource::Gnd,
            b1: PinSource::Gnd,
            sb: PinSource::Gnd,
            s0: PinSource::Gnd,
            s1: PinSource::Gnd,
        }
    }

    pub fn named(&self) -> [(&'static str, PinSource); 8] {
        [
            ("A0", self.a0),
            ("A1", self.a1),
            ("SA", self.sa),
            ("B0", self.b0),
            ("B1", self.b1),
            ("SB", self.sb),
            ("S0", self.s0),
            ("S1", self.s1),
        ]
    }
}

impl Pattern {
    pub fn uses_or_gate(self) -> bool {
        matches!(
            self,
            Pattern::OrTerminal
                | Pattern::OrTerminalLowMux
                | Pattern::OrChainHigh
                | Pattern::OrSimple
                | Pattern::OrLowMux
                | Pattern::OrHighMux
                | Pattern::OrBothMux
        )
    }

    /// Whether the vertex is a bare input literal (children exactly
    /// terminal-0 / terminal-1). Such vertices cost no block.
    pub fn is_literal_vertex(dag: &Dag, v: VertexId) -> bool {
        !dag.is_terminal(v) && dag.is_zero(dag.low(v)) && dag.is_one(dag.high(v))
    }

    /// Try to match this pattern at `v`; `v` must be a decision vertex.
    pub fn match_at(self, dag: &Dag, v: VertexId) -> Option<Match> {
        assert!(!dag.is_terminal(v), "cannot match a pattern at a terminal");
        let l = dag.low(v);
        let h = dag.high(v);
        // A vertex absorbed into a region must not be a sharing point: its
        // output is consumed elsewhere and is mapped as its own tree.
        let interior = |u: VertexId| !dag.is_terminal(u) && dag.vertex(u).multiple_fo == 0;
        // The shared-high branch of an OR shape has exactly two parents,
        // both inside the region.
        let or_shared = || interior(l) && dag.high(l) == h;

        match self {
            Pattern::Literal => {
                if Pattern::is_literal_vertex(dag, v) {
                    Some(Match { pattern: self, leaves: vec![], selects: vec![v] })
                } else {
                    None
                }
            }
            Pattern::Single => Some(Match {
                pattern: self,
                leaves: dedup(vec![h, l]),
                selects: vec![v],
            }),
            Pattern::LowMux => {
                if !interior(l) {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![h, dag.high(l), dag.low(l)]),
                    selects: vec![v, l],
                })
            }
            Pattern::HighMux => {
                if !interior(h) {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![dag.high(h), dag.low(h), l]),
                    selects: vec![v, h],
                })
            }
            Pattern::BothMux => {
                if !interior(l) || !interior(h) {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![dag.high(h), dag.low(h), dag.high(l), dag.low(l)]),
                    selects: vec![v, l, h],
                })
            }
            Pattern::OrTerminal => {
                if !or_shared() || !dag.is_one(h) {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: vec![dag.low(l)],
                    selects: vec![v, l],
                })
            }
            Pattern::OrTerminalLowMux => {
                if !or_shared() || !dag.is_one(h) || !interior(dag.low(l)) {
                    return None;
                }
                let ll = dag.low(l);
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![dag.high(ll), dag.low(ll)]),
                    selects: vec![v, l, ll],
                })
            }
            Pattern::OrChainHigh => {
                if !or_shared() {
                    return None;
                }
                let ll = dag.low(l);
                if !interior(ll) || dag.high(ll) != h {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![h, dag.low(ll)]),
                    selects: vec![v, l, ll],
                })
            }
            Pattern::OrSimple => {
                if !or_shared() {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![h, dag.low(l)]),
                    selects: vec![v, l],
                })
            }
            Pattern::OrLowMux => {
                if !or_shared() || !interior(dag.low(l)) {
                    return None;
                }
                let ll = dag.low(l);
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![h, dag.high(ll), dag.low(ll)]),
                    selects: vec![v, l, ll],
                })
            }
            Pattern::OrHighMux => {
                if !or_shared() || dag.is_terminal(h) || dag.vertex(h).multiple_fo != 1 {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![dag.high(h), dag.low(h), dag.low(l)]),
                    selects: vec![v, l, h],
                })
            }
            Pattern::OrBothMux => {
                if !or_shared() || dag.is_terminal(h) || dag.vertex(h).multiple_fo != 1 {
                    return None;
                }
                let ll = dag.low(l);
                if !interior(ll) {
                    return None;
                }
                Some(Match {
                    pattern: self,
                    leaves: dedup(vec![dag.high(h), dag.low(h), dag.high(ll), dag.low(ll)]),
                    selects: vec![v, l, h, ll],
                })
            }
        }
    }

    /// Pin binding of this pattern at `v` for netlist emission.
    ///
    /// # Panics
    ///
    /// Panics when the pattern's precondition does not hold at `v`: a
    /// recorded annotation that no longer matches the diagram is a caller
    /// contract violation.
    pub fn pins(self, dag: &Dag, v: VertexId) -> Pins {
        let m = self
            .match_at(dag, v)
            .unwrap_or_else(|| panic!("pattern {:?} does not match at {}", self, v));
        let var = |u: VertexId| {
            PinSource::Var(
                dag.vertex(u)
                    .name
                    .unwrap_or_else(|| panic!("select vertex {} has no variable name", u)),
            )
        };
        let data = |u: VertexId| {
            if dag.is_terminal(u) {
                if dag.is_one(u) {
                    PinSource::Vcc
                } else {
                    PinSource::Gnd
                }
            } else {
                PinSource::Vertex(u)
            }
        };
        let mut pins = Pins::new();
        let l = dag.low(v);
        let h = dag.high(v);
        match m.pattern {
            Pattern::Literal => panic!("a literal vertex has no block instance"),
            Pattern::Single => {
                pins.s0 = var(v);
                pins.b0 = data(h);
                pins.a0 = data(l);
            }
            Pattern::LowMux => {
                pins.s0 = var(v);
                pins.b0 = data(h);
                pins.sa = var(l);
                pins.a1 = data(dag.high(l));
                pins.a0 = data(dag.low(l));
            }
            Pattern::HighMux => {
                pins.s0 = var(v);
                pins.sb = var(h);
                pins.b1 = data(dag.high(h));
                pins.b0 = data(dag.low(h));
                pins.a0 = data(l);
            }
            Pattern::BothMux => {
                pins.s0 = var(v);
                pins.sb = var(h);
                pins.b1 = data(dag.high(h));
                pins.b0 = data(dag.low(h));
                pins.sa = var(l);
                pins.a1 = data(dag.high(l));
                pins.a0 = data(dag.low(l));
            }
            Pattern::OrTerminal => {
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.b0 = PinSource::Vcc;
                pins.a0 = data(dag.low(l));
            }
            Pattern::OrTerminalLowMux => {
                let ll = dag.low(l);
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.b0 = PinSource::Vcc;
                pins.sa = var(ll);
                pins.a1 = data(dag.high(ll));
                pins.a0 = data(dag.low(ll));
            }
            Pattern::OrChainHigh => {
                let ll = dag.low(l);
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.b0 = data(h);
                pins.sa = var(ll);
                pins.a1 = data(h);
                pins.a0 = data(dag.low(ll));
            }
            Pattern::OrSimple => {
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.b0 = data(h);
                pins.a0 = data(dag.low(l));
            }
            Pattern::OrLowMux => {
                let ll = dag.low(l);
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.b0 = data(h);
                pins.sa = var(ll);
                pins.a1 = data(dag.high(ll));
                pins.a0 = data(dag.low(ll));
            }
            Pattern::OrHighMux => {
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.sb = var(h);
                pins.b1 = data(dag.high(h));
                pins.b0 = data(dag.low(h));
                pins.a0 = data(dag.low(l));
            }
            Pattern::OrBothMux => {
                let ll = dag.low(l);
                pins.s0 = var(v);
                pins.s1 = var(l);
                pins.sb = var(h);
                pins.b1 = data(dag.high(h));
                pins.b0 = data(dag.low(h));
                pins.sa = var(ll);
                pins.a1 = data(dag.high(ll));
                pins.a0 = data(dag.low(ll));
            }
        }
        pins
    }
}

fn dedup(mut leaves: Vec<VertexId>) -> Vec<VertexId> {
    let mut seen = Vec::with_capacity(leaves.len());
    leaves.retain(|&v| {
        if seen.contains(&v) {
            false
        } else {
            seen.push(v);
            true
        }
    });
    leaves
}
