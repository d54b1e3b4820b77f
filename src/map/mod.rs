//! Pattern-matching technology mapping of canonical decision DAGs.
//!
//! Mapping runs in two steps. *Snapping* walks the diagram once and marks
//! every vertex reached from more than one parent; the root and every such
//! sharing point become the roots of independent trees, collected into a
//! worklist ordered bottom-up so a sharing point's cost is fully known
//! before any parent tree consumes it as a leaf. Each tree is then covered
//! by bottom-up dynamic programming over the fixed pattern library
//! ([`pattern`]): area mode minimizes block count, delay mode a weighted
//! `(1-mode)*cost + mode*arrival` score.
//!
//! All pass state lives in the per-call worklist and the vertex annotations
//! reset at entry; nested mapping calls on other diagrams can never corrupt
//! an in-progress pass.

pub mod cost;
pub mod pattern;
pub mod timing;

use fxhash::FxHashMap;
use log::debug;

use crate::dag::Dag;
use crate::delay::DelayTable;
use crate::network::{Network, NodeId};
use crate::vertex::VertexId;

pub use pattern::{Pattern, PinSource, Pins};

/// Options of one mapping pass.
#[derive(Debug, Clone)]
pub struct MapOptions {
    /// Exploit the block's shared OR gate (the seven OR patterns).
    pub use_or_gate: bool,
    /// Area/delay weighting: 0 is pure area, 1 is pure delay.
    pub mode: f64,
    /// Fanout-indexed block delays; required when `mode > 0`.
    pub delay_table: Option<DelayTable>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self { use_or_gate: true, mode: 0.0, delay_table: None }
    }
}

impl MapOptions {
    /// Check a recorded pattern annotation against the pass options.
    ///
    /// # Panics
    ///
    /// Panics when `pattern` is an OR shape while OR-gate exploitation is
    /// disabled: the annotation cannot have been produced by this pass.
    pub fn check_pattern(&self, pattern: Pattern) {
        assert!(
            self.use_or_gate || !pattern.uses_or_gate(),
            "OR pattern {:?} recorded while the OR gate is disabled",
            pattern
        );
    }
}

/// Arrival-time lookup for network signals, consumed by delay mode.
pub trait Arrivals {
    fn arrival(&self, node: NodeId) -> f64;
}

/// Area-mode stand-in: every signal arrives at time zero.
pub struct NoArrivals;

impl Arrivals for NoArrivals {
    fn arrival(&self, _node: NodeId) -> f64 {
        0.0
    }
}

impl Arrivals for FxHashMap<NodeId, f64> {
    fn arrival(&self, node: NodeId) -> f64 {
        self.get(&node).copied().unwrap_or(0.0)
    }
}

impl Arrivals for Network {
    fn arrival(&self, node: NodeId) -> f64 {
        self.node(node).arrival
    }
}

/// The outcome of mapping one diagram.
#[derive(Debug, Copy, Clone)]
pub struct MapResult {
    pub blocks: u32,
    pub arrival: f64,
}

/// Map the canonical diagram rooted at `root`, annotating every visited
/// vertex with its cost, arrival and chosen pattern.
pub fn map_dag(
    dag: &mut Dag,
    root: VertexId,
    opts: &MapOptions,
    arrivals: &dyn Arrivals,
) -> MapResult {
    assert!(
        (0.0..=1.0).contains(&opts.mode),
        "mode must lie in [0, 1], got {}",
        opts.mode
    );
    dag.reset_mapping(root);
    dag.mark_multiple_fanout(root);

    // Sharing points in bottom-up order, the root last.
    let mut worklist: Vec<VertexId> = dag
        .postorder(root)
        .into_iter()
        .filter(|&v| !dag.is_terminal(v) && dag.vertex(v).multiple_fo > 0)
        .collect();
    worklist.push(root);
    debug!("map_dag(root = {}): {} trees", root, worklist.len());

    let mut blocks = 0;
    if opts.mode > 0.0 {
        let table = opts
            .delay_table
            .as_ref()
            .expect("delay mode requires a delay table");
        for &tree in &worklist {
            let (tree_blocks, tree_arrival) =
                timing::tree_cost_delay(dag, opts, arrivals, table, tree, tree);
            debug!("tree {}: {} blocks, arrival {:.3}", tree, tree_blocks, tree_arrival);
            blocks += tree_blocks;
        }
    } else {
        for &tree in &worklist {
            let tree_blocks = cost::tree_cost(dag, opts, tree, tree);
            debug!("tree {}: {} blocks", tree, tree_blocks);
            blocks += tree_blocks;
        }
    }

    MapResult { blocks, arrival: dag.vertex(root).arrival }
}
