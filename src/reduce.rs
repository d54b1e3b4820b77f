//! Canonicalization of raw decision DAGs (Bryant's Reduce).
//!
//! A diagram coming out of the builder or [`apply`][crate::apply::apply] may
//! contain *redundant* vertices (both children canonically equal) and
//! *duplicate* vertices (same `(index, low, high)` structure allocated more
//! than once). Reduce partitions the reachable vertices into buckets by
//! ordering position and processes them from the deepest bucket (nearest the
//! terminals) up to the root:
//!
//! 1. terminals receive canonical ids 0 and 1 by value;
//! 2. in each bucket, children are first redirected to their canonical
//!    representatives; a vertex whose children now share one id is redirected
//!    to that child (redundant-test elimination);
//! 3. survivors are sorted by `(low.id, high.id)` and runs with equal keys
//!    are merged into their first member (duplicate elimination), which
//!    receives the next dense id.
//!
//! Dead vertices are freed only after every bucket is processed. The pass is
//! idempotent, and within one pass canonical equality coincides with
//! functional equality.

use fxhash::FxHashMap;
use log::debug;

use crate::dag::Dag;
use crate::vertex::VertexId;

/// Canonicalize the diagram rooted at `root`; returns the canonical root.
///
/// Only vertices reachable from `root` are touched; other diagrams living in
/// the same arena keep their structure. After the call, every reachable
/// vertex carries a dense canonical `id` and no two reachable vertices share
/// `(index, low.id, high.id)`.
pub fn reduce(dag: &mut Dag, root: VertexId) -> VertexId {
    let reachable = dag.postorder(root);
    let num_vars = dag.num_vars();

    let mut buckets: Vec<Vec<VertexId>> = vec![Vec::new(); num_vars + 1];
    for &v in &reachable {
        buckets[dag.index(v)].push(v);
    }

    let mut repr: FxHashMap<VertexId, VertexId> = FxHashMap::default();
    let mut dead: Vec<VertexId> = Vec::new();

    // Terminal bucket: canonical ids 0/1 by value. Stray terminal
    // allocations (e.g. in an extracted subgraph) merge into the arena's
    // canonical pair.
    for &v in &buckets[num_vars] {
        let canon = dag.terminal(dag.vertex(v).value.as_bool());
        repr.insert(v, canon);
        if v != canon {
            dead.push(v);
        }
    }
    {
        let zero = dag.zero();
        let one = dag.one();
        dag.vertex_mut(zero).id = 0;
        dag.vertex_mut(one).id = 1;
    }
    let mut next_id = 2;

    for index in (0..num_vars).rev() {
        let mut survivors: Vec<VertexId> = Vec::new();
        for i in 0..buckets[index].len() {
            let v = buckets[index][i];
            let low = repr[&dag.low(v)];
            let high = repr[&dag.high(v)];
            {
                let vertex = dag.vertex_mut(v);
                vertex.low = Some(low);
                vertex.high = Some(high);
            }
            if dag.vertex(low).id == dag.vertex(high).id {
                // Redundant test: both branches lead to the same canonical
                // vertex.
                repr.insert(v, low);
                dead.push(v);
            } else {
                survivors.push(v);
            }
        }

        survivors.sort_unstable_by_key(|&v| child_key(dag, v));
        let mut run: Option<((usize, usize), VertexId)> = None;
        for v in survivors {
            let key = child_key(dag, v);
            match run {
                Some((run_key, canon)) if run_key == key => {
                    // Duplicate structure: merge into the canonical run head.
                    repr.insert(v, canon);
                    dead.push(v);
                }
                _ => {
                    dag.vertex_mut(v).id = next_id;
                    next_id += 1;
                    repr.insert(v, v);
                    run = Some((key, v));
                }
            }
        }
    }

    debug!(
        "reduce(root = {}): {} reachable, {} canonical, {} freed",
        root,
        reachable.len(),
        next_id,
        dead.len()
    );

    // Storage of merged vertices is released only now, after every bucket is
    // done looking at children.
    for v in dead {
        dag.free(v);
    }

    repr[&root]
}

fn child_key(dag: &Dag, v: VertexId) -> (usize, usize) {
    (dag.vertex(dag.low(v)).id, dag.vertex(dag.high(v)).id)
}
