//! Area-mode dynamic programming over one tree of the mapping worklist.

use log::trace;

use crate::dag::Dag;
use crate::vertex::VertexId;

use super::pattern::{Pattern, ENUMERATION};
use super::MapOptions;

/// Minimum block count for the subtree rooted at `v` inside the tree owned
/// by `tree_root`.
///
/// Terminals cost nothing. A sharing point other than the current tree root
/// is a leaf of this tree: its blocks are counted by its own tree, so it
/// contributes zero extra. Results are cached on the vertex (`mapped`), so
/// repeated references inside one tree are not recomputed.
pub(crate) fn tree_cost(
    dag: &mut Dag,
    opts: &MapOptions,
    tree_root: VertexId,
    v: VertexId,
) -> u32 {
    if dag.is_terminal(v) {
        return 0;
    }
    if v != tree_root && dag.vertex(v).multiple_fo > 0 {
        debug_assert!(dag.vertex(v).mapped, "sharing point consumed before its own tree");
        return 0;
    }
    if dag.vertex(v).mapped {
        return dag.vertex(v).cost;
    }
    if Pattern::is_literal_vertex(dag, v) {
        let vertex = dag.vertex_mut(v);
        vertex.cost = 0;
        vertex.pattern = Some(Pattern::Literal);
        vertex.mapped = true;
        return 0;
    }

    let mut best: Option<(u32, Pattern)> = None;
    for pattern in ENUMERATION {
        if pattern.uses_or_gate() && !opts.use_or_gate {
            continue;
        }
        let m = match pattern.match_at(dag, v) {
            Some(m) => m,
            None => continue,
        };
        let mut candidate = 1;
        for &leaf in &m.leaves {
            candidate += tree_cost(dag, opts, tree_root, leaf);
        }
        trace!("  {:?} at {}: {} blocks", pattern, v, candidate);
        if best.map_or(true, |(cost, _)| candidate < cost) {
            best = Some((candidate, pattern));
        }
    }
    let (cost, pattern) =
        best.expect("Single matches every non-literal decision vertex");

    let vertex = dag.vertex_mut(v);
    vertex.cost = cost;
    vertex.pattern = Some(pattern);
    vertex.mapped = true;
    cost
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::super::{map_dag, MapOptions, NoArrivals};
    use super::*;
    use crate::dag::Dag;

    fn area() -> MapOptions {
        MapOptions::default()
    }

    #[test]
    fn test_literal_costs_nothing() {
        let mut dag = Dag::new(1);
        let x = dag.literal(0, None, false);
        let result = map_dag(&mut dag, x, &area(), &NoArrivals);
        assert_eq!(result.blocks, 0);
        assert_eq!(dag.vertex(x).pattern, Some(Pattern::Literal));
    }

    #[test]
    fn test_terminal_costs_nothing() {
        let mut dag = Dag::new(1);
        let one = dag.one();
        assert_eq!(map_dag(&mut dag, one, &area(), &NoArrivals).blocks, 0);
    }

    #[test]
    fn test_two_input_and_is_one_block() {
        // f = x y: a two-vertex chain fits one block.
        let mut dag = Dag::new(2);
        let y = dag.literal(1, None, false);
        let v = dag.decision(0, None, dag.zero(), y);
        assert_eq!(map_dag(&mut dag, v, &area(), &NoArrivals).blocks, 1);
    }

    #[test]
    fn test_three_input_and_is_one_block() {
        // f = x y z: select, inner select and one data literal.
        let mut dag = Dag::new(3);
        let z = dag.literal(2, None, false);
        let vy = dag.decision(1, None, dag.zero(), z);
        let vx = dag.decision(0, None, dag.zero(), vy);
        assert_eq!(map_dag(&mut dag, vx, &area(), &NoArrivals).blocks, 1);
    }

    #[test]
    fn test_four_input_or_needs_or_gate() {
        // f = a | b | c | d: one block with the OR gate, two without.
        let build = |dag: &mut Dag| {
            let d = dag.literal(3, None, false);
            let c = dag.decision(2, None, d, dag.one());
            let b = dag.decision(1, None, c, dag.one());
            dag.decision(0, None, b, dag.one())
        };

        let mut dag = Dag::new(4);
        let root = build(&mut dag);
        assert_eq!(map_dag(&mut dag, root, &area(), &NoArrivals).blocks, 1);

        let mut dag = Dag::new(4);
        let root = build(&mut dag);
        let no_or = MapOptions { use_or_gate: false, ..MapOptions::default() };
        assert_eq!(map_dag(&mut dag, root, &no_or, &NoArrivals).blocks, 2);
    }

    #[test]
    fn test_shared_point_mapped_once() {
        // Two parents consume the same sub-diagram; it is mapped once and
        // counted once.
        let mut dag = Dag::new(4);
        let d = dag.literal(3, None, false);
        let shared = dag.decision(2, None, dag.zero(), d);
        let b = dag.decision(1, None, shared, dag.one());
        let root = dag.decision(0, None, b, shared);
        let result = map_dag(&mut dag, root, &area(), &NoArrivals);

        assert!(dag.vertex(shared).mapped);
        assert_eq!(dag.vertex(shared).multiple_fo, 1);
        let shared_cost = dag.vertex(shared).cost;
        // shared = c AND d costs one block; it is counted exactly once.
        assert_eq!(shared_cost, 1);
        assert_eq!(result.blocks, 2);

        // A second query of the cached annotation returns it unchanged.
        assert_eq!(tree_cost(&mut dag, &area(), shared, shared), shared_cost);
    }

    #[test]
    fn test_balanced_and_tree_root_is_one_block() {
        // The root of a balanced four-input AND tree discriminates on its
        // two sub-products: a two-vertex chain, one block.
        let mut dag = Dag::new(2);
        let g2 = dag.literal(1, None, false);
        let root = dag.decision(0, None, dag.zero(), g2);
        assert_eq!(map_dag(&mut dag, root, &area(), &NoArrivals).blocks, 1);
    }
}
