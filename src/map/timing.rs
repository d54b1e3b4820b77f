//! Delay-mode dynamic programming: weighted area/delay pattern selection.
//!
//! The recursion mirrors the area pass but additionally tracks the arrival
//! time of every vertex: a pattern's arrival is the latest arrival among its
//! leaf sub-diagrams and the network signals on its select pins, plus the
//! propagation delay of one block driving `multiple_fo + 1` fanouts. The
//! pattern minimizing `(1 - mode) * cost + mode * arrival` wins; `mode = 0`
//! is pure area, `mode = 1` pure delay.

use log::trace;

use crate::dag::Dag;
use crate::delay::DelayTable;
use crate::vertex::VertexId;

use super::pattern::{Pattern, ENUMERATION};
use super::{Arrivals, MapOptions};

/// Block count and arrival time for the subtree rooted at `v` inside the
/// tree owned by `tree_root`.
pub(crate) fn tree_cost_delay(
    dag: &mut Dag,
    opts: &MapOptions,
    arrivals: &dyn Arrivals,
    table: &DelayTable,
    tree_root: VertexId,
    v: VertexId,
) -> (u32, f64) {
    if dag.is_terminal(v) {
        return (0, 0.0);
    }
    if v != tree_root && dag.vertex(v).multiple_fo > 0 {
        // Cross-tree leaf: its blocks are counted elsewhere, its arrival is
        // already known.
        debug_assert!(dag.vertex(v).mapped, "sharing point consumed before its own tree");
        return (0, dag.vertex(v).arrival);
    }
    if dag.vertex(v).mapped {
        let vertex = dag.vertex(v);
        return (vertex.cost, vertex.arrival);
    }
    if Pattern::is_literal_vertex(dag, v) {
        let arrival = dag.vertex(v).name.map_or(0.0, |n| arrivals.arrival(n));
        let vertex = dag.vertex_mut(v);
        vertex.cost = 0;
        vertex.arrival = arrival;
        vertex.pattern = Some(Pattern::Literal);
        vertex.mapped = true;
        return (0, arrival);
    }

    let fanout = dag.vertex(v).multiple_fo as usize + 1;
    let block_delay = table.lookup(fanout);

    let mut best: Option<(f64, u32, f64, Pattern)> = None;
    for pattern in ENUMERATION {
        if pattern.uses_or_gate() && !opts.use_or_gate {
            continue;
        }
        let m = match pattern.match_at(dag, v) {
            Some(m) => m,
            None => continue,
        };
        let mut cost = 1;
        let mut inputs_arrival = 0.0f64;
        for &leaf in &m.leaves {
            let (leaf_cost, leaf_arrival) =
                tree_cost_delay(dag, opts, arrivals, table, tree_root, leaf);
            cost += leaf_cost;
            inputs_arrival = inputs_arrival.max(leaf_arrival);
        }
        for &select in &m.selects {
            if let Some(name) = dag.vertex(select).name {
                inputs_arrival = inputs_arrival.max(arrivals.arrival(name));
            }
        }
        let arrival = inputs_arrival + block_delay;
        let score = (1.0 - opts.mode) * cost as f64 + opts.mode * arrival;
        trace!(
            "  {:?} at {}: {} blocks, arrival {:.3}, score {:.3}",
            pattern, v, cost, arrival, score
        );
        if best.map_or(true, |(s, ..)| score < s) {
            best = Some((score, cost, arrival, pattern));
        }
    }
    let (_, cost, arrival, pattern) =
        best.expect("Single matches every non-literal decision vertex");

    let vertex = dag.vertex_mut(v);
    vertex.cost = cost;
    vertex.arrival = arrival;
    vertex.pattern = Some(pattern);
    vertex.mapped = true;
    (cost, arrival)
}

#[cfg(test)]
mod tests {
    use fxhash::FxHashMap;
    use test_log::test;

    use super::super::{map_dag, MapOptions, NoArrivals};
    use crate::dag::Dag;
    use crate::delay::DelayTable;
    use crate::network::NodeId;

    fn delay_opts(mode: f64) -> MapOptions {
        MapOptions {
            use_or_gate: true,
            mode,
            delay_table: Some(DelayTable::from_delays(vec![0.0, 2.3, 3.0, 3.9, 5.4])),
        }
    }

    #[test]
    fn test_literal_arrival_is_variable_arrival() {
        let mut dag = Dag::new(1);
        let n = NodeId::new(0);
        let x = dag.literal(0, Some(n), false);
        let arrivals: FxHashMap<NodeId, f64> = [(n, 4.5)].into_iter().collect();
        let result = map_dag(&mut dag, x, &delay_opts(1.0), &arrivals);
        assert_eq!(result.blocks, 0);
        assert!((result.arrival - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_chain_accumulates_block_delay() {
        // One block driving a single fanout: arrival = max input + delay(1).
        let mut dag = Dag::new(2);
        let na = NodeId::new(0);
        let nb = NodeId::new(1);
        let y = dag.literal(1, Some(nb), false);
        let v = dag.decision(0, Some(na), dag.zero(), y);
        let arrivals: FxHashMap<NodeId, f64> = [(na, 1.0), (nb, 2.0)].into_iter().collect();
        let result = map_dag(&mut dag, v, &delay_opts(1.0), &arrivals);
        assert_eq!(result.blocks, 1);
        assert!((result.arrival - (2.0 + 2.3)).abs() < 1e-9);
    }

    #[test]
    fn test_shared_vertex_block_sees_extra_fanout() {
        // The shared sub-diagram drives two parents: its block delay is the
        // fanout-2 entry.
        let mut dag = Dag::new(4);
        let d = dag.literal(3, None, false);
        let shared = dag.decision(2, None, dag.zero(), d);
        let b = dag.decision(1, None, shared, dag.one());
        let root = dag.decision(0, None, b, shared);
        map_dag(&mut dag, root, &delay_opts(1.0), &NoArrivals);
        assert!((dag.vertex(shared).arrival - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pure_area_weighting_matches_area_mode() {
        // With mode 0 the weighted score reduces to block count.
        let mut dag = Dag::new(3);
        let z = dag.literal(2, None, false);
        let vy = dag.decision(1, None, dag.zero(), z);
        let vx = dag.decision(0, None, dag.zero(), vy);
        let result = map_dag(&mut dag, vx, &MapOptions::default(), &NoArrivals);
        assert_eq!(result.blocks, 1);
    }

    #[test]
    fn test_late_input_shifts_arrival() {
        let mut dag = Dag::new(3);
        let nz = NodeId::new(2);
        let z = dag.literal(2, Some(nz), false);
        let vy = dag.decision(1, None, dag.zero(), z);
        let vx = dag.decision(0, None, dag.zero(), vy);
        let arrivals: FxHashMap<NodeId, f64> = [(nz, 10.0)].into_iter().collect();
        let result = map_dag(&mut dag, vx, &delay_opts(1.0), &arrivals);
        assert!((result.arrival - (10.0 + 2.3)).abs() < 1e-9);
    }
}
