//! Construction of decision DAGs from cube covers.
//!
//! The builder follows the unate-recursive covering paradigm: a cover with a
//! universal row is the constant one, a single cube becomes a literal chain,
//! a cover with a purely positive-unate column is factored on it directly
//! (`F = x Q + R`), and everything else splits on the most frequent, most
//! balanced binate column. Cofactor results are combined through
//! [`apply`][crate::apply::apply] gated by the split literal, so every
//! intermediate diagram respects the active variable ordering; the top-level
//! entry reduces the result before handing it out.
//!
//! Variable orders come from [`OrderStrategy`][crate::order::OrderStrategy]:
//! the original fanin order, a random permutation, an exhaustive
//! Johnson–Trotter search scored by a full build-and-map of every
//! permutation (input counts up to the bound only), or descending input
//! arrival times in delay mode.

use fxhash::FxHashMap;
use log::debug;

use crate::apply::{apply, Op, Phase};
use crate::cover::{Cover, Cube, Literal};
use crate::dag::Dag;
use crate::map::{map_dag, Arrivals, MapOptions, MapResult};
use crate::network::{Network, NodeId};
use crate::order::{OrderStrategy, Permutations, VariableOrder};
use crate::reduce::reduce;
use crate::vertex::VertexId;

/// A decision DAG bound to the ordering it was built under and the network
/// node it represents.
pub struct Act {
    pub dag: Dag,
    pub root: VertexId,
    pub order: VariableOrder,
    /// Network node per cover column.
    pub fanins: Vec<NodeId>,
    pub node: Option<NodeId>,
}

impl Act {
    /// Map this diagram; a convenience over
    /// [`map_dag`][crate::map::map_dag].
    pub fn map(&mut self, opts: &MapOptions, arrivals: &dyn Arrivals) -> MapResult {
        map_dag(&mut self.dag, self.root, opts, arrivals)
    }

    pub fn vertex_count(&mut self) -> usize {
        self.dag.reachable_count(self.root)
    }
}

/// Options of one build.
#[derive(Debug, Clone, Default)]
pub struct BuilderOptions {
    pub strategy: OrderStrategy,
    /// Mapping options used to score candidate orders in the exhaustive
    /// search (area count, or the weighted area/delay score).
    pub map: MapOptions,
}

/// Build the canonical diagram of `cover` for `node`, choosing the variable
/// order per the strategy.
pub fn build_act(
    cover: &Cover,
    fanins: &[NodeId],
    node: Option<NodeId>,
    opts: &BuilderOptions,
    arrivals: &dyn Arrivals,
) -> Act {
    assert_eq!(cover.width(), fanins.len(), "cover width must match fanins");
    let names: Vec<Option<NodeId>> = fanins.iter().map(|&f| Some(f)).collect();
    let order = choose_order(cover, fanins, &names, opts, arrivals);
    let mut dag = Dag::new(cover.width());
    let root = unate_build(&mut dag, cover, &order, &names);
    let root = reduce(&mut dag, root);
    dag.sweep(&[root]);
    debug!(
        "build_act({:?}): {} live vertices under order {:?}",
        node,
        dag.live_count(),
        order.columns()
    );
    Act { dag, root, order, fanins: fanins.to_vec(), node }
}

fn choose_order(
    cover: &Cover,
    fanins: &[NodeId],
    names: &[Option<NodeId>],
    opts: &BuilderOptions,
    arrivals: &dyn Arrivals,
) -> VariableOrder {
    let width = cover.width();
    match opts.strategy {
        OrderStrategy::Fanin => orient_single_cube(VariableOrder::fanin(width), cover),
        OrderStrategy::Random => {
            let order = VariableOrder::random(width, &mut rand::thread_rng());
            orient_single_cube(order, cover)
        }
        OrderStrategy::DelayDriven => {
            let column_arrivals: Vec<f64> =
                fanins.iter().map(|&f| arrivals.arrival(f)).collect();
            VariableOrder::delay_driven(&column_arrivals)
        }
        OrderStrategy::Optimal { bound } => {
            if width <= bound {
                optimal_order(cover, names, &opts.map, arrivals)
            } else if opts.map.mode > 0.0 {
                // Above the search bound: degrade to the delay heuristic.
                let column_arrivals: Vec<f64> =
                    fanins.iter().map(|&f| arrivals.arrival(f)).collect();
                VariableOrder::delay_driven(&column_arrivals)
            } else {
                orient_single_cube(VariableOrder::fanin(width), cover)
            }
        }
    }
}

/// Exhaustive permutation search: every order is fully built and mapped,
/// the first minimal score wins.
fn optimal_order(
    cover: &Cover,
    names: &[Option<NodeId>],
    map: &MapOptions,
    arrivals: &dyn Arrivals,
) -> VariableOrder {
    let mut best: Option<(f64, VariableOrder)> = None;
    for perm in Permutations::new(cover.width()) {
        let order = VariableOrder::new(perm);
        let mut dag = Dag::new(cover.width());
        let root = shannon_build(&mut dag, cover, &order, names, 0);
        let root = reduce(&mut dag, root);
        let result = map_dag(&mut dag, root, map, arrivals);
        let score = (1.0 - map.mode) * result.blocks as f64 + map.mode * result.arrival;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, order));
        }
    }
    let (score, order) = best.expect("permutation search yields at least one order");
    debug!("optimal order {:?} with score {:.3}", order.columns(), score);
    order
}

/// Keep a chain's bottom literal positive when the cover is a single cube
/// and a positive literal exists: swap it into the deepest present position.
fn orient_single_cube(order: VariableOrder, cover: &Cover) -> VariableOrder {
    if cover.cubes().len() != 1 {
        return order;
    }
    let cube = &cover.cubes()[0];
    let mut present: Vec<usize> = cube.present().collect();
    if present.len() < 2 {
        return order;
    }
    present.sort_by_key(|&col| order.position(col));
    let bottom = *present.last().unwrap();
    if cube.lit(bottom) != Literal::Neg {
        return order;
    }
    let positive = match present.iter().rev().find(|&&col| cube.lit(col) == Literal::Pos) {
        Some(&col) => col,
        None => return order,
    };
    let mut columns = order.columns().to_vec();
    columns.swap(order.position(bottom), order.position(positive));
    VariableOrder::new(columns)
}

/// Unate-recursive construction over a fixed order. The result is raw;
/// callers reduce it.
pub fn unate_build(
    dag: &mut Dag,
    cover: &Cover,
    order: &VariableOrder,
    names: &[Option<NodeId>],
) -> VertexId {
    if cover.is_empty() {
        return dag.zero();
    }
    if cover.has_universal_row() {
        return dag.one();
    }
    if cover.cubes().len() == 1 {
        return single_cube_chain(dag, &cover.cubes()[0], order, names);
    }

    // A purely positive-unate column factors directly: F = x Q + R.
    if let Some(col) = positive_unate_column(cover) {
        debug!("unate factor on column {}", col);
        let (q, r) = factor(cover, col, Literal::Pos);
        let q_dag = unate_build(dag, &q, order, names);
        let r_dag = unate_build(dag, &r, order, names);
        let lit = dag.literal(order.position(col), names[col], false);
        let gated = apply(dag, Op::And, Phase::None, lit, q_dag);
        return apply(dag, Op::Or, Phase::None, gated, r_dag);
    }

    if let Some(col) = binate_split_column(cover) {
        debug!("binate split on column {}", col);
        let pos = cover.cofactor(col, true);
        let neg = cover.cofactor(col, false);
        let pos_dag = unate_build(dag, &pos, order, names);
        let neg_dag = unate_build(dag, &neg, order, names);
        let lit = dag.literal(order.position(col), names[col], false);
        let high = apply(dag, Op::And, Phase::None, lit, pos_dag);
        let low = apply(dag, Op::And, Phase::NegFirst, lit, neg_dag);
        return apply(dag, Op::Or, Phase::None, high, low);
    }

    // Only negative-unate columns left: factor on one of them.
    let col = negative_unate_column(cover)
        .expect("a multi-cube cover without binate columns is unate somewhere");
    debug!("negative unate factor on column {}", col);
    let (q, r) = factor(cover, col, Literal::Neg);
    let q_dag = unate_build(dag, &q, order, names);
    let r_dag = unate_build(dag, &r, order, names);
    let lit = dag.literal(order.position(col), names[col], true);
    let gated = apply(dag, Op::And, Phase::None, lit, q_dag);
    apply(dag, Op::Or, Phase::None, gated, r_dag)
}

/// Build the chain of one decision vertex per present literal of a
/// single-cube cover.
///
/// # Panics
///
/// A cover with more than one cube is a caller contract violation.
pub fn build_single_cube(
    dag: &mut Dag,
    cover: &Cover,
    order: &VariableOrder,
    names: &[Option<NodeId>],
) -> VertexId {
    assert!(
        cover.cubes().len() <= 1,
        "single-cube builder given {} rows",
        cover.cubes().len()
    );
    match cover.cubes().first() {
        None => dag.zero(),
        Some(cube) => single_cube_chain(dag, cube, order, names),
    }
}

fn single_cube_chain(
    dag: &mut Dag,
    cube: &Cube,
    order: &VariableOrder,
    names: &[Option<NodeId>],
) -> VertexId {
    let mut present: Vec<usize> = cube.present().collect();
    present.sort_by_key(|&col| order.position(col));
    let mut current = dag.one();
    for &col in present.iter().rev() {
        let index = order.position(col);
        current = match cube.lit(col) {
            Literal::Pos => dag.decision(index, names[col], dag.zero(), current),
            Literal::Neg => dag.decision(index, names[col], current, dag.zero()),
            Literal::Absent => unreachable!("absent literal among present columns"),
        };
    }
    current
}

/// Shannon expansion over the fixed order, skipping redundant splits.
pub fn shannon_build(
    dag: &mut Dag,
    cover: &Cover,
    order: &VariableOrder,
    names: &[Option<NodeId>],
    pos: usize,
) -> VertexId {
    if cover.is_empty() {
        return dag.zero();
    }
    if cover.has_universal_row() {
        return dag.one();
    }
    assert!(pos < order.len(), "literals left after the last order position");
    let col = order.column(pos);
    let p = cover.cofactor(col, true);
    let n = cover.cofactor(col, false);
    if p.same_cubes(&n) {
        // The split is redundant: both cofactors are the same cube set.
        return shannon_build(dag, &p, order, names, pos + 1);
    }
    let high = shannon_build(dag, &p, order, names, pos + 1);
    let low = shannon_build(dag, &n, order, names, pos + 1);
    if high == low {
        return high;
    }
    dag.decision(pos, names[col], low, high)
}

fn positive_unate_column(cover: &Cover) -> Option<usize> {
    (0..cover.width()).find(|&col| {
        let (pos, neg) = cover.counts(col);
        pos > 0 && neg == 0
    })
}

fn negative_unate_column(cover: &Cover) -> Option<usize> {
    (0..cover.width()).find(|&col| {
        let (pos, neg) = cover.counts(col);
        neg > 0 && pos == 0
    })
}

/// The binate column with the most occurrences; ties go to the most
/// balanced positive/negative split, then to the lowest column.
fn binate_split_column(cover: &Cover) -> Option<usize> {
    let mut best: Option<(usize, usize, usize)> = None; // (col, total, imbalance)
    for col in 0..cover.width() {
        let (pos, neg) = cover.counts(col);
        if pos == 0 || neg == 0 {
            continue;
        }
        let total = pos + neg;
        let imbalance = pos.max(neg) - pos.min(neg);
        let better = match best {
            None => true,
            Some((_, bt, bi)) => total > bt || (total == bt && imbalance < bi),
        };
        if better {
            best = Some((col, total, imbalance));
        }
    }
    best.map(|(col, _, _)| col)
}

/// `F = lit(col) Q + R`: `q` are the cubes carrying the literal (with the
/// column dropped), `r` the cubes without the column.
fn factor(cover: &Cover, col: usize, phase: Literal) -> (Cover, Cover) {
    let mut q = Cover::empty(cover.width());
    let mut r = Cover::empty(cover.width());
    for cube in cover.cubes() {
        if cube.lit(col) == phase {
            q.add_cube(cube.with(col, Literal::Absent));
        } else {
            debug_assert_eq!(cube.lit(col), Literal::Absent, "column is not unate");
            r.add_cube(cube.clone());
        }
    }
    (q, r)
}

/// Build one diagram per internal node of the network along a network-wide
/// order derived from breadth-first level ranking: each node's fanin
/// variables are ordered by ascending level (ties by node id), and the
/// node's cover is composed through Apply — AND within a cube, with the
/// negated-input phase for negative literals, OR across cubes.
pub fn build_global_acts(net: &Network) -> FxHashMap<NodeId, Act> {
    let levels = net.bfs_levels();
    let mut acts = FxHashMap::default();
    for node in net.internal_ids() {
        let fanins = net.fanins(node).to_vec();
        let cover = net.node(node).cover.clone();
        let mut columns: Vec<usize> = (0..fanins.len()).collect();
        columns.sort_by_key(|&c| (levels[&fanins[c]], fanins[c]));
        let order = VariableOrder::new(columns);
        let names: Vec<Option<NodeId>> = fanins.iter().map(|&f| Some(f)).collect();

        let mut dag = Dag::new(cover.width());
        let mut root = dag.zero();
        for cube in cover.cubes() {
            let mut product = dag.one();
            for col in cube.present() {
                let lit = dag.literal(order.position(col), names[col], false);
                let phase = if cube.lit(col) == Literal::Neg {
                    Phase::NegSecond
                } else {
                    Phase::None
                };
                product = apply(&mut dag, Op::And, phase, product, lit);
            }
            root = apply(&mut dag, Op::Or, Phase::None, root, product);
        }
        let root = reduce(&mut dag, root);
        dag.sweep(&[root]);
        acts.insert(node, Act { dag, root, order, fanins, node: Some(node) });
    }
    acts
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cover::Cover;
    use crate::map::NoArrivals;
    use crate::network::Network;
    use crate::order::DEFAULT_OPTIMAL_BOUND;

    fn assignments(width: usize) -> impl Iterator<Item = Vec<bool>> {
        (0..1usize << width).map(move |bits| (0..width).map(|i| bits >> i & 1 == 1).collect())
    }

    fn fake_fanins(width: usize) -> Vec<NodeId> {
        (0..width).map(|i| NodeId::new(i as u32)).collect()
    }

    /// Evaluate an act against the cover on every assignment (assignments
    /// indexed by column, the diagram by order position).
    fn check_function(act: &Act, cover: &Cover) {
        for values in assignments(cover.width()) {
            let by_position: Vec<bool> =
                (0..cover.width()).map(|pos| values[act.order.column(pos)]).collect();
            assert_eq!(
                act.dag.eval(act.root, &by_position),
                cover.eval(&values),
                "mismatch at {:?}",
                values
            );
        }
    }

    fn fanin_opts() -> BuilderOptions {
        BuilderOptions { strategy: OrderStrategy::Fanin, ..Default::default() }
    }

    #[test]
    fn test_tautology_and_empty() {
        let opts = fanin_opts();
        let cover = Cover::universe(2);
        let act = build_act(&cover, &fake_fanins(2), None, &opts, &NoArrivals);
        assert!(act.dag.is_one(act.root));

        let cover = Cover::empty(2);
        let act = build_act(&cover, &fake_fanins(2), None, &opts, &NoArrivals);
        assert!(act.dag.is_zero(act.root));
    }

    #[test]
    fn test_single_cube_chain_shape() {
        let cover = Cover::parse(3, &["101"]);
        let mut act = build_act(&cover, &fake_fanins(3), None, &fanin_opts(), &NoArrivals);
        check_function(&act, &cover);
        // Three present literals, two terminals.
        assert_eq!(act.vertex_count(), 5);
    }

    #[test]
    fn test_single_cube_orientation() {
        // The bottom literal under fanin order would be negative; the chain
        // is oriented so a positive literal sits at the bottom.
        let cover = Cover::parse(3, &["1-0"]);
        let act = build_act(&cover, &fake_fanins(3), None, &fanin_opts(), &NoArrivals);
        check_function(&act, &cover);
        // Deepest decision vertex: its positive branch is the 1-terminal.
        let mut v = act.root;
        while !act.dag.is_terminal(act.dag.high(v)) || !act.dag.is_terminal(act.dag.low(v)) {
            v = if act.dag.is_terminal(act.dag.low(v)) {
                act.dag.high(v)
            } else {
                act.dag.low(v)
            };
        }
        assert!(act.dag.is_one(act.dag.high(v)), "bottom literal is negated");
    }

    #[test]
    #[should_panic(expected = "single-cube builder given 2 rows")]
    fn test_single_cube_contract() {
        let cover = Cover::parse(2, &["1-", "-1"]);
        let mut dag = Dag::new(2);
        let order = VariableOrder::fanin(2);
        let _ = build_single_cube(&mut dag, &cover, &order, &[None, None]);
    }

    #[test]
    fn test_unate_build_functions() {
        let cases: Vec<(usize, Vec<&str>)> = vec![
            (3, vec!["11-", "0-1"]),
            (3, vec!["1-0", "01-", "--1"]),
            (4, vec!["1100", "0011", "1-1-"]),
            (2, vec!["10", "01"]),
        ];
        for (width, rows) in cases {
            let cover = Cover::parse(width, &rows);
            let act = build_act(&cover, &fake_fanins(width), None, &fanin_opts(), &NoArrivals);
            check_function(&act, &cover);
        }
    }

    #[test]
    fn test_binate_split_prefers_frequent_balanced() {
        // Column 1 occurs in all three cubes with both phases; column 0 is
        // binate but rarer.
        let cover = Cover::parse(3, &["11-", "00-", "-11"]);
        assert_eq!(binate_split_column(&cover), Some(1));
    }

    #[test]
    fn test_canonical_result() {
        // The built diagram is reduced: no duplicate (index, low, high).
        let cover = Cover::parse(3, &["11-", "0-1"]);
        let mut act = build_act(&cover, &fake_fanins(3), None, &fanin_opts(), &NoArrivals);
        let root = act.root;
        let again = reduce(&mut act.dag, root);
        assert_eq!(again, root);
    }

    #[test]
    fn test_optimal_not_worse_than_fanin() {
        // {a b, a' c} mapped after optimal-order search is never worse than
        // raw fanin order.
        let cover = Cover::parse(3, &["11-", "0-1"]);
        let fanins = fake_fanins(3);

        let mut fanin_act = build_act(&cover, &fanins, None, &fanin_opts(), &NoArrivals);
        let fanin_blocks = fanin_act.map(&MapOptions::default(), &NoArrivals).blocks;

        let optimal = BuilderOptions {
            strategy: OrderStrategy::Optimal { bound: DEFAULT_OPTIMAL_BOUND },
            ..Default::default()
        };
        let mut optimal_act = build_act(&cover, &fanins, None, &optimal, &NoArrivals);
        let optimal_blocks = optimal_act.map(&MapOptions::default(), &NoArrivals).blocks;

        check_function(&optimal_act, &cover);
        assert!(optimal_blocks <= fanin_blocks);
    }

    #[test]
    fn test_optimal_above_bound_degrades() {
        // Seven inputs with bound six: the search silently falls back to the
        // fanin heuristic.
        let cover = Cover::parse(7, &["1111111"]);
        let opts = BuilderOptions {
            strategy: OrderStrategy::Optimal { bound: 6 },
            ..Default::default()
        };
        let act = build_act(&cover, &fake_fanins(7), None, &opts, &NoArrivals);
        check_function(&act, &cover);
    }

    #[test]
    fn test_delay_driven_order() {
        let cover = Cover::parse(3, &["111"]);
        let fanins = fake_fanins(3);
        let arrivals: FxHashMap<NodeId, f64> =
            [(fanins[0], 1.0), (fanins[1], 9.0), (fanins[2], 4.0)].into_iter().collect();
        let opts = BuilderOptions {
            strategy: OrderStrategy::DelayDriven,
            ..Default::default()
        };
        let act = build_act(&cover, &fanins, None, &opts, &arrivals);
        // The latest input (column 1) is tested first.
        assert_eq!(act.order.columns()[0], 1);
        check_function(&act, &cover);
    }

    #[test]
    fn test_random_order_still_correct() {
        let cover = Cover::parse(4, &["11--", "--11", "1--0"]);
        let opts = BuilderOptions { strategy: OrderStrategy::Random, ..Default::default() };
        for _ in 0..5 {
            let act = build_act(&cover, &fake_fanins(4), None, &opts, &NoArrivals);
            check_function(&act, &cover);
        }
    }

    #[test]
    fn test_global_acts() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let c = net.add_input("c");
        let f = net.add_internal("f", vec![a, b], Cover::parse(2, &["11"]));
        let g = net.add_internal("g", vec![f, c], Cover::parse(2, &["1-", "-1"]));
        let acts = build_global_acts(&net);
        assert_eq!(acts.len(), 2);

        let act_g = &acts[&g];
        // g's fanins: f at level 1, c at level 0; c is ordered first.
        assert_eq!(act_g.order.column(0), 1);
        let act_f = &acts[&f];
        for values in assignments(2) {
            let by_position: Vec<bool> =
                (0..2).map(|pos| values[act_f.order.column(pos)]).collect();
            assert_eq!(act_f.dag.eval(act_f.root, &by_position), values[0] && values[1]);
        }
    }
}
