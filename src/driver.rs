//! The iterative network driver.
//!
//! Repeatedly re-derives and remaps nodes until the gain of one iteration
//! drops below `gain_factor * current_total_cost` (or the iteration cap):
//!
//! 1. **Decomposition** splits over-sized nodes into feasible sub-nodes,
//!    trying several construction heuristics — a cube-set split recombined
//!    by OR, a cofactor split on the most binate input, and a literal-set
//!    split for lone cubes — and committing the cheapest.
//! 2. **Partial collapse** scores collapsing each node into all of its
//!    consumers and picks a maximum-weight disjoint set of collapses,
//!    exactly through the external ILP solver when one is configured and
//!    answers, greedily otherwise.
//!
//! An optional final phase-inversion pass flips a node's implemented
//! polarity — complementing its cover and the corresponding literal phase
//! one level into its fanout — whenever that lowers the block count.

use fxhash::FxHashMap;
use log::{debug, info};

use crate::builder::{build_act, Act, BuilderOptions};
use crate::cover::Cover;
use crate::ilp::{solve_with_fallback, ExternalIlp, Problem};
use crate::map::{MapOptions, MapResult};
use crate::network::{Network, NodeId, NodeRole};
use crate::order::OrderStrategy;

/// Options steering the driver.
pub struct DriverOptions {
    pub strategy: OrderStrategy,
    pub map: MapOptions,
    /// An iteration stops the loop when its gain falls below
    /// `gain_factor * current_total_cost`.
    pub gain_factor: f64,
    /// Nodes with more fanins than this are decomposition candidates.
    pub decomp_fanin_limit: usize,
    /// Run the final polarity-flipping pass.
    pub phase_inversion: bool,
    /// External ILP solver for collapse selection; greedy fallback when
    /// absent or failing.
    pub ilp: Option<ExternalIlp>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            strategy: OrderStrategy::default(),
            map: MapOptions::default(),
            gain_factor: 0.01,
            decomp_fanin_limit: 8,
            phase_inversion: false,
            ilp: None,
        }
    }
}

/// Per-node mapping cost bookkeeping.
///
/// `cost_and_arrival` is `None` when unknown — records are invalidated
/// whenever area and delay are recombined under a new weighting.
pub struct CostRecord {
    pub cost_and_arrival: Option<(u32, f64)>,
    pub required: f64,
    pub slack: f64,
    /// Collapse gain computed for this node in the last collapse pass.
    pub area_weight: f64,
    pub act: Option<Act>,
}

impl CostRecord {
    fn unknown() -> Self {
        Self {
            cost_and_arrival: None,
            required: f64::INFINITY,
            slack: f64::INFINITY,
            area_weight: 0.0,
            act: None,
        }
    }

    pub fn blocks(&self) -> u32 {
        self.cost_and_arrival.expect("cost queried while unknown").0
    }

    pub fn arrival(&self) -> f64 {
        self.cost_and_arrival.expect("arrival queried while unknown").1
    }
}

/// The outcome of one driver run.
#[derive(Debug, Clone, Copy)]
pub struct DriverReport {
    pub iterations: usize,
    pub initial_blocks: u32,
    pub total_blocks: u32,
}

pub struct Driver {
    net: Network,
    opts: DriverOptions,
    records: FxHashMap<NodeId, CostRecord>,
}

impl Driver {
    pub const ITERATION_CAP: usize = 10;

    pub fn new(net: Network, opts: DriverOptions) -> Self {
        Self { net, opts, records: FxHashMap::default() }
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn record(&self, id: NodeId) -> Option<&CostRecord> {
        self.records.get(&id)
    }

    pub fn into_network(self) -> Network {
        self.net
    }

    fn builder_options(&self) -> BuilderOptions {
        BuilderOptions { strategy: self.opts.strategy, map: self.opts.map.clone() }
    }

    fn arrivals_snapshot(&self) -> FxHashMap<NodeId, f64> {
        self.net.node_ids().map(|id| (id, self.net.node(id).arrival)).collect()
    }

    /// Build and map a prospective cover without touching any record.
    fn evaluate_cover(
        &self,
        cover: &Cover,
        fanins: &[NodeId],
        node: Option<NodeId>,
    ) -> (Act, MapResult) {
        let arrivals = self.arrivals_snapshot();
        let mut act = build_act(cover, fanins, node, &self.builder_options(), &arrivals);
        let result = act.map(&self.opts.map, &arrivals);
        (act, result)
    }

    /// The node's block count; the cost record is created lazily on the
    /// first query and refreshed when unknown.
    pub fn ensure_cost(&mut self, id: NodeId) -> u32 {
        if let Some(record) = self.records.get(&id) {
            if let Some((blocks, _)) = record.cost_and_arrival {
                return blocks;
            }
        }
        let node = self.net.node(id);
        assert_eq!(node.role, NodeRole::Internal, "only internal nodes are mapped");
        let cover = node.cover.clone();
        let fanins = node.fanins.clone();
        let (act, result) = self.evaluate_cover(&cover, &fanins, Some(id));
        let record = self.records.entry(id).or_insert_with(CostRecord::unknown);
        record.cost_and_arrival = Some((result.blocks, result.arrival));
        record.act = Some(act);
        result.blocks
    }

    fn invalidate(&mut self, id: NodeId) {
        if let Some(record) = self.records.get_mut(&id) {
            record.cost_and_arrival = None;
            record.act = None;
        }
    }

    /// Invalidate every cached cost; called when the area/delay weighting
    /// changes.
    pub fn set_mode(&mut self, mode: f64) {
        assert!((0.0..=1.0).contains(&mode), "mode must lie in [0, 1]");
        self.opts.map.mode = mode;
        for record in self.records.values_mut() {
            record.cost_and_arrival = None;
            record.act = None;
        }
    }

    pub fn total_cost(&mut self) -> u32 {
        let ids = self.net.internal_ids();
        ids.into_iter().map(|id| self.ensure_cost(id)).sum()
    }

    /// The main iteration loop.
    pub fn run(&mut self) -> DriverReport {
        let initial_blocks = self.total_cost();
        let mut iterations = 0;
        loop {
            iterations += 1;
            let before = self.total_cost();
            self.decompose_pass();
            self.collapse_pass();
            let after = self.total_cost();
            let gain = before.saturating_sub(after);
            info!(
                "iteration {}: {} -> {} blocks (gain {})",
                iterations, before, after, gain
            );
            if gain == 0
                || (gain as f64) < self.opts.gain_factor * after as f64
                || iterations >= Self::ITERATION_CAP
            {
                break;
            }
        }
        if self.opts.phase_inversion {
            self.phase_inversion_pass();
        }
        DriverReport { iterations, initial_blocks, total_blocks: self.total_cost() }
    }

    // ----- decomposition -----

    fn decompose_pass(&mut self) {
        let candidates: Vec<NodeId> = self
            .net
            .internal_ids()
            .into_iter()
            .filter(|&id| self.net.fanins(id).len() > self.opts.decomp_fanin_limit)
            .collect();
        for id in candidates {
            self.try_decompose(id);
        }
    }

    /// Split one over-sized node into two sub-nodes plus a feasible top
    /// node, choosing the lower-cost of the applicable split heuristics.
    /// The split is committed even when it does not beat the node's current
    /// cost: an over-sized node must become feasible.
    fn try_decompose(&mut self, id: NodeId) {
        let current = self.ensure_cost(id);
        let cover = self.net.node(id).cover.clone();
        let fanins = self.net.fanins(id).to_vec();
        let name = self.net.node(id).name.clone();

        let mut alternatives = Vec::new();

        // Heuristic A: cube-set split, recombined by an OR node.
        if cover.cubes().len() >= 2 {
            let mid = cover.cubes().len() / 2;
            let first = Cover::from_cubes(cover.width(), cover.cubes()[..mid].to_vec());
            let second = Cover::from_cubes(cover.width(), cover.cubes()[mid..].to_vec());
            alternatives.push((first, second, Cover::parse(2, &["1-", "-1"]), None));
        }

        // Heuristic B: cofactor split on the most binate column, recombined
        // by a select node.
        if let Some(col) = most_binate_column(&cover) {
            let pos = cover.cofactor(col, true);
            let neg = cover.cofactor(col, false);
            alternatives.push((pos, neg, Cover::parse(3, &["11-", "0-1"]), Some(fanins[col])));
        }

        // Heuristic C: a lone cube splits its literal set in half,
        // recombined by an AND node.
        if cover.cubes().len() == 1 {
            let cube = &cover.cubes()[0];
            let present: Vec<usize> = cube.present().collect();
            if present.len() >= 2 {
                let mut first = cube.clone();
                let mut second = cube.clone();
                for (i, &col) in present.iter().enumerate() {
                    if i < present.len() / 2 {
                        second.set(col, crate::cover::Literal::Absent);
                    } else {
                        first.set(col, crate::cover::Literal::Absent);
                    }
                }
                alternatives.push((
                    Cover::from_cubes(cover.width(), vec![first]),
                    Cover::from_cubes(cover.width(), vec![second]),
                    Cover::parse(2, &["11"]),
                    None,
                ));
            }
        }

        let mut best: Option<(u32, DecompPlan)> = None;
        for (first, second, top, select) in alternatives {
            let (first_cover, first_fanins) = prune(&first, &fanins);
            let (second_cover, second_fanins) = prune(&second, &fanins);
            let (_, first_result) = self.evaluate_cover(&first_cover, &first_fanins, None);
            let (_, second_result) = self.evaluate_cover(&second_cover, &second_fanins, None);
            // The top node is an OR or a select over fresh sub-nodes; its
            // cost does not depend on their identities.
            let placeholder: Vec<NodeId> = match select {
                Some(s) => vec![s, id, id],
                None => vec![id, id],
            };
            let (_, top_result) = self.evaluate_cover(&top, &placeholder, None);
            let total = first_result.blocks + second_result.blocks + top_result.blocks;
            if best.as_ref().map_or(true, |(t, _)| total < *t) {
                let plan = DecompPlan {
                    first: (first_cover, first_fanins),
                    second: (second_cover, second_fanins),
                    top,
                    select,
                };
                best = Some((total, plan));
            }
        }

        let (total, plan) = match best {
            Some(best) => best,
            None => return,
        };

        let (first_cover, first_fanins) = plan.first;
        let (second_cover, second_fanins) = plan.second;
        let first = self.net.add_internal(format!("{}_d0", name), first_fanins, first_cover);
        let second = self.net.add_internal(format!("{}_d1", name), second_fanins, second_cover);
        let top_fanins = match plan.select {
            Some(s) => vec![s, first, second],
            None => vec![first, second],
        };
        self.net.replace_cover(id, top_fanins, plan.top);
        debug!("decomposed {} into {} + {} ({} -> {} blocks)", id, first, second, current, total);
        self.invalidate(id);
        self.ensure_cost(first);
        self.ensure_cost(second);
        self.ensure_cost(id);
    }

    // ----- partial collapse -----

    fn collapse_pass(&mut self) {
        let mut candidates: Vec<(NodeId, f64)> = Vec::new();
        for n in self.net.internal_ids() {
            let consumers = self.net.fanouts(n).to_vec();
            if consumers.is_empty()
                || consumers
                    .iter()
                    .any(|&c| self.net.node(c).role != NodeRole::Internal)
            {
                continue;
            }
            let mut old = self.ensure_cost(n);
            for &c in &consumers {
                old += self.ensure_cost(c);
            }
            let mut new = 0;
            for &c in &consumers {
                let (fanins, cover) = self.net.collapsed_function(n, c);
                let (_, result) = self.evaluate_cover(&cover, &fanins, Some(c));
                new += result.blocks;
            }
            let gain = old as f64 - new as f64;
            if let Some(record) = self.records.get_mut(&n) {
                record.area_weight = gain;
            }
            if gain > 0.0 {
                debug!("collapse candidate {}: gain {}", n, gain);
                candidates.push((n, gain));
            }
        }
        if candidates.is_empty() {
            return;
        }

        // Clusters must be disjoint: one row per network node that appears
        // in more than one cluster.
        let mut member_of: FxHashMap<NodeId, Vec<usize>> = FxHashMap::default();
        for (i, &(n, _)) in candidates.iter().enumerate() {
            member_of.entry(n).or_default().push(i);
            for &c in self.net.fanouts(n) {
                member_of.entry(c).or_default().push(i);
            }
        }
        let problem = Problem {
            weights: candidates.iter().map(|&(_, g)| g).collect(),
            constraints: member_of.into_values().filter(|row| row.len() > 1).collect(),
        };
        let solution = solve_with_fallback(self.opts.ilp.as_ref(), &problem);

        for (i, &(n, gain)) in candidates.iter().enumerate() {
            if !solution.chosen[i] {
                continue;
            }
            debug!("collapsing {} (gain {})", n, gain);
            for c in self.net.fanouts(n).to_vec() {
                self.net.collapse_into(n, c);
                self.invalidate(c);
            }
            assert!(self.net.fanouts(n).is_empty(), "collapse left {} driving nodes", n);
            self.net.remove(n);
            self.records.remove(&n);
        }
    }

    // ----- phase inversion -----

    /// Greedily flip a node's implemented polarity when the flip, together
    /// with the literal-phase change in one level of fanout, lowers the
    /// total block count.
    fn phase_inversion_pass(&mut self) {
        for n in self.net.internal_ids() {
            let consumers = self.net.fanouts(n).to_vec();
            if consumers.is_empty()
                || consumers
                    .iter()
                    .any(|&c| self.net.node(c).role != NodeRole::Internal)
            {
                continue;
            }

            let mut old = self.ensure_cost(n);
            for &c in &consumers {
                old += self.ensure_cost(c);
            }

            let flipped = self.net.node(n).cover.complement();
            let fanins = self.net.fanins(n).to_vec();
            let (_, flipped_result) = self.evaluate_cover(&flipped, &fanins, Some(n));
            let mut new = flipped_result.blocks;
            let mut consumer_covers = Vec::new();
            for &c in &consumers {
                let col = self
                    .net
                    .fanins(c)
                    .iter()
                    .position(|&f| f == n)
                    .expect("consumer lost its fanin");
                let cover = self.net.node(c).cover.negate_column(col);
                let c_fanins = self.net.fanins(c).to_vec();
                let (_, result) = self.evaluate_cover(&cover, &c_fanins, Some(c));
                new += result.blocks;
                consumer_covers.push((c, c_fanins, cover));
            }

            if new < old {
                info!("phase inversion of {}: {} -> {} blocks", n, old, new);
                self.net.replace_cover(n, fanins, flipped);
                self.invalidate(n);
                for (c, c_fanins, cover) in consumer_covers {
                    self.net.replace_cover(c, c_fanins, cover);
                    self.invalidate(c);
                }
            }
        }
    }

    /// The break pass: ensure every internal node is mapped, then explode
    /// the mapped network into one instance per basic block.
    pub fn netlist(&mut self) -> crate::netlist::Netlist {
        for id in self.net.internal_ids() {
            self.ensure_cost(id);
        }
        let acts: FxHashMap<NodeId, &Act> = self
            .records
            .iter()
            .filter_map(|(&id, record)| record.act.as_ref().map(|act| (id, act)))
            .collect();
        crate::netlist::Netlist::build(&self.net, &acts, &self.opts.map)
    }

    // ----- delay trace -----

    /// Forward arrival propagation in topological order, then backward
    /// required-time and slack computation from the outputs.
    ///
    /// # Panics
    ///
    /// An internal node with zero fanouts is fatal: no meaningful
    /// propagation delay can be assigned to it.
    pub fn delay_trace(&mut self) {
        let order = self.net.topo_order();
        for &id in &order {
            match self.net.node(id).role {
                NodeRole::PrimaryInput => {}
                NodeRole::Constant => self.net.node_mut(id).arrival = 0.0,
                NodeRole::PrimaryOutput => {
                    let source = self.net.fanins(id)[0];
                    let arrival = self.net.node(source).arrival;
                    self.net.node_mut(id).arrival = arrival;
                }
                NodeRole::Internal => {
                    self.invalidate(id);
                    self.ensure_cost(id);
                    let arrival = self.records[&id].arrival();
                    self.net.node_mut(id).arrival = arrival;
                }
            }
        }

        let latest = self
            .net
            .primary_outputs()
            .iter()
            .map(|&po| self.net.node(po).arrival)
            .fold(0.0f64, f64::max);

        for &id in order.iter().rev() {
            let node = self.net.node(id);
            match node.role {
                NodeRole::PrimaryOutput => {
                    let required =
                        if node.required.is_finite() { node.required } else { latest };
                    self.net.node_mut(id).required = required;
                }
                NodeRole::Internal | NodeRole::PrimaryInput => {
                    let fanouts = self.net.fanouts(id);
                    if node.role == NodeRole::Internal && fanouts.is_empty() {
                        panic!("node {} has zero fanouts during delay trace", id);
                    }
                    let arrival = node.arrival;
                    let required = fanouts
                        .iter()
                        .map(|&c| {
                            let consumer = self.net.node(c);
                            consumer.required - (consumer.arrival - arrival)
                        })
                        .fold(f64::INFINITY, f64::min);
                    self.net.node_mut(id).required = required;
                    if let Some(record) = self.records.get_mut(&id) {
                        record.required = required;
                        record.slack = required - arrival;
                    }
                }
                NodeRole::Constant => {}
            }
        }
    }
}

struct DecompPlan {
    first: (Cover, Vec<NodeId>),
    second: (Cover, Vec<NodeId>),
    top: Cover,
    select: Option<NodeId>,
}

/// Restrict a cover to its support columns, with the matching fanins.
fn prune(cover: &Cover, fanins: &[NodeId]) -> (Cover, Vec<NodeId>) {
    let support = cover.support();
    let mut col_map = vec![usize::MAX; cover.width()];
    let mut kept = Vec::with_capacity(support.len());
    for (new_col, &old_col) in support.iter().enumerate() {
        col_map[old_col] = new_col;
        kept.push(fanins[old_col]);
    }
    let mut pruned = Cover::empty(support.len());
    for cube in cover.cubes() {
        let mut lits = vec![crate::cover::Literal::Absent; support.len()];
        for col in cube.present() {
            lits[col_map[col]] = cube.lit(col);
        }
        pruned.add_cube(crate::cover::Cube::from_lits(lits));
    }
    (pruned, kept)
}

fn most_binate_column(cover: &Cover) -> Option<usize> {
    let mut best: Option<(usize, usize, usize)> = None;
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

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::delay::DelayTable;

    fn and2(net: &mut Network, name: &str, a: NodeId, b: NodeId) -> NodeId {
        net.add_internal(name, vec![a, b], Cover::parse(2, &["11"]))
    }

    fn area_driver(net: Network) -> Driver {
        Driver::new(net, DriverOptions::default())
    }

    #[test]
    fn test_zero_collapse_terminates_in_one_iteration() {
        // A single internal node into a primary output: nothing to collapse
        // or decompose, so the loop stops after one iteration with gain 0.
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let f = and2(&mut net, "f", a, b);
        net.add_output("o", f);

        let mut driver = area_driver(net);
        let report = driver.run();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.initial_blocks, report.total_blocks);
        assert_eq!(report.total_blocks, 1);
    }

    #[test]
    fn test_collapse_merges_cheap_chain() {
        // f = a b, g = f c: collapsing f into g gives one 3-AND block
        // instead of two blocks.
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let c = net.add_input("c");
        let f = and2(&mut net, "f", a, b);
        let g = and2(&mut net, "g", f, c);
        net.add_output("o", g);

        let mut driver = area_driver(net);
        let report = driver.run();
        assert_eq!(report.initial_blocks, 2);
        assert_eq!(report.total_blocks, 1);
        assert!(!driver.network().exists(f));
        // The survivor computes a b c.
        assert_eq!(driver.network().fanins(g).len(), 3);
    }

    #[test]
    fn test_decompose_oversized_node() {
        // A 10-input conjunction with a tight fanin limit gets split and the
        // network stays functionally a 10-AND.
        let mut net = Network::new("t");
        let inputs: Vec<NodeId> = (0..10).map(|i| net.add_input(format!("i{}", i))).collect();
        let wide = net.add_internal(
            "wide",
            inputs.clone(),
            Cover::parse(10, &["1111111111"]),
        );
        net.add_output("o", wide);

        let opts = DriverOptions {
            decomp_fanin_limit: 6,
            strategy: OrderStrategy::Fanin,
            ..Default::default()
        };
        let mut driver = Driver::new(net, opts);
        let before = driver.total_cost();
        driver.decompose_pass();
        let after = driver.total_cost();
        assert!(after <= before);
        assert!(driver.network().fanins(wide).len() <= 6);
    }

    #[test]
    fn test_phase_inversion_never_worse() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let c = net.add_input("c");
        // f = a' b' (complement is the cheap OR a + b), consumed negatively.
        let f = net.add_internal("f", vec![a, b], Cover::parse(2, &["00"]));
        let g = net.add_internal("g", vec![f, c], Cover::parse(2, &["01"]));
        net.add_output("o", g);

        let opts = DriverOptions { phase_inversion: true, ..Default::default() };
        let mut driver = Driver::new(net, opts);
        let before = driver.total_cost();
        driver.phase_inversion_pass();
        let after = driver.total_cost();
        assert!(after <= before);
    }

    #[test]
    fn test_delay_trace_arrivals_and_slack() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        net.node_mut(a).arrival = 1.0;
        let f = and2(&mut net, "f", a, b);
        net.add_output("o", f);

        let opts = DriverOptions {
            map: MapOptions {
                mode: 1.0,
                delay_table: Some(DelayTable::from_delays(vec![0.0, 2.0, 3.0])),
                use_or_gate: true,
            },
            ..Default::default()
        };
        let mut driver = Driver::new(net, opts);
        driver.delay_trace();
        let net = driver.network();
        // f: latest input 1.0 plus the fanout-1 block delay.
        assert!((net.node(f).arrival - 3.0).abs() < 1e-9);
        let record = driver.record(f).unwrap();
        assert!((record.slack - 0.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "zero fanouts during delay trace")]
    fn test_delay_trace_dangling_node_is_fatal() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let _f = and2(&mut net, "f", a, b);

        let mut driver = area_driver(net);
        driver.delay_trace();
    }

    #[test]
    fn test_break_pass_emits_netlist() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let c = net.add_input("c");
        let f = and2(&mut net, "f", a, b);
        let g = net.add_internal("g", vec![f, c], Cover::parse(2, &["1-", "-1"]));
        net.add_output("o", g);

        let mut driver = area_driver(net);
        let report = driver.run();
        let netlist = driver.netlist();
        assert_eq!(netlist.instances.len() as u32, report.total_blocks);
        let text = netlist.render();
        assert!(text.contains("module t"));
        assert!(text.contains("connect o g"));
    }

    #[test]
    fn test_set_mode_invalidates_records() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let f = and2(&mut net, "f", a, b);
        net.add_output("o", f);

        let mut driver = Driver::new(net, DriverOptions {
            map: MapOptions {
                mode: 0.0,
                delay_table: Some(DelayTable::from_delays(vec![0.0, 2.0, 3.0])),
                use_or_gate: true,
            },
            ..Default::default()
        });
        driver.ensure_cost(f);
        assert!(driver.record(f).unwrap().cost_and_arrival.is_some());
        driver.set_mode(0.5);
        assert!(driver.record(f).unwrap().cost_and_arrival.is_none());
        driver.ensure_cost(f);
        assert!(driver.record(f).unwrap().cost_and_arrival.is_some());
    }
}
