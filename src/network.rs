//! The logic-network model consumed by the driver and the mapper.
//!
//! This is the crate-side embodiment of the host synthesis framework's
//! network interface: nodes with typed roles, a cube cover over explicit
//! fanins per internal node, fanin/fanout iteration, and the
//! duplication/replacement/collapse primitives the iterative driver relies
//! on. Arrival and required times are stored per node and queried by the
//! delay-mode mapper.

use std::fmt::{Display, Formatter};

use fxhash::FxHashMap;
use log::debug;

use crate::cover::{Cover, Literal};

/// A compact handle to a node inside a [`Network`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The role of a node in the network.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NodeRole {
    PrimaryInput,
    PrimaryOutput,
    Internal,
    /// A constant rail; the constant is the node's (zero-input) cover.
    Constant,
}

/// One node: a named function of its fanins.
///
/// Internal nodes carry a cover whose columns correspond one-to-one to
/// `fanins`. Primary outputs are single-fanin buffers. Primary inputs and
/// constants have no fanins.
#[derive(Debug, Clone)]
pub struct NetNode {
    pub name: String,
    pub role: NodeRole,
    pub fanins: Vec<NodeId>,
    pub cover: Cover,
    pub arrival: f64,
    pub required: f64,
}

/// A combinational logic network.
pub struct Network {
    name: String,
    nodes: Vec<Option<NetNode>>,
    fanouts: Vec<Vec<NodeId>>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            fanouts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, node: NetNode) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        for &fanin in &node.fanins {
            self.fanouts[fanin.index()].push(id);
        }
        self.nodes.push(Some(node));
        self.fanouts.push(Vec::new());
        id
    }

    pub fn add_input(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NetNode {
            name: name.into(),
            role: NodeRole::PrimaryInput,
            fanins: Vec::new(),
            cover: Cover::empty(0),
            arrival: 0.0,
            required: f64::INFINITY,
        })
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: bool) -> NodeId {
        let cover = if value { Cover::universe(0) } else { Cover::empty(0) };
        self.push(NetNode {
            name: name.into(),
            role: NodeRole::Constant,
            fanins: Vec::new(),
            cover,
            arrival: 0.0,
            required: f64::INFINITY,
        })
    }

    pub fn add_internal(
        &mut self,
        name: impl Into<String>,
        fanins: Vec<NodeId>,
        cover: Cover,
    ) -> NodeId {
        assert_eq!(cover.width(), fanins.len(), "cover width must match fanins");
        self.push(NetNode {
            name: name.into(),
            role: NodeRole::Internal,
            fanins,
            cover,
            arrival: 0.0,
            required: f64::INFINITY,
        })
    }

    /// A primary output: a buffer over a single source node.
    pub fn add_output(&mut self, name: impl Into<String>, source: NodeId) -> NodeId {
        self.push(NetNode {
            name: name.into(),
            role: NodeRole::PrimaryOutput,
            fanins: vec![source],
            cover: Cover::parse(1, &["1"]),
            arrival: 0.0,
            required: f64::INFINITY,
        })
    }

    pub fn exists(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    pub fn node(&self, id: NodeId) -> &NetNode {
        self.nodes[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("access to removed node {}", id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NetNode {
        self.nodes[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("access to removed node {}", id))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId::new(i as u32))
    }

    pub fn internal_ids(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.node(id).role == NodeRole::Internal)
            .collect()
    }

    pub fn primary_inputs(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.node(id).role == NodeRole::PrimaryInput)
            .collect()
    }

    pub fn primary_outputs(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.node(id).role == NodeRole::PrimaryOutput)
            .collect()
    }

    pub fn fanins(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).fanins
    }

    pub fn fanouts(&self, id: NodeId) -> &[NodeId] {
        &self.fanouts[id.index()]
    }

    /// Replace an internal node's function in place, keeping its identity
    /// and consumers.
    pub fn replace_cover(&mut self, id: NodeId, fanins: Vec<NodeId>, cover: Cover) {
        assert_eq!(cover.width(), fanins.len(), "cover width must match fanins");
        let old_fanins = self.node(id).fanins.clone();
        for fanin in old_fanins {
            self.fanouts[fanin.index()].retain(|&f| f != id);
        }
        for &fanin in &fanins {
            self.fanouts[fanin.index()].push(id);
        }
        let node = self.node_mut(id);
        node.fanins = fanins;
        node.cover = cover;
    }

    /// Duplicate a node under a new name; the copy has the same fanins and
    /// cover but no fanouts yet.
    pub fn duplicate(&mut self, id: NodeId, name: impl Into<String>) -> NodeId {
        let mut copy = self.node(id).clone();
        copy.name = name.into();
        self.push(copy)
    }

    /// Remove a node that no longer drives anything.
    pub fn remove(&mut self, id: NodeId) {
        assert!(
            self.fanouts[id.index()].is_empty(),
            "cannot remove {}: it still has fanouts",
            id
        );
        let fanins = self.node(id).fanins.clone();
        for fanin in fanins {
            self.fanouts[fanin.index()].retain(|&f| f != id);
        }
        self.nodes[id.index()] = None;
    }

    /// Drop cover columns with no remaining occurrences.
    fn prune_unused(&mut self, id: NodeId) {
        let node = self.node(id);
        let used: Vec<usize> = node.cover.support();
        if used.len() == node.fanins.len() {
            return;
        }
        let mut col_map = vec![usize::MAX; node.cover.width()];
        let mut fanins = Vec::with_capacity(used.len());
        for (new_col, &old_col) in used.iter().enumerate() {
            col_map[old_col] = new_col;
            fanins.push(node.fanins[old_col]);
        }
        // Absent-everywhere columns never appear in any cube, so the partial
        // map is total on present literals.
        let cover = project_columns(&node.cover, used.len(), &col_map);
        self.replace_cover(id, fanins, cover);
    }

    /// Collapse `node` into `consumer`: the consumer's cover is re-expressed
    /// with the node's function substituted for its literal. The node itself
    /// stays in the network until its last fanout is gone.
    pub fn collapse_into(&mut self, node: NodeId, consumer: NodeId) {
        debug!("collapse {} into {}", node, consumer);
        let (fanins, cover) = self.collapsed_function(node, consumer);
        self.replace_cover(consumer, fanins, cover);
        self.prune_unused(consumer);
    }

    /// The fanins and cover `consumer` would have after collapsing `node`
    /// into it, without touching the network.
    pub fn collapsed_function(&self, node: NodeId, consumer: NodeId) -> (Vec<NodeId>, Cover) {
        assert_eq!(self.node(node).role, NodeRole::Internal, "collapse source must be internal");
        assert_eq!(self.node(consumer).role, NodeRole::Internal, "collapse target must be internal");
        let col_n = self
            .fanins(consumer)
            .iter()
            .position(|&f| f == node)
            .unwrap_or_else(|| panic!("{} is not a fanin of {}", node, consumer));

        // The merged fanin set: the consumer's (minus the node) first, then
        // the node's fanins that are not already present.
        let consumer_fanins = self.fanins(consumer).to_vec();
        let node_fanins = self.fanins(node).to_vec();
        let mut fanins: Vec<NodeId> = consumer_fanins
            .iter()
            .copied()
            .filter(|&f| f != node)
            .collect();
        for &f in &node_fanins {
            if !fanins.contains(&f) {
                fanins.push(f);
            }
        }
        let width = fanins.len();
        let pos_of = |f: NodeId, fanins: &[NodeId]| fanins.iter().position(|&x| x == f).unwrap();

        let mut consumer_map = vec![usize::MAX; consumer_fanins.len()];
        for (col, &f) in consumer_fanins.iter().enumerate() {
            if f != node {
                consumer_map[col] = pos_of(f, &fanins);
            }
        }
        let node_map: Vec<usize> = node_fanins.iter().map(|&f| pos_of(f, &fanins)).collect();

        let node_cover = self.node(node).cover.remap(width, &node_map);
        let node_complement = self.node(node).cover.complement().remap(width, &node_map);

        let mut result = Cover::empty(width);
        let consumer_cover = self.node(consumer).cover.clone();
        for cube in consumer_cover.cubes() {
            let phase = cube.lit(col_n);
            let rest = cube.with(col_n, Literal::Absent);
            let rest = Cover::from_cubes(consumer_cover.width(), vec![rest]);
            let rest = project_columns(&rest, width, &consumer_map);
            let expanded = match phase {
                Literal::Absent => rest,
                Literal::Pos => rest.and(&node_cover),
                Literal::Neg => rest.and(&node_complement),
            };
            result = result.or(&expanded);
        }

        (fanins, result)
    }

    /// Nodes in topological order: sources first, every node after all of
    /// its fanins.
    pub fn topo_order(&self) -> Vec<NodeId> {
        let mut indegree: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut ready: Vec<NodeId> = Vec::new();
        for id in self.node_ids() {
            let n = self.fanins(id).len();
            indegree.insert(id, n);
            if n == 0 {
                ready.push(id);
            }
        }
        let mut order = Vec::new();
        while let Some(id) = ready.pop() {
            order.push(id);
            for &fanout in self.fanouts(id) {
                let d = indegree.get_mut(&fanout).expect("fanout of a live node");
                *d -= 1;
                if *d == 0 {
                    ready.push(fanout);
                }
            }
        }
        assert_eq!(order.len(), self.node_ids().count(), "network has a cycle");
        order
    }

    /// Breadth-first level ranking: sources at level 0, every other node one
    /// past its deepest fanin.
    pub fn bfs_levels(&self) -> FxHashMap<NodeId, usize> {
        let mut levels: FxHashMap<NodeId, usize> = FxHashMap::default();
        for id in self.topo_order() {
            let level = self
                .fanins(id)
                .iter()
                .map(|f| levels[f] + 1)
                .max()
                .unwrap_or(0);
            levels.insert(id, level);
        }
        levels
    }
}

/// Remap a cover through a possibly-partial column map; columns mapped to
/// `usize::MAX` must be absent from every cube.
fn project_columns(cover: &Cover, new_width: usize, col_map: &[usize]) -> Cover {
    let mut result = Cover::empty(new_width);
    for cube in cover.cubes() {
        let mut lits = vec![Literal::Absent; new_width];
        for col in cube.present() {
            assert_ne!(col_map[col], usize::MAX, "literal on an unmapped column");
            lits[col_map[col]] = cube.lit(col);
        }
        result.add_cube(crate::cover::Cube::from_lits(lits));
    }
    result
}
