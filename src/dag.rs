//! Arena storage for decision DAGs.
//!
//! All vertices of a diagram live in a [`Dag`] arena and are addressed by
//! compact [`VertexId`] handles. The arena owns the two canonical terminal
//! vertices, recycles freed slots through a free list, and provides the
//! traversal primitives shared by Reduce and the mapper.
//!
//! Traversals are de-duplicated with a monotonically increasing generation
//! counter compared against each vertex's `visited` stamp, so two walks can
//! never corrupt each other the way a toggled mark bit can.

use fxhash::FxHashMap;
use log::debug;

use crate::network::NodeId;
use crate::vertex::{Value, Vertex, VertexId};

enum Slot {
    Occupied(Vertex),
    Free { next: Option<u32> },
}

/// An arena of decision-DAG vertices sharing one variable ordering.
pub struct Dag {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    live: usize,
    num_vars: usize,
    visit_gen: u64,
    zero: VertexId,
    one: VertexId,
}

impl Dag {
    /// Create an arena for diagrams over `num_vars` ordering positions.
    ///
    /// The two canonical terminals are allocated eagerly; their `index` is
    /// the sentinel `num_vars` ("beyond the last variable").
    pub fn new(num_vars: usize) -> Self {
        let mut dag = Self {
            slots: Vec::new(),
            free_head: None,
            live: 0,
            num_vars,
            visit_gen: 0,
            zero: VertexId::new(0),
            one: VertexId::new(1),
        };
        let zero = dag.alloc(Vertex::terminal(Value::Zero, num_vars));
        let one = dag.alloc(Vertex::terminal(Value::One, num_vars));
        assert_eq!(zero, VertexId::new(0));
        assert_eq!(one, VertexId::new(1));
        dag.zero = zero;
        dag.one = one;
        dag
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// The `index` sentinel carried by terminal vertices.
    pub fn terminal_index(&self) -> usize {
        self.num_vars
    }

    pub fn zero(&self) -> VertexId {
        self.zero
    }

    pub fn one(&self) -> VertexId {
        self.one
    }

    pub fn terminal(&self, value: bool) -> VertexId {
        if value {
            self.one
        } else {
            self.zero
        }
    }

    /// Number of live vertices in the arena (terminals included).
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn vertex(&self, v: VertexId) -> &Vertex {
        match &self.slots[v.index()] {
            Slot::Occupied(vertex) => vertex,
            Slot::Free { .. } => panic!("access to freed vertex {}", v),
        }
    }

    pub fn vertex_mut(&mut self, v: VertexId) -> &mut Vertex {
        match &mut self.slots[v.index()] {
            Slot::Occupied(vertex) => vertex,
            Slot::Free { .. } => panic!("access to freed vertex {}", v),
        }
    }

    pub fn is_alive(&self, v: VertexId) -> bool {
        matches!(self.slots.get(v.index()), Some(Slot::Occupied(_)))
    }

    pub fn is_terminal(&self, v: VertexId) -> bool {
        self.vertex(v).is_terminal()
    }

    pub fn is_zero(&self, v: VertexId) -> bool {
        self.vertex(v).value == Value::Zero
    }

    pub fn is_one(&self, v: VertexId) -> bool {
        self.vertex(v).value == Value::One
    }

    pub fn low(&self, v: VertexId) -> VertexId {
        self.vertex(v).low()
    }

    pub fn high(&self, v: VertexId) -> VertexId {
        self.vertex(v).high()
    }

    pub fn index(&self, v: VertexId) -> usize {
        self.vertex(v).index
    }

    fn alloc(&mut self, vertex: Vertex) -> VertexId {
        self.live += 1;
        if let Some(slot) = self.free_head {
            let next = match self.slots[slot as usize] {
                Slot::Free { next } => next,
                Slot::Occupied(_) => unreachable!("occupied slot on the free list"),
            };
            self.free_head = next;
            self.slots[slot as usize] = Slot::Occupied(vertex);
            return VertexId::new(slot);
        }
        let slot = self.slots.len();
        assert!(slot <= u32::MAX as usize, "arena overflow");
        self.slots.push(Slot::Occupied(vertex));
        VertexId::new(slot as u32)
    }

    /// Allocate a fresh (non-canonical) decision vertex.
    pub fn decision(
        &mut self,
        index: usize,
        name: Option<NodeId>,
        low: VertexId,
        high: VertexId,
    ) -> VertexId {
        assert!(index < self.num_vars, "decision index out of the ordering");
        assert!(
            index < self.index(low) && index < self.index(high),
            "decision index must lie above both children"
        );
        self.alloc(Vertex::decision(index, name, low, high))
    }

    /// A single-variable diagram: `low = 0, high = 1`, or the reverse when
    /// `negated`.
    pub fn literal(&mut self, index: usize, name: Option<NodeId>, negated: bool) -> VertexId {
        let (low, high) = if negated {
            (self.one, self.zero)
        } else {
            (self.zero, self.one)
        };
        self.decision(index, name, low, high)
    }

    /// Release a vertex slot back to the free list.
    ///
    /// The caller must guarantee that nothing references the slot afterwards;
    /// Reduce frees its dead vertices only after all buckets are processed.
    pub fn free(&mut self, v: VertexId) {
        assert!(v != self.zero && v != self.one, "cannot free a terminal");
        match self.slots[v.index()] {
            Slot::Occupied(_) => {
                self.slots[v.index()] = Slot::Free { next: self.free_head };
                self.free_head = Some(v.raw());
                self.live -= 1;
            }
            Slot::Free { .. } => panic!("double free of vertex {}", v),
        }
    }

    /// Start a new traversal generation.
    pub fn fresh_visit(&mut self) -> u64 {
        self.visit_gen += 1;
        self.visit_gen
    }

    /// All vertices reachable from `root`, children before parents.
    pub fn postorder(&mut self, root: VertexId) -> Vec<VertexId> {
        let gen = self.fresh_visit();
        let mut order = Vec::new();
        // (vertex, children already expanded)
        let mut stack = vec![(root, false)];
        while let Some((v, expanded)) = stack.pop() {
            if expanded {
                order.push(v);
                continue;
            }
            let vertex = self.vertex_mut(v);
            if vertex.visited == gen {
                continue;
            }
            vertex.visited = gen;
            stack.push((v, true));
            if !vertex.is_terminal() {
                let (low, high) = (vertex.low(), vertex.high());
                stack.push((high, false));
                stack.push((low, false));
            }
        }
        order
    }

    /// Number of vertices reachable from `root` (terminals included).
    pub fn reachable_count(&mut self, root: VertexId) -> usize {
        self.postorder(root).len()
    }

    /// Walk the diagram once and record every vertex reached from more than
    /// one parent: `multiple_fo` becomes the count of parents beyond the
    /// first.
    pub fn mark_multiple_fanout(&mut self, root: VertexId) {
        for v in self.postorder(root) {
            self.vertex_mut(v).multiple_fo = 0;
        }
        let gen = self.fresh_visit();
        let mut stack = vec![root];
        self.vertex_mut(root).visited = gen;
        while let Some(v) = stack.pop() {
            if self.is_terminal(v) {
                continue;
            }
            for child in [self.low(v), self.high(v)] {
                let vertex = self.vertex_mut(child);
                if vertex.visited == gen {
                    vertex.multiple_fo += 1;
                } else {
                    vertex.visited = gen;
                    stack.push(child);
                }
            }
        }
    }

    /// Clear the mapper annotations of every vertex reachable from `root`.
    pub fn reset_mapping(&mut self, root: VertexId) {
        for v in self.postorder(root) {
            self.vertex_mut(v).clear_mapping();
        }
    }

    /// Mark-and-sweep release: free every vertex not reachable from `roots`.
    ///
    /// Each vertex is visited exactly once through the shared generation
    /// stamp, so shared children are freed exactly once even when several
    /// dead parents reference them.
    pub fn sweep(&mut self, roots: &[VertexId]) {
        let gen = self.fresh_visit();
        let mut stack: Vec<VertexId> = Vec::new();
        for &root in roots {
            let vertex = self.vertex_mut(root);
            if vertex.visited != gen {
                vertex.visited = gen;
                stack.push(root);
            }
        }
        while let Some(v) = stack.pop() {
            if self.is_terminal(v) {
                continue;
            }
            for child in [self.low(v), self.high(v)] {
                let vertex = self.vertex_mut(child);
                if vertex.visited != gen {
                    vertex.visited = gen;
                    stack.push(child);
                }
            }
        }
        let dead: Vec<VertexId> = (0..self.slots.len() as u32)
            .map(VertexId::new)
            .filter(|&v| {
                v != self.zero
                    && v != self.one
                    && matches!(&self.slots[v.index()], Slot::Occupied(vertex) if vertex.visited != gen)
            })
            .collect();
        debug!("sweep: freeing {} unreachable vertices", dead.len());
        for v in dead {
            self.free(v);
        }
    }

    /// Evaluate the function rooted at `root` under an assignment indexed by
    /// ordering position.
    pub fn eval(&self, root: VertexId, assignment: &[bool]) -> bool {
        assert_eq!(assignment.len(), self.num_vars, "assignment width mismatch");
        let mut v = root;
        loop {
            let vertex = self.vertex(v);
            if vertex.is_terminal() {
                return vertex.value.as_bool();
            }
            v = if assignment[vertex.index] {
                vertex.high()
            } else {
                vertex.low()
            };
        }
    }

    /// Deep-copy the subgraph rooted at `root` into a fresh arena,
    /// preserving sharing.
    pub fn extract(&mut self, root: VertexId) -> (Dag, VertexId) {
        let mut out = Dag::new(self.num_vars);
        let mut copied: FxHashMap<VertexId, VertexId> = FxHashMap::default();
        copied.insert(self.zero, out.zero());
        copied.insert(self.one, out.one());
        for v in self.postorder(root) {
            let vertex = self.vertex(v);
            if vertex.is_terminal() {
                continue;
            }
            let low = copied[&vertex.low()];
            let high = copied[&vertex.high()];
            let copy = out.decision(vertex.index, vertex.name, low, high);
            copied.insert(v, copy);
        }
        debug!(
            "extract(root = {}): copied {} vertices",
            root,
            copied.len() - 2
        );
        (out, copied[&root])
    }
}
