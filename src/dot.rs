//! Decision DAG to DOT (Graphviz) conversion.
//!
//! Debugging aid: renders a diagram with terminals as squares on the sink
//! rank, decision vertices as circles grouped by ordering position, solid
//! high edges and dashed low edges. Render with `dot -Tpng out.dot -o
//! out.png`.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::dag::Dag;
use crate::vertex::VertexId;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for decision vertices (default: "circle")
    pub node_shape: &'static str,
    /// Shape for terminal vertices (default: "square")
    pub terminal_shape: &'static str,
    /// Style for high (then) edges (default: "solid")
    pub high_edge_style: &'static str,
    /// Style for low (else) edges (default: "dashed")
    pub low_edge_style: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            terminal_shape: "square",
            high_edge_style: "solid",
            low_edge_style: "dashed",
        }
    }
}

/// Render the diagram rooted at `root` with the default configuration.
pub fn to_dot(dag: &mut Dag, root: VertexId) -> String {
    to_dot_with_config(dag, root, &DotConfig::default())
}

pub fn to_dot_with_config(dag: &mut Dag, root: VertexId, config: &DotConfig) -> String {
    let mut out = String::new();
    writeln!(out, "digraph dag {{").unwrap();

    let reachable = dag.postorder(root);
    let mut ranks: BTreeMap<usize, Vec<VertexId>> = BTreeMap::new();
    for &v in &reachable {
        ranks.entry(dag.index(v)).or_default().push(v);
    }

    for (&index, vertices) in &ranks {
        if index == dag.terminal_index() {
            writeln!(out, "  {{ rank = sink;").unwrap();
        } else {
            writeln!(out, "  {{ rank = same;").unwrap();
        }
        for &v in vertices {
            let vertex = dag.vertex(v);
            let (shape, label) = if vertex.is_terminal() {
                let label = if dag.is_one(v) { "1" } else { "0" }.to_string();
                (config.terminal_shape, label)
            } else {
                let label = match vertex.name {
                    Some(name) => format!("{}", name),
                    None => format!("x{}", vertex.index),
                };
                (config.node_shape, label)
            };
            writeln!(out, "    v{} [shape={}, label=\"{}\"];", v.raw(), shape, label).unwrap();
        }
        writeln!(out, "  }}").unwrap();
    }

    for &v in &reachable {
        if dag.is_terminal(v) {
            continue;
        }
        writeln!(
            out,
            "  v{} -> v{} [style={}];",
            v.raw(),
            dag.high(v).raw(),
            config.high_edge_style
        )
        .unwrap();
        writeln!(
            out,
            "  v{} -> v{} [style={}];",
            v.raw(),
            dag.low(v).raw(),
            config.low_edge_style
        )
        .unwrap();
    }

    writeln!(out, "}}").unwrap();
    out
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::dag::Dag;

    #[test]
    fn test_one_declaration_per_vertex() {
        let mut dag = Dag::new(2);
        let y = dag.literal(1, None, false);
        let v = dag.decision(0, None, dag.zero(), y);
        let reachable = dag.reachable_count(v);
        let dot = to_dot(&mut dag, v);
        let declarations = dot.lines().filter(|l| l.contains("[shape=")).count();
        assert_eq!(declarations, reachable);
    }

    #[test]
    fn test_edges_and_styles() {
        let mut dag = Dag::new(2);
        let y = dag.literal(1, None, false);
        let v = dag.decision(0, None, dag.zero(), y);
        let dot = to_dot(&mut dag, v);
        assert!(dot.contains("style=solid"));
        assert!(dot.contains("style=dashed"));
        let edges = dot.lines().filter(|l| l.contains(" -> ")).count();
        // Two decision vertices with two edges each.
        assert_eq!(edges, 4);
    }

    #[test]
    fn test_terminal_shapes() {
        let mut dag = Dag::new(1);
        let x = dag.literal(0, None, false);
        let dot = to_dot(&mut dag, x);
        assert!(dot.contains("shape=square, label=\"0\""));
        assert!(dot.contains("shape=square, label=\"1\""));
        assert!(dot.contains("rank = sink"));
    }
}
