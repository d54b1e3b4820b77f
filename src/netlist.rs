//! The "break" pass: explode a mapped network into one instance per basic
//! block and emit a textual netlist.
//!
//! Every mapped node contributes the block instances of its diagram's
//! pattern annotations. Instance pins are bound to a constant rail
//! (`gnd`/`vcc`), a primary signal name, or another instance's output;
//! references between nodes always go through the producing node's named
//! signal, so a sharing point is emitted once and fanned out by name.

use std::io::{self, Write};

use fxhash::FxHashMap;
use log::debug;

use crate::builder::Act;
use crate::map::{MapOptions, Pattern, PinSource};
use crate::network::{Network, NodeId, NodeRole};
use crate::vertex::VertexId;

/// One emitted basic block.
#[derive(Debug, Clone)]
pub struct BlockInstance {
    pub name: String,
    /// Pin name to signal name, in declaration order.
    pub pins: Vec<(&'static str, String)>,
    pub output: String,
}

/// A flat block-level netlist.
#[derive(Debug, Clone)]
pub struct Netlist {
    pub module: String,
    pub inputs: Vec<String>,
    /// Primary output name and the signal driving it.
    pub outputs: Vec<(String, String)>,
    pub instances: Vec<BlockInstance>,
}

impl Netlist {
    /// Build the netlist of a mapped network. `acts` must hold the mapped
    /// diagram of every internal node in the transitive fanin of an output.
    pub fn build(net: &Network, acts: &FxHashMap<NodeId, &Act>, opts: &MapOptions) -> Netlist {
        let mut emitter = Emitter {
            net,
            acts,
            opts,
            instances: Vec::new(),
            node_signals: FxHashMap::default(),
        };

        let inputs = net
            .primary_inputs()
            .iter()
            .map(|&pi| net.node(pi).name.clone())
            .collect();
        let mut outputs = Vec::new();
        for po in net.primary_outputs() {
            let source = net.fanins(po)[0];
            let signal = emitter.node_signal(source);
            outputs.push((net.node(po).name.clone(), signal));
        }
        debug!("netlist: {} block instances", emitter.instances.len());
        Netlist {
            module: net.name().to_string(),
            inputs,
            outputs,
            instances: emitter.instances,
        }
    }

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "module {}", self.module)?;
        for input in &self.inputs {
            writeln!(w, "input {}", input)?;
        }
        for (output, _) in &self.outputs {
            writeln!(w, "output {}", output)?;
        }
        for instance in &self.instances {
            let pins: Vec<String> = instance
                .pins
                .iter()
                .map(|(pin, signal)| format!("{}={}", pin, signal))
                .collect();
            writeln!(w, "block {} ({}) -> {}", instance.name, pins.join(", "), instance.output)?;
        }
        for (output, signal) in &self.outputs {
            writeln!(w, "connect {} {}", output, signal)?;
        }
        writeln!(w, "endmodule")
    }

    pub fn render(&self) -> String {
        let mut bytes = Vec::new();
        self.write(&mut bytes).expect("write to a Vec cannot fail");
        String::from_utf8(bytes).expect("netlist text is UTF-8")
    }
}

struct Emitter<'a> {
    net: &'a Network,
    acts: &'a FxHashMap<NodeId, &'a Act>,
    opts: &'a MapOptions,
    instances: Vec<BlockInstance>,
    node_signals: FxHashMap<NodeId, String>,
}

impl Emitter<'_> {
    /// The signal carrying the function of `node`, emitting its blocks on
    /// first use.
    fn node_signal(&mut self, node: NodeId) -> String {
        if let Some(signal) = self.node_signals.get(&node) {
            return signal.clone();
        }
        let signal = match self.net.node(node).role {
            NodeRole::PrimaryInput => self.net.node(node).name.clone(),
            NodeRole::Constant => {
                if self.net.node(node).cover.has_universal_row() {
                    "vcc".to_string()
                } else {
                    "gnd".to_string()
                }
            }
            NodeRole::PrimaryOutput => {
                let source = self.net.fanins(node)[0];
                self.node_signal(source)
            }
            NodeRole::Internal => {
                let act = *self
                    .acts
                    .get(&node)
                    .unwrap_or_else(|| panic!("node {} has no mapped diagram", node));
                let mut counter = 0;
                self.emit_vertex(act, act.root, node, &mut counter, &mut FxHashMap::default())
            }
        };
        self.node_signals.insert(node, signal.clone());
        signal
    }

    /// The signal of the sub-diagram rooted at `v`, emitting its block
    /// instances on first use within this diagram.
    fn emit_vertex(
        &mut self,
        act: &Act,
        v: VertexId,
        node: NodeId,
        counter: &mut usize,
        cache: &mut FxHashMap<VertexId, String>,
    ) -> String {
        let dag = &act.dag;
        if dag.is_terminal(v) {
            return if dag.is_one(v) { "vcc" } else { "gnd" }.to_string();
        }
        if let Some(signal) = cache.get(&v) {
            return signal.clone();
        }
        let pattern = dag
            .vertex(v)
            .pattern
            .unwrap_or_else(|| panic!("vertex {} reached without a mapping annotation", v));
        self.opts.check_pattern(pattern);

        if pattern == Pattern::Literal {
            let name = dag.vertex(v).name.expect("literal vertex carries its variable");
            let signal = self.node_signal(name);
            cache.insert(v, signal.clone());
            return signal;
        }

        let pins = pattern.pins(dag, v);
        let node_name = self.net.node(node).name.clone();
        let output = if v == act.root {
            node_name.clone()
        } else {
            *counter += 1;
            format!("{}_x{}", node_name, counter)
        };
        // Reserve the signal before descending: the diagram is acyclic, but
        // the cache keeps shared sub-diagrams single-instance.
        cache.insert(v, output.clone());

        let mut bound = Vec::with_capacity(8);
        for (pin, source) in pins.named() {
            let signal = match source {
                PinSource::Gnd => "gnd".to_string(),
                PinSource::Vcc => "vcc".to_string(),
                PinSource::Var(n) => self.node_signal(n),
                PinSource::Vertex(u) => self.emit_vertex(act, u, node, counter, cache),
            };
            bound.push((pin, signal));
        }

        let instance = BlockInstance {
            name: format!("{}_{}", node_name, self.instances.len()),
            pins: bound,
            output: output.clone(),
        };
        self.instances.push(instance);
        output
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::builder::{build_act, BuilderOptions};
    use crate::cover::Cover;
    use crate::map::NoArrivals;
    use crate::order::OrderStrategy;

    fn mapped_act(cover: &Cover, fanins: &[NodeId], node: NodeId, opts: &MapOptions) -> Act {
        let build = BuilderOptions {
            strategy: OrderStrategy::Fanin,
            map: opts.clone(),
        };
        let mut act = build_act(cover, fanins, Some(node), &build, &NoArrivals);
        act.map(opts, &NoArrivals);
        act
    }

    #[test]
    fn test_two_and_netlist() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        let b = net.add_input("b");
        let f = net.add_internal("f", vec![a, b], Cover::parse(2, &["11"]));
        net.add_output("o", f);

        let opts = MapOptions::default();
        let act = mapped_act(&Cover::parse(2, &["11"]), &[a, b], f, &opts);
        let acts: FxHashMap<NodeId, &Act> = [(f, &act)].into_iter().collect();
        let netlist = Netlist::build(&net, &acts, &opts);

        assert_eq!(netlist.instances.len(), 1);
        let text = netlist.render();
        assert!(text.contains("module t"));
        assert!(text.contains("input a"));
        assert!(text.contains("output o"));
        assert!(text.contains("-> f"));
        assert!(text.contains("connect o f"));
        // All 8 pins are present on the instance line.
        for pin in ["A0=", "A1=", "SA=", "B0=", "B1=", "SB=", "S0=", "S1="] {
            assert!(text.contains(pin), "missing {}", pin);
        }
    }

    #[test]
    fn test_buffer_of_input_has_no_instances() {
        let mut net = Network::new("t");
        let a = net.add_input("a");
        net.add_output("o", a);
        let acts = FxHashMap::default();
        let netlist = Netlist::build(&net, &acts, &MapOptions::default());
        assert!(netlist.instances.is_empty());
        assert_eq!(netlist.outputs, vec![("o".to_string(), "a".to_string())]);
    }

    #[test]
    fn test_multi_block_chain_instances() {
        // A 6-input conjunction needs more than one block; inner block
        // outputs feed the root block by instance-output name.
        let mut net = Network::new("t");
        let inputs: Vec<NodeId> = (0..6).map(|i| net.add_input(format!("i{}", i))).collect();
        let cover = Cover::parse(6, &["111111"]);
        let f = net.add_internal("f", inputs.clone(), cover.clone());
        net.add_output("o", f);

        let opts = MapOptions::default();
        let act = mapped_act(&cover, &inputs, f, &opts);
        let acts: FxHashMap<NodeId, &Act> = [(f, &act)].into_iter().collect();
        let netlist = Netlist::build(&net, &acts, &opts);

        assert!(netlist.instances.len() >= 2);
        // The root instance drives the node's own signal.
        assert!(netlist.instances.iter().any(|i| i.output == "f"));
        // Some pin references another instance's output.
        let internal: Vec<&str> = netlist
            .instances
            .iter()
            .filter(|i| i.output != "f")
            .map(|i| i.output.as_str())
            .collect();
        assert!(netlist
            .instances
            .iter()
            .any(|i| i.pins.iter().any(|(_, s)| internal.contains(&s.as_str()))));
    }

    #[test]
    #[should_panic(expected = "OR pattern")]
    fn test_or_annotation_with_or_disabled_is_fatal() {
        // Map with the OR gate, read the annotations with it disabled.
        let mut net = Network::new("t");
        let inputs: Vec<NodeId> = (0..4).map(|i| net.add_input(format!("i{}", i))).collect();
        let cover = Cover::parse(4, &["1---", "-1--", "--1-", "---1"]);
        let f = net.add_internal("f", inputs.clone(), cover.clone());
        net.add_output("o", f);

        let with_or = MapOptions::default();
        let act = mapped_act(&cover, &inputs, f, &with_or);
        let acts: FxHashMap<NodeId, &Act> = [(f, &act)].into_iter().collect();
        let without_or = MapOptions { use_or_gate: false, ..MapOptions::default() };
        let _ = Netlist::build(&net, &acts, &without_or);
    }
}
