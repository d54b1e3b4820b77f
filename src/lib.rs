//! # act-map: decision-DAG technology mapping onto multiplexer basic blocks
//!
//! **`act-map`** builds compact, canonical decision-diagram representations
//! of Boolean functions extracted from a logic network, combines and reduces
//! them under Boolean operators, and covers them with a fixed library of
//! multiplexer/OR macro-cells, minimizing block count or a weighted
//! area/delay cost.
//!
//! ## Pipeline
//!
//! A cover (sum of product terms) flows through the [`builder`], which
//! constructs a raw decision DAG under a chosen variable ordering;
//! sub-functions are composed with [`apply`] and canonicalized by
//! [`reduce`]. The [`map`] module then splits the diagram at shared
//! vertices and covers each tree bottom-up with the twelve block patterns.
//! The [`driver`] iterates decomposition, collapsing and remapping over a
//! whole [`network`], and the [`netlist`] break pass emits one instance
//! per basic block.
//!
//! ## Basic Usage
//!
//! ```rust
//! use act_map::builder::{build_act, BuilderOptions};
//! use act_map::cover::Cover;
//! use act_map::map::{MapOptions, NoArrivals};
//! use act_map::network::NodeId;
//!
//! // f = a b + a' c over three inputs.
//! let cover = Cover::parse(3, &["11-", "0-1"]);
//! let fanins: Vec<NodeId> = (0..3).map(NodeId::new).collect();
//!
//! let opts = BuilderOptions::default();
//! let mut act = build_act(&cover, &fanins, None, &opts, &NoArrivals);
//!
//! // Cover the canonical diagram with basic blocks, minimizing their count.
//! let result = act.map(&MapOptions::default(), &NoArrivals);
//! assert!(result.blocks >= 1);
//! ```
//!
//! ## Core Components
//!
//! - **[`dag`] / [`vertex`]**: the arena-backed diagram store.
//! - **[`builder`]**: unate-recursive construction and ordering strategies.
//! - **[`apply`] / [`reduce`]**: Boolean combination and canonicalization.
//! - **[`map`]**: the pattern-matching area/delay mapper.
//! - **[`driver`]**: the iterative network optimization loop.

pub mod apply;
pub mod builder;
pub mod cover;
pub mod dag;
pub mod delay;
pub mod dot;
pub mod driver;
pub mod ilp;
pub mod map;
pub mod netlist;
pub mod network;
pub mod order;
pub mod reduce;
pub mod vertex;
