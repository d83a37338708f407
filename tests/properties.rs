//! Property-based tests for connection bookkeeping and update order.
//!
//! Random sequences of connects and disconnects between a handful of
//! summing nodes; after every step the graph's own consistency check must
//! pass and the incrementally maintained order must match a from-scratch
//! longest-path computation.

mod common;

use std::collections::HashMap;

use common::graph;
use pinflow::nodes::Sum;
use pinflow::{Graph, GraphError, NodeId};
use proptest::prelude::*;

const NODES: usize = 6;
const TERMS: usize = 3;

#[derive(Clone, Debug)]
enum Op {
    Connect { from: usize, to: usize, slot: usize },
    Disconnect { to: usize, slot: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NODES, 0..NODES, 0..TERMS).prop_map(|(from, to, slot)| Op::Connect { from, to, slot }),
        1 => (0..NODES, 0..TERMS).prop_map(|(to, slot)| Op::Disconnect { to, slot }),
    ]
}

/// Longest live path from a root, computed without any caching in the graph.
fn naive_order(g: &Graph, node: NodeId, memo: &mut HashMap<NodeId, i32>) -> i32 {
    if let Some(order) = memo.get(&node) {
        return *order;
    }
    let order = g
        .parents(node)
        .into_iter()
        .filter(|(_, adj)| adj.live > 0)
        .map(|(parent, _)| naive_order(g, parent, memo))
        .max()
        .map_or(0, |highest| highest + 1);
    memo.insert(node, order);
    order
}

/// Whether `to` is reachable from `from` over live connections.
fn path_exists(g: &Graph, from: NodeId, to: NodeId) -> bool {
    let mut stack = vec![from];
    let mut seen = Vec::new();
    while let Some(n) = stack.pop() {
        if n == to {
            return true;
        }
        if seen.contains(&n) {
            continue;
        }
        seen.push(n);
        stack.extend(
            g.children(n)
                .into_iter()
                .filter(|(_, adj)| adj.live > 0)
                .map(|(child, _)| child),
        );
    }
    false
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every edit keeps the bookkeeping consistent and the order equal to
    /// the longest path from a root.
    #[test]
    fn order_tracks_longest_path(ops in prop::collection::vec(op(), 1..40)) {
        let mut g = graph();
        let nodes: Vec<NodeId> = (0..NODES).map(|_| g.add_node(Sum::new(TERMS))).collect();

        for op in ops {
            match op {
                Op::Connect { from, to, slot } => {
                    let output = g.outputs(nodes[from])[0];
                    let input = g.pin_children(g.inputs(nodes[to])[0])[slot];
                    let had_source = g.connection_of(input).is_some();
                    match g.connect(output, input) {
                        Ok(_) => {
                            prop_assert!(!had_source);
                            prop_assert_eq!(g.connection_of(input), Some(output));
                        }
                        Err(GraphError::AlreadyConnected { .. }) => prop_assert!(had_source),
                        Err(GraphError::WouldCycle { .. }) => {
                            prop_assert!(path_exists(&g, nodes[to], nodes[from]));
                            prop_assert_eq!(g.connection_of(input), None);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {}", other),
                    }
                }
                Op::Disconnect { to, slot } => {
                    let input = g.pin_children(g.inputs(nodes[to])[0])[slot];
                    if let Some(output) = g.connection_of(input) {
                        prop_assert!(g.disconnect(output, input).is_ok());
                        prop_assert_eq!(g.connection_of(input), None);
                    }
                }
            }

            g.check_invariants();
            let mut memo = HashMap::new();
            for &node in &nodes {
                prop_assert_eq!(g.update_order(node), naive_order(&g, node, &mut memo));
            }
        }
    }

    /// Updating any root leaves every node it depends on clean.
    #[test]
    fn frame_pass_cleans_ancestors(edges in prop::collection::vec((0..NODES, 0..NODES, 0..TERMS), 0..20)) {
        let mut g = graph();
        let nodes: Vec<NodeId> = (0..NODES).map(|_| g.add_node(Sum::new(TERMS))).collect();
        for (from, to, slot) in edges {
            let input = g.pin_children(g.inputs(nodes[to])[0])[slot];
            let _ = g.connect(g.outputs(nodes[from])[0], input);
        }

        let root = nodes[NODES - 1];
        g.update(&mut pinflow::UpdateParams::new(), &[root]);

        for &node in &nodes {
            if path_exists(&g, node, root) {
                prop_assert!(!g.is_dirty(node), "{} still dirty", node);
            }
        }
    }
}
