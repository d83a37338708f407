//! Online maintenance of the update order.
//!
//! A node's order is `1 + max(order of its active parents)`, or `0` without
//! any. Feedback connections never make a parent active. After a structural
//! change only the affected node and its live descendants are recomputed.

use tracing::debug;

use crate::graph::GraphCore;
use crate::id::NodeId;
use crate::node::ORDER_INVALID;

impl GraphCore {
    /// Recompute order after the active parents of `node` changed.
    pub(crate) fn structure_changed(&mut self, node: NodeId) {
        let invalidated = self.invalidate(node);
        for &n in &invalidated {
            self.compute_order(n);
        }
        debug!(%node, recomputed = invalidated.len(), "update order refreshed");
    }

    /// Reset `start` and everything downstream of it over live edges.
    /// Nodes already invalid are not walked again.
    fn invalidate(&mut self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            let Some(state) = self.nodes.get_mut(&n) else {
                continue;
            };
            if state.update_order == ORDER_INVALID && n != start {
                continue;
            }
            state.update_order = ORDER_INVALID;
            out.push(n);
            stack.extend(self.active_children(n));
        }
        out
    }

    /// Memoized: valid orders are returned as they are. Walks parents on an
    /// explicit stack.
    fn compute_order(&mut self, node: NodeId) -> i32 {
        let mut stack = vec![node];
        while let Some(&top) = stack.last() {
            if self.node(top).update_order != ORDER_INVALID {
                stack.pop();
                continue;
            }
            let parents = self.active_parents(top);
            let pending: Vec<NodeId> = parents
                .iter()
                .copied()
                .filter(|p| self.node(*p).update_order == ORDER_INVALID)
                .collect();
            if !pending.is_empty() {
                stack.extend(pending);
                continue;
            }
            let order = parents
                .iter()
                .map(|p| self.node(*p).update_order)
                .max()
                .map_or(0, |highest| highest + 1);
            if let Some(state) = self.nodes.get_mut(&top) {
                state.update_order = order;
            }
            stack.pop();
        }
        self.node(node).update_order
    }
}

#[cfg(test)]
mod tests {
    use crate::nodes::{Constant, Sum};
    use crate::{Graph, GraphConfig, IdAllocator};

    #[test]
    fn chain_orders_increase() {
        let mut graph = Graph::with_allocator(GraphConfig::default(), IdAllocator::new());
        let a = graph.add_node(Constant::new(1.0));
        let b = graph.add_node(Sum::new(1));
        let c = graph.add_node(Sum::new(1));

        let b_in = graph.pin_children(graph.inputs(b)[0])[0];
        let c_in = graph.pin_children(graph.inputs(c)[0])[0];

        graph.connect(graph.outputs(b)[0], c_in).unwrap();
        assert_eq!(graph.update_order(c), 1);
        graph.connect(graph.outputs(a)[0], b_in).unwrap();
        assert_eq!(
            (graph.update_order(a), graph.update_order(b), graph.update_order(c)),
            (0, 1, 2)
        );

        graph.disconnect(graph.outputs(a)[0], b_in).unwrap();
        assert_eq!((graph.update_order(b), graph.update_order(c)), (0, 1));
        graph.check_invariants();
    }

    #[test]
    fn long_chain_orders_and_updates() {
        const LEN: usize = 5_000;
        let mut graph = Graph::with_allocator(GraphConfig::default(), IdAllocator::new());
        let nodes: Vec<_> = (0..LEN).map(|_| graph.add_node(Sum::new(1))).collect();
        for pair in nodes.windows(2) {
            let input = graph.pin_children(graph.inputs(pair[1])[0])[0];
            graph.connect(graph.outputs(pair[0])[0], input).unwrap();
        }
        let head = graph.add_node(Constant::new(2.0));
        let first = graph.pin_children(graph.inputs(nodes[0])[0])[0];
        graph.connect(graph.outputs(head)[0], first).unwrap();

        let tail = nodes[LEN - 1];
        assert_eq!(graph.update_order(tail), LEN as i32);
        graph.update(&mut crate::UpdateParams::new(), &[tail]);
        assert!(!graph.is_dirty(tail) && !graph.is_dirty(head));
        let last = graph.pin_children(graph.inputs(tail)[0])[0];
        assert_eq!(graph.read_input::<f32>(last, 0, 0), Some(2.0));
    }

    #[test]
    fn diamond_takes_longest_path() {
        let mut graph = Graph::with_allocator(GraphConfig::default(), IdAllocator::new());
        let src = graph.add_node(Constant::new(1.0));
        let mid = graph.add_node(Sum::new(1));
        let join = graph.add_node(Sum::new(2));

        let mid_in = graph.pin_children(graph.inputs(mid)[0])[0];
        let join_in = graph.pin_children(graph.inputs(join)[0]).to_vec();

        graph.connect(graph.outputs(src)[0], mid_in).unwrap();
        graph.connect(graph.outputs(src)[0], join_in[0]).unwrap();
        assert_eq!(graph.update_order(join), 1);
        graph.connect(graph.outputs(mid)[0], join_in[1]).unwrap();
        assert_eq!(graph.update_order(join), 2);
        graph.check_invariants();
    }
}
