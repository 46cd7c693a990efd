//! Depth-driven balancing of AND trees.

use std::collections::HashMap;

use min_max_heap::MinMaxHeap;

use crate::aig::{Aig, Edge, NodeId};

/// Rebuilds the graph with every multi-input AND tree re-associated so
/// that low-level operands combine first, minimizing depth. Shared nodes
/// (fanout greater than one) stay shared.
pub fn balance(aig: &Aig) -> Aig {
    let mut fresh = Aig::new();
    let mut memo: HashMap<NodeId, Edge> = HashMap::new();
    memo.insert(0, Edge::TRUE);
    for pi in aig.inputs() {
        let edge = fresh.fresh_input();
        memo.insert(pi, edge);
    }
    for &out in aig.outputs() {
        let edge = balance_node(aig, out.node(), &mut fresh, &mut memo);
        fresh.add_output(edge.invert_if(out.is_inverted()));
    }
    fresh
}

fn balance_node(
    aig: &Aig,
    node: NodeId,
    fresh: &mut Aig,
    memo: &mut HashMap<NodeId, Edge>,
) -> Edge {
    if let Some(&edge) = memo.get(&node) {
        return edge;
    }
    debug_assert!(aig.is_and(node));

    // Collect the operands of the AND tree rooted here, descending
    // through non-inverted single-fanout AND fanins.
    let mut leaves: Vec<Edge> = Vec::new();
    let mut stack = vec![aig.fanin0(node), aig.fanin1(node)];
    while let Some(edge) = stack.pop() {
        let n = edge.node();
        if !edge.is_inverted() && aig.is_and(n) && aig.fanout_count(n) == 1 {
            stack.push(aig.fanin0(n));
            stack.push(aig.fanin1(n));
        } else {
            leaves.push(edge);
        }
    }

    // Combine the two lowest operands first.
    let mut heap: MinMaxHeap<(u32, Edge)> = MinMaxHeap::with_capacity(leaves.len());
    for leaf in leaves {
        let mapped = balance_node(aig, leaf.node(), fresh, memo).invert_if(leaf.is_inverted());
        heap.push((fresh.level(mapped.node()), mapped));
    }
    while heap.len() > 1 {
        let (_, e1) = heap.pop_min().expect("heap has at least two entries");
        let (_, e2) = heap.pop_min().expect("heap has at least two entries");
        let combined = fresh.and_edge(e1, e2);
        heap.push((fresh.level(combined.node()), combined));
    }
    let result = heap.pop_min().expect("an AND tree has operands").1;
    memo.insert(node, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_reduces_depth_of_chain() {
        let mut aig = Aig::new();
        let inputs: Vec<Edge> = (0..8).map(|_| aig.fresh_input()).collect();
        // a linear chain of depth 7
        let mut chain = inputs[0];
        for &next in &inputs[1..] {
            chain = aig.and_edge(chain, next);
        }
        aig.add_output(chain);
        assert_eq!(aig.max_level(), 7);

        let balanced = balance(&aig);
        assert_eq!(balanced.max_level(), 3);
        assert_eq!(balanced.num_inputs(), 8);
        // functions agree on a few assignments
        for pattern in [0u32, 0xff, 0x5a, 0x80] {
            let bits: Vec<bool> = (0..8).map(|i| pattern >> i & 1 != 0).collect();
            assert_eq!(aig.evaluate(&bits), balanced.evaluate(&bits));
        }
    }

    #[test]
    fn test_balance_keeps_shared_nodes() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let shared = aig.and_edge(a, b);
        let o1 = aig.and_edge(shared, c);
        let o2 = aig.and_edge(shared, !c);
        aig.add_output(o1);
        aig.add_output(o2);

        let balanced = balance(&aig);
        assert_eq!(balanced.num_ands(), 3);
        for pattern in 0..8u32 {
            let bits: Vec<bool> = (0..3).map(|i| pattern >> i & 1 != 0).collect();
            assert_eq!(aig.evaluate(&bits), balanced.evaluate(&bits));
        }
    }

    #[test]
    fn test_balance_through_inverters_keeps_function() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let or = aig.or_edge(a, b);
        let top = aig.and_edge(or, c);
        aig.add_output(top);

        let balanced = balance(&aig);
        for pattern in 0..8u32 {
            let bits: Vec<bool> = (0..3).map(|i| pattern >> i & 1 != 0).collect();
            assert_eq!(aig.evaluate(&bits), balanced.evaluate(&bits));
        }
    }
}
