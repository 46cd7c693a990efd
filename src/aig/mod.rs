//! And-inverter graphs.
//!
//! The graph is an arena of nodes: the constant-one node at index 0,
//! primary inputs, and two-input AND gates. Edges carry an inversion flag
//! in their lowest bit. AND gates are hash-consed on their canonically
//! ordered fanin pair, with trivial simplifications applied at
//! construction, so structural identity implies a single node.

pub mod aiger;
pub(crate) mod simulation;

use std::collections::VecDeque;
use std::fmt;

use fixedbitset::FixedBitSet;

/// Index of a node in the arena.
pub type NodeId = u32;

const NO_NODE: u32 = u32::MAX;

/// A reference to a node together with an inversion flag, packed into a
/// single word with the flag in the lowest bit.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Edge(u32);

impl Edge {
    /// The constant-one function.
    pub const TRUE: Edge = Edge(0);
    /// The constant-zero function.
    pub const FALSE: Edge = Edge(1);
    pub(crate) const NONE: Edge = Edge(u32::MAX);

    pub fn new(node: NodeId, inverted: bool) -> Self {
        Edge((node << 1) | u32::from(inverted))
    }

    pub fn node(self) -> NodeId {
        self.0 >> 1
    }

    pub fn is_inverted(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn is_constant(self) -> bool {
        self.node() == 0
    }

    /// This edge with the inversion flag flipped if `condition` holds.
    pub fn invert_if(self, condition: bool) -> Self {
        Edge(self.0 ^ u32::from(condition))
    }

    fn code(self) -> u32 {
        self.0
    }
}

impl std::ops::Not for Edge {
    type Output = Self;

    fn not(self) -> Self::Output {
        Edge(self.0 ^ 1)
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Edge::NONE {
            write!(f, "-")
        } else if self.is_inverted() {
            write!(f, "!n{}", self.node())
        } else {
            write!(f, "n{}", self.node())
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum NodeKind {
    Const,
    Input,
    And,
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    fanin: [Edge; 2],
    level: u32,
    hash_next: u32,
    fanouts: Vec<NodeId>,
    n_output_refs: u32,
    dead: bool,
}

impl Node {
    fn new(kind: NodeKind, fanin: [Edge; 2], level: u32) -> Self {
        Self {
            kind,
            fanin,
            level,
            hash_next: NO_NODE,
            fanouts: Vec::new(),
            n_output_refs: 0,
            dead: false,
        }
    }
}

/// A hash-consed and-inverter graph.
#[derive(Clone, Debug)]
pub struct Aig {
    nodes: Vec<Node>,
    inputs: Vec<NodeId>,
    outputs: Vec<Edge>,
    buckets: Vec<u32>,
    n_ands: usize,
    /// Where a collapsed node went; [`Edge::NONE`] for live nodes.
    forward: Vec<Edge>,
    /// Functional-equivalence representative; [`Edge::NONE`] if canonical.
    reprs: Vec<Edge>,
    /// Next node in the chain of recorded structural choices.
    choices: Vec<u32>,
}

impl Default for Aig {
    fn default() -> Self {
        Self::new()
    }
}

impl Aig {
    pub fn new() -> Self {
        let mut aig = Self {
            nodes: Vec::with_capacity(1024),
            inputs: Vec::new(),
            outputs: Vec::new(),
            buckets: vec![NO_NODE; 256],
            n_ands: 0,
            forward: Vec::new(),
            reprs: Vec::new(),
            choices: Vec::new(),
        };
        aig.push_node(Node::new(NodeKind::Const, [Edge::NONE; 2], 0));
        aig
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        self.forward.push(Edge::NONE);
        self.reprs.push(Edge::NONE);
        self.choices.push(NO_NODE);
        id
    }

    /// The canonical edge for constant one.
    pub fn const_true(&self) -> Edge {
        Edge::TRUE
    }

    /// Allocates a fresh primary input and returns its edge.
    pub fn fresh_input(&mut self) -> Edge {
        let id = self.push_node(Node::new(NodeKind::Input, [Edge::NONE; 2], 0));
        self.inputs.push(id);
        Edge::new(id, false)
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// The number of live AND nodes.
    pub fn num_ands(&self) -> usize {
        self.n_ands
    }

    /// The size of the node arena, including dead nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn input(&self, index: usize) -> Edge {
        Edge::new(self.inputs[index], false)
    }

    pub fn inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().copied()
    }

    pub fn add_output(&mut self, edge: Edge) {
        self.nodes[edge.node() as usize].n_output_refs += 1;
        self.outputs.push(edge);
    }

    pub fn output(&self, index: usize) -> Edge {
        self.outputs[index]
    }

    pub fn outputs(&self) -> &[Edge] {
        &self.outputs
    }

    pub fn is_and(&self, node: NodeId) -> bool {
        self.nodes[node as usize].kind == NodeKind::And
    }

    pub fn is_input(&self, node: NodeId) -> bool {
        self.nodes[node as usize].kind == NodeKind::Input
    }

    pub fn is_dead(&self, node: NodeId) -> bool {
        self.nodes[node as usize].dead
    }

    pub fn fanin0(&self, node: NodeId) -> Edge {
        self.nodes[node as usize].fanin[0]
    }

    pub fn fanin1(&self, node: NodeId) -> Edge {
        self.nodes[node as usize].fanin[1]
    }

    pub fn level(&self, node: NodeId) -> u32 {
        self.nodes[node as usize].level
    }

    /// The number of references to this node from AND gates and outputs.
    pub fn fanout_count(&self, node: NodeId) -> usize {
        let nd = &self.nodes[node as usize];
        nd.fanouts.len() + nd.n_output_refs as usize
    }

    /// The largest level over all output nodes.
    pub fn max_level(&self) -> u32 {
        self.outputs
            .iter()
            .map(|e| self.level(e.node()))
            .max()
            .unwrap_or(0)
    }

    /// Follows collapse forwarding to the live edge an old edge now
    /// stands for. Edges held across a substitution must be resolved
    /// before use.
    pub fn resolve(&self, mut edge: Edge) -> Edge {
        while self.forward[edge.node() as usize] != Edge::NONE {
            let target = self.forward[edge.node() as usize];
            edge = target.invert_if(edge.is_inverted());
        }
        edge
    }

    fn hash_pair(a: Edge, b: Edge) -> usize {
        let mut h = u64::from(a.code()).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        h ^= u64::from(b.code()).wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
        h ^= h >> 29;
        h as usize
    }

    fn lookup(&self, f0: Edge, f1: Edge) -> Option<NodeId> {
        let bucket = Self::hash_pair(f0, f1) % self.buckets.len();
        let mut id = self.buckets[bucket];
        while id != NO_NODE {
            let nd = &self.nodes[id as usize];
            if !nd.dead && nd.fanin == [f0, f1] {
                return Some(id);
            }
            id = nd.hash_next;
        }
        None
    }

    fn hash_insert(&mut self, node: NodeId) {
        let nd = &self.nodes[node as usize];
        let bucket = Self::hash_pair(nd.fanin[0], nd.fanin[1]) % self.buckets.len();
        self.nodes[node as usize].hash_next = self.buckets[bucket];
        self.buckets[bucket] = node;
    }

    /// Removes the node from its hash bucket, if present.
    fn unhash(&mut self, node: NodeId) {
        let nd = &self.nodes[node as usize];
        let bucket = Self::hash_pair(nd.fanin[0], nd.fanin[1]) % self.buckets.len();
        let mut id = self.buckets[bucket];
        if id == node {
            self.buckets[bucket] = self.nodes[node as usize].hash_next;
            return;
        }
        while id != NO_NODE {
            let next = self.nodes[id as usize].hash_next;
            if next == node {
                self.nodes[id as usize].hash_next = self.nodes[node as usize].hash_next;
                return;
            }
            id = next;
        }
    }

    fn rehash_all(&mut self) {
        let capacity = (self.nodes.len() * 2).next_power_of_two();
        self.buckets = vec![NO_NODE; capacity];
        for id in 0..self.nodes.len() as NodeId {
            let nd = &self.nodes[id as usize];
            if nd.kind == NodeKind::And && !nd.dead {
                self.hash_insert(id);
            }
        }
    }

    /// Returns the edge computing `a AND b`, creating a node only if no
    /// trivial simplification applies and no structurally identical node
    /// exists.
    pub fn and_edge(&mut self, a: Edge, b: Edge) -> Edge {
        let a = self.resolve(a);
        let b = self.resolve(b);
        if a == Edge::FALSE || b == Edge::FALSE || a == !b {
            return Edge::FALSE;
        }
        if a == Edge::TRUE {
            return b;
        }
        if b == Edge::TRUE {
            return a;
        }
        if a == b {
            return a;
        }
        let (f0, f1) = if a.code() <= b.code() { (a, b) } else { (b, a) };
        if let Some(existing) = self.lookup(f0, f1) {
            return Edge::new(existing, false);
        }
        if self.n_ands >= self.buckets.len() {
            self.rehash_all();
        }
        let level = 1 + self.level(f0.node()).max(self.level(f1.node()));
        let id = self.push_node(Node::new(NodeKind::And, [f0, f1], level));
        self.hash_insert(id);
        self.nodes[f0.node() as usize].fanouts.push(id);
        self.nodes[f1.node() as usize].fanouts.push(id);
        self.n_ands += 1;
        Edge::new(id, false)
    }

    /// The edge computing `a OR b`.
    pub fn or_edge(&mut self, a: Edge, b: Edge) -> Edge {
        !self.and_edge(!a, !b)
    }

    /// The edge computing `a XOR b`.
    pub fn xor_edge(&mut self, a: Edge, b: Edge) -> Edge {
        let left = self.and_edge(a, !b);
        let right = self.and_edge(!a, b);
        self.or_edge(left, right)
    }

    /// Creates an AND node without trivial simplification and without the
    /// structural-hash lookup, so a duplicate of an existing node can be
    /// constructed. Used for building test graphs; regular construction
    /// goes through [`Aig::and_edge`].
    pub fn and_node_raw(&mut self, a: Edge, b: Edge) -> Edge {
        let level = 1 + self.level(a.node()).max(self.level(b.node()));
        let id = self.push_node(Node::new(NodeKind::And, [a, b], level));
        self.hash_insert(id);
        self.nodes[a.node() as usize].fanouts.push(id);
        self.nodes[b.node() as usize].fanouts.push(id);
        self.n_ands += 1;
        Edge::new(id, false)
    }

    fn remove_fanout(&mut self, node: NodeId, fanout: NodeId) {
        let list = &mut self.nodes[node as usize].fanouts;
        if let Some(pos) = list.iter().position(|&f| f == fanout) {
            list.swap_remove(pos);
        }
    }

    /// Retires a live AND node: removes it from the hash table and from
    /// its fanins' fanout lists, and records where its references should
    /// be forwarded. The node's own fanout list is left in place until the
    /// substitution queue moves it.
    fn detach(&mut self, node: NodeId, target: Edge) {
        debug_assert!(!self.nodes[node as usize].dead);
        debug_assert!(self.is_and(node));
        debug_assert_ne!(target.node(), node);
        self.unhash(node);
        let [g0, g1] = self.nodes[node as usize].fanin;
        self.remove_fanout(g0.node(), node);
        self.remove_fanout(g1.node(), node);
        self.nodes[node as usize].dead = true;
        self.forward[node as usize] = target;
        self.n_ands -= 1;
    }

    /// Recomputes the level of the node and propagates changes through its
    /// transitive fanout.
    fn update_levels_from(&mut self, node: NodeId) {
        let mut queue = VecDeque::new();
        queue.push_back(node);
        while let Some(n) = queue.pop_front() {
            if !self.is_and(n) || self.nodes[n as usize].dead {
                continue;
            }
            let nd = &self.nodes[n as usize];
            let level = 1 + self.level(nd.fanin[0].node()).max(self.level(nd.fanin[1].node()));
            if level != nd.level {
                self.nodes[n as usize].level = level;
                queue.extend(self.nodes[n as usize].fanouts.iter().copied());
            }
        }
    }

    /// Replaces every reference to `old` with `new` (adjusted for
    /// inversion). Fanouts whose fanin pair becomes trivial or collides
    /// with an existing node are collapsed in turn, so the substitution is
    /// transitive.
    pub fn substitute(&mut self, old: NodeId, new: Edge) {
        if self.nodes[old as usize].dead {
            return;
        }
        let new = self.resolve(new);
        if new.node() == old {
            return;
        }
        self.detach(old, new);

        let mut queue: VecDeque<(NodeId, Edge)> = VecDeque::new();
        queue.push_back((old, new));

        while let Some((old, target)) = queue.pop_front() {
            let target = self.resolve(target);

            // Rewrite output references.
            for i in 0..self.outputs.len() {
                let out = self.outputs[i];
                if out.node() == old {
                    let repl = target.invert_if(out.is_inverted());
                    self.outputs[i] = repl;
                    self.nodes[old as usize].n_output_refs -= 1;
                    self.nodes[repl.node() as usize].n_output_refs += 1;
                }
            }

            // Rewrite AND fanouts.
            let fanouts = std::mem::take(&mut self.nodes[old as usize].fanouts);
            for f in fanouts {
                if self.nodes[f as usize].dead {
                    continue;
                }
                let [mut f0, mut f1] = self.nodes[f as usize].fanin;
                if f0.node() != old && f1.node() != old {
                    continue;
                }
                self.unhash(f);
                if f0.node() == old {
                    f0 = target.invert_if(f0.is_inverted());
                }
                if f1.node() == old {
                    f1 = target.invert_if(f1.is_inverted());
                }
                if f0.code() > f1.code() {
                    std::mem::swap(&mut f0, &mut f1);
                }

                let collapse = if f0 == Edge::FALSE || f1 == Edge::FALSE || f0 == !f1 {
                    Some(Edge::FALSE)
                } else if f0 == Edge::TRUE {
                    Some(f1)
                } else if f0 == f1 {
                    Some(f0)
                } else {
                    self.lookup(f0, f1).map(|id| Edge::new(id, false))
                };

                match collapse {
                    Some(collapse_target) => {
                        // f itself vanishes; forward its own fanouts
                        // through the queue.
                        self.detach(f, collapse_target);
                        queue.push_back((f, collapse_target));
                    }
                    None => {
                        self.nodes[f as usize].fanin = [f0, f1];
                        self.hash_insert(f);
                        self.nodes[target.node() as usize].fanouts.push(f);
                        self.update_levels_from(f);
                    }
                }
            }
        }
    }

    /// The nodes reachable from the given root edges, fanins first.
    pub fn dfs_topological(&self, roots: &[Edge]) -> Vec<NodeId> {
        let mut visited = FixedBitSet::with_capacity(self.nodes.len());
        let mut order = Vec::new();
        let mut stack: Vec<(NodeId, bool)> =
            roots.iter().rev().map(|e| (e.node(), false)).collect();
        while let Some((n, expanded)) = stack.pop() {
            if expanded {
                order.push(n);
                continue;
            }
            if visited.contains(n as usize) {
                continue;
            }
            visited.insert(n as usize);
            stack.push((n, true));
            if self.is_and(n) {
                let [f0, f1] = self.nodes[n as usize].fanin;
                stack.push((f0.node(), false));
                stack.push((f1.node(), false));
            }
        }
        order
    }

    fn mark_reachable(&self) -> FixedBitSet {
        let mut reachable = FixedBitSet::with_capacity(self.nodes.len());
        for n in self.dfs_topological(&self.outputs) {
            reachable.insert(n as usize);
        }
        reachable
    }

    /// Rebuilds the arena in topological order, discarding nodes that are
    /// dead or unreachable from the outputs. All inputs are kept, in
    /// order. Returns the remap table from old node index to new edge;
    /// discarded nodes map to an unusable sentinel.
    pub fn compact(&mut self) -> Vec<Edge> {
        let mut fresh = Aig::new();
        let mut remap = vec![Edge::NONE; self.nodes.len()];
        remap[0] = Edge::TRUE;
        for &pi in &self.inputs {
            remap[pi as usize] = fresh.fresh_input();
        }
        let reachable = self.mark_reachable();
        for n in self.dfs_topological(&self.outputs) {
            if !self.is_and(n) || self.nodes[n as usize].dead || !reachable.contains(n as usize) {
                continue;
            }
            let [f0, f1] = self.nodes[n as usize].fanin;
            let e0 = remap[f0.node() as usize].invert_if(f0.is_inverted());
            let e1 = remap[f1.node() as usize].invert_if(f1.is_inverted());
            debug_assert!(e0 != Edge::NONE && e1 != Edge::NONE);
            remap[n as usize] = fresh.and_edge(e0, e1);
        }
        for &out in &self.outputs {
            let mapped = remap[out.node() as usize].invert_if(out.is_inverted());
            fresh.add_output(mapped);
        }
        *self = fresh;
        remap
    }

    /// Evaluates the graph on a single input assignment and returns the
    /// output values.
    pub fn evaluate(&self, inputs: &[bool]) -> Vec<bool> {
        debug_assert_eq!(inputs.len(), self.num_inputs());
        let mut values = vec![false; self.nodes.len()];
        values[0] = true;
        for (i, &pi) in self.inputs.iter().enumerate() {
            values[pi as usize] = inputs[i];
        }
        for n in self.dfs_topological(&self.outputs) {
            if self.is_and(n) {
                let [f0, f1] = self.nodes[n as usize].fanin;
                let v0 = values[f0.node() as usize] ^ f0.is_inverted();
                let v1 = values[f1.node() as usize] ^ f1.is_inverted();
                values[n as usize] = v0 && v1;
            }
        }
        self.outputs
            .iter()
            .map(|e| values[e.node() as usize] ^ e.is_inverted())
            .collect()
    }

    /// The functional representative recorded for the node, if any.
    pub fn repr(&self, node: NodeId) -> Option<Edge> {
        let r = self.reprs[node as usize];
        if r == Edge::NONE {
            None
        } else {
            Some(r)
        }
    }

    pub fn set_repr(&mut self, node: NodeId, repr: Edge) {
        self.reprs[node as usize] = repr;
    }

    pub fn clear_reprs(&mut self) {
        for r in &mut self.reprs {
            *r = Edge::NONE;
        }
    }

    /// Links `node` into the choice chain of its representative.
    pub fn add_choice(&mut self, repr: NodeId, node: NodeId) {
        debug_assert_ne!(repr, node);
        self.choices[node as usize] = self.choices[repr as usize];
        self.choices[repr as usize] = node;
    }

    pub fn choice_next(&self, node: NodeId) -> Option<NodeId> {
        let c = self.choices[node as usize];
        if c == NO_NODE {
            None
        } else {
            Some(c)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_simplifications() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        assert_eq!(aig.and_edge(a, !a), Edge::FALSE);
        assert_eq!(aig.and_edge(a, aig.const_true()), a);
        assert_eq!(aig.and_edge(a, Edge::FALSE), Edge::FALSE);
        assert_eq!(aig.and_edge(a, a), a);
        let ab = aig.and_edge(a, b);
        assert!(!ab.is_inverted());
        assert_eq!(aig.fanin0(ab.node()), a.min(b));
        assert_eq!(aig.fanin1(ab.node()), a.max(b));
    }

    #[test]
    fn test_hash_consing_is_idempotent() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let n1 = aig.and_edge(a, b);
        let n2 = aig.and_edge(b, a);
        assert_eq!(n1, n2);
        assert_eq!(aig.num_ands(), 1);
        let n3 = aig.and_edge(!a, !b);
        assert_ne!(n1, n3);
        assert_eq!(aig.num_ands(), 2);
    }

    #[test]
    fn test_levels() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let ab = aig.and_edge(a, b);
        let abc = aig.and_edge(ab, c);
        assert_eq!(aig.level(ab.node()), 1);
        assert_eq!(aig.level(abc.node()), 2);
    }

    #[test]
    fn test_substitute_moves_fanouts() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let n1 = aig.and_edge(a, b);
        let n2 = aig.and_node_raw(b, a);
        let top = aig.and_edge(n2, c);
        aig.add_output(top);

        aig.substitute(n2.node(), n1);
        assert!(aig.is_dead(n2.node()));
        let top = aig.resolve(top);
        let fanins = [aig.fanin0(top.node()).node(), aig.fanin1(top.node()).node()];
        assert!(fanins.contains(&n1.node()));
        assert!(!fanins.contains(&n2.node()));
        let out = aig.output(0);
        assert_eq!(aig.evaluate(&[true, true, true]), vec![true]);
        assert_eq!(aig.evaluate(&[true, false, true]), vec![false]);
        assert!(!aig.is_dead(out.node()));
    }

    #[test]
    fn test_substitute_collapses_transitively() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let n1 = aig.and_edge(a, b);
        // duplicate of n1 and a distinct user of the duplicate
        let n2 = aig.and_node_raw(a, b);
        let top1 = aig.and_edge(n1, !n2);
        aig.add_output(top1);

        // merging n2 into n1 turns top1 into n1 AND !n1 = false
        aig.substitute(n2.node(), n1);
        assert_eq!(aig.resolve(top1), Edge::FALSE);
        assert_eq!(aig.output(0), Edge::FALSE);
    }

    #[test]
    fn test_compact_discards_dead_nodes() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let ab = aig.and_edge(a, b);
        let _unused = aig.and_edge(!a, b);
        aig.add_output(ab);
        assert_eq!(aig.num_ands(), 2);
        let remap = aig.compact();
        assert_eq!(aig.num_ands(), 1);
        assert_eq!(aig.num_inputs(), 2);
        assert_eq!(remap[ab.node() as usize].node(), aig.output(0).node());
        assert_eq!(aig.evaluate(&[true, true]), vec![true]);
        assert_eq!(aig.evaluate(&[false, true]), vec![false]);
    }

    #[test]
    fn test_xor() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let x = aig.xor_edge(a, b);
        aig.add_output(x);
        assert_eq!(aig.evaluate(&[false, false]), vec![false]);
        assert_eq!(aig.evaluate(&[true, false]), vec![true]);
        assert_eq!(aig.evaluate(&[false, true]), vec![true]);
        assert_eq!(aig.evaluate(&[true, true]), vec![false]);
    }
}
