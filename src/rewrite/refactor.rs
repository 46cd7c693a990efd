//! Refactoring of wide cones through multi-word truth tables.
//!
//! A reconvergence-driven cut of up to ten leaves is extracted around
//! each node, the cone function is computed as a bit-parallel truth
//! table, and a replacement is resynthesized by cofactor decomposition.
//! The replacement is kept when it saves nodes.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::aig::{Aig, Edge, NodeId};

use super::{cone_contains, mffc_size, RewriteOptions};

/// Maximum number of cut leaves for the extracted cone.
pub(crate) const LEAF_MAX: usize = 10;
/// Maximum number of AND nodes inside the extracted cone.
pub(crate) const CONE_MAX: usize = 16;
/// Cones whose cut fits a rewrite cut are left to the rewrite pass.
const LEAF_MIN: usize = 5;

/// A truth table over up to [`LEAF_MAX`] variables, one bit per minterm.
type Truth = Vec<u64>;

const WORD_MASKS: [u64; 6] = [
    0xaaaa_aaaa_aaaa_aaaa,
    0xcccc_cccc_cccc_cccc,
    0xf0f0_f0f0_f0f0_f0f0,
    0xff00_ff00_ff00_ff00,
    0xffff_0000_ffff_0000,
    0xffff_ffff_0000_0000,
];

fn truth_words(k: usize) -> usize {
    if k <= 6 {
        1
    } else {
        1 << (k - 6)
    }
}

fn projection(k: usize, var: usize) -> Truth {
    let words = truth_words(k);
    let mut t = vec![0u64; words];
    for (w, word) in t.iter_mut().enumerate() {
        *word = if var < 6 {
            WORD_MASKS[var]
        } else if w >> (var - 6) & 1 != 0 {
            !0
        } else {
            0
        };
    }
    t
}

/// Masks the words beyond `2^k` minterms so that tables compare equal.
fn mask_tail(t: &mut Truth, k: usize) {
    if k < 6 {
        let bits = 1u64 << (1 << k);
        t[0] &= bits - 1;
    }
}

fn truth_not(t: &Truth, k: usize) -> Truth {
    let mut out: Truth = t.iter().map(|w| !w).collect();
    mask_tail(&mut out, k);
    out
}

fn is_all_zero(t: &Truth) -> bool {
    t.iter().all(|&w| w == 0)
}

fn is_all_ones(t: &Truth, k: usize) -> bool {
    is_all_zero(&truth_not(t, k))
}

fn cofactor(t: &Truth, k: usize, var: usize, value: bool) -> Truth {
    let mut out = t.clone();
    if var < 6 {
        let mask = WORD_MASKS[var];
        let shift = 1 << var;
        for word in out.iter_mut() {
            *word = if value {
                let high = *word & mask;
                high | high >> shift
            } else {
                let low = *word & !mask;
                low | low << shift
            };
        }
    } else {
        let block = 1 << (var - 6);
        for w in 0..out.len() {
            let source = if value { w | block } else { w & !block };
            out[w] = t[source];
        }
    }
    mask_tail(&mut out, k);
    out
}

fn count_ones(t: &Truth) -> u32 {
    t.iter().map(|w| w.count_ones()).sum()
}

/// Extracts a reconvergence-driven cut around `root`: leaves are expanded
/// into their fanins while the leaf count stays within [`LEAF_MAX`],
/// preferring expansions that reconverge (add the fewest new leaves).
fn extract_cone(aig: &Aig, root: NodeId) -> Vec<NodeId> {
    let mut cone: HashSet<NodeId> = HashSet::new();
    cone.insert(root);
    let mut leaves: Vec<NodeId> = Vec::new();
    for fanin in &[aig.fanin0(root), aig.fanin1(root)] {
        if !leaves.contains(&fanin.node()) {
            leaves.push(fanin.node());
        }
    }

    loop {
        if cone.len() >= CONE_MAX {
            break;
        }
        let mut best: Option<(usize, usize, u32)> = None;
        for (idx, &leaf) in leaves.iter().enumerate() {
            if !aig.is_and(leaf) {
                continue;
            }
            let cost = [aig.fanin0(leaf), aig.fanin1(leaf)]
                .iter()
                .filter(|f| !cone.contains(&f.node()) && !leaves.contains(&f.node()))
                .count();
            let level = aig.level(leaf);
            let better = match best {
                None => true,
                Some((best_cost, _, best_level)) => {
                    cost < best_cost || (cost == best_cost && level > best_level)
                }
            };
            if better {
                best = Some((cost, idx, level));
            }
        }
        let (cost, idx, _) = match best {
            Some(b) => b,
            None => break,
        };
        if leaves.len() - 1 + cost > LEAF_MAX {
            break;
        }
        let leaf = leaves.swap_remove(idx);
        cone.insert(leaf);
        for fanin in &[aig.fanin0(leaf), aig.fanin1(leaf)] {
            let n = fanin.node();
            if !cone.contains(&n) && !leaves.contains(&n) {
                leaves.push(n);
            }
        }
    }
    leaves
}

/// Computes the cone function of `root` over the given leaves.
fn cone_truth(aig: &Aig, root: NodeId, leaves: &[NodeId]) -> Truth {
    let k = leaves.len();
    let mut memo: HashMap<NodeId, Truth> = HashMap::new();
    for (i, &leaf) in leaves.iter().enumerate() {
        memo.insert(leaf, projection(k, i));
    }
    fn eval(aig: &Aig, n: NodeId, k: usize, memo: &mut HashMap<NodeId, Truth>) -> Truth {
        if let Some(t) = memo.get(&n) {
            return t.clone();
        }
        debug_assert!(aig.is_and(n));
        let f0 = aig.fanin0(n);
        let f1 = aig.fanin1(n);
        let mut t0 = eval(aig, f0.node(), k, memo);
        let mut t1 = eval(aig, f1.node(), k, memo);
        if f0.is_inverted() {
            t0 = truth_not(&t0, k);
        }
        if f1.is_inverted() {
            t1 = truth_not(&t1, k);
        }
        let t: Truth = t0.iter().zip(t1.iter()).map(|(a, b)| a & b).collect();
        memo.insert(n, t.clone());
        t
    }
    eval(aig, root, k, &mut memo)
}

struct TruthSynth<'a> {
    aig: &'a mut Aig,
    k: usize,
    memo: HashMap<Truth, Edge>,
}

impl<'a> TruthSynth<'a> {
    fn new(aig: &'a mut Aig, k: usize, leaves: &[Edge]) -> Self {
        let mut memo = HashMap::new();
        for (i, &leaf) in leaves.iter().enumerate() {
            memo.insert(projection(k, i), leaf);
        }
        Self { aig, k, memo }
    }

    fn lookup(&self, t: &Truth) -> Option<Edge> {
        if let Some(&e) = self.memo.get(t) {
            return Some(e);
        }
        self.memo.get(&truth_not(t, self.k)).map(|&e| !e)
    }

    fn pick_variable(&self, t: &Truth) -> Option<(usize, Truth, Truth)> {
        let mut best: Option<(u32, usize, Truth, Truth)> = None;
        for v in 0..self.k {
            let c1 = cofactor(t, self.k, v, true);
            let c0 = cofactor(t, self.k, v, false);
            if c0 == c1 {
                continue;
            }
            let score =
                (count_ones(&c1) as i64 - count_ones(&c0) as i64).unsigned_abs() as u32;
            if best.as_ref().map_or(true, |(s, ..)| score < *s) {
                best = Some((score, v, c0, c1));
            }
        }
        best.map(|(_, v, c0, c1)| (v, c0, c1))
    }

    fn build(&mut self, t: &Truth) -> Edge {
        if is_all_zero(t) {
            return Edge::FALSE;
        }
        if is_all_ones(t, self.k) {
            return Edge::TRUE;
        }
        if let Some(e) = self.lookup(t) {
            return e;
        }
        let (v, t0, t1) = self
            .pick_variable(t)
            .expect("non-constant table has support");
        let x = self.memo[&projection(self.k, v)];
        let edge = if is_all_zero(&t0) {
            let e1 = self.build(&t1);
            self.aig.and_edge(x, e1)
        } else if is_all_zero(&t1) {
            let e0 = self.build(&t0);
            self.aig.and_edge(!x, e0)
        } else if is_all_ones(&t0, self.k) {
            let e1 = self.build(&t1);
            let inner = self.aig.and_edge(x, !e1);
            !inner
        } else if is_all_ones(&t1, self.k) {
            let e0 = self.build(&t0);
            let inner = self.aig.and_edge(!x, !e0);
            !inner
        } else if t1 == truth_not(&t0, self.k) {
            let e0 = self.build(&t0);
            self.aig.xor_edge(x, e0)
        } else {
            let e1 = self.build(&t1);
            let e0 = self.build(&t0);
            let n1 = self.aig.and_edge(x, e1);
            let n2 = self.aig.and_edge(!x, e0);
            self.aig.or_edge(n1, n2)
        };
        self.memo.insert(t.clone(), edge);
        edge
    }
}

/// One sweep of cone refactoring. Returns the approximate number of nodes
/// saved.
pub fn refactor_pass(aig: &mut Aig, options: &RewriteOptions) -> usize {
    let topo = aig.dfs_topological(aig.outputs());
    let mut total_gain = 0usize;

    for &n in &topo {
        if !aig.is_and(n) || aig.is_dead(n) {
            continue;
        }
        let leaves = extract_cone(aig, n);
        if leaves.len() < LEAF_MIN || leaves.len() > LEAF_MAX {
            continue;
        }
        if leaves.iter().any(|&l| aig.is_dead(l)) {
            continue;
        }
        let truth = cone_truth(aig, n, &leaves);
        let mffc = mffc_size(aig, n) as i64;
        let leaf_edges: Vec<Edge> = leaves.iter().map(|&l| Edge::new(l, false)).collect();

        let before = aig.num_ands();
        let edge = TruthSynth::new(aig, leaves.len(), &leaf_edges).build(&truth);
        let added = (aig.num_ands() - before) as i64;
        let gain = mffc - added;

        let acceptable = gain > 0 || (options.use_zeros && gain >= 0);
        let level_ok = !options.preserve_levels
            || edge.is_constant()
            || aig.level(edge.node()) <= aig.level(n);
        if edge.node() != n && acceptable && level_ok && !cone_contains(aig, edge.node(), n) {
            aig.substitute(n, edge);
            total_gain += gain.max(0) as usize;
        }
    }
    debug!("refactor: saved about {} nodes", total_gain);
    total_gain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truth_helpers() {
        let k = 7;
        let p0 = projection(k, 0);
        let p6 = projection(k, 6);
        assert_eq!(p0.len(), 2);
        assert_eq!(p6, vec![0, !0]);
        let c1 = cofactor(&p6, k, 6, true);
        assert!(is_all_ones(&c1, k));
        let c0 = cofactor(&p6, k, 6, false);
        assert!(is_all_zero(&c0));
        // a variable is independent of another's cofactor
        assert_eq!(cofactor(&p0, k, 6, true), cofactor(&p0, k, 6, false));
    }

    #[test]
    fn test_refactor_simplifies_wide_redundancy() {
        let mut aig = Aig::new();
        let inputs: Vec<Edge> = (0..6).map(|_| aig.fresh_input()).collect();
        // or over all six inputs of (x & y_i) for one shared x: equals
        // x & (y1 | ... | y5) but built redundantly
        let x = inputs[0];
        let mut or = Edge::FALSE;
        for &y in &inputs[1..] {
            let term = aig.and_edge(x, y);
            or = aig.or_edge(or, term);
        }
        aig.add_output(or);
        let before = aig.num_ands();
        let saved = refactor_pass(&mut aig, &RewriteOptions::default());
        aig.compact();
        assert!(saved > 0, "expected savings, {} ands before", before);
        assert!(aig.num_ands() < before);
        // semantics preserved
        for pattern in [0u32, 1, 2, 0x3f, 0x21, 0x1e] {
            let bits: Vec<bool> = (0..6).map(|i| pattern >> i & 1 != 0).collect();
            let x_v = bits[0];
            let any_y = bits[1..].iter().any(|&b| b);
            assert_eq!(aig.evaluate(&bits), vec![x_v && any_y]);
        }
    }
}
