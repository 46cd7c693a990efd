//! Structural rewriting of and-inverter graphs.
//!
//! Three single-sweep transformations: cut-based rewriting against a
//! table of NPN-class implementations, refactoring of wide cones, and
//! depth-driven balancing of AND trees. All node construction goes
//! through [`Aig::and_edge`], so the store invariants are preserved by
//! construction.

mod balance;
mod cut;
mod refactor;
mod resynth;

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::aig::{Aig, Edge, NodeId};

pub use balance::balance;
pub use refactor::refactor_pass;

/// Options shared by the rewriting passes.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Refuse any replacement that would raise the level of the node being
    /// replaced.
    pub preserve_levels: bool,
    /// Accept replacements that save no nodes; useful for perturbing the
    /// structure between iterations.
    pub use_zeros: bool,
}

/// Size of the maximum fanout-free cone of the node: the number of AND
/// nodes that would become dead if the node were removed.
pub(crate) fn mffc_size(aig: &Aig, root: NodeId) -> usize {
    fn deref(aig: &Aig, n: NodeId, counts: &mut HashMap<NodeId, usize>) -> usize {
        let mut size = 1;
        for fanin in &[aig.fanin0(n), aig.fanin1(n)] {
            let m = fanin.node();
            if !aig.is_and(m) {
                continue;
            }
            let count = counts.entry(m).or_insert_with(|| aig.fanout_count(m));
            *count -= 1;
            if *count == 0 {
                size += deref(aig, m, counts);
            }
        }
        size
    }
    if !aig.is_and(root) {
        return 0;
    }
    let mut counts = HashMap::new();
    deref(aig, root, &mut counts)
}

/// Whether the cone of `root` contains `target`. Used to rule out
/// replacements that would introduce a cycle.
pub(crate) fn cone_contains(aig: &Aig, root: NodeId, target: NodeId) -> bool {
    if root == target {
        return true;
    }
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if n == target {
            return true;
        }
        if !aig.is_and(n) || !visited.insert(n) {
            continue;
        }
        stack.push(aig.fanin0(n).node());
        stack.push(aig.fanin1(n).node());
    }
    false
}

/// One sweep of cut-based rewriting. For every AND node, enumerates
/// 4-feasible cuts, looks the cut function up in the NPN implementation
/// table, and replaces the node when the best implementation saves nodes.
/// Returns the approximate number of nodes saved.
pub fn rewrite_pass(aig: &mut Aig, options: &RewriteOptions) -> usize {
    let topo = aig.dfs_topological(aig.outputs());
    let cuts = cut::enumerate_cuts(aig, &topo);
    let mut table = resynth::RewriteTable::new();
    let mut total_gain = 0usize;

    for &n in &topo {
        if !aig.is_and(n) || aig.is_dead(n) {
            continue;
        }
        let required_level = if options.preserve_levels {
            aig.level(n)
        } else {
            u32::MAX
        };
        let mffc = mffc_size(aig, n) as i64;
        let mut best: Option<(i64, Edge)> = None;

        for cut in &cuts[n as usize] {
            if cut.leaves.len() < 2 || cut.leaves.iter().any(|&l| aig.is_dead(l)) {
                continue;
            }
            let t = resynth::cut_truth(aig, n, &cut.leaves);
            let leaf_edges: Vec<Edge> =
                cut.leaves.iter().map(|&l| Edge::new(l, false)).collect();

            let candidate = if t == 0x0000 {
                Some((mffc, Edge::FALSE))
            } else if t == 0xffff {
                Some((mffc, Edge::TRUE))
            } else if let Some(edge) = literal_of(t, &leaf_edges) {
                Some((mffc, edge))
            } else {
                let (class, transform) = table.canon(t);
                let implementation = table.implementation(class).clone();
                // without sharing the implementation adds this many nodes
                if implementation.num_steps() as i64 > mffc + 1 {
                    None
                } else {
                    let before = aig.num_ands();
                    let edge =
                        resynth::instantiate(aig, &implementation, &transform, &leaf_edges);
                    let added = (aig.num_ands() - before) as i64;
                    if edge.node() == n {
                        None
                    } else {
                        Some((mffc - added, edge))
                    }
                }
            };

            if let Some((gain, edge)) = candidate {
                let acceptable = gain > 0 || (options.use_zeros && gain >= 0);
                let level_ok =
                    edge.is_constant() || aig.level(edge.node()) <= required_level;
                let better = best.map_or(true, |(best_gain, _)| gain > best_gain);
                if acceptable && level_ok && better && !cone_contains(aig, edge.node(), n) {
                    best = Some((gain, edge));
                }
            }
        }

        if let Some((gain, edge)) = best {
            aig.substitute(n, edge);
            total_gain += gain.max(0) as usize;
        }
    }
    debug!("rewrite: saved about {} nodes", total_gain);
    total_gain
}

fn literal_of(t: u16, leaves: &[Edge]) -> Option<Edge> {
    for (i, &edge) in leaves.iter().enumerate() {
        if t == resynth::PROJECTIONS[i] {
            return Some(edge);
        }
        if t == !resynth::PROJECTIONS[i] {
            return Some(!edge);
        }
    }
    None
}
