//! Bounded k-feasible cut enumeration.

use tinyvec::ArrayVec;

use crate::aig::{Aig, NodeId};

/// Maximum number of leaves of an enumerated cut.
pub(crate) const CUT_SIZE: usize = 4;
/// Maximum number of cuts kept per node.
pub(crate) const CUTS_PER_NODE: usize = 8;

/// A cut: a set of at most four leaf nodes that together cover every path
/// from the inputs to the cut's root.
#[derive(Clone, Default, Debug)]
pub(crate) struct Cut {
    /// Sorted leaf node indices.
    pub(crate) leaves: ArrayVec<[NodeId; CUT_SIZE]>,
    /// Bloom signature of the leaf set for the quick domination test.
    sign: u64,
}

impl Cut {
    fn trivial(node: NodeId) -> Self {
        let mut leaves = ArrayVec::new();
        leaves.push(node);
        Self {
            leaves,
            sign: 1u64 << (node % 64),
        }
    }

    /// The union of two sorted leaf sets, or `None` if it exceeds the cut
    /// size.
    fn merge(a: &Cut, b: &Cut) -> Option<Cut> {
        if (a.sign | b.sign).count_ones() as usize > CUT_SIZE {
            return None;
        }
        let mut leaves: ArrayVec<[NodeId; CUT_SIZE]> = ArrayVec::new();
        let mut i = 0;
        let mut j = 0;
        while i < a.leaves.len() || j < b.leaves.len() {
            let next = match (a.leaves.get(i), b.leaves.get(j)) {
                (Some(&x), Some(&y)) if x == y => {
                    i += 1;
                    j += 1;
                    x
                }
                (Some(&x), Some(&y)) if x < y => {
                    i += 1;
                    x
                }
                (Some(_), Some(&y)) => {
                    j += 1;
                    y
                }
                (Some(&x), None) => {
                    i += 1;
                    x
                }
                (None, Some(&y)) => {
                    j += 1;
                    y
                }
                (None, None) => unreachable!(),
            };
            if leaves.len() == CUT_SIZE {
                return None;
            }
            leaves.push(next);
        }
        Some(Cut {
            leaves,
            sign: a.sign | b.sign,
        })
    }

    /// Whether this cut's leaf set is a subset of the other's.
    fn dominates(&self, other: &Cut) -> bool {
        if self.leaves.len() > other.leaves.len() || self.sign & !other.sign != 0 {
            return false;
        }
        self.leaves
            .iter()
            .all(|l| other.leaves.contains(l))
    }
}

/// Enumerates cuts for all nodes in the given topological order. Returns
/// the cut sets indexed by node id; each set starts with the trivial cut.
pub(crate) fn enumerate_cuts(aig: &Aig, topo: &[NodeId]) -> Vec<Vec<Cut>> {
    let mut cuts: Vec<Vec<Cut>> = vec![Vec::new(); aig.num_nodes()];
    for &n in topo {
        if !aig.is_and(n) {
            cuts[n as usize] = vec![Cut::trivial(n)];
            continue;
        }
        let f0 = aig.fanin0(n).node();
        let f1 = aig.fanin1(n).node();
        let mut set: Vec<Cut> = vec![Cut::trivial(n)];
        for c0 in &cuts[f0 as usize] {
            for c1 in &cuts[f1 as usize] {
                let merged = match Cut::merge(c0, c1) {
                    Some(c) => c,
                    None => continue,
                };
                if set.iter().any(|c| c.dominates(&merged)) {
                    continue;
                }
                set.retain(|c| !merged.dominates(c) || c.leaves.len() == 1);
                set.push(merged);
                if set.len() > CUTS_PER_NODE {
                    break;
                }
            }
            if set.len() > CUTS_PER_NODE {
                break;
            }
        }
        cuts[n as usize] = set;
    }
    cuts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_enumeration_finds_reconvergence() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        // two nodes over the same pair of inputs reconverge at the top
        let n1 = aig.and_edge(a, b);
        let n2 = aig.and_edge(a, !b);
        let top = aig.or_edge(n1, n2);
        aig.add_output(top);

        let topo = aig.dfs_topological(aig.outputs());
        let cuts = enumerate_cuts(&aig, &topo);
        let top_cuts = &cuts[top.node() as usize];
        // one of the cuts must be exactly {a, b}
        let expected = [a.node(), b.node()];
        assert!(top_cuts.iter().any(|c| {
            c.leaves.len() == 2 && expected.iter().all(|l| c.leaves.contains(l))
        }));
    }

    #[test]
    fn test_trivial_cut_always_present() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let n = aig.and_edge(a, b);
        aig.add_output(n);
        let topo = aig.dfs_topological(aig.outputs());
        let cuts = enumerate_cuts(&aig, &topo);
        assert!(cuts[n.node() as usize]
            .iter()
            .any(|c| c.leaves.len() == 1 && c.leaves[0] == n.node()));
    }
}
