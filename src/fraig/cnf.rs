//! Incremental conversion of AIG cones into CNF.

use crate::aig::{Aig, Edge, NodeId};
use crate::sat::{Lit, Solver, Var};

/// Maximum width of a multi-input AND collected from a fanout-free cone.
const SUPERGATE_LIMIT: usize = 16;

const NO_VAR: u32 = u32::MAX;

/// Translates cones of an AIG into clauses of a solver, caching the
/// node-to-variable mapping so that repeated calls extend the CNF
/// incrementally instead of re-encoding shared logic.
pub(crate) struct CnfBuilder {
    var_of: Vec<u32>,
}

impl CnfBuilder {
    pub(crate) fn new(n_nodes: usize) -> Self {
        Self {
            var_of: vec![NO_VAR; n_nodes],
        }
    }

    pub(crate) fn node_var(&self, node: NodeId) -> Option<Var> {
        let v = self.var_of[node as usize];
        if v == NO_VAR {
            None
        } else {
            Some(v)
        }
    }

    /// The solver literal for an edge whose node has already been encoded.
    pub(crate) fn edge_lit(&self, edge: Edge) -> Lit {
        let var = self.var_of[edge.node() as usize];
        debug_assert_ne!(var, NO_VAR);
        Lit::new(var, edge.is_inverted())
    }

    fn fresh_var(&mut self, solver: &mut Solver, node: NodeId) -> Var {
        let var = solver.new_variable(true);
        self.var_of[node as usize] = var;
        var
    }

    /// Collects the leaves of the maximal fanout-free AND cone rooted at
    /// `root`: descends through non-inverted fanins that are AND gates with
    /// a single fanout and no cached variable. De Morgan then turns the
    /// cone into one k-input AND.
    fn collect_supergate(&self, aig: &Aig, root: NodeId, leaves: &mut Vec<Edge>) {
        let mut stack = vec![aig.fanin0(root), aig.fanin1(root)];
        while let Some(edge) = stack.pop() {
            let n = edge.node();
            if !edge.is_inverted()
                && aig.is_and(n)
                && aig.fanout_count(n) == 1
                && self.node_var(n).is_none()
                && leaves.len() + stack.len() < SUPERGATE_LIMIT
            {
                stack.push(aig.fanin0(n));
                stack.push(aig.fanin1(n));
            } else {
                leaves.push(edge);
            }
        }
    }

    /// Encodes the cone of the given edge into the solver and returns the
    /// literal of the edge. Nodes that already have variables are reused,
    /// so consecutive calls share clauses.
    pub(crate) fn add_cone(&mut self, aig: &Aig, solver: &mut Solver, root: Edge) -> Lit {
        // Emit in cone-topological order: a node is encoded only after the
        // leaves of its supergate are encoded.
        let mut stack = vec![(root.node(), false)];
        let mut leaves_buf: Vec<Edge> = Vec::new();
        while let Some((n, expanded)) = stack.pop() {
            if self.node_var(n).is_some() {
                continue;
            }
            if !aig.is_and(n) {
                let var = self.fresh_var(solver, n);
                if n == 0 {
                    // the constant node is asserted once, globally
                    solver.add_clause(&[Lit::positive(var)]);
                }
                continue;
            }
            if expanded {
                leaves_buf.clear();
                self.collect_supergate(aig, n, &mut leaves_buf);
                let out = Lit::positive(self.fresh_var(solver, n));
                // (!out v leaf) for every leaf, (out v !leaf_1 v ... v !leaf_k)
                let mut last = Vec::with_capacity(leaves_buf.len() + 1);
                last.push(out);
                for &leaf in &leaves_buf {
                    let leaf_lit = self.edge_lit(leaf);
                    solver.add_clause(&[!out, leaf_lit]);
                    last.push(!leaf_lit);
                }
                solver.add_clause(&last);
            } else {
                stack.push((n, true));
                leaves_buf.clear();
                self.collect_supergate(aig, n, &mut leaves_buf);
                for &leaf in &leaves_buf {
                    if self.node_var(leaf.node()).is_none() {
                        stack.push((leaf.node(), false));
                    }
                }
            }
        }
        self.edge_lit(root)
    }

    /// Encodes both cones and a fresh XOR output over them. Assuming the
    /// returned literal asks the solver for an input assignment on which
    /// the two edges differ.
    pub(crate) fn add_xor_miter(
        &mut self,
        aig: &Aig,
        solver: &mut Solver,
        a: Edge,
        b: Edge,
    ) -> Lit {
        let la = self.add_cone(aig, solver, a);
        let lb = self.add_cone(aig, solver, b);
        let m = Lit::positive(solver.new_variable(true));
        solver.add_clause(&[!m, la, lb]);
        solver.add_clause(&[!m, !la, !lb]);
        solver.add_clause(&[m, la, !lb]);
        solver.add_clause(&[m, !la, lb]);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::{LBool, SolverResult};

    #[test]
    fn test_cone_is_satisfiable_consistently() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let ab = aig.and_edge(a, b);
        aig.add_output(ab);

        let mut solver = Solver::default();
        let mut cnf = CnfBuilder::new(aig.num_nodes());
        let root = cnf.add_cone(&aig, &mut solver, ab);

        // the AND can be true
        assert_eq!(solver.solve_with_assumptions(&[root]), SolverResult::Sat);
        let va = cnf.edge_lit(a);
        let vb = cnf.edge_lit(b);
        assert_eq!(solver.model(va.var()), LBool::True);
        assert_eq!(solver.model(vb.var()), LBool::True);
        // and it can be false
        assert_eq!(solver.solve_with_assumptions(&[!root]), SolverResult::Sat);
    }

    #[test]
    fn test_xor_miter_of_equal_cones_is_unsat() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let ab = aig.and_edge(a, b);
        // structurally different but equivalent: !(!a | !b)
        let n1 = aig.and_node_raw(a, b);
        aig.add_output(ab);
        aig.add_output(n1);

        let mut solver = Solver::default();
        let mut cnf = CnfBuilder::new(aig.num_nodes());
        let miter = cnf.add_xor_miter(&aig, &mut solver, ab, n1);
        assert_eq!(solver.solve_with_assumptions(&[miter]), SolverResult::Unsat);
    }

    #[test]
    fn test_xor_miter_of_different_cones_is_sat() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let and = aig.and_edge(a, b);
        let or = aig.or_edge(a, b);
        aig.add_output(and);
        aig.add_output(or);

        let mut solver = Solver::default();
        let mut cnf = CnfBuilder::new(aig.num_nodes());
        let miter = cnf.add_xor_miter(&aig, &mut solver, and, or);
        assert_eq!(solver.solve_with_assumptions(&[miter]), SolverResult::Sat);
        // the distinguishing assignment sets exactly one of a, b
        let va = solver.model(cnf.edge_lit(a).var()) == LBool::True;
        let vb = solver.model(cnf.edge_lit(b).var()) == LBool::True;
        assert_ne!(va && vb, va || vb);
    }

    #[test]
    fn test_incremental_reuse_keeps_results() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let ab = aig.and_edge(a, b);
        let abc = aig.and_edge(ab, c);
        aig.add_output(abc);

        let mut solver = Solver::default();
        let mut cnf = CnfBuilder::new(aig.num_nodes());
        let first = cnf.add_cone(&aig, &mut solver, abc);
        let vars_after_first = solver.num_vars();
        assert_eq!(solver.solve_with_assumptions(&[first]), SolverResult::Sat);
        // converting the same cone again adds no variables
        let second = cnf.add_cone(&aig, &mut solver, abc);
        assert_eq!(first, second);
        assert_eq!(solver.num_vars(), vars_after_first);
        assert_eq!(solver.solve_with_assumptions(&[second]), SolverResult::Sat);
    }
}
