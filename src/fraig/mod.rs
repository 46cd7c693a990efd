//! Functional reduction of and-inverter graphs.
//!
//! The engine partitions nodes into candidate equivalence classes by
//! random simulation, confirms or refutes each candidate pair with an
//! incremental SAT solver over the pair's fan-in cones, refines the
//! classes with the counterexamples the solver produces, and finally
//! merges all proven pairs in place.

pub(crate) mod cnf;

use std::collections::HashMap;
use std::fmt;

use log::{debug, info};

use crate::aig::simulation::Simulator;
use crate::aig::{Aig, Edge, NodeId};
use crate::sat::{LBool, Solver, SolverResult};
use cnf::CnfBuilder;

/// Number of refinement rounds allowed for a single node before the pair
/// is abandoned. Protects against thrashing once the rotating dynamic
/// pattern window starts evicting old counterexamples.
const MAX_REFINEMENTS: usize = 64;

/// Options of one functional-reduction session.
#[derive(Debug, Clone)]
pub struct FraigOptions {
    /// Words of random simulation patterns.
    pub n_pats_random: usize,
    /// Words of counterexample-derived patterns retained; beyond this the
    /// oldest word is overwritten.
    pub n_pats_dyna: usize,
    /// Conflict budget per candidate pair.
    pub bt_limit: u64,
    /// Remaining global budget on clause inspections (0 = unlimited).
    pub insp_limit: u64,
    /// Also test candidates whose function is unique under simulation.
    pub do_sparse: bool,
    /// Attempt to prove the single output constant zero at the end of the
    /// session.
    pub try_prove: bool,
    /// Record merged nodes as structural choices instead of removing them.
    pub choicing: bool,
    /// Seed of the pattern generator.
    pub seed: u32,
}

impl Default for FraigOptions {
    fn default() -> Self {
        Self {
            n_pats_random: 32,
            n_pats_dyna: 32,
            bt_limit: 100,
            insp_limit: 0,
            do_sparse: true,
            try_prove: false,
            choicing: false,
            seed: 0x5eed,
        }
    }
}

/// Counters of one functional-reduction session.
#[derive(Debug, Default, Clone)]
pub struct FraigStats {
    /// Candidate pairs proven equivalent.
    pub pairs_proved: u64,
    /// Candidate pairs refuted by a counterexample.
    pub pairs_refuted: u64,
    /// Candidate pairs abandoned on a resource limit.
    pub pairs_failed: u64,
    /// Counterexample pattern words appended.
    pub patterns_added: u64,
    /// SAT conflicts spent in this session.
    pub conflicts: u64,
    /// Clause inspections spent in this session.
    pub inspects: u64,
}

impl fmt::Display for FraigStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proved: {}, refuted: {}, failed: {}, patterns: {}, conflicts: {}",
            self.pairs_proved,
            self.pairs_refuted,
            self.pairs_failed,
            self.patterns_added,
            self.conflicts
        )
    }
}

/// What the session learned about a single-output miter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiterStatus {
    Unknown,
    /// The output collapsed to constant zero: the miter is unsatisfiable.
    ConstantZero,
    /// An input assignment on which the output simulates to one.
    CandidateCex(Vec<bool>),
}

/// The result of a functional-reduction session.
#[derive(Debug)]
pub struct FraigReport {
    /// Nodes merged into their representatives.
    pub merged: usize,
    pub stats: FraigStats,
    pub miter: MiterStatus,
}

struct FraigEngine<'a> {
    aig: &'a mut Aig,
    sim: Simulator,
    solver: Solver,
    cnf: CnfBuilder,
    options: FraigOptions,
    stats: FraigStats,
    /// Representative nodes discovered so far, bucketed by fingerprint.
    rep_list: Vec<NodeId>,
    buckets: HashMap<u64, Vec<NodeId>>,
    insp_left: u64,
    out_of_budget: bool,
}

/// Runs one functional-reduction session over the graph.
pub fn fraig_sweep(aig: &mut Aig, options: &FraigOptions) -> FraigReport {
    let sim = Simulator::new(
        aig,
        options.n_pats_random.max(1),
        options.n_pats_dyna.max(1),
        options.seed,
    );
    let insp_left = if options.insp_limit == 0 {
        u64::MAX
    } else {
        options.insp_limit
    };
    let mut engine = FraigEngine {
        sim,
        solver: Solver::default(),
        cnf: CnfBuilder::new(aig.num_nodes()),
        options: options.clone(),
        stats: FraigStats::default(),
        rep_list: Vec::new(),
        buckets: HashMap::new(),
        insp_left,
        out_of_budget: false,
        aig,
    };
    engine.run()
}

impl<'a> FraigEngine<'a> {
    fn run(&mut self) -> FraigReport {
        let mut topo = self.aig.dfs_topological(self.aig.outputs());
        // Process by level so that the representative of every class is a
        // node of minimum level; level order is also topological.
        topo.sort_by_key(|&n| (self.aig.level(n), n));
        // the constant node anchors the class of constant functions
        self.register(0);
        let mut merges: Vec<(NodeId, Edge)> = Vec::new();

        for i in 0..topo.len() {
            let n = topo[i];
            if n == 0 {
                continue;
            }
            if !self.aig.is_and(n) {
                // inputs are free variables; they only ever represent
                self.register(n);
                continue;
            }
            if !self.options.do_sparse && self.is_unique_under_simulation(n) {
                // a node in a singleton bucket computes a function no other
                // node shows under simulation; skip the equivalence test
                self.register(n);
                continue;
            }
            match self.process_node(n) {
                Some(target) => merges.push((n, target)),
                None => self.register(n),
            }
        }

        // A simulated pattern raising the miter output is a counterexample
        // candidate; collect it before merging invalidates the vectors.
        let mut miter = MiterStatus::Unknown;
        if self.aig.num_outputs() == 1 {
            let out = self.aig.output(0);
            if let Some((w, bit)) = self.sim.find_one_bit(out) {
                miter = MiterStatus::CandidateCex(self.sim.pattern_at(self.aig, w, bit));
            }
        }

        let merged = merges.len();
        for (n, target) in merges {
            if self.aig.is_dead(n) {
                continue;
            }
            let target = self.aig.resolve(target);
            self.aig.set_repr(n, target);
            if self.options.choicing {
                self.aig.add_choice(target.node(), n);
            } else {
                self.aig.substitute(n, target);
            }
        }

        if self.aig.num_outputs() == 1 && miter == MiterStatus::Unknown {
            if self.aig.output(0) == Edge::FALSE {
                miter = MiterStatus::ConstantZero;
            } else if self.options.try_prove && !self.out_of_budget {
                miter = self.prove_output();
            }
        }

        info!(
            "fraig: merged {} of {} candidates ({})",
            merged,
            merged + self.stats.pairs_failed as usize,
            self.stats
        );
        FraigReport {
            merged,
            stats: self.stats.clone(),
            miter,
        }
    }

    fn register(&mut self, n: NodeId) {
        let fp = self.sim.fingerprint(n);
        self.rep_list.push(n);
        self.buckets.entry(fp).or_insert_with(Vec::new).push(n);
    }

    fn rebucket(&mut self) {
        self.buckets.clear();
        for i in 0..self.rep_list.len() {
            let n = self.rep_list[i];
            let fp = self.sim.fingerprint(n);
            self.buckets.entry(fp).or_insert_with(Vec::new).push(n);
        }
    }

    /// Whether the node's fingerprint bucket is a singleton: no other node
    /// has shown the same function under the current patterns.
    fn is_unique_under_simulation(&self, n: NodeId) -> bool {
        let fp = self.sim.fingerprint(n);
        self.buckets.get(&fp).map_or(true, |bucket| bucket.is_empty())
    }

    /// Looks for a representative with an identical simulation vector
    /// (modulo complement).
    fn find_candidate(&self, n: NodeId) -> Option<(NodeId, bool)> {
        let fp = self.sim.fingerprint(n);
        let bucket = self.buckets.get(&fp)?;
        for &r in bucket {
            if let Some(phase) = self.sim.equal_up_to_phase(r, n) {
                return Some((r, phase));
            }
        }
        None
    }

    /// Tries to merge the node into an existing representative. Returns the
    /// target edge if the equivalence was proven.
    fn process_node(&mut self, n: NodeId) -> Option<Edge> {
        for _ in 0..MAX_REFINEMENTS {
            let (r, phase) = self.find_candidate(n)?;
            if self.out_of_budget {
                self.stats.pairs_failed += 1;
                return None;
            }
            match self.prove_pair(n, r, phase) {
                SolverResult::Unsat => {
                    self.stats.pairs_proved += 1;
                    return Some(Edge::new(r, phase));
                }
                SolverResult::Sat => {
                    self.stats.pairs_refuted += 1;
                    self.refine_with_model();
                    debug_assert!(self.sim.equal_up_to_phase(r, n).is_none());
                }
                SolverResult::Undetermined => {
                    self.stats.pairs_failed += 1;
                    return None;
                }
            }
        }
        self.stats.pairs_failed += 1;
        None
    }

    fn prove_pair(&mut self, n: NodeId, r: NodeId, phase: bool) -> SolverResult {
        let miter = self.cnf.add_xor_miter(
            self.aig,
            &mut self.solver,
            Edge::new(n, false),
            Edge::new(r, phase),
        );
        let before_conflicts = self.solver.stats().conflicts;
        let before_inspects = self.solver.stats().inspects;
        self.solver
            .set_limits(self.options.bt_limit, self.insp_left.min(u64::MAX - 1), None);
        let result = self.solver.solve_with_assumptions(&[miter]);
        let conflicts = self.solver.stats().conflicts - before_conflicts;
        let inspects = self.solver.stats().inspects - before_inspects;
        self.stats.conflicts += conflicts;
        self.stats.inspects += inspects;
        if self.insp_left != u64::MAX {
            self.insp_left = self.insp_left.saturating_sub(inspects);
            if self.insp_left == 0 {
                debug!("fraig: global inspection budget exhausted");
                self.out_of_budget = true;
            }
        }
        result
    }

    /// Turns the solver model into a fresh pattern word: bit 0 is the
    /// counterexample, the remaining bits repeat it with one input flipped
    /// each, rotating over the inputs.
    fn refine_with_model(&mut self) {
        let n_inputs = self.aig.num_inputs();
        let mut cex = Vec::with_capacity(n_inputs);
        for pi in self.aig.inputs() {
            let value = match self.cnf.node_var(pi) {
                Some(var) => self.solver.model(var) == LBool::True,
                // inputs outside the proven cones are unconstrained
                None => self.sim.random_word() & 1 != 0,
            };
            cex.push(value);
        }
        let aig = &*self.aig;
        let sim = &mut self.sim;
        sim.add_dynamic_word(aig, |i, _| {
            let base = if cex[i] { !0u32 } else { 0 };
            let mut flips = 0u32;
            if n_inputs > 0 {
                for bit in 1..32 {
                    if (bit - 1) % n_inputs == i {
                        flips |= 1 << bit;
                    }
                }
            }
            base ^ flips
        });
        self.stats.patterns_added += 1;
        self.rebucket();
    }

    /// Final attempt to prove the single output constant zero.
    fn prove_output(&mut self) -> MiterStatus {
        let out = self.aig.output(0);
        if !self.aig.is_and(out.node()) {
            return MiterStatus::Unknown;
        }
        let lit = self.cnf.add_cone(self.aig, &mut self.solver, out);
        self.solver
            .set_limits(self.options.bt_limit, self.insp_left.min(u64::MAX - 1), None);
        let before_conflicts = self.solver.stats().conflicts;
        let result = self.solver.solve_with_assumptions(&[lit]);
        self.stats.conflicts += self.solver.stats().conflicts - before_conflicts;
        match result {
            SolverResult::Unsat => {
                // the output node is the constant matching its inversion
                let node = out.node();
                let target = if out.is_inverted() {
                    Edge::TRUE
                } else {
                    Edge::FALSE
                };
                self.aig.substitute(node, target);
                MiterStatus::ConstantZero
            }
            SolverResult::Sat => {
                let mut cex = Vec::with_capacity(self.aig.num_inputs());
                for pi in self.aig.inputs() {
                    let value = match self.cnf.node_var(pi) {
                        Some(var) => self.solver.model(var) == LBool::True,
                        None => false,
                    };
                    cex.push(value);
                }
                MiterStatus::CandidateCex(cex)
            }
            SolverResult::Undetermined => MiterStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A duplicated AND pair is merged and the duplicate's fanout follows.
    #[test]
    fn test_merges_structural_duplicate() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let n1 = aig.and_edge(a, b);
        let n2 = aig.and_node_raw(b, a);
        let top = aig.and_edge(n2, c);
        aig.add_output(top);
        aig.add_output(n1);
        assert_ne!(n1.node(), n2.node());

        let report = fraig_sweep(&mut aig, &FraigOptions::default());
        assert!(report.merged >= 1);
        // the later duplicate is merged into the earlier node
        assert!(aig.is_dead(n2.node()));
        assert!(!aig.is_dead(n1.node()));
        let top = aig.resolve(top);
        let fanins = [aig.fanin0(top.node()).node(), aig.fanin1(top.node()).node()];
        assert!(fanins.contains(&n1.node()));
    }

    /// Functionally equivalent but structurally different cones merge.
    #[test]
    fn test_merges_functional_equivalence() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        // xor two ways
        let x1 = aig.xor_edge(a, b);
        let or = aig.or_edge(a, b);
        let nand = aig.and_edge(a, b);
        let x2 = aig.and_edge(or, !nand);
        let miter = aig.xor_edge(x1, x2);
        aig.add_output(miter);

        let report = fraig_sweep(&mut aig, &FraigOptions::default());
        assert_eq!(report.miter, MiterStatus::ConstantZero);
        assert_eq!(aig.output(0), Edge::FALSE);
    }

    /// A satisfiable miter yields a candidate counterexample.
    #[test]
    fn test_finds_candidate_counterexample() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let and = aig.and_edge(a, b);
        let or = aig.or_edge(a, b);
        let miter = aig.xor_edge(and, or);
        aig.add_output(miter);

        let report = fraig_sweep(&mut aig, &FraigOptions::default());
        match report.miter {
            MiterStatus::CandidateCex(cex) => {
                let original = {
                    let mut aig = Aig::new();
                    let a = aig.fresh_input();
                    let b = aig.fresh_input();
                    let and = aig.and_edge(a, b);
                    let or = aig.or_edge(a, b);
                    let miter = aig.xor_edge(and, or);
                    aig.add_output(miter);
                    aig
                };
                assert_eq!(original.evaluate(&cex), vec![true]);
            }
            other => panic!("expected candidate counterexample, got {:?}", other),
        }
    }

    /// A second sweep over an already reduced graph merges nothing.
    #[test]
    fn test_sweep_is_idempotent() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let x1 = aig.xor_edge(a, b);
        let or = aig.or_edge(a, b);
        let nand = aig.and_edge(a, b);
        let x2 = aig.and_edge(or, !nand);
        let miter = aig.xor_edge(x1, x2);
        aig.add_output(miter);

        fraig_sweep(&mut aig, &FraigOptions::default());
        aig.compact();
        let second = fraig_sweep(&mut aig, &FraigOptions::default());
        assert_eq!(second.merged, 0);
    }

    /// Choice recording keeps the merged node in a chain instead of
    /// substituting it away.
    #[test]
    fn test_choicing_preserves_nodes() {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let n1 = aig.and_edge(a, b);
        let n2 = aig.and_node_raw(b, a);
        let top = aig.and_edge(n2, a);
        aig.add_output(top);
        aig.add_output(n1);

        let options = FraigOptions {
            choicing: true,
            ..FraigOptions::default()
        };
        let report = fraig_sweep(&mut aig, &options);
        assert!(report.merged >= 1);
        assert!(!aig.is_dead(n2.node()));
        assert_eq!(aig.repr(n2.node()).map(|e| e.node()), Some(n1.node()));
        // the choice chain of the representative contains the merged node
        let mut chain = Vec::new();
        let mut cursor = aig.choice_next(n1.node());
        while let Some(c) = cursor {
            chain.push(c);
            cursor = aig.choice_next(c);
        }
        assert!(chain.contains(&n2.node()));
    }
}
