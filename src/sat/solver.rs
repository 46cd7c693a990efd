//! The CDCL search engine.

use std::fmt;
use std::time::Instant;

use log::{debug, trace};

use super::bqueue::BoundedQueue;
use super::clause::{ClauseAllocator, ClauseRef};
use super::heap::OrderHeap;
use super::watch::{WatchLists, Watcher};
use super::{LBool, Lit, SolverResult, Var};

/// Tuning constants of the solver. The defaults follow the usual
/// LBD-restart parameterization.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Forces a restart when the recent-LBD average exceeds the global
    /// average scaled by this factor.
    pub restart_k: f64,
    /// Blocks a restart when the trail is larger than the recent trail
    /// average scaled by this factor.
    pub restart_r: f64,
    /// Number of conflicts before restart blocking becomes active.
    pub first_block_restart: u64,
    /// Window length of the moving LBD average (restart forcing).
    pub lbd_queue_len: usize,
    /// Window length of the moving trail-size average (restart blocking).
    pub trail_queue_len: usize,
    /// Number of conflicts before the first learnt-database reduction.
    pub first_reduce: u64,
    /// Increment of the reduction interval.
    pub inc_reduce: u64,
    /// Extra increment applied when the kept clauses still have small LBD.
    pub special_inc_reduce: u64,
    /// A learnt clause whose LBD improves during conflict analysis is
    /// shielded from the next reduction if its LBD was at most this value.
    pub lbd_frozen_clause: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            restart_k: 0.8,
            restart_r: 1.4,
            first_block_restart: 10000,
            lbd_queue_len: 50,
            trail_queue_len: 5000,
            first_reduce: 2000,
            inc_reduce: 300,
            special_inc_reduce: 1000,
            lbd_frozen_clause: 30,
        }
    }
}

/// Counters accumulated over the lifetime of a solver.
#[derive(Debug, Default, Clone)]
pub struct SolverStats {
    pub starts: u64,
    pub reduces: u64,
    pub decisions: u64,
    pub propagations: u64,
    pub inspects: u64,
    pub conflicts: u64,
    pub clause_lits: u64,
    pub learnt_lits: u64,
}

impl fmt::Display for SolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "starts: {}, conflicts: {}, decisions: {}, propagations: {}, inspects: {}",
            self.starts, self.conflicts, self.decisions, self.propagations, self.inspects
        )
    }
}

const VAR_ACT_RESCALE_SHIFT: u32 = 19;
const CLA_ACT_RESCALE_SHIFT: u32 = 14;

/// Outcome of one run of the search loop.
enum SearchOutcome {
    Sat,
    Unsat,
    /// Unsatisfiable only under the current assumptions.
    AssumptionFailed,
    Restart,
    Interrupted,
}

/// An incremental CDCL solver.
///
/// Clauses are added with [`Solver::add_clause`] at decision level zero;
/// [`Solver::solve`] and [`Solver::solve_with_assumptions`] may be called
/// repeatedly, with further clauses and variables added in between.
pub struct Solver {
    ca: ClauseAllocator,
    clauses: Vec<ClauseRef>,
    learnts: Vec<ClauseRef>,
    watches: WatchLists,
    bin_watches: WatchLists,

    var_act_inc: u32,
    cla_act_inc: u32,

    activity: Vec<u32>,
    order: OrderHeap,
    levels: Vec<u32>,
    reasons: Vec<ClauseRef>,
    assigns: Vec<LBool>,
    polarity: Vec<bool>,

    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,

    /// Trail length at the last simplification.
    assign_simplify: usize,
    /// Propagation credit that must be spent before the next simplification.
    prop_simplify: i64,

    bq_trail: BoundedQueue,
    bq_lbd: BoundedQueue,
    sum_lbd: u64,
    conf_before_reduce: u64,
    reduce_quot: u64,
    reduce_base: u64,

    // Reusable buffers for conflict analysis.
    learnt_buf: Vec<Lit>,
    seen: Vec<bool>,
    tagged: Vec<Lit>,
    lit_stack: Vec<Var>,
    last_dlevel: Vec<Var>,

    stamp: u32,
    stamps: Vec<u32>,

    assumptions: Vec<Lit>,
    conflict: Vec<Lit>,

    conflict_budget: u64,
    inspect_budget: u64,
    deadline: Option<Instant>,

    ok: bool,
    model: Vec<LBool>,
    options: SolverOptions,
    stats: SolverStats,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl Solver {
    pub fn new(options: SolverOptions) -> Self {
        let conf_before_reduce = options.first_reduce;
        let reduce_base = options.first_reduce;
        Self {
            ca: ClauseAllocator::new(),
            clauses: Vec::new(),
            learnts: Vec::new(),
            watches: WatchLists::new(),
            bin_watches: WatchLists::new(),
            var_act_inc: 1 << 5,
            cla_act_inc: 1 << 11,
            activity: Vec::new(),
            order: OrderHeap::new(),
            levels: Vec::new(),
            reasons: Vec::new(),
            assigns: Vec::new(),
            polarity: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
            assign_simplify: 0,
            prop_simplify: 0,
            bq_trail: BoundedQueue::new(options.trail_queue_len),
            bq_lbd: BoundedQueue::new(options.lbd_queue_len),
            sum_lbd: 0,
            conf_before_reduce,
            reduce_quot: 1,
            reduce_base,
            learnt_buf: Vec::new(),
            seen: Vec::new(),
            tagged: Vec::new(),
            lit_stack: Vec::new(),
            last_dlevel: Vec::new(),
            stamp: 0,
            stamps: vec![0],
            assumptions: Vec::new(),
            conflict: Vec::new(),
            conflict_budget: u64::MAX,
            inspect_budget: u64::MAX,
            deadline: None,
            ok: true,
            model: Vec::new(),
            options,
            stats: SolverStats::default(),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.assigns.len()
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Whether the solver is still consistent. Once a top-level conflict
    /// has been derived this returns false and every solve call reports
    /// [`SolverResult::Unsat`] immediately.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Creates a fresh variable with the given preferred polarity
    /// (`true` branches on the negative literal first).
    pub fn new_variable(&mut self, polarity: bool) -> Var {
        let var = self.assigns.len() as Var;
        let n = self.assigns.len() + 1;
        self.watches.grow(n);
        self.bin_watches.grow(n);
        self.activity.push(0);
        self.levels.push(0);
        self.assigns.push(LBool::Undef);
        self.polarity.push(polarity);
        self.reasons.push(ClauseRef::UNDEF);
        self.stamps.push(0);
        self.seen.push(false);
        self.order.grow(n);
        self.order.insert(var, &self.activity);
        var
    }

    fn ensure_vars(&mut self, max_var: Var) {
        while self.assigns.len() <= max_var as usize {
            self.new_variable(true);
        }
    }

    /// Limits the next solve call to the given number of conflicts and
    /// clause inspections (0 means unlimited) and an optional deadline.
    pub fn set_limits(&mut self, conflicts: u64, inspects: u64, deadline: Option<Instant>) {
        self.conflict_budget = if conflicts > 0 {
            self.stats.conflicts.saturating_add(conflicts)
        } else {
            u64::MAX
        };
        self.inspect_budget = if inspects > 0 {
            self.stats.inspects.saturating_add(inspects)
        } else {
            u64::MAX
        };
        self.deadline = deadline;
    }

    fn budget_exceeded(&self) -> bool {
        self.stats.conflicts >= self.conflict_budget
            || self.stats.inspects >= self.inspect_budget
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    fn decision_level(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    fn var_value(&self, var: Var) -> LBool {
        self.assigns[var as usize]
    }

    fn lit_value(&self, lit: Lit) -> LBool {
        self.assigns[lit.var() as usize].under_sign(lit.is_negated())
    }

    /// The value of a variable in the most recent satisfying assignment.
    pub fn model(&self, var: Var) -> LBool {
        self.model.get(var as usize).copied().unwrap_or(LBool::Undef)
    }

    /// The clause on which the last unsatisfiable verdict was derived: the
    /// top-level conflicting clause, or the negated failed assumption.
    pub fn conflict_clause(&self) -> &[Lit] {
        &self.conflict
    }

    /// Adds a clause. Returns false if the clause made the problem
    /// unsatisfiable at the top level; the solver is then permanently
    /// unsatisfiable. Tautologies and duplicate literals are removed, and
    /// the clause may be discarded if it is already satisfied at level 0.
    pub fn add_clause(&mut self, literals: &[Lit]) -> bool {
        debug_assert_eq!(self.decision_level(), 0);
        if !self.ok {
            return false;
        }
        let mut lits = literals.to_vec();
        lits.sort_unstable();
        if let Some(&last) = lits.last() {
            self.ensure_vars(last.var());
        }

        let mut prev: Option<Lit> = None;
        let mut kept = 0;
        for i in 0..lits.len() {
            let lit = lits[i];
            if prev == Some(!lit) || self.lit_value(lit) == LBool::True {
                // tautology or already satisfied
                return true;
            }
            if prev != Some(lit) && self.lit_value(lit) == LBool::Undef {
                prev = Some(lit);
                lits[kept] = lit;
                kept += 1;
            }
        }
        lits.truncate(kept);

        match lits.len() {
            0 => {
                self.ok = false;
                false
            }
            1 => {
                self.enqueue(lits[0], ClauseRef::UNDEF);
                if self.propagate().is_undef() {
                    true
                } else {
                    self.ok = false;
                    false
                }
            }
            _ => {
                self.clause_new(&lits, false);
                true
            }
        }
    }

    fn clause_new(&mut self, lits: &[Lit], learnt: bool) -> ClauseRef {
        debug_assert!(lits.len() >= 2);
        let cref = self.ca.alloc(lits, learnt);
        if learnt {
            self.learnts.push(cref);
            let lbd = self.calc_lbd(lits);
            self.ca.set_lbd(cref, lbd);
            self.stats.learnt_lits += lits.len() as u64;
            self.cla_act_bump(cref);
        } else {
            self.clauses.push(cref);
            self.stats.clause_lits += lits.len() as u64;
        }
        let w0 = Watcher {
            cref,
            blocker: lits[1],
        };
        let w1 = Watcher {
            cref,
            blocker: lits[0],
        };
        if lits.len() == 2 {
            self.bin_watches.push(!lits[0], w0);
            self.bin_watches.push(!lits[1], w1);
        } else {
            self.watches.push(!lits[0], w0);
            self.watches.push(!lits[1], w1);
        }
        cref
    }

    fn enqueue(&mut self, lit: Lit, reason: ClauseRef) {
        let var = lit.var() as usize;
        debug_assert_eq!(self.assigns[var], LBool::Undef);
        self.assigns[var] = LBool::from_bool(!lit.is_negated());
        self.levels[var] = self.decision_level();
        self.reasons[var] = reason;
        self.trail.push(lit);
    }

    fn new_decision(&mut self, lit: Lit) {
        debug_assert_eq!(self.var_value(lit.var()), LBool::Undef);
        self.stats.decisions += 1;
        self.trail_lim.push(self.trail.len());
        self.enqueue(lit, ClauseRef::UNDEF);
    }

    fn cancel_until(&mut self, level: u32) {
        if self.decision_level() <= level {
            return;
        }
        let limit = self.trail_lim[level as usize];
        for c in (limit..self.trail.len()).rev() {
            let lit = self.trail[c];
            let var = lit.var() as usize;
            self.assigns[var] = LBool::Undef;
            self.reasons[var] = ClauseRef::UNDEF;
            self.polarity[var] = lit.is_negated();
            if !self.order.contains(lit.var()) {
                self.order.insert(lit.var(), &self.activity);
            }
        }
        self.qhead = limit;
        self.trail.truncate(limit);
        self.trail_lim.truncate(level as usize);
    }

    fn var_act_bump(&mut self, var: Var) {
        let v = var as usize;
        self.activity[v] = self.activity[v].wrapping_add(self.var_act_inc);
        if self.activity[v] & 0x8000_0000 != 0 {
            for act in &mut self.activity {
                *act >>= VAR_ACT_RESCALE_SHIFT;
            }
            self.var_act_inc = (self.var_act_inc >> VAR_ACT_RESCALE_SHIFT).max(1 << 5);
        }
        if self.order.contains(var) {
            self.order.increase(var, &self.activity);
        }
    }

    fn var_act_decay(&mut self) {
        self.var_act_inc += self.var_act_inc >> 4;
    }

    fn cla_act_bump(&mut self, cref: ClauseRef) {
        let act = self.ca.activity(cref).wrapping_add(self.cla_act_inc);
        self.ca.set_activity(cref, act);
        if act & 0x8000_0000 != 0 {
            for i in 0..self.learnts.len() {
                let c = self.learnts[i];
                let a = self.ca.activity(c) >> CLA_ACT_RESCALE_SHIFT;
                self.ca.set_activity(c, a);
            }
            self.cla_act_inc = (self.cla_act_inc >> CLA_ACT_RESCALE_SHIFT).max(1 << 10);
        }
    }

    fn cla_act_decay(&mut self) {
        self.cla_act_inc += self.cla_act_inc >> 10;
    }

    /// The number of distinct decision levels among the given literals.
    fn calc_lbd(&mut self, lits: &[Lit]) -> u32 {
        self.stamp += 1;
        let mut lbd = 0;
        for lit in lits {
            let level = self.levels[lit.var() as usize] as usize;
            if self.stamps[level] != self.stamp {
                self.stamps[level] = self.stamp;
                lbd += 1;
            }
        }
        lbd
    }

    fn calc_lbd_clause(&mut self, cref: ClauseRef) -> u32 {
        self.stamp += 1;
        let mut lbd = 0;
        for i in 0..self.ca.size(cref) {
            let level = self.levels[self.ca.lit(cref, i).var() as usize] as usize;
            if self.stamps[level] != self.stamp {
                self.stamps[level] = self.stamp;
                lbd += 1;
            }
        }
        lbd
    }

    /// Propagates all enqueued assignments. Returns the conflicting clause,
    /// or [`ClauseRef::UNDEF`] if propagation completed without conflict.
    fn propagate(&mut self) -> ClauseRef {
        let mut confl = ClauseRef::UNDEF;
        let mut n_prop = 0u64;

        'queue: while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            n_prop += 1;

            // Binary clauses are resolved from the watcher alone.
            let bins = self.bin_watches.take(p);
            for w in &bins {
                match self.lit_value(w.blocker) {
                    LBool::Undef => self.enqueue(w.blocker, w.cref),
                    LBool::False => {
                        confl = w.cref;
                        break;
                    }
                    LBool::True => {}
                }
            }
            self.bin_watches.put_back(p, bins);
            if !confl.is_undef() {
                break 'queue;
            }

            let false_lit = !p;
            let mut ws = self.watches.take(p);
            let mut i = 0;
            let mut j = 0;
            'watchers: while i < ws.len() {
                let w = ws[i];
                if self.lit_value(w.blocker) == LBool::True {
                    ws[j] = w;
                    j += 1;
                    i += 1;
                    continue;
                }

                let cref = w.cref;
                // Put the false literal in position 1.
                if self.ca.lit(cref, 0) == false_lit {
                    self.ca.swap_lits(cref, 0, 1);
                }
                debug_assert_eq!(self.ca.lit(cref, 1), false_lit);
                let first = self.ca.lit(cref, 0);
                let keep = Watcher {
                    cref,
                    blocker: first,
                };

                if first != w.blocker && self.lit_value(first) == LBool::True {
                    ws[j] = keep;
                    j += 1;
                    i += 1;
                    continue;
                }

                // Look for a replacement watch.
                let size = self.ca.size(cref);
                for k in 2..size {
                    let lit = self.ca.lit(cref, k);
                    if self.lit_value(lit) != LBool::False {
                        self.ca.set_lit(cref, 1, lit);
                        self.ca.set_lit(cref, k, false_lit);
                        self.watches.push(!lit, keep);
                        i += 1;
                        continue 'watchers;
                    }
                }

                // Clause is unit or conflicting under the assignment.
                ws[j] = keep;
                j += 1;
                i += 1;
                if self.lit_value(first) == LBool::False {
                    confl = cref;
                    self.qhead = self.trail.len();
                    while i < ws.len() {
                        ws[j] = ws[i];
                        j += 1;
                        i += 1;
                    }
                } else {
                    self.enqueue(first, cref);
                }
            }
            self.stats.inspects += j as u64;
            ws.truncate(j);
            self.watches.put_back(p, ws);
            if !confl.is_undef() {
                break;
            }
        }

        self.stats.propagations += n_prop;
        self.prop_simplify -= n_prop as i64;
        confl
    }

    /// First-UIP conflict analysis. Returns the learnt clause (asserting
    /// literal first, second-highest-level literal second), the backtrack
    /// level and the LBD of the learnt clause.
    fn analyze(&mut self, mut confl: ClauseRef) -> (Vec<Lit>, u32, u32) {
        let mut learnt = std::mem::take(&mut self.learnt_buf);
        learnt.clear();
        // Placeholder for the asserting literal.
        learnt.push(Lit::positive(0));

        let mut count = 0u32;
        let mut p: Option<Lit> = None;
        let mut idx = self.trail.len() - 1;

        loop {
            debug_assert!(!confl.is_undef());
            // For binary reason clauses the propagated literal may be in
            // position 1; normalize so position 0 holds the true literal.
            if p.is_some()
                && self.ca.size(confl) == 2
                && self.lit_value(self.ca.lit(confl, 0)) == LBool::False
            {
                debug_assert_eq!(self.lit_value(self.ca.lit(confl, 1)), LBool::True);
                self.ca.swap_lits(confl, 0, 1);
            }

            if self.ca.is_learnt(confl) {
                self.cla_act_bump(confl);
                let lbd = self.ca.lbd(confl);
                if lbd > 2 {
                    let levels = self.calc_lbd_clause(confl);
                    if levels + 1 < lbd {
                        if lbd <= self.options.lbd_frozen_clause {
                            self.ca.set_deletable(confl, false);
                        }
                        self.ca.set_lbd(confl, levels);
                    }
                }
            }

            let start = usize::from(p.is_some());
            for i in start..self.ca.size(confl) {
                let lit = self.ca.lit(confl, i);
                let var = lit.var() as usize;
                if !self.seen[var] && self.levels[var] > 0 {
                    self.seen[var] = true;
                    self.var_act_bump(lit.var());
                    if self.levels[var] >= self.decision_level() {
                        count += 1;
                        let reason = self.reasons[var];
                        if !reason.is_undef() && self.ca.is_learnt(reason) {
                            self.last_dlevel.push(lit.var());
                        }
                    } else {
                        learnt.push(lit);
                    }
                }
            }

            // Select the next literal of the current level to resolve on.
            while !self.seen[self.trail[idx].var() as usize] {
                idx -= 1;
            }
            let pl = self.trail[idx];
            confl = self.reasons[pl.var() as usize];
            self.seen[pl.var() as usize] = false;
            p = Some(pl);
            count -= 1;
            if count == 0 {
                break;
            }
            idx -= 1;
        }

        let asserting = !p.expect("analysis visited at least one literal");
        learnt[0] = asserting;
        self.minimize(&mut learnt);

        // Find the backtrack level and move its literal to position 1.
        let bt_level = if learnt.len() == 1 {
            0
        } else {
            let mut i_max = 1;
            let mut max = self.levels[learnt[1].var() as usize];
            for i in 2..learnt.len() {
                let level = self.levels[learnt[i].var() as usize];
                if level > max {
                    max = level;
                    i_max = i;
                }
            }
            learnt.swap(1, i_max);
            max
        };

        let lbd = self.calc_lbd(&learnt);
        // Give an extra bump to conflict-level variables whose reason is a
        // learnt clause with a smaller LBD than the new clause.
        for i in 0..self.last_dlevel.len() {
            let var = self.last_dlevel[i];
            let reason = self.reasons[var as usize];
            if self.ca.lbd(reason) < lbd {
                self.var_act_bump(var);
            }
        }
        self.last_dlevel.clear();

        for i in 0..self.tagged.len() {
            self.seen[self.tagged[i].var() as usize] = false;
        }
        self.tagged.clear();

        (learnt, bt_level, lbd)
    }

    /// Removes redundant literals from the learnt clause, first by
    /// self-subsuming resolution over reason clauses and then by binary
    /// resolution with binary clauses implied by the asserting literal.
    fn minimize(&mut self, learnt: &mut Vec<Lit>) {
        let mut min_level = 0u32;
        for &lit in learnt.iter().skip(1) {
            min_level |= 1 << (self.levels[lit.var() as usize] & 31);
        }

        self.tagged.extend_from_slice(learnt);
        let mut j = 1;
        for i in 1..learnt.len() {
            let lit = learnt[i];
            if self.reasons[lit.var() as usize].is_undef() || !self.lit_removable(lit, min_level) {
                learnt[j] = lit;
                j += 1;
            }
        }
        learnt.truncate(j);

        if learnt.len() <= 30 && self.calc_lbd(learnt) <= 6 {
            let false_lit = !learnt[0];
            self.stamp += 1;
            for &lit in learnt.iter() {
                self.stamps[lit.var() as usize] = self.stamp;
            }
            let implied: Vec<Lit> = self
                .bin_watches
                .get(false_lit)
                .iter()
                .map(|w| w.blocker)
                .collect();
            let mut removed = 0;
            for imp in implied {
                if self.stamps[imp.var() as usize] == self.stamp
                    && self.lit_value(imp) == LBool::True
                {
                    removed += 1;
                    self.stamps[imp.var() as usize] = self.stamp - 1;
                }
            }
            if removed > 0 {
                let mut l = learnt.len() - 1;
                let mut i = 1;
                while i < learnt.len() - removed {
                    if self.stamps[learnt[i].var() as usize] != self.stamp {
                        learnt.swap(l, i);
                        l -= 1;
                    } else {
                        i += 1;
                    }
                }
                learnt.truncate(learnt.len() - removed);
            }
        }
    }

    /// Whether the literal is implied by the rest of the learnt clause,
    /// following reasons restricted to levels in the `min_level` mask.
    fn lit_removable(&mut self, lit: Lit, min_level: u32) -> bool {
        let top = self.tagged.len();
        debug_assert!(!self.reasons[lit.var() as usize].is_undef());
        self.lit_stack.clear();
        self.lit_stack.push(lit.var());

        while let Some(v) = self.lit_stack.pop() {
            let confl = self.reasons[v as usize];
            debug_assert!(!confl.is_undef());
            if self.ca.size(confl) == 2 && self.lit_value(self.ca.lit(confl, 0)) == LBool::False {
                debug_assert_eq!(self.lit_value(self.ca.lit(confl, 1)), LBool::True);
                self.ca.swap_lits(confl, 0, 1);
            }

            for i in 1..self.ca.size(confl) {
                let l = self.ca.lit(confl, i);
                let var = l.var() as usize;
                if !self.seen[var] && self.levels[var] > 0 {
                    if !self.reasons[var].is_undef()
                        && (1 << (self.levels[var] & 31)) & min_level != 0
                    {
                        self.lit_stack.push(l.var());
                        self.tagged.push(l);
                        self.seen[var] = true;
                    } else {
                        for k in top..self.tagged.len() {
                            self.seen[self.tagged[k].var() as usize] = false;
                        }
                        self.tagged.truncate(top);
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Deletes roughly the worst half of the learnt clauses, ranked by LBD
    /// and activity. Binary clauses, clauses with LBD 2, clauses serving as
    /// a reason and clauses frozen by conflict analysis are kept.
    fn reduce_db(&mut self) {
        self.stats.reduces += 1;
        let mut learnts = std::mem::take(&mut self.learnts);
        if learnts.is_empty() {
            self.learnts = learnts;
            return;
        }
        let ca = &self.ca;
        learnts.sort_by(|&a, &b| {
            // worst first: long clauses with high LBD and low activity
            let bin_a = ca.size(a) == 2;
            let bin_b = ca.size(b) == 2;
            bin_a
                .cmp(&bin_b)
                .then(ca.lbd(b).cmp(&ca.lbd(a)))
                .then(ca.activity(a).cmp(&ca.activity(b)))
        });

        if self.ca.lbd(learnts[learnts.len() / 2]) <= 3 {
            self.reduce_base += self.options.special_inc_reduce;
        }
        if self.ca.lbd(learnts[learnts.len() - 1]) <= 5 {
            self.reduce_base += self.options.special_inc_reduce;
        }

        let old_len = learnts.len();
        let mut limit = old_len / 2;
        let mut kept = Vec::with_capacity(old_len);
        for (i, &cref) in learnts.iter().enumerate() {
            let lit0 = self.ca.lit(cref, 0);
            let is_reason = self.reasons[lit0.var() as usize] == cref;
            if self.ca.is_deletable(cref)
                && self.ca.lbd(cref) > 2
                && self.ca.size(cref) > 2
                && !is_reason
                && i < limit
            {
                self.stats.learnt_lits -= self.ca.size(cref) as u64;
                self.watches.remove(!self.ca.lit(cref, 0), cref);
                self.watches.remove(!self.ca.lit(cref, 1), cref);
                self.ca.free(cref);
            } else {
                if !self.ca.is_deletable(cref) {
                    limit += 1;
                }
                self.ca.set_deletable(cref, true);
                kept.push(cref);
            }
        }
        self.learnts = kept;
        debug!(
            "reduce db: keeping {} out of {} learnt clauses",
            self.learnts.len(),
            old_len
        );
        self.garbage_collect();
    }

    /// Compacts the clause arena, rewriting every outstanding handle.
    fn garbage_collect(&mut self) {
        let mut to = ClauseAllocator::with_capacity(self.ca.len() - self.ca.wasted());
        for list in self.watches.iter_mut() {
            for w in list.iter_mut() {
                w.cref = self.ca.reloc(w.cref, &mut to);
            }
        }
        for list in self.bin_watches.iter_mut() {
            for w in list.iter_mut() {
                w.cref = self.ca.reloc(w.cref, &mut to);
            }
        }
        for i in 0..self.trail.len() {
            let var = self.trail[i].var() as usize;
            if !self.reasons[var].is_undef() {
                self.reasons[var] = self.ca.reloc(self.reasons[var], &mut to);
            }
        }
        for i in 0..self.learnts.len() {
            self.learnts[i] = self.ca.reloc(self.learnts[i], &mut to);
        }
        for i in 0..self.clauses.len() {
            self.clauses[i] = self.ca.reloc(self.clauses[i], &mut to);
        }
        trace!(
            "garbage collect: {} words -> {} words",
            self.ca.len(),
            to.len()
        );
        self.ca = to;
    }

    fn is_clause_satisfied(&self, cref: ClauseRef) -> bool {
        (0..self.ca.size(cref)).any(|i| self.lit_value(self.ca.lit(cref, i)) == LBool::True)
    }

    /// Top-level simplification: propagates, then removes original clauses
    /// that are satisfied at level 0 and rebuilds the variable heap.
    /// Returns false on a top-level conflict.
    pub fn simplify(&mut self) -> bool {
        debug_assert_eq!(self.decision_level(), 0);
        if !self.ok {
            return false;
        }
        if !self.propagate().is_undef() {
            self.ok = false;
            return false;
        }
        if self.assign_simplify == self.trail.len() || self.prop_simplify > 0 {
            return true;
        }

        let mut clauses = std::mem::take(&mut self.clauses);
        clauses.retain(|&cref| {
            if self.is_clause_satisfied(cref) {
                self.stats.clause_lits -= self.ca.size(cref) as u64;
                let watches = if self.ca.size(cref) == 2 {
                    &mut self.bin_watches
                } else {
                    &mut self.watches
                };
                watches.remove(!self.ca.lit(cref, 0), cref);
                watches.remove(!self.ca.lit(cref, 1), cref);
                self.ca.free(cref);
                false
            } else {
                true
            }
        });
        self.clauses = clauses;
        self.rebuild_order_heap();

        self.assign_simplify = self.trail.len();
        self.prop_simplify = (self.stats.clause_lits + self.stats.learnt_lits) as i64;
        true
    }

    fn rebuild_order_heap(&mut self) {
        let vars: Vec<Var> = (0..self.num_vars() as Var)
            .filter(|&v| self.var_value(v) == LBool::Undef)
            .collect();
        self.order.rebuild(&vars, &self.activity);
    }

    fn decide(&mut self) -> Option<Var> {
        loop {
            let var = self.order.pop(&self.activity)?;
            if self.var_value(var) == LBool::Undef {
                return Some(var);
            }
        }
    }

    fn search(&mut self) -> SearchOutcome {
        self.stats.starts += 1;
        loop {
            if self.budget_exceeded() {
                self.cancel_until(0);
                return SearchOutcome::Interrupted;
            }

            let confl = self.propagate();
            if !confl.is_undef() {
                self.stats.conflicts += 1;
                if self.decision_level() == 0 {
                    self.ok = false;
                    self.conflict =
                        (0..self.ca.size(confl)).map(|i| self.ca.lit(confl, i)).collect();
                    return SearchOutcome::Unsat;
                }

                self.bq_trail.push(self.trail.len() as u32);
                if self.stats.conflicts > self.options.first_block_restart
                    && self.bq_lbd.is_full()
                    && self.trail.len() as f64
                        > self.options.restart_r * f64::from(self.bq_trail.average())
                {
                    self.bq_lbd.clear();
                }

                let (learnt, bt_level, lbd) = self.analyze(confl);
                self.sum_lbd += u64::from(lbd);
                self.bq_lbd.push(lbd);
                self.cancel_until(bt_level);

                let reason = if learnt.len() == 1 {
                    ClauseRef::UNDEF
                } else {
                    self.clause_new(&learnt, true)
                };
                self.enqueue(learnt[0], reason);
                self.learnt_buf = learnt;

                self.var_act_decay();
                self.cla_act_decay();
            } else {
                // Forced restart when recent clauses are much worse than
                // the long-run average.
                if self.bq_lbd.is_full()
                    && f64::from(self.bq_lbd.average()) * self.options.restart_k
                        > self.sum_lbd as f64 / self.stats.conflicts as f64
                {
                    self.bq_lbd.clear();
                    self.cancel_until(0);
                    return SearchOutcome::Restart;
                }

                if self.decision_level() == 0 && !self.simplify() {
                    return SearchOutcome::Unsat;
                }

                if self.stats.conflicts >= self.conf_before_reduce {
                    self.reduce_quot = self.stats.conflicts / self.reduce_base + 1;
                    self.reduce_db();
                    self.reduce_base += self.options.inc_reduce;
                    self.conf_before_reduce = self.reduce_quot * self.reduce_base;
                }

                // Apply pending assumptions as forced decisions.
                let mut decided = false;
                while (self.decision_level() as usize) < self.assumptions.len() {
                    let a = self.assumptions[self.decision_level() as usize];
                    match self.lit_value(a) {
                        LBool::True => {
                            // already implied; open an empty level to keep
                            // assumption indexing aligned
                            self.trail_lim.push(self.trail.len());
                        }
                        LBool::False => {
                            self.conflict = vec![!a];
                            return SearchOutcome::AssumptionFailed;
                        }
                        LBool::Undef => {
                            self.new_decision(a);
                            decided = true;
                            break;
                        }
                    }
                }
                if decided {
                    continue;
                }

                match self.decide() {
                    None => return SearchOutcome::Sat,
                    Some(var) => {
                        let lit = Lit::new(var, self.polarity[var as usize]);
                        self.new_decision(lit);
                    }
                }
            }
        }
    }

    /// Decides satisfiability of the current clauses.
    pub fn solve(&mut self) -> SolverResult {
        self.solve_with_assumptions(&[])
    }

    /// Decides satisfiability under the given assumptions. The assumptions
    /// hold only for this call; learnt clauses are kept across calls.
    pub fn solve_with_assumptions(&mut self, assumptions: &[Lit]) -> SolverResult {
        if !self.ok {
            return SolverResult::Unsat;
        }
        for &a in assumptions {
            self.ensure_vars(a.var());
        }
        self.assumptions = assumptions.to_vec();
        self.conflict.clear();

        let result = loop {
            match self.search() {
                SearchOutcome::Sat => {
                    self.model = self.assigns.clone();
                    break SolverResult::Sat;
                }
                SearchOutcome::Unsat | SearchOutcome::AssumptionFailed => {
                    break SolverResult::Unsat;
                }
                SearchOutcome::Interrupted => break SolverResult::Undetermined,
                SearchOutcome::Restart => {}
            }
        };

        self.cancel_until(0);
        self.assumptions.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(v: Var) -> Lit {
        Lit::positive(v)
    }

    fn neg(v: Var) -> Lit {
        !Lit::positive(v)
    }

    #[test]
    fn test_empty_clause_is_unsat() {
        let mut solver = Solver::default();
        assert!(!solver.add_clause(&[]));
        assert!(!solver.is_ok());
        assert_eq!(solver.solve(), SolverResult::Unsat);
    }

    #[test]
    fn test_tautology_is_dropped() {
        let mut solver = Solver::default();
        assert!(solver.add_clause(&[pos(0), neg(0), pos(1)]));
        assert_eq!(solver.solve(), SolverResult::Sat);
    }

    #[test]
    fn test_simple_unsat() {
        // (a | b), (!a | c), (!b | c), (!c)
        let mut solver = Solver::default();
        assert!(solver.add_clause(&[pos(0), pos(1)]));
        assert!(solver.add_clause(&[neg(0), pos(2)]));
        assert!(solver.add_clause(&[neg(1), pos(2)]));
        // the unit propagates immediately and exposes the conflict
        let ok = solver.add_clause(&[neg(2)]);
        assert!(!ok || solver.solve() == SolverResult::Unsat);
    }

    #[test]
    fn test_simple_sat_model() {
        // (a | b), (!a | c)
        let mut solver = Solver::default();
        assert!(solver.add_clause(&[pos(0), pos(1)]));
        assert!(solver.add_clause(&[neg(0), pos(2)]));
        assert_eq!(solver.solve(), SolverResult::Sat);
        let a = solver.model(0);
        let b = solver.model(1);
        let c = solver.model(2);
        assert!(a == LBool::True || b == LBool::True);
        if a == LBool::True {
            assert_eq!(c, LBool::True);
        }
    }

    #[test]
    fn test_unit_conflict_makes_permanently_unsat() {
        let mut solver = Solver::default();
        assert!(solver.add_clause(&[pos(0)]));
        assert!(!solver.add_clause(&[neg(0)]));
        assert!(!solver.is_ok());
        assert_eq!(solver.solve(), SolverResult::Unsat);
        assert_eq!(solver.solve(), SolverResult::Unsat);
    }

    #[test]
    fn test_assumptions() {
        // (!a | b): under assumption a, b must hold; under a and !b, unsat.
        let mut solver = Solver::default();
        assert!(solver.add_clause(&[neg(0), pos(1)]));
        assert_eq!(solver.solve_with_assumptions(&[pos(0)]), SolverResult::Sat);
        assert_eq!(solver.model(1), LBool::True);
        assert_eq!(
            solver.solve_with_assumptions(&[pos(0), neg(1)]),
            SolverResult::Unsat
        );
        // the failure is not permanent
        assert!(solver.is_ok());
        assert_eq!(solver.solve(), SolverResult::Sat);
    }

    #[test]
    fn test_pigeonhole_three_in_two() {
        // three pigeons in two holes: variables p_ij = pigeon i in hole j
        let var = |i: u32, j: u32| i * 2 + j;
        let mut solver = Solver::default();
        for i in 0..3 {
            assert!(solver.add_clause(&[pos(var(i, 0)), pos(var(i, 1))]));
        }
        for j in 0..2 {
            for i1 in 0..3 {
                for i2 in (i1 + 1)..3 {
                    assert!(solver.add_clause(&[neg(var(i1, j)), neg(var(i2, j))]));
                }
            }
        }
        assert_eq!(solver.solve(), SolverResult::Unsat);
    }

    #[test]
    fn test_conflict_budget_yields_undetermined() {
        // an 8-hole pigeonhole instance is hard enough to exceed one conflict
        let n = 8u32;
        let var = |i: u32, j: u32| i * n + j;
        let mut solver = Solver::default();
        for i in 0..=n {
            let lits: Vec<Lit> = (0..n).map(|j| pos(var(i, j))).collect();
            assert!(solver.add_clause(&lits));
        }
        for j in 0..n {
            for i1 in 0..=n {
                for i2 in (i1 + 1)..=n {
                    assert!(solver.add_clause(&[neg(var(i1, j)), neg(var(i2, j))]));
                }
            }
        }
        solver.set_limits(1, 0, None);
        assert_eq!(solver.solve(), SolverResult::Undetermined);
        // state is intact and the budget can be lifted
        assert!(solver.is_ok());
    }
}
