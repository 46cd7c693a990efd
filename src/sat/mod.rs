//! An incremental CDCL satisfiability solver.
//!
//! The solver uses two-literal watched propagation over a compact clause
//! arena, conflict-driven clause learning with literals-blocks-distance
//! (LBD) based restarts and clause-database reduction, and an activity
//! heap for branching. Solving can be bounded by conflict, inspection and
//! runtime budgets, in which case an exceeded budget yields
//! [`SolverResult::Undetermined`] with all internal state intact.

mod bqueue;
pub(crate) mod clause;
mod heap;
mod solver;
mod watch;

use std::fmt;

pub use solver::{Solver, SolverOptions, SolverStats};

/// A variable index. Variables are created by [`Solver::new_variable`] and
/// are numbered consecutively from zero.
pub type Var = u32;

/// A literal: a variable together with a sign.
///
/// Literals are encoded in a single word with the sign in the lowest bit,
/// so the literals of variable `v` have codes `2v` (positive) and `2v + 1`
/// (negative).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Lit(u32);

impl Lit {
    /// Creates a literal from a variable and a sign; a negated literal is
    /// true when the variable is assigned false.
    pub fn new(var: Var, negated: bool) -> Self {
        Lit(2 * var + u32::from(negated))
    }

    pub fn positive(var: Var) -> Self {
        Lit(2 * var)
    }

    pub fn var(self) -> Var {
        self.0 >> 1
    }

    pub fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    pub(crate) fn code(self) -> u32 {
        self.0
    }

    pub(crate) fn from_code(code: u32) -> Self {
        Lit(code)
    }
}

impl std::ops::Not for Lit {
    type Output = Self;

    fn not(self) -> Self::Output {
        Lit(self.0 ^ 1)
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated() {
            write!(f, "!{}", self.var())
        } else {
            write!(f, "{}", self.var())
        }
    }
}

/// A three-valued assignment.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LBool {
    True,
    False,
    Undef,
}

impl LBool {
    pub(crate) fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }

    /// The value of a literal over this variable assignment.
    pub(crate) fn under_sign(self, negated: bool) -> Self {
        match (self, negated) {
            (Self::Undef, _) => Self::Undef,
            (value, false) => value,
            (Self::True, true) => Self::False,
            (Self::False, true) => Self::True,
        }
    }
}

/// The outcome of a [`Solver::solve`] call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolverResult {
    /// A satisfying assignment was found and can be queried with
    /// [`Solver::model`].
    Sat,
    /// The clauses are unsatisfiable (under the given assumptions, if any).
    Unsat,
    /// A conflict, inspection or runtime budget was exceeded before a
    /// verdict was reached.
    Undetermined,
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Sat => "SAT",
                Self::Unsat => "UNSAT",
                Self::Undetermined => "UNDETERMINED",
            }
        )
    }
}
