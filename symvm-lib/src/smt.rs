// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The constraint system interface consulted by the search at every
//! decision point, together with a small reference solver.
//!
//! Any solver can be plugged in behind [ConstraintSystem]. The
//! contract is a stack: constraints are added and removed in LIFO
//! order, and satisfiability of the current stack can be queried at
//! any time. A query may fail to produce an answer, which is reported
//! as a [SolverError] rather than as `Unsat`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::error::SolverError;
use crate::ir::NumTy;
use crate::log;

pub mod interval;
pub mod smtlib;

use interval::{classify, Atom, Interval};

pub use smtlib::{Cmp, Constraint, Exp, Num, Sym};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SmtResult {
    Sat,
    Unsat,
}

use SmtResult::*;

/// Extra restrictions on a variable beyond the range of its type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Domain {
    Full,
    NonNegative,
}

/// A satisfying assignment for the variables of a path condition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    values: BTreeMap<Sym, Num>,
}

impl Model {
    pub fn get(&self, v: Sym) -> Option<Num> {
        self.values.get(&v).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Sym, &Num)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub trait ConstraintSystem {
    /// Make a variable known to the solver. Declarations are not part
    /// of the constraint stack and are never removed.
    fn declare(&mut self, v: Sym, ty: NumTy, domain: Domain);

    fn add_constraint(&mut self, constraint: Constraint);

    /// Remove the most recently added constraint.
    fn remove_constraint(&mut self) -> Option<Constraint>;

    fn has_solution(&mut self) -> Result<SmtResult, SolverError>;

    /// The current path condition, oldest constraint first.
    fn constraints(&self) -> &[Constraint];

    /// A witness for the last satisfiable query, if the solver can
    /// provide one.
    fn model(&self) -> Option<Model>;
}

/// Names and types of all symbolic variables created by a search.
#[derive(Clone, Debug, Default)]
pub struct Symbols {
    vars: Vec<(String, NumTy)>,
}

impl Symbols {
    pub fn new() -> Self {
        Symbols { vars: Vec::new() }
    }

    pub fn fresh(&mut self, name: String, ty: NumTy) -> Sym {
        let id = self.vars.len() as u32;
        self.vars.push((name, ty));
        Sym { id }
    }

    pub fn name(&self, v: Sym) -> &str {
        self.vars.get(v.id as usize).map(|(name, _)| name.as_str()).unwrap_or("?")
    }

    pub fn ty(&self, v: Sym) -> Option<NumTy> {
        self.vars.get(v.id as usize).map(|(_, ty)| *ty)
    }

    pub fn lookup(&self, name: &str) -> Option<Sym> {
        self.vars.iter().position(|(n, _)| n == name).map(|id| Sym { id: id as u32 })
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn render(&self, constraint: &Constraint) -> String {
        constraint.display(&|v: Sym| self.name(v).to_string()).to_string()
    }

    pub fn render_exp(&self, exp: &Exp) -> String {
        exp.display(&|v: Sym| self.name(v).to_string()).to_string()
    }
}

#[derive(Clone, Debug)]
struct Decl {
    ty: NumTy,
    domain: Domain,
}

impl Decl {
    fn interval(&self) -> Interval {
        let (lo, hi) = self.ty.bounds();
        let lo = if self.domain == Domain::NonNegative { 0.0 } else { lo };
        Interval::new(self.ty.is_integral(), lo, hi)
    }

    fn value(&self, x: f64) -> Num {
        if self.ty.is_integral() {
            Num::Int(x as i64)
        } else {
            Num::Float(x)
        }
    }
}

/// Per-variable candidate lists are cut to this length before
/// enumeration.
const MAX_CANDIDATES_PER_VAR: usize = 24;

/// Reference implementation of [ConstraintSystem].
///
/// Comparisons that are linear in a single variable are absorbed into
/// per-variable intervals, which decides that fragment exactly. Any
/// remaining constraints are checked by enumerating a deterministic
/// set of candidate values for the variables they mention (interval
/// ends, constants appearing in the path condition and their sums and
/// differences). If enumeration finds no witness the answer is
/// [SolverError::Unknown], never `Unsat`.
pub struct Solver {
    decls: HashMap<Sym, Decl>,
    stack: Vec<Constraint>,
    timeout: Option<Duration>,
    max_candidates: u64,
    model: Option<Model>,
    cached: Option<Result<SmtResult, SolverError>>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        Solver {
            decls: HashMap::new(),
            stack: Vec::new(),
            timeout: None,
            max_candidates: 1_000_000,
            model: None,
            cached: None,
        }
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Solver { timeout, ..self }
    }

    pub fn with_max_candidates(self, max_candidates: u64) -> Self {
        Solver { max_candidates, ..self }
    }

    fn decl(&self, v: Sym) -> Decl {
        self.decls.get(&v).cloned().unwrap_or(Decl { ty: NumTy::Long, domain: Domain::Full })
    }

    fn check(&mut self) -> Result<SmtResult, SolverError> {
        let start = Instant::now();

        let mut atoms = Vec::new();
        for c in &self.stack {
            flatten(c, &mut atoms)
        }

        let mut vars = Vec::new();
        for atom in &atoms {
            atom.collect_variables(&mut vars)
        }
        vars.sort();

        let mut intervals: BTreeMap<Sym, Interval> = vars.iter().map(|v| (*v, self.decl(*v).interval())).collect();
        let mut residual = Vec::new();
        for atom in &atoms {
            match atom {
                Constraint::Bool(false) => return Ok(Unsat),
                Constraint::Bool(true) => (),
                Constraint::Cmp(op, lhs, rhs) => match classify(*op, lhs, rhs) {
                    Atom::Ground(true) => (),
                    Atom::Ground(false) => return Ok(Unsat),
                    Atom::Bound(bound) => {
                        if let Some(interval) = intervals.get_mut(&bound.var) {
                            interval.restrict(bound.op, bound.value)
                        }
                    }
                    Atom::Other => residual.push(atom.clone()),
                },
                _ => residual.push(atom.clone()),
            }
        }

        let mut assignment = HashMap::new();
        for (v, interval) in &intervals {
            match interval.witness() {
                Some(x) => {
                    assignment.insert(*v, self.decl(*v).value(x));
                }
                None => return Ok(Unsat),
            }
        }

        if residual.iter().all(|c| c.eval(&assignment) == Some(true)) {
            self.model = Some(Model { values: assignment.into_iter().collect() });
            return Ok(Sat);
        }

        // Enumerate candidates for the variables of the residual
        // constraints, holding all other variables at their witness.
        let mut free = Vec::new();
        for c in &residual {
            c.collect_variables(&mut free)
        }
        free.sort();

        let mut constants = Vec::new();
        for c in &self.stack {
            c.collect_constants(&mut constants)
        }
        let seeds = seed_values(&constants);

        let candidates: Vec<Vec<Num>> = free
            .iter()
            .map(|v| {
                let decl = self.decl(*v);
                let interval = &intervals[v];
                let mut xs: Vec<f64> = Vec::new();
                let mut push = |x: f64| {
                    if x.is_finite() && interval.contains(x) && !xs.contains(&x) {
                        xs.push(x)
                    }
                };
                if let Some(w) = interval.witness() {
                    push(w)
                }
                for x in &seeds {
                    push(*x)
                }
                push(interval.lo);
                push(interval.hi);
                push(interval.lo + 1.0);
                push(interval.hi - 1.0);
                xs.truncate(MAX_CANDIDATES_PER_VAR);
                xs.into_iter().map(|x| decl.value(x)).collect()
            })
            .collect();

        if candidates.iter().any(|xs| xs.is_empty()) {
            return Err(SolverError::Unknown);
        }

        let mut index = vec![0usize; free.len()];
        let mut tried = 0u64;
        loop {
            for (i, v) in free.iter().enumerate() {
                assignment.insert(*v, candidates[i][index[i]]);
            }
            if residual.iter().all(|c| c.eval(&assignment) == Some(true)) {
                self.model = Some(Model { values: assignment.into_iter().collect() });
                return Ok(Sat);
            }

            tried += 1;
            if tried >= self.max_candidates {
                log!(log::SOLVER, &format!("Enumeration budget of {} exhausted", self.max_candidates));
                return Err(SolverError::Unknown);
            }
            if tried % 1024 == 0 {
                if let Some(timeout) = self.timeout {
                    if start.elapsed() > timeout {
                        log!(log::SOLVER, "Solver timed out");
                        return Err(SolverError::Timeout);
                    }
                }
            }

            // Advance the mixed radix counter, last variable fastest
            let mut i = free.len();
            loop {
                if i == 0 {
                    log!(log::SOLVER, "No witness among enumerated candidates");
                    return Err(SolverError::Unknown);
                }
                i -= 1;
                index[i] += 1;
                if index[i] < candidates[i].len() {
                    break;
                }
                index[i] = 0
            }
        }
    }
}

fn flatten(c: &Constraint, atoms: &mut Vec<Constraint>) {
    match c {
        Constraint::And(cs) => cs.iter().for_each(|c| flatten(c, atoms)),
        Constraint::Or(cs) if cs.len() == 1 => flatten(&cs[0], atoms),
        _ => atoms.push(c.clone()),
    }
}

fn seed_values(constants: &[Num]) -> Vec<f64> {
    let mut seeds = vec![0.0, 1.0, -1.0];
    let ks: Vec<f64> = constants.iter().map(|n| n.as_f64()).collect();
    for k in &ks {
        seeds.extend_from_slice(&[*k, k - 1.0, k + 1.0])
    }
    for k1 in &ks {
        for k2 in &ks {
            seeds.extend_from_slice(&[k1 + k2, k1 - k2])
        }
    }
    // Small magnitudes first, positive before negative
    seeds.sort_by(|x, y| {
        let by_magnitude = x.abs().partial_cmp(&y.abs()).unwrap_or(Ordering::Equal);
        by_magnitude.then(y.partial_cmp(x).unwrap_or(Ordering::Equal))
    });
    seeds.dedup();
    seeds
}

impl ConstraintSystem for Solver {
    fn declare(&mut self, v: Sym, ty: NumTy, domain: Domain) {
        self.decls.insert(v, Decl { ty, domain });
        self.cached = None
    }

    fn add_constraint(&mut self, constraint: Constraint) {
        self.stack.push(constraint);
        self.cached = None
    }

    fn remove_constraint(&mut self) -> Option<Constraint> {
        self.cached = None;
        self.stack.pop()
    }

    fn has_solution(&mut self) -> Result<SmtResult, SolverError> {
        if let Some(result) = self.cached {
            return result;
        }
        let result = self.check();
        if result != Ok(Sat) {
            self.model = None
        }
        self.cached = Some(result);
        result
    }

    fn constraints(&self) -> &[Constraint] {
        &self.stack
    }

    fn model(&self) -> Option<Model> {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(solver: &mut Solver, symbols: &mut Symbols, name: &str, ty: NumTy) -> Exp {
        let v = symbols.fresh(name.to_string(), ty);
        solver.declare(v, ty, Domain::Full);
        Exp::Var(v)
    }

    #[test]
    fn single_variable_fragment_is_decided() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x", NumTy::Int);
        solver.add_constraint(Constraint::cmp(Cmp::Gt, x.clone(), Exp::Int(0)));
        assert_eq!(solver.has_solution(), Ok(Sat));
        assert_eq!(solver.model().unwrap().get(Sym::from_u32(0)), Some(Num::Int(1)));
        solver.add_constraint(Constraint::cmp(Cmp::Le, x.clone(), Exp::Int(0)));
        assert_eq!(solver.has_solution(), Ok(Unsat));
        assert!(solver.model().is_none());
        solver.remove_constraint();
        assert_eq!(solver.has_solution(), Ok(Sat))
    }

    #[test]
    fn int_bounds_are_respected() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let b = var(&mut solver, &mut symbols, "b", NumTy::Byte);
        solver.add_constraint(Constraint::cmp(Cmp::Gt, b, Exp::Int(127)));
        assert_eq!(solver.has_solution(), Ok(Unsat))
    }

    #[test]
    fn non_negative_domain() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let v = symbols.fresh("a.length".to_string(), NumTy::Int);
        solver.declare(v, NumTy::Int, Domain::NonNegative);
        solver.add_constraint(Constraint::cmp(Cmp::Lt, Exp::Var(v), Exp::Int(0)));
        assert_eq!(solver.has_solution(), Ok(Unsat))
    }

    #[test]
    fn two_variable_constraints_are_enumerated() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x", NumTy::Int);
        let y = var(&mut solver, &mut symbols, "y", NumTy::Int);
        solver.add_constraint(Constraint::cmp(Cmp::Gt, x.clone(), y.clone()));
        solver.add_constraint(Constraint::cmp(Cmp::Eq, Exp::Add(Box::new(x.clone()), Box::new(y.clone())), Exp::Int(7)));
        assert_eq!(solver.has_solution(), Ok(Sat));
        let model = solver.model().unwrap();
        let (Num::Int(x), Num::Int(y)) = (model.get(Sym::from_u32(0)).unwrap(), model.get(Sym::from_u32(1)).unwrap()) else {
            panic!("integral model expected")
        };
        assert!(x > y && x + y == 7)
    }

    #[test]
    fn unprovable_conflicts_are_unknown() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x", NumTy::Int);
        let y = var(&mut solver, &mut symbols, "y", NumTy::Int);
        solver.add_constraint(Constraint::cmp(Cmp::Gt, x.clone(), y.clone()));
        solver.add_constraint(Constraint::cmp(Cmp::Gt, y, x));
        assert_eq!(solver.has_solution(), Err(SolverError::Unknown))
    }

    #[test]
    fn rendering_uses_variable_names() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x", NumTy::Int);
        let c = Constraint::cmp(Cmp::Gt, x, Exp::Int(0));
        assert_eq!(symbols.render(&c), "(> x 0)")
    }
}
