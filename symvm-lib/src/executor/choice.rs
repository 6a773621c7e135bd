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

//! Choice points are the nodes of the execution tree. Each one owns
//! the alternatives of a single nondeterministic instruction, the
//! constraint of the alternative currently being followed, and the
//! trail of everything the path did since.
//!
//! Alternatives are always tried in a fixed order: jump before fall
//! through, greater before less before equal, switch keys in
//! ascending order with the default last, a fault before its
//! absence, an array index equal to each aliased entry in entry order
//! before it being a new element, and generator values in the order
//! they are provided.
//! Construction eagerly commits to the first satisfiable alternative,
//! so a freshly built choice point has already been taken once.

use super::frame::State;
use super::trail::{Trail, TrailElement};
use crate::error::{ChoiceError, ExecError, SolverError};
use crate::generator::{GenValue, Generator};
use crate::ir::Val;
use crate::log;
use crate::smt::smtlib::{Cmp, Constraint, Exp};
use crate::smt::{ConstraintSystem, SmtResult};

/// Where in the execution a choice point was created.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Site {
    pub number: usize,
    pub parent: Option<usize>,
    /// Number of frames on the call stack, the choice point belongs
    /// to the topmost.
    pub depth: usize,
    pub pc: usize,
    pub pc_next: usize,
}

pub enum ChoiceKind {
    Jump {
        condition: Constraint,
        target: usize,
    },
    Compare {
        lhs: Exp,
        rhs: Exp,
    },
    /// Cases are sorted by key.
    Switch {
        value: Exp,
        cases: Vec<(i64, usize)>,
        default: usize,
    },
    /// A runtime fault such as a null dereference, which either
    /// happens and raises `exception`, or is ruled out by `absent` and
    /// the instruction runs again. `cleared` are the faults of the
    /// same instruction already ruled out before this one was reached.
    Fault {
        fault: Constraint,
        absent: Constraint,
        exception: &'static str,
        cleared: Vec<Constraint>,
    },
    /// The entry an array index refers to, one alternative per
    /// candidate and a last one for none of them. Like a fault, the
    /// instruction runs again once the decision is made.
    Alias {
        index: Exp,
        candidates: Vec<Exp>,
        distinct: Constraint,
        cleared: Vec<Constraint>,
    },
    Generator {
        slot: usize,
        generator: Box<dyn Generator>,
        value: Option<GenValue>,
    },
}

/// What the driver has to do after a choice point has applied its
/// state changes.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    None,
    Throw(&'static str),
    Clear(Vec<Constraint>),
}

const COMPARE_RESULTS: [(Cmp, i64); 3] = [(Cmp::Gt, 1), (Cmp::Lt, -1), (Cmp::Eq, 0)];

/// Check that a switch has matching, non-empty, distinct keys and
/// targets, returning the cases in ascending key order.
pub fn switch_cases(keys: &[i64], targets: &[usize]) -> Result<Vec<(i64, usize)>, ExecError> {
    if keys.len() != targets.len() {
        return Err(ExecError::BadSwitch(format!("{} keys but {} targets", keys.len(), targets.len())));
    }
    if keys.is_empty() {
        return Err(ExecError::BadSwitch("no keys".to_string()));
    }
    let mut cases: Vec<(i64, usize)> = keys.iter().copied().zip(targets.iter().copied()).collect();
    cases.sort_by_key(|(key, _)| *key);
    if let Some(w) = cases.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(ExecError::BadSwitch(format!("duplicate key {}", w[0].0)));
    }
    Ok(cases)
}

/// Add `constraint` and keep it if the path condition stays
/// satisfiable. Otherwise the constraint is removed again.
pub fn try_assert(solver: &mut dyn ConstraintSystem, constraint: Constraint) -> Result<bool, SolverError> {
    solver.add_constraint(constraint);
    match solver.has_solution() {
        Ok(SmtResult::Sat) => Ok(true),
        result => {
            solver.remove_constraint();
            result.map(|_| false)
        }
    }
}

pub struct ChoicePoint<'ir> {
    site: Site,
    alternative: usize,
    constraint: Option<Constraint>,
    /// Whether `constraint` is currently on the solver's stack.
    pub(super) asserted: bool,
    pub(super) trail: Trail<'ir>,
    kind: ChoiceKind,
}

impl<'ir> ChoicePoint<'ir> {
    pub fn jump(site: Site, condition: Constraint, target: usize, solver: &mut dyn ConstraintSystem) -> Result<Self, ChoiceError> {
        Self::install(site, ChoiceKind::Jump { condition, target }, solver)
    }

    /// A three-way comparison. One of the outcomes always holds, so
    /// running out of satisfiable alternatives means the path
    /// condition was already inconsistent.
    pub fn compare(site: Site, lhs: Exp, rhs: Exp, solver: &mut dyn ConstraintSystem) -> Result<Self, ChoiceError> {
        match Self::install(site, ChoiceKind::Compare { lhs, rhs }, solver) {
            Err(ChoiceError::Unsatisfiable) => Err(ChoiceError::Fatal(ExecError::Inconsistent(format!(
                "no outcome of the comparison at pc {} is satisfiable",
                site.pc
            )))),
            result => result,
        }
    }

    pub fn switch(
        site: Site,
        value: Exp,
        keys: &[i64],
        targets: &[usize],
        default: usize,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<Self, ChoiceError> {
        let cases = switch_cases(keys, targets)?;
        Self::install(site, ChoiceKind::Switch { value, cases, default }, solver)
    }

    pub fn fault(
        site: Site,
        fault: Constraint,
        absent: Constraint,
        exception: &'static str,
        cleared: Vec<Constraint>,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<Self, ChoiceError> {
        Self::install(site, ChoiceKind::Fault { fault, absent, exception, cleared }, solver)
    }

    pub fn alias(
        site: Site,
        index: Exp,
        candidates: Vec<Exp>,
        distinct: Constraint,
        cleared: Vec<Constraint>,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<Self, ChoiceError> {
        Self::install(site, ChoiceKind::Alias { index, candidates, distinct, cleared }, solver)
    }

    /// Generators decide nothing, so there is no solver involved. An
    /// empty generator has no alternatives at all.
    pub fn generator(site: Site, slot: usize, mut generator: Box<dyn Generator>) -> Result<Self, ChoiceError> {
        if !generator.has_another_object() {
            return Err(ChoiceError::Unsatisfiable);
        }
        let value = generator.provide_object();
        Ok(ChoicePoint {
            site,
            alternative: 0,
            constraint: None,
            asserted: false,
            trail: Trail::new(),
            kind: ChoiceKind::Generator { slot, generator, value },
        })
    }

    fn install(site: Site, kind: ChoiceKind, solver: &mut dyn ConstraintSystem) -> Result<Self, ChoiceError> {
        let constraint = kind.constraint_at(0);
        let mut cp = ChoicePoint { site, alternative: 0, constraint, asserted: false, trail: Trail::new(), kind };
        let mut undecided = None;
        loop {
            if let Some(constraint) = &cp.constraint {
                match try_assert(solver, constraint.clone()) {
                    Ok(true) => {
                        cp.asserted = true;
                        return Ok(cp);
                    }
                    Ok(false) => (),
                    Err(err) => undecided = Some(err),
                }
                log!(log::CHOICE, &format!("#{} alternative {} not explorable", site.number, cp.alternative));
            }
            if !cp.has_another_choice() {
                break;
            }
            cp.change_to_next_choice()?
        }
        match undecided {
            Some(err) => Err(ChoiceError::Indecisive(err)),
            None => Err(ChoiceError::Unsatisfiable),
        }
    }

    pub fn number(&self) -> usize {
        self.site.number
    }

    pub fn parent(&self) -> Option<usize> {
        self.site.parent
    }

    pub fn depth(&self) -> usize {
        self.site.depth
    }

    pub fn get_pc(&self) -> usize {
        self.site.pc
    }

    pub fn get_pc_next(&self) -> usize {
        self.site.pc_next
    }

    pub fn alternative(&self) -> usize {
        self.alternative
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    pub fn has_another_choice(&self) -> bool {
        match &self.kind {
            ChoiceKind::Generator { generator, .. } => generator.has_another_object(),
            kind => self.alternative + 1 < kind.alternatives(),
        }
    }

    /// Move on to the next alternative. The new constraint is not
    /// asserted here, that is up to the caller.
    pub fn change_to_next_choice(&mut self) -> Result<(), ChoiceError> {
        if !self.has_another_choice() {
            return Err(ChoiceError::Fatal(ExecError::Inconsistent(format!(
                "choice point #{} has no alternative left",
                self.site.number
            ))));
        }
        self.alternative += 1;
        if let ChoiceKind::Generator { generator, value, .. } = &mut self.kind {
            *value = generator.provide_object();
            if value.is_none() {
                return Err(ChoiceError::Fatal(ExecError::Inconsistent("generator ran dry".to_string())));
            }
        }
        self.constraint = self.kind.constraint_at(self.alternative);
        Ok(())
    }

    pub fn changes_the_constraint_system(&self) -> bool {
        !matches!(self.kind, ChoiceKind::Generator { .. })
    }

    pub fn enforces_state_changes(&self) -> bool {
        !matches!(self.kind, ChoiceKind::Jump { .. } | ChoiceKind::Switch { .. })
    }

    /// The pc the top frame resumes at for the current alternative.
    pub fn resume_pc(&self) -> usize {
        match &self.kind {
            ChoiceKind::Jump { target, .. } if self.alternative == 0 => *target,
            ChoiceKind::Jump { .. } | ChoiceKind::Compare { .. } => self.site.pc_next,
            ChoiceKind::Switch { cases, default, .. } => cases.get(self.alternative).map(|(_, t)| *t).unwrap_or(*default),
            ChoiceKind::Fault { .. } | ChoiceKind::Alias { .. } | ChoiceKind::Generator { .. } => self.site.pc,
        }
    }

    /// Perform the side effects of the current alternative. Changes
    /// are recorded on this choice point's own trail, so moving to the
    /// next alternative undoes them.
    pub fn apply_state_changes(&mut self, state: &mut State<'ir>) -> Result<Effect, ExecError> {
        match &self.kind {
            ChoiceKind::Compare { .. } => {
                let result = COMPARE_RESULTS[self.alternative].1;
                state.push(Val::int(result), &mut self.trail)?;
                Ok(Effect::None)
            }
            ChoiceKind::Fault { exception, .. } if self.alternative == 0 => Ok(Effect::Throw(*exception)),
            ChoiceKind::Fault { fault, cleared, .. } => {
                let mut cleared = cleared.clone();
                cleared.push(fault.clone());
                Ok(Effect::Clear(cleared))
            }
            ChoiceKind::Alias { cleared, .. } => {
                let mut cleared = cleared.clone();
                cleared.extend(self.constraint.clone());
                Ok(Effect::Clear(cleared))
            }
            ChoiceKind::Generator { slot, generator, value } => {
                let value = value.clone().ok_or_else(|| ExecError::Inconsistent("no generated value".to_string()))?;
                let val = match value {
                    GenValue::Array(..) if !generator.object_needs_conversion() => {
                        return Err(ExecError::Inconsistent(format!(
                            "generator {} provided an array it does not convert",
                            generator.name()
                        )))
                    }
                    value => value.into_val(&mut state.heap),
                };
                if let Val::Ref(object) = val {
                    self.trail.record(TrailElement::Allocated { object })
                }
                state.store_in(self.site.depth - 1, *slot, val, &mut self.trail)?;
                Ok(Effect::None)
            }
            ChoiceKind::Jump { .. } | ChoiceKind::Switch { .. } => Ok(Effect::None),
        }
    }

    /// The generator and value currently chosen, for reporting.
    pub fn generated(&self) -> Option<(String, String)> {
        match &self.kind {
            ChoiceKind::Generator { generator, value: Some(value), .. } => {
                Some((generator.name().to_string(), value.to_string()))
            }
            _ => None,
        }
    }
}

impl ChoiceKind {
    fn alternatives(&self) -> usize {
        match self {
            ChoiceKind::Jump { .. } | ChoiceKind::Fault { .. } => 2,
            ChoiceKind::Compare { .. } => COMPARE_RESULTS.len(),
            ChoiceKind::Switch { cases, .. } => cases.len() + 1,
            ChoiceKind::Alias { candidates, .. } => candidates.len() + 1,
            ChoiceKind::Generator { .. } => 1,
        }
    }

    fn constraint_at(&self, alternative: usize) -> Option<Constraint> {
        match self {
            ChoiceKind::Jump { condition, .. } if alternative == 0 => Some(condition.clone()),
            ChoiceKind::Jump { condition, .. } => Some(condition.negate()),
            ChoiceKind::Compare { lhs, rhs } => {
                COMPARE_RESULTS.get(alternative).map(|(op, _)| Constraint::cmp(*op, lhs.clone(), rhs.clone()))
            }
            ChoiceKind::Switch { value, cases, .. } => match cases.get(alternative) {
                Some((key, _)) => Some(Constraint::cmp(Cmp::Eq, value.clone(), Exp::Int(*key))),
                None => Some(Constraint::And(
                    cases.iter().map(|(key, _)| Constraint::cmp(Cmp::Ne, value.clone(), Exp::Int(*key))).collect(),
                )),
            },
            ChoiceKind::Fault { fault, .. } if alternative == 0 => Some(fault.clone()),
            ChoiceKind::Fault { absent, .. } => Some(absent.clone()),
            ChoiceKind::Alias { index, candidates, distinct, .. } => match candidates.get(alternative) {
                Some(k) => Some(Constraint::cmp(Cmp::Eq, index.clone(), k.clone())),
                None => Some(distinct.clone()),
            },
            ChoiceKind::Generator { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::frame::Frame;
    use super::*;
    use crate::generator::ValueList;
    use crate::ir::{Method, NumTy};
    use crate::smt::{Domain, Model, Solver, Sym, Symbols};

    /// Cannot decide anything.
    struct Refusing {
        stack: Vec<Constraint>,
    }

    impl ConstraintSystem for Refusing {
        fn declare(&mut self, _: Sym, _: NumTy, _: Domain) {}

        fn add_constraint(&mut self, constraint: Constraint) {
            self.stack.push(constraint)
        }

        fn remove_constraint(&mut self) -> Option<Constraint> {
            self.stack.pop()
        }

        fn has_solution(&mut self) -> Result<SmtResult, SolverError> {
            Err(SolverError::Timeout)
        }

        fn constraints(&self) -> &[Constraint] {
            &self.stack
        }

        fn model(&self) -> Option<Model> {
            None
        }
    }

    fn site() -> Site {
        Site { number: 0, parent: None, depth: 1, pc: 4, pc_next: 5 }
    }

    fn var(solver: &mut Solver, symbols: &mut Symbols, name: &str) -> Exp {
        let v = symbols.fresh(name.to_string(), NumTy::Int);
        solver.declare(v, NumTy::Int, Domain::Full);
        Exp::Var(v)
    }

    #[test]
    fn jump_falls_back_to_negation() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x");
        solver.add_constraint(Constraint::cmp(Cmp::Gt, x.clone(), Exp::Int(10)));
        let cp = ChoicePoint::jump(site(), Constraint::cmp(Cmp::Lt, x, Exp::Int(0)), 9, &mut solver).unwrap();
        assert_eq!(cp.alternative(), 1);
        assert_eq!(cp.resume_pc(), 5);
        assert!(!cp.has_another_choice());
        assert_eq!(solver.constraints().len(), 2)
    }

    #[test]
    fn compare_tries_greater_less_equal() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x");
        let mut cp = ChoicePoint::compare(site(), x, Exp::Int(0), &mut solver).unwrap();
        let mut order = vec![COMPARE_RESULTS[cp.alternative()].1];
        while cp.has_another_choice() {
            solver.remove_constraint();
            cp.change_to_next_choice().unwrap();
            assert!(try_assert(&mut solver, cp.constraint().unwrap().clone()).unwrap());
            order.push(COMPARE_RESULTS[cp.alternative()].1)
        }
        assert_eq!(order, vec![1, -1, 0]);
        assert!(cp.change_to_next_choice().unwrap_err().is_fatal())
    }

    #[test]
    fn compare_on_inconsistent_path_is_fatal() {
        let mut solver = Solver::new();
        solver.add_constraint(Constraint::Bool(false));
        match ChoicePoint::compare(site(), Exp::Int(1), Exp::Int(2), &mut solver) {
            Err(ChoiceError::Fatal(ExecError::Inconsistent(_))) => (),
            _ => panic!("expected an inconsistency"),
        }
    }

    #[test]
    fn fault_without_a_decidable_polarity() {
        let mut symbols = Symbols::new();
        let is_null = Exp::Var(symbols.fresh("p.isNull".to_string(), NumTy::Int));
        let fault = Constraint::cmp(Cmp::Eq, is_null.clone(), Exp::Int(1));
        let absent = Constraint::cmp(Cmp::Eq, is_null, Exp::Int(0));

        let mut refusing = Refusing { stack: Vec::new() };
        let result = ChoicePoint::fault(site(), fault.clone(), absent.clone(), "E", Vec::new(), &mut refusing);
        assert!(matches!(result, Err(ChoiceError::Indecisive(SolverError::Timeout))));
        assert!(refusing.constraints().is_empty());

        let mut solver = Solver::new();
        solver.add_constraint(Constraint::Bool(false));
        let result = ChoicePoint::fault(site(), fault, absent, "E", Vec::new(), &mut solver);
        assert!(matches!(result, Err(ChoiceError::Unsatisfiable)));
        assert_eq!(solver.constraints().len(), 1)
    }

    #[test]
    fn malformed_switches_are_rejected() {
        assert!(matches!(switch_cases(&[1, 2], &[3]), Err(ExecError::BadSwitch(_))));
        assert!(matches!(switch_cases(&[], &[]), Err(ExecError::BadSwitch(_))));
        assert!(matches!(switch_cases(&[1, 1], &[3, 4]), Err(ExecError::BadSwitch(_))));
        assert_eq!(switch_cases(&[5, 1], &[10, 20]).unwrap(), vec![(1, 20), (5, 10)])
    }

    #[test]
    fn switch_default_excludes_every_key() {
        let mut solver = Solver::new();
        let mut symbols = Symbols::new();
        let x = var(&mut solver, &mut symbols, "x");
        solver.add_constraint(Constraint::cmp(Cmp::Ge, x.clone(), Exp::Int(1)));
        solver.add_constraint(Constraint::cmp(Cmp::Le, x.clone(), Exp::Int(2)));
        let mut cp = ChoicePoint::switch(site(), x, &[2, 1], &[30, 20], 40, &mut solver).unwrap();
        assert_eq!(cp.resume_pc(), 20);
        solver.remove_constraint();
        cp.change_to_next_choice().unwrap();
        assert_eq!(cp.resume_pc(), 30);
        cp.change_to_next_choice().unwrap();
        assert_eq!(cp.resume_pc(), 40);
        assert_eq!(try_assert(&mut solver, cp.constraint().unwrap().clone()), Ok(false));
        assert_eq!(solver.constraints().len(), 2)
    }

    #[test]
    fn generator_resumes_at_same_pc() {
        let method = Method::new("m", Vec::new(), None, Vec::new()).with_max_locals(1);
        let mut state = State::new();
        state.frames.push(Frame::new(&method, Vec::new()));
        let mut cp = ChoicePoint::generator(site(), 0, Box::new(ValueList::ints("g", &[3, 4]))).unwrap();
        assert!(!cp.changes_the_constraint_system());
        assert_eq!(cp.resume_pc(), 4);
        assert_eq!(cp.apply_state_changes(&mut state), Ok(Effect::None));
        assert_eq!(state.frames[0].locals[0], Val::int(3));
        assert_eq!(cp.generated(), Some(("g".to_string(), "3".to_string())));
        cp.trail.replay(&mut state).unwrap();
        assert_eq!(state.frames[0].locals[0], Val::Null);
        cp.change_to_next_choice().unwrap();
        cp.apply_state_changes(&mut state).unwrap();
        assert_eq!(state.frames[0].locals[0], Val::int(4));
        assert!(!cp.has_another_choice())
    }
}
