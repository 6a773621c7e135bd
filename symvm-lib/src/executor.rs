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

//! This module implements the search driver: it runs a method one
//! instruction at a time, turns every fork reported by the dispatcher
//! into a [ChoicePoint](choice::ChoicePoint), and explores the
//! resulting execution tree depth first, left to right.
//!
//! Backtracking never copies state. Each choice point owns a trail of
//! the mutations made since it was created, and returning to it
//! replays that trail in reverse, removes its constraint from the
//! solver, and asserts the next satisfiable alternative.

use crossbeam::queue::SegQueue;
use crossbeam::thread;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub mod choice;
pub mod dispatch;
pub mod frame;
pub mod trail;

use choice::{try_assert, ChoicePoint, Effect, Site};
use dispatch::{Flow, Fork, Machine};
use frame::{Frame, State};
use trail::Trail;

use crate::config::SearchConfig;
use crate::error::{ChoiceError, ExecError, SolverError};
use crate::generator::{Generator, Generators};
use crate::heap::symbolic_value;
use crate::ir::{Program, Val};
use crate::log;
use crate::native::Natives;
use crate::smt::smtlib::{Constraint, Num};
use crate::smt::{ConstraintSystem, Model, SmtResult};

/// How a path ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Return(Option<Val>),
    /// An exception of the given class escaped the entry method.
    Exception(String),
    /// The path needed more open choice points than allowed.
    DepthLimit,
    /// The engine failed on this path. Other paths are unaffected.
    Failed(String),
}

/// A finished path, handed to the collector as soon as it is found.
#[derive(Clone, Debug)]
pub struct PathResult {
    /// Paths are numbered from 1 in the order they are found.
    pub number: usize,
    pub outcome: Outcome,
    pub description: String,
    pub constraints: Vec<Constraint>,
    /// The constraints with variables named after the inputs they
    /// stand for.
    pub path_condition: Vec<String>,
    /// A witness assignment for the path condition, when the solver
    /// provides one.
    pub model: BTreeMap<String, Num>,
    /// Each parameter of the entry method with the value it takes on
    /// this path.
    pub inputs: Vec<(String, String)>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    Instructions,
    Time,
    Paths,
    Cancelled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchStatus {
    Complete,
    Aborted(AbortReason),
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStatus::Complete => write!(f, "complete"),
            SearchStatus::Aborted(AbortReason::Instructions) => write!(f, "partial (instruction budget exhausted)"),
            SearchStatus::Aborted(AbortReason::Time) => write!(f, "partial (time budget exhausted)"),
            SearchStatus::Aborted(AbortReason::Paths) => write!(f, "partial (path limit reached)"),
            SearchStatus::Aborted(AbortReason::Cancelled) => write!(f, "partial (cancelled)"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub instructions: u64,
    pub choice_points: usize,
    pub backtracks: usize,
    pub solver_calls: usize,
    pub paths: usize,
}

#[derive(Clone, Debug)]
pub struct SearchResult {
    pub status: SearchStatus,
    pub paths: Vec<PathResult>,
    pub stats: Stats,
}

/// Forwards to a constraint system, counting satisfiability queries.
struct Counting<'a> {
    inner: &'a mut dyn ConstraintSystem,
    calls: &'a mut usize,
}

impl<'a> ConstraintSystem for Counting<'a> {
    fn declare(&mut self, v: crate::smt::Sym, ty: crate::ir::NumTy, domain: crate::smt::Domain) {
        self.inner.declare(v, ty, domain)
    }

    fn add_constraint(&mut self, constraint: Constraint) {
        self.inner.add_constraint(constraint)
    }

    fn remove_constraint(&mut self) -> Option<Constraint> {
        self.inner.remove_constraint()
    }

    fn has_solution(&mut self) -> Result<SmtResult, SolverError> {
        *self.calls += 1;
        self.inner.has_solution()
    }

    fn constraints(&self) -> &[Constraint] {
        self.inner.constraints()
    }

    fn model(&self) -> Option<Model> {
        self.inner.model()
    }
}

/// How often the wall clock is consulted between choice points, in
/// instructions.
const CLOCK_INTERVAL: u64 = 256;

fn interrupted(abort: &Option<Arc<AtomicBool>>, deadline: Option<Instant>) -> Option<AbortReason> {
    if abort.as_ref().map_or(false, |flag| flag.load(Ordering::Relaxed)) {
        return Some(AbortReason::Cancelled);
    }
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Some(AbortReason::Time),
        _ => None,
    }
}

/// A depth-first exploration of every path through one method.
pub struct Search<'ir, S> {
    id: usize,
    program: &'ir Program,
    natives: &'ir Natives,
    config: SearchConfig,
    solver: S,
    state: State<'ir>,
    /// Receives the mutations made before the first choice point,
    /// which are never undone.
    base: Trail<'ir>,
    choices: Vec<ChoicePoint<'ir>>,
    generators: Generators,
    inputs: Vec<(String, Val)>,
    cleared: Vec<Constraint>,
    next_choice: usize,
    stats: Stats,
    abort: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    /// Set when the search was stopped while looking for the next
    /// alternative.
    aborted: Option<AbortReason>,
    finished: bool,
}

impl<'ir, S: ConstraintSystem> Search<'ir, S> {
    /// Prepare a search of `method`. Every parameter starts out as a
    /// fresh symbolic value named after the parameter.
    pub fn new(
        program: &'ir Program,
        natives: &'ir Natives,
        method: &str,
        mut solver: S,
        config: SearchConfig,
    ) -> Result<Self, ExecError> {
        let method = program.method(method).ok_or_else(|| ExecError::NoSuchMethod(method.to_string()))?;
        let mut state = State::new();
        let mut base = Trail::discarding();
        let args: Vec<Val> = method
            .params
            .iter()
            .map(|param| symbolic_value(&mut state.heap, &param.name, &param.ty, &mut state.symbols, &mut solver))
            .collect();
        let inputs = method.params.iter().map(|param| param.name.clone()).zip(args.iter().cloned()).collect();
        state.enter_frame(Frame::new(method, args), &mut base);

        Ok(Search {
            id: 0,
            program,
            natives,
            config,
            solver,
            state,
            base,
            choices: Vec::new(),
            generators: Generators::new(),
            inputs,
            cleared: Vec::new(),
            next_choice: 0,
            stats: Stats::default(),
            abort: None,
            deadline: None,
            aborted: None,
            finished: false,
        })
    }

    /// Identifies the search in log output.
    pub fn with_id(self, id: usize) -> Self {
        Search { id, ..self }
    }

    pub fn with_abort_flag(self, flag: Arc<AtomicBool>) -> Self {
        Search { abort: Some(flag), ..self }
    }

    /// Make a generator available to `Generate` instructions.
    pub fn add_generator(&mut self, generator: Box<dyn Generator>) {
        self.generators.register(generator)
    }

    /// Draw the values of a parameter from `generator` instead of
    /// treating it as symbolic.
    pub fn bind_parameter(&mut self, param: &str, generator: Box<dyn Generator>) -> Result<(), ExecError> {
        let slot = self
            .inputs
            .iter()
            .position(|(name, _)| name == param)
            .ok_or_else(|| ExecError::NoSuchParameter(param.to_string()))?;
        let pending = Val::Pending(generator.name().to_string());
        self.generators.register(generator);
        self.state.store(slot, pending.clone(), &mut self.base)?;
        self.inputs[slot].1 = pending;
        Ok(())
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn state(&self) -> &State<'ir> {
        &self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Number of currently open choice points.
    pub fn depth(&self) -> usize {
        self.choices.len()
    }

    /// Budgets checked before every instruction. The clock is only
    /// read every [CLOCK_INTERVAL] instructions here, choice point
    /// decisions read it every time.
    fn exhausted(&self) -> Option<AbortReason> {
        if self.config.max_instructions.map_or(false, |max| self.stats.instructions >= max) {
            return Some(AbortReason::Instructions);
        }
        let deadline = if self.stats.instructions % CLOCK_INTERVAL == 0 { self.deadline } else { None };
        interrupted(&self.abort, deadline)
    }

    /// Record that the search must stop, if it must.
    fn interrupt(&mut self) -> bool {
        self.aborted = interrupted(&self.abort, self.deadline);
        self.aborted.is_some()
    }

    fn stopped(&self) -> SearchStatus {
        self.aborted.map_or(SearchStatus::Complete, SearchStatus::Aborted)
    }

    /// Explore the method, passing each path to `collector` as soon as
    /// it ends. A search can only be run once, later calls return
    /// immediately.
    pub fn run<F>(&mut self, collector: &mut F) -> SearchStatus
    where
        F: FnMut(PathResult),
    {
        if self.finished {
            return SearchStatus::Complete;
        }
        self.deadline = self.config.max_time.map(|max_time| Instant::now() + max_time);
        let mut flow = Flow::Next;
        let status = loop {
            flow = match flow {
                Flow::Next => {
                    if let Some(reason) = self.exhausted() {
                        break SearchStatus::Aborted(reason);
                    }
                    self.stats.instructions += 1;
                    self.step()
                }
                Flow::Fork(fork) => match self.fork(fork) {
                    Some(flow) => flow,
                    None => break self.stopped(),
                },
                Flow::End(outcome) => {
                    self.finish_path(outcome, collector);
                    let next = self.track_back();
                    match next {
                        Some(_) if self.config.max_paths.map_or(false, |max| self.stats.paths >= max) => {
                            break SearchStatus::Aborted(AbortReason::Paths)
                        }
                        Some(flow) => flow,
                        None => break self.stopped(),
                    }
                }
            }
        };
        log_from!(self.id, log::SEARCH, &format!("search finished: {:?}, {:?}", status, self.stats));
        self.finished = true;
        status
    }

    /// Run the search, collecting all paths.
    pub fn explore(&mut self) -> SearchResult {
        let mut paths = Vec::new();
        let status = self.run(&mut |path| paths.push(path));
        SearchResult { status, paths, stats: self.stats.clone() }
    }

    fn step(&mut self) -> Flow {
        let Search { state, base, choices, solver, program, natives, cleared, .. } = self;
        let trail = match choices.last_mut() {
            Some(cp) => &mut cp.trail,
            None => base,
        };
        let current = std::mem::take(cleared);
        let mut machine = Machine { state, trail, solver, program: *program, natives: *natives, cleared: &current };
        let flow = machine.step().unwrap_or_else(|err| Flow::End(Outcome::Failed(err.to_string())));
        if let Flow::Fork(Fork::Fault { .. }) | Flow::Fork(Fork::Alias { .. }) = flow {
            *cleared = current
        }
        flow
    }

    fn fork(&mut self, fork: Fork) -> Option<Flow> {
        let cleared = std::mem::take(&mut self.cleared);
        if self.interrupt() {
            return None;
        }
        if self.config.max_depth.map_or(false, |max| self.choices.len() >= max) {
            return Some(Flow::End(Outcome::DepthLimit));
        }
        let pc = match self.state.top() {
            Ok(frame) => frame.pc,
            Err(err) => return Some(Flow::End(Outcome::Failed(err.to_string()))),
        };
        let site = Site {
            number: self.next_choice,
            parent: self.choices.last().map(ChoicePoint::number),
            depth: self.state.depth(),
            pc,
            pc_next: pc + 1,
        };
        self.next_choice += 1;

        let mut solver = Counting { inner: &mut self.solver, calls: &mut self.stats.solver_calls };
        let result = match fork {
            Fork::Jump { condition, target } => ChoicePoint::jump(site, condition, target, &mut solver),
            Fork::Compare { lhs, rhs } => ChoicePoint::compare(site, lhs, rhs, &mut solver),
            Fork::Switch { value, keys, targets, default } => {
                ChoicePoint::switch(site, value, &keys, &targets, default, &mut solver)
            }
            Fork::Fault { fault, absent, exception } => {
                ChoicePoint::fault(site, fault, absent, exception, cleared, &mut solver)
            }
            Fork::Alias { index, candidates, distinct } => {
                ChoicePoint::alias(site, index, candidates, distinct, cleared, &mut solver)
            }
            Fork::Generate { slot, generator } => match self.generators.instantiate(&generator) {
                Some(generator) => ChoicePoint::generator(site, slot, generator),
                None => Err(ChoiceError::Fatal(ExecError::NoSuchGenerator(generator))),
            },
        };

        match result {
            Ok(cp) => {
                log_from!(
                    self.id,
                    log::CHOICE,
                    &format!("choice point #{} at pc {} taking alternative {}", site.number, pc, cp.alternative())
                );
                self.stats.choice_points += 1;
                self.choices.push(cp);
                Some(self.resume())
            }
            Err(ChoiceError::Fatal(err)) => Some(Flow::End(Outcome::Failed(err.to_string()))),
            Err(err) => {
                log_from!(self.id, log::CHOICE, &format!("choice point #{} at pc {}: {}", site.number, pc, err));
                self.track_back()
            }
        }
    }

    /// Reposition the path at the innermost choice point's current
    /// alternative and apply its side effects.
    fn resume(&mut self) -> Flow {
        self.try_resume().unwrap_or_else(|err| Flow::End(Outcome::Failed(err.to_string())))
    }

    fn try_resume(&mut self) -> Result<Flow, ExecError> {
        let Search { state, choices, solver, program, natives, cleared, .. } = self;
        let cp = choices.last_mut().ok_or_else(|| ExecError::Inconsistent("no choice point to resume".to_string()))?;
        if state.depth() != cp.depth() {
            return Err(ExecError::Inconsistent(format!(
                "choice point #{} expects {} frames, found {}",
                cp.number(),
                cp.depth(),
                state.depth()
            )));
        }
        state.jump(cp.resume_pc())?;
        cleared.clear();
        if !cp.enforces_state_changes() {
            return Ok(Flow::Next);
        }
        match cp.apply_state_changes(state)? {
            Effect::None => Ok(Flow::Next),
            Effect::Clear(faults) => {
                *cleared = faults;
                Ok(Flow::Next)
            }
            Effect::Throw(class) => {
                let mut machine =
                    Machine { state, trail: &mut cp.trail, solver, program: *program, natives: *natives, cleared: &[] };
                machine.throw(class)
            }
        }
    }

    /// Return to the nearest choice point with an alternative left,
    /// or `None` once the whole tree has been explored or the search
    /// is interrupted.
    fn track_back(&mut self) -> Option<Flow> {
        self.stats.backtracks += 1;
        self.cleared.clear();
        loop {
            if self.interrupt() {
                return None;
            }
            let Search { id, state, choices, solver, stats, abort, deadline, aborted, .. } = self;
            let cp = choices.last_mut()?;
            match cp.trail.replay(state) {
                Ok(n) => log_from!(*id, log::TRAIL, &format!("choice point #{}: undid {} changes", cp.number(), n)),
                Err(err) => return Some(Flow::End(Outcome::Failed(err.to_string()))),
            }
            if cp.asserted {
                solver.remove_constraint();
                cp.asserted = false
            }

            let mut solver = Counting { inner: solver, calls: &mut stats.solver_calls };
            while cp.has_another_choice() {
                if let Err(err) = cp.change_to_next_choice() {
                    log_from!(*id, log::CHOICE, &format!("choice point #{}: {}", cp.number(), err));
                    break;
                }
                let constraint = match cp.constraint().cloned() {
                    Some(constraint) if cp.changes_the_constraint_system() => constraint,
                    _ => return Some(self.resume()),
                };
                *aborted = interrupted(abort, *deadline);
                if aborted.is_some() {
                    return None;
                }
                match try_assert(&mut solver, constraint) {
                    Ok(true) => {
                        log_from!(
                            *id,
                            log::CHOICE,
                            &format!("choice point #{} taking alternative {}", cp.number(), cp.alternative())
                        );
                        cp.asserted = true;
                        return Some(self.resume());
                    }
                    Ok(false) => (),
                    Err(err) => {
                        log_from!(*id, log::SOLVER, &format!("choice point #{} alternative {}: {}", cp.number(), cp.alternative(), err))
                    }
                }
            }

            log_from!(*id, log::CHOICE, &format!("choice point #{} exhausted", cp.number()));
            self.choices.pop();
        }
    }

    fn render(&self, val: &Val, model: &BTreeMap<String, Num>) -> String {
        let symbols = &self.state.symbols;
        match val {
            Val::Num(exp) => {
                let name = symbols.render_exp(exp);
                model.get(&name).map(|n| n.to_string()).unwrap_or(name)
            }
            Val::Ref(id) => {
                let obj = &self.state.heap[*id];
                let is_null = symbols.render_exp(obj.is_null());
                match model.get(&is_null) {
                    Some(Num::Int(1)) => "null".to_string(),
                    _ => obj.name().to_string(),
                }
            }
            Val::Null => "null".to_string(),
            Val::Pending(generator) => self
                .choices
                .iter()
                .rev()
                .filter_map(ChoicePoint::generated)
                .find(|(name, _)| name == generator)
                .map(|(_, value)| value)
                .unwrap_or_else(|| format!("<{}>", generator)),
        }
    }

    fn finish_path<F>(&mut self, outcome: Outcome, collector: &mut F)
    where
        F: FnMut(PathResult),
    {
        self.stats.paths += 1;
        let model = {
            let mut solver = Counting { inner: &mut self.solver, calls: &mut self.stats.solver_calls };
            match solver.has_solution() {
                Ok(SmtResult::Sat) => solver.model(),
                _ => None,
            }
        };
        let symbols = &self.state.symbols;
        let model: BTreeMap<String, Num> = model
            .map(|model| model.iter().map(|(v, n)| (symbols.name(*v).to_string(), *n)).collect())
            .unwrap_or_default();
        let constraints = self.solver.constraints().to_vec();
        let path_condition = constraints.iter().map(|c| symbols.render(c)).collect();
        let inputs = self.inputs.iter().map(|(name, val)| (name.clone(), self.render(val, &model))).collect();
        let description = match &outcome {
            Outcome::Return(None) => "returned".to_string(),
            Outcome::Return(Some(val)) => format!("returned {}", self.render(val, &BTreeMap::new())),
            Outcome::Exception(class) => format!("threw {}", class),
            Outcome::DepthLimit => "cut off at depth limit".to_string(),
            Outcome::Failed(msg) => format!("failed: {}", msg),
        };
        log_from!(self.id, log::SEARCH, &format!("path {} {}", self.stats.paths, description));
        collector(PathResult {
            number: self.stats.paths,
            outcome,
            description,
            constraints,
            path_condition,
            model,
            inputs,
        })
    }
}

/// One method to explore as part of a batch.
pub struct Job<'ir> {
    pub program: &'ir Program,
    pub natives: &'ir Natives,
    pub method: String,
    pub config: SearchConfig,
    /// Parameters whose values are drawn from a generator.
    pub bindings: Vec<(String, Box<dyn Generator>)>,
}

impl<'ir> Job<'ir> {
    fn run(self, tid: usize) -> Result<SearchResult, ExecError> {
        let mut search = Search::new(self.program, self.natives, &self.method, self.config.solver(), self.config)?;
        for (param, generator) in self.bindings {
            search.bind_parameter(&param, generator)?
        }
        Ok(search.with_id(tid).explore())
    }
}

/// Explore several methods concurrently, each in its own search with
/// its own solver. Results are returned in job order.
pub fn start_batch<'ir>(jobs: Vec<Job<'ir>>, num_threads: usize) -> Vec<(usize, Result<SearchResult, ExecError>)> {
    let num_jobs = jobs.len();
    let queue: SegQueue<(usize, Job<'ir>)> = SegQueue::new();
    for job in jobs.into_iter().enumerate() {
        queue.push(job)
    }
    let collected: SegQueue<(usize, Result<SearchResult, ExecError>)> = SegQueue::new();

    let outcome = thread::scope(|scope| {
        for tid in 0..num_threads.max(1) {
            let queue = &queue;
            let collected = &collected;
            scope.spawn(move |_| {
                while let Some((i, job)) = queue.pop() {
                    log_from!(tid, log::VERBOSE, &format!("exploring {}", job.method));
                    collected.push((i, job.run(tid)))
                }
            });
        }
    });
    if outcome.is_err() {
        log!(log::VERBOSE, "a worker thread panicked")
    }

    let mut results: Vec<_> = std::iter::from_fn(|| collected.pop()).collect();
    for i in 0..num_jobs {
        if !results.iter().any(|(j, _)| *j == i) {
            results.push((i, Err(ExecError::Inconsistent("worker thread panicked".to_string()))))
        }
    }
    results.sort_by_key(|(i, _)| *i);
    results
}
