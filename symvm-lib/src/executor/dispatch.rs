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

//! Execution of single instructions. Deterministic instructions
//! update the state and move on. Instructions whose outcome depends
//! on the path condition stop short and return a [Fork] describing
//! the decision, which the search driver turns into a choice point.
//! Forks that guard a runtime fault leave the operand stack untouched,
//! so that the instruction can run again once the fault is ruled out.

use super::frame::{Frame, State};
use super::trail::Trail;
use super::Outcome;
use crate::error::ExecError;
use crate::heap::RefId;
use crate::ir::*;
use crate::log;
use crate::native::Natives;
use crate::primop;
use crate::smt::smtlib::{Cmp, Constraint, Exp};
use crate::smt::ConstraintSystem;

#[derive(Clone, Debug, PartialEq)]
pub enum Fork {
    Jump { condition: Constraint, target: usize },
    Compare { lhs: Exp, rhs: Exp },
    Switch { value: Exp, keys: Vec<i64>, targets: Vec<usize>, default: usize },
    Fault { fault: Constraint, absent: Constraint, exception: &'static str },
    /// Which entry, if any, an array index refers to. `distinct` is
    /// the constraint that it is none of the `candidates`.
    Alias { index: Exp, candidates: Vec<Exp>, distinct: Constraint },
    Generate { slot: usize, generator: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Flow {
    Next,
    Fork(Fork),
    End(Outcome),
}

/// Disjunction with constant operands folded away.
fn any(constraints: Vec<Constraint>) -> Constraint {
    let mut open = Vec::new();
    for c in constraints {
        match c.as_bool() {
            Some(true) => return Constraint::Bool(true),
            Some(false) => (),
            None => open.push(c),
        }
    }
    match open.len() {
        0 => Constraint::Bool(false),
        1 => open.remove(0),
        _ => Constraint::Or(open),
    }
}

/// Conjunction with constant operands folded away.
fn all(constraints: Vec<Constraint>) -> Constraint {
    any(constraints.iter().map(Constraint::negate).collect()).negate()
}

pub struct Machine<'a, 'ir> {
    pub state: &'a mut State<'ir>,
    pub trail: &'a mut Trail<'ir>,
    pub solver: &'a mut dyn ConstraintSystem,
    pub program: &'ir Program,
    pub natives: &'ir Natives,
    /// Decisions on the current instruction already taken on this
    /// path, faults ruled out and array aliases chosen.
    pub cleared: &'a [Constraint],
}

impl<'a, 'ir> Machine<'a, 'ir> {
    fn next(&mut self) -> Result<Flow, ExecError> {
        self.state.advance()?;
        Ok(Flow::Next)
    }

    fn push_next(&mut self, val: Val) -> Result<Flow, ExecError> {
        self.state.push(val, self.trail)?;
        self.next()
    }

    fn pop(&mut self) -> Result<Val, ExecError> {
        self.state.pop(self.trail)
    }

    fn pop_exp(&mut self) -> Result<Exp, ExecError> {
        self.state.pop_exp(self.trail)
    }

    fn pop_ref(&mut self) -> Result<RefId, ExecError> {
        match self.pop()? {
            Val::Ref(id) => Ok(id),
            _ => Err(ExecError::Type("expected a non-null reference")),
        }
    }

    fn peek_exp(&self, depth: usize) -> Result<Exp, ExecError> {
        self.state.peek(depth)?.as_exp().cloned().ok_or(ExecError::Type("expected a numeric operand"))
    }

    fn peek_ref(&self, depth: usize) -> Result<RefId, ExecError> {
        match self.state.peek(depth)? {
            Val::Ref(id) => Ok(*id),
            _ => Err(ExecError::Type("expected a non-null reference")),
        }
    }

    fn binary(&mut self, ty: NumTy, op: fn(NumTy, Exp, Exp) -> Exp) -> Result<Flow, ExecError> {
        let rhs = self.pop_exp()?;
        let lhs = self.pop_exp()?;
        self.push_next(Val::Num(op(ty, lhs, rhs)))
    }

    fn division(
        &mut self,
        ty: NumTy,
        op: fn(NumTy, Exp, Exp) -> Result<Exp, primop::DivisionByZero>,
    ) -> Result<Flow, ExecError> {
        if ty.is_integral() {
            let divisor = self.peek_exp(0)?;
            let fault = primop::compare(Cmp::Eq, divisor.clone(), Exp::Int(0));
            let absent = primop::compare(Cmp::Ne, divisor, Exp::Int(0));
            if let Some(flow) = self.check(fault, absent, ARITHMETIC_EXCEPTION)? {
                return Ok(flow);
            }
        }
        let rhs = self.pop_exp()?;
        let lhs = self.pop_exp()?;
        match op(ty, lhs, rhs) {
            Ok(exp) => self.push_next(Val::Num(exp)),
            Err(primop::DivisionByZero) => self.throw(ARITHMETIC_EXCEPTION),
        }
    }

    fn branch(&mut self, condition: Constraint, target: usize) -> Result<Flow, ExecError> {
        match condition.as_bool() {
            Some(true) => {
                self.state.jump(target)?;
                Ok(Flow::Next)
            }
            Some(false) => self.next(),
            None => Ok(Flow::Fork(Fork::Jump { condition, target })),
        }
    }

    /// Decide whether `fault` happens, `absent` being the constraint
    /// that it does not. Returns `None` if the fault is ruled out and
    /// the instruction can go ahead.
    fn check(&mut self, fault: Constraint, absent: Constraint, exception: &'static str) -> Result<Option<Flow>, ExecError> {
        match fault.as_bool() {
            Some(true) => self.throw(exception).map(Some),
            Some(false) => Ok(None),
            None if self.cleared.contains(&fault) => Ok(None),
            None => Ok(Some(Flow::Fork(Fork::Fault { fault, absent, exception }))),
        }
    }

    fn null_test(&self, val: &Val, null: bool) -> Result<Constraint, ExecError> {
        match val {
            Val::Null => Ok(Constraint::Bool(null)),
            Val::Ref(id) => Ok(self.state.heap.null_test(*id, null)),
            _ => Err(ExecError::Type("expected a reference")),
        }
    }

    fn deref(&mut self, depth: usize) -> Result<Option<Flow>, ExecError> {
        let val = self.state.peek(depth)?;
        let fault = self.null_test(val, true)?;
        let absent = self.null_test(val, false)?;
        self.check(fault, absent, NULL_POINTER_EXCEPTION)
    }

    fn bounds(&mut self, array: usize, index: usize) -> Result<Option<Flow>, ExecError> {
        let length = self.state.heap.length(self.peek_ref(array)?)?;
        let index = self.peek_exp(index)?;
        let fault = any(vec![primop::compare(Cmp::Lt, index.clone(), Exp::Int(0)), primop::compare(Cmp::Ge, index, length)]);
        let absent = fault.negate();
        self.check(fault, absent, INDEX_OUT_OF_BOUNDS_EXCEPTION)
    }

    /// An index without an entry of its own may still name the element
    /// of another entry. Forks over the entries it may equal, and over
    /// it being a new element, unless the path has decided that
    /// already.
    fn alias(&self, array: usize, index: usize) -> Result<Option<Flow>, ExecError> {
        let array = self.peek_ref(array)?;
        let index = self.peek_exp(index)?;
        let candidates = self.state.heap.aliases(array, &index)?;
        if candidates.is_empty() || self.resolved(&index, &candidates).is_some() {
            return Ok(None);
        }
        let distinct = all(candidates.iter().map(|k| Constraint::cmp(Cmp::Ne, index.clone(), k.clone())).collect());
        if self.cleared.contains(&distinct) {
            return Ok(None);
        }
        Ok(Some(Flow::Fork(Fork::Alias { index, candidates, distinct })))
    }

    fn resolved(&self, index: &Exp, candidates: &[Exp]) -> Option<Exp> {
        candidates
            .iter()
            .find(|k| self.cleared.contains(&Constraint::cmp(Cmp::Eq, index.clone(), (*k).clone())))
            .cloned()
    }

    /// The index term of the entry an access goes to.
    fn resolve(&self, array: RefId, index: Exp) -> Result<Exp, ExecError> {
        let candidates = self.state.heap.aliases(array, &index)?;
        Ok(self.resolved(&index, &candidates).unwrap_or(index))
    }

    /// Distinct objects are never the same object, so two different
    /// references are only equal when both are null.
    fn ref_equality(&self, lhs: &Val, rhs: &Val, op: Cmp) -> Result<Constraint, ExecError> {
        let eq = match op {
            Cmp::Eq => true,
            Cmp::Ne => false,
            _ => return Err(ExecError::Type("ordered comparison of references")),
        };
        match (lhs, rhs) {
            (Val::Null, Val::Null) => Ok(Constraint::Bool(eq)),
            (Val::Ref(a), Val::Ref(b)) if a == b => Ok(Constraint::Bool(eq)),
            (Val::Ref(a), Val::Ref(b)) => {
                let heap = &self.state.heap;
                let both_null = all(vec![heap.null_test(*a, true), heap.null_test(*b, true)]);
                Ok(if eq { both_null } else { both_null.negate() })
            }
            (Val::Ref(r), Val::Null) | (Val::Null, Val::Ref(r)) => Ok(self.state.heap.null_test(*r, eq)),
            _ => Err(ExecError::Type("comparison of a reference with a number")),
        }
    }

    fn switch(&mut self, keys: Vec<i64>, targets: Vec<usize>, default: usize) -> Result<Flow, ExecError> {
        match self.pop_exp()? {
            Exp::Int(v) => {
                let cases = super::choice::switch_cases(&keys, &targets)?;
                let target = cases.iter().find(|(key, _)| *key == v).map(|(_, t)| *t).unwrap_or(default);
                self.state.jump(target)?;
                Ok(Flow::Next)
            }
            value => Ok(Flow::Fork(Fork::Switch { value, keys, targets, default })),
        }
    }

    fn invoke(&mut self, name: &str) -> Result<Flow, ExecError> {
        let (program, natives) = (self.program, self.natives);
        if let Some(callee) = program.method(name) {
            let mut args = Vec::with_capacity(callee.params.len());
            for _ in 0..callee.params.len() {
                args.push(self.pop()?)
            }
            args.reverse();
            self.state.enter_frame(Frame::new(callee, args), self.trail);
            return Ok(Flow::Next);
        }
        let native = natives.get(name).ok_or_else(|| ExecError::NoSuchMethod(name.to_string()))?;
        let mut args = Vec::with_capacity(native.arity());
        for _ in 0..native.arity() {
            args.push(self.pop()?)
        }
        args.reverse();
        log!(log::NATIVE, &format!("native {}({:?})", name, args));
        match native.call(&args)? {
            Some(result) => self.push_next(result),
            None => self.next(),
        }
    }

    fn ret(&mut self, value: Option<Val>) -> Result<Flow, ExecError> {
        if self.state.depth() == 1 {
            return Ok(Flow::End(Outcome::Return(value)));
        }
        self.state.leave_frame(self.trail)?;
        if let Some(value) = value {
            self.state.push(value, self.trail)?
        }
        self.next()
    }

    /// Raise an exception of `class`, allocating the exception object.
    pub fn throw(&mut self, class: &str) -> Result<Flow, ExecError> {
        let exception = self.state.new_object(class, self.trail);
        self.raise(exception, class)
    }

    /// Unwind to the innermost handler covering the current pc of each
    /// frame. An exception escaping the entry method ends the path.
    fn raise(&mut self, exception: RefId, class: &str) -> Result<Flow, ExecError> {
        loop {
            let frame = self.state.top()?;
            if let Some(target) = frame.method.handler_for(frame.pc, class) {
                while !self.state.top()?.stack.is_empty() {
                    self.pop()?;
                }
                self.state.push(Val::Ref(exception), self.trail)?;
                self.state.jump(target)?;
                return Ok(Flow::Next);
            }
            if self.state.depth() == 1 {
                return Ok(Flow::End(Outcome::Exception(class.to_string())));
            }
            self.state.leave_frame(self.trail)?
        }
    }

    pub fn step(&mut self) -> Result<Flow, ExecError> {
        let frame = self.state.top()?;
        let (method, pc) = (frame.method, frame.pc);
        let instr = method
            .instrs
            .get(pc)
            .ok_or_else(|| ExecError::Inconsistent(format!("fell off the end of {} at pc {}", method.name, pc)))?;

        match instr {
            Instr::Nop => self.next(),
            Instr::AconstNull => self.push_next(Val::Null),
            Instr::Iconst(i) => self.push_next(Val::int(NumTy::Int.wrap(*i))),
            Instr::Lconst(i) => self.push_next(Val::int(*i)),
            Instr::Fconst(x) => self.push_next(Val::Num(Exp::Float(NumTy::Float.round(*x)))),
            Instr::Dconst(x) => self.push_next(Val::Num(Exp::Float(*x))),

            Instr::Load(slot) => match self.state.load(*slot)?.clone() {
                Val::Pending(generator) => Ok(Flow::Fork(Fork::Generate { slot: *slot, generator })),
                val => self.push_next(val),
            },
            Instr::Store(slot) => {
                let val = self.pop()?;
                self.state.store(*slot, val, self.trail)?;
                self.next()
            }
            Instr::Iinc { slot, delta } => {
                let exp = self.state.load(*slot)?.as_exp().cloned().ok_or(ExecError::Type("iinc of a reference"))?;
                self.state.store(*slot, Val::Num(primop::add(NumTy::Int, exp, Exp::Int(*delta))), self.trail)?;
                self.next()
            }

            Instr::Pop => {
                self.pop()?;
                self.next()
            }
            Instr::Dup => {
                let val = self.state.peek(0)?.clone();
                self.push_next(val)
            }
            Instr::Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.state.push(a, self.trail)?;
                self.push_next(b)
            }

            Instr::Add(ty) => self.binary(*ty, primop::add),
            Instr::Sub(ty) => self.binary(*ty, primop::sub),
            Instr::Mul(ty) => self.binary(*ty, primop::mul),
            Instr::Div(ty) => self.division(*ty, primop::div),
            Instr::Rem(ty) => self.division(*ty, primop::rem),
            Instr::Neg(ty) => {
                let exp = self.pop_exp()?;
                self.push_next(Val::Num(primop::neg(*ty, exp)))
            }
            Instr::Convert { from, to } => {
                let exp = self.pop_exp()?;
                self.push_next(Val::Num(primop::convert(*from, *to, exp)))
            }

            Instr::If { cond, target } => {
                let exp = self.pop_exp()?;
                self.branch(primop::compare(cond.to_cmp(), exp, Exp::Int(0)), *target)
            }
            Instr::IfCmp { cond, target } => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let condition = match (lhs, rhs) {
                    (Val::Num(lhs), Val::Num(rhs)) => primop::compare(cond.to_cmp(), lhs, rhs),
                    (lhs, rhs) => self.ref_equality(&lhs, &rhs, cond.to_cmp())?,
                };
                self.branch(condition, *target)
            }
            Instr::IfNull(target) => {
                let val = self.pop()?;
                let condition = self.null_test(&val, true)?;
                self.branch(condition, *target)
            }
            Instr::IfNonNull(target) => {
                let val = self.pop()?;
                let condition = self.null_test(&val, false)?;
                self.branch(condition, *target)
            }
            Instr::Goto(target) => {
                self.state.jump(*target)?;
                Ok(Flow::Next)
            }
            Instr::Cmp(kind) => {
                let rhs = self.pop_exp()?;
                let lhs = self.pop_exp()?;
                match primop::compare3(*kind, &lhs, &rhs) {
                    Some(result) => self.push_next(Val::int(result)),
                    None => Ok(Flow::Fork(Fork::Compare { lhs, rhs })),
                }
            }
            Instr::TableSwitch { low, targets, default } => {
                let keys = (0..targets.len()).map(|i| low + i as i64).collect();
                self.switch(keys, targets.clone(), *default)
            }
            Instr::LookupSwitch { keys, targets, default } => self.switch(keys.clone(), targets.clone(), *default),

            Instr::New(class) => {
                let obj = self.state.new_object(class, self.trail);
                self.push_next(Val::Ref(obj))
            }
            Instr::GetField(field) => {
                if let Some(flow) = self.deref(0)? {
                    return Ok(flow);
                }
                let obj = self.pop_ref()?;
                let val = self.state.get_field(obj, field, self.solver)?;
                self.push_next(val)
            }
            Instr::PutField(field) => {
                if let Some(flow) = self.deref(1)? {
                    return Ok(flow);
                }
                let val = self.pop()?;
                let obj = self.pop_ref()?;
                self.state.put_field(obj, field, val, self.solver, self.trail)?;
                self.next()
            }
            Instr::GetStatic(field) => {
                let val = self.state.get_static(field);
                self.push_next(val)
            }
            Instr::PutStatic(field) => {
                let val = self.pop()?;
                self.state.put_static(field, val, self.trail);
                self.next()
            }

            Instr::NewArray(elem) => {
                let fault = primop::compare(Cmp::Lt, self.peek_exp(0)?, Exp::Int(0));
                let absent = fault.negate();
                if let Some(flow) = self.check(fault, absent, NEGATIVE_ARRAY_SIZE_EXCEPTION)? {
                    return Ok(flow);
                }
                let length = self.pop_exp()?;
                let array = self.state.new_array(elem.clone(), length, self.trail);
                self.push_next(Val::Ref(array))
            }
            Instr::ArrayLength => {
                if let Some(flow) = self.deref(0)? {
                    return Ok(flow);
                }
                let array = self.pop_ref()?;
                let length = self.state.heap.length(array)?;
                self.push_next(Val::Num(length))
            }
            Instr::ArrayLoad(_) => {
                if let Some(flow) = self.deref(1)? {
                    return Ok(flow);
                }
                if let Some(flow) = self.bounds(1, 0)? {
                    return Ok(flow);
                }
                if let Some(flow) = self.alias(1, 0)? {
                    return Ok(flow);
                }
                let index = self.pop_exp()?;
                let array = self.pop_ref()?;
                let index = self.resolve(array, index)?;
                let val = self.state.load_element(array, &index, self.solver, self.trail)?;
                self.push_next(val)
            }
            Instr::ArrayStore => {
                if let Some(flow) = self.deref(2)? {
                    return Ok(flow);
                }
                if let Some(flow) = self.bounds(2, 1)? {
                    return Ok(flow);
                }
                if let Some(flow) = self.alias(2, 1)? {
                    return Ok(flow);
                }
                let val = self.pop()?;
                let index = self.pop_exp()?;
                let array = self.pop_ref()?;
                let index = self.resolve(array, index)?;
                self.state.store_element(array, index, val, self.trail)?;
                self.next()
            }

            Instr::Invoke(name) => self.invoke(name),
            Instr::Return => self.ret(None),
            Instr::ValueReturn => {
                let val = self.pop()?;
                self.ret(Some(val))
            }
            Instr::Athrow => {
                if let Some(flow) = self.deref(0)? {
                    return Ok(flow);
                }
                let exception = self.peek_ref(0)?;
                let class = self.state.heap[exception].class_name();
                self.raise(exception, &class)
            }

            Instr::Generate { slot, generator } => {
                self.state.store(*slot, Val::Pending(generator.clone()), self.trail)?;
                self.next()
            }
        }
    }
}
