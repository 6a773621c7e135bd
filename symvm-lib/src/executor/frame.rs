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

use std::collections::HashMap;

use super::trail::{Trail, TrailElement};
use crate::error::ExecError;
use crate::heap::{Heap, RefId};
use crate::ir::{FieldRef, Method, Ty, Val};
use crate::smt::smtlib::Exp;
use crate::smt::{ConstraintSystem, Symbols};

/// An activation of a method: its operand stack, local variables and
/// program counter.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame<'ir> {
    pub method: &'ir Method,
    pub pc: usize,
    pub locals: Vec<Val>,
    pub stack: Vec<Val>,
}

impl<'ir> Frame<'ir> {
    /// Arguments occupy the first local slots. The remaining slots
    /// start out as `null`, the verifier guarantees they are written
    /// before being read.
    pub fn new(method: &'ir Method, mut args: Vec<Val>) -> Self {
        args.resize(method.max_locals.max(args.len()), Val::Null);
        Frame { method, pc: 0, locals: args, stack: Vec::new() }
    }
}

/// Everything about a path that backtracking has to restore. All
/// mutations go through the methods below, each of which records the
/// prior value on the trail it is given.
#[derive(Clone)]
pub struct State<'ir> {
    pub frames: Vec<Frame<'ir>>,
    pub heap: Heap,
    pub statics: HashMap<(String, String), Val>,
    pub symbols: Symbols,
}

fn static_key(field: &FieldRef) -> (String, String) {
    (field.class.clone(), field.name.clone())
}

impl<'ir> State<'ir> {
    pub fn new() -> Self {
        State { frames: Vec::new(), heap: Heap::new(), statics: HashMap::new(), symbols: Symbols::new() }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Result<&Frame<'ir>, ExecError> {
        self.frames.last().ok_or_else(|| ExecError::Inconsistent("no active frame".to_string()))
    }

    pub fn top_mut(&mut self) -> Result<&mut Frame<'ir>, ExecError> {
        self.frames.last_mut().ok_or_else(|| ExecError::Inconsistent("no active frame".to_string()))
    }

    /// Control flow within the top frame is not trailed, a choice
    /// point repositions the pc itself when it resumes.
    pub fn jump(&mut self, pc: usize) -> Result<(), ExecError> {
        self.top_mut()?.pc = pc;
        Ok(())
    }

    pub fn advance(&mut self) -> Result<(), ExecError> {
        self.top_mut()?.pc += 1;
        Ok(())
    }

    pub fn push(&mut self, val: Val, trail: &mut Trail<'ir>) -> Result<(), ExecError> {
        let frame = self.depth();
        self.top_mut()?.stack.push(val);
        trail.record(TrailElement::Push { frame: frame - 1 });
        Ok(())
    }

    pub fn pop(&mut self, trail: &mut Trail<'ir>) -> Result<Val, ExecError> {
        let frame = self.depth();
        let value = self.top_mut()?.stack.pop().ok_or(ExecError::StackUnderflow)?;
        trail.record(TrailElement::Pop { frame: frame - 1, value: value.clone() });
        Ok(value)
    }

    pub fn pop_exp(&mut self, trail: &mut Trail<'ir>) -> Result<Exp, ExecError> {
        match self.pop(trail)? {
            Val::Num(exp) => Ok(exp),
            _ => Err(ExecError::Type("expected a numeric operand")),
        }
    }

    /// The value `depth` entries below the top of the operand stack.
    pub fn peek(&self, depth: usize) -> Result<&Val, ExecError> {
        let stack = &self.top()?.stack;
        stack.len().checked_sub(depth + 1).and_then(|i| stack.get(i)).ok_or(ExecError::StackUnderflow)
    }

    pub fn load(&self, slot: usize) -> Result<&Val, ExecError> {
        self.top()?.locals.get(slot).ok_or(ExecError::NoSuchLocal(slot))
    }

    pub fn store(&mut self, slot: usize, val: Val, trail: &mut Trail<'ir>) -> Result<(), ExecError> {
        let frame = self.depth().checked_sub(1).ok_or_else(|| ExecError::Inconsistent("no active frame".to_string()))?;
        self.store_in(frame, slot, val, trail)
    }

    pub fn store_in(&mut self, frame: usize, slot: usize, val: Val, trail: &mut Trail<'ir>) -> Result<(), ExecError> {
        let local = self
            .frames
            .get_mut(frame)
            .and_then(|f| f.locals.get_mut(slot))
            .ok_or(ExecError::NoSuchLocal(slot))?;
        let prior = std::mem::replace(local, val);
        trail.record(TrailElement::Local { frame, slot, prior });
        Ok(())
    }

    pub fn put_field(
        &mut self,
        object: RefId,
        field: &FieldRef,
        val: Val,
        solver: &mut dyn ConstraintSystem,
        trail: &mut Trail<'ir>,
    ) -> Result<(), ExecError> {
        let prior = self.heap.put_field(object, field, val, &mut self.symbols, solver)?;
        trail.record(TrailElement::Field { object, field: field.name.clone(), prior });
        Ok(())
    }

    pub fn get_field(
        &mut self,
        object: RefId,
        field: &FieldRef,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<Val, ExecError> {
        self.heap.get_field(object, field, &mut self.symbols, solver)
    }

    pub fn get_static(&self, field: &FieldRef) -> Val {
        self.statics.get(&static_key(field)).cloned().unwrap_or_else(|| field.ty.default_value())
    }

    pub fn put_static(&mut self, field: &FieldRef, val: Val, trail: &mut Trail<'ir>) {
        let key = static_key(field);
        let prior = self.statics.insert(key.clone(), val);
        trail.record(TrailElement::Static { field: key, prior })
    }

    pub fn new_object(&mut self, class: &str, trail: &mut Trail<'ir>) -> RefId {
        let object = self.heap.new_object(class);
        trail.record(TrailElement::Allocated { object });
        object
    }

    pub fn new_array(&mut self, elem: Ty, length: Exp, trail: &mut Trail<'ir>) -> RefId {
        let object = self.heap.new_array(elem, length);
        trail.record(TrailElement::Allocated { object });
        object
    }

    pub fn load_element(
        &mut self,
        array: RefId,
        index: &Exp,
        solver: &mut dyn ConstraintSystem,
        trail: &mut Trail<'ir>,
    ) -> Result<Val, ExecError> {
        let (val, entered) = self.heap.load_element(array, index, &mut self.symbols, solver)?;
        if entered {
            trail.record(TrailElement::Element { array, index: index.clone(), prior: None })
        }
        Ok(val)
    }

    pub fn store_element(&mut self, array: RefId, index: Exp, val: Val, trail: &mut Trail<'ir>) -> Result<(), ExecError> {
        let prior = self.heap.store_element(array, index.clone(), val)?;
        trail.record(TrailElement::Element { array, index, prior });
        Ok(())
    }

    pub fn enter_frame(&mut self, frame: Frame<'ir>, trail: &mut Trail<'ir>) {
        self.frames.push(frame);
        trail.record(TrailElement::FrameEntered)
    }

    /// Pop the top frame. The caller's pc is saved with the frame, so
    /// that the caller can be moved on without further trail entries.
    pub fn leave_frame(&mut self, trail: &mut Trail<'ir>) -> Result<(), ExecError> {
        let frame = self.frames.pop().ok_or_else(|| ExecError::Inconsistent("no frame to leave".to_string()))?;
        let caller_pc = self.frames.last().map(|caller| caller.pc);
        trail.record(TrailElement::FrameLeft { frame, caller_pc });
        Ok(())
    }
}

impl<'ir> Default for State<'ir> {
    fn default() -> Self {
        State::new()
    }
}
