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

//! The trail is the undo log of a choice point. While a choice point
//! is the innermost open one, every mutation of the path state
//! appends an entry holding the value it overwrote, and backtracking
//! replays the entries newest first.
//!
//! Lazily generated fields of symbolic objects are absent. They are
//! facts about the inputs, not effects of the program, and remain
//! valid on every path. A generated array element is entered into its
//! array like a write, since which elements exist depends on the
//! aliasing decisions of the path.

use super::frame::{Frame, State};
use crate::error::ExecError;
use crate::heap::RefId;
use crate::ir::Val;
use crate::log;
use crate::smt::smtlib::Exp;

#[derive(Clone, Debug, PartialEq)]
pub enum TrailElement<'ir> {
    Local { frame: usize, slot: usize, prior: Val },
    Push { frame: usize },
    Pop { frame: usize, value: Val },
    Field { object: RefId, field: String, prior: Option<Val> },
    Static { field: (String, String), prior: Option<Val> },
    Element { array: RefId, index: Exp, prior: Option<Val> },
    Allocated { object: RefId },
    FrameEntered,
    FrameLeft { frame: Frame<'ir>, caller_pc: Option<usize> },
}

fn missing_frame(frame: usize) -> ExecError {
    ExecError::Inconsistent(format!("trail refers to missing frame {}", frame))
}

impl<'ir> TrailElement<'ir> {
    fn undo(self, state: &mut State<'ir>) -> Result<(), ExecError> {
        use TrailElement::*;
        match self {
            Local { frame, slot, prior } => {
                let local = state
                    .frames
                    .get_mut(frame)
                    .and_then(|f| f.locals.get_mut(slot))
                    .ok_or(ExecError::NoSuchLocal(slot))?;
                *local = prior
            }
            Push { frame } => {
                state.frames.get_mut(frame).ok_or_else(|| missing_frame(frame))?.stack.pop();
            }
            Pop { frame, value } => state.frames.get_mut(frame).ok_or_else(|| missing_frame(frame))?.stack.push(value),
            Field { object, field, prior } => state.heap.restore_field(object, &field, prior)?,
            Static { field, prior } => match prior {
                Some(val) => {
                    state.statics.insert(field, val);
                }
                None => {
                    state.statics.remove(&field);
                }
            },
            Element { array, index, prior } => state.heap.restore_element(array, &index, prior)?,
            Allocated { object } => state.heap.release(object)?,
            FrameEntered => {
                state.frames.pop().ok_or_else(|| missing_frame(0))?;
            }
            FrameLeft { frame, caller_pc } => {
                if let (Some(caller), Some(pc)) = (state.frames.last_mut(), caller_pc) {
                    caller.pc = pc
                }
                state.frames.push(frame)
            }
        }
        Ok(())
    }
}

pub struct Trail<'ir> {
    entries: Vec<TrailElement<'ir>>,
    recording: bool,
}

impl<'ir> Trail<'ir> {
    pub fn new() -> Self {
        Trail { entries: Vec::new(), recording: true }
    }

    /// A trail that discards everything. Mutations made before the
    /// first choice point never need to be undone.
    pub fn discarding() -> Self {
        Trail { entries: Vec::new(), recording: false }
    }

    pub fn record(&mut self, element: TrailElement<'ir>) {
        if self.recording {
            self.entries.push(element)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undo every recorded mutation, newest first, leaving the trail
    /// empty. Returns the number of entries replayed.
    pub fn replay(&mut self, state: &mut State<'ir>) -> Result<usize, ExecError> {
        let n = self.entries.len();
        while let Some(element) = self.entries.pop() {
            log!(log::TRAIL, &format!("undo {:?}", element));
            element.undo(state)?
        }
        Ok(n)
    }
}

impl<'ir> Default for Trail<'ir> {
    fn default() -> Self {
        Trail::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldRef, Method, NumTy, Ty};
    use crate::smt::Solver;

    fn snapshot<'ir>(state: &State<'ir>) -> (Vec<Frame<'ir>>, Vec<(String, Val)>, Vec<String>) {
        let mut statics: Vec<_> = state.statics.iter().map(|((c, f), v)| (format!("{}.{}", c, f), v.clone())).collect();
        statics.sort_by(|a, b| a.0.cmp(&b.0));
        let heap = state.heap.objects().map(|(_, obj)| format!("{:?}", obj)).collect();
        (state.frames.clone(), statics, heap)
    }

    fn mutate<'ir>(state: &mut State<'ir>, trail: &mut Trail<'ir>, solver: &mut Solver, obj: RefId) {
        let field = FieldRef::new("C", "f", Ty::Num(NumTy::Int));
        let counter = FieldRef::new("C", "count", Ty::Num(NumTy::Int));
        state.push(Val::int(2), trail).unwrap();
        state.pop(trail).unwrap();
        state.pop(trail).unwrap();
        state.store(1, Val::int(9), trail).unwrap();
        state.put_field(obj, &field, Val::int(3), solver, trail).unwrap();
        state.put_field(obj, &field, Val::int(4), solver, trail).unwrap();
        state.put_static(&counter, Val::int(1), trail);
        let array = state.new_array(Ty::Num(NumTy::Int), Exp::Int(2), trail);
        state.store_element(array, Exp::Int(0), Val::int(1), trail).unwrap()
    }

    #[test]
    fn replay_inverts_mutations() {
        let method = Method::new("m", Vec::new(), None, Vec::new()).with_max_locals(2);
        let callee = Method::new("callee", Vec::new(), None, Vec::new());
        let mut solver = Solver::new();
        let mut state = State::new();
        let mut base = Trail::discarding();
        state.enter_frame(Frame::new(&method, vec![Val::int(1)]), &mut base);
        let obj = state.new_object("C", &mut base);
        state.push(Val::int(5), &mut base).unwrap();
        assert!(base.is_empty());

        let before = snapshot(&state);
        let mut trail = Trail::new();
        mutate(&mut state, &mut trail, &mut solver, obj);
        state.enter_frame(Frame::new(&callee, Vec::new()), &mut trail);
        state.leave_frame(&mut trail).unwrap();
        state.advance().unwrap();
        let after = snapshot(&state);
        assert_ne!(before, after);

        assert_eq!(trail.replay(&mut state).unwrap(), 11);
        assert_eq!(state.heap.len(), 1);
        assert!(trail.is_empty());
        // The pc of the top frame is repositioned by the choice point.
        state.jump(0).unwrap();
        assert_eq!(snapshot(&state), before);

        mutate(&mut state, &mut trail, &mut solver, obj);
        state.advance().unwrap();
        assert_eq!(snapshot(&state), after)
    }
}
