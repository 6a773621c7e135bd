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

//! The heap holds every object and array a path has seen, whether it
//! was allocated by the program or stands for an unknown input.
//!
//! Objects of the second kind are *symbolic*: their fields and array
//! elements are created on first access as fresh symbolic values,
//! named after the access path that reached them (`p.next`,
//! `xs.length`, `xs[i]`). Generation is memoized in the object, so
//! reading the same field twice yields the same variable, and it is
//! never undone by backtracking. An input that has been discovered
//! once stays discovered on every later path, which keeps the
//! variable names of a search stable.
//!
//! Array elements are entries keyed by an index term. The entries of
//! an array on one path have pairwise different indices: before an
//! index without an entry of its own is used, the path decides
//! whether it equals one of the [aliases](Heap::aliases) already
//! present. Entering a generated element is part of the path and is
//! undone on backtracking, while the generated value itself is kept.
//!
//! Objects allocated by the program are released again when the
//! allocation is undone, and their slots are reused.
//!
//! Every reference carries an `isNull` boolean term, constant zero for
//! allocated objects and a fresh variable for symbolic ones.

use id_arena::{Arena, Id};
use std::collections::BTreeMap;
use std::ops::Index;

use crate::error::ExecError;
use crate::ir::{FieldRef, NumTy, Ty, Val};
use crate::primop;
use crate::smt::smtlib::{Cmp, Constraint, Exp};
use crate::smt::{ConstraintSystem, Domain, Symbols};

pub type RefId = Id<HeapObject>;

#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub class: String,
    pub name: String,
    pub is_null: Exp,
    pub symbolic: bool,
    fields: BTreeMap<String, Val>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    pub elem: Ty,
    pub name: String,
    pub is_null: Exp,
    pub symbolic: bool,
    pub length: Exp,
    /// Elements that have been written or read on the current path,
    /// keyed by index term.
    elements: Vec<(Exp, Val)>,
    generated: Vec<(Exp, Val)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HeapObject {
    Object(Object),
    Array(Array),
}

impl HeapObject {
    pub fn name(&self) -> &str {
        match self {
            HeapObject::Object(obj) => &obj.name,
            HeapObject::Array(arr) => &arr.name,
        }
    }

    pub fn is_null(&self) -> &Exp {
        match self {
            HeapObject::Object(obj) => &obj.is_null,
            HeapObject::Array(arr) => &arr.is_null,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        match self {
            HeapObject::Object(obj) => obj.symbolic,
            HeapObject::Array(arr) => arr.symbolic,
        }
    }

    pub fn class_name(&self) -> String {
        match self {
            HeapObject::Object(obj) => obj.class.clone(),
            HeapObject::Array(arr) => format!("{}[]", arr.elem),
        }
    }
}

#[derive(Clone)]
pub struct Heap {
    arena: Arena<HeapObject>,
    allocated: usize,
    free: Vec<RefId>,
}

impl Default for Heap {
    fn default() -> Self {
        Heap { arena: Arena::new(), allocated: 0, free: Vec::new() }
    }
}

impl Index<RefId> for Heap {
    type Output = HeapObject;

    fn index(&self, i: RefId) -> &Self::Output {
        &self.arena[i]
    }
}

/// Create a fresh symbolic value of type `ty`, named `name`. Numeric
/// types become solver variables, reference types become symbolic
/// heap objects whose contents are generated lazily.
pub fn symbolic_value(
    heap: &mut Heap,
    name: &str,
    ty: &Ty,
    symbols: &mut Symbols,
    solver: &mut dyn ConstraintSystem,
) -> Val {
    match ty {
        Ty::Num(num_ty) => Val::Num(fresh(name.to_string(), *num_ty, Domain::Full, symbols, solver)),
        Ty::Object(class) => {
            let is_null = fresh(format!("{}.isNull", name), NumTy::Boolean, Domain::Full, symbols, solver);
            let obj = Object {
                class: class.clone(),
                name: name.to_string(),
                is_null,
                symbolic: true,
                fields: BTreeMap::new(),
            };
            Val::Ref(heap.alloc(HeapObject::Object(obj)))
        }
        Ty::Array(elem) => {
            let is_null = fresh(format!("{}.isNull", name), NumTy::Boolean, Domain::Full, symbols, solver);
            let length = fresh(format!("{}.length", name), NumTy::Int, Domain::NonNegative, symbols, solver);
            let arr = Array {
                elem: (**elem).clone(),
                name: name.to_string(),
                is_null,
                symbolic: true,
                length,
                elements: Vec::new(),
                generated: Vec::new(),
            };
            Val::Ref(heap.alloc(HeapObject::Array(arr)))
        }
    }
}

fn fresh(name: String, ty: NumTy, domain: Domain, symbols: &mut Symbols, solver: &mut dyn ConstraintSystem) -> Exp {
    let v = symbols.fresh(name, ty);
    solver.declare(v, ty, domain);
    Exp::Var(v)
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    fn alloc(&mut self, obj: HeapObject) -> RefId {
        match self.free.pop() {
            Some(id) => {
                self.arena[id] = obj;
                id
            }
            None => self.arena.alloc(obj),
        }
    }

    /// Undo the most recent allocation by the program that is still
    /// live. The slot is reused by the next allocation.
    pub fn release(&mut self, id: RefId) -> Result<(), ExecError> {
        if self.allocated == 0 || self.free.contains(&id) || self[id].is_symbolic() {
            return Err(ExecError::Inconsistent(format!("release of {} which is not allocated", self[id].name())));
        }
        self.allocated -= 1;
        self.free.push(id);
        Ok(())
    }

    pub fn new_object(&mut self, class: &str) -> RefId {
        self.allocated += 1;
        let obj = Object {
            class: class.to_string(),
            name: format!("{}@{}", class, self.allocated),
            is_null: Exp::Int(0),
            symbolic: false,
            fields: BTreeMap::new(),
        };
        self.alloc(HeapObject::Object(obj))
    }

    pub fn new_array(&mut self, elem: Ty, length: Exp) -> RefId {
        self.allocated += 1;
        let arr = Array {
            name: format!("{}[]@{}", elem, self.allocated),
            elem,
            is_null: Exp::Int(0),
            symbolic: false,
            length,
            elements: Vec::new(),
            generated: Vec::new(),
        };
        self.alloc(HeapObject::Array(arr))
    }

    /// An allocated array holding the given values at indices `0..`.
    pub fn new_array_from(&mut self, elem: Ty, values: Vec<Val>) -> RefId {
        let id = self.new_array(elem, Exp::Int(values.len() as i64));
        if let HeapObject::Array(arr) = &mut self.arena[id] {
            arr.elements = values.into_iter().enumerate().map(|(i, v)| (Exp::Int(i as i64), v)).collect()
        }
        id
    }

    /// Live objects, leaving out released slots.
    pub fn objects(&self) -> impl Iterator<Item = (RefId, &HeapObject)> {
        self.arena.iter().filter(move |(id, _)| !self.free.contains(id))
    }

    pub fn len(&self) -> usize {
        self.arena.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The constraint that the reference is null (or, with `null`
    /// false, that it is not), folded to a constant for allocated
    /// objects.
    pub fn null_test(&self, id: RefId, null: bool) -> Constraint {
        match self[id].is_null() {
            Exp::Int(i) => Constraint::Bool((*i == 1) == null),
            is_null => Constraint::cmp(Cmp::Eq, is_null.clone(), Exp::Int(null as i64)),
        }
    }

    fn object_mut(&mut self, id: RefId) -> Result<&mut Object, ExecError> {
        match &mut self.arena[id] {
            HeapObject::Object(obj) => Ok(obj),
            HeapObject::Array(_) => Err(ExecError::Type("field access on an array")),
        }
    }

    fn array(&self, id: RefId) -> Result<&Array, ExecError> {
        match &self.arena[id] {
            HeapObject::Array(arr) => Ok(arr),
            HeapObject::Object(_) => Err(ExecError::Type("array access on an object")),
        }
    }

    fn array_mut(&mut self, id: RefId) -> Result<&mut Array, ExecError> {
        match &mut self.arena[id] {
            HeapObject::Array(arr) => Ok(arr),
            HeapObject::Object(_) => Err(ExecError::Type("array access on an object")),
        }
    }

    /// Make sure a field of a symbolic object has a value, generating
    /// one if this is the first access.
    fn materialize_field(
        &mut self,
        id: RefId,
        field: &FieldRef,
        symbols: &mut Symbols,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<(), ExecError> {
        let obj = self.object_mut(id)?;
        if !obj.symbolic || obj.fields.contains_key(&field.name) {
            return Ok(());
        }
        let name = format!("{}.{}", obj.name, field.name);
        let val = symbolic_value(self, &name, &field.ty, symbols, solver);
        self.object_mut(id)?.fields.insert(field.name.clone(), val);
        Ok(())
    }

    pub fn get_field(
        &mut self,
        id: RefId,
        field: &FieldRef,
        symbols: &mut Symbols,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<Val, ExecError> {
        self.materialize_field(id, field, symbols, solver)?;
        let obj = self.object_mut(id)?;
        Ok(obj.fields.get(&field.name).cloned().unwrap_or_else(|| field.ty.default_value()))
    }

    /// Write a field, returning what it held before. `None` means the
    /// field was never written, so it read as the type default.
    pub fn put_field(
        &mut self,
        id: RefId,
        field: &FieldRef,
        val: Val,
        symbols: &mut Symbols,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<Option<Val>, ExecError> {
        self.materialize_field(id, field, symbols, solver)?;
        Ok(self.object_mut(id)?.fields.insert(field.name.clone(), val))
    }

    pub fn restore_field(&mut self, id: RefId, field: &str, prior: Option<Val>) -> Result<(), ExecError> {
        let obj = self.object_mut(id)?;
        match prior {
            Some(val) => obj.fields.insert(field.to_string(), val),
            None => obj.fields.remove(field),
        };
        Ok(())
    }

    pub fn length(&self, id: RefId) -> Result<Exp, ExecError> {
        match &self.arena[id] {
            HeapObject::Array(arr) => Ok(arr.length.clone()),
            HeapObject::Object(_) => Err(ExecError::Type("length of an object")),
        }
    }

    /// The indices of entries that `index` might refer to on this
    /// path, those that are not provably different from it. Empty if
    /// `index` has an entry of its own.
    pub fn aliases(&self, id: RefId, index: &Exp) -> Result<Vec<Exp>, ExecError> {
        let arr = self.array(id)?;
        if arr.elements.iter().any(|(i, _)| i == index) {
            return Ok(Vec::new());
        }
        Ok(arr
            .elements
            .iter()
            .map(|(i, _)| i)
            .filter(|i| primop::compare(Cmp::Eq, index.clone(), (*i).clone()).as_bool() != Some(false))
            .cloned()
            .collect())
    }

    /// Read the element at `index`, which must not alias another entry.
    /// A symbolic array gains an entry holding the generated element
    /// if there was none, in which case the returned flag is set and
    /// the caller records the new entry on its trail.
    pub fn load_element(
        &mut self,
        id: RefId,
        index: &Exp,
        symbols: &mut Symbols,
        solver: &mut dyn ConstraintSystem,
    ) -> Result<(Val, bool), ExecError> {
        let arr = self.array_mut(id)?;
        if let Some((_, val)) = arr.elements.iter().find(|(i, _)| i == index) {
            return Ok((val.clone(), false));
        }
        if !arr.symbolic {
            return Ok((arr.elem.default_value(), false));
        }
        let generated = arr.generated.iter().find(|(i, _)| i == index).map(|(_, val)| val.clone());
        let val = match generated {
            Some(val) => val,
            None => {
                let name = format!("{}[{}]", arr.name, symbols.render_exp(index));
                let elem = arr.elem.clone();
                let val = symbolic_value(self, &name, &elem, symbols, solver);
                self.array_mut(id)?.generated.push((index.clone(), val.clone()));
                val
            }
        };
        self.array_mut(id)?.elements.push((index.clone(), val.clone()));
        Ok((val, true))
    }

    /// Write the element at `index`, returning what its entry held
    /// before. `None` means there was no entry.
    pub fn store_element(&mut self, id: RefId, index: Exp, val: Val) -> Result<Option<Val>, ExecError> {
        let arr = self.array_mut(id)?;
        match arr.elements.iter_mut().find(|(i, _)| *i == index) {
            Some((_, slot)) => Ok(Some(std::mem::replace(slot, val))),
            None => {
                arr.elements.push((index, val));
                Ok(None)
            }
        }
    }

    pub fn restore_element(&mut self, id: RefId, index: &Exp, prior: Option<Val>) -> Result<(), ExecError> {
        let arr = self.array_mut(id)?;
        let pos = arr.elements.iter().position(|(i, _)| i == index);
        match (pos, prior) {
            (Some(pos), Some(val)) => arr.elements[pos].1 = val,
            (Some(pos), None) => {
                arr.elements.remove(pos);
            }
            (None, Some(val)) => arr.elements.push((index.clone(), val)),
            (None, None) => (),
        }
        Ok(())
    }
}
