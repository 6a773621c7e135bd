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

//! Generators supply concrete test inputs where symbolic values are
//! not wanted. A slot bound to a generator is explored once per value
//! the generator provides, each value becoming one alternative of a
//! choice point.
//!
//! A search keeps one template per generator name and hands every
//! choice point its own reset copy, so two visits to the same input
//! see the same sequence of values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt;

use crate::heap::Heap;
use crate::ir::{NumTy, Ty, Val};
use crate::smt::smtlib::{Exp, Num};

/// A value produced by a generator, before it is placed into the
/// state of a path.
#[derive(Clone, Debug, PartialEq)]
pub enum GenValue {
    Num(Num),
    Null,
    Array(NumTy, Vec<Num>),
}

impl GenValue {
    /// Turn the value into something a path can hold. Only arrays need
    /// the heap.
    pub fn into_val(self, heap: &mut Heap) -> Val {
        match self {
            GenValue::Num(n) => Val::Num(Exp::from_num(n)),
            GenValue::Null => Val::Null,
            GenValue::Array(ty, nums) => {
                let values = nums.into_iter().map(|n| Val::Num(Exp::from_num(n))).collect();
                Val::Ref(heap.new_array_from(Ty::Num(ty), values))
            }
        }
    }
}

impl fmt::Display for GenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenValue::Num(n) => write!(f, "{}", n),
            GenValue::Null => write!(f, "null"),
            GenValue::Array(_, nums) => {
                write!(f, "[")?;
                for (i, n) in nums.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?
                    }
                    write!(f, "{}", n)?
                }
                write!(f, "]")
            }
        }
    }
}

pub trait Generator: Send {
    fn name(&self) -> &str;

    fn has_another_object(&self) -> bool;

    /// The next value, or `None` once the generator is exhausted.
    fn provide_object(&mut self) -> Option<GenValue>;

    /// Rewind to the first value.
    fn reset(&mut self);

    /// Whether provided values need the heap before they can be used.
    fn object_needs_conversion(&self) -> bool {
        false
    }

    fn boxed_clone(&self) -> Box<dyn Generator>;
}

/// Generators by name, as referenced from `Generate` instructions and
/// parameter bindings.
#[derive(Default)]
pub struct Generators {
    templates: HashMap<String, Box<dyn Generator>>,
}

impl Generators {
    pub fn new() -> Self {
        Generators::default()
    }

    pub fn register(&mut self, generator: Box<dyn Generator>) {
        self.templates.insert(generator.name().to_string(), generator);
    }

    /// A fresh, rewound copy of the named generator.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Generator>> {
        self.templates.get(name).map(|template| {
            let mut generator = template.boxed_clone();
            generator.reset();
            generator
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

/// Provides a fixed list of values in order.
#[derive(Clone)]
pub struct ValueList {
    name: String,
    values: Vec<GenValue>,
    next: usize,
}

impl ValueList {
    pub fn new(name: &str, values: Vec<GenValue>) -> Self {
        ValueList { name: name.to_string(), values, next: 0 }
    }

    pub fn ints(name: &str, values: &[i64]) -> Self {
        ValueList::new(name, values.iter().map(|i| GenValue::Num(Num::Int(*i))).collect())
    }
}

impl Generator for ValueList {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_another_object(&self) -> bool {
        self.next < self.values.len()
    }

    fn provide_object(&mut self) -> Option<GenValue> {
        let value = self.values.get(self.next).cloned();
        self.next += 1;
        value
    }

    fn reset(&mut self) {
        self.next = 0
    }

    fn object_needs_conversion(&self) -> bool {
        self.values.iter().any(|v| matches!(v, GenValue::Array(..)))
    }

    fn boxed_clone(&self) -> Box<dyn Generator> {
        Box::new(self.clone())
    }
}

/// Every integer in `lo..=hi`, counting up.
#[derive(Clone)]
pub struct IntRange {
    name: String,
    lo: i64,
    hi: i64,
    next: i64,
}

impl IntRange {
    pub fn new(name: &str, lo: i64, hi: i64) -> Self {
        IntRange { name: name.to_string(), lo, hi, next: lo }
    }
}

impl Generator for IntRange {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_another_object(&self) -> bool {
        self.next <= self.hi
    }

    fn provide_object(&mut self) -> Option<GenValue> {
        if self.next > self.hi {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(GenValue::Num(Num::Int(i)))
    }

    fn reset(&mut self) {
        self.next = self.lo
    }

    fn boxed_clone(&self) -> Box<dyn Generator> {
        Box::new(self.clone())
    }
}

/// A fixed number of pseudo-random integer arrays. The sequence is
/// determined by the seed, and resetting replays it.
#[derive(Clone)]
pub struct RandomArrays {
    name: String,
    seed: u64,
    count: usize,
    max_len: usize,
    lo: i64,
    hi: i64,
    produced: usize,
    rng: StdRng,
}

impl RandomArrays {
    pub fn new(name: &str, seed: u64, count: usize, max_len: usize, lo: i64, hi: i64) -> Self {
        RandomArrays {
            name: name.to_string(),
            seed,
            count,
            max_len,
            lo,
            hi: hi.max(lo),
            produced: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Generator for RandomArrays {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_another_object(&self) -> bool {
        self.produced < self.count
    }

    fn provide_object(&mut self) -> Option<GenValue> {
        if self.produced >= self.count {
            return None;
        }
        self.produced += 1;
        let len = self.rng.gen_range(0, self.max_len + 1);
        let nums = (0..len).map(|_| Num::Int(self.rng.gen_range(self.lo, self.hi + 1))).collect();
        Some(GenValue::Array(NumTy::Int, nums))
    }

    fn reset(&mut self) {
        self.produced = 0;
        self.rng = StdRng::seed_from_u64(self.seed)
    }

    fn object_needs_conversion(&self) -> bool {
        true
    }

    fn boxed_clone(&self) -> Box<dyn Generator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(generator: &mut dyn Generator) -> Vec<GenValue> {
        let mut values = Vec::new();
        while generator.has_another_object() {
            values.push(generator.provide_object().unwrap())
        }
        values
    }

    #[test]
    fn range_is_exhausted_and_reset() {
        let mut range = IntRange::new("r", 1, 3);
        assert_eq!(drain(&mut range).len(), 3);
        assert_eq!(range.provide_object(), None);
        range.reset();
        assert_eq!(range.provide_object(), Some(GenValue::Num(Num::Int(1))))
    }

    #[test]
    fn random_arrays_replay_after_reset() {
        let mut arrays = RandomArrays::new("a", 42, 5, 4, -10, 10);
        let first = drain(&mut arrays);
        arrays.reset();
        assert_eq!(first, drain(&mut arrays));
        for value in first {
            match value {
                GenValue::Array(_, nums) => {
                    assert!(nums.len() <= 4);
                    assert!(nums.iter().all(|n| matches!(n, Num::Int(i) if (-10..=10).contains(i))))
                }
                v => panic!("unexpected {:?}", v),
            }
        }
    }

    #[test]
    fn instances_are_independent() {
        let mut generators = Generators::new();
        generators.register(Box::new(ValueList::ints("v", &[7, 8])));
        let mut a = generators.instantiate("v").unwrap();
        a.provide_object();
        let mut b = generators.instantiate("v").unwrap();
        assert_eq!(b.provide_object(), Some(GenValue::Num(Num::Int(7))));
        assert_eq!(a.provide_object(), Some(GenValue::Num(Num::Int(8))));
        assert!(generators.instantiate("w").is_none())
    }

    #[test]
    fn arrays_are_converted_into_the_heap() {
        let mut heap = Heap::new();
        match GenValue::Array(NumTy::Int, vec![Num::Int(1), Num::Int(2)]).into_val(&mut heap) {
            Val::Ref(r) => assert_eq!(heap.length(r), Ok(Exp::Int(2))),
            v => panic!("unexpected {:?}", v),
        }
    }
}
