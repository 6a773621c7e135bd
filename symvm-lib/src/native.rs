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

//! Shims for methods the program calls but does not define. An
//! `Invoke` whose target is missing from the program is looked up
//! here, and the handler computes the result directly from the
//! argument values. Overloads are told apart by their descriptor, as
//! in `java/lang/Math.abs(I)I`.

use std::collections::HashMap;

use crate::error::ExecError;
use crate::ir::{NumTy, Val};
use crate::primop;
use crate::smt::smtlib::Exp;

pub type NativeResult = Result<Option<Val>, ExecError>;

pub trait Native: Send + Sync {
    /// Number of operand stack values consumed.
    fn arity(&self) -> usize;

    fn call(&self, args: &[Val]) -> NativeResult;
}

struct Shim<F> {
    arity: usize,
    f: F,
}

impl<F> Native for Shim<F>
where
    F: Fn(&[Val]) -> NativeResult + Send + Sync,
{
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, args: &[Val]) -> NativeResult {
        (self.f)(args)
    }
}

#[derive(Default)]
pub struct Natives {
    handlers: HashMap<String, Box<dyn Native>>,
}

fn num_arg(args: &[Val], i: usize) -> Result<&Exp, ExecError> {
    args.get(i).and_then(Val::as_exp).ok_or(ExecError::Type("expected a numeric argument"))
}

fn abs(ty: NumTy) -> impl Fn(&[Val]) -> NativeResult {
    move |args: &[Val]| match num_arg(args, 0)? {
        Exp::Int(i) => Ok(Some(Val::int(ty.wrap(i.wrapping_abs())))),
        Exp::Float(x) => Ok(Some(Val::Num(Exp::Float(ty.round(x.abs()))))),
        _ => Err(ExecError::Native("abs of a symbolic value".to_string())),
    }
}

fn max(args: &[Val]) -> NativeResult {
    match (num_arg(args, 0)?, num_arg(args, 1)?) {
        (Exp::Int(x), Exp::Int(y)) => Ok(Some(Val::int(*x.max(y)))),
        _ => Err(ExecError::Native("max of non-constant values".to_string())),
    }
}

impl Natives {
    pub fn new() -> Self {
        Natives::default()
    }

    /// The shims for the parts of `java/lang/Math` that can be
    /// expressed in the term language.
    pub fn standard() -> Self {
        let mut natives = Natives::new();
        natives.register("java/lang/Math.pow(DD)D", 2, |args| {
            Ok(Some(Val::Num(primop::pow(NumTy::Double, num_arg(args, 0)?.clone(), num_arg(args, 1)?.clone()))))
        });
        natives.register("java/lang/Math.abs(I)I", 1, abs(NumTy::Int));
        natives.register("java/lang/Math.abs(J)J", 1, abs(NumTy::Long));
        natives.register("java/lang/Math.abs(F)F", 1, abs(NumTy::Float));
        natives.register("java/lang/Math.abs(D)D", 1, abs(NumTy::Double));
        natives.register("java/lang/Math.max(II)I", 2, max);
        natives.register("java/lang/Math.max(JJ)J", 2, max);
        natives
    }

    pub fn register<F>(&mut self, name: &str, arity: usize, f: F)
    where
        F: Fn(&[Val]) -> NativeResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(Shim { arity, f }));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Native> {
        self.handlers.get(name).map(|h| h.as_ref())
    }
}
