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

//! The term language shared by the interpreter and the constraint
//! system. Terms are plain data, so a path condition can be handed
//! to another thread or kept after the search that produced it has
//! finished.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A symbolic variable. The name and type of each variable are kept
/// in a [crate::smt::Symbols] table owned by the search.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sym {
    pub(crate) id: u32,
}

impl Sym {
    pub fn from_u32(id: u32) -> Self {
        Sym { id }
    }

    pub fn as_u32(self) -> u32 {
        self.id
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id)
    }
}

/// A concrete number, as found in models and folded constants.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(x) => x,
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(i) => write!(f, "{}", i),
            Num::Float(x) => write!(f, "{:?}", x),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Exp {
    Var(Sym),
    Int(i64),
    Float(f64),
    Add(Box<Exp>, Box<Exp>),
    Sub(Box<Exp>, Box<Exp>),
    Mul(Box<Exp>, Box<Exp>),
    Div(Box<Exp>, Box<Exp>),
    Rem(Box<Exp>, Box<Exp>),
    Pow(Box<Exp>, Box<Exp>),
    Neg(Box<Exp>),
}

impl Exp {
    pub fn is_constant(&self) -> bool {
        matches!(self, Exp::Int(_) | Exp::Float(_))
    }

    pub fn as_num(&self) -> Option<Num> {
        match self {
            Exp::Int(i) => Some(Num::Int(*i)),
            Exp::Float(x) => Some(Num::Float(*x)),
            _ => None,
        }
    }

    pub fn from_num(n: Num) -> Self {
        match n {
            Num::Int(i) => Exp::Int(i),
            Num::Float(x) => Exp::Float(x),
        }
    }

    /// Collect the variables of the expression, in order of first
    /// occurrence and without duplicates.
    pub fn collect_variables(&self, vars: &mut Vec<Sym>) {
        use Exp::*;
        match self {
            Var(v) => {
                if !vars.contains(v) {
                    vars.push(*v)
                }
            }
            Int(_) | Float(_) => (),
            Neg(exp) => exp.collect_variables(vars),
            Add(lhs, rhs) | Sub(lhs, rhs) | Mul(lhs, rhs) | Div(lhs, rhs) | Rem(lhs, rhs) | Pow(lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars)
            }
        }
    }

    pub fn collect_constants(&self, nums: &mut Vec<Num>) {
        use Exp::*;
        match self {
            Var(_) => (),
            Int(i) => nums.push(Num::Int(*i)),
            Float(x) => nums.push(Num::Float(*x)),
            Neg(exp) => exp.collect_constants(nums),
            Add(lhs, rhs) | Sub(lhs, rhs) | Mul(lhs, rhs) | Div(lhs, rhs) | Rem(lhs, rhs) | Pow(lhs, rhs) => {
                lhs.collect_constants(nums);
                rhs.collect_constants(nums)
            }
        }
    }

    /// Evaluate under an assignment. Integer arithmetic is exact;
    /// `None` is returned for unassigned variables, overflow and
    /// division by zero.
    pub fn eval(&self, model: &HashMap<Sym, Num>) -> Option<Num> {
        use Exp::*;
        match self {
            Var(v) => model.get(v).copied(),
            Int(i) => Some(Num::Int(*i)),
            Float(x) => Some(Num::Float(*x)),
            Neg(exp) => match exp.eval(model)? {
                Num::Int(i) => i.checked_neg().map(Num::Int),
                Num::Float(x) => Some(Num::Float(-x)),
            },
            Add(lhs, rhs) => binary(lhs.eval(model)?, rhs.eval(model)?, i64::checked_add, |x, y| x + y),
            Sub(lhs, rhs) => binary(lhs.eval(model)?, rhs.eval(model)?, i64::checked_sub, |x, y| x - y),
            Mul(lhs, rhs) => binary(lhs.eval(model)?, rhs.eval(model)?, i64::checked_mul, |x, y| x * y),
            Div(lhs, rhs) => binary(lhs.eval(model)?, rhs.eval(model)?, i64::checked_div, |x, y| x / y),
            Rem(lhs, rhs) => binary(lhs.eval(model)?, rhs.eval(model)?, i64::checked_rem, |x, y| x % y),
            Pow(lhs, rhs) => match (lhs.eval(model)?, rhs.eval(model)?) {
                (Num::Int(base), Num::Int(exp)) if exp >= 0 => {
                    base.checked_pow(u32::try_from(exp).ok()?).map(Num::Int)
                }
                (base, exp) => Some(Num::Float(base.as_f64().powf(exp.as_f64()))),
            },
        }
    }
}

fn binary<F, G>(lhs: Num, rhs: Num, int_op: F, float_op: G) -> Option<Num>
where
    F: Fn(i64, i64) -> Option<i64>,
    G: Fn(f64, f64) -> f64,
{
    match (lhs, rhs) {
        (Num::Int(x), Num::Int(y)) => int_op(x, y).map(Num::Int),
        (x, y) => {
            let result = float_op(x.as_f64(), y.as_f64());
            if result.is_nan() {
                None
            } else {
                Some(Num::Float(result))
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub fn negate(self) -> Self {
        use Cmp::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Le => Gt,
            Gt => Le,
            Ge => Lt,
        }
    }

    /// The comparison with its operands exchanged, so that `a < b`
    /// becomes `b > a`.
    pub fn swap(self) -> Self {
        use Cmp::*;
        match self {
            Eq => Eq,
            Ne => Ne,
            Lt => Gt,
            Le => Ge,
            Gt => Lt,
            Ge => Le,
        }
    }

    pub fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        use Cmp::*;
        match self {
            Eq => lhs == rhs,
            Ne => lhs != rhs,
            Lt => lhs < rhs,
            Le => lhs <= rhs,
            Gt => lhs > rhs,
            Ge => lhs >= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        use Cmp::*;
        match self {
            Eq => "=",
            Ne => "distinct",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
        }
    }
}

/// A formula over terms. Choice points describe each of their
/// alternatives with one of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    Bool(bool),
    Cmp(Cmp, Exp, Exp),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
}

impl Constraint {
    pub fn cmp(op: Cmp, lhs: Exp, rhs: Exp) -> Self {
        Constraint::Cmp(op, lhs, rhs)
    }

    /// Negation, pushed down to the comparisons.
    pub fn negate(&self) -> Self {
        use Constraint::*;
        match self {
            Bool(b) => Bool(!b),
            Cmp(op, lhs, rhs) => Cmp(op.negate(), lhs.clone(), rhs.clone()),
            And(cs) => Or(cs.iter().map(Constraint::negate).collect()),
            Or(cs) => And(cs.iter().map(Constraint::negate).collect()),
        }
    }

    /// If the constraint mentions no variables, its truth value.
    pub fn as_bool(&self) -> Option<bool> {
        self.eval(&HashMap::new())
    }

    pub fn eval(&self, model: &HashMap<Sym, Num>) -> Option<bool> {
        use Constraint::*;
        match self {
            Bool(b) => Some(*b),
            Cmp(op, lhs, rhs) => match (lhs.eval(model)?, rhs.eval(model)?) {
                (Num::Int(x), Num::Int(y)) => Some(op.holds(x, y)),
                (x, y) => Some(op.holds(x.as_f64(), y.as_f64())),
            },
            And(cs) => {
                for c in cs {
                    if !c.eval(model)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            Or(cs) => {
                for c in cs {
                    if c.eval(model)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
        }
    }

    pub fn collect_variables(&self, vars: &mut Vec<Sym>) {
        use Constraint::*;
        match self {
            Bool(_) => (),
            Cmp(_, lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars)
            }
            And(cs) | Or(cs) => cs.iter().for_each(|c| c.collect_variables(vars)),
        }
    }

    pub fn collect_constants(&self, nums: &mut Vec<Num>) {
        use Constraint::*;
        match self {
            Bool(_) => (),
            Cmp(_, lhs, rhs) => {
                lhs.collect_constants(nums);
                rhs.collect_constants(nums)
            }
            And(cs) | Or(cs) => cs.iter().for_each(|c| c.collect_constants(nums)),
        }
    }

    /// Render the constraint with variables named by `name`.
    pub fn display<'a, F: Fn(Sym) -> String>(&'a self, name: &'a F) -> Named<'a, F> {
        Named { constraint: self, name }
    }
}

pub struct Named<'a, F> {
    constraint: &'a Constraint,
    name: &'a F,
}

pub struct NamedExp<'a, F> {
    exp: &'a Exp,
    name: &'a F,
}

impl Exp {
    pub fn display<'a, F: Fn(Sym) -> String>(&'a self, name: &'a F) -> NamedExp<'a, F> {
        NamedExp { exp: self, name }
    }
}

fn write_exp<F: Fn(Sym) -> String>(f: &mut fmt::Formatter<'_>, exp: &Exp, name: &F) -> fmt::Result {
    use Exp::*;
    let op = match exp {
        Var(v) => return write!(f, "{}", name(*v)),
        Int(i) => return write!(f, "{}", i),
        Float(x) => return write!(f, "{:?}", x),
        Neg(exp) => {
            write!(f, "(- ")?;
            write_exp(f, exp, name)?;
            return write!(f, ")");
        }
        Add(lhs, rhs) => ("+", lhs, rhs),
        Sub(lhs, rhs) => ("-", lhs, rhs),
        Mul(lhs, rhs) => ("*", lhs, rhs),
        Div(lhs, rhs) => ("div", lhs, rhs),
        Rem(lhs, rhs) => ("rem", lhs, rhs),
        Pow(lhs, rhs) => ("^", lhs, rhs),
    };
    write!(f, "({} ", op.0)?;
    write_exp(f, op.1, name)?;
    write!(f, " ")?;
    write_exp(f, op.2, name)?;
    write!(f, ")")
}

fn write_constraint<F: Fn(Sym) -> String>(f: &mut fmt::Formatter<'_>, c: &Constraint, name: &F) -> fmt::Result {
    use Constraint::*;
    match c {
        Bool(b) => write!(f, "{}", b),
        Cmp(op, lhs, rhs) => {
            write!(f, "({} ", op.symbol())?;
            write_exp(f, lhs, name)?;
            write!(f, " ")?;
            write_exp(f, rhs, name)?;
            write!(f, ")")
        }
        And(cs) | Or(cs) => {
            write!(f, "({}", if matches!(c, And(_)) { "and" } else { "or" })?;
            for c in cs {
                write!(f, " ")?;
                write_constraint(f, c, name)?
            }
            write!(f, ")")
        }
    }
}

impl<'a, F: Fn(Sym) -> String> fmt::Display for Named<'a, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_constraint(f, self.constraint, self.name)
    }
}

impl<'a, F: Fn(Sym) -> String> fmt::Display for NamedExp<'a, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_exp(f, self.exp, self.name)
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_exp(f, self, &|v: Sym| v.to_string())
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_constraint(f, self, &|v: Sym| v.to_string())
    }
}
