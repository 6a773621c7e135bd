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

//! Symbolic arithmetic. Every operation folds eagerly when both
//! operands are constants, following the numeric semantics of the
//! machine (integral results wrap to the width of their type, float
//! results are rounded to single precision), and otherwise builds a
//! new term.

use crate::ir::{CmpKind, NumTy};
use crate::smt::smtlib::{Cmp, Constraint, Exp};

/// Raised for integral division or remainder by a constant zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DivisionByZero;

fn fold<F, G>(ty: NumTy, lhs: Exp, rhs: Exp, int_op: F, float_op: G, mk: fn(Box<Exp>, Box<Exp>) -> Exp) -> Exp
where
    F: Fn(i64, i64) -> i64,
    G: Fn(f64, f64) -> f64,
{
    match (&lhs, &rhs) {
        (Exp::Int(x), Exp::Int(y)) if ty.is_integral() => Exp::Int(ty.wrap(int_op(*x, *y))),
        (x, y) if x.is_constant() && y.is_constant() => {
            let x = x.as_num().map(|n| n.as_f64()).unwrap_or(0.0);
            let y = y.as_num().map(|n| n.as_f64()).unwrap_or(0.0);
            Exp::Float(ty.round(float_op(x, y)))
        }
        _ => mk(Box::new(lhs), Box::new(rhs)),
    }
}

fn is_zero(exp: &Exp) -> bool {
    matches!(exp, Exp::Int(0)) || matches!(exp, Exp::Float(x) if *x == 0.0)
}

fn is_one(exp: &Exp) -> bool {
    matches!(exp, Exp::Int(1)) || matches!(exp, Exp::Float(x) if *x == 1.0)
}

pub fn add(ty: NumTy, lhs: Exp, rhs: Exp) -> Exp {
    if is_zero(&rhs) && !lhs.is_constant() {
        return lhs;
    }
    if is_zero(&lhs) && !rhs.is_constant() {
        return rhs;
    }
    fold(ty, lhs, rhs, i64::wrapping_add, |x, y| x + y, Exp::Add)
}

pub fn sub(ty: NumTy, lhs: Exp, rhs: Exp) -> Exp {
    if is_zero(&rhs) && !lhs.is_constant() {
        return lhs;
    }
    fold(ty, lhs, rhs, i64::wrapping_sub, |x, y| x - y, Exp::Sub)
}

pub fn mul(ty: NumTy, lhs: Exp, rhs: Exp) -> Exp {
    if is_one(&rhs) && !lhs.is_constant() {
        return lhs;
    }
    if is_one(&lhs) && !rhs.is_constant() {
        return rhs;
    }
    fold(ty, lhs, rhs, i64::wrapping_mul, |x, y| x * y, Exp::Mul)
}

pub fn div(ty: NumTy, lhs: Exp, rhs: Exp) -> Result<Exp, DivisionByZero> {
    if ty.is_integral() && matches!(rhs, Exp::Int(0)) {
        return Err(DivisionByZero);
    }
    if is_one(&rhs) && !lhs.is_constant() {
        return Ok(lhs);
    }
    Ok(fold(ty, lhs, rhs, i64::wrapping_div, |x, y| x / y, Exp::Div))
}

pub fn rem(ty: NumTy, lhs: Exp, rhs: Exp) -> Result<Exp, DivisionByZero> {
    if ty.is_integral() && matches!(rhs, Exp::Int(0)) {
        return Err(DivisionByZero);
    }
    Ok(fold(ty, lhs, rhs, i64::wrapping_rem, |x, y| x % y, Exp::Rem))
}

pub fn neg(ty: NumTy, exp: Exp) -> Exp {
    match exp {
        Exp::Int(i) => Exp::Int(ty.wrap(i.wrapping_neg())),
        Exp::Float(x) => Exp::Float(-x),
        Exp::Neg(exp) => *exp,
        exp => Exp::Neg(Box::new(exp)),
    }
}

pub fn pow(ty: NumTy, base: Exp, exponent: Exp) -> Exp {
    match (&base, &exponent) {
        (Exp::Int(b), Exp::Int(e)) if ty.is_integral() && *e >= 0 => {
            Exp::Int(ty.wrap(b.wrapping_pow(u32::try_from(*e).unwrap_or(u32::MAX))))
        }
        (_, e) if is_one(e) => base,
        _ => fold(ty, base, exponent, |_, _| 0, f64::powf, Exp::Pow),
    }
}

/// Whether converting from `from` to `to` can change an integral
/// value.
fn narrows(from: NumTy, to: NumTy) -> bool {
    let (lo, hi) = to.bounds();
    let (from_lo, from_hi) = from.bounds();
    lo > from_lo || hi < from_hi
}

/// `exp` reduced modulo the width of `ty` into its range. The inner
/// remainder can be negative, hence the second one.
fn wrap_term(ty: NumTy, exp: Exp) -> Exp {
    let (lo, hi) = ty.bounds();
    let (lo, hi) = (lo as i64, hi as i64);
    let width = Exp::Int(hi - lo + 1);
    let shifted = sub(NumTy::Long, exp, Exp::Int(lo));
    let rem = Exp::Rem(Box::new(shifted), Box::new(width.clone()));
    let rem = Exp::Rem(Box::new(add(NumTy::Long, rem, width.clone())), Box::new(width));
    add(NumTy::Long, rem, Exp::Int(lo))
}

/// Conversions between numeric types. Symbolic integral values that
/// are narrowed wrap to the target width, and symbolic floating point
/// values converted to an integral type are truncated towards zero.
/// Out of range floating point values are not clamped.
pub fn convert(from: NumTy, to: NumTy, exp: Exp) -> Exp {
    match exp {
        Exp::Int(i) if to.is_integral() => Exp::Int(to.wrap(i)),
        Exp::Int(i) => Exp::Float(to.round(i as f64)),
        Exp::Float(x) if to.is_integral() => {
            let i = if to == NumTy::Long { x as i64 } else { x as i32 as i64 };
            Exp::Int(to.wrap(i))
        }
        Exp::Float(x) => Exp::Float(to.round(x)),
        exp if !to.is_integral() => exp,
        exp if !from.is_integral() => {
            let truncated = Exp::Sub(Box::new(exp.clone()), Box::new(Exp::Rem(Box::new(exp), Box::new(Exp::Float(1.0)))));
            if narrows(NumTy::Int, to) {
                wrap_term(to, truncated)
            } else {
                truncated
            }
        }
        exp if narrows(from, to) => wrap_term(to, exp),
        exp => exp,
    }
}

/// Build the constraint `lhs op rhs`, folded to a boolean constant if
/// neither side mentions a variable.
pub fn compare(op: Cmp, lhs: Exp, rhs: Exp) -> Constraint {
    let c = Constraint::Cmp(op, lhs, rhs);
    match c.as_bool() {
        Some(b) => Constraint::Bool(b),
        None => c,
    }
}

/// The result of a three-way comparison of two constants, or `None`
/// if either operand is symbolic.
pub fn compare3(kind: CmpKind, lhs: &Exp, rhs: &Exp) -> Option<i64> {
    match (lhs, rhs) {
        (Exp::Int(x), Exp::Int(y)) => Some(if x > y {
            1
        } else if x < y {
            -1
        } else {
            0
        }),
        (x, y) if x.is_constant() && y.is_constant() => {
            let x = x.as_num()?.as_f64();
            let y = y.as_num()?.as_f64();
            Some(if x.is_nan() || y.is_nan() {
                kind.nan_result()
            } else if x > y {
                1
            } else if x < y {
                -1
            } else {
                0
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::smtlib::{Num, Sym};

    fn x() -> Exp {
        Exp::Var(Sym::from_u32(0))
    }

    #[test]
    fn constants_fold_with_wrapping() {
        assert_eq!(add(NumTy::Int, Exp::Int(i32::MAX as i64), Exp::Int(1)), Exp::Int(i32::MIN as i64));
        assert_eq!(mul(NumTy::Long, Exp::Int(3), Exp::Int(4)), Exp::Int(12));
        assert_eq!(div(NumTy::Int, Exp::Int(i32::MIN as i64), Exp::Int(-1)), Ok(Exp::Int(i32::MIN as i64)));
        assert_eq!(div(NumTy::Long, Exp::Int(i64::MIN), Exp::Int(-1)), Ok(Exp::Int(i64::MIN)));
        assert_eq!(rem(NumTy::Int, Exp::Int(-7), Exp::Int(2)), Ok(Exp::Int(-1)));
        assert_eq!(pow(NumTy::Int, Exp::Int(2), Exp::Int(10)), Exp::Int(1024))
    }

    #[test]
    fn symbolic_operands_build_terms() {
        assert_eq!(add(NumTy::Int, x(), Exp::Int(2)), Exp::Add(Box::new(x()), Box::new(Exp::Int(2))));
        assert_eq!(add(NumTy::Int, x(), Exp::Int(0)), x());
        assert_eq!(neg(NumTy::Int, neg(NumTy::Int, x())), x());
        assert_eq!(div(NumTy::Int, x(), Exp::Int(0)), Err(DivisionByZero));
        assert_eq!(div(NumTy::Double, x(), Exp::Float(0.0)), Ok(Exp::Div(Box::new(x()), Box::new(Exp::Float(0.0)))))
    }

    #[test]
    fn float_results_are_single_precision() {
        assert_eq!(add(NumTy::Float, Exp::Float(0.1), Exp::Float(0.2)), Exp::Float((0.1f64 + 0.2f64) as f32 as f64));
        assert_eq!(convert(NumTy::Double, NumTy::Int, Exp::Float(f64::NAN)), Exp::Int(0));
        assert_eq!(convert(NumTy::Double, NumTy::Int, Exp::Float(1e20)), Exp::Int(i32::MAX as i64))
    }

    #[test]
    fn symbolic_narrowing_wraps() {
        let at = |exp: &Exp, v: Num| exp.eval(&[(Sym::from_u32(0), v)].iter().cloned().collect());
        let int = convert(NumTy::Long, NumTy::Int, x());
        assert_eq!(at(&int, Num::Int(1 << 31)), Some(Num::Int(i32::MIN as i64)));
        assert_eq!(at(&int, Num::Int(-1)), Some(Num::Int(-1)));
        assert_eq!(at(&int, Num::Int((1 << 32) + 5)), Some(Num::Int(5)));
        let byte = convert(NumTy::Int, NumTy::Byte, x());
        assert_eq!(at(&byte, Num::Int(200)), Some(Num::Int(-56)));
        let truncated = convert(NumTy::Double, NumTy::Long, x());
        assert_eq!(at(&truncated, Num::Float(-2.7)), Some(Num::Float(-2.0)));
        assert_eq!(convert(NumTy::Int, NumTy::Long, x()), x());
        assert_eq!(convert(NumTy::Char, NumTy::Int, x()), x());
        assert_eq!(convert(NumTy::Long, NumTy::Double, x()), x())
    }

    #[test]
    fn three_way_comparison_of_constants() {
        assert_eq!(compare3(CmpKind::Lcmp, &Exp::Int(5), &Exp::Int(0)), Some(1));
        assert_eq!(compare3(CmpKind::Fcmpl, &Exp::Float(f64::NAN), &Exp::Float(0.0)), Some(-1));
        assert_eq!(compare3(CmpKind::Dcmpg, &Exp::Float(f64::NAN), &Exp::Float(0.0)), Some(1));
        assert_eq!(compare3(CmpKind::Lcmp, &x(), &Exp::Int(0)), None);
        assert_eq!(compare(Cmp::Lt, Exp::Int(1), Exp::Int(2)), Constraint::Bool(true))
    }
}
