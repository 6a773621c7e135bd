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

//! Linear normal forms and per-variable intervals, used by the
//! reference solver to decide the single-variable linear fragment
//! exactly.

use std::collections::BTreeMap;

use super::smtlib::{Cmp, Exp, Sym};

/// `sum(coeffs[v] * v) + constant`
#[derive(Clone, Debug, PartialEq)]
pub struct Linear {
    pub coeffs: BTreeMap<Sym, f64>,
    pub constant: f64,
}

impl Linear {
    fn constant(k: f64) -> Self {
        Linear { coeffs: BTreeMap::new(), constant: k }
    }

    fn scale(mut self, k: f64) -> Self {
        for coeff in self.coeffs.values_mut() {
            *coeff *= k
        }
        self.constant *= k;
        self
    }

    fn add(mut self, other: Linear) -> Self {
        for (v, coeff) in other.coeffs {
            *self.coeffs.entry(v).or_insert(0.0) += coeff
        }
        self.coeffs.retain(|_, coeff| *coeff != 0.0);
        self.constant += other.constant;
        self
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }
}

/// Put an expression into linear form, or return `None` if it is not
/// linear. Division is never treated as linear, as integer division
/// truncates.
pub fn linearize(exp: &Exp) -> Option<Linear> {
    use Exp::*;
    match exp {
        Var(v) => {
            let mut coeffs = BTreeMap::new();
            coeffs.insert(*v, 1.0);
            Some(Linear { coeffs, constant: 0.0 })
        }
        Int(i) => Some(Linear::constant(*i as f64)),
        Float(x) => Some(Linear::constant(*x)),
        Neg(exp) => Some(linearize(exp)?.scale(-1.0)),
        Add(lhs, rhs) => Some(linearize(lhs)?.add(linearize(rhs)?)),
        Sub(lhs, rhs) => Some(linearize(lhs)?.add(linearize(rhs)?.scale(-1.0))),
        Mul(lhs, rhs) => {
            let lhs = linearize(lhs)?;
            let rhs = linearize(rhs)?;
            if lhs.is_constant() {
                Some(rhs.scale(lhs.constant))
            } else if rhs.is_constant() {
                Some(lhs.scale(rhs.constant))
            } else {
                None
            }
        }
        Div(_, _) | Rem(_, _) | Pow(_, _) => None,
    }
}

/// A bound `v op t` extracted from a comparison mentioning exactly
/// one variable linearly.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    pub var: Sym,
    pub op: Cmp,
    pub value: f64,
}

pub enum Atom {
    Ground(bool),
    Bound(Bound),
    Other,
}

pub fn classify(op: Cmp, lhs: &Exp, rhs: &Exp) -> Atom {
    let (lhs, rhs) = match (linearize(lhs), linearize(rhs)) {
        (Some(lhs), Some(rhs)) => (lhs, rhs),
        _ => return Atom::Other,
    };
    let diff = lhs.add(rhs.scale(-1.0));
    if diff.is_constant() {
        return Atom::Ground(op.holds(diff.constant, 0.0));
    }
    if diff.coeffs.len() != 1 {
        return Atom::Other;
    }
    let (var, coeff) = match diff.coeffs.iter().next() {
        Some((v, c)) => (*v, *c),
        None => return Atom::Other,
    };
    // coeff * var + constant op 0  ==>  var op' -constant / coeff
    let value = -diff.constant / coeff;
    let op = if coeff < 0.0 { op.swap() } else { op };
    Atom::Bound(Bound { var, op, value })
}

/// The set of values a variable may still take. Integral intervals
/// are kept closed, floating point ones track strictness of each end.
#[derive(Clone, Debug, PartialEq)]
pub struct Interval {
    pub integral: bool,
    pub lo: f64,
    pub lo_strict: bool,
    pub hi: f64,
    pub hi_strict: bool,
    pub excluded: Vec<f64>,
}

impl Interval {
    pub fn new(integral: bool, lo: f64, hi: f64) -> Self {
        Interval { integral, lo, lo_strict: false, hi, hi_strict: false, excluded: Vec::new() }
    }

    fn raise_lo(&mut self, lo: f64, strict: bool) {
        if lo > self.lo || (lo == self.lo && strict) {
            self.lo = lo;
            self.lo_strict = strict
        }
    }

    fn lower_hi(&mut self, hi: f64, strict: bool) {
        if hi < self.hi || (hi == self.hi && strict) {
            self.hi = hi;
            self.hi_strict = strict
        }
    }

    pub fn restrict(&mut self, op: Cmp, t: f64) {
        if self.integral {
            match op {
                Cmp::Gt => self.raise_lo(t.floor() + 1.0, false),
                Cmp::Ge => self.raise_lo(t.ceil(), false),
                Cmp::Lt => self.lower_hi(t.ceil() - 1.0, false),
                Cmp::Le => self.lower_hi(t.floor(), false),
                Cmp::Eq => {
                    if t.fract() == 0.0 {
                        self.raise_lo(t, false);
                        self.lower_hi(t, false)
                    } else {
                        self.lo = 1.0;
                        self.hi = 0.0
                    }
                }
                Cmp::Ne => {
                    if t.fract() == 0.0 && !self.excluded.contains(&t) {
                        self.excluded.push(t)
                    }
                }
            }
        } else {
            match op {
                Cmp::Gt => self.raise_lo(t, true),
                Cmp::Ge => self.raise_lo(t, false),
                Cmp::Lt => self.lower_hi(t, true),
                Cmp::Le => self.lower_hi(t, false),
                Cmp::Eq => {
                    self.raise_lo(t, false);
                    self.lower_hi(t, false)
                }
                Cmp::Ne => {
                    if !self.excluded.contains(&t) {
                        self.excluded.push(t)
                    }
                }
            }
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        if self.integral && x.fract() != 0.0 {
            return false;
        }
        let above = if self.lo_strict { x > self.lo } else { x >= self.lo };
        let below = if self.hi_strict { x < self.hi } else { x <= self.hi };
        above && below && !self.excluded.contains(&x)
    }

    pub fn is_empty(&self) -> bool {
        if self.lo > self.hi {
            return true;
        }
        if self.integral {
            let size = self.hi - self.lo + 1.0;
            let excluded = self.excluded.iter().filter(|x| **x >= self.lo && **x <= self.hi).count() as f64;
            size <= excluded
        } else {
            self.lo == self.hi && (self.lo_strict || self.hi_strict || self.excluded.contains(&self.lo))
        }
    }

    /// Pick a member, preferring values close to zero so that models
    /// stay readable. Only meaningful if the interval is non-empty.
    pub fn witness(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        if self.integral {
            let start = 0f64.max(self.lo).min(self.hi);
            let tries = self.excluded.len() as f64 + 1.0;
            let mut k = 0.0;
            while k <= tries {
                for x in [start + k, start - k] {
                    if self.contains(x) {
                        return Some(x);
                    }
                }
                k += 1.0
            }
            None
        } else {
            let mut candidates = vec![0.0];
            if self.lo.is_finite() && self.hi.is_finite() {
                let mid = self.lo / 2.0 + self.hi / 2.0;
                candidates.push(mid);
                candidates.push(self.lo / 2.0 + mid / 2.0);
                candidates.push(mid / 2.0 + self.hi / 2.0)
            }
            candidates.extend_from_slice(&[self.lo, self.hi, self.lo + 1.0, self.hi - 1.0]);
            candidates.into_iter().find(|x| x.is_finite() && self.contains(*x))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Exp {
        Exp::Var(Sym::from_u32(0))
    }

    #[test]
    fn linear_bound_with_negative_coefficient() {
        // 3 - 2x > 1  ==>  x < 1
        let lhs = Exp::Sub(Box::new(Exp::Int(3)), Box::new(Exp::Mul(Box::new(Exp::Int(2)), Box::new(x()))));
        match classify(Cmp::Gt, &lhs, &Exp::Int(1)) {
            Atom::Bound(bound) => assert_eq!(bound, Bound { var: Sym::from_u32(0), op: Cmp::Lt, value: 1.0 }),
            _ => panic!("expected a bound"),
        }
    }

    #[test]
    fn integral_intervals() {
        let mut i = Interval::new(true, i32::MIN as f64, i32::MAX as f64);
        i.restrict(Cmp::Gt, 0.0);
        assert_eq!(i.witness(), Some(1.0));
        i.restrict(Cmp::Ne, 1.0);
        assert_eq!(i.witness(), Some(2.0));
        i.restrict(Cmp::Lt, 2.0);
        assert!(i.is_empty())
    }

    #[test]
    fn float_intervals_are_strict() {
        let mut i = Interval::new(false, f64::MIN, f64::MAX);
        i.restrict(Cmp::Ge, 1.0);
        i.restrict(Cmp::Le, 1.0);
        assert_eq!(i.witness(), Some(1.0));
        i.restrict(Cmp::Lt, 1.0);
        assert!(i.is_empty())
    }
}
