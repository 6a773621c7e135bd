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

//! This module defines the decoded form of the bytecode the engine
//! executes. Parsing class files is somebody else's job: a loader
//! hands us a [Program], a flat collection of methods whose bodies
//! are vectors of [Instr] addressed by program counter.
//!
//! Every type here can be deserialized, so a program can also be
//! written by hand as TOML and fed to the `symvm-explore` tool.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::heap::RefId;
use crate::smt::smtlib::{Cmp, Exp};

/// Type tags of numeric values, both concrete and symbolic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumTy {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl NumTy {
    pub fn is_integral(self) -> bool {
        !matches!(self, NumTy::Float | NumTy::Double)
    }

    /// The smallest and largest value of the type.
    pub fn bounds(self) -> (f64, f64) {
        use NumTy::*;
        match self {
            Boolean => (0.0, 1.0),
            Byte => (i8::MIN as f64, i8::MAX as f64),
            Char => (0.0, u16::MAX as f64),
            Short => (i16::MIN as f64, i16::MAX as f64),
            Int => (i32::MIN as f64, i32::MAX as f64),
            Long => (i64::MIN as f64, i64::MAX as f64),
            Float => (f32::MIN as f64, f32::MAX as f64),
            Double => (f64::MIN, f64::MAX),
        }
    }

    /// Truncate an integer to the width of the type, as the machine
    /// does after every integral operation.
    pub fn wrap(self, i: i64) -> i64 {
        use NumTy::*;
        match self {
            Boolean => i & 1,
            Byte => i as i8 as i64,
            Char => i as u16 as i64,
            Short => i as i16 as i64,
            Int => i as i32 as i64,
            Long | Float | Double => i,
        }
    }

    pub fn round(self, x: f64) -> f64 {
        match self {
            NumTy::Float => x as f32 as f64,
            _ => x,
        }
    }

    pub fn zero(self) -> Exp {
        if self.is_integral() {
            Exp::Int(0)
        } else {
            Exp::Float(0.0)
        }
    }
}

impl fmt::Display for NumTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NumTy::*;
        let name = match self {
            Boolean => "boolean",
            Byte => "byte",
            Char => "char",
            Short => "short",
            Int => "int",
            Long => "long",
            Float => "float",
            Double => "double",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Num(NumTy),
    Object(String),
    Array(Box<Ty>),
}

impl Ty {
    /// The value a field or array element of this type holds before
    /// anything is written to it.
    pub fn default_value(&self) -> Val {
        match self {
            Ty::Num(ty) => Val::Num(ty.zero()),
            _ => Val::Null,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Num(ty) => write!(f, "{}", ty),
            Ty::Object(class) => write!(f, "{}", class),
            Ty::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub ty: Ty,
}

impl FieldRef {
    pub fn new(class: &str, name: &str, ty: Ty) -> Self {
        FieldRef { class: class.to_string(), name: name.to_string(), ty }
    }
}

/// Conditions of the `if` family of instructions, comparing either
/// the top of the stack against zero or the top two values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    pub fn to_cmp(self) -> Cmp {
        match self {
            Cond::Eq => Cmp::Eq,
            Cond::Ne => Cmp::Ne,
            Cond::Lt => Cmp::Lt,
            Cond::Ge => Cmp::Ge,
            Cond::Gt => Cmp::Gt,
            Cond::Le => Cmp::Le,
        }
    }
}

/// The three-way comparison instructions. They differ in operand
/// type and in what they push when an operand is NaN.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpKind {
    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
}

impl CmpKind {
    pub fn nan_result(self) -> i64 {
        match self {
            CmpKind::Fcmpg | CmpKind::Dcmpg => 1,
            _ => -1,
        }
    }
}

/// An entry of a method's exception table. `class = None` catches
/// everything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub start: usize,
    pub end: usize,
    pub target: usize,
    #[serde(default)]
    pub class: Option<String>,
}

pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
pub const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";
pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/ArrayIndexOutOfBoundsException";
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java/lang/NegativeArraySizeException";

const RUNTIME_EXCEPTIONS: [&str; 4] =
    [NULL_POINTER_EXCEPTION, ARITHMETIC_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION, NEGATIVE_ARRAY_SIZE_EXCEPTION];

impl Handler {
    pub fn covers(&self, pc: usize) -> bool {
        self.start <= pc && pc < self.end
    }

    /// There is no class hierarchy available, so apart from exact
    /// matches only the well-known superclasses of the runtime
    /// exceptions are understood.
    pub fn catches(&self, class: &str) -> bool {
        match &self.class {
            None => true,
            Some(caught) if caught == class => true,
            Some(caught) => match caught.as_str() {
                "java/lang/Throwable" => true,
                "java/lang/Exception" | "java/lang/RuntimeException" => RUNTIME_EXCEPTIONS.contains(&class),
                _ => false,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Nop,
    AconstNull,
    Iconst(i64),
    Lconst(i64),
    Fconst(f64),
    Dconst(f64),
    Load(usize),
    Store(usize),
    Iinc { slot: usize, delta: i64 },
    Pop,
    Dup,
    Swap,
    Add(NumTy),
    Sub(NumTy),
    Mul(NumTy),
    Div(NumTy),
    Rem(NumTy),
    Neg(NumTy),
    Convert { from: NumTy, to: NumTy },
    If { cond: Cond, target: usize },
    IfCmp { cond: Cond, target: usize },
    IfNull(usize),
    IfNonNull(usize),
    Goto(usize),
    Cmp(CmpKind),
    TableSwitch { low: i64, targets: Vec<usize>, default: usize },
    LookupSwitch { keys: Vec<i64>, targets: Vec<usize>, default: usize },
    New(String),
    GetField(FieldRef),
    PutField(FieldRef),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    NewArray(Ty),
    ArrayLength,
    ArrayLoad(Ty),
    ArrayStore,
    Invoke(String),
    Return,
    ValueReturn,
    Athrow,
    /// Mark a local variable slot as a generated test input. The next
    /// load from the slot draws its value from the named generator.
    Generate { slot: usize, generator: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Option<Ty>,
    pub max_locals: usize,
    pub instrs: Vec<Instr>,
    #[serde(default)]
    pub handlers: Vec<Handler>,
}

impl Method {
    pub fn new(name: &str, params: Vec<Param>, returns: Option<Ty>, instrs: Vec<Instr>) -> Self {
        let max_locals = params.len();
        Method { name: name.to_string(), params, returns, max_locals, instrs, handlers: Vec::new() }
    }

    pub fn with_max_locals(self, max_locals: usize) -> Self {
        Method { max_locals: max_locals.max(self.params.len()), ..self }
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handler_for(&self, pc: usize, class: &str) -> Option<usize> {
        self.handlers.iter().find(|h| h.covers(pc) && h.catches(class)).map(|h| h.target)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn add_method(&mut self, method: Method) -> &mut Self {
        self.methods.push(method);
        self
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Values held in local variables, on the operand stack and in the
/// heap. Numeric values are terms, so a constant is simply a term
/// without variables.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    Num(Exp),
    Ref(RefId),
    Null,
    /// A local slot waiting for a value from the named generator.
    Pending(String),
}

impl Val {
    pub fn int(i: i64) -> Self {
        Val::Num(Exp::Int(i))
    }

    pub fn as_exp(&self) -> Option<&Exp> {
        match self {
            Val::Num(exp) => Some(exp),
            _ => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        match self {
            Val::Num(exp) => !exp.is_constant(),
            _ => false,
        }
    }
}
