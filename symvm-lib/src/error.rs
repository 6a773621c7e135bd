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

use std::error;
use std::fmt;

/// Errors raised while executing a single path. These are never the
/// analysed program's own runtime errors, which are represented as
/// exception outcomes of a path.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecError {
    Type(&'static str),
    NoSuchMethod(String),
    NoSuchLocal(usize),
    NoSuchParameter(String),
    NoSuchGenerator(String),
    StackUnderflow,
    /// A switch whose key and target counts disagree, or which has
    /// no keys at all.
    BadSwitch(String),
    /// Used when the engine finds itself in a state that its own
    /// construction should have ruled out, like a three-way
    /// comparison where none of the outcomes is satisfiable.
    Inconsistent(String),
    Native(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExecError::*;
        match self {
            Type(msg) => write!(f, "Type error: {}", msg),
            NoSuchMethod(name) => write!(f, "No such method: {}", name),
            NoSuchLocal(slot) => write!(f, "No local variable in slot {}", slot),
            NoSuchParameter(name) => write!(f, "No parameter named {}", name),
            NoSuchGenerator(name) => write!(f, "No generator named {}", name),
            StackUnderflow => write!(f, "Operand stack underflow"),
            BadSwitch(msg) => write!(f, "Malformed switch: {}", msg),
            Inconsistent(msg) => write!(f, "Internal consistency failure: {}", msg),
            Native(msg) => write!(f, "Native method failed: {}", msg),
        }
    }
}

impl error::Error for ExecError {}

/// A satisfiability query that did not produce an answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolverError {
    /// The solver ran to completion without deciding the query.
    Unknown,
    Timeout,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Unknown => write!(f, "solver unable to decide"),
            SolverError::Timeout => write!(f, "solver timed out"),
        }
    }
}

impl error::Error for SolverError {}

/// Outcome of failing to construct or advance a choice point. Only
/// `Fatal` is an error in the usual sense, the other two just mean
/// the search has to back up.
#[derive(Clone, Debug, PartialEq)]
pub enum ChoiceError {
    Unsatisfiable,
    Indecisive(SolverError),
    Fatal(ExecError),
}

impl ChoiceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChoiceError::Fatal(_))
    }
}

impl From<ExecError> for ChoiceError {
    fn from(err: ExecError) -> Self {
        ChoiceError::Fatal(err)
    }
}

impl fmt::Display for ChoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceError::Unsatisfiable => write!(f, "no alternative is satisfiable"),
            ChoiceError::Indecisive(err) => write!(f, "no alternative could be decided ({})", err),
            ChoiceError::Fatal(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for ChoiceError {}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Field(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "Could not read configuration: {}", err),
            ConfigError::Parse(msg) => write!(f, "Could not parse configuration: {}", msg),
            ConfigError::Field(msg) => write!(f, "{}", msg),
        }
    }
}

impl error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
