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

//! Search configuration, read from a TOML file of the form
//!
//! ```toml
//! [search]
//! max_instructions = 1000000
//! max_time_ms = 60000
//! max_paths = 100
//! max_depth = 64
//!
//! [solver]
//! timeout_ms = 2000
//! max_candidates = 1000000
//! ```
//!
//! Every key is optional. Budgets that are absent are unlimited,
//! except `max_instructions` which defaults to ten million so that a
//! loop over a symbolic bound cannot run forever.

use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Duration;
use toml::Value;

use crate::error::ConfigError;
use crate::smt::Solver;

pub const DEFAULT_MAX_INSTRUCTIONS: u64 = 10_000_000;
pub const DEFAULT_MAX_CANDIDATES: u64 = 1_000_000;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    pub max_instructions: Option<u64>,
    pub max_time: Option<Duration>,
    pub max_paths: Option<usize>,
    /// The largest number of choice points open at once. A path that
    /// would need more is cut off.
    pub max_depth: Option<usize>,
    pub solver_timeout: Option<Duration>,
    pub max_candidates: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_instructions: Some(DEFAULT_MAX_INSTRUCTIONS),
            max_time: None,
            max_paths: None,
            max_depth: None,
            solver_timeout: None,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

fn get_table_value(config: &Value, table: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    match config.get(table).and_then(|table| table.get(key)) {
        None => Ok(None),
        Some(Value::Integer(i)) if *i >= 0 => Ok(Some(*i as u64)),
        Some(value) => {
            Err(ConfigError::Field(format!("Expected a non-negative integer for {}.{}, found {}", table, key, value)))
        }
    }
}

fn check_tables(config: &Value) -> Result<(), ConfigError> {
    let toplevel = config.as_table().ok_or_else(|| ConfigError::Parse("expected a table".to_string()))?;
    for (name, table) in toplevel {
        let known: &[&str] = match name.as_str() {
            "search" => &["max_instructions", "max_time_ms", "max_paths", "max_depth"],
            "solver" => &["timeout_ms", "max_candidates"],
            _ => return Err(ConfigError::Field(format!("Unknown section [{}] in config", name))),
        };
        if let Some(table) = table.as_table() {
            if let Some(key) = table.keys().find(|key| !known.contains(&key.as_str())) {
                return Err(ConfigError::Field(format!("Unknown key {}.{} in config", name, key)));
            }
        }
    }
    Ok(())
}

impl SearchConfig {
    pub fn new() -> Self {
        SearchConfig::default()
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config = match contents.parse::<Value>() {
            Ok(config) => config,
            Err(e) => return Err(ConfigError::Parse(e.to_string())),
        };
        check_tables(&config)?;

        let defaults = SearchConfig::default();
        Ok(SearchConfig {
            max_instructions: get_table_value(&config, "search", "max_instructions")?.or(defaults.max_instructions),
            max_time: get_table_value(&config, "search", "max_time_ms")?.map(Duration::from_millis),
            max_paths: get_table_value(&config, "search", "max_paths")?.map(|n| n as usize),
            max_depth: get_table_value(&config, "search", "max_depth")?.map(|n| n as usize),
            solver_timeout: get_table_value(&config, "solver", "timeout_ms")?.map(Duration::from_millis),
            max_candidates: get_table_value(&config, "solver", "max_candidates")?.unwrap_or(defaults.max_candidates),
        })
    }

    pub fn from_file<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    /// A reference solver set up with this configuration's limits.
    pub fn solver(&self) -> Solver {
        Solver::new().with_timeout(self.solver_timeout).with_max_candidates(self.max_candidates)
    }
}

impl std::str::FromStr for SearchConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchConfig::parse(s)
    }
}
