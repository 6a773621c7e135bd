// MIT License
//
// Copyright (c) 2019 Alasdair Armstrong
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation
// files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy,
// modify, merge, publish, distribute, sublicense, and/or sell copies
// of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use getopts::{Matches, Options};
use std::fs::File;
use std::io::prelude::*;
use std::process::exit;

use symvm_lib::config::SearchConfig;
use symvm_lib::ir::Program;
use symvm_lib::log;

fn tool_name() -> Option<String> {
    match std::env::current_exe() {
        Ok(path) => Some(path.components().last()?.as_os_str().to_str()?.to_string()),
        Err(_) => None,
    }
}

pub fn print_usage(opts: &Options, code: i32) -> ! {
    let tool = match tool_name() {
        Some(name) => name,
        None => "[tool]".to_string(),
    };
    let brief = format!("Usage: {} [options]", tool);
    eprint!("{}", opts.usage(&brief));
    exit(code)
}

pub fn common_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("t", "threads", "use this many worker threads", "N");
    opts.optopt("p", "program", "load this program file", "FILE");
    opts.optopt("c", "config", "load search configuration", "FILE");
    opts.optopt("n", "max-paths", "stop each search after this many paths", "N");
    opts.optflag("h", "help", "print this help message");
    opts.optflagmulti("v", "verbose", "print verbose output");
    opts
}

fn load_program(file: &str) -> std::io::Result<Program> {
    let mut file = File::open(file)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    match toml::from_str(&contents) {
        Ok(program) => Ok(program),
        Err(parse_error) => {
            eprintln!("Parse error: {}", parse_error);
            exit(1)
        }
    }
}

pub struct CommonOpts {
    pub num_threads: usize,
    pub program: Program,
    pub config: SearchConfig,
}

pub fn parse(opts: &Options) -> (Matches, CommonOpts) {
    let args: Vec<String> = std::env::args().collect();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            print_usage(opts, 1)
        }
    };

    if matches.opt_present("help") {
        print_usage(opts, 0)
    }

    log::set_verbosity(matches.opt_count("verbose"));

    let num_threads = match matches.opt_get_default("threads", num_cpus::get()) {
        Ok(t) => t,
        Err(f) => {
            eprintln!("Could not parse --threads option: {}", f);
            print_usage(opts, 1)
        }
    };

    let program = match matches.opt_str("program") {
        Some(file) => match load_program(&file) {
            Ok(program) => program,
            Err(f) => {
                eprintln!("Error when loading program: {}", f);
                exit(1)
            }
        },
        None => {
            eprintln!("No program given");
            print_usage(opts, 1)
        }
    };

    let mut config = match matches.opt_str("config") {
        Some(file) => match SearchConfig::from_file(file) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                exit(1)
            }
        },
        None => SearchConfig::new(),
    };

    match matches.opt_get::<usize>("max-paths") {
        Ok(Some(n)) => config.max_paths = Some(n),
        Ok(None) => (),
        Err(f) => {
            eprintln!("Could not parse --max-paths option: {}", f);
            print_usage(opts, 1)
        }
    }

    (matches, CommonOpts { num_threads, program, config })
}
