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

use std::process::exit;

use symvm_lib::executor::{start_batch, Job, SearchResult};
use symvm_lib::generator::{Generator, IntRange};
use symvm_lib::native::Natives;

mod opts;
use opts::CommonOpts;

fn main() {
    let code = explore_main();
    exit(code)
}

/// Parse `<param>=<lo>..<hi>`.
fn parse_range(arg: &str) -> Option<(String, i64, i64)> {
    let (param, range) = arg.split_once('=')?;
    let (lo, hi) = range.split_once("..")?;
    Some((param.to_string(), lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

fn print_result(method: &str, result: &SearchResult) {
    println!("{}:", method);
    for path in &result.paths {
        let inputs: Vec<String> = path.inputs.iter().map(|(name, value)| format!("{} = {}", name, value)).collect();
        println!("  path {}: {}", path.number, path.description);
        if !path.path_condition.is_empty() {
            println!("    condition: {}", path.path_condition.join(" "))
        }
        if !inputs.is_empty() {
            println!("    inputs: {}", inputs.join(", "))
        }
    }
    let stats = &result.stats;
    println!(
        "  {}: {} paths, {} instructions, {} choice points, {} backtracks, {} solver calls",
        result.status, stats.paths, stats.instructions, stats.choice_points, stats.backtracks, stats.solver_calls
    )
}

fn explore_main() -> i32 {
    let mut opts = opts::common_opts();
    opts.optmulti("m", "method", "explore this method (default: every method)", "<name>");
    opts.optmulti("r", "range", "draw a parameter from an integer range", "<param>=<lo>..<hi>");

    let (matches, CommonOpts { num_threads, program, config }) = opts::parse(&opts);

    let mut ranges = Vec::new();
    for arg in matches.opt_strs("range") {
        match parse_range(&arg) {
            Some(range) => ranges.push(range),
            None => {
                eprintln!("Could not parse --range option: {}", arg);
                opts::print_usage(&opts, 1)
            }
        }
    }

    let methods = match matches.opt_strs("method") {
        methods if methods.is_empty() => program.methods.iter().map(|m| m.name.clone()).collect(),
        methods => methods,
    };

    let natives = Natives::standard();
    let jobs = methods
        .iter()
        .map(|method| {
            let params = program.method(method).map(|m| m.params.as_slice()).unwrap_or(&[]);
            let bindings = ranges
                .iter()
                .filter(|(param, _, _)| params.iter().any(|p| &p.name == param))
                .map(|(param, lo, hi)| {
                    let generator: Box<dyn Generator> = Box::new(IntRange::new(param, *lo, *hi));
                    (param.clone(), generator)
                })
                .collect();
            Job { program: &program, natives: &natives, method: method.clone(), config: config.clone(), bindings }
        })
        .collect();

    let mut code = 0;
    for (i, result) in start_batch(jobs, num_threads) {
        match result {
            Ok(result) => print_result(&methods[i], &result),
            Err(e) => {
                eprintln!("{}: {}", methods[i], e);
                code = 1
            }
        }
    }
    code
}
