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

extern crate symvm_lib;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use symvm_lib::config::SearchConfig;
use symvm_lib::error::ExecError;
use symvm_lib::executor::{start_batch, AbortReason, Job, Outcome, Search, SearchResult, SearchStatus};
use symvm_lib::generator::{Generator, IntRange, ValueList};
use symvm_lib::ir::*;
use symvm_lib::native::Natives;
use symvm_lib::smt::{ConstraintSystem, Exp, Solver};

fn param(name: &str, ty: Ty) -> Param {
    Param { name: name.to_string(), ty }
}

fn int() -> Ty {
    Ty::Num(NumTy::Int)
}

fn explore(program: &Program, method: &str, config: SearchConfig) -> SearchResult {
    let natives = Natives::standard();
    let mut search = Search::new(program, &natives, method, config.solver(), config).unwrap();
    search.explore()
}

fn conditions(result: &SearchResult) -> Vec<Vec<String>> {
    result.paths.iter().map(|path| path.path_condition.clone()).collect()
}

fn outcomes(result: &SearchResult) -> Vec<Outcome> {
    result.paths.iter().map(|path| path.outcome.clone()).collect()
}

/// `int sign(int x) { if (x > 0) return 1; else return -1; }`
fn sign() -> Method {
    Method::new(
        "sign",
        vec![param("x", int())],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::If { cond: Cond::Le, target: 4 },
            Instr::Iconst(1),
            Instr::ValueReturn,
            Instr::Iconst(-1),
            Instr::ValueReturn,
        ],
    )
}

/// Counts `x` down to zero, one path per number of iterations.
fn countdown() -> Method {
    Method::new(
        "countdown",
        vec![param("x", int())],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::If { cond: Cond::Le, target: 4 },
            Instr::Iinc { slot: 0, delta: -1 },
            Instr::Goto(0),
            Instr::Iconst(0),
            Instr::ValueReturn,
        ],
    )
}

fn with_methods(methods: Vec<Method>) -> Program {
    let mut program = Program::new();
    for method in methods {
        program.add_method(method);
    }
    program
}

#[test]
fn sign_has_two_paths() {
    let program = with_methods(vec![sign()]);
    let result = explore(&program, "sign", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(conditions(&result), vec![vec!["(<= x 0)".to_string()], vec!["(> x 0)".to_string()]]);
    assert_eq!(outcomes(&result), vec![Outcome::Return(Some(Val::int(-1))), Outcome::Return(Some(Val::int(1)))]);
    assert_eq!(result.paths[0].inputs, vec![("x".to_string(), "0".to_string())]);
    assert_eq!(result.paths[1].inputs, vec![("x".to_string(), "1".to_string())]);
    assert_eq!(result.paths[1].number, 2);
    assert_eq!(result.stats.choice_points, 1)
}

#[test]
fn field_access_on_parameter_forks_on_null() {
    let val = FieldRef::new("Node", "val", int());
    let program = with_methods(vec![Method::new(
        "value",
        vec![param("p", Ty::Object("Node".to_string()))],
        Some(int()),
        vec![Instr::Load(0), Instr::GetField(val), Instr::ValueReturn],
    )]);
    let result = explore(&program, "value", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(result.paths.len(), 2);
    assert_eq!(result.paths[0].outcome, Outcome::Exception(NULL_POINTER_EXCEPTION.to_string()));
    assert_eq!(result.paths[0].path_condition, vec!["(= p.isNull 1)".to_string()]);
    assert_eq!(result.paths[0].inputs, vec![("p".to_string(), "null".to_string())]);
    assert_eq!(result.paths[1].path_condition, vec!["(= p.isNull 0)".to_string()]);
    assert_eq!(result.paths[1].description, "returned p.val")
}

#[test]
fn long_comparison_has_three_paths() {
    let program = with_methods(vec![Method::new(
        "cmp",
        vec![param("v", Ty::Num(NumTy::Long))],
        Some(int()),
        vec![Instr::Load(0), Instr::Lconst(0), Instr::Cmp(CmpKind::Lcmp), Instr::ValueReturn],
    )]);
    let result = explore(&program, "cmp", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(
        conditions(&result),
        vec![vec!["(> v 0)".to_string()], vec!["(< v 0)".to_string()], vec!["(= v 0)".to_string()]]
    );
    assert_eq!(
        outcomes(&result),
        vec![
            Outcome::Return(Some(Val::int(1))),
            Outcome::Return(Some(Val::int(-1))),
            Outcome::Return(Some(Val::int(0)))
        ]
    )
}

#[test]
fn constant_comparison_does_not_fork() {
    let program = with_methods(vec![Method::new(
        "cmp",
        Vec::new(),
        Some(int()),
        vec![Instr::Dconst(f64::NAN), Instr::Dconst(1.0), Instr::Cmp(CmpKind::Dcmpg), Instr::ValueReturn],
    )]);
    let result = explore(&program, "cmp", SearchConfig::new());
    assert_eq!(outcomes(&result), vec![Outcome::Return(Some(Val::int(1)))]);
    assert_eq!(result.stats.choice_points, 0)
}

#[test]
fn instruction_budget_keeps_finished_paths() {
    let program = with_methods(vec![sign()]);
    let config = SearchConfig { max_instructions: Some(4), ..SearchConfig::new() };
    let result = explore(&program, "sign", config);
    assert_eq!(result.status, SearchStatus::Aborted(AbortReason::Instructions));
    assert_eq!(outcomes(&result), vec![Outcome::Return(Some(Val::int(-1)))]);

    let program = with_methods(vec![countdown()]);
    let config = SearchConfig { max_instructions: Some(500), ..SearchConfig::new() };
    let result = explore(&program, "countdown", config);
    assert_eq!(result.status, SearchStatus::Aborted(AbortReason::Instructions));
    assert!(result.paths.len() > 2);
    assert!(result.paths.iter().all(|path| path.outcome == Outcome::Return(Some(Val::int(0)))));
    assert_eq!(result.stats.instructions, 500)
}

#[test]
fn time_budget_stops_unbounded_search() {
    let program = with_methods(vec![countdown()]);
    let config =
        SearchConfig { max_instructions: None, max_time: Some(Duration::from_millis(50)), ..SearchConfig::new() };
    let result = explore(&program, "countdown", config);
    assert_eq!(result.status, SearchStatus::Aborted(AbortReason::Time));
    assert!(!result.paths.is_empty())
}

#[test]
fn path_budget() {
    let program = with_methods(vec![countdown(), sign()]);
    let config = SearchConfig { max_paths: Some(3), ..SearchConfig::new() };
    let result = explore(&program, "countdown", config.clone());
    assert_eq!(result.status, SearchStatus::Aborted(AbortReason::Paths));
    assert_eq!(result.paths.len(), 3);
    assert_eq!(result.paths[2].path_condition.len(), 3);

    // Nothing is left to explore after the last path
    let config = SearchConfig { max_paths: Some(2), ..config };
    assert_eq!(explore(&program, "sign", config).status, SearchStatus::Complete)
}

#[test]
fn depth_limit_cuts_off_paths() {
    let program = with_methods(vec![countdown()]);
    let config = SearchConfig { max_depth: Some(3), ..SearchConfig::new() };
    let natives = Natives::new();
    let mut search = Search::new(&program, &natives, "countdown", Solver::new(), config).unwrap();
    let result = search.explore();
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(result.paths.len(), 4);
    assert_eq!(result.paths[3].outcome, Outcome::DepthLimit);
    assert_eq!(result.paths[3].constraints.len(), 3);
    assert_eq!(search.depth(), 0);
    assert!(search.solver().constraints().is_empty())
}

#[test]
fn abort_flag_cancels_search() {
    let program = with_methods(vec![sign()]);
    let natives = Natives::new();
    let flag = Arc::new(AtomicBool::new(true));
    let mut search = Search::new(&program, &natives, "sign", Solver::new(), SearchConfig::new())
        .unwrap()
        .with_abort_flag(flag);
    let result = search.explore();
    assert_eq!(result.status, SearchStatus::Aborted(AbortReason::Cancelled));
    assert!(result.paths.is_empty())
}

#[test]
fn switch_cases_in_key_order() {
    let program = with_methods(vec![Method::new(
        "pick",
        vec![param("x", int())],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::LookupSwitch { keys: vec![5, 1], targets: vec![2, 4], default: 6 },
            Instr::Iconst(50),
            Instr::ValueReturn,
            Instr::Iconst(10),
            Instr::ValueReturn,
            Instr::Iconst(-1),
            Instr::ValueReturn,
        ],
    )]);
    let result = explore(&program, "pick", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(
        outcomes(&result),
        vec![
            Outcome::Return(Some(Val::int(10))),
            Outcome::Return(Some(Val::int(50))),
            Outcome::Return(Some(Val::int(-1)))
        ]
    );
    assert_eq!(result.paths[0].path_condition, vec!["(= x 1)".to_string()]);
    assert_eq!(result.paths[2].path_condition, vec!["(and (distinct x 1) (distinct x 5))".to_string()])
}

#[test]
fn same_field_read_twice_is_the_same_value() {
    let val = FieldRef::new("Node", "val", int());
    let program = with_methods(vec![Method::new(
        "twice",
        vec![param("p", Ty::Object("Node".to_string()))],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::GetField(val.clone()),
            Instr::Load(0),
            Instr::GetField(val),
            Instr::Sub(NumTy::Int),
            Instr::ValueReturn,
        ],
    )]);
    let result = explore(&program, "twice", SearchConfig::new());
    assert_eq!(result.paths.len(), 2);
    match &result.paths[1].outcome {
        Outcome::Return(Some(Val::Num(Exp::Sub(lhs, rhs)))) => assert_eq!(lhs, rhs),
        outcome => panic!("unexpected outcome {:?}", outcome),
    }
}

/// `int same(Node p, Node q) { return p == q ? 1 : 0; }`
#[test]
fn distinct_references_are_equal_when_both_null() {
    let node = Ty::Object("Node".to_string());
    let program = with_methods(vec![Method::new(
        "same",
        vec![param("p", node.clone()), param("q", node)],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::Load(1),
            Instr::IfCmp { cond: Cond::Ne, target: 5 },
            Instr::Iconst(1),
            Instr::ValueReturn,
            Instr::Iconst(0),
            Instr::ValueReturn,
        ],
    )]);
    let result = explore(&program, "same", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(outcomes(&result), vec![Outcome::Return(Some(Val::int(0))), Outcome::Return(Some(Val::int(1)))]);
    assert_eq!(result.paths[1].path_condition, vec!["(and (= p.isNull 1) (= q.isNull 1))".to_string()]);
    assert_eq!(
        result.paths[1].inputs,
        vec![("p".to_string(), "null".to_string()), ("q".to_string(), "null".to_string())]
    )
}

#[test]
fn array_access_checks_null_and_bounds() {
    let program = with_methods(vec![Method::new(
        "get",
        vec![param("xs", Ty::Array(Box::new(int()))), param("i", int())],
        Some(int()),
        vec![Instr::Load(0), Instr::Load(1), Instr::ArrayLoad(int()), Instr::ValueReturn],
    )]);
    let result = explore(&program, "get", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(
        outcomes(&result)[..2],
        [
            Outcome::Exception(NULL_POINTER_EXCEPTION.to_string()),
            Outcome::Exception(INDEX_OUT_OF_BOUNDS_EXCEPTION.to_string())
        ]
    );
    assert_eq!(result.paths.len(), 3);
    assert_eq!(result.paths[2].description, "returned xs[i]")
}

/// `int f(int i) { int[] a = new int[2]; a[i] = 7; return a[0]; }`
#[test]
fn array_store_through_symbolic_index_is_seen_by_constant_index() {
    let method = Method::new(
        "f",
        vec![param("i", int())],
        Some(int()),
        vec![
            Instr::Iconst(2),
            Instr::NewArray(int()),
            Instr::Store(1),
            Instr::Load(1),
            Instr::Load(0),
            Instr::Iconst(7),
            Instr::ArrayStore,
            Instr::Load(1),
            Instr::Iconst(0),
            Instr::ArrayLoad(int()),
            Instr::ValueReturn,
        ],
    )
    .with_max_locals(2);
    let result = explore(&with_methods(vec![method]), "f", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(
        outcomes(&result),
        vec![
            Outcome::Exception(INDEX_OUT_OF_BOUNDS_EXCEPTION.to_string()),
            Outcome::Return(Some(Val::int(7))),
            Outcome::Return(Some(Val::int(0)))
        ]
    );
    assert_eq!(result.paths[1].inputs, vec![("i".to_string(), "0".to_string())]);
    assert_eq!(result.paths[2].inputs, vec![("i".to_string(), "1".to_string())]);
    assert_eq!(result.paths[2].path_condition.last().map(String::as_str), Some("(distinct 0 i)"))
}

/// `int f(int i, int j) { int[] a = new int[2]; a[i] = 7; a[j] = 8; return a[i]; }`
#[test]
fn later_store_through_aliased_index_overwrites() {
    let method = Method::new(
        "f",
        vec![param("i", int()), param("j", int())],
        Some(int()),
        vec![
            Instr::Iconst(2),
            Instr::NewArray(int()),
            Instr::Store(2),
            Instr::Load(2),
            Instr::Load(0),
            Instr::Iconst(7),
            Instr::ArrayStore,
            Instr::Load(2),
            Instr::Load(1),
            Instr::Iconst(8),
            Instr::ArrayStore,
            Instr::Load(2),
            Instr::Load(0),
            Instr::ArrayLoad(int()),
            Instr::ValueReturn,
        ],
    )
    .with_max_locals(3);
    let result = explore(&with_methods(vec![method]), "f", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(
        outcomes(&result),
        vec![
            Outcome::Exception(INDEX_OUT_OF_BOUNDS_EXCEPTION.to_string()),
            Outcome::Exception(INDEX_OUT_OF_BOUNDS_EXCEPTION.to_string()),
            Outcome::Return(Some(Val::int(8))),
            Outcome::Return(Some(Val::int(7)))
        ]
    );
    assert_eq!(result.paths[2].path_condition.last().map(String::as_str), Some("(= j i)"));
    assert_eq!(result.paths[3].path_condition.last().map(String::as_str), Some("(distinct j i)"))
}

/// `int f(int[] xs, int i) { return xs[i] - xs[0]; }`
#[test]
fn input_array_reads_through_equal_indices_agree() {
    let program = with_methods(vec![Method::new(
        "f",
        vec![param("xs", Ty::Array(Box::new(int()))), param("i", int())],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::Load(1),
            Instr::ArrayLoad(int()),
            Instr::Load(0),
            Instr::Iconst(0),
            Instr::ArrayLoad(int()),
            Instr::Sub(NumTy::Int),
            Instr::ValueReturn,
        ],
    )]);
    let result = explore(&program, "f", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(result.paths.len(), 4);
    match &result.paths[2].outcome {
        Outcome::Return(Some(Val::Num(Exp::Sub(lhs, rhs)))) => assert_eq!(lhs, rhs),
        outcome => panic!("unexpected outcome {:?}", outcome),
    }
    assert_eq!(result.paths[3].description, "returned (- xs[i] xs[0])")
}

/// Objects allocated on one branch are gone when the other is explored.
#[test]
fn allocations_are_undone_on_backtracking() {
    let node = Ty::Object("C".to_string());
    let program = with_methods(vec![Method::new(
        "make",
        vec![param("x", int())],
        Some(node),
        vec![
            Instr::Load(0),
            Instr::If { cond: Cond::Le, target: 4 },
            Instr::New("C".to_string()),
            Instr::ValueReturn,
            Instr::New("C".to_string()),
            Instr::ValueReturn,
        ],
    )]);
    let natives = Natives::standard();
    let mut search = Search::new(&program, &natives, "make", Solver::new(), SearchConfig::new()).unwrap();
    let result = search.explore();
    let descriptions: Vec<_> = result.paths.iter().map(|path| path.description.as_str()).collect();
    assert_eq!(descriptions, vec!["returned C@1", "returned C@1"]);
    assert!(search.state().heap.is_empty())
}

#[test]
fn negative_array_size() {
    let program = with_methods(vec![Method::new(
        "make",
        vec![param("n", int())],
        Some(int()),
        vec![Instr::Load(0), Instr::NewArray(int()), Instr::ArrayLength, Instr::ValueReturn],
    )]);
    let result = explore(&program, "make", SearchConfig::new());
    assert_eq!(conditions(&result), vec![vec!["(< n 0)".to_string()], vec!["(>= n 0)".to_string()]]);
    assert_eq!(result.paths[0].outcome, Outcome::Exception(NEGATIVE_ARRAY_SIZE_EXCEPTION.to_string()));
    assert_eq!(result.paths[1].description, "returned n")
}

#[test]
fn division_by_zero_is_caught_by_handler() {
    let method = Method::new(
        "safe_div",
        vec![param("x", int())],
        Some(int()),
        vec![
            Instr::Iconst(100),
            Instr::Load(0),
            Instr::Div(NumTy::Int),
            Instr::ValueReturn,
            Instr::Pop,
            Instr::Iconst(-1),
            Instr::ValueReturn,
        ],
    )
    .with_handler(Handler { start: 0, end: 4, target: 4, class: Some(ARITHMETIC_EXCEPTION.to_string()) });
    let program = with_methods(vec![method]);
    let result = explore(&program, "safe_div", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(conditions(&result), vec![vec!["(= x 0)".to_string()], vec!["(distinct x 0)".to_string()]]);
    assert_eq!(result.paths[0].outcome, Outcome::Return(Some(Val::int(-1))));
    assert_eq!(result.paths[1].description, "returned (div 100 x)")
}

#[test]
fn constant_division_by_zero_throws() {
    let program = with_methods(vec![Method::new(
        "boom",
        Vec::new(),
        Some(int()),
        vec![Instr::Iconst(1), Instr::Iconst(0), Instr::Div(NumTy::Int), Instr::ValueReturn],
    )]);
    let result = explore(&program, "boom", SearchConfig::new());
    assert_eq!(outcomes(&result), vec![Outcome::Exception(ARITHMETIC_EXCEPTION.to_string())]);
    assert_eq!(result.stats.choice_points, 0)
}

#[test]
fn calls_return_to_the_caller() {
    let caller = Method::new(
        "caller",
        vec![param("x", int())],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::Invoke("sign".to_string()),
            Instr::Iconst(3),
            Instr::Iconst(7),
            Instr::Invoke("java/lang/Math.max(II)I".to_string()),
            Instr::Add(NumTy::Int),
            Instr::ValueReturn,
        ],
    );
    let program = with_methods(vec![sign(), caller]);
    let result = explore(&program, "caller", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(outcomes(&result), vec![Outcome::Return(Some(Val::int(6))), Outcome::Return(Some(Val::int(8)))])
}

#[test]
fn exceptions_unwind_into_caller_handlers() {
    let val = FieldRef::new("Node", "val", int());
    let callee = Method::new(
        "value",
        vec![param("p", Ty::Object("Node".to_string()))],
        Some(int()),
        vec![Instr::Load(0), Instr::GetField(val), Instr::ValueReturn],
    );
    let caller = Method::new(
        "guarded",
        vec![param("p", Ty::Object("Node".to_string()))],
        Some(int()),
        vec![Instr::Load(0), Instr::Invoke("value".to_string()), Instr::ValueReturn, Instr::Pop, Instr::Iconst(0), Instr::ValueReturn],
    )
    .with_handler(Handler { start: 0, end: 3, target: 3, class: Some("java/lang/RuntimeException".to_string()) });
    let program = with_methods(vec![callee, caller]);
    let result = explore(&program, "guarded", SearchConfig::new());
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(result.paths.len(), 2);
    assert_eq!(result.paths[0].outcome, Outcome::Return(Some(Val::int(0))));
    assert_eq!(result.paths[1].description, "returned p.val")
}

#[test]
fn unknown_method_fails_the_path() {
    let program = with_methods(vec![Method::new(
        "call",
        Vec::new(),
        None,
        vec![Instr::Invoke("does/not/Exist.f".to_string()), Instr::Return],
    )]);
    let result = explore(&program, "call", SearchConfig::new());
    match &result.paths[0].outcome {
        Outcome::Failed(msg) => assert!(msg.contains("does/not/Exist.f")),
        outcome => panic!("unexpected outcome {:?}", outcome),
    }
}

#[test]
fn bound_parameters_take_generated_values() {
    let program = with_methods(vec![Method::new(
        "clamp",
        vec![param("n", int())],
        Some(int()),
        vec![
            Instr::Load(0),
            Instr::If { cond: Cond::Gt, target: 4 },
            Instr::Iconst(0),
            Instr::ValueReturn,
            Instr::Load(0),
            Instr::ValueReturn,
        ],
    )]);
    let natives = Natives::new();
    let mut search = Search::new(&program, &natives, "clamp", Solver::new(), SearchConfig::new()).unwrap();
    search.bind_parameter("n", Box::new(ValueList::ints("small", &[-2, 3, 7]))).unwrap();
    let result = search.explore();
    assert_eq!(result.status, SearchStatus::Complete);
    assert_eq!(
        outcomes(&result),
        vec![Outcome::Return(Some(Val::int(0))), Outcome::Return(Some(Val::int(3))), Outcome::Return(Some(Val::int(7)))]
    );
    let inputs: Vec<_> = result.paths.iter().map(|path| path.inputs[0].1.clone()).collect();
    assert_eq!(inputs, vec!["-2", "3", "7"]);
    assert!(result.paths.iter().all(|path| path.constraints.is_empty()));

    let mut search = Search::new(&program, &natives, "clamp", Solver::new(), SearchConfig::new()).unwrap();
    assert!(matches!(
        search.bind_parameter("m", Box::new(IntRange::new("r", 0, 1))),
        Err(ExecError::NoSuchParameter(_))
    ))
}

#[test]
fn generate_instruction_draws_from_registered_generator() {
    let method = Method::new(
        "gen",
        Vec::new(),
        Some(int()),
        vec![
            Instr::Generate { slot: 0, generator: "range".to_string() },
            Instr::Load(0),
            Instr::Load(0),
            Instr::Mul(NumTy::Int),
            Instr::ValueReturn,
        ],
    )
    .with_max_locals(1);
    let program = with_methods(vec![method]);
    let natives = Natives::new();
    let mut search = Search::new(&program, &natives, "gen", Solver::new(), SearchConfig::new()).unwrap();
    search.add_generator(Box::new(IntRange::new("range", 1, 3)));
    let result = search.explore();
    assert_eq!(
        outcomes(&result),
        vec![Outcome::Return(Some(Val::int(1))), Outcome::Return(Some(Val::int(4))), Outcome::Return(Some(Val::int(9)))]
    );

    let mut search = Search::new(&program, &natives, "gen", Solver::new(), SearchConfig::new()).unwrap();
    let result = search.explore();
    assert!(matches!(result.paths[0].outcome, Outcome::Failed(_)))
}

#[test]
fn batch_results_are_in_job_order() {
    let program = with_methods(vec![sign(), countdown()]);
    let natives = Natives::standard();
    let job = |method: &str| Job {
        program: &program,
        natives: &natives,
        method: method.to_string(),
        config: SearchConfig { max_depth: Some(2), ..SearchConfig::new() },
        bindings: Vec::new(),
    };
    let results = start_batch(vec![job("countdown"), job("sign"), job("missing")], 2);
    assert_eq!(results.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(results[0].1.as_ref().unwrap().paths.len(), 3);
    assert_eq!(results[1].1.as_ref().unwrap().paths.len(), 2);
    assert!(matches!(results[2].1, Err(ExecError::NoSuchMethod(_))))
}

#[test]
fn batch_jobs_bind_generators() {
    let program = with_methods(vec![sign()]);
    let natives = Natives::new();
    let job = |param: &str| Job {
        program: &program,
        natives: &natives,
        method: "sign".to_string(),
        config: SearchConfig::new(),
        bindings: vec![(param.to_string(), Box::new(IntRange::new("r", -1, 1)) as Box<dyn Generator>)],
    };
    let results = start_batch(vec![job("x"), job("y")], 1);
    let paths = &results[0].1.as_ref().unwrap().paths;
    assert_eq!(
        paths.iter().map(|path| path.outcome.clone()).collect::<Vec<_>>(),
        vec![Outcome::Return(Some(Val::int(-1))), Outcome::Return(Some(Val::int(-1))), Outcome::Return(Some(Val::int(1)))]
    );
    assert!(matches!(results[1].1, Err(ExecError::NoSuchParameter(_))))
}
