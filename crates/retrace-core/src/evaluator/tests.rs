use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::callbacks::{Callbacks, Event, StaticIo};
use crate::exp::builders::{binop, block, identifier, let_, number};
use crate::exp::BinOp;
use crate::parser::parse_program;
use crate::recorder::{Recorder, TraceError};

fn evaluator() -> Evaluator {
    Evaluator::new(
        RetraceConfig::default(),
        Callbacks::untraced(Box::new(StaticIo::new())),
    )
}

fn run_with(ev: &mut Evaluator, source: &str) -> anyhow::Result<Vec<String>> {
    let program = parse_program(source)?;
    ev.run(&program)?;
    Ok(ev.take_output())
}

fn run(source: &str) -> anyhow::Result<Vec<String>> {
    run_with(&mut evaluator(), source)
}

fn run_error(source: &str) -> EvalError {
    let program = parse_program(source).unwrap();
    evaluator().run(&program).unwrap_err()
}

#[test]
fn test_arithmetic_and_concatenation() -> anyhow::Result<()> {
    assert_eq!(
        run("console.log(1 + 2, 'a' + 1, 7 % 3, 1 / 2, 2 * -3);")?,
        vec!["3 a1 1 0.5 -6"]
    );
    assert_eq!(run("let s = 'x'; s += 1; s += true; console.log(s);")?, vec!["x1true"]);
    Ok(())
}

#[test]
fn test_equality_and_typeof() -> anyhow::Result<()> {
    let out = run(
        "console.log(null == undefined, 1 == '1', [1] === [1], 'a' === 'a');
         console.log(typeof 1, typeof 'a', typeof null, typeof undefined, typeof console.log);
         console.log(void 0, !0, 2 < 10, 'b' > 'a');",
    )?;
    assert_eq!(
        out,
        vec![
            "true false false true",
            "number string object undefined function",
            "undefined true true true",
        ]
    );
    Ok(())
}

#[test]
fn test_logical_operators_short_circuit() -> anyhow::Result<()> {
    let out = run(
        "let hits = 0;
         function hit() { hits++; return true; }
         let a = false && hit();
         let b = true || hit();
         let c = 0 || 'fallback';
         console.log(a, b, c, hits);",
    )?;
    assert_eq!(out, vec!["false true fallback 0"]);
    Ok(())
}

#[test]
fn test_closures_share_environment() -> anyhow::Result<()> {
    let out = run(
        "function make() {
           let n = 0;
           function inc() { n = n + 1; return n; }
           return inc;
         }
         let f = make();
         f();
         let g = make();
         console.log(f(), g());",
    )?;
    assert_eq!(out, vec!["2 1"]);
    Ok(())
}

#[test]
fn test_hoisting_and_named_function_expression() -> anyhow::Result<()> {
    let out = run(
        "let r = twice(4);
         function twice(x) { return x * 2; }
         let fact = function f(n) { if (n <= 1) { return 1; } return n * f(n - 1); };
         console.log(r, fact(5));",
    )?;
    assert_eq!(out, vec!["8 120"]);
    Ok(())
}

#[test]
fn test_labeled_break_and_loops() -> anyhow::Result<()> {
    let out = run(
        "let i = 0;
         let hits = 0;
         outer: while (true) {
           i++;
           if (i > 3) { break outer; }
           hits = hits + i;
         }
         l: { console.log('in'); break l; }
         console.log(i, hits);",
    )?;
    assert_eq!(out, vec!["in", "4 6"]);
    Ok(())
}

#[test]
fn test_arrays_objects_and_strings() -> anyhow::Result<()> {
    let out = run(
        "let a = [1, 2];
         a.push(3, 4);
         let first = a.shift();
         a.unshift(0);
         let last = a.pop();
         a[5] = 'x';
         let o = {k: 1, 'quoted': [a.length]};
         o.k = o.k + 1;
         o['n'] = 'new';
         let s = 'hello';
         console.log(first, last, a.includes(3), a.length, a[4]);
         console.log(o);
         console.log(s.length, s.startsWith('he'), s.endsWith('lo'), s.includes('z'), s[1]);",
    )?;
    assert_eq!(
        out,
        vec![
            "1 4 true 6 undefined",
            "{ k: 2, quoted: [ 6 ], n: 'new' }",
            "5 true true false e",
        ]
    );
    Ok(())
}

#[test]
fn test_array_destructuring() -> anyhow::Result<()> {
    assert_eq!(run("let [a, b, c] = [1, 2]; console.log(a, b, c);")?, vec!["1 2 undefined"]);
    Ok(())
}

#[test]
fn test_runtime_errors() {
    assert_eq!(run_error("let y = z;"), EvalError::VariableNotFound("z".to_string()));
    assert_eq!(
        run_error("const k = 1; k = 2;"),
        EvalError::ConstAssignment("k".to_string())
    );
    assert!(matches!(run_error("let n = 1; n(2);"), EvalError::NotAFunction(_)));
    assert!(matches!(run_error("let u = undefined; let v = u.f;"), EvalError::TypeError { .. }));
    assert_eq!(
        run_error("let m = require('fs');"),
        EvalError::UnknownModule("fs".to_string())
    );
}

#[test]
fn test_limits() {
    let config = RetraceConfig {
        max_loop_iterations: 10,
        max_call_depth: 8,
        ..RetraceConfig::default()
    };
    let mut ev = Evaluator::new(config, Callbacks::untraced(Box::new(StaticIo::new())));
    let program = parse_program("while (true) { }").unwrap();
    assert_eq!(ev.run(&program), Err(EvalError::LoopLimit(10)));

    ev.reset();
    let program = parse_program("function f(n) { return f(n + 1); } f(0);").unwrap();
    assert_eq!(ev.run(&program), Err(EvalError::CallDepth(8)));
}

#[test]
fn test_array_write_past_limit() {
    assert_eq!(
        run_error("let a = [1]; a[1e18] = 2;"),
        EvalError::ArrayLength {
            index: 1_000_000_000_000_000_000,
            limit: RetraceConfig::default().max_array_length,
        }
    );

    let config = RetraceConfig {
        max_array_length: 4,
        ..RetraceConfig::default()
    };
    let mut ev = Evaluator::new(config, Callbacks::untraced(Box::new(StaticIo::new())));
    assert_eq!(
        run_with(&mut ev, "let a = []; a[3] = 1; console.log(a.length);").unwrap(),
        vec!["4"]
    );
    ev.reset();
    let program = parse_program("let a = []; a[4] = 1;").unwrap();
    assert_eq!(ev.run(&program), Err(EvalError::ArrayLength { index: 4, limit: 4 }));
}

#[test]
fn test_string_length_and_index_agree_outside_bmp() -> anyhow::Result<()> {
    let out = run("let s = '\u{1F600}a'; console.log(s.length, s[2]);")?;
    assert_eq!(out, vec!["3 a"]);
    Ok(())
}

#[test]
fn test_immediate_runs_after_synchronous_code() -> anyhow::Result<()> {
    let out = run(
        "let c = require('containerless');
         c.immediate('x', function(v) { console.log('later', v); });
         console.log('now');",
    )?;
    assert_eq!(out, vec!["now", "later x"]);
    Ok(())
}

#[test]
fn test_data_url_answers_synchronously() -> anyhow::Result<()> {
    let out = run(
        "let c = require('containerless');
         c.get('data:{\"n\": 2}', function(r) { console.log(r.n); });
         c.post({url: 'data:[1]', body: {}}, function(r) { console.log(r); });
         console.log('after');",
    )?;
    assert_eq!(out, vec!["2", "[ 1 ]", "after"]);
    Ok(())
}

#[test]
fn test_failed_request_delivers_undefined() -> anyhow::Result<()> {
    let io = StaticIo::new().with_route(Event::Get, "http://api/ok", json!({"ok": true}));
    let mut ev = Evaluator::new(RetraceConfig::default(), Callbacks::untraced(Box::new(io)));
    let out = run_with(
        &mut ev,
        "let c = require('containerless');
         c.get('http://api/missing', function(r) { console.log(typeof r); });
         c.get('http://api/ok', function(r) { console.log(r.ok); });
         console.log('sent');",
    )?;
    assert_eq!(out, vec!["sent", "undefined", "true"]);
    Ok(())
}

#[test]
fn test_listen_and_respond() -> anyhow::Result<()> {
    let mut ev = evaluator();
    run_with(
        &mut ev,
        "let c = require('containerless');
         c.listen(function(req) {
           c.immediate(req.x, function(x) { c.respond(x + 1); });
         });",
    )?;
    assert!(ev.has_listener());
    let (_, response) = ev.request(&json!({"x": 1}))?;
    assert_eq!(response, Some(json!(2.0)));

    let program = parse_program("let c = require('containerless'); c.listen(function(r) {}); c.listen(function(r) {});")?;
    ev.reset();
    assert_eq!(ev.run(&program), Err(EvalError::ListenTwice));
    Ok(())
}

#[test]
fn test_request_without_listener() {
    assert_eq!(
        evaluator().request(&json!({})).unwrap_err(),
        EvalError::NoListener
    );
}

#[test]
fn test_trace_natives_drive_the_recorder() -> anyhow::Result<()> {
    let mut ev = Evaluator::new(
        RetraceConfig::default(),
        Callbacks::traced(Recorder::new(), Box::new(StaticIo::new())),
    );
    run_with(
        &mut ev,
        "let exp = require('containerless/exp');
         let cb = require('containerless');
         cb.trace.newTrace();
         cb.trace.traceLet('x', exp.binop('+', exp.number(1), exp.identifier('y')));
         cb.trace.exitBlock();",
    )?;
    let trace = ev.callbacks().recorder().unwrap().get_trace();
    assert_eq!(
        trace,
        block(vec![let_(
            "x",
            binop(BinOp::Add, number(1.0), identifier("y"))
        )])
    );
    Ok(())
}

#[test]
fn test_trace_natives_check_their_arguments() {
    let mut ev = Evaluator::new(
        RetraceConfig::default(),
        Callbacks::traced(Recorder::new(), Box::new(StaticIo::new())),
    );
    let program = parse_program(
        "let exp = require('containerless/exp');
         let e = exp.binop('**', exp.number(1), exp.number(2));",
    )
    .unwrap();
    assert!(matches!(ev.run(&program), Err(EvalError::TypeError { .. })));

    let program = parse_program("let cb = require('containerless'); cb.trace.traceLet('x', 1);").unwrap();
    ev.reset();
    assert!(matches!(ev.run(&program), Err(EvalError::TypeError { .. })));

    for arity in ["1e18", "1.5", "-1"] {
        let program = parse_program(&format!(
            "let cb = require('containerless'); let b = cb.trace.traceFunctionBody(\"'ret\", {arity});"
        ))
        .unwrap();
        ev.reset();
        assert!(
            matches!(ev.run(&program), Err(EvalError::TypeError { .. })),
            "arity {arity}"
        );
    }
}

#[test]
fn test_trace_natives_require_a_recorder() {
    assert_eq!(
        run_error("let cb = require('containerless'); cb.trace.newTrace();"),
        EvalError::Trace(TraceError::NotTracing)
    );
}
