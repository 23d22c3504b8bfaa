use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use super::*;
use crate::exp::builders::*;
use crate::exp::{BinOp, Mismatch};

fn x_gt(n: f64) -> Exp {
    binop(BinOp::Gt, identifier("x"), number(n))
}

/// Trace of `let x = <input>; if (x > 5) { let y = 1 } else { let y = 2 }`
fn run_branch(rec: &mut Recorder, input: f64) -> TraceResult<()> {
    rec.new_trace()?;
    rec.trace_let("x", number(input))?;
    if input > 5.0 {
        rec.trace_if_true(x_gt(5.0))?;
        rec.trace_let("y", number(1.0))?;
    } else {
        rec.trace_if_false(x_gt(5.0))?;
        rec.trace_let("y", number(2.0))?;
    }
    rec.exit_block()?;
    rec.exit_block()
}

#[test]
fn test_straight_line_trace() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.new_trace()?;
    rec.trace_let("x", number(1.0))?;
    rec.trace_set(
        LVal::Identifier { name: "x".into() },
        binop(BinOp::Add, identifier("x"), number(1.0)),
    )?;
    rec.exit_block()?;
    assert_eq!(
        rec.get_trace(),
        block(vec![
            let_("x", number(1.0)),
            set(
                LVal::Identifier { name: "x".into() },
                binop(BinOp::Add, identifier("x"), number(1.0))
            ),
        ])
    );
    Ok(())
}

#[test]
fn test_unfinished_trace_keeps_hole() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_let("x", number(1.0))?;
    assert_eq!(rec.get_trace(), block(vec![let_("x", number(1.0)), unknown()]));
    Ok(())
}

#[test]
fn test_retrace_is_idempotent() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    run_branch(&mut rec, 10.0)?;
    let first = rec.get_trace();
    run_branch(&mut rec, 10.0)?;
    assert_eq!(rec.get_trace(), first);
    Ok(())
}

#[test]
fn test_branches_union_across_runs() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    run_branch(&mut rec, 10.0)?;
    assert_eq!(
        rec.get_trace(),
        block(vec![
            let_("x", number(10.0)),
            if_(x_gt(5.0), vec![let_("y", number(1.0))], vec![unknown()]),
        ])
    );

    // A different input would record a different literal for x
    let mut rec = Recorder::new();
    rec.new_trace()?;
    rec.trace_let("x", identifier("input"))?;
    rec.trace_if_true(x_gt(5.0))?;
    rec.trace_let("y", number(1.0))?;
    rec.exit_block()?;
    rec.exit_block()?;
    rec.new_trace()?;
    rec.trace_let("x", identifier("input"))?;
    rec.trace_if_false(x_gt(5.0))?;
    rec.trace_let("y", number(2.0))?;
    rec.exit_block()?;
    rec.exit_block()?;
    assert_eq!(
        rec.get_trace(),
        block(vec![
            let_("x", identifier("input")),
            if_(
                x_gt(5.0),
                vec![let_("y", number(1.0))],
                vec![let_("y", number(2.0))]
            ),
        ])
    );
    Ok(())
}

#[test]
fn test_literal_mismatch_poisons_recorder() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    run_branch(&mut rec, 10.0)?;
    rec.new_trace()?;
    let err = rec.trace_let("x", number(11.0)).unwrap_err();
    assert!(matches!(err, TraceError::Mismatch(Mismatch::Literal { .. })));
    assert!(rec.is_poisoned());
    assert!(matches!(rec.new_trace(), Err(TraceError::Poisoned(_))));
    Ok(())
}

#[test]
fn test_binding_name_mismatch_poisons_recorder() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.new_trace()?;
    rec.trace_let("x", number(12.0))?;
    rec.exit_block()?;
    rec.new_trace()?;
    assert_eq!(
        rec.trace_let("z", number(12.0)),
        Err(TraceError::Mismatch(Mismatch::Name {
            expected: "x".to_string(),
            found: "z".to_string()
        }))
    );
    assert!(rec.is_poisoned());
    assert!(matches!(
        rec.trace_let("x", number(12.0)),
        Err(TraceError::Poisoned(_))
    ));
    Ok(())
}

#[test]
fn test_kind_mismatch_detected() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_let("x", number(1.0))?;
    rec.exit_block()?;
    rec.new_trace()?;
    let err = rec.trace_if_true(boolean(true)).unwrap_err();
    assert_eq!(
        err,
        TraceError::Mismatch(Mismatch::Kind {
            expected: "let",
            found: "if"
        })
    );
    Ok(())
}

#[test]
fn test_premature_exit() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_let("a", number(1.0))?;
    rec.trace_let("b", number(2.0))?;
    rec.exit_block()?;
    rec.new_trace()?;
    rec.trace_let("a", number(1.0))?;
    assert_eq!(
        rec.exit_block(),
        Err(TraceError::PrematureExit {
            cursor: 1,
            len: 2,
            next: "let"
        })
    );
    Ok(())
}

#[test]
fn test_block_overrun() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_let("a", number(1.0))?;
    rec.exit_block()?;
    rec.new_trace()?;
    rec.trace_let("a", number(1.0))?;
    assert_eq!(
        rec.trace_let("b", number(2.0)),
        Err(TraceError::BlockOverrun { len: 1 })
    );
    Ok(())
}

#[test]
fn test_exit_past_top_level() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.exit_block()?;
    assert_eq!(rec.exit_block(), Err(TraceError::ExitPastTopLevel));
    Ok(())
}

#[test]
fn test_function_call_and_return() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_function_call("r", vec![identifier("F"), number(2.0)])?;
    let args = rec.trace_function_body("'ret", 1)?;
    assert_eq!(args, vec![identifier("F"), number(2.0)]);
    rec.trace_let("x", args[1].clone())?;
    rec.trace_break("'ret", binop(BinOp::Add, identifier("x"), number(1.0)))?;
    rec.exit_block()?; // call site
    rec.exit_block()?; // top level
    assert_eq!(
        rec.get_trace(),
        block(vec![let_(
            "r",
            block(vec![label(
                "'ret",
                vec![
                    let_("x", number(2.0)),
                    break_("'ret", binop(BinOp::Add, identifier("x"), number(1.0))),
                ]
            )])
        )])
    );
    Ok(())
}

#[test]
fn test_function_body_pads_missing_arguments() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_function_call("r", vec![identifier("F")])?;
    let args = rec.trace_function_body("'ret", 2)?;
    assert_eq!(args, vec![identifier("F"), undefined(), undefined()]);
    Ok(())
}

#[test]
fn test_function_body_rejects_oversized_arity() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_function_call("r", vec![identifier("F")])?;
    assert_eq!(
        rec.trace_function_body("'ret", usize::MAX),
        Err(TraceError::Arity {
            arity: usize::MAX,
            max: MAX_ARITY
        })
    );
    assert!(rec.is_poisoned());
    Ok(())
}

#[test]
fn test_empty_arg_stack() {
    let mut rec = Recorder::new();
    assert_eq!(
        rec.trace_function_body("'ret", 0),
        Err(TraceError::EmptyArgStack)
    );
}

/// `function F(x) { if (x > 10) { return 42; } return 24; } let r = F(<x>);`
fn run_early_return(rec: &mut Recorder, x: f64) -> TraceResult<()> {
    rec.new_trace()?;
    rec.trace_function_call("r", vec![identifier("F"), identifier("input")])?;
    let args = rec.trace_function_body("'ret", 1)?;
    rec.trace_let("x", args[1].clone())?;
    if x > 10.0 {
        rec.trace_if_true(x_gt(10.0))?;
        rec.trace_break("'ret", number(42.0))?;
    } else {
        rec.trace_if_false(x_gt(10.0))?;
        rec.exit_block()?;
        rec.trace_break("'ret", number(24.0))?;
    }
    rec.exit_block()?;
    rec.exit_block()
}

#[test]
fn test_early_return_leaves_rest_of_body_open() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    run_early_return(&mut rec, 11.0)?;
    run_early_return(&mut rec, 9.0)?;
    run_early_return(&mut rec, 12.0)?;
    assert_eq!(
        rec.get_trace(),
        block(vec![let_(
            "r",
            block(vec![label(
                "'ret",
                vec![
                    let_("x", identifier("input")),
                    if_(
                        x_gt(10.0),
                        vec![break_("'ret", number(42.0))],
                        vec![]
                    ),
                    break_("'ret", number(24.0)),
                ]
            )])
        )])
    );
    Ok(())
}

#[test]
fn test_labeled_break_unwinds_nested_blocks() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_label("l")?;
    rec.trace_if_true(boolean(true))?;
    rec.trace_break("l", undefined())?;
    rec.trace_let("after", number(1.0))?;
    rec.exit_block()?;
    assert_eq!(
        rec.get_trace(),
        block(vec![
            label(
                "l",
                vec![
                    if_(boolean(true), vec![break_("l", undefined())], vec![unknown()]),
                    unknown(),
                ]
            ),
            let_("after", number(1.0)),
        ])
    );
    Ok(())
}

#[test]
fn test_break_to_missing_label() {
    let mut rec = Recorder::new();
    assert_eq!(
        rec.trace_break("nowhere", undefined()),
        Err(TraceError::UnknownLabel("nowhere".into()))
    );
}

#[test]
fn test_while_loop_iterations() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    let cond = binop(BinOp::Lt, identifier("i"), number(3.0));
    rec.trace_let("i", number(0.0))?;
    rec.trace_while(cond.clone())?;
    for _ in 0..3 {
        rec.trace_loop()?;
        rec.trace_set(
            LVal::Identifier { name: "i".into() },
            binop(BinOp::Add, identifier("i"), number(1.0)),
        )?;
    }
    rec.exit_block()?;
    rec.exit_block()?;
    assert_eq!(
        rec.get_trace(),
        block(vec![
            let_("i", number(0.0)),
            while_(
                cond,
                vec![set(
                    LVal::Identifier { name: "i".into() },
                    binop(BinOp::Add, identifier("i"), number(1.0))
                )]
            ),
        ])
    );
    Ok(())
}

#[test]
fn test_loop_body_never_entered() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    rec.trace_while(boolean(false))?;
    rec.exit_block()?;
    rec.exit_block()?;
    assert_eq!(
        rec.get_trace(),
        block(vec![while_(boolean(false), vec![unknown()])])
    );
    Ok(())
}

#[test]
fn test_trace_loop_outside_loop() {
    let mut rec = Recorder::new();
    assert_eq!(
        rec.trace_loop(),
        Err(TraceError::ScopeMismatch {
            expected: "loop",
            found: "block"
        })
    );
}

#[test]
fn test_callback_context_records_into_callback_body() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    let ctx = rec.trace_callback(
        "get",
        string("data:1"),
        vec!["clos".into(), "response".into()],
        clos(IndexMap::new()),
    )?;
    rec.exit_block()?;
    assert_eq!(rec.context_count(), 2);

    for _ in 0..2 {
        let previous = rec.switch_to(ctx)?;
        rec.new_trace()?;
        rec.push_args(vec![identifier("clos"), identifier("response")])?;
        let args = rec.trace_function_body("'ret", 1)?;
        rec.trace_let("response", args[1].clone())?;
        rec.trace_prim_app("send", vec![identifier("response")])?;
        rec.exit_block()?;
        rec.exit_block()?;
        rec.new_trace()?;
        assert_eq!(rec.switch_to(previous)?, ctx);
        assert_eq!(rec.active_context(), ContextId::ROOT);
    }

    assert_eq!(
        rec.get_trace(),
        block(vec![callback(
            "get",
            string("data:1"),
            vec!["clos".into(), "response".into()],
            clos(IndexMap::new()),
            vec![label(
                "'ret",
                vec![
                    let_("response", identifier("response")),
                    prim_app("send", vec![identifier("response")]),
                ]
            )]
        )])
    );
    Ok(())
}

#[test]
fn test_exit_past_callback_top_level_fails() -> anyhow::Result<()> {
    let mut rec = Recorder::new();
    let ctx = rec.trace_callback("listen", number(0.0), vec![], clos(IndexMap::new()))?;
    let previous = rec.switch_to(ctx)?;
    assert_eq!(rec.exit_block(), Err(TraceError::ExitPastTopLevel));
    assert_eq!(rec.active_context(), ctx);
    assert_eq!(previous, ContextId::ROOT);
    Ok(())
}

#[test]
fn test_unknown_context_rejected() {
    let mut rec = Recorder::new();
    rec.release(ContextId(7));
    assert_eq!(
        rec.switch_to(ContextId(7)),
        Err(TraceError::UnknownContext(ContextId(7)))
    );
}
