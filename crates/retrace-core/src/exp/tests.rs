use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::builders::*;
use super::*;

#[test]
fn test_json_shape_uses_kind_tags() {
    let exp = if_(
        binop(BinOp::Gt, identifier("x"), number(0.0)),
        vec![let_("y", string("pos"))],
        vec![unknown()],
    );
    assert_eq!(
        exp.to_json(),
        json!({
            "kind": "if",
            "cond": {
                "kind": "binop",
                "op": ">",
                "e1": { "kind": "identifier", "name": "x" },
                "e2": { "kind": "number", "value": 0.0 }
            },
            "truePart": [
                { "kind": "let", "name": "y", "named": { "kind": "string", "value": "pos" } }
            ],
            "falsePart": [ { "kind": "unknown" } ]
        })
    );
}

#[test]
fn test_json_callback_and_method_fields() {
    let exp = callback(
        "get",
        string("data:1"),
        vec!["clos".into(), "response".into()],
        clos(IndexMap::new()),
        vec![prim_app("send", vec![method_call(identifier("a"), "push", vec![number(1.0)])])],
    );
    let value = exp.to_json();
    assert_eq!(value["kind"], "callback");
    assert_eq!(value["eventArg"]["value"], "data:1");
    assert_eq!(value["callbackArgs"], json!(["clos", "response"]));
    assert_eq!(value["body"][0]["kind"], "primApp");
    assert_eq!(value["body"][0]["eventArgs"][0]["kind"], "methodCall");
    assert_eq!(value["body"][0]["eventArgs"][0]["methodCallArgs"][0]["value"], 1.0);
}

#[test]
fn test_json_deserializes_back() {
    let exp = block(vec![
        set(LVal::Identifier { name: "x".into() }, op1(Op1::Not, boolean(true))),
        break_("'ret", undefined()),
    ]);
    let text = serde_json::to_string(&exp).unwrap();
    let back: Exp = serde_json::from_str(&text).unwrap();
    assert_eq!(back, exp);
}

#[test]
fn test_merge_fills_holes() {
    let first = if_(identifier("c"), vec![number(1.0)], vec![unknown()]);
    let second = if_(identifier("c"), vec![unknown()], vec![number(2.0)]);
    let merged = first.merge(&second).unwrap();
    assert_eq!(merged, if_(identifier("c"), vec![number(1.0)], vec![number(2.0)]));
}

#[test]
fn test_merge_extends_open_block_tail() {
    let mut existing = block(vec![let_("a", number(1.0)), unknown()]);
    existing
        .merge_in(block(vec![let_("a", number(1.0)), let_("b", number(2.0))]))
        .unwrap();
    assert_eq!(
        existing,
        block(vec![let_("a", number(1.0)), let_("b", number(2.0))])
    );
}

#[test]
fn test_merge_rejects_length_change() {
    let closed = block(vec![let_("a", number(1.0))]);
    let longer = block(vec![let_("a", number(1.0)), let_("b", number(2.0))]);
    assert!(matches!(
        closed.merge(&longer),
        Err(Mismatch::Length { expected: 1, found: 2, .. })
    ));
}

#[test]
fn test_merge_reports_literal_and_identifier_mismatch() {
    assert!(matches!(
        number(1.0).merge(&number(2.0)),
        Err(Mismatch::Literal { .. })
    ));
    assert!(matches!(
        identifier("x").merge(&identifier("y")),
        Err(Mismatch::Identifier { .. })
    ));
    assert!(matches!(
        number(1.0).merge(&string("1")),
        Err(Mismatch::Kind {
            expected: "number",
            found: "string"
        })
    ));
}

#[test]
fn test_merge_binop_is_pairwise() {
    let a = binop(BinOp::Add, identifier("x"), identifier("y"));
    let swapped = binop(BinOp::Add, identifier("y"), identifier("x"));
    assert!(a.merge(&a.clone()).is_ok());
    assert!(a.merge(&swapped).is_err());
    assert!(matches!(
        a.merge(&binop(BinOp::Sub, identifier("x"), identifier("y"))),
        Err(Mismatch::Operator {
            expected: "+",
            found: "-"
        })
    ));
}

#[test]
fn test_merge_clos_requires_same_fields() {
    let mut a = IndexMap::new();
    a.insert("x".to_string(), identifier("x"));
    let mut b = IndexMap::new();
    b.insert("y".to_string(), identifier("y"));
    assert!(matches!(clos(a).merge(&clos(b)), Err(Mismatch::Keys { .. })));
}

#[test]
fn test_lval_conversion() {
    assert_eq!(
        LVal::try_from(get(identifier("o"), "f")).unwrap(),
        LVal::Index {
            exp: Box::new(identifier("o")),
            index: Box::new(string("f")),
        }
    );
    assert!(LVal::try_from(number(1.0)).is_err());
}

#[test]
fn test_operator_symbols() {
    for op in BinOp::ALL {
        assert_eq!(BinOp::from_symbol(op.symbol()), Some(op));
    }
    assert_eq!(Op1::from_symbol("typeof"), Some(Op1::Typeof));
    assert_eq!(Op1::from_symbol("~"), None);
}

#[test]
fn test_display_renders_holes() {
    let trace = block(vec![
        let_("x", number(10.0)),
        if_(
            binop(BinOp::Gt, identifier("x"), number(5.0)),
            vec![let_("y", from(identifier("$clos"), "a"))],
            vec![unknown()],
        ),
    ]);
    assert_eq!(
        trace.to_string(),
        "let x = 10;\nif (x > 5) {\n  let y = $clos->a;\n} else {\n  ?\n}"
    );
}
