use pretty_assertions::assert_eq;

use super::{parse_program, Normalizer, ParseError};
use crate::ast::ToSource;

fn normalized(source: &str) -> Result<String, ParseError> {
    let program = parse_program(source)?;
    Ok(Normalizer::new().normalize(program)?.to_source())
}

#[test]
fn test_splits_declarations() {
    assert_eq!(normalized("let a = 1, b = a;").unwrap(), "let a = 1;\nlet b = a;\n");
}

#[test]
fn test_lifts_nested_calls() {
    assert_eq!(
        normalized("let y = f(g(1)) + 2;").unwrap(),
        "let $t0 = g(1);\nlet $t1 = f($t0);\nlet y = $t1 + 2;\n"
    );
}

#[test]
fn test_call_statement_gets_binding() {
    assert_eq!(normalized("console.log(x);").unwrap(), "let $t0 = console.log(x);\n");
}

#[test]
fn test_call_in_declaration_stays_in_place() {
    assert_eq!(normalized("let r = F(1, 2);").unwrap(), "let r = F(1, 2);\n");
}

#[test]
fn test_compound_assignment_desugars() {
    assert_eq!(normalized("x += 2;").unwrap(), "x = x + 2;\n");
    assert_eq!(normalized("x *= y - 1;").unwrap(), "x = x * (y - 1);\n");
}

#[test]
fn test_assignment_from_call_is_lifted() {
    assert_eq!(normalized("x = F(1);").unwrap(), "let $t0 = F(1);\nx = $t0;\n");
}

#[test]
fn test_function_expressions_become_declarations() {
    let out = normalized("cb.get('u', function(resp) { return resp; });").unwrap();
    assert_eq!(
        out,
        "function $f0(resp) {\n  return resp;\n}\nlet $t0 = cb.get(\"u\", $f0);\n"
    );
}

#[test]
fn test_let_bound_function_expression_kept() {
    let out = normalized("let f = function(x) { return x; };").unwrap();
    assert_eq!(out, "let f = function(x) {\n  return x;\n};\n");
}

#[test]
fn test_if_test_call_lifted_before_if() {
    let out = normalized("if (f()) { x = 1; }").unwrap();
    assert_eq!(out, "let $t0 = f();\nif ($t0) {\n  x = 1;\n}\n");
}

#[test]
fn test_return_of_call() {
    let out = normalized("function F() { return G(1); }").unwrap();
    assert_eq!(out, "function F() {\n  let $t0 = G(1);\n  return $t0;\n}\n");
}

#[test]
fn test_call_in_loop_condition_rejected() {
    match normalized("while (f()) { }") {
        Err(ParseError::Unsupported { construct, .. }) => {
            assert_eq!(construct, "call in loop condition")
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_call_in_short_circuit_rejected() {
    assert!(matches!(
        normalized("let a = x && f();"),
        Err(ParseError::Unsupported { .. })
    ));
}

#[test]
fn test_reserved_prefix_rejected() {
    match normalized("let $x = 1;") {
        Err(ParseError::ReservedIdentifier { name, .. }) => assert_eq!(name, "$x"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_nested_update_rejected() {
    assert!(matches!(
        normalized("let y = x++;"),
        Err(ParseError::Unsupported { .. })
    ));
}
