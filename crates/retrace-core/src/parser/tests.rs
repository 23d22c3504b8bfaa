use pretty_assertions::assert_eq;

use super::{parse_program, ParseError};
use crate::ast::*;

fn first_stmt(source: &str) -> StmtKind {
    parse_program(source)
        .expect("parse")
        .body
        .into_iter()
        .next()
        .expect("at least one statement")
        .kind
}

fn expr_of(source: &str) -> ExprKind {
    match first_stmt(source) {
        StmtKind::Expr(expr) => expr.kind,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn test_parse_declarations() {
    let program = parse_program("let x = 1, y; const z = 'hi';").unwrap();
    assert_eq!(program.body.len(), 2);
    match &program.body[0].kind {
        StmtKind::Declare { kind, declarations } => {
            assert_eq!(*kind, DeclKind::Let);
            assert_eq!(declarations.len(), 2);
            assert_eq!(declarations[0].target, Pattern::Identifier("x".into()));
            assert!(declarations[1].init.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_keyword_prefixed_identifiers() {
    // `letter` must not be read as `let ter`
    match expr_of("letter = iffy;") {
        ExprKind::Assign { target, value, .. } => {
            assert_eq!(target.as_identifier(), Some("letter"));
            assert_eq!(value.as_identifier(), Some("iffy"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_operator_precedence() {
    match expr_of("a + b * c === d || e;") {
        ExprKind::Binary { op, left, .. } => {
            assert_eq!(op, BinaryOp::Or);
            match left.kind {
                ExprKind::Binary { op, left, .. } => {
                    assert_eq!(op, BinaryOp::StrictEq);
                    match left.kind {
                        ExprKind::Binary { op, right, .. } => {
                            assert_eq!(op, BinaryOp::Add);
                            assert!(matches!(
                                right.kind,
                                ExprKind::Binary {
                                    op: BinaryOp::Mul,
                                    ..
                                }
                            ));
                        }
                        other => panic!("unexpected {other:?}"),
                    }
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_left_associativity() {
    let program = parse_program("a - b - c;").unwrap();
    assert_eq!(program.to_source(), "a - b - c;\n");
    match expr_of("a - b - c;") {
        ExprKind::Binary { left, right, .. } => {
            assert!(matches!(left.kind, ExprKind::Binary { .. }));
            assert_eq!(right.as_identifier(), Some("c"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_unary_and_update() {
    match expr_of("x++;") {
        ExprKind::Update { op, prefix, .. } => {
            assert_eq!(op, UpdateOp::Increment);
            assert!(!prefix);
        }
        other => panic!("unexpected {other:?}"),
    }
    match expr_of("typeof -x;") {
        ExprKind::Unary { op, operand } => {
            assert_eq!(op, UnaryOp::Typeof);
            assert!(matches!(
                operand.kind,
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    ..
                }
            ));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_call_and_member_chain() {
    match expr_of("containerless.get('data:1', function(resp) { return resp; });") {
        ExprKind::Call { callee, args } => {
            assert!(matches!(callee.kind, ExprKind::Member { ref property, .. } if property == "get"));
            assert_eq!(args.len(), 2);
            assert!(matches!(args[1].kind, ExprKind::Function { name: None, .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_keywords_as_property_names() {
    match expr_of("containerless.delete(url, cb);") {
        ExprKind::Call { callee, .. } => {
            assert!(matches!(callee.kind, ExprKind::Member { ref property, .. } if property == "delete"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_object_and_array_literals() {
    match first_stmt("let o = { a: 1, 'b': [true, null] };") {
        StmtKind::Declare { declarations, .. } => match &declarations[0].init {
            Some(Expr {
                kind: ExprKind::Object(entries),
                ..
            }) => {
                assert_eq!(entries[0].0, "a");
                assert_eq!(entries[1].0, "b");
                assert!(matches!(entries[1].1.kind, ExprKind::Array(ref items) if items.len() == 2));
            }
            other => panic!("unexpected {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_control_flow_statements() {
    let source = r#"
        function F(x) {
            outer: while (x > 0) {
                if (x === 3) { break outer; } else x = x - 1;
            }
            return x;
        }
    "#;
    match first_stmt(source) {
        StmtKind::Function { name, params, body } => {
            assert_eq!(name, "F");
            assert_eq!(params, vec!["x".to_string()]);
            assert_eq!(body.len(), 2);
            match &body[0].kind {
                StmtKind::Labeled { label, body } => {
                    assert_eq!(label, "outer");
                    assert!(matches!(body[0].kind, StmtKind::While { .. }));
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(matches!(body[1].kind, StmtKind::Return { value: Some(_) }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_string_escapes() {
    match expr_of(r#""a\"b\nA";"#) {
        ExprKind::String(s) => assert_eq!(s, "a\"b\nA"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_comments_are_skipped() {
    let program = parse_program("// leading\nlet x = 1; /* block */ x = 2;").unwrap();
    assert_eq!(program.body.len(), 2);
}

#[test]
fn test_unsupported_constructs_are_named() {
    let cases = [
        ("for (let i = 0; i < 3; i++) { x(); }", "for statement"),
        ("while (true) { continue; }", "continue statement"),
        ("let y = x ? 1 : 2;", "conditional expression"),
        ("let o = new Thing();", "new expression"),
        ("try { f(); } catch (e) { g(); }", "try statement"),
        ("function f([a, b]) { }", "destructuring parameter"),
    ];
    for (source, construct) in cases {
        match parse_program(source) {
            Err(ParseError::Unsupported { construct: found, .. }) => {
                assert_eq!(found, construct, "source: {source}")
            }
            other => panic!("expected unsupported {construct}, got {other:?}"),
        }
    }
}

#[test]
fn test_syntax_error_has_location() {
    match parse_program("let x = ;") {
        Err(ParseError::Syntax { span, .. }) => assert_eq!(span.line, 1),
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_invalid_assignment_target() {
    assert!(matches!(
        parse_program("1 = x;"),
        Err(ParseError::InvalidTarget { .. }) | Err(ParseError::Syntax { .. })
    ));
}
