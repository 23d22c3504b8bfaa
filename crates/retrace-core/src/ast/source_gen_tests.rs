// Tests for source code generation

#[cfg(test)]
mod tests {
    use crate::ast::source_gen::{escape_string, format_number};
    use crate::ast::*;
    use crate::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn reprint(source: &str) -> String {
        parse_program(source).expect("parse").to_source()
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(escape_string("plain"), "\"plain\"");
        assert_eq!(escape_string("'ret"), "\"'ret\"");
        assert_eq!(escape_string("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }

    #[test]
    fn test_binary_parenthesization() {
        let sum = Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b"));
        let product = Expr::binary(BinaryOp::Mul, sum.clone(), Expr::ident("c"));
        assert_eq!(product.to_source(), "(a + b) * c");

        let right_nested = Expr::binary(BinaryOp::Sub, Expr::ident("a"), sum);
        assert_eq!(right_nested.to_source(), "a - (a + b)");
    }

    #[test]
    fn test_method_call_source() {
        let call = Expr::method_call(
            Expr::member(Expr::ident("cb"), "trace"),
            "traceLet",
            vec![Expr::string("x"), Expr::number(1.0)],
        );
        assert_eq!(call.to_source(), "cb.trace.traceLet(\"x\", 1)");
    }

    #[test]
    fn test_statements_reprint() {
        let source = "let x = 1;\nif (x > 0) {\n  x = x - 1;\n} else {\n  x++;\n}\n";
        assert_eq!(reprint(source), source);
    }

    #[test]
    fn test_function_and_label_reprint() {
        let source = "function F(a, b) {\n  l: {\n    break l;\n  }\n  return a + b;\n}\n";
        assert_eq!(reprint(source), source);
    }

    #[test]
    fn test_reprint_is_stable() {
        let source = "let o = {a: 1, 'b c': [1, 2]}; while (!(o.a >= 3)) { o.a = o.a + 1; }";
        let once = reprint(source);
        let twice = reprint(&once);
        assert_eq!(once, twice);
        assert!(once.contains("\"b c\": [1, 2]"));
    }
}
