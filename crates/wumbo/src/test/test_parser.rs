// Parser shape tests

use crate::ast::*;
use crate::parser::{parse, tokenize, Token};

#[test]
fn test_tokenize_numbers() {
    let tokens = tokenize("1 2.5 0x10 1e3 9223372036854775808").unwrap();
    assert_eq!(tokens[0], Token::Int(1));
    assert_eq!(tokens[1], Token::Float(2.5));
    assert_eq!(tokens[2], Token::Int(16));
    assert_eq!(tokens[3], Token::Float(1000.0));
    // decimal overflow falls back to float
    assert_eq!(tokens[4], Token::Float(9223372036854775808.0));
}

#[test]
fn test_tokenize_strings() {
    let tokens = tokenize(r#"'a\n' "b\65" [[long
line]]"#)
        .unwrap();
    assert_eq!(tokens[0], Token::Str(b"a\n".to_vec()));
    assert_eq!(tokens[1], Token::Str(b"bA".to_vec()));
    assert_eq!(tokens[2], Token::Str(b"long\nline".to_vec()));
}

#[test]
fn test_tokenize_symbols() {
    let tokens = tokenize("... .. . :: : // / <= << <").unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Ellipsis,
            Token::Concat,
            Token::Dot,
            Token::DoubleColon,
            Token::Colon,
            Token::DoubleSlash,
            Token::Slash,
            Token::Lte,
            Token::LShift,
            Token::Lt,
        ]
    );
}

#[test]
fn test_comments_are_skipped() {
    let block = parse(
        "-- line comment
        x = 1 --[[ long
        comment ]] y = 2",
    )
    .unwrap();
    assert_eq!(block.statements.len(), 2);
}

#[test]
fn test_simple_assignment() {
    let block = parse("x = 5").unwrap();
    assert_eq!(block.statements.len(), 1);
    match &block.statements[0] {
        Statement::Assignment { targets, values } => {
            assert_eq!(targets.len(), 1);
            assert_eq!(values.len(), 1);
            assert!(matches!(values[0], Expression::Integer(5)));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_operator_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    let block = parse("return 1 + 2 * 3").unwrap();
    let ret = block.ret.as_ref().unwrap();
    match &ret[0] {
        Expression::Binary(outer) => {
            assert_eq!(outer.op, BinOperator::Addition);
            match &outer.rhs {
                Expression::Binary(inner) => {
                    assert_eq!(inner.op, BinOperator::Multiplication)
                }
                other => panic!("expected multiplication on the right, got {:?}", other),
            }
        }
        other => panic!("expected binary operation, got {:?}", other),
    }
}

#[test]
fn test_power_is_right_associative() {
    let block = parse("return 2 ^ 3 ^ 4").unwrap();
    let ret = block.ret.as_ref().unwrap();
    match &ret[0] {
        Expression::Binary(outer) => {
            assert_eq!(outer.op, BinOperator::Exponentiation);
            assert!(matches!(outer.lhs, Expression::Integer(2)));
            assert!(matches!(&outer.rhs, Expression::Binary(inner)
                if inner.op == BinOperator::Exponentiation));
        }
        other => panic!("expected binary operation, got {:?}", other),
    }
}

#[test]
fn test_unary_binds_looser_than_power() {
    // -2^2 parses as -(2^2)
    let block = parse("return -2 ^ 2").unwrap();
    let ret = block.ret.as_ref().unwrap();
    match &ret[0] {
        Expression::Unary(unary) => {
            assert_eq!(unary.op, UnOperator::Minus);
            assert!(matches!(&unary.rhs, Expression::Binary(inner)
                if inner.op == BinOperator::Exponentiation));
        }
        other => panic!("expected unary operation, got {:?}", other),
    }
}

#[test]
fn test_prefix_chain() {
    let block = parse("x = t.a[1].b").unwrap();
    match &block.statements[0] {
        Statement::Assignment { values, .. } => match &values[0] {
            Expression::Prefix(prefix) => {
                assert!(matches!(&prefix.head, PrefixHead::Name(n) if n == "t"));
                assert_eq!(prefix.tail.len(), 3);
                assert!(matches!(&prefix.tail[0], PrefixTail::Field(n) if n == "a"));
                assert!(matches!(&prefix.tail[1], PrefixTail::Index(_)));
                assert!(matches!(&prefix.tail[2], PrefixTail::Field(n) if n == "b"));
            }
            other => panic!("expected prefix expression, got {:?}", other),
        },
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_method_call_statement() {
    let block = parse("obj:method(1, 2)").unwrap();
    match &block.statements[0] {
        Statement::Call(prefix) => match prefix.tail.last() {
            Some(PrefixTail::Call { method, args }) => {
                assert_eq!(method.as_deref(), Some("method"));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call tail, got {:?}", other),
        },
        other => panic!("expected call statement, got {:?}", other),
    }
}

#[test]
fn test_call_with_string_and_table_args() {
    let block = parse("f 'hello' g{1, 2}").unwrap();
    assert_eq!(block.statements.len(), 2);
    assert!(matches!(block.statements[0], Statement::Call(_)));
    assert!(matches!(block.statements[1], Statement::Call(_)));
}

#[test]
fn test_method_definition_gets_self() {
    let block = parse("function t.a:m(x) return x end").unwrap();
    match &block.statements[0] {
        Statement::Function { path, body } => {
            assert_eq!(path.len(), 3);
            assert_eq!(body.params[0], "self");
            assert_eq!(body.params[1], "x");
        }
        other => panic!("expected function statement, got {:?}", other),
    }
}

#[test]
fn test_numeric_and_generic_for() {
    let block = parse("for i = 1, 10, 2 do end for k, v in pairs(t) do end").unwrap();
    assert!(matches!(
        &block.statements[0],
        Statement::NumericFor { exps, .. } if exps.len() == 3
    ));
    assert!(matches!(
        &block.statements[1],
        Statement::GenericFor { names, .. } if names.len() == 2
    ));
}

#[test]
fn test_local_declarations() {
    let block = parse("local a, b = 1 local function f() end").unwrap();
    match &block.statements[0] {
        Statement::Local { names, usage, exps } => {
            assert_eq!(names.len(), 2);
            assert_eq!(usage.len(), 2);
            assert_eq!(exps.len(), 1);
        }
        other => panic!("expected local statement, got {:?}", other),
    }
    assert!(matches!(
        &block.statements[1],
        Statement::LocalFunction { name, .. } if name == "f"
    ));
}

#[test]
fn test_table_constructor_fields() {
    let block = parse("t = {1, x = 2, [3] = 4, 5}").unwrap();
    match &block.statements[0] {
        Statement::Assignment { values, .. } => match &values[0] {
            Expression::Table(fields) => {
                assert_eq!(fields.len(), 4);
                assert!(matches!(fields[0].key, FieldKey::Positional));
                assert!(matches!(&fields[1].key, FieldKey::Named(n) if n == "x"));
                assert!(matches!(fields[2].key, FieldKey::Bracket(_)));
                assert!(matches!(fields[3].key, FieldKey::Positional));
            }
            other => panic!("expected table constructor, got {:?}", other),
        },
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_repeat_and_labels() {
    let block = parse("::top:: repeat x = x + 1 until x > 10 goto top").unwrap();
    assert!(matches!(&block.statements[0], Statement::Label(n) if n == "top"));
    assert!(matches!(block.statements[1], Statement::Repeat { .. }));
    assert!(matches!(&block.statements[2], Statement::Goto(n) if n == "top"));
}

#[test]
fn test_return_must_be_last() {
    let block = parse("return 1, 2").unwrap();
    assert_eq!(block.ret.as_ref().unwrap().len(), 2);
    assert!(parse("return 1 x = 2").is_err());
}

#[test]
fn test_assignment_to_call_is_rejected() {
    assert!(parse("f() = 1").is_err());
}

#[test]
fn test_vararg_function() {
    let block = parse("local function f(a, ...) return ... end").unwrap();
    match &block.statements[0] {
        Statement::LocalFunction { body, .. } => {
            assert!(body.vararg);
            assert_eq!(body.params.len(), 1);
        }
        other => panic!("expected local function, got {:?}", other),
    }
}
