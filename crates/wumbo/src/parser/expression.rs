//! Expression parsing: literals, prefix expressions, operator precedence

use nom::{combinator::opt, multi::many0, sequence::pair, IResult, Parser};
use smol_str::SmolStr;

use super::{parse_error, token_tag, Token, TokenSlice};
use crate::ast::*;

pub(super) fn name(input: TokenSlice) -> IResult<TokenSlice, SmolStr> {
    if let Some(Token::Name(n)) = input.0.first() {
        Ok((TokenSlice(&input.0[1..]), n.clone()))
    } else {
        Err(parse_error(input))
    }
}

fn literal(input: TokenSlice) -> IResult<TokenSlice, Expression> {
    let exp = match input.0.first() {
        Some(Token::Nil) => Expression::Nil,
        Some(Token::True) => Expression::Boolean(true),
        Some(Token::False) => Expression::Boolean(false),
        Some(Token::Int(v)) => Expression::Integer(*v),
        Some(Token::Float(v)) => Expression::Number(*v),
        Some(Token::Str(s)) => Expression::Literal(s.clone()),
        Some(Token::Ellipsis) => Expression::Ellipsis,
        _ => return Err(parse_error(input)),
    };
    Ok((TokenSlice(&input.0[1..]), exp))
}

/// `{ [fieldlist] }`
pub fn parse_table_constructor(input: TokenSlice) -> IResult<TokenSlice, Vec<Field>> {
    let (rest, _) = token_tag(&Token::LBrace)(input)?;
    let mut fields = Vec::new();
    let mut rest = rest;
    loop {
        if let Ok((r, _)) = token_tag(&Token::RBrace)(rest) {
            return Ok((r, fields));
        }
        let (r, field) = parse_field(rest)?;
        fields.push(field);
        rest = r;
        // fieldsep ::= ',' | ';'
        match rest.0.first() {
            Some(Token::Comma) | Some(Token::Semicolon) => {
                rest = TokenSlice(&rest.0[1..]);
            }
            _ => {
                let (r, _) = token_tag(&Token::RBrace)(rest)?;
                return Ok((r, fields));
            }
        }
    }
}

/// `[exp] = exp | Name = exp | exp`
fn parse_field(input: TokenSlice) -> IResult<TokenSlice, Field> {
    if let Ok((rest, _)) = token_tag(&Token::LBracket)(input) {
        let (rest, key) = parse_expression(rest)?;
        let (rest, _) = token_tag(&Token::RBracket)(rest)?;
        let (rest, _) = token_tag(&Token::Assign)(rest)?;
        let (rest, value) = parse_expression(rest)?;
        return Ok((
            rest,
            Field {
                key: FieldKey::Bracket(key),
                value,
            },
        ));
    }

    if let Ok((rest, n)) = name(input) {
        if let Ok((rest, _)) = token_tag(&Token::Assign)(rest) {
            let (rest, value) = parse_expression(rest)?;
            return Ok((
                rest,
                Field {
                    key: FieldKey::Named(n),
                    value,
                },
            ));
        }
    }

    let (rest, value) = parse_expression(input)?;
    Ok((
        rest,
        Field {
            key: FieldKey::Positional,
            value,
        },
    ))
}

/// `( [parlist] ) block end`
pub fn parse_funcbody(input: TokenSlice) -> IResult<TokenSlice, FunctionBody> {
    let (rest, _) = token_tag(&Token::LParen)(input)?;
    let (rest, (params, vararg)) = parse_parlist(rest)?;
    let (rest, _) = token_tag(&Token::RParen)(rest)?;
    let (rest, block) = super::statement::parse_block(rest)?;
    let (rest, _) = token_tag(&Token::End)(rest)?;
    let usage = params.iter().map(|_| new_usage()).collect();
    Ok((
        rest,
        FunctionBody {
            params,
            vararg,
            usage,
            block,
        },
    ))
}

/// `namelist [',' '...'] | '...' | <empty>`
fn parse_parlist(input: TokenSlice) -> IResult<TokenSlice, (Vec<Name>, bool)> {
    if let Ok((rest, _)) = token_tag(&Token::Ellipsis)(input) {
        return Ok((rest, (Vec::new(), true)));
    }
    let Ok((mut rest, first)) = name(input) else {
        return Ok((input, (Vec::new(), false)));
    };
    let mut params = vec![first];
    let mut vararg = false;
    while let Ok((r, _)) = token_tag(&Token::Comma)(rest) {
        if let Ok((r, _)) = token_tag(&Token::Ellipsis)(r) {
            vararg = true;
            rest = r;
            break;
        }
        let (r, n) = name(r)?;
        params.push(n);
        rest = r;
    }
    Ok((rest, (params, vararg)))
}

/// Call arguments: `(explist) | tableconstructor | LiteralString`
fn parse_args(input: TokenSlice) -> IResult<TokenSlice, Vec<Expression>> {
    if let Ok((rest, _)) = token_tag(&Token::LParen)(input) {
        if let Ok((rest, _)) = token_tag(&Token::RParen)(rest) {
            return Ok((rest, Vec::new()));
        }
        let (rest, args) = parse_expression_list(rest)?;
        let (rest, _) = token_tag(&Token::RParen)(rest)?;
        return Ok((rest, args));
    }
    if let Ok((rest, fields)) = parse_table_constructor(input) {
        return Ok((rest, vec![Expression::Table(fields)]));
    }
    if let Some(Token::Str(s)) = input.0.first() {
        return Ok((
            TokenSlice(&input.0[1..]),
            vec![Expression::Literal(s.clone())],
        ));
    }
    Err(parse_error(input))
}

/// prefixexp ::= (Name | '(' exp ')') { '.' Name | '[' exp ']' | args | ':' Name args }
pub fn parse_prefix_exp(input: TokenSlice) -> IResult<TokenSlice, PrefixExp> {
    let (mut rest, head) = if let Ok((r, n)) = name(input) {
        (r, PrefixHead::Name(n))
    } else if let Ok((r, _)) = token_tag(&Token::LParen)(input) {
        let (r, exp) = parse_expression(r)?;
        let (r, _) = token_tag(&Token::RParen)(r)?;
        (r, PrefixHead::Paren(exp))
    } else {
        return Err(parse_error(input));
    };

    let mut tail = Vec::new();
    loop {
        match rest.0.first() {
            Some(Token::Dot) => {
                let (r, n) = name(TokenSlice(&rest.0[1..]))?;
                tail.push(PrefixTail::Field(n));
                rest = r;
            }
            Some(Token::LBracket) => {
                let (r, index) = parse_expression(TokenSlice(&rest.0[1..]))?;
                let (r, _) = token_tag(&Token::RBracket)(r)?;
                tail.push(PrefixTail::Index(index));
                rest = r;
            }
            Some(Token::Colon) => {
                let (r, method) = name(TokenSlice(&rest.0[1..]))?;
                let (r, args) = parse_args(r)?;
                tail.push(PrefixTail::Call {
                    method: Some(method),
                    args,
                });
                rest = r;
            }
            Some(Token::LParen) | Some(Token::LBrace) | Some(Token::Str(_)) => {
                let (r, args) = parse_args(rest)?;
                tail.push(PrefixTail::Call { method: None, args });
                rest = r;
            }
            _ => break,
        }
    }

    Ok((rest, PrefixExp { head, tail }))
}

fn parse_atom(input: TokenSlice) -> IResult<TokenSlice, Expression> {
    if let Ok(ok) = literal(input) {
        return Ok(ok);
    }
    if let Some(Token::Function) = input.0.first() {
        let (rest, body) = parse_funcbody(TokenSlice(&input.0[1..]))?;
        return Ok((rest, Expression::Function(body)));
    }
    if let Some(Token::LBrace) = input.0.first() {
        let (rest, fields) = parse_table_constructor(input)?;
        return Ok((rest, Expression::Table(fields)));
    }
    let (rest, prefix) = parse_prefix_exp(input)?;
    Ok((rest, Expression::Prefix(Box::new(prefix))))
}

fn binary(op: BinOperator, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(Box::new(BinOperation { op, lhs, rhs }))
}

/// `^` binds tighter than unary operators and is right associative;
/// its right operand may itself start with a unary operator.
fn parse_power(input: TokenSlice) -> IResult<TokenSlice, Expression> {
    let (rest, lhs) = parse_atom(input)?;
    let (rest, caret) = opt(token_tag(&Token::Caret)).parse(rest)?;
    if caret.is_some() {
        let (rest, rhs) = parse_unary(rest)?;
        Ok((rest, binary(BinOperator::Exponentiation, lhs, rhs)))
    } else {
        Ok((rest, lhs))
    }
}

fn parse_unary(input: TokenSlice) -> IResult<TokenSlice, Expression> {
    let op = match input.0.first() {
        Some(Token::Minus) => Some(UnOperator::Minus),
        Some(Token::Not) => Some(UnOperator::LogicNot),
        Some(Token::Hash) => Some(UnOperator::Len),
        Some(Token::Tilde) => Some(UnOperator::BinaryNot),
        _ => None,
    };
    match op {
        Some(op) => {
            let (rest, rhs) = parse_unary(TokenSlice(&input.0[1..]))?;
            Ok((rest, Expression::Unary(Box::new(UnOperation { op, rhs }))))
        }
        None => parse_power(input),
    }
}

macro_rules! left_assoc {
    ($name:ident, $next:ident, $ops:expr) => {
        fn $name(input: TokenSlice) -> IResult<TokenSlice, Expression> {
            fn parse_op(i: TokenSlice) -> IResult<TokenSlice, BinOperator> {
                match i.0.first().and_then($ops) {
                    Some(op) => Ok((TokenSlice(&i.0[1..]), op)),
                    None => Err(parse_error(i)),
                }
            }

            let (rest, mut lhs) = $next(input)?;
            let (rest, chain) = many0(pair(parse_op, $next)).parse(rest)?;
            for (op, rhs) in chain {
                lhs = binary(op, lhs, rhs);
            }
            Ok((rest, lhs))
        }
    };
}

left_assoc!(parse_mul, parse_unary, |t| match t {
    Token::Star => Some(BinOperator::Multiplication),
    Token::Slash => Some(BinOperator::Division),
    Token::DoubleSlash => Some(BinOperator::DivisionFloor),
    Token::Percent => Some(BinOperator::Modulo),
    _ => None,
});

left_assoc!(parse_add, parse_mul, |t| match t {
    Token::Plus => Some(BinOperator::Addition),
    Token::Minus => Some(BinOperator::Subtraction),
    _ => None,
});

/// `..` is right associative.
fn parse_concat(input: TokenSlice) -> IResult<TokenSlice, Expression> {
    let (rest, lhs) = parse_add(input)?;
    if let Ok((rest, _)) = token_tag(&Token::Concat)(rest) {
        let (rest, rhs) = parse_concat(rest)?;
        return Ok((rest, binary(BinOperator::Concat, lhs, rhs)));
    }
    Ok((rest, lhs))
}

left_assoc!(parse_shift, parse_concat, |t| match t {
    Token::LShift => Some(BinOperator::BinaryLeftShift),
    Token::RShift => Some(BinOperator::BinaryRightShift),
    _ => None,
});

left_assoc!(parse_bitand, parse_shift, |t| match t {
    Token::Ampersand => Some(BinOperator::BinaryAnd),
    _ => None,
});

left_assoc!(parse_bitxor, parse_bitand, |t| match t {
    Token::Tilde => Some(BinOperator::BinaryXor),
    _ => None,
});

left_assoc!(parse_bitor, parse_bitxor, |t| match t {
    Token::Pipe => Some(BinOperator::BinaryOr),
    _ => None,
});

left_assoc!(parse_comparison, parse_bitor, |t| match t {
    Token::Lt => Some(BinOperator::LessThan),
    Token::Gt => Some(BinOperator::GreaterThan),
    Token::Lte => Some(BinOperator::LessOrEqual),
    Token::Gte => Some(BinOperator::GreaterOrEqual),
    Token::Eq => Some(BinOperator::Equality),
    Token::Neq => Some(BinOperator::Inequality),
    _ => None,
});

left_assoc!(parse_and, parse_comparison, |t| match t {
    Token::And => Some(BinOperator::LogicAnd),
    _ => None,
});

left_assoc!(parse_or, parse_and, |t| match t {
    Token::Or => Some(BinOperator::LogicOr),
    _ => None,
});

pub fn parse_expression(input: TokenSlice) -> IResult<TokenSlice, Expression> {
    parse_or(input)
}

pub fn parse_expression_list(input: TokenSlice) -> IResult<TokenSlice, Vec<Expression>> {
    let (rest, first) = parse_expression(input)?;
    let (rest, more) = many0(pair(token_tag(&Token::Comma), parse_expression)).parse(rest)?;
    let mut list = vec![first];
    list.extend(more.into_iter().map(|(_, e)| e));
    Ok((rest, list))
}

pub(super) use name as parse_name;
