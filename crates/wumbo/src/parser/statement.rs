//! Statement and block parsing

use nom::IResult;

use super::expression::{parse_expression, parse_expression_list, parse_funcbody, parse_name,
    parse_prefix_exp};
use super::{parse_error, token_tag, Token, TokenSlice};
use crate::ast::*;

/// block ::= {stat} [retstat]
pub fn parse_block(input: TokenSlice) -> IResult<TokenSlice, Block> {
    let mut statements = Vec::new();
    let mut rest = input;
    loop {
        match rest.0.first() {
            None | Some(Token::End) | Some(Token::Else) | Some(Token::Elseif)
            | Some(Token::Until) => break,
            Some(Token::Semicolon) => {
                rest = TokenSlice(&rest.0[1..]);
            }
            Some(Token::Return) => {
                let (r, ret) = parse_retstat(rest)?;
                return Ok((r, Block { statements, ret: Some(ret) }));
            }
            _ => {
                let (r, statement) = parse_statement(rest)?;
                statements.push(statement);
                rest = r;
            }
        }
    }
    Ok((rest, Block { statements, ret: None }))
}

/// retstat ::= return [explist] [';']
fn parse_retstat(input: TokenSlice) -> IResult<TokenSlice, Vec<Expression>> {
    let (rest, _) = token_tag(&Token::Return)(input)?;
    let (rest, exps) = match rest.0.first() {
        None | Some(Token::End) | Some(Token::Else) | Some(Token::Elseif)
        | Some(Token::Until) | Some(Token::Semicolon) => (rest, Vec::new()),
        _ => parse_expression_list(rest)?,
    };
    let rest = match token_tag(&Token::Semicolon)(rest) {
        Ok((r, _)) => r,
        Err(_) => rest,
    };
    Ok((rest, exps))
}

fn parse_statement(input: TokenSlice) -> IResult<TokenSlice, Statement> {
    match input.0.first() {
        Some(Token::DoubleColon) => {
            let (rest, n) = parse_name(TokenSlice(&input.0[1..]))?;
            let (rest, _) = token_tag(&Token::DoubleColon)(rest)?;
            Ok((rest, Statement::Label(n)))
        }
        Some(Token::Break) => Ok((TokenSlice(&input.0[1..]), Statement::Break)),
        Some(Token::Goto) => {
            let (rest, n) = parse_name(TokenSlice(&input.0[1..]))?;
            Ok((rest, Statement::Goto(n)))
        }
        Some(Token::Do) => {
            let (rest, block) = parse_block(TokenSlice(&input.0[1..]))?;
            let (rest, _) = token_tag(&Token::End)(rest)?;
            Ok((rest, Statement::Do(block)))
        }
        Some(Token::While) => {
            let (rest, condition) = parse_expression(TokenSlice(&input.0[1..]))?;
            let (rest, _) = token_tag(&Token::Do)(rest)?;
            let (rest, body) = parse_block(rest)?;
            let (rest, _) = token_tag(&Token::End)(rest)?;
            Ok((rest, Statement::While { condition, body }))
        }
        Some(Token::Repeat) => {
            let (rest, body) = parse_block(TokenSlice(&input.0[1..]))?;
            let (rest, _) = token_tag(&Token::Until)(rest)?;
            let (rest, condition) = parse_expression(rest)?;
            Ok((rest, Statement::Repeat { body, condition }))
        }
        Some(Token::If) => parse_if(input),
        Some(Token::For) => parse_for(input),
        Some(Token::Function) => parse_function(input),
        Some(Token::Local) => parse_local(input),
        _ => parse_expr_statement(input),
    }
}

/// if exp then block {elseif exp then block} [else block] end
fn parse_if(input: TokenSlice) -> IResult<TokenSlice, Statement> {
    let (rest, _) = token_tag(&Token::If)(input)?;
    let (rest, condition) = parse_expression(rest)?;
    let (rest, _) = token_tag(&Token::Then)(rest)?;
    let (mut rest, block) = parse_block(rest)?;
    let mut arms = vec![(condition, block)];
    let mut else_block = None;
    loop {
        match rest.0.first() {
            Some(Token::Elseif) => {
                let (r, condition) = parse_expression(TokenSlice(&rest.0[1..]))?;
                let (r, _) = token_tag(&Token::Then)(r)?;
                let (r, block) = parse_block(r)?;
                arms.push((condition, block));
                rest = r;
            }
            Some(Token::Else) => {
                let (r, block) = parse_block(TokenSlice(&rest.0[1..]))?;
                else_block = Some(block);
                rest = r;
            }
            Some(Token::End) => {
                return Ok((
                    TokenSlice(&rest.0[1..]),
                    Statement::If { arms, else_block },
                ));
            }
            _ => return Err(parse_error(rest)),
        }
    }
}

/// Numeric and generic `for`.
fn parse_for(input: TokenSlice) -> IResult<TokenSlice, Statement> {
    let (rest, _) = token_tag(&Token::For)(input)?;
    let (rest, first) = parse_name(rest)?;

    if let Ok((rest, _)) = token_tag(&Token::Assign)(rest) {
        let (rest, exps) = parse_expression_list(rest)?;
        if exps.len() < 2 || exps.len() > 3 {
            return Err(parse_error(rest));
        }
        let (rest, _) = token_tag(&Token::Do)(rest)?;
        let (rest, body) = parse_block(rest)?;
        let (rest, _) = token_tag(&Token::End)(rest)?;
        return Ok((
            rest,
            Statement::NumericFor {
                var: first,
                usage: new_usage(),
                exps,
                body,
            },
        ));
    }

    let mut names = vec![first];
    let mut rest = rest;
    while let Ok((r, _)) = token_tag(&Token::Comma)(rest) {
        let (r, n) = parse_name(r)?;
        names.push(n);
        rest = r;
    }
    let (rest, _) = token_tag(&Token::In)(rest)?;
    let (rest, exps) = parse_expression_list(rest)?;
    let (rest, _) = token_tag(&Token::Do)(rest)?;
    let (rest, body) = parse_block(rest)?;
    let (rest, _) = token_tag(&Token::End)(rest)?;
    let usage = names.iter().map(|_| new_usage()).collect();
    Ok((
        rest,
        Statement::GenericFor {
            names,
            usage,
            exps,
            body,
        },
    ))
}

/// function funcname funcbody; funcname ::= Name {'.' Name} [':' Name]
fn parse_function(input: TokenSlice) -> IResult<TokenSlice, Statement> {
    let (rest, _) = token_tag(&Token::Function)(input)?;
    let (mut rest, first) = parse_name(rest)?;
    let mut path = vec![first];
    let mut is_method = false;
    loop {
        match rest.0.first() {
            Some(Token::Dot) => {
                let (r, n) = parse_name(TokenSlice(&rest.0[1..]))?;
                path.push(n);
                rest = r;
            }
            Some(Token::Colon) => {
                let (r, n) = parse_name(TokenSlice(&rest.0[1..]))?;
                path.push(n);
                is_method = true;
                rest = r;
            }
            _ => break,
        }
        if is_method {
            break;
        }
    }
    let (rest, mut body) = parse_funcbody(rest)?;
    if is_method {
        body.params.insert(0, Name::new("self"));
        body.usage.insert(0, new_usage());
    }
    Ok((rest, Statement::Function { path, body }))
}

/// local function Name funcbody | local namelist ['=' explist]
fn parse_local(input: TokenSlice) -> IResult<TokenSlice, Statement> {
    let (rest, _) = token_tag(&Token::Local)(input)?;

    if let Ok((rest, _)) = token_tag(&Token::Function)(rest) {
        let (rest, n) = parse_name(rest)?;
        let (rest, body) = parse_funcbody(rest)?;
        return Ok((
            rest,
            Statement::LocalFunction {
                name: n,
                usage: new_usage(),
                body,
            },
        ));
    }

    let (mut rest, first) = parse_name(rest)?;
    let mut names = vec![first];
    while let Ok((r, _)) = token_tag(&Token::Comma)(rest) {
        let (r, n) = parse_name(r)?;
        names.push(n);
        rest = r;
    }
    let (rest, exps) = match token_tag(&Token::Assign)(rest) {
        Ok((r, _)) => parse_expression_list(r)?,
        Err(_) => (rest, Vec::new()),
    };
    let usage = names.iter().map(|_| new_usage()).collect();
    Ok((rest, Statement::Local { names, usage, exps }))
}

/// An expression statement: either a call or the head of an assignment.
fn parse_expr_statement(input: TokenSlice) -> IResult<TokenSlice, Statement> {
    let (rest, first) = parse_prefix_exp(input)?;

    // varlist '=' explist
    if matches!(rest.0.first(), Some(Token::Comma) | Some(Token::Assign)) {
        let mut targets = vec![first];
        let mut rest = rest;
        while let Ok((r, _)) = token_tag(&Token::Comma)(rest) {
            let (r, target) = parse_prefix_exp(r)?;
            targets.push(target);
            rest = r;
        }
        let (rest, _) = token_tag(&Token::Assign)(rest)?;
        let (rest, values) = parse_expression_list(rest)?;
        if !targets.iter().all(PrefixExp::is_var) {
            return Err(parse_error(rest));
        }
        return Ok((rest, Statement::Assignment { targets, values }));
    }

    if !first.is_call() {
        return Err(parse_error(input));
    }
    Ok((rest, Statement::Call(first)))
}
