//! Lua 5.3 parser with nom
//!
//! chunk ::= block
//! block ::= {stat} [retstat]
//!
//! Statements and expressions follow the reference grammar; variables and
//! calls are parsed into the combined prefix-expression form (a head plus a
//! sequence of field/index/call tails).

mod expression;
mod lexer;
mod statement;

pub use expression::{parse_expression, parse_expression_list, parse_prefix_exp};
pub use lexer::{tokenize, Token};
pub use statement::parse_block;

use nom::{IResult, Input, Needed};

use crate::ast::Block;
use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy)]
pub struct TokenSlice<'a>(pub &'a [Token]);

impl<'a> From<&'a [Token]> for TokenSlice<'a> {
    fn from(slice: &'a [Token]) -> Self {
        TokenSlice(slice)
    }
}

impl<'a> Input for TokenSlice<'a> {
    type Item = &'a Token;
    type Iter = std::slice::Iter<'a, Token>;
    type IterIndices = std::iter::Enumerate<std::slice::Iter<'a, Token>>;

    fn input_len(&self) -> usize {
        self.0.len()
    }

    fn take(&self, index: usize) -> Self {
        TokenSlice(&self.0[..index.min(self.0.len())])
    }

    fn take_from(&self, index: usize) -> Self {
        TokenSlice(&self.0[index.min(self.0.len())..])
    }

    fn take_split(&self, index: usize) -> (Self, Self) {
        let index = index.min(self.0.len());
        (TokenSlice(&self.0[index..]), TokenSlice(&self.0[..index]))
    }

    fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(Self::Item) -> bool,
    {
        self.0.iter().position(predicate)
    }

    fn iter_elements(&self) -> Self::Iter {
        self.0.iter()
    }

    fn iter_indices(&self) -> Self::IterIndices {
        self.0.iter().enumerate()
    }

    fn slice_index(&self, count: usize) -> std::result::Result<usize, Needed> {
        if count > self.0.len() {
            Err(Needed::Size(
                std::num::NonZeroUsize::new(count - self.0.len()).unwrap(),
            ))
        } else {
            Ok(count)
        }
    }
}

/// Match a specific token.
pub fn token_tag(expected: &Token) -> impl Fn(TokenSlice) -> IResult<TokenSlice, &Token> + '_ {
    move |input: TokenSlice| {
        if let Some(tok) = input.0.first() {
            if tok == expected {
                Ok((TokenSlice(&input.0[1..]), tok))
            } else {
                Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Tag,
                )))
            }
        } else {
            Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Eof,
            )))
        }
    }
}

pub(crate) fn parse_error(input: TokenSlice) -> nom::Err<nom::error::Error<TokenSlice>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse a complete chunk into a [`Block`].
pub fn parse(source: &str) -> Result<Block> {
    let tokens = tokenize(source)?;
    let input = TokenSlice::from(tokens.as_slice());
    match parse_block(input) {
        Ok((rest, block)) => {
            if let Some(tok) = rest.0.first() {
                return Err(CompileError::parse(format!(
                    "syntax error near {:?}",
                    tok
                )));
            }
            Ok(block)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let near = match e.input.0.first() {
                Some(tok) => format!("near {:?}", tok),
                None => "near <eof>".to_string(),
            };
            Err(CompileError::parse(format!("syntax error {}", near)))
        }
        Err(nom::Err::Incomplete(_)) => Err(CompileError::parse("unexpected <eof>")),
    }
}
