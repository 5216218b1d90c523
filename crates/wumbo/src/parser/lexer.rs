// Tokenizer for Lua 5.3 source

use smol_str::SmolStr;

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // symbols
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    Ampersand,
    Tilde,
    Pipe,
    LShift,
    RShift,
    Eq,
    Neq,
    Lte,
    Gte,
    Lt,
    Gt,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,

    Name(SmolStr),
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "and" => Token::And,
        "break" => Token::Break,
        "do" => Token::Do,
        "else" => Token::Else,
        "elseif" => Token::Elseif,
        "end" => Token::End,
        "false" => Token::False,
        "for" => Token::For,
        "function" => Token::Function,
        "goto" => Token::Goto,
        "if" => Token::If,
        "in" => Token::In,
        "local" => Token::Local,
        "nil" => Token::Nil,
        "not" => Token::Not,
        "or" => Token::Or,
        "repeat" => Token::Repeat,
        "return" => Token::Return,
        "then" => Token::Then,
        "true" => Token::True,
        "until" => Token::Until,
        "while" => Token::While,
        _ => return None,
    })
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, msg: impl std::fmt::Display) -> CompileError {
        CompileError::parse(format!("lex error at line {}: {}", self.line, msg))
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    self.pos += 2;
                    if self.peek() == Some(b'[') {
                        if let Some(level) = self.long_bracket_level() {
                            self.long_string(level)?;
                            continue;
                        }
                    }
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Looks at `[`=*`[` starting at the current position; returns the level
    /// without consuming anything when it is not an opening long bracket.
    fn long_bracket_level(&self) -> Option<usize> {
        debug_assert_eq!(self.peek(), Some(b'['));
        let mut level = 0;
        loop {
            match self.peek_at(1 + level) {
                Some(b'=') => level += 1,
                Some(b'[') => return Some(level),
                _ => return None,
            }
        }
    }

    fn long_string(&mut self, level: usize) -> Result<Vec<u8>> {
        // opening bracket
        for _ in 0..level + 2 {
            self.bump();
        }
        // a newline right after the opening bracket is skipped
        if self.peek() == Some(b'\r') {
            self.bump();
        }
        if self.peek() == Some(b'\n') {
            self.bump();
        }
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unfinished long string")),
                Some(b']') => {
                    let mut eqs = 0;
                    while self.peek_at(1 + eqs) == Some(b'=') {
                        eqs += 1;
                    }
                    if eqs == level && self.peek_at(1 + eqs) == Some(b']') {
                        for _ in 0..level + 2 {
                            self.bump();
                        }
                        return Ok(out);
                    }
                    out.push(b']');
                    self.bump();
                }
                Some(c) => {
                    out.push(c);
                    self.bump();
                }
            }
        }
    }

    fn short_string(&mut self, quote: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(self.error("unfinished string")),
                Some(c) if c == quote => return Ok(out),
                Some(b'\\') => {
                    let esc = self.bump().ok_or_else(|| self.error("unfinished string"))?;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'a' => out.push(0x07),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'v' => out.push(0x0b),
                        b'\\' => out.push(b'\\'),
                        b'"' => out.push(b'"'),
                        b'\'' => out.push(b'\''),
                        b'\n' => out.push(b'\n'),
                        b'x' => {
                            let mut v = 0u32;
                            for _ in 0..2 {
                                let d = self.bump().and_then(|c| (c as char).to_digit(16));
                                match d {
                                    Some(d) => v = v * 16 + d,
                                    None => return Err(self.error("hexadecimal digit expected")),
                                }
                            }
                            out.push(v as u8);
                        }
                        b'z' => {
                            while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                                self.bump();
                            }
                        }
                        b'0'..=b'9' => {
                            let mut v = (esc - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(c @ b'0'..=b'9') => {
                                        v = v * 10 + (c - b'0') as u32;
                                        self.bump();
                                    }
                                    _ => break,
                                }
                            }
                            if v > 255 {
                                return Err(self.error("decimal escape too large"));
                            }
                            out.push(v as u8);
                        }
                        _ => return Err(self.error(format!("invalid escape '\\{}'", esc as char))),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let digits = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == digits {
                return Err(self.error("malformed number"));
            }
            let text = std::str::from_utf8(&self.src[digits..self.pos]).unwrap_or("");
            // hex integers wrap on overflow, following Lua
            let value = u64::from_str_radix(text, 16)
                .map_err(|_| self.error("malformed number"))? as i64;
            return Ok(Token::Int(value));
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            let digits = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == digits {
                return Err(self.error("malformed number"));
            }
        }

        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if !is_float {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Token::Int(value));
            }
            // decimal integers that do not fit become floats
        }
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| self.error("malformed number"))
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_trivia()?;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.pos += 1;
            }
            let word = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
            return Ok(Some(
                keyword(word).unwrap_or_else(|| Token::Name(SmolStr::new(word))),
            ));
        }

        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.number().map(Some);
        }

        match c {
            b'"' | b'\'' => {
                self.bump();
                return self.short_string(c).map(|s| Some(Token::Str(s)));
            }
            b'[' => {
                if let Some(level) = self.long_bracket_level() {
                    return self.long_string(level).map(|s| Some(Token::Str(s)));
                }
            }
            _ => {}
        }

        macro_rules! sym {
            ($len:expr, $tok:expr) => {{
                self.pos += $len;
                return Ok(Some($tok));
            }};
        }

        let next = self.peek_at(1);
        match c {
            b'+' => sym!(1, Token::Plus),
            b'-' => sym!(1, Token::Minus),
            b'*' => sym!(1, Token::Star),
            b'/' if next == Some(b'/') => sym!(2, Token::DoubleSlash),
            b'/' => sym!(1, Token::Slash),
            b'%' => sym!(1, Token::Percent),
            b'^' => sym!(1, Token::Caret),
            b'#' => sym!(1, Token::Hash),
            b'&' => sym!(1, Token::Ampersand),
            b'~' if next == Some(b'=') => sym!(2, Token::Neq),
            b'~' => sym!(1, Token::Tilde),
            b'|' => sym!(1, Token::Pipe),
            b'<' if next == Some(b'<') => sym!(2, Token::LShift),
            b'<' if next == Some(b'=') => sym!(2, Token::Lte),
            b'<' => sym!(1, Token::Lt),
            b'>' if next == Some(b'>') => sym!(2, Token::RShift),
            b'>' if next == Some(b'=') => sym!(2, Token::Gte),
            b'>' => sym!(1, Token::Gt),
            b'=' if next == Some(b'=') => sym!(2, Token::Eq),
            b'=' => sym!(1, Token::Assign),
            b'(' => sym!(1, Token::LParen),
            b')' => sym!(1, Token::RParen),
            b'{' => sym!(1, Token::LBrace),
            b'}' => sym!(1, Token::RBrace),
            b'[' => sym!(1, Token::LBracket),
            b']' => sym!(1, Token::RBracket),
            b':' if next == Some(b':') => sym!(2, Token::DoubleColon),
            b':' => sym!(1, Token::Colon),
            b';' => sym!(1, Token::Semicolon),
            b',' => sym!(1, Token::Comma),
            b'.' if next == Some(b'.') => {
                if self.peek_at(2) == Some(b'.') {
                    sym!(3, Token::Ellipsis)
                }
                sym!(2, Token::Concat)
            }
            b'.' => sym!(1, Token::Dot),
            _ => Err(self.error(format!("unexpected character '{}'", c as char))),
        }
    }
}

/// Tokenize Lua source code into a vector of tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        src: source.as_bytes(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
