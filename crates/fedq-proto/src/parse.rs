//! Parser for the textual predicate grammar.
//!
//! ```text
//! or      := xor ( ("||" | OR) xor )*
//! xor     := and ( ("^" | XOR) and )*
//! and     := cmp ( ("&&" | AND) cmp )*
//! cmp     := primary ( ("==" | "!=" | "<" | "<=" | ">" | ">=" | IN | CONTAINS) primary )?
//! primary := "(" or ")" | attribute | literal
//! ```
//!
//! Literals are JSON values (plus the bare words `true`, `false`, `null`).
//! Attributes are identifiers or backtick-quoted names.

use std::str::FromStr;

use crate::error::Error;
use crate::predicate::{is_ident_char, is_ident_start, Operand, Operator, Predicate};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Op(Operator),
    Attr(String),
    Lit(Value),
    End,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, Error> {
        let mut tokens = Vec::new();
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.input.len() - trimmed.len();
            let start = self.pos;
            let token = self.next_token()?;
            let done = token == Token::End;
            tokens.push((start, token));
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Ok(Token::End);
        };

        for (symbol, op) in [
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            ("<=", Operator::Le),
            (">=", Operator::Ge),
            ("&&", Operator::And),
            ("||", Operator::Or),
            ("<", Operator::Lt),
            (">", Operator::Gt),
            ("^", Operator::Xor),
        ] {
            if rest.starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(Token::Op(op));
            }
        }

        match c {
            '(' => {
                self.pos += 1;
                Ok(Token::LParen)
            }
            ')' => {
                self.pos += 1;
                Ok(Token::RParen)
            }
            '`' => self.quoted_attribute(),
            '"' | '[' | '{' => self.json_literal(),
            '-' | '0'..='9' => self.number(),
            c if is_ident_start(c) => Ok(self.word()),
            other => Err(Error::parse(
                self.pos,
                format!("unexpected character {:?}", other),
            )),
        }
    }

    fn quoted_attribute(&mut self) -> Result<Token, Error> {
        let start = self.pos;
        let mut name = String::new();
        let mut chars = self.rest()[1..].char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '`' {
                if matches!(chars.peek(), Some((_, '`'))) {
                    chars.next();
                    name.push('`');
                    continue;
                }
                self.pos += i + 2;
                return Ok(Token::Attr(name));
            }
            name.push(c);
        }
        Err(Error::parse(start, "unterminated quoted attribute"))
    }

    fn json_literal(&mut self) -> Result<Token, Error> {
        let mut stream = serde_json::Deserializer::from_str(self.rest()).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                self.pos += stream.byte_offset();
                Ok(Token::Lit(value))
            }
            Some(Err(e)) => Err(Error::parse(self.pos, e.to_string())),
            None => Err(Error::parse(self.pos, "expected a literal")),
        }
    }

    fn number(&mut self) -> Result<Token, Error> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut end = 0;
        if bytes.first() == Some(&b'-') {
            end += 1;
        }
        while end < bytes.len()
            && (bytes[end].is_ascii_digit() || matches!(bytes[end], b'.' | b'e' | b'E'))
        {
            end += 1;
            // Exponent sign.
            if matches!(bytes[end - 1], b'e' | b'E') && matches!(bytes.get(end), Some(b'+' | b'-')) {
                end += 1;
            }
        }
        let text = &rest[..end];
        let value: Value = serde_json::from_str(text)
            .map_err(|_| Error::parse(self.pos, format!("invalid number {:?}", text)))?;
        self.pos += end;
        Ok(Token::Lit(value))
    }

    fn word(&mut self) -> Token {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !is_ident_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let word = &rest[..end];
        self.pos += end;

        match word.to_ascii_uppercase().as_str() {
            "AND" => Token::Op(Operator::And),
            "OR" => Token::Op(Operator::Or),
            "XOR" => Token::Op(Operator::Xor),
            "IN" => Token::Op(Operator::In),
            "CONTAINS" => Token::Op(Operator::Contains),
            "TRUE" => Token::Lit(Value::Bool(true)),
            "FALSE" => Token::Lit(Value::Bool(false)),
            "NULL" => Token::Lit(Value::Null),
            _ => Token::Attr(word.to_string()),
        }
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.index)
            .map(|(_, t)| t)
            .unwrap_or(&Token::End)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.index).map(|(p, _)| *p).unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn parse_logical(
        &mut self,
        operator: Operator,
        next: fn(&mut Self) -> Result<Operand, Error>,
    ) -> Result<Operand, Error> {
        let mut left = next(self)?;
        while *self.peek() == Token::Op(operator) {
            let position = self.position();
            self.advance();
            let right = next(self)?;
            left = Operand::from(Predicate::binary(
                into_predicate_operand(left, position)?,
                operator,
                into_predicate_operand(right, position)?,
            ));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Operand, Error> {
        self.parse_logical(Operator::Or, Self::parse_xor)
    }

    fn parse_xor(&mut self) -> Result<Operand, Error> {
        self.parse_logical(Operator::Xor, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Operand, Error> {
        self.parse_logical(Operator::And, Self::parse_cmp)
    }

    fn parse_cmp(&mut self) -> Result<Operand, Error> {
        let left = self.parse_primary()?;
        match self.peek().clone() {
            Token::Op(op) if !op.is_logical() => {
                self.advance();
                let right = self.parse_primary()?;
                Ok(Operand::from(Predicate::binary(left, op, right)))
            }
            _ => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> Result<Operand, Error> {
        let position = self.position();
        match self.advance() {
            Token::LParen => {
                let inner = self.parse_or()?;
                if self.advance() != Token::RParen {
                    return Err(Error::parse(self.position(), "expected ')'"));
                }
                Ok(Operand::from(into_predicate(inner, position)?))
            }
            Token::Attr(name) => Ok(Operand::Attribute(name)),
            Token::Lit(value) => Ok(Operand::Literal(value)),
            Token::End => Err(Error::parse(position, "unexpected end of input")),
            other => Err(Error::parse(position, format!("unexpected token {:?}", other))),
        }
    }
}

/// Operands of logical operators are predicates; a bare attribute becomes a
/// leaf.
fn into_predicate_operand(operand: Operand, position: usize) -> Result<Operand, Error> {
    match operand {
        Operand::Predicate(_) => Ok(operand),
        other => Ok(Operand::from(into_predicate(other, position)?)),
    }
}

fn into_predicate(operand: Operand, position: usize) -> Result<Predicate, Error> {
    match operand {
        Operand::Predicate(p) => Ok(*p),
        Operand::Attribute(name) => Ok(Predicate::Leaf(name)),
        Operand::Literal(value) => Err(Error::parse(
            position,
            format!("literal {} is not a predicate", value),
        )),
    }
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = Lexer::new(s).tokenize()?;
        let mut parser = Parser { tokens, index: 0 };
        let operand = parser.parse_or()?;
        if *parser.peek() != Token::End {
            return Err(Error::parse(parser.position(), "trailing input"));
        }
        into_predicate(operand, 0)
    }
}
