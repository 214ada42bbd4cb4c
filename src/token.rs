//! Lexical tokens produced by the [`Tokenizer`](crate::tokenizer::Tokenizer).

use std::fmt;

/// A single lexical token.
///
/// Numbers keep their exact source text so that values outside the range of
/// `i64`/`f64` survive untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    /// An object member name.
    Key(String),
    String(String),
    Number(String),
    Bool(bool),
    Null,
    EndOfStream,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::ObjectStart => TokenKind::ObjectStart,
            Token::ObjectEnd => TokenKind::ObjectEnd,
            Token::ArrayStart => TokenKind::ArrayStart,
            Token::ArrayEnd => TokenKind::ArrayEnd,
            Token::Key(_) => TokenKind::Key,
            Token::String(_) => TokenKind::String,
            Token::Number(_) => TokenKind::Number,
            Token::Bool(_) => TokenKind::Bool,
            Token::Null => TokenKind::Null,
            Token::EndOfStream => TokenKind::EndOfStream,
        }
    }
}

/// Payload-free kind of a token, available by peeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    Key,
    String,
    Number,
    Bool,
    Null,
    EndOfStream,
}

impl TokenKind {
    /// True for tokens that begin a JSON value.
    pub fn starts_value(self) -> bool {
        matches!(
            self,
            TokenKind::ObjectStart
                | TokenKind::ArrayStart
                | TokenKind::String
                | TokenKind::Number
                | TokenKind::Bool
                | TokenKind::Null
        )
    }

    pub fn is_container_start(self) -> bool {
        matches!(self, TokenKind::ObjectStart | TokenKind::ArrayStart)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::ObjectStart => "'{'",
            TokenKind::ObjectEnd => "'}'",
            TokenKind::ArrayStart => "'['",
            TokenKind::ArrayEnd => "']'",
            TokenKind::Key => "object key",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Bool => "boolean",
            TokenKind::Null => "null",
            TokenKind::EndOfStream => "end of stream",
        };
        f.write_str(name)
    }
}

/// Kind of an open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Object,
    Array,
}
