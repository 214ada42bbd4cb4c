//! Pull-based JSON tokenizer over any [`Read`] source.
//!
//! The tokenizer owns a fixed-size buffer that is refilled from the source
//! when exhausted; refill is its only suspension point. It never holds more
//! than the current token plus one byte of lookahead, so arbitrarily large
//! documents stream in constant memory (apart from the nesting stack).
//!
//! Besides lexing, it tracks a compact stack of open container kinds and the
//! element it expects next. That is what lets it classify a string as a
//! [`Token::Key`] and reject separators or closers in the wrong place.

use std::io::{self, Read};

use tracing::{debug, trace};

use crate::error::StreamError;
use crate::token::{Container, Token, TokenKind};

pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
pub const MIN_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    RootValue,
    Value,
    FirstElementOrEnd,
    FirstKeyOrEnd,
    Key,
    Colon,
    CommaOrEnd,
    Finished,
    Ended,
}

pub struct Tokenizer<R> {
    source: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    /// Absolute offset of `buf[0]` in the stream.
    base: usize,
    eof: bool,
    stack: Vec<Container>,
    expect: Expect,
    peeked: Option<TokenKind>,
    token_start: usize,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(source: R) -> Self {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(source: R, size: usize) -> Self {
        Self {
            source,
            buf: vec![0u8; size.max(MIN_BUFFER_SIZE)].into_boxed_slice(),
            pos: 0,
            len: 0,
            base: 0,
            eof: false,
            stack: Vec::new(),
            expect: Expect::RootValue,
            peeked: None,
            token_start: 0,
        }
    }

    /// Absolute number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Offset of the first byte of the most recently peeked or returned token.
    pub fn token_offset(&self) -> usize {
        self.token_start
    }

    /// Current nesting depth as seen by the tokenizer.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    /// Kind of the next token without consuming its payload. Whitespace and
    /// separators in front of it are consumed (and validated).
    pub fn peek_kind(&mut self) -> Result<TokenKind, StreamError> {
        if let Some(kind) = self.peeked {
            return Ok(kind);
        }
        let kind = self.scan_kind()?;
        self.peeked = Some(kind);
        Ok(kind)
    }

    pub fn next_token(&mut self) -> Result<Token, StreamError> {
        let kind = self.peek_kind()?;
        self.peeked = None;
        self.consume(kind, true)
    }

    /// Consume one complete value (scalar or whole container) without
    /// materializing any string or number payloads. The input is validated
    /// exactly as [`next_token`](Self::next_token) would validate it.
    pub fn skip_value(&mut self) -> Result<(), StreamError> {
        let first = self.peek_kind()?;
        if !first.starts_value() {
            return Err(StreamError::structural(format!("expected value but found {first}"), self.token_start));
        }
        let mut depth = 0usize;
        loop {
            let kind = self.peek_kind()?;
            self.peeked = None;
            self.consume(kind, false)?;
            match kind {
                TokenKind::ObjectStart | TokenKind::ArrayStart => depth += 1,
                TokenKind::ObjectEnd | TokenKind::ArrayEnd => depth -= 1,
                TokenKind::EndOfStream => {
                    return Err(StreamError::structural("unexpected end of stream while skipping", self.token_start));
                }
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn scan_kind(&mut self) -> Result<TokenKind, StreamError> {
        loop {
            let next = self.skip_whitespace()?;
            let offset = self.offset();
            self.token_start = offset;
            let Some(b) = next else {
                return self.end_of_input(offset);
            };
            match self.expect {
                Expect::Finished | Expect::Ended => {
                    return Err(StreamError::lex(
                        format!("unexpected top-level token {} after end of document", describe(b)),
                        offset,
                    ));
                }
                Expect::RootValue => {
                    return match b {
                        b'}' | b']' | b',' | b':' => Err(StreamError::lex(
                            format!("unexpected top-level token {}", describe(b)),
                            offset,
                        )),
                        _ => value_kind(b, offset),
                    };
                }
                Expect::Colon => {
                    if b == b':' {
                        self.pos += 1;
                        self.expect = Expect::Value;
                        continue;
                    }
                    return Err(StreamError::structural(format!("expected ':' but found {}", describe(b)), offset));
                }
                Expect::CommaOrEnd => match b {
                    b',' => {
                        self.pos += 1;
                        self.expect = match self.stack.last() {
                            Some(Container::Object) => Expect::Key,
                            _ => Expect::Value,
                        };
                        continue;
                    }
                    b'}' | b']' => return self.closer(b, offset),
                    _ => {
                        let end = match self.stack.last() {
                            Some(Container::Object) => "'}'",
                            _ => "']'",
                        };
                        return Err(StreamError::structural(
                            format!("expected ',' or {end} but found {}", describe(b)),
                            offset,
                        ));
                    }
                },
                Expect::FirstKeyOrEnd => {
                    return match b {
                        b'"' => Ok(TokenKind::Key),
                        b'}' | b']' => self.closer(b, offset),
                        _ => Err(StreamError::structural(
                            format!("expected object key or '}}' but found {}", describe(b)),
                            offset,
                        )),
                    };
                }
                Expect::Key => {
                    return match b {
                        b'"' => Ok(TokenKind::Key),
                        _ => Err(StreamError::structural(
                            format!("expected object key but found {}", describe(b)),
                            offset,
                        )),
                    };
                }
                Expect::FirstElementOrEnd => {
                    return match b {
                        b'}' | b']' => self.closer(b, offset),
                        _ => value_kind(b, offset),
                    };
                }
                Expect::Value => {
                    return match b {
                        b'}' | b']' => Err(StreamError::structural(
                            format!("expected value but found {}", describe(b)),
                            offset,
                        )),
                        _ => value_kind(b, offset),
                    };
                }
            }
        }
    }

    fn closer(&self, b: u8, offset: usize) -> Result<TokenKind, StreamError> {
        let (found, kind) = if b == b'}' {
            (Container::Object, TokenKind::ObjectEnd)
        } else {
            (Container::Array, TokenKind::ArrayEnd)
        };
        match self.stack.last() {
            Some(&open) if open == found => Ok(kind),
            Some(&open) => Err(StreamError::structural(
                format!("mismatched {}: innermost open container is {}", describe(b), container_name(open)),
                offset,
            )),
            None => Err(StreamError::lex(format!("unexpected top-level token {}", describe(b)), offset)),
        }
    }

    fn end_of_input(&self, offset: usize) -> Result<TokenKind, StreamError> {
        match self.expect {
            Expect::Finished | Expect::Ended => Ok(TokenKind::EndOfStream),
            Expect::RootValue => Err(StreamError::lex("empty document", offset)),
            _ => {
                debug!(target: "streamdecode::tokenizer", offset, depth = self.stack.len(), "end of stream inside container");
                Err(StreamError::structural(
                    format!("unexpected end of stream with {} unclosed container(s)", self.stack.len()),
                    offset,
                ))
            }
        }
    }

    fn consume(&mut self, kind: TokenKind, keep: bool) -> Result<Token, StreamError> {
        match kind {
            TokenKind::ObjectStart => {
                self.pos += 1;
                self.stack.push(Container::Object);
                self.expect = Expect::FirstKeyOrEnd;
                Ok(Token::ObjectStart)
            }
            TokenKind::ArrayStart => {
                self.pos += 1;
                self.stack.push(Container::Array);
                self.expect = Expect::FirstElementOrEnd;
                Ok(Token::ArrayStart)
            }
            TokenKind::ObjectEnd | TokenKind::ArrayEnd => {
                self.pos += 1;
                self.stack.pop();
                self.after_value();
                Ok(if kind == TokenKind::ObjectEnd { Token::ObjectEnd } else { Token::ArrayEnd })
            }
            TokenKind::Key => {
                let key = self.read_string(keep)?;
                self.expect = Expect::Colon;
                Ok(Token::Key(key))
            }
            TokenKind::String => {
                let s = self.read_string(keep)?;
                self.after_value();
                Ok(Token::String(s))
            }
            TokenKind::Number => {
                let n = self.read_number(keep)?;
                self.after_value();
                Ok(Token::Number(n))
            }
            TokenKind::Bool => {
                let value = match self.peek_byte()? {
                    Some(b't') => {
                        self.read_literal(b"true")?;
                        true
                    }
                    _ => {
                        self.read_literal(b"false")?;
                        false
                    }
                };
                self.after_value();
                Ok(Token::Bool(value))
            }
            TokenKind::Null => {
                self.read_literal(b"null")?;
                self.after_value();
                Ok(Token::Null)
            }
            TokenKind::EndOfStream => {
                self.expect = Expect::Ended;
                Ok(Token::EndOfStream)
            }
        }
    }

    fn after_value(&mut self) {
        self.expect = if self.stack.is_empty() { Expect::Finished } else { Expect::CommaOrEnd };
    }

    // ---- byte level ----

    /// Make sure at least one unread byte is buffered. Returns `false` at end of input.
    fn fill(&mut self) -> Result<bool, StreamError> {
        if self.pos < self.len {
            return Ok(true);
        }
        if self.eof {
            return Ok(false);
        }
        self.base += self.len;
        self.pos = 0;
        self.len = 0;
        loop {
            match self.source.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    trace!(target: "streamdecode::tokenizer", offset = self.base, "source exhausted");
                    return Ok(false);
                }
                Ok(n) => {
                    self.len = n;
                    trace!(target: "streamdecode::tokenizer", offset = self.base, bytes = n, "buffer refilled");
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(target: "streamdecode::tokenizer", offset = self.base, error = %e, "read error");
                    return Err(StreamError::SourceRead(e));
                }
            }
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if self.fill()? {
            Ok(Some(self.buf[self.pos]))
        } else {
            Ok(None)
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, StreamError> {
        let b = self.peek_byte()?;
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>, StreamError> {
        loop {
            if !self.fill()? {
                return Ok(None);
            }
            while self.pos < self.len {
                match self.buf[self.pos] {
                    b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                    b => return Ok(Some(b)),
                }
            }
        }
    }

    // ---- strings ----

    fn read_string(&mut self, keep: bool) -> Result<String, StreamError> {
        // opening quote
        self.pos += 1;
        let mut out = String::new();
        loop {
            if !self.fill()? {
                return Err(StreamError::lex("unterminated string", self.offset()));
            }
            let start = self.pos;
            while self.pos < self.len {
                let b = self.buf[self.pos];
                if b == b'"' || b == b'\\' || b < 0x20 || b >= 0x80 {
                    break;
                }
                self.pos += 1;
            }
            if keep && self.pos > start {
                out.extend(self.buf[start..self.pos].iter().map(|&b| char::from(b)));
            }
            if self.pos == self.len {
                continue;
            }
            let offset = self.offset();
            match self.buf[self.pos] {
                b'"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    self.pos += 1;
                    let c = self.read_escape(offset)?;
                    if keep {
                        out.push(c);
                    }
                }
                b if b < 0x20 => {
                    return Err(StreamError::lex(
                        format!("unescaped control character 0x{b:02x} in string"),
                        offset,
                    ));
                }
                _ => {
                    let c = self.read_utf8_char(offset)?;
                    if keep {
                        out.push(c);
                    }
                }
            }
        }
    }

    /// Decode one escape sequence; `offset` is the position of the backslash.
    fn read_escape(&mut self, offset: usize) -> Result<char, StreamError> {
        let Some(b) = self.next_byte()? else {
            return Err(StreamError::lex("unterminated string", self.offset()));
        };
        let c = match b {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => return self.read_unicode_escape(offset),
            other => {
                return Err(StreamError::lex(
                    format!("invalid escape sequence '\\{}'", char::from(other).escape_default()),
                    offset,
                ));
            }
        };
        Ok(c)
    }

    fn read_unicode_escape(&mut self, offset: usize) -> Result<char, StreamError> {
        let first = self.read_hex4(offset)?;
        let code = match first {
            0xD800..=0xDBFF => {
                let low_offset = self.offset();
                match (self.next_byte()?, self.next_byte()?) {
                    (Some(b'\\'), Some(b'u')) => {}
                    (None, _) | (_, None) => return Err(StreamError::lex("unterminated string", self.offset())),
                    _ => return Err(StreamError::lex("unpaired high surrogate in unicode escape", offset)),
                }
                let second = self.read_hex4(low_offset)?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(StreamError::lex("expected low surrogate in unicode escape", low_offset));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(StreamError::lex("unpaired low surrogate in unicode escape", offset));
            }
            _ => first,
        };
        char::from_u32(code).ok_or_else(|| StreamError::lex("invalid unicode escape", offset))
    }

    fn read_hex4(&mut self, offset: usize) -> Result<u32, StreamError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let Some(b) = self.next_byte()? else {
                return Err(StreamError::lex("unterminated string", self.offset()));
            };
            let digit = char::from(b)
                .to_digit(16)
                .ok_or_else(|| StreamError::lex("invalid hex digit in unicode escape", offset))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    /// Decode one multi-byte UTF-8 character whose lead byte sits at `offset`.
    /// Continuation bytes may arrive in a later refill.
    fn read_utf8_char(&mut self, offset: usize) -> Result<char, StreamError> {
        let lead = self.buf[self.pos];
        self.pos += 1;
        let width = match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Err(StreamError::lex(format!("invalid UTF-8 lead byte 0x{lead:02x}"), offset)),
        };
        let mut bytes = [lead, 0, 0, 0];
        for slot in bytes.iter_mut().take(width).skip(1) {
            match self.peek_byte()? {
                Some(b) if b & 0xC0 == 0x80 => {
                    *slot = b;
                    self.pos += 1;
                }
                _ => return Err(StreamError::lex("truncated UTF-8 sequence", offset)),
            }
        }
        std::str::from_utf8(&bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| StreamError::lex("invalid UTF-8 sequence", offset))
    }

    // ---- numbers and literals ----

    fn read_number(&mut self, keep: bool) -> Result<String, StreamError> {
        let mut text = String::new();
        if self.peek_byte()? == Some(b'-') {
            self.take_byte(&mut text, keep);
        }
        match self.peek_byte()? {
            Some(b'0') => {
                self.take_byte(&mut text, keep);
                if let Some(b'0'..=b'9') = self.peek_byte()? {
                    return Err(StreamError::lex("leading zeros are not allowed", self.offset()));
                }
            }
            Some(b'1'..=b'9') => self.take_digits(&mut text, keep)?,
            Some(b) => {
                return Err(StreamError::lex(format!("expected digit but found {}", describe(b)), self.offset()));
            }
            None => return Err(StreamError::lex("unterminated number", self.offset())),
        }
        if self.peek_byte()? == Some(b'.') {
            self.take_byte(&mut text, keep);
            self.require_digits(&mut text, keep, "fraction")?;
        }
        if let Some(b'e' | b'E') = self.peek_byte()? {
            self.take_byte(&mut text, keep);
            if let Some(b'+' | b'-') = self.peek_byte()? {
                self.take_byte(&mut text, keep);
            }
            self.require_digits(&mut text, keep, "exponent")?;
        }
        Ok(text)
    }

    fn take_byte(&mut self, text: &mut String, keep: bool) {
        if keep {
            text.push(char::from(self.buf[self.pos]));
        }
        self.pos += 1;
    }

    fn require_digits(&mut self, text: &mut String, keep: bool, part: &str) -> Result<(), StreamError> {
        match self.peek_byte()? {
            Some(b'0'..=b'9') => self.take_digits(text, keep),
            Some(b) => Err(StreamError::lex(
                format!("expected digit in number {part} but found {}", describe(b)),
                self.offset(),
            )),
            None => Err(StreamError::lex("unterminated number", self.offset())),
        }
    }

    fn take_digits(&mut self, text: &mut String, keep: bool) -> Result<(), StreamError> {
        loop {
            if !self.fill()? {
                return Ok(());
            }
            let start = self.pos;
            while self.pos < self.len && self.buf[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            if keep {
                text.extend(self.buf[start..self.pos].iter().map(|&b| char::from(b)));
            }
            if self.pos < self.len {
                return Ok(());
            }
        }
    }

    fn read_literal(&mut self, literal: &'static [u8]) -> Result<(), StreamError> {
        let offset = self.offset();
        for &want in literal {
            match self.next_byte()? {
                Some(b) if b == want => {}
                _ => {
                    return Err(StreamError::lex(
                        format!("invalid literal, expected '{}'", String::from_utf8_lossy(literal)),
                        offset,
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> Iterator for Tokenizer<R> {
    type Item = Result<Token, StreamError>;

    /// Yields tokens up to and excluding [`Token::EndOfStream`]; stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.expect == Expect::Ended {
            return None;
        }
        match self.next_token() {
            Ok(Token::EndOfStream) => None,
            Ok(token) => Some(Ok(token)),
            Err(e) => {
                self.expect = Expect::Ended;
                Some(Err(e))
            }
        }
    }
}

fn value_kind(b: u8, offset: usize) -> Result<TokenKind, StreamError> {
    match b {
        b'{' => Ok(TokenKind::ObjectStart),
        b'[' => Ok(TokenKind::ArrayStart),
        b'"' => Ok(TokenKind::String),
        b'-' | b'0'..=b'9' => Ok(TokenKind::Number),
        b't' | b'f' => Ok(TokenKind::Bool),
        b'n' => Ok(TokenKind::Null),
        b',' | b':' => Err(StreamError::structural(format!("expected value but found {}", describe(b)), offset)),
        _ => Err(StreamError::lex(format!("unexpected {}", describe(b)), offset)),
    }
}

fn container_name(kind: Container) -> &'static str {
    match kind {
        Container::Object => "an object",
        Container::Array => "an array",
    }
}

fn describe(b: u8) -> String {
    if b.is_ascii_graphic() {
        format!("'{}'", char::from(b))
    } else {
        format!("byte 0x{b:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most one byte per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.split_first() {
                Some((&b, rest)) if !buf.is_empty() => {
                    buf[0] = b;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    fn tokens(input: &[u8]) -> Vec<Token> {
        Tokenizer::with_buffer_size(Trickle(input), MIN_BUFFER_SIZE)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn multibyte_characters_survive_one_byte_reads() {
        let toks = tokens("[\"h\u{e9}llo \u{1f600} \u{4e16}\"]".as_bytes());
        assert_eq!(toks[1], Token::String("h\u{e9}llo \u{1f600} \u{4e16}".to_string()));
    }

    #[test]
    fn minimum_buffer_is_enforced() {
        let t = Tokenizer::with_buffer_size(&b"1"[..], 1);
        assert_eq!(t.buffer_size(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn peek_is_idempotent_and_consumes_separators() {
        let mut t = Tokenizer::new(&b"[1 , 2]"[..]);
        assert_eq!(t.next_token().unwrap(), Token::ArrayStart);
        assert_eq!(t.next_token().unwrap(), Token::Number("1".into()));
        assert_eq!(t.peek_kind().unwrap(), TokenKind::Number);
        assert_eq!(t.peek_kind().unwrap(), TokenKind::Number);
        assert_eq!(t.token_offset(), 5);
        assert_eq!(t.next_token().unwrap(), Token::Number("2".into()));
    }

    #[test]
    fn skip_value_leaves_cursor_after_container() {
        let mut t = Tokenizer::new(&br#"{"a":{"deep":["x",{"y":null}]},"b":2}"#[..]);
        assert_eq!(t.next_token().unwrap(), Token::ObjectStart);
        assert_eq!(t.next_token().unwrap(), Token::Key("a".into()));
        t.skip_value().unwrap();
        assert_eq!(t.next_token().unwrap(), Token::Key("b".into()));
        assert_eq!(t.next_token().unwrap(), Token::Number("2".into()));
        assert_eq!(t.next_token().unwrap(), Token::ObjectEnd);
        assert_eq!(t.next_token().unwrap(), Token::EndOfStream);
    }

    #[test]
    fn skip_value_rejects_closer() {
        let mut t = Tokenizer::new(&b"[]"[..]);
        t.next_token().unwrap();
        assert!(matches!(t.skip_value(), Err(StreamError::Structural { offset: 1, .. })));
    }
}
