//! Structural decoder and path selector.
//!
//! A [`Selector`] drives a [`Tokenizer`], keeps one [`NestingFrame`] per
//! container it has descended into, and yields `(key, value)` pairs for every
//! subtree whose concrete path matches its [`PathExpression`]. Subtrees that
//! cannot contain a match are skipped through the tokenizer without being
//! materialized, so memory stays proportional to the largest match plus the
//! nesting depth.

use std::fs::File;
use std::io::{self, Read};
use std::iter::FusedIterator;
use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::{debug, trace};

use crate::error::{PathSyntaxError, StreamError};
use crate::path::{PathExpression, PathKey, PathMatch};
use crate::token::{Container, Token, TokenKind};
use crate::tokenizer::Tokenizer;

/// One open container on the selector's path.
#[derive(Debug, Clone)]
pub struct NestingFrame {
    pub kind: Container,
    /// Key of the child currently being visited.
    pub current: Option<PathKey>,
    next_index: usize,
}

impl NestingFrame {
    fn new(kind: Container) -> Self {
        Self { kind, current: None, next_index: 0 }
    }

    /// Advance to the next child. Arrays number their children; objects use
    /// the key most recently seen.
    fn enter_child(&mut self) -> Option<PathKey> {
        if self.kind == Container::Array {
            self.current = Some(PathKey::Index(self.next_index));
            self.next_index += 1;
        }
        self.current.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    /// Passing over input that cannot contain a match.
    Skipping,
    /// Inside an ancestor of potential matches.
    Descending,
    /// Materializing a matched subtree.
    Matched,
    Done,
    Failed,
}

pub struct Selector<R> {
    tokenizer: Tokenizer<R>,
    path: PathExpression,
    frames: Vec<NestingFrame>,
    state: SelectorState,
    yielded: usize,
}

impl<R: Read> Selector<R> {
    pub fn new(source: R, path: PathExpression) -> Self {
        Self::with_tokenizer(Tokenizer::new(source), path)
    }

    /// Parse `expr` eagerly; a bad expression fails here, never during iteration.
    pub fn open(source: R, expr: &str) -> Result<Self, PathSyntaxError> {
        Ok(Self::new(source, PathExpression::parse(expr)?))
    }

    pub fn with_tokenizer(tokenizer: Tokenizer<R>, path: PathExpression) -> Self {
        Self {
            tokenizer,
            path,
            frames: Vec::new(),
            state: SelectorState::Skipping,
            yielded: 0,
        }
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn path(&self) -> &PathExpression {
        &self.path
    }

    pub fn frames(&self) -> &[NestingFrame] {
        &self.frames
    }

    pub fn items_yielded(&self) -> usize {
        self.yielded
    }

    pub fn bytes_consumed(&self) -> usize {
        self.tokenizer.offset()
    }

    fn advance(&mut self) -> Result<Option<(PathKey, Value)>, StreamError> {
        loop {
            let kind = self.tokenizer.peek_kind()?;
            match kind {
                TokenKind::EndOfStream => {
                    self.tokenizer.next_token()?;
                    self.state = SelectorState::Done;
                    debug!(target: "streamdecode::selector", items = self.yielded, bytes = self.tokenizer.offset(), "stream complete");
                    return Ok(None);
                }
                TokenKind::Key => {
                    if let Token::Key(name) = self.tokenizer.next_token()? {
                        if let Some(frame) = self.frames.last_mut() {
                            frame.current = Some(PathKey::Name(name));
                        }
                    }
                    continue;
                }
                TokenKind::ObjectEnd | TokenKind::ArrayEnd => {
                    self.tokenizer.next_token()?;
                    self.frames.pop();
                    continue;
                }
                _ => {}
            }

            let depth = self.frames.len();
            let offset = self.tokenizer.token_offset();
            let key = match self.frames.last_mut() {
                None => PathKey::Root,
                Some(frame) => frame
                    .enter_child()
                    .ok_or_else(|| StreamError::structural("object member without a key", offset))?,
            };

            match self.path.classify(depth, &key) {
                PathMatch::Matched => {
                    self.state = SelectorState::Matched;
                    trace!(target: "streamdecode::selector", %key, depth, offset, "building matched subtree");
                    let value = build_value(&mut self.tokenizer)?;
                    self.state = SelectorState::Skipping;
                    self.yielded += 1;
                    return Ok(Some((key, value)));
                }
                PathMatch::Prefix if kind.is_container_start() => {
                    self.state = SelectorState::Descending;
                    self.tokenizer.next_token()?;
                    let container = if kind == TokenKind::ObjectStart { Container::Object } else { Container::Array };
                    self.frames.push(NestingFrame::new(container));
                }
                _ => {
                    self.state = SelectorState::Skipping;
                    self.tokenizer.skip_value()?;
                }
            }
        }
    }
}

impl Selector<File> {
    /// Open a file for streaming. The handle is released when the selector is dropped.
    pub fn from_path(file: impl AsRef<Path>, path: PathExpression) -> io::Result<Self> {
        let handle = File::open(file.as_ref())?;
        debug!(target: "streamdecode::selector", file = %file.as_ref().display(), %path, "opened file");
        Ok(Self::new(handle, path))
    }
}

impl<R: Read> Iterator for Selector<R> {
    type Item = Result<(PathKey, Value), StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, SelectorState::Done | SelectorState::Failed) {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.state = SelectorState::Failed;
                debug!(target: "streamdecode::selector", error = %e, items = self.yielded, "selector failed");
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for Selector<R> {}

enum Partial {
    Array(Vec<Value>),
    Object(Map<String, Value>, Option<String>),
}

/// Materialize the value starting at the tokenizer's next token. Uses an
/// explicit stack so deeply nested input cannot overflow the call stack.
pub fn build_value<R: Read>(tokenizer: &mut Tokenizer<R>) -> Result<Value, StreamError> {
    let mut stack: Vec<Partial> = Vec::new();
    loop {
        let token = tokenizer.next_token()?;
        let offset = tokenizer.token_offset();
        let value = match token {
            Token::ObjectStart => {
                stack.push(Partial::Object(Map::new(), None));
                continue;
            }
            Token::ArrayStart => {
                stack.push(Partial::Array(Vec::new()));
                continue;
            }
            Token::Key(name) => {
                match stack.last_mut() {
                    Some(Partial::Object(_, pending)) => *pending = Some(name),
                    _ => return Err(StreamError::structural("object key outside of an object", offset)),
                }
                continue;
            }
            Token::ObjectEnd | Token::ArrayEnd => match stack.pop() {
                Some(Partial::Object(map, _)) => Value::Object(map),
                Some(Partial::Array(items)) => Value::Array(items),
                None => return Err(StreamError::structural("closing token without an open container", offset)),
            },
            Token::String(s) => Value::String(s),
            Token::Number(text) => Value::Number(parse_number(&text, offset)?),
            Token::Bool(b) => Value::Bool(b),
            Token::Null => Value::Null,
            Token::EndOfStream => return Err(StreamError::structural("unexpected end of stream", offset)),
        };
        match stack.last_mut() {
            None => return Ok(value),
            Some(Partial::Array(items)) => items.push(value),
            Some(Partial::Object(map, pending)) => match pending.take() {
                Some(name) => {
                    map.insert(name, value);
                }
                None => return Err(StreamError::structural("object member without a key", offset)),
            },
        }
    }
}

/// Numbers keep their source text (`arbitrary_precision`), so nothing is lost
/// for values beyond `u64`/`f64`.
fn parse_number(text: &str, offset: usize) -> Result<Number, StreamError> {
    serde_json::from_str::<Number>(text).map_err(|e| StreamError::lex(format!("invalid number '{text}': {e}"), offset))
}
