pub mod config;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod path;
pub mod profiler;
pub mod report;
pub mod selector;
pub mod streaming;
pub mod token;
pub mod tokenizer;

// Convenient re-exports
pub use error::{HarnessError, PathSyntaxError, StreamError};
pub use path::{PathExpression, PathKey};
pub use selector::Selector;
pub use serde_json::Value;
pub use token::{Token, TokenKind};
pub use tokenizer::Tokenizer;
