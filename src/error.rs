use thiserror::Error;

/// Errors raised while streaming a document. Every variant is terminal for
/// the iteration that produced it.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("lex error at byte {offset}: {reason}")]
    Lex { reason: String, offset: usize },
    #[error("structural error at byte {offset}: {reason}")]
    Structural { reason: String, offset: usize },
    #[error("source read error: {0}")]
    SourceRead(#[from] std::io::Error),
}

impl StreamError {
    pub fn lex(reason: impl Into<String>, offset: usize) -> Self {
        StreamError::Lex { reason: reason.into(), offset }
    }

    pub fn structural(reason: impl Into<String>, offset: usize) -> Self {
        StreamError::Structural { reason: reason.into(), offset }
    }

    /// Byte offset of the fault, when the error came from the input itself.
    pub fn offset(&self) -> Option<usize> {
        match self {
            StreamError::Lex { offset, .. } | StreamError::Structural { offset, .. } => Some(*offset),
            StreamError::SourceRead(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid path expression at position {position}: {reason}")]
pub struct PathSyntaxError {
    pub reason: String,
    pub position: usize,
}

impl PathSyntaxError {
    pub fn new(reason: impl Into<String>, position: usize) -> Self {
        Self { reason: reason.into(), position }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("path error: {0}")]
    Path(#[from] PathSyntaxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid size '{0}'")]
    InvalidSize(String),
    #[error("invalid value for {0}")]
    InvalidSetting(&'static str),
}
