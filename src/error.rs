use std::error;
use std::fmt;
use std::io;

use candle_core::Error as TensorError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Tensor(TensorError),
    Json(serde_json::Error),
    Validation(ValidationError),
    /// A checkpoint disagrees with the architecture or vocabularies it declares.
    Checkpoint(String),
    Config(String),
    Contextual(String),
}

/// Input rejected before it reaches the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptySentence,
    SentenceTooLong { len: usize, max: usize },
    TagCountMismatch { tokens: usize, tags: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValidationError::EmptySentence => write!(f, "sentence has no tokens"),
            ValidationError::SentenceTooLong { len, max } => write!(
                f,
                "sentence has {} tokens, the model accepts at most {}",
                len, max
            ),
            ValidationError::TagCountMismatch { tokens, tags } => write!(
                f,
                "got {} tags for a sentence of {} tokens",
                tags, tokens
            ),
        }
    }
}

impl error::Error for ValidationError {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => e.fmt(f),
            Error::Tensor(ref e) => write!(f, "tensor error: {}", e),
            Error::Json(ref e) => write!(f, "json error: {}", e),
            Error::Validation(ref e) => write!(f, "invalid input: {}", e),
            Error::Checkpoint(ref msg) => write!(f, "checkpoint mismatch: {}", msg),
            Error::Config(ref msg) => write!(f, "invalid configuration: {}", msg),
            Error::Contextual(ref msg) => write!(f, "contextual embedder: {}", msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Tensor(ref e) => Some(e),
            Error::Json(ref e) => Some(e),
            Error::Validation(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<TensorError> for Error {
    fn from(e: TensorError) -> Self {
        Error::Tensor(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}
