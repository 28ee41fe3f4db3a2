//! Crate-wide error type: a typed [`ErrorKind`] plus a context-frame stack.
//!
//! Library code never remaps a kind as it propagates up through layers;
//! instead each layer pushes a frame describing where the error passed
//! through (`domain`, `function`, `message`). `ChecksumMismatch` is
//! deliberately absent from [`ErrorKind`] — it is recovered locally into
//! the checksum-error list and never returned as an `Err` (see
//! [`crate::ewf::pipeline`]).

use std::fmt;

/// One frame of the error's propagation backtrace.
#[derive(Debug, Clone)]
pub struct ContextFrame {
    pub domain: &'static str,
    pub function: &'static str,
    pub message: String,
}

impl fmt::Display for ContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}: {}", self.domain, self.function, self.message)
    }
}

/// The kind of failure, independent of where it was detected.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Caller violated a documented precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// On-disk bytes violate the segment/section/table layout.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// Underlying read/write/seek/open/close failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Write chunk out of order, or read past `media_size`.
    #[error("sequence violation: {0}")]
    SequenceViolation(String),
    /// Allocation failure or FD pool exhausted and unable to evict.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// The abort flag was observed at a suspension point.
    #[error("operation aborted")]
    Aborted,
    /// A requested hash value identifier is not present in the image.
    #[error("not found: {0}")]
    NotFound(String),
}

/// The crate's error type: a kind plus the frames it passed through.
#[derive(Debug)]
pub struct EwfError {
    pub kind: ErrorKind,
    pub frames: Vec<ContextFrame>,
}

impl EwfError {
    pub fn new(kind: ErrorKind) -> Self {
        EwfError {
            kind,
            frames: Vec::new(),
        }
    }

    /// Push a context frame and return `self`, for use at `?`-propagation
    /// sites: `foo().map_err(|e| e.context("handle", "open", "..."))?`.
    pub fn context(mut self, domain: &'static str, function: &'static str, message: impl Into<String>) -> Self {
        self.frames.push(ContextFrame {
            domain,
            function,
            message: message.into(),
        });
        self
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.kind, ErrorKind::Aborted)
    }
}

impl fmt::Display for EwfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in self.frames.iter().rev() {
            write!(f, "\n  while {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EwfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for EwfError {
    fn from(kind: ErrorKind) -> Self {
        EwfError::new(kind)
    }
}

impl From<std::io::Error> for EwfError {
    fn from(err: std::io::Error) -> Self {
        EwfError::new(ErrorKind::Io(err))
    }
}

/// Extension trait letting `Result<T, EwfError>` gain a frame inline with `?`.
pub trait ResultExt<T> {
    fn ctx(self, domain: &'static str, function: &'static str, message: impl Into<String>) -> Result<T, EwfError>;
}

impl<T> ResultExt<T> for Result<T, EwfError> {
    fn ctx(self, domain: &'static str, function: &'static str, message: impl Into<String>) -> Result<T, EwfError> {
        self.map_err(|e| e.context(domain, function, message))
    }
}

pub type Result<T> = std::result::Result<T, EwfError>;
