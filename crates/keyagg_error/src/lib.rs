//! Error type shared by all keyagg crates.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

pub type Result<T, E = AggError> = std::result::Result<T, E>;

/// Broad classification of an error.
///
/// The driver uses the kind to decide between retrying, aborting, and
/// reporting a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unclassified internal error.
    Internal,
    /// A caller provided an invalid argument or setting.
    InvalidArgument,
    /// A record value isn't compatible with the accumulator's value type.
    ValueType,
    /// A worker task terminated abnormally and ran out of retries.
    WorkerFailure,
    /// Internal merge or barrier bug. Never retried.
    InvariantViolation,
    /// The run was canceled before completing.
    Canceled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Internal => "internal",
            Self::InvalidArgument => "invalid argument",
            Self::ValueType => "value type error",
            Self::WorkerFailure => "worker failure",
            Self::InvariantViolation => "invariant violation",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
struct ErrorField {
    key: &'static str,
    value: String,
}

#[derive(Debug)]
struct AggErrorInner {
    msg: String,
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<ErrorField>,
    backtrace: Backtrace,
}

/// The error type for aggregation runs.
///
/// Boxed so that `Result<T>` stays small on the happy path.
#[derive(Debug)]
pub struct AggError {
    inner: Box<AggErrorInner>,
}

impl AggError {
    pub fn new(msg: impl Into<String>) -> Self {
        AggError {
            inner: Box::new(AggErrorInner {
                msg: msg.into(),
                kind: ErrorKind::Internal,
                source: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    /// Set the kind for this error.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.inner.kind = kind;
        self
    }

    /// Attach a key/value pair providing additional context.
    ///
    /// Fields are printed in the order they were added.
    pub fn with_field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.inner.fields.push(ErrorField {
            key,
            value: value.to_string(),
        });
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn get_msg(&self) -> &str {
        &self.inner.msg
    }

    /// Get the most recently added field for `key`.
    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .rev()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }
}

impl fmt::Display for AggError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        if self.inner.kind != ErrorKind::Internal {
            write!(f, " ({})", self.inner.kind)?;
        }

        for field in &self.inner.fields {
            write!(f, "\n    {}: {}", field.key, field.value)?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace: {}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for AggError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for AggError {
    fn from(value: fmt::Error) -> Self {
        Self::with_source("Format error", Box::new(value))
    }
}

impl From<std::io::Error> for AggError {
    fn from(value: std::io::Error) -> Self {
        Self::with_source("IO error", Box::new(value))
    }
}

/// Wrap foreign errors with a message.
pub trait ResultExt<T, E> {
    /// Wrap an error with a static context string.
    fn context(self, msg: &'static str) -> Result<T>;

    /// Wrap an error with a context string generated from a function.
    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(AggError::with_source(msg, Box::new(e))),
        }
    }

    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(AggError::with_source(f(), Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(AggError::new(msg)),
        }
    }
}
