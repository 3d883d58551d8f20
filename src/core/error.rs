//! Purpose: Single error type shared by the API client, handler persistence, and CLI.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`, `kind_from_status`.
//! Role: Every failure surfaces as one distinct, matchable kind; nothing is retried here.
//! Invariants: Messages never embed the access token.
//! Invariants: Exit code mapping is stable once published; new kinds are appended.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Usage,
    InvalidRequest,
    Authentication,
    NotFound,
    MethodNotAllowed,
    RateLimited,
    ServiceUnavailable,
    Remote,
    MalformedResponse,
    Transport,
    Persistence,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    method: Option<String>,
    status: Option<u16>,
    body: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            method: None,
            status: None,
            body: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// API endpoint (e.g. `GET /chats/42`) that produced the error.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Raw response body as received, when one was read.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(method) = &self.method {
            write!(f, " (method: {method})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Classify a non-success HTTP status returned by the bot API.
pub fn kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::InvalidRequest,
        401 => ErrorKind::Authentication,
        404 => ErrorKind::NotFound,
        405 => ErrorKind::MethodNotAllowed,
        429 => ErrorKind::RateLimited,
        503 => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Remote,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Usage => 2,
        ErrorKind::InvalidRequest => 3,
        ErrorKind::Authentication => 4,
        ErrorKind::NotFound => 5,
        ErrorKind::MethodNotAllowed => 6,
        ErrorKind::RateLimited => 7,
        ErrorKind::ServiceUnavailable => 8,
        ErrorKind::Remote => 9,
        ErrorKind::MalformedResponse => 10,
        ErrorKind::Transport => 11,
        ErrorKind::Persistence => 12,
    }
}
