use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    HttpError,
    ConnectionFailed,
    Timeout,
    Unknown,
    NotConnected,
    SequenceAborted,
    ParseFailed,
    NotFound,
    InvalidArgument,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::BadRequest => "bad request",
            ErrorKind::HttpError => "http error",
            ErrorKind::ConnectionFailed => "connection failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown error",
            ErrorKind::NotConnected => "not connected",
            ErrorKind::SequenceAborted => "sequence aborted",
            ErrorKind::ParseFailed => "parse failed",
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Io => "io error",
        };
        f.write_str(name)
    }
}

/// Error returned across the library boundary: a classification plus a
/// human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct Error {
    pub kind: ErrorKind,
    pub detail: String,
}

impl Error {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorKind::NotConnected, "connect to the REST API first")
    }

    pub fn io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::new(ErrorKind::NotFound, format!("{context}: {err}"))
        } else {
            Self::new(ErrorKind::Io, format!("{context}: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
