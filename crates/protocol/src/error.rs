//! Error types for the wire layer and the share operations.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::http::Status;

/// Share operation error covering every failure mode an API call can surface.
///
/// Each variant maps to exactly one HTTP status via [`ShareError::status`];
/// nothing is allowed to reach the transport layer unmapped.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The supplied path escapes the share root or is malformed.
    #[error("path is outside the share root: {0}")]
    InvalidPath(String),

    /// The target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The target exists but is not a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// A supplied name was empty after sanitization.
    #[error("invalid name")]
    InvalidName,

    /// Creating or moving the entry would exceed the nesting limit.
    #[error("folder depth {depth} exceeds the maximum of {max}")]
    DepthExceeded {
        /// Depth the entry would end up at.
        depth: usize,
        /// Configured maximum depth.
        max: usize,
    },

    /// An entry already exists at the target path.
    #[error("already exists: {0}")]
    Conflict(String),

    /// The operation targets the share root itself.
    #[error("operation not allowed on the share root")]
    Forbidden,

    /// The operation is structurally invalid (e.g. moving a folder into itself).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The operating system denied access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other I/O failure, carrying the underlying message.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ShareError {
    /// HTTP status for this error.
    pub fn status(&self) -> Status {
        match self {
            ShareError::InvalidPath(_) => Status::Forbidden,
            ShareError::NotFound(_) => Status::NotFound,
            ShareError::NotADirectory(_) => Status::BadRequest,
            ShareError::NotAFile(_) => Status::BadRequest,
            ShareError::InvalidName => Status::BadRequest,
            ShareError::DepthExceeded { .. } => Status::BadRequest,
            ShareError::Conflict(_) => Status::Conflict,
            ShareError::Forbidden => Status::Forbidden,
            ShareError::InvalidOperation(_) => Status::BadRequest,
            ShareError::PermissionDenied(_) => Status::Forbidden,
            ShareError::Io(_) => Status::InternalServerError,
        }
    }

    /// Map an OS error observed while operating on `path`.
    ///
    /// Recognized kinds get their own variant so the router can answer with
    /// the right status; everything else becomes [`ShareError::Io`].
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let shown = path.display();
        match err.kind() {
            io::ErrorKind::NotFound => ShareError::NotFound(shown.to_string()),
            io::ErrorKind::PermissionDenied => ShareError::PermissionDenied(shown.to_string()),
            io::ErrorKind::AlreadyExists => ShareError::Conflict(shown.to_string()),
            _ => ShareError::Io(format!("{}: {}", shown, err)),
        }
    }
}

/// Transport-level parse and I/O failures, mapped at the connection boundary.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request could not be parsed.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// A request line, header block, or body exceeded its limit.
    #[error("request too large: {0}")]
    TooLarge(String),

    /// The request method is not one the server handles.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A body-carrying request arrived without a Content-Length.
    #[error("missing content length")]
    LengthRequired,

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HttpError {
    /// HTTP status for this error, used for the best-effort error reply.
    pub fn status(&self) -> Status {
        match self {
            HttpError::Malformed(_) => Status::BadRequest,
            HttpError::TooLarge(_) => Status::PayloadTooLarge,
            HttpError::UnsupportedMethod(_) => Status::MethodNotAllowed,
            HttpError::LengthRequired => Status::LengthRequired,
            HttpError::Io(_) => Status::InternalServerError,
        }
    }
}

/// Result type alias for share operations.
pub type Result<T> = std::result::Result<T, ShareError>;
