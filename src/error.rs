//! Error taxonomy shared by every subsystem.
//!
//! Every failure that can reach a client is an [`HttpError`]: a status code,
//! a client-facing body, an operator-facing message and an optional
//! machine-readable code of the form `HTTP_<CATEGORY>-<system-error-code>`.
//! Lower-level errors are kept as the `source`.

use std::io;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Header carrying [`HttpError::code`] on error responses.
pub const X_ERROR_CODE: &str = "x-error-code";

/// Body of every 404 produced for files.
pub const NOT_FOUND_BODY: &str = "This file cannot be found.";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error that maps onto an HTTP response.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    body: String,
    message: String,
    code: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl HttpError {
    pub fn new(status: StatusCode, body: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Attach a machine-readable error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Host header anomaly. Treated as a client error.
    pub fn suspicious_operation(message: &str, ip: &str, host: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("{message} {host}"),
            format!("SuspiciousOperation: {message} {host} with ip({ip})"),
        )
    }

    /// A file that does not exist, or that may not be served.
    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_BODY, message).with_code(error_code("FILE", code))
    }

    /// Server-side failure while receiving an upload.
    pub fn upload(body: &str, code: String, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, body, message).with_code(code)
    }

    /// The client went away before the response completed.
    pub fn aborted() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Request aborted.", "Request aborted.")
            .with_code(error_code("FILE", "ECONNABORTED"))
    }

    /// Wrap an I/O failure, deriving the code from the error kind.
    pub fn io(status: StatusCode, body: &str, category: &str, err: io::Error) -> Self {
        Self::new(status, body, err.to_string())
            .with_code(error_code(category, io_error_code(&err)))
            .with_source(err)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.code().is_some_and(|c| c.ends_with("-ECONNABORTED"))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = ?self.code, error = %self.message, "Request failed");
        } else {
            tracing::debug!(status = %self.status, code = ?self.code, error = %self.message, "Request rejected");
        }

        let mut response = (self.status, self.body).into_response();
        if let Some(code) = self.code.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(X_ERROR_CODE, code);
        }
        response
    }
}

/// Errors raised while signing, verifying or serializing cookies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieError {
    /// Only string values can be signed.
    #[error("cannot sign a non-string cookie value")]
    NotAString,

    /// Signing and verifying both require a non-empty secret.
    #[error("a secret is required to sign or unsign cookie values")]
    MissingSecret,

    /// The value already carries the signed prefix.
    #[error("cookie value is already signed")]
    AlreadySigned,

    /// The token is missing or lacks the signed prefix.
    #[error("cookie value is not signed")]
    NotSigned,

    /// The embedded signature does not match the value.
    #[error("cookie signature mismatch")]
    SignatureMismatch,

    #[error("invalid cookie name: {0:?}")]
    InvalidName(String),

    #[error("invalid cookie value for {0:?}")]
    InvalidValue(String),
}

impl CookieError {
    /// System-style code used in [`HttpError::code`].
    pub fn code(&self) -> &'static str {
        match self {
            CookieError::NotAString => "ENOTSTRING",
            CookieError::MissingSecret => "ENOSECRET",
            CookieError::AlreadySigned => "ESIGNED",
            CookieError::NotSigned => "EUNSIGNED",
            CookieError::SignatureMismatch => "EMISMATCH",
            CookieError::InvalidName(_) => "EINVALIDNAME",
            CookieError::InvalidValue(_) => "EINVALIDVALUE",
        }
    }
}

impl From<CookieError> for HttpError {
    fn from(err: CookieError) -> Self {
        HttpError::new(StatusCode::BAD_REQUEST, "Invalid cookie.", err.to_string())
            .with_code(error_code("COOKIE", err.code()))
            .with_source(err)
    }
}

/// Build a code following the `HTTP_<CATEGORY>-<code>` convention.
pub fn error_code(category: &str, code: &str) -> String {
    format!("HTTP_{category}-{code}")
}

/// POSIX-style name for an I/O error kind.
pub fn io_error_code(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::NotFound => "ENOENT",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::AlreadyExists => "EEXIST",
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        io::ErrorKind::Interrupted => "EINTR",
        io::ErrorKind::InvalidInput => "EINVAL",
        io::ErrorKind::UnexpectedEof => "EOF",
        io::ErrorKind::OutOfMemory => "ENOMEM",
        io::ErrorKind::Unsupported => "ENOTSUP",
        _ => "EIO",
    }
}
