//! Error types for the SmartAsset client.
//!
//! Two layers live here.  [`Error`] describes what went wrong talking to the
//! API (transport, HTTP status, decoding).  [`AppError`] is the structured
//! value handed to a presentation layer: it classifies a failure by the user
//! intent that produced it and keeps the transport error as its cause.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;
use std::time::Duration;

use crate::types::SessionId;

/// The underlying cause of a transport error.  Shared so errors stay `Clone`.
pub type Cause = Arc<dyn error::Error + Send + Sync>;

type BoxedCause = Box<dyn error::Error + Send + Sync>;

/// Everything that can go wrong between the client and the server.
///
/// HTTP failures are classified by status code; the `message` is the
/// server's `detail` text when it sent one.
#[derive(Clone, Debug)]
pub enum Error {
    /// A status with no more specific variant.
    Api {
        status_code: u16,
        message: String,
        request_id: Option<String>,
    },

    /// 401.  The credential is missing, expired or was rejected.
    Authentication { message: String },

    /// 403.
    Permission { message: String },

    /// 404.  Usually a session that was deleted elsewhere.
    NotFound { message: String },

    /// 409.  Registering an email that already has an account.
    Conflict { message: String },

    /// 429.
    RateLimit {
        message: String,
        /// Seconds from the `retry-after` header.
        retry_after: Option<u64>,
    },

    /// 400 or 422.  `param` names the first rejected field.
    BadRequest {
        message: String,
        param: Option<String>,
    },

    /// 408, or no response within the client timeout.
    Timeout {
        message: String,
        after: Option<Duration>,
    },

    /// The server could not be reached.
    Connection {
        message: String,
        source: Option<Cause>,
    },

    /// 500.
    InternalServer {
        message: String,
        request_id: Option<String>,
    },

    /// 502, 503 or 504.
    ServiceUnavailable {
        message: String,
        retry_after: Option<u64>,
    },

    /// A body, credential file or config file did not parse.
    Serialization {
        message: String,
        source: Option<Cause>,
    },

    Io {
        message: String,
        source: Arc<io::Error>,
    },

    /// reqwest failed for a reason other than connect or timeout.
    HttpClient {
        message: String,
        source: Option<Cause>,
    },

    /// The local environment cannot support the client (no home directory).
    Config { message: String },

    Url {
        message: String,
        source: Option<url::ParseError>,
    },

    /// A reply stream broke off or could not be read.
    Streaming {
        message: String,
        source: Option<Cause>,
    },

    /// Bytes that should have been UTF-8 were not.
    Encoding {
        message: String,
        source: Option<Cause>,
    },
}

impl Error {
    pub fn api(status_code: u16, message: String, request_id: Option<String>) -> Self {
        Error::Api {
            status_code,
            message,
            request_id,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Error::Permission {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    pub fn bad_request(message: impl Into<String>, param: Option<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
            param,
        }
    }

    pub fn timeout(message: impl Into<String>, after: Option<Duration>) -> Self {
        Error::Timeout {
            message: message.into(),
            after,
        }
    }

    pub fn connection(message: impl Into<String>, source: Option<BoxedCause>) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn internal_server(message: impl Into<String>, request_id: Option<String>) -> Self {
        Error::InternalServer {
            message: message.into(),
            request_id,
        }
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    pub fn serialization(message: impl Into<String>, source: Option<BoxedCause>) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    pub fn http_client(message: impl Into<String>, source: Option<BoxedCause>) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    pub fn streaming(message: impl Into<String>, source: Option<BoxedCause>) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn encoding(message: impl Into<String>, source: Option<BoxedCause>) -> Self {
        Error::Encoding {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Error::Permission { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, Error::BadRequest { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// True for 5xx responses.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Error::InternalServer { .. } | Error::ServiceUnavailable { .. }
        )
    }

    /// The `x-request-id` the server attached, for support requests.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Api { request_id, .. } | Error::InternalServer { request_id, .. } => {
                request_id.as_deref()
            }
            _ => None,
        }
    }

    /// The HTTP status, for statuses without a dedicated variant.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// How long the server asked us to wait, if it said.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimit { retry_after, .. }
            | Error::ServiceUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The bare message, without the category prefix `Display` adds.
    pub fn message(&self) -> &str {
        match self {
            Error::Api { message, .. }
            | Error::Authentication { message }
            | Error::Permission { message }
            | Error::NotFound { message }
            | Error::Conflict { message }
            | Error::RateLimit { message, .. }
            | Error::BadRequest { message, .. }
            | Error::Timeout { message, .. }
            | Error::Connection { message, .. }
            | Error::InternalServer { message, .. }
            | Error::ServiceUnavailable { message, .. }
            | Error::Serialization { message, .. }
            | Error::Io { message, .. }
            | Error::HttpClient { message, .. }
            | Error::Config { message }
            | Error::Url { message, .. }
            | Error::Streaming { message, .. }
            | Error::Encoding { message, .. } => message,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            Error::Api { .. } => "API error",
            Error::Authentication { .. } => "Authentication error",
            Error::Permission { .. } => "Permission denied",
            Error::NotFound { .. } => "Not found",
            Error::Conflict { .. } => "Conflict",
            Error::RateLimit { .. } => "Rate limited",
            Error::BadRequest { .. } => "Bad request",
            Error::Timeout { .. } => "Timed out",
            Error::Connection { .. } => "Connection error",
            Error::InternalServer { .. } => "Server error",
            Error::ServiceUnavailable { .. } => "Service unavailable",
            Error::Serialization { .. } => "Serialization error",
            Error::Io { .. } => "I/O error",
            Error::HttpClient { .. } => "HTTP client error",
            Error::Config { .. } => "Configuration error",
            Error::Url { .. } => "URL error",
            Error::Streaming { .. } => "Streaming error",
            Error::Encoding { .. } => "Encoding error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api { status_code, .. } => {
                write!(f, "{} ({status_code}): {}", self.category(), self.message())?
            }
            _ => write!(f, "{}: {}", self.category(), self.message())?,
        }
        if let Some(request_id) = self.request_id() {
            write!(f, " (request {request_id})")?;
        }
        if let Some(seconds) = self.retry_after() {
            write!(f, " (retry after {seconds}s)")?;
        }
        match self {
            Error::BadRequest {
                param: Some(param), ..
            } => write!(f, " (field {param})"),
            Error::Timeout {
                after: Some(after), ..
            } => write!(f, " (after {}s)", after.as_secs()),
            _ => Ok(()),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::Serialization { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. }
            | Error::Encoding { source, .. } => source
                .as_deref()
                .map(|e| e as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(&**source),
            Error::Url { source, .. } => source
                .as_ref()
                .map(|e| e as &(dyn error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("invalid JSON: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("invalid YAML: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("invalid URL: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::encoding(format!("invalid UTF-8: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for SmartAsset transport operations.
pub type Result<T> = std::result::Result<T, Error>;

///////////////////////////////////////////// AppError ////////////////////////////////////////////

/// The fetch operation a [`AppError::Fetch`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOp {
    /// Loading the session list.
    ListSessions,
    /// Loading one session's transcript.
    LoadSession(SessionId),
    /// Deleting a session.
    DeleteSession(SessionId),
    /// Renaming a session.
    RenameSession(SessionId),
}

impl fmt::Display for FetchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOp::ListSessions => write!(f, "load sessions"),
            FetchOp::LoadSession(id) => write!(f, "load session {id}"),
            FetchOp::DeleteSession(id) => write!(f, "delete session {id}"),
            FetchOp::RenameSession(id) => write!(f, "rename session {id}"),
        }
    }
}

/// A failure surfaced to the presentation layer.
///
/// Every asynchronous intent converts its transport error into one of these
/// before it leaves the controller, so callers only ever display structured
/// values.
#[derive(Clone, Debug)]
pub enum AppError {
    /// Input rejected on the client before any network call.
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Login, registration or identity refresh failed.
    Auth {
        /// Human-readable error message.
        message: String,
        /// The transport error, if the failure came from the API.
        source: Option<Error>,
    },

    /// Session list, transcript, delete or rename failed.
    Fetch {
        /// The operation that failed.
        op: FetchOp,
        /// The transport error.
        source: Error,
    },

    /// Sending a message failed; the optimistic message was rolled back.
    Send {
        /// The transport error.
        source: Error,
    },
}

impl AppError {
    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
        }
    }

    /// Creates a new authentication error from an API failure.
    pub fn auth(source: Error) -> Self {
        AppError::Auth {
            message: source.message().to_string(),
            source: Some(source),
        }
    }

    /// Creates a new authentication error with no transport cause.
    pub fn auth_message(message: impl Into<String>) -> Self {
        AppError::Auth {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new fetch error.
    pub fn fetch(op: FetchOp, source: Error) -> Self {
        AppError::Fetch { op, source }
    }

    /// Creates a new send error.
    pub fn send(source: Error) -> Self {
        AppError::Send { source }
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }

    /// Returns true if this is an authentication error.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth { .. })
    }

    /// Returns true if this is a fetch error.
    pub fn is_fetch(&self) -> bool {
        matches!(self, AppError::Fetch { .. })
    }

    /// Returns true if this is a send error.
    pub fn is_send(&self) -> bool {
        matches!(self, AppError::Send { .. })
    }

    /// Returns the underlying transport error, if any.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            AppError::Validation { .. } => None,
            AppError::Auth { source, .. } => source.as_ref(),
            AppError::Fetch { source, .. } | AppError::Send { source } => Some(source),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation { message } => write!(f, "{message}"),
            AppError::Auth { message, .. } => write!(f, "Authentication failed: {message}"),
            AppError::Fetch { op, source } => write!(f, "Failed to {op}: {}", source.message()),
            AppError::Send { source } => {
                write!(f, "Failed to send message: {}", source.message())
            }
        }
    }
}

impl error::Error for AppError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.cause().map(|e| e as &(dyn error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_strips_category() {
        let err = Error::not_found("Chat session not found");
        assert_eq!(err.message(), "Chat session not found");
        assert_eq!(err.to_string(), "Not found: Chat session not found");

        let err = Error::service_unavailable("Bad Gateway", Some(5));
        assert_eq!(
            err.to_string(),
            "Service unavailable: Bad Gateway (retry after 5s)"
        );
        let err = Error::api(418, "teapot".to_string(), Some("req-9".to_string()));
        assert_eq!(err.to_string(), "API error (418): teapot (request req-9)");
    }

    #[test]
    fn app_error_display() {
        let err = AppError::validation("Passwords do not match");
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(err.cause().is_none());

        let err = AppError::fetch(
            FetchOp::DeleteSession(3),
            Error::connection("refused", None),
        );
        assert_eq!(err.to_string(), "Failed to delete session 3: refused");
        assert!(err.is_fetch());
        assert!(err.cause().is_some_and(Error::is_connection));

        let err = AppError::send(Error::internal_server("boom", None));
        assert_eq!(err.to_string(), "Failed to send message: boom");
    }

    #[test]
    fn auth_error_keeps_api_message() {
        let err = AppError::auth(Error::authentication("Incorrect email or password"));
        assert!(err.is_auth());
        assert_eq!(
            err.to_string(),
            "Authentication failed: Incorrect email or password"
        );
    }
}
