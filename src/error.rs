use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Stable machine codes produced locally. Codes reported by the API are
/// passed through verbatim.
pub mod codes {
    /// Non-2xx response whose body did not carry a usable error object.
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    /// The call did not complete within the configured timeout.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// The connection to the API could not be established.
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    /// Any other failure before a response was obtained.
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    /// A 2xx body that could not be decoded into the requested type.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    /// The request body could not be serialized.
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    /// The client could not be configured or constructed.
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The login exchange was rejected by the API.
    Authentication,
    /// No HTTP response was obtained (timeout, DNS, connection refused).
    Transport,
    /// Non-2xx response with a structured error body.
    Api,
    /// Non-2xx response with an unparsable or incomplete body.
    MalformedErrorBody,
    /// 2xx response whose body does not match the requested type.
    InvalidResponse,
    /// The request could not be built.
    InvalidRequest,
    /// The client configuration is incomplete or invalid.
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Transport => "transport",
            ErrorKind::Api => "api",
            ErrorKind::MalformedErrorBody => "malformed error body",
            ErrorKind::InvalidResponse => "invalid response",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(v)
    }
}

/// The single error shape surfaced by every failed call.
///
/// Callers branch on [`BindError::code`] (and [`BindError::kind`]); the
/// message is meant for diagnostics only.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct BindError {
    kind: ErrorKind,
    status: Option<u16>,
    code: String,
    message: String,
    details: Map<String, Value>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BindError {
    pub fn new(
        kind: ErrorKind,
        status: Option<u16>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            code: code.into(),
            message: message.into(),
            details: Map::new(),
            source: None,
        }
    }

    pub(crate) fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub(crate) fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub(crate) fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            ErrorKind::Transport,
            None,
            codes::TIMEOUT,
            format!("request timed out after {} ms", after.as_millis()),
        )
    }

    pub(crate) fn invalid_response(status: u16, source: serde_json::Error) -> Self {
        Self::new(
            ErrorKind::InvalidResponse,
            Some(status),
            codes::INVALID_RESPONSE,
            format!("response body does not match the expected shape: {source}"),
        )
        .with_source(source)
    }

    pub(crate) fn invalid_request(source: serde_json::Error) -> Self {
        Self::new(
            ErrorKind::InvalidRequest,
            None,
            codes::INVALID_REQUEST,
            format!("request body could not be serialized: {source}"),
        )
        .with_source(source)
    }

    pub(crate) fn invalid_path_segment(segment: &str) -> Self {
        Self::new(
            ErrorKind::InvalidRequest,
            None,
            codes::INVALID_REQUEST,
            format!("{segment:?} is not a usable path segment"),
        )
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Configuration,
            None,
            codes::CONFIGURATION_ERROR,
            message,
        )
    }

    /// Re-tag an error raised by the login exchange. Only rejections
    /// (a response was obtained) become authentication failures.
    pub(crate) fn into_authentication(mut self) -> Self {
        if self.status.is_some() {
            self.kind = ErrorKind::Authentication;
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status of the failed call, `None` when no response was obtained.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// HTTP status of the failed call, `0` when no response was obtained.
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(0)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Transport && self.code == codes::TIMEOUT
    }
}

impl From<reqwest::Error> for BindError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            codes::TIMEOUT
        } else if err.is_connect() {
            codes::CONNECTION_ERROR
        } else {
            codes::NETWORK_ERROR
        };
        BindError::new(ErrorKind::Transport, None, code, err.to_string()).with_source(err)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<Map<String, Value>>,
}

/// Build the normalized error for a non-2xx response.
pub(crate) fn from_response(status: StatusCode, body: &[u8]) -> BindError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => {
            BindError::new(ErrorKind::Api, Some(status.as_u16()), error.code, error.message)
                .with_details(error.details.unwrap_or_default())
        }
        Err(_) => BindError::new(
            ErrorKind::MalformedErrorBody,
            Some(status.as_u16()),
            codes::HTTP_ERROR,
            status_text(status),
        ),
    }
}

/// Reason phrase for a status; HTTP/2 responses carry none on the wire.
pub(crate) fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}
