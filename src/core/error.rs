use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::request::Request;
use crate::response::Response;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Aborted,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Aborted => "aborted",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Failure reported by a [`Transport`](crate::Transport) before any response was obtained.
#[derive(Debug, Error)]
#[error("{kind} transport failure: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: BoxError,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn aborted() -> Self {
        Self::new(TransportErrorKind::Aborted, "request aborted")
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn is_abort(&self) -> bool {
        self.kind == TransportErrorKind::Aborted
    }

    pub(crate) fn into_source(self) -> BoxError {
        self.source
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    MissingTransport,
    TlsInit,
    NoUrl,
    InvalidUrl,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    SerializeForm,
    SerializeQuery,
    Http,
    Timeout,
    Aborted,
    Transport,
    Deserialize,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingTransport => "missing_transport",
            Self::TlsInit => "tls_init",
            Self::NoUrl => "no_url",
            Self::InvalidUrl => "invalid_url",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::SerializeForm => "serialize_form",
            Self::SerializeQuery => "serialize_query",
            Self::Http => "http",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
            Self::Transport => "transport",
            Self::Deserialize => "deserialize",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no transport configured and the default transport feature is disabled")]
    MissingTransport,
    #[error("failed to initialize TLS: {message}")]
    TlsInit { message: String },
    #[error("no URL provided")]
    NoUrl,
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize request form: {source}")]
    SerializeForm {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("failed to serialize request query: {source}")]
    SerializeQuery {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("request failed with status {status} {status_text} for {} {}", .request.method(), .request.redacted_url())]
    Http {
        status: StatusCode,
        status_text: String,
        response: Box<Response>,
        request: Arc<Request>,
    },
    #[error("request timed out after {}ms for {} {}", .timeout.as_millis(), .request.method(), .request.redacted_url())]
    Timeout {
        timeout: Duration,
        request: Arc<Request>,
    },
    #[error("request aborted for {} {}", .request.method(), .request.redacted_url())]
    Aborted { request: Arc<Request> },
    #[error("transport error ({kind}) for {} {}: {source}", .request.method(), .request.redacted_url())]
    Transport {
        kind: TransportErrorKind,
        request: Arc<Request>,
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingTransport => ErrorCode::MissingTransport,
            Self::TlsInit { .. } => ErrorCode::TlsInit,
            Self::NoUrl => ErrorCode::NoUrl,
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::SerializeForm { .. } => ErrorCode::SerializeForm,
            Self::SerializeQuery { .. } => ErrorCode::SerializeQuery,
            Self::Http { .. } => ErrorCode::Http,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Aborted { .. } => ErrorCode::Aborted,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Http { response, .. } => Some(response),
            _ => None,
        }
    }

    /// The descriptor the failing attempt was sent with, for errors raised by the execution loop.
    pub fn request(&self) -> Option<&Arc<Request>> {
        match self {
            Self::Http { request, .. }
            | Self::Timeout { request, .. }
            | Self::Aborted { request }
            | Self::Transport { request, .. } => Some(request),
            _ => None,
        }
    }
}
