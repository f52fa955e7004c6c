//! Error types for the paginated API client.
//!
//! # Design
//! Every failure surfaces as one `ApiError`, but each class of failure keeps
//! its own type so callers can match on the part they care about:
//! `HttpError` for non-2xx statuses, `TransportError` for network failures,
//! timeouts and aborts, `DecodeError` for payloads that cannot be turned into
//! text or JSON, and `ConfigError` for a client that cannot be built. None of
//! them are retried by the core.

/// A non-2xx response. `body` is already decoded to text (gzip inflated,
/// UTF-8 decoded) so it can be shown to a human as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("(Status code: {status}, Status: {status_text}, Response: {body})")]
pub struct HttpError {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpError {
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// The terminal event that ended a request without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection failed (DNS, refused, reset, TLS, ...).
    Network,
    /// The transport's own timeout fired.
    Timeout,
    /// The request was aborted, either by the caller or by the fallback timer.
    Aborted,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportErrorKind::Network => "network error",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport {kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Whatever body the transport delivered before failing, decoded.
    /// Usually empty.
    pub body: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            body: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload carried the gzip magic bytes but did not inflate.
    #[error("gzip inflate failed: {0}")]
    Gzip(String),

    /// The payload was declared as JSON but did not parse to a value.
    #[error("could not parse JSON response: {0}")]
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("endpoints need an API key")]
    MissingApiKey,

    #[error("unknown compression parameter: {0}")]
    UnknownCompression(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid URL: {0}")]
pub struct ParseUrlError(pub String);

/// Errors returned by `Client` requests and continuations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The request body could not be serialized for the wire.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ApiError {
    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http(e) => Some(e.status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http(e) if e.is_unauthorized())
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            ApiError::Transport(e) => Some(e.kind),
            _ => None,
        }
    }
}
