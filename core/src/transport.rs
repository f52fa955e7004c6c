//! Request dispatch over a pluggable transport.
//!
//! # Design
//! A `Transport` is the capability that actually talks to the network: it
//! gets a fully serialized `WireRequest` and reports exactly one terminal
//! `TransportEvent`. Everything else lives in `dispatch`:
//!
//! - body serialization (text as-is, JSON stringified, forms flattened into
//!   `multipart/form-data`);
//! - a fallback timer at 110% of the request timeout that aborts requests
//!   whose native timeout never fires;
//! - caller aborts through an `AbortHandle`;
//! - classification of the terminal event into a response or an error.
//!
//! The transport future, the fallback timer and the abort signal race in one
//! `select!`. Whichever finishes first decides the outcome and the others are
//! dropped, which also disarms the timer.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::auth::CONTENT_TYPE;
use crate::decode::decode_to_text;
use crate::error::{ApiError, HttpError, TransportError, TransportErrorKind};
use crate::form::{to_form_fields, FormValue, MultipartBody};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, ResponseMode};

/// A request in the exact shape the transport puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Native timeout; `None` means the transport waits indefinitely.
    pub timeout: Option<Duration>,
    pub response_mode: ResponseMode,
}

/// How a transport attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A response arrived, whatever its status.
    Load(HttpResponse),
    /// The connection failed.
    Error(String),
    /// The transport's native timeout fired.
    Timeout,
    /// The request was aborted.
    Abort,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and resolve with its terminal event.
    ///
    /// The returned future may be dropped before it completes when the
    /// request is aborted; implementations must tolerate that.
    async fn send(&self, request: WireRequest) -> TransportEvent;
}

/// Cancels in-flight requests that were given this handle.
///
/// Cloning yields a handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn aborted(&self) {
        self.token.cancelled().await;
    }
}

/// Fallback timer length for a native timeout: 110%.
pub fn fallback_timeout(timeout: Duration) -> Duration {
    timeout * 11 / 10
}

/// Serialize the request body and finalize headers for the wire.
pub fn prepare(request: &HttpRequest) -> Result<WireRequest, ApiError> {
    let mut headers = request.headers.clone();
    let form_requested = request.wants_form_data();

    let body = match &request.body {
        None => None,
        Some(RequestBody::Text(text)) => Some(text.clone().into_bytes()),
        Some(RequestBody::Json(value)) if form_requested => {
            let form = FormValue::from(value.clone());
            Some(encode_form(&form, &mut headers)?)
        }
        Some(RequestBody::Json(value)) => Some(
            serde_json::to_vec(value).map_err(|e| ApiError::Serialization(e.to_string()))?,
        ),
        Some(RequestBody::Form(form)) => Some(encode_form(form, &mut headers)?),
    };

    Ok(WireRequest {
        method: request.method,
        url: request.url.clone(),
        headers,
        body,
        timeout: (!request.timeout.is_zero()).then_some(request.timeout),
        response_mode: request.response_mode,
    })
}

/// Encode `form` as multipart and make the headers announce its boundary:
/// a bare `multipart/form-data` content type is completed in place, a
/// missing one is appended.
fn encode_form(
    form: &FormValue,
    headers: &mut Vec<(String, String)>,
) -> Result<Vec<u8>, ApiError> {
    let fields = to_form_fields(form, "");
    let multipart = MultipartBody::encode(&fields)
        .map_err(|e| ApiError::Serialization(format!("multipart body: {e}")))?;
    let content_type = multipart.content_type();
    match headers
        .iter_mut()
        .find(|(n, _)| n.eq_ignore_ascii_case(CONTENT_TYPE))
    {
        Some((_, value)) if value.starts_with("multipart/form-data") => *value = content_type,
        Some(_) => {}
        None => headers.push((CONTENT_TYPE.to_string(), content_type)),
    }
    Ok(multipart.bytes)
}

/// Send `request` through `transport` and classify the result.
///
/// 2xx responses resolve; any other status becomes `HttpError` with the
/// decoded body; error, timeout and abort events become `TransportError`.
pub async fn dispatch(
    transport: &dyn Transport,
    request: &HttpRequest,
    abort: &AbortHandle,
) -> Result<HttpResponse, ApiError> {
    let wire = prepare(request)?;
    let timeout = wire.timeout;
    tracing::debug!(
        method = %request.method,
        url = %request.url,
        timeout_ms = request.timeout.as_millis() as u64,
        "dispatching request"
    );
    tracing::trace!(headers = wire.headers.len(), curl = %request.to_curl(), "wire request");

    let fallback = async {
        match timeout {
            Some(t) => tokio::time::sleep(fallback_timeout(t)).await,
            None => std::future::pending::<()>().await,
        }
    };

    let event = tokio::select! {
        event = transport.send(wire) => event,
        () = fallback => {
            tracing::warn!(url = %request.url, "fallback timer fired, aborting request");
            TransportEvent::Abort
        }
        () = abort.aborted() => TransportEvent::Abort,
    };

    classify(event)
}

fn classify(event: TransportEvent) -> Result<HttpResponse, ApiError> {
    match event {
        TransportEvent::Load(response) if response.is_success() => Ok(response),
        TransportEvent::Load(response) => {
            let body = decode_to_text(&response.payload, response.content_encoding())
                .unwrap_or_else(|e| format!("<undecodable body: {e}>"));
            tracing::debug!(status = response.status, "request failed with HTTP status");
            Err(HttpError {
                status: response.status,
                status_text: response.status_text,
                body,
            }
            .into())
        }
        TransportEvent::Error(message) => {
            Err(TransportError::new(TransportErrorKind::Network, message).into())
        }
        TransportEvent::Timeout => {
            Err(TransportError::new(TransportErrorKind::Timeout, "request timed out").into())
        }
        TransportEvent::Abort => {
            Err(TransportError::new(TransportErrorKind::Aborted, "request aborted").into())
        }
    }
}
