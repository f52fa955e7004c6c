//! Blocking ureq transport driven from tokio's blocking pool.
//!
//! # Design
//! ureq is synchronous, so each request runs inside `spawn_blocking`. The
//! request's timeout becomes ureq's global timeout (the native timeout); the
//! dispatcher's fallback timer still covers the case where it never fires.
//! When a request is aborted the blocking call is left to finish on its own
//! and its result is discarded.
//!
//! Status codes are never treated as errors here: every response is handed
//! back as `TransportEvent::Load` and classified by the dispatcher.

use async_trait::async_trait;
use ureq::typestate::WithBody;

use crate::decode::decode_utf8;
use crate::http::{HttpMethod, HttpResponse, Payload, ResponseMode};
use crate::transport::{Transport, TransportEvent, WireRequest};

/// Sends requests with a fresh ureq agent per request.
///
/// ureq is built without its gzip feature, so compressed bodies arrive
/// exactly as the server sent them and are inflated by the decoder.
#[derive(Debug, Clone, Default)]
pub struct UreqTransport {
    _private: (),
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: WireRequest) -> TransportEvent {
        match tokio::task::spawn_blocking(move || execute(request)).await {
            Ok(event) => event,
            Err(e) => TransportEvent::Error(format!("transport task failed: {e}")),
        }
    }
}

fn execute(request: WireRequest) -> TransportEvent {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(request.timeout)
        .build()
        .new_agent();

    let url = request.url.as_str();
    let headers = request.headers.as_slice();
    let result = match (request.method, request.body) {
        (HttpMethod::Get, _) => with_headers(agent.get(url), headers).call(),
        (HttpMethod::Delete, None) => with_headers(agent.delete(url), headers).call(),
        (HttpMethod::Delete, Some(body)) => {
            send_body(with_headers(agent.delete(url), headers).force_send_body(), Some(body))
        }
        (HttpMethod::Post, body) => send_body(with_headers(agent.post(url), headers), body),
        (HttpMethod::Put, body) => send_body(with_headers(agent.put(url), headers), body),
        (HttpMethod::Patch, body) => send_body(with_headers(agent.patch(url), headers), body),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(ureq::Error::Timeout(_)) => return TransportEvent::Timeout,
        Err(e) => return TransportEvent::Error(e.to_string()),
    };

    let status = response.status();
    let response_headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let bytes = match response.body_mut().read_to_vec() {
        Ok(bytes) => bytes,
        Err(ureq::Error::Timeout(_)) => return TransportEvent::Timeout,
        Err(e) => return TransportEvent::Error(e.to_string()),
    };
    let payload = match request.response_mode {
        ResponseMode::Bytes => Payload::Bytes(bytes),
        ResponseMode::Text => Payload::Text(decode_utf8(&bytes)),
    };

    TransportEvent::Load(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        url: request.url,
        headers: response_headers,
        payload,
    })
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: ureq::RequestBuilder<WithBody>,
    body: Option<Vec<u8>>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(&body[..]),
        None => builder.send_empty(),
    }
}
