//! Client facade for the paginated API.
//!
//! # Design
//! `Client` is a cheap handle (`Arc` inside) around the config, the transport
//! and an optional 401 hook. Each call snapshots the config into the
//! request's headers before dispatch, so rotating the session token never
//! affects requests already in flight.
//!
//! A successful JSON response is decoded once into a `Page` that carries the
//! parsed body and its pagination continuations. Other content types come
//! back as the raw `HttpResponse`.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;

use crate::auth::{build_headers, refresh_headers, ClientConfig, Compression};
use crate::decode::decode_to_text;
use crate::error::{ApiError, ConfigError, DecodeError, HttpError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::pagination::{ContinuationSet, LinkSet};
use crate::transport::{dispatch, AbortHandle, Transport};

/// Called with the error of every request that fails with HTTP 401, before
/// the error is returned to the caller.
pub type UnauthorizedHook = Arc<dyn Fn(&HttpError) + Send + Sync>;

struct Inner {
    config: RwLock<ClientConfig>,
    transport: Arc<dyn Transport>,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// A decoded JSON response.
#[derive(Debug, Clone)]
pub struct Page {
    /// The response as the transport delivered it.
    pub response: HttpResponse,
    pub body: Value,
    pub links: LinkSet,
    pub continuations: ContinuationSet,
}

impl Page {
    pub fn has_next(&self) -> bool {
        self.continuations.next.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Page(Page),
    /// A successful response whose content type is not JSON.
    Raw(HttpResponse),
}

impl Reply {
    pub fn page(&self) -> Option<&Page> {
        match self {
            Reply::Page(page) => Some(page),
            Reply::Raw(_) => None,
        }
    }

    pub fn into_page(self) -> Option<Page> {
        match self {
            Reply::Page(page) => Some(page),
            Reply::Raw(_) => None,
        }
    }

    pub fn response(&self) -> &HttpResponse {
        match self {
            Reply::Page(page) => &page.response,
            Reply::Raw(response) => response,
        }
    }
}

impl Client {
    /// Fails with `ConfigError::MissingApiKey` before any request can be made
    /// if the config has no API key.
    pub fn new(config: ClientConfig, transport: impl Transport) -> Result<Self, ConfigError> {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    pub fn with_shared_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                transport,
                on_unauthorized: RwLock::new(None),
            }),
        })
    }

    /// A client sending requests with ureq.
    #[cfg(feature = "ureq-transport")]
    pub fn with_default_transport(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::new(config, crate::ureq_transport::UreqTransport::new())
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> ClientConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_config(&self, update: impl FnOnce(&mut ClientConfig)) {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut config);
    }

    pub fn set_session_token(&self, token: Option<String>) {
        self.update_config(|c| c.session_token = token);
    }

    pub fn clear_session_token(&self) {
        self.set_session_token(None);
    }

    pub fn session_token(&self) -> Option<String> {
        self.config().session_token
    }

    pub fn set_compression(&self, compression: Compression) {
        self.update_config(|c| c.compression = compression);
    }

    pub fn on_unauthorized(&self, hook: impl Fn(&HttpError) + Send + Sync + 'static) {
        *self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub fn clear_unauthorized_hook(&self) {
        *self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Build the request for `{host}/api/v{version}/{kind}` with headers taken
    /// from the current config.
    pub fn build_request(
        &self,
        method: HttpMethod,
        kind: &str,
        query: &[&str],
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> HttpRequest {
        let config = self.config();
        HttpRequest {
            method,
            url: config.url_for(kind, query),
            headers: build_headers(&config, body.as_ref()),
            body,
            timeout,
            response_mode: config.compression.response_mode(),
        }
    }

    /// `request` with its credential headers and response mode rebuilt from
    /// the current config. The mode follows `Accept-Encoding`, so a switch to
    /// gzip also switches the transport to raw bytes.
    pub(crate) fn refresh(&self, request: &HttpRequest) -> HttpRequest {
        let config = self.config();
        HttpRequest {
            headers: refresh_headers(&config, &request.headers),
            response_mode: config.compression.response_mode(),
            ..request.clone()
        }
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        kind: &str,
        query: &[&str],
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> Result<Reply, ApiError> {
        let request = self.build_request(method, kind, query, body, timeout);
        self.execute(request).await
    }

    pub async fn get(&self, kind: &str, timeout: Duration) -> Result<Reply, ApiError> {
        self.request(HttpMethod::Get, kind, &[], None, timeout).await
    }

    pub async fn get_with_query(
        &self,
        kind: &str,
        query: &[&str],
        timeout: Duration,
    ) -> Result<Reply, ApiError> {
        self.request(HttpMethod::Get, kind, query, None, timeout).await
    }

    pub async fn post(
        &self,
        kind: &str,
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> Result<Reply, ApiError> {
        self.request(HttpMethod::Post, kind, &[], body, timeout).await
    }

    pub async fn put(
        &self,
        kind: &str,
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> Result<Reply, ApiError> {
        self.request(HttpMethod::Put, kind, &[], body, timeout).await
    }

    pub async fn patch(
        &self,
        kind: &str,
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> Result<Reply, ApiError> {
        self.request(HttpMethod::Patch, kind, &[], body, timeout).await
    }

    pub async fn delete(
        &self,
        kind: &str,
        body: Option<RequestBody>,
        timeout: Duration,
    ) -> Result<Reply, ApiError> {
        self.request(HttpMethod::Delete, kind, &[], body, timeout).await
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<Reply, ApiError> {
        self.execute_with_abort(request, &AbortHandle::new()).await
    }

    /// Send a prebuilt request. Aborting `abort` ends it with
    /// `TransportErrorKind::Aborted`.
    pub async fn execute_with_abort(
        &self,
        request: HttpRequest,
        abort: &AbortHandle,
    ) -> Result<Reply, ApiError> {
        let response = match dispatch(self.inner.transport.as_ref(), &request, abort).await {
            Ok(response) => response,
            Err(err) => {
                self.notify_failure(&err);
                return Err(err);
            }
        };
        self.interpret(request, response)
    }

    fn notify_failure(&self, err: &ApiError) {
        let ApiError::Http(http) = err else {
            return;
        };
        if !http.is_unauthorized() {
            return;
        }
        tracing::warn!(body = %http.body, "request rejected with 401");
        let hook = self
            .inner
            .on_unauthorized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(http);
        }
    }

    fn interpret(&self, request: HttpRequest, response: HttpResponse) -> Result<Reply, ApiError> {
        if !response.is_json() {
            return Ok(Reply::Raw(response));
        }
        let text = decode_to_text(&response.payload, response.content_encoding())?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| DecodeError::Json(e.to_string()))?;
        if body.is_null() {
            return Err(DecodeError::Json("response body is null".to_string()).into());
        }
        let links = LinkSet::from_body(&body);
        let continuations = ContinuationSet::from_links(self, &links, &request);
        Ok(Reply::Page(Page {
            response,
            body,
            links,
            continuations,
        }))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.config();
        f.debug_struct("Client")
            .field("host", &config.host)
            .field("version", &config.version)
            .field("compression", &config.compression)
            .finish_non_exhaustive()
    }
}
