//! Hypermedia pagination.
//!
//! # Design
//! A JSON page may carry `links.next`, `links.prev`, `links.first` and
//! `links.last`. Each present link becomes a `Continuation`: the original
//! request with its URL swapped for the (percent-unescaped) link. The decoded
//! body is never touched; continuations travel next to it in a
//! `ContinuationSet`.
//!
//! Calling a continuation goes through the owning `Client` again, so the
//! credential headers are rebuilt from the client's current config at call
//! time rather than replayed from the original request.

use std::fmt;

use serde_json::Value;

use crate::client::{Client, Reply};
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::transport::AbortHandle;
use crate::url::unescape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkName {
    Next,
    Prev,
    First,
    Last,
}

impl LinkName {
    pub const ALL: [LinkName; 4] =
        [LinkName::Next, LinkName::Prev, LinkName::First, LinkName::Last];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkName::Next => "next",
            LinkName::Prev => "prev",
            LinkName::First => "first",
            LinkName::Last => "last",
        }
    }
}

impl fmt::Display for LinkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw link URLs found in a page body, as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl LinkSet {
    /// Read `body.links`. Missing, empty or non-string entries are absent.
    pub fn from_body(body: &Value) -> Self {
        let Some(links) = body.get("links").and_then(Value::as_object) else {
            return Self::default();
        };
        let field = |name: LinkName| {
            links
                .get(name.as_str())
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            next: field(LinkName::Next),
            prev: field(LinkName::Prev),
            first: field(LinkName::First),
            last: field(LinkName::Last),
        }
    }

    pub fn get(&self, name: LinkName) -> Option<&str> {
        match name {
            LinkName::Next => self.next.as_deref(),
            LinkName::Prev => self.prev.as_deref(),
            LinkName::First => self.first.as_deref(),
            LinkName::Last => self.last.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        LinkName::ALL.iter().all(|&name| self.get(name).is_none())
    }
}

/// A ready-to-send follow-up request for one pagination link.
#[derive(Clone)]
pub struct Continuation {
    link: LinkName,
    request: HttpRequest,
    client: Client,
}

impl Continuation {
    pub fn link(&self) -> LinkName {
        self.link
    }

    /// The follow-up request as derived from the original, before the
    /// credential headers and response mode are refreshed at call time.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub async fn call(&self) -> Result<Reply, ApiError> {
        self.call_with_abort(&AbortHandle::new()).await
    }

    pub async fn call_with_abort(&self, abort: &AbortHandle) -> Result<Reply, ApiError> {
        tracing::debug!(link = %self.link, url = %self.request.url, "following pagination link");
        let request = self.client.refresh(&self.request);
        self.client.execute_with_abort(request, abort).await
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("link", &self.link)
            .field("method", &self.request.method)
            .field("url", &self.request.url)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContinuationSet {
    pub next: Option<Continuation>,
    pub prev: Option<Continuation>,
    pub first: Option<Continuation>,
    pub last: Option<Continuation>,
}

impl ContinuationSet {
    pub fn from_links(client: &Client, links: &LinkSet, original: &HttpRequest) -> Self {
        let make = |name: LinkName| {
            links.get(name).map(|raw| Continuation {
                link: name,
                request: original.with_url(unescape(raw)),
                client: client.clone(),
            })
        };
        Self {
            next: make(LinkName::Next),
            prev: make(LinkName::Prev),
            first: make(LinkName::First),
            last: make(LinkName::Last),
        }
    }

    pub fn get(&self, name: LinkName) -> Option<&Continuation> {
        match name {
            LinkName::Next => self.next.as_ref(),
            LinkName::Prev => self.prev.as_ref(),
            LinkName::First => self.first.as_ref(),
            LinkName::Last => self.last.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        LinkName::ALL.iter().all(|&name| self.get(name).is_none())
    }
}

/// Continuations for every link in `body`, each re-issuing `original` against
/// the link's URL through `client`.
pub fn build_continuations(
    client: &Client,
    body: &Value,
    original: &HttpRequest,
) -> ContinuationSet {
    ContinuationSet::from_links(client, &LinkSet::from_body(body), original)
}
