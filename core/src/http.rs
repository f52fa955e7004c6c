//! HTTP request and response descriptors.
//!
//! # Design
//! Requests and responses are plain data. The client builds an `HttpRequest`,
//! a `Transport` turns it into bytes on the wire, and whatever came back is
//! handed over as an `HttpResponse`. A request is never mutated after it is
//! built: pagination produces a fresh request with only the URL swapped.
//!
//! Headers are kept as an ordered `Vec` of pairs rather than a map so that
//! duplicates and ordering survive all the way to the wire.

use std::fmt;
use std::time::Duration;

use crate::form::FormValue;
use crate::url::ApiUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent verbatim.
    Text(String),
    /// Stringified as JSON, or flattened into form fields when the request
    /// carries `Content-Type: multipart/form-data`.
    Json(serde_json::Value),
    /// Always flattened and sent as `multipart/form-data`.
    Form(FormValue),
}

impl RequestBody {
    pub fn is_form(&self) -> bool {
        matches!(self, RequestBody::Form(_))
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<FormValue> for RequestBody {
    fn from(value: FormValue) -> Self {
        RequestBody::Form(value)
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

/// How the transport should hand the response payload back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// The transport decodes the payload to text itself.
    #[default]
    Text,
    /// The transport returns the exact bytes it received, so gzip framing
    /// can be detected and inflated by the client.
    Bytes,
}

/// A request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// `Duration::ZERO` disables both the native and the fallback timeout.
    pub timeout: Duration,
    pub response_mode: ResponseMode,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::ZERO,
            response_mode: ResponseMode::Text,
        }
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// A copy of this request aimed at `url`. Method, headers, body, timeout
    /// and response mode are kept.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    /// Whether the headers ask for the body to be sent as multipart form data.
    pub fn wants_form_data(&self) -> bool {
        self.headers
            .iter()
            .any(|(n, v)| n == "Content-Type" && v == "multipart/form-data")
    }

    /// Render the request as an equivalent `curl` command line, for debug logs.
    pub fn to_curl(&self) -> String {
        let mut out = format!("curl -X {}", self.method);
        for (name, value) in &self.headers {
            out.push_str(&format!(
                " -H '{}: {}'",
                single_quote_escape(name),
                single_quote_escape(value)
            ));
        }
        match &self.body {
            Some(RequestBody::Text(text)) => {
                out.push_str(&format!(" -d '{}'", single_quote_escape(text)));
            }
            Some(RequestBody::Json(value)) => {
                out.push_str(&format!(" -d '{}'", single_quote_escape(&value.to_string())));
            }
            Some(RequestBody::Form(_)) => out.push_str(" -F '...'"),
            None => {}
        }
        out.push_str(&format!(" \"{}\"", self.url));
        out
    }
}

fn single_quote_escape(s: &str) -> String {
    s.replace('\'', "\\'")
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Response payload as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Text(String::new())
    }
}

/// A response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// The URL the response was served from.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.header("Content-Encoding")
    }

    /// `application/json`, optionally followed by parameters.
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            ct.strip_prefix("application/json")
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(';'))
        })
    }

    /// The API parts of the URL this response came from, when it follows the
    /// `/api/v{N}/...` shape.
    pub fn api_url(&self) -> Option<ApiUrl> {
        ApiUrl::parse(&self.url)
    }
}
