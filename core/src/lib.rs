//! Encoding-aware client core for a paginated REST API.
//!
//! # Overview
//! Sends authenticated requests to `{host}/api/v{version}/{kind}`, decodes
//! responses whose compression and encoding are not known up front, and
//! turns the `links` of a JSON page into continuations that fetch the
//! neighbouring pages.
//!
//! # Design
//! - `http` holds the plain-data request/response descriptors.
//! - `decode` sniffs gzip framing and runs a hand-written lenient UTF-8
//!   decoder over raw payloads.
//! - `transport` owns dispatch: body serialization, the fallback timeout,
//!   aborts and status classification. The network itself is behind the
//!   `Transport` trait; `UreqTransport` is the default implementation.
//! - `pagination` builds continuations that re-send the original request
//!   against a link URL, with credentials refreshed at call time.
//! - `client` ties it together behind `Client`.

pub mod auth;
pub mod client;
pub mod decode;
pub mod error;
pub mod form;
pub mod http;
pub mod pagination;
pub mod transport;
pub mod url;

#[cfg(feature = "ureq-transport")]
pub mod ureq_transport;

pub use auth::{ClientConfig, Compression};
pub use client::{Client, Page, Reply, UnauthorizedHook};
pub use decode::{
    decode_bytes, decode_to_text, decode_utf16, decode_utf8, encode_utf8, DecodeMethod, Utf8Decoder,
};
pub use error::{
    ApiError, ConfigError, DecodeError, HttpError, ParseUrlError, TransportError,
    TransportErrorKind,
};
pub use form::{to_form_fields, FieldValue, FilePart, FormField, FormValue, MultipartBody};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Payload, RequestBody, ResponseMode};
pub use pagination::{build_continuations, Continuation, ContinuationSet, LinkName, LinkSet};
pub use transport::{dispatch, AbortHandle, Transport, TransportEvent, WireRequest};
pub use url::{ApiUrl, Url};

#[cfg(feature = "ureq-transport")]
pub use ureq_transport::UreqTransport;
