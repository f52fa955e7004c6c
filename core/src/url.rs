//! Absolute URL decomposition.
//!
//! # Design
//! `Url` splits a URL into protocol, host, port, path, query and fragment
//! with a single regular expression and reassembles it with each query
//! key/value percent-encoded on its own. Query values are percent-decoded by
//! `Url::params`, so a URL produced by `Display` parses back to the same
//! parameters; URLs escaped by other encoders are not guaranteed to survive
//! a round trip byte for byte.
//!
//! `ApiUrl` is the stricter variant that only accepts the
//! `/api/v{N}/...` shape served by the API.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseUrlError;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([^:/?#]*):)?//([^/:]*)(?::(\d+))?([^?#]*)(?:\?((?:&?[^&#]*)*))?(?:#(.*))?$")
        .expect("URL pattern is valid")
});

static PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^&=]+)(?:=([^&]*))?").expect("query pattern is valid"));

static API_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(https?:)//",             // protocol
        r"(([^:/?#]*)(?::([0-9]+))?)", // host and port
        r"(/api/v\d+)",              // path header
        r"(/[^?#]*)",                // path name
        r"(\?[^#]*|)",               // search
        r"(#.*|)$",                  // hash
    ))
    .expect("API URL pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Url {
    /// Scheme without the trailing colon, e.g. `https`.
    pub protocol: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl Url {
    pub fn parse(url: &str) -> Result<Self, ParseUrlError> {
        let caps = URL_RE
            .captures(url)
            .ok_or_else(|| ParseUrlError(url.to_string()))?;
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        let port = match caps.get(3) {
            Some(m) => Some(
                m.as_str()
                    .parse::<u16>()
                    .map_err(|_| ParseUrlError(url.to_string()))?,
            ),
            None => None,
        };
        Ok(Self {
            protocol: text(1),
            host: text(2).unwrap_or_default(),
            port,
            path: text(4).unwrap_or_default(),
            query: text(5),
            fragment: text(6),
        })
    }

    /// Query parameters in order, percent-decoded. A key without `=` has no
    /// value.
    pub fn params(&self) -> Vec<(String, Option<String>)> {
        let Some(query) = self.query.as_deref() else {
            return Vec::new();
        };
        PARAM_RE
            .captures_iter(query)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str();
                let value = caps.get(2).map(|m| unescape(m.as_str()));
                Some((unescape(key), value))
            })
            .collect()
    }
}

impl FromStr for Url {
    type Err = ParseUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(protocol) = &self.protocol {
            write!(f, "{protocol}:")?;
        }
        write!(f, "//{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)?;
        if self.query.as_deref().is_some_and(|q| !q.is_empty()) {
            let pairs: Vec<String> = self
                .params()
                .iter()
                .map(|(key, value)| match value {
                    Some(value) => {
                        format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                    }
                    None => urlencoding::encode(key).into_owned(),
                })
                .collect();
            write!(f, "?{}", pairs.join("&"))?;
        }
        if let Some(fragment) = self.fragment.as_deref().filter(|s| !s.is_empty()) {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

/// Percent-decode `s`. Decoded bytes are read as UTF-8 leniently, so invalid
/// sequences become U+FFFD instead of failing.
pub fn unescape(s: &str) -> String {
    let bytes = urlencoding::decode_binary(s.as_bytes());
    crate::decode::decode_utf8(&bytes)
}

/// The parts of a URL served under `/api/v{N}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrl {
    pub href: String,
    /// Scheme including the colon, e.g. `https:`.
    pub protocol: String,
    /// Host name and port as written.
    pub host: String,
    pub host_name: String,
    pub port: Option<u16>,
    /// `/api/v{N}`.
    pub path_header: String,
    /// Path after the version prefix, starting with `/`.
    pub path_name: String,
    /// Query string including the `?`, or empty.
    pub search: String,
    /// Fragment including the `#`, or empty.
    pub hash: String,
}

impl ApiUrl {
    pub fn parse(href: &str) -> Option<Self> {
        let caps = API_URL_RE.captures(href)?;
        let text = |i: usize| caps.get(i).map_or_else(String::new, |m| m.as_str().to_string());
        Some(Self {
            href: href.to_string(),
            protocol: text(1),
            host: text(2),
            host_name: text(3),
            port: caps.get(4).and_then(|m| m.as_str().parse().ok()),
            path_header: text(5),
            path_name: text(6),
            search: text(7),
            hash: text(8),
        })
    }

    /// API version number taken from the path header.
    pub fn version(&self) -> Option<u32> {
        self.path_header.strip_prefix("/api/v")?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_every_component() {
        let url = Url::parse("https://api.example.com:8443/api/v1/items?x=1&y=2#top").unwrap();
        assert_eq!(url.protocol.as_deref(), Some("https"));
        assert_eq!(url.host, "api.example.com");
        assert_eq!(url.port, Some(8443));
        assert_eq!(url.path, "/api/v1/items");
        assert_eq!(url.query.as_deref(), Some("x=1&y=2"));
        assert_eq!(url.fragment.as_deref(), Some("top"));
    }

    #[test]
    fn round_trip_reassembles_equivalent_url() {
        let src = "https://api.example.com:8443/api/v1/items?x=1&y=2";
        let url = Url::parse(src).unwrap();
        assert_eq!(url.to_string(), src);
        assert_eq!(Url::parse(&url.to_string()).unwrap(), url);
    }

    #[test]
    fn params_keep_order_and_valueless_keys() {
        let url = Url::parse("http://h/p?a=1&flag&b=two%20words").unwrap();
        assert_eq!(
            url.params(),
            vec![
                ("a".to_string(), Some("1".to_string())),
                ("flag".to_string(), None),
                ("b".to_string(), Some("two words".to_string())),
            ]
        );
        assert_eq!(url.to_string(), "http://h/p?a=1&flag&b=two%20words");
    }

    #[test]
    fn query_values_are_reencoded_independently() {
        let url = Url {
            protocol: Some("http".to_string()),
            host: "h".to_string(),
            port: None,
            path: "/p".to_string(),
            query: Some("q=a b&e=é".to_string()),
            fragment: None,
        };
        assert_eq!(url.to_string(), "http://h/p?q=a%20b&e=%C3%A9");
    }

    #[test]
    fn protocol_relative_and_bare_host() {
        let url = Url::parse("//cdn.example.com").unwrap();
        assert_eq!(url.protocol, None);
        assert_eq!(url.host, "cdn.example.com");
        assert_eq!(url.path, "");
        assert_eq!(url.to_string(), "//cdn.example.com");
    }

    #[test]
    fn missing_authority_is_rejected() {
        assert!(Url::parse("not a url").is_err());
        assert!(Url::parse("http://h:99999/").is_err());
    }

    #[test]
    fn unescape_decodes_utf8_and_tolerates_garbage() {
        assert_eq!(
            unescape("http%3A%2F%2Fh%2Fapi%2Fv1%2Fitems%3Fpage%3D2"),
            "http://h/api/v1/items?page=2"
        );
        assert_eq!(unescape("%C3%A9"), "é");
        assert_eq!(unescape("%FF"), "\u{FFFD}");
        assert_eq!(unescape("100%"), "100%");
    }

    #[test]
    fn api_url_decomposition() {
        let api = ApiUrl::parse("https://api.example.com:8443/api/v2/items/7?page=3#x").unwrap();
        assert_eq!(api.protocol, "https:");
        assert_eq!(api.host, "api.example.com:8443");
        assert_eq!(api.host_name, "api.example.com");
        assert_eq!(api.port, Some(8443));
        assert_eq!(api.path_header, "/api/v2");
        assert_eq!(api.version(), Some(2));
        assert_eq!(api.path_name, "/items/7");
        assert_eq!(api.search, "?page=3");
        assert_eq!(api.hash, "#x");
    }

    #[test]
    fn api_url_requires_api_prefix() {
        assert!(ApiUrl::parse("https://example.com/items").is_none());
        assert!(ApiUrl::parse("ftp://example.com/api/v1/items").is_none());
    }
}
