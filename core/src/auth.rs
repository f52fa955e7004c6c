//! Client credentials and the headers derived from them.
//!
//! # Design
//! `ClientConfig` is the only mutable state a client carries. Headers are
//! derived from it each time a request is built, so a rotated session token
//! is picked up by the next request (including pagination follow-ups) while
//! requests already built keep the headers they were given.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::http::{RequestBody, ResponseMode};

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT_ENCODING: &str = "Accept-Encoding";

/// Response compression the client asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Send no `Accept-Encoding`; the transport environment decides.
    #[default]
    Auto,
    Gzip,
    None,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Auto => "auto",
            Compression::Gzip => "gzip",
            Compression::None => "none",
        }
    }

    fn accept_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::Auto => None,
            Compression::Gzip => Some("gzip"),
            Compression::None => Some("identity"),
        }
    }

    /// Raw bytes whenever the body might arrive gzip-framed.
    pub fn response_mode(&self) -> ResponseMode {
        match self {
            Compression::Auto | Compression::Gzip => ResponseMode::Bytes,
            Compression::None => ResponseMode::Text,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Compression::Auto),
            "gzip" => Ok(Compression::Gzip),
            "none" => Ok(Compression::None),
            other => Err(ConfigError::UnknownCompression(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    api_key: String,
    pub host: String,
    pub version: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub compression: Compression,
}

impl ClientConfig {
    /// Fails with `ConfigError::MissingApiKey` when `api_key` is empty.
    pub fn new(
        api_key: impl Into<String>,
        host: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(Self {
            api_key,
            host: host.into().trim_end_matches('/').to_string(),
            version: version.into(),
            session_token: None,
            compression: Compression::Auto,
        })
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Re-check invariants on a config that did not come from `new`, e.g.
    /// one deserialized from a file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `{host}/api/v{version}/{kind}`, followed by `?` and the `&`-joined
    /// query items when there are any.
    pub fn url_for(&self, kind: &str, query: &[&str]) -> String {
        let mut url = format!("{}/api/v{}/{}", self.host, self.version, kind);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    pub fn authorization(&self) -> String {
        let mut value = format!("Token token=\"{}\"", self.api_key);
        if let Some(session) = self.session_token.as_deref().filter(|s| !s.is_empty()) {
            value.push_str(&format!(", session=\"{session}\""));
        }
        value
    }
}

/// Headers derived from `config` for a request carrying `body`.
pub fn build_headers(config: &ClientConfig, body: Option<&RequestBody>) -> Vec<(String, String)> {
    let mut headers = vec![(AUTHORIZATION.to_string(), config.authorization())];
    if body.is_some_and(|b| !b.is_form()) {
        headers.push((CONTENT_TYPE.to_string(), "application/json".to_string()));
    }
    if let Some(encoding) = config.compression.accept_encoding() {
        headers.push((ACCEPT_ENCODING.to_string(), encoding.to_string()));
    }
    headers
}

/// Rebuild the credential headers of `headers` from `config`.
///
/// `Authorization` and `Accept-Encoding` are replaced in place (or dropped,
/// or appended) so every other header keeps its value and position.
pub fn refresh_headers(
    config: &ClientConfig,
    headers: &[(String, String)],
) -> Vec<(String, String)> {
    let mut fresh: Vec<(&str, Option<String>)> = vec![
        (AUTHORIZATION, Some(config.authorization())),
        (ACCEPT_ENCODING, config.compression.accept_encoding().map(str::to_string)),
    ];
    let mut out = Vec::with_capacity(headers.len() + 1);
    for (name, value) in headers {
        match fresh.iter_mut().find(|(managed, _)| name.eq_ignore_ascii_case(managed)) {
            Some((_, replacement)) => {
                if let Some(v) = replacement.take() {
                    out.push((name.clone(), v));
                }
            }
            None => out.push((name.clone(), value.clone())),
        }
    }
    for (name, leftover) in fresh {
        if let Some(v) = leftover {
            out.push((name.to_string(), v));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::form::FormValue;

    fn config() -> ClientConfig {
        ClientConfig::new("key", "https://api.example.com/", "1").unwrap()
    }

    #[test]
    fn empty_api_key_fails_fast() {
        assert_eq!(
            ClientConfig::new("", "https://h", "1").unwrap_err(),
            ConfigError::MissingApiKey
        );
    }

    #[test]
    fn host_trailing_slash_is_stripped() {
        assert_eq!(config().url_for("items", &[]), "https://api.example.com/api/v1/items");
        assert_eq!(
            config().url_for("items", &["page=2", "per_page=10"]),
            "https://api.example.com/api/v1/items?page=2&per_page=10"
        );
    }

    #[test]
    fn authorization_without_and_with_session() {
        let headers = build_headers(&config(), None);
        assert_eq!(
            headers,
            vec![(AUTHORIZATION.to_string(), "Token token=\"key\"".to_string())]
        );

        let headers = build_headers(&config().with_session_token("s1"), None);
        assert_eq!(headers[0].1, "Token token=\"key\", session=\"s1\"");
    }

    #[test]
    fn content_type_only_for_non_form_bodies() {
        let json_body = RequestBody::Json(json!({"a": 1}));
        let headers = build_headers(&config(), Some(&json_body));
        assert!(headers.contains(&(CONTENT_TYPE.to_string(), "application/json".to_string())));

        let form_body = RequestBody::Form(FormValue::Null);
        let headers = build_headers(&config(), Some(&form_body));
        assert!(!headers.iter().any(|(n, _)| n == CONTENT_TYPE));
    }

    #[test]
    fn accept_encoding_follows_compression() {
        let find = |c: Compression| {
            build_headers(&config().with_compression(c), None)
                .into_iter()
                .find(|(n, _)| n == ACCEPT_ENCODING)
                .map(|(_, v)| v)
        };
        assert_eq!(find(Compression::Auto), None);
        assert_eq!(find(Compression::Gzip).as_deref(), Some("gzip"));
        assert_eq!(find(Compression::None).as_deref(), Some("identity"));
    }

    #[test]
    fn compression_parses_and_rejects_unknown() {
        assert_eq!("gzip".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!(
            "brotli".parse::<Compression>().unwrap_err(),
            ConfigError::UnknownCompression("brotli".to_string())
        );
        let parsed: Compression = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, Compression::None);
    }

    #[test]
    fn deserialized_config_can_be_validated() {
        let cfg: ClientConfig =
            serde_json::from_str(r#"{"api_key":"","host":"h","version":"1"}"#).unwrap();
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::MissingApiKey);
        assert_eq!(cfg.compression, Compression::Auto);
    }

    #[test]
    fn refresh_replaces_credentials_in_place() {
        let original = vec![
            ("X-Trace".to_string(), "t".to_string()),
            (AUTHORIZATION.to_string(), "Token token=\"key\"".to_string()),
            (CONTENT_TYPE.to_string(), "application/json".to_string()),
        ];
        let rotated = config()
            .with_session_token("s2")
            .with_compression(Compression::Gzip);
        assert_eq!(
            refresh_headers(&rotated, &original),
            vec![
                ("X-Trace".to_string(), "t".to_string()),
                (AUTHORIZATION.to_string(), "Token token=\"key\", session=\"s2\"".to_string()),
                (CONTENT_TYPE.to_string(), "application/json".to_string()),
                (ACCEPT_ENCODING.to_string(), "gzip".to_string()),
            ]
        );
    }

    #[test]
    fn refresh_drops_accept_encoding_when_switched_to_auto() {
        let original = build_headers(&config().with_compression(Compression::None), None);
        let refreshed = refresh_headers(&config(), &original);
        assert_eq!(refreshed, build_headers(&config(), None));
    }
}
