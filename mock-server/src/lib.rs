use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, HOST},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// The only API key the server accepts.
pub const API_KEY: &str = "test-key";
/// The only session token `/api/v1/me` accepts.
pub const SESSION_TOKEN: &str = "session-1";
/// Number of items the server starts with.
pub const SEED_ITEMS: u32 = 7;
pub const DEFAULT_PER_PAGE: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: u32,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub name: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Deserialize)]
pub struct SlowQuery {
    #[serde(default)]
    pub ms: u64,
}

pub type Db = Arc<RwLock<Vec<Item>>>;

pub fn app() -> Router {
    let items = (1..=SEED_ITEMS)
        .map(|id| Item {
            id,
            name: format!("item-{id}"),
        })
        .collect();
    let db: Db = Arc::new(RwLock::new(items));
    Router::new()
        .route("/api/v1/items", get(list_items).post(create_item))
        .route("/api/v1/me", get(me))
        .route("/api/v1/echo", any(echo))
        .route("/api/v1/slow", get(slow))
        .route("/api/v1/fail", get(fail))
        .route("/api/v1/text", get(text))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Credentials from `Authorization: Token token="<key>"[, session="<token>"]`.
#[derive(Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub session: Option<String>,
}

pub fn parse_authorization(value: &str) -> Option<Credentials> {
    let rest = value.strip_prefix("Token token=\"")?;
    let (api_key, rest) = rest.split_once('"')?;
    let session = match rest.strip_prefix(", session=\"") {
        Some(tail) => Some(tail.strip_suffix('"')?.to_string()),
        None if rest.is_empty() => None,
        None => return None,
    };
    Some(Credentials {
        api_key: api_key.to_string(),
        session,
    })
}

fn authorize(headers: &HeaderMap, require_session: bool) -> Result<Credentials, Response> {
    let credentials = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_authorization)
        .filter(|c| c.api_key == API_KEY);
    let Some(credentials) = credentials else {
        return Err(json_response(
            StatusCode::UNAUTHORIZED,
            headers,
            &json!({"error": "invalid API key"}),
        ));
    };
    if require_session && credentials.session.as_deref() != Some(SESSION_TOKEN) {
        return Err(json_response(
            StatusCode::UNAUTHORIZED,
            headers,
            &json!({"error": "session required"}),
        ));
    }
    Ok(credentials)
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|enc| enc.trim() == "gzip"))
}

pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Build a response, gzip-compressing the body when the request accepts it.
fn respond(
    status: StatusCode,
    request_headers: &HeaderMap,
    content_type: &'static str,
    body: Vec<u8>,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    let body = if accepts_gzip(request_headers) {
        match gzip(&body) {
            Ok(compressed) => {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                compressed
            }
            Err(e) => {
                tracing::warn!(error = %e, "gzip failed, sending identity body");
                body
            }
        }
    } else {
        body
    };
    (status, headers, body).into_response()
}

fn json_response(status: StatusCode, request_headers: &HeaderMap, value: &Value) -> Response {
    respond(
        status,
        request_headers,
        "application/json; charset=utf-8",
        value.to_string().into_bytes(),
    )
}

fn host(headers: &HeaderMap) -> &str {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
}

async fn list_items(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Response {
    if let Err(resp) = authorize(&headers, false) {
        return resp;
    }
    let items = db.read().await;
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
    let last = items.len().div_ceil(per_page).max(1);
    let page = query.page.unwrap_or(1).clamp(1, last);
    let slice: Vec<Item> = items
        .iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect();

    let base = format!("http://{}/api/v1/items", host(&headers));
    let link = |p: usize| Value::String(format!("{base}?page={p}&per_page={per_page}"));
    let mut links = serde_json::Map::new();
    links.insert("first".to_string(), link(1));
    links.insert("last".to_string(), link(last));
    if page > 1 {
        links.insert("prev".to_string(), link(page - 1));
    }
    if page < last {
        links.insert("next".to_string(), link(page + 1));
    }
    tracing::debug!(page, per_page, count = slice.len(), "listing items");

    json_response(
        StatusCode::OK,
        &headers,
        &json!({ "items": slice, "page": page, "links": links }),
    )
}

async fn create_item(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateItem>,
) -> Response {
    if let Err(resp) = authorize(&headers, false) {
        return resp;
    }
    let mut items = db.write().await;
    let id = items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
    let item = Item { id, name: input.name };
    items.push(item.clone());
    json_response(StatusCode::CREATED, &headers, &json!(item))
}

async fn me(headers: HeaderMap) -> Response {
    match authorize(&headers, true) {
        Ok(credentials) => {
            json_response(StatusCode::OK, &headers, &json!({ "session": credentials.session }))
        }
        Err(resp) => resp,
    }
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authorize(&headers, false) {
        return resp;
    }
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let value = json!({
        "method": method.as_str(),
        "content_type": content_type,
        "body": String::from_utf8_lossy(&body),
    });
    json_response(StatusCode::OK, &headers, &value)
}

async fn slow(headers: HeaderMap, Query(query): Query<SlowQuery>) -> Response {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    json_response(StatusCode::OK, &headers, &json!({ "slept_ms": query.ms }))
}

async fn fail(headers: HeaderMap) -> Response {
    respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        &headers,
        "text/plain; charset=utf-8",
        "boom: ça a cassé".as_bytes().to_vec(),
    )
}

async fn text(headers: HeaderMap) -> Response {
    respond(
        StatusCode::OK,
        &headers,
        "text/plain; charset=utf-8",
        "héllo wörld".as_bytes().to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_only() {
        assert_eq!(
            parse_authorization("Token token=\"abc\""),
            Some(Credentials {
                api_key: "abc".to_string(),
                session: None
            })
        );
    }

    #[test]
    fn parses_key_and_session() {
        assert_eq!(
            parse_authorization("Token token=\"abc\", session=\"s\""),
            Some(Credentials {
                api_key: "abc".to_string(),
                session: Some("s".to_string())
            })
        );
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(parse_authorization("Bearer abc"), None);
        assert_eq!(parse_authorization("Token token=\"abc\" junk"), None);
    }

    #[test]
    fn item_roundtrips_through_json() {
        let item = Item {
            id: 3,
            name: "three".to_string(),
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn gzip_output_starts_with_magic() {
        let zipped = gzip(b"hello").unwrap();
        assert_eq!(&zipped[..2], &[0x1F, 0x8B]);
    }
}
