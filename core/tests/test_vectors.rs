//! Verify decoding and URL parsing against JSON test vectors stored in
//! `test-vectors/`.
//!
//! Each vector file lists inputs with their expected outputs. Failures name
//! the case so a broken vector is easy to find.

use pagelink_core::{decode_utf16, decode_utf8, ApiUrl, Url};
use serde_json::{json, Value};

fn load(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap()
}

fn bytes_of(case: &Value) -> Vec<u8> {
    case["bytes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| u8::try_from(b.as_u64().unwrap()).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// UTF-8
// ---------------------------------------------------------------------------

#[test]
fn utf8_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/utf8.json"));
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = case["expected"].as_str().unwrap();
        assert_eq!(decode_utf8(&bytes_of(case)), expected, "{name}");
    }
}

#[test]
fn utf16_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/utf8.json"));
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected: Vec<u16> = case["expected"].as_str().unwrap().encode_utf16().collect();
        assert_eq!(decode_utf16(&bytes_of(case)), expected, "{name}");
    }
}

// ---------------------------------------------------------------------------
// URL
// ---------------------------------------------------------------------------

#[test]
fn url_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/url.json"));
    for case in vectors["urls"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let url = Url::parse(case["input"].as_str().unwrap()).unwrap();
        let actual = json!({
            "protocol": url.protocol,
            "host": url.host,
            "port": url.port,
            "path": url.path,
            "query": url.query,
            "fragment": url.fragment,
        });
        assert_eq!(actual, case["expected"], "{name}: components");

        let params: Value = url
            .params()
            .into_iter()
            .map(|(k, v)| json!([k, v]))
            .collect();
        assert_eq!(params, case["params"], "{name}: params");
        assert_eq!(url.to_string(), case["display"].as_str().unwrap(), "{name}: display");
    }
}

#[test]
fn invalid_url_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/url.json"));
    for input in vectors["invalid_urls"].as_array().unwrap() {
        let input = input.as_str().unwrap();
        assert!(Url::parse(input).is_err(), "{input} should not parse");
    }
}

#[test]
fn api_url_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/url.json"));
    for case in vectors["api_urls"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let parsed = ApiUrl::parse(case["input"].as_str().unwrap());
        let actual = parsed.map(|api| {
            json!({
                "protocol": api.protocol,
                "host": api.host,
                "host_name": api.host_name,
                "port": api.port,
                "path_header": api.path_header,
                "path_name": api.path_name,
                "search": api.search,
                "hash": api.hash,
                "version": api.version(),
            })
        });
        assert_eq!(actual.unwrap_or(Value::Null), case["expected"], "{name}");
    }
}
