//! Flattening of nested values into multipart form fields.
//!
//! # Design
//! `FormValue` is an owned tree, so it cannot contain cycles. Flattening
//! walks it depth-first and names every leaf after its path: object
//! properties as `key[property]`, array elements as `key[index]`. Objects
//! marked opaque are not walked and become a single JSON text field.

use std::io::{self, Cursor, Read};

use chrono::{DateTime, SecondsFormat, Utc};
use mime::Mime;
use multipart::client::lazy::Multipart;
use serde_json::{Map, Value};

/// Key that marks a JSON object as an opaque leaf when converting from
/// `serde_json::Value`. The key itself is dropped from the output.
pub const KEEP_AS_OBJECT: &str = "_keepAsObject";

/// A file-like leaf passed through to the multipart body untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    /// Produces no field.
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Date(DateTime<Utc>),
    Array(Vec<FormValue>),
    /// Properties in insertion order.
    Object(Vec<(String, FormValue)>),
    /// Sent as one field holding the object's JSON text.
    Opaque(Map<String, Value>),
    File(FilePart),
}

impl From<Value> for FormValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FormValue::Null,
            Value::Bool(b) => FormValue::Bool(b),
            Value::Number(n) => FormValue::Number(n),
            Value::String(s) => FormValue::Text(s),
            Value::Array(items) => {
                FormValue::Array(items.into_iter().map(FormValue::from).collect())
            }
            Value::Object(mut map) => {
                let opaque = map
                    .remove(KEEP_AS_OBJECT)
                    .is_some_and(|flag| !matches!(flag, Value::Null | Value::Bool(false)));
                if opaque {
                    FormValue::Opaque(map)
                } else {
                    FormValue::Object(
                        map.into_iter()
                            .map(|(k, v)| (k, FormValue::from(v)))
                            .collect(),
                    )
                }
            }
        }
    }
}

impl From<DateTime<Utc>> for FormValue {
    fn from(value: DateTime<Utc>) -> Self {
        FormValue::Date(value)
    }
}

impl From<FilePart> for FormValue {
    fn from(value: FilePart) -> Self {
        FormValue::File(value)
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File(FilePart),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FieldValue,
}

impl FormField {
    fn text(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: FieldValue::Text(value.into()),
        }
    }
}

/// Flatten `value` into fields whose names start with `key_prefix`.
///
/// With an empty prefix the properties of a top-level object (or the indices
/// of a top-level array) are used as field names directly, and a top-level
/// scalar produces no field since it has nothing to be named after.
pub fn to_form_fields(value: &FormValue, key_prefix: &str) -> Vec<FormField> {
    let mut fields = Vec::new();
    append(value, key_prefix, &mut fields);
    fields
}

fn child_key(key: &str, child: &str) -> String {
    if key.is_empty() {
        child.to_string()
    } else {
        format!("{key}[{child}]")
    }
}

fn append(value: &FormValue, key: &str, out: &mut Vec<FormField>) {
    match value {
        FormValue::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                append(item, &child_key(key, &index.to_string()), out);
            }
        }
        FormValue::Object(properties) => {
            for (property, item) in properties {
                append(item, &child_key(key, property), out);
            }
        }
        FormValue::Null => {}
        _ if key.is_empty() => {}
        FormValue::Bool(b) => out.push(FormField::text(key, b.to_string())),
        FormValue::Number(n) => out.push(FormField::text(key, n.to_string())),
        FormValue::Text(s) => out.push(FormField::text(key, s.as_str())),
        FormValue::Date(date) => {
            let text = date.to_rfc3339_opts(SecondsFormat::Millis, true);
            out.push(FormField::text(key, text));
        }
        FormValue::Opaque(map) => {
            out.push(FormField::text(key, Value::Object(map.clone()).to_string()));
        }
        FormValue::File(file) => out.push(FormField {
            name: key.to_string(),
            value: FieldValue::File(file.clone()),
        }),
    }
}

/// A `multipart/form-data` body ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub boundary: String,
    pub bytes: Vec<u8>,
}

impl MultipartBody {
    /// Render `fields` under a fresh random boundary.
    pub fn encode(fields: &[FormField]) -> io::Result<Self> {
        let mut multipart = Multipart::new();
        for field in fields {
            let name = escape_param(&field.name);
            match &field.value {
                FieldValue::Text(text) => {
                    multipart.add_text(name, text.as_str());
                }
                FieldValue::File(file) => {
                    let mime = file
                        .content_type
                        .parse::<Mime>()
                        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
                    multipart.add_stream(
                        name,
                        Cursor::new(file.data.as_slice()),
                        Some(escape_param(&file.file_name)),
                        Some(mime),
                    );
                }
            }
        }
        let mut prepared = multipart.prepare().map_err(|e| e.error)?;
        let boundary = prepared.boundary().to_string();
        let mut bytes = Vec::new();
        prepared.read_to_end(&mut bytes)?;
        Ok(Self { boundary, bytes })
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Percent-encode the characters that would end a quoted
/// `Content-Disposition` parameter or the header line itself.
pub fn escape_param(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn names_and_text(fields: &[FormField]) -> Vec<(String, String)> {
        fields
            .iter()
            .map(|f| {
                let value = match &f.value {
                    FieldValue::Text(t) => t.clone(),
                    FieldValue::File(file) => format!("<file {}>", file.file_name),
                };
                (f.name.clone(), value)
            })
            .collect()
    }

    #[test]
    fn nested_objects_and_arrays_get_bracketed_keys() {
        let value = FormValue::from(json!({
            "user": {
                "name": "Ada",
                "tags": ["a", "b"],
                "age": 36,
                "admin": false
            }
        }));
        let mut fields = names_and_text(&to_form_fields(&value, ""));
        fields.sort();
        assert_eq!(
            fields,
            vec![
                ("user[admin]".to_string(), "false".to_string()),
                ("user[age]".to_string(), "36".to_string()),
                ("user[name]".to_string(), "Ada".to_string()),
                ("user[tags][0]".to_string(), "a".to_string()),
                ("user[tags][1]".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn prefix_namespaces_top_level_properties() {
        let value = FormValue::Object(vec![("id".to_string(), FormValue::from("7"))]);
        let fields = to_form_fields(&value, "item");
        assert_eq!(names_and_text(&fields), vec![("item[id]".to_string(), "7".to_string())]);
    }

    #[test]
    fn dates_serialize_as_iso8601() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = FormValue::Object(vec![("at".to_string(), FormValue::from(date))]);
        let fields = to_form_fields(&value, "");
        assert_eq!(
            names_and_text(&fields),
            vec![("at".to_string(), "2024-03-01T12:30:00.000Z".to_string())]
        );
    }

    #[test]
    fn opaque_objects_are_a_single_json_field() {
        let value = FormValue::from(json!({
            "meta": { "_keepAsObject": true, "x": 1 }
        }));
        let fields = to_form_fields(&value, "");
        assert_eq!(names_and_text(&fields), vec![("meta".to_string(), "{\"x\":1}".to_string())]);
    }

    #[test]
    fn false_sentinel_keeps_walking() {
        let value = FormValue::from(json!({ "meta": { "_keepAsObject": false, "x": 1 } }));
        let fields = to_form_fields(&value, "");
        assert_eq!(names_and_text(&fields), vec![("meta[x]".to_string(), "1".to_string())]);
    }

    #[test]
    fn files_pass_through_and_nulls_are_skipped() {
        let file = FilePart {
            file_name: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            data: b"hi".to_vec(),
        };
        let value = FormValue::Object(vec![
            ("upload".to_string(), FormValue::from(file.clone())),
            ("nothing".to_string(), FormValue::Null),
        ]);
        let fields = to_form_fields(&value, "");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "upload");
        assert_eq!(fields[0].value, FieldValue::File(file));
    }

    #[test]
    fn top_level_scalars_produce_no_field() {
        assert!(to_form_fields(&FormValue::from("loose"), "").is_empty());
        assert!(to_form_fields(&FormValue::from(json!(3)), "").is_empty());
        let named = to_form_fields(&FormValue::from("kept"), "note");
        assert_eq!(names_and_text(&named), vec![("note".to_string(), "kept".to_string())]);
    }

    #[test]
    fn top_level_array_uses_plain_indices() {
        let fields = to_form_fields(&FormValue::from(json!(["a", {"b": 1}])), "");
        assert_eq!(
            names_and_text(&fields),
            vec![
                ("0".to_string(), "a".to_string()),
                ("1[b]".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn multipart_encoding_layout() {
        let fields = vec![
            FormField::text("a", "1"),
            FormField {
                name: "f".to_string(),
                value: FieldValue::File(FilePart {
                    file_name: "x.bin".to_string(),
                    content_type: "application/octet-stream".to_string(),
                    data: vec![0, 1],
                }),
            },
        ];
        let body = MultipartBody::encode(&fields).unwrap();
        let text = String::from_utf8_lossy(&body.bytes);
        assert!(text.contains(&format!("--{}\r\n", body.boundary)));
        assert!(text.contains("name=\"a\""));
        assert!(text.contains("\r\n\r\n1\r\n"));
        assert!(text.contains("name=\"f\"; filename=\"x.bin\""));
        assert!(text.contains("Content-Type: application/octet-stream"));
        assert!(body.bytes.windows(2).any(|w| w == [0, 1]));
        assert!(text.contains(&format!("--{}--", body.boundary)));
        assert_eq!(
            body.content_type(),
            format!("multipart/form-data; boundary={}", body.boundary)
        );
    }

    #[test]
    fn line_breaks_cannot_escape_part_headers() {
        assert_eq!(escape_param("a\"b\r\nc"), "a%22b%0D%0Ac");

        let fields = vec![
            FormField::text("evil\r\nX-Injected: 1", "v"),
            FormField {
                name: "f".to_string(),
                value: FieldValue::File(FilePart {
                    file_name: "x\r\nX-Other: 2".to_string(),
                    content_type: "text/plain".to_string(),
                    data: b"hi".to_vec(),
                }),
            },
        ];
        let body = MultipartBody::encode(&fields).unwrap();
        let text = String::from_utf8_lossy(&body.bytes);
        assert!(text.contains("name=\"evil%0D%0AX-Injected: 1\""));
        assert!(text.contains("filename=\"x%0D%0AX-Other: 2\""));
        assert!(!text.contains("\r\nX-Injected"));
        assert!(!text.contains("\r\nX-Other"));
    }

    #[test]
    fn random_boundaries_differ() {
        let fields = [FormField::text("a", "1")];
        let a = MultipartBody::encode(&fields).unwrap();
        let b = MultipartBody::encode(&fields).unwrap();
        assert_ne!(a.boundary, b.boundary);
    }
}
