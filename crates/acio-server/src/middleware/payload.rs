//! Request body and query parsing
//!
//! [`parse_body`] reads JSON and urlencoded bodies up to the configured limit
//! and stores the result as a [`RequestPayload`] extension. A body that cannot
//! be parsed does not end the request here: the failure is recorded as a
//! [`PayloadRejection`] and answered by [`reject_invalid_payload`], which sits
//! after the rate limiter so malformed requests still count against the
//! client's quota.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};

use crate::error::AppError;

/// Body encodings the parser understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
}

/// Parsed request data, stored in the request extensions
#[derive(Debug, Clone, Default)]
pub struct RequestPayload {
    /// `None` when the body was empty or of another content type
    pub body: Option<Value>,
    pub body_kind: Option<BodyKind>,
    /// Query string as a flat mapping; repeated keys become arrays
    pub query: Map<String, Value>,
}

/// A payload failure waiting for the guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadRejection {
    TooLarge { limit: usize },
    InvalidJson(String),
    InvalidPayload(String),
    Unreadable(String),
}

impl From<PayloadRejection> for AppError {
    fn from(rejection: PayloadRejection) -> Self {
        match rejection {
            PayloadRejection::TooLarge { limit } => AppError::PayloadTooLarge { limit },
            PayloadRejection::InvalidJson(detail) => AppError::InvalidJson(detail),
            PayloadRejection::InvalidPayload(detail) => AppError::InvalidPayload(detail),
            PayloadRejection::Unreadable(detail) => {
                AppError::BadRequest(format!("failed to read request body: {}", detail))
            },
        }
    }
}

/// Classify the body by its `Content-Type` essence
pub fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let json = essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"));

    if json {
        Some(BodyKind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

/// Parse `key=value` pairs into a flat mapping
pub fn parse_form(input: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();

    for (key, value) in url::form_urlencoded::parse(input) {
        let value = Value::String(value.into_owned());
        match map.get_mut(&*key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            },
            None => {
                map.insert(key.into_owned(), value);
            },
        }
    }

    map
}

/// Encode a flat mapping back into `key=value` pairs
pub fn encode_form(map: &Map<String, Value>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());

    for (key, value) in map {
        match value {
            Value::Array(values) => {
                for item in values {
                    serializer.append_pair(key, &scalar_text(item));
                }
            },
            other => {
                serializer.append_pair(key, &scalar_text(other));
            },
        }
    }

    serializer.finish()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Decode a body of a known kind. `Ok(None)` means there was no body.
pub fn decode_body(kind: BodyKind, bytes: &[u8]) -> Result<Option<Value>, PayloadRejection> {
    if bytes.is_empty() {
        return Ok(None);
    }

    match kind {
        BodyKind::Json => {
            let value: Value = serde_json::from_slice(bytes)
                .map_err(|e| PayloadRejection::InvalidJson(e.to_string()))?;
            if value.is_object() || value.is_array() {
                Ok(Some(value))
            } else {
                Err(PayloadRejection::InvalidJson(
                    "top-level JSON value must be an object or an array".to_string(),
                ))
            }
        },
        BodyKind::Form => Ok(Some(Value::Object(parse_form(bytes)))),
    }
}

async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, PayloadRejection> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    if declared.is_some_and(|length| length > limit) {
        return Err(PayloadRejection::TooLarge { limit });
    }

    to_bytes(body, limit).await.map_err(|err| {
        let source = err.into_inner();
        if source.is::<LengthLimitError>() {
            PayloadRejection::TooLarge { limit }
        } else {
            PayloadRejection::Unreadable(source.to_string())
        }
    })
}

/// Parse the query string and any JSON or urlencoded body
pub async fn parse_body(State(limit): State<usize>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let mut payload = RequestPayload {
        query: parts
            .uri
            .query()
            .map(|query| parse_form(query.as_bytes()))
            .unwrap_or_default(),
        ..RequestPayload::default()
    };

    let body = match body_kind(&parts.headers) {
        None => body,
        Some(kind) => match read_body(&parts.headers, body, limit).await {
            Ok(bytes) => {
                match decode_body(kind, &bytes) {
                    Ok(value) => {
                        payload.body_kind = value.as_ref().map(|_| kind);
                        payload.body = value;
                    },
                    Err(rejection) => {
                        parts.extensions.insert(rejection);
                    },
                }
                Body::from(bytes)
            },
            Err(rejection) => {
                parts.extensions.insert(rejection);
                Body::empty()
            },
        },
    };

    parts.extensions.insert(payload);
    next.run(Request::from_parts(parts, body)).await
}

/// Answer requests whose payload could not be parsed or sanitised
pub async fn reject_invalid_payload(request: Request, next: Next) -> Response {
    if let Some(rejection) = request.extensions().get::<PayloadRejection>().cloned() {
        return AppError::from(rejection).into_response();
    }
    next.run(request).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_body_kind_detection() {
        assert_eq!(body_kind(&headers("application/json")), Some(BodyKind::Json));
        assert_eq!(
            body_kind(&headers("application/json; charset=utf-8")),
            Some(BodyKind::Json)
        );
        assert_eq!(
            body_kind(&headers("application/merge-patch+json")),
            Some(BodyKind::Json)
        );
        assert_eq!(
            body_kind(&headers("application/x-www-form-urlencoded")),
            Some(BodyKind::Form)
        );
        assert_eq!(body_kind(&headers("text/plain")), None);
        assert_eq!(body_kind(&HeaderMap::new()), None);
    }

    #[test]
    fn test_repeated_form_keys_become_arrays() {
        let map = parse_form(b"tag=a&tag=b&tag=c&name=x+y");
        assert_eq!(map["tag"], json!(["a", "b", "c"]));
        assert_eq!(map["name"], json!("x y"));
    }

    #[test]
    fn test_form_encoding_keeps_repeats() {
        let map = parse_form(b"tag=a&tag=b&q=%3C");
        let encoded = encode_form(&map);
        assert_eq!(parse_form(encoded.as_bytes()), map);
    }

    #[test]
    fn test_strict_json() {
        assert_eq!(decode_body(BodyKind::Json, b"").unwrap(), None);
        assert_eq!(
            decode_body(BodyKind::Json, br#"{"a":1}"#).unwrap(),
            Some(json!({"a": 1}))
        );
        assert_eq!(decode_body(BodyKind::Json, b"[1,2]").unwrap(), Some(json!([1, 2])));
        assert!(matches!(
            decode_body(BodyKind::Json, b"\"just a string\""),
            Err(PayloadRejection::InvalidJson(_))
        ));
        assert!(matches!(
            decode_body(BodyKind::Json, b"{oops"),
            Err(PayloadRejection::InvalidJson(_))
        ));
    }

    #[test]
    fn test_rejections_map_to_app_errors() {
        let err = AppError::from(PayloadRejection::TooLarge { limit: 8 });
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
        let err = AppError::from(PayloadRejection::InvalidPayload("deep".into()));
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected_without_reading() {
        let mut headers = headers("application/json");
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("100"));
        let result = read_body(&headers, Body::from("{}"), 10).await;
        assert_eq!(result.unwrap_err(), PayloadRejection::TooLarge { limit: 10 });
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_rejected() {
        let result = read_body(&HeaderMap::new(), Body::from(vec![b'a'; 64]), 16).await;
        assert_eq!(result.unwrap_err(), PayloadRejection::TooLarge { limit: 16 });
    }
}
