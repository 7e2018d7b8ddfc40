//! HTML escaping of request input
//!
//! Runs after body parsing. Every string value in the parsed body and query
//! mapping has `<`, `>`, `"` and `'` replaced by their entities; keys are left
//! alone. When anything changed, the escaped data is written back into the
//! request body and URI so downstream extractors never see the raw input.

use axum::{
    body::Body,
    extract::Request,
    http::{header, request::Parts, uri::PathAndQuery, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};
use std::borrow::Cow;

use super::payload::{encode_form, BodyKind, PayloadRejection, RequestPayload};

/// Deepest container nesting accepted in a payload
pub const MAX_SANITIZE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthExceeded;

/// Escape the HTML-significant characters of `input` in one pass
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }

    let mut escaped = String::with_capacity(input.len() + 16);
    for ch in input.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Escape every string inside `value`. Returns whether anything changed.
pub fn sanitize_value(value: &mut Value) -> Result<bool, DepthExceeded> {
    let mut changed = false;
    walk(value, 0, &mut changed)?;
    Ok(changed)
}

/// Escape every string value of a mapping, leaving keys untouched
pub fn sanitize_map(map: &mut Map<String, Value>) -> Result<bool, DepthExceeded> {
    let mut changed = false;
    for value in map.values_mut() {
        walk(value, 1, &mut changed)?;
    }
    Ok(changed)
}

fn walk(value: &mut Value, depth: usize, changed: &mut bool) -> Result<(), DepthExceeded> {
    match value {
        Value::String(text) => {
            if let Cow::Owned(escaped) = escape_html(text) {
                *text = escaped;
                *changed = true;
            }
        },
        Value::Array(items) => {
            if depth >= MAX_SANITIZE_DEPTH {
                return Err(DepthExceeded);
            }
            for item in items {
                walk(item, depth + 1, changed)?;
            }
        },
        Value::Object(map) => {
            if depth >= MAX_SANITIZE_DEPTH {
                return Err(DepthExceeded);
            }
            for item in map.values_mut() {
                walk(item, depth + 1, changed)?;
            }
        },
        _ => {},
    }
    Ok(())
}

/// Sanitise the parsed payload and write it back into the request
pub async fn sanitize_input(request: Request, next: Next) -> Response {
    let (mut parts, mut body) = request.into_parts();

    if let Some(mut payload) = parts.extensions.remove::<RequestPayload>() {
        if let Err(rejection) = sanitize_request(&mut parts, &mut body, &mut payload) {
            parts.extensions.insert(rejection);
        }
        parts.extensions.insert(payload);
    }

    next.run(Request::from_parts(parts, body)).await
}

fn sanitize_request(
    parts: &mut Parts,
    body: &mut Body,
    payload: &mut RequestPayload,
) -> Result<(), PayloadRejection> {
    let too_deep = |_| {
        PayloadRejection::InvalidPayload(format!(
            "payload nesting exceeds {} levels",
            MAX_SANITIZE_DEPTH
        ))
    };

    if sanitize_map(&mut payload.query).map_err(too_deep)? {
        parts.uri = rewrite_query(&parts.uri, &encode_form(&payload.query))?;
    }

    let (Some(value), Some(kind)) = (payload.body.as_mut(), payload.body_kind) else {
        return Ok(());
    };

    if sanitize_value(value).map_err(too_deep)? {
        let bytes = match (kind, &*value) {
            (BodyKind::Form, Value::Object(map)) => encode_form(map).into_bytes(),
            _ => serde_json::to_vec(&*value)
                .map_err(|e| PayloadRejection::InvalidPayload(e.to_string()))?,
        };
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        *body = Body::from(bytes);
    }

    Ok(())
}

fn rewrite_query(uri: &Uri, query: &str) -> Result<Uri, PayloadRejection> {
    let invalid = |e: &dyn std::fmt::Display| PayloadRejection::InvalidPayload(e.to_string());

    let path_and_query: PathAndQuery = format!("{}?{}", uri.path(), query)
        .parse()
        .map_err(|e| invalid(&e))?;

    let mut uri_parts = uri.clone().into_parts();
    uri_parts.path_and_query = Some(path_and_query);
    Uri::from_parts(uri_parts).map_err(|e| invalid(&e))
}
