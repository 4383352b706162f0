//! Serializing a [`CommandResult`] into an HTTP response.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use serde_json::Value;
use tracing::trace;

use crate::{
    connector::backend::CommandResult,
    errors::{Error, Result},
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Python-style truthiness: null, false, zero and empty values are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Body bytes for a value written without JSON encoding.
///
/// Strings are written verbatim and arrays element by element; anything else falls back to its
/// JSON text.
fn literal_body(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Array(items) => items.iter().flat_map(literal_body).collect(),
        other => other.to_string().into_bytes(),
    }
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_status(value: &Value) -> Result<StatusCode> {
    let code = match value {
        Value::Number(n) => n.as_u64().and_then(|c| u16::try_from(c).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    code.and_then(|c| StatusCode::from_u16(c).ok()).ok_or_else(|| Error::Internal {
        operation: format!("use backend status {value}"),
    })
}

fn header_value(name: &str, text: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(text).map_err(|e| Error::Internal {
        operation: format!("use backend header {name}: {e}"),
    })
}

fn is_raw_error(context: &Value) -> bool {
    context.get("raw").is_some_and(is_truthy) && context.get("error").is_some_and(is_truthy)
}

/// Build the HTTP response for a command result.
///
/// A file pointer is always released, including when this returns an error.
///
/// Only the exact content type `application/json` serializes the context. Any other value,
/// including `application/json; charset=utf-8`, passes the context through literally: a string
/// verbatim, anything else as compact JSON text.
pub fn render_to_response(mut result: CommandResult) -> Result<Response> {
    let mut content_type: Option<String> = None;
    let mut status = StatusCode::OK;
    let mut extra_headers = HeaderMap::new();

    if let Some(header) = result.header.take() {
        for (key, value) in &header {
            if key.eq_ignore_ascii_case("content-type") {
                content_type = Some(header_text(value));
            } else if key.eq_ignore_ascii_case("status") {
                status = parse_status(value)?;
            } else {
                let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| Error::Internal {
                    operation: format!("use backend header name {key}: {e}"),
                })?;
                extra_headers.insert(name, header_value(key, &header_text(value))?);
            }
        }
    }

    let content_type = content_type.unwrap_or_else(|| JSON_CONTENT_TYPE.to_string());

    let body = if let Some(pointer) = result.pointer.take() {
        trace!(hash = %pointer.hash(), "Streaming file pointer");
        let hash = pointer.hash().to_string();
        pointer.read_all().map_err(|e| Error::Internal {
            operation: format!("read file {hash}: {e}"),
        })?
    } else if is_raw_error(&result.context) {
        literal_body(&result.context["error"])
    } else if content_type == JSON_CONTENT_TYPE {
        serde_json::to_vec(&result.context).map_err(|e| Error::Internal {
            operation: format!("serialize command result: {e}"),
        })?
    } else {
        literal_body(&result.context)
    };

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, header_value("Content-Type", &content_type)?)
        .body(Body::from(body))
        .map_err(|e| Error::Internal {
            operation: format!("build response: {e}"),
        })?;

    for (name, value) in extra_headers {
        if let Some(name) = name {
            response.headers_mut().insert(name, value);
        }
    }

    Ok(response)
}
