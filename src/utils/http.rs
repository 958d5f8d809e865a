use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

/// Maximum request body size (10MB by default)
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Read request body with size limit
///
/// Stops reading as soon as the limit is crossed instead of buffering the
/// whole body first.
pub async fn read_body_with_limit(body: Incoming, max_size: Option<usize>) -> Result<Bytes> {
    let max_size = max_size.unwrap_or(MAX_BODY_SIZE);

    let collected = Limited::new(body, max_size)
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to read request body (max: {} bytes)", max_size))?;

    Ok(collected.to_bytes())
}

/// Turn a `{"name": "value"}` params object into a header map.
///
/// Values must be strings; anything else, and any name or value HTTP does
/// not allow, is reported with the offending key.
pub fn header_map(object: &Map<String, Value>) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::with_capacity(object.len());
    for (name, value) in object {
        let Value::String(value) = value else {
            return Err(format!("header '{}' must be a string", name));
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid header name '{}'", name))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("invalid value for header '{}'", name))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
