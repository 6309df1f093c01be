//! Argument validation for Transporter operations.
//!
//! Every operation validates its [`Request`] eagerly, before any stream is
//! created, and fails with [`TransportError::Invalid`] on malformed input.
//! Fields an operation ignores are stripped here so backends never see them.

use serde_json::Value;

use crate::error::{Result, TransportError};
use crate::types::{Filter, Record, Request, ThingRef};

/// Validate a `list` or `added` filter. `id`, `band` and `value` are dropped.
pub fn validate_discovery(request: Request) -> Filter {
    Filter {
        id: None,
        band: None,
        user: request.user,
        params: request.params,
    }
}

/// Validate an `updated` filter. Only `value` is dropped.
pub fn validate_updated(request: Request) -> Result<Filter> {
    let id = optional_string("updated", "id", request.id)?;
    let band = optional_string("updated", "band", request.band)?;

    Ok(Filter {
        id,
        band,
        user: request.user,
        params: request.params,
    })
}

/// Validate a `get`: `id` and `band` are required.
pub fn validate_get(request: Request) -> Result<Record> {
    let id = required_string("get", "id", request.id)?;
    let band = required_string("get", "band", request.band)?;

    Ok(Record::new(id, band).with_user(request.user))
}

/// Validate a `put`: `id`, `band` and a structured `value` are required.
pub fn validate_put(request: Request) -> Result<Record> {
    let id = required_string("put", "id", request.id)?;
    let band = required_string("put", "band", request.band)?;
    let value = match request.value {
        Some(Value::Object(value)) => value,
        Some(other) => {
            return Err(TransportError::invalid(format!(
                "put: 'value' must be a mapping, not: {other}"
            )))
        }
        None => return Err(TransportError::invalid("put: 'value' is required")),
    };

    Ok(Record::new(id, band)
        .with_value(value)
        .with_user(request.user))
}

/// Validate an operation addressing a whole Thing (`bands`, `delete`).
pub fn validate_thing(operation: &str, request: Request) -> Result<ThingRef> {
    let id = required_string(operation, "id", request.id)?;

    Ok(ThingRef {
        id,
        user: request.user,
    })
}

fn required_string(operation: &str, field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        Some(_) => Err(TransportError::invalid(format!(
            "{operation}: '{field}' must be a non-empty string"
        ))),
        None => Err(TransportError::invalid(format!(
            "{operation}: '{field}' is required"
        ))),
    }
}

fn optional_string(operation: &str, field: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        Some(value) if value.is_empty() => Err(TransportError::invalid(format!(
            "{operation}: '{field}' must be a non-empty string when given"
        ))),
        other => Ok(other),
    }
}
