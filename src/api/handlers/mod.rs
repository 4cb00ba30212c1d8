//! API handlers and shared request validation.
//!
//! Payloads are taken as raw JSON objects and checked field by field so every
//! problem in a body is reported at once, keyed by field name.

pub mod auth;
pub mod dummy;
pub mod health;
pub mod root;
#[cfg(test)]
pub(crate) mod testing;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::error::ApiError;

pub(crate) const MSG_REQUIRED: &str = "This field is required.";
pub(crate) const MSG_BLANK: &str = "This field may not be blank.";
pub(crate) const MSG_NULL: &str = "This field may not be null.";
pub(crate) const MSG_NOT_STRING: &str = "Not a valid string.";
pub(crate) const MSG_INVALID_EMAIL: &str = "Enter a valid email address.";

/// `{"error": "..."}` body used by non-field failures.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// `{"message": "..."}` body used by workflow endpoints.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// Lightweight email sanity check on already-normalized input.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Accumulates per-field error messages for one payload object.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .errors
            .iter()
            .map(|(field, messages)| {
                (
                    field.clone(),
                    Value::Array(messages.iter().cloned().map(Value::String).collect()),
                )
            })
            .collect();
        Value::Object(map)
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub(crate) fn finish(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.to_value()))
        }
    }
}

/// Read a required string field. Surrounding whitespace is trimmed before the
/// blank and length checks.
pub(crate) fn required_string(
    body: &Map<String, Value>,
    field: &str,
    max_len: Option<usize>,
    errors: &mut FieldErrors,
) -> Option<String> {
    let value = match body.get(field) {
        None => {
            errors.add(field, MSG_REQUIRED);
            return None;
        }
        Some(Value::Null) => {
            errors.add(field, MSG_NULL);
            return None;
        }
        Some(Value::String(value)) => value.trim().to_string(),
        Some(Value::Number(value)) => value.to_string(),
        Some(_) => {
            errors.add(field, MSG_NOT_STRING);
            return None;
        }
    };

    if value.is_empty() {
        errors.add(field, MSG_BLANK);
        return None;
    }
    if let Some(max_len) = max_len {
        if value.chars().count() > max_len {
            errors.add(
                field,
                format!("Ensure this field has no more than {max_len} characters."),
            );
            return None;
        }
    }
    Some(value)
}

/// Read a required primary-key reference. Accepts integers and integer strings.
pub(crate) fn required_pk(
    body: &Map<String, Value>,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<i64> {
    match body.get(field) {
        None => {
            errors.add(field, MSG_REQUIRED);
            None
        }
        Some(Value::Null) => {
            errors.add(field, MSG_NULL);
            None
        }
        Some(Value::Number(number)) => number.as_i64().or_else(|| {
            errors.add(field, "Incorrect type. Expected pk value, received float.");
            None
        }),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().ok().or_else(|| {
            errors.add(field, "Incorrect type. Expected pk value, received str.");
            None
        }),
        Some(other) => {
            errors.add(
                field,
                format!(
                    "Incorrect type. Expected pk value, received {}.",
                    json_type_name(other)
                ),
            );
            None
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Errors for a body item that is valid JSON but not an object.
pub(crate) fn non_object_errors(value: &Value) -> Value {
    serde_json::json!({
        "non_field_errors": [format!(
            "Invalid data. Expected a dictionary, but got {}.",
            json_type_name(value)
        )]
    })
}

pub(crate) fn invalid_object(value: &Value) -> ApiError {
    ApiError::Validation(non_object_errors(value))
}
