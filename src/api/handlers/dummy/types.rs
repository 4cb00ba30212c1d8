//! Request/response shapes for the demo resource, used for `OpenAPI` docs.
//!
//! Handlers validate raw JSON objects so that every field problem is reported
//! at once; these structs describe the accepted shape.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub(super) const LABEL_MAX: usize = 128;
pub(super) const CATEGORY_LABEL_MAX: usize = 64;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DummyRequest {
    /// Non-empty, at most 128 characters.
    pub label: String,
    pub description: String,
    /// Id of an existing category.
    pub category: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CategoryRequest {
    /// Non-empty, at most 64 characters.
    pub label: String,
}
