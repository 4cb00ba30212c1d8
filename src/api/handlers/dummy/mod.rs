//! Demo resource CRUD.
//!
//! `Dummy` rows belong to a `Category` (foreign key, cascade on delete). Create
//! accepts either a single object or a list; a list is validated as a whole and
//! either every item is stored or none is, with errors reported per item.
//!
//! The `/protected/` variants behave the same but require a bearer access token.

pub mod types;

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::auth::{AuthState, require_auth};
use super::{
    ErrorResponse, FieldErrors, invalid_object, non_object_errors, required_pk, required_string,
};
use crate::api::error::ApiError;
use crate::storage::{Category, CreateDummiesOutcome, Dummy, NewDummy, Store};
use types::{CATEGORY_LABEL_MAX, CategoryRequest, DummyRequest, LABEL_MAX};

const MSG_NOT_FOUND: &str = "Object not found";
const MSG_MISSING_PK: &str = "Missing 1 expected parameter PK";

/// Unknown or non-numeric ids are indistinguishable from missing rows.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::NotFound(MSG_NOT_FOUND.into()))
}

#[utoipa::path(
    get,
    path = "/dummy/",
    responses(
        (status = 200, description = "All dummies ordered by id", body = [Dummy])
    ),
    tag = "dummy"
)]
pub async fn list_dummies(
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<Vec<Dummy>>, ApiError> {
    Ok(Json(store.list_dummies().await?))
}

#[utoipa::path(
    post,
    path = "/dummy/",
    request_body(
        content = DummyRequest,
        description = "A single dummy, or a JSON array of them for a batch create"
    ),
    responses(
        (status = 201, description = "Created dummy (or list of dummies)", body = Dummy),
        (status = 400, description = "Per-field errors (a list of per-item maps for batches)")
    ),
    tag = "dummy"
)]
pub async fn create_dummies(
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::bad_request("Missing payload"));
    };
    create(store.0.as_ref(), payload).await
}

#[utoipa::path(
    delete,
    path = "/dummy/",
    responses(
        (status = 400, description = "An id is required", body = ErrorResponse)
    ),
    tag = "dummy"
)]
pub async fn delete_dummy_without_pk() -> ApiError {
    ApiError::bad_request(MSG_MISSING_PK)
}

#[utoipa::path(
    get,
    path = "/dummy/{id}/",
    params(("id" = i64, Path, description = "Dummy id")),
    responses(
        (status = 200, description = "Dummy", body = Dummy),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "dummy"
)]
pub async fn get_dummy(
    Path(id): Path<String>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<Dummy>, ApiError> {
    retrieve(store.0.as_ref(), &id).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/dummy/{id}/",
    params(("id" = i64, Path, description = "Dummy id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "dummy"
)]
pub async fn delete_dummy(
    Path(id): Path<String>,
    store: Extension<Arc<dyn Store>>,
) -> Result<StatusCode, ApiError> {
    destroy(store.0.as_ref(), &id).await
}

#[utoipa::path(
    get,
    path = "/dummy/protected/",
    responses(
        (status = 200, description = "All dummies ordered by id", body = [Dummy]),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer" = [])),
    tag = "dummy"
)]
pub async fn list_dummies_protected(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<Vec<Dummy>>, ApiError> {
    require_auth(&headers, &auth_state, store.0.as_ref()).await?;
    Ok(Json(store.list_dummies().await?))
}

#[utoipa::path(
    post,
    path = "/dummy/protected/",
    request_body(
        content = DummyRequest,
        description = "A single dummy, or a JSON array of them for a batch create"
    ),
    responses(
        (status = 201, description = "Created dummy (or list of dummies)", body = Dummy),
        (status = 400, description = "Per-field errors"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer" = [])),
    tag = "dummy"
)]
pub async fn create_dummies_protected(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state, store.0.as_ref()).await?;
    let Some(Json(payload)) = payload else {
        return Err(ApiError::bad_request("Missing payload"));
    };
    info!(user_id = principal.user_id, "protected dummy create");
    create(store.0.as_ref(), payload).await
}

#[utoipa::path(
    get,
    path = "/dummy/{id}/protected/",
    params(("id" = i64, Path, description = "Dummy id")),
    responses(
        (status = 200, description = "Dummy", body = Dummy),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "dummy"
)]
pub async fn get_dummy_protected(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<Dummy>, ApiError> {
    require_auth(&headers, &auth_state, store.0.as_ref()).await?;
    retrieve(store.0.as_ref(), &id).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/dummy/{id}/protected/",
    params(("id" = i64, Path, description = "Dummy id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "dummy"
)]
pub async fn delete_dummy_protected(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
) -> Result<StatusCode, ApiError> {
    require_auth(&headers, &auth_state, store.0.as_ref()).await?;
    destroy(store.0.as_ref(), &id).await
}

#[utoipa::path(
    get,
    path = "/dummy-category/",
    responses(
        (status = 200, description = "All categories ordered by id", body = [Category])
    ),
    tag = "dummy"
)]
pub async fn list_categories(
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(store.list_categories().await?))
}

#[utoipa::path(
    post,
    path = "/dummy-category/",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created category", body = Category),
        (status = 400, description = "Per-field errors")
    ),
    tag = "dummy"
)]
pub async fn create_category(
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::bad_request("Missing payload"));
    };
    let Value::Object(body) = &payload else {
        return Err(invalid_object(&payload));
    };

    let mut errors = FieldErrors::new();
    let Some(label) = required_string(body, "label", Some(CATEGORY_LABEL_MAX), &mut errors) else {
        return Err(ApiError::Validation(errors.to_value()));
    };

    let category = store.create_category(&label).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    delete,
    path = "/dummy-category/{id}/",
    params(("id" = i64, Path, description = "Category id")),
    responses(
        (status = 204, description = "Deleted, along with its dummies"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "dummy"
)]
pub async fn delete_category(
    Path(id): Path<String>,
    store: Extension<Arc<dyn Store>>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if store.delete_category(id).await? {
        info!(category_id = id, "category deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(MSG_NOT_FOUND.into()))
    }
}

async fn retrieve(store: &dyn Store, raw_id: &str) -> Result<Dummy, ApiError> {
    let id = parse_id(raw_id)?;
    store
        .get_dummy(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(MSG_NOT_FOUND.into()))
}

async fn destroy(store: &dyn Store, raw_id: &str) -> Result<StatusCode, ApiError> {
    let id = parse_id(raw_id)?;
    if store.delete_dummy(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(MSG_NOT_FOUND.into()))
    }
}

async fn create(store: &dyn Store, payload: Value) -> Result<Response, ApiError> {
    match payload {
        Value::Array(items) => {
            let mut valid = Vec::with_capacity(items.len());
            let mut item_errors = Vec::with_capacity(items.len());
            let mut failed = false;
            for item in &items {
                match validate_dummy(store, item).await? {
                    Ok(dummy) => {
                        valid.push(dummy);
                        item_errors.push(Value::Object(serde_json::Map::new()));
                    }
                    Err(errors) => {
                        failed = true;
                        item_errors.push(errors);
                    }
                }
            }
            if failed {
                return Err(ApiError::Validation(Value::Array(item_errors)));
            }
            let categories: Vec<i64> = valid.iter().map(|dummy| dummy.category).collect();
            let created = match store.create_dummies(valid).await? {
                CreateDummiesOutcome::Created(created) => created,
                CreateDummiesOutcome::MissingCategory(missing) => {
                    let item_errors = categories
                        .into_iter()
                        .map(|category| {
                            if category == missing {
                                missing_category_errors(missing)
                            } else {
                                Value::Object(serde_json::Map::new())
                            }
                        })
                        .collect();
                    return Err(ApiError::Validation(Value::Array(item_errors)));
                }
            };
            info!(count = created.len(), "dummies created");
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
        single => {
            let dummy = validate_dummy(store, &single)
                .await?
                .map_err(ApiError::Validation)?;
            let created = match store.create_dummies(vec![dummy]).await? {
                CreateDummiesOutcome::Created(created) => created,
                CreateDummiesOutcome::MissingCategory(missing) => {
                    return Err(ApiError::Validation(missing_category_errors(missing)));
                }
            };
            let created = created
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("store returned no row for insert"))?;
            info!(dummy_id = created.id, "dummy created");
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
    }
}

fn missing_category_message(category_id: i64) -> String {
    format!("Invalid pk \"{category_id}\" - object does not exist.")
}

// The category can disappear between validation and the insert.
fn missing_category_errors(category_id: i64) -> Value {
    let mut errors = FieldErrors::new();
    errors.add("category", missing_category_message(category_id));
    errors.to_value()
}

/// Validate one item. The outer `Result` carries storage failures, the inner
/// one the per-field errors for this item.
async fn validate_dummy(
    store: &dyn Store,
    item: &Value,
) -> Result<Result<NewDummy, Value>, ApiError> {
    let Value::Object(body) = item else {
        return Ok(Err(non_object_errors(item)));
    };

    let mut errors = FieldErrors::new();
    let label = required_string(body, "label", Some(LABEL_MAX), &mut errors);
    let description = required_string(body, "description", None, &mut errors);
    let category = required_pk(body, "category", &mut errors);

    if let Some(category_id) = category
        && !store.category_exists(category_id).await?
    {
        errors.add("category", missing_category_message(category_id));
    }

    match (label, description, category, errors.is_empty()) {
        (Some(label), Some(description), Some(category), true) => Ok(Ok(NewDummy {
            label,
            description,
            category,
        })),
        _ => Ok(Err(errors.to_value())),
    }
}
