use axum::response::IntoResponse;

// axum handler for "/"
pub async fn root() -> impl IntoResponse {
    "Hello, world! This is the boilerplate API.\n"
}
