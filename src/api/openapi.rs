use super::handlers::{auth, dummy, health};
use utoipa::openapi::{
    Contact, InfoBuilder, License, OpenApiBuilder, Tag,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec. Handlers grouped in one
/// `routes!` call must share a path.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(
            dummy::list_dummies,
            dummy::create_dummies,
            dummy::delete_dummy_without_pk
        ))
        .routes(routes!(dummy::get_dummy, dummy::delete_dummy))
        .routes(routes!(
            dummy::list_dummies_protected,
            dummy::create_dummies_protected
        ))
        .routes(routes!(
            dummy::get_dummy_protected,
            dummy::delete_dummy_protected
        ))
        .routes(routes!(dummy::list_categories, dummy::create_category))
        .routes(routes!(dummy::delete_category))
        .routes(routes!(auth::signup::signup))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::login::logout))
        .routes(routes!(auth::login::refresh))
        .routes(routes!(auth::password_reset::password_reset_request))
        .routes(routes!(auth::password_reset::password_reset_confirm));

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and database status".to_string());

    let mut dummy_tag = Tag::new("dummy");
    dummy_tag.description = Some("Demo resource CRUD".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Signup, verification, sessions and password reset".to_string());

    let spec = router.get_openapi_mut();
    spec.tags = Some(vec![health_tag, dummy_tag, auth_tag]);
    if let Some(components) = spec.components.as_mut() {
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new()
        .info(info)
        .components(Some(utoipa::openapi::Components::new()))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
