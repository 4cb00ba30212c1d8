//! Router-level tests for the account lifecycle against the in-memory store.

use anyhow::{Context, Result};
use axum::http::{Method, StatusCode};
use serde_json::json;

use super::AuthConfig;
use super::signup::VERIFY_EMAIL_SUBJECT;
use super::utils::encode_uid;
use crate::api::email::{TEMPLATE_PASSWORD_RESET, TEMPLATE_VERIFY_EMAIL};
use crate::api::handlers::testing::{BASE_URL, Harness, link_path};
use crate::storage::Store;

#[tokio::test]
async fn signup_creates_inactive_user_and_queues_link() -> Result<()> {
    let mut harness = Harness::new()?;

    let (status, body) = harness
        .post(
            "/signup/",
            json!({"email": "  New@Example.com ", "password": "s3cret"}),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({"message": "User created. Please check your email to verify your account."})
    );

    let user = harness
        .store
        .find_user_by_email("new@example.com")
        .await?
        .context("user not stored")?;
    assert!(!user.is_active);
    assert_ne!(user.password_hash, "s3cret");

    let mail = harness.next_mail().context("no verification mail")?;
    assert_eq!(mail.to_email, "new@example.com");
    assert_eq!(mail.template, TEMPLATE_VERIFY_EMAIL);
    assert_eq!(mail.subject, VERIFY_EMAIL_SUBJECT);
    let path = link_path(&mail)?;
    assert!(path.starts_with(&format!("/email-verification/{}/", encode_uid(user.id))));
    assert!(mail.body.contains(BASE_URL));
    Ok(())
}

#[tokio::test]
async fn signup_reports_field_errors() -> Result<()> {
    let mut harness = Harness::new()?;

    let (status, body) = harness.post("/signup/", json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "email": ["This field is required."],
            "password": ["This field is required."]
        })
    );

    let (status, body) = harness
        .post("/signup/", json!({"email": "nope", "password": ""}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "email": ["Enter a valid email address."],
            "password": ["This field may not be blank."]
        })
    );

    let (status, body) = harness.post("/signup/", json!(["not", "an", "object"])).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"non_field_errors": ["Invalid data. Expected a dictionary, but got list."]})
    );

    let (status, body) = harness.call(Method::POST, "/signup/", None, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing payload"}));

    assert!(harness.next_mail().is_none());
    Ok(())
}

#[tokio::test]
async fn signup_rejects_taken_email_case_insensitively() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.active_user("taken@example.com", "pw").await?;

    let (status, body) = harness
        .post("/signup/", json!({"email": "TAKEN@example.com", "password": "pw"}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"email": ["user with this email already exists."]}));
    assert!(harness.next_mail().is_none());
    Ok(())
}

#[tokio::test]
async fn verification_link_activates_once() -> Result<()> {
    let mut harness = Harness::new()?;
    harness
        .post("/signup/", json!({"email": "v@example.com", "password": "pw"}))
        .await?;
    let path = link_path(&harness.next_mail().context("no mail")?)?;

    let (status, body) = harness.get(&path).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Email verified successfully."}));
    let user = harness
        .store
        .find_user_by_email("v@example.com")
        .await?
        .context("user missing")?;
    assert!(user.is_active);

    // The token is bound to the inactive state, so a replay fails.
    let (status, body) = harness.get(&path).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid or expired token."}));
    Ok(())
}

#[tokio::test]
async fn verification_rejects_bad_links() -> Result<()> {
    let mut harness = Harness::new()?;
    harness
        .post("/signup/", json!({"email": "b@example.com", "password": "pw"}))
        .await?;
    let path = link_path(&harness.next_mail().context("no mail")?)?;
    let token = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .context("no token segment")?
        .to_string();

    let (status, body) = harness
        .get(&format!("/email-verification/!!/{token}/"))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid token or user ID"}));

    let (status, body) = harness
        .get(&format!("/email-verification/{}/{token}/", encode_uid(999)))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid token or user ID"}));

    let user = harness
        .store
        .find_user_by_email("b@example.com")
        .await?
        .context("user missing")?;
    let (status, body) = harness
        .get(&format!(
            "/email-verification/{}/abc-0123456789abcdef0123456789abcdef/",
            encode_uid(user.id)
        ))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid or expired token."}));
    Ok(())
}

#[tokio::test]
async fn login_requires_verified_account() -> Result<()> {
    let mut harness = Harness::new()?;
    harness
        .post("/signup/", json!({"email": "l@example.com", "password": "pw"}))
        .await?;

    let (status, body) = harness
        .post("/login/", json!({"email": "l@example.com", "password": "pw"}))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Invalid credentials"}));

    let path = link_path(&harness.next_mail().context("no mail")?)?;
    harness.get(&path).await?;

    let (access, refresh) = harness.login("L@Example.com", "pw").await?;
    assert!(!access.is_empty());
    assert_ne!(access, refresh);

    let user = harness
        .store
        .find_user_by_email("l@example.com")
        .await?
        .context("user missing")?;
    assert!(user.last_login.is_some());
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials_uniformly() -> Result<()> {
    let harness = Harness::new()?;
    harness.active_user("c@example.com", "right").await?;

    for body in [
        json!({"email": "c@example.com", "password": "wrong"}),
        json!({"email": "ghost@example.com", "password": "right"}),
        json!({"email": "c@example.com"}),
        json!({}),
    ] {
        let (status, response) = harness.post("/login/", body).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response, json!({"error": "Invalid credentials"}));
    }
    Ok(())
}

#[tokio::test]
async fn refresh_issues_new_access_token() -> Result<()> {
    let harness = Harness::new()?;
    harness.active_user("r@example.com", "pw").await?;
    let (access, refresh) = harness.login("r@example.com", "pw").await?;

    let (status, body) = harness
        .post("/token/refresh/", json!({"refresh": refresh}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let new_access = body["access"].as_str().context("missing access")?;
    assert!(!new_access.is_empty());

    let (status, body) = harness.post("/token/refresh/", json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"refresh": ["This field is required."]}));

    let (status, body) = harness
        .post("/token/refresh/", json!({"refresh": access}))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token has wrong type"}));

    let (status, body) = harness
        .post("/token/refresh/", json!({"refresh": "garbage"}))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token is invalid or expired"}));
    Ok(())
}

#[tokio::test]
async fn logout_revokes_refresh_token() -> Result<()> {
    let harness = Harness::new()?;
    harness.active_user("o@example.com", "pw").await?;
    let (access, refresh) = harness.login("o@example.com", "pw").await?;

    let (status, body) = harness
        .call(Method::POST, "/logout/", Some(json!({"refresh": refresh})), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({"detail": "Authentication credentials were not provided."})
    );

    let (status, body) = harness
        .call(Method::POST, "/logout/", Some(json!({})), Some(&access))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Token is invalid or expired"}));

    let (status, body) = harness
        .call(
            Method::POST,
            "/logout/",
            Some(json!({"refresh": refresh})),
            Some(&access),
        )
        .await?;
    assert_eq!(status, StatusCode::RESET_CONTENT);
    assert_eq!(body, json!({"message": "Logged out successfully"}));

    let (status, body) = harness
        .post("/token/refresh/", json!({"refresh": refresh}))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token is blacklisted"}));

    let (status, body) = harness
        .call(
            Method::POST,
            "/logout/",
            Some(json!({"refresh": refresh})),
            Some(&access),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Token is blacklisted"}));
    Ok(())
}

#[tokio::test]
async fn password_reset_round_trip() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.active_user("p@example.com", "old-pw").await?;

    let (status, body) = harness
        .post("/password-reset-request/", json!({"email": "P@example.com"}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Password reset email sent."}));

    let mail = harness.next_mail().context("no reset mail")?;
    assert_eq!(mail.template, TEMPLATE_PASSWORD_RESET);
    let path = link_path(&mail)?;
    assert!(path.starts_with("/password-reset-confirm/"));

    let (status, body) = harness.post(&path, json!({"password": ""})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"password": ["This field may not be blank."]}));

    let (status, body) = harness.post(&path, json!({"password": "new-pw"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "Password has been reset successfully."})
    );

    let (status, _) = harness
        .post("/login/", json!({"email": "p@example.com", "password": "old-pw"}))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    harness.login("p@example.com", "new-pw").await?;

    // The link was bound to the old password hash.
    let (status, body) = harness.post(&path, json!({"password": "again"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid or expired token."}));
    Ok(())
}

#[tokio::test]
async fn password_reset_link_dies_after_login() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.active_user("d@example.com", "pw").await?;
    harness
        .post("/password-reset-request/", json!({"email": "d@example.com"}))
        .await?;
    let path = link_path(&harness.next_mail().context("no reset mail")?)?;

    // Logging in moves `last_login`, which the token is bound to.
    harness.login("d@example.com", "pw").await?;

    let (status, body) = harness.post(&path, json!({"password": "other"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid or expired token."}));
    Ok(())
}

#[tokio::test]
async fn password_reset_unknown_email() -> Result<()> {
    let mut harness = Harness::new()?;
    let (status, body) = harness
        .post("/password-reset-request/", json!({"email": "nobody@example.com"}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid email."}));
    assert!(harness.next_mail().is_none());

    let mut concealed = Harness::with_config(
        AuthConfig::new(BASE_URL.to_string()).with_reset_conceal_unknown_email(true),
    )?;
    let (status, body) = concealed
        .post("/password-reset-request/", json!({"email": "nobody@example.com"}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Password reset email sent."}));
    assert!(concealed.next_mail().is_none());
    Ok(())
}

#[tokio::test]
async fn password_reset_confirm_rejects_bad_uid() -> Result<()> {
    let harness = Harness::new()?;
    let (status, body) = harness
        .post(
            &format!("/password-reset-confirm/{}/abc-def/", encode_uid(404)),
            json!({"password": "pw"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid token or user ID"}));
    Ok(())
}

#[tokio::test]
async fn access_token_opens_protected_routes() -> Result<()> {
    let harness = Harness::new()?;
    harness.active_user("i@example.com", "pw").await?;
    let (access, _) = harness.login("i@example.com", "pw").await?;

    let (status, _) = harness
        .call(Method::GET, "/dummy/protected/", None, Some(&access))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness
        .call(Method::GET, "/dummy/protected/", None, Some("not-a-jwt"))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({"detail": "Given token not valid for any token type"})
    );
    Ok(())
}

#[tokio::test]
async fn logout_rejects_malformed_and_expired_refresh() -> Result<()> {
    let harness = Harness::new()?;
    harness.active_user("m@example.com", "pw").await?;
    let (access, _) = harness.login("m@example.com", "pw").await?;

    let (status, body) = harness
        .call(
            Method::POST,
            "/logout/",
            Some(json!({"refresh": "not.a.jwt"})),
            Some(&access),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Token is invalid or expired"}));

    // Refresh tokens issued already past their expiry.
    let expired = Harness::with_config(
        AuthConfig::new(BASE_URL.to_string()).with_refresh_token_ttl_seconds(-60),
    )?;
    expired.active_user("e@example.com", "pw").await?;
    let (access, refresh) = expired.login("e@example.com", "pw").await?;

    let (status, body) = expired
        .call(
            Method::POST,
            "/logout/",
            Some(json!({"refresh": refresh})),
            Some(&access),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Token is invalid or expired"}));
    Ok(())
}

#[tokio::test]
async fn password_reset_confirm_reports_blank_password_first() -> Result<()> {
    let harness = Harness::new()?;
    let user = harness.active_user("b@example.com", "pw").await?;

    let tampered = format!("/password-reset-confirm/{}/abc-def/", encode_uid(user.id));
    let (status, body) = harness.post(&tampered, json!({"password": ""})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"password": ["This field may not be blank."]}));

    let (status, body) = harness.post(&tampered, json!({"password": "fine"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid or expired token."}));
    Ok(())
}
