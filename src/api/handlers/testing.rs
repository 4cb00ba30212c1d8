//! Router harness shared by handler tests: in-memory store, captured mail.

use anyhow::{Context, Result, anyhow};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use super::auth::{AuthConfig, AuthState};
use crate::api::email::{EmailMessage, EmailQueue};
use crate::password::hash_password;
use crate::storage::{CreateUserOutcome, MemoryStore, NewUser, Store, User};

pub(crate) const BASE_URL: &str = "http://localhost:8080";

pub(crate) struct Harness {
    pub(crate) app: Router,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) mail: UnboundedReceiver<EmailMessage>,
}

impl Harness {
    pub(crate) fn new() -> Result<Self> {
        Self::with_config(AuthConfig::new(BASE_URL.to_string()))
    }

    pub(crate) fn with_config(config: AuthConfig) -> Result<Self> {
        let (queue, mail) = EmailQueue::unbounded();
        let auth_state = Arc::new(AuthState::new(
            config,
            SecretString::from("handler-test-secret".to_string()),
            queue,
        ));
        let store = Arc::new(MemoryStore::new());
        let app = crate::api::app(store.clone(), auth_state)?;
        Ok(Self { app, store, mail })
    }

    /// Send a request and decode the JSON body (`Value::Null` when empty).
    pub(crate) async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => request.body(Body::empty())?,
        };

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .context("router call failed")?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response body is not JSON")?
        };
        Ok((status, json))
    }

    pub(crate) async fn post(&self, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.call(Method::POST, uri, Some(body), None).await
    }

    pub(crate) async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.call(Method::GET, uri, None, None).await
    }

    /// Insert an already active user.
    pub(crate) async fn active_user(&self, email: &str, password: &str) -> Result<User> {
        let outcome = self
            .store
            .create_user(NewUser {
                email: email.to_string(),
                password_hash: hash_password(password)?,
                is_active: true,
            })
            .await?;
        match outcome {
            CreateUserOutcome::Created(user) => Ok(user),
            CreateUserOutcome::Conflict => Err(anyhow!("user {email} already exists")),
        }
    }

    /// Log in and return `(access, refresh)`.
    pub(crate) async fn login(&self, email: &str, password: &str) -> Result<(String, String)> {
        let (status, body) = self
            .post("/login/", serde_json::json!({"email": email, "password": password}))
            .await?;
        if status != StatusCode::OK {
            return Err(anyhow!("login failed with {status}: {body}"));
        }
        let access = body["access"].as_str().context("missing access")?;
        let refresh = body["refresh"].as_str().context("missing refresh")?;
        Ok((access.to_string(), refresh.to_string()))
    }

    /// Next queued email, if any.
    pub(crate) fn next_mail(&mut self) -> Option<EmailMessage> {
        self.mail.try_recv().ok()
    }
}

/// Path of the first link in a mail body, e.g. `/email-verification/MQ/…/`.
pub(crate) fn link_path(message: &EmailMessage) -> Result<String> {
    let link = message
        .body
        .lines()
        .find(|line| line.starts_with(BASE_URL))
        .context("mail body has no link")?;
    Ok(link.trim_start_matches(BASE_URL).to_string())
}
