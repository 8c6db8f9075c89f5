//! Push-notification collaborator client.
//!
//! The external push service stores browser subscriptions and delivers
//! templated web-push messages out of band. Callers treat it as
//! fire-and-forget: failures are logged and never propagated into the
//! in-process fan-out.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::session::Role;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push service returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Outbound collaborator interface: store a client's push subscription and
/// send a templated push to a user.
#[async_trait]
pub trait PushService: Send + Sync {
    async fn save_subscription(
        &self,
        user_id: &str,
        role: Role,
        subscription: &Value,
    ) -> Result<(), PushError>;

    async fn send_templated_push(
        &self,
        template: &str,
        user_id: &str,
        context: &Value,
    ) -> Result<(), PushError>;
}

/// HTTP client for the external push service.
pub struct HttpPushService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPushService {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<(), PushError> {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.json(body).send().await?;
        if !response.status().is_success() {
            return Err(PushError::Status(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl PushService for HttpPushService {
    async fn save_subscription(
        &self,
        user_id: &str,
        role: Role,
        subscription: &Value,
    ) -> Result<(), PushError> {
        self.post_json(
            "/subscriptions",
            &json!({
                "user_id": user_id,
                "role": role.as_str(),
                "subscription": subscription,
            }),
        )
        .await
    }

    async fn send_templated_push(
        &self,
        template: &str,
        user_id: &str,
        context: &Value,
    ) -> Result<(), PushError> {
        self.post_json(
            "/notifications",
            &json!({
                "template": template,
                "user_id": user_id,
                "context": context,
            }),
        )
        .await
    }
}

/// Used when no `[push]` section is configured: accepts and drops everything.
pub struct NoopPushService;

#[async_trait]
impl PushService for NoopPushService {
    async fn save_subscription(
        &self,
        user_id: &str,
        _role: Role,
        _subscription: &Value,
    ) -> Result<(), PushError> {
        tracing::debug!(user_id = %user_id, "push disabled, dropping subscription");
        Ok(())
    }

    async fn send_templated_push(
        &self,
        template: &str,
        user_id: &str,
        _context: &Value,
    ) -> Result<(), PushError> {
        tracing::debug!(user_id = %user_id, template = %template, "push disabled, dropping notification");
        Ok(())
    }
}
