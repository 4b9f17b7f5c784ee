use {
    async_trait::async_trait,
    palaver_common::MessagePayload,
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::error::{Error, Result};

/// The platform send API, as an opaque request/response function.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message payload to a recipient. Returns the platform's
    /// response body on success.
    async fn send(&self, recipient_id: &str, payload: &MessagePayload)
    -> Result<serde_json::Value>;
}

/// HTTP transport posting to the platform's Graph-style send endpoint.
pub struct GraphTransport {
    http: reqwest::Client,
    base_url: String,
    page_token: Secret<String>,
}

impl GraphTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>, page_token: Secret<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            page_token,
        }
    }
}

#[async_trait]
impl Transport for GraphTransport {
    async fn send(
        &self,
        recipient_id: &str,
        payload: &MessagePayload,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/me/messages", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "recipient": {"id": recipient_id},
            "message": payload,
        });

        let resp = self
            .http
            .post(url)
            .query(&[("access_token", self.page_token.expose_secret().as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let response_body: serde_json::Value = resp.json().await.unwrap_or_default();
        debug!(recipient_id, status = status.as_u16(), "platform send response");

        if !status.is_success() {
            return Err(Error::platform(status.as_u16(), response_body));
        }
        // The platform can embed an error object in a 200 response; treat
        // it exactly like a failed request.
        if response_body.get("error").is_some() {
            return Err(Error::platform(status.as_u16(), response_body));
        }

        Ok(response_body)
    }
}
