// backend.rs
use chrono::Utc;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("unrecognised backend reply: {0}")]
    UnknownShape(#[source] serde_json::Error),
}

/// The automation backend answers with exactly one of these shapes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BackendReply {
    Response { response: String },
    Message { message: String },
}

impl BackendReply {
    pub fn into_text(self) -> String {
        match self {
            BackendReply::Response { response } => response,
            BackendReply::Message { message } => message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    webhook_url: String,
}

impl BackendClient {
    pub fn new(webhook_url: &str) -> Result<Self, BackendError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!(
                "chat-webhook-gateway/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<BackendReply, BackendError> {
        let payload = json!({
            "sessionId": session_id,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(BackendError::UnknownShape)
    }
}
