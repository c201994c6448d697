// payload.rs
//! Application payload carried by an authenticated webhook call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use url::Url;

/// Messages forwarded downstream are capped to this many characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("malformed payload: missing action")]
    MissingAction,

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("malformed payload: redirect requires a non-empty url")]
    MissingUrl,

    #[error("invalid redirect url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed payload: message action requires a non-empty message")]
    MissingMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    action: Option<String>,
    url: Option<String>,
    message: Option<String>,
    session_id: Option<String>,
    user_id: Option<String>,
    metadata: Option<Map<String, Value>>,
    timestamp: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WebhookAction {
    Redirect { url: Url },
    Message { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(flatten)]
    pub action: WebhookAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Number>,
}

impl WebhookPayload {
    /// Parses an already authenticated body.
    pub fn parse(raw_body: &[u8]) -> Result<Self, PayloadError> {
        let raw: RawPayload = serde_json::from_slice(raw_body)?;

        let action = match raw.action.as_deref() {
            None | Some("") => return Err(PayloadError::MissingAction),
            Some("redirect") => {
                let url = non_empty(raw.url).ok_or(PayloadError::MissingUrl)?;
                WebhookAction::Redirect {
                    url: Url::parse(url.trim())?,
                }
            }
            Some("message") => {
                let message = non_empty(raw.message).ok_or(PayloadError::MissingMessage)?;
                WebhookAction::Message {
                    message: truncate_chars(message, MAX_MESSAGE_CHARS),
                }
            }
            Some(other) => return Err(PayloadError::UnsupportedAction(other.to_string())),
        };

        Ok(WebhookPayload {
            action,
            session_id: raw.session_id,
            user_id: raw.user_id,
            metadata: raw.metadata.unwrap_or_default(),
            timestamp: raw.timestamp,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self.action {
            WebhookAction::Redirect { .. } => "redirect",
            WebhookAction::Message { .. } => "message",
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
    text
}
