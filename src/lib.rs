pub mod backend;
pub mod config;
pub mod payload;
pub mod security;
pub mod server;
pub mod webhook;

pub use payload::{PayloadError, WebhookAction, WebhookPayload};
pub use webhook::{
    RejectReason, SecurityConfig, ValidationOutcome, WebhookRequest, WebhookValidator,
};
