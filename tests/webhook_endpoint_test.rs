//! Router-level tests for the inbound webhook endpoint.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chat_webhook_gateway::security::sign;
use chat_webhook_gateway::server::{router, AppState};
use chat_webhook_gateway::{SecurityConfig, WebhookAction};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "s3cr3t";
const BODY: &str = r#"{"action":"message","message":"hi"}"#;

fn secured_state() -> AppState {
    AppState::new(SecurityConfig::new(Some(SECRET.to_string())), None)
}

async fn post_webhook(
    state: AppState,
    headers: &[(&str, String)],
    body: &str,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn accepts_message_with_matching_secret() {
    let state = secured_state();
    let mut actions = state.subscribe();

    let (status, body) =
        post_webhook(state, &[("x-webhook-secret", SECRET.to_string())], BODY).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["payload"]["action"], json!("message"));
    assert_eq!(body["payload"]["message"], json!("hi"));

    let dispatched = actions.try_recv().unwrap();
    assert_eq!(
        dispatched.action,
        WebhookAction::Message {
            message: "hi".to_string()
        }
    );
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let state = secured_state();
    let mut actions = state.subscribe();

    let (status, body) =
        post_webhook(state, &[("x-webhook-secret", "wrong".to_string())], BODY).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized: invalid webhook secret" }));
    assert!(actions.try_recv().is_err());
}

#[tokio::test]
async fn missing_secret_is_unauthorized() {
    let (status, body) = post_webhook(secured_state(), &[], BODY).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Unauthorized: missing webhook secret"));
}

#[tokio::test]
async fn signature_over_different_body_is_unauthorized() {
    let signature = sign(br#"{"action":"message","message":"other"}"#, SECRET);
    let (status, body) = post_webhook(
        secured_state(),
        &[
            ("x-webhook-secret", SECRET.to_string()),
            ("x-hub-signature-256", format!("sha256={signature}")),
        ],
        BODY,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"],
        json!("Unauthorized: missing or invalid HMAC signature")
    );
}

#[tokio::test]
async fn signed_and_fresh_request_is_accepted() {
    let signature = sign(BODY.as_bytes(), SECRET);
    let (status, _) = post_webhook(
        secured_state(),
        &[
            ("x-webhook-secret", SECRET.to_string()),
            ("x-hub-signature-256", format!("sha256={signature}")),
            ("x-webhook-timestamp", Utc::now().timestamp().to_string()),
        ],
        BODY,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn old_timestamp_is_unauthorized() {
    let old = Utc::now().timestamp() - 10_000;
    let (status, body) = post_webhook(
        secured_state(),
        &[
            ("x-webhook-secret", SECRET.to_string()),
            ("x-webhook-timestamp", old.to_string()),
        ],
        BODY,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"],
        json!("Unauthorized: webhook timestamp outside freshness window")
    );
}

#[tokio::test]
async fn ip_outside_allow_list_is_unauthorized() {
    let state = AppState::new(
        SecurityConfig::new(Some(SECRET.to_string())).with_allowed_ips(["10.0.0.7"]),
        None,
    );
    let (status, body) = post_webhook(
        state,
        &[
            ("x-webhook-secret", SECRET.to_string()),
            ("x-forwarded-for", "192.168.1.9".to_string()),
        ],
        BODY,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Unauthorized: IP not allowed"));
}

#[tokio::test]
async fn invalid_redirect_url_is_bad_request() {
    let (status, body) = post_webhook(
        secured_state(),
        &[("x-webhook-secret", SECRET.to_string())],
        r#"{"action":"redirect","url":"not a url"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid redirect url"));
}

#[tokio::test]
async fn redirect_is_echoed_normalized() {
    let (status, body) = post_webhook(
        secured_state(),
        &[("x-webhook-secret", SECRET.to_string())],
        r#"{"action":"redirect","url":"https://example.com/docs","sessionId":"s-1"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["action"], json!("redirect"));
    assert_eq!(body["payload"]["url"], json!("https://example.com/docs"));
    assert_eq!(body["payload"]["sessionId"], json!("s-1"));
}

#[tokio::test]
async fn non_json_body_is_bad_request_after_auth() {
    let (status, body) = post_webhook(
        secured_state(),
        &[("x-webhook-secret", SECRET.to_string())],
        "hello there",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("malformed payload"));
}

#[tokio::test]
async fn unsupported_action_is_bad_request() {
    let (status, body) = post_webhook(
        secured_state(),
        &[("x-webhook-secret", SECRET.to_string())],
        r#"{"action":"shutdown"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("unsupported action: shutdown"));
}

#[tokio::test]
async fn no_secret_configured_accepts_anything_authentic_or_not() {
    let state = AppState::new(SecurityConfig::new(None), None);
    let (status, _) =
        post_webhook(state, &[("x-webhook-secret", "whatever".to_string())], BODY).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn webhook_status_probe() {
    let request = Request::builder()
        .uri("/api/webhook")
        .body(Body::empty())
        .unwrap();
    let response = router(secured_state()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router(secured_state()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn oversized_body_gets_json_error() {
    let body = format!(
        r#"{{"action":"message","message":"{}"}}"#,
        "a".repeat(3 * 1024 * 1024)
    );
    let (status, body) =
        post_webhook(secured_state(), &[("x-webhook-secret", SECRET.to_string())], &body).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));
}
