//! Provider integration tests.
//!
//! Each test starts a fake provider on a loopback port with Axum and points
//! the channel at it, so no credentials or network access are needed.
//!
//! ```bash
//! cargo test -p labpush-notifier --test integration
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};

use labpush_common::channel::{AlertSink, NotificationChannel};
use labpush_common::error::ChannelError;
use labpush_common::types::{ChannelKind, ExhaustionAlert, LabReport};
use labpush_notifier::{EmailChannel, SmsChannel, WebhookAlertSink};

// ============================================================
// Helpers
// ============================================================

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    headers: HeaderMap,
    body: serde_json::Value,
}

#[derive(Clone)]
struct FakeProvider {
    status: StatusCode,
    seen: Arc<Mutex<Vec<Captured>>>,
}

impl FakeProvider {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn captured(&self) -> Vec<Captured> {
        self.seen.lock().unwrap().clone()
    }
}

async fn resend_emails(
    State(fake): State<FakeProvider>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    fake.seen.lock().unwrap().push(Captured {
        path: "/emails".into(),
        headers,
        body,
    });
    (fake.status, Json(serde_json::json!({"id": "email_123"})))
}

async fn twilio_messages(
    State(fake): State<FakeProvider>,
    Path(sid): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, String) {
    fake.seen.lock().unwrap().push(Captured {
        path: format!("/2010-04-01/Accounts/{}/Messages.json", sid),
        headers,
        body: serde_json::to_value(form).unwrap(),
    });
    (fake.status, "{\"code\": 21211, \"message\": \"Invalid 'To' Phone Number\"}".into())
}

async fn alert_hook(
    State(fake): State<FakeProvider>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    fake.seen.lock().unwrap().push(Captured {
        path: "/alerts".into(),
        headers,
        body,
    });
    fake.status
}

/// Serve the fake provider and return its base URL.
async fn serve(fake: FakeProvider) -> String {
    let app = Router::new()
        .route("/emails", post(resend_emails))
        .route("/2010-04-01/Accounts/{sid}/Messages.json", post(twilio_messages))
        .route("/alerts", post(alert_hook))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn report(value: serde_json::Value) -> LabReport {
    serde_json::from_value(value).unwrap()
}

// ============================================================
// Email (Resend)
// ============================================================

#[tokio::test]
async fn test_email_sends_rendered_message() {
    let fake = FakeProvider::new(StatusCode::OK);
    let base = serve(fake.clone()).await;
    let channel = EmailChannel::new("re_test".into(), "labs@example.com".into())
        .unwrap()
        .with_base_url(base);

    let report = report(serde_json::json!({
        "id": "R1",
        "email": "patient@example.com",
        "testName": "CBC"
    }));
    channel.send(&report).await.unwrap();

    let seen = fake.captured();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.path, "/emails");
    assert_eq!(request.headers["authorization"], "Bearer re_test");
    assert_eq!(request.headers["idempotency-key"], "R1");
    assert_eq!(request.body["from"], "labs@example.com");
    assert_eq!(request.body["to"], serde_json::json!(["patient@example.com"]));
    assert_eq!(request.body["subject"], "Your CBC results are ready");
}

#[tokio::test]
async fn test_email_provider_errors_are_classified() {
    let fake = FakeProvider::new(StatusCode::UNPROCESSABLE_ENTITY);
    let base = serve(fake).await;
    let channel = EmailChannel::new("re_test".into(), "labs@example.com".into())
        .unwrap()
        .with_base_url(base);

    let err = channel
        .send(&report(serde_json::json!({"id": "R2", "email": "x@example.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Rejected { status: 422, .. }));
    assert!(err.is_permanent());

    let fake = FakeProvider::new(StatusCode::TOO_MANY_REQUESTS);
    let base = serve(fake).await;
    let channel = EmailChannel::new("re_test".into(), "labs@example.com".into())
        .unwrap()
        .with_base_url(base);

    let err = channel
        .send(&report(serde_json::json!({"id": "R2", "email": "x@example.com"})))
        .await
        .unwrap_err();
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_email_without_address_never_calls_provider() {
    let fake = FakeProvider::new(StatusCode::OK);
    let base = serve(fake.clone()).await;
    let channel = EmailChannel::new("re_test".into(), "labs@example.com".into())
        .unwrap()
        .with_base_url(base);

    let err = channel
        .send(&report(serde_json::json!({"id": "R3", "phone": "+15551234567"})))
        .await
        .unwrap_err();
    assert_eq!(err, ChannelError::MissingRecipient("email"));
    assert!(fake.captured().is_empty());
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = EmailChannel::new("re_test".into(), "labs@example.com".into())
        .unwrap()
        .with_base_url(format!("http://{}", addr));

    let err = channel
        .send(&report(serde_json::json!({"id": "R4", "email": "x@example.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Transport(_)));
    assert!(!err.is_permanent());
}

// ============================================================
// SMS (Twilio)
// ============================================================

#[tokio::test]
async fn test_sms_posts_form_with_basic_auth() {
    let fake = FakeProvider::new(StatusCode::CREATED);
    let base = serve(fake.clone()).await;
    let channel = SmsChannel::new("AC123".into(), "secret".into(), "+15550000000".into())
        .unwrap()
        .with_base_url(base);

    let report = report(serde_json::json!({
        "id": "R5",
        "phone": "+15551234567",
        "testName": "A1C",
        "result": "5.4%"
    }));
    channel.send(&report).await.unwrap();

    let seen = fake.captured();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.path, "/2010-04-01/Accounts/AC123/Messages.json");
    // base64("AC123:secret")
    assert_eq!(request.headers["authorization"], "Basic QUMxMjM6c2VjcmV0");
    assert_eq!(request.body["To"], "+15551234567");
    assert_eq!(request.body["From"], "+15550000000");
    assert_eq!(request.body["Body"], "Your A1C report R5 is ready. Result: 5.4%.");
}

#[tokio::test]
async fn test_sms_rejected_number_is_permanent() {
    let fake = FakeProvider::new(StatusCode::BAD_REQUEST);
    let base = serve(fake).await;
    let channel = SmsChannel::new("AC123".into(), "secret".into(), "+15550000000".into())
        .unwrap()
        .with_base_url(base);

    let err = channel
        .send(&report(serde_json::json!({"id": "R6", "phone": "+1"})))
        .await
        .unwrap_err();
    match &err {
        ChannelError::Rejected { status, body } => {
            assert_eq!(*status, 400);
            assert!(body.contains("21211"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert!(err.is_permanent());
}

// ============================================================
// Alert webhook
// ============================================================

#[tokio::test]
async fn test_webhook_alert_posts_json() {
    let fake = FakeProvider::new(StatusCode::NO_CONTENT);
    let base = serve(fake.clone()).await;
    let sink = WebhookAlertSink::new(format!("{}/alerts", base)).unwrap();

    let alert = ExhaustionAlert::new("R7", ChannelKind::Email, 5, "smtp 503");
    sink.exhausted(&alert).await.unwrap();

    let seen = fake.captured();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].body["report_id"], "R7");
    assert_eq!(seen[0].body["channel"], "email");
    assert_eq!(seen[0].body["attempts"], 5);
    assert_eq!(seen[0].body["alert_id"], alert.alert_id.to_string());
}

#[tokio::test]
async fn test_webhook_alert_failure_is_reported() {
    let fake = FakeProvider::new(StatusCode::INTERNAL_SERVER_ERROR);
    let base = serve(fake).await;
    let sink = WebhookAlertSink::new(format!("{}/alerts", base)).unwrap();

    let alert = ExhaustionAlert::new("R8", ChannelKind::Sms, 1, "invalid number");
    assert!(sink.exhausted(&alert).await.is_err());
}

#[tokio::test]
async fn test_webhook_alert_gives_up_on_silent_endpoint() {
    // Accepts connections and reads nothing back, like a wedged receiver.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let sink = WebhookAlertSink::new(format!("http://{}/alerts", addr))
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let alert = ExhaustionAlert::new("R9", ChannelKind::Email, 5, "smtp 503");

    let result = tokio::time::timeout(Duration::from_secs(5), sink.exhausted(&alert))
        .await
        .expect("alert sink must give up on its own");
    assert!(result.is_err());
}
