// HTTP control API tests
//
// Requests are sent straight into the router; the session's stream points
// at a port nobody listens on, which the control surface does not care about.

mod common;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{fake_speaker, fake_transcriber, within};
use loqa_converse::{
    create_router, AppState, SessionConfig, SessionController, SessionHandle, SessionState,
    StreamClient, StreamConfig,
};
use tower::ServiceExt;

fn spawn_session() -> Result<SessionHandle> {
    let (stream, inbound) = StreamClient::new(StreamConfig::new("ws://127.0.0.1:9/ws"));
    let (transcriber, _mic) = fake_transcriber();
    let (speech, _speaker) = fake_speaker();

    let config = SessionConfig {
        session_id: "http-test".to_string(),
        ..SessionConfig::default()
    };

    Ok(SessionController::builder(config, stream, inbound)
        .transcriber(transcriber)
        .speech(speech)
        .build()?
        .spawn())
}

async fn call(session: &SessionHandle, method: &str, uri: &str) -> Result<(StatusCode, String)> {
    let router = create_router(AppState::new(session.clone()));
    let response = router
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8(body.to_vec())?))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let session = spawn_session()?;

    let (status, body) = call(&session, "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    session.shutdown().await;
    let (status, _) = call(&session, "GET", "/health").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn test_enable_and_disable() -> Result<()> {
    let session = spawn_session()?;

    let (status, body) = call(&session, "POST", "/session/enable").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.contains(r#""status":"enabled""#));
    within(session.wait_for_state(SessionState::Listening)).await??;

    let (status, _) = call(&session, "POST", "/session/disable").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    within(session.wait_for_state(SessionState::Idle)).await??;

    session.shutdown().await;
    let (status, body) = call(&session, "POST", "/session/enable").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("not running"));
    Ok(())
}

#[tokio::test]
async fn test_status_reports_stats() -> Result<()> {
    let session = spawn_session()?;

    let (status, body) = call(&session, "GET", "/session/status").await?;
    assert_eq!(status, StatusCode::OK);

    let stats: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(stats["session_id"], "http-test");
    assert_eq!(stats["state"], "Idle");
    assert_eq!(stats["turns_sent"], 0);
    assert!(stats["connection"]["attempts"].is_u64());

    session.shutdown().await;
    Ok(())
}
