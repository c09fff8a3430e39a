/// End-to-end tests driving a served router with the portal client
mod common;

use common::{internal_token, TestContext};
use opsportal_shared::client::{ClientError, PortalClient, TrackTarget};
use opsportal_shared::time_tracking::TrackAction;
use serde_json::json;

async fn serve(ctx: &TestContext) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ctx.app.clone();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}/", addr)
}

#[tokio::test]
async fn test_client_drives_team_task_timer() {
    let ctx = TestContext::new();
    let token = internal_token();
    ctx.send(
        "POST",
        "/api/team-tasks",
        Some(&token),
        Some(json!({ "title": "Cotizar", "category": "Pagos" })),
    )
    .await;

    let base = serve(&ctx).await;
    let client = PortalClient::new(base, Some(token));
    let target = TrackTarget::TeamTask {
        task_id: "TASK-1".to_string(),
    };

    let started = client.track_action(&target, TrackAction::Start).await.unwrap();
    assert!(started.success);
    assert_eq!(started.message, "Timer started");
    assert_eq!(started.data["status"], "in-progress");

    let completed = client
        .track_action(&target, TrackAction::Complete)
        .await
        .unwrap();
    assert_eq!(completed.message, "Task completed");
    assert_eq!(completed.data["status"], "completed");
    assert!(completed.data.get("startedAt").is_none());
}

#[tokio::test]
async fn test_client_surfaces_api_errors() {
    let ctx = TestContext::new();
    let base = serve(&ctx).await;

    let client = PortalClient::new(base.clone(), Some(internal_token()));
    let missing = TrackTarget::Feature {
        project_id: "p1".to_string(),
        feature_id: "PROJ-P1-9".to_string(),
    };
    match client.track_action(&missing, TrackAction::Pause).await {
        Err(ClientError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "PROJ-P1-9 not found");
        }
        other => panic!("unexpected: {other:?}"),
    }

    let anonymous = PortalClient::new(base, Some("not-a-token".to_string()));
    match anonymous.track_action(&missing, TrackAction::Start).await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 401),
        other => panic!("unexpected: {other:?}"),
    }
}
