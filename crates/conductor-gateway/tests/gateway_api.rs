//! End-to-end tests for the gateway HTTP surface

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use conductor_gateway::{Gateway, GatewayConfig, RateLimitConfig};
use conductor_guard::SafetyEvent;
use serde_json::{json, Value};
use std::path::Path;
use tower::ServiceExt;

fn gateway(projects_root: &Path) -> Gateway {
    Gateway::new(GatewayConfig::default().with_projects_root(projects_root))
}

fn json_request(method: Method, uri: &str, client: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn make_project(root: &Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join(".workflow/phases")).unwrap();
    std::fs::write(dir.join(".project-config.json"), "{}").unwrap();
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("src/main.py"), "print('hi')").unwrap();
}

#[tokio::test]
async fn test_health_is_exempt_from_gate() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();

    for _ in 0..30 {
        let request = Request::builder()
            .uri("/health")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let response = send(&router, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_chat_returns_sanitized_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/chat",
            "10.0.0.2",
            json!({"message": "Explain the failing test\nin detail", "output_format": "json"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "10");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "9");
    assert!(response.headers().get("x-ratelimit-reset").is_some());

    let body = body_json(response).await;
    assert_eq!(
        body["command"],
        json!(["claude", "-p", "Explain the failing test\nin detail", "--output-format", "json"])
    );
    let env_keys: Vec<&str> = body["env_keys"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(env_keys.contains(&"TERM"));
}

#[tokio::test]
async fn test_chat_rejects_shell_metacharacters() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/chat",
            "10.0.0.3",
            json!({"message": "list files; rm -rf /"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "SANITIZATION_FAILED");
    assert_eq!(body["field"], "message");
    assert_eq!(body["kind"], "dangerous_char");
}

#[tokio::test]
async fn test_slash_command_whitelist() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/chat/command",
            "10.0.0.4",
            json!({"command": "//plan", "args": ["auth-module"]}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["command"][2], "/plan auth-module");
    assert_eq!(body["command"][4], "text");

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/chat/command",
            "10.0.0.4",
            json!({"command": "dangerous-command"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["field"], "command");
    assert_eq!(body["kind"], "not_whitelisted");
}

#[tokio::test]
async fn test_chat_burst_is_rate_limited() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();
    let request = || json_request(Method::POST, "/api/chat", "10.0.0.5", json!({"message": "hi"}));

    assert_eq!(send(&router, request()).await.status(), StatusCode::OK);
    assert_eq!(send(&router, request()).await.status(), StatusCode::OK);

    let response = send(&router, request()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "1");
    let body = body_json(response).await;
    assert_eq!(body["error"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["retry_after"], 1);

    // Another client is unaffected
    let other = json_request(Method::POST, "/api/chat", "10.0.0.6", json!({"message": "hi"}));
    assert_eq!(send(&router, other).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_rejection_is_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway(dir.path());
    let mut events = gateway.state().events.subscribe();
    let router = gateway.build_router();
    let request = || json_request(Method::POST, "/api/chat", "10.0.0.7", json!({"message": "hi"}));

    for _ in 0..3 {
        send(&router, request()).await;
    }

    match events.try_recv().unwrap() {
        SafetyEvent::RateLimited {
            client_id,
            path,
            retry_after,
        } => {
            assert_eq!(client_id, "10.0.0.7");
            assert_eq!(path, "/api/chat");
            assert_eq!(retry_after, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_disabled_gate_admits_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig::default()
        .with_projects_root(dir.path())
        .with_rate_limit(RateLimitConfig::disabled());
    let router = Gateway::new(config).build_router();

    for _ in 0..20 {
        let response = send(
            &router,
            json_request(Method::POST, "/api/chat", "10.0.0.8", json!({"message": "hi"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_review_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway(dir.path());
    let mut events = gateway.state().events.subscribe();
    let router = gateway.build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/review/resolve",
            "10.0.1.1",
            json!({
                "security": {"approved": true, "score": 8, "blocking_issues": []},
                "architecture": {"approved": true, "score": 8.0}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["action"], "approve");
    assert_eq!(body["approved"], true);

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/review/resolve",
            "10.0.1.1",
            json!({
                "security": {"approved": false, "score": 9, "blocking_issues": ["SQL injection in login handler"]},
                "architecture": {"approved": true, "score": 9}
            }),
        ),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["action"], "reject");
    assert_eq!(body["final_score"], 0.0);
    assert_eq!(body["blocking_issues"][0]["agent"], "security");

    assert!(matches!(
        events.try_recv().unwrap(),
        SafetyEvent::ReviewResolved { approved: true, .. }
    ));
}

#[tokio::test]
async fn test_review_resolution_tolerates_malformed_verdicts() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/review/resolve",
            "10.0.1.2",
            json!({"security": "looks fine", "architecture": null}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["action"], "reject");
    assert_eq!(body["approved"], false);
}

#[tokio::test]
async fn test_deletion_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    make_project(dir.path(), "demo");
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/projects/demo/deletion",
            "10.0.2.1",
            json!({"remove_source": false}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ticket = body_json(response).await;
    assert_eq!(ticket["project_name"], "demo");
    assert_eq!(ticket["expires_in"], 300);
    assert_eq!(ticket["files_to_delete"].as_array().unwrap().len(), 2);
    let token = ticket["token"].as_str().unwrap().to_string();

    // Missing token
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/projects/demo")
        .header("x-forwarded-for", "10.0.2.1")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let delete = || {
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/projects/demo")
            .header("x-forwarded-for", "10.0.2.1")
            .header("x-confirmation-token", token.as_str())
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&router, delete()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["removed"].as_array().unwrap().len(), 2);
    assert!(!dir.path().join("demo/.workflow").exists());
    assert!(!dir.path().join("demo/.project-config.json").exists());
    assert!(dir.path().join("demo/src/main.py").exists());

    // Single use
    let response = send(&router, delete()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "INVALID_TOKEN");
    assert!(!body.to_string().contains(&token));
}

#[tokio::test]
async fn test_deletion_with_source_removal_and_no_body() {
    let dir = tempfile::tempdir().unwrap();
    make_project(dir.path(), "full");
    let router = gateway(dir.path()).build_router();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/projects/full/deletion")
        .header("x-forwarded-for", "10.0.2.2")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["files_to_delete"].as_array().unwrap().len(), 2);

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/projects/full/deletion",
            "10.0.2.2",
            json!({"remove_source": true}),
        ),
    )
    .await;
    let ticket = body_json(response).await;
    assert_eq!(ticket["files_to_delete"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_deletion_body_rejected_without_token() {
    let dir = tempfile::tempdir().unwrap();
    make_project(dir.path(), "keep");
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(
            Method::POST,
            "/api/projects/keep/deletion",
            "10.0.2.3",
            json!({"remove_source": "yes"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body.get("token").is_none());

    let request = Request::builder()
        .uri("/status")
        .header("x-forwarded-for", "10.0.2.3")
        .body(Body::empty())
        .unwrap();
    assert_eq!(body_json(send(&router, request).await).await["pending_deletions"], 0);
    assert!(dir.path().join("keep/src/main.py").exists());
}

#[tokio::test]
async fn test_token_bound_to_its_project() {
    let dir = tempfile::tempdir().unwrap();
    make_project(dir.path(), "alpha");
    make_project(dir.path(), "beta");
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(Method::POST, "/api/projects/alpha/deletion", "10.0.2.3", json!({})),
    )
    .await;
    let token = body_json(response).await["token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/projects/beta")
        .header("x-forwarded-for", "10.0.2.3")
        .header("x-confirmation-token", token.as_str())
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(dir.path().join("beta/.workflow").exists());
    assert!(dir.path().join("alpha/.workflow").exists());
}

#[tokio::test]
async fn test_deletion_request_validation() {
    let dir = tempfile::tempdir().unwrap();
    let router = gateway(dir.path()).build_router();

    let response = send(
        &router,
        json_request(Method::POST, "/api/projects/ghost/deletion", "10.0.2.4", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "PROJECT_NOT_FOUND");

    let response = send(
        &router,
        json_request(Method::POST, "/api/projects/admin/deletion", "10.0.2.4", json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "INVALID_PROJECT_NAME");
}

#[tokio::test]
async fn test_status_reports_gate_and_pending_tokens() {
    let dir = tempfile::tempdir().unwrap();
    make_project(dir.path(), "demo");
    let router = gateway(dir.path()).build_router();

    send(
        &router,
        json_request(Method::POST, "/api/projects/demo/deletion", "10.0.3.1", json!({})),
    )
    .await;

    let request = Request::builder()
        .uri("/status")
        .header("x-forwarded-for", "10.0.3.1")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pending_deletions"], 1);
    assert_eq!(body["rate_limit"]["enabled"], true);
    assert_eq!(body["rate_limit"]["tracked_clients"], 1);
}
