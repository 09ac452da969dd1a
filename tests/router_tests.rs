use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use recibo::Provider;
use recibo::db::{self, Storage};
use recibo::identity::IdentityVerifier;
use recibo::router::{ReciboState, recibo_router};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

const TEST_SECRET: &str = "router-test-secret";

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

fn mint_token(sub: &str) -> String {
    encode(
        &Header::default(),
        &TestClaims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("failed to mint test token")
}

async fn test_app(tag: &str) -> (Router, Storage, PathBuf) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!("recibo-{}-{}-{}.sqlite", tag, std::process::id(), nanos));

    let database_url = format!("sqlite:{}", temp_path.display());
    let storage = db::connect(&database_url).await.expect("failed to open test db");

    let verifier = IdentityVerifier::new(Some(TEST_SECRET.to_string()), None);
    let state = ReciboState::new(storage.clone(), verifier);
    (recibo_router(state), storage, temp_path)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("failed to build request")
}

fn post_json(uri: &str, token: &str, payload: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(payload.to_string()))
        .expect("failed to build request")
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("response body was not utf-8")
}

#[tokio::test]
async fn requests_without_bearer_token_are_rejected() {
    let (app, _storage, path) = test_app("auth-missing").await;

    let resp = app.oneshot(get("/upload-tracking/list", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(resp).await.contains("UNAUTHORIZED"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn unconfigured_verifier_rejects_even_well_formed_tokens() {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!("recibo-auth-unconf-{}-{}.sqlite", std::process::id(), nanos));
    let storage = db::connect(&format!("sqlite:{}", temp_path.display()))
        .await
        .unwrap();

    // no signing secret configured: hard failure, never a shared identity
    let state = ReciboState::new(storage, IdentityVerifier::new(None, None));
    let app = recibo_router(state);

    let resp = app
        .oneshot(get("/upload-tracking/list", Some(&mint_token("user-a"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let _ = std::fs::remove_file(&temp_path);
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let (app, _storage, path) = test_app("auth-tampered").await;

    let forged = encode(
        &Header::default(),
        &TestClaims {
            sub: "user-a".to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();

    let resp = app
        .oneshot(get("/connect/storage/status", Some(&forged)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn status_reports_not_connected_for_fresh_user() {
    let (app, _storage, path) = test_app("status-fresh").await;

    let resp = app
        .oneshot(get("/connect/storage/status", Some(&mint_token("user-a"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains(r#""connected":false"#));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn forged_callback_state_fails_closed_without_writing_credentials() {
    let (app, storage, path) = test_app("callback-forged").await;

    // a real flow is pending for user-a
    let real_state = storage.state_issue("user-a").await.unwrap();

    let resp = app
        .oneshot(get(
            "/connect/storage/callback?code=some-code&state=forged-state",
            None,
        ))
        .await
        .unwrap();

    // the browser is sent back with an error marker
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("redirect without location header");
    assert!(location.contains("storage=error"));

    // fail closed: no credential row was created for anyone
    assert!(storage.credential_get("user-a", Provider::Storage).await.unwrap().is_none());

    // the pending legitimate state is still consumable exactly once
    assert_eq!(
        storage.state_consume(&real_state).await.unwrap().as_deref(),
        Some("user-a")
    );
    assert_eq!(storage.state_consume(&real_state).await.unwrap(), None);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn callback_without_params_redirects_with_error() {
    let (app, _storage, path) = test_app("callback-missing").await;

    let resp = app.oneshot(get("/connect/mail/callback", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(location.contains("mail=error"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn token_route_requires_a_connected_provider() {
    let (app, _storage, path) = test_app("token-unconnected").await;

    let resp = app
        .oneshot(get("/connect/mail/token", Some(&mint_token("user-a"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(resp).await.contains("RECONNECT_REQUIRED"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn folder_roundtrip_normalizes_leading_slash() {
    let (app, _storage, path) = test_app("folder-roundtrip").await;
    let token = mint_token("user-a");

    let resp = app
        .clone()
        .oneshot(post_json(
            "/storage/folder",
            &token,
            r#"{"folder_path":"Receipts/2026"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains(r#""folder_path":"/Receipts/2026""#));

    let resp = app.oneshot(get("/storage/folder", Some(&token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains(r#""folder_path":"/Receipts/2026""#));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn mark_uploaded_twice_over_http_keeps_one_row_with_latest_paths() {
    let (app, _storage, path) = test_app("uploads-http").await;
    let token = mint_token("user-a");

    let first = r#"{"receipt_key":"msg-1/a.pdf","destination_paths":["/Smart Receipts/a.pdf"]}"#;
    let second = r#"{"receipt_key":"msg-1/a.pdf","destination_paths":["/Archive/a.pdf"],"source_type":"upload"}"#;

    let resp = app
        .clone()
        .oneshot(post_json("/upload-tracking/mark-uploaded", &token, first))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(post_json("/upload-tracking/mark-uploaded", &token, second))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get("/upload-tracking/list", Some(&token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains(r#""count":1"#));
    assert!(body.contains("/Archive/a.pdf"));
    assert!(!body.contains("/Smart Receipts/a.pdf"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn batch_status_over_http_omits_unknown_keys() {
    let (app, _storage, path) = test_app("batch-http").await;
    let token = mint_token("user-a");

    let mark = r#"{"receipt_key":"k2","destination_paths":["/r/k2.pdf"]}"#;
    let resp = app
        .clone()
        .oneshot(post_json("/upload-tracking/mark-uploaded", &token, mark))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let query = r#"{"receipt_keys":["k1","k2","k3"]}"#;
    let resp = app
        .oneshot(post_json("/upload-tracking/get-status", &token, query))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains(r#""k2""#));
    assert!(!body.contains(r#""k1""#));
    assert!(!body.contains(r#""k3""#));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn users_are_isolated_over_http() {
    let (app, _storage, path) = test_app("isolation-http").await;
    let token_a = mint_token("user-a");
    let token_b = mint_token("user-b");

    let mark = r#"{"receipt_key":"k","destination_paths":["/a.pdf"]}"#;
    let resp = app
        .clone()
        .oneshot(post_json("/upload-tracking/mark-uploaded", &token_a, mark))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get("/upload-tracking/list", Some(&token_b)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains(r#""count":0"#));

    let _ = std::fs::remove_file(&path);
}
