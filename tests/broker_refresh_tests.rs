use axum::{Form, Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use recibo::Provider;
use recibo::db::{self, TokenBlob};
use recibo::error::ReciboError;
use recibo::oauth::OauthBroker;
use serde_json::json;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

/// Minimal stand-in for a provider token endpoint: rejects the sentinel
/// refresh token with the OAuth error a revoked grant produces, accepts
/// anything else.
async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    match form.get("refresh_token").map(String::as_str) {
        Some("revoked-refresh-token") => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        )
            .into_response(),
        _ => Json(json!({
            "access_token": "fresh-access-token",
            "token_type": "bearer",
            "expires_in": 3600
        }))
        .into_response(),
    }
}

#[tokio::test]
async fn refresh_maps_provider_rejection_to_reauth_and_preserves_the_row() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // must be set before the lazy CONFIG is first read in this process
    unsafe {
        std::env::set_var(
            "RECIBO_STORAGE__TOKEN_URL",
            format!("http://{addr}/oauth2/token"),
        );
    }
    let app = Router::new().route("/oauth2/token", post(token_endpoint));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!("recibo-broker-{}-{}.sqlite", std::process::id(), nanos));
    let storage = db::connect(&format!("sqlite:{}", temp_path.display()))
        .await
        .unwrap();
    let broker = OauthBroker::new(storage.clone());

    // revoked grant: ReauthRequired, and the stored credential survives so
    // the user's configuration is not lost
    let revoked = TokenBlob {
        refresh_token: "revoked-refresh-token".to_string(),
        access_token: None,
        expiry: None,
    };
    storage
        .credential_put("user-a", Provider::Storage, &revoked)
        .await
        .unwrap();

    let err = broker
        .access_token("user-a", Provider::Storage)
        .await
        .unwrap_err();
    assert!(matches!(err, ReciboError::ReauthRequired));

    let row = storage
        .credential_get("user-a", Provider::Storage)
        .await
        .unwrap()
        .expect("credential row must survive a rejected refresh");
    assert_eq!(row.blob().unwrap(), revoked);

    // valid grant: refresh succeeds and the fresh access token is cached
    let valid = TokenBlob {
        refresh_token: "good-refresh-token".to_string(),
        access_token: None,
        expiry: None,
    };
    storage
        .credential_put("user-b", Provider::Storage, &valid)
        .await
        .unwrap();

    let issued = broker
        .access_token("user-b", Provider::Storage)
        .await
        .unwrap();
    assert_eq!(issued.access_token, "fresh-access-token");
    assert!(issued.expiry.is_some());

    let cached = storage
        .credential_get("user-b", Provider::Storage)
        .await
        .unwrap()
        .unwrap()
        .blob()
        .unwrap();
    assert_eq!(cached.access_token.as_deref(), Some("fresh-access-token"));
    assert_eq!(cached.refresh_token, "good-refresh-token");

    // a cached, unexpired access token is served without contacting the
    // provider again
    let again = broker
        .access_token("user-b", Provider::Storage)
        .await
        .unwrap();
    assert_eq!(again.access_token, "fresh-access-token");

    // missing credential entirely: reconnect required
    let err = broker
        .access_token("user-c", Provider::Storage)
        .await
        .unwrap_err();
    assert!(matches!(err, ReciboError::ReauthRequired));

    let _ = std::fs::remove_file(&temp_path);
}
