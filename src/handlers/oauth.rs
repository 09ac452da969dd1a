use crate::config::CONFIG;
use crate::error::ReciboError;
use crate::identity::AuthUser;
use crate::oauth::Provider;
use crate::router::ReciboState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Serialize)]
pub struct AuthUrlResponse {
    pub auth_url: String,
    pub state: String,
}

#[derive(Serialize)]
pub struct ConnectionStatusResponse {
    pub connected: bool,
}

#[derive(Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct SetFolderRequest {
    pub folder_path: String,
}

#[derive(Serialize)]
pub struct FolderResponse {
    pub folder_path: String,
}

/// GET /connect/{provider}/start -> authorization URL for the caller to
/// navigate the user to.
pub async fn connect_start(
    State(state): State<ReciboState>,
    Path(provider): Path<Provider>,
    user: AuthUser,
) -> Result<Json<AuthUrlResponse>, ReciboError> {
    let flow = state.broker.start(&user.user_id, provider).await?;
    Ok(Json(AuthUrlResponse {
        auth_url: flow.auth_url.to_string(),
        state: flow.state,
    }))
}

/// GET /connect/{provider}/callback -> consumes the state, exchanges the
/// code, stores the credential, then sends the browser back to the app.
/// Unauthenticated by design: the user behind the redirect is recovered
/// from the consumed state token, never from request fields.
pub async fn connect_callback(
    State(state): State<ReciboState>,
    Path(provider): Path<Provider>,
    Query(query): Query<AuthCallbackQuery>,
) -> Redirect {
    let (Some(code), Some(state_param)) = (query.code.as_deref(), query.state.as_deref()) else {
        warn!(provider = %provider, "callback missing code or state");
        return redirect_home(provider, "error");
    };

    match state.broker.callback(provider, code, state_param).await {
        Ok(_user_id) => redirect_home(provider, "success"),
        Err(ReciboError::InvalidOrExpiredState) => redirect_home(provider, "error"),
        Err(e) => {
            error!(provider = %provider, error = %e, "OAuth callback failed");
            redirect_home(provider, "error")
        }
    }
}

fn redirect_home(provider: Provider, outcome: &str) -> Redirect {
    let url = format!(
        "{}?{}={}",
        CONFIG.frontend_url.trim_end_matches('/'),
        provider.as_str(),
        outcome
    );
    Redirect::temporary(&url)
}

/// GET /connect/{provider}/status
pub async fn connect_status(
    State(state): State<ReciboState>,
    Path(provider): Path<Provider>,
    user: AuthUser,
) -> Result<Json<ConnectionStatusResponse>, ReciboError> {
    let connected = state.broker.is_connected(&user.user_id, provider).await?;
    Ok(Json(ConnectionStatusResponse { connected }))
}

/// POST /connect/{provider}/disconnect. Idempotent.
pub async fn connect_disconnect(
    State(state): State<ReciboState>,
    Path(provider): Path<Provider>,
    user: AuthUser,
) -> Result<impl IntoResponse, ReciboError> {
    state.broker.disconnect(&user.user_id, provider).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /connect/{provider}/token -> fresh access token for provider API
/// calls, refreshing transparently when needed.
pub async fn connect_token(
    State(state): State<ReciboState>,
    Path(provider): Path<Provider>,
    user: AuthUser,
) -> Result<Json<AccessTokenResponse>, ReciboError> {
    let issued = state.broker.access_token(&user.user_id, provider).await?;
    Ok(Json(AccessTokenResponse {
        access_token: issued.access_token,
        expiry: issued.expiry,
    }))
}

/// GET /storage/folder -> the user's destination folder, or the default.
pub async fn folder_get(
    State(state): State<ReciboState>,
    user: AuthUser,
) -> Result<Json<FolderResponse>, ReciboError> {
    let folder_path = state.storage.folder_get(&user.user_id).await?;
    Ok(Json(FolderResponse { folder_path }))
}

/// POST /storage/folder
pub async fn folder_set(
    State(state): State<ReciboState>,
    user: AuthUser,
    Json(req): Json<SetFolderRequest>,
) -> Result<Json<FolderResponse>, ReciboError> {
    let mut folder_path = req.folder_path;
    if !folder_path.starts_with('/') {
        folder_path.insert(0, '/');
    }
    state.storage.folder_put(&user.user_id, &folder_path).await?;
    Ok(Json(FolderResponse { folder_path }))
}
