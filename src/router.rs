use crate::db::Storage;
use crate::handlers::{oauth, uploads};
use crate::identity::IdentityVerifier;
use crate::oauth::OauthBroker;
use axum::{
    Router,
    routing::{get, post},
};

#[derive(Clone)]
pub struct ReciboState {
    pub storage: Storage,
    pub broker: OauthBroker,
    pub verifier: IdentityVerifier,
}

impl ReciboState {
    pub fn new(storage: Storage, verifier: IdentityVerifier) -> Self {
        let broker = OauthBroker::new(storage.clone());
        Self {
            storage,
            broker,
            verifier,
        }
    }
}

pub fn recibo_router(state: ReciboState) -> Router {
    Router::new()
        .route("/connect/{provider}/start", get(oauth::connect_start))
        .route("/connect/{provider}/callback", get(oauth::connect_callback))
        .route("/connect/{provider}/status", get(oauth::connect_status))
        .route(
            "/connect/{provider}/disconnect",
            post(oauth::connect_disconnect),
        )
        .route("/connect/{provider}/token", get(oauth::connect_token))
        .route(
            "/storage/folder",
            get(oauth::folder_get).post(oauth::folder_set),
        )
        .route("/upload-tracking/mark-uploaded", post(uploads::mark_uploaded))
        .route(
            "/upload-tracking/status/{receipt_key}",
            get(uploads::upload_status),
        )
        .route(
            "/upload-tracking/get-status",
            post(uploads::upload_status_batch),
        )
        .route("/upload-tracking/list", get(uploads::list_uploads))
        .with_state(state)
}
