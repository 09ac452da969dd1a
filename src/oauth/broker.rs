use crate::db::Storage;
use crate::error::ReciboError;
use crate::oauth::provider::{IssuedToken, Provider, ProviderEndpoints};

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use tracing::{info, warn};
use url::Url;

/// Cached access tokens expiring sooner than this are refreshed eagerly.
const EXPIRY_SLACK_SECS: i64 = 60;

/// Result of starting an authorization flow: the URL to send the user to,
/// plus the state token embedded in it.
#[derive(Debug, Clone)]
pub struct StartedFlow {
    pub auth_url: Url,
    pub state: String,
}

/// Orchestrates the authorization-code flow for each provider on top of the
/// credential store and the CSRF state ledger. One instance serves all
/// requests; every call is an independent unit of work.
#[derive(Clone)]
pub struct OauthBroker {
    storage: Storage,
    http: reqwest::Client,
}

impl OauthBroker {
    /// Create a broker with a preconfigured HTTP client. Token-endpoint
    /// calls are bounded; a timeout is an exchange error, never a success.
    pub fn new(storage: Storage) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("recibo-oauth/1.0")
            .connect_timeout(StdDuration::from_secs(5))
            .timeout(StdDuration::from_secs(15))
            .build()
            .expect("FATAL: initialize OauthBroker HTTP client failed");
        Self { storage, http }
    }

    /// Mint a state token bound to the caller and build the provider's
    /// authorization URL around it. Navigating the user there is the
    /// caller's job; issuing the state row is the only side effect here.
    pub async fn start(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<StartedFlow, ReciboError> {
        let state = self.storage.state_issue(user_id).await?;
        let auth_url = ProviderEndpoints::build_authorize_url(provider, state.clone())?;
        info!(provider = %provider, "dispatching OAuth redirect");
        Ok(StartedFlow { auth_url, state })
    }

    /// Handle the provider redirect. The state must consume cleanly before
    /// the token endpoint is contacted at all; an unknown, replayed or
    /// expired state fails closed with no credential written.
    pub async fn callback(
        &self,
        provider: Provider,
        code: &str,
        state: &str,
    ) -> Result<String, ReciboError> {
        let Some(user_id) = self.storage.state_consume(state).await? else {
            warn!(provider = %provider, "callback with unknown or expired state");
            return Err(ReciboError::InvalidOrExpiredState);
        };

        let blob = ProviderEndpoints::exchange_code(provider, code.to_string(), &self.http).await?;
        self.storage
            .credential_put(&user_id, provider, &blob)
            .await?;
        info!(provider = %provider, "callback stored credential");
        Ok(user_id)
    }

    /// Produce a fresh access token for provider API calls, refreshing
    /// transparently when the cached one is missing or near expiry. A
    /// provider-side rejection surfaces as `ReauthRequired` and leaves the
    /// stored row intact so the user's configuration survives a reconnect.
    pub async fn access_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<IssuedToken, ReciboError> {
        let Some(row) = self.storage.credential_get(user_id, provider).await? else {
            return Err(ReciboError::ReauthRequired);
        };
        let mut blob = row.blob()?;

        if let (Some(access_token), Some(expiry)) = (&blob.access_token, blob.expiry)
            && expiry - Utc::now() > Duration::seconds(EXPIRY_SLACK_SECS)
        {
            return Ok(IssuedToken {
                access_token: access_token.clone(),
                expiry: Some(expiry),
            });
        }

        let issued = ProviderEndpoints::refresh(provider, &blob.refresh_token, &self.http).await?;
        blob.access_token = Some(issued.access_token.clone());
        blob.expiry = issued.expiry;
        self.storage.credential_put(user_id, provider, &blob).await?;
        Ok(issued)
    }

    /// Whether a credential is stored for `(user_id, provider)`.
    pub async fn is_connected(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<bool, ReciboError> {
        Ok(self.storage.credential_get(user_id, provider).await?.is_some())
    }

    /// Explicit disconnect. Idempotent: succeeds even if no row exists.
    pub async fn disconnect(&self, user_id: &str, provider: Provider) -> Result<(), ReciboError> {
        self.storage.credential_delete(user_id, provider).await?;
        info!(provider = %provider, "provider disconnected");
        Ok(())
    }
}
