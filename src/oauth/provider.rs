use crate::config::{CONFIG, ProviderSettings};
use crate::db::models::TokenBlob;
use crate::error::ReciboError;

use chrono::{DateTime, Utc};
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError,
    Scope, StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// The two upstream OAuth providers this broker knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Mail,
    Storage,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Mail => "mail",
            Provider::Storage => "storage",
        }
    }

    fn settings(&self) -> &'static ProviderSettings {
        match self {
            Provider::Mail => &CONFIG.mail,
            Provider::Storage => &CONFIG.storage,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly minted access token from a code exchange or refresh.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// Stateless per-provider OAuth endpoints.
pub(super) struct ProviderEndpoints;

impl ProviderEndpoints {
    /// Build the provider's consent-page URL embedding a pre-issued state
    /// token. Offline access is requested so the exchange yields a refresh
    /// token.
    pub(super) fn build_authorize_url(
        provider: Provider,
        state_token: String,
    ) -> Result<Url, ReciboError> {
        let client = build_oauth2_client(provider)?;
        let mut request = client.authorize_url(move || CsrfToken::new(state_token));
        for scope in &provider.settings().scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let request = match provider {
            Provider::Mail => request
                .add_extra_param("access_type", "offline")
                .add_extra_param("prompt", "consent"),
            Provider::Storage => request.add_extra_param("token_access_type", "offline"),
        };
        let (auth_url, _state) = request.url();
        Ok(auth_url)
    }

    /// Exchange an authorization code for tokens, exactly once, no retries.
    pub(super) async fn exchange_code(
        provider: Provider,
        code: String,
        http_client: &reqwest::Client,
    ) -> Result<TokenBlob, ReciboError> {
        let client = build_oauth2_client(provider)?;
        let token: BasicTokenResponse = client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(http_client)
            .await?;

        let refresh_token = token
            .refresh_token()
            .map(|t| t.secret().to_string())
            .ok_or_else(|| {
                ReciboError::ProviderExchange(
                    "token response missing refresh_token; offline access not granted".to_string(),
                )
            })?;
        info!(provider = %provider, "authorization code exchanged");

        Ok(TokenBlob {
            refresh_token,
            access_token: Some(token.access_token().secret().to_string()),
            expiry: token.expires_in().map(expiry_from_now),
        })
    }

    /// Exchange the stored refresh token for a fresh access token. A
    /// provider-side rejection means the grant was revoked or expired and
    /// surfaces as `ReauthRequired`; the stored credential is not touched.
    pub(super) async fn refresh(
        provider: Provider,
        refresh_token: &str,
        http_client: &reqwest::Client,
    ) -> Result<IssuedToken, ReciboError> {
        let client = build_oauth2_client(provider)?;
        let token: BasicTokenResponse = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(http_client)
            .await
            .map_err(refresh_rejection)?;
        info!(provider = %provider, "access token refreshed");

        Ok(IssuedToken {
            access_token: token.access_token().secret().to_string(),
            expiry: token.expires_in().map(expiry_from_now),
        })
    }
}

fn expiry_from_now(expires_in: std::time::Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(expires_in.as_secs() as i64)
}

type ProviderRequestTokenError =
    RequestTokenError<HttpClientError<ReqwestClientError>, BasicErrorResponse>;

fn refresh_rejection(e: ProviderRequestTokenError) -> ReciboError {
    match e {
        RequestTokenError::ServerResponse(_) => ReciboError::ReauthRequired,
        other => other.into(),
    }
}

/// Build the provider's OAuth2 client from configured settings.
fn build_oauth2_client(provider: Provider) -> Result<ProviderOauth2Client, ReciboError> {
    let settings = provider.settings();
    let redirect_uri = format!(
        "{}/connect/{}/callback",
        CONFIG.backend_url.trim_end_matches('/'),
        provider.as_str()
    );
    let client = OAuth2Client::new(ClientId::new(settings.client_id.clone()))
        .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(settings.auth_url.clone())?)
        .set_token_uri(TokenUrl::new(settings.token_url.clone())?)
        .set_redirect_uri(RedirectUrl::new(redirect_uri)?);
    Ok(client)
}

type ProviderOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
