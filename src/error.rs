use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ReciboError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid or expired state token")]
    InvalidOrExpiredState,

    #[error("Provider token exchange failed: {0}")]
    ProviderExchange(String),

    #[error("Provider rejected the stored refresh token; reconnect required")]
    ReauthRequired,
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for ReciboError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => {
                ReciboError::ProviderExchange(format!("provider error: {}", err.error()))
            }
            RequestTokenError::Request(req_e) => {
                ReciboError::ProviderExchange(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => ReciboError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => ReciboError::ProviderExchange(s),
        }
    }
}

impl IntoResponse for ReciboError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            ReciboError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Please sign in again.".to_string(),
                },
            ),
            ReciboError::InvalidOrExpiredState => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "INVALID_STATE".to_string(),
                    message: "Sign-in session is invalid or expired. Please try connecting again."
                        .to_string(),
                },
            ),
            ReciboError::ReauthRequired => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "RECONNECT_REQUIRED".to_string(),
                    message: "Reconnect this provider.".to_string(),
                },
            ),
            ReciboError::ProviderExchange(_)
            | ReciboError::Reqwest(_)
            | ReciboError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "EXCHANGE_FAILED".to_string(),
                    message: "Could not reach the provider. Try connecting again.".to_string(),
                },
            ),
            ReciboError::Database(_) | ReciboError::Json(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
