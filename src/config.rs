use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// OAuth endpoint settings for one upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub loglevel: String,
    pub frontend_url: String,
    pub backend_url: String,
    /// HS256 signing secret for inbound bearer tokens. When unset, every
    /// request is rejected; there is no anonymous fallback.
    pub jwt_secret: Option<String>,
    pub jwt_audience: Option<String>,
    pub mail: ProviderSettings,
    pub storage: ProviderSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:recibo.sqlite".to_string(),
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            backend_url: "http://localhost:8000".to_string(),
            jwt_secret: None,
            jwt_audience: None,
            mail: ProviderSettings {
                client_id: String::new(),
                client_secret: String::new(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                scopes: vec![
                    "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                    "https://www.googleapis.com/auth/gmail.modify".to_string(),
                ],
            },
            storage: ProviderSettings {
                client_id: String::new(),
                client_secret: String::new(),
                auth_url: "https://www.dropbox.com/oauth2/authorize".to_string(),
                token_url: "https://api.dropboxapi.com/oauth2/token".to_string(),
                scopes: Vec::new(),
            },
        }
    }
}

impl Config {
    /// Layer environment variables (RECIBO_*, `__` as section separator)
    /// over the built-in defaults.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("RECIBO_").split("__"))
            .extract()
    }
}

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid configuration"));
