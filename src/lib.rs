pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod oauth;
pub mod router;

pub use error::ReciboError;
pub use identity::{AuthUser, IdentityVerifier};
pub use oauth::{OauthBroker, Provider};
