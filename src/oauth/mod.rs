pub mod broker;
pub mod provider;

pub use broker::{OauthBroker, StartedFlow};
pub use provider::{IssuedToken, Provider};
