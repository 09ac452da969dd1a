pub mod oauth;
pub mod uploads;
