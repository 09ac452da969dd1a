//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `store.rs`: keyed-table operations over the sqlx pool

pub mod models;
pub mod schema;
pub mod store;

pub use models::{CredentialRow, ReceiptMetadata, SourceType, TokenBlob, UploadRecord};
pub use schema::SQLITE_INIT;
pub use store::{DEFAULT_FOLDER, STATE_TTL_SECS, SqlitePool, Storage, connect};
