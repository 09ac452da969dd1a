//! SQL DDL for initializing persistent storage.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema. Four flat keyed tables:
/// - `provider_credentials`: one row per `(user_id, provider)`, JSON token blob
/// - `oauth_states`: single-use CSRF state tokens, expiry checked at read time
/// - `folder_preferences`: one row per user
/// - `uploaded_receipts`: one row per `(user_id, receipt_key)`
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS provider_credentials (
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    token_blob TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, provider)
);

CREATE TABLE IF NOT EXISTS oauth_states (
    state_token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_oauth_states_created_at ON oauth_states(created_at);

CREATE TABLE IF NOT EXISTS folder_preferences (
    user_id TEXT PRIMARY KEY,
    folder_path TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS uploaded_receipts (
    user_id TEXT NOT NULL,
    receipt_key TEXT NOT NULL,
    uploaded INTEGER NOT NULL DEFAULT 0,
    upload_timestamp TEXT NULL,
    destination_paths TEXT NOT NULL DEFAULT '[]', -- JSON array, serialized as text
    metadata TEXT NULL, -- JSON object, serialized as text
    source_type TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, receipt_key)
);
"#;
