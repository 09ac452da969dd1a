use crate::db::models::{CredentialRow, ReceiptMetadata, SourceType, TokenBlob, UploadRecord};
use crate::db::schema::SQLITE_INIT;
use crate::error::ReciboError;
use crate::oauth::provider::Provider;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

/// Single-use CSRF state tokens are unusable after this window, even if the
/// row has not been swept yet.
pub const STATE_TTL_SECS: i64 = 3600;

/// Destination folder returned when a user has not set a preference.
pub const DEFAULT_FOLDER: &str = "/Smart Receipts";

/// Open (creating if missing) the SQLite database and run the DDL.
pub async fn connect(database_url: &str) -> Result<Storage, ReciboError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
    let storage = Storage::new(pool);
    storage.init_schema().await?;
    Ok(storage)
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), ReciboError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ---- provider credentials ----

    pub async fn credential_get(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<CredentialRow>, ReciboError> {
        let row = sqlx::query(
            r#"SELECT user_id, provider, token_blob, updated_at
               FROM provider_credentials WHERE user_id = ? AND provider = ?"#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::credential_row_to_model).transpose()
    }

    /// Upsert by `(user_id, provider)`; the latest blob wins.
    pub async fn credential_put(
        &self,
        user_id: &str,
        provider: Provider,
        blob: &TokenBlob,
    ) -> Result<(), ReciboError> {
        let blob_json = serde_json::to_string(blob)?;
        sqlx::query(
            r#"
            INSERT INTO provider_credentials (user_id, provider, token_blob, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                token_blob = excluded.token_blob,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(blob_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Idempotent: deleting a missing row is not an error.
    pub async fn credential_delete(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<(), ReciboError> {
        sqlx::query("DELETE FROM provider_credentials WHERE user_id = ? AND provider = ?")
            .bind(user_id)
            .bind(provider.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- folder preference ----

    pub async fn folder_get(&self, user_id: &str) -> Result<String, ReciboError> {
        let row = sqlx::query("SELECT folder_path FROM folder_preferences WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(r.try_get("folder_path")?),
            None => Ok(DEFAULT_FOLDER.to_string()),
        }
    }

    pub async fn folder_put(&self, user_id: &str, folder_path: &str) -> Result<(), ReciboError> {
        sqlx::query(
            r#"
            INSERT INTO folder_preferences (user_id, folder_path, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                folder_path = excluded.folder_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(folder_path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- CSRF state ledger ----

    /// Mint a random single-use state token bound to `user_id`.
    pub async fn state_issue(&self, user_id: &str) -> Result<String, ReciboError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        sqlx::query("INSERT INTO oauth_states (state_token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    /// Atomically look up and delete the state row. Returns the issuing
    /// user's id, or `None` when the token is unknown, already consumed, or
    /// older than the expiry window (expired rows are left for the sweep).
    pub async fn state_consume(&self, state_token: &str) -> Result<Option<String>, ReciboError> {
        let cutoff = Utc::now() - Duration::seconds(STATE_TTL_SECS);
        let row = sqlx::query(
            "DELETE FROM oauth_states WHERE state_token = ? AND created_at > ? RETURNING user_id",
        )
        .bind(state_token)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.try_get("user_id").map_err(ReciboError::from))
            .transpose()
    }

    /// Storage reclamation only; correctness never depends on sweep timing.
    /// Safe to run concurrently and repeatedly.
    pub async fn state_sweep(&self, older_than: DateTime<Utc>) -> Result<u64, ReciboError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE created_at <= ?")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ---- upload ledger ----

    /// Upsert by `(user_id, receipt_key)`. Paths and metadata are replaced,
    /// not merged; the latest call is authoritative for that key.
    /// `created_at` is preserved across re-marks.
    pub async fn mark_uploaded(
        &self,
        user_id: &str,
        receipt_key: &str,
        destination_paths: &[String],
        metadata: Option<&ReceiptMetadata>,
        source_type: SourceType,
    ) -> Result<UploadRecord, ReciboError> {
        let paths_json = serde_json::to_string(destination_paths)?;
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO uploaded_receipts (
                user_id, receipt_key, uploaded, upload_timestamp,
                destination_paths, metadata, source_type, created_at, updated_at
            ) VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, receipt_key) DO UPDATE SET
                uploaded = 1,
                upload_timestamp = excluded.upload_timestamp,
                destination_paths = excluded.destination_paths,
                metadata = excluded.metadata,
                source_type = excluded.source_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(receipt_key)
        .bind(now)
        .bind(paths_json)
        .bind(metadata_json)
        .bind(source_type.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        // Fetch the row back after upsert
        let row = sqlx::query(
            r#"SELECT receipt_key, uploaded, upload_timestamp, destination_paths,
               metadata, source_type, created_at, updated_at
               FROM uploaded_receipts WHERE user_id = ? AND receipt_key = ?"#,
        )
        .bind(user_id)
        .bind(receipt_key)
        .fetch_one(&self.pool)
        .await?;
        Self::upload_row_to_model(row)
    }

    pub async fn upload_status(
        &self,
        user_id: &str,
        receipt_key: &str,
    ) -> Result<Option<UploadRecord>, ReciboError> {
        let row = sqlx::query(
            r#"SELECT receipt_key, uploaded, upload_timestamp, destination_paths,
               metadata, source_type, created_at, updated_at
               FROM uploaded_receipts WHERE user_id = ? AND receipt_key = ?"#,
        )
        .bind(user_id)
        .bind(receipt_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::upload_row_to_model).transpose()
    }

    /// Bulk lookup. Keys with no row are simply absent from the result map.
    pub async fn upload_status_batch(
        &self,
        user_id: &str,
        receipt_keys: &[String],
    ) -> Result<HashMap<String, UploadRecord>, ReciboError> {
        if receipt_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT receipt_key, uploaded, upload_timestamp, destination_paths,
               metadata, source_type, created_at, updated_at
               FROM uploaded_receipts WHERE user_id = "#,
        );
        qb.push_bind(user_id);
        qb.push(" AND receipt_key IN (");
        {
            let mut sep = qb.separated(", ");
            for key in receipt_keys {
                sep.push_bind(key);
            }
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut statuses = HashMap::with_capacity(rows.len());
        for row in rows {
            let record = Self::upload_row_to_model(row)?;
            statuses.insert(record.receipt_key.clone(), record);
        }
        Ok(statuses)
    }

    /// Enumerate the user's ledger, newest first. Ordering is for display
    /// only; callers must not rely on it for correctness.
    pub async fn list_uploads(
        &self,
        user_id: &str,
        include_uploaded: bool,
        include_not_uploaded: bool,
    ) -> Result<Vec<UploadRecord>, ReciboError> {
        let filter = match (include_uploaded, include_not_uploaded) {
            (true, true) => "",
            (true, false) => " AND uploaded = 1",
            (false, true) => " AND uploaded = 0",
            (false, false) => return Ok(Vec::new()),
        };

        let sql = format!(
            r#"SELECT receipt_key, uploaded, upload_timestamp, destination_paths,
               metadata, source_type, created_at, updated_at
               FROM uploaded_receipts WHERE user_id = ?{filter}
               ORDER BY created_at DESC"#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::upload_row_to_model).collect()
    }

    // ---- row decoding ----

    fn credential_row_to_model(row: SqliteRow) -> Result<CredentialRow, ReciboError> {
        Ok(CredentialRow {
            user_id: row.try_get("user_id")?,
            provider: row.try_get("provider")?,
            token_blob: row.try_get("token_blob")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn upload_row_to_model(row: SqliteRow) -> Result<UploadRecord, ReciboError> {
        let receipt_key: String = row.try_get("receipt_key")?;
        let uploaded: i64 = row.try_get("uploaded")?;
        let upload_timestamp: Option<DateTime<Utc>> = row.try_get("upload_timestamp")?;
        let paths_json: String = row.try_get("destination_paths")?;
        let metadata_json: Option<String> = row.try_get("metadata")?;
        let source_type_str: Option<String> = row.try_get("source_type")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let destination_paths: Vec<String> = serde_json::from_str(&paths_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let metadata: Option<ReceiptMetadata> = metadata_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let source_type = source_type_str.as_deref().and_then(SourceType::parse);

        Ok(UploadRecord {
            receipt_key,
            uploaded: uploaded != 0,
            upload_timestamp,
            destination_paths,
            metadata,
            source_type,
            created_at,
            updated_at,
        })
    }
}
