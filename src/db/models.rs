use crate::error::ReciboError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider tokens as persisted in `provider_credentials.token_blob`.
/// The refresh token is the long-lived secret; access token and expiry are
/// cached opportunistically after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBlob {
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRow {
    pub user_id: String,
    pub provider: String,
    pub token_blob: String,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRow {
    pub fn blob(&self) -> Result<TokenBlob, ReciboError> {
        Ok(serde_json::from_str(&self.token_blob)?)
    }
}

/// Receipt fields the extraction flow attaches to an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReceiptMetadata {
    pub vendor: Option<String>,
    pub date: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
}

/// Where a tracked receipt came from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    MailAttachment,
    MailBody,
    Upload,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::MailAttachment => "mail_attachment",
            SourceType::MailBody => "mail_body",
            SourceType::Upload => "upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mail_attachment" => Some(SourceType::MailAttachment),
            "mail_body" => Some(SourceType::MailBody),
            "upload" => Some(SourceType::Upload),
            _ => None,
        }
    }
}

/// One upload-ledger row, keyed by `(user_id, receipt_key)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadRecord {
    pub receipt_key: String,
    pub uploaded: bool,
    pub upload_timestamp: Option<DateTime<Utc>>,
    pub destination_paths: Vec<String>,
    pub metadata: Option<ReceiptMetadata>,
    pub source_type: Option<SourceType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
