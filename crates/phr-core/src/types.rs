use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common key id used by records written before common keys were versioned.
pub const DEFAULT_COMMON_KEY_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Serialization format version written into every new wire record.
pub const MODEL_VERSION: u32 = 1;

/// Plaintext tags keyed by name. Later entries with the same name win.
pub type TagMap = BTreeMap<String, String>;

/// Server-visible record representation. Field names are the server contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "record_id", default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(rename = "common_key_id", default, skip_serializing_if = "Option::is_none")]
    pub common_key_id: Option<String>,
    #[serde(rename = "encrypted_tags")]
    pub encrypted_tags: Vec<String>,
    #[serde(rename = "encrypted_body")]
    pub encrypted_body: String,
    /// Data key wrapped under the common key (base64)
    #[serde(rename = "encrypted_key")]
    pub encrypted_data_key: String,
    /// Attachment key wrapped under the common key (base64)
    #[serde(rename = "attachment_key", default, skip_serializing_if = "Option::is_none")]
    pub encrypted_attachment_key: Option<String>,
    #[serde(rename = "model_version")]
    pub model_version: u32,
    /// Caller-supplied creation date
    #[serde(rename = "date", default, skip_serializing_if = "Option::is_none")]
    pub custom_creation_date: Option<NaiveDate>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl WireRecord {
    /// The common key id this record was written under, falling back to the
    /// legacy default for records that predate key versioning.
    pub fn effective_common_key_id(&self) -> &str {
        self.common_key_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_COMMON_KEY_ID)
    }
}

/// Wrapped key material handed out by the identity service at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub user_id: String,
    /// Absent for accounts that predate common key versioning
    pub common_key_id: Option<String>,
    /// Common key wrapped under the user's public key, or under the previous
    /// common key after a rotation (base64)
    pub common_key_wrapped: String,
    /// Tag key wrapped under the common key (base64)
    pub tag_key_wrapped: String,
}

/// Inclusive date window used when searching records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}
