//! Decrypted record views

use chrono::{NaiveDate, NaiveDateTime};

use phr_core::{DateRange, TagMap};
use phr_crypto::SymmetricKey;

/// A fully decrypted wire record, including its unwrapped keys. Used inside
/// the pipeline for updates; callers get a [`Record`].
#[derive(Debug, Clone)]
pub struct DecryptedRecord<R> {
    pub identifier: Option<String>,
    pub resource: R,
    pub tags: TagMap,
    pub annotations: Vec<String>,
    pub custom_creation_date: Option<NaiveDate>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub data_key: SymmetricKey,
    pub attachment_key: Option<SymmetricKey>,
    pub model_version: u32,
    pub common_key_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// Custom creation date when one was given, else the server creation date
    pub created_date: Option<NaiveDate>,
    pub updated_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record<R> {
    pub identifier: String,
    pub resource: R,
    pub annotations: Vec<String>,
    pub meta: RecordMeta,
}

impl<R> DecryptedRecord<R> {
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            created_date: self
                .custom_creation_date
                .or_else(|| self.created_at.map(|ts| ts.date())),
            updated_date: self.updated_at,
        }
    }

    pub fn into_record(self) -> Record<R> {
        let meta = self.meta();
        Record {
            identifier: self.identifier.unwrap_or_default(),
            resource: self.resource,
            annotations: self.annotations,
            meta,
        }
    }
}

/// Caller-facing search filter; tags are encrypted by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub resource_type: Option<String>,
    pub annotations: Vec<String>,
    pub date_range: DateRange,
    pub limit: Option<usize>,
    pub offset: usize,
}
