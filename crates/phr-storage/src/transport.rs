//! Record transport: the server-side collaborator of the record pipeline

use async_trait::async_trait;

use phr_core::{DateRange, PhrResult, WireRecord};

/// Server-side record filter. Tags are already encrypted; a record matches
/// when it carries every one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub encrypted_tags: Vec<String>,
    pub date_range: DateRange,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchQuery {
    pub fn matches(&self, record: &WireRecord) -> bool {
        let tags_match = self
            .encrypted_tags
            .iter()
            .all(|tag| record.encrypted_tags.contains(tag));
        let date = record
            .custom_creation_date
            .or_else(|| record.created_at.map(|ts| ts.date()));
        let date_matches = match date {
            Some(date) => self.date_range.contains(date),
            None => self.date_range == DateRange::default(),
        };
        tags_match && date_matches
    }
}

/// Persists wire records and encrypted attachment blobs for a user.
///
/// Every error is a `TransportFailed`.
#[async_trait]
pub trait RecordTransport: Send + Sync {
    /// Store a new record. The returned record carries the assigned id and
    /// server timestamps.
    async fn create_record(&self, user_id: &str, record: WireRecord) -> PhrResult<WireRecord>;

    async fn fetch_record(&self, user_id: &str, record_id: &str) -> PhrResult<WireRecord>;

    /// Newest first.
    async fn search_records(&self, user_id: &str, query: &SearchQuery)
        -> PhrResult<Vec<WireRecord>>;

    async fn count_records(&self, user_id: &str, query: &SearchQuery) -> PhrResult<usize>;

    async fn update_record(
        &self,
        user_id: &str,
        record_id: &str,
        record: WireRecord,
    ) -> PhrResult<WireRecord>;

    async fn delete_record(&self, user_id: &str, record_id: &str) -> PhrResult<()>;

    /// Store an encrypted blob, returning its id.
    async fn upload_attachment(&self, user_id: &str, data: Vec<u8>) -> PhrResult<String>;

    async fn download_attachment(&self, user_id: &str, attachment_id: &str) -> PhrResult<Vec<u8>>;

    async fn delete_attachment(&self, user_id: &str, attachment_id: &str) -> PhrResult<()>;
}
