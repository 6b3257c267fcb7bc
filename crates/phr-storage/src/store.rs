//! OpenDAL-backed record transport
//!
//! Layout under the configured prefix:
//! ```text
//! {prefix}/users/{user_id}/records/{record_id}.json   wire record JSON
//! {prefix}/users/{user_id}/attachments/{id}           encrypted blob
//! ```
//! Ids and timestamps are assigned here the way the record server assigns
//! them, so the pipeline can run against S3 or the in-memory service.

use async_trait::async_trait;
use chrono::SubsecRound;
use opendal::{ErrorKind, Operator};
use uuid::Uuid;

use phr_core::config::StorageConfig;
use phr_core::{PhrError, PhrResult, WireRecord};

use crate::health;
use crate::operator::{build_memory_operator, build_s3_operator, S3Credentials};
use crate::transport::{RecordTransport, SearchQuery};

#[derive(Clone)]
pub struct OperatorTransport {
    op: Operator,
    prefix: String,
}

impl OperatorTransport {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// S3-backed transport rooted at `storage.prefix`.
    pub fn connect(storage: &StorageConfig, credentials: &S3Credentials) -> PhrResult<Self> {
        let op = build_s3_operator(storage, credentials)
            .map_err(|e| PhrError::Config(format!("{e:#}")))?;
        Ok(Self::new(op, &storage.prefix))
    }

    /// Process-local transport for tests and offline development.
    pub fn in_memory(prefix: &str) -> PhrResult<Self> {
        let op = build_memory_operator().map_err(|e| PhrError::Config(format!("{e:#}")))?;
        Ok(Self::new(op, prefix))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub async fn check_health(&self) -> PhrResult<()> {
        health::check_health(&self.op, &self.prefix).await
    }

    fn user_root(&self, user_id: &str) -> String {
        if self.prefix.is_empty() {
            format!("users/{user_id}")
        } else {
            format!("{}/users/{user_id}", self.prefix)
        }
    }

    fn records_dir(&self, user_id: &str) -> String {
        format!("{}/records/", self.user_root(user_id))
    }

    fn record_path(&self, user_id: &str, record_id: &str) -> String {
        format!("{}{record_id}.json", self.records_dir(user_id))
    }

    fn attachment_path(&self, user_id: &str, attachment_id: &str) -> String {
        format!("{}/attachments/{attachment_id}", self.user_root(user_id))
    }

    async fn write_record(&self, user_id: &str, record: &WireRecord) -> PhrResult<()> {
        let record_id = record
            .identifier
            .as_deref()
            .ok_or_else(|| PhrError::transport("record has no identifier"))?;
        let json = serde_json::to_vec(record)
            .map_err(|e| PhrError::transport_caused("serializing wire record", e))?;
        self.op
            .write(&self.record_path(user_id, record_id), json)
            .await
            .map_err(|e| PhrError::transport_caused(format!("writing record {record_id}"), e))?;
        Ok(())
    }

    async fn list_records(&self, user_id: &str) -> PhrResult<Vec<WireRecord>> {
        let dir = self.records_dir(user_id);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PhrError::transport_caused("listing records", e)),
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.path().ends_with(".json")) {
            let data = self
                .op
                .read(entry.path())
                .await
                .map_err(|e| PhrError::transport_caused(format!("reading {}", entry.path()), e))?;
            let record: WireRecord = serde_json::from_slice(&data.to_vec()).map_err(|e| {
                PhrError::transport_caused(format!("parsing {}", entry.path()), e)
            })?;
            records.push(record);
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        Ok(records)
    }
}

impl std::fmt::Debug for OperatorTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorTransport")
            .field("scheme", &self.op.info().scheme())
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc().trunc_subsecs(3)
}

#[async_trait]
impl RecordTransport for OperatorTransport {
    async fn create_record(&self, user_id: &str, mut record: WireRecord) -> PhrResult<WireRecord> {
        let record_id = Uuid::new_v4().to_string();
        let timestamp = now();
        record.identifier = Some(record_id.clone());
        record.created_at = Some(timestamp);
        record.updated_at = Some(timestamp);

        self.write_record(user_id, &record).await?;
        tracing::debug!(record_id = %record_id, tags = record.encrypted_tags.len(), "stored record");
        Ok(record)
    }

    async fn fetch_record(&self, user_id: &str, record_id: &str) -> PhrResult<WireRecord> {
        let data = match self.op.read(&self.record_path(user_id, record_id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PhrError::transport(format!("record {record_id} not found")))
            }
            Err(e) => {
                return Err(PhrError::transport_caused(
                    format!("reading record {record_id}"),
                    e,
                ))
            }
        };
        serde_json::from_slice(&data.to_vec())
            .map_err(|e| PhrError::transport_caused(format!("parsing record {record_id}"), e))
    }

    async fn search_records(
        &self,
        user_id: &str,
        query: &SearchQuery,
    ) -> PhrResult<Vec<WireRecord>> {
        let records = self.list_records(user_id).await?;
        Ok(records
            .into_iter()
            .filter(|record| query.matches(record))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count_records(&self, user_id: &str, query: &SearchQuery) -> PhrResult<usize> {
        let records = self.list_records(user_id).await?;
        Ok(records.iter().filter(|record| query.matches(record)).count())
    }

    async fn update_record(
        &self,
        user_id: &str,
        record_id: &str,
        mut record: WireRecord,
    ) -> PhrResult<WireRecord> {
        let existing = self.fetch_record(user_id, record_id).await?;
        record.identifier = Some(record_id.to_string());
        record.created_at = existing.created_at;
        record.updated_at = Some(now());

        self.write_record(user_id, &record).await?;
        tracing::debug!(record_id = %record_id, "updated record");
        Ok(record)
    }

    async fn delete_record(&self, user_id: &str, record_id: &str) -> PhrResult<()> {
        let path = self.record_path(user_id, record_id);
        match self.op.stat(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PhrError::transport(format!("record {record_id} not found")))
            }
            Err(e) => {
                return Err(PhrError::transport_caused(
                    format!("checking record {record_id}"),
                    e,
                ))
            }
        }
        self.op
            .delete(&path)
            .await
            .map_err(|e| PhrError::transport_caused(format!("deleting record {record_id}"), e))?;
        tracing::debug!(record_id = %record_id, "deleted record");
        Ok(())
    }

    async fn upload_attachment(&self, user_id: &str, data: Vec<u8>) -> PhrResult<String> {
        let attachment_id = Uuid::new_v4().to_string();
        let size = data.len();
        self.op
            .write(&self.attachment_path(user_id, &attachment_id), data)
            .await
            .map_err(|e| {
                PhrError::transport_caused(format!("uploading attachment {attachment_id}"), e)
            })?;
        tracing::debug!(attachment_id = %attachment_id, size, "uploaded attachment");
        Ok(attachment_id)
    }

    async fn download_attachment(&self, user_id: &str, attachment_id: &str) -> PhrResult<Vec<u8>> {
        match self.op.read(&self.attachment_path(user_id, attachment_id)).await {
            Ok(data) => Ok(data.to_vec()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PhrError::transport(format!(
                "attachment {attachment_id} not found"
            ))),
            Err(e) => Err(PhrError::transport_caused(
                format!("downloading attachment {attachment_id}"),
                e,
            )),
        }
    }

    async fn delete_attachment(&self, user_id: &str, attachment_id: &str) -> PhrResult<()> {
        self.op
            .delete(&self.attachment_path(user_id, attachment_id))
            .await
            .map_err(|e| {
                PhrError::transport_caused(format!("deleting attachment {attachment_id}"), e)
            })
    }
}
