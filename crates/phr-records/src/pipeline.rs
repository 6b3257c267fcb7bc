//! Record pipeline: resource ⇄ encrypted wire record
//!
//! Create:
//!   - fresh data key, plus an attachment key when the resource has attachments
//!   - attachments hashed, encrypted and uploaded (with preview/thumbnail
//!     variants for images); their ids are written into the resource
//!   - body sealed with the data key, keys wrapped under the current common key
//!   - tags canonicalized and encrypted with the tag key
//!
//! Fetch walks the same steps backwards, resolving older common keys through
//! the identity service when the record predates a rotation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use phr_attachments::{
    content_hash, mime, verify_hash, AttachmentCodec, AttachmentIds, DownloadType, MimeType,
};
use phr_core::{PhrError, PhrResult, WireRecord, MODEL_VERSION};
use phr_crypto::{tags, KeyRole, SymmetricKey};
use phr_storage::{RecordTransport, SearchQuery};

use crate::batch::{run_batch, with_deadline, BatchResult};
use crate::context::ClientContext;
use crate::record::{DecryptedRecord, Record, RecordQuery};
use crate::resource::{Attachment, JsonSerializer, Resource, ResourceCodec, ResourceSerializer};
use crate::tagging::{tag_strings, TagGenerator, TAG_RESOURCE_TYPE};

pub struct RecordPipeline<T, S = JsonSerializer> {
    ctx: Arc<ClientContext>,
    transport: Arc<T>,
    resources: ResourceCodec<S>,
    attachments: AttachmentCodec,
    tagger: TagGenerator,
    concurrency: usize,
    item_timeout: Option<Duration>,
}

impl<T: RecordTransport> RecordPipeline<T> {
    pub fn new(ctx: Arc<ClientContext>, transport: Arc<T>) -> Self {
        Self::with_serializer(ctx, transport, JsonSerializer)
    }
}

impl<T: RecordTransport, S> RecordPipeline<T, S> {
    pub fn with_serializer(ctx: Arc<ClientContext>, transport: Arc<T>, serializer: S) -> Self {
        let config = ctx.config();
        let crypto = ctx.crypto().clone();
        let attachments = AttachmentCodec::new(crypto.clone(), &config.attachments);
        let tagger = TagGenerator::new(&config.client);
        let concurrency = config.pipeline.effective_concurrency();
        let item_timeout = config.pipeline.item_timeout();
        Self {
            resources: ResourceCodec::with_serializer(crypto, serializer),
            attachments,
            tagger,
            concurrency,
            item_timeout,
            ctx,
            transport,
        }
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    // ── Single records ───────────────────────────────────────────────────

    /// Encrypt and store a new record. The returned resource keeps its
    /// attachment payloads and carries the assigned attachment ids.
    ///
    /// Uploads and the store call share the configured item deadline. When
    /// it runs out, blobs uploaded so far are deleted before returning.
    pub async fn create_record<R>(
        &self,
        mut resource: R,
        annotations: Vec<String>,
        creation_date: Option<NaiveDate>,
    ) -> PhrResult<Record<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        let user_id = self.ctx.user_id()?;
        if resource.attachments().iter().any(|a| a.id.is_some()) {
            return Err(PhrError::ValidationFailed(
                "new records cannot reference existing attachments".into(),
            ));
        }

        let crypto = self.ctx.crypto();
        let data_key = crypto.generate_symmetric_key(KeyRole::Data)?;
        let attachment_key = if resource.attachments().is_empty() {
            None
        } else {
            Some(crypto.generate_symmetric_key(KeyRole::Attachment)?)
        };
        let tag_map = self.tagger.for_create(resource.resource_type());
        let tag_list = tag_strings(&tag_map, &annotations)?;

        let mut uploaded = Vec::new();
        let sealed = with_deadline(
            self.item_timeout,
            self.seal_and_store(
                &user_id,
                &mut resource,
                &tag_list,
                &data_key,
                attachment_key.as_ref(),
                &mut uploaded,
                |record| WireRecord {
                    custom_creation_date: creation_date,
                    ..record
                },
                None,
            ),
        )
        .await;
        let stored = match sealed {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_blobs(&user_id, &uploaded).await;
                return Err(e);
            }
        };

        info!(
            record_id = stored.identifier.as_deref().unwrap_or_default(),
            resource_type = resource.resource_type(),
            attachments = uploaded.len(),
            "record created"
        );
        Ok(DecryptedRecord {
            identifier: stored.identifier,
            resource,
            tags: tag_map,
            annotations,
            custom_creation_date: stored.custom_creation_date,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            data_key,
            attachment_key,
            model_version: stored.model_version,
            common_key_id: stored.common_key_id.unwrap_or_default(),
        }
        .into_record())
    }

    pub async fn fetch_record<R>(&self, record_id: &str) -> PhrResult<Record<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        Ok(self.fetch_decrypted(record_id).await?.into_record())
    }

    /// Replace a record's resource. The data key, creation date and model
    /// version are kept; keys are re-wrapped under the current common key.
    /// `annotations: None` keeps the stored annotations.
    pub async fn update_record<R>(
        &self,
        record_id: &str,
        mut resource: R,
        annotations: Option<Vec<String>>,
    ) -> PhrResult<Record<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        let user_id = self.ctx.user_id()?;
        let existing: DecryptedRecord<R> = self.fetch_decrypted(record_id).await?;

        let known: HashSet<&str> = existing
            .resource
            .attachments()
            .into_iter()
            .filter_map(|a| a.id.as_deref())
            .collect();
        if let Some(stray) = resource
            .attachments()
            .into_iter()
            .filter_map(|a| a.id.as_deref())
            .find(|id| !known.contains(id))
        {
            return Err(PhrError::ValidationFailed(format!(
                "attachment {stray} does not belong to record {record_id}"
            )));
        }

        let attachment_key = if resource.attachments().is_empty() {
            None
        } else {
            match existing.attachment_key {
                Some(key) => Some(key),
                None => Some(
                    self.ctx
                        .crypto()
                        .generate_symmetric_key(KeyRole::Attachment)?,
                ),
            }
        };
        let annotations = annotations.unwrap_or(existing.annotations);
        let tag_map = self
            .tagger
            .for_update(&existing.tags, resource.resource_type());
        let tag_list = tag_strings(&tag_map, &annotations)?;

        let mut uploaded = Vec::new();
        let sealed = with_deadline(
            self.item_timeout,
            self.seal_and_store(
                &user_id,
                &mut resource,
                &tag_list,
                &existing.data_key,
                attachment_key.as_ref(),
                &mut uploaded,
                |record| WireRecord {
                    identifier: Some(record_id.to_string()),
                    model_version: existing.model_version,
                    custom_creation_date: existing.custom_creation_date,
                    created_at: existing.created_at,
                    ..record
                },
                Some(record_id),
            ),
        )
        .await;
        let stored = match sealed {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_blobs(&user_id, &uploaded).await;
                return Err(e);
            }
        };

        info!(record_id = %record_id, attachments = uploaded.len(), "record updated");
        Ok(DecryptedRecord {
            identifier: stored.identifier,
            resource,
            tags: tag_map,
            annotations,
            custom_creation_date: stored.custom_creation_date,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            data_key: existing.data_key,
            attachment_key,
            model_version: stored.model_version,
            common_key_id: stored.common_key_id.unwrap_or_default(),
        }
        .into_record())
    }

    pub async fn delete_record(&self, record_id: &str) -> PhrResult<()> {
        let user_id = self.ctx.user_id()?;
        self.transport.delete_record(&user_id, record_id).await?;
        info!(record_id = %record_id, "record deleted");
        Ok(())
    }

    // ── Batches ──────────────────────────────────────────────────────────

    /// Create every resource independently. `annotations` apply to each.
    /// The item deadline is enforced inside `create_record`, so a timed-out
    /// item still removes the blobs it uploaded.
    pub async fn create_records<R>(
        &self,
        resources: Vec<R>,
        annotations: Vec<String>,
    ) -> BatchResult<R, Record<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        run_batch(resources, self.concurrency, None, |resource| {
            self.create_record(resource, annotations.clone(), None)
        })
        .await
    }

    pub async fn fetch_records<R>(&self, record_ids: Vec<String>) -> BatchResult<String, Record<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        run_batch(record_ids, self.concurrency, self.item_timeout, |id| async move {
            self.fetch_record(&id).await
        })
        .await
    }

    pub async fn update_records<R>(
        &self,
        updates: Vec<(String, R)>,
    ) -> BatchResult<(String, R), Record<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        run_batch(
            updates,
            self.concurrency,
            None,
            |(id, resource)| async move { self.update_record(&id, resource, None).await },
        )
        .await
    }

    /// Successful entries are the deleted record ids.
    pub async fn delete_records(&self, record_ids: Vec<String>) -> BatchResult<String, String> {
        run_batch(record_ids, self.concurrency, self.item_timeout, |id| async move {
            self.delete_record(&id).await.map(|()| id)
        })
        .await
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Search by resource type, annotations and date. Records that fail to
    /// decrypt are reported by id next to the successful ones.
    pub async fn search_records<R>(
        &self,
        query: &RecordQuery,
    ) -> PhrResult<BatchResult<String, Record<R>>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        let user_id = self.ctx.user_id()?;
        let search = self.search_query(query)?;
        let found = self.transport.search_records(&user_id, &search).await?;
        debug!(matches = found.len(), "search returned records");

        let batch = run_batch(found, self.concurrency, self.item_timeout, |wire| async move {
            self.decrypt_wire::<R>(wire)
                .await
                .map(DecryptedRecord::into_record)
        })
        .await;
        Ok(BatchResult {
            successful: batch.successful,
            failed: batch
                .failed
                .into_iter()
                .map(|(wire, e)| (wire.identifier.unwrap_or_default(), e))
                .collect(),
        })
    }

    pub async fn count_records(&self, query: &RecordQuery) -> PhrResult<usize> {
        let user_id = self.ctx.user_id()?;
        let search = self.search_query(query)?;
        self.transport.count_records(&user_id, &search).await
    }

    /// Download and decrypt attachments of a record at the requested size.
    /// `attachment_ids` are the full-size ids (or the composite ids) stored
    /// in the resource. Full-size payloads are checked against their hash.
    pub async fn download_attachments<R>(
        &self,
        record_id: &str,
        attachment_ids: &[String],
        download: DownloadType,
    ) -> PhrResult<Vec<Attachment>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        let user_id = self.ctx.user_id()?;
        let record: DecryptedRecord<R> = self.fetch_decrypted(record_id).await?;
        let key = record
            .attachment_key
            .as_ref()
            .ok_or_else(|| PhrError::key_missing(KeyRole::Attachment.as_str(), Some(record_id)))?;

        let mut downloaded = Vec::with_capacity(attachment_ids.len());
        for requested in attachment_ids {
            let attachment = record
                .resource
                .attachments()
                .into_iter()
                .find(|a| {
                    a.id.as_deref().is_some_and(|id| {
                        id == requested.as_str() || AttachmentIds::parse(id).full == *requested
                    })
                })
                .cloned()
                .ok_or_else(|| {
                    PhrError::ValidationFailed(format!(
                        "attachment {requested} not found in record {record_id}"
                    ))
                })?;
            let ids = AttachmentIds::parse(attachment.id.as_deref().unwrap_or_default());
            let blob_id = ids.select(download);

            let ciphertext = self.transport.download_attachment(&user_id, blob_id).await?;
            let payload = self.attachments.decrypt(key, &ciphertext)?;

            let mut attachment = attachment;
            if blob_id == ids.full {
                if let Some(expected) = attachment.hash.as_deref() {
                    verify_hash(&payload, expected)?;
                }
            } else {
                attachment.hash = Some(content_hash(&payload));
                attachment.size = Some(payload.len() as u64);
            }
            attachment.data = Some(STANDARD.encode(&payload));
            debug!(record_id = %record_id, attachment_id = %blob_id, ?download, "attachment downloaded");
            downloaded.push(attachment);
        }
        Ok(downloaded)
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn fetch_decrypted<R>(&self, record_id: &str) -> PhrResult<DecryptedRecord<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        let user_id = self.ctx.user_id()?;
        let wire = self.transport.fetch_record(&user_id, record_id).await?;
        self.decrypt_wire(wire).await
    }

    async fn decrypt_wire<R>(&self, wire: WireRecord) -> PhrResult<DecryptedRecord<R>>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        if wire.model_version > MODEL_VERSION {
            return Err(PhrError::ModelVersionNotSupported {
                found: wire.model_version,
                supported: MODEL_VERSION,
            });
        }

        let common_key_id = wire.effective_common_key_id().to_string();
        let common_key = self.ctx.resolve_common_key(&common_key_id).await?;
        let tag_key = self.ctx.keyring().require_tag_key()?;

        let data_key = self.unwrap_record_key(&wire.encrypted_data_key, &common_key, KeyRole::Data)?;
        let attachment_key = wire
            .encrypted_attachment_key
            .as_deref()
            .map(|wrapped| self.unwrap_record_key(wrapped, &common_key, KeyRole::Attachment))
            .transpose()?;

        let (tag_map, annotations) =
            tags::split_annotations(tags::decrypt_tags(&tag_key, &wire.encrypted_tags)?);
        let type_hint = tag_map.get(TAG_RESOURCE_TYPE).map_or("", String::as_str);

        let body = STANDARD
            .decode(&wire.encrypted_body)
            .map_err(|e| PhrError::decryption_caused("Failed to decrypt resource", e))?;
        let resource = self.resources.decrypt_resource(&data_key, type_hint, &body)?;

        Ok(DecryptedRecord {
            identifier: wire.identifier,
            resource,
            tags: tag_map,
            annotations,
            custom_creation_date: wire.custom_creation_date,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            data_key,
            attachment_key,
            model_version: wire.model_version,
            common_key_id,
        })
    }

    fn unwrap_record_key(
        &self,
        wrapped: &str,
        common_key: &SymmetricKey,
        role: KeyRole,
    ) -> PhrResult<SymmetricKey> {
        let material = STANDARD.decode(wrapped).map_err(|e| {
            PhrError::key_unwrap_caused(format!("wrapped {role} key is not valid base64"), e)
        })?;
        self.ctx
            .crypto()
            .unwrap(&material, common_key, role)?
            .into_symmetric()
    }

    /// Upload pending attachments, then seal the resource and send it.
    /// `finish` fills in the fields that differ between create and update.
    /// Ids of uploaded blobs are pushed to `uploaded` as they land.
    #[allow(clippy::too_many_arguments)]
    async fn seal_and_store<R>(
        &self,
        user_id: &str,
        resource: &mut R,
        tag_list: &[String],
        data_key: &SymmetricKey,
        attachment_key: Option<&SymmetricKey>,
        uploaded: &mut Vec<String>,
        finish: impl FnOnce(WireRecord) -> WireRecord,
        update_id: Option<&str>,
    ) -> PhrResult<WireRecord>
    where
        R: Resource,
        S: ResourceSerializer<R>,
    {
        if let Some(key) = attachment_key {
            self.upload_attachments(user_id, key, resource, uploaded)
                .await?;
        }

        let mut stored = resource.clone();
        for attachment in stored.attachments_mut() {
            attachment.data = None;
        }
        let body = self.resources.encrypt_resource(data_key, &stored)?;

        let (common_key_id, common_key) = self.ctx.keyring().require_current_common_key()?;
        let tag_key = self.ctx.keyring().require_tag_key()?;
        let crypto = self.ctx.crypto();
        let encrypted_data_key = STANDARD.encode(crypto.wrap(data_key, &*common_key)?);
        let encrypted_attachment_key = attachment_key
            .map(|key| crypto.wrap(key, &*common_key).map(|w| STANDARD.encode(w)))
            .transpose()?;

        let record = finish(WireRecord {
            identifier: None,
            common_key_id: Some(common_key_id),
            encrypted_tags: tags::encrypt_tags(&tag_key, tag_list)?,
            encrypted_body: STANDARD.encode(body),
            encrypted_data_key,
            encrypted_attachment_key,
            model_version: MODEL_VERSION,
            custom_creation_date: None,
            created_at: None,
            updated_at: None,
        });

        match update_id {
            Some(id) => self.transport.update_record(user_id, id, record).await,
            None => self.transport.create_record(user_id, record).await,
        }
    }

    /// Upload every attachment that has no id yet. Attachments that already
    /// carry an id are references to stored blobs and are left alone.
    async fn upload_attachments<R: Resource>(
        &self,
        user_id: &str,
        key: &SymmetricKey,
        resource: &mut R,
        uploaded: &mut Vec<String>,
    ) -> PhrResult<()> {
        for attachment in resource.attachments_mut() {
            if attachment.id.is_some() {
                continue;
            }
            let encoded = attachment.data.as_deref().ok_or_else(|| {
                PhrError::ValidationFailed("attachment has neither an id nor data".into())
            })?;
            let payload = STANDARD.decode(encoded).map_err(|e| {
                PhrError::ValidationFailed(format!("attachment data is not valid base64: {e}"))
            })?;

            if let Some(expected) = attachment.hash.as_deref() {
                verify_hash(&payload, expected)?;
            }
            attachment.hash.get_or_insert_with(|| content_hash(&payload));
            attachment.size = Some(payload.len() as u64);
            if attachment.content_type.is_none() {
                let sniffed = mime::sniff(&payload);
                if sniffed != MimeType::Unknown {
                    attachment.content_type = Some(sniffed.content_type().to_string());
                }
            }

            let mut ids =
                AttachmentIds::single(self.upload_blob(user_id, key, &payload, uploaded).await?);
            if let Some(variants) = self.attachments.variants(&payload) {
                if let Some(preview) = variants.preview.into_bytes() {
                    ids.preview = Some(self.upload_blob(user_id, key, &preview, uploaded).await?);
                }
                if let Some(thumbnail) = variants.thumbnail.into_bytes() {
                    ids.thumbnail =
                        Some(self.upload_blob(user_id, key, &thumbnail, uploaded).await?);
                }
            }
            debug!(
                attachment_id = %ids.full,
                variants = ids.has_variants(),
                bytes = payload.len(),
                "attachment uploaded"
            );
            attachment.id = Some(ids.to_string());
        }
        Ok(())
    }

    async fn upload_blob(
        &self,
        user_id: &str,
        key: &SymmetricKey,
        payload: &[u8],
        uploaded: &mut Vec<String>,
    ) -> PhrResult<String> {
        let ciphertext = self.attachments.encrypt(key, payload)?;
        let id = self.transport.upload_attachment(user_id, ciphertext).await?;
        uploaded.push(id.clone());
        Ok(id)
    }

    /// Best-effort removal of blobs uploaded by a failed create or update.
    async fn discard_blobs(&self, user_id: &str, ids: &[String]) {
        for id in ids {
            if let Err(e) = self.transport.delete_attachment(user_id, id).await {
                warn!(attachment_id = %id, "failed to delete orphaned attachment: {e}");
            }
        }
    }

    fn search_query(&self, query: &RecordQuery) -> PhrResult<SearchQuery> {
        let tag_key = self.ctx.keyring().require_tag_key()?;
        let tag_map = self.tagger.for_search(query.resource_type.as_deref());
        let tag_list = tag_strings(&tag_map, &query.annotations)?;
        Ok(SearchQuery {
            encrypted_tags: tags::encrypt_tags(&tag_key, &tag_list)?,
            date_range: query.date_range,
            limit: query.limit,
            offset: query.offset,
        })
    }
}
