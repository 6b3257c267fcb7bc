//! Attachment encryption, integrity hashes and size variants
//!
//! A resizable image is stored as up to three blobs (full, preview,
//! thumbnail), all encrypted with the record's attachment key. The resource
//! carries the composite id `fullId#previewId#thumbnailId`; a size that was
//! skipped or failed reuses the full id.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use phr_core::config::AttachmentConfig;
use phr_core::{PhrError, PhrResult};
use phr_crypto::{CryptoService, KeyRole, SymmetricKey};

use crate::mime;
use crate::resize::{ImageResizer, ResizeOutcome};

const ID_SEPARATOR: char = '#';

/// Which stored size to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadType {
    #[default]
    Full,
    /// Preview
    Medium,
    /// Thumbnail
    Small,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentIds {
    pub full: String,
    pub preview: Option<String>,
    pub thumbnail: Option<String>,
}

impl AttachmentIds {
    pub fn single(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            preview: None,
            thumbnail: None,
        }
    }

    /// Parse a stored id. Anything other than three `#`-separated parts is a
    /// plain full-size id.
    pub fn parse(id: &str) -> Self {
        let parts: Vec<&str> = id.split(ID_SEPARATOR).collect();
        match parts.as_slice() {
            [full, preview, thumbnail] if !full.is_empty() => Self {
                full: full.to_string(),
                preview: Some(preview.to_string()).filter(|p| !p.is_empty()),
                thumbnail: Some(thumbnail.to_string()).filter(|t| !t.is_empty()),
            },
            _ => Self::single(id),
        }
    }

    pub fn has_variants(&self) -> bool {
        self.preview.is_some() || self.thumbnail.is_some()
    }

    /// Blob id for the requested size, falling back to the full size.
    pub fn select(&self, download: DownloadType) -> &str {
        let variant = match download {
            DownloadType::Full => None,
            DownloadType::Medium => self.preview.as_deref(),
            DownloadType::Small => self.thumbnail.as_deref(),
        };
        variant.unwrap_or(&self.full)
    }

    /// Every distinct blob id, full size first.
    pub fn blob_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.full.as_str()];
        for id in [self.preview.as_deref(), self.thumbnail.as_deref()]
            .into_iter()
            .flatten()
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

impl std::fmt::Display for AttachmentIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_variants() {
            return f.write_str(&self.full);
        }
        write!(
            f,
            "{}{ID_SEPARATOR}{}{ID_SEPARATOR}{}",
            self.full,
            self.preview.as_deref().unwrap_or(&self.full),
            self.thumbnail.as_deref().unwrap_or(&self.full)
        )
    }
}

/// Resized variants of an image attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variants {
    pub preview: ResizeOutcome,
    pub thumbnail: ResizeOutcome,
}

#[derive(Debug, Clone)]
pub struct AttachmentCodec {
    crypto: CryptoService,
    resizer: ImageResizer,
    generate_previews: bool,
    preview_height: u32,
    thumbnail_height: u32,
}

impl AttachmentCodec {
    pub fn new(crypto: CryptoService, config: &AttachmentConfig) -> Self {
        Self {
            crypto,
            resizer: ImageResizer::new(config.jpeg_quality),
            generate_previews: config.generate_previews,
            preview_height: config.preview_height_px,
            thumbnail_height: config.thumbnail_height_px,
        }
    }

    pub fn encrypt(&self, attachment_key: &SymmetricKey, data: &[u8]) -> PhrResult<Vec<u8>> {
        require_attachment_key(attachment_key)?;
        self.crypto
            .encrypt(attachment_key, data)
            .map_err(|e| PhrError::encryption_caused("Failed to encrypt attachment", e))
    }

    pub fn decrypt(&self, attachment_key: &SymmetricKey, data: &[u8]) -> PhrResult<Vec<u8>> {
        require_attachment_key(attachment_key)?;
        self.crypto
            .decrypt(attachment_key, data)
            .map_err(|e| PhrError::decryption_caused("Failed to decrypt attachment", e))
    }

    /// Preview and thumbnail for a resizable image, generated in parallel.
    /// `None` when the payload is not a resizable image or previews are off.
    pub fn variants(&self, data: &[u8]) -> Option<Variants> {
        if !self.generate_previews || !mime::is_resizable(data) {
            return None;
        }
        let (preview, thumbnail) = rayon::join(
            || self.resizer.resize_to_height(data, self.preview_height),
            || self.resizer.resize_to_height(data, self.thumbnail_height),
        );
        Some(Variants { preview, thumbnail })
    }
}

fn require_attachment_key(key: &SymmetricKey) -> PhrResult<()> {
    if key.role() != KeyRole::Attachment {
        return Err(PhrError::UnsupportedOperation(format!(
            "attachments must be encrypted with the attachment key, got a {} key",
            key.role()
        )));
    }
    Ok(())
}

/// base64(SHA-1(data))
pub fn content_hash(data: &[u8]) -> String {
    STANDARD.encode(Sha1::digest(data))
}

pub fn verify_hash(data: &[u8], expected: &str) -> PhrResult<()> {
    let actual = content_hash(data);
    if actual != expected {
        return Err(PhrError::ValidationFailed(format!(
            "attachment hash mismatch: expected {expected}, computed {actual}"
        )));
    }
    Ok(())
}
