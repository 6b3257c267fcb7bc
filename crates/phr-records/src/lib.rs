//! phr-records: end-to-end encrypted health records
//!
//! A [`RecordPipeline`] turns domain resources into encrypted wire records
//! and back. It needs a logged-in [`ClientContext`] (key ring, identity
//! service, secure storage) and a [`phr_storage::RecordTransport`].
//!
//! ```text
//! resource ──serialize──► body ──AES-GCM(data key)──► encrypted_body
//! data key ──wrap(common key)──► encrypted_key
//! tags ──canonicalize──► name=value ──AES-CBC(tag key)──► encrypted_tags
//! ```

pub mod batch;
pub mod context;
pub mod identity;
pub mod pipeline;
pub mod record;
pub mod resource;
pub mod tagging;

pub use batch::BatchResult;
pub use context::ClientContext;
pub use identity::IdentityProvider;
pub use pipeline::RecordPipeline;
pub use record::{DecryptedRecord, Record, RecordMeta, RecordQuery};
pub use resource::{Attachment, JsonSerializer, Resource, ResourceCodec, ResourceSerializer};
pub use tagging::TagGenerator;

pub use phr_attachments::DownloadType;
