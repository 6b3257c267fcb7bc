//! phr-attachments: attachment encryption, content sniffing and image variants
//!
//! # Overview
//! - `mime`: magic-number sniffing (JPEG, PNG, TIFF, PDF, DICOM)
//! - `resize`: power-of-two downsample factor and JPEG re-encoding
//! - `codec`: encryption with the attachment key, SHA-1 integrity hashes,
//!   preview/thumbnail generation and composite attachment ids

pub mod codec;
pub mod mime;
pub mod resize;

pub use codec::{content_hash, verify_hash, AttachmentCodec, AttachmentIds, DownloadType, Variants};
pub use mime::{is_resizable, sniff, MimeType};
pub use resize::{compute_downsample_factor, Downsample, ImageResizer, ResizeOutcome};
