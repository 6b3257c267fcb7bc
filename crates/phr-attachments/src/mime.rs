//! Content sniffing by magic number
//!
//! Only exact signatures at their registered offsets count. A buffer too
//! short to hold a signature does not match it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    Jpeg,
    Png,
    Tiff,
    Pdf,
    Dicom,
    Unknown,
}

impl MimeType {
    pub fn content_type(&self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Tiff => "image/tiff",
            MimeType::Pdf => "application/pdf",
            MimeType::Dicom => "application/dicom",
            MimeType::Unknown => "application/octet-stream",
        }
    }

    /// Whether previews and thumbnails can be generated.
    pub fn is_resizable(&self) -> bool {
        matches!(self, MimeType::Jpeg | MimeType::Png)
    }
}

struct Signature {
    mime: MimeType,
    offset: usize,
    magic: &'static [u8],
}

const SIGNATURES: &[Signature] = &[
    Signature { mime: MimeType::Jpeg, offset: 0, magic: &[0xFF, 0xD8, 0xFF, 0xDB] },
    Signature { mime: MimeType::Jpeg, offset: 0, magic: &[0xFF, 0xD8, 0xFF, 0xE0] },
    Signature { mime: MimeType::Jpeg, offset: 0, magic: &[0xFF, 0xD8, 0xFF, 0xE1] },
    Signature { mime: MimeType::Jpeg, offset: 0, magic: &[0xFF, 0xD8, 0xFF, 0xEE] },
    Signature {
        mime: MimeType::Png,
        offset: 0,
        magic: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
    },
    Signature { mime: MimeType::Tiff, offset: 0, magic: &[0x49, 0x49, 0x2A, 0x00] },
    Signature { mime: MimeType::Tiff, offset: 0, magic: &[0x4D, 0x4D, 0x00, 0x2A] },
    Signature { mime: MimeType::Pdf, offset: 0, magic: b"%PDF-" },
    Signature { mime: MimeType::Dicom, offset: 128, magic: b"DICM" },
];

pub fn sniff(data: &[u8]) -> MimeType {
    SIGNATURES
        .iter()
        .find(|sig| {
            data.get(sig.offset..sig.offset + sig.magic.len())
                .is_some_and(|window| window == sig.magic)
        })
        .map_or(MimeType::Unknown, |sig| sig.mime)
}

pub fn is_resizable(data: &[u8]) -> bool {
    sniff(data).is_resizable()
}
