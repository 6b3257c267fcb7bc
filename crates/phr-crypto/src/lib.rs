//! phr-crypto: client-side encryption for personal health records
//!
//! Every record gets a fresh data key; the body is sealed with it and the
//! data key travels with the record, wrapped under the current common key.
//!
//! Key hierarchy:
//! ```text
//! User Key Pair (RSA-2048, OAEP SHA-256)
//!   └── Common Key (256-bit, versioned by id, wrapped by user public key
//!       │           or by the previous common key after a rotation)
//!       ├── Data Key (per-record, AES-256-GCM, wrapped by common key)
//!       ├── Attachment Key (per-record, AES-256-GCM, wrapped by common key)
//!       └── Tag Key (per-user, AES-256-CBC zero IV, wrapped by common key)
//! ```

pub mod aead;
pub mod deterministic;
pub mod exchange;
pub mod keyring;
pub mod keys;
pub mod service;
pub mod tags;

pub use exchange::{ExchangeOutcome, KeyExchange, UnwrapPath};
pub use keyring::KeyRing;
pub use keys::{
    AsymmetricKeyPair, BlockMode, Key, KeyRef, KeyRole, SymmetricAlgorithm, SymmetricKey,
};
pub use service::CryptoService;

/// Size of a symmetric key in bytes (256-bit)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const GCM_IV_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const GCM_TAG_SIZE: usize = 16;

/// Fixed IV for deterministic tag encryption
pub const TAG_IV: [u8; 16] = [0u8; 16];

/// Default RSA modulus size for user key pairs
pub const RSA_KEY_BITS: usize = 2048;

/// Version written into every key exchange document
pub const KEY_VERSION: u32 = 1;
