//! AES-256-GCM envelope used for record bodies, attachments and symmetric key wrapping
//!
//! Envelope format (binary):
//! ```text
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use phr_core::{PhrError, PhrResult};

use crate::keys::SymmetricKey;
use crate::{GCM_IV_SIZE, GCM_TAG_SIZE};

/// Encrypt `plaintext` under `key` with a fresh random IV.
///
/// Returns: `[12-byte IV][ciphertext][16-byte tag]`
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> PhrResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut iv = [0u8; GCM_IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| PhrError::encryption(format!("AES-GCM encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(GCM_IV_SIZE + ciphertext.len());
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt an envelope produced by [`seal`].
pub fn open(key: &SymmetricKey, envelope: &[u8]) -> PhrResult<Vec<u8>> {
    if envelope.len() < GCM_IV_SIZE + GCM_TAG_SIZE {
        return Err(PhrError::decryption(format!(
            "AES-GCM envelope too short: {} bytes (minimum {})",
            envelope.len(),
            GCM_IV_SIZE + GCM_TAG_SIZE
        )));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let (iv, ciphertext) = envelope.split_at(GCM_IV_SIZE);

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| PhrError::decryption("AES-GCM decryption failed: wrong key or corrupted data"))
}
