//! AES-256-CBC with a fixed all-zero IV, used only for tags
//!
//! Deterministic encryption (same plaintext + key = same ciphertext) is required
//! for tags because the server matches encrypted search tags byte-for-byte
//! against the encrypted tags stored with each record.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use phr_core::{PhrError, PhrResult};

use crate::keys::SymmetricKey;
use crate::TAG_IV;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> PhrResult<Vec<u8>> {
    let cipher = Encryptor::new(key.as_bytes().into(), (&TAG_IV).into());
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> PhrResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % TAG_IV.len() != 0 {
        return Err(PhrError::decryption(format!(
            "AES-CBC ciphertext length {} is not a positive multiple of the block size",
            ciphertext.len()
        )));
    }
    let cipher = Decryptor::new(key.as_bytes().into(), (&TAG_IV).into());
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| PhrError::decryption("AES-CBC decryption failed: wrong key or bad padding"))
}
