//! Key generation, wrapping and bulk encryption
//!
//! Wrapping encrypts a key's exchange form under another key: RSA-OAEP
//! (SHA-256, MGF1-SHA-256) when the wrapping key is the user key pair,
//! AES-256-GCM when it is a common key.

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use zeroize::Zeroize;

use phr_core::{PhrError, PhrResult};

use crate::keys::{AsymmetricKeyPair, BlockMode, Key, KeyRef, KeyRole, SymmetricKey};
use crate::{aead, deterministic, RSA_KEY_BITS, SYMMETRIC_KEY_SIZE};

/// Stateless cryptographic operations. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct CryptoService {
    rsa_key_bits: usize,
}

impl Default for CryptoService {
    fn default() -> Self {
        Self::new(RSA_KEY_BITS)
    }
}

impl CryptoService {
    pub fn new(rsa_key_bits: usize) -> Self {
        Self { rsa_key_bits }
    }

    pub fn rsa_key_bits(&self) -> usize {
        self.rsa_key_bits
    }

    /// Generate a fresh RSA user key pair.
    pub fn generate_key_pair(&self) -> PhrResult<AsymmetricKeyPair> {
        let private = RsaPrivateKey::new(&mut OsRng, self.rsa_key_bits).map_err(|e| {
            PhrError::KeyGenerationFailed {
                message: format!("RSA-{} key pair", self.rsa_key_bits),
                cause: Some(Box::new(e)),
            }
        })?;
        tracing::debug!(bits = self.rsa_key_bits, "generated user key pair");
        Ok(AsymmetricKeyPair::from_private_key(private))
    }

    /// Generate a fresh 256-bit key for `role`.
    pub fn generate_symmetric_key(&self, role: KeyRole) -> PhrResult<SymmetricKey> {
        if role == KeyRole::UserIdentity {
            return Err(PhrError::key_generation(
                "user identity keys are asymmetric; use generate_key_pair",
            ));
        }
        let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| PhrError::KeyGenerationFailed {
                message: format!("{role} key"),
                cause: Some(Box::new(e)),
            })?;
        let key = SymmetricKey::from_bytes(role, bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Wrap `key` under `wrapping_key`. The key to wrap is serialized to its
    /// exchange form first.
    pub fn wrap<'a, 'b>(
        &self,
        key: impl Into<KeyRef<'a>>,
        wrapping_key: impl Into<KeyRef<'b>>,
    ) -> PhrResult<Vec<u8>> {
        let key = key.into();
        let wrapping_key = wrapping_key.into();
        if let KeyRef::Symmetric(wrapping) = wrapping_key {
            require_gcm(wrapping, "wrap keys")?;
        }
        let mut exchange = key.to_exchange_json()?;
        let wrapped = match wrapping_key {
            KeyRef::Asymmetric(pair) => rsa_encrypt(pair, &exchange),
            KeyRef::Symmetric(wrapping) => aead::seal(wrapping, &exchange),
        };
        exchange.zeroize();
        wrapped.map_err(|e| PhrError::EncryptionFailed {
            message: format!("wrapping {} key", key.role()),
            cause: Some(Box::new(e)),
        })
    }

    /// Unwrap `material` with `wrapping_key` and check that the result is a
    /// key of the `expected` role.
    pub fn unwrap<'a>(
        &self,
        material: &[u8],
        wrapping_key: impl Into<KeyRef<'a>>,
        expected: KeyRole,
    ) -> PhrResult<Key> {
        let plaintext = match wrapping_key.into() {
            KeyRef::Asymmetric(pair) => rsa_decrypt(pair, material),
            KeyRef::Symmetric(wrapping) => {
                require_gcm(wrapping, "unwrap keys")?;
                aead::open(wrapping, material)
            }
        };
        let mut plaintext = plaintext.map_err(|e| {
            PhrError::key_unwrap_caused(format!("decrypting wrapped {expected} key"), e)
        })?;
        let key = Key::from_exchange_json(&plaintext, expected);
        plaintext.zeroize();
        key
    }

    /// Encrypt with a symmetric key (GCM or deterministic CBC, by the key's
    /// algorithm) or with the public half of a key pair.
    pub fn encrypt<'a>(&self, key: impl Into<KeyRef<'a>>, plaintext: &[u8]) -> PhrResult<Vec<u8>> {
        match key.into() {
            KeyRef::Symmetric(key) => match key.algorithm().mode {
                BlockMode::Gcm => aead::seal(key, plaintext),
                BlockMode::Cbc => deterministic::encrypt(key, plaintext),
            },
            KeyRef::Asymmetric(pair) => rsa_encrypt(pair, plaintext),
        }
    }

    pub fn decrypt<'a>(&self, key: impl Into<KeyRef<'a>>, ciphertext: &[u8]) -> PhrResult<Vec<u8>> {
        match key.into() {
            KeyRef::Symmetric(key) => match key.algorithm().mode {
                BlockMode::Gcm => aead::open(key, ciphertext),
                BlockMode::Cbc => deterministic::decrypt(key, ciphertext),
            },
            KeyRef::Asymmetric(pair) => rsa_decrypt(pair, ciphertext),
        }
    }
}

fn require_gcm(key: &SymmetricKey, purpose: &str) -> PhrResult<()> {
    if key.algorithm().mode != BlockMode::Gcm {
        return Err(PhrError::UnsupportedOperation(format!(
            "{} keys cannot be used to {purpose}",
            key.role()
        )));
    }
    Ok(())
}

fn rsa_encrypt(pair: &AsymmetricKeyPair, plaintext: &[u8]) -> PhrResult<Vec<u8>> {
    let public = pair
        .public_key()
        .ok_or_else(|| PhrError::key_missing("user public", None))?;
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| PhrError::encryption_caused("RSA-OAEP encryption failed", e))
}

fn rsa_decrypt(pair: &AsymmetricKeyPair, ciphertext: &[u8]) -> PhrResult<Vec<u8>> {
    let private = pair
        .private_key()
        .ok_or_else(|| PhrError::key_missing("user private", None))?;
    private
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| PhrError::decryption_caused("RSA-OAEP decryption failed", e))
}
