//! Key material: roles, symmetric and asymmetric keys, and the key exchange format
//!
//! Every wrapped key is the encryption of its exchange form:
//! ```text
//! {"t": "ck" | "dk" | "ak" | "tk" | "apriv" | "apub",
//!  "priv": base64 PKCS#8?, "pub": base64 SPKI?, "sym": base64 raw?, "v": 1}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use phr_core::{PhrError, PhrResult};

use crate::{KEY_VERSION, SYMMETRIC_KEY_SIZE};

/// What a key is used for in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    UserIdentity,
    Common,
    Data,
    Attachment,
    Tag,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::UserIdentity => "user identity",
            KeyRole::Common => "common",
            KeyRole::Data => "data",
            KeyRole::Attachment => "attachment",
            KeyRole::Tag => "tag",
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// AES-GCM, random IV, authenticated
    Gcm,
    /// AES-CBC with PKCS#7 padding, fixed IV (tag key only)
    Cbc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricAlgorithm {
    pub mode: BlockMode,
    pub key_bits: u16,
}

impl SymmetricAlgorithm {
    pub const AES_256_GCM: Self = Self {
        mode: BlockMode::Gcm,
        key_bits: 256,
    };
    pub const AES_256_CBC: Self = Self {
        mode: BlockMode::Cbc,
        key_bits: 256,
    };

    pub fn for_role(role: KeyRole) -> Self {
        match role {
            KeyRole::Tag => Self::AES_256_CBC,
            _ => Self::AES_256_GCM,
        }
    }
}

/// A 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    role: KeyRole,
    version: u32,
    algorithm: SymmetricAlgorithm,
    bytes: [u8; SYMMETRIC_KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(role: KeyRole, bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self {
            role,
            version: KEY_VERSION,
            algorithm: SymmetricAlgorithm::for_role(role),
            bytes,
        }
    }

    pub fn from_slice(role: KeyRole, bytes: &[u8]) -> PhrResult<Self> {
        let bytes: [u8; SYMMETRIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            PhrError::key_unwrap(format!(
                "{role} key has wrong size: {} bytes (expected {SYMMETRIC_KEY_SIZE})",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(role, bytes))
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("role", &self.role)
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The user's RSA identity. Either half may be absent.
#[derive(Clone)]
pub struct AsymmetricKeyPair {
    version: u32,
    public: Option<RsaPublicKey>,
    private: Option<RsaPrivateKey>,
}

impl AsymmetricKeyPair {
    /// Full pair; the public half is derived from the private key.
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        Self {
            version: KEY_VERSION,
            public: Some(RsaPublicKey::from(&private)),
            private: Some(private),
        }
    }

    pub fn public_only(public: RsaPublicKey) -> Self {
        Self {
            version: KEY_VERSION,
            public: Some(public),
            private: None,
        }
    }

    pub fn private_only(private: RsaPrivateKey) -> Self {
        Self {
            version: KEY_VERSION,
            public: None,
            private: Some(private),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn public_key(&self) -> Option<&RsaPublicKey> {
        self.public.as_ref()
    }

    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private.as_ref()
    }

    /// SPKI DER, base64
    pub fn public_key_base64(&self) -> PhrResult<Option<String>> {
        self.public
            .as_ref()
            .map(|key| {
                key.to_public_key_der()
                    .map(|der| STANDARD.encode(der.as_bytes()))
                    .map_err(|e| PhrError::encoding_caused("encoding public key", e.to_string()))
            })
            .transpose()
    }

    /// PKCS#8 DER, base64
    pub fn private_key_base64(&self) -> PhrResult<Option<String>> {
        self.private
            .as_ref()
            .map(|key| {
                key.to_pkcs8_der()
                    .map(|der| STANDARD.encode(der.as_bytes()))
                    .map_err(|e| PhrError::encoding_caused("encoding private key", e.to_string()))
            })
            .transpose()
    }

    pub fn from_private_key_base64(encoded: &str) -> PhrResult<Self> {
        let mut der = decode_base64(encoded, "private key")?;
        let parsed = RsaPrivateKey::from_pkcs8_der(&der);
        der.zeroize();
        let private = parsed
            .map_err(|e| PhrError::key_unwrap(format!("invalid PKCS#8 private key: {e}")))?;
        Ok(Self::from_private_key(private))
    }

    pub fn from_public_key_base64(encoded: &str) -> PhrResult<Self> {
        let der = decode_base64(encoded, "public key")?;
        let public = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| PhrError::key_unwrap(format!("invalid SPKI public key: {e}")))?;
        Ok(Self::public_only(public))
    }
}

impl std::fmt::Debug for AsymmetricKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsymmetricKeyPair")
            .field("version", &self.version)
            .field("public", &self.public.is_some())
            .field("private", &self.private.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Owned key of either kind.
#[derive(Debug, Clone)]
pub enum Key {
    Asymmetric(AsymmetricKeyPair),
    Symmetric(SymmetricKey),
}

impl Key {
    pub fn role(&self) -> KeyRole {
        KeyRef::from(self).role()
    }

    pub fn version(&self) -> u32 {
        match self {
            Key::Asymmetric(pair) => pair.version(),
            Key::Symmetric(key) => key.version(),
        }
    }

    pub fn into_symmetric(self) -> PhrResult<SymmetricKey> {
        match self {
            Key::Symmetric(key) => Ok(key),
            Key::Asymmetric(_) => Err(PhrError::UnsupportedOperation(
                "expected a symmetric key, got an asymmetric key pair".into(),
            )),
        }
    }

    pub fn into_asymmetric(self) -> PhrResult<AsymmetricKeyPair> {
        match self {
            Key::Asymmetric(pair) => Ok(pair),
            Key::Symmetric(key) => Err(PhrError::UnsupportedOperation(format!(
                "expected an asymmetric key pair, got a {} key",
                key.role()
            ))),
        }
    }

    /// Parse the exchange form, checking its type against `expected`.
    pub fn from_exchange_json(json: &[u8], expected: KeyRole) -> PhrResult<Key> {
        let mut exchange: ExchangeKey = serde_json::from_slice(json)
            .map_err(|e| PhrError::key_unwrap_caused("malformed key exchange document", e))?;
        let key = exchange.to_key(expected);
        exchange.zeroize();
        key
    }
}

/// Borrowed view over either kind of key.
#[derive(Debug, Clone, Copy)]
pub enum KeyRef<'a> {
    Asymmetric(&'a AsymmetricKeyPair),
    Symmetric(&'a SymmetricKey),
}

impl KeyRef<'_> {
    pub fn role(&self) -> KeyRole {
        match self {
            KeyRef::Asymmetric(_) => KeyRole::UserIdentity,
            KeyRef::Symmetric(key) => key.role(),
        }
    }

    /// Serialize to the exchange form (the plaintext of a wrapped key).
    pub fn to_exchange_json(&self) -> PhrResult<Vec<u8>> {
        let mut exchange = match self {
            KeyRef::Symmetric(key) => ExchangeKey {
                key_type: exchange_type(key.role(), false).to_string(),
                private_key: None,
                public_key: None,
                symmetric_key: Some(STANDARD.encode(key.as_bytes())),
                version: key.version(),
            },
            KeyRef::Asymmetric(pair) => {
                let private_key = pair.private_key_base64()?;
                ExchangeKey {
                    key_type: exchange_type(KeyRole::UserIdentity, private_key.is_some())
                        .to_string(),
                    private_key,
                    public_key: pair.public_key_base64()?,
                    symmetric_key: None,
                    version: pair.version(),
                }
            }
        };
        let json = serde_json::to_vec(&exchange)
            .map_err(|e| PhrError::encoding_caused("serializing key exchange document", e));
        exchange.zeroize();
        json
    }
}

impl<'a> From<&'a Key> for KeyRef<'a> {
    fn from(key: &'a Key) -> Self {
        match key {
            Key::Asymmetric(pair) => KeyRef::Asymmetric(pair),
            Key::Symmetric(key) => KeyRef::Symmetric(key),
        }
    }
}

impl<'a> From<&'a SymmetricKey> for KeyRef<'a> {
    fn from(key: &'a SymmetricKey) -> Self {
        KeyRef::Symmetric(key)
    }
}

impl<'a> From<&'a AsymmetricKeyPair> for KeyRef<'a> {
    fn from(pair: &'a AsymmetricKeyPair) -> Self {
        KeyRef::Asymmetric(pair)
    }
}

fn exchange_type(role: KeyRole, has_private: bool) -> &'static str {
    match role {
        KeyRole::Common => "ck",
        KeyRole::Data => "dk",
        KeyRole::Attachment => "ak",
        KeyRole::Tag => "tk",
        KeyRole::UserIdentity if has_private => "apriv",
        KeyRole::UserIdentity => "apub",
    }
}

#[derive(Serialize, Deserialize)]
struct ExchangeKey {
    #[serde(rename = "t")]
    key_type: String,
    #[serde(rename = "priv", default, skip_serializing_if = "Option::is_none")]
    private_key: Option<String>,
    #[serde(rename = "pub", default, skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
    #[serde(rename = "sym", default, skip_serializing_if = "Option::is_none")]
    symmetric_key: Option<String>,
    #[serde(rename = "v")]
    version: u32,
}

impl ExchangeKey {
    fn to_key(&self, expected: KeyRole) -> PhrResult<Key> {
        let type_matches = match expected {
            KeyRole::UserIdentity => matches!(self.key_type.as_str(), "apriv" | "apub"),
            role => self.key_type == exchange_type(role, false),
        };
        if !type_matches {
            return Err(PhrError::key_unwrap(format!(
                "expected a {expected} key, found type '{}'",
                self.key_type
            )));
        }
        if self.version != KEY_VERSION {
            return Err(PhrError::key_unwrap(format!(
                "unsupported key version {}",
                self.version
            )));
        }

        if expected == KeyRole::UserIdentity {
            return match (&self.private_key, &self.public_key) {
                (Some(private), _) => AsymmetricKeyPair::from_private_key_base64(private),
                (None, Some(public)) => AsymmetricKeyPair::from_public_key_base64(public),
                (None, None) => Err(PhrError::key_unwrap("key pair document has no key material")),
            }
            .map(Key::Asymmetric);
        }

        let encoded = self
            .symmetric_key
            .as_deref()
            .ok_or_else(|| PhrError::key_unwrap(format!("{expected} key document has no key material")))?;
        let mut raw = decode_base64(encoded, "symmetric key")?;
        let key = SymmetricKey::from_slice(expected, &raw);
        raw.zeroize();
        key.map(Key::Symmetric)
    }

    fn zeroize(&mut self) {
        if let Some(s) = self.private_key.as_mut() {
            s.zeroize();
        }
        if let Some(s) = self.symmetric_key.as_mut() {
            s.zeroize();
        }
    }
}

fn decode_base64(encoded: &str, what: &str) -> PhrResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| PhrError::key_unwrap_caused(format!("{what} is not valid base64"), e))
}
