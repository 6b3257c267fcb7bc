//! Domain resources and their encrypted body
//!
//! The body of a record is the canonical serialization of its resource,
//! encrypted with the record's data key. The default serializer emits JSON
//! with lexicographically sorted object keys.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use phr_core::{BoxError, PhrError, PhrResult};
use phr_crypto::{CryptoService, KeyRole, SymmetricKey};

const ENCRYPT_FAILED: &str = "Failed to encrypt resource";
const DECRYPT_FAILED: &str = "Failed to decrypt resource";

/// A resource that can be stored as a record.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Value of the `resourceType` discriminator, also written to the
    /// `resourcetype` tag.
    fn resource_type(&self) -> &str;

    fn attachments(&self) -> Vec<&Attachment> {
        Vec::new()
    }

    fn attachments_mut(&mut self) -> Vec<&mut Attachment> {
        Vec::new()
    }
}

/// Binary content embedded in a resource. `data` is base64 and only present
/// while uploading or after a download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// base64(SHA-1) of the full-size payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Turns a resource into body bytes and back.
pub trait ResourceSerializer<R>: Send + Sync {
    fn serialize(&self, resource: &R) -> Result<Vec<u8>, BoxError>;

    /// `type_hint` is the record's `resourcetype` tag; empty when absent.
    fn deserialize(&self, bytes: &[u8], type_hint: &str) -> Result<R, BoxError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<R: Resource> ResourceSerializer<R> for JsonSerializer {
    fn serialize(&self, resource: &R) -> Result<Vec<u8>, BoxError> {
        let value = sort_keys(serde_json::to_value(resource)?);
        Ok(serde_json::to_vec(&value)?)
    }

    fn deserialize(&self, bytes: &[u8], type_hint: &str) -> Result<R, BoxError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if !type_hint.is_empty() {
            let found = value.get("resourceType").and_then(|t| t.as_str());
            if found != Some(type_hint) {
                return Err(Box::new(PhrError::ValidationFailed(format!(
                    "expected resourceType {type_hint}, found {}",
                    found.unwrap_or("none")
                ))));
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Rebuild every object with its keys in lexicographic order.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct ResourceCodec<S = JsonSerializer> {
    crypto: CryptoService,
    serializer: S,
}

impl ResourceCodec<JsonSerializer> {
    pub fn new(crypto: CryptoService) -> Self {
        Self::with_serializer(crypto, JsonSerializer)
    }
}

impl<S> ResourceCodec<S> {
    pub fn with_serializer(crypto: CryptoService, serializer: S) -> Self {
        Self { crypto, serializer }
    }

    /// Serialize then encrypt with the data key.
    pub fn encrypt_resource<R>(&self, data_key: &SymmetricKey, resource: &R) -> PhrResult<Vec<u8>>
    where
        S: ResourceSerializer<R>,
    {
        let mut plaintext =
            self.serializer
                .serialize(resource)
                .map_err(|cause| PhrError::EncodingFailed {
                    message: ENCRYPT_FAILED.into(),
                    cause: Some(cause),
                })?;
        let sealed = require_data_key(data_key)
            .and_then(|()| self.crypto.encrypt(data_key, &plaintext))
            .map_err(|e| PhrError::encryption_caused(ENCRYPT_FAILED, e));
        plaintext.zeroize();
        sealed
    }

    /// Decrypt with the data key, then deserialize into the hinted type.
    pub fn decrypt_resource<R>(
        &self,
        data_key: &SymmetricKey,
        type_hint: &str,
        ciphertext: &[u8],
    ) -> PhrResult<R>
    where
        S: ResourceSerializer<R>,
    {
        let mut plaintext = require_data_key(data_key)
            .and_then(|()| self.crypto.decrypt(data_key, ciphertext))
            .map_err(|e| PhrError::decryption_caused(DECRYPT_FAILED, e))?;
        let resource = self
            .serializer
            .deserialize(&plaintext, type_hint)
            .map_err(|cause| PhrError::DecryptionFailed {
                message: DECRYPT_FAILED.into(),
                cause: Some(cause),
            });
        plaintext.zeroize();
        resource
    }
}

fn require_data_key(key: &SymmetricKey) -> PhrResult<()> {
    if key.role() != KeyRole::Data {
        return Err(PhrError::UnsupportedOperation(format!(
            "resources must be encrypted with a data key, got a {} key",
            key.role()
        )));
    }
    Ok(())
}
