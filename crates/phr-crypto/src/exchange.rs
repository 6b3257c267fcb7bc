//! Installing the common key and tag key from a login key bundle
//!
//! After a rotation the new common key arrives wrapped under the previous
//! common key; otherwise it is wrapped under the user's public key. When a
//! previous common key is cached and the bundle names a different id, the
//! symmetric unwrap is tried first and the private-key unwrap second.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use phr_core::{KeyBundle, PhrError, PhrResult, DEFAULT_COMMON_KEY_ID};

use crate::keyring::KeyRing;
use crate::keys::{KeyRole, SymmetricKey};
use crate::service::CryptoService;

/// Which key an unwrap attempt used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapPath {
    /// Previous common key
    Symmetric,
    /// User private key
    Asymmetric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub common_key_id: String,
    /// Unwrap attempts for the common key, in order. Empty when the key was
    /// already cached.
    pub attempts: Vec<UnwrapPath>,
    /// True when a different common key was current before this exchange.
    pub rotated: bool,
}

pub struct KeyExchange<'a> {
    crypto: &'a CryptoService,
    keyring: &'a KeyRing,
}

impl<'a> KeyExchange<'a> {
    pub fn new(crypto: &'a CryptoService, keyring: &'a KeyRing) -> Self {
        Self { crypto, keyring }
    }

    /// Unwrap and install the bundle's common key and tag key.
    pub fn install(&self, bundle: &KeyBundle) -> PhrResult<ExchangeOutcome> {
        let common_key_id = bundle
            .common_key_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_COMMON_KEY_ID)
            .to_string();

        let previous = self.keyring.current_common_key();
        let rotated = previous
            .as_ref()
            .is_some_and(|(previous_id, _)| *previous_id != common_key_id);

        let mut attempts = Vec::new();
        let common_key = match self.keyring.common_key(&common_key_id) {
            Some(cached) => {
                tracing::debug!(common_key_id = %common_key_id, "common key already cached");
                cached
            }
            None => {
                let material = decode_wrapped(&bundle.common_key_wrapped, "common key")?;
                let previous_key = previous.as_ref().map(|(_, key)| key.as_ref());
                Arc::new(self.unwrap_common_key(&material, previous_key, &mut attempts)?)
            }
        };

        // Nothing touches the ring until both keys unwrapped.
        let tag_material = decode_wrapped(&bundle.tag_key_wrapped, "tag key")?;
        let tag_key = self
            .crypto
            .unwrap(&tag_material, common_key.as_ref(), KeyRole::Tag)?
            .into_symmetric()?;
        self.keyring.switch_common_key(&common_key_id, common_key, tag_key)?;

        tracing::info!(
            common_key_id = %common_key_id,
            rotated,
            attempts = attempts.len(),
            "installed common key"
        );
        Ok(ExchangeOutcome {
            common_key_id,
            attempts,
            rotated,
        })
    }

    /// Unwrap a common key referenced by a record but not yet cached. Such
    /// keys are always wrapped under the user's public key.
    pub fn import_common_key(&self, id: &str, wrapped: &str) -> PhrResult<Arc<SymmetricKey>> {
        if let Some(cached) = self.keyring.common_key(id) {
            return Ok(cached);
        }
        let material = decode_wrapped(wrapped, "common key")?;
        let pair = self
            .keyring
            .user_key_pair()
            .ok_or_else(|| PhrError::key_missing("user identity", None))?;
        let key = self
            .crypto
            .unwrap(&material, pair.as_ref(), KeyRole::Common)?
            .into_symmetric()?;
        tracing::debug!(common_key_id = %id, "imported common key");
        self.keyring.insert_common_key(id, key)
    }

    fn unwrap_common_key(
        &self,
        material: &[u8],
        previous: Option<&SymmetricKey>,
        attempts: &mut Vec<UnwrapPath>,
    ) -> PhrResult<SymmetricKey> {
        let pair = self
            .keyring
            .user_key_pair()
            .filter(|pair| pair.private_key().is_some());

        let Some(previous) = previous else {
            let pair = pair.ok_or_else(|| PhrError::key_missing("user private", None))?;
            attempts.push(UnwrapPath::Asymmetric);
            return self
                .crypto
                .unwrap(material, pair.as_ref(), KeyRole::Common)?
                .into_symmetric();
        };

        attempts.push(UnwrapPath::Symmetric);
        let symmetric_err = match self.crypto.unwrap(material, previous, KeyRole::Common) {
            Ok(key) => return key.into_symmetric(),
            Err(e) => e,
        };

        let Some(pair) = pair else {
            return Err(symmetric_err);
        };
        tracing::debug!("common key not wrapped under previous common key, trying private key");
        attempts.push(UnwrapPath::Asymmetric);
        match self.crypto.unwrap(material, pair.as_ref(), KeyRole::Common) {
            Ok(key) => key.into_symmetric(),
            Err(asymmetric_err) => {
                tracing::warn!(error = %asymmetric_err, "private key unwrap also failed");
                Err(symmetric_err)
            }
        }
    }
}

fn decode_wrapped(encoded: &str, what: &str) -> PhrResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| PhrError::key_unwrap_caused(format!("wrapped {what} is not valid base64"), e))
}
