//! Platform keychain storage.
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use phr_core::{PhrError, PhrResult};

use crate::SecureStorage;

const DEFAULT_SERVICE: &str = "phr";

/// Entries are stored under `service`, one per secret name. Use a distinct
/// service per client id so that two apps on one device do not collide.
#[derive(Debug, Clone)]
pub struct KeychainStorage {
    service: String,
}

impl Default for KeychainStorage {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl KeychainStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn for_client(client_id: &str) -> Self {
        Self::new(format!("{DEFAULT_SERVICE}.{client_id}"))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Check if the platform keychain is available.
    pub fn is_available(&self) -> bool {
        keyring::Entry::new(&self.service, "__phr_probe__").is_ok()
    }

    fn entry(&self, name: &str) -> PhrResult<keyring::Entry> {
        keyring::Entry::new(&self.service, name)
            .map_err(|e| PhrError::SecureStorage(format!("keychain entry creation: {e}")))
    }
}

impl SecureStorage for KeychainStorage {
    fn get_secret(&self, name: &str) -> PhrResult<Option<SecretString>> {
        match self.entry(name)?.get_password() {
            Ok(mut password) => {
                let secret = SecretString::from(password.clone());
                password.zeroize();
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(PhrError::SecureStorage(format!(
                "keychain get for '{name}': {e}"
            ))),
        }
    }

    fn set_secret(&self, name: &str, value: &SecretString) -> PhrResult<()> {
        self.entry(name)?
            .set_password(value.expose_secret())
            .map_err(|e| PhrError::SecureStorage(format!("keychain store for '{name}': {e}")))?;
        tracing::debug!(service = %self.service, key = name, "stored secret in platform keychain");
        Ok(())
    }

    fn delete_secret(&self, name: &str) -> PhrResult<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(service = %self.service, key = name, "deleted secret from platform keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(PhrError::SecureStorage(format!(
                "keychain delete for '{name}': {e}"
            ))),
        }
    }
}
