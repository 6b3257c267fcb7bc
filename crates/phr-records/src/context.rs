//! Per-session client state
//!
//! One `ClientContext` per logged-in user. It owns the key ring and talks to
//! the identity service and secure storage; there is no process-wide state.

use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use phr_core::{PhrConfig, PhrError, PhrResult};
use phr_crypto::{
    AsymmetricKeyPair, CryptoService, ExchangeOutcome, KeyExchange, KeyRing, SymmetricKey,
};
use phr_secrets::{names, SecureStorage};

use crate::identity::IdentityProvider;

pub struct ClientContext {
    config: PhrConfig,
    crypto: CryptoService,
    keyring: KeyRing,
    storage: Arc<dyn SecureStorage>,
    identity: Arc<dyn IdentityProvider>,
    user_id: RwLock<Option<String>>,
}

impl ClientContext {
    pub fn new(
        config: PhrConfig,
        storage: Arc<dyn SecureStorage>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            crypto: CryptoService::new(config.crypto.rsa_key_bits),
            config,
            keyring: KeyRing::new(),
            storage,
            identity,
            user_id: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PhrConfig {
        &self.config
    }

    pub fn crypto(&self) -> &CryptoService {
        &self.crypto
    }

    pub fn keyring(&self) -> &KeyRing {
        &self.keyring
    }

    /// Generate a user key pair, persist the private key and return the
    /// pair so the public key can be registered.
    pub fn generate_user_key_pair(&self) -> PhrResult<AsymmetricKeyPair> {
        let pair = self.crypto.generate_key_pair()?;
        self.install_user_key_pair(pair.clone())?;
        Ok(pair)
    }

    /// Persist a key pair's private key and make the pair current.
    pub fn install_user_key_pair(&self, pair: AsymmetricKeyPair) -> PhrResult<()> {
        let private = pair
            .private_key_base64()?
            .ok_or_else(|| PhrError::key_missing("user private", None))?;
        self.storage
            .set_secret(names::USER_PRIVATE_KEY, &SecretString::from(private))?;
        self.keyring.set_user_key_pair(pair);
        Ok(())
    }

    /// Load the user key pair from secure storage. Returns false when none
    /// is stored.
    pub fn restore_user_key_pair(&self) -> PhrResult<bool> {
        let Some(private) = self.storage.get_secret(names::USER_PRIVATE_KEY)? else {
            return Ok(false);
        };
        let pair = AsymmetricKeyPair::from_private_key_base64(private.expose_secret())?;
        self.keyring.set_user_key_pair(pair);
        debug!("restored user key pair from secure storage");
        Ok(true)
    }

    /// Fetch the key bundle and install the common key and tag key.
    pub async fn login(&self) -> PhrResult<ExchangeOutcome> {
        if self.keyring.user_key_pair().is_none() && !self.restore_user_key_pair()? {
            return Err(PhrError::key_missing("user identity", None));
        }

        let bundle = self.identity.key_bundle().await?;
        let outcome = KeyExchange::new(&self.crypto, &self.keyring).install(&bundle)?;

        self.storage
            .set_secret(names::USER_ID, &SecretString::from(bundle.user_id.clone()))?;
        self.storage.set_secret(
            names::COMMON_KEY_ID,
            &SecretString::from(outcome.common_key_id.clone()),
        )?;
        *self.user_id.write() = Some(bundle.user_id);

        info!(
            common_key_id = %outcome.common_key_id,
            rotated = outcome.rotated,
            "logged in"
        );
        Ok(outcome)
    }

    /// Drop every cached key and clear secure storage.
    pub fn logout(&self) -> PhrResult<()> {
        self.keyring.clear();
        *self.user_id.write() = None;
        self.storage.clear()?;
        info!("logged out");
        Ok(())
    }

    pub fn user_id(&self) -> PhrResult<String> {
        self.user_id
            .read()
            .clone()
            .ok_or_else(|| PhrError::UnsupportedOperation("no user is logged in".into()))
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.read().is_some()
    }

    /// The common key for `id`, fetching and unwrapping it from the identity
    /// service when it is not cached.
    pub async fn resolve_common_key(&self, id: &str) -> PhrResult<Arc<SymmetricKey>> {
        if let Some(key) = self.keyring.common_key(id) {
            return Ok(key);
        }
        debug!(common_key_id = %id, "common key not cached, fetching");
        let wrapped = self.identity.fetch_common_key(id).await?;
        KeyExchange::new(&self.crypto, &self.keyring).import_common_key(id, &wrapped)
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("client_id", &self.config.client.client_id)
            .field("user_id", &*self.user_id.read())
            .field("keyring", &self.keyring)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use phr_core::KeyBundle;
    use phr_secrets::MemoryStorage;

    struct OfflineIdentity;

    #[async_trait]
    impl IdentityProvider for OfflineIdentity {
        async fn key_bundle(&self) -> PhrResult<KeyBundle> {
            Err(PhrError::transport("identity service offline"))
        }

        async fn fetch_common_key(&self, _common_key_id: &str) -> PhrResult<String> {
            Err(PhrError::transport("identity service offline"))
        }
    }

    fn context(storage: Arc<MemoryStorage>) -> ClientContext {
        ClientContext::new(PhrConfig::default(), storage, Arc::new(OfflineIdentity))
    }

    #[test]
    fn test_user_id_requires_login() {
        let ctx = context(Arc::new(MemoryStorage::new()));
        assert!(!ctx.is_logged_in());
        assert!(matches!(
            ctx.user_id().unwrap_err(),
            PhrError::UnsupportedOperation(_)
        ));
    }

    #[test]
    fn test_restore_without_stored_key() {
        let ctx = context(Arc::new(MemoryStorage::new()));
        assert!(!ctx.restore_user_key_pair().unwrap());
        assert!(ctx.keyring().user_key_pair().is_none());
    }

    #[tokio::test]
    async fn test_login_without_key_pair() {
        let ctx = context(Arc::new(MemoryStorage::new()));
        let err = ctx.login().await.unwrap_err();
        assert!(matches!(err, PhrError::KeyMissing { .. }));
    }

    #[tokio::test]
    async fn test_unknown_common_key_goes_to_identity_service() {
        let ctx = context(Arc::new(MemoryStorage::new()));
        let err = ctx.resolve_common_key("ck-old").await.unwrap_err();
        assert!(matches!(err, PhrError::TransportFailed { .. }));
    }

    #[test]
    fn test_logout_clears_secure_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_secret(names::USER_ID, &SecretString::from("user-1".to_string()))
            .unwrap();
        let ctx = context(storage.clone());
        ctx.logout().unwrap();
        assert!(storage.is_empty());
        assert!(!ctx.is_logged_in());
    }
}
