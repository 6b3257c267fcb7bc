//! In-memory key cache for one logged-in user
//!
//! Holds the user key pair, every common key seen so far (by id), the id of
//! the current common key, and the tag key. Readers take cheap `Arc` clones;
//! writers hold the lock only for the map update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use phr_core::{PhrError, PhrResult};

use crate::keys::{AsymmetricKeyPair, KeyRole, SymmetricKey};

#[derive(Default)]
struct KeyRingState {
    user_key_pair: Option<Arc<AsymmetricKeyPair>>,
    common_keys: HashMap<String, Arc<SymmetricKey>>,
    current_common_key_id: Option<String>,
    tag_key: Option<Arc<SymmetricKey>>,
}

#[derive(Default)]
pub struct KeyRing {
    state: RwLock<KeyRingState>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user_key_pair(&self, pair: AsymmetricKeyPair) {
        self.state.write().user_key_pair = Some(Arc::new(pair));
    }

    pub fn user_key_pair(&self) -> Option<Arc<AsymmetricKeyPair>> {
        self.state.read().user_key_pair.clone()
    }

    /// Cache a common key under `id` without making it current.
    pub fn insert_common_key(&self, id: &str, key: SymmetricKey) -> PhrResult<Arc<SymmetricKey>> {
        expect_role(&key, KeyRole::Common)?;
        let key = Arc::new(key);
        self.state
            .write()
            .common_keys
            .insert(id.to_string(), Arc::clone(&key));
        Ok(key)
    }

    pub fn common_key(&self, id: &str) -> Option<Arc<SymmetricKey>> {
        self.state.read().common_keys.get(id).cloned()
    }

    pub fn current_common_key(&self) -> Option<(String, Arc<SymmetricKey>)> {
        let state = self.state.read();
        let id = state.current_common_key_id.as_ref()?;
        let key = state.common_keys.get(id)?;
        Some((id.clone(), Arc::clone(key)))
    }

    pub fn require_current_common_key(&self) -> PhrResult<(String, Arc<SymmetricKey>)> {
        self.current_common_key()
            .ok_or_else(|| PhrError::key_missing("current common", None))
    }

    /// Cache `common` under `id`, make it current and replace the tag key,
    /// all under one write lock. Readers never see the new common key paired
    /// with the old tag key.
    pub fn switch_common_key(
        &self,
        id: &str,
        common: Arc<SymmetricKey>,
        tag_key: SymmetricKey,
    ) -> PhrResult<()> {
        expect_role(&common, KeyRole::Common)?;
        expect_role(&tag_key, KeyRole::Tag)?;
        let mut state = self.state.write();
        state.common_keys.insert(id.to_string(), common);
        state.current_common_key_id = Some(id.to_string());
        state.tag_key = Some(Arc::new(tag_key));
        Ok(())
    }

    pub fn tag_key(&self) -> Option<Arc<SymmetricKey>> {
        self.state.read().tag_key.clone()
    }

    pub fn require_tag_key(&self) -> PhrResult<Arc<SymmetricKey>> {
        self.tag_key().ok_or_else(|| PhrError::key_missing("tag", None))
    }

    pub fn common_key_count(&self) -> usize {
        self.state.read().common_keys.len()
    }

    /// Drop every cached key.
    pub fn clear(&self) {
        *self.state.write() = KeyRingState::default();
        tracing::debug!("key ring cleared");
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("KeyRing")
            .field("user_key_pair", &state.user_key_pair.is_some())
            .field("common_keys", &state.common_keys.len())
            .field("current_common_key_id", &state.current_common_key_id)
            .field("tag_key", &state.tag_key.is_some())
            .finish()
    }
}

fn expect_role(key: &SymmetricKey, role: KeyRole) -> PhrResult<()> {
    if key.role() != role {
        return Err(PhrError::UnsupportedOperation(format!(
            "expected a {role} key, got a {} key",
            key.role()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SYMMETRIC_KEY_SIZE;

    fn key(role: KeyRole, byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes(role, [byte; SYMMETRIC_KEY_SIZE])
    }

    #[test]
    fn test_current_common_key() {
        let ring = KeyRing::new();
        assert!(ring.current_common_key().is_none());

        ring.insert_common_key("a", key(KeyRole::Common, 1)).unwrap();
        assert!(ring.current_common_key().is_none());

        let cached = ring.common_key("a").unwrap();
        ring.switch_common_key("a", cached, key(KeyRole::Tag, 9)).unwrap();
        let (id, current) = ring.current_common_key().unwrap();
        assert_eq!(id, "a");
        assert_eq!(current.as_bytes()[0], 1);
    }

    #[test]
    fn test_old_common_keys_stay_cached() {
        let ring = KeyRing::new();
        ring.insert_common_key("a", key(KeyRole::Common, 1)).unwrap();
        ring.switch_common_key("b", Arc::new(key(KeyRole::Common, 2)), key(KeyRole::Tag, 3))
            .unwrap();

        assert_eq!(ring.common_key("a").unwrap().as_bytes()[0], 1);
        assert_eq!(ring.common_key_count(), 2);
    }

    #[test]
    fn test_role_checked() {
        let ring = KeyRing::new();
        assert!(ring.insert_common_key("a", key(KeyRole::Data, 1)).is_err());
        assert!(ring
            .switch_common_key("a", Arc::new(key(KeyRole::Tag, 1)), key(KeyRole::Tag, 1))
            .is_err());
    }

    #[test]
    fn test_switch_common_key_replaces_tag_key() {
        let ring = KeyRing::new();
        ring.switch_common_key("a", Arc::new(key(KeyRole::Common, 1)), key(KeyRole::Tag, 7))
            .unwrap();
        ring.switch_common_key("b", Arc::new(key(KeyRole::Common, 2)), key(KeyRole::Tag, 8))
            .unwrap();

        assert_eq!(ring.require_current_common_key().unwrap().0, "b");
        assert_eq!(ring.require_tag_key().unwrap().as_bytes()[0], 8);
        assert_eq!(ring.common_key_count(), 2);
    }

    #[test]
    fn test_switch_common_key_rejects_wrong_role_untouched() {
        let ring = KeyRing::new();
        let err = ring
            .switch_common_key("a", Arc::new(key(KeyRole::Common, 1)), key(KeyRole::Data, 2))
            .unwrap_err();
        assert!(matches!(err, PhrError::UnsupportedOperation(_)));
        assert!(ring.current_common_key().is_none());
        assert_eq!(ring.common_key_count(), 0);
    }

    #[test]
    fn test_clear() {
        let ring = KeyRing::new();
        ring.switch_common_key("a", Arc::new(key(KeyRole::Common, 1)), key(KeyRole::Tag, 2))
            .unwrap();

        ring.clear();
        assert!(ring.require_current_common_key().is_err());
        assert!(ring.require_tag_key().is_err());
        assert_eq!(ring.common_key_count(), 0);
    }
}
