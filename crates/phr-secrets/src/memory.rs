//! Process-local secure storage for tests and ephemeral sessions

use std::collections::HashMap;

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use phr_core::PhrResult;

use crate::SecureStorage;

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        let mut names: Vec<&String> = entries.keys().collect();
        names.sort();
        f.debug_struct("MemoryStorage").field("names", &names).finish()
    }
}

impl SecureStorage for MemoryStorage {
    fn get_secret(&self, name: &str) -> PhrResult<Option<SecretString>> {
        Ok(self
            .entries
            .lock()
            .get(name)
            .map(|value| SecretString::from(value.as_str().to_string())))
    }

    fn set_secret(&self, name: &str, value: &SecretString) -> PhrResult<()> {
        self.entries.lock().insert(
            name.to_string(),
            Zeroizing::new(value.expose_secret().to_string()),
        );
        Ok(())
    }

    fn delete_secret(&self, name: &str) -> PhrResult<()> {
        self.entries.lock().remove(name);
        Ok(())
    }
}
