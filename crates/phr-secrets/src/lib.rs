//! phr-secrets: secure storage for the user's private key and session metadata
//!
//! Unwrapped common, data and tag keys never reach secure storage; they live
//! in the in-memory key ring only.

pub mod keychain;
pub mod memory;

pub use keychain::KeychainStorage;
pub use memory::MemoryStorage;

use phr_core::PhrResult;
use secrecy::SecretString;

/// Platform secret store.
pub trait SecureStorage: Send + Sync {
    fn get_secret(&self, name: &str) -> PhrResult<Option<SecretString>>;

    fn set_secret(&self, name: &str, value: &SecretString) -> PhrResult<()>;

    fn delete_secret(&self, name: &str) -> PhrResult<()>;

    /// Remove every well-known entry.
    fn clear(&self) -> PhrResult<()> {
        for name in names::ALL {
            self.delete_secret(name)?;
        }
        Ok(())
    }
}

/// Well-known secure storage entry names
pub mod names {
    /// The user's RSA private key (PKCS#8 DER, base64)
    pub const USER_PRIVATE_KEY: &str = "user-private-key";
    /// Id of the logged-in user
    pub const USER_ID: &str = "user-id";
    /// Current common key id
    pub const COMMON_KEY_ID: &str = "common-key-id";

    pub const ALL: &[&str] = &[USER_PRIVATE_KEY, USER_ID, COMMON_KEY_ID];
}
