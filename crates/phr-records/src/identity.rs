//! Identity service collaborator

use async_trait::async_trait;

use phr_core::{KeyBundle, PhrResult};

/// Hands out the wrapped key material of the logged-in user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current common key and tag key, wrapped (see [`KeyBundle`]).
    async fn key_bundle(&self) -> PhrResult<KeyBundle>;

    /// An older common key, wrapped under the user's public key (base64).
    async fn fetch_common_key(&self, common_key_id: &str) -> PhrResult<String>;
}
