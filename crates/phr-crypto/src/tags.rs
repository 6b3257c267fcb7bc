//! Searchable tags
//!
//! A tag is the canonical string `name=value`. Tags are encrypted one by one
//! with the tag key (deterministic AES-CBC) and base64-encoded, so that the
//! same plaintext tag always produces the same server-side string and the
//! server can match search tags without seeing them.
//!
//! Free-text annotations are carried as `custom=<text>` tags and are kept
//! separate from the name/value map because several may share the name.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use phr_core::{PhrError, PhrResult, TagMap};

use crate::deterministic;
use crate::keys::{KeyRole, SymmetricKey};

/// Tag name under which annotations are stored.
pub const ANNOTATION_TAG: &str = "custom";

const SEPARATOR: char = '=';

pub fn canonical(name: &str, value: &str) -> String {
    format!("{name}{SEPARATOR}{value}")
}

pub fn annotation_tag(text: &str) -> String {
    canonical(ANNOTATION_TAG, text)
}

/// Canonical strings for every entry of `tags`, in name order.
pub fn canonicalize(tags: &TagMap) -> Vec<String> {
    tags.iter().map(|(name, value)| canonical(name, value)).collect()
}

/// Split a canonical tag at its first `=`. Entries with no `=`, an empty
/// name or an empty value are not tags.
pub fn split_tag(tag: &str) -> Option<(&str, &str)> {
    let (name, value) = tag.split_once(SEPARATOR)?;
    (!name.is_empty() && !value.is_empty()).then_some((name, value))
}

/// Parse canonical tags into a map. Malformed entries are dropped and later
/// entries win on duplicate names.
pub fn parse<I, S>(tags: I) -> TagMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|tag| {
            split_tag(tag.as_ref()).map(|(name, value)| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse canonical tags, returning the name/value map and the annotation
/// texts (in input order) separately.
pub fn split_annotations<I, S>(tags: I) -> (TagMap, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = TagMap::new();
    let mut annotations = Vec::new();
    for tag in tags {
        let Some((name, value)) = split_tag(tag.as_ref()) else {
            continue;
        };
        if name == ANNOTATION_TAG {
            annotations.push(value.to_string());
        } else {
            map.insert(name.to_string(), value.to_string());
        }
    }
    (map, annotations)
}

pub fn encrypt_tag(tag_key: &SymmetricKey, tag: &str) -> PhrResult<String> {
    require_tag_key(tag_key)?;
    let ciphertext = deterministic::encrypt(tag_key, tag.as_bytes())
        .map_err(|e| PhrError::encryption_caused("tag encryption failed", e))?;
    Ok(STANDARD.encode(ciphertext))
}

pub fn decrypt_tag(tag_key: &SymmetricKey, encrypted: &str) -> PhrResult<String> {
    require_tag_key(tag_key)?;
    let ciphertext = STANDARD
        .decode(encrypted)
        .map_err(|e| PhrError::decryption_caused("encrypted tag is not valid base64", e))?;
    let plaintext = deterministic::decrypt(tag_key, &ciphertext)
        .map_err(|e| PhrError::decryption_caused("tag decryption failed", e))?;
    String::from_utf8(plaintext)
        .map_err(|e| PhrError::decryption_caused("decrypted tag is not UTF-8", e))
}

pub fn encrypt_tags<S: AsRef<str>>(tag_key: &SymmetricKey, tags: &[S]) -> PhrResult<Vec<String>> {
    tags.iter()
        .map(|tag| encrypt_tag(tag_key, tag.as_ref()))
        .collect()
}

pub fn decrypt_tags<S: AsRef<str>>(tag_key: &SymmetricKey, encrypted: &[S]) -> PhrResult<Vec<String>> {
    encrypted
        .iter()
        .map(|tag| decrypt_tag(tag_key, tag.as_ref()))
        .collect()
}

fn require_tag_key(key: &SymmetricKey) -> PhrResult<()> {
    if key.role() != KeyRole::Tag {
        return Err(PhrError::UnsupportedOperation(format!(
            "tags must be encrypted with the tag key, got a {} key",
            key.role()
        )));
    }
    Ok(())
}
