//! System tags written alongside every record

use phr_core::config::ClientConfig;
use phr_core::{PhrError, PhrResult, TagMap};
use phr_crypto::tags;

pub const TAG_CLIENT: &str = "client";
pub const TAG_PARTNER: &str = "partner";
pub const TAG_RESOURCE_TYPE: &str = "resourcetype";
pub const TAG_SCHEMA_VERSION: &str = "fhirversion";
pub const TAG_UPDATED_BY_CLIENT: &str = "updatedbyclient";

#[derive(Debug, Clone)]
pub struct TagGenerator {
    client_id: String,
    partner_id: String,
    schema_version: String,
}

impl TagGenerator {
    pub fn new(client: &ClientConfig) -> Self {
        Self {
            client_id: client.client_id.clone(),
            partner_id: client.partner_id().to_string(),
            schema_version: client.schema_version.clone(),
        }
    }

    pub fn for_create(&self, resource_type: &str) -> TagMap {
        let mut map = TagMap::new();
        insert_non_empty(&mut map, TAG_CLIENT, &self.client_id);
        insert_non_empty(&mut map, TAG_PARTNER, &self.partner_id);
        insert_non_empty(&mut map, TAG_RESOURCE_TYPE, resource_type);
        insert_non_empty(&mut map, TAG_SCHEMA_VERSION, &self.schema_version);
        map
    }

    /// Keeps the original creator tags and records the updating client.
    pub fn for_update(&self, existing: &TagMap, resource_type: &str) -> TagMap {
        let mut map = existing.clone();
        insert_non_empty(&mut map, TAG_RESOURCE_TYPE, resource_type);
        insert_non_empty(&mut map, TAG_UPDATED_BY_CLIENT, &self.client_id);
        map
    }

    /// Plaintext search tags for a resource type filter.
    pub fn for_search(&self, resource_type: Option<&str>) -> TagMap {
        let mut map = TagMap::new();
        if let Some(resource_type) = resource_type {
            insert_non_empty(&mut map, TAG_RESOURCE_TYPE, resource_type);
        }
        map
    }
}

fn insert_non_empty(map: &mut TagMap, name: &str, value: &str) {
    if !value.is_empty() {
        map.insert(name.to_string(), value.to_string());
    }
}

/// Canonical tags for `map` followed by one `custom=` tag per annotation.
pub fn tag_strings(map: &TagMap, annotations: &[String]) -> PhrResult<Vec<String>> {
    let mut strings = tags::canonicalize(map);
    for annotation in annotations {
        if annotation.is_empty() {
            return Err(PhrError::ValidationFailed(
                "annotations must not be empty".into(),
            ));
        }
        strings.push(tags::annotation_tag(annotation));
    }
    Ok(strings)
}
