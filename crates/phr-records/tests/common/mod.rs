#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use phr_core::{KeyBundle, PhrConfig, PhrError, PhrResult};
use phr_crypto::{AsymmetricKeyPair, CryptoService, KeyRole, SymmetricKey};
use phr_records::{Attachment, ClientContext, IdentityProvider, RecordPipeline, Resource};
use phr_secrets::MemoryStorage;
use phr_storage::OperatorTransport;

pub const USER_ID: &str = "user-1";

pub fn user_pair() -> &'static AsymmetricKeyPair {
    static PAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| CryptoService::default().generate_key_pair().unwrap())
}

// ── Resources ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub resource_type: String,
    pub status: String,
    pub code: String,
    pub value: f64,
}

impl Observation {
    pub fn new(code: &str, value: f64) -> Self {
        Self {
            resource_type: "Observation".into(),
            status: "final".into(),
            code: code.into(),
            value,
        }
    }
}

impl Resource for Observation {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub resource_type: String,
    pub description: String,
    #[serde(default)]
    pub content: Vec<Attachment>,
}

impl DocumentReference {
    pub fn new(description: &str, content: Vec<Attachment>) -> Self {
        Self {
            resource_type: "DocumentReference".into(),
            description: description.into(),
            content,
        }
    }
}

impl Resource for DocumentReference {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn attachments(&self) -> Vec<&Attachment> {
        self.content.iter().collect()
    }

    fn attachments_mut(&mut self) -> Vec<&mut Attachment> {
        self.content.iter_mut().collect()
    }
}

pub fn attachment(payload: &[u8]) -> Attachment {
    Attachment {
        data: Some(STANDARD.encode(payload)),
        title: Some("scan".into()),
        ..Default::default()
    }
}

// ── Identity service ─────────────────────────────────────────────────────

struct IdentityState {
    public: AsymmetricKeyPair,
    common_keys: HashMap<String, SymmetricKey>,
    current: String,
    previous: Option<String>,
    tag_key: SymmetricKey,
}

/// In-process identity service. After [`FakeIdentity::rotate`] the bundle
/// wraps the new common key under the previous one, like the server does
/// for devices that already hold it.
#[derive(Clone)]
pub struct FakeIdentity {
    state: Arc<Mutex<IdentityState>>,
    crypto: CryptoService,
    wrap_under_previous: bool,
}

impl FakeIdentity {
    pub fn new(pair: &AsymmetricKeyPair, common_key_id: &str) -> Self {
        let crypto = CryptoService::default();
        let public = pair.public_key_base64().unwrap().unwrap();
        let mut common_keys = HashMap::new();
        common_keys.insert(
            common_key_id.to_string(),
            crypto.generate_symmetric_key(KeyRole::Common).unwrap(),
        );
        Self {
            state: Arc::new(Mutex::new(IdentityState {
                public: AsymmetricKeyPair::from_public_key_base64(&public).unwrap(),
                common_keys,
                current: common_key_id.to_string(),
                previous: None,
                tag_key: crypto.generate_symmetric_key(KeyRole::Tag).unwrap(),
            })),
            crypto,
            wrap_under_previous: true,
        }
    }

    /// The same account seen from a device that holds no common key yet.
    pub fn for_new_device(&self) -> Self {
        Self {
            wrap_under_previous: false,
            ..self.clone()
        }
    }

    pub fn rotate(&self, new_id: &str) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let key = self.crypto.generate_symmetric_key(KeyRole::Common).unwrap();
        state.common_keys.insert(new_id.to_string(), key);
        state.previous = Some(std::mem::replace(&mut state.current, new_id.to_string()));
    }

    pub fn common_key(&self, id: &str) -> SymmetricKey {
        self.state.lock().unwrap().common_keys[id].clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn key_bundle(&self) -> PhrResult<KeyBundle> {
        let state = self.state.lock().unwrap();
        let common = &state.common_keys[&state.current];
        let wrapped_common = match state.previous.as_ref().filter(|_| self.wrap_under_previous) {
            Some(previous) => self.crypto.wrap(common, &state.common_keys[previous])?,
            None => self.crypto.wrap(common, &state.public)?,
        };
        Ok(KeyBundle {
            user_id: USER_ID.into(),
            common_key_id: Some(state.current.clone()),
            common_key_wrapped: STANDARD.encode(wrapped_common),
            tag_key_wrapped: STANDARD.encode(self.crypto.wrap(&state.tag_key, common)?),
        })
    }

    async fn fetch_common_key(&self, common_key_id: &str) -> PhrResult<String> {
        let state = self.state.lock().unwrap();
        let key = state
            .common_keys
            .get(common_key_id)
            .ok_or_else(|| PhrError::transport(format!("unknown common key {common_key_id}")))?;
        Ok(STANDARD.encode(self.crypto.wrap(key, &state.public)?))
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

pub fn test_config() -> PhrConfig {
    let mut config = PhrConfig::default();
    config.client.client_id = "acme#tests".into();
    config.pipeline.batch_concurrency = 2;
    config.attachments.preview_height_px = 64;
    config.attachments.thumbnail_height_px = 16;
    config
}

pub fn memory_transport() -> Arc<OperatorTransport> {
    Arc::new(OperatorTransport::in_memory("phr").expect("memory transport"))
}

pub struct Device {
    pub ctx: Arc<ClientContext>,
    pub pipeline: RecordPipeline<OperatorTransport>,
}

/// A logged-in device of `USER_ID` talking to `identity` and `transport`.
pub async fn device(identity: FakeIdentity, transport: Arc<OperatorTransport>) -> Device {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = Arc::new(ClientContext::new(test_config(), storage, Arc::new(identity)));
    ctx.install_user_key_pair(user_pair().clone()).unwrap();
    ctx.login().await.unwrap();
    Device {
        pipeline: RecordPipeline::new(ctx.clone(), transport),
        ctx,
    }
}

pub async fn single_device() -> (Device, FakeIdentity, Arc<OperatorTransport>) {
    let identity = FakeIdentity::new(user_pair(), "ck-1");
    let transport = memory_transport();
    let device = device(identity.clone(), transport.clone()).await;
    (device, identity, transport)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
