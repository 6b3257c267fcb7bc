use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PhrError, PhrResult};

/// Top-level client configuration (loaded from phr.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhrConfig {
    pub client: ClientConfig,
    pub crypto: CryptoConfig,
    pub pipeline: PipelineConfig,
    pub attachments: AttachmentConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// OAuth client id, `<partner>#<platform>`
    pub client_id: String,
    /// Resource schema version written into the `fhirversion` tag
    pub schema_version: String,
}

impl ClientConfig {
    /// The partner id is the part of the client id before the first `#`.
    pub fn partner_id(&self) -> &str {
        self.client_id
            .split_once('#')
            .map_or(self.client_id.as_str(), |(partner, _)| partner)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// RSA modulus size for newly generated user key pairs (default: 2048)
    pub rsa_key_bits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max records processed concurrently in a batch (0 = cpu_count)
    pub batch_concurrency: usize,
    /// Per-item deadline in seconds for batch items (0 = none)
    pub item_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn effective_concurrency(&self) -> usize {
        if self.batch_concurrency > 0 {
            return self.batch_concurrency;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn item_timeout(&self) -> Option<std::time::Duration> {
        (self.item_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.item_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Generate preview/thumbnail variants for JPEG and PNG attachments
    pub generate_previews: bool,
    /// Preview target height in pixels (default: 1000)
    pub preview_height_px: u32,
    /// Thumbnail target height in pixels (default: 200)
    pub thumbnail_height_px: u32,
    /// JPEG quality for re-encoded variants, 1-100 (default: 80)
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint for the storage-backed transport
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Key prefix under which records and attachments are stored
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            schema_version: "3.0.1".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self { rsa_key_bits: 2048 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 0,
            item_timeout_secs: 60,
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            generate_previews: true,
            preview_height_px: 1000,
            thumbnail_height_px: 200,
            jpeg_quality: 80,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "phr".into(),
            prefix: "phr".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Load configuration from a TOML file, using defaults when it does not exist.
pub fn load_config(path: &Path) -> PhrResult<PhrConfig> {
    if !path.exists() {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
        return Ok(PhrConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| PhrError::Config(format!("reading config {}: {e}", path.display())))?;
    let config: PhrConfig = toml::from_str(&content)
        .map_err(|e| PhrError::Config(format!("parsing config {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

impl PhrConfig {
    pub fn validate(&self) -> PhrResult<()> {
        if !(1..=100).contains(&self.attachments.jpeg_quality) {
            return Err(PhrError::Config(format!(
                "attachments.jpeg_quality must be within 1..=100, got {}",
                self.attachments.jpeg_quality
            )));
        }
        if self.crypto.rsa_key_bits < 2048 {
            return Err(PhrError::Config(format!(
                "crypto.rsa_key_bits must be at least 2048, got {}",
                self.crypto.rsa_key_bits
            )));
        }
        Ok(())
    }
}
