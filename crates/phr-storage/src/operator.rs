//! Building the OpenDAL operator behind [`crate::OperatorTransport`]

use anyhow::{Context, Result};
use opendal::layers::{LoggingLayer, RetryLayer};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

use phr_core::config::StorageConfig;

/// Access keys for the S3 record store. The secret half never shows up in
/// `Debug` output.
#[derive(Debug)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl S3Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
        }
    }
}

/// S3 operator for `storage`, with retries and request logging.
///
/// Plaintext `http://` endpoints are refused when `enforce_tls` is set and
/// only warned about otherwise.
pub fn build_s3_operator(storage: &StorageConfig, credentials: &S3Credentials) -> Result<Operator> {
    check_endpoint(storage)?;

    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&credentials.access_key_id)
        .secret_access_key(credentials.secret_access_key.expose_secret());

    Ok(Operator::new(builder)
        .with_context(|| format!("configuring S3 bucket {}", storage.bucket))?
        .layer(LoggingLayer::default())
        .layer(RetryLayer::new().with_max_times(3).with_jitter())
        .finish())
}

pub fn build_memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("configuring in-memory storage")?
        .finish())
}

fn check_endpoint(storage: &StorageConfig) -> Result<()> {
    if !storage.endpoint.starts_with("http://") {
        return Ok(());
    }
    anyhow::ensure!(
        !storage.enforce_tls,
        "storage endpoint {} is plaintext HTTP but storage.enforce_tls is set",
        storage.endpoint
    );
    tracing::warn!(
        endpoint = %storage.endpoint,
        "record storage endpoint is plaintext HTTP; records are encrypted but metadata is not"
    );
    Ok(())
}
