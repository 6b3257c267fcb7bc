use thiserror::Error;

pub type PhrResult<T> = Result<T, PhrError>;

/// Boxed underlying cause carried by the error taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure taxonomy shared by every phr crate.
///
/// Messages identify the failing step or item. They never contain key bytes
/// or record plaintext; the proximate cause is kept in the `source()` chain.
#[derive(Debug, Error)]
pub enum PhrError {
    #[error("key generation failed: {message}")]
    KeyGenerationFailed {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("key unwrap failed: {message}")]
    KeyUnwrapFailed {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("{message}")]
    EncryptionFailed {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("{message}")]
    DecryptionFailed {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("{message}")]
    EncodingFailed {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("transport failed: {message}")]
    TransportFailed {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("no {role} key available{}", key_id_suffix(.id))]
    KeyMissing { role: String, id: Option<String> },

    #[error("model version {found} is not supported (highest supported: {supported})")]
    ModelVersionNotSupported { found: u32, supported: u32 },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("secure storage error: {0}")]
    SecureStorage(String),

    #[error("config error: {0}")]
    Config(String),
}

fn key_id_suffix(id: &Option<String>) -> String {
    id.as_deref()
        .map(|id| format!(" for id {id}"))
        .unwrap_or_default()
}

impl PhrError {
    pub fn key_generation(message: impl Into<String>) -> Self {
        PhrError::KeyGenerationFailed {
            message: message.into(),
            cause: None,
        }
    }

    pub fn key_unwrap(message: impl Into<String>) -> Self {
        PhrError::KeyUnwrapFailed {
            message: message.into(),
            cause: None,
        }
    }

    pub fn key_unwrap_caused(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        PhrError::KeyUnwrapFailed {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn encryption(message: impl Into<String>) -> Self {
        PhrError::EncryptionFailed {
            message: message.into(),
            cause: None,
        }
    }

    pub fn encryption_caused(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        PhrError::EncryptionFailed {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        PhrError::DecryptionFailed {
            message: message.into(),
            cause: None,
        }
    }

    pub fn decryption_caused(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        PhrError::DecryptionFailed {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn encoding_caused(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        PhrError::EncodingFailed {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        PhrError::TransportFailed {
            message: message.into(),
            cause: None,
        }
    }

    pub fn transport_caused(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        PhrError::TransportFailed {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn key_missing(role: impl Into<String>, id: Option<&str>) -> Self {
        PhrError::KeyMissing {
            role: role.into(),
            id: id.map(str::to_string),
        }
    }

    /// Only transport failures may succeed when retried with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PhrError::TransportFailed { .. })
    }
}
