//! phr-core: shared types for the encrypted health-record pipeline
//!
//! - `types`: the server wire record, login key bundle, and constants that
//!   must stay stable for already-stored records
//! - `error`: the failure taxonomy returned by every phr crate
//! - `config`: `phr.toml` schema
//! - `logging`: subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{load_config, PhrConfig};
pub use error::{BoxError, PhrError, PhrResult};
pub use types::{DateRange, KeyBundle, TagMap, WireRecord, DEFAULT_COMMON_KEY_ID, MODEL_VERSION};
