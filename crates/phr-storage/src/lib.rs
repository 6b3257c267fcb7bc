//! phr-storage: record transport trait + OpenDAL-backed implementation

pub mod health;
pub mod operator;
pub mod store;
pub mod transport;

pub use health::{check_health, is_healthy};
pub use operator::{build_memory_operator, build_s3_operator, S3Credentials};
pub use store::OperatorTransport;
pub use transport::{RecordTransport, SearchQuery};
