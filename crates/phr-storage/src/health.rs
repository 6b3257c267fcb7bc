//! Storage health check

use opendal::Operator;

use phr_core::{PhrError, PhrResult};

/// Verify the storage endpoint is reachable by listing the record prefix
pub async fn check_health(op: &Operator, prefix: &str) -> PhrResult<()> {
    let prefix = prefix.trim_matches('/');
    let path = if prefix.is_empty() {
        "/".to_string()
    } else {
        format!("{prefix}/")
    };
    match op.list(&path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PhrError::transport_caused("storage health check failed", e)),
    }
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator, prefix: &str) -> bool {
    check_health(op, prefix).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_is_healthy() {
        let op = crate::build_memory_operator().unwrap();
        assert!(is_healthy(&op, "phr").await);
        assert!(check_health(&op, "").await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_health() {
        let transport = crate::OperatorTransport::in_memory("phr").unwrap();
        assert!(transport.check_health().await.is_ok());
    }
}
