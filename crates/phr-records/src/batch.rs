//! Batch execution with per-item success/failure accounting
//!
//! Items are independent: a failure is recorded next to its input and the
//! batch carries on. Nothing is rolled back. Both result lists keep input
//! order.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use phr_core::{PhrError, PhrResult};

#[derive(Debug)]
pub struct BatchResult<I, O, E = PhrError> {
    pub successful: Vec<O>,
    pub failed: Vec<(I, E)>,
}

impl<I, O, E> Default for BatchResult<I, O, E> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<I, O, E> BatchResult<I, O, E> {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&mut self, input: I, result: Result<O, E>) {
        match result {
            Ok(output) => self.successful.push(output),
            Err(e) => self.failed.push((input, e)),
        }
    }
}

/// Await `fut`, failing with a transport error once `limit` has passed.
pub(crate) async fn with_deadline<O>(
    limit: Option<Duration>,
    fut: impl Future<Output = PhrResult<O>>,
) -> PhrResult<O> {
    let Some(limit) = limit else {
        return fut.await;
    };
    tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
        Err(PhrError::transport(format!(
            "item timed out after {}s",
            limit.as_secs_f64()
        )))
    })
}

/// Run `op` over `items` with at most `concurrency` in flight. An item that
/// exceeds `timeout` fails alone with a transport error.
pub(crate) async fn run_batch<I, O, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    timeout: Option<Duration>,
    op: F,
) -> BatchResult<I, O>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = PhrResult<O>>,
{
    let total = items.len();
    let results: Vec<(I, PhrResult<O>)> = stream::iter(items)
        .map(|item| {
            let fut = op(item.clone());
            async move { (item, with_deadline(timeout, fut).await) }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut batch = BatchResult::default();
    for (item, result) in results {
        batch.push(item, result);
    }
    tracing::debug!(
        total,
        successful = batch.successful.len(),
        failed = batch.failed.len(),
        "batch finished"
    );
    batch
}
