//! Bounded concurrency for upstream reads.
//!
//! Each leaf query holds one permit for its whole retry loop. Composite
//! sections never hold a permit while waiting on children, so arbitrarily
//! nested fan-out cannot starve the pool.

use crate::error::{ReportError, Result};
use crate::retry::{retry_async, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared by every adapter within one report run.
#[derive(Debug, Clone)]
pub struct FetchPool {
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    size: usize,
}

impl FetchPool {
    pub fn new(concurrency: usize, retry: RetryPolicy) -> Self {
        let size = concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            retry,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run one upstream read under a permit, with retries.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ReportError::unavailable("fetch pool", "pool closed"))?;

        retry_async(&self.retry, operation_name, operation).await
    }
}
