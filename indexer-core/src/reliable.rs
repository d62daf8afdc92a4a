//! Reliability decorator over a [`ChainClient`]: every call runs under a
//! per-request timeout and is retried with exponential backoff until the
//! configured elapsed-time budget runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::{BlockInfo, BlockResult, ChainClient};
use crate::entities::{ChainBlock, Entity};
use crate::error::{IndexerError, Result};
use crate::retry::{retry, RetryConfig};

pub struct ReliableClient<C> {
    inner: Arc<C>,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl<C> Clone for ReliableClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            request_timeout: self.request_timeout,
            retry: self.retry.clone(),
        }
    }
}

impl<C> ReliableClient<C> {
    pub fn new(client: C, max_elapsed: Duration, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(client),
            request_timeout,
            retry: RetryConfig::with_max_elapsed(Some(max_elapsed)),
        }
    }

    /// Bound a single attempt by the request timeout; expiry is a retryable
    /// failure like any other.
    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .unwrap_or(Err(IndexerError::Timeout))
    }
}

#[async_trait]
impl<B, T, C> ChainClient<B, T> for ReliableClient<C>
where
    B: ChainBlock,
    T: Entity,
    C: ChainClient<B, T>,
{
    async fn get_latest_block_info(&self) -> Result<BlockInfo> {
        retry(&self.retry, "get_latest_block_info", || {
            self.bounded(self.inner.get_latest_block_info())
        })
        .await
    }

    async fn get_block_result(&self, block_number: u64) -> Result<BlockResult<B, T>> {
        retry(&self.retry, "get_block_result", || {
            self.bounded(self.inner.get_block_result(block_number))
        })
        .await
    }

    async fn get_block_timestamp(&self, block_number: u64) -> Result<u64> {
        retry(&self.retry, "get_block_timestamp", || {
            self.bounded(self.inner.get_block_timestamp(block_number))
        })
        .await
    }

    async fn get_server_info(&self) -> Result<String> {
        retry(&self.retry, "get_server_info", || {
            self.bounded(self.inner.get_server_info())
        })
        .await
    }
}
