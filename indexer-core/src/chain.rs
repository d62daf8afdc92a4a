//! The per-chain client abstraction consumed by the engine.

use async_trait::async_trait;

use crate::error::Result;

/// Head-of-chain summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_number: u64,
    pub timestamp: u64,
}

/// One fully fetched block with its transactions.
#[derive(Debug, Clone)]
pub struct BlockResult<B, T> {
    pub block: B,
    pub transactions: Vec<T>,
}

/// Chain adapter contract. All calls must be safe to invoke concurrently.
/// `get_block_result` may only return fully validated ledgers and fails with
/// `IndexerError::NotValidated` otherwise.
#[async_trait]
pub trait ChainClient<B, T>: Send + Sync + 'static {
    async fn get_latest_block_info(&self) -> Result<BlockInfo>;

    async fn get_block_result(&self, block_number: u64) -> Result<BlockResult<B, T>>;

    async fn get_block_timestamp(&self, block_number: u64) -> Result<u64>;

    async fn get_server_info(&self) -> Result<String>;
}
