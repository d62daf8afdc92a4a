//! Chain-agnostic ledger indexing framework.
//!
//! Continuously mirrors a blockchain's validated history into Postgres so
//! downstream verifiers can query blocks and transactions without touching a
//! node. A chain integration supplies a [`ChainClient`] implementation plus
//! block/transaction row types; the framework owns the engine loop, the
//! reliability layer, the durable state model and history pruning.
//!
//! # Architecture
//!
//! - **Engine**: single driver loop — refresh chain head, fetch the next
//!   confirmed range concurrently, persist atomically.
//! - **Reliability**: per-request timeouts plus layered exponential backoff;
//!   transient failures are survived indefinitely, malformed data is not.
//! - **History drop**: optional background pruning that keeps only the
//!   configured retention window and repositions the start cursor.

pub mod bootstrap;
pub mod build_info;
pub mod chain;
pub mod config;
pub mod database;
pub mod entities;
pub mod error;
pub mod indexer;
pub mod logging;
pub mod merkle;
pub mod reliable;
pub mod retry;

pub use chain::{BlockInfo, BlockResult, ChainClient};
pub use config::{BaseConfig, ChainConfig};
pub use database::Database;
pub use entities::{ChainBlock, Entity, State, Version};
pub use error::{IndexerError, Result};
pub use indexer::Indexer;
pub use reliable::ReliableClient;
