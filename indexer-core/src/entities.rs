//! Durable framework rows and the traits chain-specific rows implement.

use sqlx::query_builder::Separated;
use sqlx::Postgres;

/// Row id of the singleton `states` row.
pub const GLOBAL_STATE_ID: u64 = 1;
/// Row id of the singleton `versions` row.
pub const GLOBAL_VERSION_ID: u64 = 1;

/// Indexing progress cursor. A single row with id 1; zero values mean
/// "not yet set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct State {
    #[sqlx(try_from = "i64")]
    pub id: u64,
    #[sqlx(try_from = "i64")]
    pub last_chain_block_number: u64,
    #[sqlx(try_from = "i64")]
    pub last_chain_block_timestamp: u64,
    #[sqlx(try_from = "i64")]
    pub last_indexed_block_number: u64,
    #[sqlx(try_from = "i64")]
    pub last_indexed_block_timestamp: u64,
    #[sqlx(try_from = "i64")]
    pub first_indexed_block_number: u64,
    #[sqlx(try_from = "i64")]
    pub first_indexed_block_timestamp: u64,
    #[sqlx(try_from = "i64")]
    pub last_indexed_block_updated: u64,
    #[sqlx(try_from = "i64")]
    pub last_chain_block_updated: u64,
    #[sqlx(try_from = "i64")]
    pub last_history_drop: u64,
}

impl State {
    /// The zero-valued state used before the first persist.
    pub fn initial() -> Self {
        State {
            id: GLOBAL_STATE_ID,
            ..Default::default()
        }
    }
}

/// Build and deployment metadata, overwritten once per process start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    pub id: u64,
    pub node_version: String,
    pub git_tag: String,
    pub git_hash: String,
    pub build_date: u64,
    pub num_confirmations: u64,
    pub history_seconds: u64,
}

impl Version {
    pub fn initial() -> Self {
        Version {
            id: GLOBAL_VERSION_ID,
            ..Default::default()
        }
    }
}

/// The two capabilities the engine needs from a chain's block row.
pub trait ChainBlock: Clone + Send + Sync + Unpin + 'static {
    fn block_number(&self) -> u64;
    fn timestamp(&self) -> u64;
}

/// A row type the store can migrate and bulk-insert. `MIGRATIONS` holds
/// idempotent DDL statements (table plus indexes); `push_tuple` binds one
/// row into a bulk `INSERT INTO TABLE (COLUMNS) VALUES ...`.
pub trait Entity: Clone + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    const MIGRATIONS: &'static [&'static str];

    fn push_tuple(&self, row: &mut Separated<'_, '_, Postgres, &'static str>);
}
