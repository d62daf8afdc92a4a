//! Persisted row types for the XRP Ledger.

use indexer_core::{ChainBlock, Entity};
use sqlx::query_builder::Separated;
use sqlx::Postgres;

/// One validated XRP ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpBlock {
    /// Lowercase hex ledger hash.
    pub hash: String,
    /// Ledger index.
    pub block_number: u64,
    /// Unix seconds (close time shifted from the XRP epoch).
    pub timestamp: u64,
    /// Number of transactions in the ledger.
    pub transactions: u64,
}

impl ChainBlock for XrpBlock {
    fn block_number(&self) -> u64 {
        self.block_number
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl Entity for XrpBlock {
    const TABLE: &'static str = "xrp_blocks";
    const COLUMNS: &'static [&'static str] = &["hash", "block_number", "timestamp", "transactions"];
    const MIGRATIONS: &'static [&'static str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS xrp_blocks (
            hash VARCHAR(64) PRIMARY KEY,
            block_number BIGINT NOT NULL,
            timestamp BIGINT NOT NULL,
            transactions BIGINT NOT NULL DEFAULT 0
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_xrp_blocks_block_number ON xrp_blocks (block_number)",
        "CREATE INDEX IF NOT EXISTS idx_xrp_blocks_timestamp ON xrp_blocks (timestamp)",
    ];

    fn push_tuple(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.hash.clone())
            .push_bind(self.block_number as i64)
            .push_bind(self.timestamp as i64)
            .push_bind(self.transactions as i64);
    }
}

/// One transaction of a validated ledger, with the verifier-facing derived
/// fields alongside the raw node response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpTransaction {
    /// Lowercase hex transaction hash.
    pub hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    /// Lowercase 64-char hex, or empty when the payment carries no usable
    /// memo.
    pub payment_reference: String,
    /// The raw transaction JSON as returned by the node.
    pub response: String,
    pub is_native_payment: bool,
    /// Lowercase 64-char hex merkle root over spending accounts, or empty.
    pub source_addresses_root: String,
}

impl Entity for XrpTransaction {
    const TABLE: &'static str = "xrp_transactions";
    const COLUMNS: &'static [&'static str] = &[
        "hash",
        "block_number",
        "timestamp",
        "payment_reference",
        "response",
        "is_native_payment",
        "source_addresses_root",
    ];
    const MIGRATIONS: &'static [&'static str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS xrp_transactions (
            hash VARCHAR(64) PRIMARY KEY,
            block_number BIGINT NOT NULL,
            timestamp BIGINT NOT NULL,
            payment_reference VARCHAR(64) NOT NULL DEFAULT '',
            response TEXT NOT NULL DEFAULT '',
            is_native_payment BOOLEAN NOT NULL DEFAULT FALSE,
            source_addresses_root VARCHAR(64) NOT NULL DEFAULT ''
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_xrp_transactions_block_number ON xrp_transactions (block_number)",
        "CREATE INDEX IF NOT EXISTS idx_xrp_transactions_timestamp ON xrp_transactions (timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_xrp_transactions_block_number_hash ON xrp_transactions (block_number, hash)",
    ];

    fn push_tuple(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.hash.clone())
            .push_bind(self.block_number as i64)
            .push_bind(self.timestamp as i64)
            .push_bind(self.payment_reference.clone())
            .push_bind(self.response.clone())
            .push_bind(self.is_native_payment)
            .push_bind(self.source_addresses_root.clone());
    }
}
