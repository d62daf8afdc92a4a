use indexer_core::ChainConfig;
use serde::Deserialize;

/// The `[blockchain]` section for the XRP adapter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct XrpConfig {
    /// JSON-RPC endpoint of an XRP Ledger node.
    pub url: String,
}

impl ChainConfig for XrpConfig {}
