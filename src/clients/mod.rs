pub mod howrare;
pub mod solana;

pub use howrare::HowRareClient;
pub use solana::SolanaRpcClient;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::types::NftAttribute;

/// Failure talking to an external provider: unreachable, non-2xx, or a body
/// we could not make sense of. Always recoverable; callers decide whether to
/// abort (sync) or fall back to cached state (reconciliation).
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed upstream payload: {0}")]
    Malformed(String),
    #[error("RPC error: {0}")]
    Rpc(String),
}

/// One item of collection metadata as returned by the rarity provider.
/// `mint` is optional because the provider occasionally ships entries
/// without an identifier; the sync engine skips those.
#[derive(Debug, Clone)]
pub struct CollectionItem {
    pub mint: Option<String>,
    pub name: String,
    pub rank: Option<i32>,
    pub image_url: Option<String>,
    pub attributes: Vec<NftAttribute>,
}

/// External rarity-data provider, keyed by collection slug.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_collection(&self, slug: &str) -> Result<Vec<CollectionItem>, UpstreamError>;
}

/// External ownership resolver. Returns every token mint the wallet holds
/// on-chain, across all collections; an empty set is a valid answer.
#[async_trait]
pub trait OwnershipSource: Send + Sync {
    async fn fetch_owned_mints(&self, wallet_address: &str) -> Result<HashSet<String>, UpstreamError>;
}
