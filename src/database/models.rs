use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NftAttribute;

/// One catalog row: cached metadata for a single NFT plus its last-known
/// owner. Created and refreshed by the sync engine; only the owner column is
/// ever touched by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nft {
    pub mint: String,
    pub collection_slug: String,
    pub name: String,
    pub rank: Option<i32>,
    pub image_url: Option<String>,
    pub attributes: Vec<NftAttribute>,
    pub owner_wallet: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Metadata payload for one upsert. Deliberately has no owner field: syncing
/// must never overwrite ownership state.
#[derive(Debug, Clone)]
pub struct NewNft {
    pub mint: String,
    pub collection_slug: String,
    pub name: String,
    pub rank: Option<i32>,
    pub image_url: Option<String>,
    pub attributes: Vec<NftAttribute>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub discord_id: i64,
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: i64,
    pub collection_slug: String,
}
