use serde::{Deserialize, Serialize};

/// One trait on an NFT, e.g. `{name: "Background", value: "Purple Haze"}`.
/// Upstream metadata sometimes carries numeric or boolean values; those are
/// stringified at the client boundary so filtering stays plain string work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftAttribute {
    pub name: String,
    pub value: String,
}

impl NftAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Outcome of one collection sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub collection_slug: String,
    pub processed_count: usize,
    pub total_count: usize,
    pub cancelled: bool,
}

/// Periodic progress emitted while a sync is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub collection_slug: String,
    pub processed_count: usize,
    pub total_count: usize,
}

/// Presentation-ready record for a flexed NFT. This is what the command /
/// HTTP layer renders; it carries no framework-specific response objects.
#[derive(Debug, Clone, Serialize)]
pub struct FlexShowcase {
    pub mint: String,
    pub name: String,
    pub rank: u32,
    pub image_url: Option<String>,
    pub tier_name: String,
    pub tier_color: u32,
    pub owned_count: usize,
}
