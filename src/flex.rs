use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

use crate::database::{CatalogStore, ConfigStore, Nft, PlayerStore};
use crate::rarity::{effective_rank, RarityConfig};
use crate::reconcile::OwnershipReconciler;
use crate::types::FlexShowcase;

#[derive(Debug, Error)]
pub enum FlexError {
    #[error("no wallet linked for user {0}; link one first")]
    NoWalletLinked(i64),
    #[error("nothing synced yet for collection `{collection}`; run a collection sync first")]
    CatalogEmpty { collection: String },
    #[error(
        "no tokens from `{collection}` found in wallet `{wallet}` ({catalog_size} items synced)"
    )]
    NothingOwned {
        collection: String,
        wallet: String,
        catalog_size: i64,
    },
    #[error("found {owned} owned tokens, but none matched filter `{filter}`")]
    NoMatch { filter: String, owned: usize },
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// A selected token plus how many candidates it was drawn from.
#[derive(Debug, Clone)]
pub struct FlexPick {
    pub chosen: Nft,
    pub owned_count: usize,
}

/// Pick one token to show off, uniformly at random from the (optionally
/// trait-filtered) candidates. Random rather than best-rank so repeated
/// flexes surface different pieces.
///
/// `owned_count` is the candidate count before the draw: "how many you own
/// matching this filter", not 1.
pub fn select_flex(tokens: &[Nft], trait_filter: Option<&str>) -> Result<FlexPick, FlexError> {
    let candidates: Vec<&Nft> = match trait_filter {
        Some(filter) => tokens.iter().filter(|nft| matches_filter(nft, filter)).collect(),
        None => tokens.iter().collect(),
    };

    if candidates.is_empty() {
        return Err(FlexError::NoMatch {
            filter: trait_filter.unwrap_or_default().to_string(),
            owned: tokens.len(),
        });
    }

    let owned_count = candidates.len();
    let chosen = candidates[rand::thread_rng().gen_range(0..owned_count)].clone();

    Ok(FlexPick { chosen, owned_count })
}

/// A filter shaped `"Name: Value"` demands that exact trait pair (name
/// case-sensitive, value string-equal). Anything else matches loosely: a
/// case-insensitive substring of any trait name or value.
fn matches_filter(nft: &Nft, filter: &str) -> bool {
    if let Some((name, value)) = filter.split_once(": ") {
        nft.attributes
            .iter()
            .any(|attr| attr.name == name && attr.value == value)
    } else {
        let needle = filter.to_lowercase();
        nft.attributes.iter().any(|attr| {
            attr.name.to_lowercase().contains(&needle)
                || attr.value.to_lowercase().contains(&needle)
        })
    }
}

/// End-to-end flex pipeline: wallet lookup, scope configuration, ownership
/// reconciliation, selection, and rarity classification.
pub struct FlexService {
    players: Arc<dyn PlayerStore>,
    configs: Arc<dyn ConfigStore>,
    catalog: Arc<dyn CatalogStore>,
    reconciler: OwnershipReconciler,
    rarity: Arc<RarityConfig>,
    default_collection: String,
}

impl FlexService {
    pub fn new(
        players: Arc<dyn PlayerStore>,
        configs: Arc<dyn ConfigStore>,
        catalog: Arc<dyn CatalogStore>,
        reconciler: OwnershipReconciler,
        rarity: Arc<RarityConfig>,
        default_collection: impl Into<String>,
    ) -> Self {
        Self {
            players,
            configs,
            catalog,
            reconciler,
            rarity,
            default_collection: default_collection.into(),
        }
    }

    /// Which collection a scope targets; guilds without explicit
    /// configuration fall back to the process-wide default.
    pub async fn collection_for(&self, guild_id: Option<i64>) -> Result<String, FlexError> {
        let configured = match guild_id {
            Some(guild_id) => self
                .configs
                .get(guild_id)
                .await?
                .map(|config| config.collection_slug),
            None => None,
        };
        Ok(configured.unwrap_or_else(|| self.default_collection.clone()))
    }

    pub async fn flex(
        &self,
        discord_id: i64,
        guild_id: Option<i64>,
        trait_filter: Option<&str>,
    ) -> Result<FlexShowcase, FlexError> {
        let wallet = self
            .players
            .get(discord_id)
            .await?
            .and_then(|player| player.wallet_address)
            .ok_or(FlexError::NoWalletLinked(discord_id))?;

        let collection_slug = self.collection_for(guild_id).await?;
        let owned = self.reconciler.reconcile(&wallet, &collection_slug).await?;

        if owned.is_empty() {
            let catalog_size = self.catalog.count_by_collection(&collection_slug).await?;
            if catalog_size == 0 {
                return Err(FlexError::CatalogEmpty {
                    collection: collection_slug,
                });
            }
            return Err(FlexError::NothingOwned {
                collection: collection_slug,
                wallet,
                catalog_size,
            });
        }

        let pick = select_flex(&owned, trait_filter)?;
        let rank = effective_rank(pick.chosen.rank);
        let tier = self
            .rarity
            .classify(&collection_slug, rank, &pick.chosen.attributes);

        Ok(FlexShowcase {
            mint: pick.chosen.mint,
            name: pick.chosen.name,
            rank,
            image_url: pick.chosen.image_url,
            tier_name: tier.name,
            tier_color: tier.color,
            owned_count: pick.owned_count,
        })
    }
}
