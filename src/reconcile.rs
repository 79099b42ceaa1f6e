use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::OwnershipSource;
use crate::database::{CatalogStore, Nft};

/// Refreshes a wallet's ownership against the chain and reads back its
/// holdings for one collection.
///
/// Ownership is only ever set, never cleared: a token transferred away stays
/// attributed to this wallet until whichever wallet now holds it reconciles.
/// True ownership is always re-derived from the chain on the next pass, so
/// last-writer-wins on the owner column is acceptable.
pub struct OwnershipReconciler {
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn OwnershipSource>,
}

impl OwnershipReconciler {
    pub fn new(store: Arc<dyn CatalogStore>, source: Arc<dyn OwnershipSource>) -> Self {
        Self { store, source }
    }

    /// Reconcile and return the wallet's tokens in `collection_slug`.
    ///
    /// When the ownership resolver is unreachable the update is skipped and
    /// the store's last-known rows are returned instead; the read path is
    /// never blocked by a transient upstream outage.
    pub async fn reconcile(&self, wallet_address: &str, collection_slug: &str) -> Result<Vec<Nft>> {
        match self.source.fetch_owned_mints(wallet_address).await {
            Ok(owned_mints) => {
                if owned_mints.is_empty() {
                    debug!("Wallet {} holds no tokens on-chain", wallet_address);
                } else {
                    // Only mints already synced into the catalog count; an
                    // owned-but-never-synced token produces no row.
                    let known = self.store.get_by_collection(collection_slug).await?;
                    for nft in known {
                        if owned_mints.contains(&nft.mint) {
                            self.store.update_owner(&nft.mint, wallet_address).await?;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Ownership lookup failed for wallet {}: {}; serving last-known holdings",
                    wallet_address, e
                );
            }
        }

        self.store
            .get_by_owner_and_collection(wallet_address, collection_slug)
            .await
    }
}
