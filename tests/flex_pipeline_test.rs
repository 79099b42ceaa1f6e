use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use flexbot_backend::clients::{
    CollectionItem, MetadataSource, OwnershipSource, UpstreamError,
};
use flexbot_backend::database::{
    CatalogStore, ConfigStore, GuildConfig, NewNft, Nft, Player, PlayerStore,
};
use flexbot_backend::flex::{FlexError, FlexService};
use flexbot_backend::rarity::RarityConfig;
use flexbot_backend::reconcile::OwnershipReconciler;
use flexbot_backend::sync::{SyncCoordinator, SyncEngine};
use flexbot_backend::types::NftAttribute;

#[derive(Default)]
struct MemoryCatalog {
    rows: Mutex<HashMap<String, Nft>>,
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_by_mint(&self, mint: &str) -> Result<Option<Nft>> {
        Ok(self.rows.lock().unwrap().get(mint).cloned())
    }

    async fn get_by_collection(&self, slug: &str) -> Result<Vec<Nft>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.collection_slug == slug)
            .cloned()
            .collect())
    }

    async fn get_by_owner_and_collection(&self, owner: &str, slug: &str) -> Result<Vec<Nft>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.collection_slug == slug && n.owner_wallet.as_deref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn upsert_many(&self, batch: &[NewNft]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for new in batch {
            let owner = rows.get(&new.mint).and_then(|n| n.owner_wallet.clone());
            rows.insert(
                new.mint.clone(),
                Nft {
                    mint: new.mint.clone(),
                    collection_slug: new.collection_slug.clone(),
                    name: new.name.clone(),
                    rank: new.rank,
                    image_url: new.image_url.clone(),
                    attributes: new.attributes.clone(),
                    owner_wallet: owner,
                    last_synced: Some(new.synced_at),
                },
            );
        }
        Ok(())
    }

    async fn update_owner(&self, mint: &str, owner: &str) -> Result<()> {
        if let Some(nft) = self.rows.lock().unwrap().get_mut(mint) {
            nft.owner_wallet = Some(owner.to_string());
        }
        Ok(())
    }

    async fn count_by_collection(&self, slug: &str) -> Result<i64> {
        Ok(self.get_by_collection(slug).await?.len() as i64)
    }
}

#[derive(Default)]
struct MemoryPlayers {
    rows: Mutex<HashMap<i64, Option<String>>>,
}

#[async_trait]
impl PlayerStore for MemoryPlayers {
    async fn get(&self, discord_id: i64) -> Result<Option<Player>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&discord_id)
            .map(|wallet| Player {
                discord_id,
                wallet_address: wallet.clone(),
            }))
    }

    async fn upsert_wallet(&self, discord_id: i64, wallet_address: Option<&str>) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(discord_id, wallet_address.map(|s| s.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryConfigs {
    rows: Mutex<HashMap<i64, String>>,
}

#[async_trait]
impl ConfigStore for MemoryConfigs {
    async fn get(&self, guild_id: i64) -> Result<Option<GuildConfig>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&guild_id)
            .map(|slug| GuildConfig {
                guild_id,
                collection_slug: slug.clone(),
            }))
    }

    async fn upsert(&self, guild_id: i64, collection_slug: &str) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(guild_id, collection_slug.to_string());
        Ok(())
    }
}

struct StaticMetadata {
    items: Vec<CollectionItem>,
}

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn fetch_collection(&self, _slug: &str) -> Result<Vec<CollectionItem>, UpstreamError> {
        Ok(self.items.clone())
    }
}

struct StaticOwnership {
    mints: Option<HashSet<String>>,
}

impl StaticOwnership {
    fn owning(mints: &[&str]) -> Self {
        Self {
            mints: Some(mints.iter().map(|m| m.to_string()).collect()),
        }
    }

    fn failing() -> Self {
        Self { mints: None }
    }
}

#[async_trait]
impl OwnershipSource for StaticOwnership {
    async fn fetch_owned_mints(&self, _wallet: &str) -> Result<HashSet<String>, UpstreamError> {
        match &self.mints {
            Some(mints) => Ok(mints.clone()),
            None => Err(UpstreamError::Status(502)),
        }
    }
}

fn item(mint: &str, rank: i32, attributes: Vec<NftAttribute>) -> CollectionItem {
    CollectionItem {
        mint: Some(mint.to_string()),
        name: format!("Growerz #{rank}"),
        rank: Some(rank),
        image_url: Some(format!("https://img.example/{mint}.png")),
        attributes,
    }
}

fn growerz_catalog() -> Vec<CollectionItem> {
    vec![
        item("A", 1, vec![]),
        item("B", 100, vec![NftAttribute::new("Background", "Purple Haze")]),
        item("C", 2000, vec![NftAttribute::new("Signed by haizeel", "true")]),
    ]
}

fn flex_service(
    catalog: Arc<MemoryCatalog>,
    players: Arc<MemoryPlayers>,
    configs: Arc<MemoryConfigs>,
    ownership: StaticOwnership,
) -> FlexService {
    let reconciler = OwnershipReconciler::new(catalog.clone(), Arc::new(ownership));
    FlexService::new(
        players,
        configs,
        catalog,
        reconciler,
        Arc::new(RarityConfig::builtin()),
        "the_growerz",
    )
}

async fn synced_catalog(items: Vec<CollectionItem>) -> Arc<MemoryCatalog> {
    let catalog = Arc::new(MemoryCatalog::default());
    let engine = SyncEngine::new(
        catalog.clone(),
        Arc::new(StaticMetadata { items }),
        Arc::new(SyncCoordinator::new()),
    );
    engine.sync("the_growerz").await.unwrap();
    catalog
}

#[tokio::test]
async fn reconcile_intersects_with_catalog_only() {
    let catalog = synced_catalog(growerz_catalog()).await;

    // Wallet owns A on-chain plus D, which was never synced.
    let reconciler = OwnershipReconciler::new(
        catalog.clone(),
        Arc::new(StaticOwnership::owning(&["A", "D"])),
    );
    let owned = reconciler.reconcile("Wallet1", "the_growerz").await.unwrap();

    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].mint, "A");
    // D produced no row.
    assert!(catalog.get_by_mint("D").await.unwrap().is_none());
    // B and C stay unattributed.
    assert!(catalog.get_by_mint("B").await.unwrap().unwrap().owner_wallet.is_none());
}

#[tokio::test]
async fn reconcile_falls_back_to_stale_rows_on_upstream_failure() {
    let catalog = synced_catalog(growerz_catalog()).await;
    catalog.update_owner("B", "Wallet1").await.unwrap();

    let reconciler =
        OwnershipReconciler::new(catalog.clone(), Arc::new(StaticOwnership::failing()));
    let owned = reconciler.reconcile("Wallet1", "the_growerz").await.unwrap();

    // The resolver is down, but the read path still serves last-known state.
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].mint, "B");
}

#[tokio::test]
async fn reconcile_never_clears_previous_attribution() {
    let catalog = synced_catalog(growerz_catalog()).await;
    catalog.update_owner("B", "Wallet1").await.unwrap();

    // On-chain truth says Wallet1 now only holds A, but B's attribution
    // stays until someone else reconciles it away.
    let reconciler = OwnershipReconciler::new(
        catalog.clone(),
        Arc::new(StaticOwnership::owning(&["A"])),
    );
    let owned = reconciler.reconcile("Wallet1", "the_growerz").await.unwrap();

    let mints: HashSet<String> = owned.into_iter().map(|n| n.mint).collect();
    assert!(mints.contains("A"));
    assert!(mints.contains("B"));
}

#[tokio::test]
async fn sync_twice_is_idempotent_and_keeps_owner() {
    let catalog = Arc::new(MemoryCatalog::default());
    let engine = SyncEngine::new(
        catalog.clone(),
        Arc::new(StaticMetadata { items: growerz_catalog() }),
        Arc::new(SyncCoordinator::new()),
    );

    engine.sync("the_growerz").await.unwrap();
    catalog.update_owner("A", "Wallet1").await.unwrap();
    let before = catalog.get_by_mint("A").await.unwrap().unwrap();

    engine.sync("the_growerz").await.unwrap();
    let after = catalog.get_by_mint("A").await.unwrap().unwrap();

    assert_eq!(after.owner_wallet.as_deref(), Some("Wallet1"));
    assert_eq!(after.name, before.name);
    assert_eq!(after.rank, before.rank);
    assert_eq!(after.attributes, before.attributes);
    assert_eq!(catalog.count_by_collection("the_growerz").await.unwrap(), 3);
}

#[tokio::test]
async fn flex_end_to_end_classifies_the_pick() {
    let catalog = synced_catalog(growerz_catalog()).await;
    let players = Arc::new(MemoryPlayers::default());
    players.upsert_wallet(42, Some("Wallet1")).await.unwrap();

    let service = flex_service(
        catalog,
        players,
        Arc::new(MemoryConfigs::default()),
        StaticOwnership::owning(&["A", "B", "C"]),
    );

    let showcase = service.flex(42, None, None).await.unwrap();
    assert_eq!(showcase.owned_count, 3);
    match showcase.mint.as_str() {
        "A" => {
            assert_eq!(showcase.rank, 1);
            assert_eq!(showcase.tier_name, "1/1");
            assert_eq!(showcase.tier_color, 0xFFD700);
        }
        "B" => {
            assert_eq!(showcase.tier_name, "Epic");
            assert_eq!(showcase.tier_color, 0xFFA500);
        }
        // C is rank 2000 (Common) but carries the signed override.
        "C" => {
            assert_eq!(showcase.tier_name, "Signed");
            assert_eq!(showcase.tier_color, 0xFFD700);
        }
        other => panic!("unexpected mint {other}"),
    }
}

#[tokio::test]
async fn flex_honors_exact_trait_filter() {
    let catalog = synced_catalog(growerz_catalog()).await;
    let players = Arc::new(MemoryPlayers::default());
    players.upsert_wallet(42, Some("Wallet1")).await.unwrap();

    let service = flex_service(
        catalog,
        players,
        Arc::new(MemoryConfigs::default()),
        StaticOwnership::owning(&["A", "B", "C"]),
    );

    let showcase = service
        .flex(42, None, Some("Signed by haizeel: true"))
        .await
        .unwrap();
    assert_eq!(showcase.mint, "C");
    assert_eq!(showcase.owned_count, 1);

    let err = service.flex(42, None, Some("Hat: Sombrero")).await.unwrap_err();
    match err {
        FlexError::NoMatch { filter, owned } => {
            assert_eq!(filter, "Hat: Sombrero");
            assert_eq!(owned, 3);
        }
        other => panic!("expected NoMatch, got {other:?}"),
    }
}

#[tokio::test]
async fn flex_requires_a_linked_wallet() {
    let catalog = synced_catalog(growerz_catalog()).await;
    let players = Arc::new(MemoryPlayers::default());
    // A row exists but the wallet was unlinked.
    players.upsert_wallet(42, None).await.unwrap();

    let service = flex_service(
        catalog,
        players,
        Arc::new(MemoryConfigs::default()),
        StaticOwnership::owning(&["A"]),
    );

    let err = service.flex(42, None, None).await.unwrap_err();
    assert!(matches!(err, FlexError::NoWalletLinked(42)));

    let err = service.flex(7, None, None).await.unwrap_err();
    assert!(matches!(err, FlexError::NoWalletLinked(7)));
}

#[tokio::test]
async fn flex_distinguishes_empty_catalog_from_empty_wallet() {
    // Nothing synced at all: guidance to run a sync.
    let players = Arc::new(MemoryPlayers::default());
    players.upsert_wallet(42, Some("Wallet1")).await.unwrap();

    let service = flex_service(
        Arc::new(MemoryCatalog::default()),
        players.clone(),
        Arc::new(MemoryConfigs::default()),
        StaticOwnership::owning(&[]),
    );
    let err = service.flex(42, None, None).await.unwrap_err();
    assert!(matches!(err, FlexError::CatalogEmpty { .. }));

    // Catalog populated but the wallet owns none of it.
    let catalog = synced_catalog(growerz_catalog()).await;
    let service = flex_service(
        catalog,
        players,
        Arc::new(MemoryConfigs::default()),
        StaticOwnership::owning(&[]),
    );
    let err = service.flex(42, None, None).await.unwrap_err();
    match err {
        FlexError::NothingOwned { collection, wallet, catalog_size } => {
            assert_eq!(collection, "the_growerz");
            assert_eq!(wallet, "Wallet1");
            assert_eq!(catalog_size, 3);
        }
        other => panic!("expected NothingOwned, got {other:?}"),
    }
}

#[tokio::test]
async fn guild_config_selects_the_collection() {
    let catalog = Arc::new(MemoryCatalog::default());
    let engine = SyncEngine::new(
        catalog.clone(),
        Arc::new(StaticMetadata {
            items: vec![CollectionItem {
                mint: Some("M1".to_string()),
                name: "MidEvil #180".to_string(),
                rank: Some(180),
                image_url: None,
                attributes: Vec::new(),
            }],
        }),
        Arc::new(SyncCoordinator::new()),
    );
    engine.sync("midevils").await.unwrap();

    let players = Arc::new(MemoryPlayers::default());
    players.upsert_wallet(42, Some("Wallet1")).await.unwrap();
    let configs = Arc::new(MemoryConfigs::default());
    configs.upsert(900, "midevils").await.unwrap();

    let service = flex_service(catalog, players, configs, StaticOwnership::owning(&["M1"]));

    let showcase = service.flex(42, Some(900), None).await.unwrap();
    assert_eq!(showcase.mint, "M1");
    // Classified under the midevils rule table, not the default collection's.
    assert_eq!(showcase.tier_name, "Legendary");
}
