use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::info;

use super::models::{GuildConfig, NewNft, Nft, Player};
use crate::types::NftAttribute;

/// Repository over the NFT catalog. The sync engine writes full rows, the
/// reconciler writes the owner column, everyone else reads.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_by_mint(&self, mint: &str) -> Result<Option<Nft>>;
    async fn get_by_collection(&self, collection_slug: &str) -> Result<Vec<Nft>>;
    async fn get_by_owner_and_collection(
        &self,
        owner_wallet: &str,
        collection_slug: &str,
    ) -> Result<Vec<Nft>>;
    /// Upsert a batch of metadata rows atomically. Creates missing rows and
    /// overwrites metadata on existing ones; never writes `owner_wallet`.
    async fn upsert_many(&self, rows: &[NewNft]) -> Result<()>;
    async fn update_owner(&self, mint: &str, owner_wallet: &str) -> Result<()>;
    async fn count_by_collection(&self, collection_slug: &str) -> Result<i64>;
}

/// Repository over wallet links. One row per requester; unlinking nulls the
/// wallet rather than deleting the row.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn get(&self, discord_id: i64) -> Result<Option<Player>>;
    async fn upsert_wallet(&self, discord_id: i64, wallet_address: Option<&str>) -> Result<()>;
}

/// Repository over per-guild collection configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, guild_id: i64) -> Result<Option<GuildConfig>>;
    async fn upsert(&self, guild_id: i64, collection_slug: &str) -> Result<()>;
}

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_nft(row: &sqlx::postgres::PgRow) -> Result<Nft> {
        let attributes: Vec<NftAttribute> = row
            .try_get::<Option<serde_json::Value>, _>("attributes")?
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        Ok(Nft {
            mint: row.try_get("mint")?,
            collection_slug: row.try_get("collection_slug")?,
            name: row.try_get("name")?,
            rank: row.try_get("rank")?,
            image_url: row.try_get("image_url")?,
            attributes,
            owner_wallet: row.try_get("owner_wallet")?,
            last_synced: row.try_get("last_synced")?,
        })
    }
}

const NFT_COLUMNS: &str =
    "mint, collection_slug, name, rank, image_url, attributes, owner_wallet, last_synced";

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn get_by_mint(&self, mint: &str) -> Result<Option<Nft>> {
        let row = sqlx::query(&format!(
            "SELECT {NFT_COLUMNS} FROM flex_nfts WHERE mint = $1"
        ))
        .bind(mint)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_nft).transpose()
    }

    async fn get_by_collection(&self, collection_slug: &str) -> Result<Vec<Nft>> {
        let rows = sqlx::query(&format!(
            "SELECT {NFT_COLUMNS} FROM flex_nfts WHERE collection_slug = $1"
        ))
        .bind(collection_slug)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_nft).collect()
    }

    async fn get_by_owner_and_collection(
        &self,
        owner_wallet: &str,
        collection_slug: &str,
    ) -> Result<Vec<Nft>> {
        let rows = sqlx::query(&format!(
            "SELECT {NFT_COLUMNS} FROM flex_nfts WHERE owner_wallet = $1 AND collection_slug = $2"
        ))
        .bind(owner_wallet)
        .bind(collection_slug)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_nft).collect()
    }

    async fn upsert_many(&self, rows: &[NewNft]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for nft in rows {
            sqlx::query(
                r#"
                INSERT INTO flex_nfts (mint, collection_slug, name, rank, image_url, attributes, last_synced)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (mint) DO UPDATE SET
                    collection_slug = EXCLUDED.collection_slug,
                    name = EXCLUDED.name,
                    rank = EXCLUDED.rank,
                    image_url = EXCLUDED.image_url,
                    attributes = EXCLUDED.attributes,
                    last_synced = EXCLUDED.last_synced
                "#,
            )
            .bind(&nft.mint)
            .bind(&nft.collection_slug)
            .bind(&nft.name)
            .bind(nft.rank)
            .bind(&nft.image_url)
            .bind(serde_json::to_value(&nft.attributes)?)
            .bind(nft.synced_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_owner(&self, mint: &str, owner_wallet: &str) -> Result<()> {
        sqlx::query("UPDATE flex_nfts SET owner_wallet = $2 WHERE mint = $1")
            .bind(mint)
            .bind(owner_wallet)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_by_collection(&self, collection_slug: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM flex_nfts WHERE collection_slug = $1")
            .bind(collection_slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

pub struct PgPlayerStore {
    pool: PgPool,
}

impl PgPlayerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayerStore for PgPlayerStore {
    async fn get(&self, discord_id: i64) -> Result<Option<Player>> {
        let row = sqlx::query(
            "SELECT discord_id, wallet_address FROM flex_players WHERE discord_id = $1",
        )
        .bind(discord_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Player {
            discord_id: row.get("discord_id"),
            wallet_address: row.get("wallet_address"),
        }))
    }

    async fn upsert_wallet(&self, discord_id: i64, wallet_address: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flex_players (discord_id, wallet_address)
            VALUES ($1, $2)
            ON CONFLICT (discord_id) DO UPDATE SET wallet_address = EXCLUDED.wallet_address
            "#,
        )
        .bind(discord_id)
        .bind(wallet_address)
        .execute(&self.pool)
        .await?;

        info!("Updated wallet link for user {}", discord_id);
        Ok(())
    }
}

pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn get(&self, guild_id: i64) -> Result<Option<GuildConfig>> {
        let row = sqlx::query(
            "SELECT guild_id, collection_slug FROM flex_guild_config WHERE guild_id = $1",
        )
        .bind(guild_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| GuildConfig {
            guild_id: row.get("guild_id"),
            collection_slug: row.get("collection_slug"),
        }))
    }

    async fn upsert(&self, guild_id: i64, collection_slug: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flex_guild_config (guild_id, collection_slug)
            VALUES ($1, $2)
            ON CONFLICT (guild_id) DO UPDATE SET collection_slug = EXCLUDED.collection_slug
            "#,
        )
        .bind(guild_id)
        .bind(collection_slug)
        .execute(&self.pool)
        .await?;

        info!("Guild {} now targets collection {}", guild_id, collection_slug);
        Ok(())
    }
}
