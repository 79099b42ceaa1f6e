use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::database::PlayerStore;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid Solana address format: `{0}`")]
    InvalidAddress(String),
    #[error("no wallet linked")]
    NotLinked,
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Cheap shape check: Solana addresses are 32-44 base58 characters. This is
/// not on-curve validation, just enough to reject typos before they reach
/// the RPC.
pub fn is_valid_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

/// Wallet link lifecycle: one row per user, created on first link, nulled on
/// unlink, never deleted.
pub struct WalletService {
    players: Arc<dyn PlayerStore>,
}

impl WalletService {
    pub fn new(players: Arc<dyn PlayerStore>) -> Self {
        Self { players }
    }

    pub async fn link(&self, discord_id: i64, address: &str) -> Result<(), WalletError> {
        if !is_valid_solana_address(address) {
            return Err(WalletError::InvalidAddress(address.to_string()));
        }
        self.players.upsert_wallet(discord_id, Some(address)).await?;
        info!("Linked wallet for user {}", discord_id);
        Ok(())
    }

    pub async fn unlink(&self, discord_id: i64) -> Result<(), WalletError> {
        let linked = self
            .players
            .get(discord_id)
            .await?
            .and_then(|player| player.wallet_address);
        if linked.is_none() {
            return Err(WalletError::NotLinked);
        }
        self.players.upsert_wallet(discord_id, None).await?;
        info!("Unlinked wallet for user {}", discord_id);
        Ok(())
    }

    pub async fn view(&self, discord_id: i64) -> Result<Option<String>, WalletError> {
        Ok(self
            .players
            .get(discord_id)
            .await?
            .and_then(|player| player.wallet_address))
    }
}
