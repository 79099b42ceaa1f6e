pub mod clients;
pub mod database;
pub mod flex;
pub mod rarity;
pub mod reconcile;
pub mod sync;
pub mod types;
pub mod wallet;

pub use clients::{HowRareClient, MetadataSource, OwnershipSource, SolanaRpcClient, UpstreamError};
pub use database::{CatalogStore, ConfigStore, PlayerStore};
pub use flex::{select_flex, FlexError, FlexPick, FlexService};
pub use rarity::{classify, RarityConfig, RarityRuleSet, RarityTier, UNRANKED_RANK};
pub use reconcile::OwnershipReconciler;
pub use sync::{SyncCoordinator, SyncEngine, SyncError, SyncOutcome, SyncPhase};
pub use types::{FlexShowcase, NftAttribute, SyncProgress, SyncReport};
pub use wallet::{is_valid_solana_address, WalletError, WalletService};
