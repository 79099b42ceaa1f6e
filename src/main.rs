use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use flexbot_backend::{
    clients::{howrare, HowRareClient, SolanaRpcClient},
    database::{ConfigStore, MigrationRunner, PgCatalogStore, PgConfigStore, PgPlayerStore},
    flex::{FlexError, FlexService},
    rarity::RarityConfig,
    reconcile::OwnershipReconciler,
    sync::{SyncCoordinator, SyncEngine, SyncError},
    types::FlexShowcase,
    wallet::{WalletError, WalletService},
};

const DEFAULT_SOLANA_RPC: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_COLLECTION: &str = "the_growerz";

#[derive(Clone)]
struct AppState {
    sync_engine: Arc<SyncEngine>,
    coordinator: Arc<SyncCoordinator>,
    flex: Arc<FlexService>,
    wallet: Arc<WalletService>,
    configs: Arc<dyn ConfigStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL is not set"))?;
    let api_base =
        std::env::var("HOWRARE_API_BASE").unwrap_or_else(|_| howrare::DEFAULT_API_BASE.to_string());
    let rpc_url =
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| DEFAULT_SOLANA_RPC.to_string());
    let default_collection =
        std::env::var("FLEX_DEFAULT_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    MigrationRunner::new(pool.clone()).run_migrations().await?;
    info!("✅ Database ready");

    let catalog = Arc::new(PgCatalogStore::new(pool.clone()));
    let players = Arc::new(PgPlayerStore::new(pool.clone()));
    let configs: Arc<dyn ConfigStore> = Arc::new(PgConfigStore::new(pool));

    let metadata_source = Arc::new(HowRareClient::new(api_base));
    let ownership_source = Arc::new(SolanaRpcClient::new(rpc_url));

    let coordinator = Arc::new(SyncCoordinator::new());
    let sync_engine = Arc::new(SyncEngine::new(
        catalog.clone(),
        metadata_source,
        coordinator.clone(),
    ));

    let reconciler = OwnershipReconciler::new(catalog.clone(), ownership_source);
    let flex = Arc::new(FlexService::new(
        players.clone(),
        configs.clone(),
        catalog,
        reconciler,
        Arc::new(RarityConfig::builtin()),
        default_collection,
    ));
    let wallet = Arc::new(WalletService::new(players));

    let app_state = AppState {
        sync_engine,
        coordinator,
        flex,
        wallet,
        configs,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/flex", post(flex_handler))
        .route("/sync/:slug", post(start_sync))
        .route("/sync/cancel", post(cancel_sync))
        .route("/sync/status", get(sync_status))
        .route("/wallet/link", post(link_wallet))
        .route("/wallet/unlink", post(unlink_wallet))
        .route("/wallet/:discord_id", get(view_wallet))
        .route("/config/:guild_id", get(get_collection).post(set_collection))
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    info!("🚀 Starting flex backend on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct FlexParams {
    discord_id: i64,
    guild_id: Option<i64>,
    trait_filter: Option<String>,
}

async fn flex_handler(
    State(state): State<AppState>,
    Json(params): Json<FlexParams>,
) -> Result<Json<FlexShowcase>, (StatusCode, Json<Value>)> {
    match state
        .flex
        .flex(params.discord_id, params.guild_id, params.trait_filter.as_deref())
        .await
    {
        Ok(showcase) => Ok(Json(showcase)),
        Err(FlexError::Storage(e)) => {
            error!("Flex failed for user {}: {}", params.discord_id, e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
        Err(e) => Err(error_response(StatusCode::NOT_FOUND, &e.to_string())),
    }
}

async fn start_sync(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if state.coordinator.is_running() {
        return Err(error_response(
            StatusCode::CONFLICT,
            &SyncError::AlreadyRunning.to_string(),
        ));
    }

    let engine = state.sync_engine.clone();
    tokio::spawn(async move {
        match engine.sync(&slug).await {
            Ok(report) => info!(
                "Sync finished for {}: {}/{} (cancelled: {})",
                report.collection_slug, report.processed_count, report.total_count, report.cancelled
            ),
            Err(e) => error!("Sync failed: {}", e),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({"started": true}))))
}

async fn cancel_sync(State(state): State<AppState>) -> Json<Value> {
    let cancelled = state.coordinator.request_cancel();
    Json(json!({"cancel_requested": cancelled}))
}

async fn sync_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "phase": state.coordinator.phase(),
        "last_outcome": state.coordinator.last_outcome(),
        "last_report": state.coordinator.last_report(),
    }))
}

#[derive(Debug, Deserialize)]
struct LinkParams {
    discord_id: i64,
    address: String,
}

async fn link_wallet(
    State(state): State<AppState>,
    Json(params): Json<LinkParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .wallet
        .link(params.discord_id, &params.address)
        .await
        .map_err(wallet_error)?;
    Ok(Json(json!({"linked": params.address})))
}

#[derive(Debug, Deserialize)]
struct UnlinkParams {
    discord_id: i64,
}

async fn unlink_wallet(
    State(state): State<AppState>,
    Json(params): Json<UnlinkParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.wallet.unlink(params.discord_id).await.map_err(wallet_error)?;
    Ok(Json(json!({"unlinked": true})))
}

async fn view_wallet(
    State(state): State<AppState>,
    Path(discord_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let wallet = state.wallet.view(discord_id).await.map_err(wallet_error)?;
    Ok(Json(json!({"wallet_address": wallet})))
}

#[derive(Debug, Deserialize)]
struct SetCollectionParams {
    collection_slug: String,
}

async fn get_collection(
    State(state): State<AppState>,
    Path(guild_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.configs.get(guild_id).await {
        Ok(config) => Ok(Json(
            json!({"collection_slug": config.map(|c| c.collection_slug)}),
        )),
        Err(e) => {
            error!("Config lookup failed for guild {}: {}", guild_id, e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

async fn set_collection(
    State(state): State<AppState>,
    Path(guild_id): Path<i64>,
    Json(params): Json<SetCollectionParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.configs.upsert(guild_id, &params.collection_slug).await {
        Ok(()) => Ok(Json(json!({"collection_slug": params.collection_slug}))),
        Err(e) => {
            error!("Config update failed for guild {}: {}", guild_id, e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

fn wallet_error(e: WalletError) -> (StatusCode, Json<Value>) {
    match e {
        WalletError::InvalidAddress(_) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        WalletError::NotLinked => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        WalletError::Storage(e) => {
            error!("Wallet operation failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": message})))
}
