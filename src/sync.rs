use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::clients::{MetadataSource, UpstreamError};
use crate::database::{CatalogStore, NewNft};
use crate::types::{SyncProgress, SyncReport};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_PROGRESS_EVERY: usize = 500;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a collection sync is already running")]
    AlreadyRunning,
    #[error("rarity provider request failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("storage failure during sync: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SyncPhase {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SyncOutcome {
    None,
    Completed,
    Cancelled,
    Failed,
}

const PHASE_IDLE: u8 = 0;
const PHASE_RUNNING: u8 = 1;

const OUTCOME_NONE: u8 = 0;
const OUTCOME_COMPLETED: u8 = 1;
const OUTCOME_CANCELLED: u8 = 2;
const OUTCOME_FAILED: u8 = 3;

/// Process-wide sync state machine: `Idle -> Running -> (Completed |
/// Cancelled | Failed) -> Idle`. Exactly one sync may hold the `Running`
/// state; a second `try_begin` while one is active fails with
/// [`SyncError::AlreadyRunning`] instead of queuing.
///
/// This is a per-process guard, not a distributed lock. Multi-process
/// deployments must externalize the guarantee or accept duplicate syncs.
pub struct SyncCoordinator {
    phase: AtomicU8,
    cancel: AtomicBool,
    last_outcome: AtomicU8,
    last_report: Mutex<Option<SyncReport>>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(PHASE_IDLE),
            cancel: AtomicBool::new(false),
            last_outcome: AtomicU8::new(OUTCOME_NONE),
            last_report: Mutex::new(None),
        }
    }

    /// Claim the `Running` state, clearing any stale cancellation request.
    pub fn try_begin(self: &Arc<Self>) -> Result<SyncGuard, SyncError> {
        self.phase
            .compare_exchange(PHASE_IDLE, PHASE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.cancel.store(false, Ordering::SeqCst);
        Ok(SyncGuard {
            coordinator: Arc::clone(self),
            outcome: SyncOutcome::Failed,
            report: None,
        })
    }

    pub fn phase(&self) -> SyncPhase {
        match self.phase.load(Ordering::SeqCst) {
            PHASE_RUNNING => SyncPhase::Running,
            _ => SyncPhase::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == SyncPhase::Running
    }

    /// Ask the in-flight sync to stop at the next batch boundary. Returns
    /// false when no sync is running.
    pub fn request_cancel(&self) -> bool {
        if self.is_running() {
            self.cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn last_outcome(&self) -> SyncOutcome {
        match self.last_outcome.load(Ordering::SeqCst) {
            OUTCOME_COMPLETED => SyncOutcome::Completed,
            OUTCOME_CANCELLED => SyncOutcome::Cancelled,
            OUTCOME_FAILED => SyncOutcome::Failed,
            _ => SyncOutcome::None,
        }
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().ok().and_then(|r| r.clone())
    }

    fn finish(&self, outcome: SyncOutcome, report: Option<SyncReport>) {
        let raw = match outcome {
            SyncOutcome::Completed => OUTCOME_COMPLETED,
            SyncOutcome::Cancelled => OUTCOME_CANCELLED,
            SyncOutcome::Failed => OUTCOME_FAILED,
            SyncOutcome::None => OUTCOME_NONE,
        };
        self.last_outcome.store(raw, Ordering::SeqCst);
        if let Ok(mut last) = self.last_report.lock() {
            if report.is_some() {
                *last = report;
            }
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.phase.store(PHASE_IDLE, Ordering::SeqCst);
    }
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to run one sync. Dropping the guard releases the
/// `Running` state; unless a terminal outcome was recorded first, the run
/// counts as failed.
pub struct SyncGuard {
    coordinator: Arc<SyncCoordinator>,
    outcome: SyncOutcome,
    report: Option<SyncReport>,
}

impl SyncGuard {
    pub fn complete(mut self, report: SyncReport) {
        self.outcome = SyncOutcome::Completed;
        self.report = Some(report);
    }

    pub fn cancelled(mut self, report: SyncReport) {
        self.outcome = SyncOutcome::Cancelled;
        self.report = Some(report);
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.coordinator.finish(self.outcome, self.report.take());
    }
}

/// Pulls full collection metadata from the rarity provider and upserts it
/// into the catalog in fixed-size batches. Each batch commits on its own, so
/// a cancellation or crash mid-run keeps everything committed so far.
pub struct SyncEngine {
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn MetadataSource>,
    coordinator: Arc<SyncCoordinator>,
    batch_size: usize,
    progress_every: usize,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn MetadataSource>,
        coordinator: Arc<SyncCoordinator>,
    ) -> Self {
        Self {
            store,
            source,
            coordinator,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress_every(mut self, progress_every: usize) -> Self {
        self.progress_every = progress_every.max(1);
        self
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub async fn sync(&self, collection_slug: &str) -> Result<SyncReport, SyncError> {
        self.sync_with_progress(collection_slug, None).await
    }

    pub async fn sync_with_progress(
        &self,
        collection_slug: &str,
        progress: Option<UnboundedSender<SyncProgress>>,
    ) -> Result<SyncReport, SyncError> {
        let guard = self.coordinator.try_begin()?;

        info!("Starting metadata sync for collection {}", collection_slug);
        let items = self.source.fetch_collection(collection_slug).await?;
        let total_count = items.len();
        let synced_at = Utc::now();

        let rows: Vec<NewNft> = items
            .into_iter()
            .filter_map(|item| {
                let mint = item.mint?;
                Some(NewNft {
                    mint,
                    collection_slug: collection_slug.to_string(),
                    name: item.name,
                    rank: item.rank,
                    image_url: item.image_url,
                    attributes: item.attributes,
                    synced_at,
                })
            })
            .collect();

        if rows.len() < total_count {
            debug!(
                "Skipping {} items without a mint identifier",
                total_count - rows.len()
            );
        }

        let mut processed_count = 0usize;
        let mut last_reported = 0usize;

        for chunk in rows.chunks(self.batch_size) {
            self.store.upsert_many(chunk).await?;
            processed_count += chunk.len();

            if processed_count - last_reported >= self.progress_every {
                last_reported = processed_count;
                info!(
                    "Sync progress for {}: {}/{}",
                    collection_slug, processed_count, total_count
                );
                if let Some(tx) = &progress {
                    let _ = tx.send(SyncProgress {
                        collection_slug: collection_slug.to_string(),
                        processed_count,
                        total_count,
                    });
                }
            }

            if self.coordinator.cancel_requested() {
                let report = SyncReport {
                    collection_slug: collection_slug.to_string(),
                    processed_count,
                    total_count,
                    cancelled: true,
                };
                warn!(
                    "Sync for {} cancelled after {} of {} items",
                    collection_slug, processed_count, total_count
                );
                guard.cancelled(report.clone());
                return Ok(report);
            }
        }

        let report = SyncReport {
            collection_slug: collection_slug.to_string(),
            processed_count,
            total_count,
            cancelled: false,
        };
        info!(
            "Synced {} of {} items for collection {}",
            processed_count, total_count, collection_slug
        );
        guard.complete(report.clone());
        Ok(report)
    }
}
