//! TTL cache over the snapshot builder with stale fallback.
//!
//! The stored entry is replaced whole, never edited, so readers see either the
//! previous entry or the new one. At most one refresh runs at a time; it runs
//! in its own task so a caller that gives up does not cancel it.

use analysis_core::SymbolSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::builder::{RefreshFailure, SnapshotBuilder};

/// Top-N snapshots of one successful refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub snapshots: Vec<SymbolSnapshot>,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CacheRead {
    pub entry: Arc<CacheEntry>,
    /// The TTL has passed and the latest refresh failed or is still running.
    pub stale: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// No refresh has succeeded yet and the latest one failed.
    #[error("Top gainers are unavailable: {0}")]
    Unavailable(String),

    #[error("Service misconfigured: {0}")]
    Misconfigured(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheStatus {
    pub has_entry: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub ttl_secs: u64,
    pub refresh_in_flight: bool,
    pub last_refresh_failed: bool,
    pub last_error: Option<String>,
    pub refreshes_attempted: u64,
    pub refreshes_failed: u64,
}

#[derive(Default)]
struct CacheState {
    entry: Option<Arc<CacheEntry>>,
    stored_at: Option<Instant>,
    last_failure: Option<RefreshFailure>,
}

impl CacheState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.entry.is_some() && self.stored_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

struct Inner {
    builder: SnapshotBuilder,
    ttl: Duration,
    state: RwLock<CacheState>,
    refresh_lock: Arc<Mutex<()>>,
    refreshes_attempted: AtomicU64,
    refreshes_failed: AtomicU64,
}

#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<Inner>,
}

impl SnapshotCache {
    pub fn new(builder: SnapshotBuilder) -> Self {
        let ttl = builder.config().cache_ttl;
        Self {
            inner: Arc::new(Inner {
                builder,
                ttl,
                state: RwLock::new(CacheState::default()),
                refresh_lock: Arc::new(Mutex::new(())),
                refreshes_attempted: AtomicU64::new(0),
                refreshes_failed: AtomicU64::new(0),
            }),
        }
    }

    /// Fresh entry if there is one, else refreshes.
    ///
    /// While another caller's refresh is running, a previous entry is returned
    /// as stale right away; with no previous entry the call waits for that
    /// refresh. A failed refresh falls back to the previous entry unless it
    /// failed on configuration.
    pub async fn get(&self) -> Result<CacheRead, CacheError> {
        if let Some(entry) = self.fresh_entry().await {
            tracing::debug!("top gainers cache hit");
            return Ok(CacheRead { entry, stale: false });
        }

        match self.inner.refresh_lock.clone().try_lock_owned() {
            Ok(guard) => {
                // Another refresh may have landed between the read and the lock.
                if let Some(entry) = self.fresh_entry().await {
                    return Ok(CacheRead { entry, stale: false });
                }
                if let Err(e) = self.spawn_refresh(guard).await {
                    tracing::error!("Snapshot refresh task aborted: {}", e);
                }
            }
            Err(_) => {
                {
                    let state = self.inner.state.read().await;
                    if let Some(entry) = state.entry.clone() {
                        if let Some(RefreshFailure::Misconfigured(msg)) = &state.last_failure {
                            return Err(CacheError::Misconfigured(msg.clone()));
                        }
                        tracing::debug!("refresh in flight, serving stale entry");
                        return Ok(CacheRead { entry, stale: true });
                    }
                }
                // Cold start: wait for the in-flight refresh to finish.
                drop(self.inner.refresh_lock.lock().await);
            }
        }

        self.read_after_refresh().await
    }

    pub async fn status(&self) -> CacheStatus {
        let state = self.inner.state.read().await;
        CacheStatus {
            has_entry: state.entry.is_some(),
            refreshed_at: state.entry.as_ref().map(|e| e.refreshed_at),
            age_secs: state.stored_at.map(|at| at.elapsed().as_secs()),
            ttl_secs: self.inner.ttl.as_secs(),
            refresh_in_flight: self.inner.refresh_lock.try_lock().is_err(),
            last_refresh_failed: state.last_failure.is_some(),
            last_error: state.last_failure.as_ref().map(|f| f.to_string()),
            refreshes_attempted: self.inner.refreshes_attempted.load(Ordering::Relaxed),
            refreshes_failed: self.inner.refreshes_failed.load(Ordering::Relaxed),
        }
    }

    async fn fresh_entry(&self) -> Option<Arc<CacheEntry>> {
        let state = self.inner.state.read().await;
        if state.is_fresh(self.inner.ttl) {
            state.entry.clone()
        } else {
            None
        }
    }

    fn spawn_refresh(&self, guard: OwnedMutexGuard<()>) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _guard = guard;
            inner.refresh().await;
        })
    }

    async fn read_after_refresh(&self) -> Result<CacheRead, CacheError> {
        let state = self.inner.state.read().await;

        if let Some(RefreshFailure::Misconfigured(msg)) = &state.last_failure {
            return Err(CacheError::Misconfigured(msg.clone()));
        }

        match &state.entry {
            Some(entry) => Ok(CacheRead {
                entry: entry.clone(),
                stale: !state.is_fresh(self.inner.ttl),
            }),
            None => Err(CacheError::Unavailable(
                state
                    .last_failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "no snapshot has been built yet".to_string()),
            )),
        }
    }
}

impl Inner {
    async fn refresh(&self) {
        self.refreshes_attempted.fetch_add(1, Ordering::Relaxed);

        match self.builder.build().await {
            Ok(outcome) => {
                let entry = Arc::new(CacheEntry {
                    snapshots: outcome.snapshots,
                    refreshed_at: Utc::now(),
                });
                let mut state = self.state.write().await;
                state.entry = Some(entry);
                state.stored_at = Some(Instant::now());
                state.last_failure = None;
            }
            Err(failure) => {
                self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
                let mut state = self.state.write().await;
                if state.entry.is_some() {
                    tracing::warn!("Refresh failed, keeping previous snapshot: {}", failure);
                }
                state.last_failure = Some(failure);
            }
        }
    }
}
