//! Prefetch state machine and staging tasks.
//!
//! Each dataset moves through a small lifecycle:
//!
//! ```text
//! (absent) --ensure_ready--> Staging --ok--> Ready
//!                               |
//!                               +-----err--> Failed --ensure_ready--> Staging
//! ```
//!
//! `Staging` is entered atomically through the state table's entry API, so
//! concurrent `ensure_ready` calls for the same dataset start exactly one
//! staging task. `Ready` is sticky: it only leaves via `invalidate`.
//!
//! Staging is best-effort. A failed download or warm-up still emits a
//! degraded readiness event, because every search can fall back to reading
//! the remote file directly; the failure is recorded so the next
//! `ensure_ready` retries.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::SearchError;
use crate::query_builder::build_query_plan;
use crate::registry::{DatasetKey, DatasetRegistry};
use crate::retrieval::RetrievalExecutor;
use crate::utils::object_access;

/// Capacity of the readiness event channel. Slow subscribers that lag more
/// than this many events see a `Lagged` error, never a blocked stager.
const EVENT_CAPACITY: usize = 64;

/// Readiness lifecycle of one dataset. A dataset with no entry is idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchState {
    /// A staging task is running.
    Staging,
    /// Staging finished; searches should prefer `local_path` when present.
    Ready {
        local_path: Option<PathBuf>,
        /// True when staging or warm-up failed and searches fall back to
        /// the remote locator.
        degraded: bool,
    },
    /// Staging failed. The next `ensure_ready` retries.
    Failed { reason: String },
}

/// Broadcast notification about one dataset's readiness.
///
/// Events carry the dataset key; a listener waiting on one dataset ignores
/// events for every other key.
#[derive(Debug, Clone)]
pub enum PrefetchEvent {
    Ready {
        key: DatasetKey,
        local_path: Option<PathBuf>,
        degraded: bool,
    },
    Error {
        key: DatasetKey,
        reason: String,
    },
}

impl PrefetchEvent {
    pub fn key(&self) -> &DatasetKey {
        match self {
            PrefetchEvent::Ready { key, .. } | PrefetchEvent::Error { key, .. } => key,
        }
    }
}

/// Downloads one locator into a directory. The production implementation
/// streams through the object store layer; tests substitute their own.
pub trait Stager: Send + Sync {
    fn stage<'a>(
        &'a self,
        locator: &'a str,
        dest_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, SearchError>>;
}

/// Production stager backed by the object store access layer.
#[derive(Debug, Default)]
pub struct ObjectStoreStager;

impl Stager for ObjectStoreStager {
    fn stage<'a>(
        &'a self,
        locator: &'a str,
        dest_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, SearchError>> {
        Box::pin(async move {
            if let Ok(meta) = object_access::fetch_metadata(locator).await {
                println!("Staging {} ({} bytes)", locator, meta.size);
            }
            object_access::stage_to_local(locator, dest_dir)
                .await
                .map_err(SearchError::staging)
        })
    }
}

/// Stages dataset files ahead of first use and reports readiness.
pub struct PrefetchCoordinator {
    registry: Arc<DatasetRegistry>,
    executor: Arc<RetrievalExecutor>,
    stager: Arc<dyn Stager>,
    staging_dir: PathBuf,
    states: DashMap<DatasetKey, PrefetchState>,
    events: broadcast::Sender<PrefetchEvent>,
}

impl PrefetchCoordinator {
    pub fn new(
        registry: Arc<DatasetRegistry>,
        executor: Arc<RetrievalExecutor>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_stager(registry, executor, staging_dir, Arc::new(ObjectStoreStager))
    }

    /// Builds a coordinator with a custom stager. Used by tests to observe
    /// and fault-inject staging without network access.
    pub fn with_stager(
        registry: Arc<DatasetRegistry>,
        executor: Arc<RetrievalExecutor>,
        staging_dir: impl Into<PathBuf>,
        stager: Arc<dyn Stager>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        PrefetchCoordinator {
            registry,
            executor,
            stager,
            staging_dir: staging_dir.into(),
            states: DashMap::new(),
            events,
        }
    }

    /// Subscribes to readiness events for all datasets.
    pub fn subscribe(&self) -> broadcast::Receiver<PrefetchEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state of a dataset, `None` when idle.
    pub fn state(&self, key: &DatasetKey) -> Option<PrefetchState> {
        self.states.get(key).map(|entry| entry.value().clone())
    }

    /// Staged local file for a ready dataset, if staging produced one.
    pub fn local_path(&self, key: &DatasetKey) -> Option<PathBuf> {
        match self.states.get(key).map(|entry| entry.value().clone()) {
            Some(PrefetchState::Ready {
                local_path: Some(path),
                ..
            }) => Some(path),
            _ => None,
        }
    }

    /// Starts staging a dataset unless it is already staging or ready.
    ///
    /// Returns `true` when the dataset is already ready, `false` when the
    /// caller should wait for a readiness event. Never blocks; concurrent
    /// calls for the same key start at most one task. A dataset in `Failed`
    /// is retried.
    pub fn ensure_ready(self: &Arc<Self>, key: &DatasetKey) -> bool {
        match self.states.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                PrefetchState::Ready { .. } => return true,
                PrefetchState::Staging => return false,
                PrefetchState::Failed { .. } => {
                    occupied.insert(PrefetchState::Staging);
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(PrefetchState::Staging);
            }
        }

        let coordinator = Arc::clone(self);
        let key = key.clone();
        tokio::spawn(async move {
            coordinator.run_staging(key).await;
        });
        false
    }

    /// Kicks off staging for every configured dataset. Called at startup so
    /// first searches hit warm, local files.
    pub fn warm_all(self: &Arc<Self>) {
        for descriptor in self.registry.iter() {
            self.ensure_ready(&descriptor.key());
        }
    }

    /// Forgets a dataset's readiness and drops the executor's cached
    /// sessions for it, so the next search re-opens a replaced file.
    pub fn invalidate(&self, key: &DatasetKey) {
        let previous = self.states.remove(key);
        if let Some((_, PrefetchState::Ready {
            local_path: Some(path),
            ..
        })) = previous
        {
            self.executor.invalidate(&path.to_string_lossy());
        }
        if let Ok(descriptor) = self.registry.resolve(
            &key.category,
            &key.subcategory,
            key.result_type.as_deref(),
        ) {
            if let Some(locator) = descriptor.locator() {
                self.executor.invalidate(locator);
            }
        }
    }

    async fn run_staging(&self, key: DatasetKey) {
        let descriptor = match self.registry.resolve(
            &key.category,
            &key.subcategory,
            key.result_type.as_deref(),
        ) {
            Ok(descriptor) => descriptor.clone(),
            Err(err) => {
                self.fail(&key, err.to_string());
                return;
            }
        };

        let mut staged_path = descriptor.local_path.as_ref().map(PathBuf::from);
        if staged_path.is_none() {
            let Some(remote) = descriptor.remote_url.as_deref() else {
                self.fail(&key, "dataset has no locator".to_string());
                return;
            };
            let dest_dir = self.staging_dir.join(key.slug());
            match self.stager.stage(remote, &dest_dir).await {
                Ok(path) => staged_path = Some(path),
                Err(err) => {
                    println!("Prefetch staging failed for {}: {}", key, err);
                    self.fail(&key, err.to_string());
                    return;
                }
            }
        }

        // Warm-up: run a one-row browse query so the session is built and
        // the file's schema and footer are read before the first real search.
        let locator = match &staged_path {
            Some(path) => path.to_string_lossy().into_owned(),
            // staged_path is always set here, the no-locator case returned above
            None => return,
        };
        let warm_up = async {
            let plan = build_query_plan(&descriptor, "", &descriptor.default_search_field, 1, 1)?;
            self.executor.execute(&descriptor, &locator, &plan).await
        };
        match warm_up.await {
            Ok(_) => {
                self.states.insert(
                    key.clone(),
                    PrefetchState::Ready {
                        local_path: staged_path.clone(),
                        degraded: false,
                    },
                );
                println!("Prefetch ready for {}", key);
                let _ = self.events.send(PrefetchEvent::Ready {
                    key,
                    local_path: staged_path,
                    degraded: false,
                });
            }
            Err(err) => {
                println!("Prefetch warm-up failed for {}: {}", key, err);
                self.fail(&key, err.to_string());
            }
        }
    }

    /// Records a failure and unblocks listeners with a degraded event.
    ///
    /// The degraded event never carries a local path, even when a file was
    /// staged before the failure: a `Failed` dataset serves no staged copy,
    /// so advertising one would point listeners at a file `local_path`
    /// refuses to return. Searches fall back to the remote locator, and the
    /// staged file is reused by the next staging attempt.
    fn fail(&self, key: &DatasetKey, reason: String) {
        self.states.insert(
            key.clone(),
            PrefetchState::Failed {
                reason: reason.clone(),
            },
        );
        let _ = self.events.send(PrefetchEvent::Error {
            key: key.clone(),
            reason,
        });
        let _ = self.events.send(PrefetchEvent::Ready {
            key: key.clone(),
            local_path: None,
            degraded: true,
        });
    }
}

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;
