//! Drain-cycle orchestration.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::models::{QueueItem, QueueItemId, SyncState};
use crate::services::OfflineStore;
use crate::state::SyncStatus;
use crate::util::unix_millis_now;
use crate::Result;

use super::backoff::BackoffPolicy;
use super::conflict::{ConflictAction, ConflictResolver};
use super::connectivity::Connectivity;
use super::dispatch::{build_request, classify, resolve_request, Dispatcher, Outcome};
use super::events::SyncEvent;
use super::result::{SyncError, SyncErrorKind, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Syncing,
    Aborting,
}

/// Holds the engine in `Syncing` for the lifetime of one cycle.
pub(crate) struct CycleGuard<'a> {
    phase: &'a Mutex<Phase>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *lock(self.phase) = Phase::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of delivering one item.
enum Delivery {
    Synced,
    Resolved,
    Failed(SyncError),
}

/// Drains the offline queue against the remote API.
///
/// At most one cycle runs at a time; a `sync()` that finds one already
/// running returns an empty result without touching the queue. Items are
/// dispatched one by one in `(priority, enqueued_at)` order, and every
/// outcome is written back to the store before the cycle ends.
pub struct SyncEngine<D, C> {
    pub(crate) store: OfflineStore,
    pub(crate) dispatcher: D,
    pub(crate) connectivity: C,
    resolver: ConflictResolver,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) max_retries: u32,
    events: broadcast::Sender<SyncEvent>,
    phase: Mutex<Phase>,
    cancel: Mutex<CancellationToken>,
    rng: Mutex<StdRng>,
}

impl<D, C> SyncEngine<D, C>
where
    D: Dispatcher,
    C: Connectivity,
{
    pub fn new(store: OfflineStore, dispatcher: D, connectivity: C, config: &EngineConfig) -> Self {
        let rng = config
            .backoff
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            store,
            dispatcher,
            connectivity,
            resolver: ConflictResolver::new(config.conflict_strategy),
            backoff: BackoffPolicy::from_config(&config.backoff),
            max_retries: config.max_retries,
            events,
            phase: Mutex::new(Phase::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Replace the backoff curve (e.g. zero delays in tests).
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub const fn store(&self) -> &OfflineStore {
        &self.store
    }

    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Listen for engine events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        *lock(&self.phase) != Phase::Idle
    }

    /// Ask the running cycle to stop after its in-flight request.
    ///
    /// Returns `false` when no cycle is running.
    pub fn abort(&self) -> bool {
        let mut phase = lock(&self.phase);
        if *phase != Phase::Syncing {
            return false;
        }
        *phase = Phase::Aborting;
        lock(&self.cancel).cancel();
        tracing::info!("Sync abort requested");
        true
    }

    pub async fn get_sync_state(&self) -> Result<SyncState> {
        self.store.sync_state().await
    }

    pub async fn queue_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Badge-level summary for the UI.
    pub async fn status(&self) -> SyncStatus {
        if !self.connectivity.is_online() {
            return SyncStatus::Offline;
        }
        if self.is_syncing() {
            return SyncStatus::Syncing;
        }
        match (self.store.count().await, self.store.sync_state().await) {
            (Ok(count), Ok(state)) => SyncStatus::derive(count, &state),
            _ => SyncStatus::Error,
        }
    }

    /// Run a drain cycle unless a failure streak is still cooling down.
    ///
    /// Meant for automatic triggers such as connectivity coming back; an
    /// explicit `sync()` is never delayed.
    pub async fn sync_if_due(&self) -> SyncResult {
        match self.store.sync_state().await {
            Ok(state) => {
                if let Some(next) = state.next_attempt_at(&self.backoff) {
                    let now = unix_millis_now();
                    if now < next {
                        tracing::debug!(
                            "Skipping sync: {} consecutive failures, next attempt in {}ms",
                            state.consecutive_failures,
                            next - now
                        );
                        return SyncResult::default();
                    }
                }
                self.sync().await
            }
            Err(error) => self.storage_failure(&error),
        }
    }

    /// Drain the queue once.
    pub async fn sync(&self) -> SyncResult {
        let Some((_guard, token)) = self.begin_cycle() else {
            tracing::debug!("Sync already in progress");
            return SyncResult::default();
        };

        if !self.connectivity.is_online() {
            let error = SyncError::offline();
            self.emit(SyncEvent::SyncError {
                error: error.clone(),
            });
            return SyncResult {
                errors: vec![error],
                ..SyncResult::default()
            };
        }

        match self.drain(&token).await {
            Ok(result) => result,
            Err(error) => self.storage_failure(&error),
        }
    }

    pub(crate) fn begin_cycle(&self) -> Option<(CycleGuard<'_>, CancellationToken)> {
        let mut phase = lock(&self.phase);
        if *phase != Phase::Idle {
            return None;
        }
        *phase = Phase::Syncing;

        let token = CancellationToken::new();
        *lock(&self.cancel) = token.clone();
        Some((CycleGuard { phase: &self.phase }, token))
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        tracing::trace!("event {}", event.name());
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn storage_failure(&self, error: &crate::Error) -> SyncResult {
        tracing::warn!("Sync aborted, store unavailable: {error}");
        let error = SyncError::storage(error.to_string());
        self.emit(SyncEvent::SyncError {
            error: error.clone(),
        });
        SyncResult {
            errors: vec![error],
            ..SyncResult::default()
        }
    }

    /// Wait out the backoff for an item that failed before.
    ///
    /// Returns `false` if the cycle was cancelled during the wait.
    pub(crate) async fn wait_backoff(&self, retry_count: u32, token: &CancellationToken) -> bool {
        let delay = {
            let mut rng = lock(&self.rng);
            self.backoff.delay(retry_count, &mut *rng)
        };
        if delay == Duration::ZERO {
            return !token.is_cancelled();
        }
        tracing::debug!("Backing off {}ms before retry {retry_count}", delay.as_millis());
        tokio::select! {
            () = token.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    async fn drain(&self, token: &CancellationToken) -> Result<SyncResult> {
        let started_at = unix_millis_now();
        let items = self.store.list_ordered().await?;
        self.store.mark_sync_attempt(started_at).await?;

        tracing::info!("Sync started with {} queued items", items.len());
        self.emit(SyncEvent::SyncStart {
            pending: items.len(),
        });

        let mut result = SyncResult::default();
        let mut synced: Vec<QueueItemId> = Vec::new();

        for mut item in items {
            if token.is_cancelled() {
                result.aborted = true;
                break;
            }
            if !self.connectivity.is_online() {
                tracing::info!("Connectivity lost mid-cycle");
                result.errors.push(SyncError::offline());
                result.aborted = true;
                break;
            }

            if item.is_exhausted(self.max_retries) {
                let error = SyncError::for_item(
                    &item,
                    SyncErrorKind::MaxRetriesExceeded,
                    format!(
                        "gave up after {} attempts: {}",
                        item.retry_count,
                        item.last_error.as_deref().unwrap_or("unknown error")
                    ),
                    false,
                );
                self.emit(SyncEvent::ItemFailed {
                    error: error.clone(),
                    retry_count: item.retry_count,
                });
                result.fail(error);
                continue;
            }

            if item.retry_count > 0 && !self.wait_backoff(item.retry_count, token).await {
                result.aborted = true;
                break;
            }

            let delivery = match self.deliver(&item).await {
                Ok(delivery) => delivery,
                Err(error) if error.is_storage_failure() => {
                    tracing::warn!("Store failed mid-cycle: {error}");
                    result.errors.push(SyncError::storage(error.to_string()));
                    break;
                }
                Err(error) => {
                    tracing::warn!("Skipping {}: {error}", item.id);
                    continue;
                }
            };

            let conflicted = matches!(delivery, Delivery::Resolved);
            match delivery {
                Delivery::Synced | Delivery::Resolved => {
                    result.success += 1;
                    if conflicted {
                        result.conflicts += 1;
                    }
                    synced.push(item.id);
                    self.emit(SyncEvent::ItemSynced {
                        item_id: item.id.to_string(),
                        kind: item.kind,
                        entity: item.entity(),
                    });
                }
                Delivery::Failed(error) => {
                    item.record_failure(error.message.clone(), error.retryable, self.max_retries);
                    tracing::warn!(
                        "Item {} failed (attempt {}): {}",
                        item.id,
                        item.retry_count,
                        error.message
                    );
                    match self.store.update_item(&item).await {
                        Ok(()) => {}
                        Err(store_error) if store_error.is_storage_failure() => {
                            result.errors.push(SyncError::storage(store_error.to_string()));
                            result.fail(error);
                            break;
                        }
                        Err(store_error) => {
                            // Discarded while its request was in flight.
                            tracing::info!("Item {} is gone: {store_error}", item.id);
                            continue;
                        }
                    }
                    self.emit(SyncEvent::ItemFailed {
                        error: error.clone(),
                        retry_count: item.retry_count,
                    });
                    result.fail(error);
                }
            }
        }

        self.finish(result, &synced).await
    }

    async fn deliver(&self, item: &QueueItem) -> Result<Delivery> {
        let request = match resolve_request(item) {
            Ok(request) => request,
            Err(message) => {
                return Ok(Delivery::Failed(SyncError::for_item(
                    item,
                    SyncErrorKind::TerminalClientError,
                    message,
                    false,
                )))
            }
        };

        let response = match self.dispatcher.send(request).await {
            Ok(response) => response,
            Err(error) => {
                return Ok(Delivery::Failed(SyncError::for_item(
                    item,
                    SyncErrorKind::NetworkTransient,
                    error.to_string(),
                    true,
                )))
            }
        };

        match classify(item.kind, &response) {
            Outcome::Success => Ok(Delivery::Synced),
            Outcome::NotFoundOnDelete => {
                tracing::debug!("Delete target of {} already gone", item.id);
                Ok(Delivery::Synced)
            }
            Outcome::Conflict(server_payload) => self.resolve_conflict(item, server_payload).await,
            Outcome::Failure {
                kind,
                message,
                retryable,
            } => Ok(Delivery::Failed(SyncError::for_item(
                item, kind, message, retryable,
            ))),
        }
    }

    async fn resolve_conflict(
        &self,
        item: &QueueItem,
        server_payload: Option<Value>,
    ) -> Result<Delivery> {
        self.emit(SyncEvent::ConflictDetected {
            item_id: item.id.to_string(),
            entity: item.entity(),
            server_payload: server_payload.clone(),
        });

        let resolution = self
            .resolver
            .resolve(item, server_payload, unix_millis_now());
        let record = self.store.record_conflict(&resolution.record).await?;
        tracing::info!(
            "Conflict on {} resolved as {}",
            item.id,
            record.resolution
        );
        self.emit(SyncEvent::ConflictResolved { record });

        let ConflictAction::Resend(payload) = resolution.action else {
            return Ok(Delivery::Resolved);
        };

        let request = match build_request(item, payload) {
            Ok(request) => request,
            Err(message) => {
                return Ok(Delivery::Failed(SyncError::for_item(
                    item,
                    SyncErrorKind::TerminalClientError,
                    message,
                    false,
                )))
            }
        };
        let delivery = match self.dispatcher.send(request).await {
            Ok(response) => match classify(item.kind, &response) {
                Outcome::Success | Outcome::NotFoundOnDelete => Delivery::Resolved,
                Outcome::Conflict(_) => Delivery::Failed(SyncError::for_item(
                    item,
                    SyncErrorKind::Conflict,
                    "conflict persisted after resend",
                    true,
                )),
                Outcome::Failure {
                    kind,
                    message,
                    retryable,
                } => Delivery::Failed(SyncError::for_item(item, kind, message, retryable)),
            },
            Err(error) => Delivery::Failed(SyncError::for_item(
                item,
                SyncErrorKind::NetworkTransient,
                error.to_string(),
                true,
            )),
        };
        Ok(delivery)
    }

    /// Remove what went through and record how the cycle went.
    async fn finish(&self, mut result: SyncResult, synced: &[QueueItemId]) -> Result<SyncResult> {
        if !synced.is_empty() {
            if let Err(error) = self.store.remove_many(synced).await {
                tracing::warn!("Failed to remove {} synced items: {error}", synced.len());
                result.errors.push(SyncError::storage(error.to_string()));
            }
        }

        if result.failed > 0 || !result.errors.is_empty() {
            let state = self.store.mark_sync_failure().await?;
            tracing::warn!(
                "Sync finished with {} failures ({} in a row)",
                result.failed,
                state.consecutive_failures
            );
        } else {
            self.store.mark_sync_success(unix_millis_now()).await?;
            if result.aborted {
                tracing::info!("Sync aborted after {} items", result.success);
            } else {
                tracing::info!(
                    "Sync complete: {} synced, {} conflicts",
                    result.success,
                    result.conflicts
                );
            }
        }

        self.emit(SyncEvent::SyncComplete {
            result: result.clone(),
        });
        Ok(result)
    }
}
