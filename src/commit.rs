//! Commit queue — debounced, cancellable remote writes for local edits.
//!
//! DESIGN
//! ======
//! Every settled local edit schedules one write keyed by `(object, field)`.
//! The write sleeps for the debounce window, then goes through the gateway
//! with a single retry. Scheduling again for the same key aborts the sleeping
//! task and replaces it, so a burst of edits coalesces into one write
//! carrying the latest value.
//!
//! A task re-checks its generation under the queue lock before it touches the
//! gateway. An aborted or superseded commit therefore never fires late, even
//! if the abort raced the timer. The generation stays registered while the
//! write is in flight, and every attempt (the retry included) checks it
//! again, so cancelling during the retry backoff also stops the write.
//!
//! Leaving a room flushes rather than cancels: waiting writes are sent at
//! once, with targets resolved before the store is reset.
//!
//! ERROR HANDLING
//! ==============
//! A failed write never rolls back the store. The key is recorded as failed
//! and [`SaveStatus`] flips to `Unsaved`; the next successful write for that
//! key clears it.

#[cfg(test)]
#[path = "commit_test.rs"]
mod commit_test;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::doc::{Content, ObjectId, Position};
use crate::gateway::{ErrorCode, GatewayError, PersistenceGateway, RetryPolicy, with_retry};
use crate::store::{Adoption, SharedStore};

// =============================================================================
// TYPES
// =============================================================================

/// Which group of fields a write persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitField {
    Position,
    Content,
    Transform,
    /// Creation or deletion of the object itself.
    Lifecycle,
}

/// Identity of a pending write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitKey {
    pub id: ObjectId,
    pub field: CommitField,
}

/// The value a debounced write will persist.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitIntent {
    Position { position: Position, z_index: i64 },
    Content(Content),
    Transform { rotation: f64, scale: f64 },
}

impl CommitIntent {
    #[must_use]
    pub fn field(&self) -> CommitField {
        match self {
            Self::Position { .. } => CommitField::Position,
            Self::Content(_) => CommitField::Content,
            Self::Transform { .. } => CommitField::Transform,
        }
    }
}

/// Non-blocking save indicator for the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Saved,
    /// Writes scheduled or in flight.
    Pending { count: usize },
    /// At least one write failed after its retry.
    Unsaved { failed: usize },
}

struct PendingCommit {
    generation: u64,
    intent: CommitIntent,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<CommitKey, PendingCommit>,
    in_flight: usize,
    /// Generation of each debounced write past its debounce window.
    sending: HashMap<CommitKey, u64>,
    failed: HashSet<CommitKey>,
    next_generation: u64,
}

struct QueueInner {
    gateway: Arc<dyn PersistenceGateway>,
    store: SharedStore,
    debounce: Duration,
    retry: RetryPolicy,
    state: Mutex<QueueState>,
    status: watch::Sender<SaveStatus>,
}

// =============================================================================
// QUEUE
// =============================================================================

/// Debounced writer shared by the drag controller, the session and the
/// reconciler. Cloning is cheap; all clones share one queue.
#[derive(Clone)]
pub struct CommitQueue {
    inner: Arc<QueueInner>,
}

impl CommitQueue {
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>, store: SharedStore, config: &SyncConfig) -> Self {
        let (status, _) = watch::channel(SaveStatus::Saved);
        Self {
            inner: Arc::new(QueueInner {
                gateway,
                store,
                debounce: config.commit_debounce,
                retry: retry_policy(config),
                state: Mutex::new(QueueState::default()),
                status,
            }),
        }
    }

    /// Watch the save indicator.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    /// Retry policy shared with non-debounced writes.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Schedule `intent` for `id` after the debounce window, superseding any
    /// pending write for the same field.
    pub fn schedule(&self, id: ObjectId, intent: CommitIntent) {
        let key = CommitKey { id, field: intent.field() };
        let mut state = self.inner.lock_state();
        state.next_generation += 1;
        let generation = state.next_generation;
        if let Some(previous) = state.pending.remove(&key) {
            previous.task.abort();
            debug!(object_id = %id, field = ?key.field, "superseded pending commit");
        }
        state.sending.remove(&key);

        // The task cannot observe its own entry until this lock is released.
        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            QueueInner::fire(inner, key, generation).await;
        });
        state.pending.insert(key, PendingCommit { generation, intent, task });
        self.inner.publish(&state);
    }

    /// Take back the pending write for one field without sending it.
    pub fn suspend(&self, id: ObjectId, field: CommitField) -> Option<CommitIntent> {
        let mut state = self.inner.lock_state();
        let pending = state.pending.remove(&CommitKey { id, field })?;
        pending.task.abort();
        self.inner.publish(&state);
        Some(pending.intent)
    }

    /// Cancel every waiting or retrying write for `id`. Returns how many
    /// were cancelled.
    pub fn cancel(&self, id: ObjectId) -> usize {
        let mut state = self.inner.lock_state();
        let keys: Vec<CommitKey> = state.pending.keys().filter(|k| k.id == id).copied().collect();
        for key in &keys {
            if let Some(pending) = state.pending.remove(key) {
                pending.task.abort();
            }
        }
        let before = state.sending.len();
        state.sending.retain(|key, _| key.id != id);
        let count = keys.len() + before - state.sending.len();
        if count > 0 {
            debug!(object_id = %id, count, "cancelled pending commits");
            self.inner.publish(&state);
        }
        count
    }

    /// Send every waiting write now instead of after its debounce window.
    /// Returns how many were flushed.
    ///
    /// Targets are resolved before this returns, so the store may be reset
    /// right after (room teardown).
    pub fn flush_all(&self) -> usize {
        let drained: Vec<(CommitKey, PendingCommit)> = {
            let mut state = self.inner.lock_state();
            let drained: Vec<_> = state.pending.drain().collect();
            for (key, pending) in &drained {
                pending.task.abort();
                state.in_flight += 1;
                state.sending.insert(*key, pending.generation);
            }
            self.inner.publish(&state);
            drained
        };
        let count = drained.len();
        for (key, pending) in drained {
            let target = self.inner.resolve_target(key);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(QueueInner::send(inner, key, pending.generation, pending.intent, target));
        }
        if count > 0 {
            debug!(count, "flushed pending commits");
        }
        count
    }

    /// Whether a write is waiting for its debounce window.
    #[must_use]
    pub fn is_pending(&self, id: ObjectId, field: CommitField) -> bool {
        self.inner.lock_state().pending.contains_key(&CommitKey { id, field })
    }

    /// Every write still waiting for its debounce window.
    #[must_use]
    pub fn pending_intents(&self) -> Vec<(ObjectId, CommitIntent)> {
        self.inner
            .lock_state()
            .pending
            .iter()
            .map(|(key, pending)| (key.id, pending.intent.clone()))
            .collect()
    }

    /// Cancel pending writes for `id` and delete it remotely now.
    ///
    /// An object the backend no longer has counts as deleted.
    pub fn delete(&self, id: ObjectId) {
        self.cancel(id);
        self.begin_write();
        let queue = self.clone();
        tokio::spawn(async move {
            let gateway = Arc::clone(&queue.inner.gateway);
            let result = with_retry(queue.inner.retry, "delete", || gateway.delete_object(id)).await;
            let result = match result {
                Err(GatewayError::NotFound(_)) => Ok(()),
                other => other,
            };
            queue.finish_write(CommitKey { id, field: CommitField::Lifecycle }, &result);
        });
    }

    /// Follow up on a pending object that just received its persisted id.
    ///
    /// Writes queued against the temporary id are dropped; whatever the user
    /// changed while the object was pending is committed against the
    /// persisted id, and a local delete is forwarded.
    pub fn settle_adoption(&self, adoption: &Adoption) {
        self.cancel(adoption.temp_id);
        if adoption.deleted_locally {
            debug!(object_id = %adoption.id, "deleting object removed while pending");
            self.delete(adoption.id);
            return;
        }
        let Some(diverged) = &adoption.diverged else {
            return;
        };
        let obj = &diverged.object;
        if diverged.position {
            self.schedule(adoption.id, CommitIntent::Position { position: obj.position, z_index: obj.z_index });
        }
        if diverged.content {
            self.schedule(adoption.id, CommitIntent::Content(obj.content.clone()));
        }
        if diverged.transform {
            self.schedule(adoption.id, CommitIntent::Transform { rotation: obj.rotation, scale: obj.scale });
        }
    }

    /// Mark a non-debounced write as in flight.
    pub fn begin_write(&self) {
        let mut state = self.inner.lock_state();
        state.in_flight += 1;
        self.inner.publish(&state);
    }

    /// Settle a write started with [`CommitQueue::begin_write`].
    pub fn finish_write(&self, key: CommitKey, result: &Result<(), GatewayError>) {
        self.inner.finish(key, result);
    }
}

impl QueueInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &QueueState) {
        let status = if !state.failed.is_empty() {
            SaveStatus::Unsaved { failed: state.failed.len() }
        } else if state.pending.is_empty() && state.in_flight == 0 {
            SaveStatus::Saved
        } else {
            SaveStatus::Pending { count: state.pending.len() + state.in_flight }
        };
        self.status.send_replace(status);
    }

    async fn fire(inner: Arc<QueueInner>, key: CommitKey, generation: u64) {
        let intent = {
            let mut state = inner.lock_state();
            match state.pending.get(&key) {
                Some(pending) if pending.generation == generation => {}
                _ => return,
            }
            let Some(pending) = state.pending.remove(&key) else {
                return;
            };
            state.in_flight += 1;
            state.sending.insert(key, generation);
            inner.publish(&state);
            pending.intent
        };
        let target = inner.resolve_target(key);
        Self::send(inner, key, generation, intent, target).await;
    }

    /// The persisted id to write `key` against, if its object is live.
    fn resolve_target(&self, key: CommitKey) -> Option<ObjectId> {
        let store = self.store.lock();
        store.persisted_id(&key.id).filter(|id| store.get_live(id).is_some())
    }

    fn is_sending(&self, key: CommitKey, generation: u64) -> bool {
        self.lock_state().sending.get(&key) == Some(&generation)
    }

    async fn send(inner: Arc<QueueInner>, key: CommitKey, generation: u64, intent: CommitIntent, target: Option<ObjectId>) {
        let Some(target) = target else {
            // Deleted, unknown, or still awaiting its persisted id; adoption
            // commits edits made while pending.
            debug!(object_id = %key.id, field = ?key.field, "commit skipped; no live persisted object");
            inner.finish_sending(key, generation, &Ok(()));
            return;
        };

        let gateway = Arc::clone(&inner.gateway);
        let queue = Arc::clone(&inner);
        let result = with_retry(inner.retry, "commit", || {
            let gateway = Arc::clone(&gateway);
            let queue = Arc::clone(&queue);
            let intent = intent.clone();
            async move {
                let cancelled = !queue.is_sending(key, generation);
                if cancelled {
                    debug!(object_id = %key.id, field = ?key.field, "commit cancelled while in flight");
                    return Ok(());
                }
                send_intent(gateway.as_ref(), target, &intent).await
            }
        })
        .await;

        // A write that lost the race against a delete has nothing left to save.
        let result = match result {
            Err(GatewayError::NotFound(_)) if inner.store.lock().get_live(&target).is_none() => Ok(()),
            other => other,
        };
        inner.finish_sending(key, generation, &result);
    }

    fn finish_sending(&self, key: CommitKey, generation: u64, result: &Result<(), GatewayError>) {
        {
            let mut state = self.lock_state();
            if state.sending.get(&key) == Some(&generation) {
                state.sending.remove(&key);
            }
        }
        self.finish(key, result);
    }

    fn finish(&self, key: CommitKey, result: &Result<(), GatewayError>) {
        let mut state = self.lock_state();
        state.in_flight = state.in_flight.saturating_sub(1);
        match result {
            Ok(()) => {
                state.failed.remove(&key);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    code = e.error_code(),
                    object_id = %key.id,
                    field = ?key.field,
                    "write failed; keeping local state"
                );
                state.failed.insert(key);
            }
        }
        self.publish(&state);
    }
}

/// Send one intent through the gateway.
async fn send_intent(gateway: &dyn PersistenceGateway, id: ObjectId, intent: &CommitIntent) -> Result<(), GatewayError> {
    match intent {
        CommitIntent::Position { position, z_index } => {
            gateway
                .commit_position(id, position.x, position.y, *z_index)
                .await
        }
        CommitIntent::Content(content) => gateway.commit_content(id, content).await,
        CommitIntent::Transform { rotation, scale } => gateway.commit_transform(id, *rotation, *scale).await,
    }
}

fn retry_policy(config: &SyncConfig) -> RetryPolicy {
    RetryPolicy { max_attempts: config.max_commit_attempts, backoff: config.retry_backoff }
}
