//! Change-feed reconciler — merges remote events into the optimistic store.
//!
//! DESIGN
//! ======
//! Events may arrive out of production order, so arrival order decides
//! nothing. The merge policy, per event:
//!
//! - Insert: unknown ids are added. An insert whose `client_ref` names a
//!   pending local object is that object's echo; the pending entry is
//!   re-keyed under the persisted id instead of being duplicated. An insert
//!   for an id already held is a duplicate and changes nothing.
//! - Update: applied only when `server_ts` is strictly newer than the local
//!   `updated_at`; otherwise it is stale and dropped. An applied update
//!   replaces the whole object, so local writes still waiting for it are
//!   older and are cancelled.
//! - Delete: always wins. The entry is tombstoned and its pending commits are
//!   cancelled, even if a local drag was about to write.
//!
//! Tombstoned ids, and ids deleted before they were ever seen, ignore any
//! later insert or update.
//!
//! A reconnect means events may have been missed. The reconciler never
//! trusts the gap; it refetches the room and replaces the store wholesale.

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::commit::{CommitIntent, CommitQueue};
use crate::doc::{ObjectId, PlacedObject, RoomId, Timestamp};
use crate::feed::{Change, ChangeEvent, FeedMessage, Subscription, UnsubscribeGuard};
use crate::gateway::{ErrorCode, GatewayError, PersistenceGateway, with_retry};
use crate::store::{Adoption, OptimisticStore, SharedStore};

// =============================================================================
// MERGE POLICY
// =============================================================================

/// What applying one event did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// A previously unknown object was added.
    Inserted(ObjectId),
    /// The echo of a local creation re-keyed a pending entry.
    Adopted(Adoption),
    /// A strictly newer remote version replaced the local one.
    Applied(ObjectId),
    /// The event was not newer than local state and was dropped.
    Stale(ObjectId),
    /// The object was tombstoned.
    Tombstoned(ObjectId),
    /// A delete for an unknown id was remembered.
    DeleteRemembered(ObjectId),
    /// The object is deleted; the event cannot bring it back.
    IgnoredDeleted(ObjectId),
    /// The event belongs to another room.
    ForeignRoom,
}

/// Apply one change event to the store under the last-write-wins policy.
pub fn apply_change(store: &mut OptimisticStore, event: ChangeEvent) -> MergeOutcome {
    if store.room_id().is_some_and(|room| room != event.room_id) {
        return MergeOutcome::ForeignRoom;
    }
    let server_ts = event.server_ts;
    match event.change {
        Change::Insert(obj) => merge_object(store, obj, server_ts, true),
        Change::Update(obj) => merge_object(store, obj, server_ts, false),
        Change::Delete(id) => {
            if store.tombstone(&id, server_ts) {
                MergeOutcome::Tombstoned(id)
            } else {
                store.note_unseen_delete(id);
                MergeOutcome::DeleteRemembered(id)
            }
        }
    }
}

fn merge_object(store: &mut OptimisticStore, mut obj: PlacedObject, server_ts: Timestamp, is_insert: bool) -> MergeOutcome {
    let id = obj.id;
    if store.is_unseen_delete(&id) {
        return MergeOutcome::IgnoredDeleted(id);
    }
    obj.updated_at = server_ts;
    obj.deleted_at = None;

    if let Some(client_ref) = obj.client_ref {
        if store.is_pending(&client_ref) {
            if let Some(adoption) = store.adopt(client_ref, obj) {
                return MergeOutcome::Adopted(adoption);
            }
            return MergeOutcome::Stale(id);
        }
    }

    let local_updated_at = match store.get(&id) {
        None => {
            store.upsert(obj);
            return MergeOutcome::Inserted(id);
        }
        Some(local) if local.is_tombstoned() => return MergeOutcome::IgnoredDeleted(id),
        // A repeated insert describes the creation, which local state has
        // already moved past.
        Some(_) if is_insert => return MergeOutcome::Stale(id),
        Some(local) => local.updated_at,
    };

    if server_ts > local_updated_at {
        store.upsert(obj);
        MergeOutcome::Applied(id)
    } else {
        MergeOutcome::Stale(id)
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

/// Applies a room's change feed to the store and refetches on reconnect.
#[derive(Clone)]
pub struct ChangeFeedReconciler {
    room_id: RoomId,
    store: SharedStore,
    commits: CommitQueue,
    gateway: Arc<dyn PersistenceGateway>,
}

impl ChangeFeedReconciler {
    #[must_use]
    pub fn new(room_id: RoomId, store: SharedStore, commits: CommitQueue, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { room_id, store, commits, gateway }
    }

    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Merge one event and carry out its side effects on pending commits.
    pub fn apply(&self, event: ChangeEvent) -> MergeOutcome {
        let outcome = apply_change(&mut self.store.lock(), event);
        match &outcome {
            MergeOutcome::Tombstoned(id) => {
                self.commits.cancel(*id);
                debug!(object_id = %id, room_id = %self.room_id, "remote delete applied");
            }
            MergeOutcome::Applied(id) => {
                let superseded = self.commits.cancel(*id);
                if superseded > 0 {
                    debug!(object_id = %id, superseded, "newer remote version replaced pending local writes");
                }
            }
            MergeOutcome::Adopted(adoption) => {
                debug!(temp_id = %adoption.temp_id, object_id = %adoption.id, "local object confirmed by echo");
                self.commits.settle_adoption(adoption);
            }
            MergeOutcome::Stale(id) => trace!(object_id = %id, "stale event discarded"),
            MergeOutcome::ForeignRoom => trace!(room_id = %self.room_id, "event for another room ignored"),
            other => trace!(outcome = ?other, "event merged"),
        }
        outcome
    }

    /// Reload the room and replace the store with the snapshot.
    ///
    /// Writes still waiting in the commit queue are laid back over the
    /// snapshot so a local edit that has not been sent yet does not snap
    /// back, unless the snapshot record is newer than the local one; those
    /// writes are cancelled instead. Returns the number of live objects
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the gateway error if the room could not be loaded; the store
    /// is left untouched in that case.
    pub async fn refetch(&self) -> Result<usize, GatewayError> {
        let gateway = Arc::clone(&self.gateway);
        let room_id = self.room_id;
        let objects = with_retry(self.commits.retry_policy(), "load_room", || gateway.load_room(room_id)).await?;
        let pending = self.commits.pending_intents();

        let (adoptions, superseded, live) = {
            let mut store = self.store.lock();
            if store.room_id() != Some(room_id) {
                debug!(room_id = %room_id, "refetch result dropped; room no longer open");
                return Ok(0);
            }
            let local_stamps: HashMap<ObjectId, Timestamp> = pending
                .iter()
                .filter_map(|(id, _)| store.get(&store.resolve(id)).map(|obj| (*id, obj.updated_at)))
                .collect();
            let adoptions = store.replace_all(objects);
            let mut superseded = Vec::new();
            for (id, intent) in pending {
                let target = store.resolve(&id);
                let remote_newer = match (store.get(&target), local_stamps.get(&id)) {
                    (Some(obj), Some(local)) => obj.updated_at > *local,
                    _ => false,
                };
                if remote_newer {
                    superseded.push(id);
                } else {
                    store.update(&target, |obj| overlay_intent(obj, &intent));
                }
            }
            (adoptions, superseded, store.list().len())
        };

        for id in superseded {
            self.commits.cancel(id);
            debug!(object_id = %id, "snapshot newer than pending local write; write cancelled");
        }
        for adoption in &adoptions {
            self.commits.settle_adoption(adoption);
        }
        info!(room_id = %room_id, objects = live, adopted = adoptions.len(), "room refetched");
        Ok(live)
    }

    /// Drain `subscription` on a background task until the handle drops.
    #[must_use]
    pub fn spawn(self, mut subscription: Subscription) -> ReconcilerHandle {
        let room_id = self.room_id;
        let guard = subscription.take_guard();
        let task = tokio::spawn(async move {
            while let Some(msg) = subscription.next().await {
                match msg {
                    FeedMessage::Change(event) => {
                        self.apply(event);
                    }
                    FeedMessage::Reconnected => {
                        info!(room_id = %room_id, "change feed reconnected; refetching");
                        if let Err(e) = self.refetch().await {
                            warn!(error = %e, code = e.error_code(), room_id = %room_id, "refetch after reconnect failed");
                        }
                    }
                }
            }
            debug!(room_id = %room_id, "change feed closed");
        });
        ReconcilerHandle { room_id, task, _guard: guard }
    }
}

fn overlay_intent(obj: &mut PlacedObject, intent: &CommitIntent) {
    if obj.is_tombstoned() {
        return;
    }
    match intent {
        CommitIntent::Position { position, z_index } => {
            obj.position = *position;
            obj.z_index = *z_index;
        }
        CommitIntent::Content(content) => obj.content = content.clone(),
        CommitIntent::Transform { rotation, scale } => {
            obj.rotation = *rotation;
            obj.scale = *scale;
        }
    }
}

/// Owns the reconciler task. Dropping it stops the task and unsubscribes
/// before `drop` returns.
pub struct ReconcilerHandle {
    room_id: RoomId,
    task: JoinHandle<()>,
    _guard: UnsubscribeGuard,
}

impl ReconcilerHandle {
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
