//! Optimistic in-memory store for the objects of the open room.
//!
//! DESIGN
//! ======
//! The store is the single source of truth the view renders from. Local edits
//! land here immediately; remote change events are merged in by the
//! reconciler. Views subscribe to a broadcast channel of [`StoreChange`]s
//! instead of polling.
//!
//! Objects created locally start under a client-generated temporary id and
//! are tracked as pending until the persisted id is known. Adoption re-keys
//! the entry and remembers the alias so late references to the temporary id
//! still resolve.
//!
//! Deletes are soft: a tombstone stays in the map (hidden from `list`) so a
//! late Insert or Update cannot resurrect the object. Tombstones are dropped
//! only by `purge_tombstones` or a room reset.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use crate::doc::{ObjectId, PlacedObject, RoomId, Timestamp};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Notification emitted after every store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// The whole contents were replaced (room switch or refetch).
    Reset,
    Upserted(ObjectId),
    Removed(ObjectId),
}

/// Local edits made to a pending object that the backend does not hold yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    /// The merged record now in the store.
    pub object: PlacedObject,
    pub position: bool,
    pub content: bool,
    pub transform: bool,
}

/// Result of confirming a pending object under its persisted id.
#[derive(Debug, Clone, PartialEq)]
pub struct Adoption {
    pub temp_id: ObjectId,
    pub id: ObjectId,
    pub diverged: Option<Divergence>,
    /// The object was deleted locally before its id was confirmed.
    pub deleted_locally: bool,
}

/// In-memory `ObjectId -> PlacedObject` map scoped to one room.
pub struct OptimisticStore {
    room_id: Option<RoomId>,
    objects: HashMap<ObjectId, PlacedObject>,
    /// Temporary ids of locally created objects awaiting confirmation.
    pending: HashSet<ObjectId>,
    /// Temporary id -> persisted id, for confirmed objects.
    aliases: HashMap<ObjectId, ObjectId>,
    /// Ids deleted remotely before this store ever saw them.
    unseen_deletes: HashSet<ObjectId>,
    changes: broadcast::Sender<StoreChange>,
}

impl OptimisticStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            room_id: None,
            objects: HashMap::new(),
            pending: HashSet::new(),
            aliases: HashMap::new(),
            unseen_deletes: HashSet::new(),
            changes,
        }
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// The room this store currently holds, if any.
    #[must_use]
    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    /// Drop everything and scope the store to `room_id`.
    pub fn reset(&mut self, room_id: Option<RoomId>) {
        self.room_id = room_id;
        self.objects.clear();
        self.pending.clear();
        self.aliases.clear();
        self.unseen_deletes.clear();
        self.notify(StoreChange::Reset);
    }

    /// Replace the contents with an authoritative snapshot.
    ///
    /// Local tombstones and unconfirmed local creations survive the swap.
    /// Pending objects whose confirmation appears in the snapshot (matched by
    /// `client_ref`) are adopted; the adoptions are returned so the caller can
    /// commit edits made while pending.
    pub fn replace_all(&mut self, objects: Vec<PlacedObject>) -> Vec<Adoption> {
        let mut previous = std::mem::take(&mut self.objects);
        let mut confirmed_refs = HashMap::new();

        for obj in objects {
            if self.unseen_deletes.contains(&obj.id) {
                continue;
            }
            if let Some(client_ref) = obj.client_ref {
                if self.pending.contains(&client_ref) {
                    confirmed_refs.insert(client_ref, obj);
                    continue;
                }
            }
            self.objects.insert(obj.id, obj);
        }

        for (id, local) in previous.drain() {
            if self.pending.contains(&id) || local.is_tombstoned() {
                self.objects.insert(id, local);
            }
        }

        let mut adoptions = Vec::new();
        for (temp_id, confirmed) in confirmed_refs {
            if let Some(adoption) = self.adopt_quiet(temp_id, confirmed) {
                adoptions.push(adoption);
            }
        }

        self.notify(StoreChange::Reset);
        adoptions
    }

    /// Insert or replace an object by id.
    pub fn upsert(&mut self, obj: PlacedObject) {
        let id = obj.id;
        self.objects.insert(id, obj);
        self.notify(StoreChange::Upserted(id));
    }

    /// Insert a locally created object and mark it pending confirmation.
    pub fn insert_pending(&mut self, obj: PlacedObject) {
        self.pending.insert(obj.id);
        self.upsert(obj);
    }

    /// Mutate an existing entry in place. Returns `false` if absent.
    pub fn update<F>(&mut self, id: &ObjectId, f: F) -> bool
    where
        F: FnOnce(&mut PlacedObject),
    {
        let Some(obj) = self.objects.get_mut(id) else {
            return false;
        };
        f(obj);
        self.notify(StoreChange::Upserted(*id));
        true
    }

    /// Physically remove an entry. Absence is a no-op.
    pub fn remove(&mut self, id: &ObjectId) -> Option<PlacedObject> {
        let removed = self.objects.remove(id);
        self.pending.remove(id);
        if removed.is_some() {
            self.notify(StoreChange::Removed(*id));
        }
        removed
    }

    /// Soft-delete an entry. Returns `false` if the id is unknown.
    pub fn tombstone(&mut self, id: &ObjectId, at: Timestamp) -> bool {
        let Some(obj) = self.objects.get_mut(id) else {
            return false;
        };
        if obj.deleted_at.is_none() {
            obj.deleted_at = Some(at);
        }
        self.notify(StoreChange::Removed(*id));
        true
    }

    /// Drop every tombstone. Returns how many were purged.
    pub fn purge_tombstones(&mut self) -> usize {
        let before = self.objects.len();
        let pending = &self.pending;
        self.objects.retain(|id, obj| !obj.is_tombstoned() || pending.contains(id));
        let purged = before - self.objects.len();
        if purged > 0 {
            self.notify(StoreChange::Reset);
        }
        purged
    }

    /// Look up an entry, tombstoned or not.
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&PlacedObject> {
        self.objects.get(id)
    }

    /// Look up a live (non-tombstoned) entry.
    #[must_use]
    pub fn get_live(&self, id: &ObjectId) -> Option<&PlacedObject> {
        self.objects.get(id).filter(|o| !o.is_tombstoned())
    }

    /// All live objects in stacking order: `(z_index, updated_at, id)`.
    #[must_use]
    pub fn list(&self) -> Vec<&PlacedObject> {
        let mut objs: Vec<&PlacedObject> = self.objects.values().filter(|o| !o.is_tombstoned()).collect();
        objs.sort_by(|a, b| {
            a.z_index
                .cmp(&b.z_index)
                .then_with(|| a.updated_at.cmp(&b.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        objs
    }

    /// Highest and lowest `z_index` among live objects.
    #[must_use]
    pub fn z_range(&self) -> Option<(i64, i64)> {
        let mut live = self.objects.values().filter(|o| !o.is_tombstoned());
        let first = live.next()?.z_index;
        Some(live.fold((first, first), |(lo, hi), o| (lo.min(o.z_index), hi.max(o.z_index))))
    }

    #[must_use]
    pub fn is_pending(&self, id: &ObjectId) -> bool {
        self.pending.contains(id)
    }

    /// The id to use against the backend for `id`.
    ///
    /// Follows temporary-id aliases. `None` while the object is still pending
    /// confirmation or when it is unknown.
    #[must_use]
    pub fn persisted_id(&self, id: &ObjectId) -> Option<ObjectId> {
        if let Some(real) = self.aliases.get(id) {
            return Some(*real);
        }
        if self.pending.contains(id) || !self.objects.contains_key(id) {
            return None;
        }
        Some(*id)
    }

    /// Follow an alias left by adoption; other ids map to themselves.
    #[must_use]
    pub fn resolve(&self, id: &ObjectId) -> ObjectId {
        self.aliases.get(id).copied().unwrap_or(*id)
    }

    /// Confirm a pending object under its persisted id.
    ///
    /// Returns `None` when `temp_id` is not pending (already adopted, or never
    /// created here).
    pub fn adopt(&mut self, temp_id: ObjectId, confirmed: PlacedObject) -> Option<Adoption> {
        let adoption = self.adopt_quiet(temp_id, confirmed)?;
        self.notify(StoreChange::Removed(adoption.temp_id));
        self.notify(StoreChange::Upserted(adoption.id));
        Some(adoption)
    }

    fn adopt_quiet(&mut self, temp_id: ObjectId, confirmed: PlacedObject) -> Option<Adoption> {
        if !self.pending.remove(&temp_id) {
            return None;
        }
        let id = confirmed.id;
        let local = self.objects.remove(&temp_id);
        self.aliases.insert(temp_id, id);

        let mut adoption = Adoption { temp_id, id, diverged: None, deleted_locally: false };
        let merged = match local {
            Some(local) if local.is_tombstoned() => {
                adoption.deleted_locally = true;
                PlacedObject { deleted_at: local.deleted_at, ..confirmed }
            }
            Some(local) if local.diverges_from(&confirmed) => {
                let position = local.position != confirmed.position || local.z_index != confirmed.z_index;
                let content = local.content != confirmed.content;
                let transform = local.rotation != confirmed.rotation || local.scale != confirmed.scale;
                let merged = PlacedObject {
                    position: local.position,
                    z_index: local.z_index,
                    rotation: local.rotation,
                    scale: local.scale,
                    content: local.content,
                    updated_at: local.updated_at.max(confirmed.updated_at),
                    ..confirmed
                };
                adoption.diverged = Some(Divergence { object: merged.clone(), position, content, transform });
                merged
            }
            _ => confirmed,
        };
        self.objects.insert(id, merged);
        Some(adoption)
    }

    /// Remember a remote delete for an id this store has not seen.
    pub fn note_unseen_delete(&mut self, id: ObjectId) {
        self.unseen_deletes.insert(id);
    }

    #[must_use]
    pub fn is_unseen_delete(&self, id: &ObjectId) -> bool {
        self.unseen_deletes.contains(id)
    }

    /// Number of entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn notify(&self, change: StoreChange) {
        if self.changes.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.changes.send(change) {
            trace!(error = %e, "store change not delivered");
        }
    }
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the store shared by the controller, commit queue and reconciler.
///
/// Locks are held only for synchronous sections, never across an `.await`.
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<OptimisticStore>>,
}

impl SharedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the store, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, OptimisticStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owned snapshot of `list()`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PlacedObject> {
        self.lock().list().into_iter().cloned().collect()
    }
}
