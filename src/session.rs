//! Room session — wires store, drag controller, commit queue and reconciler
//! together for the one room a client has open.
//!
//! DESIGN
//! ======
//! A session owns one subscription at a time. Opening a room resets the
//! store, subscribes, loads the room, and only then starts draining the feed,
//! so events that race the initial load are merged after it under the normal
//! last-write-wins rules. Switching rooms drops the reconciler handle (which
//! unsubscribes synchronously), sends every write of the old room still
//! waiting for its debounce window, and opens the new one.
//!
//! Every edit method follows the same shape: validate against the store,
//! mutate the store immediately, then schedule a debounced write. Failures
//! past that point never surface here; they end in the save indicator.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::commit::{CommitField, CommitIntent, CommitKey, CommitQueue, SaveStatus};
use crate::config::{RoomKind, RoomProfile, SyncConfig};
use crate::consts::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::coords::FittedViewport;
use crate::doc::{AssetId, Content, ObjectId, ObjectKind, PlacedObject, Position, RoomId, normalize_rotation};
use crate::drag::{DragAction, DragController};
use crate::feed::ChangeFeed;
use crate::gateway::{ErrorCode, GatewayError, NewObject, PersistenceGateway, with_retry};
use crate::input::PointerEvent;
use crate::reconcile::{ChangeFeedReconciler, ReconcilerHandle};
use crate::store::{SharedStore, StoreChange};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("object not in this room: {0}")]
    UnknownObject(ObjectId),
    #[error("content of kind {found:?} cannot go on {expected:?} object {id}")]
    ContentKindMismatch { id: ObjectId, expected: ObjectKind, found: ObjectKind },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownObject(_) => "E_UNKNOWN_OBJECT",
            Self::ContentKindMismatch { .. } => "E_CONTENT_KIND",
            Self::Gateway(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// The open room of one client.
pub struct RoomSession {
    room_id: RoomId,
    profile: RoomProfile,
    store: SharedStore,
    commits: CommitQueue,
    drag: DragController,
    gateway: Arc<dyn PersistenceGateway>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    surface: FittedViewport,
    reconciler: ChangeFeedReconciler,
    handle: Option<ReconcilerHandle>,
}

impl RoomSession {
    /// Open `room_id` and start following its change feed.
    ///
    /// A failed initial load is logged; the session still opens empty and the
    /// next reconnect or [`RoomSession::refresh`] fills it in.
    pub async fn open(
        kind: RoomKind,
        room_id: RoomId,
        gateway: Arc<dyn PersistenceGateway>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let profile = RoomProfile::for_kind(kind);
        let store = SharedStore::new();
        let commits = CommitQueue::new(Arc::clone(&gateway), store.clone(), &config);
        let drag = DragController::new(
            store.clone(),
            commits.clone(),
            Arc::clone(&clock),
            profile.bounds,
            config.click_threshold,
        );
        let reconciler = ChangeFeedReconciler::new(room_id, store.clone(), commits.clone(), Arc::clone(&gateway));
        let mut session = Self {
            room_id,
            profile,
            store,
            commits,
            drag,
            gateway,
            feed,
            clock,
            surface: FittedViewport::new(CANVAS_WIDTH, CANVAS_HEIGHT),
            reconciler,
            handle: None,
        };
        session.attach().await;
        session
    }

    async fn attach(&mut self) {
        let room_id = self.room_id;
        self.store.lock().reset(Some(room_id));
        let subscription = self.feed.subscribe(room_id);
        self.reconciler =
            ChangeFeedReconciler::new(room_id, self.store.clone(), self.commits.clone(), Arc::clone(&self.gateway));

        if let Err(e) = self.reconciler.refetch().await {
            warn!(error = %e, code = e.error_code(), room_id = %room_id, "initial room load failed");
        }
        self.handle = Some(self.reconciler.clone().spawn(subscription));
        info!(room_id = %room_id, kind = ?self.profile.kind, "room opened");
    }

    fn detach(&mut self) {
        self.drag.abort();
        self.handle = None;
        self.commits.flush_all();
    }

    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    #[must_use]
    pub fn profile(&self) -> &RoomProfile {
        &self.profile
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    #[must_use]
    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    #[must_use]
    pub fn surface(&self) -> &FittedViewport {
        &self.surface
    }

    /// The canvas surface, for the host to report size and zoom changes.
    pub fn surface_mut(&mut self) -> &mut FittedViewport {
        &mut self.surface
    }

    #[must_use]
    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.commits.status()
    }

    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.store.lock().subscribe()
    }

    /// Whether the feed is being followed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    // =========================================================================
    // VIEW
    // =========================================================================

    /// Live objects in stacking order, with the uncommitted drag position of
    /// the object under the pointer.
    #[must_use]
    pub fn render_objects(&self) -> Vec<PlacedObject> {
        let mut objects = self.store.snapshot();
        if let Some((id, position)) = self.drag.live_position() {
            if let Some(obj) = objects.iter_mut().find(|o| o.id == id) {
                obj.position = position;
            }
        }
        objects
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) -> DragAction {
        self.drag.handle(event, &self.surface)
    }

    // =========================================================================
    // EDITS
    // =========================================================================

    /// Place a new object. It is visible immediately under a temporary id
    /// that is also its correlation token; creation runs in the background.
    ///
    /// If creation still fails after its retry the object never existed
    /// remotely: it is removed from the store and the save indicator shows
    /// the failure.
    ///
    /// # Errors
    ///
    /// `ContentKindMismatch` if `content` does not belong to `kind`.
    pub fn place_object(
        &mut self,
        kind: ObjectKind,
        asset_id: impl Into<AssetId>,
        position: Position,
        content: Content,
    ) -> Result<ObjectId, SessionError> {
        let temp_id = Uuid::new_v4();
        if content.kind() != kind {
            return Err(SessionError::ContentKindMismatch { id: temp_id, expected: kind, found: content.kind() });
        }
        let request = NewObject {
            room_id: self.room_id,
            kind,
            asset_id: asset_id.into(),
            position: self.profile.bounds.clamp(position),
            z_index: 0,
            rotation: 0.0,
            scale: self.profile.default_scale,
            content,
            client_ref: temp_id,
        };
        let placed_at = self.clock.now_ms();
        let request = {
            let mut store = self.store.lock();
            let z_index = store.z_range().map_or(0, |(_, hi)| hi + 1);
            let request = NewObject { z_index, ..request };
            store.insert_pending(request.clone().into_object(temp_id, placed_at));
            request
        };
        debug!(temp_id = %temp_id, kind = ?kind, "object placed locally");

        self.commits.begin_write();
        let commits = self.commits.clone();
        let store = self.store.clone();
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            let created = with_retry(commits.retry_policy(), "create_object", || gateway.create_object(&request)).await;
            if let Err(e) = &created {
                warn!(error = %e, code = e.error_code(), temp_id = %temp_id, "object creation failed; removing local copy");
                commits.cancel(temp_id);
                store.lock().remove(&temp_id);
            }
            let result = created.map(|id| {
                let adoption = store.lock().adopt(temp_id, request.into_object(id, placed_at));
                match adoption {
                    Some(adoption) => {
                        debug!(temp_id = %temp_id, object_id = %id, "local object confirmed by gateway");
                        commits.settle_adoption(&adoption);
                    }
                    None => debug!(temp_id = %temp_id, object_id = %id, "creation already confirmed"),
                }
            });
            commits.finish_write(CommitKey { id: temp_id, field: CommitField::Lifecycle }, &result);
        });
        Ok(temp_id)
    }

    /// Replace an object's content.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not live here; `ContentKindMismatch` if the
    /// payload is for another kind.
    pub fn edit_content(&mut self, id: ObjectId, content: Content) -> Result<(), SessionError> {
        let now = self.clock.now_ms();
        let id = {
            let mut store = self.store.lock();
            let id = store.resolve(&id);
            let Some(obj) = store.get_live(&id) else {
                return Err(SessionError::UnknownObject(id));
            };
            if obj.kind != content.kind() {
                return Err(SessionError::ContentKindMismatch { id, expected: obj.kind, found: content.kind() });
            }
            store.update(&id, |obj| {
                obj.content = content.clone();
                obj.updated_at = now;
            });
            id
        };
        self.commits.schedule(id, CommitIntent::Content(content));
        Ok(())
    }

    /// Raise an object above every other. Returns its new `z_index`.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not live here.
    pub fn bring_forward(&mut self, id: ObjectId) -> Result<i64, SessionError> {
        self.restack(id, true)
    }

    /// Lower an object below every other. Returns its new `z_index`.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not live here.
    pub fn send_back(&mut self, id: ObjectId) -> Result<i64, SessionError> {
        self.restack(id, false)
    }

    fn restack(&mut self, id: ObjectId, forward: bool) -> Result<i64, SessionError> {
        let now = self.clock.now_ms();
        let (id, z_index, position) = {
            let mut store = self.store.lock();
            let id = store.resolve(&id);
            let Some(current) = store.get_live(&id).map(|o| o.z_index) else {
                return Err(SessionError::UnknownObject(id));
            };
            let order = store.list();
            let edge = if forward { order.last() } else { order.first() };
            if edge.is_some_and(|o| o.id == id) {
                return Ok(current);
            }
            let Some((lo, hi)) = store.z_range() else {
                return Err(SessionError::UnknownObject(id));
            };
            let z_index = if forward { hi + 1 } else { lo - 1 };
            let mut position = Position::default();
            store.update(&id, |obj| {
                obj.z_index = z_index;
                obj.updated_at = now;
                position = obj.position;
            });
            (id, z_index, position)
        };
        self.commits.schedule(id, CommitIntent::Position { position, z_index });
        Ok(z_index)
    }

    /// Set an object's rotation in degrees. Returns the normalized value.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not live here.
    pub fn rotate(&mut self, id: ObjectId, degrees: f64) -> Result<f64, SessionError> {
        let rotation = normalize_rotation(degrees);
        self.transform(id, |obj| obj.rotation = rotation)?;
        Ok(rotation)
    }

    /// Set an object's scale. Returns the value after clamping to the room.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not live here.
    pub fn rescale(&mut self, id: ObjectId, scale: f64) -> Result<f64, SessionError> {
        let scale = self.profile.clamp_scale(scale);
        self.transform(id, |obj| obj.scale = scale)?;
        Ok(scale)
    }

    fn transform<F>(&mut self, id: ObjectId, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut PlacedObject),
    {
        let now = self.clock.now_ms();
        let (id, rotation, scale) = {
            let mut store = self.store.lock();
            let id = store.resolve(&id);
            if store.get_live(&id).is_none() {
                return Err(SessionError::UnknownObject(id));
            }
            let mut applied = (0.0, 1.0);
            store.update(&id, |obj| {
                f(obj);
                obj.updated_at = now;
                applied = (obj.rotation, obj.scale);
            });
            (id, applied.0, applied.1)
        };
        self.commits.schedule(id, CommitIntent::Transform { rotation, scale });
        Ok(())
    }

    /// Soft-delete an object and delete it remotely.
    ///
    /// An object still awaiting its persisted id is deleted remotely once
    /// the id is known.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not live here.
    pub fn delete_object(&mut self, id: ObjectId) -> Result<(), SessionError> {
        let now = self.clock.now_ms();
        let (id, pending) = {
            let mut store = self.store.lock();
            let id = store.resolve(&id);
            if store.get_live(&id).is_none() {
                return Err(SessionError::UnknownObject(id));
            }
            store.tombstone(&id, now);
            (id, store.is_pending(&id))
        };

        if self.drag.live_position().is_some_and(|(dragged, _)| dragged == id) {
            self.drag.abort();
        }
        if pending {
            self.commits.cancel(id);
            debug!(temp_id = %id, "pending object deleted; remote delete deferred");
        } else {
            self.commits.delete(id);
        }
        Ok(())
    }

    /// Physically drop tombstones. Returns how many were dropped.
    pub fn purge_tombstones(&mut self) -> usize {
        let purged = self.store.lock().purge_tombstones();
        debug!(room_id = %self.room_id, purged, "tombstones purged");
        purged
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Reload the room from the backend. Returns the live object count.
    ///
    /// # Errors
    ///
    /// The gateway error if the load failed after its retry.
    pub async fn refresh(&mut self) -> Result<usize, SessionError> {
        Ok(self.reconciler.refetch().await?)
    }

    /// Leave the current room and open another.
    pub async fn switch_room(&mut self, kind: RoomKind, room_id: RoomId) {
        info!(from = %self.room_id, to = %room_id, "switching room");
        self.detach();
        self.room_id = room_id;
        self.profile = RoomProfile::for_kind(kind);
        self.drag.set_bounds(self.profile.bounds);
        self.attach().await;
    }

    /// Stop following the feed, send writes still waiting, and drop all
    /// local state.
    pub fn close(&mut self) {
        self.detach();
        self.store.lock().reset(None);
        info!(room_id = %self.room_id, "room closed");
    }
}
