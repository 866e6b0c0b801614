//! In-process backend implementing both the gateway and the change feed.
//!
//! `MemoryBackend` stands in for the hosted record store: it assigns ids and
//! server timestamps, fans change events out to every subscriber of a room,
//! and records every call it receives. It can also misbehave on request:
//! fail the next N calls with a transient error, stop delivering a room's
//! events (as if the connection silently dropped), and signal a reconnect.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::clock::Clock;
use crate::doc::{Content, ObjectId, PlacedObject, RoomId, Timestamp};
use crate::feed::{Change, ChangeEvent, ChangeFeed, FeedMessage, Subscription};
use crate::gateway::{GatewayError, NewObject, PersistenceGateway};

/// One call received by the backend, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CommitPosition { id: ObjectId, x: f64, y: f64, z_index: i64 },
    CommitContent { id: ObjectId, content: Content },
    CommitTransform { id: ObjectId, rotation: f64, scale: f64 },
    CreateObject { request: NewObject },
    DeleteObject { id: ObjectId },
    LoadRoom { room_id: RoomId },
}

struct Subscriber {
    id: u64,
    room_id: RoomId,
    tx: mpsc::UnboundedSender<FeedMessage>,
}

#[derive(Default)]
struct BackendState {
    objects: HashMap<ObjectId, PlacedObject>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    calls: Vec<GatewayCall>,
    fail_next: usize,
    muted_rooms: HashSet<RoomId>,
    last_ts: Timestamp,
}

/// Shared in-memory record store with a push feed.
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { state: Arc::new(Mutex::new(BackendState::default())), clock }
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        lock_state(&self.state)
    }

    /// Store an object as-is without emitting an event.
    pub fn seed(&self, obj: PlacedObject) {
        self.lock().objects.insert(obj.id, obj);
    }

    /// Fail the next `n` calls with a transient network error.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Only the position commits received so far.
    #[must_use]
    pub fn position_commits(&self) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, GatewayCall::CommitPosition { .. }))
            .cloned()
            .collect()
    }

    /// The backend's copy of one object.
    #[must_use]
    pub fn object(&self, id: &ObjectId) -> Option<PlacedObject> {
        self.lock().objects.get(id).cloned()
    }

    /// The backend's copy of a room, ordered by `(z_index, id)`.
    #[must_use]
    pub fn room_objects(&self, room_id: RoomId) -> Vec<PlacedObject> {
        let mut objs: Vec<PlacedObject> =
            self.lock().objects.values().filter(|o| o.room_id == room_id).cloned().collect();
        objs.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        objs
    }

    #[must_use]
    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.lock().subscribers.iter().filter(|s| s.room_id == room_id).count()
    }

    /// Stop delivering events for `room_id`; they are lost, not queued.
    pub fn drop_events(&self, room_id: RoomId) {
        self.lock().muted_rooms.insert(room_id);
    }

    /// Resume delivery for `room_id` and tell its subscribers they reconnected.
    pub fn reconnect(&self, room_id: RoomId) {
        let mut state = self.lock();
        state.muted_rooms.remove(&room_id);
        debug!(room_id = %room_id, "signalling reconnect");
        deliver(&mut state, room_id, &FeedMessage::Reconnected);
    }

    /// Push an arbitrary event to a room's subscribers, bypassing storage.
    pub fn emit(&self, event: ChangeEvent) {
        let mut state = self.lock();
        let room_id = event.room_id;
        deliver(&mut state, room_id, &FeedMessage::Change(event));
    }

    fn next_ts(&self, state: &mut BackendState) -> Timestamp {
        let ts = self.clock.now_ms().max(state.last_ts + 1);
        state.last_ts = ts;
        ts
    }

    /// Record a call and consume one injected failure, if any.
    fn begin(&self, call: GatewayCall) -> Result<MutexGuard<'_, BackendState>, GatewayError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(GatewayError::Network("injected failure".into()));
        }
        Ok(state)
    }

    fn update_and_broadcast<F>(&self, call: GatewayCall, id: ObjectId, f: F) -> Result<(), GatewayError>
    where
        F: FnOnce(&mut PlacedObject),
    {
        let mut state = self.begin(call)?;
        let ts = self.next_ts(&mut state);
        let obj = state.objects.get_mut(&id).ok_or(GatewayError::NotFound(id))?;
        f(obj);
        obj.updated_at = ts;
        let obj = obj.clone();
        let room_id = obj.room_id;
        deliver(&mut state, room_id, &FeedMessage::Change(ChangeEvent { room_id, change: Change::Update(obj), server_ts: ts }));
        Ok(())
    }
}

fn lock_state(state: &Mutex<BackendState>) -> MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn deliver(state: &mut BackendState, room_id: RoomId, msg: &FeedMessage) {
    if state.muted_rooms.contains(&room_id) {
        trace!(room_id = %room_id, "event dropped; room muted");
        return;
    }
    state.subscribers.retain(|s| {
        if s.room_id != room_id {
            return true;
        }
        s.tx.send(msg.clone()).is_ok()
    });
}

#[async_trait::async_trait]
impl PersistenceGateway for MemoryBackend {
    async fn commit_position(&self, id: ObjectId, x: f64, y: f64, z_index: i64) -> Result<(), GatewayError> {
        self.update_and_broadcast(GatewayCall::CommitPosition { id, x, y, z_index }, id, |obj| {
            obj.position.x = x;
            obj.position.y = y;
            obj.z_index = z_index;
        })
    }

    async fn commit_content(&self, id: ObjectId, content: &Content) -> Result<(), GatewayError> {
        let call = GatewayCall::CommitContent { id, content: content.clone() };
        let content = content.clone();
        self.update_and_broadcast(call, id, |obj| obj.content = content)
    }

    async fn commit_transform(&self, id: ObjectId, rotation: f64, scale: f64) -> Result<(), GatewayError> {
        self.update_and_broadcast(GatewayCall::CommitTransform { id, rotation, scale }, id, |obj| {
            obj.rotation = rotation;
            obj.scale = scale;
        })
    }

    async fn create_object(&self, request: &NewObject) -> Result<ObjectId, GatewayError> {
        let mut state = self.begin(GatewayCall::CreateObject { request: request.clone() })?;
        let ts = self.next_ts(&mut state);
        let id = Uuid::new_v4();
        let obj = request.clone().into_object(id, ts);
        let room_id = obj.room_id;
        state.objects.insert(id, obj.clone());
        deliver(&mut state, room_id, &FeedMessage::Change(ChangeEvent { room_id, change: Change::Insert(obj), server_ts: ts }));
        Ok(id)
    }

    async fn delete_object(&self, id: ObjectId) -> Result<(), GatewayError> {
        let mut state = self.begin(GatewayCall::DeleteObject { id })?;
        let ts = self.next_ts(&mut state);
        let obj = state.objects.remove(&id).ok_or(GatewayError::NotFound(id))?;
        let room_id = obj.room_id;
        deliver(&mut state, room_id, &FeedMessage::Change(ChangeEvent { room_id, change: Change::Delete(id), server_ts: ts }));
        Ok(())
    }

    async fn load_room(&self, room_id: RoomId) -> Result<Vec<PlacedObject>, GatewayError> {
        let state = self.begin(GatewayCall::LoadRoom { room_id })?;
        Ok(state.objects.values().filter(|o| o.room_id == room_id).cloned().collect())
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, room_id: RoomId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            state.next_subscriber += 1;
            let id = state.next_subscriber;
            state.subscribers.push(Subscriber { id, room_id, tx });
            id
        };
        let weak: Weak<Mutex<BackendState>> = Arc::downgrade(&self.state);
        Subscription::new(room_id, rx, move || {
            if let Some(state) = weak.upgrade() {
                lock_state(&state).subscribers.retain(|s| s.id != id);
            }
        })
    }
}
