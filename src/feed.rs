//! Change feed contract: remote insert/update/delete events for one room.
//!
//! A [`ChangeFeed`] hands out a [`Subscription`] per room. Messages arrive in
//! delivery order, which is not production order. Dropping or calling
//! [`Subscription::unsubscribe`] tears the subscription down.

#[cfg(test)]
#[path = "feed_test.rs"]
mod feed_test;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::doc::{ObjectId, PlacedObject, RoomId, Timestamp};

/// The mutation carried by a change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "snake_case")]
pub enum Change {
    Insert(PlacedObject),
    Update(PlacedObject),
    Delete(ObjectId),
}

impl Change {
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::Insert(obj) | Self::Update(obj) => obj.id,
            Self::Delete(id) => *id,
        }
    }
}

/// One event from the remote feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub room_id: RoomId,
    #[serde(flatten)]
    pub change: Change,
    pub server_ts: Timestamp,
}

/// Everything a subscription can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(ChangeEvent),
    /// The transport dropped and re-established; events may have been missed.
    Reconnected,
}

/// Source of per-room change subscriptions.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, room_id: RoomId) -> Subscription;
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Detaches a subscription at its source when dropped.
pub struct UnsubscribeGuard {
    unsubscribe: Option<Unsubscribe>,
}

impl UnsubscribeGuard {
    /// Detach now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.run();
    }
}

/// A live subscription. Unsubscribes when dropped.
pub struct Subscription {
    room_id: RoomId,
    rx: mpsc::UnboundedReceiver<FeedMessage>,
    guard: UnsubscribeGuard,
}

impl Subscription {
    /// Wrap a receiver and the callback that detaches it at the source.
    pub fn new<F>(room_id: RoomId, rx: mpsc::UnboundedReceiver<FeedMessage>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { room_id, rx, guard: UnsubscribeGuard { unsubscribe: Some(Box::new(unsubscribe)) } }
    }

    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Next message, or `None` once the source closed the subscription.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_next(&mut self) -> Option<FeedMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(_) => None,
        }
    }

    /// Move the detach callback out, so whoever holds the guard decides when
    /// the source lets go. The receiver keeps draining until then.
    pub fn take_guard(&mut self) -> UnsubscribeGuard {
        UnsubscribeGuard { unsubscribe: self.guard.unsubscribe.take() }
    }

    /// Detach from the source now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        self.guard.run();
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
