//! Persistence gateway — the backend record store contract.
//!
//! DESIGN
//! ======
//! The core never talks to storage directly. Everything remote goes through
//! [`PersistenceGateway`], whose operations are idempotent in intent: sending
//! the same position twice is harmless.
//!
//! ERROR HANDLING
//! ==============
//! Only transient (network) failures are worth retrying. [`with_retry`] makes
//! at most `max_attempts` tries with a growing backoff between them; the last
//! error is returned to the caller, which degrades to an "unsaved" indicator
//! instead of rolling back local state.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod gateway_test;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::doc::{AssetId, ClientRef, Content, ObjectId, ObjectKind, PlacedObject, Position, RoomId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rejected by backend: {0}")]
    Rejected(String),
    #[error("object not found: {0}")]
    NotFound(ObjectId),
}

/// Grepable error code and retryable flag for structured logs.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl ErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Rejected(_) => "E_REJECTED",
            Self::NotFound(_) => "E_NOT_FOUND",
        }
    }

    /// Only network failures are worth another attempt.
    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Creation request for a new object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObject {
    pub room_id: RoomId,
    pub kind: ObjectKind,
    pub asset_id: AssetId,
    pub position: Position,
    pub z_index: i64,
    pub rotation: f64,
    pub scale: f64,
    pub content: Content,
    /// Echoed back on the Insert event so the creator can recognize it.
    pub client_ref: ClientRef,
}

impl NewObject {
    /// The request as a placed object under `id`, stamped `updated_at`.
    #[must_use]
    pub fn into_object(self, id: ObjectId, updated_at: i64) -> PlacedObject {
        PlacedObject {
            id,
            room_id: self.room_id,
            asset_id: self.asset_id,
            kind: self.kind,
            position: self.position,
            z_index: self.z_index,
            rotation: self.rotation,
            scale: self.scale,
            content: self.content,
            updated_at,
            deleted_at: None,
            client_ref: Some(self.client_ref),
        }
    }
}

// =============================================================================
// CONTRACT
// =============================================================================

/// Backend operations the sync core depends on.
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist a new position and stacking order.
    async fn commit_position(&self, id: ObjectId, x: f64, y: f64, z_index: i64) -> Result<(), GatewayError>;

    /// Persist new per-kind content.
    async fn commit_content(&self, id: ObjectId, content: &Content) -> Result<(), GatewayError>;

    /// Persist rotation (degrees) and scale.
    async fn commit_transform(&self, id: ObjectId, rotation: f64, scale: f64) -> Result<(), GatewayError>;

    /// Create an object and return its persisted id.
    async fn create_object(&self, request: &NewObject) -> Result<ObjectId, GatewayError>;

    async fn delete_object(&self, id: ObjectId) -> Result<(), GatewayError>;

    /// Fetch every live object of a room.
    async fn load_room(&self, room_id: RoomId) -> Result<Vec<PlacedObject>, GatewayError>;
}

// =============================================================================
// RETRY
// =============================================================================

/// Retry policy for gateway writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `n * backoff`.
    pub backoff: Duration,
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// # Errors
///
/// Returns the last error seen.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &'static str, mut op: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.retryable() && attempt < max_attempts => {
                warn!(error = %e, attempt, total = max_attempts, op = what, "gateway call failed; retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
