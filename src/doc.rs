//! Document model: placed objects, their per-kind content, and room bounds.
//!
//! This module defines what lives in a room (`PlacedObject`, `ObjectKind`,
//! `Content`) and the rectangle every local mutation is clamped into
//! (`RoomBounds`). The same types travel over the change feed and through the
//! persistence gateway, so they are all serde-serializable.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a placed object.
pub type ObjectId = Uuid;

/// Unique identifier for a room.
pub type RoomId = Uuid;

/// Client-generated correlation token carried on creation, echoed back in the
/// matching Insert event.
pub type ClientRef = Uuid;

/// Opaque catalog identifier (gift, magnet, furniture or photo asset).
pub type AssetId = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// The kind of a placed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Sticky note with free text.
    Note,
    /// Fridge magnet.
    Magnet,
    /// Piece of furniture.
    Furniture,
    /// Photo hung on a wall.
    WallImage,
}

/// A position in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance_to(self, other: Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Per-kind payload of a placed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Note {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Magnet {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Furniture {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },
    WallImage {
        image_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl Content {
    /// The object kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Note { .. } => ObjectKind::Note,
            Self::Magnet { .. } => ObjectKind::Magnet,
            Self::Furniture { .. } => ObjectKind::Furniture,
            Self::WallImage { .. } => ObjectKind::WallImage,
        }
    }

    /// Empty payload for a freshly placed object of `kind`.
    #[must_use]
    pub fn empty(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Note => Self::Note { text: String::new(), color: None },
            ObjectKind::Magnet => Self::Magnet { label: None },
            ObjectKind::Furniture => Self::Furniture { variant: None },
            ObjectKind::WallImage => Self::WallImage { image_url: String::new(), caption: None },
        }
    }
}

/// An object placed in a room, as held in the store and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedObject {
    pub id: ObjectId,
    pub room_id: RoomId,
    pub asset_id: AssetId,
    pub kind: ObjectKind,
    pub position: Position,
    /// Stacking order; ties are broken by `updated_at`.
    pub z_index: i64,
    /// Clockwise rotation in degrees, normalized into `[0, 360)`.
    pub rotation: f64,
    pub scale: f64,
    pub content: Content,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    /// Correlation token set by the creating client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ClientRef>,
}

impl PlacedObject {
    /// Whether this entry is a soft-deleted tombstone.
    #[must_use]
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the persisted-relevant fields of two records differ.
    ///
    /// Ignores `id`, `updated_at` and `client_ref`, which legitimately change
    /// when a pending object is confirmed.
    #[must_use]
    pub fn diverges_from(&self, other: &PlacedObject) -> bool {
        self.position != other.position
            || self.z_index != other.z_index
            || self.rotation != other.rotation
            || self.scale != other.scale
            || self.content != other.content
    }
}

/// Normalize a rotation in degrees into `[0, 360)`.
#[must_use]
pub fn normalize_rotation(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let r = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if r >= 360.0 { 0.0 } else { r }
}

/// Axis-aligned rectangle objects are confined to, in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl RoomBounds {
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Clamp a position into the bounds, axis by axis.
    ///
    /// NaN coordinates collapse onto the minimum edge.
    #[must_use]
    pub fn clamp(&self, p: Position) -> Position {
        Position { x: clamp_axis(p.x, self.min_x, self.max_x), y: clamp_axis(p.y, self.min_y, self.max_y) }
    }

    /// Whether a position lies inside the bounds (edges inclusive).
    #[must_use]
    pub fn contains(&self, p: Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

fn clamp_axis(v: f64, min: f64, max: f64) -> f64 {
    if v.is_nan() {
        return min;
    }
    min.max(max.min(v))
}
