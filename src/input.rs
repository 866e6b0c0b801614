//! Pointer input and the drag gesture state.
//!
//! `PointerEvent` is what the host forwards from the platform. `DragState`
//! is the controller's state machine: `Idle` or `Dragging` with the live
//! `DragSession`, which exists only while a pointer is captured.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::commit::CommitIntent;
use crate::coords::Point;
use crate::doc::{ObjectId, Position};

/// Platform pointer identifier (mouse, pen, or one touch contact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PointerId(pub i32);

/// Pointer input in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { pointer: PointerId, object: ObjectId, screen: Point },
    Move { pointer: PointerId, screen: Point },
    Up { pointer: PointerId, screen: Point },
    /// The platform revoked capture or the contact was lost.
    Cancel { pointer: PointerId },
}

impl PointerEvent {
    #[must_use]
    pub fn pointer(&self) -> PointerId {
        match self {
            Self::Down { pointer, .. } | Self::Move { pointer, .. } | Self::Up { pointer, .. } | Self::Cancel { pointer } => {
                *pointer
            }
        }
    }
}

/// Offset from the object's position to the grab point, in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerOffset {
    pub dx: f64,
    pub dy: f64,
}

/// Ephemeral state of one captured drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub object_id: ObjectId,
    pub pointer: PointerId,
    pub pointer_offset: PointerOffset,
    pub start_position: Position,
    /// Latest clamped position; rendered but not yet committed.
    pub live_position: Position,
    /// Set once any move event has been seen.
    pub is_dragging: bool,
    /// A pending commit this drag put on hold, restored if the drag turns out
    /// to be a click or is cancelled.
    pub suspended: Option<CommitIntent>,
}

/// The drag controller's state machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}
