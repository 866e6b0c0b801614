//! Drag controller — pointer gestures to clamped, debounced position commits.
//!
//! DESIGN
//! ======
//! `Idle -> Dragging -> Idle`. Pointer-down captures the pointer and records
//! the grab offset so the object does not jump to the cursor. Every move
//! recomputes the clamped position into the live session only; the store is
//! untouched until release, so an aborted drag leaves nothing behind.
//!
//! On release the displacement decides between a click (no write) and a
//! drag: the final position goes into the store immediately and one
//! debounced position commit is scheduled. Pointer-down suspends any write
//! still pending for the object; a real drag supersedes it, while a click or
//! a cancellation puts it back.

#[cfg(test)]
#[path = "drag_test.rs"]
mod drag_test;

use std::sync::Arc;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::commit::{CommitField, CommitIntent, CommitQueue};
use crate::coords::{CanvasSurface, Point, to_canvas_space};
use crate::doc::{ObjectId, Position, RoomBounds};
use crate::input::{DragSession, DragState, PointerEvent, PointerId, PointerOffset};
use crate::store::SharedStore;

/// What a pointer event did, for the host to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum DragAction {
    None,
    Started { id: ObjectId },
    /// Live position changed; re-render.
    Moved { id: ObjectId, position: Position },
    /// The gesture stayed under the click threshold.
    Clicked { id: ObjectId },
    /// The drag settled; the store holds `position` and a commit is scheduled.
    Committed { id: ObjectId, position: Position },
    /// The drag was aborted without writing anything.
    Cancelled { id: ObjectId },
}

/// Owns the gesture lifecycle of the object currently being dragged.
pub struct DragController {
    store: SharedStore,
    commits: CommitQueue,
    clock: Arc<dyn Clock>,
    bounds: RoomBounds,
    click_threshold: f64,
    state: DragState,
}

impl DragController {
    #[must_use]
    pub fn new(
        store: SharedStore,
        commits: CommitQueue,
        clock: Arc<dyn Clock>,
        bounds: RoomBounds,
        click_threshold: f64,
    ) -> Self {
        Self { store, commits, clock, bounds, click_threshold, state: DragState::Idle }
    }

    #[must_use]
    pub fn state(&self) -> &DragState {
        &self.state
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// The pointer currently captured, if any.
    #[must_use]
    pub fn captured_pointer(&self) -> Option<PointerId> {
        match &self.state {
            DragState::Dragging(session) => Some(session.pointer),
            DragState::Idle => None,
        }
    }

    /// The uncommitted position of the object being dragged.
    #[must_use]
    pub fn live_position(&self) -> Option<(ObjectId, Position)> {
        match &self.state {
            DragState::Dragging(session) => Some((session.object_id, session.live_position)),
            DragState::Idle => None,
        }
    }

    /// Switch to another room's bounds. Aborts any drag in progress.
    pub fn set_bounds(&mut self, bounds: RoomBounds) {
        self.abort();
        self.bounds = bounds;
    }

    /// Route one pointer event.
    pub fn handle(&mut self, event: PointerEvent, surface: &dyn CanvasSurface) -> DragAction {
        match event {
            PointerEvent::Down { pointer, object, screen } => self.pointer_down(pointer, object, screen, surface),
            PointerEvent::Move { pointer, screen } => self.pointer_move(pointer, screen, surface),
            PointerEvent::Up { pointer, screen } => self.pointer_up(pointer, screen, surface),
            PointerEvent::Cancel { pointer } => self.pointer_cancel(pointer),
        }
    }

    pub fn pointer_down(
        &mut self,
        pointer: PointerId,
        object_id: ObjectId,
        screen: Point,
        surface: &dyn CanvasSurface,
    ) -> DragAction {
        if self.is_dragging() {
            return DragAction::None;
        }
        let Some(start) = self.store.lock().get_live(&object_id).map(|o| o.position) else {
            return DragAction::None;
        };

        let canvas = to_canvas_space(screen, surface);
        let pointer_offset = PointerOffset { dx: canvas.x - start.x, dy: canvas.y - start.y };
        let suspended = self.commits.suspend(object_id, CommitField::Position);

        self.state = DragState::Dragging(DragSession {
            object_id,
            pointer,
            pointer_offset,
            start_position: start,
            live_position: start,
            is_dragging: false,
            suspended,
        });
        debug!(object_id = %object_id, pointer = pointer.0, "drag started");
        DragAction::Started { id: object_id }
    }

    pub fn pointer_move(&mut self, pointer: PointerId, screen: Point, surface: &dyn CanvasSurface) -> DragAction {
        let bounds = self.bounds;
        let DragState::Dragging(session) = &mut self.state else {
            return DragAction::None;
        };
        if session.pointer != pointer {
            return DragAction::None;
        }
        let id = session.object_id;
        if self.store.lock().get_live(&id).is_none() {
            // Deleted underneath the drag.
            return self.abort();
        }

        session.live_position = clamped_target(screen, surface, session.pointer_offset, bounds);
        session.is_dragging = true;
        trace!(object_id = %id, x = session.live_position.x, y = session.live_position.y, "drag moved");
        DragAction::Moved { id, position: session.live_position }
    }

    pub fn pointer_up(&mut self, pointer: PointerId, screen: Point, surface: &dyn CanvasSurface) -> DragAction {
        if self.captured_pointer() != Some(pointer) {
            return DragAction::None;
        }
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return DragAction::None;
        };
        let id = session.object_id;
        let final_position = clamped_target(screen, surface, session.pointer_offset, self.bounds);

        if final_position.distance_to(session.start_position) < self.click_threshold {
            self.restore(id, session.suspended);
            debug!(object_id = %id, "gesture classified as click");
            return DragAction::Clicked { id };
        }

        let now = self.clock.now_ms();
        let mut z_index = None;
        let written = self.store.lock().update(&id, |obj| {
            if !obj.is_tombstoned() {
                obj.position = final_position;
                obj.updated_at = now;
                z_index = Some(obj.z_index);
            }
        });
        let (true, Some(z_index)) = (written, z_index) else {
            debug!(object_id = %id, "drag released on a deleted object");
            return DragAction::Cancelled { id };
        };

        self.commits.schedule(id, CommitIntent::Position { position: final_position, z_index });
        debug!(object_id = %id, x = final_position.x, y = final_position.y, "drag committed");
        DragAction::Committed { id, position: final_position }
    }

    pub fn pointer_cancel(&mut self, pointer: PointerId) -> DragAction {
        if self.captured_pointer() != Some(pointer) {
            return DragAction::None;
        }
        self.abort()
    }

    /// Drop the current drag without writing anything.
    pub fn abort(&mut self) -> DragAction {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return DragAction::None;
        };
        let id = session.object_id;
        self.restore(id, session.suspended);
        debug!(object_id = %id, "drag cancelled");
        DragAction::Cancelled { id }
    }

    /// Re-schedule a write suspended at pointer-down, if the object survives.
    ///
    /// The store may have moved on since (a z-order change, say), so the
    /// write is rebuilt from the current record.
    fn restore(&self, id: ObjectId, suspended: Option<CommitIntent>) {
        if suspended.is_none() {
            return;
        }
        let Some(intent) = self
            .store
            .lock()
            .get_live(&id)
            .map(|obj| CommitIntent::Position { position: obj.position, z_index: obj.z_index })
        else {
            return;
        };
        self.commits.schedule(id, intent);
    }
}

fn clamped_target(screen: Point, surface: &dyn CanvasSurface, offset: PointerOffset, bounds: RoomBounds) -> Position {
    let canvas = to_canvas_space(screen, surface);
    bounds.clamp(Position::new(canvas.x - offset.dx, canvas.y - offset.dy))
}
