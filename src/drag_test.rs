use uuid::Uuid;

use super::*;
use crate::coords::Transform;
use crate::doc::PlacedObject;
use crate::memory::GatewayCall;
use crate::memory::test_helpers::{Rig, T0, note, settle};

const P: PointerId = PointerId(1);

fn room_0_200() -> RoomBounds {
    RoomBounds::new(0.0, 0.0, 200.0, 200.0)
}

fn controller(rig: &Rig) -> DragController {
    DragController::new(rig.store.clone(), rig.commits.clone(), rig.clock(), room_0_200(), 3.0)
}

fn down(ctl: &mut DragController, id: ObjectId, x: f64, y: f64) -> DragAction {
    ctl.handle(PointerEvent::Down { pointer: P, object: id, screen: Point::new(x, y) }, &Transform::IDENTITY)
}

fn mv(ctl: &mut DragController, x: f64, y: f64) -> DragAction {
    ctl.handle(PointerEvent::Move { pointer: P, screen: Point::new(x, y) }, &Transform::IDENTITY)
}

fn up(ctl: &mut DragController, x: f64, y: f64) -> DragAction {
    ctl.handle(PointerEvent::Up { pointer: P, screen: Point::new(x, y) }, &Transform::IDENTITY)
}

fn seeded() -> (Rig, PlacedObject) {
    let rig = Rig::new();
    let obj = note(rig.room_id, 100.0, 100.0, 1);
    rig.seed(&obj);
    (rig, obj)
}

fn store_position(rig: &Rig, id: ObjectId) -> Option<Position> {
    rig.store.lock().get(&id).map(|o| o.position)
}

// =============================================================================
// Classification
// =============================================================================

#[tokio::test(start_paused = true)]
async fn small_displacement_is_a_click_and_writes_nothing() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    mv(&mut ctl, 101.5, 100.0);
    assert_eq!(up(&mut ctl, 101.5, 100.0), DragAction::Clicked { id: obj.id });

    settle().await;
    assert!(rig.backend.calls().is_empty());
    assert_eq!(store_position(&rig, obj.id), Some(Position::new(100.0, 100.0)));
    assert!(!ctl.is_dragging());
}

#[tokio::test(start_paused = true)]
async fn overshoot_commits_the_clamped_position() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    mv(&mut ctl, 250.0, 50.0);
    let action = up(&mut ctl, 250.0, 50.0);
    assert_eq!(action, DragAction::Committed { id: obj.id, position: Position::new(200.0, 50.0) });

    // Visible in the store before any write goes out.
    assert_eq!(store_position(&rig, obj.id), Some(Position::new(200.0, 50.0)));
    assert!(rig.backend.calls().is_empty());

    settle().await;
    assert_eq!(rig.backend.calls(), vec![GatewayCall::CommitPosition { id: obj.id, x: 200.0, y: 50.0, z_index: 0 }]);
}

#[tokio::test(start_paused = true)]
async fn a_hundred_moves_make_one_commit() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    for i in 1..=100 {
        mv(&mut ctl, 100.0 + f64::from(i) * 0.5, 100.0);
    }
    up(&mut ctl, 150.0, 100.0);
    settle().await;
    assert_eq!(rig.backend.position_commits(), vec![GatewayCall::CommitPosition {
        id: obj.id,
        x: 150.0,
        y: 100.0,
        z_index: 0
    }]);
}

#[tokio::test(start_paused = true)]
async fn a_second_drag_supersedes_the_first_commit() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    up(&mut ctl, 150.0, 150.0);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    down(&mut ctl, obj.id, 150.0, 150.0);
    up(&mut ctl, 40.0, 60.0);
    settle().await;
    assert_eq!(rig.backend.position_commits(), vec![GatewayCall::CommitPosition {
        id: obj.id,
        x: 40.0,
        y: 60.0,
        z_index: 0
    }]);
}

#[tokio::test(start_paused = true)]
async fn a_click_during_the_debounce_keeps_the_pending_commit() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    up(&mut ctl, 150.0, 150.0);
    down(&mut ctl, obj.id, 150.0, 150.0);
    assert!(!rig.commits.is_pending(obj.id, CommitField::Position));
    assert_eq!(up(&mut ctl, 151.0, 150.0), DragAction::Clicked { id: obj.id });
    assert!(rig.commits.is_pending(obj.id, CommitField::Position));

    settle().await;
    assert_eq!(rig.backend.position_commits().len(), 1);
    assert_eq!(rig.backend.object(&obj.id).map(|o| o.position), Some(Position::new(150.0, 150.0)));
}

// =============================================================================
// Live state
// =============================================================================

#[tokio::test(start_paused = true)]
async fn moves_stay_in_the_session_until_release() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 110.0, 105.0);
    let action = mv(&mut ctl, 160.0, 155.0);
    assert_eq!(action, DragAction::Moved { id: obj.id, position: Position::new(150.0, 150.0) });
    assert_eq!(ctl.live_position(), Some((obj.id, Position::new(150.0, 150.0))));
    assert_eq!(store_position(&rig, obj.id), Some(Position::new(100.0, 100.0)));
}

#[tokio::test(start_paused = true)]
async fn live_position_is_always_inside_bounds() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);
    let bounds = room_0_200();

    down(&mut ctl, obj.id, 100.0, 100.0);
    let wild = [(-1e9, 5.0), (1e9, 1e9), (f64::NAN, 50.0), (100.0, f64::INFINITY), (199.9, -0.1), (0.0, 0.0)];
    for (x, y) in wild {
        match mv(&mut ctl, x, y) {
            DragAction::Moved { position, .. } => assert!(bounds.contains(position), "{position:?}"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn release_stamps_the_local_clock() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);
    rig.clock.set(T0 + 500);

    down(&mut ctl, obj.id, 100.0, 100.0);
    up(&mut ctl, 20.0, 20.0);
    assert_eq!(rig.store.lock().get(&obj.id).map(|o| o.updated_at), Some(T0 + 500));
}

// =============================================================================
// Capture and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn cancel_aborts_without_writing() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    mv(&mut ctl, 180.0, 20.0);
    let action = ctl.handle(PointerEvent::Cancel { pointer: P }, &Transform::IDENTITY);
    assert_eq!(action, DragAction::Cancelled { id: obj.id });
    assert_eq!(*ctl.state(), DragState::Idle);

    settle().await;
    assert!(rig.backend.calls().is_empty());
    assert_eq!(store_position(&rig, obj.id), Some(Position::new(100.0, 100.0)));
}

#[tokio::test(start_paused = true)]
async fn other_pointers_are_ignored_while_captured() {
    let (rig, obj) = seeded();
    let other = note(rig.room_id, 10.0, 10.0, 1);
    rig.seed(&other);
    let mut ctl = controller(&rig);
    let intruder = PointerId(2);

    down(&mut ctl, obj.id, 100.0, 100.0);
    let surface = Transform::IDENTITY;
    assert_eq!(ctl.handle(PointerEvent::Down { pointer: intruder, object: other.id, screen: Point::new(10.0, 10.0) }, &surface), DragAction::None);
    assert_eq!(ctl.handle(PointerEvent::Move { pointer: intruder, screen: Point::new(0.0, 0.0) }, &surface), DragAction::None);
    assert_eq!(ctl.handle(PointerEvent::Up { pointer: intruder, screen: Point::new(0.0, 0.0) }, &surface), DragAction::None);
    assert_eq!(ctl.captured_pointer(), Some(P));
    assert_eq!(ctl.live_position(), Some((obj.id, Position::new(100.0, 100.0))));
}

#[tokio::test(start_paused = true)]
async fn unknown_objects_cannot_be_grabbed() {
    let (rig, _) = seeded();
    let mut ctl = controller(&rig);
    assert_eq!(down(&mut ctl, Uuid::new_v4(), 1.0, 1.0), DragAction::None);
    assert!(!ctl.is_dragging());
}

#[tokio::test(start_paused = true)]
async fn deletion_underneath_a_drag_aborts_it() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    rig.store.lock().tombstone(&obj.id, T0);
    assert_eq!(mv(&mut ctl, 20.0, 20.0), DragAction::Cancelled { id: obj.id });

    settle().await;
    assert!(rig.backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn release_after_deletion_writes_nothing() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);

    down(&mut ctl, obj.id, 100.0, 100.0);
    rig.store.lock().tombstone(&obj.id, T0);
    assert_eq!(up(&mut ctl, 20.0, 20.0), DragAction::Cancelled { id: obj.id });
    settle().await;
    assert!(rig.backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn changing_bounds_aborts_the_drag() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);
    down(&mut ctl, obj.id, 100.0, 100.0);
    ctl.set_bounds(RoomBounds::new(0.0, 0.0, 50.0, 50.0));
    assert!(!ctl.is_dragging());
}

#[tokio::test(start_paused = true)]
async fn scaled_surface_maps_pointer_into_canvas_units() {
    let (rig, obj) = seeded();
    let mut ctl = controller(&rig);
    // Canvas drawn at half size.
    let surface = Transform::scale_translate(0.5, 0.5, 0.0, 0.0);

    ctl.handle(PointerEvent::Down { pointer: P, object: obj.id, screen: Point::new(50.0, 50.0) }, &surface);
    let action = ctl.handle(PointerEvent::Up { pointer: P, screen: Point::new(75.0, 50.0) }, &surface);
    assert_eq!(action, DragAction::Committed { id: obj.id, position: Position::new(150.0, 100.0) });
}
