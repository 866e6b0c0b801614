//! Two clients sharing one kitchen over the in-process backend.
//!
//! Alice pins a note, drags it across the fridge, and Bob's session picks
//! the move up from the change feed. Tune with the `ROOMSYNC_*` variables;
//! `RUST_LOG=roomsync=debug` shows the sync traffic.

use std::sync::Arc;
use std::time::Duration;

use roomsync::clock::{Clock, SystemClock};
use roomsync::coords::{ClientRect, Point};
use roomsync::feed::ChangeFeed;
use roomsync::input::{PointerEvent, PointerId};
use roomsync::memory::MemoryBackend;
use roomsync::{Content, ErrorCode, ObjectKind, PersistenceGateway, Position, RoomKind, RoomSession, SyncConfig};
use tracing::{error, info};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = SyncConfig::from_env();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = Arc::new(MemoryBackend::new(Arc::clone(&clock)));
    let gateway: Arc<dyn PersistenceGateway> = backend.clone();
    let feed: Arc<dyn ChangeFeed> = backend.clone();
    let room_id = Uuid::new_v4();

    let mut alice = RoomSession::open(
        RoomKind::Kitchen,
        room_id,
        Arc::clone(&gateway),
        Arc::clone(&feed),
        Arc::clone(&clock),
        config,
    )
    .await;
    let mut bob = RoomSession::open(RoomKind::Kitchen, room_id, gateway, feed, Arc::clone(&clock), config).await;

    // Alice's canvas is drawn at half size.
    alice.surface_mut().set_client_rect(ClientRect { left: 0.0, top: 0.0, width: 500.0, height: 350.0 });

    let content = Content::Note { text: "buy oat milk".into(), color: Some("yellow".into()) };
    if let Err(e) = alice.place_object(ObjectKind::Note, "note-square", Position::new(200.0, 200.0), content) {
        error!(error = %e, code = e.error_code(), "placing note failed");
        return;
    }
    settle(&config).await;

    let Some(note) = alice.render_objects().into_iter().next() else {
        error!("note missing after placement");
        return;
    };
    info!(object_id = %note.id, x = note.position.x, y = note.position.y, "note confirmed");

    let pointer = PointerId(1);
    let grab = Point::new(note.position.x / 2.0 + 5.0, note.position.y / 2.0 + 5.0);
    alice.handle_pointer(PointerEvent::Down { pointer, object: note.id, screen: grab });
    for step in 1..=20 {
        let t = f64::from(step);
        alice.handle_pointer(PointerEvent::Move { pointer, screen: Point::new(grab.x + t * 8.0, grab.y + t * 3.0) });
    }
    let action = alice.handle_pointer(PointerEvent::Up { pointer, screen: Point::new(grab.x + 160.0, grab.y + 60.0) });
    info!(?action, "drag released");
    settle(&config).await;

    match bob.store().lock().get_live(&note.id) {
        Some(seen) => info!(x = seen.position.x, y = seen.position.y, "bob sees the note"),
        None => error!(object_id = %note.id, "bob never saw the note"),
    }
    let status = *alice.save_status().borrow();
    info!(?status, "alice save status");

    alice.close();
    bob.close();
}

/// Wait out the debounce window plus a retry.
async fn settle(config: &SyncConfig) {
    tokio::time::sleep(config.commit_debounce + config.retry_backoff + Duration::from_millis(50)).await;
}
