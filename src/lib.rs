//! Object placement and realtime sync for shared rooms.
//!
//! Two people decorate the same room with notes, magnets, furniture and wall
//! photos. This crate owns the part with real invariants: turning pointer
//! input into clamped canvas positions, telling clicks from drags, writing
//! settled edits to the backend with debouncing, and merging the backend's
//! change feed into an optimistic local store so both clients converge.
//! Rendering, auth and asset catalogs belong to the host.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | One open room: wires everything below together |
//! | [`drag`] | Pointer gesture lifecycle and click/drag classification |
//! | [`coords`] | Screen-to-canvas transform inversion |
//! | [`input`] | Pointer events and the drag state machine types |
//! | [`store`] | Optimistic per-room object store with change notifications |
//! | [`reconcile`] | Last-write-wins merge of the change feed, refetch on reconnect |
//! | [`commit`] | Debounced, cancellable remote writes and the save indicator |
//! | [`gateway`] | Backend write contract, errors and retry |
//! | [`feed`] | Change-feed contract and cancellable subscriptions |
//! | [`memory`] | In-process backend implementing both contracts |
//! | [`doc`] | Placed objects, per-kind content, room bounds |
//! | [`config`] | Static room profiles and environment-driven tuning |
//! | [`clock`] | Millisecond time sources |
//! | [`consts`] | Shared numeric constants (debounce, click threshold, canvas size) |

pub mod clock;
pub mod commit;
pub mod config;
pub mod consts;
pub mod coords;
pub mod doc;
pub mod drag;
pub mod feed;
pub mod gateway;
pub mod input;
pub mod memory;
pub mod reconcile;
pub mod session;
pub mod store;

pub use config::{RoomKind, RoomProfile, SyncConfig};
pub use doc::{Content, ObjectId, ObjectKind, PlacedObject, Position, RoomBounds, RoomId};
pub use gateway::{ErrorCode, GatewayError, PersistenceGateway};
pub use session::{RoomSession, SessionError};
