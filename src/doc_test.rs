#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;

fn room_0_200() -> RoomBounds {
    RoomBounds::new(0.0, 0.0, 200.0, 200.0)
}

// =============================================================
// RoomBounds
// =============================================================

#[test]
fn clamp_pulls_overshoot_back_to_edge() {
    let p = room_0_200().clamp(Position::new(250.0, 50.0));
    assert_eq!(p, Position::new(200.0, 50.0));
}

#[test]
fn clamp_leaves_inside_points_alone() {
    let p = Position::new(12.5, 199.0);
    assert_eq!(room_0_200().clamp(p), p);
}

#[test]
fn clamp_handles_non_finite_input() {
    let b = room_0_200();
    assert_eq!(b.clamp(Position::new(f64::NAN, f64::NAN)), Position::new(0.0, 0.0));
    assert_eq!(b.clamp(Position::new(f64::INFINITY, f64::NEG_INFINITY)), Position::new(200.0, 0.0));
}

#[test]
fn clamp_is_total() {
    let b = RoomBounds::new(40.0, 60.0, 960.0, 640.0);
    let coords = [-1e12, -500.0, -0.5, 0.0, 39.9, 40.0, 500.0, 640.0, 959.99, 960.0, 1e9, f64::NAN, f64::INFINITY];
    for &x in &coords {
        for &y in &coords {
            let p = b.clamp(Position::new(x, y));
            assert!(b.contains(p), "({x}, {y}) clamped to {p:?}, outside bounds");
        }
    }
}

#[test]
fn contains_is_edge_inclusive() {
    let b = room_0_200();
    assert!(b.contains(Position::new(0.0, 200.0)));
    assert!(!b.contains(Position::new(200.1, 0.0)));
}

// =============================================================
// Rotation
// =============================================================

#[test]
fn rotation_is_normalized_into_one_turn() {
    assert_eq!(normalize_rotation(-90.0), 270.0);
    assert_eq!(normalize_rotation(720.0), 0.0);
    assert_eq!(normalize_rotation(45.0), 45.0);
    assert_eq!(normalize_rotation(f64::NAN), 0.0);
    let tiny = normalize_rotation(-1e-20);
    assert!((0.0..360.0).contains(&tiny));
}

// =============================================================
// Content
// =============================================================

#[test]
fn empty_content_matches_its_kind() {
    for kind in [ObjectKind::Note, ObjectKind::Magnet, ObjectKind::Furniture, ObjectKind::WallImage] {
        assert_eq!(Content::empty(kind).kind(), kind);
    }
}

#[test]
fn content_is_tagged_by_kind() {
    let c = Content::WallImage { image_url: "https://img/1.jpg".into(), caption: None };
    let v = serde_json::to_value(&c).unwrap();
    assert_eq!(v["kind"], "wall_image");
    assert_eq!(v["image_url"], "https://img/1.jpg");
    assert!(v.get("caption").is_none());
}

// =============================================================
// PlacedObject
// =============================================================

fn sample() -> PlacedObject {
    PlacedObject {
        id: Uuid::new_v4(),
        room_id: Uuid::new_v4(),
        asset_id: "magnet-cat".into(),
        kind: ObjectKind::Magnet,
        position: Position::new(10.0, 20.0),
        z_index: 3,
        rotation: 0.0,
        scale: 1.0,
        content: Content::Magnet { label: None },
        updated_at: 1_000,
        deleted_at: None,
        client_ref: None,
    }
}

#[test]
fn tombstone_flag_follows_deleted_at() {
    let mut obj = sample();
    assert!(!obj.is_tombstoned());
    obj.deleted_at = Some(2_000);
    assert!(obj.is_tombstoned());
}

#[test]
fn divergence_ignores_identity_and_timestamps() {
    let a = sample();
    let mut b = a.clone();
    b.id = Uuid::new_v4();
    b.updated_at = 9_999;
    b.client_ref = Some(Uuid::new_v4());
    assert!(!a.diverges_from(&b));

    b.z_index = 4;
    assert!(a.diverges_from(&b));
}

#[test]
fn object_wire_shape_omits_unset_optionals() {
    let v = serde_json::to_value(sample()).unwrap();
    assert!(v.get("deleted_at").is_none());
    assert!(v.get("client_ref").is_none());
    assert_eq!(v["kind"], "magnet");
    assert_eq!(v["content"]["kind"], "magnet");

    let back: PlacedObject = serde_json::from_value(v).unwrap();
    assert_eq!(back.deleted_at, None);
}

#[test]
fn distance_is_euclidean() {
    assert_eq!(Position::new(0.0, 0.0).distance_to(Position::new(3.0, 4.0)), 5.0);
}
