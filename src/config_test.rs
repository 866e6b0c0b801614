#![allow(clippy::float_cmp)]

use super::*;

// =============================================================================
// Room profiles
// =============================================================================

#[test]
fn every_profile_fits_the_canvas() {
    for kind in RoomKind::ALL {
        let p = RoomProfile::for_kind(kind);
        assert_eq!(p.kind, kind);
        assert!(p.bounds.min_x >= 0.0 && p.bounds.max_x <= CANVAS_WIDTH, "{kind:?}");
        assert!(p.bounds.min_y >= 0.0 && p.bounds.max_y <= CANVAS_HEIGHT, "{kind:?}");
        assert!(p.bounds.min_x < p.bounds.max_x && p.bounds.min_y < p.bounds.max_y, "{kind:?}");
        assert!(p.min_scale <= p.default_scale && p.default_scale <= p.max_scale, "{kind:?}");
    }
}

#[test]
fn garden_keeps_objects_below_the_horizon() {
    let garden = RoomProfile::for_kind(RoomKind::Garden);
    let p = garden.bounds.clamp(crate::doc::Position::new(500.0, 10.0));
    assert_eq!(p.y, 220.0);
}

#[test]
fn clamp_scale_respects_limits() {
    let kitchen = RoomProfile::for_kind(RoomKind::Kitchen);
    assert_eq!(kitchen.clamp_scale(10.0), 1.5);
    assert_eq!(kitchen.clamp_scale(0.1), 0.5);
    assert_eq!(kitchen.clamp_scale(1.2), 1.2);
    assert_eq!(kitchen.clamp_scale(f64::NAN), kitchen.default_scale);
}

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__ROOMSYNC_TEST_MISSING__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_trims_and_parses() {
    unsafe { std::env::set_var("__ROOMSYNC_TEST_VALID__", " 2.5 ") };
    let val: f64 = env_parse("__ROOMSYNC_TEST_VALID__", 0.0);
    assert_eq!(val, 2.5);
    unsafe { std::env::remove_var("__ROOMSYNC_TEST_VALID__") };
}

#[test]
fn env_parse_garbage_returns_default() {
    unsafe { std::env::set_var("__ROOMSYNC_TEST_GARBAGE__", "soon") };
    let val: u32 = env_parse("__ROOMSYNC_TEST_GARBAGE__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__ROOMSYNC_TEST_GARBAGE__") };
}

// =============================================================================
// SyncConfig
// =============================================================================

#[test]
fn defaults_match_constants() {
    let c = SyncConfig::default();
    assert_eq!(c.commit_debounce, Duration::from_millis(DEFAULT_COMMIT_DEBOUNCE_MS));
    assert_eq!(c.click_threshold, DEFAULT_CLICK_THRESHOLD);
    assert_eq!(c.retry_backoff, Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS));
    assert_eq!(c.max_commit_attempts, 2);
}

// The only test touching the ROOMSYNC_* variables, so nothing races it.
#[test]
fn from_env_overrides_and_sanitizes() {
    unsafe {
        std::env::set_var("ROOMSYNC_COMMIT_DEBOUNCE_MS", "120");
        std::env::set_var("ROOMSYNC_CLICK_THRESHOLD", "-4");
        std::env::set_var("ROOMSYNC_RETRY_BACKOFF_MS", "not-a-number");
        std::env::set_var("ROOMSYNC_MAX_COMMIT_ATTEMPTS", "0");
    }
    let c = SyncConfig::from_env();
    unsafe {
        std::env::remove_var("ROOMSYNC_COMMIT_DEBOUNCE_MS");
        std::env::remove_var("ROOMSYNC_CLICK_THRESHOLD");
        std::env::remove_var("ROOMSYNC_RETRY_BACKOFF_MS");
        std::env::remove_var("ROOMSYNC_MAX_COMMIT_ATTEMPTS");
    }

    assert_eq!(c.commit_debounce, Duration::from_millis(120));
    assert_eq!(c.click_threshold, DEFAULT_CLICK_THRESHOLD);
    assert_eq!(c.retry_backoff, Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS));
    assert_eq!(c.max_commit_attempts, 1);
}
