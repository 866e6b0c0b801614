//! Static room profiles and sync tuning parsed from environment variables.
//!
//! DESIGN
//! ======
//! Room bounds and scale limits are per room type and never change at
//! runtime, so they are plain `const` tables. Timing knobs (debounce, click
//! threshold, retry backoff) default to the values in [`crate::consts`] and
//! may be overridden from the environment; a missing or unparsable variable
//! falls back to the default rather than failing.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::{
    CANVAS_HEIGHT, CANVAS_WIDTH, DEFAULT_CLICK_THRESHOLD, DEFAULT_COMMIT_DEBOUNCE_MS, DEFAULT_MAX_COMMIT_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF_MS,
};
use crate::doc::RoomBounds;

// =============================================================================
// ROOM PROFILES
// =============================================================================

/// The room types a shared house can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Kitchen,
    Garden,
    Gallery,
    Bedroom,
    PrivateRoom,
}

impl RoomKind {
    pub const ALL: [RoomKind; 5] = [Self::Kitchen, Self::Garden, Self::Gallery, Self::Bedroom, Self::PrivateRoom];
}

/// Static per-room-type placement limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomProfile {
    pub kind: RoomKind,
    pub bounds: RoomBounds,
    pub min_scale: f64,
    pub max_scale: f64,
    pub default_scale: f64,
}

impl RoomProfile {
    /// Look up the profile for a room type.
    #[must_use]
    pub fn for_kind(kind: RoomKind) -> Self {
        match kind {
            // Fridge door and counter top.
            RoomKind::Kitchen => Self {
                kind,
                bounds: RoomBounds::new(40.0, 60.0, CANVAS_WIDTH - 40.0, CANVAS_HEIGHT - 60.0),
                min_scale: 0.5,
                max_scale: 1.5,
                default_scale: 1.0,
            },
            // Lawn below the horizon line.
            RoomKind::Garden => Self {
                kind,
                bounds: RoomBounds::new(0.0, 220.0, CANVAS_WIDTH, CANVAS_HEIGHT),
                min_scale: 0.4,
                max_scale: 2.0,
                default_scale: 1.0,
            },
            // Wall space only.
            RoomKind::Gallery => Self {
                kind,
                bounds: RoomBounds::new(60.0, 40.0, CANVAS_WIDTH - 60.0, 480.0),
                min_scale: 0.5,
                max_scale: 2.5,
                default_scale: 1.0,
            },
            RoomKind::Bedroom => Self {
                kind,
                bounds: RoomBounds::new(20.0, 120.0, CANVAS_WIDTH - 20.0, CANVAS_HEIGHT - 20.0),
                min_scale: 0.5,
                max_scale: 1.8,
                default_scale: 1.0,
            },
            RoomKind::PrivateRoom => Self {
                kind,
                bounds: RoomBounds::new(0.0, 0.0, CANVAS_WIDTH, CANVAS_HEIGHT),
                min_scale: 0.25,
                max_scale: 3.0,
                default_scale: 1.0,
            },
        }
    }

    /// Clamp a scale factor into this profile's limits.
    #[must_use]
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() {
            return self.default_scale;
        }
        scale.clamp(self.min_scale, self.max_scale)
    }
}

// =============================================================================
// SYNC CONFIG
// =============================================================================

/// Timing knobs for drag classification and remote writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Quiet period between a settled edit and its remote write.
    pub commit_debounce: Duration,
    /// Displacement below which a drag is reclassified as a click.
    pub click_threshold: f64,
    /// Delay before retrying a failed write.
    pub retry_backoff: Duration,
    /// Attempts per write including the first.
    pub max_commit_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            commit_debounce: Duration::from_millis(DEFAULT_COMMIT_DEBOUNCE_MS),
            click_threshold: DEFAULT_CLICK_THRESHOLD,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl SyncConfig {
    /// Build from environment variables, defaulting each missing knob.
    ///
    /// - `ROOMSYNC_COMMIT_DEBOUNCE_MS`
    /// - `ROOMSYNC_CLICK_THRESHOLD`
    /// - `ROOMSYNC_RETRY_BACKOFF_MS`
    /// - `ROOMSYNC_MAX_COMMIT_ATTEMPTS` (values below 1 are raised to 1)
    #[must_use]
    pub fn from_env() -> Self {
        let click_threshold = env_parse("ROOMSYNC_CLICK_THRESHOLD", DEFAULT_CLICK_THRESHOLD);
        Self {
            commit_debounce: Duration::from_millis(env_parse("ROOMSYNC_COMMIT_DEBOUNCE_MS", DEFAULT_COMMIT_DEBOUNCE_MS)),
            click_threshold: if click_threshold.is_finite() && click_threshold >= 0.0 {
                click_threshold
            } else {
                DEFAULT_CLICK_THRESHOLD
            },
            retry_backoff: Duration::from_millis(env_parse("ROOMSYNC_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)),
            max_commit_attempts: env_parse("ROOMSYNC_MAX_COMMIT_ATTEMPTS", DEFAULT_MAX_COMMIT_ATTEMPTS).max(1),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key).map_or(default, |v| v.trim().parse::<T>().unwrap_or(default))
}
