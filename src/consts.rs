//! Shared numeric constants for the sync core.

// ── Drag ────────────────────────────────────────────────────────

/// Displacement below which a pointer-down/up pair is a click, in canvas units.
pub const DEFAULT_CLICK_THRESHOLD: f64 = 3.0;

// ── Commits ─────────────────────────────────────────────────────

/// Quiet period between a settled edit and its remote write.
pub const DEFAULT_COMMIT_DEBOUNCE_MS: u64 = 300;

/// Delay before the single retry of a failed write.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Total attempts per write: the first try plus one retry.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 2;

// ── Canvas ──────────────────────────────────────────────────────

/// Width of the fixed logical canvas every room is drawn into.
pub const CANVAS_WIDTH: f64 = 1000.0;

/// Height of the fixed logical canvas every room is drawn into.
pub const CANVAS_HEIGHT: f64 = 700.0;
