//! Screen-to-canvas coordinate mapping.
//!
//! Objects live in a fixed logical canvas (see [`crate::consts::CANVAS_WIDTH`])
//! regardless of how large the canvas is drawn on screen. A [`CanvasSurface`]
//! reports the current canvas-to-screen transform; [`to_canvas_space`] inverts
//! it to turn a pointer position into canvas units.

#[cfg(test)]
#[path = "coords_test.rs"]
mod coords_test;

use crate::doc::Position;

/// A point in either screen or canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };
}

impl From<Point> for Position {
    fn from(p: Point) -> Self {
        Position { x: p.x, y: p.y }
    }
}

impl From<Position> for Point {
    fn from(p: Position) -> Self {
        Point { x: p.x, y: p.y }
    }
}

/// 2D affine transform in CSS `matrix(a, b, c, d, e, f)` order.
///
/// Maps `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    /// Uniform or non-uniform scale followed by a translation.
    #[must_use]
    pub fn scale_translate(sx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, e: tx, f: ty }
    }

    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        Point { x: self.a * p.x + self.c * p.y + self.e, y: self.b * p.x + self.d * p.y + self.f }
    }

    /// `self` applied after `first`.
    #[must_use]
    pub fn then(&self, first: &Transform) -> Transform {
        Transform {
            a: self.a * first.a + self.c * first.b,
            b: self.b * first.a + self.d * first.b,
            c: self.a * first.c + self.c * first.d,
            d: self.b * first.c + self.d * first.d,
            e: self.a * first.e + self.c * first.f + self.e,
            f: self.b * first.e + self.d * first.f + self.f,
        }
    }

    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse transform, or `None` when the matrix is singular or non-finite.
    #[must_use]
    pub fn inverse(&self) -> Option<Transform> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < f64::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Transform {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }
}

/// On-screen rectangle of the canvas element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Anything drawn on screen that hosts the logical canvas.
pub trait CanvasSurface {
    /// The canvas-to-screen transform, or `None` if the surface is not yet
    /// mounted or has no measurable size.
    fn screen_transform(&self) -> Option<Transform>;
}

impl CanvasSurface for Transform {
    fn screen_transform(&self) -> Option<Transform> {
        Some(*self)
    }
}

/// How the logical canvas is fitted into its client rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Preserve aspect ratio, center, letterbox the remainder.
    #[default]
    Contain,
    /// Stretch each axis independently to fill the rectangle.
    Stretch,
}

/// A fixed-size logical viewport drawn into a measured client rectangle,
/// optionally zoomed about its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedViewport {
    pub logical_width: f64,
    pub logical_height: f64,
    pub fit: FitMode,
    /// Extra view zoom applied about the rectangle center (1.0 = none).
    pub zoom: f64,
    rect: Option<ClientRect>,
}

impl FittedViewport {
    #[must_use]
    pub fn new(logical_width: f64, logical_height: f64) -> Self {
        Self { logical_width, logical_height, fit: FitMode::Contain, zoom: 1.0, rect: None }
    }

    #[must_use]
    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    /// Record the latest measured client rectangle (call on every resize).
    pub fn set_client_rect(&mut self, rect: ClientRect) {
        self.rect = Some(rect);
    }

    /// Forget the client rectangle, e.g. when the canvas unmounts.
    pub fn unmount(&mut self) {
        self.rect = None;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
    }
}

impl CanvasSurface for FittedViewport {
    fn screen_transform(&self) -> Option<Transform> {
        let rect = self.rect?;
        if rect.width <= 0.0 || rect.height <= 0.0 || self.logical_width <= 0.0 || self.logical_height <= 0.0 {
            return None;
        }
        let (sx, sy) = match self.fit {
            FitMode::Contain => {
                let s = (rect.width / self.logical_width).min(rect.height / self.logical_height);
                (s, s)
            }
            FitMode::Stretch => (rect.width / self.logical_width, rect.height / self.logical_height),
        };
        let drawn_w = self.logical_width * sx;
        let drawn_h = self.logical_height * sy;
        let fit = Transform::scale_translate(
            sx,
            sy,
            rect.left + (rect.width - drawn_w) * 0.5,
            rect.top + (rect.height - drawn_h) * 0.5,
        );

        let cx = rect.left + rect.width * 0.5;
        let cy = rect.top + rect.height * 0.5;
        let zoom = Transform::scale_translate(self.zoom, self.zoom, cx * (1.0 - self.zoom), cy * (1.0 - self.zoom));
        Some(zoom.then(&fit))
    }
}

/// Convert a screen-space pointer position into canvas space.
///
/// Returns the origin when the surface is not measurable or its transform
/// cannot be inverted.
#[must_use]
pub fn to_canvas_space(screen: Point, surface: &dyn CanvasSurface) -> Point {
    let Some(inverse) = surface.screen_transform().and_then(|t| t.inverse()) else {
        return Point::ORIGIN;
    };
    let p = inverse.apply(screen);
    if p.x.is_finite() && p.y.is_finite() { p } else { Point::ORIGIN }
}
