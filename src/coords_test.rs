use super::*;

fn approx(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
}

fn mounted(left: f64, top: f64, width: f64, height: f64) -> FittedViewport {
    let mut v = FittedViewport::new(1000.0, 700.0);
    v.set_client_rect(ClientRect { left, top, width, height });
    v
}

// =============================================================
// Transform
// =============================================================

#[test]
fn identity_maps_points_to_themselves() {
    let p = Point::new(12.0, -7.5);
    assert_eq!(to_canvas_space(p, &Transform::IDENTITY), p);
}

#[test]
fn inverse_undoes_apply() {
    let t = Transform { a: 2.0, b: 0.5, c: -0.25, d: 1.5, e: 30.0, f: -12.0 };
    let inv = t.inverse().unwrap();
    let p = Point::new(123.0, 45.0);
    assert!(approx(inv.apply(t.apply(p)), p));
}

#[test]
fn then_composes_in_application_order() {
    let scale = Transform::scale_translate(2.0, 2.0, 0.0, 0.0);
    let shift = Transform::scale_translate(1.0, 1.0, 10.0, 0.0);
    // Scale first, then shift.
    let t = shift.then(&scale);
    assert!(approx(t.apply(Point::new(5.0, 5.0)), Point::new(20.0, 10.0)));
}

#[test]
fn singular_transform_falls_back_to_origin() {
    let flat = Transform::scale_translate(0.0, 1.0, 5.0, 5.0);
    assert!(flat.inverse().is_none());
    assert_eq!(to_canvas_space(Point::new(50.0, 50.0), &flat), Point::ORIGIN);
}

// =============================================================
// FittedViewport
// =============================================================

#[test]
fn unmounted_canvas_maps_to_origin() {
    let mut v = mounted(0.0, 0.0, 500.0, 350.0);
    v.unmount();
    assert_eq!(to_canvas_space(Point::new(250.0, 100.0), &v), Point::ORIGIN);
}

#[test]
fn zero_sized_canvas_maps_to_origin() {
    let v = mounted(0.0, 0.0, 0.0, 350.0);
    assert_eq!(to_canvas_space(Point::new(10.0, 10.0), &v), Point::ORIGIN);
}

#[test]
fn css_scaling_with_page_offset() {
    // Half-size canvas placed at (100, 50) on the page.
    let v = mounted(100.0, 50.0, 500.0, 350.0);
    assert!(approx(to_canvas_space(Point::new(100.0, 50.0), &v), Point::new(0.0, 0.0)));
    assert!(approx(to_canvas_space(Point::new(350.0, 225.0), &v), Point::new(500.0, 350.0)));
    assert!(approx(to_canvas_space(Point::new(600.0, 400.0), &v), Point::new(1000.0, 700.0)));
}

#[test]
fn contain_letterboxes_a_wide_rect() {
    let v = mounted(0.0, 0.0, 2000.0, 700.0);
    assert!(approx(to_canvas_space(Point::new(500.0, 0.0), &v), Point::new(0.0, 0.0)));
    assert!(approx(to_canvas_space(Point::new(1500.0, 700.0), &v), Point::new(1000.0, 700.0)));
}

#[test]
fn stretch_scales_axes_independently() {
    let v = mounted(0.0, 0.0, 500.0, 700.0).with_fit(FitMode::Stretch);
    assert!(approx(to_canvas_space(Point::new(250.0, 350.0), &v), Point::new(500.0, 350.0)));
    assert!(approx(to_canvas_space(Point::new(500.0, 100.0), &v), Point::new(1000.0, 100.0)));
}

#[test]
fn zoom_is_about_the_rect_center() {
    let mut v = mounted(0.0, 0.0, 1000.0, 700.0);
    v.set_zoom(2.0);
    assert!(approx(to_canvas_space(Point::new(500.0, 350.0), &v), Point::new(500.0, 350.0)));
    assert!(approx(to_canvas_space(Point::new(600.0, 350.0), &v), Point::new(550.0, 350.0)));
}

#[test]
fn invalid_zoom_resets_to_one() {
    let mut v = mounted(0.0, 0.0, 1000.0, 700.0);
    v.set_zoom(-3.0);
    assert_eq!(v.zoom, 1.0_f64);
    v.set_zoom(f64::NAN);
    assert_eq!(v.zoom, 1.0_f64);
}

#[test]
fn position_and_point_convert() {
    let pos: Position = Point::new(3.0, 4.0).into();
    assert_eq!(pos, Position::new(3.0, 4.0));
    assert_eq!(Point::from(pos), Point::new(3.0, 4.0));
}
