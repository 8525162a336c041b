//! Web-Mercator viewport: projection, pan/zoom, padded bounds fitting and
//! eased camera flights.
//!
//! Internally positions are "world units": Mercator x/y in 0..1, y growing
//! south. One world unit is `TILE_SIZE * 2^zoom` screen pixels.

use egui::{Pos2, Rect as ScreenRect, Vec2};
use geo::{Coord, Rect};

use crate::surface::Padding;

pub const TILE_SIZE: f64 = 256.0;
/// Mercator latitude limit
const MAX_LAT: f64 = 85.051_128_78;

/// lon/lat -> world units
pub fn project(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-MAX_LAT, MAX_LAT).to_radians();
    Coord {
        x: (coord.x + 180.0) / 360.0,
        y: (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0,
    }
}

/// world units -> lon/lat
pub fn unproject(world: Coord<f64>) -> Coord<f64> {
    let n = std::f64::consts::PI * (1.0 - 2.0 * world.y);
    Coord {
        x: world.x * 360.0 - 180.0,
        y: n.sinh().atan().to_degrees(),
    }
}

pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone)]
struct Flight {
    from_center: Coord<f64>,
    from_zoom: f64,
    to_center: Coord<f64>,
    to_zoom: f64,
    started: f64,
    duration: f64,
}

#[derive(Debug, Clone)]
pub struct Viewport {
    /// World units
    center: Coord<f64>,
    zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    flight: Option<Flight>,
}

impl Viewport {
    pub fn new(center: Coord<f64>, zoom: f64, min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            center: project(center),
            zoom: zoom.clamp(min_zoom, max_zoom),
            min_zoom,
            max_zoom,
            flight: None,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Center in lon/lat
    pub fn center(&self) -> Coord<f64> {
        unproject(self.center)
    }

    pub fn is_flying(&self) -> bool {
        self.flight.is_some()
    }

    pub fn world_to_screen(&self, world: Coord<f64>, rect: ScreenRect) -> Pos2 {
        let scale = world_size(self.zoom);
        let c = rect.center();
        Pos2::new(
            c.x + ((world.x - self.center.x) * scale) as f32,
            c.y + ((world.y - self.center.y) * scale) as f32,
        )
    }

    pub fn geo_to_screen(&self, coord: Coord<f64>, rect: ScreenRect) -> Pos2 {
        self.world_to_screen(project(coord), rect)
    }

    pub fn screen_to_world(&self, pos: Pos2, rect: ScreenRect) -> Coord<f64> {
        let scale = world_size(self.zoom);
        let c = rect.center();
        Coord {
            x: self.center.x + (pos.x - c.x) as f64 / scale,
            y: self.center.y + (pos.y - c.y) as f64 / scale,
        }
    }

    pub fn screen_to_geo(&self, pos: Pos2, rect: ScreenRect) -> Coord<f64> {
        unproject(self.screen_to_world(pos, rect))
    }

    /// Visible lon/lat box, for culling
    pub fn visible_bounds(&self, rect: ScreenRect) -> Rect<f64> {
        Rect::new(
            self.screen_to_geo(rect.left_bottom(), rect),
            self.screen_to_geo(rect.right_top(), rect),
        )
    }

    /// Drag by a screen delta. Cancels any flight.
    pub fn pan(&mut self, delta: Vec2) {
        self.flight = None;
        let scale = world_size(self.zoom);
        self.center.x -= delta.x as f64 / scale;
        self.center.y = (self.center.y - delta.y as f64 / scale).clamp(0.0, 1.0);
    }

    /// Zoom by `delta` levels keeping `anchor` fixed on screen
    pub fn zoom_around(&mut self, delta: f64, anchor: Pos2, rect: ScreenRect) {
        self.flight = None;
        let new_zoom = (self.zoom + delta).clamp(self.min_zoom, self.max_zoom);
        if new_zoom == self.zoom {
            return;
        }
        let c = rect.center();
        let offset = Coord {
            x: (anchor.x - c.x) as f64,
            y: (anchor.y - c.y) as f64,
        };
        let anchor_world = Coord {
            x: self.center.x + offset.x / world_size(self.zoom),
            y: self.center.y + offset.y / world_size(self.zoom),
        };
        self.zoom = new_zoom;
        self.center = Coord {
            x: anchor_world.x - offset.x / world_size(new_zoom),
            y: anchor_world.y - offset.y / world_size(new_zoom),
        };
    }

    /// Center (world units) and zoom that fit `bounds` inside a `size` view
    /// after keeping `padding` free, capped at `max_zoom`.
    pub fn fit_bounds(
        &self,
        bounds: Rect<f64>,
        size: Vec2,
        padding: &Padding,
        max_zoom: f64,
    ) -> (Coord<f64>, f64) {
        let nw = project(Coord { x: bounds.min().x, y: bounds.max().y });
        let se = project(Coord { x: bounds.max().x, y: bounds.min().y });
        let span_x = (se.x - nw.x).abs();
        let span_y = (se.y - nw.y).abs();

        let avail_x = (size.x - padding.left - padding.right).max(1.0) as f64;
        let avail_y = (size.y - padding.top - padding.bottom).max(1.0) as f64;

        let cap = max_zoom.min(self.max_zoom);
        let zoom = if span_x <= f64::EPSILON && span_y <= f64::EPSILON {
            cap
        } else {
            let scale_x = if span_x > 0.0 { avail_x / (span_x * TILE_SIZE) } else { f64::INFINITY };
            let scale_y = if span_y > 0.0 { avail_y / (span_y * TILE_SIZE) } else { f64::INFINITY };
            scale_x.min(scale_y).log2()
        };
        let zoom = zoom.clamp(self.min_zoom, cap.max(self.min_zoom));

        // Shift the center so the bounds land in the middle of the padded area
        let scale = world_size(zoom);
        let shift_x = (padding.left - padding.right) as f64 / 2.0 / scale;
        let shift_y = (padding.top - padding.bottom) as f64 / 2.0 / scale;
        let center = Coord {
            x: (nw.x + se.x) / 2.0 - shift_x,
            y: (nw.y + se.y) / 2.0 - shift_y,
        };
        (center, zoom)
    }

    /// Start an eased flight to a world-unit center and zoom
    pub fn fly_to(&mut self, center: Coord<f64>, zoom: f64, now: f64, duration: f64) {
        if duration <= 0.0 {
            self.center = center;
            self.zoom = zoom;
            self.flight = None;
            return;
        }
        self.flight = Some(Flight {
            from_center: self.center,
            from_zoom: self.zoom,
            to_center: center,
            to_zoom: zoom,
            started: now,
            duration,
        });
    }

    /// Advance the flight; true while still animating
    pub fn tick(&mut self, now: f64) -> bool {
        let Some(flight) = self.flight.clone() else {
            return false;
        };
        let t = ((now - flight.started) / flight.duration).clamp(0.0, 1.0);
        if t >= 1.0 {
            self.center = flight.to_center;
            self.zoom = flight.to_zoom;
            self.flight = None;
            return false;
        }
        let e = ease_out_cubic(t);
        self.zoom = flight.from_zoom + (flight.to_zoom - flight.from_zoom) * e;
        self.center = Coord {
            x: flight.from_center.x + (flight.to_center.x - flight.from_center.x) * e,
            y: flight.from_center.y + (flight.to_center.y - flight.from_center.y) * e,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> ScreenRect {
        ScreenRect::from_min_size(Pos2::ZERO, Vec2::new(1200.0, 800.0))
    }

    #[test]
    fn test_projection_roundtrip() {
        let coord = Coord { x: -62.712, y: -34.266 };
        let back = unproject(project(coord));
        assert!((back.x - coord.x).abs() < 1e-9);
        assert!((back.y - coord.y).abs() < 1e-9);
        assert_eq!(project(Coord { x: 0.0, y: 0.0 }), Coord { x: 0.5, y: 0.5 });
    }

    #[test]
    fn test_screen_geo_inverse() {
        let view = Viewport::new(Coord { x: -62.712, y: -34.266 }, 14.0, 2.0, 19.0);
        let p = Pos2::new(300.0, 250.0);
        let back = view.geo_to_screen(view.screen_to_geo(p, screen()), screen());
        assert!((back.x - p.x).abs() < 0.01);
        assert!((back.y - p.y).abs() < 0.01);
    }

    #[test]
    fn test_fit_keeps_bounds_inside_padding() {
        let view = Viewport::new(Coord { x: -62.712, y: -34.266 }, 14.0, 2.0, 19.0);
        let bounds = Rect::new(Coord { x: -62.72, y: -34.27 }, Coord { x: -62.70, y: -34.26 });
        let padding = Padding { top: 280.0, right: 360.0, bottom: 40.0, left: 40.0 };
        let (center, zoom) = view.fit_bounds(bounds, screen().size(), &padding, 18.0);

        let mut fitted = view.clone();
        fitted.fly_to(center, zoom, 0.0, 0.0);
        let nw = fitted.geo_to_screen(Coord { x: -62.72, y: -34.26 }, screen());
        let se = fitted.geo_to_screen(Coord { x: -62.70, y: -34.27 }, screen());
        assert!(nw.x >= padding.left - 0.5 && nw.y >= padding.top - 0.5);
        assert!(se.x <= 1200.0 - padding.right + 0.5);
        assert!(se.y <= 800.0 - padding.bottom + 0.5);
    }

    #[test]
    fn test_fit_caps_zoom_for_small_parcels() {
        let view = Viewport::new(Coord { x: 0.0, y: 0.0 }, 10.0, 2.0, 19.0);
        let tiny = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.00001, y: 0.00001 });
        let (_, zoom) = view.fit_bounds(tiny, screen().size(), &Padding::default(), 18.0);
        assert_eq!(zoom, 18.0);
        let point = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 });
        let (_, zoom) = view.fit_bounds(point, screen().size(), &Padding::default(), 18.0);
        assert_eq!(zoom, 18.0);
    }

    #[test]
    fn test_flight_reaches_target() {
        let mut view = Viewport::new(Coord { x: 0.0, y: 0.0 }, 10.0, 2.0, 19.0);
        let target = project(Coord { x: 1.0, y: 1.0 });
        view.fly_to(target, 15.0, 100.0, 0.8);
        assert!(view.tick(100.4));
        assert!(view.zoom() > 10.0 && view.zoom() < 15.0);
        assert!(!view.tick(101.0));
        assert_eq!(view.zoom(), 15.0);
        let center = view.center();
        assert!((center.x - 1.0).abs() < 1e-9 && (center.y - 1.0).abs() < 1e-9);
        assert!(!view.is_flying());
    }

    #[test]
    fn test_zoom_around_keeps_anchor() {
        let mut view = Viewport::new(Coord { x: -62.712, y: -34.266 }, 14.0, 2.0, 19.0);
        let anchor = Pos2::new(900.0, 200.0);
        let before = view.screen_to_geo(anchor, screen());
        view.zoom_around(1.0, anchor, screen());
        let after = view.screen_to_geo(anchor, screen());
        assert_eq!(view.zoom(), 15.0);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }
}
