//! Geometry primitives for the layout engine.
//!
//! Everything here is a total function over plain coordinates: no element
//! identity, no registry lookups, no fallible I/O. Higher layers (routing,
//! lanes, grid) build on these to stay free of ad-hoc point/rect math.
//!
//! Tolerances live in [`tolerance`] and are the same constants spec'd for
//! the rest of the engine (orthogonal-snap, collinearity, dedupe).

use serde::{Deserialize, Serialize};

pub mod tolerance {
    /// Two points closer than this on both axes are treated as the same point.
    pub const DEDUPE_EPS: f64 = 1.0;
    /// A triple is collinear if the middle point's perpendicular offset from
    /// the line through its neighbours is within this many pixels.
    pub const COLLINEAR_EPS: f64 = 1.0;
    /// A segment is "near orthogonal" below this delta on the off-axis.
    pub const ORTHO_SNAP_EPS: f64 = 8.0;
    /// Maximum oscillation-collapse sweeps `deduplicate_waypoints` will run.
    pub const MAX_DEDUPE_SWEEPS: usize = 20;
}

/// A point in the diagram plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// True if both coordinates are within `eps` of `other`.
    pub fn near(&self, other: Point, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps
    }
}

/// An axis-aligned rectangle, `(x, y)` at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }
    pub fn right(&self) -> f64 {
        self.x + self.width
    }
    pub fn top(&self) -> f64 {
        self.y
    }
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
    pub fn left_center(&self) -> Point {
        Point::new(self.left(), self.center().y)
    }
    pub fn right_center(&self) -> Point {
        Point::new(self.right(), self.center().y)
    }
    pub fn top_center(&self) -> Point {
        Point::new(self.center().x, self.top())
    }
    pub fn bottom_center(&self) -> Point {
        Point::new(self.center().x, self.bottom())
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// The smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// A rect expanded to additionally cover `p`.
    pub fn union_point(&self, p: Point) -> Rect {
        let left = self.left().min(p.x);
        let top = self.top().min(p.y);
        let right = self.right().max(p.x);
        let bottom = self.bottom().max(p.y);
        Rect::new(left, top, right - left, bottom - top)
    }
}

/// True if the segment `p1 -> p2` intersects `rect` (Liang-Barsky clipping
/// against the four rect edges; degenerate zero-length segments are tested
/// as point-in-rect).
pub fn segment_intersects_rect(p1: Point, p2: Point, rect: &Rect) -> bool {
    if p1.near(p2, 1e-9) {
        return rect.contains_point(p1);
    }
    let (dx, dy) = (p2.x - p1.x, p2.y - p1.y);
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let edges = [
        (-dx, p1.x - rect.left()),
        (dx, rect.right() - p1.x),
        (-dy, p1.y - rect.top()),
        (dy, rect.bottom() - p1.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }
    t0 <= t1
}

/// Build a straight (2-waypoint) or L-shaped (3-waypoint) orthogonal route
/// between two element borders. Straight when the endpoints are already
/// aligned within 2px on the dominant axis; otherwise bends along whichever
/// axis has the larger separation.
pub fn build_orthogonal_waypoints(src: Point, tgt: Point) -> Vec<Point> {
    const STRAIGHT_EPS: f64 = 2.0;
    if (src.y - tgt.y).abs() <= STRAIGHT_EPS {
        return vec![Point::new(src.x, src.y), Point::new(tgt.x, src.y)];
    }
    if (src.x - tgt.x).abs() <= STRAIGHT_EPS {
        return vec![Point::new(src.x, src.y), Point::new(src.x, tgt.y)];
    }
    if (tgt.x - src.x).abs() >= (tgt.y - src.y).abs() {
        // bend horizontally first: go out along src's row then down/up into target
        vec![src, Point::new(tgt.x, src.y), tgt]
    } else {
        vec![src, Point::new(src.x, tgt.y), tgt]
    }
}

/// A 4-waypoint Z-route: out from `src_right`, bend at the horizontal
/// midpoint between the two X coordinates, into `tgt_left`.
pub fn build_z_shape_route(src_right: f64, src_cy: f64, tgt_left: f64, tgt_cy: f64) -> Vec<Point> {
    let mid_x = (src_right + tgt_left) / 2.0;
    vec![
        Point::new(src_right, src_cy),
        Point::new(mid_x, src_cy),
        Point::new(mid_x, tgt_cy),
        Point::new(tgt_left, tgt_cy),
    ]
}

/// Remove consecutive near-duplicate points, then collapse `A -> B -> A`
/// oscillations (at most [`tolerance::MAX_DEDUPE_SWEEPS`] sweeps). Total for
/// every input, including empty.
pub fn deduplicate_waypoints(wps: &[Point], eps: f64) -> Vec<Point> {
    if wps.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<Point> = Vec::with_capacity(wps.len());
    for &p in wps {
        if out.last().is_none_or(|&last| !last.near(p, eps)) {
            out.push(p);
        }
    }
    for _ in 0..tolerance::MAX_DEDUPE_SWEEPS {
        let mut changed = false;
        let mut i = 0;
        while i + 2 < out.len() {
            if out[i].near(out[i + 2], eps) {
                out.remove(i + 2);
                out.remove(i + 1);
                changed = true;
            } else {
                i += 1;
            }
        }
        if !changed {
            break;
        }
    }
    out
}

/// Delete a middle point whenever `prev -> curr -> next` share an x or y
/// coordinate within [`tolerance::COLLINEAR_EPS`]. Runs until a fixed point.
pub fn remove_collinear_points(wps: &[Point]) -> Vec<Point> {
    if wps.len() < 3 {
        return wps.to_vec();
    }
    let mut out = wps.to_vec();
    loop {
        let mut removed = false;
        let mut i = 1;
        while i + 1 < out.len() {
            let (prev, curr, next) = (out[i - 1], out[i], out[i + 1]);
            let same_x = (prev.x - curr.x).abs() <= tolerance::COLLINEAR_EPS
                && (curr.x - next.x).abs() <= tolerance::COLLINEAR_EPS;
            let same_y = (prev.y - curr.y).abs() <= tolerance::COLLINEAR_EPS
                && (curr.y - next.y).abs() <= tolerance::COLLINEAR_EPS;
            if same_x || same_y {
                out.remove(i);
                removed = true;
            } else {
                i += 1;
            }
        }
        if !removed {
            break;
        }
    }
    out
}

/// True if every segment of `wps` is horizontal or vertical within `eps`.
pub fn is_orthogonal(wps: &[Point], eps: f64) -> bool {
    wps.windows(2)
        .all(|w| (w[0].x - w[1].x).abs() <= eps || (w[0].y - w[1].y).abs() <= eps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn straight_route_when_rows_align() {
        let wps = build_orthogonal_waypoints(Point::new(0.0, 50.0), Point::new(200.0, 51.0));
        assert_eq!(wps.len(), 2);
    }

    #[test]
    fn l_route_bends_on_dominant_axis() {
        let wps = build_orthogonal_waypoints(Point::new(0.0, 0.0), Point::new(10.0, 100.0));
        assert_eq!(wps.len(), 3);
        assert_eq!(wps[1], Point::new(0.0, 100.0));
    }

    #[test]
    fn z_route_has_four_points_through_midpoint() {
        let wps = build_z_shape_route(100.0, 50.0, 300.0, 150.0);
        assert_eq!(wps.len(), 4);
        assert_eq!(wps[1].x, 200.0);
        assert_eq!(wps[2].x, 200.0);
    }

    #[test]
    fn dedup_collapses_oscillation() {
        let wps = vec![
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
        ];
        let out = deduplicate_waypoints(&wps, tolerance::DEDUPE_EPS);
        assert_eq!(out, vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
    }

    #[test]
    fn dedup_removes_consecutive_near_duplicates() {
        let wps = vec![
            Point::new(0.0, 0.0),
            Point::new(0.3, 0.2),
            Point::new(100.0, 0.0),
        ];
        let out = deduplicate_waypoints(&wps, tolerance::DEDUPE_EPS);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn collinear_middle_point_removed() {
        let wps = vec![
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(100.0, 0.0),
        ];
        let out = remove_collinear_points(&wps);
        assert_eq!(out, vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
    }

    #[test]
    fn segment_rect_intersection_basic() {
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(segment_intersects_rect(
            Point::new(0.0, 20.0),
            Point::new(40.0, 20.0),
            &rect
        ));
        assert!(!segment_intersects_rect(
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            &rect
        ));
    }

    #[test]
    fn empty_input_is_total() {
        assert!(deduplicate_waypoints(&[], 1.0).is_empty());
        assert!(remove_collinear_points(&[]).is_empty());
    }
}
