//! Property-based tests for the waypoint helpers (spec.md §4.1, §8
//! "quantified invariants").

use layout_geom::{Point, deduplicate_waypoints, is_orthogonal, remove_collinear_points, tolerance};
use proptest::prelude::*;

fn arb_point() -> impl Strategy<Value = Point> {
    (-2000.0..2000.0f64, -2000.0..2000.0f64).prop_map(|(x, y)| Point::new(x, y))
}

fn arb_waypoints() -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec(arb_point(), 0..12)
}

proptest! {
    // deduplicate_waypoints never leaves two consecutive points within eps.
    #[test]
    fn dedup_has_no_consecutive_near_duplicates(wps in arb_waypoints()) {
        let out = deduplicate_waypoints(&wps, tolerance::DEDUPE_EPS);
        for w in out.windows(2) {
            prop_assert!(!w[0].near(w[1], tolerance::DEDUPE_EPS));
        }
    }

    // deduplicate_waypoints is idempotent: running it twice is the same as once.
    #[test]
    fn dedup_is_idempotent(wps in arb_waypoints()) {
        let once = deduplicate_waypoints(&wps, tolerance::DEDUPE_EPS);
        let twice = deduplicate_waypoints(&once, tolerance::DEDUPE_EPS);
        prop_assert_eq!(once, twice);
    }

    // remove_collinear_points never grows the list and always keeps the
    // endpoints fixed.
    #[test]
    fn collinear_cleanup_keeps_endpoints_and_shrinks(wps in arb_waypoints()) {
        let out = remove_collinear_points(&wps);
        prop_assert!(out.len() <= wps.len());
        if let (Some(first_in), Some(first_out)) = (wps.first(), out.first()) {
            prop_assert_eq!(*first_in, *first_out);
        }
        if let (Some(last_in), Some(last_out)) = (wps.last(), out.last()) {
            prop_assert_eq!(*last_in, *last_out);
        }
    }

    // remove_collinear_points is idempotent: a second pass finds nothing left to drop.
    #[test]
    fn collinear_cleanup_is_idempotent(wps in arb_waypoints()) {
        let once = remove_collinear_points(&wps);
        let twice = remove_collinear_points(&once);
        prop_assert_eq!(once, twice);
    }

    // An orthogonal polyline stays orthogonal after collinear cleanup and
    // dedupe: neither pass introduces a diagonal segment.
    #[test]
    fn cleanup_preserves_orthogonality(xs in prop::collection::vec(-1000.0..1000.0f64, 1..8)) {
        // Build a strictly orthogonal staircase: alternate horizontal/vertical
        // hops so every consecutive pair shares an axis.
        let mut wps = Vec::new();
        let mut cur = Point::new(0.0, 0.0);
        wps.push(cur);
        for (i, dx) in xs.iter().enumerate() {
            cur = if i % 2 == 0 {
                Point::new(cur.x + dx, cur.y)
            } else {
                Point::new(cur.x, cur.y + dx)
            };
            wps.push(cur);
        }
        prop_assume!(is_orthogonal(&wps, 1e-9));
        let deduped = deduplicate_waypoints(&wps, tolerance::DEDUPE_EPS);
        let cleaned = remove_collinear_points(&deduped);
        prop_assert!(is_orthogonal(&cleaned, tolerance::COLLINEAR_EPS));
    }
}
