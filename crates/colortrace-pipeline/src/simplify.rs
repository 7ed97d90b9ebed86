//! Ring simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Reduces point count in boundary rings by removing points within a
//! given tolerance of the line between their neighbors. Implemented
//! from scratch (~40 lines) to avoid pulling in the `geo` crate
//! dependency tree for one recursion.
//!
//! Rings are closed with the first point doubling as the terminator:
//! the recursion runs on the ring plus a copy of its first point, whose
//! degenerate end chord falls back to point-to-anchor distance and so
//! acts as a radial split of the loop. Points flagged *must-keep*
//! (boundary corners sitting on strong image edges) are never removed.

use crate::types::{GrayImage, Point, Ring};

/// Simplify a closed ring.
///
/// Points within `tolerance` pixels of the chord between their
/// retained neighbors are removed; the first point is always retained.
/// `must_keep`, when given, must be ring-length and marks points that
/// survive regardless of distance. A tolerance of 0.0 preserves all
/// points. Rings of up to 4 points (a single pixel's boundary) are
/// already minimal and are returned unchanged, whatever the tolerance.
#[must_use = "returns the simplified ring"]
pub fn simplify_ring(ring: &Ring, tolerance: f64, must_keep: Option<&[bool]>) -> Ring {
    let points = ring.points();
    let n = points.len();
    if n <= 4 {
        return ring.clone();
    }
    debug_assert!(must_keep.is_none_or(|m| m.len() == n));

    // Close the loop: index n aliases index 0.
    let mut closed: Vec<Point> = Vec::with_capacity(n + 1);
    closed.extend_from_slice(points);
    closed.push(points[0]);

    let mut kept = vec![false; n + 1];
    kept[0] = true;
    kept[n] = true;
    if let Some(flags) = must_keep {
        for (k, &flag) in kept.iter_mut().zip(flags) {
            *k |= flag;
        }
    }

    rdp_recurse(&closed, 0, n, tolerance, &mut kept);

    let simplified: Vec<Point> = closed[..n]
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    Ring::new(simplified)
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` farthest from their
/// chord. If that distance exceeds `tolerance`, the point is kept and
/// both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line defined by `a` and
/// `b`.
///
/// Uses the formula `|cross(b-a, p-a)| / |b-a|`. When `a` and `b`
/// coincide (the closed ring's end chord), returns the distance from
/// `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

/// Must-keep flags for a traced ring against an edge mask.
///
/// A ring point is flagged when it is a turning point of the pixel-edge
/// walk (its incoming and outgoing unit segments differ in direction)
/// *and* one of the up to four pixels meeting at that corner is an edge
/// pixel. Straight runs along strong edges still collapse; the corners
/// that define them survive simplification.
#[must_use]
pub fn must_keep_from_edges(ring: &Ring, edges: &GrayImage) -> Vec<bool> {
    let points = ring.points();
    let n = points.len();
    let mut flags = vec![false; n];
    if n < 3 {
        return flags;
    }

    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let here = points[i];
        let next = points[(i + 1) % n];
        let incoming = (here.x - prev.x, here.y - prev.y);
        let outgoing = (next.x - here.x, next.y - here.y);
        if incoming == outgoing {
            continue;
        }
        flags[i] = corner_touches_edge(here, edges);
    }
    flags
}

/// Whether any pixel meeting at corner `p` is marked in the edge mask.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn corner_touches_edge(p: Point, edges: &GrayImage) -> bool {
    let cx = p.x as i64;
    let cy = p.y as i64;
    for (px, py) in [(cx - 1, cy - 1), (cx, cy - 1), (cx - 1, cy), (cx, cy)] {
        if px < 0 || py < 0 || px >= i64::from(edges.width()) || py >= i64::from(edges.height()) {
            continue;
        }
        if edges.get_pixel(px as u32, py as u32).0[0] != 0 {
            return true;
        }
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square_with_collinear_points() -> Ring {
        // A 4x4 square traced with unit steps: 16 points, 4 corners.
        let mut points = Vec::new();
        for i in 0..4 {
            points.push(Point::new(0.0, f64::from(i)));
        }
        for i in 0..4 {
            points.push(Point::new(f64::from(i), 4.0));
        }
        for i in 0..4 {
            points.push(Point::new(4.0, 4.0 - f64::from(i)));
        }
        for i in 0..4 {
            points.push(Point::new(4.0 - f64::from(i), 0.0));
        }
        Ring::new(points)
    }

    #[test]
    fn tiny_rings_are_unchanged() {
        let ring = Ring::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert_eq!(simplify_ring(&ring, 1.0, None), ring);
    }

    #[test]
    fn collinear_ring_points_collapse_to_corners() {
        let ring = square_with_collinear_points();
        let simplified = simplify_ring(&ring, 0.5, None);
        assert_eq!(simplified.len(), 4);
        let pts = simplified.points();
        assert!(pts.contains(&Point::new(0.0, 0.0)));
        assert!(pts.contains(&Point::new(0.0, 4.0)));
        assert!(pts.contains(&Point::new(4.0, 4.0)));
        assert!(pts.contains(&Point::new(4.0, 0.0)));
    }

    #[test]
    fn zero_tolerance_preserves_all_points() {
        let ring = square_with_collinear_points();
        let simplified = simplify_ring(&ring, 0.0, None);
        assert_eq!(simplified.len(), ring.len());
    }

    #[test]
    fn area_is_preserved_for_convex_shapes() {
        let ring = square_with_collinear_points();
        let simplified = simplify_ring(&ring, 0.5, None);
        assert!(
            (simplified.signed_area() - ring.signed_area()).abs() < f64::EPSILON,
            "corner-only simplification must not change the enclosed area",
        );
    }

    #[test]
    fn simplification_is_idempotent() {
        let ring = Ring::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.2),
            Point::new(2.0, 0.0),
            Point::new(4.0, 3.0),
            Point::new(2.0, 6.0),
            Point::new(0.0, 6.1),
            Point::new(-2.0, 3.0),
        ]);
        for tolerance in [0.5, 1.0, 2.0] {
            let once = simplify_ring(&ring, tolerance, None);
            let twice = simplify_ring(&once, tolerance, None);
            assert_eq!(once, twice, "tolerance {tolerance}");
        }
    }

    #[test]
    fn first_point_is_always_retained() {
        let ring = square_with_collinear_points();
        let simplified = simplify_ring(&ring, 10.0, None);
        assert_eq!(simplified.points()[0], ring.points()[0]);
    }

    #[test]
    fn must_keep_points_survive_any_tolerance() {
        let ring = square_with_collinear_points();
        let mut keep = vec![false; ring.len()];
        keep[2] = true; // a collinear point on the left side
        let simplified = simplify_ring(&ring, 100.0, Some(&keep));
        assert!(
            simplified.points().contains(&Point::new(0.0, 2.0)),
            "must-keep point was dropped: {:?}",
            simplified.points(),
        );
    }

    #[test]
    fn large_tolerance_still_keeps_a_radial_anchor() {
        // The end chord of the closed loop is degenerate; its fallback
        // keeps the point farthest from the ring's first point, so even
        // aggressive tolerances leave a usable polygon skeleton.
        let ring = square_with_collinear_points();
        let simplified = simplify_ring(&ring, 3.9, None);
        assert!(simplified.len() >= 2);
    }

    // --- must_keep_from_edges ---

    #[test]
    fn edge_adjacent_turning_points_are_flagged() {
        // Unit square around pixel (1, 1); mark that pixel as an edge.
        let ring = Ring::new(vec![
            Point::new(1.0, 1.0),
            Point::new(1.0, 2.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 1.0),
        ]);
        let mut edges = GrayImage::new(4, 4);
        edges.put_pixel(1, 1, image::Luma([255]));
        let flags = must_keep_from_edges(&ring, &edges);
        assert_eq!(flags, vec![true; 4]);
    }

    #[test]
    fn straight_run_points_are_not_flagged() {
        // A 1x2 pixel column: the midpoints of the long sides are not
        // turning points, so they stay unflagged even on an edge.
        let ring = Ring::new(vec![
            Point::new(1.0, 1.0),
            Point::new(1.0, 2.0),
            Point::new(1.0, 3.0),
            Point::new(2.0, 3.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 1.0),
        ]);
        let mut edges = GrayImage::new(4, 4);
        edges.put_pixel(1, 1, image::Luma([255]));
        edges.put_pixel(1, 2, image::Luma([255]));
        let flags = must_keep_from_edges(&ring, &edges);
        assert!(flags[0]);
        assert!(!flags[1], "mid-side point must not be flagged");
        assert!(!flags[4], "mid-side point must not be flagged");
    }

    #[test]
    fn no_edges_means_no_flags() {
        let ring = square_with_collinear_points();
        let edges = GrayImage::new(8, 8);
        let flags = must_keep_from_edges(&ring, &edges);
        assert!(flags.iter().all(|&f| !f));
    }
}
