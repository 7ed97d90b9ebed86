//! Curve fitting: simplified rings into line/quadratic-Bézier paths.
//!
//! Ring points are classified as corners or smooth by their turning
//! angle. Contiguous smooth runs become chains of quadratic Béziers
//! using the midpoint construction: each curve starts and ends at
//! segment midpoints with the ring point as control. The construction
//! is G¹-continuous across consecutive curves, stays inside the
//! polyline's convex hull, and needs no least-squares solve. Corners
//! are rendered as straight joins.

use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::simplify::{must_keep_from_edges, simplify_ring};
use crate::types::{
    CoreError, GrayImage, PathCommand, Point, Region, RegionPath, Ring, VectorPath,
};

/// Options consumed by the simplify-and-fit stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Douglas-Peucker tolerance in pixels.
    pub tolerance: f64,
    /// Turning angle in degrees at or above which a point is a corner.
    pub corner_angle_threshold: f64,
}

/// Simplify and fit every region into a serializable path.
///
/// Regions whose outer ring degenerates below 3 points are discarded;
/// degenerate holes are dropped individually. Output order matches
/// input order regardless of the worker count.
///
/// # Errors
///
/// Returns [`CoreError::Cancelled`] if the token fires mid-run.
pub fn fit_regions(
    regions: &[Region],
    edge_mask: Option<&GrayImage>,
    options: &FitOptions,
    cancel: &CancelToken,
) -> Result<Vec<RegionPath>, CoreError> {
    let fitted: Vec<Option<RegionPath>> = regions
        .par_iter()
        .map(|region| {
            if cancel.is_cancelled() {
                return None;
            }
            fit_region(region, edge_mask, options)
        })
        .collect();
    cancel.check()?;
    Ok(fitted.into_iter().flatten().collect())
}

/// Simplify and fit one region; `None` when the outer ring degenerates.
#[must_use]
pub fn fit_region(
    region: &Region,
    edge_mask: Option<&GrayImage>,
    options: &FitOptions,
) -> Option<RegionPath> {
    let outer = simplify_with_hints(&region.outer, edge_mask, options.tolerance);
    if outer.len() < 3 {
        return None;
    }

    let mut commands = fit_ring(&outer, options.corner_angle_threshold);
    for hole in &region.holes {
        let hole = simplify_with_hints(hole, edge_mask, options.tolerance);
        if hole.len() < 3 {
            continue;
        }
        commands.extend(fit_ring(&hole, options.corner_angle_threshold));
    }

    Some(RegionPath {
        palette_index: region.palette_index,
        pixel_count: region.pixel_count,
        path: VectorPath::new(commands),
    })
}

/// Simplify a ring, pinning turning points that sit on strong edges.
fn simplify_with_hints(ring: &Ring, edge_mask: Option<&GrayImage>, tolerance: f64) -> Ring {
    match edge_mask {
        Some(edges) => {
            let keep = must_keep_from_edges(ring, edges);
            simplify_ring(ring, tolerance, Some(&keep))
        }
        None => simplify_ring(ring, tolerance, None),
    }
}

/// Fit one closed ring into a command subpath (`MoveTo .. Close`).
///
/// Rings of up to 4 points are emitted as plain polygons; curve fitting
/// on a unit square would only round away its area.
fn fit_ring(ring: &Ring, corner_angle_threshold: f64) -> Vec<PathCommand> {
    let points = ring.points();
    let n = points.len();
    debug_assert!(n >= 3);

    if n <= 4 {
        return polygon_commands(points);
    }

    let corner = classify_corners(points, corner_angle_threshold);
    let Some(first_corner) = corner.iter().position(|&c| c) else {
        // Fully smooth ring: curves all the way around, anchored at the
        // midpoint of the closing segment.
        let mut commands = Vec::with_capacity(n + 2);
        commands.push(PathCommand::MoveTo(points[n - 1].midpoint(points[0])));
        for i in 0..n {
            commands.push(PathCommand::QuadTo(
                points[i],
                points[i].midpoint(points[(i + 1) % n]),
            ));
        }
        commands.push(PathCommand::Close);
        return commands;
    };

    // Start at a corner so the closing segment is a straight join.
    let mut commands = Vec::with_capacity(n + 2);
    commands.push(PathCommand::MoveTo(points[first_corner]));
    for j in 1..n {
        let i = (first_corner + j) % n;
        if corner[i] {
            commands.push(PathCommand::LineTo(points[i]));
        } else {
            let next = points[(i + 1) % n];
            commands.push(PathCommand::QuadTo(points[i], points[i].midpoint(next)));
        }
    }
    commands.push(PathCommand::Close);
    commands
}

/// Plain polygon emission for degenerate-small rings.
fn polygon_commands(points: &[Point]) -> Vec<PathCommand> {
    let mut commands = Vec::with_capacity(points.len() + 1);
    commands.push(PathCommand::MoveTo(points[0]));
    for &p in &points[1..] {
        commands.push(PathCommand::LineTo(p));
    }
    commands.push(PathCommand::Close);
    commands
}

/// Classify each ring point by its turning angle.
///
/// The turning angle is the absolute angle between the incoming and
/// outgoing segment directions; a straight continuation turns by 0.
fn classify_corners(points: &[Point], corner_angle_threshold: f64) -> Vec<bool> {
    let n = points.len();
    let threshold = corner_angle_threshold.to_radians();
    (0..n)
        .map(|i| {
            let prev = points[(i + n - 1) % n];
            let here = points[i];
            let next = points[(i + 1) % n];
            let (ax, ay) = (here.x - prev.x, here.y - prev.y);
            let (bx, by) = (next.x - here.x, next.y - here.y);
            let cross = ax.mul_add(by, -(ay * bx));
            let dot = ax.mul_add(bx, ay * by);
            cross.atan2(dot).abs() >= threshold
        })
        .collect()
}
