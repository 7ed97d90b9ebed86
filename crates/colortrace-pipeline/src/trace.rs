//! Boundary tracing: closed pixel-edge rings around each component.
//!
//! Boundaries are walked on the dual (pixel-corner) grid rather than
//! through pixel centers: corner `(x, y)` is the geometric point
//! `(x, y)`, pixel `(x, y)` spans the unit square `[x, x+1] x [y, y+1]`,
//! and a traced ring is a closed sequence of axis-aligned unit segments
//! exactly bounding the component. Each component is traced
//! independently (in parallel) on a bitmap of its bounding box; XOR
//! fill handles nesting, so interior background pockets fall out
//! naturally as hole rings, with islands of other components inside a
//! pocket absorbed into that pocket's single ring.
//!
//! Orientation is normalized after tracing: outer rings are
//! counter-clockwise on screen (negative shoelace area in y-down image
//! coordinates), holes clockwise, so the non-zero winding rule punches
//! holes when both are emitted into one path.

use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::regions::{Component, ComponentMap};
use crate::types::{CoreError, Point, Region, Ring};

/// Trace every component of the map into a [`Region`].
///
/// Regions come back in component-id order (raster order of first
/// appearance), independent of the worker count.
///
/// # Errors
///
/// Returns [`CoreError::Cancelled`] if the token fires mid-run, and
/// [`CoreError::Internal`] if a component produces no closed outer
/// ring (a labeling or tracing bug, not an input condition).
pub fn trace_regions(map: &ComponentMap, cancel: &CancelToken) -> Result<Vec<Region>, CoreError> {
    map.components
        .par_iter()
        .enumerate()
        .map(|(id, component)| {
            cancel.check()?;
            #[allow(clippy::cast_possible_truncation)]
            trace_component(map, id as u32, component)
        })
        .collect()
}

/// Working bitmap over one component's bounding box.
///
/// Out-of-bounds reads return `false`, which is what lets the tracer
/// walk the outermost edge without special cases.
struct Bitmap {
    data: Vec<bool>,
    width: i32,
    height: i32,
}

impl Bitmap {
    fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return false;
        }
        self.data[(y * self.width + x) as usize]
    }

    /// XOR all cells in row `y` from column `x` to the right edge.
    fn xor_row_from(&mut self, x: i32, y: i32) {
        if y < 0 || y >= self.height {
            return;
        }
        for xi in x.max(0)..self.width {
            let idx = (y * self.width + xi) as usize;
            self.data[idx] ^= true;
        }
    }
}

/// Trace one component into its outer ring and hole rings.
#[allow(clippy::cast_possible_wrap)]
fn trace_component(
    map: &ComponentMap,
    id: u32,
    component: &Component,
) -> Result<Region, CoreError> {
    let bw = (component.max_x - component.min_x + 1) as i32;
    let bh = (component.max_y - component.min_y + 1) as i32;
    let map_w = map.width as usize;

    let mut data = vec![false; (bw * bh) as usize];
    for by in 0..bh {
        let src_y = (component.min_y + by as u32) as usize;
        for bx in 0..bw {
            let src_x = (component.min_x + bx as u32) as usize;
            data[(by * bw + bx) as usize] = map.labels[src_y * map_w + src_x] == id;
        }
    }
    let mut bitmap = Bitmap {
        data,
        width: bw,
        height: bh,
    };
    // The working copy is progressively XOR-filled as rings are
    // consumed, which turns hole pockets into "foreground" for the
    // scan; the untouched copy tells outer starts from hole starts.
    let original = bitmap.data.clone();

    let mut outer: Option<Ring> = None;
    let mut holes: Vec<Ring> = Vec::new();

    for y in 0..bh {
        for x in 0..bw {
            if !bitmap.get(x, y) {
                continue;
            }
            // Original-set start cells open the outer ring; cells that
            // became set through XOR fill are hole pockets.
            let is_outer = original[(y * bw + x) as usize];

            let path = walk_ring(&bitmap, x, y)?;
            xor_fill(&mut bitmap, &path);

            let mut ring = to_image_ring(&path, component.min_x, component.min_y);
            // The left-hand walk yields counter-clockwise rings; holes
            // must wind the other way.
            if is_outer {
                if outer.is_some() {
                    return Err(CoreError::Internal {
                        code: "trace-multiple-outers",
                        message: format!("component {id} traced more than one outer ring"),
                    });
                }
                outer = Some(ring);
            } else {
                ring.reverse();
                holes.push(ring);
            }
        }
    }

    let outer = outer.ok_or_else(|| CoreError::Internal {
        code: "trace-missing-outer",
        message: format!("component {id} produced no outer ring"),
    })?;

    Ok(Region {
        palette_index: component.palette_index,
        pixel_count: component.pixel_count,
        outer,
        holes,
    })
}

/// Walk one closed ring on the corner grid starting at the top-left
/// corner of cell `(x0, y0)`, keeping foreground on the left of the
/// travel direction.
///
/// The start cell must be the topmost-leftmost set cell of its blob, so
/// the initial southward step runs along its left edge. At every corner
/// the two cells flanking the straight-ahead edge decide the move:
///
/// | left | right | action |
/// |------|-------|--------|
/// | set  | clear | straight |
/// | set  | set   | turn right (concave corner) |
/// | clear| clear | turn left (convex corner) |
/// | clear| set   | turn left (diagonal touch stays disconnected) |
///
/// The diagonal rule mirrors the 4-connectivity of the labeling:
/// diagonally touching cells belong to separate rings.
fn walk_ring(bitmap: &Bitmap, x0: i32, y0: i32) -> Result<Vec<(i32, i32)>, CoreError> {
    let mut points = Vec::new();
    let mut x = x0;
    let mut y = y0;
    // Southward along the start cell's left edge.
    let mut dx: i32 = 0;
    let mut dy: i32 = 1;

    // A ring visits each corner at most twice.
    let step_budget = ((bitmap.width as usize + 1) * (bitmap.height as usize + 1) + 1) * 2;

    loop {
        points.push((x, y));
        if points.len() > step_budget {
            return Err(CoreError::Internal {
                code: "trace-diverged",
                message: "ring walk exceeded its step budget".to_owned(),
            });
        }

        // Cells flanking the straight-ahead edge, (left, right) of the
        // travel direction.
        let ((lx, ly), (rx, ry)) = match (dx, dy) {
            (1, 0) => ((x, y - 1), (x, y)),
            (0, 1) => ((x, y), (x - 1, y)),
            (-1, 0) => ((x - 1, y), (x - 1, y - 1)),
            (0, -1) => ((x - 1, y - 1), (x, y - 1)),
            _ => {
                return Err(CoreError::Internal {
                    code: "trace-bad-direction",
                    message: format!("non-cardinal direction ({dx}, {dy})"),
                });
            }
        };
        let left = bitmap.get(lx, ly);
        let right = bitmap.get(rx, ry);

        if left && right {
            // Concave corner: turn right.
            let tmp = dx;
            dx = -dy;
            dy = tmp;
        } else if !left {
            // Convex corner or diagonal crossing: turn left.
            let tmp = dx;
            dx = dy;
            dy = -tmp;
        }

        x += dx;
        y += dy;

        if x == x0 && y == y0 {
            break;
        }
    }

    Ok(points)
}

/// XOR-fill the interior of a ring.
///
/// Each vertical unit step at corner column `x` between corner rows `y`
/// and `y + 1` toggles cell row `y` from column `x` rightward; toggle
/// pairs cancel outside the ring, leaving exactly the interior flipped.
fn xor_fill(bitmap: &mut Bitmap, points: &[(i32, i32)]) {
    let n = points.len();
    if n == 0 {
        return;
    }
    let mut y_prev = points[n - 1].1;
    for &(x, y) in points {
        if y != y_prev {
            bitmap.xor_row_from(x, y.min(y_prev));
        }
        y_prev = y;
    }
}

/// Convert local corner coordinates into an image-space ring.
fn to_image_ring(points: &[(i32, i32)], offset_x: u32, offset_y: u32) -> Ring {
    Ring::new(
        points
            .iter()
            .map(|&(x, y)| {
                Point::new(
                    f64::from(offset_x) + f64::from(x),
                    f64::from(offset_y) + f64::from(y),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::regions::{RegionOptions, extract_components};
    use crate::types::IndexMap;

    fn trace_map(width: u32, height: u32, data: &[u8]) -> Vec<Region> {
        let map = IndexMap::from_raw(width, height, data.to_vec()).unwrap();
        let (components, _) = extract_components(
            &map,
            &RegionOptions {
                min_region_pixels: 1,
                max_regions: 100_000,
            },
            &CancelToken::new(),
        )
        .unwrap();
        trace_regions(&components, &CancelToken::new()).unwrap()
    }

    /// Area enclosed by a region's rings: |outer| minus the holes.
    fn enclosed_area(region: &Region) -> f64 {
        region.outer.signed_area().abs()
            - region
                .holes
                .iter()
                .map(|h| h.signed_area().abs())
                .sum::<f64>()
    }

    #[test]
    fn single_pixel_traces_to_unit_square() {
        #[rustfmt::skip]
        let data = [
            0, 0, 0,
            0, 1, 0,
            0, 0, 0,
        ];
        let regions = trace_map(3, 3, &data);
        let pixel = regions.iter().find(|r| r.palette_index == 1).unwrap();
        assert_eq!(pixel.outer.len(), 4);
        assert!(pixel.holes.is_empty());
        assert!((enclosed_area(pixel) - 1.0).abs() < f64::EPSILON);
        // The four corners of pixel (1, 1).
        let mut xs: Vec<f64> = pixel.outer.points().iter().map(|p| p.x).collect();
        let mut ys: Vec<f64> = pixel.outer.points().iter().map(|p| p.y).collect();
        xs.sort_by(f64::total_cmp);
        ys.sort_by(f64::total_cmp);
        assert_eq!(xs, vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(ys, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn full_canvas_traces_to_canvas_rectangle() {
        let regions = trace_map(4, 3, &[7; 12]);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        // Every unit corner along the perimeter is retained:
        // 2 * (4 + 3) = 14 points.
        assert_eq!(region.outer.len(), 14);
        assert!((enclosed_area(region) - 12.0).abs() < f64::EPSILON);
        assert_eq!(region.outer.bounding_box(), (0.0, 0.0, 4.0, 3.0));
    }

    #[test]
    fn outer_rings_are_counter_clockwise_on_screen() {
        let regions = trace_map(4, 4, &[0; 16]);
        assert!(
            regions[0].outer.signed_area() < 0.0,
            "outer ring must have negative shoelace area in y-down coordinates",
        );
    }

    #[test]
    fn donut_produces_one_hole_with_opposite_orientation() {
        // A ring of 1s around a single 0, inside a 0 background: the
        // 1-component is a donut whose pocket absorbs the center pixel.
        #[rustfmt::skip]
        let data = [
            0, 0, 0, 0, 0,
            0, 1, 1, 1, 0,
            0, 1, 0, 1, 0,
            0, 1, 1, 1, 0,
            0, 0, 0, 0, 0,
        ];
        let regions = trace_map(5, 5, &data);
        let donut = regions.iter().find(|r| r.palette_index == 1).unwrap();
        assert_eq!(donut.pixel_count, 8);
        assert_eq!(donut.holes.len(), 1);
        assert!(donut.outer.signed_area() < 0.0);
        assert!(donut.holes[0].signed_area() > 0.0);
        assert!((enclosed_area(donut) - 8.0).abs() < f64::EPSILON);
        // The hole is the unit square of the center pixel.
        assert_eq!(donut.holes[0].len(), 4);
        assert!((donut.holes[0].signed_area() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn enclosed_area_matches_pixel_count() {
        // An L-shape plus background: the traced geometry must account
        // for every pixel of each component.
        #[rustfmt::skip]
        let data = [
            1, 0, 0, 0,
            1, 0, 0, 0,
            1, 1, 1, 0,
            0, 0, 0, 0,
        ];
        let regions = trace_map(4, 4, &data);
        for region in &regions {
            assert!(
                (enclosed_area(region) - region.pixel_count as f64).abs() < f64::EPSILON,
                "component with index {} encloses {} but counts {}",
                region.palette_index,
                enclosed_area(region),
                region.pixel_count,
            );
        }
    }

    #[test]
    fn island_inside_hole_is_absorbed_by_the_pocket() {
        // Index 1 forms a donut around an index-2 island separated by
        // an index-0 moat. The donut gets exactly one hole ring (the
        // pocket boundary), not one per nesting level.
        #[rustfmt::skip]
        let data = [
            1, 1, 1, 1, 1,
            1, 0, 0, 0, 1,
            1, 0, 2, 0, 1,
            1, 0, 0, 0, 1,
            1, 1, 1, 1, 1,
        ];
        let regions = trace_map(5, 5, &data);
        let donut = regions.iter().find(|r| r.palette_index == 1).unwrap();
        assert_eq!(donut.holes.len(), 1);
        // The pocket spans the full 3x3 interior (moat plus island).
        assert!((donut.holes[0].signed_area() - 9.0).abs() < f64::EPSILON);
        // Moat and island are their own regions.
        assert!(regions.iter().any(|r| r.palette_index == 0));
        assert!(regions.iter().any(|r| r.palette_index == 2));
    }

    #[test]
    fn diagonal_pixels_trace_as_separate_regions() {
        // Diagonally touching pixels are 4-disconnected; each gets its
        // own unit-square ring rather than a shared figure-eight.
        #[rustfmt::skip]
        let data = [
            1, 0,
            0, 1,
        ];
        let regions = trace_map(2, 2, &data);
        let ones: Vec<_> = regions.iter().filter(|r| r.palette_index == 1).collect();
        assert_eq!(ones.len(), 2);
        for region in ones {
            assert_eq!(region.outer.len(), 4);
            assert!((enclosed_area(region) - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn no_ring_is_shorter_than_four_points() {
        let data: Vec<u8> = (0..36).map(|i| ((i % 6) + (i / 6)) as u8 % 2).collect();
        let regions = trace_map(6, 6, &data);
        for region in &regions {
            assert!(region.outer.len() >= 4);
            for hole in &region.holes {
                assert!(hole.len() >= 4);
            }
        }
    }

    #[test]
    fn rings_are_unit_steps() {
        // Every consecutive pair of ring points (including the closing
        // segment) is one axis-aligned unit apart.
        #[rustfmt::skip]
        let data = [
            1, 0, 0, 0,
            1, 0, 0, 0,
            1, 1, 1, 0,
            0, 0, 0, 0,
        ];
        let regions = trace_map(4, 4, &data);
        for region in &regions {
            let pts = region.outer.points();
            for i in 0..pts.len() {
                let a = pts[i];
                let b = pts[(i + 1) % pts.len()];
                let (dx, dy) = ((b.x - a.x).abs(), (b.y - a.y).abs());
                assert!(
                    (dx == 1.0 && dy == 0.0) || (dx == 0.0 && dy == 1.0),
                    "segment from {a:?} to {b:?} is not a unit step",
                );
            }
        }
    }

    #[test]
    fn cancelled_token_aborts() {
        let map = IndexMap::from_raw(4, 4, vec![0; 16]).unwrap();
        let (components, _) = extract_components(
            &map,
            &RegionOptions {
                min_region_pixels: 1,
                max_regions: 100,
            },
            &CancelToken::new(),
        )
        .unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = trace_regions(&components, &cancel);
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
