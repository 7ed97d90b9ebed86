//! Region extraction: connected components of the palette index map.
//!
//! Labeling is run-based: every row is scanned (in parallel) into
//! maximal horizontal runs of one palette index, vertically overlapping
//! runs of the same index are merged serially through a union-find, and
//! a final parallel pass writes per-pixel component labels. Component
//! ids are assigned in raster order of first appearance, so the result
//! is independent of the worker count.
//!
//! After labeling, components smaller than the minimum region size are
//! dissolved: their pixels are reassigned, in deterministic raster
//! passes, to the adjacent surviving component with the largest pixel
//! count. This keeps the canvas fully partitioned — every pixel belongs
//! to exactly one surviving component. A configurable component budget
//! bounds pathological inputs (e.g. a full-resolution checkerboard) by
//! keeping only the largest components — effectively raising the
//! minimum region size — and recording a
//! [`Warning::RegionBudgetExceeded`].

use rayon::prelude::*;

use crate::cancel::{CancelToken, POLL_STRIDE};
use crate::types::{CoreError, IndexMap, Warning};

/// Options consumed by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOptions {
    /// Components below this pixel count are dissolved into a neighbor.
    pub min_region_pixels: usize,
    /// Upper bound on surviving components.
    pub max_regions: usize,
}

/// A maximal 4-connected component of one palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Palette index shared by every pixel of the component.
    pub palette_index: u8,
    /// Number of pixels in the component.
    pub pixel_count: usize,
    /// Inclusive bounding box.
    pub min_x: u32,
    /// Inclusive bounding box.
    pub min_y: u32,
    /// Inclusive bounding box.
    pub max_x: u32,
    /// Inclusive bounding box.
    pub max_y: u32,
}

/// Labeled partition of the canvas into surviving components.
#[derive(Debug, Clone)]
pub struct ComponentMap {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Per-pixel component id (row-major, indices into `components`).
    pub labels: Vec<u32>,
    /// Component descriptors, id-ordered.
    pub components: Vec<Component>,
}

/// One maximal horizontal run of a single palette index.
#[derive(Debug, Clone, Copy)]
struct Run {
    /// First column of the run.
    x_start: u32,
    /// One past the last column.
    x_end: u32,
    /// Palette index of every pixel in the run.
    palette_index: u8,
}

/// Union-find over run indices with path halving.
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self {
            parent: (0..len as u32).collect(),
        }
    }

    fn find(&mut self, mut i: u32) -> u32 {
        while self.parent[i as usize] != i {
            let grandparent = self.parent[self.parent[i as usize] as usize];
            self.parent[i as usize] = grandparent;
            i = grandparent;
        }
        i
    }

    /// Union toward the smaller root so canonical ids follow raster
    /// order.
    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi as usize] = lo;
    }
}

/// Partition the index map into surviving components.
///
/// # Errors
///
/// Returns [`CoreError::Cancelled`] if the token fires mid-run, and
/// [`CoreError::Internal`] if the labeling invariants are violated.
pub fn extract_components(
    index_map: &IndexMap,
    options: &RegionOptions,
    cancel: &CancelToken,
) -> Result<(ComponentMap, Vec<Warning>), CoreError> {
    let width = index_map.width();
    let height = index_map.height();
    let w = width as usize;
    let h = height as usize;

    // First pass: per-row run extraction, parallel over rows.
    let indices = index_map.as_raw();
    let runs_per_row: Vec<Vec<Run>> = (0..h)
        .into_par_iter()
        .map(|y| {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            let row = &indices[y * w..(y + 1) * w];
            let mut runs = Vec::new();
            let mut start = 0usize;
            for x in 1..=w {
                if x == w || row[x] != row[start] {
                    #[allow(clippy::cast_possible_truncation)]
                    runs.push(Run {
                        x_start: start as u32,
                        x_end: x as u32,
                        palette_index: row[start],
                    });
                    start = x;
                }
            }
            runs
        })
        .collect();
    cancel.check()?;

    // Flatten with per-row offsets so a run's global index is stable.
    let mut row_offsets = Vec::with_capacity(h + 1);
    let mut total_runs = 0usize;
    for runs in &runs_per_row {
        row_offsets.push(total_runs);
        total_runs += runs.len();
    }
    row_offsets.push(total_runs);

    // Serial merge: vertically overlapping same-index runs are one
    // component (4-connectivity).
    let mut uf = UnionFind::new(total_runs);
    for y in 1..h {
        cancel.check()?;
        let above = &runs_per_row[y - 1];
        let below = &runs_per_row[y];
        let mut ai = 0usize;
        for (bi, b) in below.iter().enumerate() {
            while ai < above.len() && above[ai].x_end <= b.x_start {
                ai += 1;
            }
            let mut aj = ai;
            while aj < above.len() && above[aj].x_start < b.x_end {
                if above[aj].palette_index == b.palette_index {
                    #[allow(clippy::cast_possible_truncation)]
                    uf.union(
                        (row_offsets[y - 1] + aj) as u32,
                        (row_offsets[y] + bi) as u32,
                    );
                }
                aj += 1;
            }
        }
    }

    // Canonical component ids in raster order of first appearance.
    let mut component_of_root: std::collections::HashMap<u32, u32> =
        std::collections::HashMap::new();
    let mut run_component = vec![0u32; total_runs];
    let mut components: Vec<Component> = Vec::new();
    let mut run_index = 0usize;
    for (y, runs) in runs_per_row.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let y = y as u32;
        for run in runs {
            #[allow(clippy::cast_possible_truncation)]
            let root = uf.find(run_index as u32);
            #[allow(clippy::cast_possible_truncation)]
            let next_id = components.len() as u32;
            let id = *component_of_root.entry(root).or_insert(next_id);
            if id == next_id {
                components.push(Component {
                    palette_index: run.palette_index,
                    pixel_count: 0,
                    min_x: run.x_start,
                    min_y: y,
                    max_x: run.x_end - 1,
                    max_y: y,
                });
            }
            run_component[run_index] = id;
            let comp = &mut components[id as usize];
            comp.pixel_count += (run.x_end - run.x_start) as usize;
            comp.min_x = comp.min_x.min(run.x_start);
            comp.max_x = comp.max_x.max(run.x_end - 1);
            comp.max_y = comp.max_y.max(y);
            run_index += 1;
        }
    }
    cancel.check()?;

    // Second pass: per-pixel labels, parallel over rows.
    let mut labels = vec![0u32; w * h];
    labels
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, label_row)| {
            let offset = row_offsets[y];
            for (i, run) in runs_per_row[y].iter().enumerate() {
                let id = run_component[offset + i];
                for cell in &mut label_row[run.x_start as usize..run.x_end as usize] {
                    *cell = id;
                }
            }
        });
    cancel.check()?;

    if components.is_empty() {
        return Err(CoreError::Internal {
            code: "regions-empty-labeling",
            message: "labeling produced no components".to_owned(),
        });
    }

    // Dissolve small components, tightening the minimum size until the
    // component budget holds.
    let mut warnings = Vec::new();
    let min_pixels = options.min_region_pixels.max(1);
    let mut survives: Vec<bool> = components
        .iter()
        .map(|c| c.pixel_count >= min_pixels)
        .collect();
    let survivor_count = survives.iter().filter(|&&s| s).count();

    if survivor_count == 0 || survivor_count > options.max_regions {
        // Keep the N largest components (ties to the lower id): when
        // nothing meets the minimum that is the single largest, when
        // the budget overflows it is the budget itself. The effective
        // minimum becomes the smallest surviving size.
        let keep = if survivor_count == 0 {
            1
        } else {
            options.max_regions
        };
        let mut order: Vec<usize> = (0..components.len()).collect();
        order.sort_by(|&a, &b| {
            components[b]
                .pixel_count
                .cmp(&components[a].pixel_count)
                .then_with(|| a.cmp(&b))
        });
        survives = vec![false; components.len()];
        for &id in order.iter().take(keep) {
            survives[id] = true;
        }
        if survivor_count > options.max_regions {
            warnings.push(Warning::RegionBudgetExceeded {
                regions: survivor_count,
                raised_min_region_pixels: components[order[keep - 1]].pixel_count,
            });
        }
    }

    reassign_orphans(&mut labels, w, h, &components, &survives, cancel)?;

    // Compact surviving components to dense ids and recount.
    let mut new_id = vec![u32::MAX; components.len()];
    let mut compacted: Vec<Component> = Vec::new();
    for (old_id, component) in components.iter().enumerate() {
        if survives[old_id] {
            #[allow(clippy::cast_possible_truncation)]
            {
                new_id[old_id] = compacted.len() as u32;
            }
            compacted.push(Component {
                pixel_count: 0,
                min_x: u32::MAX,
                min_y: u32::MAX,
                max_x: 0,
                max_y: 0,
                ..*component
            });
        }
    }
    for (i, label) in labels.iter_mut().enumerate() {
        if i % POLL_STRIDE == 0 {
            cancel.check()?;
        }
        let id = new_id[*label as usize];
        if id == u32::MAX {
            return Err(CoreError::Internal {
                code: "regions-unassigned-orphan",
                message: "orphan pixel survived reassignment".to_owned(),
            });
        }
        *label = id;
        let component = &mut compacted[id as usize];
        #[allow(clippy::cast_possible_truncation)]
        let (x, y) = ((i % w) as u32, (i / w) as u32);
        component.pixel_count += 1;
        component.min_x = component.min_x.min(x);
        component.min_y = component.min_y.min(y);
        component.max_x = component.max_x.max(x);
        component.max_y = component.max_y.max(y);
    }

    Ok((
        ComponentMap {
            width,
            height,
            labels,
            components: compacted,
        },
        warnings,
    ))
}

/// Reassign every pixel of a dissolved component to an adjacent
/// survivor.
///
/// Runs deterministic raster passes: a pixel adopts the 4-neighbor
/// component with the largest original pixel count (ties to the lower
/// id), and in-pass assignments seed later pixels of the same pass, so
/// the wavefront advances at least one ring per pass and the loop
/// terminates whenever at least one survivor exists.
fn reassign_orphans(
    labels: &mut [u32],
    w: usize,
    h: usize,
    components: &[Component],
    survives: &[bool],
    cancel: &CancelToken,
) -> Result<(), CoreError> {
    let any_orphan = labels.iter().any(|&l| !survives[l as usize]);
    if !any_orphan {
        return Ok(());
    }

    loop {
        cancel.check()?;
        let mut changed = false;
        let mut remaining = false;

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                if survives[labels[i] as usize] {
                    continue;
                }

                let mut best: Option<u32> = None;
                let mut consider = |candidate: u32| {
                    if !survives[candidate as usize] {
                        return;
                    }
                    best = Some(match best {
                        None => candidate,
                        Some(current) => {
                            let c_count = components[candidate as usize].pixel_count;
                            let b_count = components[current as usize].pixel_count;
                            if c_count > b_count || (c_count == b_count && candidate < current) {
                                candidate
                            } else {
                                current
                            }
                        }
                    });
                };
                if x > 0 {
                    consider(labels[i - 1]);
                }
                if y > 0 {
                    consider(labels[i - w]);
                }
                if x + 1 < w {
                    consider(labels[i + 1]);
                }
                if y + 1 < h {
                    consider(labels[i + w]);
                }

                if let Some(adopted) = best {
                    labels[i] = adopted;
                    changed = true;
                } else {
                    remaining = true;
                }
            }
        }

        if !remaining {
            return Ok(());
        }
        if !changed {
            return Err(CoreError::Internal {
                code: "regions-orphan-stuck",
                message: "orphan reassignment made no progress".to_owned(),
            });
        }
    }
}
