//! Perceptual color quantization: reduce an image to `K` representative
//! colors.
//!
//! This module defines the [`Quantizer`] trait for pluggable
//! quantization algorithms and the [`QuantizerKind`] enum for selecting
//! which algorithm to use at pipeline construction. The shipped
//! implementation is weighted k-means over the image's *unique* colors:
//! pixels are deduplicated first (a photograph has far fewer distinct
//! colors than pixels, and the sRGB -> Lab conversion is the expensive
//! part), then Lloyd iterations run over `(color, count)` pairs.
//!
//! Clustering happens in CIE L*a*b* by default; linear RGB (scaled to
//! 0-255 so the same convergence epsilon applies) is available as a
//! faster, less perceptual alternative.
//!
//! Determinism: centroid seeding is k-means++ driven by a seeded
//! generator over a fixed-stride subsample, parallel assignment uses
//! fixed-size chunks whose partial sums are merged in chunk order, and
//! distance ties always resolve to the lower-indexed centroid. Two runs
//! with the same image, options, and seed produce identical output.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::cancel::{CancelToken, POLL_STRIDE};
use crate::color;
use crate::types::{CoreError, IndexMap, Palette, PaletteEntry, RgbImage, VectorizeConfig};

/// Centroid movement (in Lab units, or 0-255 linear RGB units) below
/// which the iteration is considered converged.
const CONVERGENCE_EPSILON: f32 = 1e-3;

/// Unique-color chunk size for the parallel assignment step. Fixed so
/// the partial-sum merge order, and therefore the float result, does
/// not depend on the worker count.
const ASSIGN_CHUNK: usize = 4096;

/// Upper bound on the number of unique colors examined by k-means++
/// seeding. Larger images are subsampled at a fixed stride, which keeps
/// seeding deterministic and O(bounded) without a measurable quality
/// loss.
const SEED_SAMPLE_CAP: usize = 16_384;

/// Options consumed by the quantizer, extracted from the full pipeline
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizeOptions {
    /// Number of palette entries to produce, in `[2, 256]`.
    pub k: u16,
    /// Cluster in Lab (`true`) or linear RGB (`false`).
    pub use_lab: bool,
    /// Iteration cap when convergence is slow.
    pub max_iterations: u32,
    /// Seed for centroid initialization.
    pub seed: u64,
}

impl QuantizeOptions {
    /// Extract the quantizer-relevant fields from a pipeline config.
    #[must_use]
    pub fn from_config(config: &VectorizeConfig) -> Self {
        Self {
            k: config.k,
            use_lab: config.use_lab,
            max_iterations: config.max_iterations,
            seed: config.seed,
        }
    }
}

/// Trait for quantization strategies.
///
/// Input: a preprocessed RGB image. Output: a palette sorted by
/// perceived luminance ascending and a per-pixel index map into it.
pub trait Quantizer {
    /// Quantize the image to at most `options.k` colors.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token fires mid-run.
    fn quantize(
        &self,
        image: &RgbImage,
        options: &QuantizeOptions,
        cancel: &CancelToken,
    ) -> Result<(Palette, IndexMap), CoreError>;
}

/// Selects which quantization algorithm to use.
///
/// Ships with [`KMeans`](Self::KMeans) only; an accelerated
/// implementation can be added as a sibling variant without touching
/// call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantizerKind {
    /// Weighted k-means with k-means++ seeding.
    #[default]
    KMeans,
}

impl Quantizer for QuantizerKind {
    fn quantize(
        &self,
        image: &RgbImage,
        options: &QuantizeOptions,
        cancel: &CancelToken,
    ) -> Result<(Palette, IndexMap), CoreError> {
        match *self {
            Self::KMeans => kmeans_quantize(image, options, cancel),
        }
    }
}

/// One deduplicated color with its pixel multiplicity.
struct WeightedColor {
    /// Coordinates in the clustering space (Lab or scaled linear RGB).
    coords: [f32; 3],
    /// How many pixels carry this exact sRGB value.
    count: u32,
}

/// Deduplicated view of an image: unique colors plus a per-pixel index
/// into them.
struct UniqueColors {
    colors: Vec<WeightedColor>,
    /// For every pixel (row-major), the index of its unique color.
    pixel_to_unique: Vec<u32>,
}

/// SplitMix64: a tiny deterministic generator for centroid seeding.
///
/// Implemented from scratch (~10 lines) to avoid pulling in the `rand`
/// dependency tree for a single seeded stream.
struct SplitMix64(u64);

impl SplitMix64 {
    const fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform float in `[0, 1)` with 53 bits of precision.
    #[allow(clippy::cast_precision_loss)]
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Squared Euclidean distance between two clustering-space coordinates.
fn distance_squared(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d2.mul_add(d2, d0.mul_add(d0, d1 * d1))
}

/// Deduplicate the image's pixels into weighted unique colors,
/// converting each unique color into the clustering space exactly once.
fn dedup_colors(
    image: &RgbImage,
    use_lab: bool,
    cancel: &CancelToken,
) -> Result<UniqueColors, CoreError> {
    let pixel_total = (image.width() as usize) * (image.height() as usize);
    let mut colors: Vec<WeightedColor> = Vec::new();
    let mut pixel_to_unique: Vec<u32> = Vec::with_capacity(pixel_total);
    // Packed 0x00RRGGBB -> index into `colors`.
    let mut memo: HashMap<u32, u32> = HashMap::new();

    for (i, pixel) in image.pixels().enumerate() {
        if i % POLL_STRIDE == 0 {
            cancel.check()?;
        }
        let rgb = pixel.0;
        let key = (u32::from(rgb[0]) << 16) | (u32::from(rgb[1]) << 8) | u32::from(rgb[2]);
        let index = *memo.entry(key).or_insert_with(|| {
            let coords = if use_lab {
                color::srgb_to_lab(rgb)
            } else {
                color::srgb_to_linear255(rgb)
            };
            #[allow(clippy::cast_possible_truncation)]
            let index = colors.len() as u32;
            colors.push(WeightedColor { coords, count: 0 });
            index
        });
        colors[index as usize].count += 1;
        pixel_to_unique.push(index);
    }

    Ok(UniqueColors {
        colors,
        pixel_to_unique,
    })
}

/// k-means++ seeding over a fixed-stride subsample of the unique
/// colors.
///
/// The first centroid is drawn uniformly; each subsequent centroid is
/// drawn with probability proportional to `count * d²` where `d` is the
/// distance to the nearest already-chosen centroid. When the sample's
/// total weighted distance reaches zero (fewer distinct colors than
/// `k`), the remaining centroids repeat the first sample entry and end
/// up as empty clusters.
fn seed_centroids(colors: &[WeightedColor], k: usize, seed: u64) -> Vec<[f32; 3]> {
    let stride = colors.len().div_ceil(SEED_SAMPLE_CAP).max(1);
    let sample: Vec<&WeightedColor> = colors.iter().step_by(stride).collect();

    let mut rng = SplitMix64::new(seed);
    let mut centroids: Vec<[f32; 3]> = Vec::with_capacity(k);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let first = (rng.next_f64() * sample.len() as f64) as usize;
    centroids.push(sample[first.min(sample.len() - 1)].coords);

    // Squared distance from each sample entry to its nearest centroid.
    let mut min_dist: Vec<f32> = sample
        .iter()
        .map(|c| distance_squared(c.coords, centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = sample
            .iter()
            .zip(&min_dist)
            .map(|(c, &d)| f64::from(c.count) * f64::from(d))
            .sum();
        if total <= 0.0 {
            // Every sample entry coincides with a centroid already.
            centroids.push(sample[0].coords);
            continue;
        }

        let target = rng.next_f64() * total;
        let mut cumulative = 0.0;
        let mut chosen = sample.len() - 1;
        for (i, (c, &d)) in sample.iter().zip(&min_dist).enumerate() {
            cumulative += f64::from(c.count) * f64::from(d);
            if cumulative >= target {
                chosen = i;
                break;
            }
        }

        let new_centroid = sample[chosen].coords;
        centroids.push(new_centroid);
        for (d, c) in min_dist.iter_mut().zip(&sample) {
            *d = d.min(distance_squared(c.coords, new_centroid));
        }
    }

    centroids
}

/// Index of the nearest centroid, resolving ties to the lower index.
fn nearest_centroid(coords: [f32; 3], centroids: &[[f32; 3]]) -> u8 {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, &centroid) in centroids.iter().enumerate() {
        let d = distance_squared(coords, centroid);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        best as u8
    }
}

/// Per-chunk partial reduction of the assignment step.
struct AssignPartial {
    /// Component sums per centroid, weighted by pixel count.
    sums: Vec<[f64; 3]>,
    /// Assigned pixel weight per centroid.
    weights: Vec<u64>,
}

/// One parallel assignment pass: returns per-unique-color assignments
/// and the merged weighted sums for the update step.
///
/// Chunks are fixed-size and their partials are merged in chunk order,
/// so the floating-point result is independent of scheduling.
fn assign_pass(
    colors: &[WeightedColor],
    centroids: &[[f32; 3]],
    cancel: &CancelToken,
) -> Result<(Vec<u8>, AssignPartial), CoreError> {
    let k = centroids.len();

    let chunk_results: Vec<(Vec<u8>, AssignPartial)> = colors
        .par_chunks(ASSIGN_CHUNK)
        .map(|chunk| {
            let mut assignments = Vec::with_capacity(chunk.len());
            let mut partial = AssignPartial {
                sums: vec![[0.0; 3]; k],
                weights: vec![0; k],
            };
            if cancel.is_cancelled() {
                return (assignments, partial);
            }
            for c in chunk {
                let idx = nearest_centroid(c.coords, centroids);
                assignments.push(idx);
                let slot = usize::from(idx);
                let w = f64::from(c.count);
                partial.sums[slot][0] += f64::from(c.coords[0]) * w;
                partial.sums[slot][1] += f64::from(c.coords[1]) * w;
                partial.sums[slot][2] += f64::from(c.coords[2]) * w;
                partial.weights[slot] += u64::from(c.count);
            }
            (assignments, partial)
        })
        .collect();

    cancel.check()?;

    let mut assignments = Vec::with_capacity(colors.len());
    let mut merged = AssignPartial {
        sums: vec![[0.0; 3]; k],
        weights: vec![0; k],
    };
    for (chunk_assignments, partial) in chunk_results {
        assignments.extend(chunk_assignments);
        for slot in 0..k {
            merged.sums[slot][0] += partial.sums[slot][0];
            merged.sums[slot][1] += partial.sums[slot][1];
            merged.sums[slot][2] += partial.sums[slot][2];
            merged.weights[slot] += partial.weights[slot];
        }
    }

    Ok((assignments, merged))
}

/// Weighted k-means over deduplicated colors.
fn kmeans_quantize(
    image: &RgbImage,
    options: &QuantizeOptions,
    cancel: &CancelToken,
) -> Result<(Palette, IndexMap), CoreError> {
    let unique = dedup_colors(image, options.use_lab, cancel)?;
    let k = usize::from(options.k);

    let mut centroids = seed_centroids(&unique.colors, k, options.seed);

    for _ in 0..options.max_iterations {
        let (_, merged) = assign_pass(&unique.colors, &centroids, cancel)?;

        let mut movement: f32 = 0.0;
        for slot in 0..k {
            if merged.weights[slot] == 0 {
                // Empty cluster: retain the previous centroid.
                continue;
            }
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let updated = [
                (merged.sums[slot][0] / merged.weights[slot] as f64) as f32,
                (merged.sums[slot][1] / merged.weights[slot] as f64) as f32,
                (merged.sums[slot][2] / merged.weights[slot] as f64) as f32,
            ];
            movement = movement.max(distance_squared(centroids[slot], updated).sqrt());
            centroids[slot] = updated;
        }

        if movement < CONVERGENCE_EPSILON {
            break;
        }
    }

    // Assignments must reflect the final centroid positions.
    let (assignments, _) = assign_pass(&unique.colors, &centroids, cancel)?;

    // Build palette entries and sort by perceived luminance (Lab L*)
    // ascending, tie-broken on the sRGB bytes for total determinism.
    let entries: Vec<PaletteEntry> = centroids
        .iter()
        .map(|&coords| {
            let rgb = if options.use_lab {
                color::lab_to_srgb(coords)
            } else {
                color::linear255_to_srgb(coords)
            };
            PaletteEntry {
                rgb,
                lab: color::srgb_to_lab(rgb),
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        entries[a]
            .lab[0]
            .partial_cmp(&entries[b].lab[0])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| entries[a].rgb.cmp(&entries[b].rgb))
    });
    let mut remap = vec![0u8; entries.len()];
    for (new_index, &old_index) in order.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        {
            remap[old_index] = new_index as u8;
        }
    }
    let sorted_entries: Vec<PaletteEntry> = order.iter().map(|&i| entries[i]).collect();

    cancel.check()?;

    // Expand unique-color assignments back to the per-pixel index map.
    let data: Vec<u8> = unique
        .pixel_to_unique
        .par_iter()
        .map(|&u| remap[usize::from(assignments[u as usize])])
        .collect();

    let index_map = IndexMap::from_raw(image.width(), image.height(), data).ok_or(
        CoreError::Internal {
            code: "quantize-indexmap-size",
            message: "index map length does not match image dimensions".to_owned(),
        },
    )?;

    Ok((Palette::new(sorted_entries), index_map))
}
