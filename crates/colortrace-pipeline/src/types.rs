//! Shared types for the colortrace vectorization pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;

/// Re-export `GrayImage` so downstream crates can reference edge masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference the
/// preprocessed pixel buffer without depending on `image` directly.
pub use image::RgbImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Midpoint between this point and another.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// A closed ring of points in image coordinates.
///
/// The first point is **not** repeated at the end; closure is implicit
/// (the segment from the last point back to the first is part of the
/// ring). Region boundaries produced by the tracer are rings of
/// integer-valued points walking pixel corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring(Vec<Point>);

impl Ring {
    /// Create a new ring from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the ring has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the ring.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the ring and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Shoelace signed area, including the implicit closing segment.
    ///
    /// In image coordinates (y grows downward) a ring that appears
    /// counter-clockwise on screen has **negative** signed area. Outer
    /// region boundaries use that orientation; holes the reverse.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        let pts = &self.0;
        if pts.len() < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            sum += a.x.mul_add(b.y, -(b.x * a.y));
        }
        sum / 2.0
    }

    /// Reverse the traversal direction in place, keeping the first
    /// point first so downstream anchors stay stable.
    pub fn reverse(&mut self) {
        if self.0.len() > 1 {
            self.0[1..].reverse();
        }
    }

    /// Axis-aligned bounding box as `(min_x, min_y, max_x, max_y)`.
    ///
    /// An empty ring returns inverted infinities (min > max).
    #[must_use]
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in &self.0 {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        (min_x, min_y, max_x, max_y)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One palette entry: an sRGB color and its L*a*b* counterpart.
///
/// Both representations are kept because downstream stages need both —
/// the serializer emits sRGB hex, while region merge decisions compare
/// perceptual distance in Lab.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    /// 8-bit sRGB components.
    pub rgb: [u8; 3],
    /// CIE L*a*b* components (D65): L in [0, 100], a/b roughly [-128, 128].
    pub lab: [f32; 3],
}

impl PaletteEntry {
    /// Lowercase CSS hex form, e.g. `#ff0000`.
    #[must_use]
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.rgb[0], self.rgb[1], self.rgb[2])
    }
}

/// An ordered set of representative colors.
///
/// Produced by the quantizer, sorted by perceived luminance (Lab L*)
/// ascending so output ordering is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette(Vec<PaletteEntry>);

impl Palette {
    /// Create a palette from entries. Ordering is preserved.
    #[must_use]
    pub const fn new(entries: Vec<PaletteEntry>) -> Self {
        Self(entries)
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the palette has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entry at `index`.
    #[must_use]
    pub fn entry(&self, index: u8) -> &PaletteEntry {
        &self.0[usize::from(index)]
    }

    /// All entries in palette order.
    #[must_use]
    pub fn entries(&self) -> &[PaletteEntry] {
        &self.0
    }
}

/// Per-pixel palette index with the same dimensions as the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl IndexMap {
    /// Create an index map from raw data.
    ///
    /// Returns `None` if `data.len() != width * height`.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Map width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Map height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Palette index at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        assert!(x < self.width && y < self.height);
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    /// Row-major raw indices.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// A maximal connected component of one palette index, with traced
/// boundaries.
///
/// The outer boundary is counter-clockwise in image coordinates
/// (negative [`Ring::signed_area`]); holes are clockwise. Under the
/// non-zero winding rule the filled interior is exactly the component's
/// pixels minus its holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Index into the palette this region is filled with.
    pub palette_index: u8,
    /// Number of pixels belonging to the component.
    pub pixel_count: usize,
    /// Closed outer boundary.
    pub outer: Ring,
    /// Zero or more hole boundaries, oppositely oriented.
    pub holes: Vec<Ring>,
}

/// One drawing command of a fitted path, in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathCommand {
    /// Begin a new subpath at the given point.
    MoveTo(Point),
    /// Straight segment to the given point.
    LineTo(Point),
    /// Quadratic Bézier with control point and end point.
    QuadTo(Point, Point),
    /// Close the current subpath back to its `MoveTo`.
    Close,
}

/// A fitted region boundary: outer subpath followed by hole subpaths,
/// each subpath closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPath(Vec<PathCommand>);

impl VectorPath {
    /// Create a path from commands.
    #[must_use]
    pub const fn new(commands: Vec<PathCommand>) -> Self {
        Self(commands)
    }

    /// Returns `true` if the path has no commands.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All commands in order.
    #[must_use]
    pub fn commands(&self) -> &[PathCommand] {
        &self.0
    }

    /// Returns `true` if every subpath ends with [`PathCommand::Close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.0.is_empty() && self.0.last() == Some(&PathCommand::Close)
    }
}

/// A fitted region ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPath {
    /// Index into the palette this path is filled with.
    pub palette_index: u8,
    /// Pixel count of the source region; drives paint order.
    pub pixel_count: usize,
    /// Outer subpath plus hole subpaths.
    pub path: VectorPath,
}

/// Non-fatal conditions recorded during a pipeline run.
///
/// Warnings are carried in the output metadata and never affect whether
/// the run succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// More connected components were found than `max_regions`; the
    /// minimum region size was raised adaptively until the budget held.
    RegionBudgetExceeded {
        /// Component count before coarsening.
        regions: usize,
        /// The minimum region size in effect after coarsening.
        raised_min_region_pixels: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegionBudgetExceeded {
                regions,
                raised_min_region_pixels,
            } => write!(
                f,
                "region budget exceeded: {regions} components; \
                 min_region_pixels raised to {raised_min_region_pixels}",
            ),
        }
    }
}

/// The assembled vector description of an image, ready for SVG
/// serialization.
#[derive(Debug, Clone)]
pub struct VectorDocument {
    /// Canvas dimensions (the preprocessed image dimensions).
    pub dimensions: Dimensions,
    /// The quantized palette, luminance-ascending.
    pub palette: Palette,
    /// Palette index of the most frequent color; painted as the
    /// background rectangle.
    pub background_index: u8,
    /// Region paths in paint order: pixel count non-increasing, ties
    /// broken by ascending palette index.
    pub regions: Vec<RegionPath>,
    /// Binary edge mask, present when an edge variant ran.
    pub edge_mask: Option<GrayImage>,
    /// Opacity for the stroked edge overlay; `None` disables the
    /// overlay even when a mask is present.
    pub edge_overlay_opacity: Option<f32>,
    /// Non-fatal conditions recorded during the run.
    pub warnings: Vec<Warning>,
}

/// Input encoding hint for the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormatHint {
    /// Portable Network Graphics.
    Png,
    /// JPEG/JFIF.
    Jpeg,
}

impl ImageFormatHint {
    /// The corresponding `image` crate format.
    #[must_use]
    pub const fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Quality presets trading fidelity for output size and speed.
///
/// Each preset fixes the palette size, simplification tolerance, and
/// edge detector variant; [`VectorizeConfig::for_quality`] expands a
/// preset into concrete fields which can then be overridden
/// individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    /// 16 colors, coarse simplification, no edge pass.
    Fast,
    /// 32 colors, moderate simplification, Sobel edges.
    #[default]
    Balanced,
    /// 64 colors, fine simplification, Canny edges.
    High,
    /// 128 colors, finest simplification, multi-scale edges.
    Ultra,
}

impl Quality {
    /// Palette size for this preset.
    #[must_use]
    pub const fn k(self) -> u16 {
        match self {
            Self::Fast => 16,
            Self::Balanced => 32,
            Self::High => 64,
            Self::Ultra => 128,
        }
    }

    /// Douglas-Peucker tolerance in pixels for this preset.
    #[must_use]
    pub const fn tolerance(self) -> f64 {
        match self {
            Self::Fast => 3.0,
            Self::Balanced => 2.0,
            Self::High => 1.5,
            Self::Ultra => 1.0,
        }
    }

    /// Edge detector variant for this preset.
    #[must_use]
    pub const fn edge_variant(self) -> Option<EdgeVariant> {
        match self {
            Self::Fast => None,
            Self::Balanced => Some(EdgeVariant::Sobel),
            Self::High => Some(EdgeVariant::Canny),
            Self::Ultra => Some(EdgeVariant::AiEnhanced),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => f.write_str("Fast"),
            Self::Balanced => f.write_str("Balanced"),
            Self::High => f.write_str("High"),
            Self::Ultra => f.write_str("Ultra"),
        }
    }
}

/// Which edge detection algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeVariant {
    /// 3x3 Sobel magnitude thresholded at the high threshold. The
    /// baseline variant.
    Sobel,
    /// Sobel gradient, non-maximum suppression, double-threshold
    /// hysteresis.
    Canny,
    /// Multi-scale Sobel (3x3 and 5x5 combined by pixelwise maximum)
    /// followed by Canny-style hysteresis. The name is historical; no
    /// neural inference is involved.
    AiEnhanced,
}

impl fmt::Display for EdgeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sobel => f.write_str("Sobel"),
            Self::Canny => f.write_str("Canny"),
            Self::AiEnhanced => f.write_str("AiEnhanced"),
        }
    }
}

/// Resampling filter used when downscaling to `max_dimension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Bilinear interpolation: fast, decent quality.
    Triangle,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Lanczos3
    }
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    pub(crate) const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Configuration for the vectorization pipeline.
///
/// [`VectorizeConfig::for_quality`] expands a [`Quality`] preset into
/// concrete fields; individual fields can then be overridden. Fields
/// are public; [`validate`](Self::validate) enforces the documented
/// invariants before any pipeline work starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizeConfig {
    /// The preset this config was derived from. Informational only once
    /// the concrete fields below are set.
    pub quality: Quality,

    /// Palette size. Must be in `[2, 256]`.
    pub k: u16,

    /// Cluster in CIE L*a*b* (`true`, perceptual) or linear RGB
    /// (`false`, faster).
    pub use_lab: bool,

    /// Maximum k-means iterations before giving up on convergence.
    pub max_iterations: u32,

    /// Seed for k-means++ centroid selection. Fixed seed + fixed input
    /// gives byte-identical output.
    pub seed: u64,

    /// Douglas-Peucker tolerance in pixels. Must be non-negative.
    pub tolerance: f64,

    /// Turning angle in degrees at or above which a boundary point is a
    /// corner (rendered as a straight join instead of a curve). Must be
    /// in `(0, 180]`.
    pub corner_angle_threshold: f64,

    /// Edge detector variant; `None` skips the edge stage entirely.
    pub edge_variant: Option<EdgeVariant>,

    /// Hysteresis low threshold on the 8-bit gradient magnitude scale.
    pub edge_low_threshold: f32,

    /// Hysteresis high threshold. Must be at least `edge_low_threshold`.
    pub edge_high_threshold: f32,

    /// Gaussian blur sigma applied before quantization; suppresses
    /// JPEG noise. Non-positive skips the blur.
    pub blur_radius: f32,

    /// Linear contrast stretch factor about 128. Must be in `[0.5, 2.0]`.
    pub contrast_boost: f32,

    /// Downscale so the longer side does not exceed this, preserving
    /// aspect ratio. `None` processes at native resolution.
    pub max_dimension: Option<u32>,

    /// Resampling filter for the `max_dimension` downscale.
    pub resize_filter: ResizeFilter,

    /// Minimum component size in pixels; smaller components are merged
    /// into a neighbor. `None` computes `max(8, 0.0001 * w * h)`.
    pub min_region_pixels: Option<usize>,

    /// Component budget; exceeding it raises the minimum region size
    /// adaptively and records a [`Warning::RegionBudgetExceeded`].
    pub max_regions: usize,

    /// Opacity of the stroked edge overlay in `[0, 1]`; `None` omits
    /// the overlay.
    pub edge_overlay_opacity: Option<f32>,

    /// Reject inputs whose decoded pixel buffer would exceed this many
    /// bytes. `None` accepts any size the allocator can satisfy.
    pub max_alloc_bytes: Option<u64>,

    /// Worker thread count; `None` uses the global rayon pool.
    pub threads: Option<usize>,

    /// Cooperative cancellation handle, polled between stages and
    /// periodically inside long loops. Not serialized.
    #[serde(skip)]
    pub cancel: CancelToken,
}

impl VectorizeConfig {
    /// Default k-means iteration cap.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
    /// Default hysteresis low threshold.
    pub const DEFAULT_EDGE_LOW: f32 = 30.0;
    /// Default hysteresis high threshold.
    pub const DEFAULT_EDGE_HIGH: f32 = 90.0;
    /// Default pre-quantization blur sigma.
    pub const DEFAULT_BLUR_RADIUS: f32 = 0.5;
    /// Default contrast stretch factor (identity).
    pub const DEFAULT_CONTRAST_BOOST: f32 = 1.0;
    /// Default corner angle threshold in degrees.
    pub const DEFAULT_CORNER_ANGLE: f64 = 60.0;
    /// Default component budget.
    pub const DEFAULT_MAX_REGIONS: usize = 100_000;

    /// Expand a quality preset into a concrete configuration.
    #[must_use]
    pub fn for_quality(quality: Quality) -> Self {
        Self {
            quality,
            k: quality.k(),
            use_lab: true,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            seed: 0,
            tolerance: quality.tolerance(),
            corner_angle_threshold: Self::DEFAULT_CORNER_ANGLE,
            edge_variant: quality.edge_variant(),
            edge_low_threshold: Self::DEFAULT_EDGE_LOW,
            edge_high_threshold: Self::DEFAULT_EDGE_HIGH,
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            contrast_boost: Self::DEFAULT_CONTRAST_BOOST,
            max_dimension: None,
            resize_filter: ResizeFilter::default(),
            min_region_pixels: None,
            max_regions: Self::DEFAULT_MAX_REGIONS,
            edge_overlay_opacity: None,
            max_alloc_bytes: None,
            threads: None,
            cancel: CancelToken::default(),
        }
    }

    /// The effective minimum region size for a canvas of the given
    /// dimensions.
    #[must_use]
    pub fn effective_min_region_pixels(&self, dimensions: Dimensions) -> usize {
        self.min_region_pixels.unwrap_or_else(|| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = (0.0001 * dimensions.pixel_count() as f64) as usize;
            scaled.max(8)
        })
    }

    /// Validate that all fields satisfy the documented invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(2..=256).contains(&self.k) {
            return Err(CoreError::InvalidConfiguration(format!(
                "k must be in [2, 256], got {}",
                self.k,
            )));
        }
        if self.max_iterations == 0 {
            return Err(CoreError::InvalidConfiguration(
                "max_iterations must be positive".to_owned(),
            ));
        }
        if self.tolerance < 0.0 {
            return Err(CoreError::InvalidConfiguration(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance,
            )));
        }
        if !(self.corner_angle_threshold > 0.0 && self.corner_angle_threshold <= 180.0) {
            return Err(CoreError::InvalidConfiguration(format!(
                "corner_angle_threshold must be in (0, 180], got {}",
                self.corner_angle_threshold,
            )));
        }
        if self.edge_low_threshold < 0.0 {
            return Err(CoreError::InvalidConfiguration(format!(
                "edge_low_threshold must be non-negative, got {}",
                self.edge_low_threshold,
            )));
        }
        if self.edge_low_threshold > self.edge_high_threshold {
            return Err(CoreError::InvalidConfiguration(format!(
                "edge_low_threshold ({}) must not exceed edge_high_threshold ({})",
                self.edge_low_threshold, self.edge_high_threshold,
            )));
        }
        if !(0.5..=2.0).contains(&self.contrast_boost) {
            return Err(CoreError::InvalidConfiguration(format!(
                "contrast_boost must be in [0.5, 2.0], got {}",
                self.contrast_boost,
            )));
        }
        if let Some(dim) = self.max_dimension {
            if dim < 3 {
                return Err(CoreError::InvalidConfiguration(format!(
                    "max_dimension must be at least 3, got {dim}",
                )));
            }
        }
        if self.max_regions == 0 {
            return Err(CoreError::InvalidConfiguration(
                "max_regions must be positive".to_owned(),
            ));
        }
        if let Some(opacity) = self.edge_overlay_opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(CoreError::InvalidConfiguration(format!(
                    "edge_overlay_opacity must be in [0, 1], got {opacity}",
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(CoreError::InvalidConfiguration(
                "threads must be positive when set".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self::for_quality(Quality::default())
    }
}

/// Errors that can occur during vectorization.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The input bytes could not be decoded as the hinted format.
    #[error("failed to decode image: {0}")]
    DecodeFailed(#[from] image::ImageError),

    /// The decoded (or downscaled) image is smaller than 3x3.
    #[error("invalid image dimensions {width}x{height}: both sides must be at least 3")]
    InvalidDimensions {
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
    },

    /// A configuration invariant was violated.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The decoded pixel buffer would exceed the caller-supplied limit.
    #[error("pixel buffer of {required} bytes exceeds the {limit}-byte limit")]
    ResourceExhausted {
        /// Bytes the buffer would require.
        required: u64,
        /// The configured limit.
        limit: u64,
    },

    /// The cancellation token fired.
    #[error("vectorization cancelled")]
    Cancelled,

    /// An internal invariant was violated. Always a bug, never a
    /// user-fixable condition; `code` is stable for triage.
    #[error("internal error [{code}]: {message}")]
    Internal {
        /// Stable short identifier of the violated invariant.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_midpoint() {
        let m = Point::new(0.0, 0.0).midpoint(Point::new(4.0, 2.0));
        assert_eq!(m, Point::new(2.0, 1.0));
    }

    // --- Ring tests ---

    #[test]
    fn ring_len_and_points() {
        let ring = Ring::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
        ]);
        assert_eq!(ring.len(), 3);
        assert!(!ring.is_empty());
        assert_eq!(ring.points()[1], Point::new(1.0, 0.0));
    }

    #[test]
    fn unit_square_clockwise_has_positive_area() {
        // Clockwise on screen (y down): right, down, left, up.
        let ring = Ring::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]);
        assert!((ring.signed_area() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unit_square_counter_clockwise_has_negative_area() {
        let ring = Ring::new(vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 0.0),
        ]);
        assert!((ring.signed_area() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reverse_flips_area_sign_and_keeps_first_point() {
        let mut ring = Ring::new(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
        ]);
        let area = ring.signed_area();
        ring.reverse();
        assert_eq!(ring.points()[0], Point::new(0.0, 0.0));
        assert!((ring.signed_area() + area).abs() < f64::EPSILON);
    }

    #[test]
    fn degenerate_ring_has_zero_area() {
        assert!(Ring::new(vec![]).signed_area().abs() < f64::EPSILON);
        let two = Ring::new(vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert!(two.signed_area().abs() < f64::EPSILON);
    }

    #[test]
    fn bounding_box_spans_points() {
        let ring = Ring::new(vec![
            Point::new(1.0, 7.0),
            Point::new(-2.0, 3.0),
            Point::new(4.0, 5.0),
        ]);
        assert_eq!(ring.bounding_box(), (-2.0, 3.0, 4.0, 7.0));
    }

    // --- Palette / IndexMap tests ---

    #[test]
    fn palette_entry_hex_is_lowercase() {
        let entry = PaletteEntry {
            rgb: [255, 10, 171],
            lab: [0.0, 0.0, 0.0],
        };
        assert_eq!(entry.hex(), "#ff0aab");
    }

    #[test]
    fn index_map_from_raw_checks_size() {
        assert!(IndexMap::from_raw(3, 2, vec![0; 6]).is_some());
        assert!(IndexMap::from_raw(3, 2, vec![0; 5]).is_none());
    }

    #[test]
    fn index_map_get_is_row_major() {
        let map = IndexMap::from_raw(3, 2, vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(map.get(0, 0), 0);
        assert_eq!(map.get(2, 0), 2);
        assert_eq!(map.get(0, 1), 3);
        assert_eq!(map.get(2, 1), 5);
    }

    // --- VectorPath tests ---

    #[test]
    fn closed_path_detection() {
        let open = VectorPath::new(vec![
            PathCommand::MoveTo(Point::new(0.0, 0.0)),
            PathCommand::LineTo(Point::new(1.0, 0.0)),
        ]);
        assert!(!open.is_closed());

        let closed = VectorPath::new(vec![
            PathCommand::MoveTo(Point::new(0.0, 0.0)),
            PathCommand::LineTo(Point::new(1.0, 0.0)),
            PathCommand::Close,
        ]);
        assert!(closed.is_closed());

        assert!(!VectorPath::new(vec![]).is_closed());
    }

    // --- Quality preset tests ---

    #[test]
    fn quality_presets_match_documented_values() {
        assert_eq!(Quality::Fast.k(), 16);
        assert_eq!(Quality::Balanced.k(), 32);
        assert_eq!(Quality::High.k(), 64);
        assert_eq!(Quality::Ultra.k(), 128);

        assert!((Quality::Fast.tolerance() - 3.0).abs() < f64::EPSILON);
        assert!((Quality::Balanced.tolerance() - 2.0).abs() < f64::EPSILON);
        assert!((Quality::High.tolerance() - 1.5).abs() < f64::EPSILON);
        assert!((Quality::Ultra.tolerance() - 1.0).abs() < f64::EPSILON);

        assert_eq!(Quality::Fast.edge_variant(), None);
        assert_eq!(Quality::Ultra.edge_variant(), Some(EdgeVariant::AiEnhanced));
    }

    // --- VectorizeConfig tests ---

    #[test]
    fn default_config_is_balanced_and_valid() {
        let config = VectorizeConfig::default();
        assert_eq!(config.quality, Quality::Balanced);
        assert_eq!(config.k, 32);
        assert!(config.use_lab);
        assert_eq!(config.seed, 0);
        config.validate().unwrap();
    }

    #[test]
    fn all_presets_validate() {
        for quality in [Quality::Fast, Quality::Balanced, Quality::High, Quality::Ultra] {
            VectorizeConfig::for_quality(quality).validate().unwrap();
        }
    }

    #[test]
    fn validate_rejects_k_out_of_range() {
        for k in [0, 1, 257] {
            let config = VectorizeConfig {
                k,
                ..VectorizeConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidConfiguration(ref s) if s.contains('k')),
                "expected InvalidConfiguration about k, got {err:?}",
            );
        }
    }

    #[test]
    fn validate_accepts_k_bounds() {
        for k in [2, 256] {
            let config = VectorizeConfig {
                k,
                ..VectorizeConfig::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn validate_rejects_low_above_high_threshold() {
        let config = VectorizeConfig {
            edge_low_threshold: 120.0,
            edge_high_threshold: 40.0,
            ..VectorizeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidConfiguration(ref s) if s.contains("edge_low")),
            "expected InvalidConfiguration about thresholds, got {err:?}",
        );
    }

    #[test]
    fn validate_rejects_contrast_out_of_range() {
        for boost in [0.49, 2.01] {
            let config = VectorizeConfig {
                contrast_boost: boost,
                ..VectorizeConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn validate_rejects_negative_tolerance() {
        let config = VectorizeConfig {
            tolerance: -0.5,
            ..VectorizeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_threads() {
        let config = VectorizeConfig {
            threads: Some(0),
            ..VectorizeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_min_region_pixels_has_floor() {
        let config = VectorizeConfig::default();
        // Small canvas: the 0.01% rule would give 0, the floor is 8.
        let small = Dimensions {
            width: 100,
            height: 100,
        };
        assert_eq!(config.effective_min_region_pixels(small), 8);
        // Large canvas: 0.01% of 4096*4096 = 1677.
        let large = Dimensions {
            width: 4096,
            height: 4096,
        };
        assert_eq!(config.effective_min_region_pixels(large), 1677);
    }

    #[test]
    fn explicit_min_region_pixels_wins() {
        let config = VectorizeConfig {
            min_region_pixels: Some(1),
            ..VectorizeConfig::default()
        };
        let dims = Dimensions {
            width: 4096,
            height: 4096,
        };
        assert_eq!(config.effective_min_region_pixels(dims), 1);
    }

    // --- Serde round-trip ---

    #[test]
    fn config_serde_round_trip_preserves_fields() {
        let config = VectorizeConfig {
            k: 48,
            seed: 7,
            tolerance: 1.25,
            edge_variant: Some(EdgeVariant::Canny),
            max_dimension: Some(512),
            ..VectorizeConfig::for_quality(Quality::High)
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: VectorizeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.k, 48);
        assert_eq!(back.seed, 7);
        assert!((back.tolerance - 1.25).abs() < f64::EPSILON);
        assert_eq!(back.edge_variant, Some(EdgeVariant::Canny));
        assert_eq!(back.max_dimension, Some(512));
        assert_eq!(back.quality, Quality::High);
    }

    // --- Error display ---

    #[test]
    fn error_display_is_stable() {
        let err = CoreError::InvalidDimensions {
            width: 2,
            height: 5,
        };
        assert_eq!(
            err.to_string(),
            "invalid image dimensions 2x5: both sides must be at least 3",
        );

        let err = CoreError::Cancelled;
        assert_eq!(err.to_string(), "vectorization cancelled");
    }

    #[test]
    fn warning_display_mentions_counts() {
        let warning = Warning::RegionBudgetExceeded {
            regions: 123_456,
            raised_min_region_pixels: 32,
        };
        let text = warning.to_string();
        assert!(text.contains("123456"));
        assert!(text.contains("32"));
    }
}
