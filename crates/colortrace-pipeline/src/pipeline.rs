//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs the entire pipeline in one
//! call, the typestate chain lets the caller drive execution one step
//! at a time:
//!
//! ```rust
//! # use colortrace_pipeline::pipeline::Pending;
//! # use colortrace_pipeline::{ImageFormatHint, VectorizeConfig};
//! # fn run(png: Vec<u8>) -> Result<(), colortrace_pipeline::CoreError> {
//! let config = VectorizeConfig::default();
//! config.validate()?;
//! let (document, _diagnostics) = Pending::new(png, ImageFormatHint::Png, config)
//!     .decode()?
//!     .preprocess()?
//!     .analyze()?
//!     .extract_regions()?
//!     .fit_paths()?
//!     .into_parts();
//! assert!(document.palette.len() <= 256);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline
//! state (or `Result` for fallible stages). Raster buffers are handed
//! off by move and dropped as soon as the next stage has consumed
//! them, so peak memory stays near the largest single intermediate.
//! The cancellation token is polled at every stage boundary and
//! periodically inside the long loops.

use crate::diagnostics::{PipelineDiagnostics, StageDiagnostics, StageTimer};
use crate::edge::{EdgeDetector, EdgeOptions};
use crate::quantize::{QuantizeOptions, Quantizer, QuantizerKind};
use crate::regions::RegionOptions;
use crate::types::{
    CoreError, Dimensions, GrayImage, ImageFormatHint, IndexMap, Palette, Region, RgbImage,
    VectorDocument, VectorizeConfig, Warning,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source bytes and config are stored but not yet touched. Call
/// [`decode`](Self::decode) to advance. The config is assumed to be
/// validated; [`crate::process`] does so before constructing the
/// pipeline.
#[must_use = "pipeline stages are consumed by advancing — call .decode() to continue"]
pub struct Pending {
    config: VectorizeConfig,
    source: Vec<u8>,
    format: ImageFormatHint,
}

impl Pending {
    /// Stage a new pipeline run.
    pub const fn new(source: Vec<u8>, format: ImageFormatHint, config: VectorizeConfig) -> Self {
        Self {
            config,
            source,
            format,
        }
    }

    /// Decode the source bytes and advance to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecodeFailed`] for malformed input,
    /// [`CoreError::ResourceExhausted`] when the decoded buffer would
    /// exceed the configured limit, and
    /// [`CoreError::InvalidDimensions`] for sub-3x3 images.
    pub fn decode(self) -> Result<Decoded, CoreError> {
        self.config.cancel.check()?;
        let timer = StageTimer::start();
        let image =
            crate::preprocess::decode(&self.source, self.format, self.config.max_alloc_bytes)?;
        let pixels = u64::from(image.width()) * u64::from(image.height());
        Ok(Decoded {
            config: self.config,
            image,
            decode_diag: timer.finish(pixels),
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding.
///
/// Call [`preprocess`](Self::preprocess) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .preprocess() to continue"]
pub struct Decoded {
    config: VectorizeConfig,
    image: RgbImage,
    decode_diag: StageDiagnostics,
}

impl Decoded {
    /// The decoded, alpha-flattened RGB image.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Downscale, blur, and contrast-stretch; advance to
    /// [`Preprocessed`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDimensions`] when the aspect-
    /// preserving downscale leaves a side below 3 pixels, and
    /// [`CoreError::Cancelled`] if the token fires.
    pub fn preprocess(self) -> Result<Preprocessed, CoreError> {
        self.config.cancel.check()?;
        let timer = StageTimer::start();

        let mut image = self.image;
        if let Some(max_dimension) = self.config.max_dimension {
            let (resized, _) =
                crate::preprocess::downscale(image, max_dimension, self.config.resize_filter);
            image = resized;
        }
        let (width, height) = image.dimensions();
        if width < crate::preprocess::MIN_DIMENSION || height < crate::preprocess::MIN_DIMENSION {
            return Err(CoreError::InvalidDimensions { width, height });
        }

        image = crate::preprocess::gaussian_blur_rgb(&image, self.config.blur_radius);
        crate::preprocess::contrast_stretch(&mut image, self.config.contrast_boost);

        let dimensions = crate::preprocess::dimensions_of(&image);
        Ok(Preprocessed {
            config: self.config,
            image,
            dimensions,
            decode_diag: self.decode_diag,
            preprocess_diag: timer.finish(dimensions.pixel_count()),
        })
    }
}

// ───────────────────────── Stage 2: Preprocessed ─────────────────────

/// Pipeline state after pixel-level preparation.
///
/// Call [`analyze`](Self::analyze) to advance: quantization and edge
/// detection are independent and run concurrently.
#[must_use = "pipeline stages are consumed by advancing — call .analyze() to continue"]
pub struct Preprocessed {
    config: VectorizeConfig,
    image: RgbImage,
    dimensions: Dimensions,
    decode_diag: StageDiagnostics,
    preprocess_diag: StageDiagnostics,
}

impl Preprocessed {
    /// The preprocessed working image.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Working dimensions (after any downscale).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Quantize colors and detect edges concurrently; advance to
    /// [`Analyzed`].
    ///
    /// The working image is dropped here — downstream stages operate
    /// on the index map and edge mask only.
    ///
    /// # Errors
    ///
    /// Propagates quantizer and edge-detector failures; returns
    /// [`CoreError::Cancelled`] if the token fires.
    pub fn analyze(self) -> Result<Analyzed, CoreError> {
        self.config.cancel.check()?;

        let quantize_options = QuantizeOptions::from_config(&self.config);
        let edge_options = EdgeOptions::from_config(&self.config);
        let cancel = &self.config.cancel;
        let image = &self.image;

        let quantize_timer = StageTimer::start();
        let (quantized, edges) = rayon::join(
            || QuantizerKind::KMeans.quantize(image, &quantize_options, cancel),
            || {
                self.config.edge_variant.map(|variant| {
                    let timer = StageTimer::start();
                    let mask = variant.detect(image, &edge_options, cancel)?;
                    let edge_pixels =
                        mask.as_raw().iter().map(|&v| u64::from(v != 0)).sum::<u64>();
                    Ok::<_, CoreError>((mask, timer.finish(edge_pixels)))
                })
            },
        );
        let (palette, index_map) = quantized?;
        let quantize_diag = quantize_timer.finish(palette.len() as u64);

        let (edge_mask, edge_diag) = match edges.transpose()? {
            Some((mask, diag)) => (Some(mask), Some(diag)),
            None => (None, None),
        };

        Ok(Analyzed {
            config: self.config,
            palette,
            index_map,
            edge_mask,
            edge_diag,
            dimensions: self.dimensions,
            decode_diag: self.decode_diag,
            preprocess_diag: self.preprocess_diag,
            quantize_diag,
        })
    }
}

// ───────────────────────── Stage 3: Analyzed ─────────────────────────

/// Pipeline state after quantization and edge detection.
///
/// Call [`extract_regions`](Self::extract_regions) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .extract_regions() to continue"]
pub struct Analyzed {
    config: VectorizeConfig,
    palette: Palette,
    index_map: IndexMap,
    edge_mask: Option<GrayImage>,
    edge_diag: Option<StageDiagnostics>,
    dimensions: Dimensions,
    decode_diag: StageDiagnostics,
    preprocess_diag: StageDiagnostics,
    quantize_diag: StageDiagnostics,
}

impl Analyzed {
    /// The quantized palette, luminance-ascending.
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The per-pixel palette index map.
    #[must_use]
    pub const fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    /// The binary edge mask, when an edge variant ran.
    #[must_use]
    pub const fn edge_mask(&self) -> Option<&GrayImage> {
        self.edge_mask.as_ref()
    }

    /// Label connected components and trace their boundaries; advance
    /// to [`RegionsTraced`]. The index map is dropped here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token fires, or
    /// [`CoreError::Internal`] on a tracing invariant violation.
    pub fn extract_regions(self) -> Result<RegionsTraced, CoreError> {
        self.config.cancel.check()?;
        let timer = StageTimer::start();

        let options = RegionOptions {
            min_region_pixels: self.config.effective_min_region_pixels(self.dimensions),
            max_regions: self.config.max_regions,
        };
        let (component_map, warnings) =
            crate::regions::extract_components(&self.index_map, &options, &self.config.cancel)?;
        drop(self.index_map);
        let regions = crate::trace::trace_regions(&component_map, &self.config.cancel)?;

        Ok(RegionsTraced {
            region_diag: timer.finish(regions.len() as u64),
            config: self.config,
            palette: self.palette,
            regions,
            warnings,
            edge_mask: self.edge_mask,
            edge_diag: self.edge_diag,
            dimensions: self.dimensions,
            decode_diag: self.decode_diag,
            preprocess_diag: self.preprocess_diag,
            quantize_diag: self.quantize_diag,
        })
    }
}

// ───────────────────────── Stage 4: RegionsTraced ────────────────────

/// Pipeline state after region extraction and boundary tracing.
///
/// Call [`fit_paths`](Self::fit_paths) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .fit_paths() to continue"]
pub struct RegionsTraced {
    config: VectorizeConfig,
    palette: Palette,
    regions: Vec<Region>,
    warnings: Vec<Warning>,
    edge_mask: Option<GrayImage>,
    edge_diag: Option<StageDiagnostics>,
    dimensions: Dimensions,
    decode_diag: StageDiagnostics,
    preprocess_diag: StageDiagnostics,
    quantize_diag: StageDiagnostics,
    region_diag: StageDiagnostics,
}

impl RegionsTraced {
    /// The traced regions, in raster order of first appearance.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Simplify boundaries, fit curves, and order paths for painting;
    /// advance to [`PathsFitted`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token fires.
    pub fn fit_paths(self) -> Result<PathsFitted, CoreError> {
        self.config.cancel.check()?;
        let timer = StageTimer::start();

        let fit_options = crate::curve::FitOptions {
            tolerance: self.config.tolerance,
            corner_angle_threshold: self.config.corner_angle_threshold,
        };
        let mut paths = crate::curve::fit_regions(
            &self.regions,
            self.edge_mask.as_ref(),
            &fit_options,
            &self.config.cancel,
        )?;

        // Paint order: larger regions first, ties by ascending palette
        // index; the sort is stable so equal keys keep trace order.
        paths.sort_by(|a, b| {
            b.pixel_count
                .cmp(&a.pixel_count)
                .then_with(|| a.palette_index.cmp(&b.palette_index))
        });

        let background_index = most_frequent_index(&self.regions);

        let document = VectorDocument {
            dimensions: self.dimensions,
            palette: self.palette,
            background_index,
            regions: paths,
            edge_mask: self.edge_mask,
            edge_overlay_opacity: self.config.edge_overlay_opacity,
            warnings: self.warnings,
        };
        let path_count = document.regions.len() as u64;

        Ok(PathsFitted {
            document,
            diagnostics: PipelineDiagnostics {
                decode: self.decode_diag,
                preprocess: self.preprocess_diag,
                quantize: self.quantize_diag,
                edge_detection: self.edge_diag,
                region_extraction: self.region_diag,
                path_fitting: timer.finish(path_count),
            },
        })
    }
}

/// The palette index covering the most pixels; ties resolve to the
/// lower index. This paints the background rectangle.
fn most_frequent_index(regions: &[Region]) -> u8 {
    let mut totals = [0usize; 256];
    for region in regions {
        totals[usize::from(region.palette_index)] += region.pixel_count;
    }
    let mut best = 0usize;
    for (i, &total) in totals.iter().enumerate() {
        if total > totals[best] {
            best = i;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        best as u8
    }
}

// ───────────────────────── Stage 5: PathsFitted ──────────────────────

/// Terminal pipeline state: the assembled vector document plus run
/// diagnostics.
#[must_use = "call .into_parts() to take the document"]
pub struct PathsFitted {
    document: VectorDocument,
    diagnostics: PipelineDiagnostics,
}

impl PathsFitted {
    /// The assembled document.
    #[must_use]
    pub const fn document(&self) -> &VectorDocument {
        &self.document
    }

    /// Run diagnostics.
    #[must_use]
    pub const fn diagnostics(&self) -> &PipelineDiagnostics {
        &self.diagnostics
    }

    /// Consume the state into its parts.
    #[must_use]
    pub fn into_parts(self) -> (VectorDocument, PipelineDiagnostics) {
        (self.document, self.diagnostics)
    }
}
