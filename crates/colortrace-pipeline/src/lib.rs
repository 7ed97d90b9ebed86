//! colortrace-pipeline: pure raster-to-vector pipeline (sans-IO).
//!
//! Converts raster images into an ordered collection of filled vector
//! paths through:
//! decode -> preprocess -> {quantize ∥ edge detection} ->
//! region extraction -> boundary tracing -> simplification ->
//! curve fitting.
//!
//! This crate has **no I/O dependencies** — it operates on in-memory
//! byte slices and returns structured data. SVG serialization lives in
//! `colortrace-svg`; file and network handling belong to callers.
//!
//! Work inside a stage is data-parallel over pixels, rows, or regions
//! (rayon), with all reductions merged in a fixed order so a given
//! input, configuration, and seed always produce identical output.

pub mod cancel;
pub mod color;
pub mod curve;
pub mod diagnostics;
pub mod edge;
pub mod pipeline;
pub mod preprocess;
pub mod quantize;
pub mod regions;
pub mod simplify;
pub mod trace;
pub mod types;

pub use cancel::CancelToken;
pub use diagnostics::{PipelineDiagnostics, StageDiagnostics};
pub use edge::{EdgeDetector, EdgeOptions};
pub use quantize::{QuantizeOptions, Quantizer, QuantizerKind};
pub use types::{
    CoreError, Dimensions, EdgeVariant, GrayImage, ImageFormatHint, IndexMap, Palette,
    PaletteEntry, PathCommand, Point, Quality, Region, RegionPath, ResizeFilter, RgbImage, Ring,
    VectorDocument, VectorPath, VectorizeConfig, Warning,
};

/// Result of a full pipeline run.
#[derive(Debug)]
pub struct ProcessOutput {
    /// The assembled vector document, ready for serialization.
    pub document: VectorDocument,
    /// Per-stage timing and counts.
    pub diagnostics: PipelineDiagnostics,
}

/// Run the full pipeline on raw image bytes.
///
/// Validates the configuration, then drives the typestate chain in
/// [`pipeline`] end to end. When `config.threads` is set, the run is
/// confined to a dedicated thread pool of that size; otherwise the
/// global pool is used.
///
/// # Errors
///
/// Returns the first stage failure: [`CoreError::InvalidConfiguration`]
/// before any pixel work, [`CoreError::DecodeFailed`] /
/// [`CoreError::InvalidDimensions`] / [`CoreError::ResourceExhausted`]
/// from decoding, [`CoreError::Cancelled`] when the token fires, and
/// [`CoreError::Internal`] for invariant violations.
pub fn process(
    image_bytes: &[u8],
    format: ImageFormatHint,
    config: &VectorizeConfig,
) -> Result<ProcessOutput, CoreError> {
    config.validate()?;

    let run = || {
        let (document, diagnostics) =
            pipeline::Pending::new(image_bytes.to_vec(), format, config.clone())
                .decode()?
                .preprocess()?
                .analyze()?
                .extract_regions()?
                .fit_paths()?
                .into_parts();
        Ok(ProcessOutput {
            document,
            diagnostics,
        })
    };

    match config.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| CoreError::Internal {
                code: "thread-pool-build",
                message: e.to_string(),
            })?
            .install(run),
        None => run(),
    }
}
