//! colortrace: raster images into filled-region SVG documents.
//!
//! The crate ties the pure pipeline (`colortrace-pipeline`) to the SVG
//! serializer (`colortrace-svg`) behind one entry point:
//!
//! ```no_run
//! use colortrace::{ImageFormatHint, Quality, VectorizeConfig, vectorize};
//!
//! let png = std::fs::read("photo.png")?;
//! let config = VectorizeConfig::for_quality(Quality::High);
//! let svg = vectorize(&png, ImageFormatHint::Png, &config)?;
//! std::fs::write("photo.svg", svg)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The core neither reads nor writes files and performs no logging;
//! callers own bytes-in/bytes-out and map [`CoreError`] variants to
//! their own status reporting. For a fixed input, configuration, and
//! seed the output bytes are identical across runs.

pub use colortrace_pipeline::{
    CancelToken, CoreError, Dimensions, EdgeVariant, ImageFormatHint, Palette, PaletteEntry,
    PipelineDiagnostics, ProcessOutput, Quality, ResizeFilter, StageDiagnostics, VectorDocument,
    VectorizeConfig, Warning, process,
};
pub use colortrace_svg::{SvgMetadata, to_svg};

/// Vectorize raw image bytes into a self-contained SVG document.
///
/// Runs the full pipeline (preprocess, quantize, edge detection,
/// region extraction, simplification, curve fitting) and serializes
/// the result. The returned bytes are UTF-8 SVG 1.1 with no external
/// references.
///
/// Warnings (e.g. the region budget forcing coarser output) do not
/// fail the call; use [`vectorize_with_diagnostics`] to observe them.
///
/// # Errors
///
/// See [`process`] for the failure taxonomy; every variant of
/// [`CoreError`] except `RegionBudgetExceeded`-style warnings
/// propagates unchanged.
pub fn vectorize(
    image_bytes: &[u8],
    format: ImageFormatHint,
    config: &VectorizeConfig,
) -> Result<Vec<u8>, CoreError> {
    let output = process(image_bytes, format, config)?;
    Ok(to_svg(&output.document, &SvgMetadata::default()).into_bytes())
}

/// Like [`vectorize`], additionally returning the document (with its
/// warnings) and per-stage diagnostics alongside the SVG bytes.
///
/// # Errors
///
/// See [`vectorize`].
pub fn vectorize_with_diagnostics(
    image_bytes: &[u8],
    format: ImageFormatHint,
    config: &VectorizeConfig,
) -> Result<(Vec<u8>, ProcessOutput), CoreError> {
    let output = process(image_bytes, format, config)?;
    let svg = to_svg(&output.document, &SvgMetadata::default()).into_bytes();
    Ok((svg, output))
}
