//! colortrace-svg: pure SVG serialization (sans-IO).
//!
//! Converts the pipeline's [`VectorDocument`](colortrace_pipeline::VectorDocument)
//! into an SVG string. No file or network I/O; callers own persistence.

pub mod svg;

pub use svg::{SvgMetadata, build_path_data, to_svg};
