//! colortrace-bench: CLI tool for pipeline parameter experimentation
//! and diagnostics.
//!
//! Runs the vectorization pipeline on a given image file with
//! configurable parameters, printing detailed per-stage diagnostics.
//! Useful for:
//!
//! - Comparing edge detector variants (Sobel vs Canny vs multi-scale)
//! - Tuning palette size, simplification tolerance, blur sigma
//! - Measuring per-stage durations to identify bottlenecks
//! - Understanding how parameter changes affect region/path counts
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin colortrace-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use colortrace::{
    ImageFormatHint, PipelineDiagnostics, Quality, SvgMetadata, VectorizeConfig, process, to_svg,
};

/// Pipeline parameter experimentation and diagnostics for colortrace.
///
/// Runs the vectorization pipeline on a given image with configurable
/// parameters and prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "colortrace-bench", version)]
struct Cli {
    /// Path to the input image (PNG or JPEG).
    image_path: PathBuf,

    /// Quality preset expanded before per-field overrides.
    #[arg(long, value_enum, default_value_t = QualityArg::Balanced)]
    quality: QualityArg,

    /// Palette size override (2-256).
    #[arg(long)]
    k: Option<u16>,

    /// Douglas-Peucker tolerance override in pixels.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Edge detector variant override.
    #[arg(long, value_enum)]
    edges: Option<EdgeArg>,

    /// Gaussian blur sigma before quantization.
    #[arg(long)]
    blur: Option<f32>,

    /// Cluster in linear RGB instead of CIE L*a*b*.
    #[arg(long)]
    linear_rgb: bool,

    /// Downscale cap for the longer image side.
    #[arg(long)]
    max_dimension: Option<u32>,

    /// k-means seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Worker thread count (default: rayon's global pool).
    #[arg(long)]
    threads: Option<usize>,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Stroke detected edges over the output with this opacity.
    #[arg(long)]
    edge_overlay: Option<f32>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable table.
    #[arg(long)]
    json: bool,
}

/// Quality preset selection.
#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    /// 16 colors, tolerance 3.0, no edge pass.
    Fast,
    /// 32 colors, tolerance 2.0, Sobel edges.
    Balanced,
    /// 64 colors, tolerance 1.5, Canny edges.
    High,
    /// 128 colors, tolerance 1.0, multi-scale edges.
    Ultra,
}

impl From<QualityArg> for Quality {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Fast => Self::Fast,
            QualityArg::Balanced => Self::Balanced,
            QualityArg::High => Self::High,
            QualityArg::Ultra => Self::Ultra,
        }
    }
}

/// Edge detector variant selection.
#[derive(Clone, Copy, ValueEnum)]
enum EdgeArg {
    /// Disable the edge stage.
    None,
    /// Thresholded 3x3 Sobel magnitude.
    Sobel,
    /// Sobel + non-maximum suppression + hysteresis.
    Canny,
    /// Multi-scale Sobel + hysteresis.
    Multiscale,
}

impl EdgeArg {
    const fn to_variant(self) -> Option<colortrace::EdgeVariant> {
        match self {
            Self::None => None,
            Self::Sobel => Some(colortrace::EdgeVariant::Sobel),
            Self::Canny => Some(colortrace::EdgeVariant::Canny),
            Self::Multiscale => Some(colortrace::EdgeVariant::AiEnhanced),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.runs == 0 {
        eprintln!("Error: --runs must be at least 1");
        return ExitCode::FAILURE;
    }

    let mut config = VectorizeConfig::for_quality(cli.quality.into());
    if let Some(k) = cli.k {
        config.k = k;
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(edges) = cli.edges {
        config.edge_variant = edges.to_variant();
    }
    if let Some(blur) = cli.blur {
        config.blur_radius = blur;
    }
    config.use_lab = !cli.linear_rgb;
    config.max_dimension = cli.max_dimension;
    config.seed = cli.seed;
    config.threads = cli.threads;
    config.edge_overlay_opacity = cli.edge_overlay;

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let format = match cli
        .image_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => ImageFormatHint::Jpeg,
        _ => ImageFormatHint::Png,
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let output = match process(&image_bytes, format, &config) {
            Ok(output) => output,
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&output.diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            print_report(&output);
        }

        // Write SVG on the first run only.
        if run == 0 {
            if let Some(ref svg_path) = cli.svg {
                let svg = to_svg(
                    &output.document,
                    &SvgMetadata {
                        title: cli
                            .image_path
                            .file_stem()
                            .and_then(|stem| stem.to_str()),
                        description: None,
                    },
                );
                match std::fs::write(svg_path, &svg) {
                    Ok(()) => {
                        eprintln!(
                            "SVG written to {} ({} bytes)",
                            svg_path.display(),
                            svg.len(),
                        );
                    }
                    Err(e) => {
                        eprintln!("Error writing SVG to {}: {e}", svg_path.display());
                    }
                }
            }
        }

        all_diagnostics.push(output.diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print a human-readable per-stage report for one run.
fn print_report(output: &colortrace::ProcessOutput) {
    let d = &output.diagnostics;
    let document = &output.document;

    println!("{:<22} {:>12} {:>12}", "Stage", "Duration (ms)", "Items");
    println!("{}", "-".repeat(48));
    print_stage("Decode", Some(d.decode));
    print_stage("Preprocess", Some(d.preprocess));
    print_stage("Quantize", Some(d.quantize));
    print_stage("Edge detection", d.edge_detection);
    print_stage("Region extraction", Some(d.region_extraction));
    print_stage("Path fitting", Some(d.path_fitting));
    println!("{}", "-".repeat(48));
    println!(
        "{:<22} {:>12.3}",
        "Total",
        d.total().as_secs_f64() * 1000.0,
    );
    println!();
    println!(
        "Canvas {}x{}, {} palette entries, {} paths",
        document.dimensions.width,
        document.dimensions.height,
        document.palette.len(),
        document.regions.len(),
    );
    for warning in &document.warnings {
        println!("Warning: {warning}");
    }
}

/// One row of the per-stage table; skipped stages print a dash.
fn print_stage(name: &str, stage: Option<colortrace::StageDiagnostics>) {
    match stage {
        Some(s) => println!(
            "{:<22} {:>12.3} {:>12}",
            name,
            s.duration.as_secs_f64() * 1000.0,
            s.items,
        ),
        None => println!("{name:<22} {:>12} {:>12}", "-", "-"),
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(48),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total().as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");
}
