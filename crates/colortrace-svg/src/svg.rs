//! SVG serializer.
//!
//! Converts a [`VectorDocument`] into an SVG string: a background
//! `<rect>` in the document's most frequent color, one filled `<path>`
//! per region in paint order, and an optional stroked edge overlay.
//! Region subpaths use absolute `M`/`L`/`Q`/`Z` commands with the
//! non-zero fill rule so hole subpaths punch through their outer.
//!
//! Output renders in any SVG 1.1 renderer: no filters, no gradients,
//! no scripts, no external references. For a fixed document the output
//! bytes are identical across runs.
//!
//! This is a pure function with no I/O — it returns a `String`.

use std::fmt::Write;

use colortrace_pipeline::{Dimensions, GrayImage, PathCommand, VectorDocument, VectorPath};

/// Metadata to embed in the SVG document.
///
/// Both fields are optional. When present, a `<title>` and/or `<desc>`
/// element is emitted immediately after the opening `<svg>` tag. These
/// are standard SVG accessibility elements and are surfaced by some
/// file managers and screen readers.
///
/// Text values are XML-escaped automatically (see [`xml_escape`]).
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title — emitted as `<title>`.
    pub title: Option<&'a str>,

    /// Document description — emitted as `<desc>`.
    ///
    /// Typically the configuration summary, so exported files are
    /// distinguishable.
    pub description: Option<&'a str>,
}

/// Escape the five XML special characters for safe embedding in element
/// text content and attribute values.
///
/// Handles `&` (must be first), `<`, `>`, `"`, and `'`.
fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Format a coordinate with at most 2 fractional digits, trailing
/// zeros stripped, and the decimal point omitted for integral values.
fn fmt_coord(value: f64) -> String {
    let mut s = format!("{value:.2}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_owned();
    }
    s
}

/// Build the `d` attribute string for a fitted path.
#[must_use]
pub fn build_path_data(path: &VectorPath) -> String {
    let mut d = String::new();
    for command in path.commands() {
        if !d.is_empty() {
            d.push(' ');
        }
        match command {
            PathCommand::MoveTo(p) => {
                let _ = write!(d, "M {} {}", fmt_coord(p.x), fmt_coord(p.y));
            }
            PathCommand::LineTo(p) => {
                let _ = write!(d, "L {} {}", fmt_coord(p.x), fmt_coord(p.y));
            }
            PathCommand::QuadTo(ctrl, end) => {
                let _ = write!(
                    d,
                    "Q {} {} {} {}",
                    fmt_coord(ctrl.x),
                    fmt_coord(ctrl.y),
                    fmt_coord(end.x),
                    fmt_coord(end.y),
                );
            }
            PathCommand::Close => d.push('Z'),
        }
    }
    d
}

/// Write the SVG preamble: XML declaration, opening `<svg>` tag, and
/// optional `<title>` / `<desc>` elements.
fn write_svg_preamble(out: &mut String, dimensions: Dimensions, metadata: &SvgMetadata<'_>) {
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
        dimensions.width, dimensions.height, dimensions.width, dimensions.height,
    );

    if let Some(title) = metadata.title {
        let _ = writeln!(out, "  <title>{}</title>", xml_escape(title));
    }
    if let Some(description) = metadata.description {
        let _ = writeln!(out, "  <desc>{}</desc>", xml_escape(description));
    }
}

/// Serialize a vector document into an SVG string.
///
/// Regions sharing the background's palette index are not emitted as
/// paths — the background `<rect>` already paints the full canvas in
/// that color, and holes in overlying regions let it show through.
#[must_use]
pub fn to_svg(document: &VectorDocument, metadata: &SvgMetadata<'_>) -> String {
    let mut out = String::new();

    write_svg_preamble(&mut out, document.dimensions, metadata);

    let background = document.palette.entry(document.background_index);
    let _ = writeln!(
        out,
        r#"  <rect width="{}" height="{}" fill="{}"/>"#,
        document.dimensions.width,
        document.dimensions.height,
        background.hex(),
    );

    for region in &document.regions {
        if region.palette_index == document.background_index {
            continue;
        }
        let fill = document.palette.entry(region.palette_index).hex();
        let d = build_path_data(&region.path);
        let _ = writeln!(
            out,
            r#"  <path fill="{fill}" fill-rule="nonzero" d="{d}"/>"#,
        );
    }

    if let (Some(mask), Some(opacity)) = (&document.edge_mask, document.edge_overlay_opacity) {
        if let Some(d) = edge_overlay_path_data(mask) {
            let _ = writeln!(
                out,
                r##"  <path stroke="#000" stroke-width="0.5" fill="none" opacity="{}" d="{d}"/>"##,
                fmt_coord(f64::from(opacity)),
            );
        }
    }

    let _ = writeln!(out, "</svg>");

    out
}

/// Build the `d` attribute for the edge overlay: one subpath per
/// horizontal run of edge pixels, stroked through the pixel centers.
///
/// Each subpath is closed with `Z`; retracing a straight segment is
/// invisible under a butt-capped stroke and keeps every emitted path
/// closed. Runs shorter than 2 pixels are noise and are skipped.
/// Returns `None` when no run qualifies.
fn edge_overlay_path_data(mask: &GrayImage) -> Option<String> {
    let (width, height) = mask.dimensions();
    let raw = mask.as_raw();
    let w = width as usize;

    let mut d = String::new();
    for y in 0..height as usize {
        let row = &raw[y * w..(y + 1) * w];
        let center_y = y as f64 + 0.5;
        let mut x = 0usize;
        while x < w {
            if row[x] == 0 {
                x += 1;
                continue;
            }
            let start = x;
            while x < w && row[x] != 0 {
                x += 1;
            }
            if x - start < 2 {
                continue;
            }
            if !d.is_empty() {
                d.push(' ');
            }
            let _ = write!(
                d,
                "M {} {} L {} {} Z",
                fmt_coord(start as f64),
                fmt_coord(center_y),
                fmt_coord(x as f64),
                fmt_coord(center_y),
            );
        }
    }

    if d.is_empty() { None } else { Some(d) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colortrace_pipeline::{Palette, PaletteEntry, Point, RegionPath, Warning};

    use super::*;

    fn entry(rgb: [u8; 3]) -> PaletteEntry {
        PaletteEntry {
            rgb,
            lab: colortrace_pipeline::color::srgb_to_lab(rgb),
        }
    }

    fn square_path(x: f64, y: f64, size: f64) -> VectorPath {
        VectorPath::new(vec![
            PathCommand::MoveTo(Point::new(x, y)),
            PathCommand::LineTo(Point::new(x, y + size)),
            PathCommand::LineTo(Point::new(x + size, y + size)),
            PathCommand::LineTo(Point::new(x + size, y)),
            PathCommand::Close,
        ])
    }

    fn two_region_document() -> VectorDocument {
        VectorDocument {
            dimensions: Dimensions {
                width: 100,
                height: 80,
            },
            palette: Palette::new(vec![entry([255, 0, 0]), entry([0, 255, 0])]),
            background_index: 0,
            regions: vec![
                RegionPath {
                    palette_index: 0,
                    pixel_count: 6000,
                    path: square_path(0.0, 0.0, 80.0),
                },
                RegionPath {
                    palette_index: 1,
                    pixel_count: 2000,
                    path: square_path(10.0, 10.0, 40.0),
                },
            ],
            edge_mask: None,
            edge_overlay_opacity: None,
            warnings: Vec::new(),
        }
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    // --- Coordinate formatting ---

    #[test]
    fn integral_coordinates_drop_the_decimal_point() {
        assert_eq!(fmt_coord(5.0), "5");
        assert_eq!(fmt_coord(120.0), "120");
        assert_eq!(fmt_coord(0.0), "0");
    }

    #[test]
    fn trailing_zeros_are_stripped() {
        assert_eq!(fmt_coord(12.5), "12.5");
        assert_eq!(fmt_coord(12.50), "12.5");
        assert_eq!(fmt_coord(3.25), "3.25");
    }

    #[test]
    fn coordinates_round_to_two_fractional_digits() {
        assert_eq!(fmt_coord(1.0 / 3.0), "0.33");
        assert_eq!(fmt_coord(2.0 / 3.0), "0.67");
        assert_eq!(fmt_coord(0.999), "1");
    }

    #[test]
    fn negative_zero_is_normalized() {
        assert_eq!(fmt_coord(-0.001), "0");
    }

    // --- Path data ---

    #[test]
    fn path_data_uses_absolute_commands() {
        let path = VectorPath::new(vec![
            PathCommand::MoveTo(Point::new(1.0, 2.0)),
            PathCommand::LineTo(Point::new(3.0, 4.0)),
            PathCommand::QuadTo(Point::new(5.0, 6.0), Point::new(7.5, 8.0)),
            PathCommand::Close,
        ]);
        assert_eq!(build_path_data(&path), "M 1 2 L 3 4 Q 5 6 7.5 8 Z");
    }

    #[test]
    fn empty_path_produces_empty_data() {
        assert_eq!(build_path_data(&VectorPath::new(vec![])), "");
    }

    // --- Document structure ---

    #[test]
    fn svg_has_declaration_namespace_and_closing_tag() {
        let svg = to_svg(&two_region_document(), &no_meta());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn dimensions_and_viewbox_match_document() {
        let svg = to_svg(&two_region_document(), &no_meta());
        assert!(svg.contains(r#"width="100" height="80""#));
        assert!(svg.contains(r#"viewBox="0 0 100 80""#));
    }

    #[test]
    fn background_rect_uses_background_palette_color() {
        let svg = to_svg(&two_region_document(), &no_meta());
        assert!(svg.contains(r##"<rect width="100" height="80" fill="#ff0000"/>"##));
    }

    #[test]
    fn background_rect_precedes_all_paths() {
        let svg = to_svg(&two_region_document(), &no_meta());
        let rect = svg.find("<rect").unwrap();
        let path = svg.find("<path").unwrap();
        assert!(rect < path);
    }

    #[test]
    fn background_colored_regions_are_not_emitted_as_paths() {
        let svg = to_svg(&two_region_document(), &no_meta());
        // Only the green region becomes a path; the red full-canvas
        // region is the rect.
        assert_eq!(svg.matches("<path").count(), 1);
        assert!(svg.contains(r##"fill="#00ff00""##));
    }

    #[test]
    fn paths_carry_nonzero_fill_rule_and_close() {
        let svg = to_svg(&two_region_document(), &no_meta());
        assert!(svg.contains(r#"fill-rule="nonzero""#));
        for line in svg.lines().filter(|l| l.contains("<path")) {
            let d_start = line.find(r#"d=""#).unwrap() + 3;
            let d_end = line[d_start..].find('"').unwrap() + d_start;
            assert!(
                line[d_start..d_end].trim_end().ends_with('Z'),
                "path data does not end with Z: {line}",
            );
        }
    }

    #[test]
    fn serialization_is_deterministic() {
        let document = two_region_document();
        assert_eq!(to_svg(&document, &no_meta()), to_svg(&document, &no_meta()));
    }

    // --- Metadata ---

    #[test]
    fn title_and_desc_are_emitted_and_escaped() {
        let meta = SvgMetadata {
            title: Some("poster <draft>"),
            description: Some("k=32 & tolerance=2"),
        };
        let svg = to_svg(&two_region_document(), &meta);
        assert!(svg.contains("  <title>poster &lt;draft&gt;</title>"));
        assert!(svg.contains("  <desc>k=32 &amp; tolerance=2</desc>"));
    }

    #[test]
    fn metadata_omitted_when_absent() {
        let svg = to_svg(&two_region_document(), &no_meta());
        assert!(!svg.contains("<title>"));
        assert!(!svg.contains("<desc>"));
    }

    #[test]
    fn xml_escape_handles_all_special_chars() {
        assert_eq!(xml_escape("&<>\"'"), "&amp;&lt;&gt;&quot;&apos;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    // --- Edge overlay ---

    fn mask_with_row_run(width: u32, height: u32, y: u32, x0: u32, x1: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for x in x0..x1 {
            mask.put_pixel(x, y, image::Luma([255]));
        }
        mask
    }

    #[test]
    fn edge_overlay_strokes_row_runs() {
        let mut document = two_region_document();
        document.edge_mask = Some(mask_with_row_run(100, 80, 4, 10, 20));
        document.edge_overlay_opacity = Some(0.4);
        let svg = to_svg(&document, &no_meta());
        assert!(svg.contains(r##"stroke="#000" stroke-width="0.5" fill="none" opacity="0.4""##));
        assert!(svg.contains("M 10 4.5 L 20 4.5 Z"));
    }

    #[test]
    fn edge_overlay_requires_opacity() {
        let mut document = two_region_document();
        document.edge_mask = Some(mask_with_row_run(100, 80, 4, 10, 20));
        document.edge_overlay_opacity = None;
        let svg = to_svg(&document, &no_meta());
        assert!(!svg.contains(r##"stroke="#000""##));
    }

    #[test]
    fn single_pixel_runs_are_skipped() {
        let mut document = two_region_document();
        document.edge_mask = Some(mask_with_row_run(100, 80, 4, 10, 11));
        document.edge_overlay_opacity = Some(1.0);
        let svg = to_svg(&document, &no_meta());
        assert!(!svg.contains(r##"stroke="#000""##));
    }

    #[test]
    fn warnings_do_not_change_the_svg() {
        let mut document = two_region_document();
        let plain = to_svg(&document, &no_meta());
        document.warnings.push(Warning::RegionBudgetExceeded {
            regions: 200_000,
            raised_min_region_pixels: 64,
        });
        assert_eq!(to_svg(&document, &no_meta()), plain);
    }
}
