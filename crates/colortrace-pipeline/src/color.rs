//! Color space conversions for quantization and edge detection.
//!
//! Wraps the `palette` crate for sRGB <-> CIE L*a*b* (D65 white point)
//! so the rest of the pipeline works with plain `[f32; 3]` component
//! arrays. Linear RGB coordinates are scaled to 0-255 so distance
//! thresholds (notably the k-means convergence epsilon) are comparable
//! between the two clustering spaces.

use palette::{IntoColor, Lab, LinSrgb, Srgb};

/// Convert an 8-bit sRGB color to CIE L*a*b* (D65).
///
/// L is in `[0, 100]`; a and b are roughly `[-128, 128]`.
#[must_use]
pub fn srgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let lab: Lab = Srgb::new(rgb[0], rgb[1], rgb[2]).into_linear().into_color();
    [lab.l, lab.a, lab.b]
}

/// Convert CIE L*a*b* (D65) back to 8-bit sRGB, clamping out-of-gamut
/// components.
#[must_use]
pub fn lab_to_srgb(lab: [f32; 3]) -> [u8; 3] {
    let lin: LinSrgb = Lab::new(lab[0], lab[1], lab[2]).into_color();
    let srgb: Srgb<f32> = Srgb::from_linear(LinSrgb::new(
        lin.red.clamp(0.0, 1.0),
        lin.green.clamp(0.0, 1.0),
        lin.blue.clamp(0.0, 1.0),
    ));
    let out = srgb.into_format::<u8>();
    [out.red, out.green, out.blue]
}

/// Convert an 8-bit sRGB color to linear RGB scaled to 0-255.
#[must_use]
pub fn srgb_to_linear255(rgb: [u8; 3]) -> [f32; 3] {
    let lin: LinSrgb = Srgb::new(rgb[0], rgb[1], rgb[2]).into_linear();
    [lin.red * 255.0, lin.green * 255.0, lin.blue * 255.0]
}

/// Convert 0-255-scaled linear RGB back to 8-bit sRGB.
#[must_use]
pub fn linear255_to_srgb(lin: [f32; 3]) -> [u8; 3] {
    let srgb: Srgb<f32> = Srgb::from_linear(LinSrgb::new(
        (lin[0] / 255.0).clamp(0.0, 1.0),
        (lin[1] / 255.0).clamp(0.0, 1.0),
        (lin[2] / 255.0).clamp(0.0, 1.0),
    ));
    let out = srgb.into_format::<u8>();
    [out.red, out.green, out.blue]
}

/// Rec. 709 luminance of a gamma-encoded sRGB color, in 0-255.
///
/// Matches the `image` crate's `to_luma8` weighting
/// (`0.2126 R + 0.7152 G + 0.0722 B` on the encoded components).
#[must_use]
pub fn rec709_luma(rgb: [u8; 3]) -> f32 {
    0.2126f32.mul_add(
        f32::from(rgb[0]),
        0.7152f32.mul_add(f32::from(rgb[1]), 0.0722 * f32::from(rgb[2])),
    )
}
