//! Decoding and pixel-level preparation before quantization.
//!
//! Accepts raw image bytes (PNG or JPEG per the caller's format hint)
//! and produces a clean RGB buffer: alpha composited onto opaque
//! white, optionally downscaled to a maximum dimension, lightly
//! blurred to suppress compression noise, and contrast-stretched.

use image::GrayImage;

use crate::types::{CoreError, Dimensions, ImageFormatHint, ResizeFilter, RgbImage};

/// Smallest side length the pipeline accepts. The 3x3 Sobel kernel
/// needs a one-pixel interior, and a smaller canvas has no meaningful
/// regions to trace.
pub const MIN_DIMENSION: u32 = 3;

/// Decode raw bytes into an RGB image, compositing alpha onto white.
///
/// The header is inspected before full decode so `max_alloc_bytes` can
/// reject oversized inputs without first allocating their pixel
/// buffers.
///
/// # Errors
///
/// Returns [`CoreError::DecodeFailed`] for malformed or unsupported
/// data, [`CoreError::ResourceExhausted`] when the decoded RGBA buffer
/// would exceed `max_alloc_bytes`, and [`CoreError::InvalidDimensions`]
/// when either decoded side is below [`MIN_DIMENSION`].
pub fn decode(
    bytes: &[u8],
    format: ImageFormatHint,
    max_alloc_bytes: Option<u64>,
) -> Result<RgbImage, CoreError> {
    let reader = image::ImageReader::with_format(
        std::io::Cursor::new(bytes),
        format.to_image_format(),
    );
    let (width, height) = reader.into_dimensions()?;

    if let Some(limit) = max_alloc_bytes {
        let required = u64::from(width) * u64::from(height) * 4;
        if required > limit {
            return Err(CoreError::ResourceExhausted { required, limit });
        }
    }
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(CoreError::InvalidDimensions { width, height });
    }

    let dynamic = image::load_from_memory_with_format(bytes, format.to_image_format())?;
    Ok(composite_onto_white(dynamic))
}

/// Flatten any alpha channel onto an opaque white background.
fn composite_onto_white(dynamic: image::DynamicImage) -> RgbImage {
    if !dynamic.color().has_alpha() {
        return dynamic.to_rgb8();
    }

    let rgba = dynamic.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let alpha = u32::from(src.0[3]);
        for c in 0..3 {
            let blended = (u32::from(src.0[c]) * alpha + 255 * (255 - alpha) + 127) / 255;
            #[allow(clippy::cast_possible_truncation)]
            {
                dst.0[c] = blended as u8;
            }
        }
    }
    out
}

/// Downscale so the longer side does not exceed `max_dimension`,
/// preserving aspect ratio.
///
/// Returns the (possibly unchanged) image and whether a resize was
/// applied. Images already within the bound are returned as-is.
#[must_use]
pub fn downscale(image: RgbImage, max_dimension: u32, filter: ResizeFilter) -> (RgbImage, bool) {
    let (width, height) = image.dimensions();
    let longer = width.max(height);
    if longer <= max_dimension {
        return (image, false);
    }

    let scale = f64::from(max_dimension) / f64::from(longer);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let new_width = ((f64::from(width) * scale).round() as u32).max(1);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let new_height = ((f64::from(height) * scale).round() as u32).max(1);

    let resized = image::imageops::resize(&image, new_width, new_height, filter.to_image_filter());
    (resized, true)
}

/// Apply Gaussian blur to an RGB image by blurring each channel
/// independently.
///
/// `imageproc::filter::gaussian_blur_f32` only accepts single-channel
/// images, so the buffer is split into three planes, blurred, and
/// reassembled; Gaussian blur is linear and per-channel, so the result
/// matches blurring in color. Non-positive sigma returns the image
/// unchanged.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Linear contrast stretch about the 128 midpoint.
///
/// `boost` of 1.0 is the identity and skips the pass entirely; values
/// above 1.0 push samples away from 128, values below pull them in.
pub fn contrast_stretch(image: &mut RgbImage, boost: f32) {
    #[allow(clippy::float_cmp)]
    if boost == 1.0 {
        return;
    }

    for pixel in image.pixels_mut() {
        for c in 0..3 {
            let stretched = (f32::from(pixel.0[c]) - 128.0).mul_add(boost, 128.0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                pixel.0[c] = stretched.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Dimensions of an RGB buffer as a [`Dimensions`] value.
#[must_use]
pub fn dimensions_of(image: &RgbImage) -> Dimensions {
    Dimensions {
        width: image.width(),
        height: image.height(),
    }
}
