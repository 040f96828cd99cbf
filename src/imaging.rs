//! Pixel-buffer plumbing shared by every stage: decoding, resizing and
//! sampling under a rotation about an arbitrary point.
//!
//! Coordinates are image coordinates (origin top-left, y down). A positive
//! angle turns content clockwise as seen on screen, which matches how a clock
//! hand advances. No axis flips happen anywhere in here.

use std::path::Path;

use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image as FirImage,
};
use image::RgbaImage;
use rayon::prelude::*;
use thiserror::Error;

use crate::types::{Image, Mask};

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    Empty,
    #[error("resize failed: {0}")]
    Resize(String),
}

pub fn decode(bytes: &[u8]) -> Result<Image, ImagingError> {
    let decoded = image::load_from_memory(bytes)?.to_rgba8();
    from_rgba_image(decoded)
}

pub fn open(path: &Path) -> Result<Image, ImagingError> {
    let decoded = image::open(path)?.to_rgba8();
    from_rgba_image(decoded)
}

fn from_rgba_image(decoded: RgbaImage) -> Result<Image, ImagingError> {
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ImagingError::Empty);
    }
    Image::from_rgba(width, height, decoded.into_raw()).ok_or(ImagingError::Empty)
}

pub fn to_rgba_image(image: &Image) -> Option<RgbaImage> {
    RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
}

fn resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::CatmullRom))
}

fn resize_plane(
    src: Vec<u8>,
    src_size: (u32, u32),
    dst_size: (u32, u32),
    pixel_type: PixelType,
) -> Result<Vec<u8>, ImagingError> {
    if src_size.0 == 0 || src_size.1 == 0 || dst_size.0 == 0 || dst_size.1 == 0 {
        return Err(ImagingError::Empty);
    }
    if src_size == dst_size {
        return Ok(src);
    }

    let src_image = FirImage::from_vec_u8(src_size.0, src_size.1, src, pixel_type)
        .map_err(|err| ImagingError::Resize(err.to_string()))?;
    let mut dst_image = FirImage::new(dst_size.0, dst_size.1, pixel_type);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &resize_options())
        .map_err(|err| ImagingError::Resize(err.to_string()))?;

    Ok(dst_image.into_vec())
}

/// High-quality (Catmull-Rom) resample to an exact size.
pub fn resize(image: &Image, width: u32, height: u32) -> Result<Image, ImagingError> {
    let rgba = resize_plane(
        image.rgba.clone(),
        image.dimensions(),
        (width, height),
        PixelType::U8x4,
    )?;
    Image::from_rgba(width, height, rgba).ok_or_else(|| {
        ImagingError::Resize("resizer returned a buffer of unexpected length".into())
    })
}

pub fn resize_mask(mask: &Mask, width: u32, height: u32) -> Result<Mask, ImagingError> {
    let coverage = resize_plane(
        mask.coverage.clone(),
        (mask.width, mask.height),
        (width, height),
        PixelType::U8,
    )?;
    Mask::from_luma(width, height, coverage).ok_or_else(|| {
        ImagingError::Resize("resizer returned a buffer of unexpected length".into())
    })
}

/// Size that fits inside `max_side` on the longest edge, preserving aspect.
/// Images already within bounds keep their size.
pub fn bounded_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width, height);
    }
    let scale = max_side as f32 / longest as f32;
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}

/// Inverse mapping for a clockwise rotation by `angle` about `center`: given a
/// destination pixel, where in the source it comes from.
#[inline]
pub fn source_position(
    dst: (f32, f32),
    center: (f32, f32),
    cos: f32,
    sin: f32,
) -> (f32, f32) {
    let ex = dst.0 - center.0;
    let ey = dst.1 - center.1;
    (
        center.0 + cos * ex + sin * ey,
        center.1 - sin * ex + cos * ey,
    )
}

/// Bilinear sample at a continuous position where pixel centres sit at +0.5.
/// Returns `None` outside the image.
pub fn sample_bilinear(image: &Image, x: f32, y: f32) -> Option<[f32; 4]> {
    let fx = x - 0.5;
    let fy = y - 0.5;
    let max_x = image.width as f32 - 1.0;
    let max_y = image.height as f32 - 1.0;
    if fx < -0.5 || fy < -0.5 || fx > max_x + 0.5 || fy > max_y + 0.5 {
        return None;
    }
    Some(sample_clamped(image, fx, fy))
}

/// Bilinear sample with coordinates clamped to the image edge.
pub fn sample_edge_clamped(image: &Image, x: f32, y: f32) -> [f32; 4] {
    sample_clamped(image, x - 0.5, y - 0.5)
}

fn sample_clamped(image: &Image, fx: f32, fy: f32) -> [f32; 4] {
    let max_x = image.width as f32 - 1.0;
    let max_y = image.height as f32 - 1.0;
    let fx = fx.clamp(0.0, max_x);
    let fy = fy.clamp(0.0, max_y);

    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(image.width - 1);
    let y1 = (y0 + 1).min(image.height - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let p00 = image.pixel(x0, y0);
    let p10 = image.pixel(x1, y0);
    let p01 = image.pixel(x0, y1);
    let p11 = image.pixel(x1, y1);

    let mut out = [0.0f32; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - tx) + p10[c] as f32 * tx;
        let bottom = p01[c] as f32 * (1.0 - tx) + p11[c] as f32 * tx;
        out[c] = top * (1.0 - ty) + bottom * ty;
    }
    out
}

/// Rotates the whole image clockwise by `angle` radians about `center`.
/// Areas uncovered by the rotation repeat the nearest edge pixel.
pub fn rotate_about(image: &Image, center: (f32, f32), angle: f32) -> Image {
    if image.is_empty() {
        return image.clone();
    }
    let (sin, cos) = angle.sin_cos();
    let row_len = image.width as usize * 4;
    let mut rgba = vec![0u8; image.rgba.len()];

    rgba.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                let (sx, sy) =
                    source_position((x as f32 + 0.5, y as f32 + 0.5), center, cos, sin);
                let px = sample_edge_clamped(image, sx, sy);
                for c in 0..4 {
                    dst[c] = px[c].round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    Image {
        rgba,
        width: image.width,
        height: image.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_size_caps_longest_side() {
        assert_eq!(bounded_size(1600, 1200, 800), (800, 600));
        assert_eq!(bounded_size(600, 1000, 800), (480, 800));
        assert_eq!(bounded_size(640, 480, 800), (640, 480));
    }

    #[test]
    fn quarter_turn_moves_top_to_right() {
        // A point straight above the centre lands to its right after a
        // clockwise quarter turn, so the source of the right point is above.
        let (sin, cos) = std::f32::consts::FRAC_PI_2.sin_cos();
        let (sx, sy) = source_position((15.0, 10.0), (10.0, 10.0), cos, sin);
        assert!((sx - 10.0).abs() < 1e-4);
        assert!((sy - 5.0).abs() < 1e-4);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let mut image = Image::filled(5, 4, [10, 20, 30, 255]);
        image.put_pixel(2, 1, [200, 100, 50, 255]);
        let rotated = rotate_about(&image, (2.5, 2.0), 0.0);
        assert_eq!(rotated, image);
    }

    #[test]
    fn resize_produces_requested_dimensions() {
        let image = Image::filled(40, 20, [90, 90, 90, 255]);
        let resized = resize(&image, 10, 5).unwrap();
        assert_eq!(resized.dimensions(), (10, 5));
        assert!(resized.rgba.chunks_exact(4).all(|px| px[0].abs_diff(90) <= 1));

        let mask = Mask::from_luma(4, 4, vec![255; 16]).unwrap();
        let small = resize_mask(&mask, 2, 2).unwrap();
        assert_eq!(small.coverage.len(), 4);
    }

    #[test]
    fn resize_rejects_empty_target() {
        let image = Image::filled(4, 4, [0, 0, 0, 255]);
        assert!(matches!(resize(&image, 0, 4), Err(ImagingError::Empty)));
    }

    #[test]
    fn sampling_outside_returns_none() {
        let image = Image::filled(3, 3, [1, 2, 3, 255]);
        assert!(sample_bilinear(&image, -2.0, 1.0).is_none());
        let px = sample_bilinear(&image, 1.5, 1.5).unwrap();
        assert!((px[0] - 1.0).abs() < 1e-4);
    }
}
