//! Removes the hands from the reference photo by copying, for every masked
//! pixel, the colour of the closest unmasked pixel.
//!
//! "Closest" is measured in Chebyshev rings: radius 1 first, then 2, and so on
//! up to a cap. Within a ring the first unmasked pixel in raster order wins.
//! This is a plain nearest-neighbour fill with no blending.

use rayon::prelude::*;
use thiserror::Error;

use crate::{
    error::DialError,
    imaging::{self, ImagingError},
    types::{Image, Mask},
};

#[derive(Debug, Error)]
pub enum InpaintError {
    #[error("reference image is empty")]
    EmptyReference,
    #[error("{what} is {mask:?}, which does not match the reference aspect {reference:?}")]
    AspectMismatch {
        what: &'static str,
        mask: (u32, u32),
        reference: (u32, u32),
    },
    #[error("failed to resize {what} to the working resolution: {source}")]
    Resize {
        what: &'static str,
        #[source]
        source: ImagingError,
    },
}

impl From<InpaintError> for DialError {
    fn from(err: InpaintError) -> Self {
        DialError::InpaintingFailed(err.to_string())
    }
}

/// Reference assets brought to the working resolution, plus the hand-free
/// plate derived from them.
#[derive(Clone, Debug)]
pub struct DialPlate {
    pub plate: Image,
    pub reference: Image,
    pub hour_mask: Mask,
    pub minute_mask: Mask,
    pub second_mask: Option<Mask>,
    /// Masked pixels with no unmasked source inside the ring cap.
    pub unfilled: usize,
}

pub fn inpaint(
    reference: &Image,
    hour_mask: &Mask,
    minute_mask: &Mask,
    second_mask: Option<&Mask>,
    working_max_side: u32,
    max_radius: u32,
) -> Result<DialPlate, InpaintError> {
    if reference.is_empty() {
        return Err(InpaintError::EmptyReference);
    }

    let reference_size = reference.dimensions();
    check_aspect(hour_mask, reference_size, "hour mask")?;
    check_aspect(minute_mask, reference_size, "minute mask")?;
    if let Some(mask) = second_mask {
        check_aspect(mask, reference_size, "second mask")?;
    }

    let (width, height) =
        imaging::bounded_size(reference.width, reference.height, working_max_side);
    let reference = imaging::resize(reference, width, height).map_err(|source| {
        InpaintError::Resize {
            what: "reference",
            source,
        }
    })?;
    let fit = |mask: &Mask, what: &'static str| {
        imaging::resize_mask(mask, width, height)
            .map_err(|source| InpaintError::Resize { what, source })
    };
    let hour_mask = fit(hour_mask, "hour mask")?;
    let minute_mask = fit(minute_mask, "minute mask")?;
    let second_mask = second_mask.map(|m| fit(m, "second mask")).transpose()?;

    let mut masks = vec![&hour_mask, &minute_mask];
    if let Some(second) = &second_mask {
        masks.push(second);
    }
    // Every mask was just resized to the same size, so the union exists.
    let combined = Mask::union(&masks).unwrap_or_else(|| hour_mask.clone());

    let (plate, unfilled) = fill_masked(&reference, &combined, max_radius);
    log::debug!(
        "inpainted {}x{} plate: {} masked pixels, {} unfilled",
        width,
        height,
        combined.set_count(),
        unfilled
    );

    Ok(DialPlate {
        plate,
        reference,
        hour_mask,
        minute_mask,
        second_mask,
        unfilled,
    })
}

/// Masks may be stored at another resolution than the reference, but scaled
/// to the reference width their height must land within one pixel of it.
fn check_aspect(
    mask: &Mask,
    reference: (u32, u32),
    what: &'static str,
) -> Result<(), InpaintError> {
    let (mw, mh) = (mask.width, mask.height);
    let (rw, rh) = reference;
    let mismatch = if mw == 0 || mh == 0 {
        false
    } else {
        let expected_height = (mw as f64 * rh as f64 / rw as f64).round();
        (expected_height - mh as f64).abs() > 1.0
    };
    if mismatch {
        return Err(InpaintError::AspectMismatch {
            what,
            mask: (mw, mh),
            reference,
        });
    }
    Ok(())
}

/// Fills every set pixel of `mask` from the nearest unset pixel of `image`.
/// The search reads only the original buffer, so rows are filled in parallel
/// with the same result as a sequential pass.
pub fn fill_masked(image: &Image, mask: &Mask, max_radius: u32) -> (Image, usize) {
    let mut out = image.clone();
    if image.is_empty() || mask.width != image.width || mask.height != image.height {
        return (out, 0);
    }

    let row_len = image.width as usize * 4;
    let unfilled: usize = out
        .rgba
        .par_chunks_mut(row_len)
        .enumerate()
        .map(|(y, row)| {
            let y = y as u32;
            let mut missed = 0usize;
            for x in 0..image.width {
                if !mask.is_set(x, y) {
                    continue;
                }
                match nearest_unmasked(mask, x, y, max_radius) {
                    Some((sx, sy)) => {
                        let i = x as usize * 4;
                        row[i..i + 4].copy_from_slice(&image.pixel(sx, sy));
                    }
                    None => missed += 1,
                }
            }
            missed
        })
        .sum();

    (out, unfilled)
}

fn nearest_unmasked(mask: &Mask, px: u32, py: u32, max_radius: u32) -> Option<(u32, u32)> {
    let w = mask.width as i64;
    let h = mask.height as i64;
    let (px, py) = (px as i64, py as i64);

    let probe = |x: i64, y: i64| -> Option<(u32, u32)> {
        if x < 0 || x >= w || mask.is_set(x as u32, y as u32) {
            None
        } else {
            Some((x as u32, y as u32))
        }
    };

    for r in 1..=max_radius as i64 {
        for dy in -r..=r {
            let y = py + dy;
            if y < 0 || y >= h {
                continue;
            }
            if dy.abs() == r {
                for dx in -r..=r {
                    if let Some(hit) = probe(px + dx, y) {
                        return Some(hit);
                    }
                }
            } else if let Some(hit) = probe(px - r, y).or_else(|| probe(px + r, y)) {
                return Some(hit);
            }
        }
    }
    None
}
