use rayon::prelude::*;
use thiserror::Error;

use crate::{
    geometry::HandRotations,
    imaging,
    types::{Image, MASK_THRESHOLD, Mask, PivotPoint},
};

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("{layer} layer is {got:?} but the background is {expected:?}")]
    SizeMismatch {
        layer: &'static str,
        got: (u32, u32),
        expected: (u32, u32),
    },
}

/// One hand cut out of the reference photo: its colours premultiplied by the
/// mask coverage, transparent everywhere else.
#[derive(Clone, Debug)]
pub struct HandLayer {
    premultiplied: Image,
}

impl HandLayer {
    pub fn cutout(reference: &Image, mask: &Mask) -> Option<Self> {
        if reference.dimensions() != (mask.width, mask.height) {
            return None;
        }
        let mut rgba = Vec::with_capacity(reference.rgba.len());
        for (px, &coverage) in reference.rgba.chunks_exact(4).zip(&mask.coverage) {
            let alpha = if coverage > MASK_THRESHOLD { coverage } else { 0 };
            let a = alpha as u16;
            rgba.extend_from_slice(&[
                ((px[0] as u16 * a + 127) / 255) as u8,
                ((px[1] as u16 * a + 127) / 255) as u8,
                ((px[2] as u16 * a + 127) / 255) as u8,
                alpha,
            ]);
        }
        Some(Self {
            premultiplied: Image {
                rgba,
                width: reference.width,
                height: reference.height,
            },
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.premultiplied.dimensions()
    }
}

/// Draws the background, then the hour, minute and optional second layers,
/// each rotated about the pivot by its own angle.
pub fn composite(
    background: &Image,
    hour: &HandLayer,
    minute: &HandLayer,
    second: Option<&HandLayer>,
    pivot: PivotPoint,
    rotations: HandRotations,
) -> Result<Image, CompositeError> {
    let expected = background.dimensions();
    let layers = [
        ("hour", Some(hour), rotations.hour),
        ("minute", Some(minute), rotations.minute),
        ("second", second, rotations.second),
    ];
    for (name, layer, _) in &layers {
        if let Some(layer) = layer {
            if layer.dimensions() != expected {
                return Err(CompositeError::SizeMismatch {
                    layer: *name,
                    got: layer.dimensions(),
                    expected,
                });
            }
        }
    }

    let center = pivot.to_pixels(background.width, background.height);
    let mut out = background.clone();
    for (_, layer, angle) in layers {
        if let Some(layer) = layer {
            draw_rotated(&mut out, layer, center, angle);
        }
    }
    Ok(out)
}

fn draw_rotated(canvas: &mut Image, layer: &HandLayer, center: (f32, f32), angle: f32) {
    if canvas.is_empty() {
        return;
    }
    let (sin, cos) = angle.sin_cos();
    let row_len = canvas.width as usize * 4;
    let src = &layer.premultiplied;

    canvas
        .rgba
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                let (sx, sy) = imaging::source_position(
                    (x as f32 + 0.5, y as f32 + 0.5),
                    center,
                    cos,
                    sin,
                );
                let Some(px) = imaging::sample_bilinear(src, sx, sy) else {
                    continue;
                };
                let alpha = px[3] / 255.0;
                if alpha <= 0.0 {
                    continue;
                }
                for c in 0..3 {
                    let blended = px[c] + dst[c] as f32 * (1.0 - alpha);
                    dst[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
                let out_alpha = px[3] + dst[3] as f32 * (1.0 - alpha);
                dst[3] = out_alpha.round().clamp(0.0, 255.0) as u8;
            }
        });
}
