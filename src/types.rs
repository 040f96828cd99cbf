use serde::{Deserialize, Serialize};

use crate::error::{DialError, Result};

/// Coverage values strictly above this mark a pixel as "hand present".
pub const MASK_THRESHOLD: u8 = 128;

/// Owned RGBA8 pixel buffer. Three-channel sources are expanded with an opaque
/// alpha on construction so every stage works on the same layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Image {
    pub fn filled(width: u32, height: u32, px: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut rgba = Vec::with_capacity(count * 4);
        for _ in 0..count {
            rgba.extend_from_slice(&px);
        }
        Self {
            rgba,
            width,
            height,
        }
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            rgba,
            width,
            height,
        })
    }

    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Option<Self> {
        if rgb.len() != width as usize * height as usize * 3 {
            return None;
        }
        let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
        }
        Some(Self {
            rgba,
            width,
            height,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let i = self.offset(x, y);
        self.rgba[i..i + 4].copy_from_slice(&px);
    }

    pub(crate) fn has_transparency(&self) -> bool {
        self.rgba.chunks_exact(4).any(|px| px[3] < 255)
    }
}

/// Single-channel hand coverage map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub coverage: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Mask {
    pub fn from_luma(width: u32, height: u32, coverage: Vec<u8>) -> Option<Self> {
        if coverage.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            coverage,
            width,
            height,
        })
    }

    /// Alpha-channel cutouts use their alpha; fully opaque images are read as a
    /// luminance mask (white = hand).
    pub fn from_image(image: &Image) -> Self {
        let coverage = if image.has_transparency() {
            image.rgba.chunks_exact(4).map(|px| px[3]).collect()
        } else {
            image
                .rgba
                .chunks_exact(4)
                .map(|px| (luminance(px) * 255.0).round() as u8)
                .collect()
        };
        Self {
            coverage,
            width: image.width,
            height: image.height,
        }
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.coverage[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.value(x, y) > MASK_THRESHOLD
    }

    pub fn set_count(&self) -> usize {
        self.coverage.iter().filter(|&&v| v > MASK_THRESHOLD).count()
    }

    /// Brightest-pixel-wins union. All masks must share dimensions.
    pub fn union(masks: &[&Mask]) -> Option<Mask> {
        let first = masks.first()?;
        if masks
            .iter()
            .any(|m| m.width != first.width || m.height != first.height)
        {
            return None;
        }
        let mut coverage = first.coverage.clone();
        for mask in &masks[1..] {
            for (dst, &src) in coverage.iter_mut().zip(&mask.coverage) {
                *dst = (*dst).max(src);
            }
        }
        Some(Mask {
            coverage,
            width: first.width,
            height: first.height,
        })
    }
}

/// Luminance of an RGBA pixel on [0,1]-normalized channels.
#[inline]
pub fn luminance(px: &[u8]) -> f32 {
    (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0
}

/// Watch-face centre, normalized to the image size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PivotPoint {
    pub x: f32,
    pub y: f32,
}

impl PivotPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    pub fn center() -> Self {
        Self { x: 0.5, y: 0.5 }
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Clock reading shown in the reference photo. Only built through
/// [`ReferenceTime::new`], deserialization included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClockReading")]
pub struct ReferenceTime {
    hour: u8,
    minute: u8,
    second: u8,
}

#[derive(Deserialize)]
struct ClockReading {
    hour: u8,
    minute: u8,
    #[serde(default)]
    second: u8,
}

impl TryFrom<ClockReading> for ReferenceTime {
    type Error = DialError;

    fn try_from(raw: ClockReading) -> Result<Self> {
        Self::new(raw.hour, raw.minute, raw.second)
    }
}

impl ReferenceTime {
    /// Accepts 24-hour input and folds it onto the 12-hour dial.
    pub fn new(hour: u8, minute: u8, second: u8) -> Result<Self> {
        if hour > 23 || minute > 59 || second > 59 {
            return Err(DialError::MissingInputData(format!(
                "reference time {hour}:{minute:02}:{second:02} is not a valid clock reading"
            )));
        }
        Ok(Self {
            hour: hour % 12,
            minute,
            second,
        })
    }

    /// Hour on the 12-hour dial, 0 for twelve o'clock.
    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }
}

#[derive(Clone, Debug)]
pub struct TrainingSample {
    pub image: Image,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub hour: u8,
    pub minute: u8,
    /// Seconds are never classified; always 0.
    pub second: u8,
    pub confidence: f32,
}

impl Prediction {
    pub fn display_text(&self) -> String {
        let hour = if self.hour == 0 { 12 } else { self.hour };
        format!(
            "{}:{:02} ({:.0}%)",
            hour,
            self.minute,
            self.confidence * 100.0
        )
    }
}
