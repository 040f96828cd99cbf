use rand::Rng;

use crate::{config::AugmentConfig, imaging, types::Image};

/// Which perturbations were drawn for one image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Perturbation {
    pub brightness: Option<f32>,
    pub rotation: Option<f32>,
}

impl Perturbation {
    pub fn draw<R: Rng + ?Sized>(config: &AugmentConfig, rng: &mut R) -> Self {
        let brightness = rng
            .gen_bool(config.brightness_probability)
            .then(|| {
                let (lo, hi) = config.brightness_range;
                if lo < hi { rng.gen_range(lo..=hi) } else { lo }
            });
        let rotation = rng.gen_bool(config.rotation_probability).then(|| {
            if config.max_rotation > 0.0 {
                rng.gen_range(-config.max_rotation..=config.max_rotation)
            } else {
                0.0
            }
        });
        Self {
            brightness,
            rotation,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.brightness.is_none() && self.rotation.is_none()
    }

    /// Returns a new image; the input is left as is.
    pub fn apply(&self, image: &Image) -> Image {
        let mut out = match self.rotation {
            Some(angle) => {
                let center = (image.width as f32 / 2.0, image.height as f32 / 2.0);
                imaging::rotate_about(image, center, angle)
            }
            None => image.clone(),
        };
        if let Some(factor) = self.brightness {
            scale_brightness(&mut out, factor);
        }
        out
    }
}

/// Random brightness and camera-tilt jitter.
pub fn augment<R: Rng + ?Sized>(image: &Image, config: &AugmentConfig, rng: &mut R) -> Image {
    Perturbation::draw(config, rng).apply(image)
}

fn scale_brightness(image: &mut Image, factor: f32) {
    for px in image.rgba.chunks_exact_mut(4) {
        for c in &mut px[..3] {
            *c = (*c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn never() -> AugmentConfig {
        AugmentConfig {
            brightness_probability: 0.0,
            rotation_probability: 0.0,
            ..AugmentConfig::default()
        }
    }

    #[test]
    fn disabled_effects_leave_image_unchanged() {
        let image = Image::filled(8, 8, [120, 60, 30, 255]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(augment(&image, &never(), &mut rng), image);
    }

    #[test]
    fn brightness_factor_stays_in_range() {
        let config = AugmentConfig {
            brightness_probability: 1.0,
            rotation_probability: 0.0,
            ..AugmentConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let p = Perturbation::draw(&config, &mut rng);
            let factor = p.brightness.unwrap();
            assert!((0.9..=1.1).contains(&factor));
            assert!(p.rotation.is_none());
        }
    }

    #[test]
    fn rotation_angle_stays_small() {
        let config = AugmentConfig {
            brightness_probability: 0.0,
            rotation_probability: 1.0,
            ..AugmentConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let angle = Perturbation::draw(&config, &mut rng).rotation.unwrap();
            assert!(angle.abs() <= 0.05);
        }
    }

    #[test]
    fn brightness_scales_colour_but_not_alpha() {
        let image = Image::filled(2, 2, [100, 200, 250, 255]);
        let p = Perturbation {
            brightness: Some(1.1),
            rotation: None,
        };
        let out = p.apply(&image);
        assert_eq!(out.pixel(0, 0), [110, 220, 255, 255]);
    }

    #[test]
    fn rotation_keeps_dimensions() {
        let image = Image::filled(10, 6, [10, 10, 10, 255]);
        let p = Perturbation {
            brightness: None,
            rotation: Some(0.04),
        };
        let out = p.apply(&image);
        assert_eq!(out.dimensions(), (10, 6));
        assert_eq!(out.pixel(5, 3), [10, 10, 10, 255]);
    }
}
