//! Joint image/mask transforms and encoder preprocessing.
//!
//! Geometric augmentations must be label-consistent: the same spatial
//! operation is applied to an image and its mask in a single call.
//! Photometric normalization is a separate, deterministic step applied
//! to the image only, after any geometric transform.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::dataset::{ImageArray, MaskArray};

/// A transform applied jointly to an image and its mask.
pub trait SampleTransform: Send + Sync {
    fn apply(&self, image: ImageArray, mask: MaskArray) -> (ImageArray, MaskArray);
}

/// Available geometric augmentation methods.
///
/// All of these are exact on raw pixel buffers, so mask labels survive
/// without interpolation artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AugmentationMethod {
    /// Mirror along the vertical axis.
    HorizontalFlip,
    /// Mirror along the horizontal axis.
    VerticalFlip,
    /// Quarter-turn counter-clockwise; swaps height and width.
    Rotate90,
}

/// Configuration for [`GeometricAugmentor`].
#[derive(Debug, Clone)]
pub struct AugmentationConfig {
    /// Enabled augmentation methods, each drawn independently per sample.
    pub enabled_methods: Vec<AugmentationMethod>,
    /// Probability of applying each enabled method.
    pub probability: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled_methods: vec![
                AugmentationMethod::HorizontalFlip,
                AugmentationMethod::VerticalFlip,
                AugmentationMethod::Rotate90,
            ],
            probability: 0.5,
        }
    }
}

/// Seeded label-consistent geometric augmentor.
///
/// Each call derives a fresh RNG from the stored seed and a call
/// counter, so augmentation decisions vary per sample while the whole
/// sequence stays deterministic for a given seed.
pub struct GeometricAugmentor {
    config: AugmentationConfig,
    seed: u64,
    calls: AtomicU64,
}

impl GeometricAugmentor {
    pub fn new(config: AugmentationConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            calls: AtomicU64::new(0),
        }
    }

    /// Augmentor that always flips horizontally. Useful for tests and
    /// deterministic test-time augmentation.
    pub fn always_flip_horizontal() -> Self {
        Self::new(
            AugmentationConfig {
                enabled_methods: vec![AugmentationMethod::HorizontalFlip],
                probability: 1.0,
            },
            0,
        )
    }

    fn create_rng(&self) -> StdRng {
        let entropy = self.calls.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(self.seed.wrapping_add(entropy))
    }
}

impl SampleTransform for GeometricAugmentor {
    fn apply(&self, mut image: ImageArray, mut mask: MaskArray) -> (ImageArray, MaskArray) {
        let mut rng = self.create_rng();

        for method in &self.config.enabled_methods {
            if !rng.random_bool(self.config.probability) {
                continue;
            }
            (image, mask) = match method {
                AugmentationMethod::HorizontalFlip => (flip_image_h(&image), flip_mask_h(&mask)),
                AugmentationMethod::VerticalFlip => (flip_image_v(&image), flip_mask_v(&mask)),
                AugmentationMethod::Rotate90 => (rotate_image_90(&image), rotate_mask_90(&mask)),
            };
        }

        (image, mask)
    }
}

/// Per-channel affine normalization `(x - mean) / std`.
///
/// Deterministic, so it is safe to apply after any geometric transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    mean: [f32; 3],
    std: [f32; 3],
}

impl Normalizer {
    pub const fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    /// ImageNet statistics, matching the pretrained encoder weights.
    pub const fn imagenet() -> Self {
        Self::new([0.485, 0.456, 0.406], [0.229, 0.224, 0.225])
    }

    pub fn apply(&self, image: ImageArray) -> ImageArray {
        let pixels = image
            .pixels
            .chunks_exact(3)
            .flat_map(|rgb| {
                [
                    (rgb[0] - self.mean[0]) / self.std[0],
                    (rgb[1] - self.mean[1]) / self.std[1],
                    (rgb[2] - self.mean[2]) / self.std[2],
                ]
            })
            .collect();

        ImageArray {
            pixels,
            height: image.height,
            width: image.width,
        }
    }
}

fn flip_image_h(image: &ImageArray) -> ImageArray {
    let (h, w) = (image.height, image.width);
    let mut pixels = vec![0.0; image.pixels.len()];
    for y in 0..h {
        for x in 0..w {
            let src = (y * w + x) * 3;
            let dst = (y * w + (w - 1 - x)) * 3;
            pixels[dst..dst + 3].copy_from_slice(&image.pixels[src..src + 3]);
        }
    }
    ImageArray {
        pixels,
        height: h,
        width: w,
    }
}

fn flip_image_v(image: &ImageArray) -> ImageArray {
    let (h, w) = (image.height, image.width);
    let mut pixels = vec![0.0; image.pixels.len()];
    for y in 0..h {
        let src = y * w * 3;
        let dst = (h - 1 - y) * w * 3;
        pixels[dst..dst + w * 3].copy_from_slice(&image.pixels[src..src + w * 3]);
    }
    ImageArray {
        pixels,
        height: h,
        width: w,
    }
}

fn rotate_image_90(image: &ImageArray) -> ImageArray {
    let (h, w) = (image.height, image.width);
    let mut pixels = vec![0.0; image.pixels.len()];
    // (y, x) -> (w - 1 - x, y) in the rotated (W x H) frame
    for y in 0..h {
        for x in 0..w {
            let src = (y * w + x) * 3;
            let dst = ((w - 1 - x) * h + y) * 3;
            pixels[dst..dst + 3].copy_from_slice(&image.pixels[src..src + 3]);
        }
    }
    ImageArray {
        pixels,
        height: w,
        width: h,
    }
}

fn flip_mask_h(mask: &MaskArray) -> MaskArray {
    let (h, w) = (mask.height, mask.width);
    let mut pixels = vec![0.0; mask.pixels.len()];
    for y in 0..h {
        for x in 0..w {
            pixels[y * w + (w - 1 - x)] = mask.pixels[y * w + x];
        }
    }
    MaskArray {
        pixels,
        height: h,
        width: w,
    }
}

fn flip_mask_v(mask: &MaskArray) -> MaskArray {
    let (h, w) = (mask.height, mask.width);
    let mut pixels = vec![0.0; mask.pixels.len()];
    for y in 0..h {
        let src = y * w;
        let dst = (h - 1 - y) * w;
        pixels[dst..dst + w].copy_from_slice(&mask.pixels[src..src + w]);
    }
    MaskArray {
        pixels,
        height: h,
        width: w,
    }
}

fn rotate_mask_90(mask: &MaskArray) -> MaskArray {
    let (h, w) = (mask.height, mask.width);
    let mut pixels = vec![0.0; mask.pixels.len()];
    for y in 0..h {
        for x in 0..w {
            pixels[(w - 1 - x) * h + y] = mask.pixels[y * w + x];
        }
    }
    MaskArray {
        pixels,
        height: w,
        width: h,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn corner_image() -> ImageArray {
        // 2x2 image with a distinct top-left pixel.
        ImageArray {
            pixels: vec![
                1.0, 1.0, 1.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ],
            height: 2,
            width: 2,
        }
    }

    fn corner_mask() -> MaskArray {
        MaskArray {
            pixels: vec![1.0, 0.0, 0.0, 0.0],
            height: 2,
            width: 2,
        }
    }

    #[test]
    fn horizontal_flip_moves_image_and_mask_together() {
        let augmentor = GeometricAugmentor::always_flip_horizontal();
        let (image, mask) = augmentor.apply(corner_image(), corner_mask());

        // Top-left moved to top-right in both.
        assert_eq!(image.pixels[3..6], [1.0, 1.0, 1.0]);
        assert_eq!(mask.pixels, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn rotate90_swaps_dimensions_consistently() {
        let image = ImageArray {
            pixels: vec![0.0; 2 * 4 * 3],
            height: 2,
            width: 4,
        };
        let mask = MaskArray {
            pixels: vec![0.0; 2 * 4],
            height: 2,
            width: 4,
        };
        let rotated_image = rotate_image_90(&image);
        let rotated_mask = rotate_mask_90(&mask);

        assert_eq!((rotated_image.height, rotated_image.width), (4, 2));
        assert_eq!((rotated_mask.height, rotated_mask.width), (4, 2));
    }

    #[test]
    fn rotate90_is_label_consistent() {
        let rotated_mask = rotate_mask_90(&corner_mask());
        // Counter-clockwise: top-left corner ends up bottom-left.
        assert_eq!(rotated_mask.pixels, vec![0.0, 0.0, 1.0, 0.0]);

        let rotated_image = rotate_image_90(&corner_image());
        assert_eq!(rotated_image.pixels[2 * 3..2 * 3 + 3], [1.0, 1.0, 1.0]);
    }

    #[test]
    fn augmentors_with_equal_seeds_make_equal_decisions() {
        let a = GeometricAugmentor::new(AugmentationConfig::default(), 7);
        let b = GeometricAugmentor::new(AugmentationConfig::default(), 7);

        for _ in 0..8 {
            let (image_a, mask_a) = a.apply(corner_image(), corner_mask());
            let (image_b, mask_b) = b.apply(corner_image(), corner_mask());
            assert_eq!(image_a.pixels, image_b.pixels);
            assert_eq!(mask_a.pixels, mask_b.pixels);
        }
    }

    #[test]
    fn normalizer_applies_per_channel_affine() {
        let normalizer = Normalizer::new([0.5, 0.5, 0.5], [0.25, 0.5, 1.0]);
        let image = ImageArray {
            pixels: vec![1.0, 1.0, 1.0],
            height: 1,
            width: 1,
        };
        let normalized = normalizer.apply(image);

        assert_relative_eq!(normalized.pixels[0], 2.0);
        assert_relative_eq!(normalized.pixels[1], 1.0);
        assert_relative_eq!(normalized.pixels[2], 0.5);
    }

    #[test]
    fn imagenet_normalizer_centers_mean_gray() {
        let normalized = Normalizer::imagenet().apply(ImageArray {
            pixels: vec![0.485, 0.456, 0.406],
            height: 1,
            width: 1,
        });
        for channel in normalized.pixels {
            assert_relative_eq!(channel, 0.0);
        }
    }
}
