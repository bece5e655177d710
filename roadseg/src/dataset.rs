//! Dataset for road-segmentation training and validation.
//!
//! Satellite images and their ground-truth masks are decoded eagerly at
//! construction time so that epoch iteration never touches the
//! filesystem. Items carry raw pixel data following Burn's convention
//! where datasets return plain buffers and the batcher handles tensor
//! creation and device placement; the batcher also performs the HWC to
//! CHW layout conversion and gives masks their singleton channel.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Tensor, TensorData},
};

use crate::{
    error::{RoadSegError, RoadSegResult},
    transform::{Normalizer, SampleTransform},
};

/// RGB pixel buffer in row-major HWC layout with values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    /// Raw pixel data of length `height * width * 3`.
    pub pixels: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

/// Single-channel mask buffer in row-major layout with values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskArray {
    /// Raw pixel data of length `height * width`.
    pub pixels: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

impl MaskArray {
    /// An all-zero (all background) mask of the given spatial shape.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            pixels: vec![0.0; height * width],
            height,
            width,
        }
    }

    /// Binarize the mask: values at or above the threshold become 1.
    pub fn binarized(&self, threshold: f32) -> Self {
        Self {
            pixels: self
                .pixels
                .iter()
                .map(|&v| if v >= threshold { 1.0 } else { 0.0 })
                .collect(),
            height: self.height,
            width: self.width,
        }
    }
}

/// One preprocessed sample: transformed image and binary mask.
#[derive(Debug, Clone)]
pub struct RoadItem {
    /// RGB image data as `[H, W, C]` floats.
    pub image: Vec<f32>,
    /// Binary mask data as `[H, W]` floats.
    pub mask: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

/// A batch of samples ready for the model.
#[derive(Debug, Clone)]
pub struct RoadBatch<B: Backend> {
    /// Batched images with shape `[N, 3, H, W]`.
    pub images: Tensor<B, 4>,
    /// Batched binary masks with shape `[N, 1, H, W]`.
    pub masks: Tensor<B, 4>,
}

/// Batcher converting raw [`RoadItem`]s into a [`RoadBatch`].
#[derive(Clone, Default)]
pub struct RoadBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> RoadBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, RoadItem, RoadBatch<B>> for RoadBatcher<B> {
    fn batch(&self, items: Vec<RoadItem>, device: &B::Device) -> RoadBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);

        for item in items {
            // HWC to CHW
            let image = Tensor::<B, 3>::from_data(
                TensorData::new(item.image, [item.height, item.width, 3]),
                device,
            )
            .permute([2, 0, 1]);

            // [H, W] -> [1, H, W]
            let mask = Tensor::<B, 2>::from_data(
                TensorData::new(item.mask, [item.height, item.width]),
                device,
            )
            .unsqueeze::<3>();

            images.push(image);
            masks.push(mask);
        }

        RoadBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack(masks, 0),
        }
    }
}

/// In-memory dataset of satellite images with optional ground-truth masks.
///
/// When no masks are supplied (test-time inference), [`Dataset::get`]
/// synthesizes an all-zero mask of the image's spatial shape. Supplied
/// masks are binarized at 0.5 before any transform runs.
pub struct RoadDataset {
    images: Vec<ImageArray>,
    masks: Option<Vec<MaskArray>>,
    transform: Option<Arc<dyn SampleTransform>>,
    preprocess: Option<Normalizer>,
}

impl core::fmt::Debug for RoadDataset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoadDataset")
            .field("images", &self.images)
            .field("masks", &self.masks)
            .field("transform", &self.transform.as_ref().map(|_| "<transform>"))
            .field("preprocess", &self.preprocess)
            .finish()
    }
}

impl RoadDataset {
    /// Load a dataset eagerly from image (and optional mask) paths.
    ///
    /// # Errors
    ///
    /// Fails with [`RoadSegError::ImageOpenFailed`] on the first
    /// unreadable file, [`RoadSegError::PairCountMismatch`] when the path
    /// lists disagree in length, and
    /// [`RoadSegError::MismatchedDimensions`] when an image and its mask
    /// disagree on spatial shape.
    pub fn new(
        image_paths: &[PathBuf],
        mask_paths: Option<&[PathBuf]>,
        transform: Option<Arc<dyn SampleTransform>>,
        preprocess: Option<Normalizer>,
    ) -> RoadSegResult<Self> {
        let images = image_paths
            .iter()
            .map(|path| load_image(path))
            .collect::<RoadSegResult<Vec<_>>>()?;

        let masks = match mask_paths {
            Some(paths) => Some(
                paths
                    .iter()
                    .map(|path| load_mask(path))
                    .collect::<RoadSegResult<Vec<_>>>()?,
            ),
            None => None,
        };

        Self::from_arrays(images, masks, transform, preprocess)
    }

    /// Build a dataset from already-decoded pixel buffers.
    ///
    /// Shares the pair-count and dimension validation of [`Self::new`].
    pub fn from_arrays(
        images: Vec<ImageArray>,
        masks: Option<Vec<MaskArray>>,
        transform: Option<Arc<dyn SampleTransform>>,
        preprocess: Option<Normalizer>,
    ) -> RoadSegResult<Self> {
        if let Some(masks) = &masks {
            if masks.len() != images.len() {
                return Err(RoadSegError::PairCountMismatch {
                    images: images.len(),
                    masks: masks.len(),
                });
            }
            for (index, (image, mask)) in images.iter().zip(masks.iter()).enumerate() {
                if image.height != mask.height || image.width != mask.width {
                    return Err(RoadSegError::MismatchedDimensions {
                        index,
                        image_height: image.height,
                        image_width: image.width,
                        mask_height: mask.height,
                        mask_width: mask.width,
                    });
                }
            }
        }

        Ok(Self {
            images,
            masks,
            transform,
            preprocess,
        })
    }

    /// Independent copy of the dataset with only the transform replaced.
    ///
    /// Copies exactly the two array collections, so train and validation
    /// views of logically the same data can carry different augmentations
    /// without re-reading anything from disk.
    pub fn with_transform(&self, transform: Option<Arc<dyn SampleTransform>>) -> Self {
        Self {
            images: self.images.clone(),
            masks: self.masks.clone(),
            transform,
            preprocess: self.preprocess.clone(),
        }
    }
}

impl Dataset<RoadItem> for RoadDataset {
    fn get(&self, index: usize) -> Option<RoadItem> {
        let image = self.images.get(index)?.clone();

        // Dummy mask when no ground truth was supplied.
        let mask = match &self.masks {
            Some(masks) => masks.get(index)?.binarized(0.5),
            None => MaskArray::zeros(image.height, image.width),
        };

        // The same randomized transform instance sees image and mask
        // together, keeping geometric transforms label-consistent. This
        // must run before the layout conversion in the batcher.
        let (image, mask) = match &self.transform {
            Some(transform) => transform.apply(image, mask),
            None => (image, mask),
        };

        // Encoder-specific normalization is affine and deterministic,
        // safe after any geometric transform.
        let image = match &self.preprocess {
            Some(preprocess) => preprocess.apply(image),
            None => image,
        };

        let height = image.height;
        let width = image.width;

        Some(RoadItem {
            image: image.pixels,
            mask: mask.pixels,
            height,
            width,
        })
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

fn load_image(path: &Path) -> RoadSegResult<ImageArray> {
    let image = image::open(path).map_err(|source| RoadSegError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = image.to_rgb32f();
    let (width, height) = rgb.dimensions();
    Ok(ImageArray {
        pixels: rgb.into_raw(),
        height: height as usize,
        width: width as usize,
    })
}

fn load_mask(path: &Path) -> RoadSegResult<MaskArray> {
    let mask = image::open(path).map_err(|source| RoadSegError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let luma = mask.to_luma32f();
    let (width, height) = luma.dimensions();
    Ok(MaskArray {
        pixels: luma.into_raw(),
        height: height as usize,
        width: width as usize,
    })
}

#[cfg(test)]
mod tests {
    use burn::data::dataloader::batcher::Batcher;

    use super::*;
    use crate::tests::TestBackend;
    use crate::transform::GeometricAugmentor;

    fn gradient_image(height: usize, width: usize) -> ImageArray {
        let mut pixels = Vec::with_capacity(height * width * 3);
        for y in 0..height {
            for x in 0..width {
                let v = (y * width + x) as f32 / (height * width) as f32;
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        ImageArray {
            pixels,
            height,
            width,
        }
    }

    #[test]
    fn dataset_without_masks_yields_all_zero_masks() {
        let dataset =
            RoadDataset::from_arrays(vec![gradient_image(8, 8)], None, None, None).unwrap();
        let item = dataset.get(0).unwrap();

        assert_eq!(item.mask.len(), 8 * 8);
        assert!(item.mask.iter().all(|&v| v == 0.0));
        assert_eq!((item.height, item.width), (8, 8));
    }

    #[test]
    fn masks_are_binarized_at_half() {
        let mask = MaskArray {
            pixels: vec![0.0, 0.4999, 0.5, 0.8],
            height: 2,
            width: 2,
        };
        let dataset =
            RoadDataset::from_arrays(vec![gradient_image(2, 2)], Some(vec![mask]), None, None)
                .unwrap();
        let item = dataset.get(0).unwrap();
        assert_eq!(item.mask, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn mismatched_mask_dimensions_fail_construction() {
        let err = RoadDataset::from_arrays(
            vec![gradient_image(4, 4)],
            Some(vec![MaskArray::zeros(4, 6)]),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RoadSegError::MismatchedDimensions { index: 0, .. }
        ));
    }

    #[test]
    fn mismatched_pair_counts_fail_construction() {
        let err = RoadDataset::from_arrays(
            vec![gradient_image(4, 4), gradient_image(4, 4)],
            Some(vec![MaskArray::zeros(4, 4)]),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RoadSegError::PairCountMismatch {
                images: 2,
                masks: 1
            }
        ));
    }

    #[test]
    fn with_transform_copies_are_independent() {
        let original =
            RoadDataset::from_arrays(vec![gradient_image(8, 8)], None, None, None).unwrap();
        let before = original.get(0).unwrap();

        let augmented = original.with_transform(Some(Arc::new(
            GeometricAugmentor::always_flip_horizontal(),
        )));

        // Copy and original agree on stored content but transform
        // independently.
        assert_eq!(original.len(), augmented.len());
        let untouched_copy = original.with_transform(None);
        assert_eq!(untouched_copy.get(0).unwrap().image, before.image);

        let after = original.get(0).unwrap();
        assert_eq!(before.image, after.image);

        let flipped = augmented.get(0).unwrap();
        assert_ne!(before.image, flipped.image);
    }

    #[test]
    fn unreadable_path_fails_dataset_build() {
        let missing = PathBuf::from("/nonexistent/road_satimage_001.png");
        let err = RoadDataset::new(&[missing.clone()], None, None, None).unwrap_err();
        assert!(matches!(
            err,
            RoadSegError::ImageOpenFailed { ref path, .. } if *path == missing
        ));
    }

    #[test]
    fn batcher_produces_channel_first_batches() {
        let dataset = RoadDataset::from_arrays(
            vec![gradient_image(8, 8), gradient_image(8, 8)],
            None,
            None,
            None,
        )
        .unwrap();
        let items = vec![dataset.get(0).unwrap(), dataset.get(1).unwrap()];

        let device = Default::default();
        let batch = RoadBatcher::<TestBackend>::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
        assert_eq!(batch.masks.dims(), [2, 1, 8, 8]);
    }
}
