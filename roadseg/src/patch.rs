//! Patch-level label aggregation.
//!
//! Submissions for the road-segmentation task are scored on 16x16 pixel
//! patches rather than individual pixels. This module converts dense
//! masks (ground truth or sigmoid predictions) into patch-level binary
//! label maps: every cell of a patch receives the patch's single label.

use burn::tensor::{backend::Backend, ElementConversion, Tensor, TensorData};

use crate::error::{RoadSegError, RoadSegResult};

/// Side length of the square scoring patches.
pub const IMG_PATCH_SIZE: usize = 16;

/// Minimum mean intensity within a patch required to label it as road.
pub const FOREGROUND_THRESHOLD: f64 = 0.25;

/// Classify a single block as road (1) or background (0).
///
/// The label is 1 iff the mean value of the block strictly exceeds the
/// threshold; a mean exactly equal to the threshold stays background.
pub fn classify_patch<B: Backend>(block: &Tensor<B, 2>, threshold: f64) -> u8 {
    let mean = block.clone().mean().into_scalar().elem::<f64>();
    u8::from(mean > threshold)
}

/// Replace every cell of each 16x16 patch with that patch's label.
///
/// The patch grid is traversed row-major over patch origins; patches at
/// the right/bottom edge of a non-tileable array cover their actual
/// (partial) extent. Output has the same shape as the input.
pub fn patchify_labels<B: Backend>(mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let device = mask.device();
    let [height, width] = mask.dims();

    let data = mask.into_data().convert::<f64>();
    let values = data
        .as_slice::<f64>()
        .expect("mask data converts to f64 slice");

    let mut patched = vec![0.0_f64; height * width];
    for y0 in (0..height).step_by(IMG_PATCH_SIZE) {
        for x0 in (0..width).step_by(IMG_PATCH_SIZE) {
            let y1 = (y0 + IMG_PATCH_SIZE).min(height);
            let x1 = (x0 + IMG_PATCH_SIZE).min(width);

            let mut sum = 0.0;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += values[y * width + x];
                }
            }
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            let label = if sum / count > FOREGROUND_THRESHOLD {
                1.0
            } else {
                0.0
            };

            for y in y0..y1 {
                for x in x0..x1 {
                    patched[y * width + x] = label;
                }
            }
        }
    }

    Tensor::from_data(TensorData::new(patched, [height, width]), &device)
}

/// Squeeze a `[1, H, W]` label map to 2D and patchify it.
///
/// # Errors
///
/// Returns [`RoadSegError::UnsqueezableShape`] when the leading channel
/// dimension is not 1.
pub fn patchify_label_map<B: Backend>(mask: Tensor<B, 3>) -> RoadSegResult<Tensor<B, 2>> {
    let [channels, height, width] = mask.dims();
    if channels != 1 {
        return Err(RoadSegError::UnsqueezableShape {
            dims: vec![channels, height, width],
        });
    }
    Ok(patchify_labels(mask.reshape([height, width])))
}
