//! Error types for road-segmentation training operations.
//!
//! Shape, IO, and configuration failures are all fatal to their unit of
//! work (sample, epoch, or trial); there are no retries anywhere in this
//! crate. Numeric degeneracy (NaN/Inf losses) is deliberately not an
//! error: it propagates into metric averages and is a modeling concern
//! of the caller.

use std::path::PathBuf;

use thiserror::Error;

/// The error type for `roadseg-burn` operations.
#[derive(Error, Debug)]
pub enum RoadSegError {
    /// Error when an image and its mask disagree on spatial dimensions.
    #[error("Image dimensions {image_height}x{image_width} do not match mask dimensions {mask_height}x{mask_width} for sample {index}")]
    MismatchedDimensions {
        /// Index of the offending sample.
        index: usize,
        image_height: usize,
        image_width: usize,
        mask_height: usize,
        mask_width: usize,
    },

    /// Error when an array cannot be squeezed to two spatial dimensions.
    #[error("Cannot squeeze array of shape {dims:?} to 2D: leading channel dimension must be 1")]
    UnsqueezableShape {
        /// The actual dimensions of the array.
        dims: Vec<usize>,
    },

    /// Error when opening or decoding an image file fails.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path that failed to open.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// Error when the image directory is not found.
    #[error("Image directory not found: {path}")]
    ImageDirectoryNotFound {
        /// The expected image directory path.
        path: PathBuf,
    },

    /// Error when the mask directory is not found.
    #[error("Mask directory not found: {path}")]
    MaskDirectoryNotFound {
        /// The expected mask directory path.
        path: PathBuf,
    },

    /// Error when reading a directory fails.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Error when the image and mask listings differ in length.
    #[error("Found {images} images but {masks} masks")]
    PairCountMismatch {
        /// Number of image files found.
        images: usize,
        /// Number of mask files found.
        masks: usize,
    },

    /// Error when a trial configuration names an unknown loss function.
    #[error("Unknown criterion: {name} (expected one of: dice_loss, focal_loss)")]
    UnknownCriterion {
        /// The unrecognized criterion key.
        name: String,
    },

    /// Error when building the learning-rate schedule fails.
    #[error("Failed to initialize learning-rate scheduler: {reason}")]
    SchedulerInit {
        /// The reason reported by the scheduler configuration.
        reason: String,
    },
}

/// A specialized `Result` type for `roadseg-burn` operations.
pub type RoadSegResult<T> = Result<T, RoadSegError>;
