//! Train/test splitting of on-disk datasets.
//!
//! A dataset root is expected to contain `images/` and `masks/`
//! subdirectories with matching file counts. Listings are sorted before
//! splitting, so a given seed always produces the same split.

use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use walkdir::WalkDir;

use crate::error::{RoadSegError, RoadSegResult};

/// Image and mask path lists split into train and test folds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSplit {
    pub train_images: Vec<PathBuf>,
    pub test_images: Vec<PathBuf>,
    pub train_masks: Vec<PathBuf>,
    pub test_masks: Vec<PathBuf>,
}

/// Split the dataset under `root` into train and test path lists.
///
/// `test_fraction` of the pairs (rounded up) is held out; a fraction of
/// 0 puts all data in the training fold and leaves the test fold empty.
/// Image/mask pairing is positional over the sorted listings.
///
/// # Errors
///
/// Fails when either subdirectory is missing, unreadable, or when the
/// two listings disagree in length.
pub fn split_data(root: &Path, test_fraction: f64, seed: u64) -> RoadSegResult<DataSplit> {
    let image_root = root.join("images");
    let mask_root = root.join("masks");

    if !image_root.is_dir() {
        return Err(RoadSegError::ImageDirectoryNotFound { path: image_root });
    }
    if !mask_root.is_dir() {
        return Err(RoadSegError::MaskDirectoryNotFound { path: mask_root });
    }

    let image_paths = list_files(&image_root)?;
    let mask_paths = list_files(&mask_root)?;

    if image_paths.len() != mask_paths.len() {
        return Err(RoadSegError::PairCountMismatch {
            images: image_paths.len(),
            masks: mask_paths.len(),
        });
    }

    // All pairs in the training fold, none held out.
    if test_fraction == 0.0 {
        return Ok(DataSplit {
            train_images: image_paths,
            train_masks: mask_paths,
            ..Default::default()
        });
    }

    let total = image_paths.len();
    let held_out = ((total as f64) * test_fraction).ceil() as usize;

    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_indices, train_indices) = indices.split_at(held_out.min(total));

    let pick = |indices: &[usize], paths: &[PathBuf]| -> Vec<PathBuf> {
        indices.iter().map(|&i| paths[i].clone()).collect()
    };

    Ok(DataSplit {
        train_images: pick(train_indices, &image_paths),
        test_images: pick(test_indices, &image_paths),
        train_masks: pick(train_indices, &mask_paths),
        test_masks: pick(test_indices, &mask_paths),
    })
}

fn list_files(dir: &Path) -> RoadSegResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| RoadSegError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source: error
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk failed")),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
