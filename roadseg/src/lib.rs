//! Training and validation of binary road-segmentation models over
//! satellite image patches, with hyperparameter search support.
//!
//! The model architecture itself is an external collaborator: anything
//! implementing [`SegmentationModel`] (built through a [`ModelBuilder`]
//! for search trials) can be trained here.

pub mod dataset;
pub mod error;
pub mod losses;
pub mod metric;
pub mod patch;
pub mod seed;
pub mod split;
pub mod training;
pub mod transform;
pub mod tune;

pub use dataset::{ImageArray, MaskArray, RoadBatch, RoadBatcher, RoadDataset, RoadItem};
pub use error::{RoadSegError, RoadSegResult};
pub use losses::{DiceLoss, DiceLossConfig, FocalLoss, FocalLossConfig, SegCriterion};
pub use metric::{binary_stats, f1_score, BinaryStats, F1Reduction, MetricMonitor, MetricRecord};
pub use patch::{
    classify_patch, patchify_label_map, patchify_labels, FOREGROUND_THRESHOLD, IMG_PATCH_SIZE,
};
pub use seed::setup_seed;
pub use split::{split_data, DataSplit};
pub use training::{
    train_epoch, train_model, valid_epoch, EpochResult, Phase, PredictionRecorder,
    SegmentationModel, TrainingHistory, TrialReporter, PREDICTION_THRESHOLD,
};
pub use transform::{
    AugmentationConfig, AugmentationMethod, GeometricAugmentor, Normalizer, SampleTransform,
};
pub use tune::{tune_hyperparams, ModelBuilder, TrialConfig};
