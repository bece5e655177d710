//! Hyperparameter search trials.
//!
//! One trial owns its model, optimizer, and metric state; the external
//! search backend schedules trials as independent workers and may
//! terminate one between epochs. Per-epoch validation results reach the
//! backend through the [`TrialReporter`] seam.

use std::sync::Arc;

use burn::{
    config::Config,
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    lr_scheduler::cosine::CosineAnnealingLrSchedulerConfig,
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};

use crate::{
    dataset::{RoadBatch, RoadBatcher, RoadDataset},
    error::{RoadSegError, RoadSegResult},
    losses::SegCriterion,
    training::{train_model, SegmentationModel, TrainingHistory, TrialReporter},
};

/// One hyperparameter configuration to evaluate.
#[derive(Config, Debug)]
pub struct TrialConfig {
    /// Learning rate for the Adam optimizer.
    pub lr: f64,
    /// Loss-function registry key (`"dice_loss"` or `"focal_loss"`).
    pub criterion: String,
    /// Batch size for both loaders.
    #[config(default = 8)]
    pub batch_size: usize,
    /// Number of epochs in the trial.
    #[config(default = 10)]
    pub num_epochs: usize,
}

/// Constructs a segmentation model from named encoder/decoder
/// architectures.
///
/// This is the seam to the external model library: implementations are
/// expected to initialize the encoder from its pretrained weight set and
/// fail with a model-initialization error for unknown names.
pub trait ModelBuilder<B: AutodiffBackend> {
    type Model: AutodiffModule<B> + SegmentationModel<B>;

    fn build(
        &self,
        encoder: &str,
        decoder: &str,
        device: &B::Device,
    ) -> RoadSegResult<Self::Model>;
}

/// Run one search trial: build loaders, model, optimizer, and schedule
/// from the trial configuration and delegate to [`train_model`] with
/// validation reporting forced on.
///
/// The cosine annealing period equals the total planned optimizer steps,
/// `len(train) * num_epochs / batch_size`.
///
/// # Errors
///
/// An unknown criterion key fails the trial before any epoch executes;
/// model construction and scheduler initialization failures are likewise
/// surfaced to the search backend rather than skipped.
pub fn tune_hyperparams<B, MB, R>(
    config: &TrialConfig,
    encoder: &str,
    decoder: &str,
    datasets: (RoadDataset, RoadDataset),
    builder: &MB,
    reporter: &mut R,
    device: &B::Device,
) -> RoadSegResult<TrainingHistory>
where
    B: AutodiffBackend,
    MB: ModelBuilder<B>,
    <MB::Model as AutodiffModule<B>>::InnerModule: SegmentationModel<B::InnerBackend>,
    R: TrialReporter,
{
    let (train_dataset, valid_dataset) = datasets;

    // Resolve the criterion before anything expensive is built: an
    // unknown key must fail the trial before any epoch executes.
    let criterion = SegCriterion::from_name(&config.criterion)?;

    let total_steps = train_dataset.len() * config.num_epochs / config.batch_size;

    let train_loader = DataLoaderBuilder::new(RoadBatcher::<B>::new())
        .batch_size(config.batch_size)
        .set_device(device.clone())
        .build(train_dataset);
    let valid_loader: Arc<dyn DataLoader<B::InnerBackend, RoadBatch<B::InnerBackend>>> =
        DataLoaderBuilder::new(RoadBatcher::<B::InnerBackend>::new())
            .batch_size(config.batch_size)
            .set_device(device.clone())
            .build(valid_dataset);

    let model = builder.build(encoder, decoder, device)?;
    let mut optimizer = AdamConfig::new().init::<B, MB::Model>();
    let mut scheduler = CosineAnnealingLrSchedulerConfig::new(config.lr, total_steps.max(1))
        .init()
        .map_err(|reason| RoadSegError::SchedulerInit { reason })?;

    let (_model, history) = train_model(
        model,
        &train_loader,
        Some(&valid_loader),
        &criterion,
        &mut optimizer,
        &mut scheduler,
        config.num_epochs,
        device,
        None,
        Some(reporter),
    );

    Ok(history)
}
