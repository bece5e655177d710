//! Training and validation loops.
//!
//! These are manual Burn loops rather than `Learner`-driven ones: the
//! hyperparameter search needs per-epoch metric averages handed back to
//! the search backend, and the ensembling hook needs every batch's
//! sigmoid predictions. One epoch of training fully completes before its
//! paired validation epoch begins; the compute device is resolved once
//! per [`train_model`] call.

use std::{fmt, sync::Arc};

use burn::{
    data::dataloader::DataLoader,
    lr_scheduler::LrScheduler,
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    tensor::{
        activation,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};

use crate::{
    dataset::RoadBatch,
    losses::SegCriterion,
    metric::{binary_stats, f1_score, F1Reduction, MetricMonitor},
};

/// Decision threshold applied to sigmoid probabilities when computing
/// confusion counts.
pub const PREDICTION_THRESHOLD: f64 = 0.4;

/// A segmentation model: float image batches in, single-channel logit
/// maps of matching batch/spatial shape out.
pub trait SegmentationModel<B: Backend> {
    /// # Shapes
    ///
    /// - images: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, 1, height, width]`
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Which half of the train/validate cycle produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Validation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Training => write!(f, "training"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Collaborator that accumulates per-batch predictions and labels across
/// epochs for later multi-model ensembling.
///
/// The hook is side-effecting only; recorded tensors never feed back
/// into loss computation. Both phases record on the non-autodiff
/// backend, so one recorder instance spans training and validation.
pub trait PredictionRecorder<B: Backend> {
    fn record(&mut self, predictions: Tensor<B, 4>, labels: Tensor<B, 4>, phase: Phase);
}

/// Collaborator that forwards per-epoch validation results to an
/// external hyperparameter-search backend.
pub trait TrialReporter {
    fn report(&mut self, loss: f64, f1: f64);
}

/// Average loss and F1 of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochResult {
    pub loss: f64,
    pub f1: f64,
}

/// Per-epoch metric series collected by [`train_model`].
///
/// The validation series are empty when no validation loader was
/// supplied, and exactly `num_epochs` long otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub valid_losses: Vec<f64>,
    pub train_f1s: Vec<f64>,
    pub valid_f1s: Vec<f64>,
}

fn epoch_result(monitor: &MetricMonitor) -> EpochResult {
    let averages = monitor.averages();
    EpochResult {
        loss: averages.first().copied().unwrap_or(0.0),
        f1: averages.get(1).copied().unwrap_or(0.0),
    }
}

/// Run one training epoch and return the updated model with the epoch's
/// metric averages.
///
/// Per batch: forward on the float inputs, loss against the float
/// labels, backward, learning-rate advance, parameter update. When an
/// ensembler is supplied it receives the batch's sigmoid predictions and
/// labels. Confusion counts at [`PREDICTION_THRESHOLD`] feed a
/// micro-imagewise F1 into a monitor created fresh for this epoch.
///
/// Burn optimizers consume and return the module, so the model passes
/// through by value.
pub fn train_epoch<B, M, O, S>(
    mut model: M,
    loader: &Arc<dyn DataLoader<B, RoadBatch<B>>>,
    criterion: &SegCriterion,
    optimizer: &mut O,
    scheduler: &mut S,
    epoch: usize,
    mut ensembler: Option<&mut (dyn PredictionRecorder<B::InnerBackend> + '_)>,
) -> (M, EpochResult)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    O: Optimizer<M, B>,
    S: LrScheduler,
{
    let mut monitor = MetricMonitor::default();

    for batch in loader.iter() {
        let RoadBatch { images, masks } = batch;

        let logits = model.forward(images);
        let loss = criterion.forward(logits.clone(), masks.clone());

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let lr = scheduler.step();
        model = optimizer.step(lr, model, grads);

        let probabilities = activation::sigmoid(logits).inner();
        let labels = masks.inner();
        if let Some(recorder) = ensembler.as_deref_mut() {
            recorder.record(probabilities.clone(), labels.clone(), Phase::Training);
        }

        let stats = binary_stats(&probabilities, &labels, PREDICTION_THRESHOLD);

        monitor.update("Loss", loss.into_scalar().elem::<f64>());
        monitor.update("f1", f1_score(&stats, F1Reduction::MicroImagewise));
    }

    println!("Epoch: {epoch:>3}. Train.      {monitor}");

    (model, epoch_result(&monitor))
}

/// Run one validation epoch: the same per-batch statistics as training
/// but no gradients and no parameter updates.
///
/// The model runs on a non-autodiff backend (obtained via
/// [`AutodiffModule::valid`] by the orchestrator), which disables
/// gradient computation structurally. When a reporter is supplied, the
/// epoch's final averages are pushed to the search backend.
pub fn valid_epoch<B, M>(
    model: &M,
    loader: &Arc<dyn DataLoader<B, RoadBatch<B>>>,
    criterion: &SegCriterion,
    epoch: usize,
    mut ensembler: Option<&mut (dyn PredictionRecorder<B> + '_)>,
    reporter: Option<&mut (dyn TrialReporter + '_)>,
) -> EpochResult
where
    B: Backend,
    M: SegmentationModel<B>,
{
    let mut monitor = MetricMonitor::default();

    for batch in loader.iter() {
        let RoadBatch { images, masks } = batch;

        let logits = model.forward(images);
        let probabilities = activation::sigmoid(logits.clone());

        if let Some(recorder) = ensembler.as_deref_mut() {
            recorder.record(probabilities.clone(), masks.clone(), Phase::Validation);
        }

        let loss = criterion.forward(logits, masks.clone());
        let stats = binary_stats(&probabilities, &masks, PREDICTION_THRESHOLD);

        monitor.update("Loss", loss.into_scalar().elem::<f64>());
        monitor.update("f1", f1_score(&stats, F1Reduction::MicroImagewise));
    }

    println!("Epoch: {epoch:>3}. Validation. {monitor}");

    let result = epoch_result(&monitor);
    if let Some(reporter) = reporter {
        reporter.report(result.loss, result.f1);
    }
    result
}

/// Train a model for `num_epochs` epochs, validating after each one when
/// a validation loader is present.
///
/// The model is moved to the device once up front. Validation is
/// entirely skipped (no history entries appended) without a validation
/// loader; it runs on the model's inner-backend view otherwise. Returns
/// the trained model and the per-epoch metric series.
#[allow(clippy::too_many_arguments)]
pub fn train_model<B, M, O, S>(
    model: M,
    train_loader: &Arc<dyn DataLoader<B, RoadBatch<B>>>,
    valid_loader: Option<&Arc<dyn DataLoader<B::InnerBackend, RoadBatch<B::InnerBackend>>>>,
    criterion: &SegCriterion,
    optimizer: &mut O,
    scheduler: &mut S,
    num_epochs: usize,
    device: &B::Device,
    mut ensembler: Option<&mut (dyn PredictionRecorder<B::InnerBackend> + '_)>,
    mut reporter: Option<&mut (dyn TrialReporter + '_)>,
) -> (M, TrainingHistory)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: Optimizer<M, B>,
    S: LrScheduler,
{
    let mut model = model.fork(device);
    let mut history = TrainingHistory::default();

    for epoch in 1..=num_epochs {
        let (updated, train_result) = train_epoch(
            model,
            train_loader,
            criterion,
            optimizer,
            scheduler,
            epoch,
            ensembler.as_deref_mut(),
        );
        model = updated;
        history.train_losses.push(train_result.loss);
        history.train_f1s.push(train_result.f1);

        if let Some(loader) = valid_loader {
            let valid_result = valid_epoch(
                &model.valid(),
                loader,
                criterion,
                epoch,
                ensembler.as_deref_mut(),
                reporter.as_deref_mut(),
            );
            history.valid_losses.push(valid_result.loss);
            history.valid_f1s.push(valid_result.f1);
        }
    }

    (model, history)
}
