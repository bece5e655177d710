//! Dice loss for binary segmentation.
//!
//! Computes the soft Dice coefficient per sample from sigmoid
//! probabilities and returns (1 - Dice) as the loss:
//!
//! ```text
//! Dice = (2 * |p ∩ t| + smooth) / (|p| + |t| + smooth)
//! Loss = 1 - Dice
//! ```

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::Reduction,
    tensor::{activation, backend::Backend, Tensor},
};

/// Configuration for creating a [Dice loss](DiceLoss).
#[derive(Config, Debug)]
pub struct DiceLossConfig {
    /// Additive smoothing applied to numerator and denominator. Default: 0.0
    #[config(default = 0.0)]
    pub smooth: f64,
    /// Lower clamp for the denominator to avoid division by zero. Default: 1e-7
    #[config(default = 1e-7)]
    pub eps: f64,
}

impl DiceLossConfig {
    /// Initialize [Dice loss](DiceLoss).
    pub fn init(&self) -> DiceLoss {
        self.assertions();
        DiceLoss {
            smooth: self.smooth,
            eps: self.eps,
        }
    }

    fn assertions(&self) {
        assert!(
            self.eps > 0.0,
            "Epsilon for DiceLoss must be positive, got {}",
            self.eps
        );
        assert!(
            self.smooth >= 0.0,
            "Smoothing for DiceLoss must be non-negative, got {}",
            self.smooth
        );
    }
}

/// Dice loss operating on raw logits.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct DiceLoss {
    /// Additive smoothing applied to numerator and denominator.
    pub smooth: f64,
    /// Lower clamp for the denominator.
    pub eps: f64,
}

impl Default for DiceLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for DiceLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("smooth", &self.smooth)
            .add("eps", &self.eps)
            .optional()
    }
}

impl DiceLoss {
    /// Create a new Dice loss with default configuration.
    pub fn new() -> Self {
        DiceLossConfig::new().init()
    }

    /// Compute the criterion on the input tensor with reduction.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, channels, height, width]`
    /// - targets: `[batch_size, channels, height, width]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(logits, targets);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the criterion on the input tensor without reduction.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, channels, height, width]`
    /// - targets: `[batch_size, channels, height, width]`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&logits, &targets);

        let [batch_size, ..] = logits.dims();
        let probabilities = activation::sigmoid(logits);

        // Flatten spatial dimensions per sample: [B, C*H*W]
        let pred_flat = probabilities.reshape([batch_size as i32, -1]);
        let target_flat = targets.reshape([batch_size as i32, -1]);

        let intersection = (pred_flat.clone() * target_flat.clone()).sum_dim(1);
        let cardinality = pred_flat.sum_dim(1) + target_flat.sum_dim(1);

        let dice = (intersection.mul_scalar(2.0).add_scalar(self.smooth))
            / (cardinality.add_scalar(self.smooth)).clamp_min(self.eps);

        let loss = Tensor::ones_like(&dice) - dice;
        loss.reshape([batch_size])
    }

    fn assertions<B: Backend>(&self, logits: &Tensor<B, 4>, targets: &Tensor<B, 4>) {
        let logit_dims = logits.dims();
        let target_dims = targets.dims();
        assert_eq!(
            logit_dims, target_dims,
            "Shape of logits ({logit_dims:?}) must match targets ({target_dims:?})"
        );
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{ElementConversion, TensorData, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn dice_loss_confident_correct_prediction_is_near_zero() {
        let device = Default::default();
        let loss = DiceLoss::new();

        // Strongly positive logits where target is 1, strongly negative
        // elsewhere.
        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[20.0, 20.0], [-20.0, -20.0]]]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 1.0], [0.0, 0.0]]]]),
            &device,
        );

        let result = loss.forward(logits, targets, Reduction::Mean);
        let value = result.into_scalar().elem::<f64>();
        assert!(value < 1e-6, "expected near-zero loss, got {value}");
    }

    #[test]
    fn dice_loss_opposite_prediction_is_near_one() {
        let device = Default::default();
        let loss = DiceLoss::new();

        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[20.0, 20.0], [20.0, 20.0]]]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[0.0, 0.0], [0.0, 0.0]]]]),
            &device,
        );

        let result = loss.forward(logits, targets, Reduction::Mean);
        let value = result.into_scalar().elem::<f64>();
        assert!(value > 0.999, "expected near-one loss, got {value}");
    }

    #[test]
    fn dice_loss_half_overlap_computes_expected_value() {
        let device = Default::default();
        let loss = DiceLoss::new();

        // Saturated probabilities: p = [1, 1, 0, 0], t = [1, 0, 1, 0]
        // Dice = 2*1 / (2 + 2) = 0.5, loss = 0.5
        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[40.0, 40.0], [-40.0, -40.0]]]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 0.0], [1.0, 0.0]]]]),
            &device,
        );

        let result = loss.forward(logits, targets, Reduction::Mean);
        result
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([0.5]), Tolerance::relative(1e-5));
    }

    #[test]
    fn dice_loss_no_reduction_returns_per_sample_losses() {
        let device = Default::default();
        let loss = DiceLoss::new();

        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[40.0, 40.0]]], [[[40.0, 40.0]]]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 1.0]]], [[[0.0, 0.0]]]]),
            &device,
        );

        let result = loss.forward_no_reduction(logits, targets);
        result
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([0.0, 1.0]), Tolerance::relative(1e-4));
    }

    #[test]
    #[should_panic = "Epsilon for DiceLoss must be positive"]
    fn dice_loss_config_zero_epsilon_panics() {
        let _loss = DiceLossConfig::new().with_eps(0.0).init();
    }

    #[test]
    #[should_panic = "Shape of logits"]
    fn dice_loss_mismatched_shapes_panics() {
        let device = Default::default();
        let loss = DiceLoss::new();

        let logits =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[1.0, 2.0]]]]), &device);
        let targets = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 2.0], [3.0, 4.0]]]]),
            &device,
        );

        let _result = loss.forward_no_reduction(logits, targets);
    }

    #[test]
    fn dice_loss_display_shows_parameters() {
        let loss = DiceLossConfig::new().with_smooth(1.0).init();
        let rendered = format!("{loss}");
        assert!(rendered.contains("smooth"), "got {rendered}");
        assert!(rendered.contains("eps"), "got {rendered}");
    }
}
